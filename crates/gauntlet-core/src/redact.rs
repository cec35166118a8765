//! Secret redaction.
//!
//! A `Redactor` owns the literal string forms of every secret input for one
//! run and rewrites them to `***` on the way to disk. It never leaves the
//! run's memory; artifacts only ever see the redacted output.

use crate::inputs::{ResolvedInputs, REDACTED};

#[derive(Debug, Clone, Default)]
pub struct Redactor {
    // Longest first so an overlapping shorter secret cannot split a longer one.
    secrets: Vec<String>,
}

impl Redactor {
    pub fn new(mut secrets: Vec<String>) -> Self {
        secrets.retain(|s| !s.is_empty());
        secrets.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        secrets.dedup();
        Self { secrets }
    }

    pub fn from_inputs(inputs: &ResolvedInputs) -> Self {
        Self::new(inputs.secret_literals())
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }

    /// Replace every exact occurrence of a secret with `***`.
    pub fn redact_text(&self, text: &str) -> String {
        if self.secrets.is_empty() {
            return text.to_string();
        }
        let mut out = text.to_string();
        for secret in &self.secrets {
            out = out.replace(secret, REDACTED);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_every_occurrence() {
        let r = Redactor::new(vec!["s3cr3t".into()]);
        assert_eq!(
            r.redact_text("token=s3cr3t; again s3cr3t"),
            "token=***; again ***"
        );
    }

    #[test]
    fn longer_secrets_win_over_substrings() {
        let r = Redactor::new(vec!["abc".into(), "abcdef".into()]);
        assert_eq!(r.redact_text("x abcdef y"), "x *** y");
        assert_eq!(r.redact_text("x abc y"), "x *** y");
    }

    #[test]
    fn empty_secret_set_is_identity() {
        let r = Redactor::new(vec![String::new()]);
        assert!(r.is_empty());
        assert_eq!(r.redact_text("anything"), "anything");
    }
}
