//! Effective environment resolution.
//!
//! Layers merge with later-wins precedence: process < plan < suite < request
//! overrides. A suite-level value is more local than a plan-level one, so it
//! wins. Keys compare case-insensitively; the last writer's casing is kept.

use crate::errors::{EngineError, ErrorKind};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
struct EnvEntry {
    key: String,
    value: String,
}

/// Merged, case-insensitive key→value environment for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EffectiveEnvironment {
    // Keyed by the lowercased key; the entry keeps the writer's casing.
    entries: BTreeMap<String, EnvEntry>,
}

impl EffectiveEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge the standard four layers. Declared layers (plan, suite,
    /// overrides) reject empty keys; process entries with empty keys are
    /// silently dropped since the engine does not own them.
    pub fn merge(
        process: &BTreeMap<String, String>,
        plan: Option<&BTreeMap<String, String>>,
        suite: Option<&BTreeMap<String, String>>,
        overrides: Option<&BTreeMap<String, String>>,
    ) -> Result<EffectiveEnvironment, EngineError> {
        let mut env = EffectiveEnvironment::new();
        for (k, v) in process {
            if !k.is_empty() {
                env.insert(k, v);
            }
        }
        for layer in [plan, suite, overrides].into_iter().flatten() {
            env.apply_layer(layer)?;
        }
        Ok(env)
    }

    /// Snapshot of the current process environment as a merge base.
    pub fn process_env() -> BTreeMap<String, String> {
        std::env::vars().collect()
    }

    fn apply_layer(&mut self, layer: &BTreeMap<String, String>) -> Result<(), EngineError> {
        for (k, v) in layer {
            if k.is_empty() {
                return Err(EngineError::new(
                    ErrorKind::EnvironmentInvalidKey,
                    "environment keys must be non-empty",
                ));
            }
            self.insert(k, v);
        }
        Ok(())
    }

    fn insert(&mut self, key: &str, value: &str) {
        self.entries.insert(
            key.to_lowercase(),
            EnvEntry {
                key: key.to_string(),
                value: value.to_string(),
            },
        );
    }

    /// Case-insensitive lookup.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(&key.to_lowercase())
            .map(|e| e.value.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sorted key→value map in the writers' casing, for snapshots and for the
    /// subprocess environment.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.entries
            .values()
            .map(|e| (e.key.clone(), e.value.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn later_layers_win() {
        let process = layer(&[("STAGE", "local"), ("HOME", "/home/x")]);
        let plan = layer(&[("STAGE", "plan")]);
        let suite = layer(&[("STAGE", "suite")]);
        let env = EffectiveEnvironment::merge(&process, Some(&plan), Some(&suite), None).unwrap();
        assert_eq!(env.get("STAGE"), Some("suite"));
        assert_eq!(env.get("HOME"), Some("/home/x"));
    }

    #[test]
    fn overrides_beat_suite() {
        let env = EffectiveEnvironment::merge(
            &layer(&[]),
            Some(&layer(&[("K", "plan")])),
            Some(&layer(&[("K", "suite")])),
            Some(&layer(&[("K", "override")])),
        )
        .unwrap();
        assert_eq!(env.get("K"), Some("override"));
    }

    #[test]
    fn keys_compare_case_insensitively() {
        let env = EffectiveEnvironment::merge(
            &layer(&[("Path", "/usr/bin")]),
            None,
            Some(&layer(&[("PATH", "/override")])),
            None,
        )
        .unwrap();
        assert_eq!(env.get("path"), Some("/override"));
        assert_eq!(env.len(), 1);
        // The last writer's casing is what the subprocess sees.
        assert!(env.to_map().contains_key("PATH"));
    }

    #[test]
    fn empty_declared_key_is_rejected() {
        let err = EffectiveEnvironment::merge(
            &layer(&[]),
            Some(&layer(&[("", "x")])),
            None,
            None,
        )
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::EnvironmentInvalidKey);
    }
}
