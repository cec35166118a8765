//! `id@version` identity grammar.

use crate::errors::{EngineError, ErrorKind};
use std::fmt;

/// Case-sensitive `id@version` pair naming a test case, suite, or plan.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Identity {
    id: String,
    version: String,
}

impl Identity {
    /// Parse `id@version`. Surrounding whitespace is trimmed; internal
    /// whitespace, a missing or repeated `@`, an id outside
    /// `[A-Za-z0-9._-]+`, or an empty version are rejected.
    pub fn parse(s: &str) -> Result<Identity, EngineError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(EngineError::identity_invalid("identity is empty"));
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(EngineError::identity_invalid(format!(
                "identity '{trimmed}' contains whitespace"
            )));
        }
        let mut parts = trimmed.split('@');
        let (id, version) = match (parts.next(), parts.next(), parts.next()) {
            (Some(id), Some(version), None) => (id, version),
            _ => {
                return Err(EngineError::identity_invalid(format!(
                    "identity '{trimmed}' must contain exactly one '@'"
                )))
            }
        };
        if id.is_empty() || !id.chars().all(Self::is_id_char) {
            return Err(EngineError::identity_invalid(format!(
                "id '{id}' must match [A-Za-z0-9._-]+"
            )));
        }
        if version.is_empty() {
            return Err(EngineError::identity_invalid(format!(
                "identity '{trimmed}' has an empty version"
            )));
        }
        Ok(Identity {
            id: id.to_string(),
            version: version.to_string(),
        })
    }

    fn is_id_char(c: char) -> bool {
        c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Build from already-validated manifest fields.
    pub fn from_fields(id: &str, version: &str) -> Result<Identity, EngineError> {
        let candidate = format!("{id}@{version}");
        Identity::parse(&candidate).map_err(|e| {
            EngineError::new(ErrorKind::IdentityInvalid, e.message)
        })
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.version)
    }
}
