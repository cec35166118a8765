//! Environment-variable indirection for input values.
//!
//! A JSON object carrying a `$env` property is an EnvRef; every other shape
//! is a literal. The schema is strict: only `$env`, `default`, `required`,
//! and `secret` are allowed.

use crate::environment::EffectiveEnvironment;
use crate::values::{coerce_env_str, coerce_json, ParamType, TypedValue};
use serde::Deserialize;
use serde_json::Value as Json;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvRef {
    #[serde(rename = "$env")]
    pub env: String,
    #[serde(default)]
    pub default: Option<Json>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub secret: bool,
}

impl EnvRef {
    /// True when `value` is EnvRef-shaped (an object with `$env`).
    pub fn detect(value: &Json) -> bool {
        value
            .as_object()
            .map(|obj| obj.contains_key("$env"))
            .unwrap_or(false)
    }

    /// Parse an EnvRef-shaped value, rejecting unknown properties.
    pub fn parse(value: &Json) -> Result<EnvRef, String> {
        let env_ref: EnvRef = serde_json::from_value(value.clone())
            .map_err(|e| format!("invalid $env reference: {e}"))?;
        if env_ref.env.is_empty() {
            return Err("$env must name a non-empty environment key".to_string());
        }
        Ok(env_ref)
    }

    /// Resolve against the effective environment, coercing to `ty`.
    ///
    /// A missing or empty variable falls back to `default` when present,
    /// fails when `required`, and resolves to null otherwise.
    pub fn resolve(
        &self,
        ty: ParamType,
        env: &EffectiveEnvironment,
    ) -> Result<TypedValue, String> {
        match env.get(&self.env).filter(|v| !v.is_empty()) {
            Some(raw) => coerce_env_str(ty, raw)
                .map_err(|e| format!("variable '{}': {e}", self.env)),
            None => {
                if let Some(default) = &self.default {
                    return coerce_json(ty, default)
                        .map_err(|e| format!("default for '{}': {e}", self.env));
                }
                if self.required {
                    return Err(format!(
                        "required environment variable '{}' is not set",
                        self.env
                    ));
                }
                Ok(TypedValue::Null)
            }
        }
    }
}
