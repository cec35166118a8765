//! Test-case manifest (`test.manifest.json`).

use super::field_err;
use crate::envref::EnvRef;
use crate::errors::EngineError;
use crate::identity::Identity;
use crate::values::{coerce_json, ParamType, ScalarKind};
use serde::Deserialize;
use serde_json::Value as Json;
use std::collections::BTreeSet;
use std::path::Path;

pub const DEFAULT_SCRIPT: &str = "run.ps1";

/// One declared parameter of a test case.
#[derive(Debug, Clone)]
pub struct ParameterDef {
    pub name: String,
    pub ty: ParamType,
    pub required: bool,
    pub default: Option<Json>,
    pub enum_values: Option<Vec<String>>,
}

impl ParameterDef {
    /// Membership check for `enum` / `enum[]` parameters.
    pub fn allows_enum_value(&self, value: &str) -> bool {
        self.enum_values
            .as_ref()
            .map(|vals| vals.iter().any(|v| v == value))
            .unwrap_or(true)
    }
}

/// Validated test-case manifest.
#[derive(Debug, Clone)]
pub struct CaseManifest {
    pub identity: Identity,
    pub parameters: Vec<ParameterDef>,
    pub timeout_sec: Option<u32>,
    pub script: String,
}

impl CaseManifest {
    pub fn parameter(&self, name: &str) -> Option<&ParameterDef> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Validate a raw manifest document. Returns the typed model; the caller
    /// keeps the raw JSON for snapshots.
    pub fn from_raw(path: &Path, raw: &Json) -> Result<CaseManifest, EngineError> {
        let doc: RawCase = serde_json::from_value(raw.clone())
            .map_err(|e| field_err(path, "", e.to_string()))?;

        let identity = Identity::from_fields(&doc.id, &doc.version)
            .map_err(|e| e.with_path(path.display().to_string()))?;

        if let Some(t) = doc.timeout_sec {
            if t <= 0 {
                return Err(field_err(
                    path,
                    "timeoutSec",
                    format!("timeoutSec must be positive, got {t}"),
                ));
            }
        }

        let script = doc.script.unwrap_or_else(|| DEFAULT_SCRIPT.to_string());
        if script.is_empty() || Path::new(&script).is_absolute() {
            return Err(field_err(
                path,
                "script",
                "script must be a non-empty path relative to the manifest directory",
            ));
        }

        let mut seen = BTreeSet::new();
        let mut parameters = Vec::with_capacity(doc.parameters.len());
        for p in doc.parameters {
            if p.name.is_empty() {
                return Err(field_err(path, "parameters", "parameter name is empty"));
            }
            if !seen.insert(p.name.clone()) {
                return Err(field_err(
                    path,
                    "parameters",
                    format!("duplicate parameter '{}'", p.name),
                ));
            }
            let ty = ParamType::try_from(p.ty.clone())
                .map_err(|e| field_err(path, &format!("parameters.{}.type", p.name), e))?;
            if ty.kind == ScalarKind::Enum {
                let empty = p
                    .enum_values
                    .as_ref()
                    .map(|v| v.is_empty())
                    .unwrap_or(true);
                if empty {
                    return Err(field_err(
                        path,
                        &format!("parameters.{}.enumValues", p.name),
                        "enum parameters require a non-empty enumValues list",
                    ));
                }
            }
            let def = ParameterDef {
                name: p.name,
                ty,
                required: p.required,
                default: p.default,
                enum_values: p.enum_values,
            };
            validate_default(path, &def)?;
            parameters.push(def);
        }

        Ok(CaseManifest {
            identity,
            parameters,
            timeout_sec: doc.timeout_sec.map(|t| t as u32),
            script,
        })
    }
}

/// Defaults must already fit the declared type. EnvRef-shaped defaults are
/// resolved at run time and checked there instead.
fn validate_default(path: &Path, def: &ParameterDef) -> Result<(), EngineError> {
    let Some(default) = &def.default else {
        return Ok(());
    };
    if EnvRef::detect(default) {
        return Ok(());
    }
    let field = format!("parameters.{}.default", def.name);
    let value = coerce_json(def.ty, default)
        .map_err(|e| field_err(path, &field, e))?;
    if def.ty.kind == ScalarKind::Enum {
        for s in enum_strings(&value) {
            if !def.allows_enum_value(&s) {
                return Err(field_err(
                    path,
                    &field,
                    format!("'{s}' is not one of the declared enumValues"),
                ));
            }
        }
    }
    Ok(())
}

fn enum_strings(value: &crate::values::TypedValue) -> Vec<String> {
    use crate::values::TypedValue;
    match value {
        TypedValue::Str(s) => vec![s.clone()],
        TypedValue::Array(items) => items.iter().flat_map(enum_strings).collect(),
        _ => Vec::new(),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCase {
    id: String,
    version: String,
    #[serde(default)]
    parameters: Vec<RawParameter>,
    #[serde(default)]
    timeout_sec: Option<i64>,
    #[serde(default)]
    script: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawParameter {
    name: String,
    #[serde(rename = "type")]
    ty: String,
    #[serde(default)]
    required: bool,
    #[serde(default)]
    default: Option<Json>,
    #[serde(default)]
    enum_values: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use serde_json::json;

    fn parse(raw: Json) -> Result<CaseManifest, EngineError> {
        CaseManifest::from_raw(Path::new("test.manifest.json"), &raw)
    }

    #[test]
    fn minimal_manifest_defaults_the_script() {
        let m = parse(json!({"id": "demo", "version": "1.0.0"})).unwrap();
        assert_eq!(m.identity.to_string(), "demo@1.0.0");
        assert_eq!(m.script, DEFAULT_SCRIPT);
        assert!(m.parameters.is_empty());
        assert!(m.timeout_sec.is_none());
    }

    #[test]
    fn duplicate_parameter_names_are_rejected() {
        let err = parse(json!({
            "id": "demo", "version": "1",
            "parameters": [
                {"name": "a", "type": "int"},
                {"name": "a", "type": "string"}
            ]
        }))
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::ManifestInvalid);
        assert!(err.message.contains("duplicate parameter"));
    }

    #[test]
    fn enum_requires_values() {
        let err = parse(json!({
            "id": "demo", "version": "1",
            "parameters": [{"name": "mode", "type": "enum"}]
        }))
        .unwrap_err();
        assert!(err.field.unwrap().contains("enumValues"));
    }

    #[test]
    fn default_must_match_type() {
        let err = parse(json!({
            "id": "demo", "version": "1",
            "parameters": [{"name": "count", "type": "int", "default": "abc"}]
        }))
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::ManifestInvalid);
    }

    #[test]
    fn enum_default_must_be_member() {
        let err = parse(json!({
            "id": "demo", "version": "1",
            "parameters": [
                {"name": "mode", "type": "enum", "enumValues": ["fast"], "default": "slow"}
            ]
        }))
        .unwrap_err();
        assert!(err.message.contains("enumValues"));
    }

    #[test]
    fn envref_default_is_deferred() {
        let m = parse(json!({
            "id": "demo", "version": "1",
            "parameters": [
                {"name": "token", "type": "string", "default": {"$env": "TOKEN"}}
            ]
        }))
        .unwrap();
        assert!(m.parameters[0].default.is_some());
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = parse(json!({"id": "d", "version": "1", "timeoutSec": 0})).unwrap_err();
        assert!(err.message.contains("timeoutSec"));
    }

    #[test]
    fn absolute_script_is_rejected() {
        let err =
            parse(json!({"id": "d", "version": "1", "script": "/bin/run.sh"})).unwrap_err();
        assert_eq!(err.field.as_deref(), Some("script"));
    }
}
