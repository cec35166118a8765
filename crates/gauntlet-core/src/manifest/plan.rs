//! Plan manifest (`plan.manifest.json`).

use super::field_err;
use crate::errors::{EngineError, ErrorKind};
use crate::identity::Identity;
use serde::Deserialize;
use serde_json::Value as Json;
use std::collections::BTreeMap;
use std::path::Path;

/// Validated plan manifest: an ordered list of suite identities plus an
/// optional environment layer.
#[derive(Debug, Clone)]
pub struct PlanManifest {
    pub identity: Identity,
    pub suites: Vec<Identity>,
    pub env: Option<BTreeMap<String, String>>,
}

impl PlanManifest {
    pub fn from_raw(path: &Path, raw: &Json) -> Result<PlanManifest, EngineError> {
        let doc: RawPlan = serde_json::from_value(raw.clone())
            .map_err(|e| field_err(path, "", e.to_string()))?;

        let identity = Identity::from_fields(&doc.id, &doc.version)
            .map_err(|e| e.with_path(path.display().to_string()))?;

        let mut suites = Vec::with_capacity(doc.suites.len());
        for s in &doc.suites {
            let suite_id = Identity::parse(s).map_err(|e| {
                EngineError::new(
                    ErrorKind::PlanSuiteRefInvalid,
                    format!("suite ref '{s}': {}", e.message),
                )
                .with_path(path.display().to_string())
            })?;
            suites.push(suite_id);
        }

        // The environment object is strict: `env` is the only allowed key.
        let env = match doc.environment {
            None | Some(Json::Null) => None,
            Some(Json::Object(obj)) => {
                for key in obj.keys() {
                    if key != "env" {
                        return Err(EngineError::new(
                            ErrorKind::PlanEnvironmentInvalid,
                            format!("unexpected property '{key}' in plan environment"),
                        )
                        .with_path(path.display().to_string()));
                    }
                }
                match obj.get("env") {
                    None | Some(Json::Null) => None,
                    Some(env) => {
                        let map: BTreeMap<String, String> =
                            serde_json::from_value(env.clone()).map_err(|e| {
                                EngineError::new(
                                    ErrorKind::PlanEnvironmentInvalid,
                                    format!("env must map string keys to string values: {e}"),
                                )
                                .with_path(path.display().to_string())
                            })?;
                        if map.keys().any(|k| k.is_empty()) {
                            return Err(EngineError::new(
                                ErrorKind::PlanEnvironmentInvalid,
                                "environment keys must be non-empty",
                            )
                            .with_path(path.display().to_string()));
                        }
                        Some(map)
                    }
                }
            }
            Some(other) => {
                return Err(EngineError::new(
                    ErrorKind::PlanEnvironmentInvalid,
                    format!(
                        "environment must be an object, got {}",
                        match other {
                            Json::Array(_) => "array",
                            Json::String(_) => "string",
                            Json::Number(_) => "number",
                            Json::Bool(_) => "boolean",
                            _ => "null",
                        }
                    ),
                )
                .with_path(path.display().to_string()))
            }
        };

        Ok(PlanManifest {
            identity,
            suites,
            env,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPlan {
    id: String,
    version: String,
    #[serde(default)]
    suites: Vec<String>,
    #[serde(default)]
    environment: Option<Json>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(raw: Json) -> Result<PlanManifest, EngineError> {
        PlanManifest::from_raw(Path::new("plan.manifest.json"), &raw)
    }

    #[test]
    fn parses_suite_refs_in_order() {
        let m = parse(json!({
            "id": "nightly", "version": "1",
            "suites": ["smoke@2.0", "full@1.1"]
        }))
        .unwrap();
        assert_eq!(m.suites[0].to_string(), "smoke@2.0");
        assert_eq!(m.suites[1].to_string(), "full@1.1");
    }

    #[test]
    fn invalid_suite_ref_is_rejected() {
        let err = parse(json!({
            "id": "p", "version": "1",
            "suites": ["not an identity"]
        }))
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::PlanSuiteRefInvalid);
    }

    #[test]
    fn environment_is_strict() {
        let err = parse(json!({
            "id": "p", "version": "1",
            "suites": [],
            "environment": {"env": {"K": "V"}, "workingDir": "x"}
        }))
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::PlanEnvironmentInvalid);
        assert!(err.message.contains("workingDir"));
    }

    #[test]
    fn env_only_environment_is_accepted() {
        let m = parse(json!({
            "id": "p", "version": "1",
            "suites": [],
            "environment": {"env": {"STAGE": "nightly"}}
        }))
        .unwrap();
        assert_eq!(m.env.unwrap().get("STAGE").unwrap(), "nightly");
    }
}
