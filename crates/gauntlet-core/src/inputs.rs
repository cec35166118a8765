//! Effective-input resolution.
//!
//! Layers merge as: parameter defaults, then suite-node inputs, then request
//! overrides. Values may be literals or EnvRef indirections; the result is an
//! immutable, typed snapshot plus a redacted view for artifacts.

use crate::envref::EnvRef;
use crate::environment::EffectiveEnvironment;
use crate::errors::{EngineError, ErrorKind};
use crate::manifest::{CaseManifest, ParameterDef};
use crate::values::{coerce_json, ScalarKind, TypedValue};
use serde_json::Value as Json;
use std::collections::{BTreeMap, BTreeSet};

pub const REDACTED: &str = "***";

/// Resolved inputs for one case run.
#[derive(Debug, Clone, Default)]
pub struct ResolvedInputs {
    pub effective: BTreeMap<String, TypedValue>,
    pub redacted: BTreeMap<String, TypedValue>,
    pub secret_inputs: BTreeSet<String>,
    /// Raw pre-resolution values, name-sorted, for the audit snapshot.
    pub templates: BTreeMap<String, Json>,
}

impl ResolvedInputs {
    /// Original string forms of every secret value, for stream redaction.
    pub fn secret_literals(&self) -> Vec<String> {
        let mut out = Vec::new();
        for name in &self.secret_inputs {
            if let Some(value) = self.effective.get(name) {
                value.literal_strings(&mut out);
            }
        }
        out
    }
}

/// Resolve effective inputs for a case. `node_id` is carried into EnvRef
/// failure payloads when the case runs as a suite node.
pub fn resolve(
    manifest: &CaseManifest,
    node_inputs: Option<&BTreeMap<String, Json>>,
    override_inputs: Option<&BTreeMap<String, Json>>,
    env: &EffectiveEnvironment,
    node_id: Option<&str>,
) -> Result<ResolvedInputs, EngineError> {
    // 1. Seed with declared defaults, then merge the two layers over it.
    let mut merged: BTreeMap<String, Json> = BTreeMap::new();
    for p in &manifest.parameters {
        if let Some(default) = &p.default {
            merged.insert(p.name.clone(), default.clone());
        }
    }
    for layer in [node_inputs, override_inputs].into_iter().flatten() {
        for (name, value) in layer {
            if manifest.parameter(name).is_none() {
                return Err(EngineError::new(
                    ErrorKind::InputsUnknown,
                    format!(
                        "'{name}' is not a parameter of {}",
                        manifest.identity
                    ),
                )
                .with_parameter(name.clone()));
            }
            merged.insert(name.clone(), value.clone());
        }
    }

    let templates = merged.clone();

    // 2. Resolve each entry: EnvRef indirection or literal coercion.
    let mut effective = BTreeMap::new();
    let mut secret_inputs = BTreeSet::new();
    for (name, raw) in &merged {
        let def = manifest
            .parameter(name)
            .expect("merged keys are validated above");
        let value = if EnvRef::detect(raw) {
            let env_ref = EnvRef::parse(raw).map_err(|e| {
                type_invalid(def, e).with_node_id_opt(node_id)
            })?;
            if env_ref.secret {
                secret_inputs.insert(name.clone());
            }
            env_ref.resolve(def.ty, env).map_err(|e| {
                let mut err = EngineError::new(ErrorKind::EnvRefResolveFailed, e)
                    .with_env(env_ref.env.clone())
                    .with_parameter(name.clone());
                if let Some(n) = node_id {
                    err = err.with_node_id(n);
                }
                err
            })?
        } else {
            coerce_json(def.ty, raw)
                .map_err(|e| type_invalid(def, e).with_node_id_opt(node_id))?
        };
        effective.insert(name.clone(), value);
    }

    // 3. Enum membership over the resolved values.
    for p in &manifest.parameters {
        if p.ty.kind != ScalarKind::Enum {
            continue;
        }
        let Some(value) = effective.get(&p.name) else {
            continue;
        };
        for s in enum_members(value) {
            if !p.allows_enum_value(&s) {
                return Err(EngineError::new(
                    ErrorKind::InputsEnumInvalid,
                    format!("'{s}' is not one of {}'s enumValues", p.name),
                )
                .with_parameter(p.name.clone()));
            }
        }
    }

    // 4. Required parameters must have resolved to a non-null value.
    for p in &manifest.parameters {
        if !p.required {
            continue;
        }
        let missing = effective
            .get(&p.name)
            .map(TypedValue::is_null)
            .unwrap_or(true);
        if missing {
            return Err(EngineError::new(
                ErrorKind::InputsRequiredMissing,
                format!("required parameter '{}' has no value", p.name),
            )
            .with_parameter(p.name.clone()));
        }
    }

    // 5. Redacted view: secrets become the literal "***".
    let redacted = effective
        .iter()
        .map(|(name, value)| {
            let shown = if secret_inputs.contains(name) {
                TypedValue::Str(REDACTED.to_string())
            } else {
                value.clone()
            };
            (name.clone(), shown)
        })
        .collect();

    Ok(ResolvedInputs {
        effective,
        redacted,
        secret_inputs,
        templates,
    })
}

fn type_invalid(def: &ParameterDef, detail: String) -> EngineError {
    EngineError::new(
        ErrorKind::InputsTypeInvalid,
        format!("parameter '{}' ({}): {detail}", def.name, def.ty),
    )
    .with_parameter(def.name.clone())
}

fn enum_members(value: &TypedValue) -> Vec<String> {
    match value {
        TypedValue::Str(s) => vec![s.clone()],
        TypedValue::Array(items) => items.iter().flat_map(enum_members).collect(),
        _ => Vec::new(),
    }
}

trait WithNodeIdOpt {
    fn with_node_id_opt(self, node_id: Option<&str>) -> Self;
}

impl WithNodeIdOpt for EngineError {
    fn with_node_id_opt(self, node_id: Option<&str>) -> Self {
        match node_id {
            Some(n) => self.with_node_id(n),
            None => self,
        }
    }
}
