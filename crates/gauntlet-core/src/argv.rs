//! Argument-vector rendering for the script subprocess.
//!
//! Parameters render in manifest declaration order. Null values are omitted
//! entirely. Booleans render as a single colon-bound token (`-flag:true`) so
//! the script host binds them as booleans rather than positional strings;
//! scalars render as `-name value`; arrays render as `-name v1 v2 …`.

use crate::inputs::ResolvedInputs;
use crate::manifest::CaseManifest;
use crate::values::TypedValue;

pub fn render_argv(manifest: &CaseManifest, inputs: &ResolvedInputs) -> Vec<String> {
    let mut argv = Vec::new();
    for p in &manifest.parameters {
        let Some(value) = inputs.effective.get(&p.name) else {
            continue;
        };
        match value {
            TypedValue::Null => {}
            TypedValue::Bool(b) => argv.push(format!("-{}:{}", p.name, b)),
            TypedValue::Array(items) => {
                argv.push(format!("-{}", p.name));
                for item in items {
                    argv.push(item.command_token());
                }
            }
            other => {
                argv.push(format!("-{}", p.name));
                argv.push(other.command_token());
            }
        }
    }
    argv
}

/// Names of secret inputs that end up on the command line (any non-null
/// secret does). Each one triggers an `EnvRef.SecretOnCommandLine` warning.
pub fn secrets_on_command_line(inputs: &ResolvedInputs) -> Vec<String> {
    inputs
        .secret_inputs
        .iter()
        .filter(|name| {
            inputs
                .effective
                .get(*name)
                .map(|v| !v.is_null())
                .unwrap_or(false)
        })
        .cloned()
        .collect()
}
