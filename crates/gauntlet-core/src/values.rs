//! Parameter type system and value coercion.
//!
//! Values arrive either as JSON literals (manifest defaults, node inputs,
//! request overrides) or as environment-variable strings (EnvRef indirection).
//! Both converge on [`TypedValue`], which is what snapshots serialise and what
//! the argument-vector renderer consumes.

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// Scalar parameter kinds. `path`, `file`, and `folder` are strings at this
/// layer; the runner applies their containment/existence checks later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Int,
    Double,
    String,
    Boolean,
    Path,
    File,
    Folder,
    Enum,
    Json,
}

impl ScalarKind {
    fn as_str(&self) -> &'static str {
        match self {
            ScalarKind::Int => "int",
            ScalarKind::Double => "double",
            ScalarKind::String => "string",
            ScalarKind::Boolean => "boolean",
            ScalarKind::Path => "path",
            ScalarKind::File => "file",
            ScalarKind::Folder => "folder",
            ScalarKind::Enum => "enum",
            ScalarKind::Json => "json",
        }
    }

    fn parse(s: &str) -> Option<ScalarKind> {
        Some(match s {
            "int" => ScalarKind::Int,
            "double" => ScalarKind::Double,
            "string" => ScalarKind::String,
            "boolean" => ScalarKind::Boolean,
            "path" => ScalarKind::Path,
            "file" => ScalarKind::File,
            "folder" => ScalarKind::Folder,
            "enum" => ScalarKind::Enum,
            "json" => ScalarKind::Json,
            _ => return None,
        })
    }
}

/// Declared parameter type: a scalar kind plus an optional `[]` array suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ParamType {
    pub kind: ScalarKind,
    pub array: bool,
}

impl ParamType {
    pub fn scalar(kind: ScalarKind) -> Self {
        Self { kind, array: false }
    }

    pub fn array(kind: ScalarKind) -> Self {
        Self { kind, array: true }
    }

    pub fn is_pathlike(&self) -> bool {
        matches!(
            self.kind,
            ScalarKind::Path | ScalarKind::File | ScalarKind::Folder
        )
    }
}

impl std::fmt::Display for ParamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.array {
            write!(f, "{}[]", self.kind.as_str())
        } else {
            f.write_str(self.kind.as_str())
        }
    }
}

impl TryFrom<String> for ParamType {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        let (base, array) = match s.strip_suffix("[]") {
            Some(base) => (base, true),
            None => (s.as_str(), false),
        };
        ScalarKind::parse(base)
            .map(|kind| ParamType { kind, array })
            .ok_or_else(|| format!("unknown parameter type '{s}'"))
    }
}

impl From<ParamType> for String {
    fn from(t: ParamType) -> String {
        t.to_string()
    }
}

/// A resolved, typed input value. Serialises to its natural JSON form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TypedValue {
    Null,
    Bool(bool),
    Int(i32),
    Double(f64),
    Str(String),
    Array(Vec<TypedValue>),
    Json(Json),
}

impl TypedValue {
    pub fn is_null(&self) -> bool {
        matches!(self, TypedValue::Null)
    }

    pub fn to_json(&self) -> Json {
        serde_json::to_value(self).unwrap_or(Json::Null)
    }

    /// Token form used on the subprocess argument vector. Numbers use
    /// invariant formatting; `json` values are minified.
    pub fn command_token(&self) -> String {
        match self {
            TypedValue::Null => String::new(),
            TypedValue::Bool(b) => b.to_string(),
            TypedValue::Int(i) => i.to_string(),
            TypedValue::Double(d) => format_double(*d),
            TypedValue::Str(s) => s.clone(),
            TypedValue::Array(_) | TypedValue::Json(_) => {
                serde_json::to_string(&self.to_json()).unwrap_or_default()
            }
        }
    }

    /// Every literal string form of this value, for redaction matching.
    pub fn literal_strings(&self, out: &mut Vec<String>) {
        match self {
            TypedValue::Null => {}
            TypedValue::Array(items) => {
                for item in items {
                    item.literal_strings(out);
                }
            }
            other => {
                let token = other.command_token();
                if !token.is_empty() {
                    out.push(token);
                }
            }
        }
    }
}

fn format_double(d: f64) -> String {
    // f64 Display is locale-independent in Rust; keep it as-is.
    let mut s = d.to_string();
    if !s.contains('.') && !s.contains('e') && !s.contains("inf") && !s.contains("NaN") {
        s.push_str(".0");
    }
    s
}

/// Coerce a JSON literal to `ty`. JSON kinds must match, with two widenings:
/// string literals parse to `int`/`double`, and `1`/`0` are accepted for
/// `boolean`. `null` is accepted for every type (required-ness is enforced
/// later by the input resolver).
pub fn coerce_json(ty: ParamType, value: &Json) -> Result<TypedValue, String> {
    if value.is_null() {
        return Ok(TypedValue::Null);
    }
    if ty.array {
        let items = value
            .as_array()
            .ok_or_else(|| format!("expected an array of {}, got {}", ty.kind.as_str(), kind_of(value)))?;
        let mut out = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            let coerced = coerce_scalar_json(ty.kind, item)
                .map_err(|e| format!("element {i}: {e}"))?;
            out.push(coerced);
        }
        Ok(TypedValue::Array(out))
    } else {
        coerce_scalar_json(ty.kind, value)
    }
}

fn coerce_scalar_json(kind: ScalarKind, value: &Json) -> Result<TypedValue, String> {
    match kind {
        ScalarKind::Int => {
            if let Some(n) = value.as_i64() {
                i32::try_from(n)
                    .map(TypedValue::Int)
                    .map_err(|_| format!("{n} is out of range for int"))
            } else if let Some(s) = value.as_str() {
                parse_int(s)
            } else {
                Err(format!("expected int, got {}", kind_of(value)))
            }
        }
        ScalarKind::Double => {
            if let Some(n) = value.as_f64() {
                Ok(TypedValue::Double(n))
            } else if let Some(s) = value.as_str() {
                parse_double(s)
            } else {
                Err(format!("expected double, got {}", kind_of(value)))
            }
        }
        ScalarKind::Boolean => {
            if let Some(b) = value.as_bool() {
                Ok(TypedValue::Bool(b))
            } else if let Some(n) = value.as_i64() {
                match n {
                    0 => Ok(TypedValue::Bool(false)),
                    1 => Ok(TypedValue::Bool(true)),
                    _ => Err(format!("{n} is not a boolean (only 0 and 1 are)")),
                }
            } else {
                Err(format!("expected boolean, got {}", kind_of(value)))
            }
        }
        ScalarKind::String
        | ScalarKind::Path
        | ScalarKind::File
        | ScalarKind::Folder
        | ScalarKind::Enum => value
            .as_str()
            .map(|s| TypedValue::Str(s.to_string()))
            .ok_or_else(|| format!("expected {}, got {}", kind.as_str(), kind_of(value))),
        ScalarKind::Json => Ok(TypedValue::Json(value.clone())),
    }
}

/// Coerce an environment-variable string to `ty`. Numbers parse with invariant
/// rules, booleans accept `true|false|1|0` case-insensitively, arrays require
/// a JSON-array literal.
pub fn coerce_env_str(ty: ParamType, raw: &str) -> Result<TypedValue, String> {
    if ty.array {
        let parsed: Json = serde_json::from_str(raw)
            .map_err(|e| format!("array values require a JSON array literal: {e}"))?;
        if !parsed.is_array() {
            return Err(format!(
                "array values require a JSON array literal, got {}",
                kind_of(&parsed)
            ));
        }
        return coerce_json(ty, &parsed);
    }
    match ty.kind {
        ScalarKind::Int => parse_int(raw),
        ScalarKind::Double => parse_double(raw),
        ScalarKind::Boolean => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(TypedValue::Bool(true)),
            "false" | "0" => Ok(TypedValue::Bool(false)),
            other => Err(format!("'{other}' is not a boolean")),
        },
        ScalarKind::String
        | ScalarKind::Path
        | ScalarKind::File
        | ScalarKind::Folder
        | ScalarKind::Enum => Ok(TypedValue::Str(raw.to_string())),
        ScalarKind::Json => serde_json::from_str(raw)
            .map(TypedValue::Json)
            .map_err(|e| format!("invalid JSON: {e}")),
    }
}

fn parse_int(s: &str) -> Result<TypedValue, String> {
    s.trim()
        .parse::<i32>()
        .map(TypedValue::Int)
        .map_err(|_| format!("'{s}' is not a valid int"))
}

fn parse_double(s: &str) -> Result<TypedValue, String> {
    s.trim()
        .parse::<f64>()
        .map(TypedValue::Double)
        .map_err(|_| format!("'{s}' is not a valid double"))
}

fn kind_of(value: &Json) -> &'static str {
    match value {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}
