//! Declarative field extraction over JSON records.
//!
//! An [`ExtractionRule`] names one output field and describes where its value
//! lives in a raw record and how to coerce it. Rules are plain data: a rule
//! table can be printed, compared and tested without running it.
//!
//! # Rule kinds
//!
//! | Kind | Reads | Produces |
//! |------|-------|----------|
//! | [`RuleKind::Direct`] | `raw[key]` | the value, `null` when absent |
//! | [`RuleKind::NestedPath`] | a key/index path | the value (optionally coerced), `null` on any gap |
//! | [`RuleKind::BoolCoerce`] | `raw[key]` | a boolean from permissive encodings |
//! | [`RuleKind::StructuredFold`] | `raw[key]` as a JSON string | a folded mapping |
//!
//! All evaluation goes through [`ExtractionRule::evaluate`], is pure, and never
//! mutates the input.

use std::fmt;

use serde_json::{Map, Value};

use crate::error::ExtractionError;

/// One step of a JSON path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

impl Segment {
    pub fn key(name: &str) -> Self {
        Segment::Key(name.to_string())
    }

    pub fn index(i: usize) -> Self {
        Segment::Index(i)
    }

    /// Parse a dotted path such as `data.productDetail.items` or
    /// `media_gallery.0`. Purely numeric parts become indices.
    pub fn parse_path(dotted: &str) -> Vec<Segment> {
        dotted
            .split('.')
            .filter(|part| !part.is_empty())
            .map(|part| match part.parse::<usize>() {
                Ok(i) => Segment::Index(i),
                Err(_) => Segment::Key(part.to_string()),
            })
            .collect()
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Key(k) => write!(f, "{}", k),
            Segment::Index(i) => write!(f, "{}", i),
        }
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

/// Walk `path` through `value`.
///
/// Before each step the current value is checked: `null`, `[]` and `{}` end
/// the walk with `null`, as does a missing key, an out-of-range index or a
/// segment that does not fit the current value's shape. The value reached
/// after the last step is returned as-is.
pub fn walk(value: &Value, path: &[Segment]) -> Value {
    let mut current = value;
    for segment in path {
        if is_blank(current) {
            return Value::Null;
        }
        let next = match (segment, current) {
            (Segment::Key(k), Value::Object(map)) => map.get(k),
            (Segment::Index(i), Value::Array(items)) => items.get(*i),
            _ => None,
        };
        match next {
            Some(v) => current = v,
            None => return Value::Null,
        }
    }
    current.clone()
}

/// Reductions over a list of nested structs.
#[derive(Debug, Clone, PartialEq)]
pub enum Fold {
    /// Flatten breadcrumb trails into one `id → label` mapping.
    ///
    /// Input: a list of breadcrumb structs, each holding an inner list under
    /// `list_key` of `{ id_key, label_key }` entries. Entries whose id is in
    /// `exclude` are skipped; later entries overwrite earlier ones.
    BreadcrumbIndex {
        list_key: String,
        id_key: String,
        label_key: String,
        exclude: Vec<String>,
    },
    /// Turn `[{ label_key, values_key: [{ value_key }] }]` into
    /// `{ label: [value, ...] }`.
    LabeledValues {
        label_key: String,
        values_key: String,
        value_key: String,
    },
}

fn scalar_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl Fold {
    /// Apply the fold to an already-structured list.
    pub fn apply(&self, key: &str, value: &Value) -> Result<Value, ExtractionError> {
        let items = match value {
            Value::Null => return Ok(Value::Null),
            Value::Array(items) => items,
            other => {
                return Err(ExtractionError::Malformed {
                    key: key.to_string(),
                    reason: format!("expected a list, got {}", type_name(other)),
                })
            }
        };

        match self {
            Fold::BreadcrumbIndex {
                list_key,
                id_key,
                label_key,
                exclude,
            } => {
                let mut out = Map::new();
                for crumb in items {
                    let trail = match crumb.get(list_key.as_str()) {
                        Some(Value::Array(trail)) => trail,
                        _ => continue,
                    };
                    for entry in trail {
                        let Some(id) = entry.get(id_key.as_str()).and_then(scalar_key) else {
                            continue;
                        };
                        if exclude.iter().any(|blocked| *blocked == id) {
                            continue;
                        }
                        let label = entry.get(label_key.as_str()).cloned().unwrap_or(Value::Null);
                        out.insert(id, label);
                    }
                }
                Ok(Value::Object(out))
            }
            Fold::LabeledValues {
                label_key,
                values_key,
                value_key,
            } => {
                let mut out = Map::new();
                for attr in items {
                    if !attr.is_object() {
                        return Err(ExtractionError::Malformed {
                            key: key.to_string(),
                            reason: format!(
                                "expected an attribute struct, got {}",
                                type_name(attr)
                            ),
                        });
                    }
                    let Some(label) = attr.get(label_key.as_str()).and_then(scalar_key) else {
                        continue;
                    };
                    let values = match attr.get(values_key.as_str()) {
                        Some(Value::Array(vs)) => vs
                            .iter()
                            .map(|v| v.get(value_key.as_str()).cloned().unwrap_or(Value::Null))
                            .collect(),
                        _ => Vec::new(),
                    };
                    out.insert(label, Value::Array(values));
                }
                Ok(Value::Object(out))
            }
        }
    }

    /// Parse a serialized JSON string and fold the result.
    pub fn apply_serialized(&self, key: &str, value: &Value) -> Result<Value, ExtractionError> {
        match value {
            Value::Null => Ok(Value::Null),
            Value::String(s) if s.trim().is_empty() => Ok(Value::Null),
            Value::String(s) => {
                let parsed: Value =
                    serde_json::from_str(s).map_err(|e| ExtractionError::Malformed {
                        key: key.to_string(),
                        reason: e.to_string(),
                    })?;
                self.apply(key, &parsed)
            }
            // Some upstream fields arrive pre-parsed.
            Value::Array(_) => self.apply(key, value),
            other => Err(ExtractionError::Malformed {
                key: key.to_string(),
                reason: format!("expected a JSON string, got {}", type_name(other)),
            }),
        }
    }
}

/// Value coercions applied after a value has been located.
#[derive(Debug, Clone, PartialEq)]
pub enum Coerce {
    /// Number or numeric string to float. Empty string is `null`.
    ToFloat,
    /// Permissive boolean, see [`to_bool`].
    ToBool,
    /// Take one part of a separated string, e.g. `"label||/url"` → `"/url"`.
    SplitPart { separator: String, index: usize },
    /// Fold an already-structured list.
    Fold(Fold),
}

impl Coerce {
    pub fn apply(&self, key: &str, value: &Value) -> Result<Value, ExtractionError> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        match self {
            Coerce::ToFloat => to_float(key, value),
            Coerce::ToBool => to_bool(key, value),
            Coerce::SplitPart { separator, index } => match value {
                Value::String(s) if s.is_empty() => Ok(value.clone()),
                Value::String(s) => Ok(s
                    .split(separator.as_str())
                    .nth(*index)
                    .map(|part| Value::String(part.to_string()))
                    .unwrap_or(Value::Null)),
                other => Err(coercion(key, "a separated string", other)),
            },
            Coerce::Fold(fold) => fold.apply(key, value),
        }
    }
}

/// Coerce to a float.
pub fn to_float(key: &str, value: &Value) -> Result<Value, ExtractionError> {
    let parsed = match value {
        Value::Null => return Ok(Value::Null),
        Value::Number(n) => n.as_f64(),
        Value::String(s) if s.trim().is_empty() => return Ok(Value::Null),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| coercion(key, "float", value))
}

/// Coerce to a boolean.
///
/// Truthy: the string `"true"`, or any non-zero integer-like value (number or
/// numeric string). Every other string or number is false. Lists and
/// mappings cannot encode a flag and are an error; `null` stays `null`.
pub fn to_bool(key: &str, value: &Value) -> Result<Value, ExtractionError> {
    let flag = match value {
        Value::Null => return Ok(Value::Null),
        Value::Bool(b) => *b,
        Value::Number(n) => integer_like(n.as_f64()).is_some_and(|i| i != 0),
        Value::String(s) => {
            let s = s.trim();
            s == "true" || integer_like(s.parse::<f64>().ok()).is_some_and(|i| i != 0)
        }
        other => return Err(coercion(key, "bool", other)),
    };
    Ok(Value::Bool(flag))
}

fn integer_like(n: Option<f64>) -> Option<i64> {
    n.filter(|f| f.is_finite() && f.fract() == 0.0)
        .map(|f| f as i64)
}

fn coercion(key: &str, target: &'static str, value: &Value) -> ExtractionError {
    ExtractionError::Coercion {
        key: key.to_string(),
        target,
        value: value.to_string(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "mapping",
    }
}

/// Where and how a rule reads its value.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleKind {
    Direct { key: String, required: bool },
    NestedPath {
        path: Vec<Segment>,
        coerce: Option<Coerce>,
    },
    BoolCoerce { key: String },
    StructuredFold { key: String, fold: Fold },
}

/// One output field of a JSON transformer.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionRule {
    pub output_key: String,
    pub kind: RuleKind,
}

impl ExtractionRule {
    /// `output = raw[key]`, `null` when absent.
    pub fn direct(key: &str) -> Self {
        Self {
            output_key: key.to_string(),
            kind: RuleKind::Direct {
                key: key.to_string(),
                required: false,
            },
        }
    }

    /// Like [`direct`](Self::direct) but absence is an error.
    pub fn required(key: &str) -> Self {
        Self {
            output_key: key.to_string(),
            kind: RuleKind::Direct {
                key: key.to_string(),
                required: true,
            },
        }
    }

    pub fn nested(output_key: &str, path: Vec<Segment>) -> Self {
        Self {
            output_key: output_key.to_string(),
            kind: RuleKind::NestedPath { path, coerce: None },
        }
    }

    pub fn nested_with(output_key: &str, path: Vec<Segment>, coerce: Coerce) -> Self {
        Self {
            output_key: output_key.to_string(),
            kind: RuleKind::NestedPath {
                path,
                coerce: Some(coerce),
            },
        }
    }

    pub fn boolean(output_key: &str, source_key: &str) -> Self {
        Self {
            output_key: output_key.to_string(),
            kind: RuleKind::BoolCoerce {
                key: source_key.to_string(),
            },
        }
    }

    pub fn fold(output_key: &str, source_key: &str, fold: Fold) -> Self {
        Self {
            output_key: output_key.to_string(),
            kind: RuleKind::StructuredFold {
                key: source_key.to_string(),
                fold,
            },
        }
    }

    /// Evaluate the rule against one raw JSON record.
    pub fn evaluate(&self, raw: &Value) -> Result<Value, ExtractionError> {
        let key = self.output_key.as_str();
        match &self.kind {
            RuleKind::Direct { key: src, required } => {
                let value = raw.get(src.as_str()).cloned().unwrap_or(Value::Null);
                if *required && value.is_null() {
                    return Err(ExtractionError::MissingField(src.clone()));
                }
                Ok(value)
            }
            RuleKind::NestedPath { path, coerce } => {
                let value = walk(raw, path);
                match coerce {
                    Some(c) => c.apply(key, &value),
                    None => Ok(value),
                }
            }
            RuleKind::BoolCoerce { key: src } => {
                to_bool(key, raw.get(src.as_str()).unwrap_or(&Value::Null))
            }
            RuleKind::StructuredFold { key: src, fold } => {
                fold.apply_serialized(key, raw.get(src.as_str()).unwrap_or(&Value::Null))
            }
        }
    }
}
