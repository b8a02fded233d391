//! Parse-and-validate boundary for model output.
//!
//! Model replies are untrusted text. [`validate`] pulls the JSON object out of
//! the reply, checks it against a static [`Shape`], canonicalises enum
//! spellings in place and only then deserializes into the typed result. Every
//! problem found is reported, not just the first one.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::fmt;

use crate::error::ValidationError;

/// Expected type of one field
#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    Text,
    /// Text that may also be `null`
    NullableText,
    Integer { min: i64, max: i64 },
    Boolean,
    /// One of the listed canonical spellings
    Enum(&'static [&'static str]),
    TextList,
    Object(&'static [Field]),
    ObjectList(&'static [Field]),
}

impl FieldKind {
    fn describe(&self) -> &'static str {
        match self {
            FieldKind::Text => "string",
            FieldKind::NullableText => "string or null",
            FieldKind::Integer { .. } => "integer",
            FieldKind::Boolean => "boolean",
            FieldKind::Enum(_) => "string",
            FieldKind::TextList => "array of strings",
            FieldKind::Object(_) => "object",
            FieldKind::ObjectList(_) => "array of objects",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

impl Field {
    pub const fn required(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: true,
        }
    }

    pub const fn optional(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: false,
        }
    }
}

/// Shape of a whole stage reply
#[derive(Debug, Clone, Copy)]
pub struct Shape {
    pub name: &'static str,
    pub fields: &'static [Field],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Problem {
    Missing,
    WrongType {
        expected: &'static str,
        found: &'static str,
    },
    OutOfRange {
        value: String,
        min: i64,
        max: i64,
    },
    NotInDomain {
        value: String,
        allowed: &'static [&'static str],
    },
    /// A stage-specific rule that holds across fields
    Rule(String),
}

/// One thing wrong with a reply, located by a JSON path such as
/// `differential[1].probability`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIssue {
    pub path: String,
    pub problem: Problem,
}

impl FieldIssue {
    pub fn new(path: impl Into<String>, problem: Problem) -> Self {
        Self {
            path: path.into(),
            problem,
        }
    }

    pub fn rule(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(path, Problem::Rule(message.into()))
    }
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.problem {
            Problem::Missing => write!(f, "{}: required field is missing", self.path),
            Problem::WrongType { expected, found } => {
                write!(f, "{}: expected {expected}, found {found}", self.path)
            }
            Problem::OutOfRange { value, min, max } => {
                write!(f, "{}: {value} is outside {min}..={max}", self.path)
            }
            Problem::NotInDomain { value, allowed } => write!(
                f,
                "{}: {value:?} is not one of {}",
                self.path,
                allowed.join(", ")
            ),
            Problem::Rule(message) => write!(f, "{}: {message}", self.path),
        }
    }
}

pub fn describe_issues(issues: &[FieldIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn key(value: &str) -> String {
    value
        .trim()
        .chars()
        .map(|c| match c {
            ' ' | '_' => '-',
            other => other.to_ascii_lowercase(),
        })
        .collect()
}

/// Find the canonical spelling of `raw` in `domain`. Case is ignored and
/// space, underscore and hyphen are interchangeable; nothing else is
/// forgiven.
pub fn canonicalize(raw: &str, domain: &'static [&'static str]) -> Option<&'static str> {
    let wanted = key(raw);
    if wanted.is_empty() {
        return None;
    }
    domain.iter().copied().find(|candidate| key(candidate) == wanted)
}

/// Pull the JSON object out of a model reply: code fences and chatter around
/// the outermost braces are ignored.
pub fn extract_json(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (start < end).then(|| &raw[start..=end])
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn check_object(
    object: &mut Map<String, Value>,
    fields: &[Field],
    prefix: &str,
    issues: &mut Vec<FieldIssue>,
) {
    // undeclared keys never reach the typed result
    object.retain(|name, _| fields.iter().any(|field| field.name == name));

    for field in fields {
        let path = if prefix.is_empty() {
            field.name.to_string()
        } else {
            format!("{prefix}.{}", field.name)
        };
        let nullable = matches!(field.kind, FieldKind::NullableText);
        let is_null = object.get(field.name).map(Value::is_null);
        match is_null {
            None => {
                if field.required {
                    issues.push(FieldIssue::new(path, Problem::Missing));
                }
            }
            Some(true) if nullable => {}
            Some(true) => {
                if field.required {
                    issues.push(FieldIssue::new(path, Problem::Missing));
                } else {
                    object.remove(field.name);
                }
            }
            Some(false) => {
                if let Some(value) = object.get_mut(field.name) {
                    check_value(value, &field.kind, &path, issues);
                }
            }
        }
    }
}

fn check_value(value: &mut Value, kind: &FieldKind, path: &str, issues: &mut Vec<FieldIssue>) {
    let wrong_type = |value: &Value| {
        FieldIssue::new(
            path,
            Problem::WrongType {
                expected: kind.describe(),
                found: type_name(value),
            },
        )
    };

    match kind {
        FieldKind::Text => {
            if !value.is_string() {
                issues.push(wrong_type(value));
            }
        }
        FieldKind::NullableText => {
            if !value.is_string() && !value.is_null() {
                issues.push(wrong_type(value));
            }
        }
        FieldKind::Boolean => {
            if !value.is_boolean() {
                issues.push(wrong_type(value));
            }
        }
        FieldKind::Integer { min, max } => {
            let integer = value
                .as_i64()
                .or_else(|| value.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64));
            match integer {
                None if value.is_number() => issues.push(FieldIssue::new(
                    path,
                    Problem::OutOfRange {
                        value: value.to_string(),
                        min: *min,
                        max: *max,
                    },
                )),
                None => issues.push(wrong_type(value)),
                Some(n) if n < *min || n > *max => issues.push(FieldIssue::new(
                    path,
                    Problem::OutOfRange {
                        value: n.to_string(),
                        min: *min,
                        max: *max,
                    },
                )),
                Some(n) => *value = Value::from(n),
            }
        }
        FieldKind::Enum(domain) => match value.as_str() {
            None => issues.push(wrong_type(value)),
            Some(raw) => match canonicalize(raw, *domain) {
                Some(canonical) => *value = Value::from(canonical),
                None => issues.push(FieldIssue::new(
                    path,
                    Problem::NotInDomain {
                        value: raw.to_string(),
                        allowed: *domain,
                    },
                )),
            },
        },
        FieldKind::TextList => match value.as_array() {
            None => issues.push(wrong_type(value)),
            Some(items) => {
                for (index, item) in items.iter().enumerate() {
                    if !item.is_string() {
                        issues.push(FieldIssue::new(
                            format!("{path}[{index}]"),
                            Problem::WrongType {
                                expected: "string",
                                found: type_name(item),
                            },
                        ));
                    }
                }
            }
        },
        FieldKind::Object(fields) => match value.as_object_mut() {
            None => issues.push(wrong_type(value)),
            Some(object) => check_object(object, fields, path, issues),
        },
        FieldKind::ObjectList(fields) => {
            if !value.is_array() {
                issues.push(wrong_type(value));
                return;
            }
            if let Some(items) = value.as_array_mut() {
                for (index, item) in items.iter_mut().enumerate() {
                    let item_path = format!("{path}[{index}]");
                    match item.as_object_mut() {
                        Some(object) => check_object(object, fields, &item_path, issues),
                        None => issues.push(FieldIssue::new(
                            item_path,
                            Problem::WrongType {
                                expected: "object",
                                found: type_name(item),
                            },
                        )),
                    }
                }
            }
        }
    }
}

/// Check `raw` against `shape` and deserialize it.
pub fn validate<T: DeserializeOwned>(raw: &str, shape: &Shape) -> Result<T, ValidationError> {
    let json = extract_json(raw).ok_or(ValidationError::NoJson)?;
    let mut value: Value =
        serde_json::from_str(json).map_err(|e| ValidationError::Malformed(e.to_string()))?;

    let mut issues = Vec::new();
    match value.as_object_mut() {
        Some(object) => check_object(object, shape.fields, "", &mut issues),
        None => {
            return Err(ValidationError::Malformed(format!(
                "{} must be a JSON object",
                shape.name
            )));
        }
    }
    if !issues.is_empty() {
        return Err(ValidationError::Fields(issues));
    }

    serde_json::from_value(value).map_err(|e| ValidationError::Malformed(e.to_string()))
}
