//! Schema validation of raw reading payloads.
//!
//! The wire format is a JSON object carrying a city name, six pollutant
//! measurements and an opaque timestamp. Every field is mandatory. The
//! validator never panics on malformed input: it returns a
//! [`ValidationError`] that names every offending field, so a single bad
//! message can be dropped or dead-lettered without failing its batch.

use std::fmt;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::reading::{ParsedReading, RawMessage};

/// Every field a reading payload must carry, in wire order.
pub const READING_FIELDS: [&str; 8] = [
    "city",
    "aqi",
    "pm25",
    "pm10",
    "o3",
    "no2",
    "so2",
    "timestamp",
];

/// What is wrong with a single field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldProblem {
    Missing,
    Null,
    WrongType {
        expected: &'static str,
        found: &'static str,
    },
    /// A number that does not fit a finite 32-bit float.
    OutOfRange,
    /// An empty string in a primary-key column.
    Empty,
    /// A field outside the schema, only reported in strict mode.
    Unexpected,
}

impl fmt::Display for FieldProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldProblem::Missing => f.write_str("missing"),
            FieldProblem::Null => f.write_str("null"),
            FieldProblem::WrongType { expected, found } => {
                write!(f, "expected {expected}, found {found}")
            }
            FieldProblem::OutOfRange => f.write_str("out of range for a 32-bit float"),
            FieldProblem::Empty => f.write_str("empty string"),
            FieldProblem::Unexpected => f.write_str("not part of the reading schema"),
        }
    }
}

/// A single offending field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("'{field}' {problem}")]
pub struct FieldError {
    pub field: String,
    pub problem: FieldProblem,
}

impl FieldError {
    pub fn new(field: impl Into<String>, problem: FieldProblem) -> Self {
        Self {
            field: field.into(),
            problem,
        }
    }
}

/// Why a payload could not be turned into a [`ParsedReading`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("payload is not valid JSON: {0}")]
    Malformed(String),

    #[error("payload is a JSON {0}, expected an object")]
    NotAnObject(&'static str),

    #[error("invalid reading: {}", join_field_errors(.0))]
    Fields(Vec<FieldError>),
}

impl ValidationError {
    /// Names of the offending fields; empty when the payload itself is unusable.
    pub fn fields(&self) -> Vec<&str> {
        match self {
            ValidationError::Fields(errors) => errors.iter().map(|e| e.field.as_str()).collect(),
            _ => Vec::new(),
        }
    }
}

fn join_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parses raw payloads into readings.
#[derive(Debug, Clone, Default)]
pub struct SchemaValidator {
    reject_unknown_fields: bool,
}

impl SchemaValidator {
    /// Validator that ignores fields outside the schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validator that reports fields outside the schema as [`FieldProblem::Unexpected`].
    pub fn strict() -> Self {
        Self {
            reject_unknown_fields: true,
        }
    }

    pub fn rejects_unknown_fields(&self) -> bool {
        self.reject_unknown_fields
    }

    /// Parse one message.
    pub fn parse(&self, message: &RawMessage) -> Result<ParsedReading, ValidationError> {
        let value: Value = serde_json::from_slice(&message.payload)
            .map_err(|e| ValidationError::Malformed(e.to_string()))?;

        let object = match value {
            Value::Object(map) => map,
            other => return Err(ValidationError::NotAnObject(json_type_name(&other))),
        };

        let mut errors = Vec::new();
        let city = key_string(&object, "city", &mut errors);
        let aqi = measurement(&object, "aqi", &mut errors);
        let pm25 = measurement(&object, "pm25", &mut errors);
        let pm10 = measurement(&object, "pm10", &mut errors);
        let o3 = measurement(&object, "o3", &mut errors);
        let no2 = measurement(&object, "no2", &mut errors);
        let so2 = measurement(&object, "so2", &mut errors);
        let timestamp = key_string(&object, "timestamp", &mut errors);

        if self.reject_unknown_fields {
            for key in object.keys() {
                if !READING_FIELDS.contains(&key.as_str()) {
                    errors.push(FieldError::new(key.clone(), FieldProblem::Unexpected));
                }
            }
        }

        if let (
            true,
            Some(city),
            Some(aqi),
            Some(pm25),
            Some(pm10),
            Some(o3),
            Some(no2),
            Some(so2),
            Some(timestamp),
        ) = (
            errors.is_empty(),
            city,
            aqi,
            pm25,
            pm10,
            o3,
            no2,
            so2,
            timestamp,
        ) {
            return Ok(ParsedReading {
                city,
                aqi,
                pm25,
                pm10,
                o3,
                no2,
                so2,
                timestamp,
            });
        }

        Err(ValidationError::Fields(errors))
    }
}

/// Non-empty string used as a primary-key component.
fn key_string(
    object: &Map<String, Value>,
    field: &'static str,
    errors: &mut Vec<FieldError>,
) -> Option<String> {
    match object.get(field) {
        None => errors.push(FieldError::new(field, FieldProblem::Missing)),
        Some(Value::Null) => errors.push(FieldError::new(field, FieldProblem::Null)),
        Some(Value::String(s)) if s.is_empty() => {
            errors.push(FieldError::new(field, FieldProblem::Empty))
        }
        Some(Value::String(s)) => return Some(s.clone()),
        Some(other) => errors.push(FieldError::new(
            field,
            FieldProblem::WrongType {
                expected: "string",
                found: json_type_name(other),
            },
        )),
    }
    None
}

/// JSON number that fits a finite f32.
fn measurement(
    object: &Map<String, Value>,
    field: &'static str,
    errors: &mut Vec<FieldError>,
) -> Option<f32> {
    match object.get(field) {
        None => errors.push(FieldError::new(field, FieldProblem::Missing)),
        Some(Value::Null) => errors.push(FieldError::new(field, FieldProblem::Null)),
        Some(Value::Number(n)) => match n.as_f64().map(|v| v as f32) {
            Some(v) if v.is_finite() => return Some(v),
            _ => errors.push(FieldError::new(field, FieldProblem::OutOfRange)),
        },
        Some(other) => errors.push(FieldError::new(
            field,
            FieldProblem::WrongType {
                expected: "number",
                found: json_type_name(other),
            },
        )),
    }
    None
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
