//! Scalar values stored in the keyed maps.
//!
//! A map key can hold one independent value per declared type, so `"x"` as a
//! boolean and `"x"` as a string never conflict. In memory the type is an
//! enum key; only the JSON form spells it as a `%TYPE` suffix on the key.

use crate::{CrdtError, CrdtResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The declared type of a map value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ValueKind {
    Boolean,
    Double,
    Integer,
    String,
}

impl ValueKind {
    /// All kinds, in key order.
    pub const ALL: [ValueKind; 4] = [
        ValueKind::Boolean,
        ValueKind::Double,
        ValueKind::Integer,
        ValueKind::String,
    ];

    /// Returns the suffix spelling used in JSON keys.
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            ValueKind::Boolean => "BOOLEAN",
            ValueKind::Double => "DOUBLE",
            ValueKind::Integer => "INTEGER",
            ValueKind::String => "STRING",
        }
    }

    fn from_suffix(suffix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.suffix() == suffix)
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// A value of one of the four declared map types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Boolean(bool),
    Integer(i64),
    Double(f64),
    String(String),
}

impl Scalar {
    /// Returns the declared type of this value.
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            Scalar::Boolean(_) => ValueKind::Boolean,
            Scalar::Double(_) => ValueKind::Double,
            Scalar::Integer(_) => ValueKind::Integer,
            Scalar::String(_) => ValueKind::String,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Scalar::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Double(d) => Some(*d),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::Integer(i) => Some(*i),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::String(s) => Some(s),
            _ => None,
        }
    }

    pub(crate) fn to_json_value(&self) -> serde_json::Value {
        match self {
            Scalar::Boolean(b) => serde_json::Value::Bool(*b),
            Scalar::Double(d) if d.is_finite() => serde_json::Value::from(*d),
            Scalar::Double(d) => serde_json::Value::String(non_finite_name(*d).to_string()),
            Scalar::Integer(i) => serde_json::Value::from(*i),
            Scalar::String(s) => serde_json::Value::String(s.clone()),
        }
    }

    /// Decodes a JSON value whose declared type is already known.
    pub(crate) fn from_json_value(kind: ValueKind, value: &serde_json::Value) -> CrdtResult<Self> {
        let scalar = match kind {
            ValueKind::Boolean => value.as_bool().map(Scalar::Boolean),
            ValueKind::Double => value
                .as_f64()
                .or_else(|| value.as_str().and_then(non_finite_from_name))
                .map(Scalar::Double),
            ValueKind::Integer => value.as_i64().map(Scalar::Integer),
            ValueKind::String => value.as_str().map(|s| Scalar::String(s.to_string())),
        };
        scalar.ok_or_else(|| CrdtError::Malformed(format!("expected {kind} value, found {value}")))
    }
}

/// JSON numbers cannot hold NaN or the infinities, so doubles spell them
/// as strings.
fn non_finite_name(d: f64) -> &'static str {
    if d.is_nan() {
        "NaN"
    } else if d > 0.0 {
        "Infinity"
    } else {
        "-Infinity"
    }
}

fn non_finite_from_name(name: &str) -> Option<f64> {
    match name {
        "NaN" => Some(f64::NAN),
        "Infinity" => Some(f64::INFINITY),
        "-Infinity" => Some(f64::NEG_INFINITY),
        _ => None,
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Boolean(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Double(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Integer(value)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::String(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::String(value)
    }
}

/// Spells `(key, kind)` as the JSON key `key%KIND`.
pub(crate) fn encode_key(key: &str, kind: ValueKind) -> String {
    format!("{key}%{}", kind.suffix())
}

/// Splits a JSON key `key%KIND` back into its parts.
pub(crate) fn decode_key(encoded: &str) -> CrdtResult<(String, ValueKind)> {
    encoded
        .rsplit_once('%')
        .and_then(|(key, suffix)| ValueKind::from_suffix(suffix).map(|kind| (key.to_string(), kind)))
        .ok_or_else(|| CrdtError::Malformed(format!("key without type suffix: {encoded}")))
}
