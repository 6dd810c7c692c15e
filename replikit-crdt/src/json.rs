//! JSON forms of the CRDT variants.
//!
//! Each variant maps to a wire struct whose field order is the serialized
//! field order. Payload (`value`) is kept apart from reconciliation metadata
//! (`_metadata`, or `metadata` for sequences).

use crate::{CrdtError, CrdtResult};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Conversion between a CRDT state and its JSON form.
pub trait JsonCodec: Sized {
    /// The serde shape of the JSON form.
    type Wire: Serialize + DeserializeOwned;

    /// The `_type` this form answers to, or `None` if the form is detected
    /// by shape.
    const WIRE_TYPE: Option<&'static str>;

    /// Builds the JSON form of this state.
    fn to_wire(&self) -> Self::Wire;

    /// Rebuilds a state from its JSON form, validating metadata.
    fn from_wire(wire: Self::Wire) -> CrdtResult<Self>;

    /// Encodes this state as a JSON string.
    fn to_json(&self) -> CrdtResult<String> {
        Ok(serde_json::to_string(&self.to_wire())?)
    }

    /// Decodes a state from a JSON string.
    ///
    /// A `_type` naming another variant is a [`CrdtError::TypeMismatch`],
    /// whatever the rest of the form looks like.
    fn from_json(json: &str) -> CrdtResult<Self> {
        let value: Value =
            serde_json::from_str(json).map_err(|e| CrdtError::Malformed(e.to_string()))?;
        if let (Some(expected), Some(found)) = (Self::WIRE_TYPE, value.get("_type")) {
            let found = found
                .as_str()
                .ok_or_else(|| CrdtError::Malformed(format!("_type is not a string: {found}")))?;
            expect_type(found, expected)?;
        }
        let wire = serde_json::from_value(value).map_err(|e| CrdtError::Malformed(e.to_string()))?;
        Self::from_wire(wire)
    }
}

/// Rejects a JSON form whose `_type` names another variant.
pub(crate) fn expect_type(found: &str, expected: &'static str) -> CrdtResult<()> {
    if found == expected {
        Ok(())
    } else {
        Err(CrdtError::TypeMismatch {
            expected,
            found: found.to_string(),
        })
    }
}
