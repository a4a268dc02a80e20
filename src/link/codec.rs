use std::fmt::Display;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One orientation of the tracker, as reported by the orientation characteristic. Only a few
/// values correspond to physical sides, the rest are still valid faces without an activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Face(pub u8);

impl Display for Face {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Expected a single byte payload, got {0} bytes")]
    MalformedPayload(usize),
}

fn single_byte(payload: &[u8]) -> Result<u8, DecodeError> {
    match payload {
        [value] => Ok(*value),
        _ => Err(DecodeError::MalformedPayload(payload.len())),
    }
}

pub fn decode(payload: &[u8]) -> Result<Face, DecodeError> {
    single_byte(payload).map(Face)
}

/// Battery level in percent. Informational only.
pub fn decode_battery(payload: &[u8]) -> Result<u8, DecodeError> {
    single_byte(payload)
}
