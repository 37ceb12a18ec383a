//! Defines the station inventory payload returned by the AEMET
//! `inventarioestaciones` endpoint.

use crate::types::indicativo::Indicativo;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single station entry from the AEMET climatological station inventory.
///
/// Only the station code is needed to route the payload into the archive.
/// Everything else (name, province, coordinates, altitude, synoptic index)
/// is kept as an opaque field bag and written back to disk unchanged.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StationPayload {
    /// The AEMET station code (e.g., "3195" for Madrid Retiro).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indicativo: Option<String>,
    /// The remaining metadata fields, in the order the API sent them.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl StationPayload {
    /// Returns the validated station code, if present and well-formed.
    pub fn station_code(&self) -> Option<Indicativo> {
        self.indicativo.as_deref()?.parse().ok()
    }

    /// Convenience accessor for the station name (`nombre`).
    pub fn name(&self) -> Option<&str> {
        self.fields.get("nombre").and_then(Value::as_str)
    }
}
