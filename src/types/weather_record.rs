//! Defines the daily climatological record returned by the AEMET
//! `diarios/datos` endpoint.

use crate::types::indicativo::Indicativo;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One day of climatological values for one station.
///
/// The routing keys `fecha` and `indicativo` are optional because the remote
/// payload is not validated: records missing either are dropped before
/// persistence. All measurement fields (`tmed`, `prec`, `tmin`, ...) are
/// passed through as-is.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct WeatherRecord {
    /// The calendar date of the observation, `YYYY-MM-DD`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fecha: Option<String>,
    /// The AEMET station code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indicativo: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl WeatherRecord {
    pub fn date(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(self.fecha.as_deref()?, "%Y-%m-%d").ok()
    }

    pub fn station_code(&self) -> Option<Indicativo> {
        self.indicativo.as_deref()?.parse().ok()
    }

    /// Both routing keys, or `None` if the record cannot be archived.
    pub fn routing_key(&self) -> Option<(NaiveDate, Indicativo)> {
        Some((self.date()?, self.station_code()?))
    }
}
