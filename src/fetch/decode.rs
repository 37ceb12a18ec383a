//! JSON decoding with a single-byte charset fallback.
//!
//! The second hop of the AEMET API serves `ISO-8859-15` bodies while
//! advertising nothing useful, so station names like `CÁCERES` arrive as
//! invalid UTF-8. Latin-1 maps every byte to a code point, which is close
//! enough for the accented letters that appear in practice.

use serde_json::Value;

/// Parses `bytes` as JSON, retrying once with the bytes read as Latin-1.
///
/// On double failure the error from the fallback attempt is returned.
pub fn decode_json(bytes: &[u8]) -> Result<Value, serde_json::Error> {
    match serde_json::from_slice(bytes) {
        Ok(value) => Ok(value),
        Err(_) => serde_json::from_str(&latin1_to_string(bytes)),
    }
}

pub fn latin1_to_string(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}
