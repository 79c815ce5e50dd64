//! Field codecs for the comma-separated frame payload.
//!
//! Numbers are plain decimal text. Floats tolerate surrounding whitespace;
//! integers do not.

use crate::error::{Result, WireError};

// ---------------------------------------------------------------------------
// Splitting
// ---------------------------------------------------------------------------

/// Split frame content on `,`, dropping trailing empty fields.
///
/// `"HIT,"` yields one field, `","` yields none, and the empty string yields a
/// single empty field. Sensor firmware pads some frames with trailing commas,
/// and field counts are taken after the padding is removed.
pub fn split_fields(content: &str) -> Vec<&str> {
    if content.is_empty() {
        return vec![""];
    }
    let mut fields: Vec<&str> = content.split(',').collect();
    while fields.last().is_some_and(|f| f.is_empty()) {
        fields.pop();
    }
    fields
}

// ---------------------------------------------------------------------------
// Read helpers
// ---------------------------------------------------------------------------

/// Require at least `need` fields (tag included).
pub fn check_len(fields: &[&str], need: usize, msg_type: &'static str) -> Result<()> {
    if fields.len() < need {
        Err(WireError::too_few_fields(msg_type, need, fields.len()))
    } else {
        Ok(())
    }
}

/// Read a text field verbatim.
pub fn read_str(fields: &[&str], index: usize) -> String {
    fields.get(index).copied().unwrap_or_default().to_string()
}

/// Read a decimal floating-point field. `inf`, `NaN` and other non-finite
/// spellings are rejected.
pub fn read_f64(fields: &[&str], index: usize, msg_type: &'static str, field: &'static str) -> Result<f64> {
    let raw = fields.get(index).copied().unwrap_or_default();
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| WireError::invalid_number(msg_type, field, raw))
}

/// Read a signed 64-bit decimal integer field.
pub fn read_i64(fields: &[&str], index: usize, msg_type: &'static str, field: &'static str) -> Result<i64> {
    let raw = fields.get(index).copied().unwrap_or_default();
    raw.parse::<i64>()
        .map_err(|_| WireError::invalid_number(msg_type, field, raw))
}

/// Read a signed 32-bit decimal integer field.
pub fn read_i32(fields: &[&str], index: usize, msg_type: &'static str, field: &'static str) -> Result<i32> {
    let raw = fields.get(index).copied().unwrap_or_default();
    raw.parse::<i32>()
        .map_err(|_| WireError::invalid_number(msg_type, field, raw))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
