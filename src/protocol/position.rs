//! Position telemetry (target → APP).
//!
//! Two layouts share the `POS` tag:
//! ```text
//! POS,id,lat,lon,alt,voltage                      legacy (6 fields)
//! POS,id,lat,lon,alt,voltage,sats,hdop,altref     enhanced (9+ fields)
//! ```
//! Anything from 6 to 8 fields decodes as legacy; extra fields are ignored.

use crate::codec;
use crate::error::Result;
use crate::geo::GeoPoint;
use crate::protocol::ProtocolEvent;

const MSG: &str = "POS";
const LEGACY_FIELDS: usize = 6;
const ENHANCED_FIELDS: usize = 9;

/// Legacy position report.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Position {
    pub id: String,
    /// Degrees
    pub latitude: f64,
    /// Degrees
    pub longitude: f64,
    /// Meters
    pub altitude: f64,
    /// Battery voltage (V)
    pub voltage: f64,
}

impl Position {
    pub fn decode(fields: &[&str]) -> Result<Self> {
        codec::check_len(fields, LEGACY_FIELDS, MSG)?;
        Ok(Self {
            id: codec::read_str(fields, 1),
            latitude: codec::read_f64(fields, 2, MSG, "latitude")?,
            longitude: codec::read_f64(fields, 3, MSG, "longitude")?,
            altitude: codec::read_f64(fields, 4, MSG, "altitude")?,
            voltage: codec::read_f64(fields, 5, MSG, "voltage")?,
        })
    }

    pub fn location(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude, self.altitude)
    }
}

/// Position report with GPS fix quality.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PositionEnhanced {
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub voltage: f64,
    /// Satellites in the fix
    pub satellites: i32,
    /// Horizontal dilution of precision
    pub hdop: f64,
    /// Altitude datum as sent by the unit, `"MSL"` or `"HAE"`.
    pub altitude_reference: String,
}

impl PositionEnhanced {
    pub fn decode(fields: &[&str]) -> Result<Self> {
        codec::check_len(fields, ENHANCED_FIELDS, MSG)?;
        let base = Position::decode(fields)?;
        Ok(Self {
            id: base.id,
            latitude: base.latitude,
            longitude: base.longitude,
            altitude: base.altitude,
            voltage: base.voltage,
            satellites: codec::read_i32(fields, 6, MSG, "satellites")?,
            hdop: codec::read_f64(fields, 7, MSG, "hdop")?,
            altitude_reference: codec::read_str(fields, 8),
        })
    }

    pub fn location(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude, self.altitude)
    }
}

/// Pick the layout by field count and decode.
pub(crate) fn decode(fields: &[&str]) -> Result<ProtocolEvent> {
    if fields.len() >= ENHANCED_FIELDS {
        let msg = PositionEnhanced::decode(fields)?;
        log::debug!(
            "enhanced position: {} sats={} hdop={:.1} altref={}",
            msg.id, msg.satellites, msg.hdop, msg.altitude_reference
        );
        Ok(ProtocolEvent::PositionEnhanced(msg))
    } else {
        let msg = Position::decode(fields)?;
        log::debug!("legacy position: {}", msg.id);
        Ok(ProtocolEvent::Position(msg))
    }
}
