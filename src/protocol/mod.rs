//! Message types and decode/encode dispatch.
//!
//! - [`Command`]: frames we send to the targets
//! - [`ProtocolEvent`]: frames the targets send to us, plus decode failures
//!
//! The two tag sets are disjoint: an outbound command looped back into the
//! decoder is rejected as an unknown message type.

pub mod calibration;
pub mod position;
pub mod shot;

use std::fmt;

use crate::error::{Result, WireError};
use crate::frame::{self, RawFrame};

// ---------------------------------------------------------------------------
// Tag constants
// ---------------------------------------------------------------------------

// Inbound (target sends)
pub const TAG_POSITION: &str = "POS";
pub const TAG_HIT: &str = "HIT";
pub const TAG_SHOT: &str = "SHOT";
pub const TAG_CALIBRATION_ACK: &str = "CALACK";

// Outbound (we send)
pub const TAG_QUERY: &str = "QUERY";
pub const TAG_CALIBRATE: &str = "CAL";
pub const TAG_READY: &str = "READY";
pub const TAG_EXPECT: &str = "EXPECT";
pub const TAG_BALLISTICS: &str = "BALLISTICS";

// ---------------------------------------------------------------------------
// Command: frames we send to the targets
// ---------------------------------------------------------------------------

/// A command frame sent to the target units.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Command {
    /// Ask every listening target to report in.
    Query,
    /// Start a calibration round trip with one target.
    Calibrate { id: String },
    Ready { id: String },
    /// Tell a target a shot is on its way, stamped with the fire time (ms).
    ShotExpected { target_id: String, timestamp: i64 },
    BallisticsRequest { target_id: String },
}

impl Command {
    /// Frame content without delimiters, e.g. `EXPECT,T1,12345`.
    pub fn content(&self) -> String {
        match self {
            Command::Query => TAG_QUERY.to_string(),
            Command::Calibrate { id } => format!("{TAG_CALIBRATE},{id}"),
            Command::Ready { id } => format!("{TAG_READY},{id}"),
            Command::ShotExpected { target_id, timestamp } => {
                format!("{TAG_EXPECT},{target_id},{timestamp}")
            }
            Command::BallisticsRequest { target_id } => format!("{TAG_BALLISTICS},{target_id}"),
        }
    }

    /// Encode into wire bytes ready for transmission.
    pub fn encode(&self) -> Vec<u8> {
        frame::encode_frame(&self.content())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.content())
    }
}

// ---------------------------------------------------------------------------
// ProtocolEvent: frames the targets send to us
// ---------------------------------------------------------------------------

/// One decoded inbound frame.
///
/// Every complete frame yields exactly one event. Frames that fail to decode
/// become [`ProtocolEvent::ParseError`] and leave no other trace.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ProtocolEvent {
    /// Legacy 6-field position report.
    Position(position::Position),
    /// 9-field position report with GPS quality.
    PositionEnhanced(position::PositionEnhanced),
    Hit(shot::Hit),
    ShotFired(shot::ShotFired),
    CalibrationAck(calibration::CalibrationAck),
    ParseError { message: String },
}

impl ProtocolEvent {
    /// Decode a frame into a typed event.
    pub fn decode(frame: &RawFrame) -> Result<Self> {
        let fields = frame.fields();
        let Some(&tag) = fields.first() else {
            return Err(WireError::EmptyFrame);
        };

        match tag {
            TAG_POSITION => position::decode(&fields),
            TAG_HIT => Ok(ProtocolEvent::Hit(shot::Hit::decode(&fields)?)),
            TAG_SHOT => Ok(ProtocolEvent::ShotFired(shot::ShotFired::decode(&fields)?)),
            TAG_CALIBRATION_ACK => Ok(ProtocolEvent::CalibrationAck(
                calibration::CalibrationAck::decode(&fields)?,
            )),
            other => Err(WireError::UnknownTag {
                tag: other.to_string(),
            }),
        }
    }

    /// Decode a frame, folding any error into a `ParseError` event.
    pub fn from_frame(frame: &RawFrame) -> Self {
        match Self::decode(frame) {
            Ok(event) => event,
            Err(e) => ProtocolEvent::ParseError {
                message: e.to_string(),
            },
        }
    }

    /// Target identifier carried by the event, if any.
    pub fn target_id(&self) -> Option<&str> {
        match self {
            ProtocolEvent::Position(m) => Some(&m.id),
            ProtocolEvent::PositionEnhanced(m) => Some(&m.id),
            ProtocolEvent::Hit(m) => Some(&m.id),
            ProtocolEvent::ShotFired(m) => Some(&m.target_id),
            ProtocolEvent::CalibrationAck(m) => Some(&m.id),
            ProtocolEvent::ParseError { .. } => None,
        }
    }

    /// Render as a single JSON line.
    #[cfg(feature = "json")]
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
