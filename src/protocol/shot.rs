//! Shot and hit notifications (target → APP).

use crate::codec;
use crate::error::Result;

// ---------------------------------------------------------------------------
// HIT
// ---------------------------------------------------------------------------

/// Impact detected on a target. `HIT,id`.
///
/// The hit instant is not on the wire; receivers stamp it on arrival.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Hit {
    pub id: String,
}

impl Hit {
    pub fn decode(fields: &[&str]) -> Result<Self> {
        codec::check_len(fields, 2, "HIT")?;
        Ok(Self {
            id: codec::read_str(fields, 1),
        })
    }
}

// ---------------------------------------------------------------------------
// SHOT
// ---------------------------------------------------------------------------

/// Rifle shot detected at the firing line. `SHOT,target_id,timestamp`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ShotFired {
    pub target_id: String,
    /// Fire instant (ms)
    pub timestamp: i64,
}

impl ShotFired {
    pub fn decode(fields: &[&str]) -> Result<Self> {
        codec::check_len(fields, 3, "SHOT")?;
        let msg = Self {
            target_id: codec::read_str(fields, 1),
            timestamp: codec::read_i64(fields, 2, "SHOT", "timestamp")?,
        };
        log::debug!("shot fired: target={} timestamp={}", msg.target_id, msg.timestamp);
        Ok(msg)
    }
}
