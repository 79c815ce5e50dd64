//! Calibration acknowledgment (target → APP).
//!
//! `CALACK,id` carries no timing. The round trip is measured by whoever sent
//! the matching `CAL,id`, from its own clock at receipt time.

use crate::codec;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CalibrationAck {
    pub id: String,
}

impl CalibrationAck {
    pub fn decode(fields: &[&str]) -> Result<Self> {
        codec::check_len(fields, 2, "CALACK")?;
        Ok(Self {
            id: codec::read_str(fields, 1),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::split_fields;

    #[test]
    fn decode() {
        let ack = CalibrationAck::decode(&split_fields("CALACK,T2,extra")).unwrap();
        assert_eq!(ack.id, "T2");
        assert!(CalibrationAck::decode(&split_fields("CALACK")).is_err());
    }
}
