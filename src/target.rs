//! Per-target telemetry: last known location, hit count, battery, GPS fix
//! quality and calibration round trip.

use std::collections::BTreeMap;

use crate::geo::GeoPoint;
use crate::protocol::ProtocolEvent;

/// Minimum satellites for a trustworthy fix.
pub const GOOD_FIX_SATELLITES: i32 = 6;

/// Maximum HDOP for a trustworthy fix.
pub const GOOD_FIX_HDOP: f64 = 2.0;

/// GPS fix details from an enhanced position report.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct GpsQuality {
    pub satellites: i32,
    pub hdop: f64,
    pub altitude_reference: String,
}

impl GpsQuality {
    pub fn is_good(&self) -> bool {
        self.satellites >= GOOD_FIX_SATELLITES && self.hdop <= GOOD_FIX_HDOP
    }
}

/// What the receiver knows about one target unit.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Target {
    pub id: String,
    pub location: Option<GeoPoint>,
    pub hit_count: u32,
    /// Wall clock (ms) of the last report from this unit.
    pub last_seen: i64,
    /// Battery voltage; `None` until reported.
    pub voltage: Option<f64>,
    /// Set by enhanced position reports only.
    pub gps: Option<GpsQuality>,
    /// Last CAL → CALACK round trip (ms).
    pub calibration_ms: Option<u64>,
}

impl Target {
    fn new(id: &str, now: i64) -> Self {
        Self {
            id: id.to_string(),
            location: None,
            hit_count: 0,
            last_seen: now,
            voltage: None,
            gps: None,
            calibration_ms: None,
        }
    }

    /// False when no enhanced report has arrived yet.
    pub fn is_gps_quality_good(&self) -> bool {
        self.gps.as_ref().is_some_and(GpsQuality::is_good)
    }
}

/// Targets keyed by id, in id order.
#[derive(Debug, Clone, Default)]
pub struct TargetRegistry {
    targets: BTreeMap<String, Target>,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold an inbound event into the registry. Returns the affected target,
    /// or `None` for events that carry no target state (shot notifications,
    /// parse errors, acks for unknown targets).
    pub fn apply(&mut self, event: &ProtocolEvent) -> Option<&Target> {
        match event {
            ProtocolEvent::Position(p) => {
                let target = self.update_position(&p.id, p.location());
                target.voltage = Some(p.voltage);
                Some(target)
            }
            ProtocolEvent::PositionEnhanced(p) => {
                let target = self.update_position(&p.id, p.location());
                target.voltage = Some(p.voltage);
                target.gps = Some(GpsQuality {
                    satellites: p.satellites,
                    hdop: p.hdop,
                    altitude_reference: p.altitude_reference.clone(),
                });
                Some(target)
            }
            ProtocolEvent::Hit(h) => Some(self.record_hit(&h.id)),
            ProtocolEvent::CalibrationAck(ack) => {
                let target = self.targets.get_mut(&ack.id)?;
                target.last_seen = crate::now_millis();
                Some(target)
            }
            ProtocolEvent::ShotFired(_) | ProtocolEvent::ParseError { .. } => None,
        }
    }

    /// Create or move a target.
    pub fn update_position(&mut self, id: &str, location: GeoPoint) -> &mut Target {
        let target = self.touch(id);
        target.location = Some(location);
        target
    }

    /// Count a hit, creating the target if it has not reported yet.
    pub fn record_hit(&mut self, id: &str) -> &mut Target {
        let target = self.touch(id);
        target.hit_count += 1;
        target
    }

    /// Store a battery reading. Unknown targets are ignored.
    pub fn update_voltage(&mut self, id: &str, voltage: f64) -> bool {
        match self.targets.get_mut(id) {
            Some(target) => {
                target.voltage = Some(voltage);
                target.last_seen = crate::now_millis();
                true
            }
            None => {
                log::warn!("voltage for unknown target {id}");
                false
            }
        }
    }

    /// Store a calibration round trip. Unknown targets are ignored.
    pub fn set_calibration(&mut self, id: &str, round_trip_ms: u64) -> bool {
        match self.targets.get_mut(id) {
            Some(target) => {
                target.calibration_ms = Some(round_trip_ms);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &str) -> Option<&Target> {
        self.targets.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Target> {
        self.targets.values()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn reset_hit_count(&mut self, id: &str) {
        if let Some(target) = self.targets.get_mut(id) {
            target.hit_count = 0;
        }
    }

    pub fn reset_all_hit_counts(&mut self) {
        for target in self.targets.values_mut() {
            target.hit_count = 0;
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<Target> {
        self.targets.remove(id)
    }

    pub fn clear(&mut self) {
        self.targets.clear();
    }

    fn touch(&mut self, id: &str) -> &mut Target {
        let now = crate::now_millis();
        let target = self
            .targets
            .entry(id.to_string())
            .or_insert_with(|| Target::new(id, now));
        target.last_seen = now;
        target
    }
}
