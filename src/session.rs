//! Receiver session: routes decoded target traffic into the registry and the
//! correlator, and drives the outbound side (shot notifications, calibration).
//!
//! Routing:
//!
//! | Inbound | Effect |
//! |---|---|
//! | `POS` | registry location/telemetry, correlator target position |
//! | `HIT` | registry hit count, [`ShotTracker::record_hit_now`] |
//! | `SHOT` | [`ShotTracker::record_shot_fired_now`]; if accepted, `EXPECT` is sent back |
//! | `CALACK` | round trip stored when it answers the outstanding `CAL` |
//!
//! `HIT` frames carry no time, so both sides of a correlation are stamped
//! with the receiver's clock on arrival. The device timestamp of a `SHOT` is
//! only echoed back in its `EXPECT`.

use std::io::{Read, Write};
use std::sync::Arc;
use std::time::Instant;

use crate::link::{Link, LinkError};
use crate::protocol::{Command, ProtocolEvent};
use crate::target::TargetRegistry;
use crate::tracker::ShotTracker;

/// Link, registry and correlator wired together.
///
/// The tracker is shared: the host keeps its own `Arc` to set the firing
/// position and read results while the session feeds it.
#[derive(Debug)]
pub struct Session<S> {
    link: Link<S>,
    tracker: Arc<ShotTracker>,
    targets: TargetRegistry,
    /// Outstanding calibration: target id and send instant.
    calibration: Option<(String, Instant)>,
}

impl<S: Read + Write> Session<S> {
    pub fn new(link: Link<S>, tracker: Arc<ShotTracker>) -> Self {
        Self {
            link,
            tracker,
            targets: TargetRegistry::new(),
            calibration: None,
        }
    }

    pub fn targets(&self) -> &TargetRegistry {
        &self.targets
    }

    pub fn targets_mut(&mut self) -> &mut TargetRegistry {
        &mut self.targets
    }

    pub fn tracker(&self) -> &Arc<ShotTracker> {
        &self.tracker
    }

    pub fn link_mut(&mut self) -> &mut Link<S> {
        &mut self.link
    }

    /// Ask all targets to report in.
    pub fn query(&mut self) -> Result<(), LinkError> {
        self.link.send(&Command::Query)
    }

    /// Send `CAL,<id>` and start timing the round trip. Replaces any
    /// calibration still outstanding.
    pub fn calibrate(&mut self, id: &str) -> Result<(), LinkError> {
        self.link.send(&Command::Calibrate { id: id.to_string() })?;
        if let Some((previous, _)) = self.calibration.replace((id.to_string(), Instant::now())) {
            log::debug!("calibration of {previous} abandoned for {id}");
        }
        Ok(())
    }

    /// Target id of the calibration awaiting its ack.
    pub fn pending_calibration(&self) -> Option<&str> {
        self.calibration.as_ref().map(|(id, _)| id.as_str())
    }

    /// Block for the next event, apply it, and return it.
    pub fn poll(&mut self) -> Result<ProtocolEvent, LinkError> {
        let event = self.link.recv()?;
        self.handle(&event)?;
        Ok(event)
    }

    /// Decode and apply bytes from a push-style transport.
    ///
    /// Every decoded event is applied even if a reply fails to send; the
    /// first send failure is returned after the whole chunk is processed.
    pub fn receive(&mut self, bytes: &[u8]) -> Result<Vec<ProtocolEvent>, LinkError> {
        let events = self.link.receive(bytes);
        let mut failure = None;
        for event in &events {
            if let Err(e) = self.handle(event) {
                log::error!("reply to {:?} failed: {e}", event.target_id());
                failure.get_or_insert(e);
            }
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(events),
        }
    }

    /// Apply one decoded event. Only fails if a reply cannot be sent.
    pub fn handle(&mut self, event: &ProtocolEvent) -> Result<(), LinkError> {
        match event {
            ProtocolEvent::Position(p) => {
                self.targets.apply(event);
                self.tracker.update_target_position(&p.id, p.location());
            }
            ProtocolEvent::PositionEnhanced(p) => {
                self.targets.apply(event);
                self.tracker.update_target_position(&p.id, p.location());
                if self.targets.get(&p.id).is_some_and(|t| !t.is_gps_quality_good()) {
                    log::warn!("target {} has a weak GPS fix ({} sats, hdop {})", p.id, p.satellites, p.hdop);
                }
            }
            ProtocolEvent::Hit(h) => {
                self.targets.apply(event);
                self.tracker.record_hit_now(&h.id);
            }
            ProtocolEvent::ShotFired(s) => {
                if self.tracker.record_shot_fired_now(&s.target_id).is_some() {
                    self.link.send(&Command::ShotExpected {
                        target_id: s.target_id.clone(),
                        timestamp: s.timestamp,
                    })?;
                }
            }
            ProtocolEvent::CalibrationAck(ack) => {
                self.targets.apply(event);
                match self.calibration.take() {
                    Some((id, sent)) if id == ack.id => {
                        let round_trip = sent.elapsed().as_millis() as u64;
                        self.targets.set_calibration(&id, round_trip);
                        log::debug!("calibration of {id}: {round_trip} ms round trip");
                    }
                    outstanding => {
                        log::debug!("ignoring unsolicited CALACK from {}", ack.id);
                        self.calibration = outstanding;
                    }
                }
            }
            ProtocolEvent::ParseError { .. } => {}
        }
        Ok(())
    }

    pub fn into_parts(self) -> (Link<S>, Arc<ShotTracker>, TargetRegistry) {
        (self.link, self.tracker, self.targets)
    }
}
