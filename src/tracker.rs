//! Shot/hit correlation.
//!
//! Each recorded shot sits in its target's pending queue until a hit claims
//! it (ballistics computed, then moved to the completed history) or its
//! timeout fires (dropped, [`TrackerEvent::ShotTimeout`] emitted). A shot is in
//! exactly one of the two collections at any time.
//!
//! All state lives behind one mutex, so the receive path, the control path
//! and the timer thread can call in concurrently. Events go to the handler
//! after the lock is released, and the ballistics model runs unlocked too.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use crate::ballistics::{self, BallisticsResult};
use crate::geo::{GeoPoint, Geodesy};
use crate::timer::Timer;

/// Longest plausible flight time; also the pending-shot timeout.
pub const MAX_HIT_DELAY: Duration = Duration::from_secs(10);

/// Shorter flight times are treated as false triggers.
pub const MIN_TIME_OF_FLIGHT: Duration = Duration::from_millis(10);

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Correlation window. A hit matches a shot when
/// `min_time_of_flight <= hit - shot <= max_hit_delay`; unmatched shots are
/// evicted `max_hit_delay` after they are recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrackerConfig {
    pub min_time_of_flight: Duration,
    pub max_hit_delay: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            min_time_of_flight: MIN_TIME_OF_FLIGHT,
            max_hit_delay: MAX_HIT_DELAY,
        }
    }
}

// ---------------------------------------------------------------------------
// Records and events
// ---------------------------------------------------------------------------

/// Tracker-assigned shot identifier, unique for the tracker's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ShotId(pub u64);

impl fmt::Display for ShotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One shot at one target.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ShotRecord {
    pub id: ShotId,
    pub target_id: String,
    /// Fire instant (ms)
    pub shot_time: i64,
    pub firing_position: GeoPoint,
    pub target_position: GeoPoint,
    /// Hit instant (ms), set on match
    pub hit_time: Option<i64>,
    /// Seconds, set on match
    pub time_of_flight: Option<f64>,
    pub matched: bool,
    pub ballistics: Option<BallisticsResult>,
}

impl ShotRecord {
    fn new(id: ShotId, target_id: &str, shot_time: i64, firing: GeoPoint, target: GeoPoint) -> Self {
        Self {
            id,
            target_id: target_id.to_string(),
            shot_time,
            firing_position: firing,
            target_position: target,
            hit_time: None,
            time_of_flight: None,
            matched: false,
            ballistics: None,
        }
    }

    /// Flight time (s) this shot would have if hit at `hit_time`.
    pub fn implied_time_of_flight(&self, hit_time: i64) -> f64 {
        (hit_time - self.shot_time) as f64 / 1000.0
    }

    fn record_hit(&mut self, hit_time: i64) {
        self.time_of_flight = Some(self.implied_time_of_flight(hit_time));
        self.hit_time = Some(hit_time);
        self.matched = true;
    }
}

/// Notifications from the tracker.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum TrackerEvent {
    ShotFired { target_id: String, shot_time: i64 },
    /// Emitted after `BallisticsComputed` for the same shot; the record
    /// carries the ballistics.
    HitCorrelated { target_id: String, shot: ShotRecord },
    ShotTimeout { target_id: String, shot_time: i64 },
    BallisticsComputed { target_id: String, ballistics: BallisticsResult },
}

impl TrackerEvent {
    pub fn target_id(&self) -> &str {
        match self {
            TrackerEvent::ShotFired { target_id, .. }
            | TrackerEvent::HitCorrelated { target_id, .. }
            | TrackerEvent::ShotTimeout { target_id, .. }
            | TrackerEvent::BallisticsComputed { target_id, .. } => target_id,
        }
    }

    /// Render as a single JSON line.
    #[cfg(feature = "json")]
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Mean ballistics over a target's completed shots.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct BallisticsAverage {
    pub muzzle_velocity: f64,
    pub ballistic_coefficient: f64,
    pub time_of_flight: f64,
    pub range: f64,
    /// Shots averaged
    pub samples: usize,
}

/// Per-target counts and averages.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TargetStatistics {
    pub target_id: String,
    pub completed: usize,
    pub pending: usize,
    pub average: Option<BallisticsAverage>,
}

impl fmt::Display for TargetStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.completed == 0 {
            return write!(
                f,
                "Target {}: {} pending shots, no completed data",
                self.target_id, self.pending
            );
        }
        let avg = self.average.unwrap_or_default();
        write!(
            f,
            "Target {}: {} shots, {} pending\nAvg MV: {:.1} m/s\nAvg BC: {:.3}\nAvg ToF: {:.3}s",
            self.target_id,
            self.completed,
            self.pending,
            avg.muzzle_velocity,
            avg.ballistic_coefficient,
            avg.time_of_flight,
        )
    }
}

// ---------------------------------------------------------------------------
// ShotTracker
// ---------------------------------------------------------------------------

#[derive(Default)]
struct State {
    firing_position: Option<GeoPoint>,
    target_positions: HashMap<String, GeoPoint>,
    pending: HashMap<String, Vec<ShotRecord>>,
    completed: HashMap<String, Vec<ShotRecord>>,
    next_id: u64,
}

struct Inner {
    config: TrackerConfig,
    geodesy: Arc<dyn Geodesy>,
    handler: Box<dyn Fn(TrackerEvent) + Send + Sync>,
    state: Mutex<State>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        // A panicking handler never runs under the lock, so the state is
        // consistent even when poisoned.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: TrackerEvent) {
        (self.handler)(event);
    }

    /// Timeout for `id` fired. No-op unless the shot is still pending.
    fn expire(&self, target_id: &str, id: ShotId) {
        let shot = {
            let mut state = self.lock();
            let Some(queue) = state.pending.get_mut(target_id) else {
                return;
            };
            let Some(index) = queue.iter().position(|s| s.id == id && !s.matched) else {
                return;
            };
            queue.remove(index)
        };

        log::debug!("shot {} at {} timed out", shot.id, shot.target_id);
        self.emit(TrackerEvent::ShotTimeout {
            target_id: shot.target_id,
            shot_time: shot.shot_time,
        });
    }
}

/// Correlates shot-fired and hit notifications per target.
///
/// Share between threads with `Arc<ShotTracker>`; every method takes `&self`.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use shotlink::geo::{GeoPoint, SphericalEarth};
/// use shotlink::tracker::{ShotTracker, TrackerConfig, TrackerEvent};
///
/// let (tracker, events) = ShotTracker::with_channel(TrackerConfig::default(), Arc::new(SphericalEarth))?;
/// tracker.update_firing_position(GeoPoint::new(38.0, -77.0, 10.0));
/// tracker.update_target_position("T1", GeoPoint::new(38.0045, -77.0, 10.0));
///
/// tracker.record_shot_fired("T1", 1_000);
/// tracker.record_hit("T1", 1_500);
///
/// let fired = events.recv().unwrap();
/// assert!(matches!(fired, TrackerEvent::ShotFired { .. }));
/// # Ok::<(), std::io::Error>(())
/// ```
pub struct ShotTracker {
    inner: Arc<Inner>,
    timer: Timer<(String, ShotId)>,
}

impl ShotTracker {
    /// Create a tracker delivering events to `handler`.
    ///
    /// The handler runs on whichever thread triggered the event, including
    /// the tracker's timer thread for timeouts.
    pub fn new(
        config: TrackerConfig,
        geodesy: Arc<dyn Geodesy>,
        handler: impl Fn(TrackerEvent) + Send + Sync + 'static,
    ) -> io::Result<Self> {
        let inner = Arc::new(Inner {
            config,
            geodesy,
            handler: Box::new(handler),
            state: Mutex::new(State::default()),
        });

        let weak: Weak<Inner> = Arc::downgrade(&inner);
        let timer = Timer::spawn("shot-timeouts", move |(target_id, id): (String, ShotId)| {
            if let Some(inner) = weak.upgrade() {
                inner.expire(&target_id, id);
            }
        })?;

        Ok(Self { inner, timer })
    }

    /// Create a tracker whose events are sent to the returned channel.
    pub fn with_channel(
        config: TrackerConfig,
        geodesy: Arc<dyn Geodesy>,
    ) -> io::Result<(Self, mpsc::Receiver<TrackerEvent>)> {
        let (tx, rx) = mpsc::channel();
        let tracker = Self::new(config, geodesy, move |event| {
            // Receiver gone means nobody is listening.
            let _ = tx.send(event);
        })?;
        Ok((tracker, rx))
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.inner.config
    }

    // -----------------------------------------------------------------------
    // Positions
    // -----------------------------------------------------------------------

    /// Set the shooter location used for shots recorded from now on.
    pub fn update_firing_position(&self, position: GeoPoint) {
        self.inner.lock().firing_position = Some(position);
        log::debug!("firing position updated: {position}");
    }

    /// Set a target location used for shots recorded from now on.
    pub fn update_target_position(&self, target_id: &str, position: GeoPoint) {
        self.inner
            .lock()
            .target_positions
            .insert(target_id.to_string(), position);
        log::debug!("target {target_id} position updated: {position}");
    }

    pub fn firing_position(&self) -> Option<GeoPoint> {
        self.inner.lock().firing_position
    }

    pub fn target_position(&self, target_id: &str) -> Option<GeoPoint> {
        self.inner.lock().target_positions.get(target_id).copied()
    }

    // -----------------------------------------------------------------------
    // Shots and hits
    // -----------------------------------------------------------------------

    /// Record a shot at `target_id` fired at `shot_time` (ms).
    ///
    /// Returns `None` (and records nothing) if the firing position or the
    /// target position is not known yet.
    ///
    /// The `ShotFired` event is delivered before the shot becomes matchable
    /// or its timeout is armed, so any `HitCorrelated` or `ShotTimeout` for
    /// it follows, whichever thread produces it.
    pub fn record_shot_fired(&self, target_id: &str, shot_time: i64) -> Option<ShotId> {
        let record = {
            let mut guard = self.inner.lock();
            let state = &mut *guard;

            let Some(firing) = state.firing_position else {
                log::warn!("cannot record shot at {target_id}: firing position not set");
                return None;
            };
            let Some(&target) = state.target_positions.get(target_id) else {
                log::warn!("cannot record shot: position unknown for target {target_id}");
                return None;
            };

            let id = ShotId(state.next_id);
            state.next_id += 1;
            ShotRecord::new(id, target_id, shot_time, firing, target)
        };
        let id = record.id;

        log::debug!("shot {id} recorded for target {target_id} at {shot_time}");
        self.inner.emit(TrackerEvent::ShotFired {
            target_id: target_id.to_string(),
            shot_time,
        });

        self.inner
            .lock()
            .pending
            .entry(target_id.to_string())
            .or_default()
            .push(record);

        if !self
            .timer
            .schedule(self.inner.config.max_hit_delay, (target_id.to_string(), id))
        {
            log::error!("timeout scheduler stopped; shot {id} at {target_id} will not expire");
        }
        Some(id)
    }

    /// [`record_shot_fired`](Self::record_shot_fired) stamped with the current time.
    pub fn record_shot_fired_now(&self, target_id: &str) -> Option<ShotId> {
        self.record_shot_fired(target_id, crate::now_millis())
    }

    /// Record a hit on `target_id` at `hit_time` (ms).
    ///
    /// Claims the oldest pending shot whose implied flight time falls inside
    /// the correlation window (first fit, not closest fit). Returns the
    /// matched shot's id, or `None` if nothing qualified.
    ///
    /// The shot stays pending while its ballistics are computed and moves to
    /// the completed history with hit time, flight time and ballistics all
    /// set. If it expires or is claimed by another hit meanwhile, the next
    /// qualifying shot is tried.
    pub fn record_hit(&self, target_id: &str, hit_time: i64) -> Option<ShotId> {
        let min_tof = self.inner.config.min_time_of_flight.as_secs_f64();
        let max_tof = self.inner.config.max_hit_delay.as_secs_f64();

        loop {
            let candidate = {
                let state = self.inner.lock();
                let queue = match state.pending.get(target_id) {
                    Some(queue) if !queue.is_empty() => queue,
                    _ => {
                        log::warn!("hit on {target_id} but no pending shots");
                        return None;
                    }
                };

                let Some(shot) = queue.iter().find(|s| {
                    let tof = s.implied_time_of_flight(hit_time);
                    !s.matched && tof >= min_tof && tof <= max_tof
                }) else {
                    log::warn!("hit on {target_id} matches no pending shot");
                    return None;
                };
                shot.clone()
            };

            let time_of_flight = candidate.implied_time_of_flight(hit_time);
            let geodesy = &self.inner.geodesy;
            let range = geodesy.distance(&candidate.firing_position, &candidate.target_position);
            let elevation =
                geodesy.elevation_difference(&candidate.firing_position, &candidate.target_position);
            let result = ballistics::from_time_of_flight(range, time_of_flight, elevation);

            let shot = {
                let mut guard = self.inner.lock();
                let state = &mut *guard;
                let Some(queue) = state.pending.get_mut(target_id) else {
                    continue;
                };
                let Some(index) = queue.iter().position(|s| s.id == candidate.id && !s.matched) else {
                    log::debug!("shot {} left the pending queue during matching", candidate.id);
                    continue;
                };

                let mut shot = queue.remove(index);
                shot.record_hit(hit_time);
                shot.ballistics = Some(result.clone());
                state
                    .completed
                    .entry(target_id.to_string())
                    .or_default()
                    .push(shot.clone());
                shot
            };

            log::debug!(
                "hit correlated for {target_id}: ToF={time_of_flight:.3}s MV={:.1} m/s BC={:.3}",
                result.muzzle_velocity, result.ballistic_coefficient
            );

            let id = shot.id;
            self.inner.emit(TrackerEvent::BallisticsComputed {
                target_id: target_id.to_string(),
                ballistics: result,
            });
            self.inner.emit(TrackerEvent::HitCorrelated {
                target_id: target_id.to_string(),
                shot,
            });
            return Some(id);
        }
    }

    /// [`record_hit`](Self::record_hit) stamped with the current time.
    pub fn record_hit_now(&self, target_id: &str) -> Option<ShotId> {
        self.record_hit(target_id, crate::now_millis())
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn pending_count(&self, target_id: &str) -> usize {
        self.inner.lock().pending.get(target_id).map_or(0, Vec::len)
    }

    pub fn pending_shots(&self, target_id: &str) -> Vec<ShotRecord> {
        self.inner.lock().pending.get(target_id).cloned().unwrap_or_default()
    }

    pub fn completed_shots(&self, target_id: &str) -> Vec<ShotRecord> {
        self.inner.lock().completed.get(target_id).cloned().unwrap_or_default()
    }

    pub fn all_completed_shots(&self) -> HashMap<String, Vec<ShotRecord>> {
        self.inner.lock().completed.clone()
    }

    /// Mean MV, BC, ToF and range over the target's completed shots that
    /// carry ballistics. `None` if there are none.
    pub fn average_ballistics(&self, target_id: &str) -> Option<BallisticsAverage> {
        let state = self.inner.lock();
        let shots = state.completed.get(target_id)?;
        average(shots)
    }

    pub fn statistics(&self, target_id: &str) -> TargetStatistics {
        let state = self.inner.lock();
        let completed = state.completed.get(target_id);
        TargetStatistics {
            target_id: target_id.to_string(),
            completed: completed.map_or(0, Vec::len),
            pending: state.pending.get(target_id).map_or(0, Vec::len),
            average: completed.and_then(|shots| average(shots)),
        }
    }

    // -----------------------------------------------------------------------
    // Reset
    // -----------------------------------------------------------------------

    /// Drop all pending and completed shots for one target. Timeouts already
    /// scheduled for its pending shots fire as no-ops.
    pub fn clear(&self, target_id: &str) {
        let mut state = self.inner.lock();
        state.pending.remove(target_id);
        state.completed.remove(target_id);
        log::debug!("shot data cleared for target {target_id}");
    }

    /// Drop all pending and completed shots for every target.
    pub fn clear_all(&self) {
        let mut state = self.inner.lock();
        state.pending.clear();
        state.completed.clear();
        log::debug!("all shot data cleared");
    }
}

impl fmt::Debug for ShotTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("ShotTracker")
            .field("config", &self.inner.config)
            .field("firing_position", &state.firing_position)
            .field("targets", &state.target_positions.len())
            .field("pending", &state.pending.values().map(Vec::len).sum::<usize>())
            .field("completed", &state.completed.values().map(Vec::len).sum::<usize>())
            .finish()
    }
}

fn average(shots: &[ShotRecord]) -> Option<BallisticsAverage> {
    let mut sum = BallisticsAverage::default();
    for b in shots.iter().filter_map(|s| s.ballistics.as_ref()) {
        sum.muzzle_velocity += b.muzzle_velocity;
        sum.ballistic_coefficient += b.ballistic_coefficient;
        sum.time_of_flight += b.time_of_flight;
        sum.range += b.range;
        sum.samples += 1;
    }
    if sum.samples == 0 {
        return None;
    }
    let n = sum.samples as f64;
    Some(BallisticsAverage {
        muzzle_velocity: sum.muzzle_velocity / n,
        ballistic_coefficient: sum.ballistic_coefficient / n,
        time_of_flight: sum.time_of_flight / n,
        range: sum.range / n,
        samples: sum.samples,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::geo::{EARTH_RADIUS, SphericalEarth};

    const T0: i64 = 1_700_000_000_000;
    const WAIT: Duration = Duration::from_secs(2);

    fn firing() -> GeoPoint {
        GeoPoint::new(38.0, -77.0, 10.0)
    }

    fn north_of(origin: GeoPoint, meters: f64) -> GeoPoint {
        let dlat = (meters / EARTH_RADIUS).to_degrees();
        GeoPoint::new(origin.latitude + dlat, origin.longitude, origin.altitude)
    }

    fn tracker(config: TrackerConfig) -> (ShotTracker, mpsc::Receiver<TrackerEvent>) {
        let (t, rx) = ShotTracker::with_channel(config, Arc::new(SphericalEarth)).unwrap();
        t.update_firing_position(firing());
        t.update_target_position("T1", north_of(firing(), 500.0));
        (t, rx)
    }

    fn short_timeout(ms: u64) -> TrackerConfig {
        TrackerConfig {
            max_hit_delay: Duration::from_millis(ms),
            ..TrackerConfig::default()
        }
    }

    #[test]
    fn hit_half_second_after_shot() {
        let (t, rx) = tracker(TrackerConfig::default());
        let shot = t.record_shot_fired("T1", T0).unwrap();
        assert_eq!(t.record_hit("T1", T0 + 500), Some(shot));

        assert_eq!(
            rx.recv_timeout(WAIT).unwrap(),
            TrackerEvent::ShotFired { target_id: "T1".into(), shot_time: T0 }
        );
        let TrackerEvent::BallisticsComputed { ballistics, .. } = rx.recv_timeout(WAIT).unwrap() else {
            panic!("expected ballistics");
        };
        assert!(ballistics.muzzle_velocity > 0.0);
        assert!((ballistics.range - 500.0).abs() < 0.01);

        let TrackerEvent::HitCorrelated { target_id, shot } = rx.recv_timeout(WAIT).unwrap() else {
            panic!("expected hit correlation");
        };
        assert_eq!(target_id, "T1");
        assert!((shot.time_of_flight.unwrap() - 0.5).abs() < 0.001);
        assert!(shot.matched);
        assert_eq!(shot.hit_time, Some(T0 + 500));
        assert_eq!(shot.ballistics, Some(ballistics));

        assert_eq!(t.pending_count("T1"), 0);
        assert_eq!(t.completed_shots("T1"), vec![shot]);
    }

    #[test]
    fn unmatched_shot_times_out_once() {
        let (t, rx) = tracker(short_timeout(50));
        t.record_shot_fired("T1", T0).unwrap();

        assert!(matches!(rx.recv_timeout(WAIT).unwrap(), TrackerEvent::ShotFired { .. }));
        assert_eq!(
            rx.recv_timeout(WAIT).unwrap(),
            TrackerEvent::ShotTimeout { target_id: "T1".into(), shot_time: T0 }
        );
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
        assert_eq!(t.pending_count("T1"), 0);
        assert!(t.completed_shots("T1").is_empty());
    }

    #[test]
    fn matched_shot_timeout_is_a_no_op() {
        let (t, rx) = tracker(short_timeout(100));
        t.record_shot_fired("T1", T0).unwrap();
        t.record_hit("T1", T0 + 50).unwrap();

        let events: Vec<_> = (0..3).map(|_| rx.recv_timeout(WAIT).unwrap()).collect();
        assert!(matches!(events[2], TrackerEvent::HitCorrelated { .. }));
        assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
        assert_eq!(t.completed_shots("T1").len(), 1);
    }

    #[test]
    fn cleared_shot_timeout_is_a_no_op() {
        let (t, rx) = tracker(short_timeout(50));
        t.record_shot_fired("T1", T0).unwrap();
        t.clear("T1");

        assert!(matches!(rx.recv_timeout(WAIT).unwrap(), TrackerEvent::ShotFired { .. }));
        assert!(rx.recv_timeout(Duration::from_millis(250)).is_err());
        assert_eq!(t.pending_count("T1"), 0);
    }

    #[test]
    fn first_fit_not_best_fit() {
        let (t, _rx) = tracker(TrackerConfig::default());
        let first = t.record_shot_fired("T1", T0).unwrap();
        let second = t.record_shot_fired("T1", T0 + 100).unwrap();

        // 0.6 s after the first, 0.5 s after the second: the older one wins.
        assert_eq!(t.record_hit("T1", T0 + 600), Some(first));
        assert_eq!(t.record_hit("T1", T0 + 700), Some(second));

        let tofs: Vec<_> = t.completed_shots("T1").iter().map(|s| s.time_of_flight).collect();
        assert_eq!(tofs, [Some(0.6), Some(0.6)]);
    }

    #[test]
    fn hit_outside_window_is_ignored() {
        let (t, rx) = tracker(TrackerConfig::default());
        t.record_shot_fired("T1", T0).unwrap();

        assert_eq!(t.record_hit("T1", T0 + 5), None);
        assert_eq!(t.record_hit("T1", T0 - 200), None);
        assert_eq!(t.record_hit("T1", T0 + 10_001), None);
        assert_eq!(t.pending_count("T1"), 1);

        // Window edges are inclusive.
        assert!(t.record_hit("T1", T0 + 10).is_some());
        assert!(matches!(rx.recv_timeout(WAIT).unwrap(), TrackerEvent::ShotFired { .. }));
        assert!(matches!(rx.recv_timeout(WAIT).unwrap(), TrackerEvent::BallisticsComputed { .. }));
    }

    #[test]
    fn hit_on_other_target_does_not_match() {
        let (t, _rx) = tracker(TrackerConfig::default());
        t.update_target_position("T2", north_of(firing(), 300.0));
        t.record_shot_fired("T1", T0).unwrap();
        assert_eq!(t.record_hit("T2", T0 + 400), None);
        assert_eq!(t.pending_count("T1"), 1);
    }

    #[test]
    fn missing_positions_are_no_ops() {
        let (t, rx) = ShotTracker::with_channel(TrackerConfig::default(), Arc::new(SphericalEarth)).unwrap();
        t.update_target_position("T1", north_of(firing(), 500.0));
        assert_eq!(t.record_shot_fired("T1", T0), None);

        t.update_firing_position(firing());
        assert_eq!(t.record_shot_fired("T9", T0), None);

        assert_eq!(t.pending_count("T1"), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn positions_are_not_retroactive() {
        let (t, _rx) = tracker(TrackerConfig::default());
        t.record_shot_fired("T1", T0).unwrap();
        let moved = north_of(firing(), 900.0);
        t.update_target_position("T1", moved);

        t.record_hit("T1", T0 + 500).unwrap();
        let shot = &t.completed_shots("T1")[0];
        assert_eq!(shot.target_position, north_of(firing(), 500.0));
        assert_eq!(t.target_position("T1"), Some(moved));
    }

    #[test]
    fn average_and_statistics() {
        let (t, _rx) = tracker(TrackerConfig::default());
        assert_eq!(t.average_ballistics("T1"), None);
        assert_eq!(
            t.statistics("T1").to_string(),
            "Target T1: 0 pending shots, no completed data"
        );

        t.record_shot_fired("T1", T0).unwrap();
        t.record_hit("T1", T0 + 500).unwrap();
        t.record_shot_fired("T1", T0 + 2_000).unwrap();
        t.record_hit("T1", T0 + 2_700).unwrap();
        t.record_shot_fired("T1", T0 + 5_000).unwrap();

        let shots = t.completed_shots("T1");
        let mv: Vec<f64> = shots.iter().map(|s| s.ballistics.as_ref().unwrap().muzzle_velocity).collect();

        let avg = t.average_ballistics("T1").unwrap();
        assert_eq!(avg.samples, 2);
        assert!((avg.time_of_flight - 0.6).abs() < 1e-9);
        assert!((avg.muzzle_velocity - (mv[0] + mv[1]) / 2.0).abs() < 1e-9);
        assert!((avg.range - 500.0).abs() < 0.01);

        let stats = t.statistics("T1");
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.pending, 1);
        assert!(stats.to_string().starts_with("Target T1: 2 shots, 1 pending\nAvg MV: "));
        assert!(stats.to_string().ends_with("Avg ToF: 0.600s"));
    }

    #[test]
    fn clear_all_drops_everything() {
        let (t, _rx) = tracker(TrackerConfig::default());
        t.update_target_position("T2", north_of(firing(), 200.0));
        t.record_shot_fired("T1", T0).unwrap();
        t.record_hit("T1", T0 + 500).unwrap();
        t.record_shot_fired("T2", T0).unwrap();

        t.clear_all();
        assert!(t.all_completed_shots().is_empty());
        assert_eq!(t.pending_count("T2"), 0);
        // Positions survive a clear.
        assert!(t.record_shot_fired("T2", T0 + 1_000).is_some());
    }

    #[test]
    fn shot_ids_are_unique_across_clears() {
        let (t, _rx) = tracker(TrackerConfig::default());
        let a = t.record_shot_fired("T1", T0).unwrap();
        t.clear("T1");
        let b = t.record_shot_fired("T1", T0).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn concurrent_receive_and_control_paths() {
        let (t, _rx) = ShotTracker::with_channel(TrackerConfig::default(), Arc::new(SphericalEarth)).unwrap();
        let t = Arc::new(t);
        t.update_firing_position(firing());

        let handles: Vec<_> = (0..4)
            .map(|n| {
                let t = Arc::clone(&t);
                thread::spawn(move || {
                    let target = format!("T{n}");
                    t.update_target_position(&target, north_of(firing(), 100.0 * (n + 1) as f64));
                    for i in 0..25 {
                        let shot_time = T0 + i * 20_000;
                        t.record_shot_fired(&target, shot_time).unwrap();
                        t.record_hit(&target, shot_time + 300).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        for n in 0..4 {
            let target = format!("T{n}");
            assert_eq!(t.completed_shots(&target).len(), 25);
            assert_eq!(t.pending_count(&target), 0);
            assert!(t.completed_shots(&target).iter().all(|s| s.ballistics.is_some()));
        }
    }

    /// Spherical earth with a slow range lookup.
    struct SlowEarth(Duration);

    impl Geodesy for SlowEarth {
        fn distance(&self, from: &GeoPoint, to: &GeoPoint) -> f64 {
            thread::sleep(self.0);
            SphericalEarth.distance(from, to)
        }
        fn bearing(&self, from: &GeoPoint, to: &GeoPoint) -> f64 {
            SphericalEarth.bearing(from, to)
        }
        fn msl(&self, point: &GeoPoint) -> Option<f64> {
            SphericalEarth.msl(point)
        }
    }

    fn slow_tracker(config: TrackerConfig) -> (Arc<ShotTracker>, mpsc::Receiver<TrackerEvent>) {
        let geodesy = Arc::new(SlowEarth(Duration::from_millis(200)));
        let (t, rx) = ShotTracker::with_channel(config, geodesy).unwrap();
        t.update_firing_position(firing());
        t.update_target_position("T1", north_of(firing(), 500.0));
        (Arc::new(t), rx)
    }

    #[test]
    fn match_is_published_with_ballistics() {
        let (t, _rx) = slow_tracker(TrackerConfig::default());
        let id = t.record_shot_fired("T1", T0).unwrap();

        let hitter = {
            let t = Arc::clone(&t);
            thread::spawn(move || t.record_hit("T1", T0 + 500))
        };
        thread::sleep(Duration::from_millis(50));
        // Model still running: the shot is pending, not half-completed.
        assert!(t.completed_shots("T1").is_empty());
        assert_eq!(t.pending_count("T1"), 1);

        assert_eq!(hitter.join().unwrap(), Some(id));
        let completed = t.completed_shots("T1");
        assert_eq!(completed.len(), 1);
        assert!(completed[0].matched);
        assert_eq!(completed[0].hit_time, Some(T0 + 500));
        assert!(completed[0].ballistics.is_some());
        assert_eq!(t.pending_count("T1"), 0);
    }

    #[test]
    fn timeout_during_ballistics_wins() {
        let (t, rx) = slow_tracker(short_timeout(100));
        t.record_shot_fired("T1", T0).unwrap();

        assert_eq!(t.record_hit("T1", T0 + 50), None);
        assert!(matches!(rx.recv_timeout(WAIT).unwrap(), TrackerEvent::ShotFired { .. }));
        assert!(matches!(rx.recv_timeout(WAIT).unwrap(), TrackerEvent::ShotTimeout { .. }));
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
        assert!(t.completed_shots("T1").is_empty());
    }

    #[test]
    fn shot_fired_precedes_its_timeout() {
        let (t, rx) = tracker(short_timeout(0));
        for i in 0..200 {
            let shot_time = T0 + i;
            t.record_shot_fired("T1", shot_time).unwrap();
            assert_eq!(
                rx.recv_timeout(WAIT).unwrap(),
                TrackerEvent::ShotFired { target_id: "T1".into(), shot_time },
                "iteration {i}"
            );
            assert_eq!(
                rx.recv_timeout(WAIT).unwrap(),
                TrackerEvent::ShotTimeout { target_id: "T1".into(), shot_time },
                "iteration {i}"
            );
        }
    }

    #[test]
    fn hit_racing_timeout_resolves_once() {
        const SHOTS: i64 = 40;
        let (t, rx) = tracker(short_timeout(20));
        let t = Arc::new(t);

        for i in 0..SHOTS {
            let shot_time = T0 + i * 100_000;
            t.record_shot_fired("T1", shot_time).unwrap();
            let hitter = {
                let t = Arc::clone(&t);
                thread::spawn(move || {
                    thread::sleep(Duration::from_millis(20));
                    // Right at the window edge.
                    t.record_hit("T1", shot_time + 20)
                })
            };
            hitter.join().unwrap();
        }
        thread::sleep(Duration::from_millis(200));

        let mut outcomes: HashMap<i64, usize> = HashMap::new();
        let mut timeouts = 0;
        for event in rx.try_iter() {
            match event {
                TrackerEvent::HitCorrelated { shot, .. } => *outcomes.entry(shot.shot_time).or_default() += 1,
                TrackerEvent::ShotTimeout { shot_time, .. } => {
                    timeouts += 1;
                    *outcomes.entry(shot_time).or_default() += 1;
                }
                _ => {}
            }
        }

        assert_eq!(outcomes.len(), SHOTS as usize);
        assert!(outcomes.values().all(|&n| n == 1), "{outcomes:?}");
        assert_eq!(t.completed_shots("T1").len() + timeouts, SHOTS as usize);
        assert_eq!(t.pending_count("T1"), 0);
    }
}
