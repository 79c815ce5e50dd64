//! Time-of-flight ballistics model.
//!
//! Pure functions in SI units (meters, seconds, m/s). The drag terms are
//! coarse empirical proxies tuned for rifle calibers at typical ranges, not a
//! G1/G7 drag table integration.

use std::fmt;

use crate::geo::{GeoPoint, Geodesy};

/// Standard gravity (m/s²).
pub const GRAVITY: f64 = 9.80665;

/// Grains per kilogram.
pub const GRAINS_PER_KILOGRAM: f64 = 15432.4;

/// BC reported when the measured flight time shows no drag.
pub const DEFAULT_BALLISTIC_COEFFICIENT: f64 = 0.5;

pub const MIN_BALLISTIC_COEFFICIENT: f64 = 0.1;
pub const MAX_BALLISTIC_COEFFICIENT: f64 = 1.0;

// Firing angle scan range and step (degrees).
const ANGLE_SCAN_MIN: f64 = -10.0;
const ANGLE_SCAN_MAX: f64 = 45.0;
const ANGLE_SCAN_STEP: f64 = 0.1;

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// Cartridge description attached to a result.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Ammunition {
    pub kind: String,
    /// Bullet weight (grains). 0 = unknown, no energy figures.
    pub bullet_weight_grains: f64,
}

impl Default for Ammunition {
    fn default() -> Self {
        Self {
            kind: "Unknown".to_string(),
            bullet_weight_grains: 0.0,
        }
    }
}

/// Atmospheric conditions at the time of the shot. Recorded alongside the
/// result; the model itself does not correct for them.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Environment {
    /// °C
    pub temperature: f64,
    /// Pa
    pub pressure: f64,
    /// Relative humidity (%)
    pub humidity: f64,
    /// m/s
    pub wind_speed: f64,
    /// Degrees, 0 = headwind
    pub wind_direction: f64,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            temperature: 15.0,
            pressure: 101_325.0,
            humidity: 50.0,
            wind_speed: 0.0,
            wind_direction: 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// BallisticsResult
// ---------------------------------------------------------------------------

/// Ballistic parameters derived from one measured time of flight.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct BallisticsResult {
    /// m
    pub range: f64,
    /// s
    pub time_of_flight: f64,
    /// m/s
    pub muzzle_velocity: f64,
    /// Empirical BC in `[0.1, 1.0]`
    pub ballistic_coefficient: f64,
    /// Degrees, negative = below line of sight
    pub drop_angle: f64,
    /// Target elevation above the firing position (m)
    pub elevation: f64,
    /// m/s
    pub velocity_at_target: f64,
    /// J, zero unless a bullet weight is known
    pub energy_at_target: f64,
    pub ammunition: Ammunition,
    pub environment: Environment,
    /// Computation time (ms since the Unix epoch)
    pub timestamp: i64,
}

impl BallisticsResult {
    pub fn is_valid(&self) -> bool {
        self.ballistic_coefficient > 0.0 && self.muzzle_velocity > 0.0 && self.time_of_flight > 0.0
    }

    /// Attach cartridge data and fill in the energy at the target.
    pub fn with_ammunition(mut self, ammunition: Ammunition) -> Self {
        self.energy_at_target = kinetic_energy(ammunition.bullet_weight_grains, self.velocity_at_target);
        self.ammunition = ammunition;
        self
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }
}

/// Derive ballistics from a measured time of flight.
///
/// `time_of_flight` must be positive. `elevation_difference` is the target's
/// height above the shooter (m).
pub fn from_time_of_flight(range: f64, time_of_flight: f64, elevation_difference: f64) -> BallisticsResult {
    let t = time_of_flight;
    let gravitational_drop = 0.5 * GRAVITY * t * t;
    let elevation_needed = elevation_difference + gravitational_drop;

    let horizontal_velocity = range / t;
    let vertical_velocity = elevation_needed / t;
    let muzzle_velocity =
        (horizontal_velocity * horizontal_velocity + vertical_velocity * vertical_velocity).sqrt();

    let drop_angle = (-gravitational_drop).atan2(range).to_degrees();
    let ballistic_coefficient = estimate_bc(muzzle_velocity, range, t);
    let velocity_at_target = velocity_at_target(muzzle_velocity, range, ballistic_coefficient);

    log::debug!(
        "ballistics: MV={muzzle_velocity:.1} m/s, BC={ballistic_coefficient:.3}, ToF={t:.3}s, range={range:.1}m"
    );

    BallisticsResult {
        range,
        time_of_flight: t,
        muzzle_velocity,
        ballistic_coefficient,
        drop_angle,
        elevation: elevation_difference,
        velocity_at_target,
        energy_at_target: 0.0,
        ammunition: Ammunition::default(),
        environment: Environment::default(),
        timestamp: crate::now_millis(),
    }
}

/// Estimate BC from the gap between measured and drag-free flight time.
///
/// Returns exactly [`DEFAULT_BALLISTIC_COEFFICIENT`] when the measurement
/// shows no drag; otherwise a value clamped to `[0.1, 1.0]`.
pub fn estimate_bc(muzzle_velocity: f64, range: f64, measured_tof: f64) -> f64 {
    let theoretical_tof = range / muzzle_velocity;
    let drag_effect = measured_tof - theoretical_tof;

    if drag_effect <= 0.0 {
        return DEFAULT_BALLISTIC_COEFFICIENT;
    }

    let bc = 0.5 * (-drag_effect * 2.0).exp();
    bc.clamp(MIN_BALLISTIC_COEFFICIENT, MAX_BALLISTIC_COEFFICIENT)
}

/// Remaining velocity after `range` meters of exponential decay.
pub fn velocity_at_target(muzzle_velocity: f64, range: f64, bc: f64) -> f64 {
    muzzle_velocity * (-range / (bc * 1000.0)).exp()
}

/// Bullet drop (m) at `range`, gravity plus a linear air-resistance factor.
pub fn drop(range: f64, muzzle_velocity: f64, bc: f64) -> f64 {
    let t = range / muzzle_velocity;
    let gravitational_drop = 0.5 * GRAVITY * t * t;
    let air_resistance_factor = 1.0 + range / (bc * 2000.0);
    gravitational_drop * air_resistance_factor
}

/// Launch angle (degrees) that best reaches `elevation_difference` at `range`.
///
/// Scans −10° to 45° in 0.1° steps and keeps the first angle with the
/// smallest vertical miss, so ties resolve to the lower angle.
pub fn firing_angle(range: f64, elevation_difference: f64, muzzle_velocity: f64, bc: f64) -> f64 {
    // Drop comes from the straight-line flight time, not each candidate's vx,
    // so it is the same for every angle.
    let drop_est = drop(range, muzzle_velocity, bc);

    let mut best_angle = 0.0;
    let mut min_error = f64::MAX;

    let mut angle = ANGLE_SCAN_MIN;
    while angle <= ANGLE_SCAN_MAX {
        let radians = angle.to_radians();
        let vx = muzzle_velocity * radians.cos();
        let vy = muzzle_velocity * radians.sin();
        let tof = range / vx;

        let actual_elevation = vy * tof - drop_est;
        let error = (actual_elevation - elevation_difference).abs();
        if error < min_error {
            min_error = error;
            best_angle = angle;
        }
        angle += ANGLE_SCAN_STEP;
    }

    best_angle
}

/// Kinetic energy (J) of a bullet of `bullet_weight_grains` at `velocity` m/s.
pub fn kinetic_energy(bullet_weight_grains: f64, velocity: f64) -> f64 {
    let mass_kg = bullet_weight_grains / GRAINS_PER_KILOGRAM;
    0.5 * mass_kg * velocity * velocity
}

// ---------------------------------------------------------------------------
// ShootingSolution
// ---------------------------------------------------------------------------

/// Firing data for a target, computed on demand from earlier ballistics.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ShootingSolution {
    /// m
    pub range: f64,
    /// Degrees true
    pub bearing: f64,
    /// m, positive = target above shooter
    pub elevation_difference: f64,
    /// Degrees above horizontal
    pub firing_angle: f64,
    /// s
    pub predicted_time_of_flight: f64,
    /// m
    pub drop: f64,
    /// J
    pub energy_at_target: f64,
    /// ms since the Unix epoch
    pub computed_at: i64,
}

impl fmt::Display for ShootingSolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Range: {:.0}m", self.range)?;
        writeln!(f, "Bearing: {:.1}°", self.bearing)?;
        writeln!(f, "Elevation: {:+.1}m", self.elevation_difference)?;
        writeln!(f, "Angle: {:+.2}°", self.firing_angle)?;
        writeln!(f, "ToF: {:.3}s", self.predicted_time_of_flight)?;
        write!(f, "Drop: {:.2}m", self.drop)
    }
}

/// Build a shooting solution from `firing` to `target` using a previously
/// measured muzzle velocity and BC.
///
/// Range, bearing and elevation difference always come from `geodesy`. When
/// `ballistics.muzzle_velocity <= 0` there is nothing to extrapolate from:
/// `firing_angle`, `predicted_time_of_flight` and `drop` are all left at 0.0
/// (not just the angle), as is `energy_at_target`, so no field is inf or NaN.
pub fn shooting_solution(
    firing: &GeoPoint,
    target: &GeoPoint,
    ballistics: &BallisticsResult,
    geodesy: &dyn Geodesy,
) -> ShootingSolution {
    let range = geodesy.distance(firing, target);
    let bearing = geodesy.bearing(firing, target);
    let elevation_difference = geodesy.elevation_difference(firing, target);

    let mv = ballistics.muzzle_velocity;
    let bc = ballistics.ballistic_coefficient;

    let mut solution = ShootingSolution {
        range,
        bearing,
        elevation_difference,
        firing_angle: 0.0,
        predicted_time_of_flight: 0.0,
        drop: 0.0,
        energy_at_target: 0.0,
        computed_at: crate::now_millis(),
    };

    if mv > 0.0 {
        solution.firing_angle = firing_angle(range, elevation_difference, mv, bc);
        solution.predicted_time_of_flight = range / mv;
        solution.drop = drop(range, mv, bc);
    }

    let weight = ballistics.ammunition.bullet_weight_grains;
    if weight > 0.0 && mv > 0.0 {
        solution.energy_at_target = kinetic_energy(weight, velocity_at_target(mv, range, bc));
    }

    log::debug!(
        "shooting solution: range={:.1}m angle={:.2}° ToF={:.3}s drop={:.2}m",
        solution.range, solution.firing_angle, solution.predicted_time_of_flight, solution.drop
    );

    solution
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
