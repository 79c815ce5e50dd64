//! Wire protocol, shot/hit correlation and time-of-flight ballistics for
//! wireless hit-indicator targets.

pub mod ballistics;
pub mod codec;
pub mod decoder;
pub mod error;
pub mod frame;
pub mod geo;
pub mod link;
pub mod protocol;
pub mod session;
pub mod target;
pub mod timer;
pub mod tracker;

pub use ballistics::{Ammunition, BallisticsResult, Environment, ShootingSolution};
pub use decoder::Decoder;
pub use error::WireError;
pub use frame::{FrameSplitter, RawFrame};
pub use geo::{GeoPoint, Geodesy, SphericalEarth};
pub use link::{Link, LinkError};
pub use protocol::{Command, ProtocolEvent};
pub use session::Session;
pub use target::{Target, TargetRegistry};
pub use tracker::{ShotId, ShotRecord, ShotTracker, TrackerConfig, TrackerEvent};

/// Wall-clock milliseconds since the Unix epoch.
pub(crate) fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as i64)
}
