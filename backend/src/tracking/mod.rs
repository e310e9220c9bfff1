//! Client-side session tracking: a polling driver over the reconciler.

pub mod driver;
pub mod live;
pub mod schedule;

pub use driver::{spawn, spawn_with_clock, Clock, SessionSync, TrackingHandle, UserSessionSync};
pub use live::TrackingSnapshot;
pub use schedule::{PollMode, PollState, TrackingConfig};
