pub mod events;
pub mod presence;
pub mod reconciler;
pub mod session_lifecycle;
pub mod sweep;

pub use events::{LibraryEvent, LibraryEvents, LibrarySubscription};
pub use presence::{PresenceError, PresenceSource, SteamPresenceSource};
pub use reconciler::{PresenceReconciler, SyncAction, SyncError, SyncReport};
pub use sweep::{sweep_stale_sessions, SweepReport};
