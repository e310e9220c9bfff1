pub mod library_entry;
pub mod linked_account;
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
pub mod play_session;
pub mod session_store;
pub mod transaction;

#[cfg(any(test, feature = "test-utils"))]
pub use memory::MemorySessionStore;
pub use session_store::{PgSessionStore, SessionStore, StartOutcome};
pub use transaction::*;

#[cfg(test)]
pub use session_store::MockSessionStore;
