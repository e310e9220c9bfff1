//! Data models shared across database access, services and API handlers.

pub mod game;
pub mod library_entry;
pub mod linked_account;
pub mod platform;
pub mod play_session;
pub mod presence;

pub use game::Game;
pub use library_entry::{LibraryEntry, LibraryStatus};
pub use linked_account::LinkedAccount;
pub use platform::Platform;
pub use play_session::{PlaySession, PlaySessionResponse, SessionStatus};
pub use presence::PresenceSignal;
