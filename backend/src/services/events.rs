//! Library change notifications.
//!
//! Views that show library data subscribe here to refresh after a session
//! starts or ends. The channel is owned by [`crate::state::AppState`] and
//! cloned into whoever needs to publish.

use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};

use crate::types::{LibraryEntryId, SessionId, UserId};

const DEFAULT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LibraryEvent {
    SessionStarted {
        user_id: UserId,
        session_id: SessionId,
        library_entry_id: LibraryEntryId,
        external_game_id: String,
    },
    SessionEnded {
        user_id: UserId,
        session_id: SessionId,
        library_entry_id: LibraryEntryId,
        duration_minutes: i32,
    },
}

impl LibraryEvent {
    pub fn user_id(&self) -> UserId {
        match self {
            LibraryEvent::SessionStarted { user_id, .. } => *user_id,
            LibraryEvent::SessionEnded { user_id, .. } => *user_id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LibraryEvents {
    sender: broadcast::Sender<LibraryEvent>,
}

impl Default for LibraryEvents {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl LibraryEvents {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes `event` and returns how many subscribers received it.
    pub fn publish(&self, event: LibraryEvent) -> usize {
        // Sending with no subscribers is not an error for us.
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> LibrarySubscription {
        LibrarySubscription {
            receiver: self.sender.subscribe(),
        }
    }
}

pub struct LibrarySubscription {
    receiver: broadcast::Receiver<LibraryEvent>,
}

impl LibrarySubscription {
    /// Waits for the next event. Returns `None` once every publisher is gone.
    ///
    /// A subscriber that falls behind skips the events it missed.
    pub async fn recv(&mut self) -> Option<LibraryEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Library event subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    pub fn try_recv(&mut self) -> Option<LibraryEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }
}
