//! Session struct definition
//!
//! Represents one live connection's server-side record: identity,
//! display color, last-known cursor state, and outbound channel.

use tokio::sync::mpsc;

use crate::error::SendError;
use crate::message::ServerMessage;
use crate::types::{CursorState, DisplayColor, SessionId};

/// Server-side record of one live connection
///
/// Exists from connect-accept until disconnect is processed (or the
/// session is evicted by a newer connection with the same persistent
/// identity). `color` is always set; the cursor fields stay empty until
/// the client first reports a pointer position.
#[derive(Debug)]
pub struct Session {
    /// Transport-assigned identifier for this connection
    pub id: SessionId,
    /// Client-chosen stable identity (None until an identify message)
    pub persistent_user_id: Option<String>,
    /// Authoritative display color
    pub color: DisplayColor,
    /// Last reported pointer state, kept for roster replay
    pub last_cursor: Option<CursorState>,
    /// Server → Client message channel
    pub sender: mpsc::Sender<ServerMessage>,
}

impl Session {
    /// Create a new session with the given ID, color, and sender channel
    pub fn new(id: SessionId, color: DisplayColor, sender: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            id,
            persistent_user_id: None,
            color,
            last_cursor: None,
            sender,
        }
    }

    /// Send a message to this session's connection
    ///
    /// Returns an error if the channel is closed (client disconnected).
    pub async fn send(&self, msg: ServerMessage) -> Result<(), SendError> {
        self.sender
            .send(msg)
            .await
            .map_err(|_| SendError::ChannelClosed)
    }

    /// Attach (or overwrite) the persistent identity. Last write wins.
    pub fn identify(&mut self, persistent_user_id: String) {
        self.persistent_user_id = Some(persistent_user_id);
    }

    /// Whether this session carries the given persistent identity
    pub fn has_identity(&self, persistent_user_id: &str) -> bool {
        self.persistent_user_id.as_deref() == Some(persistent_user_id)
    }

    /// Record the last-known pointer state
    pub fn set_cursor(&mut self, cursor: CursorState) {
        self.last_cursor = Some(cursor);
    }

    /// Overwrite the authoritative color
    pub fn set_color(&mut self, color: DisplayColor) {
        self.color = color;
    }
}
