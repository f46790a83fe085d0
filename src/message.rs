//! Message protocol definitions
//!
//! JSON-based bidirectional message protocol using Serde's tagged enum
//! for type-safe serialization/deserialization. Type tags are kebab-case
//! and field names camelCase on the wire.

use serde::{Deserialize, Serialize};

use crate::types::{CameraPose, DisplayColor, SessionId, Vec3};

/// Client → Server message
///
/// Each variant carries exactly the fields required for its type; a frame
/// missing one of them fails deserialization and is dropped at the boundary.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Attach a client-chosen stable identity to this session
    Identify { persistent_user_id: String },
    /// Report the 3D pointer position (high frequency)
    ///
    /// `color` and `rgb` describe the client's local pick; the relay
    /// validates their presence but broadcasts the server-held color.
    CursorMove {
        position: Vec3,
        normal: Vec3,
        color: String,
        rgb: [f32; 3],
    },
    /// Pointer left the shared surface
    CursorLeave,
    /// Request an authoritative color change
    UserColorChange { color: String },
    /// Mirror this client's camera pose to peers
    CameraSync { camera: CameraPose },
}

/// Server → Client message
///
/// All messages from the relay to clients. Also used verbatim for roster
/// replay to late joiners.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// A session is present (roster entry, self identity, or join broadcast)
    UserJoined {
        session_id: SessionId,
        color: DisplayColor,
    },
    /// A peer's cursor moved; `color` is the server-held color
    CursorMove {
        session_id: SessionId,
        position: Vec3,
        normal: Vec3,
        color: DisplayColor,
    },
    /// A peer's pointer left the surface
    CursorLeave { session_id: SessionId },
    /// A session left the room (disconnect or eviction)
    UserDisconnect { session_id: SessionId },
    /// A session's authoritative color changed
    UserColorChange {
        session_id: SessionId,
        color: DisplayColor,
    },
    /// A peer's camera pose, relayed verbatim
    CameraSync { camera: CameraPose },
    /// Current number of live sessions
    UserCount { count: usize },
    /// Identify acknowledgement carrying the sender's own session id
    UserIdentified { session_id: SessionId },
}
