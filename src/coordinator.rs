//! RoomCoordinator actor implementation
//!
//! The central actor owning all state for the single shared room: the
//! session table, identity dedup, and fan-out broadcast. Uses the Actor
//! pattern with mpsc channels for message passing, so every connect,
//! message, and disconnect is processed one at a time in arrival order
//! with no locking.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::message::ServerMessage;
use crate::session::Session;
use crate::types::{CameraPose, CursorState, DisplayColor, SessionId, Vec3};

/// Commands sent from connection handlers to the RoomCoordinator actor
#[derive(Debug)]
pub enum RoomCommand {
    /// New connection accepted
    Connect {
        session_id: SessionId,
        sender: mpsc::Sender<ServerMessage>,
    },
    /// Connection closed
    Disconnect { session_id: SessionId },
    /// Client attached its stable identity
    Identify {
        session_id: SessionId,
        persistent_user_id: String,
    },
    /// Client reported a pointer position
    CursorMove {
        session_id: SessionId,
        position: Vec3,
        normal: Vec3,
    },
    /// Client's pointer left the shared surface
    CursorLeave { session_id: SessionId },
    /// Client requested a color change
    ColorChange {
        session_id: SessionId,
        color: DisplayColor,
    },
    /// Client mirrored its camera pose
    CameraSync {
        session_id: SessionId,
        camera: CameraPose,
    },
}

/// The room coordinator actor
///
/// Owns the session table for the one shared room and processes commands
/// from connection handlers. Each handler runs to completion, broadcasts
/// included, before the next command is taken, so all recipients observe
/// broadcasts in the same relative order they were issued.
pub struct RoomCoordinator {
    /// All live sessions: SessionId -> Session
    sessions: HashMap<SessionId, Session>,
    /// Command receiver channel
    receiver: mpsc::Receiver<RoomCommand>,
}

impl RoomCoordinator {
    /// Create a new RoomCoordinator with the given command receiver
    pub fn new(receiver: mpsc::Receiver<RoomCommand>) -> Self {
        Self {
            sessions: HashMap::new(),
            receiver,
        }
    }

    /// Run the RoomCoordinator event loop
    ///
    /// Continuously receives and processes commands until all senders are dropped.
    pub async fn run(mut self) {
        info!("RoomCoordinator started");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd).await;
        }

        info!("RoomCoordinator shutting down");
    }

    /// Process a single command
    async fn handle_command(&mut self, cmd: RoomCommand) {
        match cmd {
            RoomCommand::Connect { session_id, sender } => {
                self.handle_connect(session_id, sender).await;
            }
            RoomCommand::Disconnect { session_id } => {
                self.handle_disconnect(session_id).await;
            }
            RoomCommand::Identify {
                session_id,
                persistent_user_id,
            } => {
                self.handle_identify(session_id, persistent_user_id).await;
            }
            RoomCommand::CursorMove {
                session_id,
                position,
                normal,
            } => {
                self.handle_cursor_move(session_id, position, normal).await;
            }
            RoomCommand::CursorLeave { session_id } => {
                self.handle_cursor_leave(session_id).await;
            }
            RoomCommand::ColorChange { session_id, color } => {
                self.handle_color_change(session_id, color).await;
            }
            RoomCommand::CameraSync { session_id, camera } => {
                self.handle_camera_sync(session_id, camera).await;
            }
        }
    }

    /// Handle a new connection
    ///
    /// Ordering contract: the newcomer first receives the full roster
    /// (one entry per existing peer, with cursor replay where one is
    /// stored), then its own identity, and only then is its join
    /// broadcast to the others. A late joiner can therefore never miss a
    /// pre-existing peer or mistake its own join notice for one.
    async fn handle_connect(&mut self, session_id: SessionId, sender: mpsc::Sender<ServerMessage>) {
        let color = DisplayColor::random();
        let session = Session::new(session_id, color.clone(), sender);
        info!("Session {} connected with color {}", session_id, color);

        // Roster replay, to the newcomer only, before it becomes visible
        for peer in self.sessions.values() {
            let _ = session
                .send(ServerMessage::UserJoined {
                    session_id: peer.id,
                    color: peer.color.clone(),
                })
                .await;
            if let Some(cursor) = &peer.last_cursor {
                let _ = session
                    .send(ServerMessage::CursorMove {
                        session_id: peer.id,
                        position: cursor.position,
                        normal: cursor.normal,
                        color: peer.color.clone(),
                    })
                    .await;
            }
        }

        // The newcomer's own identity
        let _ = session
            .send(ServerMessage::UserJoined {
                session_id,
                color: color.clone(),
            })
            .await;

        self.sessions.insert(session_id, session);

        // Announce the join to everyone else
        self.broadcast_except(ServerMessage::UserJoined { session_id, color }, session_id)
            .await;

        self.broadcast_user_count().await;
    }

    /// Handle a closed connection
    ///
    /// A disconnect for a session already evicted by identify is ignored
    /// entirely; the eviction already announced the departure.
    async fn handle_disconnect(&mut self, session_id: SessionId) {
        if self.sessions.remove(&session_id).is_none() {
            debug!("Disconnect for unknown session {} ignored", session_id);
            return;
        }

        info!("Session {} disconnected", session_id);

        self.broadcast(ServerMessage::UserDisconnect { session_id })
            .await;
        self.broadcast_user_count().await;
    }

    /// Handle an identify message
    ///
    /// Attaches the persistent identity to the sender (last write wins),
    /// then evicts every other live session carrying the same identity so
    /// duplicate tabs and rapid reconnects don't linger as ghost peers.
    async fn handle_identify(&mut self, session_id: SessionId, persistent_user_id: String) {
        let Some(session) = self.sessions.get_mut(&session_id) else {
            return;
        };

        session.identify(persistent_user_id.clone());
        info!(
            "Session {} identified as '{}'",
            session_id, persistent_user_id
        );

        // Evict stale sessions with the same identity
        let stale: Vec<SessionId> = self
            .sessions
            .values()
            .filter(|s| s.id != session_id && s.has_identity(&persistent_user_id))
            .map(|s| s.id)
            .collect();

        let evicted = !stale.is_empty();
        for stale_id in stale {
            self.sessions.remove(&stale_id);
            info!(
                "Session {} evicted (superseded by {})",
                stale_id, session_id
            );
            self.broadcast(ServerMessage::UserDisconnect {
                session_id: stale_id,
            })
            .await;
        }

        // Acknowledge with the sender's own id so the client can tell its
        // broadcasts apart from peers'
        if let Some(session) = self.sessions.get(&session_id) {
            let _ = session
                .send(ServerMessage::UserIdentified { session_id })
                .await;
        }

        if evicted {
            self.broadcast_user_count().await;
        }
    }

    /// Handle a cursor position update
    ///
    /// The broadcast always carries the server-held color for the sender,
    /// never a color the client put in the frame.
    async fn handle_cursor_move(&mut self, session_id: SessionId, position: Vec3, normal: Vec3) {
        let Some(session) = self.sessions.get_mut(&session_id) else {
            debug!("Cursor update from unknown session {} dropped", session_id);
            return;
        };

        session.set_cursor(CursorState { position, normal });
        let color = session.color.clone();

        self.broadcast_except(
            ServerMessage::CursorMove {
                session_id,
                position,
                normal,
                color,
            },
            session_id,
        )
        .await;
    }

    /// Handle a pointer leaving the shared surface
    ///
    /// The stored cursor state is kept; a roster replay may show a stale
    /// position until the next cursor update overwrites it.
    async fn handle_cursor_leave(&mut self, session_id: SessionId) {
        if !self.sessions.contains_key(&session_id) {
            return;
        }

        self.broadcast_except(ServerMessage::CursorLeave { session_id }, session_id)
            .await;
    }

    /// Handle an authoritative color change
    ///
    /// Broadcast to everyone including the sender, so the originator also
    /// converges on the server-held value.
    async fn handle_color_change(&mut self, session_id: SessionId, color: DisplayColor) {
        let Some(session) = self.sessions.get_mut(&session_id) else {
            return;
        };

        session.set_color(color.clone());
        debug!("Session {} changed color to {}", session_id, color);

        self.broadcast(ServerMessage::UserColorChange { session_id, color })
            .await;
    }

    /// Handle a camera pose update
    ///
    /// Pure relay: nothing is retained, late joiners never receive a
    /// camera.
    async fn handle_camera_sync(&mut self, session_id: SessionId, camera: CameraPose) {
        if !self.sessions.contains_key(&session_id) {
            return;
        }

        self.broadcast_except(ServerMessage::CameraSync { camera }, session_id)
            .await;
    }

    /// Helper: send a message to every live session
    async fn broadcast(&self, msg: ServerMessage) {
        for session in self.sessions.values() {
            let _ = session.send(msg.clone()).await;
        }
    }

    /// Helper: send a message to every live session except one
    async fn broadcast_except(&self, msg: ServerMessage, exclude: SessionId) {
        for session in self.sessions.values() {
            if session.id != exclude {
                let _ = session.send(msg.clone()).await;
            }
        }
    }

    /// Helper: announce the current session count to everyone
    ///
    /// The count is always the live table cardinality at this instant,
    /// never an incrementally tracked number.
    async fn broadcast_user_count(&self) {
        let count = self.sessions.len();
        self.broadcast(ServerMessage::UserCount { count }).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Coordinator with a live (unused) command channel
    fn test_coordinator() -> (RoomCoordinator, mpsc::Sender<RoomCommand>) {
        let (tx, rx) = mpsc::channel(8);
        (RoomCoordinator::new(rx), tx)
    }

    /// Connect a fresh session and return its id plus its outbound queue
    async fn connect(
        coordinator: &mut RoomCoordinator,
    ) -> (SessionId, mpsc::Receiver<ServerMessage>) {
        let session_id = SessionId::new();
        let (tx, rx) = mpsc::channel(64);
        coordinator.handle_connect(session_id, tx).await;
        (session_id, rx)
    }

    /// Drain everything currently queued for a connection
    fn drain(rx: &mut mpsc::Receiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            messages.push(msg);
        }
        messages
    }

    fn color_of(coordinator: &RoomCoordinator, id: SessionId) -> DisplayColor {
        coordinator.sessions.get(&id).unwrap().color.clone()
    }

    #[tokio::test]
    async fn test_first_connect_sees_self_then_count() {
        let (mut coordinator, _tx) = test_coordinator();
        let (a, mut a_rx) = connect(&mut coordinator).await;

        let color_a = color_of(&coordinator, a);
        let messages = drain(&mut a_rx);
        assert_eq!(
            messages,
            vec![
                ServerMessage::UserJoined {
                    session_id: a,
                    color: color_a,
                },
                ServerMessage::UserCount { count: 1 },
            ]
        );
    }

    #[tokio::test]
    async fn test_join_ordering_between_two_clients() {
        let (mut coordinator, _tx) = test_coordinator();
        let (a, mut a_rx) = connect(&mut coordinator).await;
        let color_a = color_of(&coordinator, a);
        drain(&mut a_rx);

        let (b, mut b_rx) = connect(&mut coordinator).await;
        let color_b = color_of(&coordinator, b);

        // B sees A's roster entry first, then its own identity, then the count
        let b_messages = drain(&mut b_rx);
        assert_eq!(
            b_messages,
            vec![
                ServerMessage::UserJoined {
                    session_id: a,
                    color: color_a,
                },
                ServerMessage::UserJoined {
                    session_id: b,
                    color: color_b.clone(),
                },
                ServerMessage::UserCount { count: 2 },
            ]
        );

        // A sees only B's join and the updated count
        let a_messages = drain(&mut a_rx);
        assert_eq!(
            a_messages,
            vec![
                ServerMessage::UserJoined {
                    session_id: b,
                    color: color_b,
                },
                ServerMessage::UserCount { count: 2 },
            ]
        );
    }

    #[tokio::test]
    async fn test_roster_replays_stored_cursor() {
        let (mut coordinator, _tx) = test_coordinator();
        let (a, mut a_rx) = connect(&mut coordinator).await;
        let color_a = color_of(&coordinator, a);
        coordinator
            .handle_cursor_move(a, Vec3::new(0.1, 0.2, 0.3), Vec3::new(0.0, 1.0, 0.0))
            .await;
        drain(&mut a_rx);

        let (b, mut b_rx) = connect(&mut coordinator).await;
        let b_messages = drain(&mut b_rx);

        // Roster entry for A, then A's last cursor, before B's own identity
        assert_eq!(
            b_messages[0],
            ServerMessage::UserJoined {
                session_id: a,
                color: color_a.clone(),
            }
        );
        assert_eq!(
            b_messages[1],
            ServerMessage::CursorMove {
                session_id: a,
                position: Vec3::new(0.1, 0.2, 0.3),
                normal: Vec3::new(0.0, 1.0, 0.0),
                color: color_a,
            }
        );
        assert!(matches!(
            b_messages[2],
            ServerMessage::UserJoined { session_id, .. } if session_id == b
        ));
    }

    #[tokio::test]
    async fn test_disconnect_broadcasts_departure_and_count() {
        let (mut coordinator, _tx) = test_coordinator();
        let (a, mut a_rx) = connect(&mut coordinator).await;
        let (b, _b_rx) = connect(&mut coordinator).await;
        drain(&mut a_rx);

        coordinator.handle_disconnect(b).await;

        assert_eq!(
            drain(&mut a_rx),
            vec![
                ServerMessage::UserDisconnect { session_id: b },
                ServerMessage::UserCount { count: 1 },
            ]
        );
        assert!(!coordinator.sessions.contains_key(&b));
    }

    #[tokio::test]
    async fn test_identify_acknowledges_sender() {
        let (mut coordinator, _tx) = test_coordinator();
        let (a, mut a_rx) = connect(&mut coordinator).await;
        drain(&mut a_rx);

        coordinator.handle_identify(a, "u1".to_string()).await;

        assert_eq!(
            drain(&mut a_rx),
            vec![ServerMessage::UserIdentified { session_id: a }]
        );
        assert!(coordinator.sessions.get(&a).unwrap().has_identity("u1"));
    }

    #[tokio::test]
    async fn test_identify_evicts_duplicate_identity() {
        let (mut coordinator, _tx) = test_coordinator();
        let (a, mut a_rx) = connect(&mut coordinator).await;
        coordinator.handle_identify(a, "u1".to_string()).await;

        let (b, _b_rx) = connect(&mut coordinator).await;
        drain(&mut a_rx);

        // A second connection claims the same identity: A is evicted
        let (a2, mut a2_rx) = connect(&mut coordinator).await;
        drain(&mut a2_rx);
        coordinator.handle_identify(a2, "u1".to_string()).await;

        assert!(!coordinator.sessions.contains_key(&a));
        assert!(coordinator.sessions.contains_key(&a2));
        assert!(coordinator.sessions.contains_key(&b));

        // The survivor sees the departure, its ack, and the corrected count
        assert_eq!(
            drain(&mut a2_rx),
            vec![
                ServerMessage::UserDisconnect { session_id: a },
                ServerMessage::UserIdentified { session_id: a2 },
                ServerMessage::UserCount { count: 2 },
            ]
        );
    }

    #[tokio::test]
    async fn test_disconnect_after_eviction_is_silent() {
        let (mut coordinator, _tx) = test_coordinator();
        let (a, _a_rx) = connect(&mut coordinator).await;
        coordinator.handle_identify(a, "u1".to_string()).await;

        let (a2, mut a2_rx) = connect(&mut coordinator).await;
        coordinator.handle_identify(a2, "u1".to_string()).await;
        drain(&mut a2_rx);

        // The evicted transport eventually closes; nothing is re-announced
        coordinator.handle_disconnect(a).await;
        assert!(drain(&mut a2_rx).is_empty());
    }

    #[tokio::test]
    async fn test_unidentified_sessions_are_never_deduplicated() {
        let (mut coordinator, _tx) = test_coordinator();
        let (a, _a_rx) = connect(&mut coordinator).await;
        let (b, _b_rx) = connect(&mut coordinator).await;

        let (c, _c_rx) = connect(&mut coordinator).await;
        coordinator.handle_identify(c, "u1".to_string()).await;

        // Sessions without an identity are untouched by eviction
        assert!(coordinator.sessions.contains_key(&a));
        assert!(coordinator.sessions.contains_key(&b));
        assert_eq!(coordinator.sessions.len(), 3);
    }

    #[tokio::test]
    async fn test_cursor_move_uses_server_held_color() {
        let (mut coordinator, _tx) = test_coordinator();
        let (a, mut a_rx) = connect(&mut coordinator).await;
        let (_b, mut b_rx) = connect(&mut coordinator).await;
        let color_a = color_of(&coordinator, a);
        drain(&mut a_rx);
        drain(&mut b_rx);

        coordinator
            .handle_cursor_move(a, Vec3::new(0.1, 0.2, 0.3), Vec3::new(0.0, 0.0, 1.0))
            .await;

        // B receives the move with A's stored color; A receives nothing
        assert_eq!(
            drain(&mut b_rx),
            vec![ServerMessage::CursorMove {
                session_id: a,
                position: Vec3::new(0.1, 0.2, 0.3),
                normal: Vec3::new(0.0, 0.0, 1.0),
                color: color_a,
            }]
        );
        assert!(drain(&mut a_rx).is_empty());
    }

    #[tokio::test]
    async fn test_cursor_move_from_unknown_session_dropped() {
        let (mut coordinator, _tx) = test_coordinator();
        let (_a, mut a_rx) = connect(&mut coordinator).await;
        drain(&mut a_rx);

        coordinator
            .handle_cursor_move(
                SessionId::new(),
                Vec3::new(1.0, 1.0, 1.0),
                Vec3::new(0.0, 1.0, 0.0),
            )
            .await;

        assert!(drain(&mut a_rx).is_empty());
    }

    #[tokio::test]
    async fn test_cursor_leave_keeps_stored_position() {
        let (mut coordinator, _tx) = test_coordinator();
        let (a, mut a_rx) = connect(&mut coordinator).await;
        let (_b, mut b_rx) = connect(&mut coordinator).await;
        coordinator
            .handle_cursor_move(a, Vec3::new(0.5, 0.5, 0.5), Vec3::new(0.0, 1.0, 0.0))
            .await;
        drain(&mut a_rx);
        drain(&mut b_rx);

        coordinator.handle_cursor_leave(a).await;

        assert_eq!(
            drain(&mut b_rx),
            vec![ServerMessage::CursorLeave { session_id: a }]
        );
        assert!(drain(&mut a_rx).is_empty());
        // Stored state survives for later roster replay
        assert!(coordinator.sessions.get(&a).unwrap().last_cursor.is_some());
    }

    #[tokio::test]
    async fn test_color_change_reaches_sender_too() {
        let (mut coordinator, _tx) = test_coordinator();
        let (a, mut a_rx) = connect(&mut coordinator).await;
        let (_b, mut b_rx) = connect(&mut coordinator).await;
        drain(&mut a_rx);
        drain(&mut b_rx);

        let new_color = DisplayColor::from_string("hsl(200, 90%, 60%)".to_string());
        coordinator.handle_color_change(a, new_color.clone()).await;

        let expected = vec![ServerMessage::UserColorChange {
            session_id: a,
            color: new_color.clone(),
        }];
        assert_eq!(drain(&mut a_rx), expected);
        assert_eq!(drain(&mut b_rx), expected);
        assert_eq!(color_of(&coordinator, a), new_color);
    }

    #[tokio::test]
    async fn test_camera_sync_relayed_to_others_only() {
        let (mut coordinator, _tx) = test_coordinator();
        let (a, mut a_rx) = connect(&mut coordinator).await;
        let (_b, mut b_rx) = connect(&mut coordinator).await;
        drain(&mut a_rx);
        drain(&mut b_rx);

        let camera = CameraPose {
            position: Vec3::new(1.0, 2.0, 3.0),
            target: Vec3::new(0.0, 0.0, 0.0),
        };
        coordinator.handle_camera_sync(a, camera).await;

        assert_eq!(
            drain(&mut b_rx),
            vec![ServerMessage::CameraSync { camera }]
        );
        assert!(drain(&mut a_rx).is_empty());
    }

    #[tokio::test]
    async fn test_user_count_matches_table_after_each_event() {
        let (mut coordinator, _tx) = test_coordinator();
        let (_a, mut a_rx) = connect(&mut coordinator).await;
        let (b, _b_rx) = connect(&mut coordinator).await;
        let (c, _c_rx) = connect(&mut coordinator).await;
        coordinator.handle_disconnect(b).await;
        coordinator.handle_disconnect(c).await;

        let counts: Vec<usize> = drain(&mut a_rx)
            .into_iter()
            .filter_map(|msg| match msg {
                ServerMessage::UserCount { count } => Some(count),
                _ => None,
            })
            .collect();
        assert_eq!(counts, vec![1, 2, 3, 2, 1]);
        assert_eq!(coordinator.sessions.len(), 1);
    }
}
