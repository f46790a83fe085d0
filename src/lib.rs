//! Realtime Room Relay Library
//!
//! A session-coordination and broadcast relay for one shared interactive
//! room, built with tokio-tungstenite using the Actor pattern for state
//! management. Clients continuously emit small state updates (3D cursor
//! position, display color, camera pose) and every peer converges on the
//! same view of who is present and where their cursor is.
//!
//! # Features
//! - WebSocket connection handling
//! - Random display-color assignment per session
//! - Ordered roster replay to late joiners
//! - Persistent-identity reconciliation (duplicate-tab eviction)
//! - Cursor, color, and camera broadcast fan-out
//! - Live user-count announcements
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `RoomCoordinator` is the central actor owning the session table
//! - Each connection has a `handler` task communicating with the coordinator
//! - No locks needed - all state access goes through message passing
//!
//! # Example
//! ```ignore
//! use tokio::net::TcpListener;
//! use tokio::sync::mpsc;
//! use room_relay::{RoomCoordinator, handle_connection};
//!
//! #[tokio::main]
//! async fn main() {
//!     let listener = TcpListener::bind("127.0.0.1:8080").await.unwrap();
//!     let (cmd_tx, cmd_rx) = mpsc::channel(256);
//!
//!     tokio::spawn(RoomCoordinator::new(cmd_rx).run());
//!
//!     while let Ok((stream, _)) = listener.accept().await {
//!         let cmd_tx = cmd_tx.clone();
//!         tokio::spawn(handle_connection(stream, cmd_tx));
//!     }
//! }
//! ```

pub mod coordinator;
pub mod error;
pub mod handler;
pub mod message;
pub mod session;
pub mod types;

// Re-export main types for convenience
pub use coordinator::{RoomCommand, RoomCoordinator};
pub use error::{AppError, SendError};
pub use handler::handle_connection;
pub use message::{ClientMessage, ServerMessage};
pub use session::Session;
pub use types::{CameraPose, CursorState, DisplayColor, SessionId, Vec3};
