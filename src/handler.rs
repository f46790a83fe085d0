//! WebSocket connection handler
//!
//! Handles individual client connections: WebSocket handshake, frame
//! parsing, and bidirectional communication with the RoomCoordinator.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::coordinator::RoomCommand;
use crate::error::AppError;
use crate::message::{ClientMessage, ServerMessage};
use crate::types::{DisplayColor, SessionId};

/// Handle a new TCP connection
///
/// Performs the WebSocket handshake, registers the session with the
/// coordinator, and manages the connection lifecycle. The coordinator
/// drives everything the client receives, including the initial roster
/// replay; this handler never writes frames of its own.
pub async fn handle_connection(
    stream: TcpStream,
    cmd_tx: mpsc::Sender<RoomCommand>,
) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    debug!("New TCP connection from {}", peer_addr);

    // WebSocket handshake
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    // Assign the session id at accept time
    let session_id = SessionId::new();
    info!("Session {} connected from {}", session_id, peer_addr);

    // Create channel for server -> client messages
    let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(32);

    // Register with the coordinator; it replies with the roster replay
    if cmd_tx
        .send(RoomCommand::Connect {
            session_id,
            sender: msg_tx,
        })
        .await
        .is_err()
    {
        error!("Failed to register session {} - coordinator closed", session_id);
        return Err(AppError::ChannelSend);
    }

    // Clone cmd_tx for read task
    let cmd_tx_read = cmd_tx.clone();

    // Spawn read task (WebSocket -> RoomCommand)
    let read_task = tokio::spawn(async move {
        while let Some(msg_result) = ws_receiver.next().await {
            match msg_result {
                Ok(Message::Text(text)) => {
                    match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(client_msg) => {
                            let cmd = client_message_to_command(session_id, client_msg);
                            if cmd_tx_read.send(cmd).await.is_err() {
                                debug!("Coordinator closed, ending read task for {}", session_id);
                                break;
                            }
                        }
                        Err(e) => {
                            // Malformed frame: drop it, keep the connection
                            warn!("Invalid frame from {}: {}", session_id, e);
                        }
                    }
                }
                Ok(Message::Close(_)) => {
                    debug!("Session {} sent close frame", session_id);
                    break;
                }
                Ok(Message::Ping(data)) => {
                    debug!("Ping from {}", session_id);
                    // Pong is handled automatically by tungstenite
                    let _ = data; // Suppress unused warning
                }
                Ok(Message::Pong(_)) => {
                    debug!("Pong from {}", session_id);
                }
                Ok(_) => {
                    // Binary or other message types - ignore
                }
                Err(e) => {
                    error!("WebSocket error for {}: {}", session_id, e);
                    break;
                }
            }
        }
        debug!("Read task ended for {}", session_id);
    });

    // Spawn write task (ServerMessage -> WebSocket)
    let write_task = tokio::spawn(async move {
        while let Some(msg) = msg_rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json.into())).await.is_err() {
                        debug!("WebSocket send failed, ending write task");
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to serialize message: {}", e);
                    // Continue - don't break on serialization errors
                }
            }
        }
        debug!("Write task ended for session");

        // Send close frame when done. An evicted session lands here when
        // the coordinator drops its sender.
        let _ = ws_sender.close().await;
    });

    // Wait for either task to complete
    tokio::select! {
        _ = read_task => {
            debug!("Read task completed for {}", session_id);
        }
        _ = write_task => {
            debug!("Write task completed for {}", session_id);
        }
    }

    // Send disconnect command
    let _ = cmd_tx
        .send(RoomCommand::Disconnect { session_id })
        .await;

    info!("Session {} disconnected", session_id);

    Ok(())
}

/// Convert a ClientMessage to a RoomCommand
///
/// The client-supplied `color`/`rgb` on cursor moves are validated at the
/// boundary and discarded here: the coordinator broadcasts the server-held
/// color, so a stale or forged value never propagates.
fn client_message_to_command(session_id: SessionId, msg: ClientMessage) -> RoomCommand {
    match msg {
        ClientMessage::Identify { persistent_user_id } => RoomCommand::Identify {
            session_id,
            persistent_user_id,
        },
        ClientMessage::CursorMove {
            position, normal, ..
        } => RoomCommand::CursorMove {
            session_id,
            position,
            normal,
        },
        ClientMessage::CursorLeave => RoomCommand::CursorLeave { session_id },
        ClientMessage::UserColorChange { color } => RoomCommand::ColorChange {
            session_id,
            color: DisplayColor::from_string(color),
        },
        ClientMessage::CameraSync { camera } => RoomCommand::CameraSync { session_id, camera },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Vec3;

    #[test]
    fn test_cursor_move_conversion_drops_client_color() {
        let session_id = SessionId::new();
        let msg = ClientMessage::CursorMove {
            position: Vec3::new(0.1, 0.2, 0.3),
            normal: Vec3::new(0.0, 1.0, 0.0),
            color: "hsl(0, 100%, 50%)".to_string(),
            rgb: [1.0, 0.0, 0.0],
        };

        match client_message_to_command(session_id, msg) {
            RoomCommand::CursorMove {
                session_id: id,
                position,
                normal,
            } => {
                assert_eq!(id, session_id);
                assert_eq!(position, Vec3::new(0.1, 0.2, 0.3));
                assert_eq!(normal, Vec3::new(0.0, 1.0, 0.0));
            }
            _ => panic!("Wrong command"),
        }
    }

    #[test]
    fn test_identify_conversion() {
        let session_id = SessionId::new();
        let msg = ClientMessage::Identify {
            persistent_user_id: "u1".to_string(),
        };

        match client_message_to_command(session_id, msg) {
            RoomCommand::Identify {
                persistent_user_id, ..
            } => assert_eq!(persistent_user_id, "u1"),
            _ => panic!("Wrong command"),
        }
    }
}
