//! Per-connection handler: socket upgrade, event routing, cleanup.
//!
//! Each accepted socket gets its own task. Outbound events flow through
//! the notifier into an unbounded channel that a writer task drains into
//! the WebSocket sink; inbound frames are decoded into
//! [`ClientEvent`]s and routed. When the socket dies — cleanly or not —
//! the same cleanup path runs: the registry gets a disconnect (starting
//! the grace window for any seat the connection held) and the notifier
//! forgets the channel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use glyphmatch_protocol::{
    ClientEvent, Codec, ConnectionId, ServerEvent,
};
use glyphmatch_room::{Notifier, PlayerAction, RoomError};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::server::GatewayState;
use crate::GlyphmatchError;

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection(
    stream: TcpStream,
    state: Arc<GatewayState>,
) -> Result<(), GlyphmatchError> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    let conn =
        ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed));
    tracing::debug!(%conn, "websocket accepted");

    let (mut sink, mut source) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();
    state.notifier.register(conn, tx);

    // Writer task: drain outbound events into the socket.
    let codec = state.codec;
    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let bytes = match codec.encode(&event) {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::error!(error = %e, "failed to encode event");
                    continue;
                }
            };
            if sink.send(Message::Binary(bytes.into())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    // Read loop.
    while let Some(msg) = source.next().await {
        match msg {
            Ok(Message::Binary(data)) => {
                dispatch_frame(&state, conn, &data).await;
            }
            Ok(Message::Text(text)) => {
                dispatch_frame(&state, conn, text.as_bytes()).await;
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => continue, // ping/pong/frame
            Err(e) => {
                tracing::debug!(%conn, error = %e, "socket error");
                break;
            }
        }
    }

    // Transport loss and clean close share one cleanup path; the room
    // (if any) starts its reconnect grace window here.
    tracing::info!(%conn, "connection closed");
    state.registry.lock().await.disconnect(conn).await;
    state.notifier.unregister(conn);
    writer.abort();
    Ok(())
}

/// Decodes one frame and routes the event.
async fn dispatch_frame(
    state: &Arc<GatewayState>,
    conn: ConnectionId,
    data: &[u8],
) {
    let event: ClientEvent = match state.codec.decode(data) {
        Ok(event) => event,
        Err(e) => {
            tracing::debug!(%conn, error = %e, "undecodable frame");
            send_error_code(state, conn, 400, &format!("invalid event: {e}"));
            return;
        }
    };

    match event {
        ClientEvent::CreateRoom { theme, name } => {
            let result = {
                let mut registry = state.registry.lock().await;
                if let Some(current) = registry.room_of(conn) {
                    Err(RoomError::AlreadyInRoom(conn, current.clone()))
                } else {
                    match registry.create_room(&theme) {
                        Ok(room_id) => {
                            registry
                                .join_room(conn, &room_id, None, name)
                                .await
                        }
                        Err(e) => Err(e),
                    }
                }
            };
            // The room itself replies with RoomJoined on success.
            if let Err(e) = result {
                send_error(state, conn, &e);
            }
        }

        ClientEvent::JoinRoom {
            room_id,
            resume_id,
            name,
        } => {
            let result = state
                .registry
                .lock()
                .await
                .join_room(conn, &room_id, resume_id, name)
                .await;
            if let Err(e) = result {
                send_error(state, conn, &e);
            }
        }

        ClientEvent::QuickMatch { theme, name } => {
            let result = state
                .registry
                .lock()
                .await
                .quick_match(conn, &theme, name)
                .await;
            if let Err(e) = result {
                send_error(state, conn, &e);
            }
        }

        ClientEvent::LeaveRoom => {
            let result = state.registry.lock().await.leave(conn).await;
            if let Err(e) = result {
                send_error(state, conn, &e);
            }
        }

        ClientEvent::SetReady { ready } => {
            route(state, conn, PlayerAction::SetReady { ready }).await;
        }
        ClientEvent::AssetsLoaded => {
            route(state, conn, PlayerAction::AssetsLoaded).await;
        }
        ClientEvent::Select { symbol } => {
            route(state, conn, PlayerAction::Select { symbol }).await;
        }
        ClientEvent::ForceActivate => {
            route(state, conn, PlayerAction::ForceActivate).await;
        }
        ClientEvent::ForceReset => {
            route(state, conn, PlayerAction::ForceReset).await;
        }
    }
}

/// Routes an in-room action; rejections go back to the sender only.
async fn route(
    state: &Arc<GatewayState>,
    conn: ConnectionId,
    action: PlayerAction,
) {
    let result = state.registry.lock().await.route(conn, action).await;
    if let Err(e) = result {
        send_error(state, conn, &e);
    }
}

fn send_error(state: &Arc<GatewayState>, conn: ConnectionId, err: &RoomError) {
    send_error_code(state, conn, err.code(), &err.to_string());
}

fn send_error_code(
    state: &Arc<GatewayState>,
    conn: ConnectionId,
    code: u16,
    message: &str,
) {
    state.notifier.send_to_connection(
        conn,
        &ServerEvent::Error {
            code,
            message: message.to_string(),
        },
    );
}
