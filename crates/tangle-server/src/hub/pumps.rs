//! The socket loops behind an upgraded connection.
//!
//! Each connection runs two pumps. The write pump owns the socket's send
//! half: it forwards queued frames, drains the overflow buffer whenever
//! the queue has room, and pings on a timer, tearing the connection down
//! when a peer stops answering. The read pump owns the receive half: it
//! decodes inbound envelopes and hands them to the router. Either pump
//! exiting closes the connection and wakes the other via its token.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use metrics::{counter, histogram};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use tangle_core::UserId;
use tangle_core::constants::{OUTBOUND_QUEUE_CAPACITY, PING_PERIOD, PONG_WAIT};
use tangle_core::envelope::{ClientMessage, ServerMessage};

use crate::hub::Connection;
use crate::router;
use crate::server::AppState;
use crate::snapshot;

/// Drive a user's socket until it closes, for any reason.
pub async fn run_connection(socket: WebSocket, user_id: UserId, state: AppState) {
    let (ws_tx, ws_rx) = socket.split();
    let (tx, rx) = mpsc::channel::<Arc<str>>(OUTBOUND_QUEUE_CAPACITY);
    let connection = Arc::new(Connection::new(user_id, tx));
    let _ = state.hub.register(Arc::clone(&connection)).await;
    counter!("ws_connections_total").increment(1);

    // Still `Connecting` here: queue the snapshot as the first frame and
    // join the room of every existing relation, so broadcasts reach this
    // connection before it has spoken.
    let built = state
        .store
        .conn()
        .and_then(|conn| snapshot::build(&conn, user_id));
    match built {
        Ok(snapshot) => {
            for relation in snapshot.user_relations.values() {
                let _ = state
                    .hub
                    .join_room(&relation.room_id, Arc::clone(&connection))
                    .await;
            }
            let _ = connection.send_message(&ServerMessage::Snapshot(snapshot));
        }
        Err(err) => {
            warn!(user_id, error = %err, "snapshot build failed");
        }
    }
    let _ = connection.activate();

    let writer = tokio::spawn(write_pump(ws_tx, rx, Arc::clone(&connection)));

    read_pump(ws_rx, &connection, &state).await;

    // Unregistering closes the connection, which cancels the token the
    // write pump selects on.
    let _ = state.hub.unregister(&connection).await;
    let _ = writer.await;
    histogram!("ws_connection_duration_seconds").record(connection.age().as_secs_f64());
    debug!(user_id, "socket loops finished");
}

async fn write_pump(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Arc<str>>,
    connection: Arc<Connection>,
) {
    let cancel = connection.cancel_token();
    let mut ping = tokio::time::interval(PING_PERIOD);
    // The interval fires immediately; the first ping can wait a period.
    let _ = ping.tick().await;

    loop {
        tokio::select! {
            frame = rx.recv() => {
                let Some(frame) = frame else { break };
                if ws_tx.send(Message::Text(frame.to_string().into())).await.is_err() {
                    break;
                }
                // Queue space just opened up; pull buffered frames forward.
                let _ = connection.drain_overflow();
            }
            _ = ping.tick() => {
                if !connection.check_alive() && connection.last_pong_elapsed() > PONG_WAIT {
                    info!(user_id = connection.user_id, "peer stopped answering pings");
                    counter!("ws_ping_timeouts_total").increment(1);
                    let _ = connection.close();
                    break;
                }
                if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
                let _ = connection.drain_overflow();
            }
            () = cancel.cancelled() => {
                // Draining: flush whatever is already queued, then stop.
                while let Ok(frame) = rx.try_recv() {
                    if ws_tx.send(Message::Text(frame.to_string().into())).await.is_err() {
                        break;
                    }
                }
                break;
            }
        }
    }
    // However the loop ended, teardown is under way: make sure the read
    // pump wakes, then finish the state machine.
    let _ = connection.close();
    connection.finish_close();
    let _ = ws_tx.close().await;
}

async fn read_pump(
    mut ws_rx: SplitStream<WebSocket>,
    connection: &Arc<Connection>,
    state: &AppState,
) {
    let user_id = connection.user_id;
    let cancel = connection.cancel_token();
    loop {
        tokio::select! {
            incoming = ws_rx.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        connection.mark_alive();
                        handle_frame(state, connection, &text).await;
                    }
                    Some(Ok(Message::Pong(_) | Message::Ping(_))) => {
                        connection.mark_alive();
                    }
                    Some(Ok(Message::Binary(_))) => {
                        connection.mark_alive();
                        warn!(user_id, "ignoring binary frame");
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(user_id, "peer closed the socket");
                        return;
                    }
                    Some(Err(err)) => {
                        debug!(user_id, error = %err, "socket read failed");
                        return;
                    }
                }
            }
            () = cancel.cancelled() => return,
        }
    }
}

/// Decode one inbound frame and dispatch it. Handler errors are logged
/// and the connection lives on; only transport failures end the pump.
async fn handle_frame(state: &AppState, connection: &Arc<Connection>, text: &str) {
    let user_id = connection.user_id;
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => {
            let kind = message.kind();
            if let Err(err) = router::dispatch(state, connection, message).await {
                counter!("router_frame_errors_total", "kind" => kind).increment(1);
                warn!(user_id, kind, error = %err, "frame handling failed");
            }
        }
        Err(err) => {
            counter!("ws_malformed_frames_total").increment(1);
            warn!(user_id, error = %err, "dropping malformed frame");
        }
    }
}
