use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;

use super::error::ApiError;
use super::AppState;
use crate::coordinator::{Coordinator, ProgressReport, ResultReport};
use crate::error::{CoordinatorError, ErrorKind};
use crate::transport::{Message, PeerMessage, Transport};

/// Interval between keep-alive pings.
const PING_INTERVAL_SECS: u64 = 30;

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectParams {
    pub team_id: String,
    pub peer_id: String,
}

/// Upgrade to a peer connection once the peer is authorized for the team.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<ConnectParams>,
) -> Response {
    if let Err(e) = state.coordinator.authorize(&params.team_id, &params.peer_id) {
        tracing::warn!(team_id = %params.team_id, peer_id = %params.peer_id, "Rejected peer connection");
        return ApiError::from(e).into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, state, params))
}

/// Drive one peer connection.
///
/// A sender task forwards hub messages and keep-alive pings to the socket
/// while this task decodes inbound frames and applies them to the coordinator.
async fn handle_socket(socket: WebSocket, state: AppState, params: ConnectParams) {
    let ConnectParams { team_id, peer_id } = params;
    let (conn_id, mut rx) = state.hub.connect(&team_id, &peer_id).await;

    if let Err(e) = state.coordinator.connect_peer(&team_id, &peer_id).await {
        tracing::warn!(peer_id = %peer_id, error = %e, "Peer registration failed");
        state.hub.disconnect(&peer_id, conn_id).await;
        return;
    }
    tracing::info!(peer_id = %peer_id, team_id = %team_id, conn_id = %conn_id, "Peer connected");

    let (mut sink, mut stream) = socket.split();

    let sender_peer = peer_id.clone();
    let send_task = tokio::spawn(async move {
        let mut ping = tokio::time::interval(Duration::from_secs(PING_INTERVAL_SECS));
        ping.tick().await;
        loop {
            tokio::select! {
                outgoing = rx.recv() => {
                    let Some(message) = outgoing else { break };
                    let text = match serde_json::to_string(&message) {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::warn!(peer_id = %sender_peer, error = %e, "Failed to encode message");
                            continue;
                        }
                    };
                    if sink.send(WsMessage::Text(text)).await.is_err() {
                        tracing::debug!(peer_id = %sender_peer, "Peer socket closed");
                        break;
                    }
                }
                _ = ping.tick() => {
                    if sink.send(WsMessage::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
        let _ = sink.close().await;
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => {
                let reply = match serde_json::from_str::<PeerMessage>(&text) {
                    Ok(message) => handle_peer_message(&state.coordinator, &peer_id, message).await,
                    Err(e) => Some(Message::Error {
                        code: ErrorKind::InvalidInput.code().to_string(),
                        message: format!("malformed message: {}", e),
                    }),
                };
                if let Some(reply) = reply {
                    if let Err(e) = state.hub.send_to_peer(&peer_id, &reply).await {
                        tracing::debug!(peer_id = %peer_id, error = %e, "Reply not delivered");
                    }
                }
            }
            Ok(WsMessage::Pong(_)) => {
                state.coordinator.heartbeat(&peer_id);
            }
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(peer_id = %peer_id, error = %e, "Peer socket error");
                break;
            }
        }
    }

    if state.hub.disconnect(&peer_id, conn_id).await {
        state.coordinator.disconnect_peer(&peer_id).await;
    }
    send_task.abort();
    tracing::info!(peer_id = %peer_id, conn_id = %conn_id, "Peer connection closed");
}

/// Apply one inbound peer message. Returns the reply to send back, if any.
pub async fn handle_peer_message(
    coordinator: &Coordinator,
    peer_id: &str,
    message: PeerMessage,
) -> Option<Message> {
    match message {
        PeerMessage::Heartbeat => {
            coordinator.heartbeat(peer_id);
            None
        }
        PeerMessage::ReportProgress {
            job_id,
            attempted,
            total,
            rate,
        } => coordinator
            .report_progress(
                job_id,
                peer_id,
                ProgressReport {
                    attempted,
                    total,
                    rate,
                },
            )
            .await
            .err()
            .map(error_message),
        PeerMessage::EngineStatus {
            job_id,
            engine,
            output,
        } => coordinator
            .report_engine_output(job_id, peer_id, engine, &output)
            .await
            .err()
            .map(error_message),
        PeerMessage::ReportResult {
            job_id,
            success,
            plaintext,
            engine,
        } => {
            let report = ResultReport {
                success,
                plaintext,
                engine,
            };
            match coordinator.report_result(job_id, peer_id, report).await {
                Ok(ack) => Some(Message::ResultAck {
                    job_id,
                    accepted: ack.accepted,
                }),
                Err(e) => Some(error_message(e)),
            }
        }
    }
}

fn error_message(err: CoordinatorError) -> Message {
    Message::Error {
        code: err.kind().code().to_string(),
        message: err.to_string(),
    }
}
