//! WebSocket endpoint: the bidirectional realtime channel
//!
//! Clients join and leave band channels and may submit mutations over
//! the socket; the server pushes `rehearsal_changed` /
//! `attendance_changed` events for every band the connection joined.
//! Mutations submitted here run through the same `ops` path as the REST
//! handlers, so persist-then-publish holds on both surfaces.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use chrono::NaiveDate;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use bandhall_common::attendance::AttendanceStatus;
use bandhall_common::{time, Error, Result};

use super::rehearsals::RehearsalForm;
use crate::{ops, AppState};

/// Client→server messages
#[derive(Debug, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    JoinBand { band_id: Uuid },

    #[serde(rename_all = "camelCase")]
    LeaveBand { band_id: Uuid },

    /// Create (no `rehearsalId`) or update a rehearsal rule
    #[serde(rename_all = "camelCase")]
    RehearsalUpdate {
        #[serde(default)]
        rehearsal_id: Option<Uuid>,
        rehearsal: RehearsalForm,
    },

    #[serde(rename_all = "camelCase")]
    AttendanceUpdate {
        band_id: Uuid,
        rehearsal_id: Uuid,
        date: NaiveDate,
        member_id: Uuid,
        status: AttendanceStatus,
    },
}

/// GET /ws
pub async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_id = Uuid::new_v4();
    let (tx, mut rx) = mpsc::unbounded_channel();
    state.broadcaster.register_connection(connection_id, tx);

    let (mut sender, mut receiver) = socket.split();

    // Forward published events to this client.
    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!("failed to serialize event: {}", e),
            }
        }
    });

    // Process client messages until disconnect.
    while let Some(Ok(message)) = receiver.next().await {
        match message {
            Message::Text(text) => {
                if let Err(e) = handle_client_message(&state, connection_id, &text).await {
                    warn!("connection {}: message rejected: {}", connection_id, e);
                }
            }
            Message::Close(_) => break,
            // Pings are answered by axum; other frames are ignored
            _ => {}
        }
    }

    // Transport-level disconnect events are reliable; tear down
    // membership and the outbound queue immediately.
    state.broadcaster.disconnect(connection_id);
    send_task.abort();
}

async fn handle_client_message(
    state: &AppState,
    connection_id: Uuid,
    text: &str,
) -> Result<()> {
    let message: ClientMessage = serde_json::from_str(text)
        .map_err(|e| Error::InvalidInput(format!("malformed channel message: {}", e)))?;

    match message {
        ClientMessage::JoinBand { band_id } => {
            state.registry.join(connection_id, band_id);
            info!("connection {} joined band {}", connection_id, band_id);
        }
        ClientMessage::LeaveBand { band_id } => {
            state.registry.leave(connection_id, band_id);
            info!("connection {} left band {}", connection_id, band_id);
        }
        ClientMessage::RehearsalUpdate {
            rehearsal_id,
            rehearsal,
        } => match rehearsal_id {
            Some(id) => {
                ops::update_rehearsal(state, id, rehearsal.into_rehearsal(id, time::now()))
                    .await?;
            }
            None => {
                ops::create_rehearsal(
                    state,
                    rehearsal.into_rehearsal(Uuid::new_v4(), time::now()),
                )
                .await?;
            }
        },
        ClientMessage::AttendanceUpdate {
            band_id,
            rehearsal_id,
            date,
            member_id,
            status,
        } => {
            debug!(
                "connection {} attendance update for band {}",
                connection_id, band_id
            );
            ops::set_attendance(state, rehearsal_id, date, member_id, status).await?;
        }
    }
    Ok(())
}
