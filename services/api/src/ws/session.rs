//! Manages the WebSocket connection lifecycle for a trainer session.

use crate::{state::AppState, ws::runtime};
use axum::{
    extract::{
        State,
        ws::{WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use std::sync::Arc;
use tracing::{error, info, instrument};
use uuid::Uuid;

/// Axum handler to upgrade an HTTP connection to a WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Main handler for an individual WebSocket connection.
///
/// One connection is one trainer session: the session object, its timers and
/// its in-flight classification all live inside the runtime loop and die with
/// the connection.
#[instrument(name = "trainer_session", skip_all, fields(session_id))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let session_id = Uuid::new_v4();
    tracing::Span::current().record("session_id", tracing::field::display(session_id));
    info!("New WebSocket connection");

    if let Err(e) = runtime::run_session(state, socket, session_id).await {
        error!(error = ?e, "Trainer session terminated with error");
    }
    info!("Trainer session finished");
}
