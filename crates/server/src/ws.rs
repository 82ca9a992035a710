//! WebSocket entry point for the chat relay.

use axum::{
    extract::{ws::WebSocket, State, WebSocketUpgrade},
    response::Response,
};
use futures_util::StreamExt;

use crate::chat::{session, ChatIdentity, SessionHandle};
use crate::middleware::auth::MaybeAuthUser;
use crate::state::AppState;

/// Hard transport ceiling; the chat size limit is applied per frame by the reader.
const MAX_TRANSPORT_MESSAGE: usize = 64 * 1024;

/// Upgrade to a chat session. A valid token yields a member session; anything
/// else a read-only guest.
pub async fn ws_handler(
    State(state): State<AppState>,
    MaybeAuthUser(identity): MaybeAuthUser,
    ws: WebSocketUpgrade,
) -> Response {
    let identity = match identity {
        Some(identity) => ChatIdentity::from(identity),
        None => ChatIdentity::guest(),
    };
    tracing::debug!(name = %identity.display_name(), read_only = identity.is_read_only(), "Chat upgrade");

    ws.max_message_size(MAX_TRANSPORT_MESSAGE)
        .on_upgrade(move |socket| handle_socket(socket, identity, state))
}

async fn handle_socket(socket: WebSocket, identity: ChatIdentity, state: AppState) {
    let (sender, receiver) = socket.split();
    let (handle, outbound) = SessionHandle::new(identity, state.hub.config().outbound_capacity);

    if let Err(e) = state.hub.register(handle.clone()).await {
        tracing::warn!(error = %e, "Rejecting chat connection");
        return;
    }

    session::run(state.hub.clone(), state.messages.clone(), handle.clone(), outbound, sender, receiver).await;
    tracing::info!(session_id = handle.id(), "Chat connection closed");
}
