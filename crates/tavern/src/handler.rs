//! Per-connection handler: greeting, message loop, and disconnect cleanup.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Start the transport pumps and assign a fresh `ClientId`
//!   2. Send `connected` with the id and a reconnect token
//!   3. Loop: route every inbound frame
//!   4. On exit, the drop guard hands the client to the router's
//!      disconnect path

use std::sync::Arc;

use tavern_protocol::{ClientId, ProtocolError, Response, Welcome, tags};
use tavern_room::ClientRef;
use tavern_session::generate_token;
use tavern_transport::WebSocketConnection;

use crate::{LiveClient, Router, TavernError};

/// Drop guard that runs the disconnect path when the handler exits.
///
/// Everything it calls is synchronous, so cleanup happens inline even if
/// the handler task panics or is aborted.
struct DisconnectGuard {
    client: Arc<LiveClient>,
    reconnect_token: String,
    router: Arc<Router>,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        self.client.shutdown_transport();
        let client: ClientRef = self.client.clone();
        self.router.handle_disconnect(&client, &self.reconnect_token);
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection(
    conn: WebSocketConnection,
    router: Arc<Router>,
) -> Result<(), TavernError> {
    let conn_id = conn.id();
    let peer = conn.peer_addr();
    let (outbound, mut inbound) = conn.start();

    let client_id = ClientId::generate();
    let reconnect_token = generate_token();
    let live = LiveClient::new(client_id.clone(), outbound);
    let client: ClientRef = live.clone();
    tracing::info!(%conn_id, %peer, %client_id, "client connected");

    let _guard = DisconnectGuard {
        client: Arc::clone(&live),
        reconnect_token: reconnect_token.clone(),
        router: Arc::clone(&router),
    };

    let welcome = Welcome {
        client_id: client_id.clone(),
        reconnect_token,
    };
    let data = serde_json::to_value(&welcome).map_err(ProtocolError::Encode)?;
    client.send(Response::ok(tags::CONNECTED, data))?;

    while let Some(frame) = inbound.recv().await {
        router.handle_frame(&client, &frame);
    }

    tracing::info!(%conn_id, %client_id, "connection closed");
    Ok(())
}
