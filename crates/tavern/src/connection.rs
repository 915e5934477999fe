//! The live client: a [`Client`] backed by a WebSocket connection.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tavern_protocol::{ClientId, Codec, JsonCodec, Response};
use tavern_room::{Client, ClientError, Room, RoomLink};
use tavern_transport::{Outbound, TransportError};

/// A connected WebSocket peer.
///
/// `send` encodes to JSON and pushes onto the connection's bounded
/// outbound queue without waiting. Once the transport is gone every send
/// fails with [`ClientError::Closed`], but the client keeps its room seat
/// until it is closed or its session expires.
pub struct LiveClient {
    id: ClientId,
    outbound: Outbound,
    codec: JsonCodec,
    link: RoomLink,
    closed: AtomicBool,
}

impl LiveClient {
    /// Wraps the sending half of a started connection.
    pub fn new(id: ClientId, outbound: Outbound) -> Arc<Self> {
        Arc::new(Self {
            id,
            outbound,
            codec: JsonCodec,
            link: RoomLink::new(),
            closed: AtomicBool::new(false),
        })
    }

    /// Stops the connection's pumps without touching room membership.
    pub fn shutdown_transport(&self) {
        self.outbound.close();
    }

    /// Whether the client was closed or its transport is gone.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.outbound.is_closed()
    }
}

impl Client for LiveClient {
    fn id(&self) -> &ClientId {
        &self.id
    }

    fn send(&self, response: Response) -> Result<(), ClientError> {
        if self.is_closed() {
            return Err(ClientError::Closed(self.id.clone()));
        }
        let bytes = self
            .codec
            .encode_response(&response)
            .map_err(|e| ClientError::Encode(self.id.clone(), e.to_string()))?;
        self.outbound.try_send(bytes).map_err(|e| match e {
            TransportError::QueueFull(_) => ClientError::Full(self.id.clone()),
            _ => ClientError::Closed(self.id.clone()),
        })
    }

    fn room(&self) -> Option<Arc<Room>> {
        self.link.get()
    }

    fn set_room(&self, room: Option<&Arc<Room>>) {
        self.link.set(room);
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(room) = self.link.take() {
            room.leave(self);
        }
        self.outbound.close();
        tracing::debug!(client_id = %self.id, "client closed");
    }
}
