//! A client that records everything it is sent. Used by tests across the
//! workspace, so it lives in the library rather than behind `cfg(test)`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tavern_protocol::{ClientId, Response};

use crate::{Client, ClientError, Room, RoomLink};

/// Records every response; `send` never fails.
#[derive(Debug)]
pub struct MockClient {
    id: ClientId,
    link: RoomLink,
    received: Mutex<Vec<Response>>,
    closed: AtomicBool,
}

impl MockClient {
    /// Creates a mock client with the given id.
    pub fn new(id: impl Into<ClientId>) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            link: RoomLink::new(),
            received: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    /// Everything sent so far, oldest first.
    pub fn received(&self) -> Vec<Response> {
        self.log().clone()
    }

    /// The type tags of everything sent so far.
    pub fn received_types(&self) -> Vec<String> {
        self.log().iter().map(|r| r.message_type.clone()).collect()
    }

    /// The most recent response, if any.
    pub fn last(&self) -> Option<Response> {
        self.log().last().cloned()
    }

    /// Forgets everything received so far.
    pub fn clear(&self) {
        self.log().clear();
    }

    /// Whether [`close`](Client::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn log(&self) -> MutexGuard<'_, Vec<Response>> {
        self.received.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Client for MockClient {
    fn id(&self) -> &ClientId {
        &self.id
    }

    fn send(&self, response: Response) -> Result<(), ClientError> {
        self.log().push(response);
        Ok(())
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
    }
}
