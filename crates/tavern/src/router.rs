//! The message router: turns inbound envelopes into room operations and
//! game calls, and answers every request with exactly one response.
//!
//! | inbound type   | success reply       | failure reply        |
//! |----------------|---------------------|----------------------|
//! | `create_room`  | `join_room_result`  | `create_room_result` |
//! | `join_room`    | `join_room_result`  | `join_room_result`   |
//! | `leave_room`   | `leave_room_result` | `leave_room_result`  |
//! | `reconnect`    | `reconnect_result`  | `reconnect_result`   |
//! | `add_bot`      | `add_bot_result`    | `add_bot_result`     |
//! | anything else  | `<type>_result`     | `<type>_result`      |
//!
//! Frames that aren't valid envelopes get a failed `error` response.
//! Routing failures never close the connection.

use std::sync::Arc;

use serde_json::{Value, json};
use tavern_protocol::{Codec, Envelope, JsonCodec, ReconnectRequest, Response, RoomId, tags};
use tavern_room::{ClientRef, GameRegistry, Room, RoomDirectory, RoomError};
use tavern_session::{SessionData, SessionStore};

use crate::RouteError;

/// Dispatches envelopes for every connection on a server.
pub struct Router {
    registry: Arc<GameRegistry>,
    directory: Arc<RoomDirectory>,
    sessions: Arc<SessionStore>,
    codec: JsonCodec,
}

impl Router {
    /// Creates a router with a fresh room directory over `registry`.
    pub fn new(registry: Arc<GameRegistry>, sessions: Arc<SessionStore>) -> Self {
        let directory = Arc::new(RoomDirectory::new(Arc::clone(&registry)));
        Self {
            registry,
            directory,
            sessions,
            codec: JsonCodec,
        }
    }

    /// The game registry.
    pub fn registry(&self) -> &Arc<GameRegistry> {
        &self.registry
    }

    /// The room directory.
    pub fn directory(&self) -> &Arc<RoomDirectory> {
        &self.directory
    }

    /// The session store.
    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    // -- Entry points -----------------------------------------------------

    /// Decodes one raw frame and routes it.
    pub fn handle_frame(&self, client: &ClientRef, frame: &[u8]) {
        match self.codec.decode_envelope(frame) {
            Ok(envelope) => self.handle_envelope(client, envelope),
            Err(e) => {
                tracing::debug!(client_id = %client.id(), error = %e, "malformed envelope");
                reply(
                    client,
                    Response::fail(tags::ERROR, RouteError::MalformedEnvelope.to_string()),
                );
            }
        }
    }

    /// Routes one decoded envelope and sends the reply to `client`.
    pub fn handle_envelope(&self, client: &ClientRef, envelope: Envelope) {
        let message_type = envelope.message_type.clone();
        tracing::debug!(client_id = %client.id(), %message_type, "routing message");

        let (ok_tag, result) = match message_type.as_str() {
            tags::CREATE_ROOM => (tags::JOIN_ROOM_RESULT.to_string(), self.create_room(client, &envelope)),
            tags::JOIN_ROOM => (tags::JOIN_ROOM_RESULT.to_string(), self.join_room(client, &envelope)),
            tags::LEAVE_ROOM => (tags::LEAVE_ROOM_RESULT.to_string(), self.leave_room(client)),
            tags::RECONNECT => (tags::RECONNECT_RESULT.to_string(), self.reconnect(client, &envelope)),
            tags::ADD_BOT => (tags::ADD_BOT_RESULT.to_string(), self.add_bot(client, &envelope)),
            _ => (tags::result_of(&message_type), self.game_message(client, envelope)),
        };

        let response = match result {
            Ok(data) => Response::ok(ok_tag, data),
            Err(e) => {
                tracing::debug!(client_id = %client.id(), %message_type, error = %e, "request failed");
                Response::fail(tags::result_of(&message_type), e.to_string())
            }
        };
        reply(client, response);
    }

    // -- Room lifecycle ---------------------------------------------------

    fn create_room(&self, client: &ClientRef, envelope: &Envelope) -> Result<Value, RouteError> {
        let game_type = envelope
            .game_type
            .as_ref()
            .ok_or(RouteError::MissingField("gameType"))?;
        let room = self
            .directory
            .create_room(game_type, envelope.room_id.clone(), &envelope.data)?;
        self.enter(client, &room, &envelope.data)?;
        Ok(room_summary(&room))
    }

    fn join_room(&self, client: &ClientRef, envelope: &Envelope) -> Result<Value, RouteError> {
        let room_id = envelope
            .room_id
            .as_ref()
            .ok_or(RouteError::MissingField("roomId"))?;
        let room = self.directory.get_room(room_id)?;
        self.enter(client, &room, &envelope.data)?;
        Ok(room_summary(&room))
    }

    fn leave_room(&self, client: &ClientRef) -> Result<Value, RouteError> {
        let room = client.room().ok_or(RouteError::NoCurrentRoom)?;
        self.depart(client, &room);
        Ok(json!({ "roomId": room.id() }))
    }

    /// Joins `client` to `room` and runs the game's join hook. If the hook
    /// fails the join is rolled back.
    ///
    /// A closed target is refused before the client departs its current
    /// room, so a failed join leaves that room untouched.
    fn enter(&self, client: &ClientRef, room: &Arc<Room>, options: &Value) -> Result<(), RouteError> {
        let current = client.room();
        if current.as_ref().is_some_and(|c| Arc::ptr_eq(c, room)) {
            return Ok(());
        }
        if room.is_closed() {
            return Err(RouteError::RoomClosed(room.id().clone()));
        }
        if let Some(current) = current {
            self.depart(client, &current);
        }

        room.join(client)?;
        if let Err(e) = self.registry.on_client_join(client, room, options) {
            tracing::warn!(client_id = %client.id(), room_id = %room.id(), error = %e, "join hook failed");
            room.leave(client.as_ref());
            return Err(e.into());
        }
        Ok(())
    }

    /// Runs the game's leave hook, then removes `client` from `room`.
    fn depart(&self, client: &ClientRef, room: &Arc<Room>) {
        if let Err(e) = self.registry.on_client_leave(client, room) {
            tracing::warn!(client_id = %client.id(), room_id = %room.id(), error = %e, "leave hook failed");
        }
        room.leave(client.as_ref());
        client.set_room(None);
    }

    // -- Reconnection -----------------------------------------------------

    fn reconnect(&self, client: &ClientRef, envelope: &Envelope) -> Result<Value, RouteError> {
        let request: ReconnectRequest =
            serde_json::from_value(envelope.data.clone()).map_err(|_| RouteError::MalformedEnvelope)?;

        let session = self.sessions.take_for_reconnect(
            &request.client_id,
            &request.reconnect_token,
            envelope.room_id.as_ref(),
        )?;
        let room = self.directory.get_room(&session.room_id)?;

        if let Some(current) = client.room() {
            if !Arc::ptr_eq(&current, &room) {
                self.depart(client, &current);
            }
        }

        room.rebind(&session.client_id, client).map_err(|e| match e {
            // The seat was released in the meantime.
            RoomError::NotInRoom(..) => RouteError::SessionNotFound,
            other => other.into(),
        })?;

        if let Err(e) = self
            .registry
            .on_client_reconnect(client, &room, &session.client_id)
        {
            tracing::warn!(client_id = %client.id(), room_id = %room.id(), error = %e, "reconnect hook failed");
        }

        tracing::info!(
            client_id = %client.id(),
            old_client_id = %session.client_id,
            room_id = %room.id(),
            "client reconnected"
        );
        Ok(room_summary(&room))
    }

    // -- Bots and game traffic --------------------------------------------

    fn add_bot(&self, client: &ClientRef, envelope: &Envelope) -> Result<Value, RouteError> {
        let room = client.room().ok_or(RouteError::NoCurrentRoom)?;
        let bot = self.registry.on_bot_add(client, &room)?;

        room.join(&bot)?;
        if let Err(e) = self.registry.on_client_join(&bot, &room, &envelope.data) {
            tracing::warn!(bot_id = %bot.id(), room_id = %room.id(), error = %e, "bot join hook failed");
            bot.close();
            return Err(e.into());
        }

        tracing::info!(bot_id = %bot.id(), room_id = %room.id(), "bot added");
        let members = room.member_ids();
        Ok(json!({
            "botId": bot.id(),
            "roomId": room.id(),
            "clients": members.len(),
            "members": members,
        }))
    }

    fn game_message(&self, client: &ClientRef, envelope: Envelope) -> Result<Value, RouteError> {
        let room = client.room().ok_or(RouteError::NoCurrentRoom)?;
        match self
            .registry
            .handle_message(client, &room, &envelope.message_type, envelope.data)
        {
            Ok(value) => Ok(value.unwrap_or(Value::Null)),
            Err(e) => {
                tracing::warn!(
                    client_id = %client.id(),
                    room_id = %room.id(),
                    message_type = %envelope.message_type,
                    error = %e,
                    "game handler error"
                );
                Err(e.into())
            }
        }
    }

    // -- Disconnects and expiry -------------------------------------------

    /// Handles a live connection whose transport is gone.
    ///
    /// If the client sits in an open room, its seat is kept: a session is
    /// stored under its id and token, and the other members are told it
    /// dropped. Otherwise the client is simply closed.
    pub fn handle_disconnect(&self, client: &ClientRef, reconnect_token: &str) {
        let seat = client
            .room()
            .filter(|room| !room.is_closed() && room.member(client.id()).is_some());

        let Some(room) = seat else {
            client.close();
            return;
        };

        self.sessions.store(SessionData::new(
            client.id().clone(),
            room.id().clone(),
            room.game_type().clone(),
            reconnect_token,
        ));
        room.broadcast(
            &Response::ok(
                tags::CLIENT_DISCONNECTED,
                json!({ "clientId": client.id(), "roomId": room.id() }),
            ),
            std::slice::from_ref(client.id()),
        );
        tracing::info!(client_id = %client.id(), room_id = %room.id(), "client disconnected, seat held");
    }

    /// Purges expired sessions and releases their seats. Returns how many
    /// seats were released.
    pub fn expire_sessions(&self) -> usize {
        let expired = self.sessions.purge_expired();
        self.release_sessions(expired)
    }

    /// Removes each session's stale identity from its room, running the
    /// game's leave hook first. Returns how many seats were released.
    pub fn release_sessions(&self, sessions: Vec<SessionData>) -> usize {
        let mut released = 0;
        for session in sessions {
            let Ok(room) = self.directory.get_room(&session.room_id) else {
                continue;
            };
            let Some(member) = room.member(&session.client_id) else {
                continue;
            };
            self.depart(&member, &room);
            member.close();
            released += 1;
            tracing::info!(
                client_id = %session.client_id,
                room_id = %session.room_id,
                "seat released after session expiry"
            );
        }
        released
    }

    /// Looks up a room by id.
    pub fn room(&self, room_id: &RoomId) -> Option<Arc<Room>> {
        self.directory.get_room(room_id).ok()
    }
}

/// `{roomId, gameType, clients, members}` for join-style replies.
fn room_summary(room: &Room) -> Value {
    let members = room.member_ids();
    json!({
        "roomId": room.id(),
        "gameType": room.game_type(),
        "clients": members.len(),
        "members": members,
    })
}

fn reply(client: &ClientRef, response: Response) {
    if let Err(e) = client.send(response) {
        tracing::debug!(client_id = %client.id(), error = %e, "could not deliver reply");
    }
}
