//! A room: members, one opaque state value, and a closed flag behind a
//! single mutex.
//!
//! # Locking rules
//!
//! - Every operation takes the room's lock only long enough to read or
//!   change the member list, state or flag.
//! - Messages are sent after the lock is released, to a snapshot of the
//!   members taken under it. A slow or broken client can't stall the room.
//! - No method calls into another room while holding this one's lock.
//!
//! ```text
//!   open ──(last member leaves / close())──→ closed (terminal)
//! ```

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::json;
use tavern_protocol::{ClientId, GameType, Response, RoomId, tags};

use crate::{Client, ClientRef, RoomError, RoomState};

struct RoomInner {
    /// Members in join order.
    members: Vec<ClientRef>,
    state: RoomState,
    closed: bool,
}

impl RoomInner {
    fn position(&self, id: &ClientId) -> Option<usize> {
        self.members.iter().position(|m| m.id() == id)
    }

    fn ids(&self) -> Vec<ClientId> {
        self.members.iter().map(|m| m.id().clone()).collect()
    }

    fn others(&self, id: &ClientId) -> Vec<ClientRef> {
        self.members
            .iter()
            .filter(|m| m.id() != id)
            .cloned()
            .collect()
    }
}

/// An isolated group of clients playing one game.
///
/// Rooms are always handled as `Arc<Room>`; clients point back at them
/// weakly.
pub struct Room {
    id: RoomId,
    game_type: GameType,
    inner: Mutex<RoomInner>,
}

impl fmt::Debug for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Room")
            .field("id", &self.id)
            .field("game_type", &self.game_type)
            .finish_non_exhaustive()
    }
}

impl Room {
    /// Creates an open, empty room whose state is `()` until
    /// [`set_state`](Self::set_state) replaces it.
    pub fn new(id: RoomId, game_type: GameType) -> Arc<Self> {
        Arc::new(Self {
            id,
            game_type,
            inner: Mutex::new(RoomInner {
                members: Vec::new(),
                state: Box::new(()),
                closed: false,
            }),
        })
    }

    /// Returns the room's id.
    pub fn id(&self) -> &RoomId {
        &self.id
    }

    /// Returns the game type driving this room.
    pub fn game_type(&self) -> &GameType {
        &self.game_type
    }

    // -- Membership -------------------------------------------------------

    /// Adds `client` to the room.
    ///
    /// Once this room has accepted the client, it leaves any other room it
    /// was in; a refused join leaves it where it was. Joining a room the
    /// client is already in does nothing. Every other member receives
    /// `client_joined` with the updated member list.
    ///
    /// # Errors
    /// [`RoomError::Closed`] if the room has closed.
    pub fn join(self: &Arc<Self>, client: &ClientRef) -> Result<(), RoomError> {
        let (others, members) = {
            let mut inner = self.lock();
            if inner.closed {
                return Err(RoomError::Closed(self.id.clone()));
            }
            if inner.position(client.id()).is_some() {
                drop(inner);
                client.set_room(Some(self));
                return Ok(());
            }
            inner.members.push(Arc::clone(client));
            (inner.others(client.id()), inner.ids())
        };

        if let Some(current) = client.room() {
            if !Arc::ptr_eq(&current, self) {
                current.leave(client.as_ref());
            }
        }
        client.set_room(Some(self));

        tracing::info!(client_id = %client.id(), room_id = %self.id, "client joined room");
        self.deliver(
            &others,
            &Response::ok(
                tags::CLIENT_JOINED,
                json!({
                    "clientId": client.id(),
                    "roomId": self.id,
                    "clients": members.len(),
                    "members": members,
                }),
            ),
        );
        Ok(())
    }

    /// Removes `client` from the room.
    ///
    /// Remaining members receive `client_left`. If nobody is left, the
    /// room closes for good in the same critical section, so no join can
    /// land in the emptied room. Returns `false` if the client wasn't a
    /// member.
    pub fn leave(&self, client: &dyn Client) -> bool {
        let (remaining, members, emptied) = {
            let mut inner = self.lock();
            let Some(pos) = inner.position(client.id()) else {
                return false;
            };
            inner.members.remove(pos);
            let emptied = inner.members.is_empty() && !inner.closed;
            if emptied {
                inner.closed = true;
            }
            (inner.members.clone(), inner.ids(), emptied)
        };

        if client.room().is_some_and(|room| std::ptr::eq(Arc::as_ptr(&room), self)) {
            client.set_room(None);
        }

        tracing::info!(client_id = %client.id(), room_id = %self.id, "client left room");
        self.deliver(
            &remaining,
            &Response::ok(
                tags::CLIENT_LEFT,
                json!({
                    "clientId": client.id(),
                    "roomId": self.id,
                    "clients": members.len(),
                    "members": members,
                }),
            ),
        );

        if emptied {
            tracing::info!(room_id = %self.id, game_type = %self.game_type, "room closed");
        }
        true
    }

    /// Closes the room.
    ///
    /// Detaches every remaining member and sends each of them
    /// `room_closed`. Returns `false` if it was already closed.
    pub fn close(&self) -> bool {
        let members = {
            let mut inner = self.lock();
            if inner.closed {
                return false;
            }
            inner.closed = true;
            std::mem::take(&mut inner.members)
        };

        tracing::info!(room_id = %self.id, game_type = %self.game_type, "room closed");
        for member in &members {
            if member.room().is_some_and(|room| std::ptr::eq(Arc::as_ptr(&room), self)) {
                member.set_room(None);
            }
        }
        self.deliver(
            &members,
            &Response::ok(tags::ROOM_CLOSED, json!({ "roomId": self.id })),
        );
        true
    }

    /// Replaces the member `old_id` with `client` in place, keeping its
    /// seat. Used when a dropped client comes back under a new connection.
    ///
    /// The other members receive `client_reconnected`.
    ///
    /// # Errors
    /// - [`RoomError::Closed`] if the room has closed
    /// - [`RoomError::NotInRoom`] if `old_id` holds no seat here
    pub fn rebind(self: &Arc<Self>, old_id: &ClientId, client: &ClientRef) -> Result<(), RoomError> {
        if let Some(current) = client.room() {
            if !Arc::ptr_eq(&current, self) {
                current.leave(client.as_ref());
            }
        }

        let (replaced, others) = {
            let mut inner = self.lock();
            if inner.closed {
                return Err(RoomError::Closed(self.id.clone()));
            }
            let pos = inner
                .position(old_id)
                .ok_or_else(|| RoomError::NotInRoom(old_id.clone(), self.id.clone()))?;
            let replaced = std::mem::replace(&mut inner.members[pos], Arc::clone(client));
            // The new identity may already have a seat of its own.
            let new_id = client.id().clone();
            let mut seen = false;
            inner.members.retain(|m| {
                if *m.id() != new_id {
                    return true;
                }
                let keep = !seen;
                seen = true;
                keep
            });
            (replaced, inner.others(&new_id))
        };

        if replaced.room().is_some_and(|room| Arc::ptr_eq(&room, self)) {
            replaced.set_room(None);
        }
        client.set_room(Some(self));

        tracing::info!(
            client_id = %client.id(),
            old_client_id = %old_id,
            room_id = %self.id,
            "client reconnected to room"
        );
        self.deliver(
            &others,
            &Response::ok(
                tags::CLIENT_RECONNECTED,
                json!({ "clientId": client.id(), "oldClientId": old_id, "roomId": self.id }),
            ),
        );
        Ok(())
    }

    // -- Fan-out ----------------------------------------------------------

    /// Sends `response` to every member not listed in `exclude`.
    ///
    /// Failed deliveries are logged and skipped. Returns how many members
    /// accepted the message.
    pub fn broadcast(&self, response: &Response, exclude: &[ClientId]) -> usize {
        let targets: Vec<ClientRef> = self
            .lock()
            .members
            .iter()
            .filter(|m| !exclude.contains(m.id()))
            .cloned()
            .collect();
        self.deliver(&targets, response)
    }

    /// Sends `response` only to the listed members. Ids that are not
    /// members are ignored.
    pub fn broadcast_to(&self, response: &Response, targets: &[ClientId]) -> usize {
        let targets: Vec<ClientRef> = self
            .lock()
            .members
            .iter()
            .filter(|m| targets.contains(m.id()))
            .cloned()
            .collect();
        self.deliver(&targets, response)
    }

    fn deliver(&self, targets: &[ClientRef], response: &Response) -> usize {
        let mut delivered = 0;
        for target in targets {
            match target.send(response.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => tracing::debug!(
                    client_id = %target.id(),
                    room_id = %self.id,
                    message_type = %response.message_type,
                    error = %e,
                    "skipping delivery to unavailable client"
                ),
            }
        }
        delivered
    }

    // -- State ------------------------------------------------------------

    /// Runs `f` on the room's state under the room's lock and returns its
    /// result. This is the only way games mutate state, so each update is
    /// an atomic read-modify-write.
    ///
    /// `f` must not call back into this room.
    ///
    /// # Errors
    /// - [`RoomError::Closed`] if the room has closed
    /// - [`RoomError::StateTypeMismatch`] if the state is not a `T`
    pub fn update_state<T, R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R, RoomError>
    where
        T: Any + Send,
    {
        let mut inner = self.lock();
        if inner.closed {
            return Err(RoomError::Closed(self.id.clone()));
        }
        let state = inner
            .state
            .as_mut()
            .downcast_mut::<T>()
            .ok_or_else(|| RoomError::StateTypeMismatch(self.id.clone()))?;
        Ok(f(state))
    }

    /// Runs `f` on a shared borrow of the state. Works on closed rooms too.
    ///
    /// # Errors
    /// [`RoomError::StateTypeMismatch`] if the state is not a `T`.
    pub fn read_state<T, R>(&self, f: impl FnOnce(&T) -> R) -> Result<R, RoomError>
    where
        T: Any + Send,
    {
        let inner = self.lock();
        let state = inner
            .state
            .as_ref()
            .downcast_ref::<T>()
            .ok_or_else(|| RoomError::StateTypeMismatch(self.id.clone()))?;
        Ok(f(state))
    }

    /// Replaces the whole state value.
    ///
    /// # Errors
    /// [`RoomError::Closed`] if the room has closed.
    pub fn set_state<T: Any + Send>(&self, value: T) -> Result<(), RoomError> {
        self.replace_state(Box::new(value))
    }

    pub(crate) fn replace_state(&self, state: RoomState) -> Result<(), RoomError> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(RoomError::Closed(self.id.clone()));
        }
        inner.state = state;
        Ok(())
    }

    // -- Queries ----------------------------------------------------------

    /// Returns the member with this id.
    pub fn member(&self, id: &ClientId) -> Option<ClientRef> {
        let inner = self.lock();
        inner.position(id).map(|pos| Arc::clone(&inner.members[pos]))
    }

    /// Returns member ids in join order.
    pub fn member_ids(&self) -> Vec<ClientId> {
        self.lock().ids()
    }

    /// Returns the number of members.
    pub fn member_count(&self) -> usize {
        self.lock().members.len()
    }

    /// Whether the room has closed.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn lock(&self) -> MutexGuard<'_, RoomInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MockClient;

    fn room(id: &str) -> Arc<Room> {
        Room::new(RoomId::from(id), GameType::from("testGame"))
    }

    fn mock(id: &str) -> (Arc<MockClient>, ClientRef) {
        let client = MockClient::new(id);
        let as_ref: ClientRef = client.clone();
        (client, as_ref)
    }

    #[test]
    fn test_join_sets_room_and_notifies_others_only() {
        let room = room("r1");
        let (a, a_ref) = mock("a");
        let (b, b_ref) = mock("b");

        room.join(&a_ref).unwrap();
        room.join(&b_ref).unwrap();

        assert!(a.room().is_some_and(|r| Arc::ptr_eq(&r, &room)));
        let a_types = a.received_types();
        assert_eq!(a_types, vec![tags::CLIENT_JOINED]);
        assert_eq!(a.received()[0].data["clientId"], "b");
        assert_eq!(a.received()[0].data["clients"], 2);
        assert_eq!(a.received()[0].data["members"], json!(["a", "b"]));
        assert!(b.received().is_empty(), "the joiner is not told about itself");
    }

    #[test]
    fn test_join_same_room_twice_is_noop() {
        let room = room("r1");
        let (_a, a_ref) = mock("a");

        room.join(&a_ref).unwrap();
        room.join(&a_ref).unwrap();

        assert_eq!(room.member_count(), 1);
    }

    #[test]
    fn test_join_other_room_leaves_previous() {
        let first = room("r1");
        let second = room("r2");
        let (_a, a_ref) = mock("a");
        let (_b, b_ref) = mock("b");
        first.join(&a_ref).unwrap();
        first.join(&b_ref).unwrap();

        second.join(&a_ref).unwrap();

        assert_eq!(first.member_ids(), vec![ClientId::from("b")]);
        assert_eq!(second.member_ids(), vec![ClientId::from("a")]);
    }

    #[test]
    fn test_leave_last_member_closes_room_permanently() {
        let room = room("r1");
        let (a, a_ref) = mock("a");
        room.join(&a_ref).unwrap();

        assert!(room.leave(a_ref.as_ref()));

        assert!(room.is_closed());
        assert!(a.room().is_none());
        let rejoin = room.join(&a_ref);
        assert!(matches!(rejoin, Err(RoomError::Closed(_))));
    }

    /// Rejoins `room` from inside `set_room(None)`, which `leave` calls
    /// after releasing the lock.
    struct RejoinOnUnlink {
        id: ClientId,
        link: crate::RoomLink,
        room: Arc<Room>,
        other: ClientRef,
        result: Mutex<Option<Result<(), RoomError>>>,
    }

    impl Client for RejoinOnUnlink {
        fn id(&self) -> &ClientId {
            &self.id
        }

        fn send(&self, _response: Response) -> Result<(), crate::ClientError> {
            Ok(())
        }

        fn room(&self) -> Option<Arc<Room>> {
            self.link.get()
        }

        fn set_room(&self, room: Option<&Arc<Room>>) {
            self.link.set(room);
            if room.is_none() {
                let joined = self.room.join(&self.other);
                *self.result.lock().unwrap() = Some(joined);
            }
        }

        fn close(&self) {}
    }

    #[test]
    fn test_leave_last_member_rejects_join_racing_the_close() {
        let room = room("r1");
        let (b, b_ref) = mock("b");
        let leaver = Arc::new(RejoinOnUnlink {
            id: ClientId::from("a"),
            link: crate::RoomLink::new(),
            room: Arc::clone(&room),
            other: b_ref,
            result: Mutex::new(None),
        });
        let leaver_ref: ClientRef = leaver.clone();
        room.join(&leaver_ref).unwrap();

        assert!(room.leave(leaver_ref.as_ref()));

        let joined = leaver.result.lock().unwrap().take().expect("join attempted");
        assert!(matches!(joined, Err(RoomError::Closed(_))));
        assert!(room.is_closed());
        assert_eq!(room.member_count(), 0);
        assert!(b.room().is_none());
        assert!(b.received().is_empty());
    }

    #[test]
    fn test_join_closed_room_keeps_previous_room() {
        let first = room("r1");
        let closed = room("r2");
        let (_a, a_ref) = mock("a");
        let (b, b_ref) = mock("b");
        first.join(&a_ref).unwrap();
        first.join(&b_ref).unwrap();
        b.clear();
        closed.close();

        let result = closed.join(&a_ref);

        assert!(matches!(result, Err(RoomError::Closed(_))));
        assert!(a_ref.room().is_some_and(|r| Arc::ptr_eq(&r, &first)));
        assert_eq!(first.member_count(), 2);
        assert!(b.received().is_empty());
    }

    #[test]
    fn test_leave_non_member_returns_false() {
        let room = room("r1");
        let (_a, a_ref) = mock("a");
        let (_b, b_ref) = mock("b");
        room.join(&a_ref).unwrap();

        assert!(!room.leave(b_ref.as_ref()));
        assert!(!room.is_closed());
    }

    #[test]
    fn test_close_twice_returns_false_second_time() {
        let room = room("r1");
        let (a, a_ref) = mock("a");
        room.join(&a_ref).unwrap();

        assert!(room.close());
        assert!(!room.close());

        assert_eq!(a.received_types(), vec![tags::ROOM_CLOSED]);
        assert!(a.room().is_none());
        assert_eq!(room.member_count(), 0);
    }

    #[test]
    fn test_broadcast_excludes_listed_clients() {
        let room = room("r1");
        let (a, a_ref) = mock("a");
        let (b, b_ref) = mock("b");
        let (c, c_ref) = mock("c");
        for client in [&a_ref, &b_ref, &c_ref] {
            room.join(client).unwrap();
        }
        for client in [&a, &b, &c] {
            client.clear();
        }

        let delivered = room.broadcast(
            &Response::ok("ping", json!({})),
            &[ClientId::from("b")],
        );

        assert_eq!(delivered, 2);
        assert_eq!(a.received_types(), vec!["ping"]);
        assert!(b.received().is_empty());
        assert_eq!(c.received_types(), vec!["ping"]);
    }

    #[test]
    fn test_broadcast_to_reaches_only_targets() {
        let room = room("r1");
        let (a, a_ref) = mock("a");
        let (b, b_ref) = mock("b");
        room.join(&a_ref).unwrap();
        room.join(&b_ref).unwrap();
        a.clear();

        let delivered = room.broadcast_to(
            &Response::ok("secret", json!({})),
            &[ClientId::from("b"), ClientId::from("ghost")],
        );

        assert_eq!(delivered, 1);
        assert!(a.received().is_empty());
        assert_eq!(b.received_types(), vec!["secret"]);
    }

    #[test]
    fn test_update_state_wrong_type_returns_mismatch() {
        let room = room("r1");
        room.set_state(5_u32).unwrap();

        let result = room.update_state(|s: &mut String| s.push('x'));

        assert!(matches!(result, Err(RoomError::StateTypeMismatch(_))));
        assert_eq!(room.read_state(|n: &u32| *n).unwrap(), 5);
    }

    #[test]
    fn test_update_state_closed_room_returns_closed() {
        let room = room("r1");
        room.set_state(0_u32).unwrap();
        room.close();

        let result = room.update_state(|n: &mut u32| *n += 1);

        assert!(matches!(result, Err(RoomError::Closed(_))));
    }

    #[test]
    fn test_rebind_keeps_seat_and_notifies_others() {
        let room = room("r1");
        let (old, old_ref) = mock("old");
        let (other, other_ref) = mock("other");
        room.join(&old_ref).unwrap();
        room.join(&other_ref).unwrap();
        other.clear();
        let (fresh, fresh_ref) = mock("fresh");

        room.rebind(&ClientId::from("old"), &fresh_ref).unwrap();

        assert_eq!(
            room.member_ids(),
            vec![ClientId::from("fresh"), ClientId::from("other")]
        );
        assert!(old.room().is_none());
        assert!(fresh.room().is_some());
        let event = &other.received()[0];
        assert_eq!(event.message_type, tags::CLIENT_RECONNECTED);
        assert_eq!(event.data["oldClientId"], "old");
    }

    #[test]
    fn test_rebind_unknown_member_returns_not_in_room() {
        let room = room("r1");
        let (_a, a_ref) = mock("a");
        room.join(&a_ref).unwrap();
        let (_b, b_ref) = mock("b");

        let result = room.rebind(&ClientId::from("ghost"), &b_ref);

        assert!(matches!(result, Err(RoomError::NotInRoom(_, _))));
    }
}
