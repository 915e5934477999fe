//! Bot clients: room members driven by game code instead of a socket.
//!
//! A bot reacts to what it is sent. Every successful response is recorded
//! and then handed to the bot's reaction callback on a fresh Tokio task,
//! so the reaction never runs inside the room operation that delivered
//! the message. Games install the callback in
//! [`Game::on_bot_add`](crate::Game::on_bot_add).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use tavern_protocol::{ClientId, Response};
use tokio::runtime::Handle;

use crate::{Client, ClientError, Room, RoomLink};

/// How many responses a bot remembers.
const HISTORY_LIMIT: usize = 128;

/// Callback run for every successful response a bot receives.
pub type BotReaction = Arc<dyn Fn(Arc<BotClient>, Response) + Send + Sync>;

/// A synthetic room member.
///
/// ## Example
///
/// ```rust
/// use tavern_room::BotClient;
///
/// let bot = BotClient::new("bot-1");
/// bot.set_reaction(|bot, response| {
///     tracing::debug!(bot = %bot.client_id(), kind = %response.message_type, "bot saw");
/// });
/// ```
pub struct BotClient {
    id: ClientId,
    link: RoomLink,
    history: Mutex<VecDeque<Response>>,
    reaction: RwLock<BotReaction>,
    closed: AtomicBool,
    this: Weak<BotClient>,
}

impl BotClient {
    /// Creates a bot that ignores what it receives until
    /// [`set_reaction`](Self::set_reaction) is called.
    pub fn new(id: impl Into<ClientId>) -> Arc<Self> {
        let id = id.into();
        Arc::new_cyclic(|this| Self {
            id,
            link: RoomLink::new(),
            history: Mutex::new(VecDeque::new()),
            reaction: RwLock::new(Arc::new(|_, _| {})),
            closed: AtomicBool::new(false),
            this: this.clone(),
        })
    }

    /// The bot's id. Same as [`Client::id`], without needing the trait in
    /// scope.
    pub fn client_id(&self) -> &ClientId {
        &self.id
    }

    /// Installs the callback run for each successful response.
    pub fn set_reaction<F>(&self, reaction: F)
    where
        F: Fn(Arc<BotClient>, Response) + Send + Sync + 'static,
    {
        *self.reaction.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(reaction);
    }

    /// The most recent responses the bot received, oldest first.
    pub fn received(&self) -> Vec<Response> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    fn record(&self, response: &Response) {
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        if history.len() == HISTORY_LIMIT {
            history.pop_front();
        }
        history.push_back(response.clone());
    }
}

impl Client for BotClient {
    fn id(&self) -> &ClientId {
        &self.id
    }

    fn send(&self, response: Response) -> Result<(), ClientError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ClientError::Closed(self.id.clone()));
        }
        self.record(&response);

        if response.is_error() {
            return Ok(());
        }
        let Some(me) = self.this.upgrade() else {
            return Ok(());
        };
        match Handle::try_current() {
            Ok(handle) => {
                let reaction = Arc::clone(&self.reaction.read().unwrap_or_else(PoisonError::into_inner));
                handle.spawn(async move { reaction(me, response) });
            }
            Err(_) => {
                tracing::debug!(bot_id = %self.id, "no runtime available, bot reaction skipped");
            }
        }
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

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use tokio::sync::mpsc;

    use super::*;

    #[tokio::test]
    async fn test_send_success_runs_reaction_on_runtime() {
        let bot = BotClient::new("bot-1");
        let (tx, mut rx) = mpsc::unbounded_channel();
        bot.set_reaction(move |bot, response| {
            let _ = tx.send((bot.client_id().clone(), response.message_type));
        });

        bot.send(Response::ok("your_turn", json!({}))).unwrap();

        let (id, kind) = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("reaction should run")
            .expect("channel open");
        assert_eq!(id, ClientId::from("bot-1"));
        assert_eq!(kind, "your_turn");
    }

    #[tokio::test]
    async fn test_send_error_response_records_without_reacting() {
        let bot = BotClient::new("bot-1");
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();
        bot.set_reaction(move |_, _| {
            let _ = tx.send(());
        });

        bot.send(Response::fail("game_action_result", "Not your turn")).unwrap();
        tokio::task::yield_now().await;

        assert_eq!(bot.received().len(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_send_after_close_returns_closed() {
        let bot = BotClient::new("bot-1");
        bot.close();
        bot.close();

        let result = bot.send(Response::ok("x", json!(null)));

        assert!(matches!(result, Err(ClientError::Closed(_))));
    }
}
