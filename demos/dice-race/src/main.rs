use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Weak;
use std::time::Duration;

use clap::Parser;
use rand::Rng;
use tavern::prelude::*;
use tracing_subscriber::EnvFilter;

const DICE_RACE: &str = "dice_race";
const DICE_ROLLED: &str = "dice_rolled";
const TURN_CHANGED: &str = "turn_changed";
const RACE_WON: &str = "race_won";

/// Pause between a roll and the next player's turn, so clients can
/// animate the die.
const TURN_DELAY: Duration = Duration::from_millis(800);

// ---------------------------------------------------------------------------
// Race state
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Race {
    target: u32,
    order: Vec<ClientId>,
    scores: HashMap<ClientId, u32>,
    turn: usize,
    rolled: bool, // current player rolled, turn ends after TURN_DELAY
    started: bool,
    winner: Option<ClientId>,
}

impl Race {
    fn new(target: u32) -> Self {
        Self {
            target: target.max(1),
            order: Vec::new(),
            scores: HashMap::new(),
            turn: 0,
            rolled: false,
            started: false,
            winner: None,
        }
    }

    fn current(&self) -> Option<&ClientId> {
        self.order.get(self.turn)
    }

    fn add(&mut self, id: &ClientId) -> Result<(), GameError> {
        if self.order.contains(id) {
            return Ok(());
        }
        if self.started {
            return Err(GameError::InvalidAction("Race already started".into()));
        }
        self.order.push(id.clone());
        self.scores.insert(id.clone(), 0);
        Ok(())
    }

    /// Drops a player. Returns the new current player if the turn moved.
    fn remove(&mut self, id: &ClientId) -> Option<ClientId> {
        let pos = self.order.iter().position(|p| p == id)?;
        self.order.remove(pos);
        self.scores.remove(id);
        if self.order.is_empty() {
            self.turn = 0;
            return None;
        }

        let was_current = pos == self.turn;
        if pos < self.turn {
            self.turn -= 1;
        }
        if self.turn >= self.order.len() {
            self.turn = 0;
        }
        if was_current && self.winner.is_none() {
            self.rolled = false;
            return self.current().cloned();
        }
        None
    }

    fn rename(&mut self, old: &ClientId, new: &ClientId) {
        if let Some(slot) = self.order.iter_mut().find(|p| *p == old) {
            *slot = new.clone();
        }
        if let Some(score) = self.scores.remove(old) {
            self.scores.insert(new.clone(), score);
        }
        if self.winner.as_ref() == Some(old) {
            self.winner = Some(new.clone());
        }
    }

    /// Adds `value` to `who`'s score. Returns the new score.
    fn roll(&mut self, who: &ClientId, value: u32) -> Result<u32, GameError> {
        if self.winner.is_some() {
            return Err(GameError::InvalidAction("Race is over".into()));
        }
        if self.current() != Some(who) {
            return Err(GameError::InvalidAction("Not your turn".into()));
        }
        if self.rolled {
            return Err(GameError::InvalidAction("Already rolled this turn".into()));
        }

        self.started = true;
        let score = self.scores.entry(who.clone()).or_default();
        *score += value;
        let score = *score;
        if score >= self.target {
            self.winner = Some(who.clone());
        } else {
            self.rolled = true;
        }
        Ok(score)
    }

    /// Passes the turn on after a roll. Returns whose turn it is now.
    fn end_turn(&mut self) -> Option<ClientId> {
        if !self.rolled || self.order.is_empty() {
            return None;
        }
        self.rolled = false;
        self.turn = (self.turn + 1) % self.order.len();
        self.current().cloned()
    }
}

// ---------------------------------------------------------------------------
// Game
// ---------------------------------------------------------------------------

/// First to `target` points on a six-sided die wins.
struct DiceRace {
    default_target: u32,
    turn_ends: DelayedActions<RoomId>,
}

impl DiceRace {
    fn new(default_target: u32) -> Self {
        Self {
            default_target,
            turn_ends: DelayedActions::new(),
        }
    }

    fn schedule_turn_end(&self, room: &Arc<Room>) {
        let room_ref = Arc::downgrade(room);
        self.turn_ends
            .schedule(room.id().clone(), TURN_DELAY, move || async move {
                let Some(room) = room_ref.upgrade() else {
                    return;
                };
                match room.update_state(Race::end_turn) {
                    Ok(Some(next)) => announce_turn(&room, &next, &[]),
                    Ok(None) => {}
                    Err(e) => tracing::debug!(room_id = %room.id(), error = %e, "turn end skipped"),
                }
            });
    }
}

fn announce_turn(room: &Room, next: &ClientId, exclude: &[ClientId]) {
    room.broadcast(
        &Response::ok(TURN_CHANGED, json!({ "clientId": next })),
        exclude,
    );
}

impl Game for DiceRace {
    fn game_type(&self) -> GameType {
        GameType::from(DICE_RACE)
    }

    fn initialize_room(&self, _room: &Arc<Room>, options: &Value) -> Result<RoomState, GameError> {
        let target = match options.get("target") {
            None | Some(Value::Null) => self.default_target,
            Some(value) => value
                .as_u64()
                .and_then(|t| u32::try_from(t).ok())
                .filter(|t| *t > 0)
                .ok_or_else(|| GameError::Other("target must be a positive integer".into()))?,
        };
        Ok(Box::new(Race::new(target)))
    }

    fn on_client_join(
        &self,
        client: &ClientRef,
        room: &Arc<Room>,
        _options: &Value,
    ) -> Result<(), GameError> {
        room.update_state(|race: &mut Race| race.add(client.id()))?
    }

    fn on_client_leave(&self, client: &ClientRef, room: &Arc<Room>) -> Result<(), GameError> {
        let (next, empty) = room.update_state(|race: &mut Race| {
            let next = race.remove(client.id());
            (next, race.order.is_empty())
        })?;

        if empty {
            self.turn_ends.cancel(room.id());
        } else if let Some(next) = next {
            // The leaver may have rolled; its pending turn end is stale.
            self.turn_ends.cancel(room.id());
            announce_turn(room, &next, std::slice::from_ref(client.id()));
        }
        Ok(())
    }

    fn on_client_reconnect(
        &self,
        client: &ClientRef,
        room: &Arc<Room>,
        old_id: &ClientId,
    ) -> Result<(), GameError> {
        room.update_state(|race: &mut Race| race.rename(old_id, client.id()))?;
        Ok(())
    }

    fn on_bot_add(
        &self,
        _client: &ClientRef,
        room: &Arc<Room>,
        registry: &Arc<GameRegistry>,
    ) -> Result<ClientRef, GameError> {
        let suffix: String = ClientId::generate().as_str().chars().take(8).collect();
        let bot = BotClient::new(format!("bot-{suffix}"));
        let room: Weak<Room> = Arc::downgrade(room);
        let registry = Arc::clone(registry);

        bot.set_reaction(move |bot, response| {
            if response.message_type != TURN_CHANGED
                || response.data["clientId"] != bot.client_id().as_str()
            {
                return;
            }
            let Some(room) = room.upgrade() else {
                return;
            };
            let me: ClientRef = bot;
            if let Err(e) =
                registry.handle_message(&me, &room, tags::GAME_ACTION, json!({ "action": "roll" }))
            {
                tracing::debug!(bot_id = %me.id(), error = %e, "bot roll rejected");
            }
        });
        Ok(bot)
    }

    fn handle_message(
        &self,
        client: &ClientRef,
        room: &Arc<Room>,
        message_type: &str,
        payload: Value,
    ) -> Result<Option<Value>, GameError> {
        if message_type != tags::GAME_ACTION {
            return Err(GameError::InvalidAction(format!("Unknown message: {message_type}")));
        }
        match payload["action"].as_str() {
            Some("roll") => {}
            Some(other) => return Err(GameError::InvalidAction(format!("Unknown action: {other}"))),
            None => return Err(GameError::InvalidAction("action is required".into())),
        }

        let roll: u32 = rand::rng().random_range(1..=6);
        let (score, won) = room.update_state(|race: &mut Race| {
            race.roll(client.id(), roll)
                .map(|score| (score, race.winner.is_some()))
        })??;

        room.broadcast(
            &Response::ok(
                DICE_ROLLED,
                json!({ "clientId": client.id(), "roll": roll, "score": score }),
            ),
            std::slice::from_ref(client.id()),
        );
        if won {
            tracing::info!(room_id = %room.id(), winner = %client.id(), score, "race won");
            room.broadcast(
                &Response::ok(RACE_WON, json!({ "clientId": client.id(), "score": score })),
                &[],
            );
        } else {
            self.schedule_turn_end(room);
        }

        Ok(Some(json!({ "roll": roll, "score": score, "won": won })))
    }
}

// ---------------------------------------------------------------------------
// Server bootstrap
// ---------------------------------------------------------------------------

#[derive(Debug, Parser)]
#[command(name = "dice-race", about = "Dice race game server on Tavern")]
struct Args {
    /// JSON server config file; flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address to listen on.
    #[arg(long)]
    bind: Option<String>,

    /// Seconds a dropped player has to reconnect.
    #[arg(long)]
    session_ttl: Option<u64>,

    /// Points needed to win, unless a room asks for its own.
    #[arg(long, default_value_t = 20)]
    target: u32,
}

impl Args {
    fn server_config(&self) -> Result<ServerConfig, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
            None => ServerConfig::default(),
        };
        if let Some(bind) = &self.bind {
            config.bind_addr = bind.clone();
        }
        if let Some(ttl) = self.session_ttl {
            config.session_ttl_secs = ttl;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = args.server_config()?;
    tracing::info!(addr = %config.bind_addr, target = args.target, "starting dice race server");

    let server = TavernServer::builder()
        .config(config)
        .game(Arc::new(DiceRace::new(args.target)))
        .build()
        .await?;

    server.run().await?;
    Ok(())
}
