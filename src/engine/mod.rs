//! The match session engine.
//!
//! Every operation that changes a game runs while holding that game's lock
//! from [`KeyedLocks`]; the store is the source of truth and everything else
//! (whose turn it is, the turn clock, board views) is recomputed from it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::error;

use crate::errors::CustomError;
use crate::models::game::Game;
use crate::models::message::Outbound;
use crate::models::movement::Movement;
use crate::store::Store;

pub mod delivery;
pub mod fleet;
pub mod lifecycle;
pub mod locks;
pub mod shots;
pub mod timeout;
pub mod view;

use self::delivery::Hub;
use self::locks::KeyedLocks;

pub struct Engine {
    store: Arc<dyn Store>,
    hub: Arc<Hub>,
    games: KeyedLocks<u32>,
    users: KeyedLocks<String>,
    turn_timeout: chrono::Duration,
    board_size: u8,
}

/// Who may shoot next and since when.
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub holder: String,
    pub since: DateTime<Utc>,
}

/// Derives the turn from the most recent shot: the host opens, after that the
/// side that did not shoot last holds the turn. `None` until both sides are
/// present.
pub fn current_turn(game: &Game, last: Option<&Movement>) -> Option<Turn> {
    match last {
        None => Some(Turn {
            holder: game.host.clone()?,
            since: game.started_at.unwrap_or(game.created_at),
        }),
        Some(movement) => Some(Turn {
            holder: game.opponent_of(&movement.shooter)?.to_string(),
            since: movement.moved_at,
        }),
    }
}

impl Engine {
    pub fn new(store: Arc<dyn Store>, hub: Arc<Hub>, turn_timeout: std::time::Duration) -> Self {
        Engine {
            store,
            hub,
            games: KeyedLocks::new(),
            users: KeyedLocks::new(),
            turn_timeout: chrono::Duration::from_std(turn_timeout).unwrap_or_else(|_| chrono::Duration::seconds(20)),
            board_size: fleet::BOARD_SIZE,
        }
    }

    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    pub fn board_size(&self) -> u8 {
        self.board_size
    }

    async fn load(&self, game_id: u32) -> Result<Game, CustomError> {
        self.store.game(game_id).await?.ok_or(CustomError::GameNotFound)
    }

    // Notifications follow a state change that has already been committed, so
    // a failure to queue one is logged rather than reported to the caller.
    async fn dispatch(&self, user: &str, body: Outbound) {
        let kind = body.kind();
        if let Err(err) = self.hub.notify(user, body).await {
            error!("Could not deliver {} to {}: {:?}", kind, user, err);
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use super::*;
    use crate::models::board::{BoardCell, Coord, Ship, ShipPlacement};
    use crate::models::game::GameStatus;
    use crate::models::message::OutboundEnvelope;
    use crate::models::notification::{DeliveryStatus, StoredNotification};
    use crate::store::MemoryStore;

    pub const TURN_TIMEOUT: Duration = Duration::from_secs(20);

    pub fn engine() -> (Arc<Engine>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let hub = Arc::new(Hub::new(store.clone()));
        (Arc::new(Engine::new(store.clone(), hub, TURN_TIMEOUT)), store)
    }

    /// A [`MemoryStore`] whose operations can be told to fail a number of times.
    #[derive(Default)]
    pub struct Flaky {
        pub inner: MemoryStore,
        failures: std::sync::Mutex<HashMap<&'static str, usize>>,
    }

    impl Flaky {
        pub fn fail(&self, op: &'static str, times: usize) {
            self.failures.lock().unwrap().insert(op, times);
        }

        fn check(&self, op: &'static str) -> anyhow::Result<()> {
            let mut failures = self.failures.lock().unwrap();
            match failures.get_mut(op) {
                Some(left) if *left > 0 => {
                    *left -= 1;
                    Err(anyhow::anyhow!("{} unavailable", op))
                }
                _ => Ok(()),
            }
        }
    }

    #[async_trait]
    impl Store for Flaky {
        async fn create_game(&self, host: &str, at: DateTime<Utc>) -> anyhow::Result<Game> {
            self.check("create_game")?;
            self.inner.create_game(host, at).await
        }
        async fn game(&self, id: u32) -> anyhow::Result<Option<Game>> {
            self.check("game")?;
            self.inner.game(id).await
        }
        async fn games_with_status(&self, status: GameStatus) -> anyhow::Result<Vec<Game>> {
            self.check("games_with_status")?;
            self.inner.games_with_status(status).await
        }
        async fn active_game_for(&self, user: &str) -> anyhow::Result<Option<Game>> {
            self.check("active_game_for")?;
            self.inner.active_game_for(user).await
        }
        async fn set_guest(&self, id: u32, guest: &str) -> anyhow::Result<()> {
            self.check("set_guest")?;
            self.inner.set_guest(id, guest).await
        }
        async fn start_game(&self, id: u32, at: DateTime<Utc>) -> anyhow::Result<()> {
            self.check("start_game")?;
            self.inner.start_game(id, at).await
        }
        async fn finish_game(&self, id: u32, winner: &str, at: DateTime<Utc>) -> anyhow::Result<()> {
            self.check("finish_game")?;
            self.inner.finish_game(id, winner, at).await
        }
        async fn abandon_game(&self, id: u32, at: DateTime<Utc>) -> anyhow::Result<()> {
            self.check("abandon_game")?;
            self.inner.abandon_game(id, at).await
        }
        async fn save_fleet(&self, game_id: u32, owner: &str, ships: &[ShipPlacement], at: DateTime<Utc>) -> anyhow::Result<()> {
            self.check("save_fleet")?;
            self.inner.save_fleet(game_id, owner, ships, at).await
        }
        async fn has_fleet(&self, game_id: u32, owner: &str) -> anyhow::Result<bool> {
            self.check("has_fleet")?;
            self.inner.has_fleet(game_id, owner).await
        }
        async fn cells(&self, game_id: u32, owner: &str) -> anyhow::Result<Vec<BoardCell>> {
            self.check("cells")?;
            self.inner.cells(game_id, owner).await
        }
        async fn ships(&self, game_id: u32, owner: &str) -> anyhow::Result<Vec<Ship>> {
            self.check("ships")?;
            self.inner.ships(game_id, owner).await
        }
        async fn record_shot(&self, game_id: u32, shooter: &str, target: &str, coord: Coord, at: DateTime<Utc>) -> anyhow::Result<Movement> {
            self.check("record_shot")?;
            self.inner.record_shot(game_id, shooter, target, coord, at).await
        }
        async fn movements(&self, game_id: u32) -> anyhow::Result<Vec<Movement>> {
            self.check("movements")?;
            self.inner.movements(game_id).await
        }
        async fn last_movement(&self, game_id: u32) -> anyhow::Result<Option<Movement>> {
            self.check("last_movement")?;
            self.inner.last_movement(game_id).await
        }
        async fn save_notification(&self, recipient: &str, body: &Outbound, status: DeliveryStatus, at: DateTime<Utc>) -> anyhow::Result<u64> {
            self.check("save_notification")?;
            self.inner.save_notification(recipient, body, status, at).await
        }
        async fn pending_notifications(&self, recipient: &str) -> anyhow::Result<Vec<StoredNotification>> {
            self.check("pending_notifications")?;
            self.inner.pending_notifications(recipient).await
        }
        async fn mark_sent(&self, ids: &[u64]) -> anyhow::Result<()> {
            self.check("mark_sent")?;
            self.inner.mark_sent(ids).await
        }
    }

    pub fn flaky_engine() -> (Arc<Engine>, Arc<Flaky>) {
        let store = Arc::new(Flaky::default());
        let hub = Arc::new(Hub::new(store.clone()));
        (Arc::new(Engine::new(store.clone(), hub, TURN_TIMEOUT)), store)
    }

    pub async fn connect(engine: &Engine, user: &str) -> mpsc::UnboundedReceiver<OutboundEnvelope> {
        let (tx, rx) = mpsc::unbounded_channel();
        engine.hub().connect(user, tx).await.unwrap();
        rx
    }

    pub fn drain(rx: &mut mpsc::UnboundedReceiver<OutboundEnvelope>) -> Vec<Outbound> {
        let mut out = Vec::new();
        while let Ok(envelope) = rx.try_recv() {
            out.push(envelope.body);
        }
        out
    }

    pub fn ship(cells: &[(i32, i32)]) -> ShipPlacement {
        ShipPlacement {
            ship_type: format!("ship-{}", cells.len()),
            positions: cells.iter().map(|(x, y)| Coord::new(*x, *y)).collect(),
        }
    }

    // Host fleet: (0,0)-(0,1) and (2,0)-(4,0).
    pub fn host_fleet() -> Vec<ShipPlacement> {
        vec![ship(&[(0, 0), (0, 1)]), ship(&[(2, 0), (3, 0), (4, 0)])]
    }

    // Guest fleet: a single 3-cell ship at (2,0)-(4,0).
    pub fn guest_fleet() -> Vec<ShipPlacement> {
        vec![ship(&[(2, 0), (3, 0), (4, 0)])]
    }

    /// Creates, joins and sets up a match between `ann` (host) and `bob`.
    pub async fn started_game(engine: &Engine) -> u32 {
        let game = engine.create_game("ann").await.unwrap();
        engine.join_game("bob", game.id).await.unwrap();
        engine.submit_fleet("ann", game.id, host_fleet()).await.unwrap();
        engine.submit_fleet("bob", game.id, guest_fleet()).await.unwrap();
        game.id
    }
}
