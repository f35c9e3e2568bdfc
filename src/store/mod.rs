use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::board::{BoardCell, Coord, Ship, ShipPlacement};
use crate::models::game::{Game, GameStatus};
use crate::models::message::Outbound;
use crate::models::movement::Movement;
use crate::models::notification::{DeliveryStatus, StoredNotification};

pub mod memory;
pub mod mysql;

pub use memory::MemoryStore;
pub use mysql::MySqlStore;

/// Persistent match state. Implementations hand out domain types only; row
/// shapes stay inside the driver.
///
/// Methods that change a game assume the caller serializes access per game id.
#[async_trait]
pub trait Store: Send + Sync {
    async fn create_game(&self, host: &str, at: DateTime<Utc>) -> anyhow::Result<Game>;
    async fn game(&self, id: u32) -> anyhow::Result<Option<Game>>;
    async fn games_with_status(&self, status: GameStatus) -> anyhow::Result<Vec<Game>>;
    /// Most recent non-terminal game the user takes part in.
    async fn active_game_for(&self, user: &str) -> anyhow::Result<Option<Game>>;
    async fn set_guest(&self, id: u32, guest: &str) -> anyhow::Result<()>;
    async fn start_game(&self, id: u32, at: DateTime<Utc>) -> anyhow::Result<()>;
    async fn finish_game(&self, id: u32, winner: &str, at: DateTime<Utc>) -> anyhow::Result<()>;
    async fn abandon_game(&self, id: u32, at: DateTime<Utc>) -> anyhow::Result<()>;

    /// Saves every ship and its cells atomically.
    async fn save_fleet(&self, game_id: u32, owner: &str, ships: &[ShipPlacement], at: DateTime<Utc>) -> anyhow::Result<()>;
    async fn has_fleet(&self, game_id: u32, owner: &str) -> anyhow::Result<bool>;
    async fn cells(&self, game_id: u32, owner: &str) -> anyhow::Result<Vec<BoardCell>>;
    async fn ships(&self, game_id: u32, owner: &str) -> anyhow::Result<Vec<Ship>>;

    /// Kills the target's live cell at `coord`, if any, and appends the shot
    /// with the resulting hit flag. Both happen or neither does.
    async fn record_shot(&self, game_id: u32, shooter: &str, target: &str, coord: Coord, at: DateTime<Utc>) -> anyhow::Result<Movement>;
    /// Ordered by time, ties by insertion.
    async fn movements(&self, game_id: u32) -> anyhow::Result<Vec<Movement>>;
    async fn last_movement(&self, game_id: u32) -> anyhow::Result<Option<Movement>>;

    async fn save_notification(&self, recipient: &str, body: &Outbound, status: DeliveryStatus, at: DateTime<Utc>) -> anyhow::Result<u64>;
    /// Ordered by creation.
    async fn pending_notifications(&self, recipient: &str) -> anyhow::Result<Vec<StoredNotification>>;
    async fn mark_sent(&self, ids: &[u64]) -> anyhow::Result<()>;
}
