use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::models::board::{BoardCell, CellStatus, Coord, Ship, ShipPlacement};
use crate::models::game::{Game, GameStatus};
use crate::models::message::Outbound;
use crate::models::movement::Movement;
use crate::models::notification::{DeliveryStatus, StoredNotification};
use crate::store::Store;

#[derive(Default)]
struct Tables {
    games: Vec<Game>,
    ships: Vec<(u32, String, Ship)>,
    cells: Vec<BoardCell>,
    movements: Vec<Movement>,
    outbox: Vec<StoredNotification>,
}

/// Process-local store with the same semantics as the MySQL one.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn missing(id: u32) -> anyhow::Error {
    anyhow::anyhow!("game {} does not exist", id)
}

impl Tables {
    fn game_mut(&mut self, id: u32) -> anyhow::Result<&mut Game> {
        self.games.iter_mut().find(|g| g.id == id).ok_or_else(|| missing(id))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_game(&self, host: &str, at: DateTime<Utc>) -> anyhow::Result<Game> {
        let mut tables = self.tables.lock().await;
        let game = Game {
            id: tables.games.len() as u32 + 1,
            host: Some(host.to_string()),
            guest: None,
            status: GameStatus::Pending,
            created_at: at,
            started_at: None,
            finished_at: None,
            current_turn_started_at: None,
            winner: None,
        };
        tables.games.push(game.clone());
        Ok(game)
    }

    async fn game(&self, id: u32) -> anyhow::Result<Option<Game>> {
        let tables = self.tables.lock().await;
        Ok(tables.games.iter().find(|g| g.id == id).cloned())
    }

    async fn games_with_status(&self, status: GameStatus) -> anyhow::Result<Vec<Game>> {
        let tables = self.tables.lock().await;
        Ok(tables.games.iter().filter(|g| g.status == status).cloned().collect())
    }

    async fn active_game_for(&self, user: &str) -> anyhow::Result<Option<Game>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .games
            .iter()
            .rev()
            .find(|g| g.is_participant(user) && !g.status.is_terminal())
            .cloned())
    }

    async fn set_guest(&self, id: u32, guest: &str) -> anyhow::Result<()> {
        let mut tables = self.tables.lock().await;
        let game = tables.game_mut(id)?;
        game.guest = Some(guest.to_string());
        game.status = GameStatus::SettingUp;
        Ok(())
    }

    async fn start_game(&self, id: u32, at: DateTime<Utc>) -> anyhow::Result<()> {
        let mut tables = self.tables.lock().await;
        let game = tables.game_mut(id)?;
        game.status = GameStatus::Started;
        game.started_at = Some(at);
        game.current_turn_started_at = Some(at);
        Ok(())
    }

    async fn finish_game(&self, id: u32, winner: &str, at: DateTime<Utc>) -> anyhow::Result<()> {
        let mut tables = self.tables.lock().await;
        let game = tables.game_mut(id)?;
        game.status = GameStatus::Finished;
        game.finished_at = Some(at);
        game.winner = Some(winner.to_string());
        Ok(())
    }

    async fn abandon_game(&self, id: u32, at: DateTime<Utc>) -> anyhow::Result<()> {
        let mut tables = self.tables.lock().await;
        let game = tables.game_mut(id)?;
        game.status = GameStatus::Abandoned;
        game.finished_at = Some(at);
        Ok(())
    }

    async fn save_fleet(&self, game_id: u32, owner: &str, ships: &[ShipPlacement], at: DateTime<Utc>) -> anyhow::Result<()> {
        let mut tables = self.tables.lock().await;
        for placement in ships {
            let ship = Ship {
                id: tables.ships.len() as u32 + 1,
                ship_type: placement.ship_type.clone(),
                created_at: at,
            };
            for coord in &placement.positions {
                tables.cells.push(BoardCell {
                    game_id,
                    owner: owner.to_string(),
                    ship_id: Some(ship.id),
                    coord: *coord,
                    status: CellStatus::Alive,
                });
            }
            tables.ships.push((game_id, owner.to_string(), ship));
        }
        Ok(())
    }

    async fn has_fleet(&self, game_id: u32, owner: &str) -> anyhow::Result<bool> {
        let tables = self.tables.lock().await;
        Ok(tables.cells.iter().any(|c| c.game_id == game_id && c.owner == owner))
    }

    async fn cells(&self, game_id: u32, owner: &str) -> anyhow::Result<Vec<BoardCell>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .cells
            .iter()
            .filter(|c| c.game_id == game_id && c.owner == owner)
            .cloned()
            .collect())
    }

    async fn ships(&self, game_id: u32, owner: &str) -> anyhow::Result<Vec<Ship>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .ships
            .iter()
            .filter(|(g, o, _)| *g == game_id && o == owner)
            .map(|(_, _, ship)| ship.clone())
            .collect())
    }

    async fn record_shot(&self, game_id: u32, shooter: &str, target: &str, coord: Coord, at: DateTime<Utc>) -> anyhow::Result<Movement> {
        let mut tables = self.tables.lock().await;
        let mut hit = false;
        if let Some(cell) = tables.cells.iter_mut().find(|c| {
            c.game_id == game_id && c.owner == target && c.coord == coord && c.status == CellStatus::Alive
        }) {
            cell.status = CellStatus::Dead;
            hit = true;
        }
        let movement = Movement {
            id: tables.movements.len() as u32 + 1,
            game_id,
            shooter: shooter.to_string(),
            coord,
            moved_at: at,
            hit,
        };
        tables.movements.push(movement.clone());
        tables.game_mut(game_id)?.current_turn_started_at = Some(at);
        Ok(movement)
    }

    async fn movements(&self, game_id: u32) -> anyhow::Result<Vec<Movement>> {
        let tables = self.tables.lock().await;
        let mut movements: Vec<Movement> = tables.movements.iter().filter(|m| m.game_id == game_id).cloned().collect();
        movements.sort_by_key(|m| (m.moved_at, m.id));
        Ok(movements)
    }

    async fn last_movement(&self, game_id: u32) -> anyhow::Result<Option<Movement>> {
        Ok(self.movements(game_id).await?.pop())
    }

    async fn save_notification(&self, recipient: &str, body: &Outbound, status: DeliveryStatus, at: DateTime<Utc>) -> anyhow::Result<u64> {
        let mut tables = self.tables.lock().await;
        let id = tables.outbox.len() as u64 + 1;
        tables.outbox.push(StoredNotification {
            id,
            recipient: recipient.to_string(),
            body: body.clone(),
            status,
            created_at: at,
        });
        Ok(id)
    }

    async fn pending_notifications(&self, recipient: &str) -> anyhow::Result<Vec<StoredNotification>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .outbox
            .iter()
            .filter(|n| n.recipient == recipient && n.status == DeliveryStatus::Pending)
            .cloned()
            .collect())
    }

    async fn mark_sent(&self, ids: &[u64]) -> anyhow::Result<()> {
        let mut tables = self.tables.lock().await;
        for n in tables.outbox.iter_mut().filter(|n| ids.contains(&n.id)) {
            n.status = DeliveryStatus::Sent;
        }
        Ok(())
    }
}

#[cfg(test)]
impl MemoryStore {
    pub async fn outbox(&self, recipient: &str) -> Vec<StoredNotification> {
        let tables = self.tables.lock().await;
        tables.outbox.iter().filter(|n| n.recipient == recipient).cloned().collect()
    }
}
