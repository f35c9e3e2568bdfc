use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use sqlx::mysql::MySqlPool;

use crate::models::board::{BoardCell, CellStatus, Coord, Ship, ShipPlacement};
use crate::models::game::{Game, GameStatus};
use crate::models::message::Outbound;
use crate::models::movement::Movement;
use crate::models::notification::{DeliveryStatus, StoredNotification};
use crate::store::Store;

// Row shapes. They never leave this module; the conversions below map them
// into the engine's types.

#[derive(sqlx::FromRow, Debug)]
struct GameRow {
    id: u32,
    host_id: Option<String>,
    guest_id: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    current_turn_started_at: Option<DateTime<Utc>>,
    winner_id: Option<String>,
}

#[derive(sqlx::FromRow, Debug)]
struct CellRow {
    game_id: u32,
    user_id: String,
    ship_id: Option<u32>,
    x_coordinate: i32,
    y_coordinate: i32,
    ship_part_status: String,
}

#[derive(sqlx::FromRow, Debug)]
struct ShipRow {
    id: u32,
    ship_type: String,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Debug)]
struct MovementRow {
    id: u32,
    game_id: u32,
    user_id: String,
    x_coordinate: i32,
    y_coordinate: i32,
    moved_at: DateTime<Utc>,
    hit: bool,
}

#[derive(sqlx::FromRow, Debug)]
struct MessageRow {
    id: u64,
    user_id: String,
    message: String,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<GameRow> for Game {
    type Error = anyhow::Error;

    fn try_from(row: GameRow) -> anyhow::Result<Game> {
        Ok(Game {
            id: row.id,
            host: row.host_id,
            guest: row.guest_id,
            status: row.status.parse()?,
            created_at: row.created_at,
            started_at: row.started_at,
            finished_at: row.finished_at,
            current_turn_started_at: row.current_turn_started_at,
            winner: row.winner_id,
        })
    }
}

impl TryFrom<CellRow> for BoardCell {
    type Error = anyhow::Error;

    fn try_from(row: CellRow) -> anyhow::Result<BoardCell> {
        Ok(BoardCell {
            game_id: row.game_id,
            owner: row.user_id,
            ship_id: row.ship_id,
            coord: Coord::new(row.x_coordinate, row.y_coordinate),
            status: row.ship_part_status.parse()?,
        })
    }
}

impl From<ShipRow> for Ship {
    fn from(row: ShipRow) -> Ship {
        Ship { id: row.id, ship_type: row.ship_type, created_at: row.created_at }
    }
}

impl From<MovementRow> for Movement {
    fn from(row: MovementRow) -> Movement {
        Movement {
            id: row.id,
            game_id: row.game_id,
            shooter: row.user_id,
            coord: Coord::new(row.x_coordinate, row.y_coordinate),
            moved_at: row.moved_at,
            hit: row.hit,
        }
    }
}

impl TryFrom<MessageRow> for StoredNotification {
    type Error = anyhow::Error;

    fn try_from(row: MessageRow) -> anyhow::Result<StoredNotification> {
        let body: Outbound = serde_json::from_str(&row.message)
            .with_context(|| format!("undecodable message {}", row.id))?;
        Ok(StoredNotification {
            id: row.id,
            recipient: row.user_id,
            body,
            status: row.status.parse()?,
            created_at: row.created_at,
        })
    }
}

fn games(rows: Vec<GameRow>) -> anyhow::Result<Vec<Game>> {
    rows.into_iter().map(Game::try_from).collect()
}

pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = MySqlPool::connect(database_url)
            .await
            .context("connecting to MySQL")?;
        sqlx::migrate!()
            .run(&pool)
            .await
            .context("running migrations")?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl Store for MySqlStore {
    async fn create_game(&self, host: &str, at: DateTime<Utc>) -> anyhow::Result<Game> {
        let sql = "INSERT INTO games (host_id, status, created_at) VALUES (?, ?, ?)";
        let id = sqlx::query(sql)
            .bind(host)
            .bind(GameStatus::Pending.as_str())
            .bind(at)
            .execute(&self.pool)
            .await?
            .last_insert_id() as u32;
        debug!("Inserted game {}", id);

        self.game(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("game {} vanished after insert", id))
    }

    async fn game(&self, id: u32) -> anyhow::Result<Option<Game>> {
        let sql = "SELECT * FROM games WHERE id = ?";
        let row: Option<GameRow> = sqlx::query_as(sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Game::try_from).transpose()
    }

    async fn games_with_status(&self, status: GameStatus) -> anyhow::Result<Vec<Game>> {
        let sql = "SELECT * FROM games WHERE status = ? ORDER BY id";
        let rows: Vec<GameRow> = sqlx::query_as(sql)
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await?;
        games(rows)
    }

    async fn active_game_for(&self, user: &str) -> anyhow::Result<Option<Game>> {
        let sql = "SELECT * FROM games WHERE (host_id = ? OR guest_id = ?) AND status IN (?, ?, ?) ORDER BY id DESC LIMIT 1";
        let [pending, setting_up, started] = GameStatus::ACTIVE;
        let row: Option<GameRow> = sqlx::query_as(sql)
            .bind(user)
            .bind(user)
            .bind(pending.as_str())
            .bind(setting_up.as_str())
            .bind(started.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Game::try_from).transpose()
    }

    async fn set_guest(&self, id: u32, guest: &str) -> anyhow::Result<()> {
        let sql = "UPDATE games SET guest_id = ?, status = ? WHERE id = ?";
        sqlx::query(sql)
            .bind(guest)
            .bind(GameStatus::SettingUp.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn start_game(&self, id: u32, at: DateTime<Utc>) -> anyhow::Result<()> {
        let sql = "UPDATE games SET status = ?, started_at = ?, current_turn_started_at = ? WHERE id = ?";
        sqlx::query(sql)
            .bind(GameStatus::Started.as_str())
            .bind(at)
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn finish_game(&self, id: u32, winner: &str, at: DateTime<Utc>) -> anyhow::Result<()> {
        let sql = "UPDATE games SET status = ?, finished_at = ?, winner_id = ? WHERE id = ?";
        sqlx::query(sql)
            .bind(GameStatus::Finished.as_str())
            .bind(at)
            .bind(winner)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn abandon_game(&self, id: u32, at: DateTime<Utc>) -> anyhow::Result<()> {
        let sql = "UPDATE games SET status = ?, finished_at = ? WHERE id = ?";
        sqlx::query(sql)
            .bind(GameStatus::Abandoned.as_str())
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn save_fleet(&self, game_id: u32, owner: &str, ships: &[ShipPlacement], at: DateTime<Utc>) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;

        for placement in ships {
            let sql = "INSERT INTO ships (ship_type, created_at) VALUES (?, ?)";
            let ship_id = sqlx::query(sql)
                .bind(&placement.ship_type)
                .bind(at)
                .execute(&mut tx)
                .await?
                .last_insert_id() as u32;

            for coord in &placement.positions {
                let sql = "INSERT INTO board_cells (game_id, user_id, ship_id, x_coordinate, y_coordinate, ship_part_status) VALUES (?, ?, ?, ?, ?, ?)";
                sqlx::query(sql)
                    .bind(game_id)
                    .bind(owner)
                    .bind(ship_id)
                    .bind(coord.x)
                    .bind(coord.y)
                    .bind(CellStatus::Alive.as_str())
                    .execute(&mut tx)
                    .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn has_fleet(&self, game_id: u32, owner: &str) -> anyhow::Result<bool> {
        let sql = "SELECT id FROM board_cells WHERE game_id = ? AND user_id = ? LIMIT 1";
        let row = sqlx::query(sql)
            .bind(game_id)
            .bind(owner)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn cells(&self, game_id: u32, owner: &str) -> anyhow::Result<Vec<BoardCell>> {
        let sql = "SELECT game_id, user_id, ship_id, x_coordinate, y_coordinate, ship_part_status FROM board_cells WHERE game_id = ? AND user_id = ? ORDER BY id";
        let rows: Vec<CellRow> = sqlx::query_as(sql)
            .bind(game_id)
            .bind(owner)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(BoardCell::try_from).collect()
    }

    async fn ships(&self, game_id: u32, owner: &str) -> anyhow::Result<Vec<Ship>> {
        let sql = "SELECT DISTINCT ships.id, ships.ship_type, ships.created_at FROM ships INNER JOIN board_cells ON board_cells.ship_id = ships.id WHERE board_cells.game_id = ? AND board_cells.user_id = ? ORDER BY ships.id";
        let rows: Vec<ShipRow> = sqlx::query_as(sql)
            .bind(game_id)
            .bind(owner)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Ship::from).collect())
    }

    async fn record_shot(&self, game_id: u32, shooter: &str, target: &str, coord: Coord, at: DateTime<Utc>) -> anyhow::Result<Movement> {
        let mut tx = self.pool.begin().await?;

        // Only a live cell flips, so a repeated shot reports a miss.
        let sql = "UPDATE board_cells SET ship_part_status = ? WHERE game_id = ? AND user_id = ? AND x_coordinate = ? AND y_coordinate = ? AND ship_part_status = ?";
        let hit = sqlx::query(sql)
            .bind(CellStatus::Dead.as_str())
            .bind(game_id)
            .bind(target)
            .bind(coord.x)
            .bind(coord.y)
            .bind(CellStatus::Alive.as_str())
            .execute(&mut tx)
            .await?
            .rows_affected()
            > 0;

        let sql = "INSERT INTO movements (game_id, user_id, x_coordinate, y_coordinate, moved_at, hit) VALUES (?, ?, ?, ?, ?, ?)";
        let id = sqlx::query(sql)
            .bind(game_id)
            .bind(shooter)
            .bind(coord.x)
            .bind(coord.y)
            .bind(at)
            .bind(hit)
            .execute(&mut tx)
            .await?
            .last_insert_id() as u32;

        let sql = "UPDATE games SET current_turn_started_at = ? WHERE id = ?";
        sqlx::query(sql)
            .bind(at)
            .bind(game_id)
            .execute(&mut tx)
            .await?;

        tx.commit().await?;

        Ok(Movement {
            id,
            game_id,
            shooter: shooter.to_string(),
            coord,
            moved_at: at,
            hit,
        })
    }

    async fn movements(&self, game_id: u32) -> anyhow::Result<Vec<Movement>> {
        let sql = "SELECT * FROM movements WHERE game_id = ? ORDER BY moved_at, id";
        let rows: Vec<MovementRow> = sqlx::query_as(sql)
            .bind(game_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Movement::from).collect())
    }

    async fn last_movement(&self, game_id: u32) -> anyhow::Result<Option<Movement>> {
        let sql = "SELECT * FROM movements WHERE game_id = ? ORDER BY moved_at DESC, id DESC LIMIT 1";
        let row: Option<MovementRow> = sqlx::query_as(sql)
            .bind(game_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Movement::from))
    }

    async fn save_notification(&self, recipient: &str, body: &Outbound, status: DeliveryStatus, at: DateTime<Utc>) -> anyhow::Result<u64> {
        let sql = "INSERT INTO messages (user_id, type_of_message, message, status, created_at) VALUES (?, ?, ?, ?, ?)";
        let id = sqlx::query(sql)
            .bind(recipient)
            .bind(body.kind())
            .bind(serde_json::to_string(body)?)
            .bind(status.as_str())
            .bind(at)
            .execute(&self.pool)
            .await?
            .last_insert_id();
        Ok(id)
    }

    async fn pending_notifications(&self, recipient: &str) -> anyhow::Result<Vec<StoredNotification>> {
        let sql = "SELECT id, user_id, message, status, created_at FROM messages WHERE user_id = ? AND status = ? ORDER BY id";
        let rows: Vec<MessageRow> = sqlx::query_as(sql)
            .bind(recipient)
            .bind(DeliveryStatus::Pending.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(StoredNotification::try_from).collect()
    }

    async fn mark_sent(&self, ids: &[u64]) -> anyhow::Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!("UPDATE messages SET status = ? WHERE id IN ({})", placeholders);
        let mut query = sqlx::query(&sql).bind(DeliveryStatus::Sent.as_str());
        for id in ids {
            query = query.bind(*id);
        }
        query.execute(&self.pool).await?;
        Ok(())
    }
}
