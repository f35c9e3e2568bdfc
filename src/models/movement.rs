use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::board::Coord;

// A shot. Movements are append-only and never updated.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Movement {
    pub id: u32,
    pub game_id: u32,
    pub shooter: String,
    pub coord: Coord,
    pub moved_at: DateTime<Utc>,
    pub hit: bool,
}
