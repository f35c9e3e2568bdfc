use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Coord {
    pub x: i32,
    pub y: i32,
}

impl Coord {
    pub fn new(x: i32, y: i32) -> Self {
        Coord { x, y }
    }

    pub fn in_bounds(&self, size: u8) -> bool {
        (0..size as i32).contains(&self.x) && (0..size as i32).contains(&self.y)
    }

    // Row-major index, only meaningful for in-bounds coordinates.
    pub fn index(&self, size: u8) -> usize {
        self.y as usize * size as usize + self.x as usize
    }

    pub fn from_index(index: usize, size: u8) -> Self {
        Coord { x: (index % size as usize) as i32, y: (index / size as usize) as i32 }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CellStatus {
    Alive,
    Dead,
}

impl CellStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CellStatus::Alive => "alive",
            CellStatus::Dead => "dead",
        }
    }
}

impl FromStr for CellStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "alive" => Ok(CellStatus::Alive),
            "dead" => Ok(CellStatus::Dead),
            other => Err(anyhow::anyhow!("unknown cell status {:?}", other)),
        }
    }
}

// One occupied cell of a participant's board.
#[derive(Debug, Clone, PartialEq)]
pub struct BoardCell {
    pub game_id: u32,
    pub owner: String,
    pub ship_id: Option<u32>,
    pub coord: Coord,
    pub status: CellStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ship {
    pub id: u32,
    pub ship_type: String,
    pub created_at: DateTime<Utc>,
}

// A ship as submitted by a client or produced by the fleet generator.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ShipPlacement {
    pub ship_type: String,
    pub positions: Vec<Coord>,
}
