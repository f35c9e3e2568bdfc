use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Game {
    pub id: u32,
    pub host: Option<String>,
    pub guest: Option<String>,
    pub status: GameStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub current_turn_started_at: Option<DateTime<Utc>>,
    pub winner: Option<String>,
}

impl Game {
    pub fn is_participant(&self, user: &str) -> bool {
        self.host.as_deref() == Some(user) || self.guest.as_deref() == Some(user)
    }

    // The other side of the match, if it has joined.
    pub fn opponent_of(&self, user: &str) -> Option<&str> {
        if self.host.as_deref() == Some(user) {
            self.guest.as_deref()
        } else if self.guest.as_deref() == Some(user) {
            self.host.as_deref()
        } else {
            None
        }
    }

    pub fn participants(&self) -> impl Iterator<Item = &str> {
        self.host.as_deref().into_iter().chain(self.guest.as_deref())
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum GameStatus {
    Pending,
    SettingUp,
    Started,
    Finished,
    Abandoned,
}

impl GameStatus {
    pub const ACTIVE: [GameStatus; 3] = [GameStatus::Pending, GameStatus::SettingUp, GameStatus::Started];

    pub fn is_terminal(&self) -> bool {
        matches!(self, GameStatus::Finished | GameStatus::Abandoned)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GameStatus::Pending => "pending",
            GameStatus::SettingUp => "settingUp",
            GameStatus::Started => "started",
            GameStatus::Finished => "finished",
            GameStatus::Abandoned => "abandoned",
        }
    }
}

impl FromStr for GameStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(GameStatus::Pending),
            "settingUp" => Ok(GameStatus::SettingUp),
            "started" => Ok(GameStatus::Started),
            "finished" => Ok(GameStatus::Finished),
            "abandoned" => Ok(GameStatus::Abandoned),
            other => Err(anyhow::anyhow!("unknown game status {:?}", other)),
        }
    }
}
