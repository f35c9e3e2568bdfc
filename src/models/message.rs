use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::CustomError;
use crate::models::board::{CellStatus, Coord, ShipPlacement};

// What arrives on the socket before the payload is looked at.
#[derive(Deserialize, Debug)]
pub struct RawEnvelope {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: InboundKind,
    #[serde(default)]
    pub message: Value,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum InboundKind {
    ConnectAnnounce,
    SubmitFleet,
    SubmitFleetAutogenerateRequest,
    SubmitShot,
    SubmitShotAuto,
    StateRequest,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubmitFleet {
    pub game_id: u32,
    pub ships: Vec<ShipPlacement>,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubmitShot {
    pub game_id: u32,
    pub x: i32,
    pub y: i32,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GameRef {
    pub game_id: u32,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct StateRequest {
    #[serde(default)]
    pub game_id: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    ConnectAnnounce,
    SubmitFleet(SubmitFleet),
    SubmitFleetAutogenerateRequest(GameRef),
    SubmitShot(SubmitShot),
    SubmitShotAuto(GameRef),
    StateRequest(StateRequest),
}

impl Inbound {
    /// Parses a text frame into the sender id and its decoded payload.
    pub fn parse(text: &str) -> Result<(String, Inbound), CustomError> {
        let raw: RawEnvelope = serde_json::from_str(text).map_err(|_| CustomError::InvalidInput)?;
        let inbound = Inbound::decode(raw.kind, raw.message)?;
        Ok((raw.user_id, inbound))
    }

    pub fn decode(kind: InboundKind, message: Value) -> Result<Inbound, CustomError> {
        fn payload<T: serde::de::DeserializeOwned>(message: Value) -> Result<T, CustomError> {
            serde_json::from_value(message).map_err(|_| CustomError::InvalidInput)
        }

        Ok(match kind {
            InboundKind::ConnectAnnounce => Inbound::ConnectAnnounce,
            InboundKind::SubmitFleet => Inbound::SubmitFleet(payload(message)?),
            InboundKind::SubmitFleetAutogenerateRequest => Inbound::SubmitFleetAutogenerateRequest(payload(message)?),
            InboundKind::SubmitShot => Inbound::SubmitShot(payload(message)?),
            InboundKind::SubmitShotAuto => Inbound::SubmitShotAuto(payload(message)?),
            InboundKind::StateRequest => match message {
                Value::Null => Inbound::StateRequest(StateRequest::default()),
                message => Inbound::StateRequest(payload(message)?),
            },
        })
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SetupReady {
    pub game_id: u32,
    pub host_id: String,
    pub guest_id: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FleetAccepted {
    pub game_id: u32,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CellView {
    pub x: i32,
    pub y: i32,
    pub status: CellStatus,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ShipView {
    pub ship_id: u32,
    pub ship_type: String,
    pub positions: Vec<CellView>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct FleetView {
    pub ships: Vec<ShipView>,
}

// One participant's picture of a running match.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TurnView {
    pub game_id: u32,
    pub dead_pieces_of_the_other: Vec<Coord>,
    pub board_status: FleetView,
    pub your_missed_hits: Vec<Coord>,
    pub rival_missed_hits: Vec<Coord>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FinalView {
    #[serde(flatten)]
    pub board: TurnView,
    pub winner: bool,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AutoFleet {
    pub game_id: u32,
    pub ships: Vec<ShipPlacement>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MatchAbandoned {
    pub game_id: u32,
    pub abandoned_by: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ErrorPayload {
    pub error: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", content = "message", rename_all = "kebab-case")]
pub enum Outbound {
    SetupReady(SetupReady),
    FleetAccepted(FleetAccepted),
    YourTurn(TurnView),
    OpponentTurn(TurnView),
    MatchFinished(FinalView),
    FleetAutogenerated(AutoFleet),
    MatchAbandoned(MatchAbandoned),
    Error(ErrorPayload),
}

impl Outbound {
    pub fn kind(&self) -> &'static str {
        match self {
            Outbound::SetupReady(_) => "setup-ready",
            Outbound::FleetAccepted(_) => "fleet-accepted",
            Outbound::YourTurn(_) => "your-turn",
            Outbound::OpponentTurn(_) => "opponent-turn",
            Outbound::MatchFinished(_) => "match-finished",
            Outbound::FleetAutogenerated(_) => "fleet-autogenerated",
            Outbound::MatchAbandoned(_) => "match-abandoned",
            Outbound::Error(_) => "error",
        }
    }
}

impl From<CustomError> for Outbound {
    fn from(err: CustomError) -> Self {
        Outbound::Error(ErrorPayload { error: err.to_string() })
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct OutboundEnvelope {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(flatten)]
    pub body: Outbound,
}
