use std::fmt;

use axum::{http::StatusCode, response::IntoResponse, Json};
use log::error;
use serde_json::json;

// Errors reported back to the participant who triggered them, either as an HTTP
// response or as an `error` notification on the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CustomError {
    GameNotFound,
    NotAuthorized,
    AlreadySetUp,
    DuplicatePosition,
    NotYourTurn,
    GameFinished,
    AlreadyInActiveMatch,
    InvalidInput,
    GameNotOpen,
    NoOpponent,
    GameNotStarted,
    NoTargetsLeft,
    InvalidToken,
}

impl CustomError {
    pub fn message(&self) -> &'static str {
        match self {
            Self::GameNotFound => "Game not found",
            Self::NotAuthorized => "You are not part of this game",
            Self::AlreadySetUp => "Your fleet is already placed",
            Self::DuplicatePosition => "Ships overlap on the same position",
            Self::NotYourTurn => "Not your turn",
            Self::GameFinished => "The game is finished",
            Self::AlreadyInActiveMatch => "You already have an active game",
            Self::InvalidInput => "Invalid value (game, user or coordinates)",
            Self::GameNotOpen => "Game is not open for joining",
            Self::NoOpponent => "Waiting for an opponent to join",
            Self::GameNotStarted => "The game has not started yet",
            Self::NoTargetsLeft => "Every position has already been shot",
            Self::InvalidToken => "Token is not valid",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::GameNotFound => StatusCode::NOT_FOUND,
            Self::NotAuthorized => StatusCode::FORBIDDEN,
            Self::InvalidToken => StatusCode::UNAUTHORIZED,
            Self::AlreadyInActiveMatch | Self::AlreadySetUp | Self::GameNotOpen => StatusCode::CONFLICT,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl fmt::Display for CustomError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for CustomError {}

// Store failures never leak to participants. They are logged here and reported
// as a generic invalid value.
impl From<anyhow::Error> for CustomError {
    fn from(err: anyhow::Error) -> Self {
        error!("Store failure: {:?}", err);
        Self::InvalidInput
    }
}

impl IntoResponse for CustomError {
    fn into_response(self) -> axum::response::Response {
        (self.status(), Json(json!({"error": self.message()}))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_failures_degrade_to_invalid_input() {
        let err: CustomError = anyhow::anyhow!("connection refused").into();
        assert_eq!(err, CustomError::InvalidInput);
    }

    #[test]
    fn response_carries_status_and_message() {
        let response = CustomError::NotYourTurn.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let response = CustomError::GameNotFound.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(CustomError::GameFinished.to_string(), "The game is finished");
    }
}
