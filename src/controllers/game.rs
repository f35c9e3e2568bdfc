use axum::{
    extract::{Path, State, TypedHeader},
    headers::{authorization::Bearer, Authorization},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use log::info;

use crate::check_access;
use crate::errors::CustomError;
use crate::AppState;

//handler for opening a new game. The caller becomes the host.
pub async fn new_game(
    State(state): State<AppState>,
    TypedHeader(bearer): TypedHeader<Authorization<Bearer>>,
) -> Result<impl IntoResponse, CustomError> {
    info!("new game request");

    //check if user is logged in, bail out if not. Retrieve the user_name from the bearer token
    let user_name = check_access(&state, &bearer).await?;

    let game = state.engine.create_game(&user_name).await?;
    Ok((StatusCode::CREATED, Json(game)))
}

//handler listing the games that are waiting for a second player
pub async fn pending_games(
    State(state): State<AppState>,
    TypedHeader(bearer): TypedHeader<Authorization<Bearer>>,
) -> Result<impl IntoResponse, CustomError> {
    info!("pending games request");
    check_access(&state, &bearer).await?;

    let games = state.engine.pending_games().await?;
    Ok((StatusCode::OK, Json(games)))
}

pub async fn get_game(
    Path(game_id): Path<u32>,
    State(state): State<AppState>,
    TypedHeader(bearer): TypedHeader<Authorization<Bearer>>,
) -> Result<impl IntoResponse, CustomError> {
    info!("get game {} request", game_id);
    check_access(&state, &bearer).await?;

    let game = state.engine.fetch_game(game_id).await?;
    Ok((StatusCode::OK, Json(game)))
}

/////////////////////////////////////////////////////////////////////////////////////////////////////////////////
//handler for joining an open game. Both players are told to place their ships.
pub async fn join_game(
    Path(game_id): Path<u32>,
    State(state): State<AppState>,
    TypedHeader(bearer): TypedHeader<Authorization<Bearer>>,
) -> Result<impl IntoResponse, CustomError> {
    info!("Join game {} request", game_id);
    let user_name = check_access(&state, &bearer).await?;

    let game = state.engine.join_game(&user_name, game_id).await?;
    Ok((StatusCode::OK, Json(game)))
}

pub async fn abandon_game(
    Path(game_id): Path<u32>,
    State(state): State<AppState>,
    TypedHeader(bearer): TypedHeader<Authorization<Bearer>>,
) -> Result<impl IntoResponse, CustomError> {
    info!("Abandon game {} request", game_id);
    let user_name = check_access(&state, &bearer).await?;

    let game = state.engine.abandon_game(&user_name, game_id).await?;
    Ok((StatusCode::OK, Json(game)))
}

// Recomputed view of the caller's side of the game, null while still setting up.
pub async fn game_state(
    Path(game_id): Path<u32>,
    State(state): State<AppState>,
    TypedHeader(bearer): TypedHeader<Authorization<Bearer>>,
) -> Result<impl IntoResponse, CustomError> {
    info!("Game {} state request", game_id);
    let user_name = check_access(&state, &bearer).await?;

    let view = state.engine.current_view(&user_name, Some(game_id)).await?;
    Ok((StatusCode::OK, Json(view)))
}
