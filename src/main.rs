use axum::{
    headers::{authorization::Bearer, Authorization},
    routing::{get, post},
    Router,
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use simplelog::SimpleLogger;
use std::sync::Arc;

mod config;
mod controllers;
mod engine;
mod errors;
mod models;
mod store;

use crate::config::Config;
use crate::engine::delivery::Hub;
use crate::engine::timeout::spawn_turn_timer;
use crate::engine::Engine;
use crate::errors::CustomError;
use crate::store::{MemoryStore, MySqlStore, Store};

// The claims carried by the Bearer token. The subject is the user id used for matchmaking.
#[derive(Deserialize, Serialize, Debug)]
struct Claims {
    sub: String,
    iat: usize,
    exp: usize,
}

// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub jwt_secret: String,
    pub engine: Arc<Engine>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    // set up logging facility
    let _ = SimpleLogger::init(config.log_level, simplelog::Config::default());
    info!("Starting..");

    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => {
            debug!("database_url: {:?}", url);
            Arc::new(MySqlStore::connect(url).await?)
        }
        None => {
            warn!("$DATABASE_URL is not set, games are kept in memory only");
            Arc::new(MemoryStore::new())
        }
    };

    let hub = Arc::new(Hub::new(store.clone()));
    let engine = Arc::new(Engine::new(store, hub, config.turn_timeout));
    spawn_turn_timer(engine.clone(), config.scan_interval);

    let state = AppState {
        jwt_secret: config.jwt_secret.clone(),
        engine,
    };

    // Define routes
    let app = Router::new()
        .route("/game", post(controllers::game::new_game))
        .route("/games", get(controllers::game::pending_games))
        .route(
            "/game/:game_id",
            get(controllers::game::get_game)
                .post(controllers::game::join_game)
                .delete(controllers::game::abandon_game),
        )
        .route("/game/:game_id/state", get(controllers::game::game_state))
        .route("/ws", get(controllers::socket::ws_handler))
        .with_state(state);

    // Start the server
    debug!("Listening on {}", config.listen_addr);
    axum::Server::bind(&config.listen_addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}

// Helper function to check if a bearer token is valid (user is logged in).
// Returns the user id (sub field) the token was issued for.
async fn check_access(state: &AppState, bearer: &Authorization<Bearer>) -> Result<String, CustomError> {
    match decode::<Claims>(
        bearer.token(),
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    ) {
        Ok(token_data) => Ok(token_data.claims.sub),
        Err(err) => {
            error!("Invalid token: {:?}", err.kind());
            Err(CustomError::InvalidToken)
        }
    }
}
