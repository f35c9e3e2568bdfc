use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use crate::engine::fleet::{generate_fleet, validate_fleet};
use crate::engine::Engine;
use crate::errors::CustomError;
use crate::models::board::ShipPlacement;
use crate::models::game::{Game, GameStatus};
use crate::models::message::{AutoFleet, FleetAccepted, MatchAbandoned, Outbound, SetupReady};

impl Engine {
    /// Opens a match hosted by `host`.
    pub async fn create_game(&self, host: &str) -> Result<Game, CustomError> {
        let _user = self.users.lock(&host.to_string()).await;
        if let Some(active) = self.store.active_game_for(host).await? {
            info!("User {} already plays game {}", host, active.id);
            return Err(CustomError::AlreadyInActiveMatch);
        }
        let game = self.store.create_game(host, Utc::now()).await?;
        info!("Game {} opened by {}", game.id, host);
        Ok(game)
    }

    pub async fn pending_games(&self) -> Result<Vec<Game>, CustomError> {
        Ok(self.store.games_with_status(GameStatus::Pending).await?)
    }

    pub async fn fetch_game(&self, game_id: u32) -> Result<Game, CustomError> {
        self.load(game_id).await
    }

    /// Pending -> SettingUp.
    pub async fn join_game(&self, guest: &str, game_id: u32) -> Result<Game, CustomError> {
        let _user = self.users.lock(&guest.to_string()).await;
        let _game = self.games.lock(&game_id).await;

        let game = self.load(game_id).await?;
        if game.status != GameStatus::Pending {
            return Err(CustomError::GameNotOpen);
        }
        if self.store.active_game_for(guest).await?.is_some() {
            info!("User {} cannot join game {} while playing another", guest, game_id);
            return Err(CustomError::AlreadyInActiveMatch);
        }
        let host = game.host.clone().ok_or(CustomError::InvalidInput)?;

        self.store.set_guest(game_id, guest).await?;
        info!("User {} joined game {} hosted by {}", guest, game_id, host);

        let ready = Outbound::SetupReady(SetupReady {
            game_id,
            host_id: host.clone(),
            guest_id: guest.to_string(),
        });
        self.dispatch(&host, ready.clone()).await;
        self.dispatch(guest, ready).await;

        self.load(game_id).await
    }

    /// Any non-terminal status -> Abandoned. No winner is recorded.
    pub async fn abandon_game(&self, user: &str, game_id: u32) -> Result<Game, CustomError> {
        let _game = self.games.lock(&game_id).await;

        let game = self.load(game_id).await?;
        if !game.is_participant(user) {
            return Err(CustomError::NotAuthorized);
        }
        if game.status.is_terminal() {
            return Err(CustomError::GameFinished);
        }

        self.store.abandon_game(game_id, Utc::now()).await?;
        info!("Game {} abandoned by {}", game_id, user);

        if let Some(opponent) = game.opponent_of(user) {
            let notice = Outbound::MatchAbandoned(MatchAbandoned { game_id, abandoned_by: user.to_string() });
            self.dispatch(opponent, notice).await;
        }
        self.load(game_id).await
    }

    /// Stores the participant's fleet. Whoever completes the second fleet
    /// starts the match; the game lock makes that happen exactly once.
    /// Resubmitting after the fleet was stored only retries the start, so a
    /// store failure between the two steps cannot strand the match.
    pub async fn submit_fleet(&self, user: &str, game_id: u32, ships: Vec<ShipPlacement>) -> Result<(), CustomError> {
        let _game = self.games.lock(&game_id).await;

        let game = self.load(game_id).await?;
        if !game.is_participant(user) {
            return Err(CustomError::NotAuthorized);
        }
        match game.status {
            GameStatus::Pending => return Err(CustomError::NoOpponent),
            GameStatus::Started => return Err(CustomError::AlreadySetUp),
            GameStatus::Finished | GameStatus::Abandoned => return Err(CustomError::GameFinished),
            GameStatus::SettingUp => {}
        }
        let opponent = game.opponent_of(user).ok_or(CustomError::InvalidInput)?;
        if self.store.has_fleet(game_id, user).await? {
            if self.start_if_ready(game_id, opponent).await? {
                return Ok(());
            }
            return Err(CustomError::AlreadySetUp);
        }
        validate_fleet(&ships, self.board_size)?;

        self.store.save_fleet(game_id, user, &ships, Utc::now()).await?;
        debug!("Fleet of {} ships stored for {} in game {}", ships.len(), user, game_id);
        self.dispatch(user, Outbound::FleetAccepted(FleetAccepted { game_id })).await;

        self.start_if_ready(game_id, opponent).await?;
        Ok(())
    }

    // SettingUp -> Started once the opponent's fleet is in too and nobody has
    // shot yet. Caller holds the game lock and has stored its own fleet.
    async fn start_if_ready(&self, game_id: u32, opponent: &str) -> Result<bool, CustomError> {
        let ready = self.store.has_fleet(game_id, opponent).await?
            && self.store.last_movement(game_id).await?.is_none();
        if !ready {
            return Ok(false);
        }
        self.store.start_game(game_id, Utc::now()).await?;
        info!("Game {} started", game_id);
        self.broadcast_views(game_id).await;
        Ok(true)
    }

    // Started -> Finished. Caller holds the game lock.
    pub(crate) async fn finish(&self, game_id: u32, winner: &str, at: DateTime<Utc>) -> Result<(), CustomError> {
        self.store.finish_game(game_id, winner, at).await?;
        info!("Game {} won by {}", game_id, winner);
        self.broadcast_views(game_id).await;
        Ok(())
    }

    // Pushes each participant's current view. The state change is already
    // committed, so failures are logged; `state-request` recomputes the view.
    pub(crate) async fn broadcast_views(&self, game_id: u32) {
        let game = match self.load(game_id).await {
            Ok(game) => game,
            Err(err) => {
                warn!("Could not load game {} to push views: {}", game_id, err);
                return;
            }
        };
        for user in game.participants() {
            match self.view_for(&game, user).await {
                Ok(Some(view)) => self.dispatch(user, view).await,
                Ok(None) => {}
                Err(err) => warn!("Could not build view of game {} for {}: {}", game_id, user, err),
            }
        }
    }

    /// Sends the participant a random legal layout of the standard fleet.
    /// The layout is not stored; the client submits it like any other fleet.
    pub async fn autogenerate_fleet(&self, user: &str, game_id: u32) -> Result<(), CustomError> {
        let game = self.load(game_id).await?;
        if !game.is_participant(user) {
            return Err(CustomError::NotAuthorized);
        }
        if game.status.is_terminal() {
            return Err(CustomError::GameFinished);
        }

        let ships = generate_fleet(&mut rand::thread_rng(), self.board_size);
        self.dispatch(user, Outbound::FleetAutogenerated(AutoFleet { game_id, ships })).await;
        Ok(())
    }
}
