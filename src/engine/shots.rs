use bit_vec::BitVec;
use chrono::{DateTime, Utc};
use log::{debug, info};

use crate::engine::fleet::pick_untried;
use crate::engine::{current_turn, Engine};
use crate::errors::CustomError;
use crate::models::board::{CellStatus, Coord};
use crate::models::game::{Game, GameStatus};

impl Engine {
    pub async fn submit_shot(&self, user: &str, game_id: u32, target: Coord) -> Result<(), CustomError> {
        let _game = self.games.lock(&game_id).await;
        let game = self.load(game_id).await?;
        self.check_turn(&game, user).await?;
        self.resolve_shot(&game, user, target, Utc::now()).await
    }

    /// Fires at a random coordinate the user has not tried yet.
    pub async fn submit_auto_shot(&self, user: &str, game_id: u32) -> Result<(), CustomError> {
        let _game = self.games.lock(&game_id).await;
        let game = self.load(game_id).await?;
        self.check_turn(&game, user).await?;
        let target = self.untried_target(game_id, user).await?.ok_or(CustomError::NoTargetsLeft)?;
        self.resolve_shot(&game, user, target, Utc::now()).await
    }

    /// Plays for the turn holder when their turn has lasted longer than the
    /// budget. Returns whether a shot was made. A game that is no longer
    /// running is skipped silently.
    pub async fn expire_turn(&self, game_id: u32, now: DateTime<Utc>) -> Result<bool, CustomError> {
        let _game = self.games.lock(&game_id).await;
        let game = match self.store.game(game_id).await? {
            Some(game) if game.status == GameStatus::Started => game,
            _ => return Ok(false),
        };

        if self.settle(&game).await? {
            return Ok(false);
        }
        let last = self.store.last_movement(game_id).await?;
        let turn = current_turn(&game, last.as_ref()).ok_or(CustomError::InvalidInput)?;
        if now - turn.since <= self.turn_timeout {
            return Ok(false);
        }

        let target = match self.untried_target(game_id, &turn.holder).await? {
            Some(target) => target,
            None => return Ok(false),
        };
        info!("Turn of {} in game {} timed out, shooting {:?}", turn.holder, game_id, target);
        self.resolve_shot(&game, &turn.holder, target, now).await?;
        Ok(true)
    }

    async fn check_turn(&self, game: &Game, user: &str) -> Result<(), CustomError> {
        if game.status.is_terminal() {
            return Err(CustomError::GameFinished);
        }
        if !game.is_participant(user) {
            return Err(CustomError::NotAuthorized);
        }
        if game.status != GameStatus::Started {
            return Err(CustomError::GameNotStarted);
        }
        if self.settle(game).await? {
            return Err(CustomError::GameFinished);
        }

        let last = self.store.last_movement(game.id).await?;
        match current_turn(game, last.as_ref()) {
            Some(turn) if turn.holder == user => Ok(()),
            _ => Err(CustomError::NotYourTurn),
        }
    }

    async fn untried_target(&self, game_id: u32, shooter: &str) -> Result<Option<Coord>, CustomError> {
        let size = self.board_size;
        let mut tried = BitVec::from_elem(size as usize * size as usize, false);
        for movement in self.store.movements(game_id).await? {
            if movement.shooter == shooter && movement.coord.in_bounds(size) {
                tried.set(movement.coord.index(size), true);
            }
        }
        let target = pick_untried(&tried, size, &mut rand::thread_rng());
        Ok(target)
    }

    // Finishes a running match whose last shot sank the final cell. Normally
    // that happens right after the shot; this also catches a shot whose
    // outcome could not be settled at the time.
    async fn settle(&self, game: &Game) -> Result<bool, CustomError> {
        let last = match self.store.last_movement(game.id).await? {
            Some(last) if last.hit => last,
            _ => return Ok(false),
        };
        let target = game.opponent_of(&last.shooter).ok_or(CustomError::InvalidInput)?;
        let cells = self.store.cells(game.id, target).await?;
        if cells.is_empty() || cells.iter().any(|c| c.status == CellStatus::Alive) {
            return Ok(false);
        }
        self.finish(game.id, &last.shooter, last.moved_at).await?;
        Ok(true)
    }

    // Records the shot, then either finishes the match or hands the turn
    // over. Caller holds the game lock and has checked the turn.
    async fn resolve_shot(&self, game: &Game, shooter: &str, target: Coord, at: DateTime<Utc>) -> Result<(), CustomError> {
        if !target.in_bounds(self.board_size) {
            return Err(CustomError::InvalidInput);
        }
        let opponent = game.opponent_of(shooter).ok_or(CustomError::InvalidInput)?;

        let movement = self.store.record_shot(game.id, shooter, opponent, target, at).await?;
        debug!("{} shot {:?} in game {}: hit={}", shooter, target, game.id, movement.hit);

        if !self.settle(game).await? {
            self.broadcast_views(game.id).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::engine::testing::*;
    use crate::errors::CustomError;
    use crate::models::board::{CellStatus, Coord};
    use crate::models::game::GameStatus;
    use crate::models::message::Outbound;
    use crate::store::Store;

    #[tokio::test]
    async fn documented_opening_exchange() {
        let (engine, store) = engine();
        let mut ann = connect(&engine, "ann").await;
        let mut bob = connect(&engine, "bob").await;
        let game_id = started_game(&engine).await;

        assert!(matches!(drain(&mut ann).last(), Some(Outbound::YourTurn(_))));
        assert!(matches!(drain(&mut bob).last(), Some(Outbound::OpponentTurn(_))));

        engine.submit_shot("ann", game_id, Coord::new(2, 0)).await.unwrap();
        let shot = store.last_movement(game_id).await.unwrap().unwrap();
        assert!(shot.hit);
        let cell = store.cells(game_id, "bob").await.unwrap().into_iter().find(|c| c.coord == Coord::new(2, 0)).unwrap();
        assert_eq!(cell.status, CellStatus::Dead);
        assert!(matches!(drain(&mut ann).as_slice(), [Outbound::OpponentTurn(_)]));
        assert!(matches!(drain(&mut bob).as_slice(), [Outbound::YourTurn(_)]));

        engine.submit_shot("bob", game_id, Coord::new(5, 5)).await.unwrap();
        let shot = store.last_movement(game_id).await.unwrap().unwrap();
        assert!(!shot.hit);
        assert!(store.cells(game_id, "ann").await.unwrap().iter().all(|c| c.status == CellStatus::Alive));
        assert!(matches!(drain(&mut ann).as_slice(), [Outbound::YourTurn(_)]));
        assert!(matches!(drain(&mut bob).as_slice(), [Outbound::OpponentTurn(_)]));
    }

    #[tokio::test]
    async fn turns_are_enforced() {
        let (engine, _) = engine();
        let game_id = started_game(&engine).await;

        assert_eq!(engine.submit_shot("bob", game_id, Coord::new(0, 0)).await, Err(CustomError::NotYourTurn));
        engine.submit_shot("ann", game_id, Coord::new(9, 9)).await.unwrap();
        assert_eq!(engine.submit_shot("ann", game_id, Coord::new(9, 8)).await, Err(CustomError::NotYourTurn));
        assert_eq!(engine.submit_shot("eve", game_id, Coord::new(9, 8)).await, Err(CustomError::NotAuthorized));
        assert_eq!(engine.submit_shot("bob", game_id, Coord::new(15, 0)).await, Err(CustomError::InvalidInput));
        assert_eq!(engine.submit_shot("bob", 404, Coord::new(1, 1)).await, Err(CustomError::GameNotFound));
    }

    #[tokio::test]
    async fn repeated_shot_is_a_miss() {
        let (engine, store) = engine();
        let game_id = started_game(&engine).await;

        engine.submit_shot("ann", game_id, Coord::new(3, 0)).await.unwrap();
        engine.submit_shot("bob", game_id, Coord::new(9, 9)).await.unwrap();
        engine.submit_shot("ann", game_id, Coord::new(3, 0)).await.unwrap();
        assert!(!store.last_movement(game_id).await.unwrap().unwrap().hit);
    }

    #[tokio::test]
    async fn sinking_the_last_cell_wins() {
        let (engine, store) = engine();
        let game_id = started_game(&engine).await;
        let mut ann = connect(&engine, "ann").await;
        let mut bob = connect(&engine, "bob").await;

        for (x, miss) in [(2, (10, 10)), (3, (10, 11))] {
            engine.submit_shot("ann", game_id, Coord::new(x, 0)).await.unwrap();
            engine.submit_shot("bob", game_id, Coord::new(miss.0, miss.1)).await.unwrap();
        }
        drain(&mut ann);
        drain(&mut bob);
        engine.submit_shot("ann", game_id, Coord::new(4, 0)).await.unwrap();

        let game = store.game(game_id).await.unwrap().unwrap();
        assert_eq!(game.status, GameStatus::Finished);
        assert_eq!(game.winner.as_deref(), Some("ann"));
        assert!(game.finished_at.is_some());

        match drain(&mut ann).as_slice() {
            [Outbound::MatchFinished(view)] => {
                assert!(view.winner);
                assert_eq!(view.board.dead_pieces_of_the_other.len(), 3);
                assert_eq!(view.board.rival_missed_hits, vec![Coord::new(10, 10), Coord::new(10, 11)]);
            }
            other => panic!("unexpected messages {:?}", other),
        }
        match drain(&mut bob).as_slice() {
            [Outbound::MatchFinished(view)] => assert!(!view.winner),
            other => panic!("unexpected messages {:?}", other),
        }

        assert_eq!(engine.submit_shot("bob", game_id, Coord::new(0, 0)).await, Err(CustomError::GameFinished));
        assert_eq!(engine.submit_auto_shot("bob", game_id).await, Err(CustomError::GameFinished));
    }

    #[tokio::test]
    async fn unsettled_winning_shot_is_settled_on_next_move() {
        let (engine, store) = flaky_engine();
        let game_id = started_game(&engine).await;
        for (x, miss) in [(2, (10, 10)), (3, (10, 11))] {
            engine.submit_shot("ann", game_id, Coord::new(x, 0)).await.unwrap();
            engine.submit_shot("bob", game_id, Coord::new(miss.0, miss.1)).await.unwrap();
        }

        store.fail("cells", 1);
        assert_eq!(engine.submit_shot("ann", game_id, Coord::new(4, 0)).await, Err(CustomError::InvalidInput));
        assert_eq!(store.game(game_id).await.unwrap().unwrap().status, GameStatus::Started);

        let mut bob = connect(&engine, "bob").await;
        drain(&mut bob);
        assert_eq!(engine.submit_shot("bob", game_id, Coord::new(0, 0)).await, Err(CustomError::GameFinished));
        let game = store.game(game_id).await.unwrap().unwrap();
        assert_eq!(game.status, GameStatus::Finished);
        assert_eq!(game.winner.as_deref(), Some("ann"));
        assert!(matches!(drain(&mut bob).as_slice(), [Outbound::MatchFinished(view)] if !view.winner));
    }

    #[tokio::test]
    async fn auto_shot_takes_an_untried_cell() {
        let (engine, store) = engine();
        let game_id = started_game(&engine).await;

        engine.submit_auto_shot("ann", game_id).await.unwrap();
        let first = store.last_movement(game_id).await.unwrap().unwrap();
        assert_eq!(first.shooter, "ann");
        assert!(first.coord.in_bounds(engine.board_size()));
        assert_eq!(engine.submit_auto_shot("ann", game_id).await, Err(CustomError::NotYourTurn));
    }
}
