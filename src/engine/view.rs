use crate::engine::{current_turn, Engine};
use crate::errors::CustomError;
use crate::models::board::{CellStatus, Coord};
use crate::models::game::{Game, GameStatus};
use crate::models::message::{CellView, FinalView, FleetView, Outbound, ShipView, TurnView};

impl Engine {
    async fn board_view(&self, game: &Game, user: &str) -> Result<TurnView, CustomError> {
        let opponent = game.opponent_of(user).ok_or(CustomError::NotAuthorized)?;

        let own_cells = self.store.cells(game.id, user).await?;
        let mut ships: Vec<ShipView> = self
            .store
            .ships(game.id, user)
            .await?
            .into_iter()
            .map(|ship| ShipView { ship_id: ship.id, ship_type: ship.ship_type, positions: Vec::new() })
            .collect();
        for cell in own_cells {
            if let Some(ship) = ships.iter_mut().find(|s| Some(s.ship_id) == cell.ship_id) {
                ship.positions.push(CellView { x: cell.coord.x, y: cell.coord.y, status: cell.status });
            }
        }

        let dead_pieces_of_the_other: Vec<Coord> = self
            .store
            .cells(game.id, opponent)
            .await?
            .into_iter()
            .filter(|c| c.status == CellStatus::Dead)
            .map(|c| c.coord)
            .collect();

        let movements = self.store.movements(game.id).await?;
        let misses_by = |shooter: &str| -> Vec<Coord> {
            movements
                .iter()
                .filter(|m| m.shooter == shooter && !m.hit)
                .map(|m| m.coord)
                .collect()
        };

        Ok(TurnView {
            game_id: game.id,
            dead_pieces_of_the_other,
            board_status: FleetView { ships },
            your_missed_hits: misses_by(user),
            rival_missed_hits: misses_by(opponent),
        })
    }

    /// What `user` should currently see for `game`. Nothing while the match
    /// is still being set up or after it was abandoned.
    pub(crate) async fn view_for(&self, game: &Game, user: &str) -> Result<Option<Outbound>, CustomError> {
        match game.status {
            GameStatus::Pending | GameStatus::SettingUp | GameStatus::Abandoned => Ok(None),
            GameStatus::Finished => {
                let board = self.board_view(game, user).await?;
                let winner = game.winner.as_deref() == Some(user);
                Ok(Some(Outbound::MatchFinished(FinalView { board, winner })))
            }
            GameStatus::Started => {
                let last = self.store.last_movement(game.id).await?;
                let turn = current_turn(game, last.as_ref()).ok_or(CustomError::InvalidInput)?;
                let board = self.board_view(game, user).await?;
                if turn.holder == user {
                    Ok(Some(Outbound::YourTurn(board)))
                } else {
                    Ok(Some(Outbound::OpponentTurn(board)))
                }
            }
        }
    }

    /// Recomputes the participant's view from persisted state, for a reload
    /// or reconnect. Without `game_id` the participant's active match is used.
    pub async fn current_view(&self, user: &str, game_id: Option<u32>) -> Result<Option<Outbound>, CustomError> {
        let game_id = match game_id {
            Some(id) => id,
            None => match self.store.active_game_for(user).await? {
                Some(game) => game.id,
                None => return Ok(None),
            },
        };

        let _guard = self.games.lock(&game_id).await;
        let game = self.load(game_id).await?;
        if !game.is_participant(user) {
            return Err(CustomError::NotAuthorized);
        }
        self.view_for(&game, user).await
    }
}
