use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, error, warn};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::engine::Engine;
use crate::models::game::GameStatus;

/// One pass over every running match, shooting for turn holders that ran out
/// of time. A failing match is logged and skipped. Returns the number of
/// shots made.
pub async fn scan_once(engine: &Engine, now: DateTime<Utc>) -> usize {
    let games = match engine.store.games_with_status(GameStatus::Started).await {
        Ok(games) => games,
        Err(err) => {
            error!("Turn scan could not list running games: {:?}", err);
            return 0;
        }
    };

    let mut shots = 0;
    for game in games {
        match engine.expire_turn(game.id, now).await {
            Ok(true) => shots += 1,
            Ok(false) => {}
            Err(err) => warn!("Turn scan skipped game {}: {}", game.id, err),
        }
    }
    if shots > 0 {
        debug!("Turn scan played {} timed out turns", shots);
    }
    shots
}

/// Runs [`scan_once`] every `every` until the runtime shuts down.
pub fn spawn_turn_timer(engine: Arc<Engine>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            scan_once(&engine, Utc::now()).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::engine::testing::*;
    use crate::store::Store;

    #[tokio::test]
    async fn idle_holder_gets_exactly_one_shot() {
        let (engine, store) = engine();
        let game_id = started_game(&engine).await;
        let started = store.game(game_id).await.unwrap().unwrap().started_at.unwrap();

        assert_eq!(scan_once(&engine, started + Duration::seconds(19)).await, 0);

        let late = started + Duration::seconds(21);
        assert_eq!(scan_once(&engine, late).await, 1);
        assert_eq!(scan_once(&engine, late).await, 0);

        let movements = store.movements(game_id).await.unwrap();
        assert_eq!(movements.len(), 1);
        assert_eq!(movements[0].shooter, "ann");
        assert_eq!(movements[0].moved_at, late);

        // Now bob holds the turn and his clock started at the synthetic shot.
        let later = late + Duration::seconds(21);
        assert_eq!(scan_once(&engine, later).await, 1);
        let movements = store.movements(game_id).await.unwrap();
        assert_eq!(movements[1].shooter, "bob");
    }

    #[tokio::test]
    async fn synthetic_shots_never_repeat_a_coordinate() {
        let (engine, store) = engine();
        let game_id = started_game(&engine).await;
        let mut now = Utc::now();

        for _ in 0..40 {
            now = now + Duration::seconds(30);
            scan_once(&engine, now).await;
        }
        let movements = store.movements(game_id).await.unwrap();
        let mut ann: Vec<_> = movements.iter().filter(|m| m.shooter == "ann").map(|m| (m.coord.x, m.coord.y)).collect();
        let count = ann.len();
        ann.sort();
        ann.dedup();
        assert_eq!(ann.len(), count);
    }

    #[tokio::test]
    async fn broken_game_does_not_stop_the_scan() {
        let (engine, store) = engine();
        let opened = Utc::now();
        // Started without a guest: shooting for its host cannot succeed.
        let broken = store.create_game("zed", opened).await.unwrap();
        store.start_game(broken.id, opened).await.unwrap();
        let game_id = started_game(&engine).await;

        let late = Utc::now() + Duration::seconds(60);
        assert_eq!(scan_once(&engine, late).await, 1);
        assert!(store.movements(broken.id).await.unwrap().is_empty());
        let movements = store.movements(game_id).await.unwrap();
        assert_eq!(movements.len(), 1);
        assert_eq!(movements[0].shooter, "ann");
    }

    #[tokio::test]
    async fn abandoned_games_are_left_alone() {
        let (engine, store) = engine();
        let game_id = started_game(&engine).await;
        engine.abandon_game("bob", game_id).await.unwrap();

        let late = Utc::now() + Duration::seconds(60);
        assert_eq!(scan_once(&engine, late).await, 0);
        assert!(store.movements(game_id).await.unwrap().is_empty());
        assert_eq!(engine.expire_turn(game_id, late).await, Ok(false));
        assert_eq!(engine.expire_turn(777, late).await, Ok(false));
    }
}
