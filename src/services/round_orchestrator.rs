//! Round selection and room status transitions.
//!
//! Catalog rotation counters live in the caller's [`SessionState`]; every
//! operation takes the current session and hands back the next one instead of
//! reading ambient state.
//!
//! Store failures are not swallowed here: they surface as
//! [`ServiceError::TransientStore`], which the HTTP layer answers with 503.
//! Per-player score increments are the exception, see [`score_ledger::apply`].

use indexmap::IndexMap;
use rand::{Rng, RngCore};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::{
    dao::{paths, room::encode},
    error::ServiceError,
    services::{
        room_directory::{fetch_room, require_host, require_member},
        score_ledger, turn_coordinator,
    },
    state::{
        SharedState,
        catalog::{Catalog, RoundSettings, ScoringRule},
        room::{Game, GameStatus, PlayerId, Room, RoomStatus},
        session::SessionState,
        state_machine::{RoomEvent, RoomPhase},
        turn::{RoundClock, TurnState, now_ms},
    },
};

/// Next game selection together with the advanced session counters.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundPlan {
    /// `None` once every catalog entry was played this session.
    pub game: Option<Game>,
    pub session: SessionState,
}

/// Pick the next catalog game for `session`.
///
/// A first round restarts the rotation at a random catalog index. Afterwards
/// the rotation walks the catalog round-robin and stops after one full cycle,
/// so no entry repeats until the next first round.
pub fn plan_round(
    catalog: &Catalog,
    settings: &RoundSettings,
    session: &SessionState,
    first_round: bool,
    rng: &mut dyn RngCore,
) -> RoundPlan {
    let mut next = session.clone();
    if catalog.is_empty() {
        return RoundPlan {
            game: None,
            session: next,
        };
    }

    if first_round {
        next.games_played = 0;
        next.current_game_index = rng.random_range(0..catalog.len());
    }
    if next.games_played >= catalog.len() {
        return RoundPlan {
            game: None,
            session: next,
        };
    }

    let index = (next.current_game_index + 1) % catalog.len();
    next.current_game_index = index;
    next.games_played += 1;

    let game = catalog.get(index).map(|entry| {
        let config = entry.generate_config(settings, rng);
        Game::ready(entry, config)
    });
    RoundPlan {
        game,
        session: next,
    }
}

/// Outcome of [`start_round`].
#[derive(Debug, Clone, PartialEq)]
pub struct RoundStart {
    pub status: RoomStatus,
    pub game: Option<Game>,
}

/// Host selects the next game and moves the room to `playing`.
///
/// When the catalog is exhausted the room ends instead.
pub async fn start_round(
    state: &SharedState,
    code: &str,
    session: &SessionState,
    first_round: bool,
) -> Result<(RoundStart, SessionState), ServiceError> {
    state
        .run_transition(code, || async move {
            let room = fetch_room(state, code).await?;
            require_host(&room, session)?;
            let phase = RoomPhase::from(&room);

            let plan = plan_round(
                state.catalog(),
                &state.config().rounds,
                session,
                first_round,
                &mut rand::rng(),
            );

            let Some(game) = plan.game else {
                let status = phase.transition(RoomEvent::SessionExhausted)?.status();
                write_status(state, code, status).await?;
                state.turns().remove(code);
                info!(room = %code, "catalog exhausted; session ended");
                return Ok((RoundStart { status, game: None }, plan.session));
            };

            let status = phase
                .transition(RoomEvent::StartRound { first_round })?
                .status();
            if first_round {
                score_ledger::reset_scores(state.store().as_ref(), &room).await?;
            }

            let mut fields = Map::new();
            fields.insert("status".into(), encode("status", &status)?);
            fields.insert("game".into(), encode("game", &game)?);
            fields.insert("currentPlayer".into(), Value::Null);
            state.rooms().update(code, fields).await?;
            state.turns().insert(code.to_owned(), TurnState::Idle);

            info!(
                room = %code,
                game = %game.id,
                games_played = plan.session.games_played,
                first_round,
                "round started"
            );
            Ok((
                RoundStart {
                    status,
                    game: Some(game),
                },
                plan.session,
            ))
        })
        .await
}

/// Host starts the countdown: persists the authoritative round end and hands
/// the token to the first player.
pub async fn begin_play(
    state: &SharedState,
    code: &str,
    session: &SessionState,
) -> Result<Game, ServiceError> {
    state
        .run_transition(code, || async move {
            let room = fetch_room(state, code).await?;
            require_host(&room, session)?;
            RoomPhase::from(&room).transition(RoomEvent::BeginPlay)?;

            let mut game = room
                .game
                .clone()
                .ok_or_else(|| ServiceError::InvalidState(format!("room `{code}` has no round")))?;
            let clock = RoundClock::starting_at(now_ms(), game.config.duration_secs());
            game.status = GameStatus::Running;
            game.ends_at = Some(clock.ends_at_ms);

            let mut fields = Map::new();
            fields.insert("game/status".into(), encode("game/status", &game.status)?);
            fields.insert("game/endsAt".into(), Value::from(clock.ends_at_ms));
            state.rooms().update(code, fields).await?;

            turn_coordinator::assign_initial_holder(state, &room).await?;
            info!(room = %code, game = %game.id, ends_at = clock.ends_at_ms, "round running");
            Ok(game)
        })
        .await
}

/// Record the caller's raw result for the running round.
pub async fn report_result(
    state: &SharedState,
    code: &str,
    session: &SessionState,
    value: i64,
) -> Result<(), ServiceError> {
    let room = fetch_room(state, code).await?;
    let player_id = require_member(&room, session)?;
    if RoomPhase::from(&room) != RoomPhase::Playing(GameStatus::Running) {
        return Err(ServiceError::InvalidState(format!(
            "room `{code}` has no running round"
        )));
    }

    state
        .store()
        .write(&paths::game_result(code, player_id), Value::from(value))
        .await?;
    info!(room = %code, player = %player_id, value, "result reported");
    Ok(())
}

/// Outcome of [`resolve_round`].
#[derive(Debug, Clone, PartialEq)]
pub struct RoundResolution {
    pub status: RoomStatus,
    /// Holder at expiry for flat-bonus rounds.
    pub loser: Option<PlayerId>,
    /// Points awarded this round.
    pub points: IndexMap<PlayerId, u32>,
    /// New totals of the players whose score was updated.
    pub totals: IndexMap<PlayerId, i64>,
}

/// Host scores the running round and finishes it.
///
/// The round status flips from `running` to `ranking` with a compare-and-swap
/// first, so a round is scored exactly once even if resolution is requested twice.
/// Flat-bonus rounds are only resolvable once their clock has run out. After
/// the claim, points and the room status are written by a detached task, so a
/// transition timeout cannot leave a claimed round unscored.
pub async fn resolve_round(
    state: &SharedState,
    code: &str,
    session: &SessionState,
) -> Result<RoundResolution, ServiceError> {
    state
        .run_transition(code, || async move {
            let room = fetch_room(state, code).await?;
            require_host(&room, session)?;
            let game = room
                .game
                .as_ref()
                .ok_or_else(|| ServiceError::InvalidState(format!("room `{code}` has no round")))?;
            let next = RoomPhase::from(&room).transition(RoomEvent::FinishRound {
                session_complete: session_complete(state.catalog(), session),
            })?;

            let entry = state.catalog().entry(game.id).ok_or_else(|| {
                ServiceError::InvariantViolation(format!("game `{}` is not in the catalog", game.id))
            })?;
            // Flat-bonus rounds only end on expiry.
            if entry.scoring == ScoringRule::FlatBonus {
                let expired = game.ends_at.is_some_and(|ends_at| {
                    RoundClock::new(ends_at, game.config.duration_secs()).is_expired(now_ms())
                });
                if !expired {
                    return Err(ServiceError::InvalidState(format!(
                        "round of room `{code}` is still on the clock"
                    )));
                }
            }

            let claimed = state
                .store()
                .compare_and_swap(
                    &paths::game_status(code),
                    Some(encode("game/status", &GameStatus::Running)?),
                    encode("game/status", &GameStatus::Ranking)?,
                )
                .await?;
            if !claimed {
                return Err(ServiceError::InvalidState(format!(
                    "round of room `{code}` was already resolved"
                )));
            }

            let (loser, points) = match entry.scoring {
                ScoringRule::RankAscending => {
                    let results: IndexMap<PlayerId, i64> = game
                        .results
                        .iter()
                        .filter(|(id, _)| room.players.contains_key(*id))
                        .map(|(id, value)| (id.clone(), *value))
                        .collect();
                    (None, score_ledger::rank_points(&results))
                }
                ScoringRule::FlatBonus => {
                    let loser = holder_at_expiry(&room);
                    let points = score_ledger::flat_bonus(
                        room.players.keys(),
                        loser.as_deref(),
                        state.config().flat_bonus,
                    );
                    (loser, points)
                }
            };
            state
                .turns()
                .insert(code.to_owned(), TurnState::Expired { loser: loser.clone() });

            // Once claimed, scoring runs to completion even if this call times out.
            let settle = tokio::spawn(settle_round(
                state.clone(),
                code.to_owned(),
                points.clone(),
                next,
            ));
            let (totals, status) = settle.await.map_err(|err| {
                ServiceError::InvariantViolation(format!("scoring of room `{code}` failed: {err}"))
            })??;

            info!(room = %code, game = %game.id, ?status, loser = ?loser, "round resolved");
            Ok(RoundResolution {
                status,
                loser,
                points,
                totals,
            })
        })
        .await
}

/// Apply the claimed round's points and persist the room status that follows.
async fn settle_round(
    state: SharedState,
    code: String,
    points: IndexMap<PlayerId, u32>,
    next: RoomPhase,
) -> Result<(IndexMap<PlayerId, i64>, RoomStatus), ServiceError> {
    let totals = score_ledger::apply(state.store().as_ref(), &code, &points).await;
    let status = finish_round(&state, &code, next).await.inspect_err(|err| {
        warn!(room = %code, error = %err, "failed to finish resolved round");
    })?;
    Ok((totals, status))
}

/// Persist the post-round room status: `ended` once the session played the
/// whole catalog, `ranking` otherwise.
pub async fn finish_round(
    state: &SharedState,
    code: &str,
    next: RoomPhase,
) -> Result<RoomStatus, ServiceError> {
    let status = next.status();
    if !matches!(status, RoomStatus::Ranking | RoomStatus::Ended) {
        return Err(ServiceError::InvalidState(format!(
            "a round cannot finish into {status:?}"
        )));
    }
    write_status(state, code, status).await?;
    Ok(status)
}

/// Whether `session` has played every catalog entry.
pub fn session_complete(catalog: &Catalog, session: &SessionState) -> bool {
    session.games_played >= catalog.len()
}

fn holder_at_expiry(room: &Room) -> Option<PlayerId> {
    match room.holder() {
        Ok(holder) => holder.map(|player| player.id.clone()),
        Err(err) => {
            warn!(room = %room.code, error = %err, "no valid holder at expiry");
            None
        }
    }
}

async fn write_status(state: &SharedState, code: &str, status: RoomStatus) -> Result<(), ServiceError> {
    state
        .store()
        .write(&paths::status(code), encode("status", &status)?)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            state_store::{MemoryStore, StateStore, Subscription},
            storage::StorageResult,
        },
        error::AppError,
        services::{
            room_directory::{create_room, join_room, open_lobby},
            turn_coordinator::{
                CountdownEvent, PassOutcome, PassRejection, pass, start_countdown,
            },
        },
        state::{
            AppState,
            catalog::{GameKey, numbers_in_order},
        },
    };
    use axum::{http::StatusCode, response::IntoResponse};
    use futures::future::BoxFuture;
    use rand::{SeedableRng, rngs::StdRng};
    use serde_json::json;
    use std::{collections::HashSet, sync::Arc, time::Duration};

    #[test]
    fn rotation_never_repeats_within_a_session() {
        let catalog = Catalog::standard();
        let settings = RoundSettings::default();
        let mut rng = StdRng::seed_from_u64(5);

        for _ in 0..20 {
            let mut session = SessionState::joined("AB23", "p1", true);
            let mut seen = HashSet::new();
            let mut first = true;
            loop {
                let plan = plan_round(&catalog, &settings, &session, first, &mut rng);
                first = false;
                session = plan.session;
                match plan.game {
                    Some(game) => assert!(seen.insert(game.id), "{} repeated", game.id),
                    None => break,
                }
            }
            assert_eq!(seen.len(), catalog.len());
            assert_eq!(session.games_played, catalog.len());
        }
    }

    #[test]
    fn first_round_resets_the_rotation() {
        let catalog = Catalog::standard();
        let mut rng = StdRng::seed_from_u64(9);
        let exhausted = SessionState {
            games_played: catalog.len(),
            ..SessionState::joined("AB23", "p1", true)
        };

        let plan = plan_round(&catalog, &RoundSettings::default(), &exhausted, false, &mut rng);
        assert!(plan.game.is_none());
        assert_eq!(plan.session, exhausted);

        let plan = plan_round(&catalog, &RoundSettings::default(), &exhausted, true, &mut rng);
        assert!(plan.game.is_some());
        assert_eq!(plan.session.games_played, 1);
    }

    #[test]
    fn empty_catalog_plans_nothing() {
        let plan = plan_round(
            &Catalog::new(Vec::new()),
            &RoundSettings::default(),
            &SessionState::default(),
            true,
            &mut StdRng::seed_from_u64(1),
        );
        assert!(plan.game.is_none());
    }

    struct Lobby {
        store: MemoryStore,
        state: SharedState,
        code: String,
        host: SessionState,
        guest: SessionState,
    }

    async fn lobby() -> Lobby {
        let store = MemoryStore::new();
        let state = AppState::new(Arc::new(store.clone()), AppConfig::default());
        let room = create_room(&state).await.unwrap();
        let host = join_room(&state, &room.code, "host", "Ana", true).await.unwrap();
        let guest = join_room(&state, &room.code, "guest", "Bo", false).await.unwrap();
        open_lobby(&state, &room.code, &host).await.unwrap();
        Lobby {
            store,
            state,
            code: room.code,
            host,
            guest,
        }
    }

    /// Start first rounds until `key` comes up.
    async fn start_game(lobby: &Lobby, key: GameKey) -> SessionState {
        loop {
            let (start, next) = start_round(&lobby.state, &lobby.code, &lobby.host, true)
                .await
                .unwrap();
            if start.game.map(|game| game.id) == Some(key) {
                break next;
            }
        }
    }

    /// Move the persisted round end into the past.
    async fn expire(store: &MemoryStore, code: &str) {
        store
            .write(&format!("rooms/{code}/game/endsAt"), json!(now_ms() - 1))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn only_the_host_starts_rounds() {
        let Lobby {
            state, code, guest, ..
        } = lobby().await;
        assert!(matches!(
            start_round(&state, &code, &guest, true).await,
            Err(ServiceError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn first_round_resets_scores_and_writes_ready_game() {
        let Lobby {
            store,
            state,
            code,
            host,
            ..
        } = lobby().await;
        store
            .write(&format!("rooms/{code}/players/guest/score"), json!(6))
            .await
            .unwrap();

        let (start, session) = start_round(&state, &code, &host, true).await.unwrap();
        assert_eq!(start.status, RoomStatus::Playing);
        assert_eq!(session.games_played, 1);

        let room = fetch_room(&state, &code).await.unwrap();
        assert_eq!(room.players["guest"].score, 0);
        let game = room.game.unwrap();
        assert_eq!(game.status, GameStatus::Ready);
        assert_eq!(Some(game.id), start.game.map(|g| g.id));
        assert!(room.current_holder.is_none());
    }

    #[tokio::test]
    async fn begin_play_persists_round_end_and_first_holder() {
        let Lobby {
            state, code, host, ..
        } = lobby().await;
        let (_, session) = start_round(&state, &code, &host, true).await.unwrap();

        let before = now_ms();
        let game = begin_play(&state, &code, &session).await.unwrap();
        let ends_at = game.ends_at.unwrap();
        let duration_ms = i64::from(game.config.duration_secs()) * 1_000;
        assert!(ends_at >= before + duration_ms);

        let room = fetch_room(&state, &code).await.unwrap();
        assert_eq!(room.game_status(), Some(GameStatus::Running));
        assert_eq!(room.game.unwrap().ends_at, Some(ends_at));
        assert_eq!(room.current_holder.as_deref(), Some("host"));

        assert!(matches!(
            begin_play(&state, &code, &session).await,
            Err(ServiceError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn results_require_a_running_round() {
        let Lobby {
            state,
            code,
            host,
            guest,
            ..
        } = lobby().await;
        let (_, session) = start_round(&state, &code, &host, true).await.unwrap();
        assert!(matches!(
            report_result(&state, &code, &guest, 10).await,
            Err(ServiceError::InvalidState(_))
        ));

        begin_play(&state, &code, &session).await.unwrap();
        report_result(&state, &code, &guest, 10).await.unwrap();
        let room = fetch_room(&state, &code).await.unwrap();
        assert_eq!(room.game.unwrap().results["guest"], 10);
    }

    #[tokio::test]
    async fn rank_round_scores_results_and_is_resolved_once() {
        let lobby = lobby().await;
        // The first game of a session is random; restart until the ranked one comes up.
        let session = start_game(&lobby, GameKey::NumbersInOrder).await;
        let Lobby {
            store,
            state,
            code,
            host,
            guest,
        } = lobby;
        begin_play(&state, &code, &session).await.unwrap();
        report_result(&state, &code, &guest, 12).await.unwrap();
        report_result(&state, &code, &host, 30).await.unwrap();
        store
            .write(&format!("rooms/{code}/game/results/ghost"), json!(1))
            .await
            .unwrap();

        let resolution = resolve_round(&state, &code, &session).await.unwrap();
        assert_eq!(resolution.points["guest"], 2);
        assert_eq!(resolution.points["host"], 1);
        assert!(!resolution.points.contains_key("ghost"));
        assert_eq!(resolution.status, RoomStatus::Ranking);

        let room = fetch_room(&state, &code).await.unwrap();
        assert_eq!(room.players["guest"].score, 2);
        assert_eq!(room.players["host"].score, 1);
        assert_eq!(room.game_status(), Some(GameStatus::Ranking));

        assert!(matches!(
            resolve_round(&state, &code, &session).await,
            Err(ServiceError::InvalidState(_))
        ));
        let room = fetch_room(&state, &code).await.unwrap();
        assert_eq!(room.players["guest"].score, 2);
    }

    #[tokio::test]
    async fn exhausted_catalog_ends_the_room() {
        let Lobby {
            store,
            state,
            code,
            host,
            ..
        } = lobby().await;
        let mut session = host.clone();
        let mut first = true;
        for _ in 0..state.catalog().len() {
            let (start, next) = start_round(&state, &code, &session, first).await.unwrap();
            assert_eq!(start.status, RoomStatus::Playing);
            session = next;
            first = false;
            begin_play(&state, &code, &session).await.unwrap();
            expire(&store, &code).await;
            resolve_round(&state, &code, &session).await.unwrap();
        }
        assert_eq!(fetch_room(&state, &code).await.unwrap().status, RoomStatus::Ended);

        assert!(matches!(
            start_round(&state, &code, &session, false).await,
            Err(ServiceError::InvalidState(_))
        ));
        let (start, session) = start_round(&state, &code, &session, true).await.unwrap();
        assert_eq!(start.status, RoomStatus::Playing);
        assert_eq!(session.games_played, 1);
    }

    #[tokio::test]
    async fn hot_potato_cannot_be_resolved_before_its_clock_runs_out() {
        let lobby = lobby().await;
        let session = start_game(&lobby, GameKey::HotPotato).await;
        let Lobby {
            store, state, code, ..
        } = lobby;
        begin_play(&state, &code, &session).await.unwrap();

        assert!(matches!(
            resolve_round(&state, &code, &session).await,
            Err(ServiceError::InvalidState(_))
        ));
        let room = fetch_room(&state, &code).await.unwrap();
        assert_eq!(room.game_status(), Some(GameStatus::Running));
        assert!(room.players.values().all(|player| player.score == 0));

        expire(&store, &code).await;
        let resolution = resolve_round(&state, &code, &session).await.unwrap();
        assert_eq!(resolution.loser.as_deref(), Some("host"));
        assert_eq!(resolution.points["guest"], 2);
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_and_resolution_agree_on_the_loser() {
        let lobby = lobby().await;
        let session = start_game(&lobby, GameKey::HotPotato).await;
        let Lobby {
            store, state, code, ..
        } = lobby;
        begin_play(&state, &code, &session).await.unwrap();
        assert!(matches!(
            pass(&state, &code, "host").await.unwrap(),
            PassOutcome::Passed { .. }
        ));

        expire(&store, &code).await;
        let room = fetch_room(&state, &code).await.unwrap();
        let mut countdown = start_countdown(state.rooms().clone(), &room, 4.0).unwrap();
        let loser = loop {
            match countdown.next().await {
                Some(CountdownEvent::Expired { loser }) => break loser,
                Some(CountdownEvent::Tick { .. }) => continue,
                None => panic!("countdown stopped without expiring"),
            }
        };

        let resolution = resolve_round(&state, &code, &session).await.unwrap();
        assert_eq!(loser.as_deref(), Some("guest"));
        assert_eq!(resolution.loser, loser);
        assert_eq!(resolution.points["host"], 2);
    }

    #[tokio::test(start_paused = true)]
    async fn resolution_during_a_handoff_keeps_the_scored_holder() {
        let lobby = lobby().await;
        let session = start_game(&lobby, GameKey::HotPotato).await;
        let Lobby {
            store, state, code, ..
        } = lobby;
        begin_play(&state, &code, &session).await.unwrap();

        let in_flight = {
            let (state, code) = (state.clone(), code.clone());
            tokio::spawn(async move { pass(&state, &code, "host").await })
        };
        while !state.turns().get(&code).is_some_and(|turn| turn.is_thrown()) {
            tokio::task::yield_now().await;
        }

        expire(&store, &code).await;
        let resolution = resolve_round(&state, &code, &session).await.unwrap();
        assert_eq!(resolution.loser.as_deref(), Some("host"));

        let outcome = in_flight.await.unwrap().unwrap();
        assert!(matches!(
            outcome,
            PassOutcome::Rejected(PassRejection::RoundNotRunning | PassRejection::RoundExpired)
        ));
        let room = fetch_room(&state, &code).await.unwrap();
        assert_eq!(room.current_holder.as_deref(), Some("host"));
        assert_eq!(
            *state.turns().get(&code).unwrap(),
            TurnState::Expired {
                loser: Some("host".into())
            }
        );
    }

    /// Store whose score increments stall for `delay`.
    struct SlowIncrements {
        inner: MemoryStore,
        delay: Duration,
    }

    impl StateStore for SlowIncrements {
        fn read(&self, path: &str) -> BoxFuture<'static, StorageResult<Option<Value>>> {
            self.inner.read(path)
        }

        fn write(&self, path: &str, value: Value) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.write(path, value)
        }

        fn update(
            &self,
            path: &str,
            fields: Map<String, Value>,
        ) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.update(path, fields)
        }

        fn delete(&self, path: &str) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.delete(path)
        }

        fn subscribe(&self, path: &str) -> BoxFuture<'static, StorageResult<Subscription>> {
            self.inner.subscribe(path)
        }

        fn increment(&self, path: &str, delta: i64) -> BoxFuture<'static, StorageResult<i64>> {
            let increment = self.inner.increment(path, delta);
            let delay = self.delay;
            Box::pin(async move {
                tokio::time::sleep(delay).await;
                increment.await
            })
        }

        fn compare_and_swap(
            &self,
            path: &str,
            expected: Option<Value>,
            new: Value,
        ) -> BoxFuture<'static, StorageResult<bool>> {
            self.inner.compare_and_swap(path, expected, new)
        }

        fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.health_check()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_resolution_still_scores_the_claimed_round() {
        let store = MemoryStore::new();
        let config = AppConfig {
            store_timeout: Duration::from_millis(100),
            ..AppConfig::default()
        };
        let slow = SlowIncrements {
            inner: store.clone(),
            delay: Duration::from_secs(1),
        };
        let state = AppState::with_catalog(
            Arc::new(slow),
            config,
            Catalog::new(vec![numbers_in_order()]),
        );
        let code = create_room(&state).await.unwrap().code;
        let host = join_room(&state, &code, "host", "Ana", true).await.unwrap();
        let guest = join_room(&state, &code, "guest", "Bo", false).await.unwrap();
        open_lobby(&state, &code, &host).await.unwrap();
        let (_, session) = start_round(&state, &code, &host, true).await.unwrap();
        begin_play(&state, &code, &session).await.unwrap();
        report_result(&state, &code, &guest, 12).await.unwrap();
        report_result(&state, &code, &host, 30).await.unwrap();

        assert!(matches!(
            resolve_round(&state, &code, &session).await,
            Err(ServiceError::Timeout)
        ));
        tokio::time::sleep(Duration::from_secs(5)).await;

        let room = fetch_room(&state, &code).await.unwrap();
        assert_eq!(room.status, RoomStatus::Ended);
        assert_eq!(room.game_status(), Some(GameStatus::Ranking));
        assert_eq!(room.players["guest"].score, 2);
        assert_eq!(room.players["host"].score, 1);
        assert!(matches!(
            resolve_round(&state, &code, &session).await,
            Err(ServiceError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn store_outage_surfaces_as_service_unavailable() {
        let Lobby {
            store,
            state,
            code,
            host,
            guest,
        } = lobby().await;
        let (_, session) = start_round(&state, &code, &host, true).await.unwrap();
        begin_play(&state, &code, &session).await.unwrap();

        store.set_available(false);
        let err = report_result(&state, &code, &guest, 10).await.unwrap_err();
        assert!(matches!(err, ServiceError::TransientStore(_)));
        let response = AppError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
