pub mod catalog;
pub mod room;
pub mod session;
mod sse;
pub mod state_machine;
pub mod turn;

use std::{future::Future, sync::Arc, time::Duration};

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::warn;

use crate::{
    config::AppConfig,
    dao::{room::RoomRepository, state_store::StateStore},
    error::ServiceError,
};

use self::{
    catalog::Catalog,
    room::{PlayerId, RoomCode},
    session::SessionState,
    turn::TurnState,
};

pub use self::sse::SseHub;

pub type SharedState = Arc<AppState>;

const ROOM_HUB_CAPACITY: usize = 32;

/// Central application state: the store handle plus the per-process bookkeeping
/// every room operation needs.
pub struct AppState {
    config: AppConfig,
    catalog: Catalog,
    rooms: RoomRepository,
    sessions: DashMap<PlayerId, SessionState>,
    turns: DashMap<RoomCode, TurnState>,
    hubs: DashMap<RoomCode, Arc<SseHub>>,
    gates: DashMap<RoomCode, Arc<Mutex<()>>>,
    transition_timeout: Option<Duration>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    pub fn new(store: Arc<dyn StateStore>, config: AppConfig) -> SharedState {
        Self::with_catalog(store, config, Catalog::standard())
    }

    /// Same as [`AppState::new`] with a custom game catalog.
    pub fn with_catalog(
        store: Arc<dyn StateStore>,
        config: AppConfig,
        catalog: Catalog,
    ) -> SharedState {
        let transition_timeout = Some(config.store_timeout);
        Arc::new(Self {
            config,
            catalog,
            rooms: RoomRepository::new(store),
            sessions: DashMap::new(),
            turns: DashMap::new(),
            hubs: DashMap::new(),
            gates: DashMap::new(),
            transition_timeout,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Typed room access.
    pub fn rooms(&self) -> &RoomRepository {
        &self.rooms
    }

    /// Raw store handle.
    pub fn store(&self) -> &Arc<dyn StateStore> {
        self.rooms.store()
    }

    /// Session record of `player_id`, if that player joined a room through this process.
    pub fn session(&self, player_id: &str) -> Option<SessionState> {
        self.sessions.get(player_id).map(|entry| entry.value().clone())
    }

    /// Persist the session record of `player_id`.
    pub fn save_session(&self, player_id: &str, session: SessionState) {
        self.sessions.insert(player_id.to_owned(), session);
    }

    /// Local token state per room.
    pub fn turns(&self) -> &DashMap<RoomCode, TurnState> {
        &self.turns
    }

    /// Broadcast hub carrying transient events (hand-off animations) for `code`.
    pub fn room_hub(&self, code: &str) -> Arc<SseHub> {
        self.hubs
            .entry(code.to_owned())
            .or_insert_with(|| Arc::new(SseHub::new(ROOM_HUB_CAPACITY)))
            .clone()
    }

    fn room_gate(&self, code: &str) -> Arc<Mutex<()>> {
        self.gates
            .entry(code.to_owned())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Run a room status transition while holding the room's gate.
    ///
    /// Transitions of one room never interleave inside this process, and the
    /// store work is bounded by the configured timeout.
    pub async fn run_transition<F, Fut, T>(&self, code: &str, work: F) -> Result<T, ServiceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let gate = self.room_gate(code);
        let guard = gate.lock().await;

        let work_future = work();
        let outcome = if let Some(limit) = self.transition_timeout {
            match timeout(limit, work_future).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(room = %code, ?limit, "room transition timed out");
                    drop(guard);
                    return Err(ServiceError::Timeout);
                }
            }
        } else {
            work_future.await
        };

        drop(guard);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::state_store::MemoryStore;

    fn state_with_timeout(limit: Duration) -> SharedState {
        let config = AppConfig {
            store_timeout: limit,
            ..AppConfig::default()
        };
        AppState::new(Arc::new(MemoryStore::new()), config)
    }

    #[tokio::test(start_paused = true)]
    async fn slow_transition_times_out() {
        let state = state_with_timeout(Duration::from_millis(50));
        let result = state
            .run_transition("AB23", || async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok::<_, ServiceError>(())
            })
            .await;
        assert!(matches!(result, Err(ServiceError::Timeout)));
    }

    #[tokio::test(start_paused = true)]
    async fn transitions_of_one_room_are_serialized() {
        let state = state_with_timeout(Duration::from_secs(5));
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        let first = {
            let state = state.clone();
            let order = order.clone();
            tokio::spawn(async move {
                state
                    .run_transition("AB23", || async move {
                        order.lock().unwrap().push("first:start");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        order.lock().unwrap().push("first:end");
                        Ok::<_, ServiceError>(())
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;

        let second = order.clone();
        state
            .run_transition("AB23", || async move {
                second.lock().unwrap().push("second");
                Ok::<_, ServiceError>(())
            })
            .await
            .unwrap();
        first.await.unwrap().unwrap();

        assert_eq!(
            *order.lock().unwrap(),
            vec!["first:start", "first:end", "second"]
        );
    }

    #[test]
    fn sessions_are_kept_per_player() {
        let state = state_with_timeout(Duration::from_secs(1));
        assert!(state.session("p1").is_none());
        state.save_session("p1", SessionState::joined("AB23", "p1", true));
        assert_eq!(state.session("p1").unwrap().room_code.as_deref(), Some("AB23"));
    }

    #[test]
    fn room_hub_is_shared_per_code() {
        let state = state_with_timeout(Duration::from_secs(1));
        let _rx = state.room_hub("AB23").subscribe();
        assert_eq!(state.room_hub("AB23").receiver_count(), 1);
        assert_eq!(state.room_hub("ZZ99").receiver_count(), 0);
    }
}
