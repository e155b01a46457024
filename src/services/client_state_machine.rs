//! Per-client redirect controller driven by room snapshots.
//!
//! The subscription is the single source of truth for redirects. A one-shot
//! read is only issued when the first snapshot does not arrive within the
//! configured fallback window.

use std::time::Duration;

use serde_json::Value;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::{
    dao::{paths, room::{RoomRepository, decode}, state_store::Subscription},
    error::ServiceError,
    state::{
        catalog::GameKey,
        room::{Room, RoomStatus},
        session::SessionState,
    },
};

/// Client screen a room status maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Screen {
    Home,
    Lobby,
    Game(GameKey),
    Results,
}

impl Screen {
    /// Client-side route of the screen.
    pub fn path(&self) -> String {
        match self {
            Screen::Home => "/".to_string(),
            Screen::Lobby => "/lobby".to_string(),
            Screen::Game(key) => format!("/games/{key}"),
            Screen::Results => "/results".to_string(),
        }
    }
}

/// Navigation side effect owned by the client shell.
pub trait Navigator: Send {
    /// Screen currently displayed, if known.
    fn current(&self) -> Option<&Screen>;
    fn navigate(&mut self, screen: Screen);
}

/// Redirect target for a room snapshot. `None` means stay where you are.
///
/// An absent room sends the client home. A `playing` room without a round is
/// a broken snapshot and yields no redirect.
pub fn redirect_for(room: Option<&Room>) -> Option<Screen> {
    let Some(room) = room else {
        return Some(Screen::Home);
    };
    match room.status {
        RoomStatus::Created => None,
        RoomStatus::Waiting => Some(Screen::Lobby),
        RoomStatus::Playing => room.game.as_ref().map(|game| Screen::Game(game.id)),
        RoomStatus::Ranking | RoomStatus::Ended => Some(Screen::Results),
    }
}

/// Reactive controller for one client.
pub struct ClientStateMachine<N> {
    session: SessionState,
    navigator: N,
    mount_fallback: Duration,
}

impl<N: Navigator> ClientStateMachine<N> {
    pub fn new(session: SessionState, navigator: N, mount_fallback: Duration) -> Self {
        Self {
            session,
            navigator,
            mount_fallback,
        }
    }

    pub fn navigator(&self) -> &N {
        &self.navigator
    }

    pub fn navigator_mut(&mut self) -> &mut N {
        &mut self.navigator
    }

    /// Apply the redirect rule to a decoded snapshot.
    ///
    /// Idempotent: nothing happens when the client already shows the target.
    /// Returns the screen navigated to, if any.
    pub fn observe(&mut self, room: Option<&Room>) -> Option<Screen> {
        let target = redirect_for(room)?;
        if self.navigator.current() == Some(&target) {
            return None;
        }
        debug!(room = ?self.session.room_code, screen = ?target, "redirecting");
        self.navigator.navigate(target.clone());
        Some(target)
    }

    /// Decode a raw snapshot and observe it, handing the decoded room back.
    ///
    /// A snapshot that does not decode is logged and leaves the current
    /// screen untouched.
    pub fn observe_snapshot(&mut self, snapshot: Option<Value>) -> Result<Option<Room>, ServiceError> {
        let room = match snapshot {
            None => None,
            Some(value) => {
                let path = paths::room(self.session.room_code.as_deref().unwrap_or_default());
                match decode::<Room>(&path, value) {
                    Ok(room) => Some(room),
                    Err(err) => {
                        warn!(%path, error = %err, "ignoring undecodable room snapshot");
                        return Err(err.into());
                    }
                }
            }
        };
        if let Some(Err(err)) = room.as_ref().map(Room::check_invariants) {
            warn!(error = %err, "room snapshot violates invariants");
        }
        self.observe(room.as_ref());
        Ok(room)
    }

    /// Subscribe to the session's room and resolve the initial redirect.
    ///
    /// Without a room code in the session the client is sent home. When the
    /// first snapshot is late or unusable a one-shot read decides instead; if
    /// that read fails too the client is sent home and the error is returned.
    pub async fn mount(
        &mut self,
        rooms: &RoomRepository,
    ) -> Result<(Subscription, Option<Room>), ServiceError> {
        let Some(code) = self.session.room_code.clone() else {
            self.navigate_home();
            return Err(ServiceError::NotFound("no room in session".into()));
        };

        let mut subscription = match rooms.subscribe(&code).await {
            Ok(subscription) => subscription,
            Err(err) => {
                self.navigate_home();
                return Err(err.into());
            }
        };

        match timeout(self.mount_fallback, subscription.next()).await {
            Ok(Some(snapshot)) => {
                if let Ok(room) = self.observe_snapshot(snapshot) {
                    return Ok((subscription, room));
                }
            }
            Ok(None) => {
                self.navigate_home();
                return Err(ServiceError::NotFound(format!(
                    "subscription to room `{code}` closed"
                )));
            }
            Err(_) => debug!(room = %code, "first snapshot is late; reading once"),
        }

        match rooms.find(&code).await {
            Ok(room) => {
                self.observe(room.as_ref());
                Ok((subscription, room))
            }
            Err(err) => {
                warn!(room = %code, error = %err, "fallback room read failed");
                self.navigate_home();
                Err(err.into())
            }
        }
    }

    fn navigate_home(&mut self) {
        if self.navigator.current() != Some(&Screen::Home) {
            self.navigator.navigate(Screen::Home);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dao::state_store::{MemoryStore, StateStore},
        dao::storage::StorageResult,
        state::{
            catalog::{GameConfig, hot_potato},
            room::{Game, Player},
        },
    };
    use futures::future::BoxFuture;
    use serde_json::{Map, json};
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct RecordingNavigator {
        current: Option<Screen>,
        history: Vec<Screen>,
    }

    impl Navigator for RecordingNavigator {
        fn current(&self) -> Option<&Screen> {
            self.current.as_ref()
        }

        fn navigate(&mut self, screen: Screen) {
            self.history.push(screen.clone());
            self.current = Some(screen);
        }
    }

    fn machine(code: Option<&str>) -> ClientStateMachine<RecordingNavigator> {
        let session = match code {
            Some(code) => SessionState::joined(code, "p1", false),
            None => SessionState::default(),
        };
        ClientStateMachine::new(session, RecordingNavigator::default(), Duration::from_millis(200))
    }

    fn room(status: RoomStatus) -> Room {
        let mut room = Room::new("AB23", "2026-01-01T00:00:00Z");
        room.players.insert("p1".into(), Player::new("p1", "Ana", true));
        room.status = status;
        if status == RoomStatus::Playing {
            room.game = Some(Game::ready(
                &hot_potato(),
                GameConfig::HotPotato { duration_secs: 25 },
            ));
        }
        room
    }

    #[test]
    fn status_maps_to_screen() {
        assert_eq!(redirect_for(Some(&room(RoomStatus::Created))), None);
        assert_eq!(redirect_for(Some(&room(RoomStatus::Waiting))), Some(Screen::Lobby));
        assert_eq!(
            redirect_for(Some(&room(RoomStatus::Playing))),
            Some(Screen::Game(GameKey::HotPotato))
        );
        assert_eq!(redirect_for(Some(&room(RoomStatus::Ranking))), Some(Screen::Results));
        assert_eq!(redirect_for(Some(&room(RoomStatus::Ended))), Some(Screen::Results));
        assert_eq!(redirect_for(None), Some(Screen::Home));

        let mut broken = room(RoomStatus::Playing);
        broken.game = None;
        assert_eq!(redirect_for(Some(&broken)), None);
    }

    #[test]
    fn repeated_snapshot_navigates_once() {
        let mut machine = machine(Some("AB23"));
        let playing = room(RoomStatus::Playing);

        assert_eq!(
            machine.observe(Some(&playing)),
            Some(Screen::Game(GameKey::HotPotato))
        );
        assert_eq!(machine.observe(Some(&playing)), None);
        assert_eq!(machine.navigator().history.len(), 1);
    }

    #[test]
    fn undecodable_snapshot_is_ignored() {
        let mut machine = machine(Some("AB23"));
        assert!(machine.observe_snapshot(Some(json!({"status": 7}))).is_err());
        assert!(machine.navigator().history.is_empty());
    }

    #[tokio::test]
    async fn mount_without_room_code_goes_home() {
        let rooms = RoomRepository::new(Arc::new(MemoryStore::new()));
        let mut machine = machine(None);
        assert!(machine.mount(&rooms).await.is_err());
        assert_eq!(machine.navigator().history, vec![Screen::Home]);
    }

    #[tokio::test]
    async fn mount_uses_the_first_snapshot() {
        let store = MemoryStore::new();
        store
            .write("rooms/AB23", serde_json::to_value(room(RoomStatus::Waiting)).unwrap())
            .await
            .unwrap();
        let rooms = RoomRepository::new(Arc::new(store.clone()));
        let mut machine = machine(Some("AB23"));

        let (mut subscription, room) = machine.mount(&rooms).await.unwrap();
        assert_eq!(room.map(|r| r.status), Some(RoomStatus::Waiting));
        assert_eq!(machine.navigator().history, vec![Screen::Lobby]);

        store.write("rooms/AB23/status", json!("ranking")).await.unwrap();
        let next = subscription.next().await.unwrap();
        machine.observe_snapshot(next).unwrap();
        assert_eq!(machine.navigator().history, vec![Screen::Lobby, Screen::Results]);
    }

    #[tokio::test]
    async fn mount_of_missing_room_goes_home() {
        let rooms = RoomRepository::new(Arc::new(MemoryStore::new()));
        let mut machine = machine(Some("ZZ99"));
        let (_subscription, room) = machine.mount(&rooms).await.unwrap();
        assert!(room.is_none());
        assert_eq!(machine.navigator().history, vec![Screen::Home]);
    }

    /// Store whose subscriptions never deliver, forcing the read fallback.
    struct SilentStore {
        inner: MemoryStore,
        read_fails: bool,
        senders: Mutex<Vec<mpsc::UnboundedSender<Option<Value>>>>,
    }

    impl StateStore for SilentStore {
        fn read(&self, path: &str) -> BoxFuture<'static, StorageResult<Option<Value>>> {
            if self.read_fails {
                return Box::pin(async {
                    Err::<Option<Value>, _>(crate::dao::storage::StorageError::offline("down"))
                });
            }
            self.inner.read(path)
        }
        fn write(&self, path: &str, value: Value) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.write(path, value)
        }
        fn update(&self, path: &str, fields: Map<String, Value>) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.update(path, fields)
        }
        fn delete(&self, path: &str) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.delete(path)
        }
        fn subscribe(&self, path: &str) -> BoxFuture<'static, StorageResult<Subscription>> {
            let (tx, rx) = mpsc::unbounded_channel();
            self.senders.lock().unwrap().push(tx);
            let path = path.to_owned();
            Box::pin(async move { Ok(Subscription::new(path, rx, || {})) })
        }
        fn increment(&self, path: &str, delta: i64) -> BoxFuture<'static, StorageResult<i64>> {
            self.inner.increment(path, delta)
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

    async fn silent_rooms(read_fails: bool) -> RoomRepository {
        let inner = MemoryStore::new();
        inner
            .write("rooms/AB23", serde_json::to_value(room(RoomStatus::Ranking)).unwrap())
            .await
            .unwrap();
        RoomRepository::new(Arc::new(SilentStore {
            inner,
            read_fails,
            senders: Mutex::new(Vec::new()),
        }))
    }

    #[tokio::test(start_paused = true)]
    async fn late_subscription_falls_back_to_a_read() {
        let rooms = silent_rooms(false).await;
        let mut machine = machine(Some("AB23"));

        let (_subscription, room) = machine.mount(&rooms).await.unwrap();
        assert_eq!(room.map(|r| r.status), Some(RoomStatus::Ranking));
        assert_eq!(machine.navigator().history, vec![Screen::Results]);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_fallback_read_goes_home() {
        let rooms = silent_rooms(true).await;
        let mut machine = machine(Some("AB23"));

        let Err(err) = machine.mount(&rooms).await else {
            panic!("mount should fail when the fallback read fails");
        };
        assert!(matches!(err, ServiceError::TransientStore(_)));
        assert_eq!(machine.navigator().history, vec![Screen::Home]);
    }
}
