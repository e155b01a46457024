use std::sync::Arc;

use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

use crate::{
    dao::{
        paths,
        state_store::{StateStore, Subscription},
        storage::{StorageError, StorageResult},
    },
    state::room::{Player, Room},
};

/// Typed access to room documents stored in a [`StateStore`].
#[derive(Clone)]
pub struct RoomRepository {
    store: Arc<dyn StateStore>,
}

impl RoomRepository {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    /// Underlying store handle.
    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    /// Fetch and decode the room stored under `code`.
    pub async fn find(&self, code: &str) -> StorageResult<Option<Room>> {
        let path = paths::room(code);
        match self.store.read(&path).await? {
            None => Ok(None),
            Some(value) => decode(&path, value).map(Some),
        }
    }

    /// Whether anything is stored under `code`.
    pub async fn exists(&self, code: &str) -> StorageResult<bool> {
        Ok(self.store.read(&paths::room(code)).await?.is_some())
    }

    /// Replace the whole room document.
    pub async fn save(&self, room: &Room) -> StorageResult<()> {
        let path = paths::room(&room.code);
        self.store.write(&path, encode(&path, room)?).await
    }

    /// Insert or replace a single roster entry without touching the rest of the room.
    pub async fn save_player(&self, code: &str, player: &Player) -> StorageResult<()> {
        let path = paths::player(code, &player.id);
        self.store.write(&path, encode(&path, player)?).await
    }

    /// Merge relative `fields` into the room document.
    pub async fn update(&self, code: &str, fields: Map<String, Value>) -> StorageResult<()> {
        self.store.update(&paths::room(code), fields).await
    }

    /// Subscribe to raw snapshots of the room document.
    pub async fn subscribe(&self, code: &str) -> StorageResult<Subscription> {
        self.store.subscribe(&paths::room(code)).await
    }
}

/// Decode a store snapshot, reporting the offending path on failure.
pub fn decode<T: DeserializeOwned>(path: &str, value: Value) -> StorageResult<T> {
    serde_json::from_value(value).map_err(|err| StorageError::UnexpectedValue {
        path: path.to_owned(),
        reason: err.to_string(),
    })
}

/// Encode a record for the store.
pub fn encode<T: Serialize>(path: &str, record: &T) -> StorageResult<Value> {
    serde_json::to_value(record).map_err(|err| StorageError::UnexpectedValue {
        path: path.to_owned(),
        reason: err.to_string(),
    })
}
