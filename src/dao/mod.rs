/// Key path builders for room data.
pub mod paths;
/// Typed room access on top of the state store.
pub mod room;
/// Shared real-time store abstraction and its in-memory backend.
pub mod state_store;
/// Storage error types shared by every backend.
pub mod storage;
