//! Backend service interface
//!
//! The backend is a schemaless document store with realtime push. Documents
//! live at slash-separated paths; a collection is every document directly
//! under a path prefix. Implementations may be a hosted service, or the
//! in-process [`MemoryBackend`](crate::MemoryBackend).

use async_trait::async_trait;
use modvote_core::Result;
use serde_json::{Map, Value};
use tokio::sync::watch;

/// Receiver of collection snapshots (`key -> document` mappings)
pub type Watch = watch::Receiver<Value>;

/// Narrow document-store interface
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Read one document
    async fn get(&self, path: &str) -> Result<Option<Value>>;

    /// Create a document, failing with `AlreadyExists` if present
    async fn create(&self, path: &str, doc: Value) -> Result<()>;

    /// Create or replace a document
    async fn set(&self, path: &str, doc: Value) -> Result<()>;

    /// Merge fields into an existing document, failing with `NotFound` if absent
    async fn update(&self, path: &str, fields: Map<String, Value>) -> Result<()>;

    /// Read every document of a collection
    async fn list(&self, collection: &str) -> Result<Map<String, Value>>;

    /// Watch a collection; the receiver starts at the current snapshot
    async fn watch(&self, collection: &str) -> Result<Watch>;
}

/// Document paths used by the room service
pub mod paths {
    pub fn room(code: &str) -> String {
        format!("rooms/{}", code)
    }

    pub fn participants(code: &str) -> String {
        format!("rooms/{}/players", code)
    }

    pub fn participant(code: &str, participant_id: &str) -> String {
        format!("rooms/{}/players/{}", code, participant_id)
    }

    pub fn items(code: &str) -> String {
        format!("rooms/{}/mods", code)
    }

    pub fn item(code: &str, item_id: &str) -> String {
        format!("rooms/{}/mods/{}", code, item_id)
    }

    pub fn ballots(code: &str) -> String {
        format!("rooms/{}/votes", code)
    }

    pub fn ballot(code: &str, ballot_id: &str) -> String {
        format!("rooms/{}/votes/{}", code, ballot_id)
    }

    /// Split a document path into its collection and key
    pub fn split(path: &str) -> Option<(&str, &str)> {
        let (collection, key) = path.rsplit_once('/')?;
        if collection.is_empty() || key.is_empty() {
            return None;
        }
        Some((collection, key))
    }

}
