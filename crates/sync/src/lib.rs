//! Modvote Sync Library
//!
//! Talks to the shared document store that keeps every client in a room in
//! step.
//!
//! # Architecture
//!
//! - **Backend**: Async document store trait (get, create, set, update, list, watch)
//! - **RoomService**: Room, item and ballot operations with validation and retry
//! - **Subscription**: Handle that forwards collection snapshots to a callback
//!
//! # Usage
//!
//! ```ignore
//! let service = RoomService::new(Arc::new(MemoryBackend::new()));
//! let room = service.create_room(&host_id, "host").await?;
//!
//! let sub = service
//!     .subscribe_items(&room.id, |items| println!("{} items", items.len()))
//!     .await;
//! // ...
//! sub.unsubscribe();
//! ```

pub mod backend;
pub mod memory;
pub mod retry;
pub mod service;
pub mod subscription;

pub use backend::{paths, Backend, Watch};
pub use memory::MemoryBackend;
pub use modvote_core::compute_results;
pub use retry::{with_retry, RetryOptions};
pub use service::RoomService;
pub use subscription::Subscription;
