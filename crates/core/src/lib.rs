//! Modvote Core Library
//!
//! Models, validation, client state, and result aggregation for group
//! voting rooms.

pub mod config;
pub mod error;
pub mod export;
pub mod invariants;
pub mod models;
pub mod permissions;
pub mod results;
pub mod state;
pub mod validation;

pub use config::{RetrySettings, Settings};
pub use error::{Error, ErrorKind, InfraError, Result, ValidationError};
pub use export::{ExportEntry, ResultsExport};
pub use models::*;
pub use permissions::*;
pub use results::{compute_results, Category, ItemResult, Results};
pub use state::{LoadingFlag, Store, VoteState};
