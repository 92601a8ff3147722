//! Data models for Modvote

mod ballot;
mod item;
mod participant;
mod room;

pub use ballot::*;
pub use item::*;
pub use participant::*;
pub use room::*;
