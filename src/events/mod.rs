//! Board event system
//!
//! - `BoardEvent`: typed events emitted after every committed mutation
//! - `EventBus`: broadcast channel distributing them to subscribers

mod bus;
mod types;

pub use bus::EventBus;
pub use types::{BoardAction, BoardEvent, EntityType, EventEmitter};
