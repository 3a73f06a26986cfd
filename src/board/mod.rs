//! Board engine: linked tab/task lists and the operations running on them

mod conflict;
pub mod error;
pub mod manager;
pub mod models;
pub mod tab_list;
pub mod task_list;

pub use error::{BoardError, BoardResult};
pub use manager::BoardManager;
pub use models::*;
pub use tab_list::TabList;
pub use task_list::{create_with_sentinels, TaskList};
