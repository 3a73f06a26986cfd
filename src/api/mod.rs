//! HTTP API for the board

pub mod board_handlers;
pub mod handlers;
pub mod routes;
pub mod ws_handlers;

pub use routes::create_router;
