//! Test helper factories and mock state builders

use crate::api::handlers::{BoardState, ServerState};
use crate::board::BoardManager;
use crate::events::EventBus;
use crate::store::MemoryNodeStore;
use crate::AuthConfig;
use std::sync::Arc;

pub const TEST_JWT_SECRET: &str = "board-test-secret-at-least-32-bytes";

pub fn test_auth_config() -> AuthConfig {
    AuthConfig {
        jwt_secret: TEST_JWT_SECRET.to_string(),
        jwt_expiry_secs: 3600,
        allowed_email_domain: None,
    }
}

/// Server state over an empty in-memory store
pub fn mock_server_state(auth_config: Option<AuthConfig>) -> BoardState {
    let event_bus = Arc::new(EventBus::default());
    let board = BoardManager::new(Arc::new(MemoryNodeStore::new()))
        .with_event_emitter(event_bus.clone());
    Arc::new(ServerState {
        board: Arc::new(board),
        event_bus,
        auth_config,
    })
}
