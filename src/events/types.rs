//! Board event types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The type of node that was mutated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Plan,
    Tab,
    Task,
}

/// The mutation performed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoardAction {
    Created,
    Updated,
    Moved,
    Deleted,
}

/// An event emitted after a committed board mutation
///
/// Must be Clone for `tokio::sync::broadcast`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardEvent {
    pub entity_type: EntityType,
    pub action: BoardAction,
    pub entity_id: Uuid,
    /// Plan of a tab, tab of a task; `None` for plans
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<Uuid>,
    /// Optional payload (new name, new order, ...)
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub payload: serde_json::Value,
    /// RFC 3339 timestamp
    pub timestamp: String,
}

impl BoardEvent {
    /// Create a new BoardEvent with the current timestamp
    pub fn new(entity_type: EntityType, action: BoardAction, entity_id: Uuid) -> Self {
        Self {
            entity_type,
            action,
            entity_id,
            owner_id: None,
            payload: serde_json::Value::Null,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn with_owner(mut self, owner_id: Uuid) -> Self {
        self.owner_id = Some(owner_id);
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

/// Sink for board events.
///
/// Implementations must not block and must not fail; the helper methods
/// build the event and forward it to [`EventEmitter::emit`].
pub trait EventEmitter: Send + Sync {
    fn emit(&self, event: BoardEvent);

    fn emit_created(
        &self,
        entity_type: EntityType,
        entity_id: Uuid,
        owner_id: Option<Uuid>,
        payload: serde_json::Value,
    ) {
        self.emit(with_optional_owner(
            BoardEvent::new(entity_type, BoardAction::Created, entity_id).with_payload(payload),
            owner_id,
        ));
    }

    fn emit_updated(
        &self,
        entity_type: EntityType,
        entity_id: Uuid,
        owner_id: Option<Uuid>,
        payload: serde_json::Value,
    ) {
        self.emit(with_optional_owner(
            BoardEvent::new(entity_type, BoardAction::Updated, entity_id).with_payload(payload),
            owner_id,
        ));
    }

    fn emit_moved(&self, entity_type: EntityType, entity_id: Uuid, owner_id: Uuid, order: &[Uuid]) {
        self.emit(
            BoardEvent::new(entity_type, BoardAction::Moved, entity_id)
                .with_owner(owner_id)
                .with_payload(serde_json::json!({ "order": order })),
        );
    }

    fn emit_deleted(&self, entity_type: EntityType, entity_id: Uuid, owner_id: Option<Uuid>) {
        self.emit(with_optional_owner(
            BoardEvent::new(entity_type, BoardAction::Deleted, entity_id),
            owner_id,
        ));
    }
}

fn with_optional_owner(event: BoardEvent, owner_id: Option<Uuid>) -> BoardEvent {
    match owner_id {
        Some(owner) => event.with_owner(owner),
        None => event,
    }
}
