//! Domain errors of the board engine

use uuid::Uuid;

/// Errors surfaced by tab/task list operations and the board manager.
///
/// Every variant is returned to the caller untouched; none is retried
/// internally. `RequestConflict` asks the caller to redo the whole
/// read-validate-write cycle.
#[derive(Debug, thiserror::Error)]
pub enum BoardError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("invalid list size: {0}")]
    SizeInvalid(String),

    #[error("name '{name}' is already used in this {scope}")]
    NameDuplicate { scope: &'static str, name: String },

    #[error("node {0} cannot be moved behind itself")]
    SameTarget(Uuid),

    #[error("anchor tab {0} cannot be moved or removed")]
    AnchorImmutable(Uuid),

    #[error("sentinel task {0} cannot be modified")]
    ProtectedNode(Uuid),

    #[error("{entity} {id} does not belong to {owner_id}")]
    OwnerMismatch {
        entity: &'static str,
        id: Uuid,
        owner_id: Uuid,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("request conflict: {0}")]
    RequestConflict(String),

    #[error("server invariant violated: {0}")]
    ServerInvariantViolation(String),

    #[error("store error: {0:#}")]
    Store(#[from] anyhow::Error),
}

pub type BoardResult<T> = std::result::Result<T, BoardError>;

impl BoardError {
    pub(crate) fn not_found(entity: &'static str, id: Uuid) -> Self {
        BoardError::NotFound { entity, id }
    }

    pub(crate) fn invariant(message: impl Into<String>) -> Self {
        let message = message.into();
        tracing::error!(%message, "board invariant violated");
        BoardError::ServerInvariantViolation(message)
    }
}
