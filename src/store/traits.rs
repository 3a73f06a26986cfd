//! NodeStore trait definition
//!
//! Defines the persistence boundary of the board engine. Reads return
//! unordered node sets; writes go through a single [`WriteBatch`] that the
//! backend applies atomically under an optimistic version check.

use crate::board::models::{PlanNode, TabNode, TaskNode};
use anyhow::Result;
use async_trait::async_trait;
use std::fmt;
use uuid::Uuid;

/// Version an `Update` leaves on a row it read at `read_version`.
///
/// Every backend bumps by exactly this step, so a caller can report the
/// committed version without reading the row back.
pub fn next_version(read_version: i64) -> i64 {
    read_version + 1
}

/// One row-level write inside a batch.
///
/// `Update` and `Delete` carry the version the writer read; the store
/// rejects the batch if the stored version differs.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeWrite<T> {
    /// Create a new row. Fails the batch if the id is already taken.
    Insert(T),
    /// Replace a row whose stored version equals `node.version`, then bump it.
    Update(T),
    /// Remove a row whose stored version equals `expected_version`.
    Delete { id: Uuid, expected_version: i64 },
}

/// All row writes of one mutation, applied all-or-nothing.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    pub plans: Vec<NodeWrite<PlanNode>>,
    pub tabs: Vec<NodeWrite<TabNode>>,
    pub tasks: Vec<NodeWrite<TaskNode>>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.plans.len() + self.tabs.len() + self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The kind of row a conflict was detected on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Plan,
    Tab,
    Task,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeKind::Plan => "plan",
            NodeKind::Tab => "tab",
            NodeKind::Task => "task",
        };
        f.write_str(name)
    }
}

/// A stale or missing row that made a batch fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionConflict {
    pub kind: NodeKind,
    pub id: Uuid,
    /// Version the writer read (for inserts: the version it tried to create)
    pub expected: i64,
    /// Version currently stored, `None` if the row no longer exists
    pub actual: Option<i64>,
}

impl fmt::Display for VersionConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.actual {
            Some(actual) => write!(
                f,
                "{} {} changed concurrently (expected version {}, stored {})",
                self.kind, self.id, self.expected, actual
            ),
            None => write!(
                f,
                "{} {} no longer exists (expected version {})",
                self.kind, self.id, self.expected
            ),
        }
    }
}

/// Result of a batch commit that reached the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    Conflict(VersionConflict),
}

/// Abstract interface of the node store.
///
/// Backend failures are `Err`; a version mismatch is a regular
/// [`CommitOutcome::Conflict`] value.
#[async_trait]
pub trait NodeStore: Send + Sync {
    /// Get a plan by ID
    async fn get_plan(&self, id: Uuid) -> Result<Option<PlanNode>>;

    /// All tabs of a plan, in no particular order
    async fn list_plan_tabs(&self, plan_id: Uuid) -> Result<Vec<TabNode>>;

    /// Get a tab by ID
    async fn get_tab(&self, id: Uuid) -> Result<Option<TabNode>>;

    /// All task rows of a tab (sentinels and soft-deleted tasks included)
    async fn list_tab_tasks(&self, tab_id: Uuid) -> Result<Vec<TaskNode>>;

    /// Get a task by ID
    async fn get_task(&self, id: Uuid) -> Result<Option<TaskNode>>;

    /// Apply every write of the batch, or none of them
    async fn commit(&self, batch: WriteBatch) -> Result<CommitOutcome>;

    /// Check backend connectivity
    async fn health_check(&self) -> Result<bool>;
}
