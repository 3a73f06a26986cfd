//! Board nodes (persisted rows) and request/response DTOs

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Maximum number of tabs a single plan may hold
pub const MAX_TABS_PER_PLAN: usize = 5;

/// Reserved name of the head sentinel task of every tab
pub const HEAD_SENTINEL_NAME: &str = "__head__";

/// Reserved name of the tail sentinel task of every tab
pub const TAIL_SENTINEL_NAME: &str = "__tail__";

/// Tab names a plan gets when the create request does not list any
pub fn default_tab_names() -> Vec<String> {
    vec!["To Do".into(), "In Progress".into(), "Done".into()]
}

/// A persisted row carrying an identity and an optimistic version counter.
pub trait VersionedNode: Clone + Send + Sync {
    fn id(&self) -> Uuid;
    fn version(&self) -> i64;
    fn set_version(&mut self, version: i64);
}

// ============================================================================
// Plan
// ============================================================================

/// A board owning an ordered list of tabs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanNode {
    pub id: Uuid,
    pub title: String,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub version: i64,
}

impl PlanNode {
    pub fn new(title: String, owner_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            title,
            owner_id,
            created_at: Utc::now(),
            version: 0,
        }
    }
}

impl VersionedNode for PlanNode {
    fn id(&self) -> Uuid {
        self.id
    }
    fn version(&self) -> i64 {
        self.version
    }
    fn set_version(&mut self, version: i64) {
        self.version = version;
    }
}

// ============================================================================
// Tab
// ============================================================================

/// A column of the board. Tabs of a plan form a singly linked list that
/// starts at the anchor tab.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabNode {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub name: String,
    /// Next tab in display order, `None` for the last tab
    pub next: Option<Uuid>,
    /// The first tab of the plan; its position never changes
    pub is_anchor: bool,
    pub version: i64,
}

impl TabNode {
    /// Create an unlinked, non-anchor tab
    pub fn new(plan_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            plan_id,
            name: name.into(),
            next: None,
            is_anchor: false,
            version: 0,
        }
    }

    /// Create the anchor tab of a plan
    pub fn anchor(plan_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            is_anchor: true,
            ..Self::new(plan_id, name)
        }
    }
}

impl VersionedNode for TabNode {
    fn id(&self) -> Uuid {
        self.id
    }
    fn version(&self) -> i64 {
        self.version
    }
    fn set_version(&mut self, version: i64) {
        self.version = version;
    }
}

// ============================================================================
// Task
// ============================================================================

/// Which end of a tab's task chain a sentinel marks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sentinel {
    Head,
    Tail,
}

impl Sentinel {
    pub fn name(self) -> &'static str {
        match self {
            Sentinel::Head => HEAD_SENTINEL_NAME,
            Sentinel::Tail => TAIL_SENTINEL_NAME,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            HEAD_SENTINEL_NAME => Some(Sentinel::Head),
            TAIL_SENTINEL_NAME => Some(Sentinel::Tail),
            _ => None,
        }
    }
}

/// A card inside a tab. Tasks form a doubly linked chain between the tab's
/// head and tail sentinels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskNode {
    pub id: Uuid,
    pub tab_id: Uuid,
    pub manager_id: Option<Uuid>,
    pub name: String,
    pub description: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub next: Option<Uuid>,
    pub prev: Option<Uuid>,
    /// Soft-delete flag; deleted tasks are unlinked but kept
    pub is_deleted: bool,
    pub version: i64,
}

impl TaskNode {
    /// Create an unlinked task
    pub fn new(tab_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tab_id,
            manager_id: None,
            name: name.into(),
            description: None,
            start_date: None,
            end_date: None,
            next: None,
            prev: None,
            is_deleted: false,
            version: 0,
        }
    }

    /// Create a sentinel row for `tab_id`
    pub fn sentinel(tab_id: Uuid, kind: Sentinel) -> Self {
        Self::new(tab_id, kind.name())
    }

    pub fn sentinel_kind(&self) -> Option<Sentinel> {
        Sentinel::from_name(&self.name)
    }

    pub fn is_sentinel(&self) -> bool {
        self.sentinel_kind().is_some()
    }
}

impl VersionedNode for TaskNode {
    fn id(&self) -> Uuid {
        self.id
    }
    fn version(&self) -> i64 {
        self.version
    }
    fn set_version(&mut self, version: i64) {
        self.version = version;
    }
}

// ============================================================================
// Requests
// ============================================================================

/// Request to create a plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePlanRequest {
    pub title: String,
    /// Initial tab names in display order; the first becomes the anchor.
    /// Falls back to the configured defaults when absent.
    #[serde(default)]
    pub tabs: Option<Vec<String>>,
}

/// Request to create or rename a tab
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TabNameRequest {
    pub name: String,
}

/// Request to move a node behind another one
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReorderRequest {
    /// New predecessor. For tasks, `None` moves the task to the front.
    #[serde(default)]
    pub new_prev_id: Option<Uuid>,
}

/// Request to create a task
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateTaskRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    /// Responsible member; defaults to the caller
    #[serde(default)]
    pub manager_id: Option<Uuid>,
    /// Insert right after this task; appends when absent
    #[serde(default)]
    pub after_id: Option<Uuid>,
}

/// Keeps an explicit `null` apart from an absent field: absent stays `None`,
/// `null` becomes `Some(None)`.
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Request to update task fields.
///
/// Absent fields are left untouched; `null` clears an optional field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateTaskRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub start_date: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub end_date: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub manager_id: Option<Option<Uuid>>,
}

// ============================================================================
// Responses
// ============================================================================

/// Id of a freshly created node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedResponse {
    pub id: Uuid,
}

/// Ordered id sequence returned by reorder operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderedIds {
    pub ids: Vec<Uuid>,
}

/// A tab with its live tasks in display order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TabView {
    pub tab: TabNode,
    pub tasks: Vec<TaskNode>,
}

/// Read-side projection of a whole plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardView {
    pub plan: PlanNode,
    pub tabs: Vec<TabView>,
}
