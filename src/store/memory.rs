//! In-memory implementation of NodeStore.
//!
//! All tables sit behind one `tokio::sync::RwLock`, so a commit validates
//! and applies its whole batch while holding the write lock. Used by the
//! `memory` storage backend and by tests.

use crate::board::models::{PlanNode, TabNode, TaskNode, VersionedNode};
use crate::store::traits::{
    next_version, CommitOutcome, NodeKind, NodeStore, NodeWrite, VersionConflict, WriteBatch,
};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    plans: HashMap<Uuid, PlanNode>,
    tabs: HashMap<Uuid, TabNode>,
    tasks: HashMap<Uuid, TaskNode>,
}

/// In-memory node store
#[derive(Default)]
pub struct MemoryNodeStore {
    tables: RwLock<Tables>,
}

impl MemoryNodeStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Builder / seeding methods for tests
    // ========================================================================

    /// Seed a plan row as-is.
    pub async fn with_plan(self, plan: PlanNode) -> Self {
        self.tables.write().await.plans.insert(plan.id, plan);
        self
    }

    /// Seed tab rows as-is (no chain validation).
    pub async fn with_tabs(self, tabs: impl IntoIterator<Item = TabNode>) -> Self {
        {
            let mut tables = self.tables.write().await;
            for tab in tabs {
                tables.tabs.insert(tab.id, tab);
            }
        }
        self
    }

    /// Seed task rows as-is (no chain validation).
    pub async fn with_tasks(self, tasks: impl IntoIterator<Item = TaskNode>) -> Self {
        {
            let mut tables = self.tables.write().await;
            for task in tasks {
                tables.tasks.insert(task.id, task);
            }
        }
        self
    }
}

/// First write of `writes` whose precondition does not hold against `table`.
fn find_conflict<T: VersionedNode>(
    table: &HashMap<Uuid, T>,
    writes: &[NodeWrite<T>],
    kind: NodeKind,
) -> Option<VersionConflict> {
    writes.iter().find_map(|write| {
        let (id, expected, must_exist) = match write {
            NodeWrite::Insert(node) => (node.id(), node.version(), false),
            NodeWrite::Update(node) => (node.id(), node.version(), true),
            NodeWrite::Delete {
                id,
                expected_version,
            } => (*id, *expected_version, true),
        };
        let actual = table.get(&id).map(VersionedNode::version);
        let holds = if must_exist {
            actual == Some(expected)
        } else {
            actual.is_none()
        };
        (!holds).then_some(VersionConflict {
            kind,
            id,
            expected,
            actual,
        })
    })
}

fn apply<T: VersionedNode>(table: &mut HashMap<Uuid, T>, writes: Vec<NodeWrite<T>>) {
    for write in writes {
        match write {
            NodeWrite::Insert(node) => {
                table.insert(node.id(), node);
            }
            NodeWrite::Update(mut node) => {
                node.set_version(next_version(node.version()));
                table.insert(node.id(), node);
            }
            NodeWrite::Delete { id, .. } => {
                table.remove(&id);
            }
        }
    }
}

#[async_trait]
impl NodeStore for MemoryNodeStore {
    async fn get_plan(&self, id: Uuid) -> Result<Option<PlanNode>> {
        Ok(self.tables.read().await.plans.get(&id).cloned())
    }

    async fn list_plan_tabs(&self, plan_id: Uuid) -> Result<Vec<TabNode>> {
        Ok(self
            .tables
            .read()
            .await
            .tabs
            .values()
            .filter(|t| t.plan_id == plan_id)
            .cloned()
            .collect())
    }

    async fn get_tab(&self, id: Uuid) -> Result<Option<TabNode>> {
        Ok(self.tables.read().await.tabs.get(&id).cloned())
    }

    async fn list_tab_tasks(&self, tab_id: Uuid) -> Result<Vec<TaskNode>> {
        Ok(self
            .tables
            .read()
            .await
            .tasks
            .values()
            .filter(|t| t.tab_id == tab_id)
            .cloned()
            .collect())
    }

    async fn get_task(&self, id: Uuid) -> Result<Option<TaskNode>> {
        Ok(self.tables.read().await.tasks.get(&id).cloned())
    }

    async fn commit(&self, batch: WriteBatch) -> Result<CommitOutcome> {
        let mut tables = self.tables.write().await;

        let conflict = find_conflict(&tables.plans, &batch.plans, NodeKind::Plan)
            .or_else(|| find_conflict(&tables.tabs, &batch.tabs, NodeKind::Tab))
            .or_else(|| find_conflict(&tables.tasks, &batch.tasks, NodeKind::Task));
        if let Some(conflict) = conflict {
            return Ok(CommitOutcome::Conflict(conflict));
        }

        apply(&mut tables.plans, batch.plans);
        apply(&mut tables.tabs, batch.tabs);
        apply(&mut tables.tasks, batch.tasks);
        Ok(CommitOutcome::Committed)
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tab_batch(writes: Vec<NodeWrite<TabNode>>) -> WriteBatch {
        WriteBatch {
            tabs: writes,
            ..WriteBatch::default()
        }
    }

    #[tokio::test]
    async fn test_update_bumps_version_by_one() {
        let plan_id = Uuid::new_v4();
        let tab = TabNode::anchor(plan_id, "To Do");
        let store = MemoryNodeStore::new().with_tabs([tab.clone()]).await;

        let mut renamed = tab.clone();
        renamed.name = "Backlog".into();
        let outcome = store
            .commit(tab_batch(vec![NodeWrite::Update(renamed)]))
            .await
            .unwrap();
        assert_eq!(outcome, CommitOutcome::Committed);

        let stored = store.get_tab(tab.id).await.unwrap().unwrap();
        assert_eq!(stored.name, "Backlog");
        assert_eq!(stored.version, 1);
    }

    #[tokio::test]
    async fn test_stale_update_is_a_conflict() {
        let plan_id = Uuid::new_v4();
        let mut tab = TabNode::anchor(plan_id, "To Do");
        tab.version = 3;
        let store = MemoryNodeStore::new().with_tabs([tab.clone()]).await;

        let mut stale = tab.clone();
        stale.version = 2;
        let outcome = store
            .commit(tab_batch(vec![NodeWrite::Update(stale)]))
            .await
            .unwrap();

        match outcome {
            CommitOutcome::Conflict(c) => {
                assert_eq!(c.kind, NodeKind::Tab);
                assert_eq!(c.expected, 2);
                assert_eq!(c.actual, Some(3));
            }
            other => panic!("expected conflict, got {:?}", other),
        }
        assert_eq!(store.get_tab(tab.id).await.unwrap().unwrap().version, 3);
    }

    #[tokio::test]
    async fn test_batch_is_all_or_nothing() {
        let plan_id = Uuid::new_v4();
        let a = TabNode::anchor(plan_id, "A");
        let mut b = TabNode::new(plan_id, "B");
        b.version = 5;
        let store = MemoryNodeStore::new().with_tabs([a.clone(), b.clone()]).await;

        let mut a_changed = a.clone();
        a_changed.name = "A2".into();
        let mut b_stale = b.clone();
        b_stale.version = 4;
        let fresh = TabNode::new(plan_id, "C");

        let outcome = store
            .commit(tab_batch(vec![
                NodeWrite::Update(a_changed),
                NodeWrite::Insert(fresh.clone()),
                NodeWrite::Update(b_stale),
            ]))
            .await
            .unwrap();
        assert!(matches!(outcome, CommitOutcome::Conflict(_)));

        assert_eq!(store.get_tab(a.id).await.unwrap().unwrap().name, "A");
        assert!(store.get_tab(fresh.id).await.unwrap().is_none());
        assert_eq!(store.list_plan_tabs(plan_id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_insert_existing_id_conflicts() {
        let plan_id = Uuid::new_v4();
        let tab = TabNode::anchor(plan_id, "To Do");
        let store = MemoryNodeStore::new().with_tabs([tab.clone()]).await;

        let outcome = store
            .commit(tab_batch(vec![NodeWrite::Insert(tab.clone())]))
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            CommitOutcome::Conflict(VersionConflict { actual: Some(0), .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_checks_version() {
        let plan_id = Uuid::new_v4();
        let tab = TabNode::new(plan_id, "Done");
        let store = MemoryNodeStore::new().with_tabs([tab.clone()]).await;

        let stale = store
            .commit(tab_batch(vec![NodeWrite::Delete {
                id: tab.id,
                expected_version: 7,
            }]))
            .await
            .unwrap();
        assert!(matches!(stale, CommitOutcome::Conflict(_)));

        let ok = store
            .commit(tab_batch(vec![NodeWrite::Delete {
                id: tab.id,
                expected_version: 0,
            }]))
            .await
            .unwrap();
        assert_eq!(ok, CommitOutcome::Committed);
        assert!(store.get_tab(tab.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_of_missing_row_conflicts() {
        let tab = TabNode::new(Uuid::new_v4(), "Ghost");
        let store = MemoryNodeStore::new();
        let outcome = store
            .commit(tab_batch(vec![NodeWrite::Update(tab.clone())]))
            .await
            .unwrap();
        match outcome {
            CommitOutcome::Conflict(c) => {
                assert_eq!(c.id, tab.id);
                assert_eq!(c.actual, None);
                assert!(c.to_string().contains("no longer exists"));
            }
            other => panic!("expected conflict, got {:?}", other),
        }
    }
}
