//! Board operations
//!
//! Every mutation follows the same cycle: read the owner's node set, build
//! a transient list, apply the change in memory, commit the touched rows
//! as one batch. Nothing is cached between calls and nothing is retried; a
//! stale read surfaces as [`BoardError::RequestConflict`].

use super::conflict::commit_batch;
use super::error::{BoardError, BoardResult};
use super::models::*;
use super::tab_list::TabList;
use super::task_list::TaskList;
use crate::events::{EntityType, EventEmitter};
use crate::store::{next_version, NodeStore, NodeWrite, WriteBatch};
use std::sync::Arc;
use uuid::Uuid;

/// Manager for plan, tab and task operations
pub struct BoardManager {
    store: Arc<dyn NodeStore>,
    events: Option<Arc<dyn EventEmitter>>,
    default_tabs: Vec<String>,
}

/// Trimmed, non-empty name
fn clean_name(field: &str, raw: &str) -> BoardResult<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(BoardError::InvalidInput(format!("{} must not be empty", field)));
    }
    Ok(name.to_string())
}

fn check_dates(task: &TaskNode) -> BoardResult<()> {
    match (task.start_date, task.end_date) {
        (Some(start), Some(end)) if start > end => Err(BoardError::InvalidInput(format!(
            "start_date {} is after end_date {}",
            start, end
        ))),
        _ => Ok(()),
    }
}

impl BoardManager {
    pub fn new(store: Arc<dyn NodeStore>) -> Self {
        Self {
            store,
            events: None,
            default_tabs: default_tab_names(),
        }
    }

    /// Set the event emitter for board notifications
    pub fn with_event_emitter(mut self, emitter: Arc<dyn EventEmitter>) -> Self {
        self.events = Some(emitter);
        self
    }

    /// Tab names used when a plan is created without explicit tabs
    pub fn with_default_tabs(mut self, tabs: Vec<String>) -> Self {
        self.default_tabs = tabs;
        self
    }

    pub fn store(&self) -> &Arc<dyn NodeStore> {
        &self.store
    }

    fn emit(&self, f: impl FnOnce(&dyn EventEmitter)) {
        if let Some(events) = &self.events {
            f(events.as_ref());
        }
    }

    // ========================================================================
    // Loading
    // ========================================================================

    async fn load_plan(&self, plan_id: Uuid) -> BoardResult<PlanNode> {
        self.store
            .get_plan(plan_id)
            .await?
            .ok_or_else(|| BoardError::not_found("plan", plan_id))
    }

    async fn load_tabs(&self, plan_id: Uuid) -> BoardResult<TabList> {
        self.load_plan(plan_id).await?;
        let tabs = self.store.list_plan_tabs(plan_id).await?;
        TabList::from_nodes(plan_id, tabs)
    }

    async fn load_tasks(&self, tab_id: Uuid) -> BoardResult<TaskList> {
        if self.store.get_tab(tab_id).await?.is_none() {
            return Err(BoardError::not_found("tab", tab_id));
        }
        let tasks = self.store.list_tab_tasks(tab_id).await?;
        TaskList::from_nodes(tab_id, tasks)
    }

    // ========================================================================
    // Plan operations
    // ========================================================================

    /// Create a plan together with its tabs and their sentinels
    pub async fn create_plan(&self, req: CreatePlanRequest, owner_id: Uuid) -> BoardResult<PlanNode> {
        let title = clean_name("title", &req.title)?;
        let names = req
            .tabs
            .unwrap_or_else(|| self.default_tabs.clone())
            .iter()
            .map(|n| clean_name("tab name", n))
            .collect::<BoardResult<Vec<_>>>()?;
        let (first, rest) = names
            .split_first()
            .ok_or_else(|| BoardError::SizeInvalid("a plan needs at least one tab".into()))?;

        let plan = PlanNode::new(title, owner_id);
        let mut tabs = TabList::new(plan.id, first.clone());
        for name in rest {
            tabs.append_last(TabNode::new(plan.id, name.clone()))?;
        }
        let tab_ids = tabs.ordered_ids()?;

        let mut batch = WriteBatch::new();
        batch.plans.push(NodeWrite::Insert(plan.clone()));
        batch.tabs = tabs.into_writes();
        for tab_id in &tab_ids {
            batch.tasks.extend(TaskList::new(*tab_id).into_writes());
        }
        commit_batch(self.store.as_ref(), batch).await?;

        tracing::info!(plan_id = %plan.id, tabs = tab_ids.len(), "plan created");
        self.emit(|e| {
            e.emit_created(
                EntityType::Plan,
                plan.id,
                None,
                serde_json::json!({ "title": plan.title, "tabs": tab_ids }),
            )
        });
        Ok(plan)
    }

    pub async fn get_plan(&self, plan_id: Uuid) -> BoardResult<PlanNode> {
        self.load_plan(plan_id).await
    }

    /// Ordered tabs with their ordered live tasks
    pub async fn get_board(&self, plan_id: Uuid) -> BoardResult<BoardView> {
        let plan = self.load_plan(plan_id).await?;
        let tabs = TabList::from_nodes(plan_id, self.store.list_plan_tabs(plan_id).await?)?;

        let mut views = Vec::with_capacity(tabs.len());
        for tab in tabs.ordered()? {
            let tasks = TaskList::from_nodes(tab.id, self.store.list_tab_tasks(tab.id).await?)?;
            views.push(TabView {
                tab: tab.clone(),
                tasks: tasks.ordered()?.into_iter().cloned().collect(),
            });
        }
        Ok(BoardView { plan, tabs: views })
    }

    // ========================================================================
    // Tab operations
    // ========================================================================

    pub async fn list_tabs(&self, plan_id: Uuid) -> BoardResult<Vec<TabNode>> {
        let tabs = self.load_tabs(plan_id).await?;
        Ok(tabs.ordered()?.into_iter().cloned().collect())
    }

    /// Append a tab (with its sentinels) to the plan
    pub async fn create_tab(&self, plan_id: Uuid, name: &str) -> BoardResult<Uuid> {
        let name = clean_name("tab name", name)?;
        let mut tabs = self.load_tabs(plan_id).await?;
        let tab_id = tabs.append_last(TabNode::new(plan_id, name.clone()))?;

        let batch = WriteBatch {
            tabs: tabs.into_writes(),
            tasks: TaskList::new(tab_id).into_writes(),
            ..WriteBatch::default()
        };
        commit_batch(self.store.as_ref(), batch).await?;

        tracing::info!(%plan_id, %tab_id, "tab created");
        self.emit(|e| {
            e.emit_created(
                EntityType::Tab,
                tab_id,
                Some(plan_id),
                serde_json::json!({ "name": name }),
            )
        });
        Ok(tab_id)
    }

    pub async fn rename_tab(&self, plan_id: Uuid, tab_id: Uuid, name: &str) -> BoardResult<TabNode> {
        let name = clean_name("tab name", name)?;
        let mut tabs = self.load_tabs(plan_id).await?;
        tabs.rename(tab_id, name.clone())?;
        let mut renamed = tabs.lookup(tab_id)?.clone();

        let batch = WriteBatch {
            tabs: tabs.into_writes(),
            ..WriteBatch::default()
        };
        commit_batch(self.store.as_ref(), batch).await?;
        renamed.version = next_version(renamed.version);

        tracing::debug!(%plan_id, %tab_id, "tab renamed");
        self.emit(|e| {
            e.emit_updated(
                EntityType::Tab,
                tab_id,
                Some(plan_id),
                serde_json::json!({ "name": name }),
            )
        });
        Ok(renamed)
    }

    /// Move a tab behind `new_prev`; returns the new tab order
    pub async fn reorder_tab(
        &self,
        plan_id: Uuid,
        tab_id: Uuid,
        new_prev: Option<Uuid>,
    ) -> BoardResult<Vec<Uuid>> {
        let new_prev = new_prev.ok_or_else(|| {
            BoardError::InvalidInput("a tab cannot be placed in front of the anchor tab".into())
        })?;
        let mut tabs = self.load_tabs(plan_id).await?;
        let order = tabs.move_after(tab_id, new_prev)?;

        let batch = WriteBatch {
            tabs: tabs.into_writes(),
            ..WriteBatch::default()
        };
        commit_batch(self.store.as_ref(), batch).await?;

        tracing::debug!(%plan_id, %tab_id, "tab reordered");
        self.emit(|e| e.emit_moved(EntityType::Tab, tab_id, plan_id, &order));
        Ok(order)
    }

    /// Remove a non-anchor tab; all of its task rows are deleted with it
    pub async fn remove_tab(&self, plan_id: Uuid, tab_id: Uuid) -> BoardResult<()> {
        let mut tabs = self.load_tabs(plan_id).await?;
        tabs.remove(tab_id)?;
        let rows = self.store.list_tab_tasks(tab_id).await?;
        let task_count = rows.len();

        let batch = WriteBatch {
            tabs: tabs.into_writes(),
            tasks: rows
                .into_iter()
                .map(|t| NodeWrite::Delete {
                    id: t.id,
                    expected_version: t.version,
                })
                .collect(),
            ..WriteBatch::default()
        };
        commit_batch(self.store.as_ref(), batch).await?;

        tracing::info!(%plan_id, %tab_id, task_rows = task_count, "tab removed");
        self.emit(|e| e.emit_deleted(EntityType::Tab, tab_id, Some(plan_id)));
        Ok(())
    }

    // ========================================================================
    // Task operations
    // ========================================================================

    pub async fn list_tasks(&self, tab_id: Uuid) -> BoardResult<Vec<TaskNode>> {
        let tasks = self.load_tasks(tab_id).await?;
        Ok(tasks.ordered()?.into_iter().cloned().collect())
    }

    /// Create a task after `req.after_id`, or at the end of the tab
    pub async fn create_task(
        &self,
        tab_id: Uuid,
        req: CreateTaskRequest,
        caller_id: Uuid,
    ) -> BoardResult<Uuid> {
        let mut task = TaskNode::new(tab_id, clean_name("task name", &req.name)?);
        task.description = req.description;
        task.start_date = req.start_date;
        task.end_date = req.end_date;
        task.manager_id = Some(req.manager_id.unwrap_or(caller_id));
        check_dates(&task)?;

        let mut tasks = self.load_tasks(tab_id).await?;
        let task_id = match req.after_id {
            Some(after) => tasks.insert_after(after, task)?,
            None => tasks.append(task)?,
        };

        let batch = WriteBatch {
            tasks: tasks.into_writes(),
            ..WriteBatch::default()
        };
        commit_batch(self.store.as_ref(), batch).await?;

        tracing::debug!(%tab_id, %task_id, "task created");
        self.emit(|e| e.emit_created(EntityType::Task, task_id, Some(tab_id), serde_json::Value::Null));
        Ok(task_id)
    }

    /// Update the business fields of a task; absent fields stay unchanged, `null` clears
    pub async fn update_task(
        &self,
        tab_id: Uuid,
        task_id: Uuid,
        req: UpdateTaskRequest,
    ) -> BoardResult<TaskNode> {
        let name = req
            .name
            .as_deref()
            .map(|n| clean_name("task name", n))
            .transpose()?;

        let mut tasks = self.load_tasks(tab_id).await?;
        let task = tasks.edit(task_id)?;
        if let Some(name) = name {
            if Sentinel::from_name(&name).is_some() {
                return Err(BoardError::NameDuplicate { scope: "tab", name });
            }
            task.name = name;
        }
        if let Some(description) = req.description {
            task.description = description;
        }
        if let Some(start) = req.start_date {
            task.start_date = start;
        }
        if let Some(end) = req.end_date {
            task.end_date = end;
        }
        if let Some(manager) = req.manager_id {
            task.manager_id = manager;
        }
        check_dates(task)?;
        let mut updated = task.clone();

        let batch = WriteBatch {
            tasks: tasks.into_writes(),
            ..WriteBatch::default()
        };
        commit_batch(self.store.as_ref(), batch).await?;
        updated.version = next_version(updated.version);

        tracing::debug!(%tab_id, %task_id, "task updated");
        self.emit(|e| e.emit_updated(EntityType::Task, task_id, Some(tab_id), serde_json::Value::Null));
        Ok(updated)
    }

    /// Move a task behind `new_prev`, or to the front when `None`
    pub async fn reorder_task(
        &self,
        tab_id: Uuid,
        task_id: Uuid,
        new_prev: Option<Uuid>,
    ) -> BoardResult<Vec<Uuid>> {
        let mut tasks = self.load_tasks(tab_id).await?;
        let new_prev = new_prev.unwrap_or_else(|| tasks.head_id());
        let order = tasks.move_after(task_id, new_prev)?;

        let batch = WriteBatch {
            tasks: tasks.into_writes(),
            ..WriteBatch::default()
        };
        commit_batch(self.store.as_ref(), batch).await?;

        tracing::debug!(%tab_id, %task_id, "task reordered");
        self.emit(|e| e.emit_moved(EntityType::Task, task_id, tab_id, &order));
        Ok(order)
    }

    /// Soft-delete a task
    pub async fn remove_task(&self, tab_id: Uuid, task_id: Uuid) -> BoardResult<()> {
        let mut tasks = self.load_tasks(tab_id).await?;
        tasks.detach(task_id)?;

        let batch = WriteBatch {
            tasks: tasks.into_writes(),
            ..WriteBatch::default()
        };
        commit_batch(self.store.as_ref(), batch).await?;

        tracing::debug!(%tab_id, %task_id, "task removed");
        self.emit(|e| e.emit_deleted(EntityType::Task, task_id, Some(tab_id)));
        Ok(())
    }
}
