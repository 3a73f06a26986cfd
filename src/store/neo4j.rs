//! Neo4j implementation of NodeStore
//!
//! Rows are stored as `:Plan`, `:Tab` and `:Task` nodes. Links are kept as
//! id properties (`next_id`, `prev_id`) rather than relationships, so a
//! list is read back as a flat node set and ordered in memory. An empty
//! string stands for "no link".

use crate::board::models::{PlanNode, TabNode, TaskNode};
use crate::store::traits::{CommitOutcome, NodeKind, NodeStore, NodeWrite, VersionConflict, WriteBatch};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use neo4rs::{query, Graph, Query, Txn};
use std::sync::Arc;
use uuid::Uuid;

/// Node store backed by a Neo4j database
pub struct Neo4jNodeStore {
    graph: Arc<Graph>,
}

fn link_param(link: Option<Uuid>) -> String {
    link.map(|id| id.to_string()).unwrap_or_default()
}

fn parse_link(raw: Option<String>) -> Result<Option<Uuid>> {
    match raw.filter(|s| !s.is_empty()) {
        Some(s) => Ok(Some(s.parse().context("invalid link id")?)),
        None => Ok(None),
    }
}

fn date_param(date: Option<NaiveDate>) -> String {
    date.map(|d| d.to_string()).unwrap_or_default()
}

fn parse_date(raw: Option<String>) -> Option<NaiveDate> {
    raw.filter(|s| !s.is_empty()).and_then(|s| s.parse().ok())
}

// Version checks run under the node's write lock. A `WHERE` evaluated before
// the first `SET` reads the last committed version without locking, so two
// transactions holding the same stale version would both pass it and the
// later one would overwrite the earlier. Setting `_lock` first makes the
// second transaction wait, then its `WHERE` sees the bumped version and
// matches nothing. On a miss `_lock` is left set and the batch rolls back.

/// The `+ 1` matches [`crate::store::next_version`].
fn update_statement(label: &str, fields: &str) -> String {
    format!(
        "MATCH (n:{label} {{id: $id}}) SET n._lock = true \
         WITH n WHERE n.version = $version \
         SET n += {{{fields}}}, n.version = n.version + 1 REMOVE n._lock \
         RETURN count(n) AS affected"
    )
}

fn delete_statement(label: &str) -> String {
    format!(
        "MATCH (n:{label} {{id: $id}}) SET n._lock = true \
         WITH n WHERE n.version = $version \
         WITH n AS doomed DETACH DELETE doomed RETURN count(*) AS affected"
    )
}

impl Neo4jNodeStore {
    /// Connect and make sure the id constraints exist
    pub async fn new(uri: &str, user: &str, password: &str) -> Result<Self> {
        let graph = Graph::new(uri, user, password)
            .await
            .context("Failed to connect to Neo4j")?;

        let store = Self {
            graph: Arc::new(graph),
        };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        let statements = [
            "CREATE CONSTRAINT plan_id IF NOT EXISTS FOR (p:Plan) REQUIRE p.id IS UNIQUE",
            "CREATE CONSTRAINT tab_id IF NOT EXISTS FOR (t:Tab) REQUIRE t.id IS UNIQUE",
            "CREATE CONSTRAINT task_id IF NOT EXISTS FOR (t:Task) REQUIRE t.id IS UNIQUE",
            "CREATE INDEX tab_plan IF NOT EXISTS FOR (t:Tab) ON (t.plan_id)",
            "CREATE INDEX task_tab IF NOT EXISTS FOR (t:Task) ON (t.tab_id)",
        ];

        for statement in statements {
            if let Err(e) = self.graph.run(query(statement)).await {
                tracing::warn!("Schema statement may already exist: {}", e);
            }
        }
        Ok(())
    }

    async fn fetch(&self, q: Query) -> Result<Vec<neo4rs::Node>> {
        let mut result = self.graph.execute(q).await?;
        let mut nodes = Vec::new();
        while let Some(row) = result.next().await? {
            nodes.push(row.get::<neo4rs::Node>("n")?);
        }
        Ok(nodes)
    }

    // ========================================================================
    // Row mapping
    // ========================================================================

    fn node_to_plan(node: &neo4rs::Node) -> Result<PlanNode> {
        Ok(PlanNode {
            id: node.get::<String>("id")?.parse()?,
            title: node.get("title")?,
            owner_id: node.get::<String>("owner_id")?.parse()?,
            created_at: node
                .get::<String>("created_at")?
                .parse()
                .unwrap_or_else(|_| chrono::Utc::now()),
            version: node.get("version")?,
        })
    }

    fn node_to_tab(node: &neo4rs::Node) -> Result<TabNode> {
        Ok(TabNode {
            id: node.get::<String>("id")?.parse()?,
            plan_id: node.get::<String>("plan_id")?.parse()?,
            name: node.get("name")?,
            next: parse_link(node.get("next_id").ok())?,
            is_anchor: node.get("is_anchor").unwrap_or(false),
            version: node.get("version")?,
        })
    }

    fn node_to_task(node: &neo4rs::Node) -> Result<TaskNode> {
        Ok(TaskNode {
            id: node.get::<String>("id")?.parse()?,
            tab_id: node.get::<String>("tab_id")?.parse()?,
            manager_id: parse_link(node.get("manager_id").ok())?,
            name: node.get("name")?,
            description: node
                .get::<String>("description")
                .ok()
                .filter(|s| !s.is_empty()),
            start_date: parse_date(node.get("start_date").ok()),
            end_date: parse_date(node.get("end_date").ok()),
            next: parse_link(node.get("next_id").ok())?,
            prev: parse_link(node.get("prev_id").ok())?,
            is_deleted: node.get("is_deleted").unwrap_or(false),
            version: node.get("version")?,
        })
    }

    // ========================================================================
    // Write statements
    // ========================================================================

    fn plan_props(q: Query, plan: &PlanNode) -> Query {
        q.param("id", plan.id.to_string())
            .param("title", plan.title.clone())
            .param("owner_id", plan.owner_id.to_string())
            .param("created_at", plan.created_at.to_rfc3339())
            .param("version", plan.version)
    }

    fn tab_props(q: Query, tab: &TabNode) -> Query {
        q.param("id", tab.id.to_string())
            .param("plan_id", tab.plan_id.to_string())
            .param("name", tab.name.clone())
            .param("next_id", link_param(tab.next))
            .param("is_anchor", tab.is_anchor)
            .param("version", tab.version)
    }

    fn task_props(q: Query, task: &TaskNode) -> Query {
        q.param("id", task.id.to_string())
            .param("tab_id", task.tab_id.to_string())
            .param("manager_id", link_param(task.manager_id))
            .param("name", task.name.clone())
            .param("description", task.description.clone().unwrap_or_default())
            .param("start_date", date_param(task.start_date))
            .param("end_date", date_param(task.end_date))
            .param("next_id", link_param(task.next))
            .param("prev_id", link_param(task.prev))
            .param("is_deleted", task.is_deleted)
            .param("version", task.version)
    }

    const PLAN_FIELDS: &'static str =
        "title: $title, owner_id: $owner_id, created_at: $created_at";
    const TAB_FIELDS: &'static str =
        "plan_id: $plan_id, name: $name, next_id: $next_id, is_anchor: $is_anchor";
    const TASK_FIELDS: &'static str = "tab_id: $tab_id, manager_id: $manager_id, name: $name, \
         description: $description, start_date: $start_date, end_date: $end_date, \
         next_id: $next_id, prev_id: $prev_id, is_deleted: $is_deleted";

    /// Run a statement inside `txn` that returns a single `affected` column.
    async fn counted(txn: &mut Txn, q: Query) -> Result<i64> {
        let mut stream = txn.execute(q).await?;
        let mut count = 0;
        while let Some(row) = stream.next(txn.handle()).await? {
            count = row.get::<i64>("affected")?;
        }
        Ok(count)
    }

    async fn stored_version(txn: &mut Txn, label: &str, id: Uuid) -> Result<Option<i64>> {
        let cypher = format!("MATCH (n:{label} {{id: $id}}) RETURN n.version AS version");
        let mut stream = txn
            .execute(query(&cypher).param("id", id.to_string()))
            .await?;
        let mut version = None;
        while let Some(row) = stream.next(txn.handle()).await? {
            version = Some(row.get::<i64>("version")?);
        }
        Ok(version)
    }

    /// Apply one write; returns the conflict if its precondition failed.
    async fn apply_write<T: Sync>(
        txn: &mut Txn,
        kind: NodeKind,
        write: &NodeWrite<T>,
        fields: &str,
        props: fn(Query, &T) -> Query,
        id_of: fn(&T) -> (Uuid, i64),
    ) -> Result<Option<VersionConflict>> {
        let label = match kind {
            NodeKind::Plan => "Plan",
            NodeKind::Tab => "Tab",
            NodeKind::Task => "Task",
        };

        let (id, expected, applied) = match write {
            NodeWrite::Insert(node) => {
                let (id, version) = id_of(node);
                if Self::stored_version(txn, label, id).await?.is_some() {
                    (id, version, false)
                } else {
                    let cypher = format!(
                        "CREATE (n:{label} {{id: $id, {fields}, version: $version}}) RETURN count(n) AS affected"
                    );
                    let created = Self::counted(txn, props(query(&cypher), node)).await?;
                    (id, version, created == 1)
                }
            }
            NodeWrite::Update(node) => {
                let (id, version) = id_of(node);
                let cypher = update_statement(label, fields);
                let updated = Self::counted(txn, props(query(&cypher), node)).await?;
                (id, version, updated == 1)
            }
            NodeWrite::Delete {
                id,
                expected_version,
            } => {
                let cypher = delete_statement(label);
                let q = query(&cypher)
                    .param("id", id.to_string())
                    .param("version", *expected_version);
                let deleted = Self::counted(txn, q).await?;
                (*id, *expected_version, deleted == 1)
            }
        };

        if applied {
            return Ok(None);
        }
        let actual = Self::stored_version(txn, label, id).await?;
        Ok(Some(VersionConflict {
            kind,
            id,
            expected,
            actual,
        }))
    }

    async fn apply_batch(txn: &mut Txn, batch: &WriteBatch) -> Result<Option<VersionConflict>> {
        for write in &batch.plans {
            let conflict = Self::apply_write(
                txn,
                NodeKind::Plan,
                write,
                Self::PLAN_FIELDS,
                Self::plan_props,
                |p| (p.id, p.version),
            )
            .await?;
            if conflict.is_some() {
                return Ok(conflict);
            }
        }
        for write in &batch.tabs {
            let conflict = Self::apply_write(
                txn,
                NodeKind::Tab,
                write,
                Self::TAB_FIELDS,
                Self::tab_props,
                |t| (t.id, t.version),
            )
            .await?;
            if conflict.is_some() {
                return Ok(conflict);
            }
        }
        for write in &batch.tasks {
            let conflict = Self::apply_write(
                txn,
                NodeKind::Task,
                write,
                Self::TASK_FIELDS,
                Self::task_props,
                |t| (t.id, t.version),
            )
            .await?;
            if conflict.is_some() {
                return Ok(conflict);
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl NodeStore for Neo4jNodeStore {
    async fn get_plan(&self, id: Uuid) -> Result<Option<PlanNode>> {
        let q = query("MATCH (n:Plan {id: $id}) RETURN n").param("id", id.to_string());
        self.fetch(q)
            .await?
            .first()
            .map(Self::node_to_plan)
            .transpose()
    }

    async fn list_plan_tabs(&self, plan_id: Uuid) -> Result<Vec<TabNode>> {
        let q = query("MATCH (n:Tab {plan_id: $plan_id}) RETURN n")
            .param("plan_id", plan_id.to_string());
        self.fetch(q).await?.iter().map(Self::node_to_tab).collect()
    }

    async fn get_tab(&self, id: Uuid) -> Result<Option<TabNode>> {
        let q = query("MATCH (n:Tab {id: $id}) RETURN n").param("id", id.to_string());
        self.fetch(q)
            .await?
            .first()
            .map(Self::node_to_tab)
            .transpose()
    }

    async fn list_tab_tasks(&self, tab_id: Uuid) -> Result<Vec<TaskNode>> {
        let q = query("MATCH (n:Task {tab_id: $tab_id}) RETURN n")
            .param("tab_id", tab_id.to_string());
        self.fetch(q).await?.iter().map(Self::node_to_task).collect()
    }

    async fn get_task(&self, id: Uuid) -> Result<Option<TaskNode>> {
        let q = query("MATCH (n:Task {id: $id}) RETURN n").param("id", id.to_string());
        self.fetch(q)
            .await?
            .first()
            .map(Self::node_to_task)
            .transpose()
    }

    async fn commit(&self, batch: WriteBatch) -> Result<CommitOutcome> {
        let mut txn = self
            .graph
            .start_txn()
            .await
            .context("Failed to open Neo4j transaction")?;

        match Self::apply_batch(&mut txn, &batch).await {
            Ok(None) => {
                txn.commit().await.context("Failed to commit batch")?;
                Ok(CommitOutcome::Committed)
            }
            Ok(Some(conflict)) => {
                txn.rollback().await.context("Failed to roll back batch")?;
                Ok(CommitOutcome::Conflict(conflict))
            }
            Err(e) => {
                if let Err(rollback_err) = txn.rollback().await {
                    tracing::warn!("Rollback after failed batch also failed: {}", rollback_err);
                }
                Err(e)
            }
        }
    }

    async fn health_check(&self) -> Result<bool> {
        let mut result = self.graph.execute(query("RETURN 1 AS ok")).await?;
        Ok(result.next().await?.is_some())
    }
}
