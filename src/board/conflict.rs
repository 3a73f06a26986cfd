//! Change tracking and conflict resolution for list mutations.
//!
//! A list records which of its nodes it inserted, touched or removed. The
//! manager turns those records into one [`WriteBatch`] and hands it to the
//! store; a stale version anywhere in the batch comes back as
//! [`BoardError::RequestConflict`].

use crate::board::error::{BoardError, BoardResult};
use crate::board::models::VersionedNode;
use crate::store::{CommitOutcome, NodeStore, NodeWrite, WriteBatch};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use uuid::Uuid;

/// Rows changed by a list since it was loaded
#[derive(Debug, Clone, Default)]
pub(crate) struct ChangeSet {
    inserted: BTreeSet<Uuid>,
    updated: BTreeSet<Uuid>,
    /// Removed row id -> version it was read at
    removed: BTreeMap<Uuid, i64>,
}

impl ChangeSet {
    pub(crate) fn inserted(&mut self, id: Uuid) {
        self.inserted.insert(id);
    }

    /// Mark a loaded row as modified. No-op for rows inserted by this list.
    pub(crate) fn touched(&mut self, id: Uuid) {
        if !self.inserted.contains(&id) {
            self.updated.insert(id);
        }
    }

    pub(crate) fn removed(&mut self, id: Uuid, version: i64) {
        if self.inserted.remove(&id) {
            return;
        }
        self.updated.remove(&id);
        self.removed.insert(id, version);
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }

    /// Materialize the writes against the list's arena.
    ///
    /// Ids missing from `nodes` are skipped for inserts and updates; a list
    /// only records ids it owns.
    pub(crate) fn into_writes<T: VersionedNode>(self, nodes: &HashMap<Uuid, T>) -> Vec<NodeWrite<T>> {
        let mut writes = Vec::with_capacity(
            self.inserted.len() + self.updated.len() + self.removed.len(),
        );
        writes.extend(
            self.inserted
                .iter()
                .filter_map(|id| nodes.get(id).cloned().map(NodeWrite::Insert)),
        );
        writes.extend(
            self.updated
                .iter()
                .filter_map(|id| nodes.get(id).cloned().map(NodeWrite::Update)),
        );
        writes.extend(
            self.removed
                .into_iter()
                .map(|(id, expected_version)| NodeWrite::Delete {
                    id,
                    expected_version,
                }),
        );
        writes
    }
}

/// Map a store outcome to the caller-facing result.
pub(crate) fn resolve(outcome: CommitOutcome) -> BoardResult<()> {
    match outcome {
        CommitOutcome::Committed => Ok(()),
        CommitOutcome::Conflict(conflict) => {
            tracing::warn!(
                kind = %conflict.kind,
                id = %conflict.id,
                expected = conflict.expected,
                actual = ?conflict.actual,
                "write batch rejected, stale version"
            );
            Err(BoardError::RequestConflict(conflict.to_string()))
        }
    }
}

/// Commit a batch and resolve its outcome. Empty batches are not sent.
pub(crate) async fn commit_batch(store: &dyn NodeStore, batch: WriteBatch) -> BoardResult<()> {
    if batch.is_empty() {
        return Ok(());
    }
    tracing::debug!(writes = batch.len(), "committing write batch");
    resolve(store.commit(batch).await?)
}
