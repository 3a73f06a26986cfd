//! Ordered tasks of a tab.
//!
//! Live tasks form a doubly linked chain bracketed by two sentinel rows,
//! `head` and `tail`, created together with the tab. Sentinels only carry
//! links; they cannot be moved, edited or detached. Detached tasks stay in
//! the arena with `is_deleted` set and both links cleared.

use crate::board::conflict::ChangeSet;
use crate::board::error::{BoardError, BoardResult};
use crate::board::models::{Sentinel, TaskNode};
use crate::store::NodeWrite;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct TaskList {
    tab_id: Uuid,
    nodes: HashMap<Uuid, TaskNode>,
    head: Uuid,
    tail: Uuid,
    changes: ChangeSet,
}

/// Build a linked `(head, tail)` sentinel pair for a new tab.
pub fn create_with_sentinels(tab_id: Uuid) -> (TaskNode, TaskNode) {
    let mut head = TaskNode::sentinel(tab_id, Sentinel::Head);
    let mut tail = TaskNode::sentinel(tab_id, Sentinel::Tail);
    head.next = Some(tail.id);
    tail.prev = Some(head.id);
    (head, tail)
}

impl TaskList {
    /// An empty list for a new tab; both sentinels are pending inserts.
    pub fn new(tab_id: Uuid) -> Self {
        let (head, tail) = create_with_sentinels(tab_id);
        let mut changes = ChangeSet::default();
        changes.inserted(head.id);
        changes.inserted(tail.id);
        Self {
            tab_id,
            head: head.id,
            tail: tail.id,
            nodes: HashMap::from([(head.id, head), (tail.id, tail)]),
            changes,
        }
    }

    /// Rebuild a list from every stored task row of `tab_id`.
    pub fn from_nodes(tab_id: Uuid, nodes: Vec<TaskNode>) -> BoardResult<Self> {
        if let Some(foreign) = nodes.iter().find(|t| t.tab_id != tab_id) {
            return Err(BoardError::OwnerMismatch {
                entity: "task",
                id: foreign.id,
                owner_id: tab_id,
            });
        }

        let head = Self::single_sentinel(tab_id, &nodes, Sentinel::Head)?;
        let tail = Self::single_sentinel(tab_id, &nodes, Sentinel::Tail)?;

        Ok(Self {
            tab_id,
            nodes: nodes.into_iter().map(|t| (t.id, t)).collect(),
            head,
            tail,
            changes: ChangeSet::default(),
        })
    }

    fn single_sentinel(tab_id: Uuid, nodes: &[TaskNode], kind: Sentinel) -> BoardResult<Uuid> {
        let found: Vec<Uuid> = nodes
            .iter()
            .filter(|t| !t.is_deleted && t.sentinel_kind() == Some(kind))
            .map(|t| t.id)
            .collect();
        match found.as_slice() {
            [single] => Ok(*single),
            _ => Err(BoardError::invariant(format!(
                "tab {} has {} '{}' sentinels",
                tab_id,
                found.len(),
                kind.name()
            ))),
        }
    }

    pub fn tab_id(&self) -> Uuid {
        self.tab_id
    }

    pub fn head_id(&self) -> Uuid {
        self.head
    }

    pub fn tail_id(&self) -> Uuid {
        self.tail
    }

    fn is_sentinel_id(&self, id: Uuid) -> bool {
        id == self.head || id == self.tail
    }

    /// A live (linked, not deleted) task or sentinel.
    pub fn lookup(&self, id: Uuid) -> BoardResult<&TaskNode> {
        self.nodes
            .get(&id)
            .filter(|t| !t.is_deleted)
            .ok_or_else(|| BoardError::not_found("task", id))
    }

    /// Every row of the tab, including sentinels and detached tasks.
    pub fn rows(&self) -> impl Iterator<Item = &TaskNode> {
        self.nodes.values()
    }

    /// Live tasks between the sentinels, in display order.
    pub fn ordered(&self) -> BoardResult<Vec<&TaskNode>> {
        let live = self
            .nodes
            .values()
            .filter(|t| !t.is_deleted && !self.is_sentinel_id(t.id))
            .count();
        let mut sequence = Vec::with_capacity(live);
        let mut previous = self.head;
        let mut cursor = self.node(self.head)?.next;

        loop {
            let id = cursor.ok_or_else(|| {
                BoardError::invariant(format!("task chain of tab {} ends before tail", self.tab_id))
            })?;
            let node = self.node(id)?;
            if node.prev != Some(previous) {
                return Err(BoardError::invariant(format!(
                    "task {} of tab {} has a broken back link",
                    id, self.tab_id
                )));
            }
            if id == self.tail {
                break;
            }
            if node.is_deleted || id == self.head || sequence.len() == live {
                return Err(BoardError::invariant(format!(
                    "task chain of tab {} is corrupt at {}",
                    self.tab_id, id
                )));
            }
            sequence.push(node);
            previous = id;
            cursor = node.next;
        }

        if sequence.len() != live {
            return Err(BoardError::invariant(format!(
                "task chain of tab {} reaches {} of {} live tasks",
                self.tab_id,
                sequence.len(),
                live
            )));
        }
        Ok(sequence)
    }

    pub fn ordered_ids(&self) -> BoardResult<Vec<Uuid>> {
        Ok(self.ordered()?.into_iter().map(|t| t.id).collect())
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Insert `node` right after `anchor`. Returns the new task's id.
    pub fn insert_after(&mut self, anchor: Uuid, mut node: TaskNode) -> BoardResult<Uuid> {
        if anchor == self.tail {
            return Err(BoardError::ProtectedNode(anchor));
        }
        self.lookup(anchor)?;
        if Sentinel::from_name(&node.name).is_some() {
            return Err(BoardError::NameDuplicate {
                scope: "tab",
                name: node.name,
            });
        }

        node.tab_id = self.tab_id;
        node.is_deleted = false;
        let id = node.id;
        self.nodes.insert(id, node);
        self.changes.inserted(id);
        self.link_after(anchor, id)?;
        tracing::debug!(tab_id = %self.tab_id, task_id = %id, after = %anchor, "task inserted");
        Ok(id)
    }

    /// Insert `node` right before `anchor`.
    pub fn insert_before(&mut self, anchor: Uuid, node: TaskNode) -> BoardResult<Uuid> {
        if anchor == self.head {
            return Err(BoardError::ProtectedNode(anchor));
        }
        let prev = self.lookup(anchor)?.prev.ok_or_else(|| {
            BoardError::invariant(format!("task {} has no predecessor", anchor))
        })?;
        self.insert_after(prev, node)
    }

    /// Insert `node` as the last live task.
    pub fn append(&mut self, node: TaskNode) -> BoardResult<Uuid> {
        self.insert_before(self.tail, node)
    }

    /// Move `target` right behind `new_prev` (the head sentinel moves it to
    /// the front). Returns the new order.
    pub fn move_after(&mut self, target: Uuid, new_prev: Uuid) -> BoardResult<Vec<Uuid>> {
        if target == new_prev {
            return Err(BoardError::SameTarget(target));
        }
        if self.is_sentinel_id(target) {
            return Err(BoardError::ProtectedNode(target));
        }
        if new_prev == self.tail {
            return Err(BoardError::ProtectedNode(new_prev));
        }
        self.lookup(target)?;
        self.lookup(new_prev)?;

        self.unlink(target)?;
        self.link_after(new_prev, target)?;
        self.changes.touched(target);

        let ordered = self.ordered_ids()?;
        tracing::debug!(tab_id = %self.tab_id, task_id = %target, after = %new_prev, "task moved");
        Ok(ordered)
    }

    /// Unlink a task and flag it deleted. The row itself is kept.
    pub fn detach(&mut self, id: Uuid) -> BoardResult<()> {
        if self.is_sentinel_id(id) {
            return Err(BoardError::ProtectedNode(id));
        }
        self.lookup(id)?;

        self.unlink(id)?;
        self.node_mut(id)?.is_deleted = true;
        self.changes.touched(id);
        tracing::debug!(tab_id = %self.tab_id, task_id = %id, "task detached");
        Ok(())
    }

    /// Mutable access to a live task's business fields.
    pub fn edit(&mut self, id: Uuid) -> BoardResult<&mut TaskNode> {
        if self.is_sentinel_id(id) {
            return Err(BoardError::ProtectedNode(id));
        }
        self.lookup(id)?;
        self.changes.touched(id);
        self.node_mut(id)
    }

    /// Row writes for everything changed since the list was built.
    pub fn into_writes(self) -> Vec<NodeWrite<TaskNode>> {
        self.changes.into_writes(&self.nodes)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn node(&self, id: Uuid) -> BoardResult<&TaskNode> {
        self.nodes.get(&id).ok_or_else(|| {
            BoardError::invariant(format!(
                "task chain of tab {} points at missing task {}",
                self.tab_id, id
            ))
        })
    }

    fn node_mut(&mut self, id: Uuid) -> BoardResult<&mut TaskNode> {
        let tab_id = self.tab_id;
        self.nodes.get_mut(&id).ok_or_else(|| {
            BoardError::invariant(format!(
                "task chain of tab {} points at missing task {}",
                tab_id, id
            ))
        })
    }

    /// Join the neighbours of `id` and clear its links.
    fn unlink(&mut self, id: Uuid) -> BoardResult<()> {
        let node = self.node_mut(id)?;
        let (prev, next) = match (node.prev.take(), node.next.take()) {
            (Some(prev), Some(next)) => (prev, next),
            _ => {
                return Err(BoardError::invariant(format!(
                    "linked task {} is missing a neighbour",
                    id
                )))
            }
        };

        self.node_mut(prev)?.next = Some(next);
        self.node_mut(next)?.prev = Some(prev);
        self.changes.touched(prev);
        self.changes.touched(next);
        Ok(())
    }

    /// Splice the (unlinked) arena node `id` between `after` and its successor.
    fn link_after(&mut self, after: Uuid, id: Uuid) -> BoardResult<()> {
        let next = self.node(after)?.next.ok_or_else(|| {
            BoardError::invariant(format!("task {} has no successor", after))
        })?;

        self.node_mut(after)?.next = Some(id);
        self.node_mut(next)?.prev = Some(id);
        let node = self.node_mut(id)?;
        node.prev = Some(after);
        node.next = Some(next);
        self.changes.touched(after);
        self.changes.touched(next);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Stored rows for a tab holding `names` between its sentinels.
    fn rows(tab_id: Uuid, names: &[&str]) -> Vec<TaskNode> {
        let (head, tail) = create_with_sentinels(tab_id);
        let mut all = vec![head];
        all.extend(names.iter().map(|n| TaskNode::new(tab_id, *n)));
        all.push(tail);
        for i in 0..all.len() - 1 {
            let next = all[i + 1].id;
            let prev = all[i].id;
            all[i].next = Some(next);
            all[i + 1].prev = Some(prev);
        }
        all
    }

    fn names(list: &TaskList) -> Vec<String> {
        list.ordered()
            .unwrap()
            .into_iter()
            .map(|t| t.name.clone())
            .collect()
    }

    #[test]
    fn test_create_with_sentinels_links_pair() {
        let tab_id = Uuid::new_v4();
        let (head, tail) = create_with_sentinels(tab_id);
        assert_eq!(head.next, Some(tail.id));
        assert_eq!(tail.prev, Some(head.id));
        assert_eq!(head.prev, None);
        assert_eq!(tail.next, None);
        assert_eq!(head.sentinel_kind(), Some(Sentinel::Head));
        assert_eq!(tail.sentinel_kind(), Some(Sentinel::Tail));
    }

    #[test]
    fn test_insert_then_detach_worked_example() {
        let tab_id = Uuid::new_v4();
        let mut list = TaskList::from_nodes(tab_id, rows(tab_id, &[])).unwrap();
        let (h, z) = (list.head_id(), list.tail_id());

        let task1 = list.insert_after(h, TaskNode::new(tab_id, "task1")).unwrap();
        assert_eq!(list.lookup(h).unwrap().next, Some(task1));
        assert_eq!(list.lookup(task1).unwrap().prev, Some(h));
        assert_eq!(list.lookup(task1).unwrap().next, Some(z));
        assert_eq!(list.lookup(z).unwrap().prev, Some(task1));

        list.detach(task1).unwrap();
        assert_eq!(list.lookup(h).unwrap().next, Some(z));
        assert_eq!(list.lookup(z).unwrap().prev, Some(h));
        assert!(list.ordered().unwrap().is_empty());

        let detached = list.rows().find(|t| t.id == task1).unwrap();
        assert!(detached.is_deleted);
        assert_eq!(detached.next, None);
        assert_eq!(detached.prev, None);
    }

    #[test]
    fn test_from_nodes_checks_owner_and_sentinels() {
        let tab_id = Uuid::new_v4();
        let mut foreign = rows(tab_id, &["a"]);
        foreign[1].tab_id = Uuid::new_v4();
        assert!(matches!(
            TaskList::from_nodes(tab_id, foreign),
            Err(BoardError::OwnerMismatch { .. })
        ));

        let mut no_tail = rows(tab_id, &["a"]);
        no_tail.pop();
        assert!(matches!(
            TaskList::from_nodes(tab_id, no_tail),
            Err(BoardError::ServerInvariantViolation(_))
        ));

        let mut two_heads = rows(tab_id, &[]);
        two_heads.push(TaskNode::sentinel(tab_id, Sentinel::Head));
        assert!(matches!(
            TaskList::from_nodes(tab_id, two_heads),
            Err(BoardError::ServerInvariantViolation(_))
        ));
    }

    #[test]
    fn test_from_nodes_keeps_deleted_rows_out_of_order() {
        let tab_id = Uuid::new_v4();
        let mut stored = rows(tab_id, &["a", "b"]);
        let mut gone = TaskNode::new(tab_id, "gone");
        gone.is_deleted = true;
        stored.push(gone.clone());

        let list = TaskList::from_nodes(tab_id, stored).unwrap();
        assert_eq!(names(&list), vec!["a", "b"]);
        assert!(matches!(list.lookup(gone.id), Err(BoardError::NotFound { .. })));
    }

    #[test]
    fn test_ordered_detects_broken_back_link() {
        let tab_id = Uuid::new_v4();
        let mut stored = rows(tab_id, &["a", "b"]);
        stored[2].prev = Some(stored[3].id);
        let list = TaskList::from_nodes(tab_id, stored).unwrap();
        assert!(matches!(
            list.ordered(),
            Err(BoardError::ServerInvariantViolation(_))
        ));
    }

    #[test]
    fn test_ordered_detects_unreachable_task() {
        let tab_id = Uuid::new_v4();
        let mut stored = rows(tab_id, &["a"]);
        stored.push(TaskNode::new(tab_id, "orphan"));
        let list = TaskList::from_nodes(tab_id, stored).unwrap();
        assert!(matches!(
            list.ordered(),
            Err(BoardError::ServerInvariantViolation(_))
        ));
    }

    #[test]
    fn test_sentinels_are_protected() {
        let tab_id = Uuid::new_v4();
        let stored = rows(tab_id, &["a"]);
        let a = stored[1].id;
        let mut list = TaskList::from_nodes(tab_id, stored).unwrap();
        let (h, z) = (list.head_id(), list.tail_id());

        assert!(matches!(list.detach(h), Err(BoardError::ProtectedNode(_))));
        assert!(matches!(list.detach(z), Err(BoardError::ProtectedNode(_))));
        assert!(matches!(list.edit(h), Err(BoardError::ProtectedNode(_))));
        assert!(matches!(
            list.insert_after(z, TaskNode::new(tab_id, "x")),
            Err(BoardError::ProtectedNode(_))
        ));
        assert!(matches!(
            list.insert_before(h, TaskNode::new(tab_id, "x")),
            Err(BoardError::ProtectedNode(_))
        ));
        assert!(matches!(list.move_after(h, a), Err(BoardError::ProtectedNode(_))));
        assert!(matches!(list.move_after(a, z), Err(BoardError::ProtectedNode(_))));
        assert_eq!(names(&list), vec!["a"]);
    }

    #[test]
    fn test_reserved_names_rejected() {
        let tab_id = Uuid::new_v4();
        let mut list = TaskList::new(tab_id);
        assert!(matches!(
            list.append(TaskNode::new(tab_id, "__tail__")),
            Err(BoardError::NameDuplicate { .. })
        ));
    }

    #[test]
    fn test_detach_twice_is_not_found() {
        let tab_id = Uuid::new_v4();
        let stored = rows(tab_id, &["a"]);
        let a = stored[1].id;
        let mut list = TaskList::from_nodes(tab_id, stored).unwrap();
        list.detach(a).unwrap();
        assert!(matches!(list.detach(a), Err(BoardError::NotFound { .. })));
        assert!(matches!(
            list.detach(Uuid::new_v4()),
            Err(BoardError::NotFound { .. })
        ));
    }

    #[test]
    fn test_insert_before_and_append() {
        let tab_id = Uuid::new_v4();
        let stored = rows(tab_id, &["b"]);
        let b = stored[1].id;
        let mut list = TaskList::from_nodes(tab_id, stored).unwrap();

        list.insert_before(b, TaskNode::new(tab_id, "a")).unwrap();
        list.append(TaskNode::new(tab_id, "c")).unwrap();
        assert_eq!(names(&list), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_move_after_and_to_front() {
        let tab_id = Uuid::new_v4();
        let stored = rows(tab_id, &["a", "b", "c"]);
        let (a, b, c) = (stored[1].id, stored[2].id, stored[3].id);
        let mut list = TaskList::from_nodes(tab_id, stored).unwrap();

        assert_eq!(list.move_after(a, c).unwrap(), vec![b, c, a]);
        let head = list.head_id();
        assert_eq!(list.move_after(a, head).unwrap(), vec![a, b, c]);
        assert!(matches!(list.move_after(b, b), Err(BoardError::SameTarget(_))));
    }

    #[test]
    fn test_move_to_current_position_keeps_order() {
        let tab_id = Uuid::new_v4();
        let stored = rows(tab_id, &["a", "b"]);
        let (a, b) = (stored[1].id, stored[2].id);
        let mut list = TaskList::from_nodes(tab_id, stored).unwrap();
        assert_eq!(list.move_after(b, a).unwrap(), vec![a, b]);
    }

    #[test]
    fn test_detach_touches_neighbours() {
        let tab_id = Uuid::new_v4();
        let stored = rows(tab_id, &["a"]);
        let (h, a, z) = (stored[0].id, stored[1].id, stored[2].id);
        let mut list = TaskList::from_nodes(tab_id, stored).unwrap();
        list.detach(a).unwrap();

        let mut updated: Vec<Uuid> = list
            .into_writes()
            .into_iter()
            .filter_map(|w| match w {
                NodeWrite::Update(t) => Some(t.id),
                _ => None,
            })
            .collect();
        updated.sort();
        let mut expected = vec![h, a, z];
        expected.sort();
        assert_eq!(updated, expected);
    }

    #[test]
    fn test_new_list_writes_sentinels() {
        let tab_id = Uuid::new_v4();
        let list = TaskList::new(tab_id);
        let writes = list.into_writes();
        assert_eq!(writes.len(), 2);
        assert!(writes.iter().all(|w| matches!(w, NodeWrite::Insert(_))));
    }
}
