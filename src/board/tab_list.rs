//! Ordered tabs of a plan.
//!
//! Tabs are persisted as an unordered row set; each row points at its
//! successor. A [`TabList`] rebuilds the chain from the anchor tab, applies
//! structural mutations in memory and reports the rows it changed.
//!
//! Every structural mutation also touches the anchor row. The anchor's
//! version therefore guards the whole tab set: two concurrent mutations of
//! one plan's tabs always overlap on at least one row, and the store lets
//! only one of them commit.

use crate::board::conflict::ChangeSet;
use crate::board::error::{BoardError, BoardResult};
use crate::board::models::{TabNode, MAX_TABS_PER_PLAN};
use crate::store::NodeWrite;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct TabList {
    plan_id: Uuid,
    nodes: HashMap<Uuid, TabNode>,
    anchor: Uuid,
    changes: ChangeSet,
}

impl TabList {
    /// Rebuild a list from the stored tabs of `plan_id`.
    pub fn from_nodes(plan_id: Uuid, nodes: Vec<TabNode>) -> BoardResult<Self> {
        if nodes.is_empty() {
            return Err(BoardError::SizeInvalid(format!("plan {} has no tabs", plan_id)));
        }
        if nodes.len() > MAX_TABS_PER_PLAN {
            return Err(BoardError::SizeInvalid(format!(
                "plan {} holds {} tabs, at most {} allowed",
                plan_id,
                nodes.len(),
                MAX_TABS_PER_PLAN
            )));
        }
        if let Some(foreign) = nodes.iter().find(|t| t.plan_id != plan_id) {
            return Err(BoardError::OwnerMismatch {
                entity: "tab",
                id: foreign.id,
                owner_id: plan_id,
            });
        }

        let anchors: Vec<Uuid> = nodes.iter().filter(|t| t.is_anchor).map(|t| t.id).collect();
        let anchor = match anchors.as_slice() {
            [single] => *single,
            _ => {
                return Err(BoardError::invariant(format!(
                    "plan {} has {} anchor tabs",
                    plan_id,
                    anchors.len()
                )))
            }
        };

        let count = nodes.len();
        let nodes: HashMap<Uuid, TabNode> = nodes.into_iter().map(|t| (t.id, t)).collect();
        if nodes.len() != count {
            return Err(BoardError::invariant(format!(
                "plan {} has duplicate tab ids",
                plan_id
            )));
        }

        Ok(Self {
            plan_id,
            nodes,
            anchor,
            changes: ChangeSet::default(),
        })
    }

    /// Start a fresh list whose only tab is a new anchor named `anchor_name`.
    pub fn new(plan_id: Uuid, anchor_name: impl Into<String>) -> Self {
        let anchor = TabNode::anchor(plan_id, anchor_name);
        let anchor_id = anchor.id;
        let mut changes = ChangeSet::default();
        changes.inserted(anchor_id);
        Self {
            plan_id,
            nodes: HashMap::from([(anchor_id, anchor)]),
            anchor: anchor_id,
            changes,
        }
    }

    pub fn plan_id(&self) -> Uuid {
        self.plan_id
    }

    pub fn anchor_id(&self) -> Uuid {
        self.anchor
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn lookup(&self, id: Uuid) -> BoardResult<&TabNode> {
        self.nodes.get(&id).ok_or_else(|| BoardError::not_found("tab", id))
    }

    /// Tabs in display order, starting at the anchor.
    pub fn ordered(&self) -> BoardResult<Vec<&TabNode>> {
        let mut sequence = Vec::with_capacity(self.nodes.len());
        let mut cursor = Some(self.anchor);

        while let Some(id) = cursor {
            if sequence.len() == self.nodes.len() {
                return Err(BoardError::invariant(format!(
                    "tab chain of plan {} does not terminate",
                    self.plan_id
                )));
            }
            let node = self.nodes.get(&id).ok_or_else(|| {
                BoardError::invariant(format!(
                    "tab chain of plan {} points at missing tab {}",
                    self.plan_id, id
                ))
            })?;
            sequence.push(node);
            cursor = node.next;
        }

        if sequence.len() != self.nodes.len() {
            return Err(BoardError::invariant(format!(
                "tab chain of plan {} reaches {} of {} tabs",
                self.plan_id,
                sequence.len(),
                self.nodes.len()
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

    /// Insert `node` right after `after_id`. Returns the new tab's id.
    pub fn insert_after(&mut self, after_id: Uuid, mut node: TabNode) -> BoardResult<Uuid> {
        self.ensure_insertable(&node.name, None)?;
        self.lookup(after_id)?;

        node.plan_id = self.plan_id;
        node.is_anchor = false;
        let id = node.id;
        self.splice_after(after_id, node)?;
        self.changes.inserted(id);
        self.guard();
        tracing::debug!(plan_id = %self.plan_id, tab_id = %id, after = %after_id, "tab inserted");
        Ok(id)
    }

    /// Insert `node` behind the current last tab.
    pub fn append_last(&mut self, node: TabNode) -> BoardResult<Uuid> {
        let last = self
            .ordered()?
            .last()
            .map(|t| t.id)
            .ok_or_else(|| BoardError::invariant(format!("plan {} has no tabs", self.plan_id)))?;
        self.insert_after(last, node)
    }

    /// Move `target` right behind `new_prev`; returns the new order.
    pub fn move_after(&mut self, target: Uuid, new_prev: Uuid) -> BoardResult<Vec<Uuid>> {
        if target == new_prev {
            return Err(BoardError::SameTarget(target));
        }
        if target == self.anchor {
            return Err(BoardError::AnchorImmutable(target));
        }
        self.lookup(target)?;
        self.lookup(new_prev)?;

        let predecessor = self.predecessor(target)?;
        let node = self.unlink(predecessor, target)?;
        self.ensure_insertable(&node.name, Some(node.id))?;
        self.splice_after(new_prev, node)?;
        self.changes.touched(target);
        self.guard();

        let ordered = self.ordered_ids()?;
        tracing::debug!(plan_id = %self.plan_id, tab_id = %target, after = %new_prev, "tab moved");
        Ok(ordered)
    }

    /// Remove a non-anchor tab and return its row.
    pub fn remove(&mut self, id: Uuid) -> BoardResult<TabNode> {
        if id == self.anchor {
            return Err(BoardError::AnchorImmutable(id));
        }
        self.lookup(id)?;

        let predecessor = self.predecessor(id)?;
        let node = self.unlink(predecessor, id)?;
        self.changes.removed(id, node.version);
        self.guard();
        tracing::debug!(plan_id = %self.plan_id, tab_id = %id, "tab removed");
        Ok(node)
    }

    pub fn rename(&mut self, id: Uuid, name: impl Into<String>) -> BoardResult<()> {
        let name = name.into();
        self.lookup(id)?;
        self.ensure_name_free(&name, Some(id))?;

        if let Some(node) = self.nodes.get_mut(&id) {
            node.name = name;
        }
        self.changes.touched(id);
        self.guard();
        Ok(())
    }

    /// Row writes for everything changed since the list was built.
    pub fn into_writes(self) -> Vec<NodeWrite<TabNode>> {
        self.changes.into_writes(&self.nodes)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Capacity and name checks for a node about to enter the chain.
    /// `moving` is a node already counted in the list.
    fn ensure_insertable(&self, name: &str, moving: Option<Uuid>) -> BoardResult<()> {
        let resident = self.nodes.len() - usize::from(moving.is_some_and(|id| self.nodes.contains_key(&id)));
        if resident >= MAX_TABS_PER_PLAN {
            return Err(BoardError::SizeInvalid(format!(
                "plan {} already holds {} tabs",
                self.plan_id, MAX_TABS_PER_PLAN
            )));
        }
        self.ensure_name_free(name, moving)
    }

    fn ensure_name_free(&self, name: &str, except: Option<Uuid>) -> BoardResult<()> {
        let taken = self
            .ordered()?
            .iter()
            .any(|t| t.name == name && Some(t.id) != except);
        if taken {
            return Err(BoardError::NameDuplicate {
                scope: "plan",
                name: name.to_string(),
            });
        }
        Ok(())
    }

    fn predecessor(&self, id: Uuid) -> BoardResult<Uuid> {
        let preds: Vec<Uuid> = self
            .nodes
            .values()
            .filter(|t| t.next == Some(id))
            .map(|t| t.id)
            .collect();
        match preds.as_slice() {
            [single] => Ok(*single),
            _ => Err(BoardError::invariant(format!(
                "tab {} of plan {} has {} predecessors",
                id,
                self.plan_id,
                preds.len()
            ))),
        }
    }

    /// Take `id` out of the arena, relinking `predecessor` to its successor.
    fn unlink(&mut self, predecessor: Uuid, id: Uuid) -> BoardResult<TabNode> {
        let mut node = self
            .nodes
            .remove(&id)
            .ok_or_else(|| BoardError::not_found("tab", id))?;
        let pred = self
            .nodes
            .get_mut(&predecessor)
            .ok_or_else(|| BoardError::invariant(format!("predecessor {} vanished", predecessor)))?;
        pred.next = node.next.take();
        self.changes.touched(predecessor);
        Ok(node)
    }

    fn splice_after(&mut self, after_id: Uuid, mut node: TabNode) -> BoardResult<()> {
        let after = self
            .nodes
            .get_mut(&after_id)
            .ok_or_else(|| BoardError::not_found("tab", after_id))?;
        node.next = after.next.replace(node.id);
        self.nodes.insert(node.id, node);
        self.changes.touched(after_id);
        Ok(())
    }

    fn guard(&mut self) {
        self.changes.touched(self.anchor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Linked tabs named `names`, the first one being the anchor.
    fn chain(plan_id: Uuid, names: &[&str]) -> Vec<TabNode> {
        let mut tabs: Vec<TabNode> = names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                if i == 0 {
                    TabNode::anchor(plan_id, *name)
                } else {
                    TabNode::new(plan_id, *name)
                }
            })
            .collect();
        for i in 0..tabs.len().saturating_sub(1) {
            tabs[i].next = Some(tabs[i + 1].id);
        }
        tabs
    }

    fn names(list: &TabList) -> Vec<String> {
        list.ordered()
            .unwrap()
            .into_iter()
            .map(|t| t.name.clone())
            .collect()
    }

    // ========================================================================
    // Construction
    // ========================================================================

    #[test]
    fn test_from_nodes_orders_shuffled_rows() {
        let plan_id = Uuid::new_v4();
        let mut tabs = chain(plan_id, &["A", "B", "C", "D"]);
        tabs.reverse();
        let list = TabList::from_nodes(plan_id, tabs).unwrap();
        assert_eq!(names(&list), vec!["A", "B", "C", "D"]);
    }

    #[test]
    fn test_from_nodes_rejects_empty_and_oversized() {
        let plan_id = Uuid::new_v4();
        assert!(matches!(
            TabList::from_nodes(plan_id, vec![]),
            Err(BoardError::SizeInvalid(_))
        ));
        let six = chain(plan_id, &["1", "2", "3", "4", "5", "6"]);
        assert!(matches!(
            TabList::from_nodes(plan_id, six),
            Err(BoardError::SizeInvalid(_))
        ));
    }

    #[test]
    fn test_from_nodes_rejects_foreign_tab() {
        let plan_id = Uuid::new_v4();
        let mut tabs = chain(plan_id, &["A", "B"]);
        tabs[1].plan_id = Uuid::new_v4();
        assert!(matches!(
            TabList::from_nodes(plan_id, tabs),
            Err(BoardError::OwnerMismatch { .. })
        ));
    }

    #[test]
    fn test_from_nodes_requires_single_anchor() {
        let plan_id = Uuid::new_v4();
        let mut tabs = chain(plan_id, &["A", "B"]);
        tabs[1].is_anchor = true;
        assert!(matches!(
            TabList::from_nodes(plan_id, tabs),
            Err(BoardError::ServerInvariantViolation(_))
        ));

        let mut tabs = chain(plan_id, &["A", "B"]);
        tabs[0].is_anchor = false;
        assert!(matches!(
            TabList::from_nodes(plan_id, tabs),
            Err(BoardError::ServerInvariantViolation(_))
        ));
    }

    #[test]
    fn test_ordered_detects_cycle_and_dangling_link() {
        let plan_id = Uuid::new_v4();
        let mut tabs = chain(plan_id, &["A", "B", "C"]);
        tabs[2].next = Some(tabs[1].id);
        let list = TabList::from_nodes(plan_id, tabs).unwrap();
        assert!(matches!(
            list.ordered(),
            Err(BoardError::ServerInvariantViolation(_))
        ));

        let mut tabs = chain(plan_id, &["A", "B"]);
        tabs[1].next = Some(Uuid::new_v4());
        let list = TabList::from_nodes(plan_id, tabs).unwrap();
        assert!(matches!(
            list.ordered(),
            Err(BoardError::ServerInvariantViolation(_))
        ));
    }

    #[test]
    fn test_ordered_detects_unreachable_tab() {
        let plan_id = Uuid::new_v4();
        let mut tabs = chain(plan_id, &["A", "B", "C"]);
        tabs[1].next = None;
        let list = TabList::from_nodes(plan_id, tabs).unwrap();
        assert!(matches!(
            list.ordered(),
            Err(BoardError::ServerInvariantViolation(_))
        ));
    }

    // ========================================================================
    // Move
    // ========================================================================

    #[test]
    fn test_move_after_worked_example() {
        let plan_id = Uuid::new_v4();
        let tabs = chain(plan_id, &["A", "B", "C"]);
        let (a, b, c) = (tabs[0].id, tabs[1].id, tabs[2].id);
        let mut list = TabList::from_nodes(plan_id, tabs).unwrap();

        let order = list.move_after(c, a).unwrap();
        assert_eq!(order, vec![a, c, b]);
        assert_eq!(list.lookup(a).unwrap().next, Some(c));
        assert_eq!(list.lookup(c).unwrap().next, Some(b));
        assert_eq!(list.lookup(b).unwrap().next, None);

        assert!(matches!(
            list.move_after(a, b),
            Err(BoardError::AnchorImmutable(id)) if id == a
        ));
        assert!(matches!(
            list.move_after(c, c),
            Err(BoardError::SameTarget(id)) if id == c
        ));
    }

    #[test]
    fn test_move_after_round_trip_restores_order() {
        let plan_id = Uuid::new_v4();
        let tabs = chain(plan_id, &["A", "B", "C", "D"]);
        let ids: Vec<Uuid> = tabs.iter().map(|t| t.id).collect();
        let mut list = TabList::from_nodes(plan_id, tabs).unwrap();

        list.move_after(ids[1], ids[3]).unwrap();
        assert_eq!(names(&list), vec!["A", "C", "D", "B"]);
        let restored = list.move_after(ids[1], ids[0]).unwrap();
        assert_eq!(restored, ids);
    }

    #[test]
    fn test_move_at_capacity_is_allowed() {
        let plan_id = Uuid::new_v4();
        let tabs = chain(plan_id, &["1", "2", "3", "4", "5"]);
        let ids: Vec<Uuid> = tabs.iter().map(|t| t.id).collect();
        let mut list = TabList::from_nodes(plan_id, tabs).unwrap();

        list.move_after(ids[4], ids[1]).unwrap();
        assert_eq!(names(&list), vec!["1", "2", "5", "3", "4"]);
    }

    #[test]
    fn test_move_unknown_ids() {
        let plan_id = Uuid::new_v4();
        let tabs = chain(plan_id, &["A", "B"]);
        let b = tabs[1].id;
        let mut list = TabList::from_nodes(plan_id, tabs).unwrap();
        assert!(matches!(
            list.move_after(b, Uuid::new_v4()),
            Err(BoardError::NotFound { .. })
        ));
        assert!(matches!(
            list.move_after(Uuid::new_v4(), b),
            Err(BoardError::NotFound { .. })
        ));
        assert_eq!(names(&list), vec!["A", "B"]);
    }

    #[test]
    fn test_move_writes_only_updates() {
        let plan_id = Uuid::new_v4();
        let tabs = chain(plan_id, &["A", "B", "C"]);
        let (a, c) = (tabs[0].id, tabs[2].id);
        let mut list = TabList::from_nodes(plan_id, tabs).unwrap();
        list.move_after(c, a).unwrap();

        let writes = list.into_writes();
        assert_eq!(writes.len(), 3);
        assert!(writes.iter().all(|w| matches!(w, NodeWrite::Update(_))));
    }

    // ========================================================================
    // Insert / remove / rename
    // ========================================================================

    #[test]
    fn test_insert_after_and_append() {
        let plan_id = Uuid::new_v4();
        let tabs = chain(plan_id, &["A", "C"]);
        let a = tabs[0].id;
        let mut list = TabList::from_nodes(plan_id, tabs).unwrap();

        list.insert_after(a, TabNode::new(plan_id, "B")).unwrap();
        list.append_last(TabNode::new(plan_id, "D")).unwrap();
        assert_eq!(names(&list), vec!["A", "B", "C", "D"]);

        let writes = list.into_writes();
        let inserts = writes.iter().filter(|w| matches!(w, NodeWrite::Insert(_))).count();
        assert_eq!(inserts, 2);
    }

    #[test]
    fn test_insert_beyond_capacity_fails() {
        let plan_id = Uuid::new_v4();
        let mut list =
            TabList::from_nodes(plan_id, chain(plan_id, &["1", "2", "3", "4", "5"])).unwrap();
        let before = list.ordered_ids().unwrap();

        assert!(matches!(
            list.append_last(TabNode::new(plan_id, "6")),
            Err(BoardError::SizeInvalid(_))
        ));
        assert_eq!(list.ordered_ids().unwrap(), before);
        assert!(list.into_writes().is_empty());
    }

    #[test]
    fn test_insert_duplicate_name_fails() {
        let plan_id = Uuid::new_v4();
        let tabs = chain(plan_id, &["To Do", "Done"]);
        let anchor = tabs[0].id;
        let mut list = TabList::from_nodes(plan_id, tabs).unwrap();

        assert!(matches!(
            list.insert_after(anchor, TabNode::new(plan_id, "Done")),
            Err(BoardError::NameDuplicate { .. })
        ));
        assert_eq!(list.len(), 2);
        assert!(list.into_writes().is_empty());
    }

    #[test]
    fn test_insert_after_unknown_tab() {
        let plan_id = Uuid::new_v4();
        let mut list = TabList::from_nodes(plan_id, chain(plan_id, &["A"])).unwrap();
        assert!(matches!(
            list.insert_after(Uuid::new_v4(), TabNode::new(plan_id, "B")),
            Err(BoardError::NotFound { .. })
        ));
    }

    #[test]
    fn test_remove_relinks_predecessor() {
        let plan_id = Uuid::new_v4();
        let tabs = chain(plan_id, &["A", "B", "C"]);
        let (a, b, c) = (tabs[0].id, tabs[1].id, tabs[2].id);
        let mut list = TabList::from_nodes(plan_id, tabs).unwrap();

        let removed = list.remove(b).unwrap();
        assert_eq!(removed.id, b);
        assert_eq!(list.lookup(a).unwrap().next, Some(c));
        assert!(matches!(list.lookup(b), Err(BoardError::NotFound { .. })));
        assert!(matches!(list.remove(a), Err(BoardError::AnchorImmutable(_))));

        let writes = list.into_writes();
        assert!(writes.contains(&NodeWrite::Delete {
            id: b,
            expected_version: 0
        }));
    }

    #[test]
    fn test_rename_checks_siblings_only() {
        let plan_id = Uuid::new_v4();
        let tabs = chain(plan_id, &["A", "B"]);
        let b = tabs[1].id;
        let mut list = TabList::from_nodes(plan_id, tabs).unwrap();

        list.rename(b, "B").unwrap();
        assert!(matches!(
            list.rename(b, "A"),
            Err(BoardError::NameDuplicate { .. })
        ));
        list.rename(b, "Review").unwrap();
        assert_eq!(names(&list), vec!["A", "Review"]);
    }

    #[test]
    fn test_mutations_touch_anchor() {
        let plan_id = Uuid::new_v4();
        let tabs = chain(plan_id, &["A", "B", "C"]);
        let (a, c) = (tabs[0].id, tabs[2].id);
        let mut list = TabList::from_nodes(plan_id, tabs).unwrap();
        list.rename(c, "Z").unwrap();

        let writes = list.into_writes();
        assert!(writes
            .iter()
            .any(|w| matches!(w, NodeWrite::Update(t) if t.id == a)));
    }

    #[test]
    fn test_new_list_inserts_anchor() {
        let plan_id = Uuid::new_v4();
        let mut list = TabList::new(plan_id, "To Do");
        list.append_last(TabNode::new(plan_id, "Done")).unwrap();
        let writes = list.into_writes();
        assert_eq!(writes.len(), 2);
        assert!(writes.iter().all(|w| matches!(w, NodeWrite::Insert(_))));
    }
}
