/*!
Parent/child links between cached nodes.

A children list may mention nodes it does not own: an entry that resolves to
an ancestor (a remote cycle) or to a node cached elsewhere is kept as a plain
link. Ownership (`parent_of`) is what eviction follows, so a link never drags
its target out of the tree.

## Invariants

1. **Single owner**: each node has at most one owning parent for its lifetime.
2. **Owned implies listed**: if `parent_of[child] = parent` then
   `children_of[parent]` contains `child`.
3. **Fetched marker**: `children_of` has an entry for a node iff its children
   have been fetched at least once.
*/

use crate::types::NodeId;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
pub(super) struct NodeLinks {
  parent_of: HashMap<NodeId, NodeId>,
  children_of: HashMap<NodeId, Vec<NodeId>>,
}

impl NodeLinks {
  /// Owning parent of a node.
  pub(super) fn parent(&self, id: NodeId) -> Option<NodeId> {
    self.parent_of.get(&id).copied()
  }

  /// Children list, owned entries and links alike (empty if never fetched).
  pub(super) fn children(&self, id: NodeId) -> &[NodeId] {
    self.children_of.get(&id).map_or(&[], Vec::as_slice)
  }

  pub(super) fn is_fetched(&self, id: NodeId) -> bool {
    self.children_of.contains_key(&id)
  }

  pub(super) fn owns(&self, parent: NodeId, child: NodeId) -> bool {
    self.parent_of.get(&child) == Some(&parent)
  }

  /// Replace the children list of `parent`.
  ///
  /// Entries in `adopted` become owned by `parent`; other entries keep their
  /// current ownership. Previously owned children missing from the new list
  /// lose their owner (the caller evicts them).
  pub(super) fn set_children(
    &mut self,
    parent: NodeId,
    children: Vec<NodeId>,
    adopted: &HashSet<NodeId>,
  ) {
    let listed: HashSet<NodeId> = children.iter().copied().collect();
    if let Some(old_children) = self.children_of.get(&parent) {
      for child in old_children {
        if !listed.contains(child) && self.parent_of.get(child) == Some(&parent) {
          self.parent_of.remove(child);
        }
      }
    }

    for &child in &children {
      if !adopted.contains(&child) {
        continue;
      }
      if let Some(&existing) = self.parent_of.get(&child) {
        if existing != parent {
          log::error!(
            "set_children: node {child} is owned by {existing}, cannot adopt under {parent}"
          );
          continue;
        }
      }
      self.parent_of.insert(child, parent);
    }
    self.children_of.insert(parent, children);
  }

  /// Remove a node and everything it owns. Returns removed IDs, parent before
  /// children. Iterative to avoid stack overflow on deep trees.
  pub(super) fn remove_subtree(&mut self, root: NodeId) -> Vec<NodeId> {
    let mut removed = Vec::new();
    let mut stack = vec![root];

    while let Some(id) = stack.pop() {
      if let Some(parent) = self.parent_of.remove(&id) {
        if let Some(siblings) = self.children_of.get_mut(&parent) {
          siblings.retain(|&sid| sid != id);
        }
      }
      if let Some(children) = self.children_of.remove(&id) {
        stack.extend(
          children
            .into_iter()
            .filter(|child| self.parent_of.get(child) == Some(&id)),
        );
      }
      removed.push(id);
    }

    removed
  }

  /// Drop links pointing at removed nodes. Returns the nodes whose children
  /// list changed.
  pub(super) fn unlink(&mut self, removed: &HashSet<NodeId>) -> Vec<NodeId> {
    let mut touched = Vec::new();
    for (holder, children) in &mut self.children_of {
      let before = children.len();
      children.retain(|c| !removed.contains(c));
      if children.len() != before {
        touched.push(*holder);
      }
    }
    touched
  }
}
