/*!
Predicate search over a [`ContextTree`](crate::ContextTree).

Traversal is pre-order (parent before children, children in index order) and
fetches children on demand, so the first search over a fresh tree makes bridge
calls and repeated searches are served from the cache. A child that is the
same object as one of its ancestors stops traversal at that point and is
reported once as [`Truncation::CycleDetected`].
*/

use crate::tree::ContextNode;
use crate::types::{ContextInfo, JabioResult, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// Something that can decide whether a node matches.
///
/// Implemented for closures `Fn(&ContextNode, &ContextInfo) -> bool` and for
/// [`SearchElement`].
pub trait Predicate {
  fn matches(&self, node: &ContextNode, info: &ContextInfo) -> bool;
}

impl<F> Predicate for F
where
  F: Fn(&ContextNode, &ContextInfo) -> bool,
{
  fn matches(&self, node: &ContextNode, info: &ContextInfo) -> bool {
    self(node, info)
  }
}

/// Exact or prefix string match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextMatch {
  Exact(String),
  Prefix(String),
}

impl TextMatch {
  pub fn is_match(&self, value: &str) -> bool {
    match self {
      Self::Exact(wanted) => value == wanted,
      Self::Prefix(wanted) => value.starts_with(wanted.as_str()),
    }
  }
}

/// Attribute query: a node matches when every constraint that is set holds.
///
/// # Example
///
/// ```ignore
/// let query = SearchElement::new().role("push button").name_prefix("Cal");
/// let buttons = tree.find_all(&query)?;
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchElement {
  pub role: Option<TextMatch>,
  pub name: Option<TextMatch>,
  pub description: Option<TextMatch>,
  /// States that must all be present.
  pub states: Vec<String>,
  /// Depth below the tree root.
  pub object_depth: Option<usize>,
  pub index_in_parent: Option<i32>,
}

impl SearchElement {
  pub fn new() -> Self {
    Self::default()
  }

  /// Role, matched against the localized and the en-US role.
  #[must_use]
  pub fn role(mut self, role: impl Into<String>) -> Self {
    self.role = Some(TextMatch::Exact(role.into()));
    self
  }

  #[must_use]
  pub fn name(mut self, name: impl Into<String>) -> Self {
    self.name = Some(TextMatch::Exact(name.into()));
    self
  }

  #[must_use]
  pub fn name_prefix(mut self, prefix: impl Into<String>) -> Self {
    self.name = Some(TextMatch::Prefix(prefix.into()));
    self
  }

  #[must_use]
  pub fn description(mut self, description: impl Into<String>) -> Self {
    self.description = Some(TextMatch::Exact(description.into()));
    self
  }

  #[must_use]
  pub fn description_prefix(mut self, prefix: impl Into<String>) -> Self {
    self.description = Some(TextMatch::Prefix(prefix.into()));
    self
  }

  #[must_use]
  pub fn state(mut self, state: impl Into<String>) -> Self {
    self.states.push(state.into());
    self
  }

  #[must_use]
  pub const fn object_depth(mut self, depth: usize) -> Self {
    self.object_depth = Some(depth);
    self
  }

  #[must_use]
  pub const fn index_in_parent(mut self, index: i32) -> Self {
    self.index_in_parent = Some(index);
    self
  }
}

impl Predicate for SearchElement {
  fn matches(&self, node: &ContextNode, info: &ContextInfo) -> bool {
    let text = |constraint: &Option<TextMatch>, values: &[&str]| {
      constraint
        .as_ref()
        .map_or(true, |m| values.iter().any(|v| m.is_match(v)))
    };
    text(&self.role, &[&info.role, &info.role_en_us])
      && text(&self.name, &[&info.name])
      && text(&self.description, &[&info.description])
      && self.states.iter().all(|s| info.has_state(s))
      && self.object_depth.map_or(true, |d| d == node.depth())
      && self.index_in_parent.map_or(true, |i| i == info.index_in_parent)
  }
}

/// Why part of the tree was not searched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Truncation {
  /// A child was the same object as one of its ancestors (the node named
  /// here); traversal did not descend into it again.
  CycleDetected(NodeId),
}

/// Matches plus anything that cut the traversal short.
#[derive(Debug, Default)]
pub struct SearchResults {
  pub nodes: Vec<Arc<ContextNode>>,
  pub truncations: Vec<Truncation>,
}

impl SearchResults {
  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  pub fn is_truncated(&self) -> bool {
    !self.truncations.is_empty()
  }

  pub fn into_nodes(self) -> Vec<Arc<ContextNode>> {
    self.nodes
  }
}

enum Step {
  Enter(Arc<ContextNode>, usize),
  Leave,
}

/// All nodes under `root` (inclusive) matching `predicate`, at most
/// `max_depth` levels below `root`.
pub fn search<P: Predicate + ?Sized>(
  root: &Arc<ContextNode>,
  predicate: &P,
  max_depth: Option<usize>,
) -> JabioResult<SearchResults> {
  walk(root, predicate, max_depth, false)
}

/// First node in pre-order matching `predicate`.
pub fn search_first<P: Predicate + ?Sized>(
  root: &Arc<ContextNode>,
  predicate: &P,
  max_depth: Option<usize>,
) -> JabioResult<Option<Arc<ContextNode>>> {
  Ok(walk(root, predicate, max_depth, true)?.nodes.into_iter().next())
}

fn walk<P: Predicate + ?Sized>(
  root: &Arc<ContextNode>,
  predicate: &P,
  max_depth: Option<usize>,
  first_only: bool,
) -> JabioResult<SearchResults> {
  let tree = root.tree()?;
  tree.sync();

  let mut results = SearchResults::default();
  let mut reported = HashSet::new();
  let mut path: Vec<NodeId> = Vec::new();
  let mut stack = vec![Step::Enter(Arc::clone(root), 0)];

  while let Some(step) = stack.pop() {
    let (node, depth) = match step {
      Step::Leave => {
        path.pop();
        continue;
      }
      Step::Enter(node, depth) => (node, depth),
    };

    if path.contains(&node.id()) {
      if reported.insert(node.id()) {
        log::debug!("search: cycle back to node {}", node.id());
        results.truncations.push(Truncation::CycleDetected(node.id()));
      }
      continue;
    }

    let info = node.info_unsynced()?;
    if predicate.matches(&node, &info) {
      results.nodes.push(Arc::clone(&node));
      if first_only {
        break;
      }
    }

    if max_depth.is_some_and(|max| depth >= max) {
      continue;
    }
    let children = tree.children_of(&node, false)?;
    path.push(node.id());
    stack.push(Step::Leave);
    stack.extend(
      children
        .into_iter()
        .rev()
        .map(|child| Step::Enter(child, depth + 1)),
    );
  }

  Ok(results)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::bridge::fake::{self, FakeBridge};
  use crate::tree::ContextTree;

  fn calculator() -> (Arc<FakeBridge>, ContextTree) {
    let fake = FakeBridge::new();
    let root = fake.add_window("Calculator", 42, "frame");
    fake.add_child(root, "push button", "1");
    fake.add_child(root, "push button", "2");
    fake.add_child(root, "edit", "display");
    let (gateway, dispatcher) = fake::wire(&fake);
    let tree = ContextTree::build(&gateway, &dispatcher, fake.window("Calculator")).unwrap();
    (fake, tree)
  }

  #[test]
  fn finds_the_single_edit_field() {
    let (_fake, tree) = calculator();
    let found = tree.search(&SearchElement::new().role("edit"), None).unwrap();
    assert_eq!(found.len(), 1);
    assert!(!found.is_truncated());
    assert_eq!(found.nodes[0].name().unwrap(), "display");
  }

  #[test]
  fn results_are_pre_order() {
    let (fake, tree) = calculator();
    let first_button = fake.children_of(1)[0];
    fake.add_child(first_button, "label", "one");

    let names: Vec<String> = tree
      .search(&|_: &ContextNode, _: &ContextInfo| true, None)
      .unwrap()
      .into_nodes()
      .iter()
      .map(|n| n.name().unwrap())
      .collect();
    assert_eq!(names, vec!["Calculator", "1", "one", "2", "display"]);
  }

  #[test]
  fn search_first_stops_at_first_match() {
    let (_fake, tree) = calculator();
    let first = tree
      .search_first(&SearchElement::new().role("push button"), None)
      .unwrap()
      .unwrap();
    assert_eq!(first.name().unwrap(), "1");
    assert!(tree
      .search_first(&SearchElement::new().role("slider"), None)
      .unwrap()
      .is_none());
  }

  #[test]
  fn max_depth_bounds_traversal() {
    let fake = FakeBridge::new();
    let root = fake.add_window("Deep", 1, "frame");
    let panel = fake.add_child(root, "panel", "outer");
    let inner = fake.add_child(panel, "panel", "inner");
    fake.add_child(inner, "edit", "hidden");
    let (gateway, dispatcher) = fake::wire(&fake);
    let tree = ContextTree::build(&gateway, &dispatcher, fake.window("Deep")).unwrap();

    let found = tree.search(&SearchElement::new().role("edit"), Some(1)).unwrap();
    assert!(found.is_empty());
    // Root and its one child only: nothing deeper was fetched.
    assert_eq!(tree.node_count(), 2);

    let found = tree.search(&SearchElement::new().role("edit"), Some(3)).unwrap();
    assert_eq!(found.len(), 1);
  }

  #[test]
  fn depth_zero_tests_only_the_root() {
    let (fake, tree) = calculator();
    let found = tree.search(&SearchElement::new().role("frame"), Some(0)).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(fake.calls("getAccessibleChildFromContext"), 0);
  }

  #[test]
  fn cycle_terminates_and_is_reported_once() {
    let fake = FakeBridge::new();
    let root = fake.add_window("Loop", 1, "frame");
    let panel = fake.add_child(root, "panel", "p");
    fake.add_child(panel, "edit", "e");
    fake.link_child(panel, root);
    let (gateway, dispatcher) = fake::wire(&fake);
    let tree = ContextTree::build(&gateway, &dispatcher, fake.window("Loop")).unwrap();

    let found = tree.search(&SearchElement::new().role("edit"), None).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(
      found.truncations,
      vec![Truncation::CycleDetected(tree.root().id())]
    );

    // The cached link stays; a second search reports the same single cycle.
    let again = tree.search(&SearchElement::new().role("edit"), None).unwrap();
    assert_eq!(again.truncations.len(), 1);
    assert_eq!(tree.node_count(), 3);
  }

  #[test]
  fn element_constraints_combine() {
    let (fake, tree) = calculator();
    let display = fake.children_of(1)[2];
    fake.set_states(display, "enabled,visible,showing,editable");

    let editable = SearchElement::new().state("editable");
    assert_eq!(tree.find_all(&editable).unwrap().len(), 1);

    let by_prefix = SearchElement::new().role("push button").name_prefix("2");
    let nodes = tree.find_all(&by_prefix).unwrap();
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].index_in_parent().unwrap(), 1);

    let by_index = SearchElement::new().object_depth(1).index_in_parent(0);
    assert_eq!(tree.find_all(&by_index).unwrap()[0].name().unwrap(), "1");

    let none = SearchElement::new().role("push button").description("x");
    assert!(tree.find_all(&none).unwrap().is_empty());
  }

  #[test]
  fn text_match_modes() {
    assert!(TextMatch::Exact("OK".to_owned()).is_match("OK"));
    assert!(!TextMatch::Exact("OK".to_owned()).is_match("OK "));
    assert!(TextMatch::Prefix("Cal".to_owned()).is_match("Calculator"));
    assert!(!TextMatch::Prefix("calc".to_owned()).is_match("Calculator"));
  }

  #[test]
  fn search_over_dropped_tree_is_invalid_handle() {
    let (_fake, tree) = calculator();
    let root = Arc::clone(tree.root());
    drop(tree);
    assert!(matches!(
      search(&root, &SearchElement::new(), None),
      Err(crate::JabioError::InvalidHandle)
    ));
  }
}
