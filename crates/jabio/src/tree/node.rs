/*! One cached accessible context. */

use super::TreeShared;
use crate::handle::HandleRef;
use crate::types::{
  AccessibleValue, Bounds, ContextInfo, JabioError, JabioResult, NodeId, Property, Recency,
  TextInfo, TextItems, TextSelection,
};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, Weak};
use std::time::Instant;

/// A property-bag field that change notifications can invalidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Field {
  Name,
  Description,
  States,
}

impl Field {
  /// Cached field affected by a property change. Value, text, selection and
  /// table-model changes touch nothing in the context record.
  pub(super) const fn for_property(property: &Property) -> Option<Self> {
    match property {
      Property::Name => Some(Self::Name),
      Property::Description => Some(Self::Description),
      Property::State => Some(Self::States),
      _ => None,
    }
  }
}

#[derive(Debug, Clone, Copy, Default)]
struct Stale {
  name: bool,
  description: bool,
  states: bool,
}

impl Stale {
  const fn any(self) -> bool {
    self.name || self.description || self.states
  }

  fn mark(&mut self, field: Field) {
    match field {
      Field::Name => self.name = true,
      Field::Description => self.description = true,
      Field::States => self.states = true,
    }
  }
}

#[derive(Debug)]
struct Props {
  info: ContextInfo,
  stale: Stale,
  fetched_at: Instant,
}

/// A cached accessible context.
///
/// Nodes are created and evicted by their [`ContextTree`](super::ContextTree)
/// only. Every operation fails with `InvalidHandle` once the node has been
/// evicted or its tree torn down.
///
/// The node's remote reference belongs to the tree and is not reachable from
/// outside the crate:
///
/// ```compile_fail
/// fn release(node: &jabio::ContextNode) {
///   node.handle().release().ok();
/// }
/// ```
pub struct ContextNode {
  id: NodeId,
  handle: HandleRef,
  depth: usize,
  props: RwLock<Props>,
  tree: Weak<TreeShared>,
}

impl std::fmt::Debug for ContextNode {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let props = self.props.read();
    f.debug_struct("ContextNode")
      .field("id", &self.id)
      .field("depth", &self.depth)
      .field("role", &props.info.role)
      .field("name", &props.info.name)
      .finish_non_exhaustive()
  }
}

impl ContextNode {
  pub(super) fn new(
    handle: HandleRef,
    info: ContextInfo,
    depth: usize,
    tree: Weak<TreeShared>,
  ) -> Self {
    Self {
      id: NodeId::new(),
      handle,
      depth,
      props: RwLock::new(Props {
        info,
        stale: Stale::default(),
        fetched_at: Instant::now(),
      }),
      tree,
    }
  }

  pub const fn id(&self) -> NodeId {
    self.id
  }

  /// Distance from the tree root (the root is 0).
  pub const fn depth(&self) -> usize {
    self.depth
  }

  pub(crate) const fn handle(&self) -> &HandleRef {
    &self.handle
  }

  pub(crate) fn tree(&self) -> JabioResult<Arc<TreeShared>> {
    self.tree.upgrade().ok_or(JabioError::InvalidHandle)
  }

  /// Still part of a live tree, with a live remote reference.
  pub fn is_live(&self) -> bool {
    self
      .tree
      .upgrade()
      .is_some_and(|tree| tree.contains(self.id) && self.handle.is_live())
  }

  pub(super) fn mark_stale(&self, field: Field) {
    self.props.write().stale.mark(field);
  }

  /// Re-read the property bag from the bridge.
  pub(super) fn refresh(&self) -> JabioResult<()> {
    let info = self.handle.gateway().context_info(&self.handle)?;
    let mut props = self.props.write();
    props.info = info;
    props.stale = Stale::default();
    props.fetched_at = Instant::now();
    Ok(())
  }

  /// Cached property bag as is, stale fields included.
  pub(super) fn cached_info(&self) -> ContextInfo {
    self.props.read().info.clone()
  }

  /// Property bag with stale fields refreshed; pending events are not applied.
  pub(crate) fn info_unsynced(&self) -> JabioResult<ContextInfo> {
    if self.props.read().stale.any() {
      self.refresh()?;
    }
    Ok(self.props.read().info.clone())
  }

  // ---------------------------------------------------------------------------
  // Properties
  // ---------------------------------------------------------------------------

  /// Current property bag: pending events are applied and any field they
  /// invalidated is re-fetched.
  pub fn info(&self) -> JabioResult<ContextInfo> {
    let tree = self.tree()?;
    let _fetch = tree.fetch_lock.lock();
    tree.sync_locked();
    self.ensure_cached(&tree)?;
    self.info_unsynced()
  }

  /// Property bag with explicit recency.
  ///
  /// `Recency::Any` makes no bridge calls and does not apply pending events,
  /// so it may return fields that a notification already marked stale. The
  /// other recencies apply delivered events first; a field they invalidated
  /// forces a re-fetch whatever the age.
  pub fn properties(&self, recency: Recency) -> JabioResult<ContextInfo> {
    let tree = self.tree()?;
    if recency == Recency::Any {
      self.ensure_cached(&tree)?;
      return Ok(self.cached_info());
    }

    let _fetch = tree.fetch_lock.lock();
    tree.sync_locked();
    self.ensure_cached(&tree)?;
    let (age, stale) = {
      let props = self.props.read();
      (props.fetched_at.elapsed(), props.stale.any())
    };
    if stale || !recency.is_satisfied_by(age) {
      self.refresh()?;
    }
    Ok(self.cached_info())
  }

  fn ensure_cached(&self, tree: &TreeShared) -> JabioResult<()> {
    if tree.contains(self.id) && self.handle.is_live() {
      Ok(())
    } else {
      Err(JabioError::InvalidHandle)
    }
  }

  pub fn name(&self) -> JabioResult<String> {
    Ok(self.info()?.name)
  }

  pub fn description(&self) -> JabioResult<String> {
    Ok(self.info()?.description)
  }

  pub fn role(&self) -> JabioResult<String> {
    Ok(self.info()?.role)
  }

  pub fn states(&self) -> JabioResult<BTreeSet<String>> {
    Ok(self.info()?.states)
  }

  pub fn bounds(&self) -> JabioResult<Bounds> {
    Ok(self.info()?.bounds)
  }

  pub fn index_in_parent(&self) -> JabioResult<i32> {
    Ok(self.info()?.index_in_parent)
  }

  /// Child count as of the last property fetch. No children are fetched.
  pub fn children_count(&self) -> JabioResult<usize> {
    Ok(self.info()?.child_count())
  }

  // ---------------------------------------------------------------------------
  // Navigation
  // ---------------------------------------------------------------------------

  /// Children in index order, fetched on first access and after a structural
  /// change. A child that is the same object as an ancestor is returned as
  /// that ancestor node.
  pub fn children(&self) -> JabioResult<Vec<Arc<ContextNode>>> {
    let tree = self.tree()?;
    tree.children_of(self, true)
  }

  /// Owning parent in the cached tree (`None` for the root).
  pub fn parent(&self) -> JabioResult<Option<Arc<ContextNode>>> {
    let tree = self.tree()?;
    self.ensure_cached(&tree)?;
    Ok(tree.parent_of(self.id))
  }

  // ---------------------------------------------------------------------------
  // Interaction
  // ---------------------------------------------------------------------------

  pub fn request_focus(&self) -> JabioResult<()> {
    let tree = self.tree()?;
    tree.gateway.request_focus(&self.handle)
  }

  /// Supported action names, lower-cased.
  pub fn actions(&self) -> JabioResult<Vec<String>> {
    let tree = self.tree()?;
    if !self.info_unsynced()?.accessible_action {
      return Ok(Vec::new());
    }
    let actions = tree.gateway.actions(&self.handle)?;
    Ok(actions.into_iter().map(|a| a.to_lowercase()).collect())
  }

  /// Perform a named action (case-insensitive).
  pub fn do_action(&self, action: &str) -> JabioResult<()> {
    let tree = self.tree()?;
    let wanted = action.to_lowercase();
    let available = if self.info_unsynced()?.accessible_action {
      tree.gateway.actions(&self.handle)?
    } else {
      Vec::new()
    };
    let Some(native) = available.into_iter().find(|a| a.to_lowercase() == wanted) else {
      return Err(JabioError::ActionFailed {
        action: action.to_owned(),
        reason: "not supported by this context".to_owned(),
      });
    };
    log::debug!("node {}: {native}", self.id);
    tree.gateway.do_actions(&self.handle, &[native])
  }

  pub fn click(&self) -> JabioResult<()> {
    self.do_action("click")
  }

  /// Replace the text contents of an editable context.
  pub fn insert_text(&self, text: &str) -> JabioResult<()> {
    let tree = self.tree()?;
    tree.gateway.set_text_contents(&self.handle, text)
  }

  /// The name a screen reader would announce.
  pub fn virtual_name(&self) -> JabioResult<String> {
    let tree = self.tree()?;
    tree.gateway.virtual_name(&self.handle)
  }

  pub fn visible_children_count(&self) -> JabioResult<usize> {
    let tree = self.tree()?;
    tree.gateway.visible_children_count(&self.handle)
  }

  /// Property bags of the visible descendants the bridge reports. The
  /// references are released before returning.
  pub fn visible_children(&self) -> JabioResult<Vec<ContextInfo>> {
    let tree = self.tree()?;
    tree
      .gateway
      .visible_children(&self.handle)?
      .iter()
      .map(|child| tree.gateway.context_info(child))
      .collect()
  }

  // ---------------------------------------------------------------------------
  // Value, text and selection
  // ---------------------------------------------------------------------------

  /// Fail with `NotSupported` unless the context implements `interface`.
  fn require(&self, interface: &'static str, flag: fn(&ContextInfo) -> bool) -> JabioResult<()> {
    if flag(&self.info_unsynced()?) {
      Ok(())
    } else {
      Err(JabioError::NotSupported(format!(
        "node {} does not implement {interface}",
        self.id
      )))
    }
  }

  /// Current, minimum and maximum value of a slider, spinner or progress bar.
  pub fn value(&self) -> JabioResult<AccessibleValue> {
    let tree = self.tree()?;
    self.require("AccessibleValue", |info| info.accessible_value)?;
    tree.gateway.value(&self.handle)
  }

  /// Character count and caret position. `index_at_point` is probed at the
  /// top-left corner of the cached bounds.
  pub fn text_info(&self) -> JabioResult<TextInfo> {
    let tree = self.tree()?;
    self.require("AccessibleText", |info| info.accessible_text)?;
    let bounds = self.cached_info().bounds;
    tree.gateway.text_info(&self.handle, bounds.x, bounds.y)
  }

  /// Letter, word and sentence at character `index`.
  pub fn text_items(&self, index: usize) -> JabioResult<TextItems> {
    let tree = self.tree()?;
    self.require("AccessibleText", |info| info.accessible_text)?;
    tree.gateway.text_items(&self.handle, index)
  }

  pub fn text_selection(&self) -> JabioResult<TextSelection> {
    let tree = self.tree()?;
    self.require("AccessibleText", |info| info.accessible_text)?;
    tree.gateway.text_selection(&self.handle)
  }

  /// Characters `start..=end`.
  pub fn text_range(&self, start: usize, end: usize) -> JabioResult<String> {
    let tree = self.tree()?;
    self.require("AccessibleText", |info| info.accessible_text)?;
    if end < start {
      return Ok(String::new());
    }
    tree.gateway.text_range(&self.handle, start, end)
  }

  /// Entire text contents.
  pub fn text(&self) -> JabioResult<String> {
    let count = usize::try_from(self.text_info()?.char_count).unwrap_or(0);
    match count.checked_sub(1) {
      Some(last) => self.text_range(0, last),
      None => Ok(String::new()),
    }
  }

  pub fn selection_count(&self) -> JabioResult<usize> {
    let tree = self.tree()?;
    self.require("AccessibleSelection", |info| info.accessible_selection)?;
    tree.gateway.selection_count(&self.handle)
  }

  pub fn is_child_selected(&self, index: usize) -> JabioResult<bool> {
    let tree = self.tree()?;
    self.require("AccessibleSelection", |info| info.accessible_selection)?;
    tree.gateway.is_child_selected(&self.handle, index)
  }

  /// Add the child at `index` to the selection.
  pub fn add_selection(&self, index: usize) -> JabioResult<()> {
    let tree = self.tree()?;
    self.require("AccessibleSelection", |info| info.accessible_selection)?;
    tree.gateway.add_selection(&self.handle, index)
  }

  pub fn remove_selection(&self, index: usize) -> JabioResult<()> {
    let tree = self.tree()?;
    self.require("AccessibleSelection", |info| info.accessible_selection)?;
    tree.gateway.remove_selection(&self.handle, index)
  }

  pub fn clear_selection(&self) -> JabioResult<()> {
    let tree = self.tree()?;
    self.require("AccessibleSelection", |info| info.accessible_selection)?;
    tree.gateway.clear_selection(&self.handle)
  }

  pub fn select_all(&self) -> JabioResult<()> {
    let tree = self.tree()?;
    self.require("AccessibleSelection", |info| info.accessible_selection)?;
    tree.gateway.select_all(&self.handle)
  }

  // ---------------------------------------------------------------------------
  // Locator dump
  // ---------------------------------------------------------------------------

  /// One line per node of this subtree, pre-order, in the form
  ///
  /// ```text
  /// | | role:push button and name:OK and description: and indexInParent:2
  /// ```
  ///
  /// with one `"| "` per level below the tree root. Children are fetched as
  /// needed. A child that loops back to an ancestor is not listed.
  pub fn locator_text(self: &Arc<Self>) -> JabioResult<String> {
    let tree = self.tree()?;
    tree.sync();

    let mut lines = Vec::new();
    let mut visited = HashSet::new();
    let mut stack = vec![Arc::clone(self)];
    while let Some(node) = stack.pop() {
      if !visited.insert(node.id) {
        continue;
      }
      let info = node.info_unsynced()?;
      lines.push(format!(
        "{}role:{} and name:{} and description:{} and indexInParent:{}",
        "| ".repeat(node.depth),
        info.role,
        info.name,
        info.description,
        info.index_in_parent
      ));
      let children = tree.children_of(&node, false)?;
      stack.extend(
        children
          .into_iter()
          .rev()
          .filter(|child| child.depth > node.depth),
      );
    }
    Ok(lines.join("\n"))
  }
}
