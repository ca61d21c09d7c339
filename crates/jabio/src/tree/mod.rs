/*!
Cached accessible-context tree for one Java window.

# Module Structure

- `mod.rs` - `ContextTree`, shared tree state, event application, child fetch
- `node.rs` - `ContextNode` (one cached context: handle, property bag, actions)
- `links.rs` - `NodeLinks` for parent/child relationships
- `tests.rs` - cache behaviour against a scripted bridge

# Consistency

Children are fetched on first access. A `StructuralChange` for a node whose
children are cached marks them stale; the next access re-fetches and
reconciles by object identity, reusing nodes that are still there (with their
cached subtrees) and evicting the rest. Property changes mark single fields
stale. Events are applied in arrival order, lazily, before every read that
could observe them.

Bridge calls are never made under the state lock. `fetch_lock` serializes the
code paths that mutate the cache (event application, child re-fetch, property
refresh) so handles cannot be evicted under them.
*/

mod links;
mod node;

pub use node::ContextNode;

use crate::dispatch::{Dispatcher, Subscription};
use crate::gateway::Gateway;
use crate::handle::HandleRef;
use crate::search::{self, Predicate, SearchElement, SearchResults};
use crate::types::{
  BridgeEvent, ContextInfo, ContextRef, JabioError, JabioResult, JavaWindow, NodeId, Point,
};
use links::NodeLinks;
use node::Field;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// How far `focused` climbs looking for a cached ancestor.
const MAX_FOCUS_CLIMB: usize = 64;

#[derive(Default)]
struct TreeState {
  nodes: HashMap<NodeId, Arc<ContextNode>>,
  by_ref: HashMap<ContextRef, NodeId>,
  links: NodeLinks,
  /// Nodes whose cached children no longer match the remote tree.
  pending_invalidations: HashSet<NodeId>,
}

impl TreeState {
  fn insert(&mut self, node: Arc<ContextNode>) {
    self.by_ref.insert(node.handle().raw(), node.id());
    self.nodes.insert(node.id(), node);
  }

  fn cached_children(&self, id: NodeId) -> Vec<Arc<ContextNode>> {
    self
      .links
      .children(id)
      .iter()
      .filter_map(|c| self.nodes.get(c).cloned())
      .collect()
  }
}

/// State shared between a [`ContextTree`] and its nodes (which hold it weakly).
pub(crate) struct TreeShared {
  gateway: Gateway,
  dispatcher: Dispatcher,
  window: JavaWindow,
  state: RwLock<TreeState>,
  fetch_lock: Mutex<()>,
  events: Subscription,
}

/// Result of matching one freshly fetched child reference.
enum Slot {
  /// Same object as a cached node: keep that node.
  Cached(NodeId),
  /// A new object, with its property bag.
  Fresh(HandleRef, ContextInfo),
}

impl TreeShared {
  fn contains(&self, id: NodeId) -> bool {
    self.state.read().nodes.contains_key(&id)
  }

  fn parent_of(&self, id: NodeId) -> Option<Arc<ContextNode>> {
    let state = self.state.read();
    state
      .links
      .parent(id)
      .and_then(|p| state.nodes.get(&p).cloned())
  }

  pub(crate) fn sync(&self) {
    let _fetch = self.fetch_lock.lock();
    self.sync_locked();
  }

  /// Apply every event delivered so far. Caller holds `fetch_lock`.
  fn sync_locked(&self) {
    self.dispatcher.flush();
    let events: Vec<BridgeEvent> = self.events.try_iter().collect();
    for event in &events {
      self.apply(event);
    }
  }

  fn apply(&self, event: &BridgeEvent) {
    match event {
      BridgeEvent::StructuralChange { parent } => {
        if let Some(node) = self.find(parent, true) {
          log::debug!("children of node {} invalidated", node.id());
          self.state.write().pending_invalidations.insert(node.id());
        }
      }
      BridgeEvent::PropertyChanged {
        source, property, ..
      } => {
        let Some(field) = Field::for_property(property) else {
          return;
        };
        if let Some(node) = self.find(source, false) {
          log::debug!("node {}: {property:?} invalidated", node.id());
          node.mark_stale(field);
        }
      }
      _ => {}
    }
  }

  /// Cached node for a remote reference: exact reference first, then object
  /// identity. With `fetched_only`, only nodes whose children are cached are
  /// considered. Unknown and evicted objects yield `None`.
  fn find(&self, handle: &HandleRef, fetched_only: bool) -> Option<Arc<ContextNode>> {
    let candidates: Vec<Arc<ContextNode>> = {
      let state = self.state.read();
      if let Some(node) = state
        .by_ref
        .get(&handle.raw())
        .and_then(|id| state.nodes.get(id))
      {
        return Some(Arc::clone(node));
      }
      state
        .nodes
        .values()
        .filter(|n| !fetched_only || state.links.is_fetched(n.id()))
        .cloned()
        .collect()
    };
    candidates
      .into_iter()
      .find(|node| self.gateway.is_same(node.handle(), handle).unwrap_or(false))
  }

  /// Children of `node`, re-fetching if never fetched or invalidated.
  pub(crate) fn children_of(
    self: &Arc<Self>,
    node: &ContextNode,
    sync: bool,
  ) -> JabioResult<Vec<Arc<ContextNode>>> {
    let _fetch = self.fetch_lock.lock();
    if sync {
      self.sync_locked();
    }
    {
      let state = self.state.read();
      if !state.nodes.contains_key(&node.id()) {
        return Err(JabioError::InvalidHandle);
      }
      if state.links.is_fetched(node.id()) && !state.pending_invalidations.contains(&node.id()) {
        return Ok(state.cached_children(node.id()));
      }
    }
    self.refetch_children(node)?;
    Ok(self.state.read().cached_children(node.id()))
  }

  /// Fetch the children list from the bridge and reconcile it with the cache.
  /// On any bridge failure the cache is left as it was.
  fn refetch_children(self: &Arc<Self>, node: &ContextNode) -> JabioResult<()> {
    let count = self.gateway.child_count(node.handle())?;

    let (previous, ancestors) = {
      let state = self.state.read();
      let previous = state.cached_children(node.id());
      let mut ancestors = Vec::new();
      let mut current = Some(node.id());
      while let Some(id) = current {
        if let Some(n) = state.nodes.get(&id) {
          ancestors.push(Arc::clone(n));
        }
        current = state.links.parent(id);
      }
      (previous, ancestors)
    };

    let mut claimed = HashSet::new();
    let mut slots = Vec::with_capacity(count);
    for index in 0..count {
      let handle = self.gateway.child_at(node.handle(), index)?;
      let slot = self.match_child(handle, index, &previous, &ancestors, &mut claimed)?;
      slots.push(slot);
    }

    self.commit_children(node, slots)
  }

  fn match_child(
    &self,
    handle: HandleRef,
    index: usize,
    previous: &[Arc<ContextNode>],
    ancestors: &[Arc<ContextNode>],
    claimed: &mut HashSet<NodeId>,
  ) -> JabioResult<Slot> {
    let known = self.state.read().by_ref.get(&handle.raw()).copied();
    if let Some(id) = known {
      claimed.insert(id);
      return Ok(Slot::Cached(id));
    }

    // Previous child at the same index first: the common case is "unchanged".
    let preferred = previous.get(index).map(|n| n.id());
    let mut candidates: Vec<&Arc<ContextNode>> = previous.get(index).into_iter().collect();
    candidates.extend(previous.iter().filter(|n| Some(n.id()) != preferred));
    for candidate in candidates {
      if claimed.contains(&candidate.id()) {
        continue;
      }
      if self.gateway.is_same(candidate.handle(), &handle)? {
        claimed.insert(candidate.id());
        return Ok(Slot::Cached(candidate.id()));
      }
    }

    let info = self.gateway.context_info(&handle)?;
    // Only ancestors with the same role can be the same object.
    for ancestor in ancestors {
      let same_role = ancestor.cached_info().role_en_us == info.role_en_us;
      if same_role && self.gateway.is_same(ancestor.handle(), &handle)? {
        log::debug!("child {index} is ancestor node {}", ancestor.id());
        return Ok(Slot::Cached(ancestor.id()));
      }
    }
    Ok(Slot::Fresh(handle, info))
  }

  fn commit_children(self: &Arc<Self>, node: &ContextNode, slots: Vec<Slot>) -> JabioResult<()> {
    let mut state = self.state.write();
    if !state.nodes.contains_key(&node.id()) {
      return Err(JabioError::InvalidHandle);
    }

    let mut children = Vec::with_capacity(slots.len());
    let mut adopted = HashSet::new();
    for slot in slots {
      match slot {
        Slot::Cached(id) => {
          if state.links.owns(node.id(), id) {
            adopted.insert(id);
          }
          children.push(id);
        }
        Slot::Fresh(handle, info) => {
          let child = Arc::new(ContextNode::new(
            handle,
            info,
            node.depth() + 1,
            Arc::downgrade(self),
          ));
          adopted.insert(child.id());
          children.push(child.id());
          state.insert(child);
        }
      }
    }

    let kept: HashSet<NodeId> = children.iter().copied().collect();
    let dropped: Vec<NodeId> = state
      .links
      .children(node.id())
      .iter()
      .filter(|c| !kept.contains(*c) && state.links.owns(node.id(), **c))
      .copied()
      .collect();

    state.links.set_children(node.id(), children, &adopted);
    state.pending_invalidations.remove(&node.id());

    let mut evicted = Vec::new();
    for root in dropped {
      for id in state.links.remove_subtree(root) {
        if let Some(gone) = state.nodes.remove(&id) {
          state.by_ref.remove(&gone.handle().raw());
          state.pending_invalidations.remove(&id);
          evicted.push(gone);
        }
      }
    }
    if !evicted.is_empty() {
      let ids: HashSet<NodeId> = evicted.iter().map(|n| n.id()).collect();
      for holder in state.links.unlink(&ids) {
        state.pending_invalidations.insert(holder);
      }
    }
    drop(state);

    if !evicted.is_empty() {
      log::debug!("node {}: evicted {} stale nodes", node.id(), evicted.len());
    }
    for gone in evicted {
      gone.handle().gateway().release_if_live(gone.handle());
    }
    Ok(())
  }
}

impl Drop for TreeShared {
  fn drop(&mut self) {
    let state = std::mem::take(&mut *self.state.write());
    let released = state.nodes.len();
    for node in state.nodes.values() {
      node.handle().gateway().release_if_live(node.handle());
    }
    log::debug!("tree for '{}' torn down ({released} nodes)", self.window.title);
  }
}

/// A cached view of one Java window's accessibility tree.
///
/// Dropping the tree releases every remote reference its nodes hold; nodes
/// kept alive by the caller then fail with `InvalidHandle`.
pub struct ContextTree {
  shared: Arc<TreeShared>,
  root: Arc<ContextNode>,
}

impl std::fmt::Debug for ContextTree {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ContextTree")
      .field("window", &self.shared.window.title)
      .field("nodes", &self.node_count())
      .finish_non_exhaustive()
  }
}

impl ContextTree {
  /// Attach to `window`: fetch its root context and the root's property bag.
  /// Children stay unfetched. On failure nothing is left behind.
  pub(crate) fn build(
    gateway: &Gateway,
    dispatcher: &Dispatcher,
    window: JavaWindow,
  ) -> JabioResult<Self> {
    // Subscribe before fetching so no change after the fetch is missed.
    let events = dispatcher.subscribe(Some(Box::new(|event: &BridgeEvent| {
      matches!(
        event,
        BridgeEvent::StructuralChange { .. } | BridgeEvent::PropertyChanged { .. }
      )
    })));
    let handle = gateway.root_context(&window)?;
    let info = gateway.context_info(&handle)?;

    let shared = Arc::new(TreeShared {
      gateway: gateway.clone(),
      dispatcher: dispatcher.clone(),
      window,
      state: RwLock::new(TreeState::default()),
      fetch_lock: Mutex::new(()),
      events,
    });
    let root = Arc::new(ContextNode::new(handle, info, 0, Arc::downgrade(&shared)));
    shared.state.write().insert(Arc::clone(&root));
    log::debug!(
      "attached to '{}' (root node {})",
      shared.window.title,
      root.id()
    );
    Ok(Self { shared, root })
  }

  pub const fn root(&self) -> &Arc<ContextNode> {
    &self.root
  }

  pub fn window(&self) -> &JavaWindow {
    &self.shared.window
  }

  /// Number of cached nodes.
  pub fn node_count(&self) -> usize {
    self.shared.state.read().nodes.len()
  }

  /// Cached node by id.
  pub fn get(&self, id: NodeId) -> Option<Arc<ContextNode>> {
    self.shared.state.read().nodes.get(&id).cloned()
  }

  /// Apply every event delivered so far. Reads do this on their own; call it
  /// to bound how long invalidations stay queued.
  pub fn sync(&self) {
    self.shared.sync();
  }

  /// All nodes matching `predicate`, pre-order, down to `max_depth` levels
  /// below the root.
  pub fn search<P: Predicate + ?Sized>(
    &self,
    predicate: &P,
    max_depth: Option<usize>,
  ) -> JabioResult<SearchResults> {
    search::search(&self.root, predicate, max_depth)
  }

  pub fn search_first<P: Predicate + ?Sized>(
    &self,
    predicate: &P,
    max_depth: Option<usize>,
  ) -> JabioResult<Option<Arc<ContextNode>>> {
    search::search_first(&self.root, predicate, max_depth)
  }

  /// Text dump of the whole cached-or-fetched tree, one line per node. See
  /// [`ContextNode::locator_text`].
  pub fn locator_text(&self) -> JabioResult<String> {
    self.root.locator_text()
  }

  /// Every node matching a [`SearchElement`].
  pub fn find_all(&self, element: &SearchElement) -> JabioResult<Vec<Arc<ContextNode>>> {
    Ok(self.search(element, None)?.into_nodes())
  }

  /// The node with keyboard focus, materializing the path to it if needed.
  /// `None` if the focused context is outside this window.
  pub fn focused(&self) -> JabioResult<Option<Arc<ContextNode>>> {
    let shared = &self.shared;
    shared.sync();
    let focused = shared.gateway.focused_context(&shared.window)?;
    if let Some(node) = shared.find(&focused, false) {
      return Ok(Some(node));
    }

    // Climb until a cached ancestor, then walk back down through children().
    let mut path = vec![focused];
    let mut anchor = None;
    while path.len() <= MAX_FOCUS_CLIMB {
      let Some(top) = path.last() else { break };
      let Some(parent) = shared.gateway.parent(top)? else {
        break;
      };
      if let Some(node) = shared.find(&parent, false) {
        anchor = Some(node);
        break;
      }
      path.push(parent);
    }
    let Some(mut current) = anchor else {
      return Ok(None);
    };

    for wanted in path.iter().rev() {
      let next = current
        .children()?
        .into_iter()
        .find(|child| shared.gateway.is_same(child.handle(), wanted).unwrap_or(false));
      match next {
        Some(child) => current = child,
        None => return Ok(None),
      }
    }
    Ok(Some(current))
  }

  /// Deepest cached-or-fetched node whose bounds contain `point`.
  pub fn node_at(&self, point: Point) -> JabioResult<Option<Arc<ContextNode>>> {
    if !self.root.info()?.bounds.contains(point) {
      return Ok(None);
    }
    let mut current = Arc::clone(&self.root);
    let mut visited = HashSet::from([current.id()]);
    loop {
      let mut next = None;
      // Later siblings paint on top.
      for child in current.children()?.into_iter().rev() {
        if !visited.contains(&child.id()) && child.info()?.bounds.contains(point) {
          next = Some(child);
          break;
        }
      }
      match next {
        Some(child) => {
          visited.insert(child.id());
          current = child;
        }
        None => return Ok(Some(current)),
      }
    }
  }
}
