/*!
Typed gateway over the bridge library.

The gateway is the only place raw references turn into owned
[`HandleRef`]s and back. It keeps:

- the process-wide "initialized" flag (cleared once, by `shutdown`)
- the live table `generation -> raw reference` used to catch use after release
- the set of callback categories with an installed trampoline

No gateway lock is held across a bridge call, except the registration lock,
which only serializes the library's `set*FP` setters.
*/

use crate::bridge::Bridge;
use crate::callbacks::CallbackRegistry;
use crate::handle::HandleRef;
use crate::types::{
  AccessibleValue, ContextInfo, ContextRef, EventCategory, JabioError, JabioResult, JavaWindow,
  TextInfo, TextItems, TextSelection,
};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Cheap to clone; all clones share one bridge and one live table.
#[derive(Clone)]
pub(crate) struct Gateway {
  inner: Arc<GatewayInner>,
}

/// Non-owning gateway reference, held by the callback registry so the
/// bridge -> registry -> gateway -> bridge loop never keeps itself alive.
#[derive(Clone)]
pub(crate) struct WeakGateway(Weak<GatewayInner>);

struct GatewayInner {
  bridge: Arc<dyn Bridge>,
  initialized: AtomicBool,
  live: Mutex<HashMap<u64, ContextRef>>,
  next_generation: AtomicU64,
  listening: Mutex<BTreeSet<EventCategory>>,
}

impl std::fmt::Debug for Gateway {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Gateway")
      .field("initialized", &self.is_initialized())
      .field("live", &self.live_count())
      .finish_non_exhaustive()
  }
}

impl std::fmt::Debug for WeakGateway {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("WeakGateway").finish_non_exhaustive()
  }
}

impl WeakGateway {
  pub(crate) fn upgrade(&self) -> Option<Gateway> {
    self.0.upgrade().map(|inner| Gateway { inner })
  }
}

impl Gateway {
  pub(crate) fn new(bridge: Arc<dyn Bridge>) -> Self {
    Self {
      inner: Arc::new(GatewayInner {
        bridge,
        initialized: AtomicBool::new(true),
        live: Mutex::new(HashMap::new()),
        next_generation: AtomicU64::new(1),
        listening: Mutex::new(BTreeSet::new()),
      }),
    }
  }

  pub(crate) fn downgrade(&self) -> WeakGateway {
    WeakGateway(Arc::downgrade(&self.inner))
  }

  fn bridge(&self) -> &dyn Bridge {
    self.inner.bridge.as_ref()
  }

  pub(crate) fn is_initialized(&self) -> bool {
    self.inner.initialized.load(Ordering::Acquire)
  }

  fn ensure_initialized(&self) -> JabioResult<()> {
    if self.is_initialized() {
      Ok(())
    } else {
      Err(JabioError::BridgeNotInitialized)
    }
  }

  /// Number of remote references currently owned through this gateway.
  pub(crate) fn live_count(&self) -> usize {
    self.inner.live.lock().len()
  }

  // ---------------------------------------------------------------------------
  // Ownership
  // ---------------------------------------------------------------------------

  /// Take ownership of a reference the bridge just handed out.
  pub(crate) fn adopt(&self, raw: ContextRef) -> HandleRef {
    let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
    self.inner.live.lock().insert(generation, raw);
    HandleRef::new(raw, generation, self.clone())
  }

  /// Adopt a returned reference, treating null as a failed call.
  fn adopt_returned(&self, operation: &'static str, raw: ContextRef) -> JabioResult<HandleRef> {
    if raw.is_null() {
      return Err(JabioError::call_failed(operation));
    }
    Ok(self.adopt(raw))
  }

  /// Raw reference behind a handle, if it is still live.
  fn resolve(&self, handle: &HandleRef) -> JabioResult<ContextRef> {
    self.ensure_initialized()?;
    match self.inner.live.lock().get(&handle.generation()) {
      Some(raw) if *raw == handle.raw() => Ok(*raw),
      _ => Err(JabioError::InvalidHandle),
    }
  }

  pub(crate) fn is_live(&self, handle: &HandleRef) -> bool {
    self.resolve(handle).is_ok()
  }

  /// Explicit release. A second release is a lifecycle bug: it is logged and
  /// reported, and never reaches the bridge.
  pub(crate) fn release(&self, handle: &HandleRef) -> JabioResult<()> {
    self.ensure_initialized()?;
    let removed = self.inner.live.lock().remove(&handle.generation());
    if let Some(raw) = removed {
      self.bridge().release(raw);
      Ok(())
    } else {
      log::error!(
        "release of {} (generation {}) which was already released",
        handle.raw(),
        handle.generation()
      );
      Err(JabioError::InvalidHandle)
    }
  }

  /// Release on drop. Handles already released (explicitly or by shutdown)
  /// are skipped.
  pub(crate) fn release_if_live(&self, handle: &HandleRef) {
    let removed = self.inner.live.lock().remove(&handle.generation());
    if let Some(raw) = removed {
      self.bridge().release(raw);
    }
  }

  // ---------------------------------------------------------------------------
  // Typed calls
  // ---------------------------------------------------------------------------

  pub(crate) fn windows(&self) -> JabioResult<Vec<JavaWindow>> {
    self.ensure_initialized()?;
    self.bridge().windows()
  }

  pub(crate) fn root_context(&self, window: &JavaWindow) -> JabioResult<HandleRef> {
    self.ensure_initialized()?;
    let raw = self.bridge().root_context(window)?;
    self.adopt_returned("getAccessibleContextFromHWND", raw)
  }

  pub(crate) fn focused_context(&self, window: &JavaWindow) -> JabioResult<HandleRef> {
    self.ensure_initialized()?;
    let raw = self.bridge().focused_context(window)?;
    self.adopt_returned("getAccessibleContextWithFocus", raw)
  }

  pub(crate) fn context_info(&self, handle: &HandleRef) -> JabioResult<ContextInfo> {
    let raw = self.resolve(handle)?;
    self.bridge().context_info(raw)
  }

  pub(crate) fn child_count(&self, handle: &HandleRef) -> JabioResult<usize> {
    Ok(self.context_info(handle)?.child_count())
  }

  pub(crate) fn child_at(&self, handle: &HandleRef, index: usize) -> JabioResult<HandleRef> {
    let raw = self.resolve(handle)?;
    let child = self.bridge().child_at(raw, index_arg(index)?)?;
    self.adopt_returned("getAccessibleChildFromContext", child)
  }

  pub(crate) fn parent(&self, handle: &HandleRef) -> JabioResult<Option<HandleRef>> {
    let raw = self.resolve(handle)?;
    let parent = self.bridge().parent(raw)?;
    Ok((!parent.is_null()).then(|| self.adopt(parent)))
  }

  /// Identity check. Identical raw references short-circuit without a bridge
  /// call; different VMs never compare equal.
  pub(crate) fn is_same(&self, a: &HandleRef, b: &HandleRef) -> JabioResult<bool> {
    let ra = self.resolve(a)?;
    let rb = self.resolve(b)?;
    if ra == rb {
      return Ok(true);
    }
    if ra.vm_id != rb.vm_id {
      return Ok(false);
    }
    Ok(self.bridge().is_same_object(ra, rb))
  }

  pub(crate) fn visible_children_count(&self, handle: &HandleRef) -> JabioResult<usize> {
    let raw = self.resolve(handle)?;
    let count = self.bridge().visible_children_count(raw)?;
    usize::try_from(count).map_err(|_| JabioError::BridgeCallFailed {
      operation: "getVisibleChildrenCount",
      native_code: count,
    })
  }

  /// All visible children, fetched in as many batches as the bridge needs.
  pub(crate) fn visible_children(&self, handle: &HandleRef) -> JabioResult<Vec<HandleRef>> {
    let total = self.visible_children_count(handle)?;
    let raw = self.resolve(handle)?;
    let mut out = Vec::with_capacity(total);
    while out.len() < total {
      let start = i32::try_from(out.len())
        .map_err(|_| JabioError::Internal("visible child index out of range".to_owned()))?;
      let batch = self.bridge().visible_children(raw, start)?;
      if batch.is_empty() {
        break;
      }
      out.extend(
        batch
          .into_iter()
          .filter(|c| !c.is_null())
          .map(|c| self.adopt(c)),
      );
    }
    Ok(out)
  }

  pub(crate) fn virtual_name(&self, handle: &HandleRef) -> JabioResult<String> {
    let raw = self.resolve(handle)?;
    self.bridge().virtual_name(raw)
  }

  pub(crate) fn request_focus(&self, handle: &HandleRef) -> JabioResult<()> {
    let raw = self.resolve(handle)?;
    self.bridge().request_focus(raw)
  }

  pub(crate) fn actions(&self, handle: &HandleRef) -> JabioResult<Vec<String>> {
    let raw = self.resolve(handle)?;
    self.bridge().actions(raw)
  }

  pub(crate) fn do_actions(&self, handle: &HandleRef, actions: &[String]) -> JabioResult<()> {
    let raw = self.resolve(handle)?;
    self.bridge().do_actions(raw, actions)
  }

  pub(crate) fn set_text_contents(&self, handle: &HandleRef, text: &str) -> JabioResult<()> {
    let raw = self.resolve(handle)?;
    self.bridge().set_text_contents(raw, text)
  }

  pub(crate) fn text_info(&self, handle: &HandleRef, x: i32, y: i32) -> JabioResult<TextInfo> {
    let raw = self.resolve(handle)?;
    self.bridge().text_info(raw, x, y)
  }

  pub(crate) fn text_items(&self, handle: &HandleRef, index: usize) -> JabioResult<TextItems> {
    let raw = self.resolve(handle)?;
    self.bridge().text_items(raw, index_arg(index)?)
  }

  pub(crate) fn text_selection(&self, handle: &HandleRef) -> JabioResult<TextSelection> {
    let raw = self.resolve(handle)?;
    self.bridge().text_selection(raw)
  }

  /// Characters `start..=end`.
  pub(crate) fn text_range(
    &self,
    handle: &HandleRef,
    start: usize,
    end: usize,
  ) -> JabioResult<String> {
    let raw = self.resolve(handle)?;
    self.bridge().text_range(raw, index_arg(start)?, index_arg(end)?)
  }

  pub(crate) fn value(&self, handle: &HandleRef) -> JabioResult<AccessibleValue> {
    let raw = self.resolve(handle)?;
    Ok(AccessibleValue {
      current: self.bridge().current_value(raw)?,
      minimum: self.bridge().minimum_value(raw)?,
      maximum: self.bridge().maximum_value(raw)?,
    })
  }

  pub(crate) fn selection_count(&self, handle: &HandleRef) -> JabioResult<usize> {
    let raw = self.resolve(handle)?;
    let count = self.bridge().selection_count(raw)?;
    usize::try_from(count).map_err(|_| JabioError::BridgeCallFailed {
      operation: "getAccessibleSelectionCountFromContext",
      native_code: count,
    })
  }

  pub(crate) fn is_child_selected(&self, handle: &HandleRef, index: usize) -> JabioResult<bool> {
    let raw = self.resolve(handle)?;
    self.bridge().is_child_selected(raw, index_arg(index)?)
  }

  pub(crate) fn add_selection(&self, handle: &HandleRef, index: usize) -> JabioResult<()> {
    let raw = self.resolve(handle)?;
    self.bridge().add_selection(raw, index_arg(index)?)
  }

  pub(crate) fn remove_selection(&self, handle: &HandleRef, index: usize) -> JabioResult<()> {
    let raw = self.resolve(handle)?;
    self.bridge().remove_selection(raw, index_arg(index)?)
  }

  pub(crate) fn clear_selection(&self, handle: &HandleRef) -> JabioResult<()> {
    let raw = self.resolve(handle)?;
    self.bridge().clear_selection(raw)
  }

  pub(crate) fn select_all(&self, handle: &HandleRef) -> JabioResult<()> {
    let raw = self.resolve(handle)?;
    self.bridge().select_all(raw)
  }

  // ---------------------------------------------------------------------------
  // Callback registration
  // ---------------------------------------------------------------------------

  pub(crate) fn set_event_sink(&self, sink: Option<Arc<CallbackRegistry>>) {
    self.bridge().set_event_sink(sink);
  }

  /// Install the trampoline for `category`. Registering twice is a no-op.
  pub(crate) fn register(&self, category: EventCategory) -> JabioResult<()> {
    self.ensure_initialized()?;
    let mut listening = self.inner.listening.lock();
    if listening.contains(&category) {
      return Ok(());
    }
    self.bridge().set_listener(category, true)?;
    listening.insert(category);
    log::debug!("listening for {category}");
    Ok(())
  }

  /// Remove the trampoline for `category`. Unregistering twice is a no-op.
  pub(crate) fn unregister(&self, category: EventCategory) -> JabioResult<()> {
    self.ensure_initialized()?;
    let mut listening = self.inner.listening.lock();
    if !listening.contains(&category) {
      return Ok(());
    }
    self.bridge().set_listener(category, false)?;
    listening.remove(&category);
    log::debug!("stopped listening for {category}");
    Ok(())
  }

  pub(crate) fn registered(&self) -> Vec<EventCategory> {
    self.inner.listening.lock().iter().copied().collect()
  }

  /// Unregister every trampoline, detach the registry, release every live
  /// reference and shut the library down. Later calls fail with
  /// `BridgeNotInitialized`.
  pub(crate) fn shutdown(&self) -> JabioResult<()> {
    if !self.inner.initialized.swap(false, Ordering::AcqRel) {
      return Err(JabioError::BridgeNotInitialized);
    }

    let categories = std::mem::take(&mut *self.inner.listening.lock());
    for category in categories {
      if let Err(e) = self.bridge().set_listener(category, false) {
        log::warn!("failed to remove {category} listener during shutdown: {e}");
      }
    }
    self.bridge().set_event_sink(None);

    let live = std::mem::take(&mut *self.inner.live.lock());
    log::debug!("shutdown: releasing {} live references", live.len());
    for raw in live.into_values() {
      self.bridge().release(raw);
    }

    self.bridge().shutdown();
    Ok(())
  }
}

fn index_arg(index: usize) -> JabioResult<i32> {
  i32::try_from(index).map_err(|_| JabioError::Internal(format!("index {index} out of range")))
}
