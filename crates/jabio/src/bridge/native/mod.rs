/*!
The real bridge: `WindowsAccessBridge-64.dll` loaded with `libloading`.

# Module Structure

- `mod.rs` - `NativeBridge`, library loading, `Bridge` impl
- `api.rs` - `#[repr(C)]` records and the resolved function table
- `trampolines.rs` - `extern "C"` callbacks and their registration
- `desktop.rs` - top-level window enumeration

The library keeps process-wide state, so only one `NativeBridge` may be loaded
at a time.
*/

#![allow(unsafe_code)]

mod api;
mod desktop;
mod trampolines;

use super::Bridge;
use crate::callbacks::CallbackRegistry;
use crate::types::{
  ContextInfo, ContextRef, EventCategory, JabioError, JabioResult, JavaWindow, ObjectRef,
  TextInfo, TextItems, TextSelection, VmId,
};
use api::{Api, JObject, MAX_STRING_SIZE, SHORT_STRING_SIZE};
use libloading::Library;
use std::ffi::{c_int, c_long, c_short};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Environment variable naming the bridge library.
pub(crate) const LIBRARY_ENV: &str = "RC_JAVA_ACCESS_BRIDGE_DLL";

/// Set while a `NativeBridge` is loaded.
static LOADED: AtomicBool = AtomicBool::new(false);

pub(crate) struct NativeBridge {
  api: Api,
  active: AtomicBool,
}

impl std::fmt::Debug for NativeBridge {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("NativeBridge")
      .field("active", &self.active.load(Ordering::Relaxed))
      .finish_non_exhaustive()
  }
}

fn call_failed<T>(operation: &'static str) -> JabioResult<T> {
  Err(JabioError::call_failed(operation))
}

fn vm(ctx: ContextRef) -> c_long {
  ctx.vm_id.0
}

fn obj(ctx: ContextRef) -> i64 {
  ctx.object.0
}

type ValueFn = unsafe extern "C" fn(c_long, JObject, *mut u16, c_short) -> windows::core::BOOL;
type SelectionFn = unsafe extern "C" fn(c_long, JObject);

impl NativeBridge {
  /// Load the library from `path`, else from `RC_JAVA_ACCESS_BRIDGE_DLL`, and
  /// start it.
  pub(crate) fn load(path: Option<PathBuf>) -> JabioResult<Self> {
    let path = match path {
      Some(path) => path,
      None => std::env::var_os(LIBRARY_ENV)
        .map(PathBuf::from)
        .ok_or_else(|| JabioError::LibraryNotFound(format!("{LIBRARY_ENV} is not set")))?,
    };
    if !path.is_file() {
      return Err(JabioError::LibraryNotFound(path.display().to_string()));
    }
    if LOADED.swap(true, Ordering::AcqRel) {
      return Err(JabioError::AlreadyInitialized);
    }

    match Self::open(&path) {
      Ok(bridge) => Ok(bridge),
      Err(e) => {
        LOADED.store(false, Ordering::Release);
        Err(e)
      }
    }
  }

  fn open(path: &std::path::Path) -> JabioResult<Self> {
    log::debug!("loading {}", path.display());
    // SAFETY: the library's initializers only set up its own state.
    let library = unsafe { Library::new(path) }
      .map_err(|e| JabioError::LibraryLoad(format!("{}: {e}", path.display())))?;
    let api = Api::resolve(library)?;
    // SAFETY: no arguments; starts the library's message-window machinery.
    unsafe { (api.windows_run)() };
    log::debug!("bridge library started");
    Ok(Self {
      api,
      active: AtomicBool::new(true),
    })
  }

  fn ensure_active(&self) -> JabioResult<()> {
    if self.active.load(Ordering::Acquire) {
      Ok(())
    } else {
      Err(JabioError::BridgeNotInitialized)
    }
  }

  fn window_context(
    &self,
    operation: &'static str,
    window: &JavaWindow,
    call: unsafe extern "C" fn(
      windows::Win32::Foundation::HWND,
      *mut c_long,
      *mut i64,
    ) -> windows::core::BOOL,
  ) -> JabioResult<ContextRef> {
    self.ensure_active()?;
    let mut vm_id: c_long = 0;
    let mut object: i64 = 0;
    // SAFETY: both out pointers are valid for the call.
    let ok = unsafe { call(desktop::hwnd(window), &mut vm_id, &mut object) };
    if !ok.as_bool() {
      return call_failed(operation);
    }
    Ok(ContextRef::new(VmId(vm_id), ObjectRef(object)))
  }

  fn value_string(
    &self,
    operation: &'static str,
    ctx: ContextRef,
    call: ValueFn,
  ) -> JabioResult<String> {
    self.ensure_active()?;
    let mut buf = vec![0u16; SHORT_STRING_SIZE];
    let len = c_short::try_from(buf.len()).unwrap_or(c_short::MAX);
    // SAFETY: `buf` holds `len` writable units.
    if !unsafe { call(vm(ctx), obj(ctx), buf.as_mut_ptr(), len) }.as_bool() {
      return call_failed(operation);
    }
    Ok(api::from_wide(&buf))
  }

  fn selection_call(&self, ctx: ContextRef, call: SelectionFn) -> JabioResult<()> {
    self.ensure_active()?;
    // SAFETY: plain value arguments.
    unsafe { call(vm(ctx), obj(ctx)) };
    Ok(())
  }
}

impl Drop for NativeBridge {
  fn drop(&mut self) {
    self.shutdown();
  }
}

impl Bridge for NativeBridge {
  fn windows(&self) -> JabioResult<Vec<JavaWindow>> {
    self.ensure_active()?;
    desktop::java_windows(&self.api)
  }

  fn root_context(&self, window: &JavaWindow) -> JabioResult<ContextRef> {
    self.window_context(
      "getAccessibleContextFromHWND",
      window,
      self.api.context_from_hwnd,
    )
  }

  fn focused_context(&self, window: &JavaWindow) -> JabioResult<ContextRef> {
    self.window_context(
      "getAccessibleContextWithFocus",
      window,
      self.api.context_with_focus,
    )
  }

  fn context_info(&self, ctx: ContextRef) -> JabioResult<ContextInfo> {
    self.ensure_active()?;
    let mut raw = api::zeroed::<api::AccessibleContextInfo>();
    // SAFETY: `raw` is a valid, writable record.
    let ok = unsafe { (self.api.context_info)(vm(ctx), obj(ctx), &mut *raw) };
    if !ok.as_bool() {
      return call_failed("getAccessibleContextInfo");
    }
    Ok(ContextInfo::from(&*raw))
  }

  fn child_at(&self, ctx: ContextRef, index: i32) -> JabioResult<ContextRef> {
    self.ensure_active()?;
    // SAFETY: plain value arguments.
    let child = unsafe { (self.api.child_from_context)(vm(ctx), obj(ctx), index) };
    Ok(ContextRef::new(ctx.vm_id, ObjectRef(child)))
  }

  fn parent(&self, ctx: ContextRef) -> JabioResult<ContextRef> {
    self.ensure_active()?;
    // SAFETY: plain value arguments.
    let parent = unsafe { (self.api.parent_from_context)(vm(ctx), obj(ctx)) };
    Ok(ContextRef::new(ctx.vm_id, ObjectRef(parent)))
  }

  fn is_same_object(&self, a: ContextRef, b: ContextRef) -> bool {
    if self.ensure_active().is_err() {
      return false;
    }
    // SAFETY: plain value arguments.
    unsafe { (self.api.is_same_object)(vm(a), obj(a), obj(b)) }.as_bool()
  }

  fn release(&self, ctx: ContextRef) {
    if ctx.is_null() || !self.active.load(Ordering::Acquire) {
      return;
    }
    // SAFETY: the caller owns `ctx` and never uses it again.
    unsafe { (self.api.release_java_object)(vm(ctx), obj(ctx)) };
  }

  fn visible_children_count(&self, ctx: ContextRef) -> JabioResult<i32> {
    self.ensure_active()?;
    // SAFETY: plain value arguments.
    let count = unsafe { (self.api.visible_children_count)(vm(ctx), obj(ctx)) };
    if count < 0 {
      return Err(JabioError::BridgeCallFailed {
        operation: "getVisibleChildrenCount",
        native_code: count,
      });
    }
    Ok(count)
  }

  fn visible_children(&self, ctx: ContextRef, start: i32) -> JabioResult<Vec<ContextRef>> {
    self.ensure_active()?;
    let mut info = api::zeroed::<api::VisibleChildrenInfo>();
    // SAFETY: `info` is a valid, writable record.
    let ok = unsafe { (self.api.visible_children)(vm(ctx), obj(ctx), start, &mut *info) };
    if !ok.as_bool() {
      return call_failed("getVisibleChildren");
    }
    let count = usize::try_from(info.count)
      .unwrap_or(0)
      .min(api::MAX_VISIBLE_CHILDREN);
    Ok(
      info
        .children
        .iter()
        .take(count)
        .map(|child| ContextRef::new(ctx.vm_id, ObjectRef(*child)))
        .collect(),
    )
  }

  fn virtual_name(&self, ctx: ContextRef) -> JabioResult<String> {
    self.ensure_active()?;
    let mut buf = vec![0u16; MAX_STRING_SIZE];
    let len = c_int::try_from(buf.len()).unwrap_or(c_int::MAX);
    // SAFETY: `buf` holds `len` writable units.
    let ok = unsafe { (self.api.virtual_name)(vm(ctx), obj(ctx), buf.as_mut_ptr(), len) };
    if !ok.as_bool() {
      return call_failed("getVirtualAccessibleName");
    }
    Ok(api::from_wide(&buf))
  }

  fn request_focus(&self, ctx: ContextRef) -> JabioResult<()> {
    self.ensure_active()?;
    // SAFETY: plain value arguments.
    if unsafe { (self.api.request_focus)(vm(ctx), obj(ctx)) }.as_bool() {
      Ok(())
    } else {
      call_failed("requestFocus")
    }
  }

  fn actions(&self, ctx: ContextRef) -> JabioResult<Vec<String>> {
    self.ensure_active()?;
    let mut actions = api::zeroed::<api::AccessibleActions>();
    // SAFETY: `actions` is a valid, writable record.
    let ok = unsafe { (self.api.actions)(vm(ctx), obj(ctx), &mut *actions) };
    if !ok.as_bool() {
      return call_failed("getAccessibleActions");
    }
    Ok(actions.names())
  }

  fn do_actions(&self, ctx: ContextRef, actions: &[String]) -> JabioResult<()> {
    self.ensure_active()?;
    let mut todo = api::zeroed::<api::AccessibleActionsToDo>();
    todo.fill(actions)?;
    let mut failure: c_int = -1;
    // SAFETY: `todo` is a filled record; `failure` is a valid out pointer.
    let ok = unsafe { (self.api.do_actions)(vm(ctx), obj(ctx), &*todo, &mut failure) };
    if ok.as_bool() {
      return Ok(());
    }
    let failed = usize::try_from(failure)
      .ok()
      .and_then(|i| actions.get(i))
      .cloned()
      .unwrap_or_else(|| actions.join(","));
    Err(JabioError::ActionFailed {
      action: failed,
      reason: format!("doAccessibleActions failed at index {failure}"),
    })
  }

  fn set_text_contents(&self, ctx: ContextRef, text: &str) -> JabioResult<()> {
    self.ensure_active()?;
    let wide = api::to_wide(text);
    // SAFETY: `wide` is NUL-terminated and outlives the call.
    if unsafe { (self.api.set_text_contents)(vm(ctx), obj(ctx), wide.as_ptr()) }.as_bool() {
      Ok(())
    } else {
      call_failed("setTextContents")
    }
  }

  fn text_info(&self, ctx: ContextRef, x: i32, y: i32) -> JabioResult<TextInfo> {
    self.ensure_active()?;
    let mut info = api::zeroed::<api::AccessibleTextInfo>();
    // SAFETY: `info` is a valid, writable record.
    let ok = unsafe { (self.api.text_info)(vm(ctx), obj(ctx), &mut *info, x, y) };
    if !ok.as_bool() {
      return call_failed("getAccessibleTextInfo");
    }
    Ok(TextInfo::from(&*info))
  }

  fn text_items(&self, ctx: ContextRef, index: i32) -> JabioResult<TextItems> {
    self.ensure_active()?;
    let mut items = api::zeroed::<api::AccessibleTextItemsInfo>();
    // SAFETY: `items` is a valid, writable record.
    let ok = unsafe { (self.api.text_items)(vm(ctx), obj(ctx), &mut *items, index) };
    if !ok.as_bool() {
      return call_failed("getAccessibleTextItems");
    }
    Ok(TextItems::from(&*items))
  }

  fn text_selection(&self, ctx: ContextRef) -> JabioResult<TextSelection> {
    self.ensure_active()?;
    let mut selection = api::zeroed::<api::AccessibleTextSelectionInfo>();
    // SAFETY: `selection` is a valid, writable record.
    let ok = unsafe { (self.api.text_selection)(vm(ctx), obj(ctx), &mut *selection) };
    if !ok.as_bool() {
      return call_failed("getAccessibleTextSelectionInfo");
    }
    Ok(TextSelection::from(&*selection))
  }

  fn text_range(&self, ctx: ContextRef, start: i32, end: i32) -> JabioResult<String> {
    self.ensure_active()?;
    let limit = usize::try_from(c_short::MAX).unwrap_or(MAX_STRING_SIZE);
    let wanted = usize::try_from(end.saturating_sub(start)).unwrap_or(0) + 2;
    let mut buf = vec![0u16; wanted.min(limit)];
    let len = c_short::try_from(buf.len()).unwrap_or(c_short::MAX);
    // SAFETY: `buf` holds `len` writable units.
    let ok =
      unsafe { (self.api.text_range)(vm(ctx), obj(ctx), start, end, buf.as_mut_ptr(), len) };
    if !ok.as_bool() {
      return call_failed("getAccessibleTextRange");
    }
    Ok(api::from_wide(&buf))
  }

  fn current_value(&self, ctx: ContextRef) -> JabioResult<String> {
    self.value_string("getCurrentAccessibleValueFromContext", ctx, self.api.current_value)
  }

  fn minimum_value(&self, ctx: ContextRef) -> JabioResult<String> {
    self.value_string("getMinimumAccessibleValueFromContext", ctx, self.api.minimum_value)
  }

  fn maximum_value(&self, ctx: ContextRef) -> JabioResult<String> {
    self.value_string("getMaximumAccessibleValueFromContext", ctx, self.api.maximum_value)
  }

  fn selection_count(&self, ctx: ContextRef) -> JabioResult<i32> {
    self.ensure_active()?;
    // SAFETY: plain value arguments.
    let count = unsafe { (self.api.selection_count)(vm(ctx), obj(ctx)) };
    if count < 0 {
      return Err(JabioError::BridgeCallFailed {
        operation: "getAccessibleSelectionCountFromContext",
        native_code: count,
      });
    }
    Ok(count)
  }

  fn is_child_selected(&self, ctx: ContextRef, index: i32) -> JabioResult<bool> {
    self.ensure_active()?;
    // SAFETY: plain value arguments.
    Ok(unsafe { (self.api.is_child_selected)(vm(ctx), obj(ctx), index) }.as_bool())
  }

  fn add_selection(&self, ctx: ContextRef, index: i32) -> JabioResult<()> {
    self.ensure_active()?;
    // SAFETY: plain value arguments.
    unsafe { (self.api.add_selection)(vm(ctx), obj(ctx), index) };
    Ok(())
  }

  fn remove_selection(&self, ctx: ContextRef, index: i32) -> JabioResult<()> {
    self.ensure_active()?;
    // SAFETY: plain value arguments.
    unsafe { (self.api.remove_selection)(vm(ctx), obj(ctx), index) };
    Ok(())
  }

  fn clear_selection(&self, ctx: ContextRef) -> JabioResult<()> {
    self.selection_call(ctx, self.api.clear_selection)
  }

  fn select_all(&self, ctx: ContextRef) -> JabioResult<()> {
    self.selection_call(ctx, self.api.select_all)
  }

  fn set_listener(&self, category: EventCategory, enabled: bool) -> JabioResult<()> {
    self.ensure_active()?;
    trampolines::install(&self.api, category, enabled);
    Ok(())
  }

  fn set_event_sink(&self, sink: Option<Arc<CallbackRegistry>>) {
    trampolines::set_sink(sink);
  }

  fn shutdown(&self) {
    if !self.active.swap(false, Ordering::AcqRel) {
      return;
    }
    for category in EventCategory::ALL {
      trampolines::install(&self.api, category, false);
    }
    trampolines::set_sink(None);
    LOADED.store(false, Ordering::Release);
    log::debug!("bridge library stopped");
  }
}
