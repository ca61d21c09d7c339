/*!
The raw call surface of the Java Access Bridge library.

`Bridge` is deliberately reference-level: it moves plain [`ContextRef`]
values and knows nothing about ownership. Ownership, generation checks and
idempotent registration live one layer up in the gateway.

Every method that returns a `ContextRef` hands the caller a NEW remote
reference that must eventually be passed to [`Bridge::release`].
*/

#[cfg(windows)]
pub(crate) mod native;
#[cfg(windows)]
pub mod pump;

#[cfg(test)]
pub(crate) mod fake;

use crate::callbacks::CallbackRegistry;
use crate::types::{
  ContextInfo, ContextRef, EventCategory, JabioResult, JavaWindow, TextInfo, TextItems,
  TextSelection,
};
use std::sync::Arc;

/// Typed mirror of the bridge library's functions.
///
/// Implementations must be callable from any thread except from inside one
/// of their own callbacks.
pub trait Bridge: Send + Sync {
  /// Top-level windows that host a Java VM.
  fn windows(&self) -> JabioResult<Vec<JavaWindow>>;

  /// Root accessible context of a window.
  fn root_context(&self, window: &JavaWindow) -> JabioResult<ContextRef>;

  /// Context that currently has keyboard focus inside `window`.
  fn focused_context(&self, window: &JavaWindow) -> JabioResult<ContextRef>;

  fn context_info(&self, ctx: ContextRef) -> JabioResult<ContextInfo>;

  fn child_at(&self, ctx: ContextRef, index: i32) -> JabioResult<ContextRef>;

  /// Parent of `ctx`, or a null reference for a root.
  fn parent(&self, ctx: ContextRef) -> JabioResult<ContextRef>;

  /// Whether two references point at the same Java object.
  fn is_same_object(&self, a: ContextRef, b: ContextRef) -> bool;

  fn release(&self, ctx: ContextRef);

  fn visible_children_count(&self, ctx: ContextRef) -> JabioResult<i32>;

  /// Up to one batch of visible children starting at `start`.
  fn visible_children(&self, ctx: ContextRef, start: i32) -> JabioResult<Vec<ContextRef>>;

  fn virtual_name(&self, ctx: ContextRef) -> JabioResult<String>;

  fn request_focus(&self, ctx: ContextRef) -> JabioResult<()>;

  /// Names of the actions the context supports.
  fn actions(&self, ctx: ContextRef) -> JabioResult<Vec<String>>;

  fn do_actions(&self, ctx: ContextRef, actions: &[String]) -> JabioResult<()>;

  fn set_text_contents(&self, ctx: ContextRef, text: &str) -> JabioResult<()>;

  /// Character counts, with `index_at_point` probed at `(x, y)`.
  fn text_info(&self, ctx: ContextRef, x: i32, y: i32) -> JabioResult<TextInfo>;

  fn text_items(&self, ctx: ContextRef, index: i32) -> JabioResult<TextItems>;

  fn text_selection(&self, ctx: ContextRef) -> JabioResult<TextSelection>;

  /// Text between two character indices, both inclusive.
  fn text_range(&self, ctx: ContextRef, start: i32, end: i32) -> JabioResult<String>;

  fn current_value(&self, ctx: ContextRef) -> JabioResult<String>;

  fn minimum_value(&self, ctx: ContextRef) -> JabioResult<String>;

  fn maximum_value(&self, ctx: ContextRef) -> JabioResult<String>;

  /// Number of selected children.
  fn selection_count(&self, ctx: ContextRef) -> JabioResult<i32>;

  fn is_child_selected(&self, ctx: ContextRef, index: i32) -> JabioResult<bool>;

  /// Add the child at `index` to the selection.
  fn add_selection(&self, ctx: ContextRef, index: i32) -> JabioResult<()>;

  fn remove_selection(&self, ctx: ContextRef, index: i32) -> JabioResult<()>;

  fn clear_selection(&self, ctx: ContextRef) -> JabioResult<()>;

  fn select_all(&self, ctx: ContextRef) -> JabioResult<()>;

  /// Install (`enabled`) or remove the trampoline for one category.
  fn set_listener(&self, category: EventCategory, enabled: bool) -> JabioResult<()>;

  /// Where trampolines forward decoded arguments. `None` detaches.
  fn set_event_sink(&self, sink: Option<Arc<CallbackRegistry>>);

  /// Tear down process-wide library state. Called once, at shutdown.
  fn shutdown(&self) {}
}
