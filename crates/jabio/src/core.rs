/*!
The `Jabio` instance: one loaded bridge, its callback registrations and the
event dispatcher.

# Example

```ignore
let jabio = Jabio::builder()
    .library_path(r"C:\Program Files\Java\jre\bin\WindowsAccessBridge-64.dll")
    .queue_warn_threshold(1_000)
    .build()?;

let tree = jabio.attach("Calculator")?;
let events = jabio.subscribe();
```
*/

use crate::bridge::Bridge;
use crate::callbacks::CallbackRegistry;
use crate::dispatch::{Dispatcher, EventFilter, Subscription, DEFAULT_WARN_THRESHOLD};
use crate::gateway::Gateway;
use crate::tree::ContextTree;
use crate::types::{BridgeEvent, EventCategory, JabioError, JabioResult, JavaWindow};
use std::path::PathBuf;
use std::sync::Arc;

/// Handle to an initialized bridge.
///
/// Clone is cheap (one Arc bump). When the last clone is dropped the bridge is
/// shut down as if [`Jabio::shutdown`] had been called; trees still alive at
/// that point fail with `BridgeNotInitialized`.
#[derive(Clone)]
pub struct Jabio {
  inner: Arc<JabioInner>,
}

struct JabioInner {
  gateway: Gateway,
  dispatcher: Dispatcher,
}

impl Drop for JabioInner {
  fn drop(&mut self) {
    if self.gateway.is_initialized() {
      if let Err(e) = self.gateway.shutdown() {
        log::warn!("shutdown on drop failed: {e}");
      }
    }
    self.dispatcher.close();
  }
}

impl std::fmt::Debug for Jabio {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Jabio")
      .field("initialized", &self.inner.gateway.is_initialized())
      .field("registered", &self.registered())
      .finish_non_exhaustive()
  }
}

/// Builder for configuring a [`Jabio`] instance.
///
/// # Example
///
/// ```ignore
/// let jabio = Jabio::builder()
///     .categories(&[EventCategory::FocusGained, EventCategory::PropertyNameChange])
///     .build()?;
/// ```
#[derive(Clone)]
#[must_use = "Builder does nothing until .build() is called"]
pub struct JabioBuilder {
  library_path: Option<PathBuf>,
  categories: Vec<EventCategory>,
  queue_warn_threshold: usize,
  bridge: Option<Arc<dyn Bridge>>,
}

impl Default for JabioBuilder {
  fn default() -> Self {
    Self {
      library_path: None,
      categories: EventCategory::ALL.to_vec(),
      queue_warn_threshold: DEFAULT_WARN_THRESHOLD,
      bridge: None,
    }
  }
}

impl std::fmt::Debug for JabioBuilder {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("JabioBuilder")
      .field("library_path", &self.library_path)
      .field("categories", &self.categories)
      .field("queue_warn_threshold", &self.queue_warn_threshold)
      .field("injected_bridge", &self.bridge.is_some())
      .finish()
  }
}

impl JabioBuilder {
  /// Path of the bridge library. Default: the `RC_JAVA_ACCESS_BRIDGE_DLL`
  /// environment variable.
  pub fn library_path(mut self, path: impl Into<PathBuf>) -> Self {
    self.library_path = Some(path.into());
    self
  }

  /// Callback categories to register at startup. Default: all of them.
  pub fn categories(mut self, categories: &[EventCategory]) -> Self {
    self.categories = categories.to_vec();
    self
  }

  /// Queue depth at which a backpressure warning is logged. Default: 10 000.
  pub const fn queue_warn_threshold(mut self, depth: usize) -> Self {
    self.queue_warn_threshold = depth;
    self
  }

  /// Use `bridge` instead of loading the native library.
  pub fn with_bridge(mut self, bridge: Arc<dyn Bridge>) -> Self {
    self.bridge = Some(bridge);
    self
  }

  /// Load the bridge, start the dispatcher and register the configured
  /// callback categories.
  #[must_use = "dropping the instance shuts the bridge down"]
  pub fn build(self) -> JabioResult<Jabio> {
    let bridge = match self.bridge {
      Some(bridge) => bridge,
      None => native_bridge(self.library_path)?,
    };
    let dispatcher = Dispatcher::new(self.queue_warn_threshold)?;
    let gateway = Gateway::new(bridge);
    let registry = CallbackRegistry::new(gateway.downgrade(), dispatcher.clone());
    gateway.set_event_sink(Some(Arc::new(registry)));

    let jabio = Jabio {
      inner: Arc::new(JabioInner {
        gateway,
        dispatcher,
      }),
    };
    // On failure `jabio` drops here and tears down what was registered.
    for category in self.categories {
      jabio.register(category)?;
    }
    log::debug!("bridge initialized ({} categories)", jabio.registered().len());
    Ok(jabio)
  }
}

#[cfg(windows)]
fn native_bridge(path: Option<PathBuf>) -> JabioResult<Arc<dyn Bridge>> {
  Ok(Arc::new(crate::bridge::native::NativeBridge::load(path)?))
}

#[cfg(not(windows))]
fn native_bridge(_path: Option<PathBuf>) -> JabioResult<Arc<dyn Bridge>> {
  Err(JabioError::NotSupported(
    "the Java Access Bridge is only available on Windows".to_owned(),
  ))
}

/// Initialize the bridge with default options.
///
/// Fails with `AlreadyInitialized` if the native library is already loaded by
/// this process.
pub fn initialize() -> JabioResult<Jabio> {
  Jabio::builder().build()
}

impl Jabio {
  pub fn builder() -> JabioBuilder {
    JabioBuilder::default()
  }

  /// Titles of the Java windows currently open.
  pub fn list_windows(&self) -> JabioResult<Vec<String>> {
    Ok(self.windows()?.into_iter().map(|w| w.title).collect())
  }

  pub fn windows(&self) -> JabioResult<Vec<JavaWindow>> {
    self.inner.gateway.windows()
  }

  /// Attach to the Java window titled `title` (exact title first, then the
  /// first title starting with it).
  pub fn attach(&self, title: &str) -> JabioResult<ContextTree> {
    let windows = self.windows()?;
    let window = JavaWindow::select(&windows, title)
      .cloned()
      .ok_or_else(|| JabioError::WindowNotFound(title.to_owned()))?;
    self.attach_window(window)
  }

  /// Attach to the first Java window owned by process `pid`.
  pub fn attach_pid(&self, pid: u32) -> JabioResult<ContextTree> {
    let window = self
      .windows()?
      .into_iter()
      .find(|w| w.pid == pid)
      .ok_or_else(|| JabioError::WindowNotFound(format!("pid {pid}")))?;
    self.attach_window(window)
  }

  /// Attach to a window from [`Jabio::windows`].
  pub fn attach_window(&self, window: JavaWindow) -> JabioResult<ContextTree> {
    ContextTree::build(&self.inner.gateway, &self.inner.dispatcher, window)
  }

  /// Every event raised from now on.
  pub fn subscribe(&self) -> Subscription {
    self.inner.dispatcher.subscribe(None)
  }

  /// Events raised from now on that pass `filter`.
  ///
  /// `filter` runs on the dispatcher thread; a panicking filter drops that
  /// one event for this subscriber.
  pub fn subscribe_filtered<F>(&self, filter: F) -> Subscription
  where
    F: Fn(&BridgeEvent) -> bool + Send + Sync + 'static,
  {
    let filter: EventFilter = Box::new(filter);
    self.inner.dispatcher.subscribe(Some(filter))
  }

  /// Start delivering `category`. Registering twice is a no-op.
  pub fn register(&self, category: EventCategory) -> JabioResult<()> {
    self.inner.gateway.register(category)
  }

  /// Stop delivering `category`. Unregistering twice is a no-op.
  pub fn unregister(&self, category: EventCategory) -> JabioResult<()> {
    self.inner.gateway.unregister(category)
  }

  pub fn registered(&self) -> Vec<EventCategory> {
    self.inner.gateway.registered()
  }

  /// Events received from the bridge but not yet delivered to subscribers.
  pub fn queue_depth(&self) -> usize {
    self.inner.dispatcher.queue_depth()
  }

  /// Unregister every callback, release every remote reference exactly once
  /// and unload the bridge. Subscriptions end after draining what was already
  /// queued. A second call fails with `BridgeNotInitialized`.
  pub fn shutdown(&self) -> JabioResult<()> {
    self.inner.gateway.shutdown()?;
    self.inner.dispatcher.close();
    log::debug!("bridge shut down");
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::bridge::fake::FakeBridge;
  use std::time::Duration;

  fn calculator() -> (Arc<FakeBridge>, Jabio) {
    let fake = FakeBridge::new();
    let root = fake.add_window("Calculator - Standard", 4242, "frame");
    fake.add_child(root, "push button", "1");
    fake.add_child(root, "push button", "2");
    fake.add_child(root, "edit", "display");
    fake.add_window("Notepad Java", 17, "frame");
    let jabio = Jabio::builder().with_bridge(fake.clone()).build().unwrap();
    (fake, jabio)
  }

  #[test]
  fn build_registers_every_category() {
    let (fake, jabio) = calculator();
    assert_eq!(jabio.registered().len(), EventCategory::ALL.len());
    assert_eq!(fake.listener_calls().len(), EventCategory::ALL.len());
    assert!(fake.has_sink());
  }

  #[test]
  fn build_with_selected_categories() {
    let fake = FakeBridge::new();
    let jabio = Jabio::builder()
      .with_bridge(fake.clone())
      .categories(&[EventCategory::FocusGained])
      .queue_warn_threshold(5)
      .build()
      .unwrap();
    assert_eq!(jabio.registered(), vec![EventCategory::FocusGained]);
  }

  #[test]
  fn failed_registration_tears_down() {
    let fake = FakeBridge::new();
    fake.fail("setListener");
    let result = Jabio::builder().with_bridge(fake.clone()).build();
    assert!(matches!(result, Err(JabioError::BridgeCallFailed { .. })));
    assert!(fake.is_shut_down());
    assert!(!fake.has_sink());
  }

  #[cfg(not(windows))]
  #[test]
  fn native_bridge_is_windows_only() {
    assert!(matches!(initialize(), Err(JabioError::NotSupported(_))));
  }

  #[test]
  fn lists_windows() {
    let (_fake, jabio) = calculator();
    assert_eq!(
      jabio.list_windows().unwrap(),
      vec!["Calculator - Standard", "Notepad Java"]
    );
    let pids: Vec<u32> = jabio.windows().unwrap().iter().map(|w| w.pid).collect();
    assert_eq!(pids, vec![4242, 17]);
  }

  #[test]
  fn attach_by_title_prefix_and_pid() {
    let (_fake, jabio) = calculator();
    let tree = jabio.attach("Calculator").unwrap();
    assert_eq!(tree.window().title, "Calculator - Standard");
    assert_eq!(tree.root().children().unwrap().len(), 3);

    let tree = jabio.attach_pid(17).unwrap();
    assert_eq!(tree.window().title, "Notepad Java");

    assert!(matches!(
      jabio.attach("Paint"),
      Err(JabioError::WindowNotFound(_))
    ));
    assert!(matches!(
      jabio.attach_pid(1),
      Err(JabioError::WindowNotFound(_))
    ));
  }

  #[test]
  fn calculator_edit_field_search() {
    let (_fake, jabio) = calculator();
    let tree = jabio.attach("Calculator - Standard").unwrap();
    let edits = tree
      .find_all(&crate::SearchElement::new().role("edit"))
      .unwrap();
    assert_eq!(edits.len(), 1);
    assert_eq!(edits[0].name().unwrap(), "display");
  }

  #[test]
  fn subscribers_receive_events() {
    let (fake, jabio) = calculator();
    let all = jabio.subscribe();
    let focus_only =
      jabio.subscribe_filtered(|e| matches!(e, BridgeEvent::FocusGained { .. }));

    fake.fire_mouse_clicked(2);
    fake.fire_focus_gained(4);

    let first = all.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(first.kind(), "mouse_clicked");
    let second = all.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(matches!(second, BridgeEvent::FocusGained { .. }));
    let only = focus_only.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(matches!(only, BridgeEvent::FocusGained { .. }));
    assert!(focus_only.try_recv().is_none());
  }

  #[test]
  fn unregistered_category_is_not_listened_for() {
    let (fake, jabio) = calculator();
    jabio.unregister(EventCategory::MouseClicked).unwrap();
    jabio.unregister(EventCategory::MouseClicked).unwrap();
    assert!(!jabio.registered().contains(&EventCategory::MouseClicked));
    assert_eq!(
      fake
        .listener_calls()
        .iter()
        .filter(|c| **c == (EventCategory::MouseClicked, false))
        .count(),
      1
    );
    jabio.register(EventCategory::MouseClicked).unwrap();
    assert!(jabio.registered().contains(&EventCategory::MouseClicked));
  }

  #[test]
  fn shutdown_releases_and_ends_streams() {
    let (fake, jabio) = calculator();
    let tree = jabio.attach("Calculator").unwrap();
    let kids = tree.root().children().unwrap();
    let events = jabio.subscribe();
    fake.fire_focus_gained(2);

    jabio.shutdown().unwrap();
    assert_eq!(fake.outstanding(), 0);
    assert!(fake.is_shut_down());
    assert!(jabio.registered().is_empty());
    assert!(matches!(
      kids[0].request_focus(),
      Err(JabioError::BridgeNotInitialized)
    ));
    assert!(matches!(
      jabio.windows(),
      Err(JabioError::BridgeNotInitialized)
    ));
    assert!(matches!(
      jabio.shutdown(),
      Err(JabioError::BridgeNotInitialized)
    ));

    // The queued focus event is still delivered, then the stream ends.
    assert_eq!(events.iter().count(), 1);
    assert_eq!(jabio.queue_depth(), 0);

    drop(kids);
    drop(tree);
    assert_eq!(fake.bad_releases(), 0);
  }

  #[test]
  fn dropping_the_last_clone_shuts_down() {
    let (fake, jabio) = calculator();
    let clone = jabio.clone();
    drop(jabio);
    assert!(!fake.is_shut_down());
    drop(clone);
    assert!(fake.is_shut_down());
    assert_eq!(fake.outstanding(), 0);
  }
}
