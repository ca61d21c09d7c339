/*!
Ordered event delivery.

The pump thread is the producer: [`Dispatcher::enqueue`] stamps the event with
a sequence number and pushes it on an unbounded channel, which never blocks.
One worker thread fans each event out, in order, to every subscriber's own
unbounded channel. A slow subscriber therefore only grows its own backlog.

Handles that travel with an event but belong to nobody (the callback's event
object, child references) are dropped by the worker after fan-out, which
releases them off the pump thread.
*/

use crate::handle::HandleRef;
use crate::types::{BridgeEvent, JabioError, JabioResult, SubscriptionId};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

/// Subscriber-side event predicate. Runs on the dispatcher thread.
pub type EventFilter = Box<dyn Fn(&BridgeEvent) -> bool + Send + Sync>;

/// Default queue depth at which a backpressure warning is logged.
pub(crate) const DEFAULT_WARN_THRESHOLD: usize = 10_000;

struct Queued {
  seq: u64,
  event: BridgeEvent,
  retained: Vec<HandleRef>,
}

enum Msg {
  Event(Queued),
  Flush(Sender<()>),
  Stop,
}

struct Subscriber {
  /// First sequence number this subscriber may see.
  start_seq: u64,
  filter: Option<EventFilter>,
  tx: Sender<BridgeEvent>,
}

impl Subscriber {
  fn accepts(&self, id: SubscriptionId, event: &BridgeEvent) -> bool {
    let Some(filter) = &self.filter else {
      return true;
    };
    catch_unwind(AssertUnwindSafe(|| filter(event))).unwrap_or_else(|_| {
      log::error!("event filter of subscription {id} panicked; event skipped");
      false
    })
  }
}

struct Shared {
  subscribers: Mutex<HashMap<SubscriptionId, Subscriber>>,
  next_seq: AtomicU64,
  depth: AtomicUsize,
  warn_threshold: usize,
  over_threshold: AtomicBool,
}

impl Shared {
  fn deliver(&self, queued: Queued) {
    let Queued {
      seq,
      event,
      retained,
    } = queued;

    {
      let subscribers = self.subscribers.lock();
      for (id, sub) in subscribers.iter() {
        if seq < sub.start_seq || !sub.accepts(*id, &event) {
          continue;
        }
        if sub.tx.send(event.clone()).is_err() {
          log::debug!("subscription {id} receiver is gone");
        }
      }
    }

    // Release unclaimed handles outside the subscriber lock.
    drop(event);
    drop(retained);

    let depth = self.depth.fetch_sub(1, Ordering::AcqRel).saturating_sub(1);
    if depth < self.warn_threshold / 2 {
      self.over_threshold.store(false, Ordering::Relaxed);
    }
  }
}

/// The publish point between the pump thread and everything else.
#[derive(Clone)]
pub(crate) struct Dispatcher {
  inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
  shared: Arc<Shared>,
  tx: Sender<Msg>,
  worker: Mutex<Option<JoinHandle<()>>>,
  closed: AtomicBool,
}

impl std::fmt::Debug for Dispatcher {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Dispatcher")
      .field("depth", &self.queue_depth())
      .finish_non_exhaustive()
  }
}

impl Dispatcher {
  pub(crate) fn new(warn_threshold: usize) -> JabioResult<Self> {
    let shared = Arc::new(Shared {
      subscribers: Mutex::new(HashMap::new()),
      next_seq: AtomicU64::new(0),
      depth: AtomicUsize::new(0),
      warn_threshold: warn_threshold.max(1),
      over_threshold: AtomicBool::new(false),
    });
    let (tx, rx) = crossbeam_channel::unbounded();

    let worker_shared = Arc::clone(&shared);
    let worker = std::thread::Builder::new()
      .name("jabio-dispatch".to_owned())
      .spawn(move || run(&worker_shared, &rx))
      .map_err(|e| JabioError::Internal(format!("failed to spawn dispatcher: {e}")))?;

    Ok(Self {
      inner: Arc::new(DispatcherInner {
        shared,
        tx,
        worker: Mutex::new(Some(worker)),
        closed: AtomicBool::new(false),
      }),
    })
  }

  /// Queue an event. Never blocks; safe to call from the pump thread.
  ///
  /// `retained` handles are released once the event has been fanned out.
  pub(crate) fn enqueue(&self, event: BridgeEvent, retained: Vec<HandleRef>) {
    if self.inner.closed.load(Ordering::Acquire) {
      return;
    }
    let shared = &self.inner.shared;
    let seq = shared.next_seq.fetch_add(1, Ordering::SeqCst);
    let depth = shared.depth.fetch_add(1, Ordering::AcqRel) + 1;
    if depth >= shared.warn_threshold && !shared.over_threshold.swap(true, Ordering::Relaxed) {
      log::warn!(
        "event queue depth {depth} reached {}; subscribers are falling behind",
        shared.warn_threshold
      );
    }

    let msg = Msg::Event(Queued {
      seq,
      event,
      retained,
    });
    if self.inner.tx.send(msg).is_err() {
      shared.depth.fetch_sub(1, Ordering::AcqRel);
      log::debug!("dispatcher stopped; event {seq} dropped");
    }
  }

  /// Subscribe to every event enqueued from now on that passes `filter`.
  pub(crate) fn subscribe(&self, filter: Option<EventFilter>) -> Subscription {
    let (tx, rx) = crossbeam_channel::unbounded();
    let id = SubscriptionId::new();
    let shared = &self.inner.shared;

    if !self.inner.closed.load(Ordering::Acquire) {
      // Reading the sequence under the subscriber lock orders this against
      // the worker: any event it has already delivered has a lower number.
      let mut subscribers = shared.subscribers.lock();
      let start_seq = shared.next_seq.load(Ordering::SeqCst);
      subscribers.insert(
        id,
        Subscriber {
          start_seq,
          filter,
          tx,
        },
      );
      log::debug!("subscription {id} starts at event {start_seq}");
    }

    Subscription {
      id,
      rx,
      shared: Arc::downgrade(shared),
    }
  }

  pub(crate) fn unsubscribe(&self, id: SubscriptionId) -> bool {
    self.inner.shared.subscribers.lock().remove(&id).is_some()
  }

  /// Events enqueued but not yet fanned out.
  pub(crate) fn queue_depth(&self) -> usize {
    self.inner.shared.depth.load(Ordering::Acquire)
  }

  /// Block until every event enqueued before this call has been fanned out.
  ///
  /// Must not be called from an event filter.
  pub(crate) fn flush(&self) {
    if self.inner.closed.load(Ordering::Acquire) {
      return;
    }
    let (done_tx, done_rx) = crossbeam_channel::bounded(1);
    if self.inner.tx.send(Msg::Flush(done_tx)).is_ok() {
      let _ = done_rx.recv();
    }
  }

  /// Deliver what is queued, stop the worker and disconnect subscribers.
  pub(crate) fn close(&self) {
    self.inner.close();
  }
}

impl DispatcherInner {
  fn close(&self) {
    if self.closed.swap(true, Ordering::AcqRel) {
      return;
    }
    let _ = self.tx.send(Msg::Stop);
    if let Some(worker) = self.worker.lock().take() {
      if worker.thread().id() == std::thread::current().id() {
        log::error!("dispatcher closed from its own worker thread");
      } else if worker.join().is_err() {
        log::error!("dispatcher worker panicked");
      }
    }
    self.shared.subscribers.lock().clear();
    log::debug!("dispatcher closed");
  }
}

impl Drop for DispatcherInner {
  fn drop(&mut self) {
    self.close();
  }
}

fn run(shared: &Shared, rx: &Receiver<Msg>) {
  for msg in rx {
    match msg {
      Msg::Event(queued) => shared.deliver(queued),
      Msg::Flush(done) => {
        let _ = done.send(());
      }
      Msg::Stop => break,
    }
  }
}

/// A stream of events for one subscriber. Dropping it unsubscribes.
///
/// Events arrive in the order the bridge raised them. After the dispatcher is
/// closed the stream ends once its backlog is drained.
pub struct Subscription {
  id: SubscriptionId,
  rx: Receiver<BridgeEvent>,
  shared: Weak<Shared>,
}

impl Subscription {
  pub const fn id(&self) -> SubscriptionId {
    self.id
  }

  /// Wait for the next event. `None` once the dispatcher is closed and drained.
  pub fn recv(&self) -> Option<BridgeEvent> {
    self.rx.recv().ok()
  }

  pub fn try_recv(&self) -> Option<BridgeEvent> {
    self.rx.try_recv().ok()
  }

  pub fn recv_timeout(&self, timeout: Duration) -> Option<BridgeEvent> {
    match self.rx.recv_timeout(timeout) {
      Ok(event) => Some(event),
      Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
    }
  }

  /// Blocking iterator; ends when the dispatcher closes.
  pub fn iter(&self) -> impl Iterator<Item = BridgeEvent> + '_ {
    self.rx.iter()
  }

  /// Everything already delivered, without blocking.
  pub fn try_iter(&self) -> impl Iterator<Item = BridgeEvent> + '_ {
    self.rx.try_iter()
  }

  /// Delivered but unread events.
  pub fn len(&self) -> usize {
    self.rx.len()
  }

  pub fn is_empty(&self) -> bool {
    self.rx.is_empty()
  }
}

impl Drop for Subscription {
  fn drop(&mut self) {
    if let Some(shared) = self.shared.upgrade() {
      shared.subscribers.lock().remove(&self.id);
    }
  }
}

impl std::fmt::Debug for Subscription {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Subscription")
      .field("id", &self.id)
      .field("backlog", &self.rx.len())
      .finish_non_exhaustive()
  }
}
