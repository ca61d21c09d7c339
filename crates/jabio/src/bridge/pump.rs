/*!
Window-message pumping for the thread that initialized the bridge.

The bridge library talks to Java VMs through hidden windows owned by the
thread that called `initialize`. Callbacks only arrive while that thread
dispatches its messages, so an application either runs [`run_until`] on it or
calls [`pump_pending`] from its own loop.
*/

#![allow(unsafe_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use windows::Win32::UI::WindowsAndMessaging::{
  DispatchMessageW, PeekMessageW, TranslateMessage, MSG, PM_REMOVE,
};

/// Dispatch every message queued for the calling thread. Returns how many
/// were dispatched.
pub fn pump_pending() -> usize {
  let mut msg = MSG::default();
  let mut dispatched = 0;
  // SAFETY: `msg` is a valid out record for the calling thread's queue.
  unsafe {
    while PeekMessageW(&mut msg, None, 0, 0, PM_REMOVE).as_bool() {
      let _ = TranslateMessage(&msg);
      DispatchMessageW(&msg);
      dispatched += 1;
    }
  }
  dispatched
}

/// Pump messages until `stop` is set, sleeping `idle` when the queue is empty.
pub fn run_until(stop: &AtomicBool, idle: Duration) {
  log::debug!("message pump started");
  while !stop.load(Ordering::Relaxed) {
    if pump_pending() == 0 {
      std::thread::sleep(idle);
    }
  }
  log::debug!("message pump stopped");
}
