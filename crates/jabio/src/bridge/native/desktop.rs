/*! Top-level window enumeration. */

use super::api::Api;
use crate::types::{JabioError, JabioResult, JavaWindow};
use windows::core::BOOL;
use windows::Win32::Foundation::{HWND, LPARAM};
use windows::Win32::UI::WindowsAndMessaging::{
  EnumWindows, GetWindowTextLengthW, GetWindowTextW, GetWindowThreadProcessId,
};

struct Scan<'a> {
  api: &'a Api,
  found: Vec<JavaWindow>,
}

/// Every top-level window the bridge reports as hosting a Java VM.
pub(super) fn java_windows(api: &Api) -> JabioResult<Vec<JavaWindow>> {
  let mut scan = Scan {
    api,
    found: Vec::new(),
  };
  // SAFETY: `scan` outlives the synchronous enumeration.
  unsafe { EnumWindows(Some(visit), LPARAM(std::ptr::from_mut(&mut scan) as isize)) }.map_err(
    |e| JabioError::BridgeCallFailed {
      operation: "EnumWindows",
      native_code: e.code().0,
    },
  )?;
  log::debug!("found {} java windows", scan.found.len());
  Ok(scan.found)
}

unsafe extern "system" fn visit(hwnd: HWND, lparam: LPARAM) -> BOOL {
  let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
    // SAFETY: `lparam` is the `Scan` passed by `java_windows`.
    let scan = unsafe { &mut *(lparam.0 as *mut Scan<'_>) };
    // SAFETY: plain query on a handle the system just enumerated.
    if !unsafe { (scan.api.is_java_window)(hwnd) }.as_bool() {
      return;
    }
    let title = window_title(hwnd);
    let mut pid = 0u32;
    // SAFETY: `pid` is a valid out pointer.
    unsafe { GetWindowThreadProcessId(hwnd, Some(&mut pid)) };
    log::debug!("java window '{title}' (pid {pid})");
    scan.found.push(JavaWindow {
      title,
      pid,
      hwnd: hwnd.0 as isize,
    });
  }));
  if outcome.is_err() {
    log::error!("panic while enumerating windows");
  }
  BOOL(1)
}

fn window_title(hwnd: HWND) -> String {
  // SAFETY: read-only queries into a buffer sized from the reported length.
  unsafe {
    let len = usize::try_from(GetWindowTextLengthW(hwnd)).unwrap_or(0);
    let mut buf = vec![0u16; len + 1];
    let copied = usize::try_from(GetWindowTextW(hwnd, &mut buf)).unwrap_or(0);
    String::from_utf16_lossy(buf.get(..copied).unwrap_or_default())
  }
}

/// Rebuild the native handle from its integer form.
pub(super) fn hwnd(window: &JavaWindow) -> HWND {
  HWND(window.hwnd as *mut std::ffi::c_void)
}
