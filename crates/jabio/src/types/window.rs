/*! Top-level Java window as discovered through the bridge. */

use serde::{Deserialize, Serialize};

/// A top-level native window that hosts a Java VM's accessibility root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JavaWindow {
  pub title: String,
  pub pid: u32,
  /// Native window handle (`HWND`) as an integer.
  pub hwnd: isize,
}

impl JavaWindow {
  /// Pick the window for `title`: exact title first, then the first title
  /// that starts with it.
  pub fn select<'a>(windows: &'a [JavaWindow], title: &str) -> Option<&'a JavaWindow> {
    windows
      .iter()
      .find(|w| w.title == title)
      .or_else(|| windows.iter().find(|w| w.title.starts_with(title)))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn window(title: &str, hwnd: isize) -> JavaWindow {
    JavaWindow {
      title: title.to_owned(),
      pid: 42,
      hwnd,
    }
  }

  #[test]
  fn exact_title_wins_over_prefix() {
    let windows = vec![window("Calculator - scientific", 1), window("Calculator", 2)];
    assert_eq!(JavaWindow::select(&windows, "Calculator").map(|w| w.hwnd), Some(2));
  }

  #[test]
  fn prefix_match_when_no_exact() {
    let windows = vec![window("Notes", 1), window("Calculator - basic", 2)];
    assert_eq!(JavaWindow::select(&windows, "Calc").map(|w| w.hwnd), Some(2));
  }

  #[test]
  fn no_match() {
    let windows = vec![window("Notes", 1)];
    assert!(JavaWindow::select(&windows, "Calculator").is_none());
  }
}
