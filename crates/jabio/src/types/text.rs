/*! Text and value content of contexts that implement those interfaces. */

use serde::{Deserialize, Serialize};

/// Character counts of a text context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextInfo {
  pub char_count: i32,
  /// `-1` when the context has no caret.
  pub caret_index: i32,
  /// Character under the probed point, `-1` if none.
  pub index_at_point: i32,
}

/// The letter, word and sentence around one character index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextItems {
  pub letter: Option<char>,
  pub word: String,
  pub sentence: String,
}

/// Selected range of a text context. `start == end` means nothing selected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextSelection {
  pub start: i32,
  pub end: i32,
  pub text: String,
}

impl TextSelection {
  pub const fn is_empty(&self) -> bool {
    self.start >= self.end
  }
}

/// Current value and bounds of a value context (slider, spinner, progress
/// bar). The bridge reports all three as strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessibleValue {
  pub current: String,
  pub minimum: String,
  pub maximum: String,
}

impl AccessibleValue {
  /// Current value as a number, if it parses as one.
  pub fn as_f64(&self) -> Option<f64> {
    self.current.trim().parse().ok()
  }
}
