/*! Property bag of one accessible context. */

use super::Bounds;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Snapshot of the bridge's `AccessibleContextInfo` record.
///
/// `role` and `states` are localized; the `_en_us` variants are stable across
/// locales and are what searches should usually match on.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextInfo {
  pub name: String,
  pub description: String,
  pub role: String,
  pub role_en_us: String,
  pub states: BTreeSet<String>,
  pub states_en_us: BTreeSet<String>,
  pub index_in_parent: i32,
  pub children_count: i32,
  pub bounds: Bounds,
  pub accessible_component: bool,
  pub accessible_action: bool,
  pub accessible_selection: bool,
  pub accessible_text: bool,
  /// Implements `AccessibleValue` (current, minimum and maximum value).
  pub accessible_value: bool,
}

impl ContextInfo {
  /// Split the bridge's comma separated state list.
  pub fn parse_states(raw: &str) -> BTreeSet<String> {
    raw
      .split(',')
      .map(str::trim)
      .filter(|s| !s.is_empty())
      .map(str::to_owned)
      .collect()
  }

  pub fn has_state(&self, state: &str) -> bool {
    self.states_en_us.contains(state) || self.states.contains(state)
  }

  /// Number of children, clamping the bridge's negative "unknown" to zero.
  pub fn child_count(&self) -> usize {
    usize::try_from(self.children_count).unwrap_or(0)
  }

  /// Debug dump.
  pub fn to_json(&self) -> String {
    serde_json::to_string(self).unwrap_or_default()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_state_list() {
    let states = ContextInfo::parse_states("enabled,focusable, visible,,showing");
    let expected: Vec<&str> = vec!["enabled", "focusable", "showing", "visible"];
    assert_eq!(states.iter().map(String::as_str).collect::<Vec<_>>(), expected);
  }

  #[test]
  fn negative_child_count_is_zero() {
    let info = ContextInfo {
      children_count: -1,
      ..ContextInfo::default()
    };
    assert_eq!(info.child_count(), 0);
  }

  #[test]
  fn json_dump_contains_fields() {
    let info = ContextInfo {
      name: "7".to_owned(),
      role: "push button".to_owned(),
      ..ContextInfo::default()
    };
    let value: serde_json::Value = serde_json::from_str(&info.to_json()).unwrap();
    assert_eq!(value["name"], "7");
    assert_eq!(value["role"], "push button");
  }
}
