/*! Events decoded from bridge callbacks. */

use crate::handle::SharedHandle;
use serde::{Deserialize, Serialize};

/// The callback categories the bridge can report, one per `set*FP` entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
  PropertyChange,
  PropertyNameChange,
  PropertyDescriptionChange,
  PropertyStateChange,
  PropertyValueChange,
  PropertySelectionChange,
  PropertyTextChange,
  PropertyCaretChange,
  PropertyVisibleDataChange,
  PropertyChildChange,
  PropertyActiveDescendentChange,
  PropertyTableModelChange,
  MenuSelected,
  MenuDeselected,
  MenuCanceled,
  FocusGained,
  FocusLost,
  CaretUpdate,
  MouseClicked,
  MouseEntered,
  MouseExited,
  MousePressed,
  MouseReleased,
  PopupMenuCanceled,
  PopupMenuWillBecomeInvisible,
  PopupMenuWillBecomeVisible,
}

impl EventCategory {
  pub const ALL: [Self; 26] = [
    Self::PropertyChange,
    Self::PropertyNameChange,
    Self::PropertyDescriptionChange,
    Self::PropertyStateChange,
    Self::PropertyValueChange,
    Self::PropertySelectionChange,
    Self::PropertyTextChange,
    Self::PropertyCaretChange,
    Self::PropertyVisibleDataChange,
    Self::PropertyChildChange,
    Self::PropertyActiveDescendentChange,
    Self::PropertyTableModelChange,
    Self::MenuSelected,
    Self::MenuDeselected,
    Self::MenuCanceled,
    Self::FocusGained,
    Self::FocusLost,
    Self::CaretUpdate,
    Self::MouseClicked,
    Self::MouseEntered,
    Self::MouseExited,
    Self::MousePressed,
    Self::MouseReleased,
    Self::PopupMenuCanceled,
    Self::PopupMenuWillBecomeInvisible,
    Self::PopupMenuWillBecomeVisible,
  ];

  /// Stable snake-case name, used as the tag of [`BridgeEvent::Other`].
  pub const fn name(self) -> &'static str {
    match self {
      Self::PropertyChange => "property_change",
      Self::PropertyNameChange => "property_name_change",
      Self::PropertyDescriptionChange => "property_description_change",
      Self::PropertyStateChange => "property_state_change",
      Self::PropertyValueChange => "property_value_change",
      Self::PropertySelectionChange => "property_selection_change",
      Self::PropertyTextChange => "property_text_change",
      Self::PropertyCaretChange => "property_caret_change",
      Self::PropertyVisibleDataChange => "property_visible_data_change",
      Self::PropertyChildChange => "property_child_change",
      Self::PropertyActiveDescendentChange => "property_active_descendent_change",
      Self::PropertyTableModelChange => "property_table_model_change",
      Self::MenuSelected => "menu_selected",
      Self::MenuDeselected => "menu_deselected",
      Self::MenuCanceled => "menu_canceled",
      Self::FocusGained => "focus_gained",
      Self::FocusLost => "focus_lost",
      Self::CaretUpdate => "caret_update",
      Self::MouseClicked => "mouse_clicked",
      Self::MouseEntered => "mouse_entered",
      Self::MouseExited => "mouse_exited",
      Self::MousePressed => "mouse_pressed",
      Self::MouseReleased => "mouse_released",
      Self::PopupMenuCanceled => "popup_menu_canceled",
      Self::PopupMenuWillBecomeInvisible => "popup_menu_will_become_invisible",
      Self::PopupMenuWillBecomeVisible => "popup_menu_will_become_visible",
    }
  }
}

impl std::fmt::Display for EventCategory {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.name())
  }
}

/// Which accessible property a change notification is about.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Property {
  Name,
  Description,
  State,
  Value,
  Selection,
  Text,
  Caret,
  VisibleData,
  Child,
  ActiveDescendant,
  TableModel,
  /// A property name the bridge sent that we don't model.
  Other(String),
}

impl Property {
  /// Map a Java `AccessibleContext` property name (e.g. `"AccessibleName"`).
  pub fn from_name(name: &str) -> Self {
    let lower = name.trim().to_ascii_lowercase();
    match lower.trim_start_matches("accessible") {
      "name" => Self::Name,
      "description" => Self::Description,
      "state" => Self::State,
      "value" => Self::Value,
      "selection" => Self::Selection,
      "text" => Self::Text,
      "caret" => Self::Caret,
      "visibledata" => Self::VisibleData,
      "child" => Self::Child,
      "activedescendant" => Self::ActiveDescendant,
      "tablemodelchanged" => Self::TableModel,
      _ => Self::Other(name.to_owned()),
    }
  }

  /// Whether a change to this property reshapes the children list.
  pub const fn is_structural(&self) -> bool {
    matches!(self, Self::VisibleData | Self::Child)
  }
}

/// A decoded bridge notification.
///
/// Handles are shared: every clone holds the same [`HandleRef`](crate::HandleRef)
/// and the remote reference is released once, when the last clone is dropped.
#[derive(Debug, Clone)]
pub enum BridgeEvent {
  PropertyChanged {
    source: SharedHandle,
    property: Property,
    old: Option<String>,
    new: Option<String>,
  },
  FocusGained {
    source: SharedHandle,
  },
  FocusLost {
    source: SharedHandle,
  },
  /// Children of `parent` were added, removed or reordered.
  StructuralChange {
    parent: SharedHandle,
  },
  CaretUpdate {
    source: SharedHandle,
    position: Option<i32>,
  },
  MenuSelected {
    source: SharedHandle,
  },
  /// Anything else, including payloads that failed to decode.
  Other {
    tag: String,
    source: Option<SharedHandle>,
    payload: Vec<String>,
  },
}

impl BridgeEvent {
  /// The object the event is about, if any.
  pub fn source(&self) -> Option<&SharedHandle> {
    match self {
      Self::PropertyChanged { source, .. }
      | Self::FocusGained { source }
      | Self::FocusLost { source }
      | Self::CaretUpdate { source, .. }
      | Self::MenuSelected { source } => Some(source),
      Self::StructuralChange { parent } => Some(parent),
      Self::Other { source, .. } => source.as_ref(),
    }
  }

  /// Short kind tag for logging and filtering.
  pub fn kind(&self) -> &str {
    match self {
      Self::PropertyChanged { .. } => "property_changed",
      Self::FocusGained { .. } => "focus_gained",
      Self::FocusLost { .. } => "focus_lost",
      Self::StructuralChange { .. } => "structural_change",
      Self::CaretUpdate { .. } => "caret_update",
      Self::MenuSelected { .. } => "menu_selected",
      Self::Other { tag, .. } => tag,
    }
  }
}
