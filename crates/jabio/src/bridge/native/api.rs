/*!
`#[repr(C)]` records and the function table of `WindowsAccessBridge-64.dll`.

Layouts follow `AccessBridgePackages.h`: `long` is 32 bit on Windows, object
references (`JOBJECT64`) are 64 bit and strings are fixed-size `wchar_t`
buffers.
*/

use crate::types::{
  Bounds, ContextInfo, JabioError, JabioResult, TextInfo, TextItems, TextSelection,
};
use libloading::Library;
use std::ffi::{c_int, c_long, c_short};
use windows::core::BOOL;
use windows::Win32::Foundation::HWND;

pub(super) const MAX_STRING_SIZE: usize = 1024;
pub(super) const SHORT_STRING_SIZE: usize = 256;
pub(super) const MAX_VISIBLE_CHILDREN: usize = 256;
const MAX_ACTION_INFO: usize = 256;
const MAX_ACTIONS_TO_DO: usize = 32;

/// `cAccessibleValueInterface` bit of `accessibleInterfaces`.
const VALUE_INTERFACE: i32 = 1;

pub(super) type JObject = i64;

#[repr(C)]
pub(super) struct AccessibleContextInfo {
  pub name: [u16; MAX_STRING_SIZE],
  pub description: [u16; MAX_STRING_SIZE],
  pub role: [u16; SHORT_STRING_SIZE],
  pub role_en_us: [u16; SHORT_STRING_SIZE],
  pub states: [u16; SHORT_STRING_SIZE],
  pub states_en_us: [u16; SHORT_STRING_SIZE],
  pub index_in_parent: i32,
  pub children_count: i32,
  pub x: i32,
  pub y: i32,
  pub width: i32,
  pub height: i32,
  pub accessible_component: BOOL,
  pub accessible_action: BOOL,
  pub accessible_selection: BOOL,
  pub accessible_text: BOOL,
  /// Bit set of `cAccessible*Interface` flags.
  pub accessible_interfaces: BOOL,
}

#[repr(C)]
pub(super) struct AccessibleTextInfo {
  pub char_count: c_int,
  pub caret_index: c_int,
  pub index_at_point: c_int,
}

#[repr(C)]
pub(super) struct AccessibleTextItemsInfo {
  pub letter: u16,
  pub word: [u16; SHORT_STRING_SIZE],
  pub sentence: [u16; MAX_STRING_SIZE],
}

#[repr(C)]
pub(super) struct AccessibleTextSelectionInfo {
  pub selection_start_index: c_int,
  pub selection_end_index: c_int,
  pub selected_text: [u16; MAX_STRING_SIZE],
}

#[repr(C)]
pub(super) struct ActionInfo {
  pub name: [u16; SHORT_STRING_SIZE],
}

#[repr(C)]
pub(super) struct AccessibleActions {
  pub count: i32,
  pub actions: [ActionInfo; MAX_ACTION_INFO],
}

#[repr(C)]
pub(super) struct AccessibleActionsToDo {
  pub count: i32,
  pub actions: [ActionInfo; MAX_ACTIONS_TO_DO],
}

#[repr(C)]
pub(super) struct VisibleChildrenInfo {
  pub count: c_int,
  pub children: [JObject; MAX_VISIBLE_CHILDREN],
}

/// Records for which all-zero bytes are a valid value.
///
/// # Safety
///
/// Implementors must be `#[repr(C)]` and contain only integers and arrays of
/// integers.
pub(super) unsafe trait Plain {}

// SAFETY: integer and integer-array fields only.
unsafe impl Plain for AccessibleContextInfo {}
// SAFETY: as above.
unsafe impl Plain for AccessibleActions {}
// SAFETY: as above.
unsafe impl Plain for AccessibleActionsToDo {}
// SAFETY: as above.
unsafe impl Plain for VisibleChildrenInfo {}
// SAFETY: as above.
unsafe impl Plain for AccessibleTextInfo {}
// SAFETY: as above.
unsafe impl Plain for AccessibleTextItemsInfo {}
// SAFETY: as above.
unsafe impl Plain for AccessibleTextSelectionInfo {}

/// Heap-allocated zeroed record; some are too large for the stack.
pub(super) fn zeroed<T: Plain>() -> Box<T> {
  // SAFETY: `T: Plain`, so the all-zero bit pattern is a valid `T`.
  unsafe { Box::<T>::new_zeroed().assume_init() }
}

/// Decode a NUL-terminated (or full) wide buffer, replacing invalid UTF-16.
pub(super) fn from_wide(buf: &[u16]) -> String {
  let len = buf.iter().position(|c| *c == 0).unwrap_or(buf.len());
  String::from_utf16_lossy(buf.get(..len).unwrap_or_default())
}

/// Encode into a NUL-terminated wide buffer.
pub(super) fn to_wide(text: &str) -> Vec<u16> {
  text.encode_utf16().chain(std::iter::once(0)).collect()
}

/// Copy `text` into a fixed buffer, truncating, always NUL-terminated.
pub(super) fn fill_wide(dst: &mut [u16], text: &str) {
  let room = dst.len().saturating_sub(1);
  let mut written = 0;
  for (slot, unit) in dst.iter_mut().zip(text.encode_utf16().take(room)) {
    *slot = unit;
    written += 1;
  }
  if let Some(end) = dst.get_mut(written) {
    *end = 0;
  }
}

impl From<&AccessibleContextInfo> for ContextInfo {
  fn from(raw: &AccessibleContextInfo) -> Self {
    Self {
      name: from_wide(&raw.name),
      description: from_wide(&raw.description),
      role: from_wide(&raw.role),
      role_en_us: from_wide(&raw.role_en_us),
      states: Self::parse_states(&from_wide(&raw.states)),
      states_en_us: Self::parse_states(&from_wide(&raw.states_en_us)),
      index_in_parent: raw.index_in_parent,
      children_count: raw.children_count,
      bounds: Bounds::new(raw.x, raw.y, raw.width, raw.height),
      accessible_component: raw.accessible_component.as_bool(),
      accessible_action: raw.accessible_action.as_bool(),
      accessible_selection: raw.accessible_selection.as_bool(),
      accessible_text: raw.accessible_text.as_bool(),
      accessible_value: raw.accessible_interfaces.0 & VALUE_INTERFACE != 0,
    }
  }
}

impl From<&AccessibleTextInfo> for TextInfo {
  fn from(raw: &AccessibleTextInfo) -> Self {
    Self {
      char_count: raw.char_count,
      caret_index: raw.caret_index,
      index_at_point: raw.index_at_point,
    }
  }
}

impl From<&AccessibleTextItemsInfo> for TextItems {
  fn from(raw: &AccessibleTextItemsInfo) -> Self {
    let letter = char::decode_utf16([raw.letter])
      .next()
      .and_then(Result::ok)
      .filter(|c| *c != '\0');
    Self {
      letter,
      word: from_wide(&raw.word),
      sentence: from_wide(&raw.sentence),
    }
  }
}

impl From<&AccessibleTextSelectionInfo> for TextSelection {
  fn from(raw: &AccessibleTextSelectionInfo) -> Self {
    Self {
      start: raw.selection_start_index,
      end: raw.selection_end_index,
      text: from_wide(&raw.selected_text),
    }
  }
}

impl AccessibleActions {
  pub(super) fn names(&self) -> Vec<String> {
    let count = usize::try_from(self.count).unwrap_or(0).min(MAX_ACTION_INFO);
    self
      .actions
      .iter()
      .take(count)
      .map(|a| from_wide(&a.name))
      .collect()
  }
}

impl AccessibleActionsToDo {
  pub(super) fn fill(&mut self, names: &[String]) -> JabioResult<()> {
    if names.len() > MAX_ACTIONS_TO_DO {
      return Err(JabioError::ActionFailed {
        action: names.join(","),
        reason: format!("at most {MAX_ACTIONS_TO_DO} actions per call"),
      });
    }
    for (slot, name) in self.actions.iter_mut().zip(names) {
      fill_wide(&mut slot.name, name);
    }
    self.count = i32::try_from(names.len()).unwrap_or(0);
    Ok(())
  }
}

// -- callback signatures -------------------------------------------------------

pub(super) type ObjectFp = extern "C" fn(c_long, JObject, JObject);
pub(super) type StringPairFp = extern "C" fn(c_long, JObject, JObject, *const u16, *const u16);
pub(super) type PropertyChangeFp =
  extern "C" fn(c_long, JObject, JObject, *const u16, *const u16, *const u16);
pub(super) type CaretChangeFp = extern "C" fn(c_long, JObject, JObject, c_int, c_int);
pub(super) type ObjectPairFp = extern "C" fn(c_long, JObject, JObject, JObject, JObject);

type SetObjectFp = unsafe extern "C" fn(Option<ObjectFp>);
type SetStringPairFp = unsafe extern "C" fn(Option<StringPairFp>);
type SetPropertyChangeFp = unsafe extern "C" fn(Option<PropertyChangeFp>);
type SetCaretChangeFp = unsafe extern "C" fn(Option<CaretChangeFp>);
type SetObjectPairFp = unsafe extern "C" fn(Option<ObjectPairFp>);

macro_rules! bridge_api {
  ($( $field:ident = $symbol:literal : $ty:ty; )*) => {
    /// Resolved entry points. Keeps the library loaded.
    pub(super) struct Api {
      $( pub $field: $ty, )*
      _library: Library,
    }

    impl Api {
      /// Resolve every entry point; a missing one fails the load.
      pub(super) fn resolve(library: Library) -> JabioResult<Self> {
        $(
          // SAFETY: the declared type matches the export in AccessBridgeCalls.h.
          let $field: $ty = unsafe {
            *library
              .get::<$ty>(concat!($symbol, "\0").as_bytes())
              .map_err(|e| JabioError::LibraryLoad(format!("{}: {e}", $symbol)))?
          };
        )*
        Ok(Self {
          $( $field, )*
          _library: library,
        })
      }
    }
  };
}

bridge_api! {
  windows_run = "Windows_run": unsafe extern "C" fn();
  is_java_window = "isJavaWindow": unsafe extern "C" fn(HWND) -> BOOL;
  context_from_hwnd = "getAccessibleContextFromHWND":
    unsafe extern "C" fn(HWND, *mut c_long, *mut JObject) -> BOOL;
  context_with_focus = "getAccessibleContextWithFocus":
    unsafe extern "C" fn(HWND, *mut c_long, *mut JObject) -> BOOL;
  release_java_object = "releaseJavaObject": unsafe extern "C" fn(c_long, JObject);
  is_same_object = "isSameObject": unsafe extern "C" fn(c_long, JObject, JObject) -> BOOL;
  context_info = "getAccessibleContextInfo":
    unsafe extern "C" fn(c_long, JObject, *mut AccessibleContextInfo) -> BOOL;
  child_from_context = "getAccessibleChildFromContext":
    unsafe extern "C" fn(c_long, JObject, c_int) -> JObject;
  parent_from_context = "getAccessibleParentFromContext":
    unsafe extern "C" fn(c_long, JObject) -> JObject;
  visible_children_count = "getVisibleChildrenCount": unsafe extern "C" fn(c_long, JObject) -> c_int;
  visible_children = "getVisibleChildren":
    unsafe extern "C" fn(c_long, JObject, c_int, *mut VisibleChildrenInfo) -> BOOL;
  virtual_name = "getVirtualAccessibleName":
    unsafe extern "C" fn(c_long, JObject, *mut u16, c_int) -> BOOL;
  request_focus = "requestFocus": unsafe extern "C" fn(c_long, JObject) -> BOOL;
  actions = "getAccessibleActions":
    unsafe extern "C" fn(c_long, JObject, *mut AccessibleActions) -> BOOL;
  do_actions = "doAccessibleActions":
    unsafe extern "C" fn(c_long, JObject, *const AccessibleActionsToDo, *mut c_int) -> BOOL;
  set_text_contents = "setTextContents": unsafe extern "C" fn(c_long, JObject, *const u16) -> BOOL;

  text_info = "getAccessibleTextInfo":
    unsafe extern "C" fn(c_long, JObject, *mut AccessibleTextInfo, c_int, c_int) -> BOOL;
  text_items = "getAccessibleTextItems":
    unsafe extern "C" fn(c_long, JObject, *mut AccessibleTextItemsInfo, c_int) -> BOOL;
  text_selection = "getAccessibleTextSelectionInfo":
    unsafe extern "C" fn(c_long, JObject, *mut AccessibleTextSelectionInfo) -> BOOL;
  text_range = "getAccessibleTextRange":
    unsafe extern "C" fn(c_long, JObject, c_int, c_int, *mut u16, c_short) -> BOOL;

  current_value = "getCurrentAccessibleValueFromContext":
    unsafe extern "C" fn(c_long, JObject, *mut u16, c_short) -> BOOL;
  maximum_value = "getMaximumAccessibleValueFromContext":
    unsafe extern "C" fn(c_long, JObject, *mut u16, c_short) -> BOOL;
  minimum_value = "getMinimumAccessibleValueFromContext":
    unsafe extern "C" fn(c_long, JObject, *mut u16, c_short) -> BOOL;

  add_selection = "addAccessibleSelectionFromContext": unsafe extern "C" fn(c_long, JObject, c_int);
  remove_selection = "removeAccessibleSelectionFromContext":
    unsafe extern "C" fn(c_long, JObject, c_int);
  clear_selection = "clearAccessibleSelectionFromContext": unsafe extern "C" fn(c_long, JObject);
  select_all = "selectAllAccessibleSelectionFromContext": unsafe extern "C" fn(c_long, JObject);
  selection_count = "getAccessibleSelectionCountFromContext":
    unsafe extern "C" fn(c_long, JObject) -> c_int;
  is_child_selected = "isAccessibleChildSelectedFromContext":
    unsafe extern "C" fn(c_long, JObject, c_int) -> BOOL;

  set_property_change = "setPropertyChangeFP": SetPropertyChangeFp;
  set_property_name_change = "setPropertyNameChangeFP": SetStringPairFp;
  set_property_description_change = "setPropertyDescriptionChangeFP": SetStringPairFp;
  set_property_state_change = "setPropertyStateChangeFP": SetStringPairFp;
  set_property_value_change = "setPropertyValueChangeFP": SetStringPairFp;
  set_property_selection_change = "setPropertySelectionChangeFP": SetObjectFp;
  set_property_text_change = "setPropertyTextChangeFP": SetObjectFp;
  set_property_caret_change = "setPropertyCaretChangeFP": SetCaretChangeFp;
  set_property_visible_data_change = "setPropertyVisibleDataChangeFP": SetObjectFp;
  set_property_child_change = "setPropertyChildChangeFP": SetObjectPairFp;
  set_property_active_descendent_change = "setPropertyActiveDescendentChangeFP": SetObjectPairFp;
  set_property_table_model_change = "setPropertyTableModelChangeFP": SetStringPairFp;
  set_menu_selected = "setMenuSelectedFP": SetObjectFp;
  set_menu_deselected = "setMenuDeselectedFP": SetObjectFp;
  set_menu_canceled = "setMenuCanceledFP": SetObjectFp;
  set_focus_gained = "setFocusGainedFP": SetObjectFp;
  set_focus_lost = "setFocusLostFP": SetObjectFp;
  set_caret_update = "setCaretUpdateFP": SetObjectFp;
  set_mouse_clicked = "setMouseClickedFP": SetObjectFp;
  set_mouse_entered = "setMouseEnteredFP": SetObjectFp;
  set_mouse_exited = "setMouseExitedFP": SetObjectFp;
  set_mouse_pressed = "setMousePressedFP": SetObjectFp;
  set_mouse_released = "setMouseReleasedFP": SetObjectFp;
  set_popup_menu_canceled = "setPopupMenuCanceledFP": SetObjectFp;
  set_popup_menu_will_become_invisible = "setPopupMenuWillBecomeInvisibleFP": SetObjectFp;
  set_popup_menu_will_become_visible = "setPopupMenuWillBecomeVisibleFP": SetObjectFp;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn wide_strings_stop_at_nul() {
    let mut buf = [0u16; 8];
    fill_wide(&mut buf, "push");
    assert_eq!(from_wide(&buf), "push");

    fill_wide(&mut buf, "truncated text");
    assert_eq!(from_wide(&buf), "truncat");
    assert_eq!(buf[7], 0);
  }

  #[test]
  fn record_converts_to_info() {
    let mut raw = zeroed::<AccessibleContextInfo>();
    fill_wide(&mut raw.name, "OK");
    fill_wide(&mut raw.role_en_us, "push button");
    fill_wide(&mut raw.states_en_us, "enabled,focusable");
    raw.width = 80;
    raw.height = 20;
    raw.accessible_action = BOOL(1);

    let info = ContextInfo::from(&*raw);
    assert_eq!(info.name, "OK");
    assert_eq!(info.role_en_us, "push button");
    assert!(info.has_state("focusable"));
    assert_eq!(info.bounds, Bounds::new(0, 0, 80, 20));
    assert!(info.accessible_action);
    assert!(!info.accessible_text);
  }

  #[test]
  fn value_flag_is_the_value_interface_bit() {
    let mut raw = zeroed::<AccessibleContextInfo>();
    raw.accessible_interfaces = BOOL(VALUE_INTERFACE | 32);
    assert!(ContextInfo::from(&*raw).accessible_value);
    raw.accessible_interfaces = BOOL(32);
    assert!(!ContextInfo::from(&*raw).accessible_value);
  }

  #[test]
  fn text_records_convert() {
    let mut items = zeroed::<AccessibleTextItemsInfo>();
    items.letter = u16::from(b'w');
    fill_wide(&mut items.word, "word");
    fill_wide(&mut items.sentence, "a word here");
    let items = TextItems::from(&*items);
    assert_eq!(items.letter, Some('w'));
    assert_eq!(items.word, "word");
    assert_eq!(items.sentence, "a word here");

    let mut selection = zeroed::<AccessibleTextSelectionInfo>();
    selection.selection_start_index = 2;
    selection.selection_end_index = 6;
    fill_wide(&mut selection.selected_text, "word");
    let selection = TextSelection::from(&*selection);
    assert_eq!((selection.start, selection.end), (2, 6));
    assert_eq!(selection.text, "word");
  }

  #[test]
  fn too_many_actions_are_rejected() {
    let mut todo = zeroed::<AccessibleActionsToDo>();
    let names: Vec<String> = (0..40).map(|i| format!("a{i}")).collect();
    assert!(todo.fill(&names).is_err());
    todo.fill(&names[..2]).unwrap();
    assert_eq!(todo.count, 2);
  }
}
