/*!
`extern "C"` entry points handed to the library's `set*FP` setters.

The library calls these on the pump thread with no user data, so they reach
the [`CallbackRegistry`] through a process-wide slot. Each one copies its
arguments out of native memory, forwards them, and catches any panic: nothing
unwinds into the library.
*/

use super::api::{
  from_wide, Api, CaretChangeFp, JObject, ObjectFp, ObjectPairFp, PropertyChangeFp, StringPairFp,
  MAX_STRING_SIZE,
};
use crate::callbacks::CallbackRegistry;
use crate::types::EventCategory;
use parking_lot::RwLock;
use std::ffi::{c_int, c_long};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, LazyLock};

/// Where trampolines forward to. `None` drops callbacks on the floor.
static SINK: LazyLock<RwLock<Option<Arc<CallbackRegistry>>>> = LazyLock::new(|| RwLock::new(None));

pub(super) fn set_sink(sink: Option<Arc<CallbackRegistry>>) {
  *SINK.write() = sink;
}

/// Run `forward` against the current sink, containing panics.
fn guarded(name: &'static str, forward: impl FnOnce(&CallbackRegistry)) {
  let Some(sink) = SINK.read().clone() else {
    return;
  };
  if catch_unwind(AssertUnwindSafe(|| forward(&sink))).is_err() {
    log::error!("panic in {name} callback; event dropped");
  }
}

/// Copy a NUL-terminated wide string the library owns for the call's duration.
fn read_wide(ptr: *const u16) -> Option<String> {
  if ptr.is_null() {
    return None;
  }
  let mut len = 0;
  // SAFETY: the library passes NUL-terminated buffers of at most
  // MAX_STRING_SIZE units, valid until the callback returns.
  unsafe {
    while len < MAX_STRING_SIZE && *ptr.add(len) != 0 {
      len += 1;
    }
    Some(from_wide(std::slice::from_raw_parts(ptr, len)))
  }
}

macro_rules! object_trampolines {
  ($( $name:ident => $category:ident, )*) => {
    $(
      extern "C" fn $name(vm: c_long, event: JObject, source: JObject) {
        guarded(stringify!($name), |sink| {
          sink.object_event(EventCategory::$category, vm, event, source);
        });
      }
    )*
  };
}

macro_rules! string_pair_trampolines {
  ($( $name:ident => $category:ident, )*) => {
    $(
      extern "C" fn $name(
        vm: c_long,
        event: JObject,
        source: JObject,
        old: *const u16,
        new: *const u16,
      ) {
        guarded(stringify!($name), |sink| {
          sink.string_pair(EventCategory::$category, vm, event, source, read_wide(old), read_wide(new));
        });
      }
    )*
  };
}

object_trampolines! {
  on_selection_change => PropertySelectionChange,
  on_text_change => PropertyTextChange,
  on_visible_data_change => PropertyVisibleDataChange,
  on_menu_selected => MenuSelected,
  on_menu_deselected => MenuDeselected,
  on_menu_canceled => MenuCanceled,
  on_focus_gained => FocusGained,
  on_focus_lost => FocusLost,
  on_caret_update => CaretUpdate,
  on_mouse_clicked => MouseClicked,
  on_mouse_entered => MouseEntered,
  on_mouse_exited => MouseExited,
  on_mouse_pressed => MousePressed,
  on_mouse_released => MouseReleased,
  on_popup_menu_canceled => PopupMenuCanceled,
  on_popup_menu_will_become_invisible => PopupMenuWillBecomeInvisible,
  on_popup_menu_will_become_visible => PopupMenuWillBecomeVisible,
}

string_pair_trampolines! {
  on_name_change => PropertyNameChange,
  on_description_change => PropertyDescriptionChange,
  on_state_change => PropertyStateChange,
  on_value_change => PropertyValueChange,
  on_table_model_change => PropertyTableModelChange,
}

extern "C" fn on_property_change(
  vm: c_long,
  event: JObject,
  source: JObject,
  property: *const u16,
  old: *const u16,
  new: *const u16,
) {
  guarded("on_property_change", |sink| {
    sink.property_change(vm, event, source, read_wide(property), read_wide(old), read_wide(new));
  });
}

extern "C" fn on_caret_change(vm: c_long, event: JObject, source: JObject, old: c_int, new: c_int) {
  guarded("on_caret_change", |sink| {
    sink.caret_change(vm, event, source, old, new);
  });
}

extern "C" fn on_child_change(vm: c_long, event: JObject, source: JObject, old: JObject, new: JObject) {
  guarded("on_child_change", |sink| {
    sink.object_pair(EventCategory::PropertyChildChange, vm, event, source, old, new);
  });
}

extern "C" fn on_active_descendent_change(
  vm: c_long,
  event: JObject,
  source: JObject,
  old: JObject,
  new: JObject,
) {
  guarded("on_active_descendent_change", |sink| {
    sink.object_pair(
      EventCategory::PropertyActiveDescendentChange,
      vm,
      event,
      source,
      old,
      new,
    );
  });
}

/// Install (`enabled`) or clear the trampoline for `category`.
pub(super) fn install(api: &Api, category: EventCategory, enabled: bool) {
  fn pick<F>(enabled: bool, f: F) -> Option<F> {
    enabled.then_some(f)
  }
  let object = |f: ObjectFp| pick(enabled, f);
  let pair = |f: StringPairFp| pick(enabled, f);
  let objects = |f: ObjectPairFp| pick(enabled, f);

  // SAFETY: each setter receives a trampoline with the matching signature,
  // or null to remove it.
  unsafe {
    match category {
      EventCategory::PropertyChange => {
        (api.set_property_change)(pick::<PropertyChangeFp>(enabled, on_property_change));
      }
      EventCategory::PropertyNameChange => (api.set_property_name_change)(pair(on_name_change)),
      EventCategory::PropertyDescriptionChange => {
        (api.set_property_description_change)(pair(on_description_change));
      }
      EventCategory::PropertyStateChange => (api.set_property_state_change)(pair(on_state_change)),
      EventCategory::PropertyValueChange => (api.set_property_value_change)(pair(on_value_change)),
      EventCategory::PropertySelectionChange => {
        (api.set_property_selection_change)(object(on_selection_change));
      }
      EventCategory::PropertyTextChange => (api.set_property_text_change)(object(on_text_change)),
      EventCategory::PropertyCaretChange => {
        (api.set_property_caret_change)(pick::<CaretChangeFp>(enabled, on_caret_change));
      }
      EventCategory::PropertyVisibleDataChange => {
        (api.set_property_visible_data_change)(object(on_visible_data_change));
      }
      EventCategory::PropertyChildChange => (api.set_property_child_change)(objects(on_child_change)),
      EventCategory::PropertyActiveDescendentChange => {
        (api.set_property_active_descendent_change)(objects(on_active_descendent_change));
      }
      EventCategory::PropertyTableModelChange => {
        (api.set_property_table_model_change)(pair(on_table_model_change));
      }
      EventCategory::MenuSelected => (api.set_menu_selected)(object(on_menu_selected)),
      EventCategory::MenuDeselected => (api.set_menu_deselected)(object(on_menu_deselected)),
      EventCategory::MenuCanceled => (api.set_menu_canceled)(object(on_menu_canceled)),
      EventCategory::FocusGained => (api.set_focus_gained)(object(on_focus_gained)),
      EventCategory::FocusLost => (api.set_focus_lost)(object(on_focus_lost)),
      EventCategory::CaretUpdate => (api.set_caret_update)(object(on_caret_update)),
      EventCategory::MouseClicked => (api.set_mouse_clicked)(object(on_mouse_clicked)),
      EventCategory::MouseEntered => (api.set_mouse_entered)(object(on_mouse_entered)),
      EventCategory::MouseExited => (api.set_mouse_exited)(object(on_mouse_exited)),
      EventCategory::MousePressed => (api.set_mouse_pressed)(object(on_mouse_pressed)),
      EventCategory::MouseReleased => (api.set_mouse_released)(object(on_mouse_released)),
      EventCategory::PopupMenuCanceled => {
        (api.set_popup_menu_canceled)(object(on_popup_menu_canceled));
      }
      EventCategory::PopupMenuWillBecomeInvisible => {
        (api.set_popup_menu_will_become_invisible)(object(on_popup_menu_will_become_invisible));
      }
      EventCategory::PopupMenuWillBecomeVisible => {
        (api.set_popup_menu_will_become_visible)(object(on_popup_menu_will_become_visible));
      }
    }
  }
}
