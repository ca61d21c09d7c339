/*!
Decoding of raw bridge callbacks.

These methods are what the native trampolines call, on the pump thread, with
the callback's arguments already copied out of native memory. They adopt every
reference the callback handed over, build one [`BridgeEvent`] and enqueue it.
Nothing here calls back into the bridge, blocks, or fails: a payload that
cannot be decoded becomes [`BridgeEvent::Other`].
*/

use crate::dispatch::Dispatcher;
use crate::gateway::WeakGateway;
use crate::handle::{HandleRef, SharedHandle};
use crate::types::{BridgeEvent, ContextRef, EventCategory, ObjectRef, Property, VmId};
use std::sync::Arc;

/// Receives raw callback arguments and publishes typed events.
pub struct CallbackRegistry {
  gateway: WeakGateway,
  dispatcher: Dispatcher,
}

impl std::fmt::Debug for CallbackRegistry {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("CallbackRegistry").finish_non_exhaustive()
  }
}

fn other(category: EventCategory, source: Option<SharedHandle>, payload: Vec<String>) -> BridgeEvent {
  BridgeEvent::Other {
    tag: category.name().to_owned(),
    source,
    payload,
  }
}

fn opt_payload(values: &[&Option<String>]) -> Vec<String> {
  values
    .iter()
    .map(|v| v.as_deref().unwrap_or_default().to_owned())
    .collect()
}

impl CallbackRegistry {
  pub(crate) const fn new(gateway: WeakGateway, dispatcher: Dispatcher) -> Self {
    Self {
      gateway,
      dispatcher,
    }
  }

  /// Adopt the callback's references and enqueue what `build` makes of the
  /// source. `extra` references are owned by nobody and released after
  /// dispatch, together with the event object.
  fn decode(
    &self,
    category: EventCategory,
    vm_id: i32,
    event: i64,
    source: i64,
    extra: &[i64],
    build: impl FnOnce(Option<SharedHandle>) -> BridgeEvent,
  ) {
    let Some(gateway) = self.gateway.upgrade() else {
      return;
    };
    if !gateway.is_initialized() {
      return;
    }

    let vm = VmId(vm_id);
    let retained: Vec<HandleRef> = std::iter::once(event)
      .chain(extra.iter().copied())
      .filter(|raw| *raw != 0)
      .map(|raw| gateway.adopt(ContextRef::new(vm, ObjectRef(raw))))
      .collect();

    let source = (source != 0).then(|| Arc::new(gateway.adopt(ContextRef::new(vm, ObjectRef(source)))));
    if source.is_none() {
      log::warn!("{category} callback from vm {vm} without a source object");
    }

    let decoded = build(source);
    log::debug!("{category} -> {}", decoded.kind());
    self.dispatcher.enqueue(decoded, retained);
  }

  /// Callbacks carrying only `(vm, event, source)`.
  pub fn object_event(&self, category: EventCategory, vm_id: i32, event: i64, source: i64) {
    self.decode(category, vm_id, event, source, &[], |source| {
      let Some(source) = source else {
        return other(category, None, Vec::new());
      };
      match category {
        EventCategory::FocusGained => BridgeEvent::FocusGained { source },
        EventCategory::FocusLost => BridgeEvent::FocusLost { source },
        EventCategory::MenuSelected => BridgeEvent::MenuSelected { source },
        EventCategory::CaretUpdate => BridgeEvent::CaretUpdate {
          source,
          position: None,
        },
        EventCategory::PropertyVisibleDataChange => BridgeEvent::StructuralChange { parent: source },
        EventCategory::PropertySelectionChange => BridgeEvent::PropertyChanged {
          source,
          property: Property::Selection,
          old: None,
          new: None,
        },
        EventCategory::PropertyTextChange => BridgeEvent::PropertyChanged {
          source,
          property: Property::Text,
          old: None,
          new: None,
        },
        _ => other(category, Some(source), Vec::new()),
      }
    });
  }

  /// Name, description, state, value and table-model changes.
  pub fn string_pair(
    &self,
    category: EventCategory,
    vm_id: i32,
    event: i64,
    source: i64,
    old: Option<String>,
    new: Option<String>,
  ) {
    self.decode(category, vm_id, event, source, &[], |source| {
      let property = match category {
        EventCategory::PropertyNameChange => Property::Name,
        EventCategory::PropertyDescriptionChange => Property::Description,
        EventCategory::PropertyStateChange => Property::State,
        EventCategory::PropertyValueChange => Property::Value,
        EventCategory::PropertyTableModelChange => Property::TableModel,
        _ => return other(category, source, opt_payload(&[&old, &new])),
      };
      match source {
        Some(source) => BridgeEvent::PropertyChanged {
          source,
          property,
          old,
          new,
        },
        None => other(category, None, opt_payload(&[&old, &new])),
      }
    });
  }

  /// The generic property change, which names its property.
  pub fn property_change(
    &self,
    vm_id: i32,
    event: i64,
    source: i64,
    property: Option<String>,
    old: Option<String>,
    new: Option<String>,
  ) {
    let category = EventCategory::PropertyChange;
    self.decode(category, vm_id, event, source, &[], |source| {
      let (Some(source), Some(name)) = (source, property.as_deref()) else {
        return other(category, None, opt_payload(&[&property, &old, &new]));
      };
      let property = Property::from_name(name);
      if property.is_structural() {
        return BridgeEvent::StructuralChange { parent: source };
      }
      if property == Property::Caret {
        let position = new.as_deref().and_then(|n| n.trim().parse().ok());
        return BridgeEvent::CaretUpdate { source, position };
      }
      BridgeEvent::PropertyChanged {
        source,
        property,
        old,
        new,
      }
    });
  }

  /// Caret moved from `old` to `new` (character offsets).
  pub fn caret_change(&self, vm_id: i32, event: i64, source: i64, old: i32, new: i32) {
    let category = EventCategory::PropertyCaretChange;
    self.decode(category, vm_id, event, source, &[], |source| match source {
      Some(source) => BridgeEvent::CaretUpdate {
        source,
        position: Some(new),
      },
      None => other(category, None, vec![old.to_string(), new.to_string()]),
    });
  }

  /// Child and active-descendant changes, which pass two more references.
  pub fn object_pair(
    &self,
    category: EventCategory,
    vm_id: i32,
    event: i64,
    source: i64,
    old: i64,
    new: i64,
  ) {
    self.decode(category, vm_id, event, source, &[old, new], |source| {
      match (category, source) {
        (EventCategory::PropertyChildChange, Some(parent)) => BridgeEvent::StructuralChange { parent },
        (_, source) => other(category, source, Vec::new()),
      }
    });
  }
}
