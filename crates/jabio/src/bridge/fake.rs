/*!
Scripted in-memory bridge for tests.

Every reference it hands out is fresh (like the real library, which creates a
new global reference per call), so identity goes through `is_same_object`.
Acquisitions and releases are counted per reference to check that every
reference is released exactly once.
*/

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use super::Bridge;
use crate::callbacks::CallbackRegistry;
use crate::types::{
  AccessibleValue, Bounds, ContextInfo, ContextRef, EventCategory, JabioError, JabioResult,
  JavaWindow, ObjectRef, TextInfo, TextItems, TextSelection, VmId,
};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

pub(crate) type ObjId = u32;

pub(crate) const VM: VmId = VmId(7);

/// Pseudo object standing in for the bridge's per-callback event object.
const EVENT_OBJECT: ObjId = 0;

#[derive(Default)]
struct FakeObject {
  info: ContextInfo,
  children: Vec<ObjId>,
  parent: Option<ObjId>,
  actions: Vec<String>,
  text: String,
  caret: i32,
  text_selection: (usize, usize),
  value: AccessibleValue,
  selected: BTreeSet<usize>,
}

/// The `is_break`-delimited run of `chars` around `index`, trimmed.
fn segment_at(chars: &[char], index: usize, is_break: impl Fn(char) -> bool) -> String {
  if index >= chars.len() {
    return String::new();
  }
  let start = chars[..index]
    .iter()
    .rposition(|c| is_break(*c))
    .map_or(0, |p| p + 1);
  let end = chars[index..]
    .iter()
    .position(|c| is_break(*c))
    .map_or(chars.len(), |p| index + p);
  chars[start..end].iter().collect::<String>().trim().to_owned()
}

#[derive(Default)]
struct FakeState {
  objects: HashMap<ObjId, FakeObject>,
  next_object: ObjId,
  windows: Vec<(JavaWindow, ObjId)>,
  focused: Option<ObjId>,
  outstanding: HashMap<i64, ObjId>,
  ever: HashMap<i64, ObjId>,
  next_ref: i64,
  acquired: usize,
  released: usize,
  bad_releases: usize,
  failing: HashSet<&'static str>,
  calls: HashMap<&'static str, usize>,
  listener_calls: Vec<(EventCategory, bool)>,
  performed: Vec<(ObjId, String)>,
  focus_requests: Vec<ObjId>,
  shut_down: bool,
}

impl FakeState {
  fn acquire(&mut self, obj: ObjId) -> ContextRef {
    self.next_ref += 1;
    let raw = 0x1000 + self.next_ref;
    self.outstanding.insert(raw, obj);
    self.ever.insert(raw, obj);
    self.acquired += 1;
    ContextRef::new(VM, ObjectRef(raw))
  }

  fn lookup(&self, ctx: ContextRef) -> JabioResult<ObjId> {
    self
      .outstanding
      .get(&ctx.object.0)
      .copied()
      .ok_or(JabioError::call_failed("stale reference"))
  }

  fn call(&mut self, operation: &'static str) -> JabioResult<()> {
    *self.calls.entry(operation).or_default() += 1;
    if self.failing.contains(operation) {
      return Err(JabioError::call_failed(operation));
    }
    Ok(())
  }

  fn new_object(&mut self, role: &str, name: &str, parent: Option<ObjId>) -> ObjId {
    self.next_object += 1;
    let id = self.next_object;
    let info = ContextInfo {
      name: name.to_owned(),
      role: role.to_owned(),
      role_en_us: role.to_owned(),
      states: ContextInfo::parse_states("enabled,visible,showing"),
      states_en_us: ContextInfo::parse_states("enabled,visible,showing"),
      bounds: Bounds::new(0, 0, 10, 10),
      accessible_component: true,
      accessible_action: true,
      ..ContextInfo::default()
    };
    self.objects.insert(
      id,
      FakeObject {
        info,
        parent,
        actions: vec!["click".to_owned()],
        caret: -1,
        ..FakeObject::default()
      },
    );
    id
  }

  fn info_of(&self, obj: ObjId) -> ContextInfo {
    let object = &self.objects[&obj];
    let mut info = object.info.clone();
    info.children_count = i32::try_from(object.children.len()).unwrap();
    info.index_in_parent = object
      .parent
      .and_then(|p| self.objects[&p].children.iter().position(|c| *c == obj))
      .map_or(-1, |i| i32::try_from(i).unwrap());
    info
  }
}

pub(crate) struct FakeBridge {
  state: Mutex<FakeState>,
  sink: Mutex<Option<Arc<CallbackRegistry>>>,
}

impl FakeBridge {
  pub(crate) fn new() -> Arc<Self> {
    let mut state = FakeState::default();
    state.objects.insert(EVENT_OBJECT, FakeObject::default());
    Arc::new(Self {
      state: Mutex::new(state),
      sink: Mutex::new(None),
    })
  }

  // -- scripting --------------------------------------------------------------

  pub(crate) fn add_window(&self, title: &str, pid: u32, root_role: &str) -> ObjId {
    let mut s = self.state.lock();
    let root = s.new_object(root_role, title, None);
    let hwnd = isize::try_from(s.windows.len()).unwrap() + 0x100;
    s.windows.push((
      JavaWindow {
        title: title.to_owned(),
        pid,
        hwnd,
      },
      root,
    ));
    root
  }

  pub(crate) fn window(&self, title: &str) -> JavaWindow {
    let s = self.state.lock();
    s.windows
      .iter()
      .find(|(w, _)| w.title == title)
      .map(|(w, _)| w.clone())
      .unwrap()
  }

  pub(crate) fn add_child(&self, parent: ObjId, role: &str, name: &str) -> ObjId {
    let mut s = self.state.lock();
    let child = s.new_object(role, name, Some(parent));
    s.objects.get_mut(&parent).unwrap().children.push(child);
    child
  }

  pub(crate) fn insert_child(&self, parent: ObjId, pos: usize, role: &str, name: &str) -> ObjId {
    let mut s = self.state.lock();
    let child = s.new_object(role, name, Some(parent));
    let children = &mut s.objects.get_mut(&parent).unwrap().children;
    let pos = pos.min(children.len());
    children.insert(pos, child);
    child
  }

  pub(crate) fn remove_child(&self, parent: ObjId, pos: usize) -> Option<ObjId> {
    let mut s = self.state.lock();
    let children = &mut s.objects.get_mut(&parent).unwrap().children;
    (pos < children.len()).then(|| children.remove(pos))
  }

  /// Make an existing object also appear as a child of `parent` (a cycle when
  /// `existing` is an ancestor).
  pub(crate) fn link_child(&self, parent: ObjId, existing: ObjId) {
    let mut s = self.state.lock();
    s.objects.get_mut(&parent).unwrap().children.push(existing);
  }

  pub(crate) fn children_of(&self, obj: ObjId) -> Vec<ObjId> {
    self.state.lock().objects[&obj].children.clone()
  }

  pub(crate) fn set_name(&self, obj: ObjId, name: &str) {
    self.state.lock().objects.get_mut(&obj).unwrap().info.name = name.to_owned();
  }

  pub(crate) fn set_states(&self, obj: ObjId, states: &str) {
    let mut s = self.state.lock();
    let info = &mut s.objects.get_mut(&obj).unwrap().info;
    info.states = ContextInfo::parse_states(states);
    info.states_en_us = ContextInfo::parse_states(states);
  }

  pub(crate) fn set_bounds(&self, obj: ObjId, bounds: Bounds) {
    self.state.lock().objects.get_mut(&obj).unwrap().info.bounds = bounds;
  }

  pub(crate) fn set_actions(&self, obj: ObjId, actions: &[&str]) {
    self.state.lock().objects.get_mut(&obj).unwrap().actions =
      actions.iter().map(|a| (*a).to_owned()).collect();
  }

  /// Give `obj` a text interface holding `text`, with the caret at the end.
  pub(crate) fn set_text(&self, obj: ObjId, text: &str) {
    let mut s = self.state.lock();
    let object = s.objects.get_mut(&obj).unwrap();
    object.info.accessible_text = true;
    object.text = text.to_owned();
    object.caret = i32::try_from(text.chars().count()).unwrap();
  }

  pub(crate) fn select_text(&self, obj: ObjId, start: usize, end: usize) {
    self.state.lock().objects.get_mut(&obj).unwrap().text_selection = (start, end);
  }

  pub(crate) fn set_value(&self, obj: ObjId, current: &str, minimum: &str, maximum: &str) {
    let mut s = self.state.lock();
    let object = s.objects.get_mut(&obj).unwrap();
    object.info.accessible_value = true;
    object.value = AccessibleValue {
      current: current.to_owned(),
      minimum: minimum.to_owned(),
      maximum: maximum.to_owned(),
    };
  }

  pub(crate) fn make_selectable(&self, obj: ObjId) {
    self.state.lock().objects.get_mut(&obj).unwrap().info.accessible_selection = true;
  }

  pub(crate) fn selected(&self, obj: ObjId) -> Vec<usize> {
    self.state.lock().objects[&obj].selected.iter().copied().collect()
  }

  pub(crate) fn set_focused(&self, obj: ObjId) {
    self.state.lock().focused = Some(obj);
  }

  pub(crate) fn fail(&self, operation: &'static str) {
    self.state.lock().failing.insert(operation);
  }

  pub(crate) fn heal(&self) {
    self.state.lock().failing.clear();
  }

  // -- inspection -------------------------------------------------------------

  /// Object a (possibly released) reference pointed at.
  pub(crate) fn object_of(&self, ctx: ContextRef) -> Option<ObjId> {
    self.state.lock().ever.get(&ctx.object.0).copied()
  }

  pub(crate) fn outstanding(&self) -> usize {
    self.state.lock().outstanding.len()
  }

  pub(crate) fn acquired(&self) -> usize {
    self.state.lock().acquired
  }

  pub(crate) fn released(&self) -> usize {
    self.state.lock().released
  }

  pub(crate) fn bad_releases(&self) -> usize {
    self.state.lock().bad_releases
  }

  pub(crate) fn calls(&self, operation: &'static str) -> usize {
    self.state.lock().calls.get(operation).copied().unwrap_or(0)
  }

  pub(crate) fn listener_calls(&self) -> Vec<(EventCategory, bool)> {
    self.state.lock().listener_calls.clone()
  }

  pub(crate) fn performed(&self) -> Vec<(ObjId, String)> {
    self.state.lock().performed.clone()
  }

  pub(crate) fn focus_requests(&self) -> Vec<ObjId> {
    self.state.lock().focus_requests.clone()
  }

  pub(crate) fn text_of(&self, obj: ObjId) -> String {
    self.state.lock().objects[&obj].text.clone()
  }

  pub(crate) fn is_shut_down(&self) -> bool {
    self.state.lock().shut_down
  }

  pub(crate) fn has_sink(&self) -> bool {
    self.sink.lock().is_some()
  }

  // -- firing callbacks (the test thread plays the pump thread) --------------

  fn sink(&self) -> Option<Arc<CallbackRegistry>> {
    self.sink.lock().clone()
  }

  /// Fresh `(vm, event, source)` triple as the library would pass it.
  fn callback_args(&self, source: ObjId) -> (i32, i64, i64) {
    let mut s = self.state.lock();
    let event = s.acquire(EVENT_OBJECT);
    let source = s.acquire(source);
    (VM.0, event.object.0, source.object.0)
  }

  pub(crate) fn fire_visible_data_change(&self, obj: ObjId) {
    let (vm, event, source) = self.callback_args(obj);
    if let Some(sink) = self.sink() {
      sink.object_event(EventCategory::PropertyVisibleDataChange, vm, event, source);
    }
  }

  pub(crate) fn fire_child_change(&self, obj: ObjId, new_child: Option<ObjId>) {
    let (vm, event, source) = self.callback_args(obj);
    let new_child = new_child.map_or(0, |c| self.state.lock().acquire(c).object.0);
    if let Some(sink) = self.sink() {
      sink.object_pair(
        EventCategory::PropertyChildChange,
        vm,
        event,
        source,
        0,
        new_child,
      );
    }
  }

  pub(crate) fn fire_name_change(&self, obj: ObjId, old: &str, new: &str) {
    let (vm, event, source) = self.callback_args(obj);
    if let Some(sink) = self.sink() {
      sink.string_pair(
        EventCategory::PropertyNameChange,
        vm,
        event,
        source,
        Some(old.to_owned()),
        Some(new.to_owned()),
      );
    }
  }

  pub(crate) fn fire_state_change(&self, obj: ObjId, old: &str, new: &str) {
    let (vm, event, source) = self.callback_args(obj);
    if let Some(sink) = self.sink() {
      sink.string_pair(
        EventCategory::PropertyStateChange,
        vm,
        event,
        source,
        Some(old.to_owned()),
        Some(new.to_owned()),
      );
    }
  }

  pub(crate) fn fire_focus_gained(&self, obj: ObjId) {
    let (vm, event, source) = self.callback_args(obj);
    if let Some(sink) = self.sink() {
      sink.object_event(EventCategory::FocusGained, vm, event, source);
    }
  }

  pub(crate) fn fire_mouse_clicked(&self, obj: ObjId) {
    let (vm, event, source) = self.callback_args(obj);
    if let Some(sink) = self.sink() {
      sink.object_event(EventCategory::MouseClicked, vm, event, source);
    }
  }

  pub(crate) fn fire_caret_change(&self, obj: ObjId, old: i32, new: i32) {
    let (vm, event, source) = self.callback_args(obj);
    if let Some(sink) = self.sink() {
      sink.caret_change(vm, event, source, old, new);
    }
  }

  /// A generic property change whose source reference is null.
  pub(crate) fn fire_property_change_without_source(&self, property: &str) {
    let event = self.state.lock().acquire(EVENT_OBJECT).object.0;
    if let Some(sink) = self.sink() {
      sink.property_change(VM.0, event, 0, Some(property.to_owned()), None, None);
    }
  }
}

impl Bridge for FakeBridge {
  fn windows(&self) -> JabioResult<Vec<JavaWindow>> {
    let mut s = self.state.lock();
    s.call("enumerateWindows")?;
    Ok(s.windows.iter().map(|(w, _)| w.clone()).collect())
  }

  fn root_context(&self, window: &JavaWindow) -> JabioResult<ContextRef> {
    let mut s = self.state.lock();
    s.call("getAccessibleContextFromHWND")?;
    let root = s
      .windows
      .iter()
      .find(|(w, _)| w.hwnd == window.hwnd)
      .map(|(_, root)| *root);
    Ok(root.map_or(ContextRef::new(VM, ObjectRef::NULL), |r| s.acquire(r)))
  }

  fn focused_context(&self, _window: &JavaWindow) -> JabioResult<ContextRef> {
    let mut s = self.state.lock();
    s.call("getAccessibleContextWithFocus")?;
    Ok(match s.focused {
      Some(obj) => s.acquire(obj),
      None => ContextRef::new(VM, ObjectRef::NULL),
    })
  }

  fn context_info(&self, ctx: ContextRef) -> JabioResult<ContextInfo> {
    let mut s = self.state.lock();
    s.call("getAccessibleContextInfo")?;
    let obj = s.lookup(ctx)?;
    Ok(s.info_of(obj))
  }

  fn child_at(&self, ctx: ContextRef, index: i32) -> JabioResult<ContextRef> {
    let mut s = self.state.lock();
    s.call("getAccessibleChildFromContext")?;
    let obj = s.lookup(ctx)?;
    let child = usize::try_from(index)
      .ok()
      .and_then(|i| s.objects[&obj].children.get(i).copied());
    Ok(child.map_or(ContextRef::new(VM, ObjectRef::NULL), |c| s.acquire(c)))
  }

  fn parent(&self, ctx: ContextRef) -> JabioResult<ContextRef> {
    let mut s = self.state.lock();
    s.call("getAccessibleParentFromContext")?;
    let obj = s.lookup(ctx)?;
    Ok(match s.objects[&obj].parent {
      Some(p) => s.acquire(p),
      None => ContextRef::new(VM, ObjectRef::NULL),
    })
  }

  fn is_same_object(&self, a: ContextRef, b: ContextRef) -> bool {
    let mut s = self.state.lock();
    *s.calls.entry("isSameObject").or_default() += 1;
    match (s.lookup(a), s.lookup(b)) {
      (Ok(x), Ok(y)) => x == y,
      _ => false,
    }
  }

  fn release(&self, ctx: ContextRef) {
    let mut s = self.state.lock();
    if s.outstanding.remove(&ctx.object.0).is_some() {
      s.released += 1;
    } else {
      s.bad_releases += 1;
    }
  }

  fn visible_children_count(&self, ctx: ContextRef) -> JabioResult<i32> {
    let mut s = self.state.lock();
    s.call("getVisibleChildrenCount")?;
    let obj = s.lookup(ctx)?;
    let visible = s.objects[&obj]
      .children
      .iter()
      .filter(|c| s.objects[*c].info.states_en_us.contains("visible"))
      .count();
    Ok(i32::try_from(visible).unwrap())
  }

  fn visible_children(&self, ctx: ContextRef, start: i32) -> JabioResult<Vec<ContextRef>> {
    const BATCH: usize = 2;
    let mut s = self.state.lock();
    s.call("getVisibleChildren")?;
    let obj = s.lookup(ctx)?;
    let visible: Vec<ObjId> = s.objects[&obj]
      .children
      .iter()
      .copied()
      .filter(|c| s.objects[c].info.states_en_us.contains("visible"))
      .skip(usize::try_from(start).unwrap())
      .take(BATCH)
      .collect();
    Ok(visible.into_iter().map(|c| s.acquire(c)).collect())
  }

  fn virtual_name(&self, ctx: ContextRef) -> JabioResult<String> {
    let mut s = self.state.lock();
    s.call("getVirtualAccessibleName")?;
    let obj = s.lookup(ctx)?;
    let info = &s.objects[&obj].info;
    Ok(if info.name.is_empty() {
      info.role.clone()
    } else {
      info.name.clone()
    })
  }

  fn request_focus(&self, ctx: ContextRef) -> JabioResult<()> {
    let mut s = self.state.lock();
    s.call("requestFocus")?;
    let obj = s.lookup(ctx)?;
    s.focus_requests.push(obj);
    Ok(())
  }

  fn actions(&self, ctx: ContextRef) -> JabioResult<Vec<String>> {
    let mut s = self.state.lock();
    s.call("getAccessibleActions")?;
    let obj = s.lookup(ctx)?;
    Ok(s.objects[&obj].actions.clone())
  }

  fn do_actions(&self, ctx: ContextRef, actions: &[String]) -> JabioResult<()> {
    let mut s = self.state.lock();
    s.call("doAccessibleActions")?;
    let obj = s.lookup(ctx)?;
    for action in actions {
      s.performed.push((obj, action.clone()));
    }
    Ok(())
  }

  fn set_text_contents(&self, ctx: ContextRef, text: &str) -> JabioResult<()> {
    let mut s = self.state.lock();
    s.call("setTextContents")?;
    let obj = s.lookup(ctx)?;
    s.objects.get_mut(&obj).unwrap().text = text.to_owned();
    Ok(())
  }

  fn text_info(&self, ctx: ContextRef, x: i32, y: i32) -> JabioResult<TextInfo> {
    let mut s = self.state.lock();
    s.call("getAccessibleTextInfo")?;
    let obj = s.lookup(ctx)?;
    let object = &s.objects[&obj];
    let hit = object.info.bounds.contains(crate::types::Point::new(x, y));
    Ok(TextInfo {
      char_count: i32::try_from(object.text.chars().count()).unwrap(),
      caret_index: object.caret,
      index_at_point: if hit && !object.text.is_empty() { 0 } else { -1 },
    })
  }

  fn text_items(&self, ctx: ContextRef, index: i32) -> JabioResult<TextItems> {
    let mut s = self.state.lock();
    s.call("getAccessibleTextItems")?;
    let obj = s.lookup(ctx)?;
    let chars: Vec<char> = s.objects[&obj].text.chars().collect();
    let index = usize::try_from(index).unwrap_or(usize::MAX);
    Ok(TextItems {
      letter: chars.get(index).copied(),
      word: segment_at(&chars, index, char::is_whitespace),
      sentence: segment_at(&chars, index, |c| c == '.'),
    })
  }

  fn text_selection(&self, ctx: ContextRef) -> JabioResult<TextSelection> {
    let mut s = self.state.lock();
    s.call("getAccessibleTextSelectionInfo")?;
    let obj = s.lookup(ctx)?;
    let object = &s.objects[&obj];
    let (start, end) = object.text_selection;
    Ok(TextSelection {
      start: i32::try_from(start).unwrap(),
      end: i32::try_from(end).unwrap(),
      text: object.text.chars().skip(start).take(end.saturating_sub(start)).collect(),
    })
  }

  fn text_range(&self, ctx: ContextRef, start: i32, end: i32) -> JabioResult<String> {
    let mut s = self.state.lock();
    s.call("getAccessibleTextRange")?;
    let obj = s.lookup(ctx)?;
    let start = usize::try_from(start).unwrap_or(0);
    let end = usize::try_from(end).unwrap_or(0);
    Ok(
      s.objects[&obj]
        .text
        .chars()
        .skip(start)
        .take((end + 1).saturating_sub(start))
        .collect(),
    )
  }

  fn current_value(&self, ctx: ContextRef) -> JabioResult<String> {
    let mut s = self.state.lock();
    s.call("getCurrentAccessibleValueFromContext")?;
    let obj = s.lookup(ctx)?;
    Ok(s.objects[&obj].value.current.clone())
  }

  fn minimum_value(&self, ctx: ContextRef) -> JabioResult<String> {
    let mut s = self.state.lock();
    s.call("getMinimumAccessibleValueFromContext")?;
    let obj = s.lookup(ctx)?;
    Ok(s.objects[&obj].value.minimum.clone())
  }

  fn maximum_value(&self, ctx: ContextRef) -> JabioResult<String> {
    let mut s = self.state.lock();
    s.call("getMaximumAccessibleValueFromContext")?;
    let obj = s.lookup(ctx)?;
    Ok(s.objects[&obj].value.maximum.clone())
  }

  fn selection_count(&self, ctx: ContextRef) -> JabioResult<i32> {
    let mut s = self.state.lock();
    s.call("getAccessibleSelectionCountFromContext")?;
    let obj = s.lookup(ctx)?;
    Ok(i32::try_from(s.objects[&obj].selected.len()).unwrap())
  }

  fn is_child_selected(&self, ctx: ContextRef, index: i32) -> JabioResult<bool> {
    let mut s = self.state.lock();
    s.call("isAccessibleChildSelectedFromContext")?;
    let obj = s.lookup(ctx)?;
    let index = usize::try_from(index).unwrap_or(usize::MAX);
    Ok(s.objects[&obj].selected.contains(&index))
  }

  fn add_selection(&self, ctx: ContextRef, index: i32) -> JabioResult<()> {
    let mut s = self.state.lock();
    s.call("addAccessibleSelectionFromContext")?;
    let obj = s.lookup(ctx)?;
    let object = s.objects.get_mut(&obj).unwrap();
    let index = usize::try_from(index).unwrap_or(usize::MAX);
    if index < object.children.len() {
      object.selected.insert(index);
    }
    Ok(())
  }

  fn remove_selection(&self, ctx: ContextRef, index: i32) -> JabioResult<()> {
    let mut s = self.state.lock();
    s.call("removeAccessibleSelectionFromContext")?;
    let obj = s.lookup(ctx)?;
    let index = usize::try_from(index).unwrap_or(usize::MAX);
    s.objects.get_mut(&obj).unwrap().selected.remove(&index);
    Ok(())
  }

  fn clear_selection(&self, ctx: ContextRef) -> JabioResult<()> {
    let mut s = self.state.lock();
    s.call("clearAccessibleSelectionFromContext")?;
    let obj = s.lookup(ctx)?;
    s.objects.get_mut(&obj).unwrap().selected.clear();
    Ok(())
  }

  fn select_all(&self, ctx: ContextRef) -> JabioResult<()> {
    let mut s = self.state.lock();
    s.call("selectAllAccessibleSelectionFromContext")?;
    let obj = s.lookup(ctx)?;
    let object = s.objects.get_mut(&obj).unwrap();
    object.selected = (0..object.children.len()).collect();
    Ok(())
  }

  fn set_listener(&self, category: EventCategory, enabled: bool) -> JabioResult<()> {
    let mut s = self.state.lock();
    s.call("setListener")?;
    s.listener_calls.push((category, enabled));
    Ok(())
  }

  fn set_event_sink(&self, sink: Option<Arc<CallbackRegistry>>) {
    *self.sink.lock() = sink;
  }

  fn shutdown(&self) {
    self.state.lock().shut_down = true;
  }
}

/// Gateway and dispatcher wired to `fake` the way `Jabio` wires them.
pub(crate) fn wire(fake: &Arc<FakeBridge>) -> (crate::gateway::Gateway, crate::dispatch::Dispatcher) {
  let gateway = crate::gateway::Gateway::new(fake.clone());
  let dispatcher = crate::dispatch::Dispatcher::new(crate::dispatch::DEFAULT_WARN_THRESHOLD).unwrap();
  let registry = CallbackRegistry::new(gateway.downgrade(), dispatcher.clone());
  gateway.set_event_sink(Some(Arc::new(registry)));
  (gateway, dispatcher)
}
