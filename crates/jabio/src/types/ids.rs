/*! Branded ID types for remote references and cached nodes. */

use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Identifier of the Java VM a remote object lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
pub struct VmId(pub i32);

/// Opaque remote object reference (`JOBJECT64`). Zero is the null reference.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, From, Into,
)]
pub struct ObjectRef(pub i64);

impl ObjectRef {
  pub const NULL: Self = Self(0);

  pub const fn is_null(self) -> bool {
    self.0 == 0
  }
}

/// A raw accessible-context reference as the bridge hands it out.
///
/// Plain data: copying a `ContextRef` does not copy ownership. Ownership lives
/// in [`HandleRef`](crate::HandleRef).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[display("{vm_id}:{object}")]
pub struct ContextRef {
  pub vm_id: VmId,
  pub object: ObjectRef,
}

impl ContextRef {
  pub const fn new(vm_id: VmId, object: ObjectRef) -> Self {
    Self { vm_id, object }
  }

  pub const fn is_null(self) -> bool {
    self.object.is_null()
  }
}

/// Cached node identifier, unique for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
pub struct NodeId(pub u32);

/// Starts at 1 (0 could be confused with "null").
static NODE_COUNTER: AtomicU32 = AtomicU32::new(1);

impl NodeId {
  pub fn new() -> Self {
    Self(NODE_COUNTER.fetch_add(1, Ordering::Relaxed))
  }
}

impl Default for NodeId {
  fn default() -> Self {
    Self::new()
  }
}

/// Dispatcher subscription identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
pub struct SubscriptionId(pub u64);

static SUBSCRIPTION_COUNTER: AtomicU64 = AtomicU64::new(1);

impl SubscriptionId {
  pub fn new() -> Self {
    Self(SUBSCRIPTION_COUNTER.fetch_add(1, Ordering::Relaxed))
  }
}

impl Default for SubscriptionId {
  fn default() -> Self {
    Self::new()
  }
}
