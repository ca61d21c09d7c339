/*!
Owned remote references.

A [`HandleRef`] owns exactly one remote context reference. The reference is
released when the handle is dropped, or earlier through
[`HandleRef::release`]. Each handle carries a generation number registered
with the gateway, so use after release is detected locally instead of being
passed to the bridge (which would not notice).
*/

use crate::gateway::Gateway;
use crate::types::{ContextRef, JabioResult, VmId};
use std::sync::Arc;

/// Owner of one remote accessible-context reference.
///
/// Not `Clone`: there is exactly one owner per reference. Share it with
/// [`SharedHandle`] when several holders need it; the last one releases.
pub struct HandleRef {
  raw: ContextRef,
  generation: u64,
  gateway: Gateway,
}

/// A handle shared by several holders (events, subscribers).
pub type SharedHandle = Arc<HandleRef>;

impl HandleRef {
  pub(crate) const fn new(raw: ContextRef, generation: u64, gateway: Gateway) -> Self {
    Self {
      raw,
      generation,
      gateway,
    }
  }

  /// The raw reference. Only meaningful while [`is_live`](Self::is_live).
  pub const fn raw(&self) -> ContextRef {
    self.raw
  }

  pub const fn vm_id(&self) -> VmId {
    self.raw.vm_id
  }

  pub const fn generation(&self) -> u64 {
    self.generation
  }

  pub(crate) const fn gateway(&self) -> &Gateway {
    &self.gateway
  }

  /// Whether the remote reference is still held.
  pub fn is_live(&self) -> bool {
    self.gateway.is_live(self)
  }

  /// Release the remote reference now.
  ///
  /// Fails with `InvalidHandle` if it was already released.
  pub fn release(&self) -> JabioResult<()> {
    self.gateway.release(self)
  }

  /// Whether both handles refer to the same Java object.
  pub fn is_same(&self, other: &HandleRef) -> JabioResult<bool> {
    self.gateway.is_same(self, other)
  }
}

impl Drop for HandleRef {
  fn drop(&mut self) {
    self.gateway.release_if_live(self);
  }
}

impl std::fmt::Debug for HandleRef {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("HandleRef")
      .field("raw", &self.raw)
      .field("generation", &self.generation)
      .finish_non_exhaustive()
  }
}
