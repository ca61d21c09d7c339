/*! Core value types for jabio. */

#![allow(missing_docs)]

mod error;
mod event;
mod geometry;
mod ids;
mod info;
mod recency;
mod text;
mod window;

pub use error::{JabioError, JabioResult};
pub use event::{BridgeEvent, EventCategory, Property};
pub use geometry::{Bounds, Point};
pub use ids::{ContextRef, NodeId, ObjectRef, SubscriptionId, VmId};
pub use info::ContextInfo;
pub use recency::Recency;
pub use text::{AccessibleValue, TextInfo, TextItems, TextSelection};
pub use window::JavaWindow;
