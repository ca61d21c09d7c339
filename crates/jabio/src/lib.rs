/*!
Jabio - Java Access Bridge I/O

Safe callbacks and a cached accessible-context tree over the Java Access
Bridge library.

```ignore
use jabio::{Recency, SearchElement};

// Load the bridge and register every callback category
let jabio = jabio::initialize()?;

// Attach to a window: exact title, else the first title starting with it
let tree = jabio.attach("Calculator")?;

// Children are fetched on first access and cached
let buttons = tree.find_all(&SearchElement::new().role("push button"))?;
buttons[0].click()?;

// Property reads with explicit recency
let info = tree.root().properties(Recency::Current)?;

// Events, in the order the bridge raised them
let events = jabio.subscribe();
for event in events.iter() {
    // handle event
}

// Releases every remote reference exactly once
jabio.shutdown()?;
```

On Windows the pump thread (the thread that called `initialize`) must
dispatch window messages for callbacks to arrive; see `jabio::pump`.
*/

mod bridge;
mod callbacks;
mod core;
mod dispatch;
mod gateway;
mod handle;
mod search;
mod tree;

mod types;
pub use types::*;

#[cfg(windows)]
pub use crate::bridge::pump;
pub use crate::bridge::Bridge;
pub use crate::callbacks::CallbackRegistry;
pub use crate::core::{initialize, Jabio, JabioBuilder};
pub use crate::dispatch::{EventFilter, Subscription};
pub use crate::handle::{HandleRef, SharedHandle};
pub use crate::search::{Predicate, SearchElement, SearchResults, TextMatch, Truncation};
pub use crate::tree::{ContextNode, ContextTree};
