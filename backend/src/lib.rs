//! Task store service for the tabbed to-do list.
//!
//! The store keeps the task collection, live queries push full snapshots to
//! whoever is watching a tab, and the HTTP layer exposes both to the browser.

pub mod clock;
pub mod config;
pub mod http;
pub mod live;
pub mod session;
pub mod store;

pub use clock::{Clock, FixedClock, SystemClock};
pub use live::{LiveEvent, Subscription};
pub use session::{Notifier, TaskListSession};
pub use store::{MemoryStore, RedisStore, StoreError, TaskStore};
