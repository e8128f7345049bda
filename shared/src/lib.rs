//! Types shared by the backend store and the browser frontend.
//!
//! Nothing in here performs I/O: the task model, the tab to time range
//! mapping, query evaluation and the list-view state machine are all plain
//! functions over values, so both sides of the wire agree on them.

pub mod error;
pub mod query;
pub mod range;
pub mod task;
pub mod view;

pub use error::{MutationKind, TaskError};
pub use query::{SortOrder, TaskFilter, TaskQuery};
pub use range::Tab;
pub use task::{CreateTaskRequest, NewTask, Task, TaskPatch};
pub use view::{ListBody, TaskListState, Ticket, DELETE_CONFIRMATION};
