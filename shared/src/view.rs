//! List-view state for one mounted task list.
//!
//! The view never edits tasks itself. It holds whatever the last snapshot for
//! the current tab said, and throws it away when the tab changes. Every tab
//! switch issues a new [`Ticket`]; deliveries carrying an older ticket belong
//! to a subscription that has already been closed and are dropped.

use uuid::Uuid;

use crate::error::TaskError;
use crate::range::Tab;
use crate::task::Task;

/// Asked before a task is deleted.
pub const DELETE_CONFIRMATION: &str = "Are you sure you want to delete this task?";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket(u64);

#[derive(Debug, Clone, PartialEq)]
pub enum ListBody<'a> {
    Loading,
    Empty,
    Tasks(&'a [Task]),
}

#[derive(Debug, Clone)]
pub struct TaskListState {
    tab: Tab,
    generation: u64,
    tasks: Vec<Task>,
    loading: bool,
    last_error: Option<TaskError>,
}

impl Default for TaskListState {
    fn default() -> Self {
        Self::new(Tab::default())
    }
}

impl TaskListState {
    pub fn new(tab: Tab) -> Self {
        Self {
            tab,
            generation: 0,
            tasks: Vec::new(),
            loading: true,
            last_error: None,
        }
    }

    pub fn tab(&self) -> Tab {
        self.tab
    }

    /// Switches to `tab` and invalidates every earlier ticket.
    pub fn open(&mut self, tab: Tab) -> Ticket {
        self.tab = tab;
        self.generation += 1;
        self.tasks.clear();
        self.loading = true;
        self.last_error = None;
        Ticket(self.generation)
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        ticket.0 == self.generation
    }

    /// Replaces the cache with a full snapshot. Returns false for stale ones.
    pub fn apply_snapshot(&mut self, ticket: Ticket, tasks: Vec<Task>) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        self.tasks = tasks;
        self.loading = false;
        true
    }

    /// Records a subscription failure; the view stops waiting for data.
    pub fn apply_error(&mut self, ticket: Ticket, error: TaskError) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        self.loading = false;
        self.last_error = Some(error);
        true
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn find(&self, id: Uuid) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn last_error(&self) -> Option<&TaskError> {
        self.last_error.as_ref()
    }

    pub fn body(&self) -> ListBody<'_> {
        if self.loading {
            ListBody::Loading
        } else if self.tasks.is_empty() {
            ListBody::Empty
        } else {
            ListBody::Tasks(&self.tasks)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::NewTask;
    use chrono::{TimeZone, Utc};

    fn sample(text: &str) -> Task {
        let now = Utc.with_ymd_and_hms(2024, 3, 14, 9, 0, 0).unwrap();
        NewTask::from_input(text, now).unwrap().into_task(Uuid::new_v4())
    }

    #[test]
    fn loading_until_the_first_snapshot() {
        let mut state = TaskListState::new(Tab::Today);
        let ticket = state.open(Tab::Today);
        assert_eq!(state.body(), ListBody::Loading);

        assert!(state.apply_snapshot(ticket, vec![]));
        assert_eq!(state.body(), ListBody::Empty);

        let tasks = vec![sample("a")];
        assert!(state.apply_snapshot(ticket, tasks.clone()));
        assert_eq!(state.body(), ListBody::Tasks(&tasks));
    }

    #[test]
    fn stale_deliveries_are_dropped_after_a_tab_switch() {
        let mut state = TaskListState::default();
        let old = state.open(Tab::Today);
        let new = state.open(Tab::All);

        assert!(!state.apply_snapshot(old, vec![sample("from today")]));
        assert!(state.is_loading());

        assert!(state.apply_snapshot(new, vec![sample("from all")]));
        assert!(!state.apply_snapshot(old, vec![]));
        assert_eq!(state.tasks()[0].text, "from all");
        assert_eq!(state.tab(), Tab::All);
    }

    #[test]
    fn error_ends_loading() {
        let mut state = TaskListState::default();
        let ticket = state.open(Tab::Weekly);
        assert!(state.apply_error(ticket, TaskError::Subscription("denied".into())));
        assert!(!state.is_loading());
        assert_eq!(state.body(), ListBody::Empty);
        assert!(state.last_error().is_some());
    }

    #[test]
    fn switching_tabs_discards_the_cache() {
        let mut state = TaskListState::default();
        let ticket = state.open(Tab::Today);
        state.apply_snapshot(ticket, vec![sample("a")]);
        state.open(Tab::Monthly);
        assert!(state.tasks().is_empty());
        assert!(state.is_loading());
    }
}
