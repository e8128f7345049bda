use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::range::Tab;
use crate::task::Task;

/// Which tasks a query selects. Both bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskFilter {
    DueWithin {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    Everything,
}

impl TaskFilter {
    /// Tasks without a due date never fall inside a dated window.
    pub fn matches(&self, task: &Task) -> bool {
        match self {
            TaskFilter::Everything => true,
            TaskFilter::DueWithin { start, end } => task
                .due_date
                .is_some_and(|due| *start <= due && due <= *end),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    DueDateAsc,
    CreatedAtDesc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskQuery {
    pub filter: TaskFilter,
    pub order: SortOrder,
}

impl TaskQuery {
    pub fn for_tab<Tz: TimeZone>(tab: Tab, now: &DateTime<Tz>) -> Self {
        let order = match tab {
            Tab::All => SortOrder::CreatedAtDesc,
            _ => SortOrder::DueDateAsc,
        };
        Self {
            filter: tab.filter(now),
            order,
        }
    }

    pub fn everything() -> Self {
        Self {
            filter: TaskFilter::Everything,
            order: SortOrder::CreatedAtDesc,
        }
    }

    pub fn matches(&self, task: &Task) -> bool {
        self.filter.matches(task)
    }

    /// Filters and orders `tasks` into a snapshot. The sort is stable, so
    /// tasks with equal keys keep the order they came in.
    pub fn evaluate<I>(&self, tasks: I) -> Vec<Task>
    where
        I: IntoIterator<Item = Task>,
    {
        let mut selected: Vec<Task> = tasks.into_iter().filter(|t| self.matches(t)).collect();
        match self.order {
            SortOrder::DueDateAsc => selected.sort_by_key(|t| t.due_date),
            SortOrder::CreatedAtDesc => {
                selected.sort_by(|a, b| b.created_at.cmp(&a.created_at))
            }
        }
        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    fn at(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, d, h, 0, 0).unwrap()
    }

    fn task(text: &str, created: DateTime<Utc>, due: Option<DateTime<Utc>>) -> Task {
        Task {
            id: Uuid::new_v4(),
            text: text.into(),
            completed: false,
            created_at: created,
            due_date: due,
        }
    }

    fn texts(tasks: &[Task]) -> Vec<&str> {
        tasks.iter().map(|t| t.text.as_str()).collect()
    }

    /// Thursday 2024-03-14; A due today, B due Monday, C undated.
    fn scenario() -> Vec<Task> {
        vec![
            task("C", at(1, 8), None),
            task("B", at(2, 8), Some(at(11, 0))),
            task("A", at(3, 8), Some(at(14, 9))),
        ]
    }

    #[test]
    fn today_selects_only_tasks_due_today() {
        let query = TaskQuery::for_tab(Tab::Today, &at(14, 12));
        assert_eq!(texts(&query.evaluate(scenario())), ["A"]);
    }

    #[test]
    fn weekly_orders_by_due_date_ascending() {
        let query = TaskQuery::for_tab(Tab::Weekly, &at(14, 12));
        assert_eq!(texts(&query.evaluate(scenario())), ["B", "A"]);
    }

    #[test]
    fn all_orders_by_creation_descending_and_keeps_undated_tasks() {
        let query = TaskQuery::for_tab(Tab::All, &at(14, 12));
        assert_eq!(texts(&query.evaluate(scenario())), ["A", "B", "C"]);
    }

    #[test]
    fn undated_tasks_never_match_a_dated_tab() {
        let now = at(14, 12);
        for tab in [Tab::Today, Tab::Weekly, Tab::Monthly, Tab::Yearly] {
            let snapshot = TaskQuery::for_tab(tab, &now).evaluate(scenario());
            assert!(snapshot.iter().all(|t| t.text != "C"), "{tab} leaked an undated task");
        }
    }

    #[test]
    fn bounds_are_inclusive_at_both_ends() {
        let now = at(14, 12);
        let TaskFilter::DueWithin { start, end } = Tab::Today.filter(&now) else {
            panic!("today is dated");
        };
        let query = TaskQuery::for_tab(Tab::Today, &now);

        assert!(query.matches(&task("first", now, Some(start))));
        assert!(query.matches(&task("last", now, Some(end))));
        assert!(!query.matches(&task("before", now, Some(start - Duration::milliseconds(1)))));
        assert!(!query.matches(&task("after", now, Some(end + Duration::milliseconds(1)))));
    }

    #[test]
    fn equal_keys_keep_input_order() {
        let due = Some(at(14, 9));
        let tasks = vec![
            task("first", at(1, 0), due),
            task("second", at(2, 0), due),
            task("third", at(3, 0), due),
        ];
        let query = TaskQuery::for_tab(Tab::Today, &at(14, 12));
        assert_eq!(texts(&query.evaluate(tasks)), ["first", "second", "third"]);
    }
}
