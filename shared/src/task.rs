use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TaskError;

/// A task document as the store returns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Uuid,
    pub text: String,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
}

/// Fields written on insert. The store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub text: String,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
}

impl NewTask {
    /// Builds the insert for text typed by the user. New tasks are due at the
    /// moment they are created, which puts them on every dated tab for now.
    pub fn from_input(text: &str, now: DateTime<Utc>) -> Result<Self, TaskError> {
        if text.trim().is_empty() {
            return Err(TaskError::EmptyText);
        }

        Ok(Self {
            text: text.to_string(),
            completed: false,
            created_at: now,
            due_date: Some(now),
        })
    }

    pub fn into_task(self, id: Uuid) -> Task {
        Task {
            id,
            text: self.text,
            completed: self.completed,
            created_at: self.created_at,
            due_date: self.due_date,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateTaskRequest {
    pub text: String,
}

/// Partial update. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
}

impl TaskPatch {
    pub fn toggle(task: &Task) -> Self {
        Self {
            text: None,
            completed: Some(!task.completed),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.completed.is_none()
    }

    /// Applies the patch in place. Replacement text is rejected when blank so
    /// a stored task never loses its text.
    pub fn apply_to(&self, task: &mut Task) -> Result<(), TaskError> {
        if let Some(text) = &self.text {
            if text.trim().is_empty() {
                return Err(TaskError::EmptyText);
            }
            task.text = text.clone();
        }
        if let Some(completed) = self.completed {
            task.completed = completed;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 14, 10, 30, 0).unwrap()
    }

    #[test]
    fn new_task_is_open_and_due_now() {
        let draft = NewTask::from_input("buy milk", now()).unwrap();
        assert_eq!(draft.text, "buy milk");
        assert!(!draft.completed);
        assert_eq!(draft.created_at, now());
        assert_eq!(draft.due_date, Some(now()));
    }

    #[test]
    fn blank_input_is_rejected() {
        assert!(matches!(NewTask::from_input("", now()), Err(TaskError::EmptyText)));
        assert!(matches!(NewTask::from_input("  \t\n", now()), Err(TaskError::EmptyText)));
    }

    #[test]
    fn toggle_flips_only_completed() {
        let mut task = NewTask::from_input("write report", now()).unwrap().into_task(Uuid::new_v4());
        let before = task.clone();

        TaskPatch::toggle(&task).apply_to(&mut task).unwrap();
        assert!(task.completed);
        assert_eq!(task.text, before.text);
        assert_eq!(task.created_at, before.created_at);
        assert_eq!(task.due_date, before.due_date);

        TaskPatch::toggle(&task).apply_to(&mut task).unwrap();
        assert_eq!(task, before);
    }

    #[test]
    fn blank_replacement_text_is_rejected() {
        let mut task = NewTask::from_input("keep me", now()).unwrap().into_task(Uuid::new_v4());
        let patch = TaskPatch { text: Some(" ".into()), completed: Some(true) };
        assert!(patch.apply_to(&mut task).is_err());
        assert_eq!(task.text, "keep me");
        assert!(!task.completed);
    }

    #[test]
    fn wire_format_uses_document_field_names() {
        let mut task = NewTask::from_input("call mom", now()).unwrap().into_task(Uuid::nil());
        let json = serde_json::to_value(&task).unwrap();
        assert!(json.get("createdAt").is_some());
        assert!(json.get("dueDate").is_some());

        task.due_date = None;
        let json = serde_json::to_value(&task).unwrap();
        assert!(json.get("dueDate").is_none());
        let back: Task = serde_json::from_value(json).unwrap();
        assert_eq!(back.due_date, None);
    }
}
