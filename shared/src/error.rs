use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    Add,
    Update,
    Delete,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MutationKind::Add => "add",
            MutationKind::Update => "update",
            MutationKind::Delete => "delete",
        })
    }
}

/// Everything a list view can fail at. None of these are retried; each is
/// shown to the user once and the view keeps running.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("task text must not be empty")]
    EmptyText,

    #[error("task subscription failed: {0}")]
    Subscription(String),

    #[error("failed to {op} task: {message}")]
    Mutation { op: MutationKind, message: String },
}

impl TaskError {
    pub fn mutation(op: MutationKind, err: impl fmt::Display) -> Self {
        TaskError::Mutation {
            op,
            message: err.to_string(),
        }
    }

    /// Text for the blocking notification shown to the user.
    pub fn notice(&self) -> &'static str {
        match self {
            TaskError::EmptyText => "Please enter a task.",
            TaskError::Subscription(_) => "Error: there was a problem loading tasks.",
            TaskError::Mutation { op: MutationKind::Add, .. } => {
                "Error: there was a problem adding the task."
            }
            TaskError::Mutation { op: MutationKind::Update, .. } => {
                "Error: there was a problem updating the task."
            }
            TaskError::Mutation { op: MutationKind::Delete, .. } => {
                "Error: there was a problem deleting the task."
            }
        }
    }
}
