//! Per-resource outcome of a batch of propagation tasks.

use serde::{Deserialize, Serialize};

use crate::error::PropagationError;
use crate::ids::TaskId;
use crate::task::{ExecutionStatus, PropagationTask, TaskExecution};

/// What happened to one task of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReportedOutcome {
    /// The task ran and finished with the given status.
    Executed { status: ExecutionStatus },
    /// The task was refused before reaching the connector.
    Rejected,
    /// The task was skipped because an earlier priority resource failed.
    NotAttempted,
}

/// Outcome of one task on one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropagationStatus {
    pub task_id: TaskId,
    pub resource: String,
    pub outcome: ReportedOutcome,
    pub message: Option<String>,
}

/// Collects the outcome of every task of a batch.
#[derive(Debug, Default, Clone)]
pub struct PropagationReporter {
    statuses: Vec<PropagationStatus>,
}

impl PropagationReporter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_execution(&mut self, task: &PropagationTask, execution: &TaskExecution) {
        self.statuses.push(PropagationStatus {
            task_id: task.id(),
            resource: task.resource().key.clone(),
            outcome: ReportedOutcome::Executed {
                status: execution.status(),
            },
            message: execution.message().map(str::to_string),
        });
    }

    pub fn record_rejection(&mut self, task: &PropagationTask, error: &PropagationError) {
        self.statuses.push(PropagationStatus {
            task_id: task.id(),
            resource: task.resource().key.clone(),
            outcome: ReportedOutcome::Rejected,
            message: Some(error.short_reason()),
        });
    }

    pub fn record_not_attempted(&mut self, task: &PropagationTask, failed_resource: &str) {
        self.statuses.push(PropagationStatus {
            task_id: task.id(),
            resource: task.resource().key.clone(),
            outcome: ReportedOutcome::NotAttempted,
            message: Some(format!(
                "Not attempted because of failure on priority resource {failed_resource}"
            )),
        });
    }

    #[must_use]
    pub fn statuses(&self) -> &[PropagationStatus] {
        &self.statuses
    }

    /// Outcome recorded for a resource, if any.
    #[must_use]
    pub fn status_of(&self, resource: &str) -> Option<&PropagationStatus> {
        self.statuses.iter().find(|s| s.resource == resource)
    }

    /// Whether any task failed or was refused.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.statuses.iter().any(|s| match &s.outcome {
            ReportedOutcome::Executed { status } => status.is_failure(),
            ReportedOutcome::Rejected => true,
            ReportedOutcome::NotAttempted => false,
        })
    }
}
