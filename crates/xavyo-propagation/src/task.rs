//! Propagation tasks and their executions.
//!
//! A [`PropagationTask`] is built once and never changed; each run of the
//! executor produces a [`TaskExecution`] which is frozen once finished.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use xavyo_connector::operation::AttributeSet;
use xavyo_connector::types::{OperationType, PropagationMode};

use crate::error::{PropagationError, PropagationResult};
use crate::ids::{ExecutionId, SubjectKey, TaskId};
use crate::mapping::ExternalResource;
use crate::subject::SubjectKind;

/// Status of one execution.
///
/// One-phase: `Created -> Success | Failure`. Two-phase:
/// `Created -> Submitted | Unsubmitted`, later reported as
/// `Success | Failure`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Created,
    Success,
    Failure,
    Submitted,
    Unsubmitted,
}

impl ExecutionStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Created => "created",
            ExecutionStatus::Success => "success",
            ExecutionStatus::Failure => "failure",
            ExecutionStatus::Submitted => "submitted",
            ExecutionStatus::Unsubmitted => "unsubmitted",
        }
    }

    /// Status reached by a finished connector call.
    #[must_use]
    pub fn outcome(mode: PropagationMode, succeeded: bool) -> Self {
        match (mode, succeeded) {
            (PropagationMode::OnePhase, true) => ExecutionStatus::Success,
            (PropagationMode::OnePhase, false) => ExecutionStatus::Failure,
            (PropagationMode::TwoPhases, true) => ExecutionStatus::Submitted,
            (PropagationMode::TwoPhases, false) => ExecutionStatus::Unsubmitted,
        }
    }

    #[must_use]
    pub fn can_transition_to(&self, next: ExecutionStatus) -> bool {
        match self {
            ExecutionStatus::Created => next != ExecutionStatus::Created,
            ExecutionStatus::Submitted | ExecutionStatus::Unsubmitted => {
                matches!(next, ExecutionStatus::Success | ExecutionStatus::Failure)
            }
            ExecutionStatus::Success | ExecutionStatus::Failure => false,
        }
    }

    /// Whether the propagation went through (or was accepted for later).
    #[must_use]
    pub fn is_successful(&self) -> bool {
        matches!(self, ExecutionStatus::Success | ExecutionStatus::Submitted)
    }

    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, ExecutionStatus::Failure | ExecutionStatus::Unsubmitted)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classification of a failed execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Validation,
    Timeout,
    Remote,
    Internal,
}

impl From<&PropagationError> for FailureKind {
    fn from(err: &PropagationError) -> Self {
        match err {
            PropagationError::Validation { .. } | PropagationError::InvalidPolicy(_) => {
                FailureKind::Validation
            }
            PropagationError::RemoteTimeout { .. } => FailureKind::Timeout,
            PropagationError::RemoteOperation { .. } | PropagationError::ConnectorNotFound { .. } => {
                FailureKind::Remote
            }
            _ => FailureKind::Internal,
        }
    }
}

/// One run of a propagation task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskExecution {
    id: Option<ExecutionId>,
    task_id: TaskId,
    status: ExecutionStatus,
    start: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
    /// Short failure reason.
    message: Option<String>,
    /// Full diagnostic trace, kept apart from the short reason.
    diagnostic: Option<String>,
    failure_kind: Option<FailureKind>,
}

impl TaskExecution {
    /// A new execution in `Created` status, started now.
    #[must_use]
    pub fn started(task_id: TaskId) -> Self {
        Self {
            id: None,
            task_id,
            status: ExecutionStatus::Created,
            start: Utc::now(),
            end: None,
            message: None,
            diagnostic: None,
            failure_kind: None,
        }
    }

    /// Freeze the execution with its outcome.
    #[must_use]
    pub fn finish(
        mut self,
        status: ExecutionStatus,
        failure: Option<&PropagationError>,
        max_reason_length: usize,
    ) -> Self {
        self.status = status;
        self.end = Some(Utc::now());
        if let Some(err) = failure {
            self.message = Some(truncate(&err.short_reason(), max_reason_length));
            self.diagnostic = Some(err.diagnostic());
            self.failure_kind = Some(FailureKind::from(err));
        }
        self
    }

    /// Attach the identifier assigned by the task store.
    #[must_use]
    pub fn with_id(mut self, id: ExecutionId) -> Self {
        self.id = Some(id);
        self
    }

    /// Record the out-of-band outcome of a two-phase execution.
    ///
    /// Produces a new finished execution; `self` is left untouched.
    pub fn report(
        &self,
        outcome: ExecutionStatus,
        message: Option<String>,
    ) -> PropagationResult<TaskExecution> {
        let reportable = matches!(
            self.status,
            ExecutionStatus::Submitted | ExecutionStatus::Unsubmitted
        );
        if !reportable || !self.status.can_transition_to(outcome) {
            return Err(PropagationError::InvalidTransition {
                from: self.status,
                to: outcome,
            });
        }
        let now = Utc::now();
        Ok(TaskExecution {
            id: None,
            task_id: self.task_id,
            status: outcome,
            start: now,
            end: Some(now),
            message,
            diagnostic: None,
            failure_kind: None,
        })
    }

    #[must_use]
    pub fn id(&self) -> Option<ExecutionId> {
        self.id
    }

    #[must_use]
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    #[must_use]
    pub fn status(&self) -> ExecutionStatus {
        self.status
    }

    #[must_use]
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    #[must_use]
    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.end
    }

    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    #[must_use]
    pub fn diagnostic(&self) -> Option<&str> {
        self.diagnostic.as_deref()
    }

    #[must_use]
    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.failure_kind
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// One requested create, update or delete of a subject on a resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropagationTask {
    id: TaskId,
    operation: OperationType,
    subject_kind: SubjectKind,
    subject_key: SubjectKey,
    resource: ExternalResource,
    object_class: String,
    attributes: AttributeSet,
    account_id: Option<String>,
    /// Previous account id when a rename is in flight.
    old_account_id: Option<String>,
    mode: PropagationMode,
}

impl PropagationTask {
    /// Start building a task; mode and object class default from the resource.
    pub fn builder(
        operation: OperationType,
        subject_kind: SubjectKind,
        subject_key: SubjectKey,
        resource: ExternalResource,
    ) -> PropagationTaskBuilder {
        PropagationTaskBuilder {
            operation,
            subject_kind,
            subject_key,
            mode: resource.propagation_mode,
            object_class: resource
                .mapping(subject_kind)
                .map(|m| m.object_class.clone())
                .unwrap_or_default(),
            resource,
            attributes: AttributeSet::new(),
            account_id: None,
            old_account_id: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> TaskId {
        self.id
    }

    #[must_use]
    pub fn operation(&self) -> OperationType {
        self.operation
    }

    #[must_use]
    pub fn subject_kind(&self) -> SubjectKind {
        self.subject_kind
    }

    #[must_use]
    pub fn subject_key(&self) -> SubjectKey {
        self.subject_key
    }

    #[must_use]
    pub fn resource(&self) -> &ExternalResource {
        &self.resource
    }

    #[must_use]
    pub fn object_class(&self) -> &str {
        &self.object_class
    }

    #[must_use]
    pub fn attributes(&self) -> &AttributeSet {
        &self.attributes
    }

    #[must_use]
    pub fn account_id(&self) -> Option<&str> {
        self.account_id.as_deref()
    }

    #[must_use]
    pub fn old_account_id(&self) -> Option<&str> {
        self.old_account_id.as_deref()
    }

    #[must_use]
    pub fn mode(&self) -> PropagationMode {
        self.mode
    }
}

/// Builder for [`PropagationTask`].
#[derive(Debug)]
pub struct PropagationTaskBuilder {
    operation: OperationType,
    subject_kind: SubjectKind,
    subject_key: SubjectKey,
    resource: ExternalResource,
    object_class: String,
    attributes: AttributeSet,
    account_id: Option<String>,
    old_account_id: Option<String>,
    mode: PropagationMode,
}

impl PropagationTaskBuilder {
    pub fn object_class(mut self, object_class: impl Into<String>) -> Self {
        self.object_class = object_class.into();
        self
    }

    #[must_use]
    pub fn attributes(mut self, attributes: AttributeSet) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn account_id(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    #[must_use]
    pub fn old_account_id(mut self, old_account_id: Option<String>) -> Self {
        self.old_account_id = old_account_id;
        self
    }

    #[must_use]
    pub fn mode(mut self, mode: PropagationMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn build(self) -> PropagationTask {
        PropagationTask {
            id: TaskId::new(),
            operation: self.operation,
            subject_kind: self.subject_kind,
            subject_key: self.subject_key,
            resource: self.resource,
            object_class: self.object_class,
            attributes: self.attributes,
            account_id: self.account_id,
            old_account_id: self.old_account_id,
            mode: self.mode,
        }
    }
}
