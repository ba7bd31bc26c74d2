//! Audit and notification events emitted by propagation.
//!
//! Every execution produces one [`PropagationEvent`], handed to the audit sink
//! and to the notification sink.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use xavyo_connector::operation::ConnectorObject;
use xavyo_connector::types::OperationType;

use crate::subject::SubjectKind;
use crate::task::{PropagationTask, TaskExecution};

/// Event sink errors.
#[derive(Debug, Error)]
pub enum EventError {
    /// Failed to serialize an event.
    #[error("Failed to serialize {event_type}: {cause}")]
    SerializationFailed { event_type: String, cause: String },

    /// The sink could not accept the event.
    #[error("Event sink unavailable: {message}")]
    SinkUnavailable { message: String },
}

/// Result type for event sinks.
pub type EventResult<T> = Result<T, EventError>;

/// Event category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Propagation,
}

/// Outcome carried by an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventOutcome {
    Success,
    Failure,
}

/// Event describing one finished propagation execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropagationEvent {
    pub event_id: Uuid,
    pub category: EventCategory,
    pub subject_type: SubjectKind,
    pub resource: String,
    pub operation: OperationType,
    pub result: EventOutcome,
    /// Remote object before the operation.
    pub before: Option<ConnectorObject>,
    /// Remote object after the operation.
    pub after: Option<ConnectorObject>,
    pub execution: TaskExecution,
    pub timestamp: DateTime<Utc>,
}

impl PropagationEvent {
    #[must_use]
    pub fn new(
        task: &PropagationTask,
        execution: &TaskExecution,
        before: Option<ConnectorObject>,
        after: Option<ConnectorObject>,
    ) -> Self {
        let result = if execution.status().is_failure() {
            EventOutcome::Failure
        } else {
            EventOutcome::Success
        };
        Self {
            event_id: Uuid::new_v4(),
            category: EventCategory::Propagation,
            subject_type: task.subject_kind(),
            resource: task.resource().key.clone(),
            operation: task.operation(),
            result,
            before,
            after,
            execution: execution.clone(),
            timestamp: Utc::now(),
        }
    }

    /// Fully qualified event type, e.g. `xavyo.propagation.user.create`.
    #[must_use]
    pub fn event_type(&self) -> String {
        format!(
            "xavyo.propagation.{}.{}",
            self.subject_type.as_str(),
            self.operation.as_str()
        )
    }

    /// Serialize the event to JSON bytes.
    pub fn to_json_bytes(&self) -> EventResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| EventError::SerializationFailed {
            event_type: self.event_type(),
            cause: e.to_string(),
        })
    }
}

/// Receives audit events.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn audit(&self, event: &PropagationEvent) -> EventResult<()>;
}

/// Receives notification triggers.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, event: &PropagationEvent) -> EventResult<()>;
}

/// Sink keeping every event in memory.
#[derive(Debug, Default)]
pub struct RecordingAuditSink {
    events: Mutex<Vec<PropagationEvent>>,
}

impl RecordingAuditSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Events received so far.
    #[must_use]
    pub fn events(&self) -> Vec<PropagationEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, event: &PropagationEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}

#[async_trait]
impl AuditSink for RecordingAuditSink {
    async fn audit(&self, event: &PropagationEvent) -> EventResult<()> {
        self.record(event);
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for RecordingAuditSink {
    async fn notify(&self, event: &PropagationEvent) -> EventResult<()> {
        self.record(event);
        Ok(())
    }
}
