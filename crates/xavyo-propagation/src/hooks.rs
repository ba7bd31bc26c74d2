//! Propagation Actions (Pre/Post Hooks)
//!
//! Resource-specific plugins invoked before and after the connector call.
//! Actions are created fresh for every execution by a
//! [`PropagationActionsFactory`] and run in order.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, instrument, warn};

use xavyo_connector::operation::ConnectorObject;

use crate::error::{PropagationError, PropagationResult};
use crate::mapping::ExternalResource;
use crate::task::{PropagationTask, TaskExecution};

/// Action execution errors.
#[derive(Debug, Error)]
pub enum ActionError {
    /// Action execution failed.
    #[error("Action execution failed: {message}")]
    ExecutionFailed { message: String },

    /// Action vetoed the propagation.
    #[error("Action rejected the propagation: {reason}")]
    Rejected { reason: String },
}

/// Result type for action operations.
pub type ActionResult<T> = Result<T, ActionError>;

/// How to handle action errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionCriticality {
    /// A `before` failure fails the execution.
    Fatal,
    /// Failure is logged, propagation continues.
    #[default]
    Partial,
    /// Failure is only logged at debug level.
    Ignore,
}

/// A pre/post propagation plugin.
#[async_trait]
pub trait PropagationActions: Send + Sync {
    /// Name used in logs and failure reasons.
    fn name(&self) -> &str;

    fn criticality(&self) -> ActionCriticality {
        ActionCriticality::Partial
    }

    /// Called after the remote object was read, before the connector call.
    async fn before(
        &self,
        _task: &PropagationTask,
        _before: Option<&ConnectorObject>,
    ) -> ActionResult<()> {
        Ok(())
    }

    /// Called once the execution is finished.
    async fn after(
        &self,
        _task: &PropagationTask,
        _execution: &TaskExecution,
        _after: Option<&ConnectorObject>,
    ) -> ActionResult<()> {
        Ok(())
    }
}

/// Creates the actions of one execution.
pub trait PropagationActionsFactory: Send + Sync {
    /// Fresh instances, in invocation order.
    fn create(&self, resource: &ExternalResource) -> Vec<Box<dyn PropagationActions>>;
}

/// Factory for resources without actions.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoActions;

impl PropagationActionsFactory for NoActions {
    fn create(&self, _resource: &ExternalResource) -> Vec<Box<dyn PropagationActions>> {
        Vec::new()
    }
}

/// The ordered actions of one execution.
pub struct ActionChain {
    actions: Vec<Box<dyn PropagationActions>>,
}

impl ActionChain {
    #[must_use]
    pub fn new(actions: Vec<Box<dyn PropagationActions>>) -> Self {
        Self { actions }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Run every `before` action; only a fatal failure stops the chain.
    #[instrument(skip_all, fields(task_id = %task.id(), actions = self.actions.len()))]
    pub async fn run_before(
        &self,
        task: &PropagationTask,
        before: Option<&ConnectorObject>,
    ) -> PropagationResult<()> {
        for action in &self.actions {
            let Err(e) = action.before(task, before).await else {
                continue;
            };
            match action.criticality() {
                ActionCriticality::Fatal => {
                    error!(action = action.name(), error = %e, "Fatal action failure, aborting propagation");
                    return Err(PropagationError::ActionFailed {
                        action: action.name().to_string(),
                        message: e.to_string(),
                    });
                }
                ActionCriticality::Partial => {
                    warn!(action = action.name(), error = %e, "Action failed, continuing");
                }
                ActionCriticality::Ignore => {
                    debug!(action = action.name(), error = %e, "Ignoring action failure");
                }
            }
        }
        Ok(())
    }

    /// Run every `after` action. Failures never change the outcome.
    #[instrument(skip_all, fields(task_id = %task.id(), actions = self.actions.len()))]
    pub async fn run_after(
        &self,
        task: &PropagationTask,
        execution: &TaskExecution,
        after: Option<&ConnectorObject>,
    ) {
        for action in &self.actions {
            if let Err(e) = action.after(task, execution, after).await {
                match action.criticality() {
                    ActionCriticality::Ignore => {
                        debug!(action = action.name(), error = %e, "Ignoring action failure");
                    }
                    ActionCriticality::Fatal | ActionCriticality::Partial => {
                        warn!(action = action.name(), error = %e, "After action failed");
                    }
                }
            }
        }
    }
}
