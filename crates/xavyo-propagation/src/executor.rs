//! Propagation Executor
//!
//! Runs one [`PropagationTask`] against its resource's connector:
//! reads the remote object, decides between create, update, delete or
//! nothing, records the execution, emits audit and notification events and
//! runs the resource's actions.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, instrument, warn};

use xavyo_connector::operation::{
    AttributeSet, ConnectorObject, OperationOptions, Uid, NAME_ATTR, PASSWORD_ATTR, UID_ATTR,
};
use xavyo_connector::traits::FullConnector;
use xavyo_connector::types::OperationType;

use crate::config::PropagationConfig;
use crate::error::{PropagationError, PropagationResult};
use crate::events::{AuditSink, NotificationSink, PropagationEvent};
use crate::hooks::{ActionChain, NoActions, PropagationActionsFactory};
use crate::mapping::{ExternalResource, TraceLevel};
use crate::reporter::PropagationReporter;
use crate::resolver::{MANDATORY_MISSING_ATTR, MANDATORY_NULL_OR_EMPTY_ATTR};
use crate::store::{StoreError, SubjectDirectory, TaskStore};
use crate::task::{ExecutionStatus, PropagationTask, TaskExecution};

/// Resolves the connector bound to a resource.
#[async_trait]
pub trait ConnectorProvider: Send + Sync {
    /// Get the connector of a resource, `None` when it is not registered.
    async fn get_connector(&self, resource: &ExternalResource) -> Option<Arc<dyn FullConnector>>;
}

/// Executes propagation tasks.
pub struct PropagationExecutor {
    connector_provider: Arc<dyn ConnectorProvider>,
    task_store: Arc<dyn TaskStore>,
    subject_directory: Arc<dyn SubjectDirectory>,
    audit_sink: Arc<dyn AuditSink>,
    notification_sink: Arc<dyn NotificationSink>,
    actions_factory: Arc<dyn PropagationActionsFactory>,
    config: PropagationConfig,
}

impl PropagationExecutor {
    pub fn new(
        connector_provider: Arc<dyn ConnectorProvider>,
        task_store: Arc<dyn TaskStore>,
        subject_directory: Arc<dyn SubjectDirectory>,
        audit_sink: Arc<dyn AuditSink>,
        notification_sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            connector_provider,
            task_store,
            subject_directory,
            audit_sink,
            notification_sink,
            actions_factory: Arc::new(NoActions),
            config: PropagationConfig::default(),
        }
    }

    /// Set the factory creating per-execution actions.
    #[must_use]
    pub fn with_actions_factory(mut self, factory: Arc<dyn PropagationActionsFactory>) -> Self {
        self.actions_factory = factory;
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: PropagationConfig) -> Self {
        self.config = config;
        self
    }

    /// Execute a task once.
    ///
    /// Connector failures end up in the returned execution. Only a create
    /// refused for mandatory attributes without values is returned as
    /// [`PropagationError::Validation`]; the connector is never called then.
    #[instrument(skip_all, fields(
        task_id = %task.id(),
        resource = %task.resource().key,
        operation = %task.operation(),
        account_id = ?task.account_id()
    ))]
    pub async fn execute(&self, task: &PropagationTask) -> PropagationResult<TaskExecution> {
        let execution = TaskExecution::started(task.id());
        let actions = ActionChain::new(self.actions_factory.create(task.resource()));
        let connector = self.connector_provider.get_connector(task.resource()).await;

        let mut before = None;
        let result = self
            .propagate(task, connector.as_deref(), &actions, &mut before)
            .await;

        let (status, failure, attempted) = match result {
            Ok(attempted) => (ExecutionStatus::outcome(task.mode(), true), None, attempted),
            Err(e @ PropagationError::Validation { .. }) => {
                warn!(error = %e, "Propagation rejected before reaching the connector");
                return Err(e);
            }
            Err(e) => {
                if e.is_timeout() {
                    warn!(error_code = e.error_code(), error = %e, "Propagation timed out");
                } else {
                    error!(error_code = e.error_code(), error = %e, "Propagation failed");
                }
                (ExecutionStatus::outcome(task.mode(), false), Some(e), true)
            }
        };
        let mut execution = execution.finish(status, failure.as_ref(), self.config.max_reason_length);

        let after = match connector.as_deref() {
            Some(connector) if self.config.fetch_after_state => {
                match self
                    .read_remote(connector, task, task.account_id())
                    .await
                {
                    Ok(after) => after,
                    Err(e) => {
                        warn!(error = %e, "Could not read remote object after propagation");
                        None
                    }
                }
            }
            _ => None,
        };

        if attempted && must_be_registered(task, status) {
            execution = self.register(task, execution).await;
        } else {
            debug!(%status, attempted, "Execution not registered");
        }

        let event = PropagationEvent::new(task, &execution, before, after);
        if let Err(e) = self.audit_sink.audit(&event).await {
            warn!(error = %e, event_type = %event.event_type(), "Audit sink rejected event");
        }
        if let Err(e) = self.notification_sink.notify(&event).await {
            warn!(error = %e, event_type = %event.event_type(), "Notification sink rejected event");
        }

        actions.run_after(task, &execution, event.after.as_ref()).await;

        info!(status = %execution.status(), "Propagation finished");
        Ok(execution)
    }

    /// Execute tasks in order.
    ///
    /// A failure on a resource flagged `propagation_priority` stops the
    /// batch; the remaining tasks are reported as not attempted.
    #[instrument(skip_all, fields(tasks = tasks.len()))]
    pub async fn execute_all(&self, tasks: &[PropagationTask], reporter: &mut PropagationReporter) {
        for (index, task) in tasks.iter().enumerate() {
            let failed = match self.execute(task).await {
                Ok(execution) => {
                    reporter.record_execution(task, &execution);
                    execution.status().is_failure()
                }
                Err(e) => {
                    reporter.record_rejection(task, &e);
                    true
                }
            };

            if failed && task.resource().propagation_priority {
                let remaining = &tasks[index + 1..];
                warn!(
                    resource = %task.resource().key,
                    skipped = remaining.len(),
                    "Priority resource failed, stopping propagation"
                );
                for skipped in remaining {
                    reporter.record_not_attempted(skipped, &task.resource().key);
                }
                return;
            }
        }
    }

    /// Run the connector part of the task.
    ///
    /// Returns whether the connector was asked to change anything.
    async fn propagate(
        &self,
        task: &PropagationTask,
        connector: Option<&dyn FullConnector>,
        actions: &ActionChain,
        before: &mut Option<ConnectorObject>,
    ) -> PropagationResult<bool> {
        let connector = connector.ok_or_else(|| PropagationError::ConnectorNotFound {
            resource: task.resource().key.clone(),
        })?;

        let before_id = task.old_account_id().or(task.account_id());
        *before = self.read_remote(connector, task, before_id).await?;

        actions.run_before(task, before.as_ref()).await?;

        match task.operation() {
            OperationType::Create | OperationType::Update => {
                self.create_or_update(connector, task, before.as_ref()).await
            }
            OperationType::Delete => self.delete(connector, task, before.as_ref()).await,
        }
    }

    async fn create_or_update(
        &self,
        connector: &dyn FullConnector,
        task: &PropagationTask,
        before: Option<&ConnectorObject>,
    ) -> PropagationResult<bool> {
        let mut attributes = task.attributes().clone();
        let mut without_value = Vec::new();
        for marker in [MANDATORY_MISSING_ATTR, MANDATORY_NULL_OR_EMPTY_ATTR] {
            if let Some(value) = attributes.remove(marker) {
                without_value.extend(value.as_strings().into_iter().map(str::to_string));
            }
        }
        let options = OperationOptions::new();

        let Some(before) = before else {
            if task.operation() == OperationType::Create && !without_value.is_empty() {
                return Err(PropagationError::Validation {
                    attributes: without_value,
                });
            }
            let uid = connector
                .create(task.mode(), task.object_class(), attributes, &options)
                .await
                .map_err(|e| PropagationError::from_connector(&task.resource().key, e))?;
            debug!(uid = %uid, "Remote object created");
            return Ok(true);
        };

        if !without_value.is_empty() {
            debug!(attributes = ?without_value, "Updating with mandatory attributes without value");
        }

        if let Some(name) = attributes.get_string(NAME_ATTR) {
            if name == before.name && before.uid.value() != name {
                debug!(name, "Remote name unchanged, not renaming");
                attributes.remove(NAME_ATTR);
            }
        }

        let current = before.full_attributes().restricted_to(&attributes);
        let changed = attributes.difference(&current);
        if changed.is_empty() {
            debug!(uid = %before.uid, "Remote object already up to date");
            return Ok(false);
        }

        let uid = connector
            .update(task.mode(), task.object_class(), &before.uid, changed, &options)
            .await
            .map_err(|e| PropagationError::from_connector(&task.resource().key, e))?;
        debug!(uid = %uid, "Remote object updated");
        Ok(true)
    }

    async fn delete(
        &self,
        connector: &dyn FullConnector,
        task: &PropagationTask,
        before: Option<&ConnectorObject>,
    ) -> PropagationResult<bool> {
        let Some(before) = before else {
            debug!("Remote object absent, nothing to delete");
            return Ok(false);
        };

        // The subject may have been re-assigned since the task was built.
        let resources = match self
            .subject_directory
            .resource_names(task.subject_kind(), task.subject_key())
            .await
        {
            Ok(resources) => resources,
            Err(StoreError::SubjectNotFound { .. }) => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        if resources.iter().any(|r| *r == task.resource().key) {
            info!("Subject still assigned to resource, updating instead of deleting");
            return self.create_or_update(connector, task, Some(before)).await;
        }

        connector
            .delete(task.mode(), task.object_class(), &before.uid, &OperationOptions::new())
            .await
            .map_err(|e| PropagationError::from_connector(&task.resource().key, e))?;
        debug!(uid = %before.uid, "Remote object deleted");
        Ok(true)
    }

    /// Read the remote object identified by `account_id`.
    ///
    /// Timeouts are errors; any other read failure counts as an absent object.
    async fn read_remote(
        &self,
        connector: &dyn FullConnector,
        task: &PropagationTask,
        account_id: Option<&str>,
    ) -> PropagationResult<Option<ConnectorObject>> {
        let Some(account_id) = account_id.filter(|id| !id.is_empty()) else {
            return Ok(None);
        };

        let uid_attribute = task
            .resource()
            .mapping(task.subject_kind())
            .and_then(|m| m.account_id_item())
            .map_or(UID_ATTR, |item| item.external_name.as_str());
        let uid = Uid::new(uid_attribute, account_id);
        let options = OperationOptions::new().with_attributes_to_get(attributes_to_get(task.attributes()));

        match connector
            .get(task.mode(), task.operation(), task.object_class(), &uid, &options)
            .await
        {
            Ok(object) => Ok(object),
            Err(e) if e.is_timeout() => Err(PropagationError::from_connector(&task.resource().key, e)),
            Err(e) => {
                debug!(error = %e, %uid, "Remote read failed, treating object as absent");
                Ok(None)
            }
        }
    }

    async fn register(&self, task: &PropagationTask, execution: TaskExecution) -> TaskExecution {
        let stored = async {
            self.task_store.save_task(task).await?;
            let id = self.task_store.append_execution(task, &execution).await?;
            self.task_store.flush().await?;
            Ok::<_, StoreError>(id)
        }
        .await;

        match stored {
            Ok(id) => execution.with_id(id),
            Err(e) => {
                error!(error = %e, "Could not register execution");
                execution
            }
        }
    }
}

fn must_be_registered(task: &PropagationTask, status: ExecutionStatus) -> bool {
    let trace = task.resource().trace_level(task.operation());
    trace == TraceLevel::All || (status.is_failure() && trace >= TraceLevel::Failures)
}

fn attributes_to_get(attributes: &AttributeSet) -> Vec<String> {
    attributes
        .names()
        .filter(|name| {
            !matches!(
                *name,
                MANDATORY_MISSING_ATTR | MANDATORY_NULL_OR_EMPTY_ATTR | PASSWORD_ATTR
            )
        })
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::SubjectKey;
    use crate::subject::SubjectKind;

    fn task(trace: TraceLevel) -> PropagationTask {
        let resource = ExternalResource::new("ldap", "ldap-connector").with_trace_level(trace);
        PropagationTask::builder(OperationType::Update, SubjectKind::User, SubjectKey::new(), resource)
            .build()
    }

    #[test]
    fn test_registration_follows_trace_level() {
        let all = task(TraceLevel::All);
        assert!(must_be_registered(&all, ExecutionStatus::Success));
        assert!(must_be_registered(&all, ExecutionStatus::Failure));

        let failures = task(TraceLevel::Failures);
        assert!(!must_be_registered(&failures, ExecutionStatus::Success));
        assert!(must_be_registered(&failures, ExecutionStatus::Failure));
        assert!(must_be_registered(&failures, ExecutionStatus::Unsubmitted));

        let none = task(TraceLevel::None);
        assert!(!must_be_registered(&none, ExecutionStatus::Failure));
    }

    #[test]
    fn test_markers_and_password_are_not_read() {
        let attributes = AttributeSet::new()
            .with("mail", "jdoe@x.org")
            .with(PASSWORD_ATTR, "secret")
            .with(MANDATORY_MISSING_ATTR, vec!["sn".to_string()]);
        assert_eq!(attributes_to_get(&attributes), vec!["mail".to_string()]);
    }
}
