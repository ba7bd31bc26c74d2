//! Persistence collaborators.
//!
//! The executor saves tasks and appends executions through a [`TaskStore`],
//! and re-reads a subject's resource assignments through a
//! [`SubjectDirectory`]. In-memory implementations are provided for tests and
//! embedding.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use thiserror::Error;

use crate::ids::{ExecutionId, SubjectKey, TaskId};
use crate::subject::SubjectKind;
use crate::task::{PropagationTask, TaskExecution};

/// Persistence errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store unavailable: {message}")]
    Unavailable { message: String },

    #[error("Task not found: {task_id}")]
    TaskNotFound { task_id: TaskId },

    #[error("Subject not found: {kind} {key}")]
    SubjectNotFound { kind: SubjectKind, key: SubjectKey },
}

/// Result type for persistence operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Stores tasks and their executions.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn save_task(&self, task: &PropagationTask) -> StoreResult<()>;

    /// Register an execution on its task; the identifier becomes durable on
    /// the next [`flush`](TaskStore::flush).
    async fn append_execution(
        &self,
        task: &PropagationTask,
        execution: &TaskExecution,
    ) -> StoreResult<ExecutionId>;

    async fn flush(&self) -> StoreResult<()>;
}

/// Authoritative view of subjects' resource assignments.
#[async_trait]
pub trait SubjectDirectory: Send + Sync {
    /// Resources currently assigned to the subject.
    async fn resource_names(&self, kind: SubjectKind, key: SubjectKey)
        -> StoreResult<Vec<String>>;
}

#[derive(Debug, Default)]
struct StoreState {
    tasks: HashMap<TaskId, PropagationTask>,
    pending: Vec<TaskExecution>,
    executions: HashMap<TaskId, Vec<TaskExecution>>,
    flushes: usize,
}

/// Process-local [`TaskStore`].
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    state: Mutex<StoreState>,
}

impl InMemoryTaskStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn task(&self, task_id: TaskId) -> Option<PropagationTask> {
        self.state().tasks.get(&task_id).cloned()
    }

    /// Flushed executions of a task.
    #[must_use]
    pub fn executions(&self, task_id: TaskId) -> Vec<TaskExecution> {
        self.state()
            .executions
            .get(&task_id)
            .cloned()
            .unwrap_or_default()
    }

    #[must_use]
    pub fn flush_count(&self) -> usize {
        self.state().flushes
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn save_task(&self, task: &PropagationTask) -> StoreResult<()> {
        self.state().tasks.insert(task.id(), task.clone());
        Ok(())
    }

    async fn append_execution(
        &self,
        task: &PropagationTask,
        execution: &TaskExecution,
    ) -> StoreResult<ExecutionId> {
        let mut state = self.state();
        if !state.tasks.contains_key(&task.id()) {
            return Err(StoreError::TaskNotFound { task_id: task.id() });
        }
        let id = ExecutionId::new();
        state.pending.push(execution.clone().with_id(id));
        Ok(id)
    }

    async fn flush(&self) -> StoreResult<()> {
        let mut state = self.state();
        let pending = std::mem::take(&mut state.pending);
        for execution in pending {
            state
                .executions
                .entry(execution.task_id())
                .or_default()
                .push(execution);
        }
        state.flushes += 1;
        Ok(())
    }
}

/// Process-local [`SubjectDirectory`].
#[derive(Debug, Default)]
pub struct InMemorySubjectDirectory {
    assignments: Mutex<HashMap<(SubjectKind, SubjectKey), Vec<String>>>,
}

impl InMemorySubjectDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the resources assigned to a subject.
    pub fn assign(&self, kind: SubjectKind, key: SubjectKey, resources: Vec<String>) {
        self.assignments
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((kind, key), resources);
    }
}

#[async_trait]
impl SubjectDirectory for InMemorySubjectDirectory {
    async fn resource_names(
        &self,
        kind: SubjectKind,
        key: SubjectKey,
    ) -> StoreResult<Vec<String>> {
        self.assignments
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(kind, key))
            .cloned()
            .ok_or(StoreError::SubjectNotFound { kind, key })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::ExternalResource;
    use crate::task::ExecutionStatus;
    use xavyo_connector::types::OperationType;

    fn task() -> PropagationTask {
        PropagationTask::builder(
            OperationType::Create,
            SubjectKind::User,
            SubjectKey::new(),
            ExternalResource::new("ldap", "ldap-connector"),
        )
        .build()
    }

    #[tokio::test]
    async fn test_executions_visible_after_flush() {
        let store = InMemoryTaskStore::new();
        let task = task();
        store.save_task(&task).await.unwrap();

        let execution = TaskExecution::started(task.id()).finish(ExecutionStatus::Success, None, 1000);
        let id = store.append_execution(&task, &execution).await.unwrap();
        assert!(store.executions(task.id()).is_empty());

        store.flush().await.unwrap();
        let stored = store.executions(task.id());
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id(), Some(id));
        assert_eq!(store.flush_count(), 1);
    }

    #[tokio::test]
    async fn test_append_requires_saved_task() {
        let store = InMemoryTaskStore::new();
        let task = task();
        let execution = TaskExecution::started(task.id());
        assert!(matches!(
            store.append_execution(&task, &execution).await,
            Err(StoreError::TaskNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_subject_directory() {
        let directory = InMemorySubjectDirectory::new();
        let key = SubjectKey::new();
        directory.assign(SubjectKind::User, key, vec!["ldap".to_string()]);
        assert_eq!(
            directory.resource_names(SubjectKind::User, key).await.unwrap(),
            vec!["ldap".to_string()]
        );
        assert!(directory
            .resource_names(SubjectKind::Role, key)
            .await
            .is_err());
    }
}
