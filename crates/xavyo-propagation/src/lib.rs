//! # Propagation Engine
//!
//! Pushes identity changes from xavyo to external resources.
//!
//! This crate provides:
//! - Mapping resolution from users, roles and memberships to connector attributes
//! - Password generation honouring every applicable password policy
//! - Task execution against connectors, with idempotent updates and audit
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐     ┌────────────────────┐
//! │    Subject      │────►│ PropagationManager│────►│  PropagationTask   │
//! │ (user/role/...) │     │  + MappingResolver│     │   (immutable)      │
//! └─────────────────┘     └──────────────────┘     └─────────┬──────────┘
//!                                                             │
//!                          ┌──────────────────────────────────▼──────────┐
//!                          │             PropagationExecutor             │
//!                          │  read before ─► actions ─► create/update/   │
//!                          │  delete ─► read after ─► store ─► events    │
//!                          └─────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use xavyo_propagation::prelude::*;
//!
//! let manager = PropagationManager::new(MappingResolver::default(), cache);
//! let task = manager.create_task(&subject, &resource, &TaskRequest::create()).await?;
//!
//! let execution = executor.execute(&task).await?;
//! assert!(execution.status().is_successful());
//! ```

pub mod cipher;
pub mod config;
pub mod error;
pub mod events;
pub mod executor;
pub mod expression;
pub mod hooks;
pub mod ids;
pub mod manager;
pub mod mapping;
pub mod password;
pub mod reporter;
pub mod resolver;
pub mod schema;
pub mod store;
pub mod subject;
pub mod task;
pub mod vir_cache;

pub use cipher::{CipherAlgorithm, CipherError, PasswordCipher, StoredPassword};
pub use config::{ConfigError, PropagationConfig, PropagationConfigBuilder};
pub use error::{PropagationError, PropagationResult};
pub use events::{
    AuditSink, EventCategory, EventError, EventOutcome, EventResult, NotificationSink,
    PropagationEvent, RecordingAuditSink,
};
pub use executor::{ConnectorProvider, PropagationExecutor};
pub use hooks::{
    ActionChain, ActionCriticality, ActionError, ActionResult, NoActions, PropagationActions,
    PropagationActionsFactory,
};
pub use ids::{ExecutionId, SubjectKey, TaskId};
pub use manager::{PropagationManager, TaskRequest};
pub use mapping::{
    ExternalResource, InternalKind, Mapping, MappingError, MappingItem, MappingPurpose,
    SchemaSource, TraceLevel,
};
pub use password::{InvalidPolicyError, PasswordPolicySpec, PasswordSynthesizer};
pub use reporter::{PropagationReporter, PropagationStatus, ReportedOutcome};
pub use resolver::{
    MappingResolver, ResolveRequest, ResolvedAttributes, VirAttrChanges, MANDATORY_MISSING_ATTR,
    MANDATORY_NULL_OR_EMPTY_ATTR,
};
pub use schema::{
    AttrValue, DerAttr, DerSchema, PlainAttr, PlainSchema, SchemaError, SchemaType, VirAttr,
    VirSchema,
};
pub use store::{
    InMemorySubjectDirectory, InMemoryTaskStore, StoreError, StoreResult, SubjectDirectory,
    TaskStore,
};
pub use subject::{Attributable, Attributes, Membership, Role, RoleOwner, Subject, SubjectKind, User};
pub use task::{ExecutionStatus, FailureKind, PropagationTask, PropagationTaskBuilder, TaskExecution};
pub use vir_cache::{InMemoryVirAttrCache, VirAttrCache, VirAttrSource, VirCacheKey};

/// Everything needed to build and run propagation tasks.
pub mod prelude {
    pub use crate::error::{PropagationError, PropagationResult};
    pub use crate::events::{AuditSink, NotificationSink, PropagationEvent};
    pub use crate::executor::{ConnectorProvider, PropagationExecutor};
    pub use crate::manager::{PropagationManager, TaskRequest};
    pub use crate::mapping::{ExternalResource, InternalKind, Mapping, MappingItem, TraceLevel};
    pub use crate::reporter::PropagationReporter;
    pub use crate::resolver::{MappingResolver, VirAttrChanges};
    pub use crate::store::{SubjectDirectory, TaskStore};
    pub use crate::subject::{Subject, SubjectKind};
    pub use crate::task::{ExecutionStatus, PropagationTask, TaskExecution};
}
