//! Propagation task building.
//!
//! Refreshes the virtual attributes a resource maps, resolves the subject's
//! attributes and builds the immutable [`PropagationTask`] the executor
//! consumes.

use std::sync::Arc;

use tracing::{debug, info, instrument};

use xavyo_connector::types::OperationType;

use crate::error::PropagationResult;
use crate::mapping::{ExternalResource, SchemaSource};
use crate::resolver::{MappingResolver, ResolveRequest, VirAttrChanges};
use crate::subject::{Subject, SubjectKind};
use crate::task::PropagationTask;
use crate::vir_cache::{VirAttrCache, VirAttrSource, VirCacheKey};

/// What to propagate for one subject on one resource.
#[derive(Debug, Clone)]
pub struct TaskRequest {
    pub operation: OperationType,
    /// Clear-text password change.
    pub password: Option<String>,
    pub vir_changes: VirAttrChanges,
    /// Account id before a rename.
    pub old_account_id: Option<String>,
}

impl TaskRequest {
    #[must_use]
    pub fn new(operation: OperationType) -> Self {
        Self {
            operation,
            password: None,
            vir_changes: VirAttrChanges::default(),
            old_account_id: None,
        }
    }

    #[must_use]
    pub fn create() -> Self {
        Self::new(OperationType::Create)
    }

    #[must_use]
    pub fn update() -> Self {
        Self::new(OperationType::Update)
    }

    #[must_use]
    pub fn delete() -> Self {
        Self::new(OperationType::Delete)
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    #[must_use]
    pub fn with_vir_changes(mut self, changes: VirAttrChanges) -> Self {
        self.vir_changes = changes;
        self
    }

    pub fn with_old_account_id(mut self, old_account_id: impl Into<String>) -> Self {
        self.old_account_id = Some(old_account_id.into());
        self
    }
}

/// Builds propagation tasks.
pub struct PropagationManager {
    resolver: MappingResolver,
    vir_cache: Arc<dyn VirAttrCache>,
    vir_source: Option<Arc<dyn VirAttrSource>>,
}

impl PropagationManager {
    pub fn new(resolver: MappingResolver, vir_cache: Arc<dyn VirAttrCache>) -> Self {
        Self {
            resolver,
            vir_cache,
            vir_source: None,
        }
    }

    /// Source used to recompute expired virtual attributes.
    #[must_use]
    pub fn with_vir_source(mut self, source: Arc<dyn VirAttrSource>) -> Self {
        self.vir_source = Some(source);
        self
    }

    /// Expire the cached values of every virtual attribute `resource` maps
    /// for the subject, recompute them when a source is configured, and load
    /// the cached values back into the subject.
    ///
    /// A user's memberships are expired under the membership kind as well.
    /// Without a source the expired attributes are left unresolved.
    pub async fn refresh_virtual_attributes(
        &self,
        subject: &mut Subject,
        resource: &ExternalResource,
    ) -> PropagationResult<()> {
        let Some(mapping) = resource.mapping(subject.kind()) else {
            return Ok(());
        };

        let mut keys = Vec::new();
        for item in mapping.propagation_items() {
            if item.internal_kind.schema_source() != Some(SchemaSource::Virtual) {
                continue;
            }
            let owner = item.internal_kind.owner_kind();
            for holder in subject.related(owner) {
                keys.push(VirCacheKey::new(holder.kind(), holder.key(), &item.internal_name));
            }
            if subject.kind() == SubjectKind::User && owner != SubjectKind::Membership {
                for membership in subject.related(SubjectKind::Membership) {
                    keys.push(VirCacheKey::new(
                        SubjectKind::Membership,
                        membership.key(),
                        &item.internal_name,
                    ));
                }
            }
        }

        for key in &keys {
            self.vir_cache.expire(key);
        }
        debug!(subject = %subject.key(), expired = keys.len(), "Expired virtual attribute cache");

        for key in keys {
            if let Some(source) = &self.vir_source {
                if let Some(values) = source.fetch(&key).await? {
                    self.vir_cache.put(key.clone(), values);
                }
            }
            let values = self.vir_cache.get(&key);
            if let Some(attrs) = subject.attributes_mut(key.kind, key.subject) {
                if let Some(attr) = attrs
                    .virtual_attrs
                    .iter_mut()
                    .find(|a| a.schema.name == key.schema)
                {
                    attr.values = values;
                }
            }
        }
        Ok(())
    }

    /// Build the task propagating `request` for `subject` on `resource`.
    #[instrument(skip_all, fields(
        resource = %resource.key,
        subject = %subject.key(),
        operation = %request.operation
    ))]
    pub async fn create_task(
        &self,
        subject: &Subject,
        resource: &ExternalResource,
        request: &TaskRequest,
    ) -> PropagationResult<PropagationTask> {
        let mut subject = subject.clone();
        self.refresh_virtual_attributes(&mut subject, resource).await?;

        let resolved = self.resolver.resolve(&ResolveRequest {
            subject: &subject,
            resource,
            operation: request.operation,
            password: request.password.as_deref(),
            vir_changes: &request.vir_changes,
        })?;

        let old_account_id = request
            .old_account_id
            .clone()
            .filter(|old| resolved.account_id.as_deref() != Some(old.as_str()));

        let mut builder = PropagationTask::builder(
            request.operation,
            subject.kind(),
            subject.key(),
            resource.clone(),
        )
        .attributes(resolved.attributes)
        .old_account_id(old_account_id);
        if let Some(account_id) = resolved.account_id {
            builder = builder.account_id(account_id);
        }
        let task = builder.build();

        info!(
            task_id = %task.id(),
            account_id = ?task.account_id(),
            "Propagation task created"
        );
        Ok(task)
    }
}
