//! Resource mappings.
//!
//! A resource holds one mapping per subject kind. Each mapping item translates
//! one internal attribute, derived value or identity field into one external
//! attribute name.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use xavyo_connector::types::{OperationType, PropagationMode};

use crate::password::PasswordPolicySpec;
use crate::subject::SubjectKind;

/// Mapping definition errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MappingError {
    #[error("Resource {resource} has no {kind} mapping")]
    NoMapping { resource: String, kind: SubjectKind },

    #[error("Mapping of {resource} for {kind} must have exactly one account id item, found {count}")]
    AccountIdCount {
        resource: String,
        kind: SubjectKind,
        count: usize,
    },

    #[error("Mapping of {resource} for {kind} has {count} password items")]
    PasswordCount {
        resource: String,
        kind: SubjectKind,
        count: usize,
    },
}

/// Where a schema-backed value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaSource {
    Plain,
    Derived,
    Virtual,
}

/// What a mapping item reads on the internal side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InternalKind {
    UserPlain,
    UserDerived,
    UserVirtual,
    RolePlain,
    RoleDerived,
    RoleVirtual,
    MembershipPlain,
    MembershipDerived,
    MembershipVirtual,
    UserId,
    Username,
    RoleId,
    RoleName,
    RoleOwner,
    MembershipId,
    Password,
}

impl InternalKind {
    /// Kind of subject the value is read from.
    #[must_use]
    pub fn owner_kind(&self) -> SubjectKind {
        match self {
            InternalKind::UserPlain
            | InternalKind::UserDerived
            | InternalKind::UserVirtual
            | InternalKind::UserId
            | InternalKind::Username
            | InternalKind::Password => SubjectKind::User,
            InternalKind::RolePlain
            | InternalKind::RoleDerived
            | InternalKind::RoleVirtual
            | InternalKind::RoleId
            | InternalKind::RoleName
            | InternalKind::RoleOwner => SubjectKind::Role,
            InternalKind::MembershipPlain
            | InternalKind::MembershipDerived
            | InternalKind::MembershipVirtual
            | InternalKind::MembershipId => SubjectKind::Membership,
        }
    }

    /// Schema source, or `None` for identity pseudo-kinds.
    #[must_use]
    pub fn schema_source(&self) -> Option<SchemaSource> {
        match self {
            InternalKind::UserPlain | InternalKind::RolePlain | InternalKind::MembershipPlain => {
                Some(SchemaSource::Plain)
            }
            InternalKind::UserDerived
            | InternalKind::RoleDerived
            | InternalKind::MembershipDerived => Some(SchemaSource::Derived),
            InternalKind::UserVirtual
            | InternalKind::RoleVirtual
            | InternalKind::MembershipVirtual => Some(SchemaSource::Virtual),
            _ => None,
        }
    }
}

/// Directions a mapping item is used in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingPurpose {
    #[default]
    Both,
    Propagation,
    Synchronization,
    None,
}

impl MappingPurpose {
    #[must_use]
    pub fn includes_propagation(&self) -> bool {
        matches!(self, MappingPurpose::Both | MappingPurpose::Propagation)
    }
}

fn default_mandatory_condition() -> String {
    "false".to_string()
}

/// One row of a mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingItem {
    pub internal_name: String,
    pub internal_kind: InternalKind,
    pub external_name: String,
    #[serde(default)]
    pub account_id: bool,
    #[serde(default)]
    pub password: bool,
    /// Force multi-valued output.
    #[serde(default)]
    pub multivalue: bool,
    /// `true`, `false`, or a `${...}` template.
    #[serde(default = "default_mandatory_condition")]
    pub mandatory_condition: String,
    #[serde(default)]
    pub purpose: MappingPurpose,
}

impl MappingItem {
    pub fn new(
        internal_name: impl Into<String>,
        internal_kind: InternalKind,
        external_name: impl Into<String>,
    ) -> Self {
        Self {
            internal_name: internal_name.into(),
            internal_kind,
            external_name: external_name.into(),
            account_id: false,
            password: false,
            multivalue: false,
            mandatory_condition: default_mandatory_condition(),
            purpose: MappingPurpose::Both,
        }
    }

    /// The item mapping the subject's password.
    pub fn password_item() -> Self {
        let mut item = Self::new("password", InternalKind::Password, xavyo_connector::operation::PASSWORD_ATTR);
        item.password = true;
        item
    }

    #[must_use]
    pub fn as_account_id(mut self) -> Self {
        self.account_id = true;
        self
    }

    #[must_use]
    pub fn multivalued(mut self) -> Self {
        self.multivalue = true;
        self
    }

    pub fn mandatory(mut self, condition: impl Into<String>) -> Self {
        self.mandatory_condition = condition.into();
        self
    }

    #[must_use]
    pub fn with_purpose(mut self, purpose: MappingPurpose) -> Self {
        self.purpose = purpose;
        self
    }
}

/// The mapping of one subject kind onto a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    /// External object class, e.g. `__ACCOUNT__` or `__GROUP__`.
    pub object_class: String,
    pub items: Vec<MappingItem>,
}

impl Mapping {
    pub fn new(object_class: impl Into<String>) -> Self {
        Self {
            object_class: object_class.into(),
            items: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_item(mut self, item: MappingItem) -> Self {
        self.items.push(item);
        self
    }

    #[must_use]
    pub fn account_id_item(&self) -> Option<&MappingItem> {
        self.items.iter().find(|i| i.account_id)
    }

    #[must_use]
    pub fn password_item(&self) -> Option<&MappingItem> {
        self.items.iter().find(|i| i.password)
    }

    /// Items taking part in propagation.
    pub fn propagation_items(&self) -> impl Iterator<Item = &MappingItem> {
        self.items.iter().filter(|i| i.purpose.includes_propagation())
    }

    /// Exactly one account id item, at most one password item.
    pub fn validate(&self, resource: &str, kind: SubjectKind) -> Result<(), MappingError> {
        let account_ids = self.items.iter().filter(|i| i.account_id).count();
        if account_ids != 1 {
            return Err(MappingError::AccountIdCount {
                resource: resource.to_string(),
                kind,
                count: account_ids,
            });
        }
        let passwords = self.items.iter().filter(|i| i.password).count();
        if passwords > 1 {
            return Err(MappingError::PasswordCount {
                resource: resource.to_string(),
                kind,
                count: passwords,
            });
        }
        Ok(())
    }
}

/// How much of a resource's execution history is kept.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TraceLevel {
    None,
    #[default]
    Failures,
    All,
}

/// A target system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalResource {
    pub key: String,
    /// Key of the connector instance serving this resource.
    pub connector: String,
    #[serde(default)]
    pub create_trace_level: TraceLevel,
    #[serde(default)]
    pub update_trace_level: TraceLevel,
    #[serde(default)]
    pub delete_trace_level: TraceLevel,
    #[serde(default)]
    pub propagation_mode: PropagationMode,
    /// Expression overriding the external name derived from the account id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_mapping: Option<Mapping>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_mapping: Option<Mapping>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub membership_mapping: Option<Mapping>,
    #[serde(default)]
    pub random_password_if_not_provided: bool,
    /// A failure here stops the remaining propagations of a batch.
    #[serde(default)]
    pub propagation_priority: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_policy: Option<PasswordPolicySpec>,
}

impl ExternalResource {
    pub fn new(key: impl Into<String>, connector: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            connector: connector.into(),
            create_trace_level: TraceLevel::default(),
            update_trace_level: TraceLevel::default(),
            delete_trace_level: TraceLevel::default(),
            propagation_mode: PropagationMode::default(),
            account_link: None,
            user_mapping: None,
            role_mapping: None,
            membership_mapping: None,
            random_password_if_not_provided: false,
            propagation_priority: false,
            password_policy: None,
        }
    }

    /// Set the same trace level for every operation.
    #[must_use]
    pub fn with_trace_level(mut self, level: TraceLevel) -> Self {
        self.create_trace_level = level;
        self.update_trace_level = level;
        self.delete_trace_level = level;
        self
    }

    #[must_use]
    pub fn mapping(&self, kind: SubjectKind) -> Option<&Mapping> {
        match kind {
            SubjectKind::User => self.user_mapping.as_ref(),
            SubjectKind::Role => self.role_mapping.as_ref(),
            SubjectKind::Membership => self.membership_mapping.as_ref(),
        }
    }

    #[must_use]
    pub fn trace_level(&self, operation: OperationType) -> TraceLevel {
        match operation {
            OperationType::Create => self.create_trace_level,
            OperationType::Update => self.update_trace_level,
            OperationType::Delete => self.delete_trace_level,
        }
    }
}
