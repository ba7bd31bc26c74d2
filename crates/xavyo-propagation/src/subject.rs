//! Subjects: users, roles and memberships.
//!
//! The three kinds form a closed set. Each exposes the same attribute lookups
//! through [`Attributable`]; [`Subject`] is the tagged union the engine
//! propagates.

use serde::{Deserialize, Serialize};

use crate::cipher::StoredPassword;
use crate::ids::SubjectKey;
use crate::password::PasswordPolicySpec;
use crate::schema::{DerAttr, PlainAttr, VirAttr};

/// Kind of subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectKind {
    User,
    Role,
    Membership,
}

impl SubjectKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectKind::User => "user",
            SubjectKind::Role => "role",
            SubjectKind::Membership => "membership",
        }
    }
}

impl std::fmt::Display for SubjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The three attribute collections every subject carries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attributes {
    #[serde(default)]
    pub plain: Vec<PlainAttr>,
    /// Derived attributes, in declaration order.
    #[serde(default)]
    pub derived: Vec<DerAttr>,
    #[serde(default)]
    pub virtual_attrs: Vec<VirAttr>,
}

impl Attributes {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_plain(mut self, attr: PlainAttr) -> Self {
        self.plain.push(attr);
        self
    }

    #[must_use]
    pub fn with_derived(mut self, attr: DerAttr) -> Self {
        self.derived.push(attr);
        self
    }

    #[must_use]
    pub fn with_virtual(mut self, attr: VirAttr) -> Self {
        self.virtual_attrs.push(attr);
        self
    }
}

/// Uniform attribute lookup over users, roles and memberships.
pub trait Attributable {
    fn kind(&self) -> SubjectKind;

    fn key(&self) -> SubjectKey;

    fn attributes(&self) -> &Attributes;

    /// Identity field used by the expression language (`username`, `name`, `key`).
    fn identity_field(&self, field: &str) -> Option<String>;

    fn plain_attr(&self, name: &str) -> Option<&PlainAttr> {
        self.attributes()
            .plain
            .iter()
            .find(|a| a.schema().name == name)
    }

    fn der_attr(&self, name: &str) -> Option<&DerAttr> {
        self.attributes()
            .derived
            .iter()
            .find(|a| a.schema.name == name)
    }

    fn vir_attr(&self, name: &str) -> Option<&VirAttr> {
        self.attributes()
            .virtual_attrs
            .iter()
            .find(|a| a.schema.name == name)
    }
}

/// A user account in the authoritative store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub key: SubjectKey,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<StoredPassword>,
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(default)]
    pub memberships: Vec<Membership>,
    /// Resources assigned to the user, directly or through roles.
    #[serde(default)]
    pub resources: Vec<String>,
}

impl User {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            key: SubjectKey::new(),
            username: username.into(),
            password: None,
            attributes: Attributes::default(),
            memberships: Vec::new(),
            resources: Vec::new(),
        }
    }

    /// Roles the user belongs to, through memberships.
    pub fn roles(&self) -> impl Iterator<Item = &Role> {
        self.memberships.iter().map(|m| &m.role)
    }
}

impl Attributable for User {
    fn kind(&self) -> SubjectKind {
        SubjectKind::User
    }

    fn key(&self) -> SubjectKey {
        self.key
    }

    fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    fn identity_field(&self, field: &str) -> Option<String> {
        match field {
            "username" => Some(self.username.clone()),
            "key" => Some(self.key.to_string()),
            _ => None,
        }
    }
}

/// Owner of a role: either a user or another role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "name", rename_all = "snake_case")]
pub enum RoleOwner {
    User(String),
    Role(String),
}

impl RoleOwner {
    /// The owner's username or role name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            RoleOwner::User(name) | RoleOwner::Role(name) => name,
        }
    }
}

/// A role (group).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    pub key: SubjectKey,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<RoleOwner>,
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(default)]
    pub resources: Vec<String>,
    /// Password policy applying to members of this role.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_policy: Option<PasswordPolicySpec>,
}

impl Role {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            key: SubjectKey::new(),
            name: name.into(),
            owner: None,
            attributes: Attributes::default(),
            resources: Vec::new(),
            password_policy: None,
        }
    }
}

impl Attributable for Role {
    fn kind(&self) -> SubjectKind {
        SubjectKind::Role
    }

    fn key(&self) -> SubjectKey {
        self.key
    }

    fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    fn identity_field(&self, field: &str) -> Option<String> {
        match field {
            "name" => Some(self.name.clone()),
            "key" => Some(self.key.to_string()),
            _ => None,
        }
    }
}

/// Membership of a user in a role, with its own attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Membership {
    pub key: SubjectKey,
    pub role: Role,
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(default)]
    pub resources: Vec<String>,
}

impl Membership {
    pub fn new(role: Role) -> Self {
        Self {
            key: SubjectKey::new(),
            role,
            attributes: Attributes::default(),
            resources: Vec::new(),
        }
    }
}

impl Attributable for Membership {
    fn kind(&self) -> SubjectKind {
        SubjectKind::Membership
    }

    fn key(&self) -> SubjectKey {
        self.key
    }

    fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    fn identity_field(&self, field: &str) -> Option<String> {
        match field {
            "name" => Some(self.role.name.clone()),
            "key" => Some(self.key.to_string()),
            _ => None,
        }
    }
}

/// A subject being propagated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Subject {
    User(User),
    Role(Role),
    Membership(Membership),
}

impl Subject {
    /// The subject as a uniform attribute holder.
    #[must_use]
    pub fn as_attributable(&self) -> &dyn Attributable {
        match self {
            Subject::User(u) => u,
            Subject::Role(r) => r,
            Subject::Membership(m) => m,
        }
    }

    #[must_use]
    pub fn kind(&self) -> SubjectKind {
        self.as_attributable().kind()
    }

    #[must_use]
    pub fn key(&self) -> SubjectKey {
        self.as_attributable().key()
    }

    /// Resources assigned to the subject.
    #[must_use]
    pub fn resources(&self) -> &[String] {
        match self {
            Subject::User(u) => &u.resources,
            Subject::Role(r) => &r.resources,
            Subject::Membership(m) => &m.resources,
        }
    }

    /// Attribute holders of `kind` related to this subject.
    ///
    /// A user reaches its roles and memberships; a membership reaches its
    /// role; a role reaches only itself.
    #[must_use]
    pub fn related(&self, kind: SubjectKind) -> Vec<&dyn Attributable> {
        match (self, kind) {
            (Subject::User(u), SubjectKind::User) => vec![u as &dyn Attributable],
            (Subject::User(u), SubjectKind::Role) => {
                u.roles().map(|r| r as &dyn Attributable).collect()
            }
            (Subject::User(u), SubjectKind::Membership) => u
                .memberships
                .iter()
                .map(|m| m as &dyn Attributable)
                .collect(),
            (Subject::Role(r), SubjectKind::Role) => vec![r as &dyn Attributable],
            (Subject::Membership(m), SubjectKind::Membership) => vec![m as &dyn Attributable],
            (Subject::Membership(m), SubjectKind::Role) => vec![&m.role as &dyn Attributable],
            _ => Vec::new(),
        }
    }

    /// Mutable attributes of the related holder identified by `kind` and `key`.
    pub fn attributes_mut(&mut self, kind: SubjectKind, key: SubjectKey) -> Option<&mut Attributes> {
        match self {
            Subject::User(u) => match kind {
                SubjectKind::User => (u.key == key).then_some(&mut u.attributes),
                SubjectKind::Role => u
                    .memberships
                    .iter_mut()
                    .map(|m| &mut m.role)
                    .find(|r| r.key == key)
                    .map(|r| &mut r.attributes),
                SubjectKind::Membership => u
                    .memberships
                    .iter_mut()
                    .find(|m| m.key == key)
                    .map(|m| &mut m.attributes),
            },
            Subject::Role(r) => match kind {
                SubjectKind::Role => (r.key == key).then_some(&mut r.attributes),
                SubjectKind::User | SubjectKind::Membership => None,
            },
            Subject::Membership(m) => match kind {
                SubjectKind::Membership => (m.key == key).then_some(&mut m.attributes),
                SubjectKind::Role => (m.role.key == key).then_some(&mut m.role.attributes),
                SubjectKind::User => None,
            },
        }
    }

    /// Roles whose policies apply to the subject.
    #[must_use]
    pub fn roles(&self) -> Vec<&Role> {
        match self {
            Subject::User(u) => u.roles().collect(),
            Subject::Role(r) => vec![r],
            Subject::Membership(m) => vec![&m.role],
        }
    }
}

impl From<User> for Subject {
    fn from(user: User) -> Self {
        Subject::User(user)
    }
}

impl From<Role> for Subject {
    fn from(role: Role) -> Self {
        Subject::Role(role)
    }
}

impl From<Membership> for Subject {
    fn from(membership: Membership) -> Self {
        Subject::Membership(membership)
    }
}
