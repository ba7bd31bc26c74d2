//! Mapping Resolver
//!
//! Translates a subject into the attribute vocabulary of one resource: the
//! external attribute set, the account id and the external name. Resolution is
//! a pure function of its inputs; the virtual attribute cache must have been
//! refreshed by the caller beforehand.

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use xavyo_connector::operation::{AttributeSet, AttributeValue, NAME_ATTR, PASSWORD_ATTR, UID_ATTR};
use xavyo_connector::types::OperationType;

use crate::cipher::PasswordCipher;
use crate::error::{PropagationError, PropagationResult};
use crate::expression;
use crate::mapping::{ExternalResource, InternalKind, MappingError, MappingItem, SchemaSource};
use crate::password::{PasswordPolicySpec, PasswordSynthesizer};
use crate::subject::Subject;

/// Sentinel attribute listing mandatory attributes the subject does not have.
pub const MANDATORY_MISSING_ATTR: &str = "__MANDATORY_MISSING__";

/// Sentinel attribute listing mandatory attributes present without values.
pub const MANDATORY_NULL_OR_EMPTY_ATTR: &str = "__MANDATORY_NULL_OR_EMPTY__";

/// Virtual attribute changes not yet persisted, keyed by schema name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VirAttrChanges {
    pub to_update: HashMap<String, Vec<String>>,
    pub to_remove: HashSet<String>,
}

impl VirAttrChanges {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn update(mut self, schema: impl Into<String>, values: Vec<String>) -> Self {
        self.to_update.insert(schema.into(), values);
        self
    }

    #[must_use]
    pub fn remove(mut self, schema: impl Into<String>) -> Self {
        self.to_remove.insert(schema.into());
        self
    }
}

/// Input of one resolution.
#[derive(Debug, Clone, Copy)]
pub struct ResolveRequest<'a> {
    pub subject: &'a Subject,
    pub resource: &'a ExternalResource,
    pub operation: OperationType,
    /// Clear-text password change, if any.
    pub password: Option<&'a str>,
    pub vir_changes: &'a VirAttrChanges,
}

/// Output of one resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAttributes {
    pub account_id: Option<String>,
    pub name: Option<String>,
    pub attributes: AttributeSet,
}

enum ItemValues {
    /// The item must not appear in the output.
    Omit,
    Values {
        values: Vec<AttributeValue>,
        /// The subject holds the attribute, possibly without values.
        present: bool,
        multivalue: bool,
    },
}

/// Resolves mappings into connector attributes.
#[derive(Debug, Clone, Default)]
pub struct MappingResolver {
    synthesizer: PasswordSynthesizer,
    cipher: Option<PasswordCipher>,
    global_policy: Option<PasswordPolicySpec>,
}

impl MappingResolver {
    #[must_use]
    pub fn new(synthesizer: PasswordSynthesizer) -> Self {
        Self {
            synthesizer,
            cipher: None,
            global_policy: None,
        }
    }

    /// Cipher used to recover stored passwords.
    #[must_use]
    pub fn with_cipher(mut self, cipher: PasswordCipher) -> Self {
        self.cipher = Some(cipher);
        self
    }

    /// Policy applying to every subject.
    #[must_use]
    pub fn with_global_policy(mut self, policy: PasswordPolicySpec) -> Self {
        self.global_policy = Some(policy);
        self
    }

    /// Resolve the subject's attributes for the request's resource.
    pub fn resolve(&self, request: &ResolveRequest<'_>) -> PropagationResult<ResolvedAttributes> {
        let subject = request.subject;
        let resource = request.resource;
        let kind = subject.kind();
        let mapping = resource.mapping(kind).ok_or_else(|| MappingError::NoMapping {
            resource: resource.key.clone(),
            kind,
        })?;
        mapping.validate(&resource.key, kind)?;
        let holder = subject.as_attributable();

        let mut attributes = AttributeSet::new();
        let mut account_id = None;
        let mut mandatory_missing = Vec::new();
        let mut mandatory_null_or_empty = Vec::new();

        for item in mapping.propagation_items() {
            let is_password = item.password || item.internal_kind == InternalKind::Password;
            let resolved = if is_password {
                match self.resolve_password(request)? {
                    Some(password) => ItemValues::Values {
                        values: vec![AttributeValue::String(password)],
                        present: true,
                        multivalue: false,
                    },
                    None if request.operation != OperationType::Create => ItemValues::Omit,
                    None => ItemValues::Values {
                        values: Vec::new(),
                        present: false,
                        multivalue: false,
                    },
                }
            } else {
                self.resolve_item(item, request)?
            };

            let ItemValues::Values {
                values,
                present,
                multivalue,
            } = resolved
            else {
                debug!(
                    resource = %resource.key,
                    attribute = %item.external_name,
                    "Mapping item omitted"
                );
                continue;
            };

            if values.is_empty() && expression::evaluate_condition(&item.mandatory_condition, holder) {
                if present {
                    mandatory_null_or_empty.push(item.external_name.clone());
                } else {
                    mandatory_missing.push(item.external_name.clone());
                }
            }

            if item.account_id {
                account_id = values.first().and_then(value_text);
                continue;
            }
            if is_password {
                if let Some(password) = values.into_iter().next() {
                    attributes.set(PASSWORD_ATTR, password);
                }
                continue;
            }

            let value = if multivalue {
                AttributeValue::Array(values)
            } else {
                values.into_iter().next().unwrap_or(AttributeValue::Null)
            };
            if attributes.has(&item.external_name) {
                attributes.merge(item.external_name.clone(), value);
            } else {
                attributes.set(item.external_name.clone(), value);
            }
        }

        let account_id = account_id.filter(|id| !id.trim().is_empty());
        let link = resource
            .account_link
            .as_deref()
            .and_then(|link| expression::evaluate(link, holder));
        if account_id.is_none() && link.is_none() {
            warn!(
                resource = %resource.key,
                subject = %subject.key(),
                "Blank account id and no account link"
            );
        }
        let name = link.or_else(|| account_id.clone());

        if let (Some(id), Some(item)) = (&account_id, mapping.account_id_item()) {
            if item.external_name != UID_ATTR {
                attributes.set(item.external_name.clone(), id.clone());
            }
        }
        if let Some(name) = &name {
            attributes.set(NAME_ATTR, name.clone());
        }
        if !mandatory_missing.is_empty() {
            attributes.set(MANDATORY_MISSING_ATTR, mandatory_missing);
        }
        if !mandatory_null_or_empty.is_empty() {
            attributes.set(MANDATORY_NULL_OR_EMPTY_ATTR, mandatory_null_or_empty);
        }

        debug!(
            resource = %resource.key,
            subject = %subject.key(),
            account_id = ?account_id,
            attributes = attributes.len(),
            "Resolved mapping"
        );

        Ok(ResolvedAttributes {
            account_id,
            name,
            attributes,
        })
    }

    fn resolve_item(
        &self,
        item: &MappingItem,
        request: &ResolveRequest<'_>,
    ) -> PropagationResult<ItemValues> {
        let subject = request.subject;
        let owner = item.internal_kind.owner_kind();
        let holders = subject.related(owner);
        let name = item.internal_name.as_str();

        let mut values = Vec::new();
        let mut present = false;
        let mut multivalue = item.multivalue || owner != subject.kind();

        match item.internal_kind.schema_source() {
            Some(SchemaSource::Plain) => {
                for holder in &holders {
                    if let Some(attr) = holder.plain_attr(name) {
                        present = true;
                        multivalue |= attr.schema().multivalue;
                        let pattern = attr.schema().conversion_pattern.as_deref();
                        values.extend(attr.values().iter().map(|v| v.to_connector(pattern)));
                    }
                }
            }
            Some(SchemaSource::Derived) => {
                for holder in &holders {
                    if holder.der_attr(name).is_some() {
                        present = true;
                        if let Some(value) = expression::evaluate_derived(name, *holder) {
                            values.push(AttributeValue::String(value));
                        }
                    }
                }
            }
            Some(SchemaSource::Virtual) => {
                for holder in &holders {
                    let own = holder.kind() == subject.kind();
                    let Some(attr) = holder.vir_attr(name) else {
                        if own
                            && (request.vir_changes.to_update.contains_key(name)
                                || request.vir_changes.to_remove.contains(name))
                        {
                            debug!(
                                subject = %holder.key(),
                                schema = %name,
                                "Pending virtual change for unknown schema ignored"
                            );
                        }
                        continue;
                    };
                    if attr.schema.read_only {
                        return Ok(ItemValues::Omit);
                    }
                    multivalue |= attr.schema.multivalue;

                    let current = if own && request.vir_changes.to_remove.contains(name) {
                        Vec::new()
                    } else if let Some(pending) =
                        own.then(|| request.vir_changes.to_update.get(name)).flatten()
                    {
                        pending.clone()
                    } else {
                        attr.values
                            .clone()
                            .ok_or_else(|| PropagationError::CacheConsistency {
                                subject: format!("{} {}", holder.kind(), holder.key()),
                                schema: name.to_string(),
                            })?
                    };

                    present = true;
                    values.extend(current.into_iter().map(AttributeValue::String));
                }
            }
            None => {
                let identity: Vec<String> = match item.internal_kind {
                    InternalKind::UserId | InternalKind::RoleId | InternalKind::MembershipId => {
                        holders.iter().map(|h| h.key().to_string()).collect()
                    }
                    InternalKind::Username => holders
                        .iter()
                        .filter_map(|h| h.identity_field("username"))
                        .collect(),
                    InternalKind::RoleName => holders
                        .iter()
                        .filter_map(|h| h.identity_field("name"))
                        .collect(),
                    InternalKind::RoleOwner => subject
                        .roles()
                        .into_iter()
                        .filter_map(|r| r.owner.as_ref().map(|o| o.name().to_string()))
                        .collect(),
                    _ => return Ok(ItemValues::Omit),
                };
                present = !identity.is_empty();
                values.extend(identity.into_iter().map(AttributeValue::String));
            }
        }

        Ok(ItemValues::Values {
            values,
            present,
            multivalue,
        })
    }

    /// Clear text to send, from the request, the stored password, or a
    /// generated one.
    fn resolve_password(&self, request: &ResolveRequest<'_>) -> PropagationResult<Option<String>> {
        let Subject::User(user) = request.subject else {
            return Ok(None);
        };
        if let Some(clear) = request.password {
            return Ok(Some(clear.to_string()));
        }
        if request.operation != OperationType::Create {
            return Ok(None);
        }

        if let (Some(stored), Some(cipher)) = (&user.password, &self.cipher) {
            match cipher.decode(stored) {
                Ok(clear) => return Ok(Some(clear)),
                Err(e) => debug!(
                    subject = %user.key,
                    algorithm = %stored.algorithm,
                    error = %e,
                    "Stored password not decodable"
                ),
            }
        }

        if !request.resource.random_password_if_not_provided {
            return Ok(None);
        }
        let policies = self.applicable_policies(request);
        if policies.is_empty() {
            debug!(
                resource = %request.resource.key,
                "No password policy applies, not generating a password"
            );
            return Ok(None);
        }
        Ok(Some(self.synthesizer.generate(&policies)?))
    }

    /// Global, then per-role, then per-resource policies.
    fn applicable_policies(&self, request: &ResolveRequest<'_>) -> Vec<PasswordPolicySpec> {
        self.global_policy
            .iter()
            .cloned()
            .chain(
                request
                    .subject
                    .roles()
                    .into_iter()
                    .filter_map(|r| r.password_policy.clone()),
            )
            .chain(request.resource.password_policy.iter().cloned())
            .collect()
    }
}

fn value_text(value: &AttributeValue) -> Option<String> {
    match value {
        AttributeValue::String(s) => Some(s.clone()),
        AttributeValue::Integer(i) => Some(i.to_string()),
        AttributeValue::Float(f) => Some(f.to_string()),
        AttributeValue::Boolean(b) => Some(b.to_string()),
        AttributeValue::Binary(bytes) => Some(hex::encode(bytes)),
        AttributeValue::Array(values) => values.first().and_then(value_text),
        AttributeValue::Null => None,
    }
}
