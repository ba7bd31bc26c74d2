//! # Connector Capability
//!
//! The narrow capability through which xavyo reaches external identity
//! systems: create, update, delete and fetch an object described by a set of
//! named attributes.
//!
//! Connector implementations (LDAP, databases, REST, ticketing systems) live
//! outside this crate; the propagation engine only depends on the traits and
//! value types defined here.
//!
//! ## Crate Organization
//!
//! - [`types`] - Operation and propagation mode enums
//! - [`error`] - Error types with transient/permanent/timeout classification
//! - [`traits`] - Connector capability traits
//! - [`operation`] - Uid, `AttributeSet`, `ConnectorObject`, options

pub mod error;
pub mod operation;
pub mod traits;
pub mod types;

/// Prelude module for convenient imports.
///
/// ```
/// use xavyo_connector::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{ConnectorError, ConnectorResult};
    pub use crate::operation::{
        AttributeSet, AttributeValue, ConnectorObject, OperationOptions, Uid, NAME_ATTR,
        PASSWORD_ATTR, UID_ATTR,
    };
    pub use crate::traits::{Connector, CreateOp, DeleteOp, FullConnector, GetOp, UpdateOp};
    pub use crate::types::{OperationType, PropagationMode};
}

// Re-export async_trait for connector implementors
pub use async_trait::async_trait;
