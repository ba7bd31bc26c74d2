//! Connector capability traits
//!
//! Capability-based trait definitions, inspired by `ConnId`. The propagation
//! engine only needs create, update, delete and get-by-uid; the
//! [`PropagationMode`] of the task is passed through unchanged.

use async_trait::async_trait;

use crate::error::ConnectorResult;
use crate::operation::{AttributeSet, ConnectorObject, OperationOptions, Uid};
use crate::types::{OperationType, PropagationMode};

/// Base trait for all connectors.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Get the display name for this connector instance.
    fn display_name(&self) -> &str;

    /// Check if the connector is currently healthy.
    fn is_healthy(&self) -> bool {
        true
    }
}

/// Capability for creating objects in the target system.
#[async_trait]
pub trait CreateOp: Connector {
    /// Create a new object and return its UID.
    async fn create(
        &self,
        mode: PropagationMode,
        object_class: &str,
        attributes: AttributeSet,
        options: &OperationOptions,
    ) -> ConnectorResult<Uid>;
}

/// Capability for updating objects in the target system.
#[async_trait]
pub trait UpdateOp: Connector {
    /// Replace the given attributes on an existing object.
    ///
    /// Returns the UID of the updated object, which may change for some
    /// systems (renames).
    async fn update(
        &self,
        mode: PropagationMode,
        object_class: &str,
        uid: &Uid,
        attributes: AttributeSet,
        options: &OperationOptions,
    ) -> ConnectorResult<Uid>;
}

/// Capability for deleting objects from the target system.
#[async_trait]
pub trait DeleteOp: Connector {
    /// Delete an object from the target system.
    async fn delete(
        &self,
        mode: PropagationMode,
        object_class: &str,
        uid: &Uid,
        options: &OperationOptions,
    ) -> ConnectorResult<()>;
}

/// Capability for reading a single object by UID.
#[async_trait]
pub trait GetOp: Connector {
    /// Read an object. `Ok(None)` means the object is absent remotely.
    ///
    /// `operation` is the propagation operation on whose behalf the read is
    /// made; connectors may use it to pick a different read path.
    async fn get(
        &self,
        mode: PropagationMode,
        operation: OperationType,
        object_class: &str,
        uid: &Uid,
        options: &OperationOptions,
    ) -> ConnectorResult<Option<ConnectorObject>>;
}

/// A connector bundle with every capability propagation needs.
pub trait FullConnector: Connector + CreateOp + UpdateOp + DeleteOp + GetOp + Send + Sync {}

impl<T> FullConnector for T where T: Connector + CreateOp + UpdateOp + DeleteOp + GetOp + Send + Sync {}
