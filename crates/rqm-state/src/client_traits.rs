//! Resource client contract.
//!
//! The reconciliation engine depends on this trait only, never on a
//! transport. Every call may be slow or blocking; implementations do no
//! caching and no retries.

use async_trait::async_trait;

use crate::error::ClientResult;
use crate::resource::{Payload, RemoteResource, ResourceFilter, ResourceId, ResourceType};

/// Remote quality-management service, reduced to four operations.
///
/// Guarantees:
/// - `get` returns `ClientError::NotFound` when the id does not exist.
/// - `query` may return an empty list; ordering is backend-defined, callers
///   only rely on "first match wins".
/// - `create` returns the id assigned by the service.
/// - `update` is last-writer-wins.
#[async_trait]
pub trait ResourceClient: Send + Sync {
    /// Fetch one resource by id.
    async fn get(&self, resource_type: ResourceType, id: &ResourceId)
        -> ClientResult<RemoteResource>;

    /// List resources of a type matching the filter.
    async fn query(
        &self,
        resource_type: ResourceType,
        filter: &ResourceFilter,
    ) -> ClientResult<Vec<RemoteResource>>;

    /// Create a resource and return its new id.
    async fn create(&self, resource_type: ResourceType, payload: Payload)
        -> ClientResult<ResourceId>;

    /// Update an existing resource in place.
    async fn update(
        &self,
        resource_type: ResourceType,
        id: &ResourceId,
        payload: Payload,
    ) -> ClientResult<()>;

    /// User id the session is authenticated as.
    fn authenticated_user(&self) -> &str;

    /// Reference to a resource as it must appear inside a payload document.
    fn resource_uri(&self, resource_type: ResourceType, id: &ResourceId) -> String {
        format!("urn:rqm:{}:{}", resource_type.remote_name(), id)
    }

    /// Reference to a user as it must appear inside a payload document.
    fn user_uri(&self, user: &str) -> String {
        format!("urn:rqm:user:{user}")
    }
}
