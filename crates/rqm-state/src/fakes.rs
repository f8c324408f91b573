//! In-memory fakes for the resource client (testing only)
//!
//! Provides `MemoryResourceClient`, which satisfies the `ResourceClient`
//! contract without any network, records every call, and can be told to
//! reject specific creates or updates.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::client_traits::ResourceClient;
use crate::error::{ClientError, ClientResult};
use crate::resource::*;

// ---------------------------------------------------------------------------
// Call log
// ---------------------------------------------------------------------------

/// One recorded call against the fake.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientCall {
    Get(ResourceType, ResourceId),
    Query(ResourceType, ResourceFilter),
    Create(ResourceType, Payload),
    Update(ResourceType, ResourceId, Payload),
}

impl ClientCall {
    /// Whether the call changed remote state.
    pub fn is_mutation(&self) -> bool {
        matches!(self, ClientCall::Create(..) | ClientCall::Update(..))
    }

    pub fn resource_type(&self) -> ResourceType {
        match self {
            ClientCall::Get(t, _)
            | ClientCall::Query(t, _)
            | ClientCall::Create(t, _)
            | ClientCall::Update(t, _, _) => *t,
        }
    }
}

/// Rejects mutations whose payload field equals a given value.
#[derive(Debug, Clone)]
struct FailureRule {
    resource_type: ResourceType,
    field: String,
    value: String,
    error: ClientError,
    on_update: bool,
}

impl FailureRule {
    fn matches(&self, resource_type: ResourceType, payload: &Payload, update: bool) -> bool {
        self.on_update == update
            && self.resource_type == resource_type
            && payload.fields.get(&self.field).and_then(Value::as_str) == Some(&self.value)
    }
}

// ---------------------------------------------------------------------------
// MemoryResourceClient
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct State {
    resources: BTreeMap<ResourceType, Vec<RemoteResource>>,
    next_id: u64,
    calls: Vec<ClientCall>,
    failures: Vec<FailureRule>,
}

/// In-memory remote service backed by per-type resource lists.
///
/// Ids handed out by `create` are numeric strings starting at 5000, so they
/// never collide with the small ids tests usually seed.
#[derive(Debug)]
pub struct MemoryResourceClient {
    user: String,
    state: Mutex<State>,
}

impl Default for MemoryResourceClient {
    fn default() -> Self {
        Self::new("tester")
    }
}

impl MemoryResourceClient {
    pub fn new(user: &str) -> Self {
        Self {
            user: user.to_string(),
            state: Mutex::new(State {
                next_id: 5000,
                ..State::default()
            }),
        }
    }

    /// Insert a resource as if it already existed remotely.
    pub fn seed(&self, resource: RemoteResource) {
        let mut state = self.state.lock().unwrap();
        state
            .resources
            .entry(resource.resource_type)
            .or_default()
            .push(resource);
    }

    /// Builder-style `seed`.
    pub fn with(self, resource: RemoteResource) -> Self {
        self.seed(resource);
        self
    }

    /// Reject every `create` of `resource_type` whose payload `field` equals `value`.
    pub fn fail_create_when(&self, resource_type: ResourceType, field: &str, value: &str) {
        self.push_failure(resource_type, field, value, false);
    }

    /// Reject every `update` of `resource_type` whose payload `field` equals `value`.
    pub fn fail_update_when(&self, resource_type: ResourceType, field: &str, value: &str) {
        self.push_failure(resource_type, field, value, true);
    }

    fn push_failure(&self, resource_type: ResourceType, field: &str, value: &str, on_update: bool) {
        let mut state = self.state.lock().unwrap();
        state.failures.push(FailureRule {
            resource_type,
            field: field.to_string(),
            value: value.to_string(),
            error: ClientError::Remote {
                status: Some(400),
                message: format!("rejected {resource_type} with {field} = '{value}'"),
            },
            on_update,
        });
    }

    /// All calls received so far, in order.
    pub fn calls(&self) -> Vec<ClientCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Number of create calls for a resource type (successful or not).
    pub fn create_count(&self, resource_type: ResourceType) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, ClientCall::Create(t, _) if *t == resource_type))
            .count()
    }

    /// Number of update calls for a resource type.
    pub fn update_count(&self, resource_type: ResourceType) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, ClientCall::Update(t, _, _) if *t == resource_type))
            .count()
    }

    /// Number of calls that changed (or tried to change) remote state.
    pub fn mutation_count(&self) -> usize {
        self.calls().iter().filter(|c| c.is_mutation()).count()
    }

    /// Snapshot of every stored resource of a type.
    pub fn resources(&self, resource_type: ResourceType) -> Vec<RemoteResource> {
        let state = self.state.lock().unwrap();
        state
            .resources
            .get(&resource_type)
            .cloned()
            .unwrap_or_default()
    }

    /// Forget recorded calls, keep stored resources.
    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }
}

#[async_trait]
impl ResourceClient for MemoryResourceClient {
    async fn get(
        &self,
        resource_type: ResourceType,
        id: &ResourceId,
    ) -> ClientResult<RemoteResource> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(ClientCall::Get(resource_type, id.clone()));
        state
            .resources
            .get(&resource_type)
            .and_then(|list| list.iter().find(|r| &r.id == id))
            .cloned()
            .ok_or_else(|| ClientError::NotFound {
                resource_type,
                id: id.clone(),
            })
    }

    async fn query(
        &self,
        resource_type: ResourceType,
        filter: &ResourceFilter,
    ) -> ClientResult<Vec<RemoteResource>> {
        let mut state = self.state.lock().unwrap();
        state
            .calls
            .push(ClientCall::Query(resource_type, filter.clone()));
        Ok(state
            .resources
            .get(&resource_type)
            .map(|list| list.iter().filter(|r| filter.matches(r)).cloned().collect())
            .unwrap_or_default())
    }

    async fn create(
        &self,
        resource_type: ResourceType,
        payload: Payload,
    ) -> ClientResult<ResourceId> {
        let mut state = self.state.lock().unwrap();
        state
            .calls
            .push(ClientCall::Create(resource_type, payload.clone()));
        if let Some(rule) = state
            .failures
            .iter()
            .find(|f| f.matches(resource_type, &payload, false))
        {
            return Err(rule.error.clone());
        }

        let id = ResourceId(state.next_id.to_string());
        state.next_id += 1;
        state
            .resources
            .entry(resource_type)
            .or_default()
            .push(RemoteResource {
                resource_type,
                id: id.clone(),
                fields: payload.fields,
            });
        Ok(id)
    }

    async fn update(
        &self,
        resource_type: ResourceType,
        id: &ResourceId,
        payload: Payload,
    ) -> ClientResult<()> {
        let mut state = self.state.lock().unwrap();
        state
            .calls
            .push(ClientCall::Update(resource_type, id.clone(), payload.clone()));
        if let Some(rule) = state
            .failures
            .iter()
            .find(|f| f.matches(resource_type, &payload, true))
        {
            return Err(rule.error.clone());
        }

        let resource = state
            .resources
            .get_mut(&resource_type)
            .and_then(|list| list.iter_mut().find(|r| &r.id == id))
            .ok_or_else(|| ClientError::NotFound {
                resource_type,
                id: id.clone(),
            })?;
        // Last writer wins, field by field.
        resource.fields.extend(payload.fields);
        Ok(())
    }

    fn authenticated_user(&self) -> &str {
        &self.user
    }
}
