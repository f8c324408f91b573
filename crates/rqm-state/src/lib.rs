//! RQM-State: Remote resource model for the RQM importer
//!
//! This crate defines what the importer knows about the remote
//! quality-management service: the resource types it touches, the opaque
//! identifiers the service hands out, and the `ResourceClient` contract the
//! reconciliation engine drives.
//!
//! ## Layer 0 - Remote state
//!
//! Focus: a narrow, transport-agnostic contract that can be backed by HTTP
//! in production and by an in-memory fake in tests.
//!
//! ## Key Components
//!
//! - `ResourceClient`: get / query / create / update against the remote service
//! - `RemoteResource`: the read-only view of one remote object
//! - `Payload`: structured fields plus the rendered document sent on the wire
//! - `fakes::MemoryResourceClient`: contract-conforming in-memory backend

mod error;
pub mod client_traits;
pub mod fakes;
pub mod resource;

pub use client_traits::ResourceClient;
pub use error::{ClientError, ClientResult};
pub use resource::{fields, Payload, RemoteResource, ResourceFilter, ResourceId, ResourceType};
