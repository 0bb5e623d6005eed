//! The container runtime sandboxes are provisioned on.
//!
//! The lifecycle controller only talks to the runtime through [`ContainerRuntime`], which keeps
//! the orchestration logic independent of the Docker Engine API and lets tests substitute an
//! in-memory runtime. Every call can be cancelled by dropping its future.

mod docker;
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;

use std::{collections::HashMap, net::IpAddr};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use docker::*;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The result of a container runtime operation.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// An error reported by the container runtime.
#[derive(pretty_error_debug::Debug, Error)]
pub enum RuntimeError {
    /// The addressed container does not exist.
    #[error("no such container: {0}")]
    NotFound(String),

    /// A container with the same name already exists.
    #[error("container conflict: {0}")]
    Conflict(String),

    /// The Docker Engine API failed.
    #[error("docker: {0}")]
    Docker(#[source] bollard::errors::Error),

    /// The runtime answered without data the controller depends on.
    #[error("incomplete runtime response: {0}")]
    Incomplete(String),

    /// Any other runtime failure.
    #[error("{0}")]
    Other(String),
}

/// Everything needed to create one sandbox container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    /// The container name, unique within the runtime.
    pub name: String,

    /// The hostname inside the container.
    pub hostname: String,

    /// The image to run.
    pub image: String,

    /// Labels attached to the container.
    pub labels: HashMap<String, String>,

    /// The TCP port the sandbox listens on inside the container.
    pub container_port: Option<u16>,

    /// The host port `container_port` is published on, if any.
    pub host_port: Option<u16>,

    /// The network mode, e.g. `bridge`.
    pub network_mode: String,

    /// Whether the runtime deletes the container once it stops.
    pub auto_remove: bool,
}

/// A container as seen when listing by label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSummary {
    /// The runtime-assigned identifier.
    pub id: String,

    /// The container name without the leading `/`.
    pub name: String,

    /// When the runtime created the container.
    pub created: DateTime<Utc>,

    /// The container labels.
    pub labels: HashMap<String, String>,

    /// The host ports the container publishes.
    pub published_ports: Vec<u16>,
}

/// A single container as seen when inspecting it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerDetails {
    /// The runtime-assigned identifier.
    pub id: String,

    /// The container name without the leading `/`.
    pub name: String,

    /// When the runtime created the container.
    pub created: DateTime<Utc>,

    /// The container address on its network, once running.
    pub ip_address: Option<IpAddr>,

    /// The host ports the container publishes.
    pub published_ports: Vec<u16>,
}

//--------------------------------------------------------------------------------------------------
// Traits
//--------------------------------------------------------------------------------------------------

/// The operations the lifecycle controller needs from a container runtime.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Creates a container and returns its identifier. Fails with [`RuntimeError::Conflict`]
    /// when the name is taken.
    async fn create(&self, spec: &ContainerSpec) -> RuntimeResult<String>;

    /// Starts a created container.
    async fn start(&self, id: &str) -> RuntimeResult<()>;

    /// Force-removes a container and its anonymous volumes.
    async fn remove(&self, name: &str) -> RuntimeResult<()>;

    /// Lists every container, running or not, that carries `label_key`.
    async fn list(&self, label_key: &str) -> RuntimeResult<Vec<ContainerSummary>>;

    /// Inspects a single container by name or identifier.
    async fn inspect(&self, name: &str) -> RuntimeResult<ContainerDetails>;
}
