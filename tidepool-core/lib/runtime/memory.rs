//! An in-memory [`ContainerRuntime`] for exercising the lifecycle controller without Docker.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    net::{IpAddr, Ipv4Addr},
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{
    ContainerDetails, ContainerRuntime, ContainerSpec, ContainerSummary, RuntimeError,
    RuntimeResult,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A container runtime that keeps containers in a map.
///
/// Every container gets the creation time configured with [`MemoryRuntime::set_created`] and an
/// address in `172.17.0.0/16` once started. Individual operations can be made to fail by name.
#[derive(Debug, Default)]
pub struct MemoryRuntime {
    state: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    containers: BTreeMap<String, MemoryContainer>,
    created: DateTime<Utc>,
    next_id: u32,
    failing_creates: HashSet<String>,
    failing_starts: HashSet<String>,
    failing_removes: HashSet<String>,
    failing_list: bool,
    list_delay: Duration,
    start_delay: Duration,
    remove_delay: Duration,
}

#[derive(Debug, Clone)]
struct MemoryContainer {
    id: String,
    spec: ContainerSpec,
    created: DateTime<Utc>,
    ip_address: IpAddr,
    running: bool,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl MemoryRuntime {
    /// Creates an empty runtime whose containers are created at `created`.
    pub fn new(created: DateTime<Utc>) -> Self {
        let runtime = Self::default();
        runtime.set_created(created);
        runtime
    }

    /// Sets the creation time of containers created from now on.
    pub fn set_created(&self, created: DateTime<Utc>) {
        self.state().created = created;
    }

    /// Makes `create` fail for the container `name`.
    pub fn fail_create(&self, name: &str) {
        self.state().failing_creates.insert(name.to_string());
    }

    /// Makes `start` fail for the container `name`.
    pub fn fail_start(&self, name: &str) {
        self.state().failing_starts.insert(name.to_string());
    }

    /// Makes `remove` fail for the container `name`.
    pub fn fail_remove(&self, name: &str) {
        self.state().failing_removes.insert(name.to_string());
    }

    /// Makes every `list` call fail, as if the daemon were unreachable.
    pub fn fail_list(&self, failing: bool) {
        self.state().failing_list = failing;
    }

    /// Makes every `list` call take at least `delay`, as if the daemon were slow.
    pub fn delay_list(&self, delay: Duration) {
        self.state().list_delay = delay;
    }

    /// Makes every `start` call take at least `delay`.
    pub fn delay_start(&self, delay: Duration) {
        self.state().start_delay = delay;
    }

    /// Makes every `remove` call take at least `delay`.
    pub fn delay_remove(&self, delay: Duration) {
        self.state().remove_delay = delay;
    }

    /// Drops the container `name` without going through `remove`, as the daemon does for an
    /// auto-removed container that exits.
    pub fn vanish(&self, name: &str) -> bool {
        self.state().containers.remove(name).is_some()
    }

    /// Adds a running container directly, bypassing `create`.
    pub fn insert(
        &self,
        name: &str,
        labels: HashMap<String, String>,
        host_port: Option<u16>,
        created: DateTime<Utc>,
    ) {
        let mut state = self.state();
        let (id, ip_address) = state.next_identity();
        let spec = ContainerSpec {
            name: name.to_string(),
            hostname: name.to_string(),
            image: String::new(),
            labels,
            container_port: None,
            host_port,
            network_mode: "bridge".to_string(),
            auto_remove: true,
        };

        state.containers.insert(
            name.to_string(),
            MemoryContainer {
                id,
                spec,
                created,
                ip_address,
                running: true,
            },
        );
    }

    /// The names of all containers, sorted.
    pub fn names(&self) -> Vec<String> {
        self.state().containers.keys().cloned().collect()
    }

    /// Whether a container named `name` exists.
    pub fn contains(&self, name: &str) -> bool {
        self.state().containers.contains_key(name)
    }

    /// The spec the container `name` was created from.
    pub fn spec_of(&self, name: &str) -> Option<ContainerSpec> {
        self.state()
            .containers
            .get(name)
            .map(|container| container.spec.clone())
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MemoryState {
    fn next_identity(&mut self) -> (String, IpAddr) {
        self.next_id += 1;
        let n = self.next_id + 1;
        let ip = Ipv4Addr::new(172, 17, (n >> 8) as u8, n as u8);
        (format!("mem{:08x}", self.next_id), IpAddr::V4(ip))
    }
}

impl MemoryContainer {
    fn published_ports(&self) -> Vec<u16> {
        self.spec.host_port.into_iter().collect()
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait]
impl ContainerRuntime for MemoryRuntime {
    async fn create(&self, spec: &ContainerSpec) -> RuntimeResult<String> {
        let mut state = self.state();
        if state.failing_creates.contains(&spec.name) {
            return Err(RuntimeError::Other(format!("cannot create {}", spec.name)));
        }

        if state.containers.contains_key(&spec.name) {
            return Err(RuntimeError::Conflict(format!(
                "the container name {} is already in use",
                spec.name
            )));
        }

        let (id, ip_address) = state.next_identity();
        let created = state.created;
        state.containers.insert(
            spec.name.clone(),
            MemoryContainer {
                id: id.clone(),
                spec: spec.clone(),
                created,
                ip_address,
                running: false,
            },
        );

        Ok(id)
    }

    async fn start(&self, id: &str) -> RuntimeResult<()> {
        let delay = self.state().start_delay;
        pause(delay).await;

        let mut state = self.state();
        let MemoryState {
            containers,
            failing_starts,
            ..
        } = &mut *state;

        let container = containers
            .values_mut()
            .find(|container| container.id == id)
            .ok_or_else(|| RuntimeError::NotFound(id.to_string()))?;

        if failing_starts.contains(&container.spec.name) {
            return Err(RuntimeError::Other(format!(
                "cannot start {}",
                container.spec.name
            )));
        }

        container.running = true;
        Ok(())
    }

    async fn remove(&self, name: &str) -> RuntimeResult<()> {
        let delay = self.state().remove_delay;
        pause(delay).await;

        let mut state = self.state();
        if state.failing_removes.contains(name) {
            return Err(RuntimeError::Other(format!("cannot remove {}", name)));
        }

        state
            .containers
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| RuntimeError::NotFound(name.to_string()))
    }

    async fn list(&self, label_key: &str) -> RuntimeResult<Vec<ContainerSummary>> {
        let delay = self.state().list_delay;
        pause(delay).await;

        let state = self.state();
        if state.failing_list {
            return Err(RuntimeError::Other("runtime unavailable".to_string()));
        }

        Ok(state
            .containers
            .values()
            .filter(|container| container.spec.labels.contains_key(label_key))
            .map(|container| ContainerSummary {
                id: container.id.clone(),
                name: container.spec.name.clone(),
                created: container.created,
                labels: container.spec.labels.clone(),
                published_ports: container.published_ports(),
            })
            .collect())
    }

    async fn inspect(&self, name: &str) -> RuntimeResult<ContainerDetails> {
        let state = self.state();
        let container = state
            .containers
            .get(name)
            .ok_or_else(|| RuntimeError::NotFound(name.to_string()))?;

        Ok(ContainerDetails {
            id: container.id.clone(),
            name: container.spec.name.clone(),
            created: container.created,
            ip_address: container.running.then_some(container.ip_address),
            published_ports: container.published_ports(),
        })
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}
