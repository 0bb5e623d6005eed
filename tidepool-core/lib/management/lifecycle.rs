use std::{
    collections::HashMap,
    fmt,
    future::Future,
    net::SocketAddr,
    sync::Arc,
    time::Duration,
};

use chrono::{DateTime, SubsecRound, Utc};
use futures::future::join_all;
use getset::Getters;
use serde::{Deserialize, Serialize};
use tidepool_utils::{DEFAULT_BACKEND_PORT, DEFAULT_LIFETIME, SANDBOX_LABEL_KEY};
use tokio::sync::Mutex;

use crate::{
    clock::{Clock, SystemClock},
    identity::{self, SandboxRecord},
    models::{SandboxInfo, SandboxRequest},
    ports::PortPool,
    runtime::{ContainerDetails, ContainerRuntime, ContainerSpec, ContainerSummary, RuntimeError},
    Compensation, CompensationStep, CreateFailure, PurgeErrors, SandboxAction, SandboxActionError,
    TidepoolError, TidepoolResult,
};

use super::{Route, RouteTable};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The network sandbox containers are attached to.
const SANDBOX_NETWORK_MODE: &str = "bridge";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// How callers reach a sandbox.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressingMode {
    /// Each sandbox publishes its port on a dedicated host port.
    #[default]
    Port,

    /// Sandboxes are reached through the ingress router by routing key.
    Hostname,
}

/// The knobs of a [`Lifecycle`].
#[derive(Debug, Clone, Getters)]
#[getset(get = "pub with_prefix")]
pub struct LifecycleSettings {
    /// The prefix of every container name.
    namespace: String,

    /// How sandboxes are addressed.
    addressing: AddressingMode,

    /// The lifetime of sandboxes whose request carries none.
    default_lifetime: Duration,

    /// The container port ingress traffic goes to when a request names none.
    backend_port: u16,
}

/// Creates, removes, lists and reclaims sandboxes.
///
/// The controller owns the port pool and the route table. Neither lock is ever held across a
/// call into the container runtime, so a slow runtime never blocks allocation for other
/// requests.
///
/// Clones share the pool, the route table and the runtime. Create, remove and purge run on a
/// task of their own, so a caller that stops waiting never leaves a sandbox half built or a port
/// unaccounted for.
#[derive(Clone)]
pub struct Lifecycle {
    runtime: Arc<dyn ContainerRuntime>,
    clock: Arc<dyn Clock>,
    ports: Arc<Mutex<PortPool>>,
    routes: Arc<RouteTable>,
    settings: LifecycleSettings,
}

/// The outcome of a purge.
#[derive(Debug)]
pub struct PurgeReport {
    /// Every sandbox that had expired, whether or not its removal succeeded.
    pub selected: Vec<SandboxInfo>,

    /// The sandboxes whose removal failed.
    pub errors: Option<PurgeErrors>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl LifecycleSettings {
    /// Creates settings with the default lifetime and backend port.
    pub fn new(namespace: impl Into<String>, addressing: AddressingMode) -> Self {
        Self {
            namespace: namespace.into(),
            addressing,
            default_lifetime: DEFAULT_LIFETIME,
            backend_port: DEFAULT_BACKEND_PORT,
        }
    }

    /// Sets the lifetime of sandboxes whose request carries none.
    pub fn with_default_lifetime(mut self, default_lifetime: Duration) -> Self {
        self.default_lifetime = default_lifetime;
        self
    }

    /// Sets the default container port for hostname-addressed sandboxes.
    pub fn with_backend_port(mut self, backend_port: u16) -> Self {
        self.backend_port = backend_port;
        self
    }
}

impl Lifecycle {
    /// Creates a controller using the wall clock and an empty route table.
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        ports: PortPool,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            runtime,
            clock: Arc::new(SystemClock),
            ports: Arc::new(Mutex::new(ports)),
            routes: Arc::new(RouteTable::new()),
            settings,
        }
    }

    /// Replaces the time source used for expiry decisions.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The settings the controller was built with.
    pub fn settings(&self) -> &LifecycleSettings {
        &self.settings
    }

    /// The route table the ingress router reads from.
    pub fn routes(&self) -> Arc<RouteTable> {
        Arc::clone(&self.routes)
    }

    /// The host ports currently handed out, in ascending order.
    pub async fn used_ports(&self) -> Vec<u16> {
        self.ports.lock().await.allocated()
    }

    /// Creates and starts the sandbox described by `request`.
    ///
    /// In port addressing mode a host port is allocated first and published for `request.port`.
    /// In hostname addressing mode the sandbox is registered with the route table once it runs.
    ///
    /// ## Errors
    ///
    /// - Validation errors for a malformed request
    /// - [`TidepoolError::PortsExhausted`] when no host port is free
    /// - [`TidepoolError::Runtime`] when the container could not be created, e.g. because the
    ///   owner already has a sandbox for the application
    /// - [`TidepoolError::CreateFailed`] when the container was created but could not be brought
    ///   up; the partial sandbox has been rolled back as far as possible
    ///
    /// The work continues to completion, including any rollback, even if the returned future is
    /// dropped.
    pub async fn create(&self, request: &SandboxRequest) -> TidepoolResult<SandboxInfo> {
        let this = self.clone();
        let request = request.clone();
        detached(async move { this.provision(&request).await }).await
    }

    /// Force-removes the sandbox of `request.app` owned by the request's owner, then hands its
    /// host port back to the pool and drops its route.
    ///
    /// Removing a sandbox that does not exist is an error ([`TidepoolError::is_not_found`]).
    /// Its route, if one is left over from a container that went away on its own, is dropped
    /// all the same.
    pub async fn remove(&self, request: &SandboxRequest) -> TidepoolResult<()> {
        let owner = request.owner()?;
        identity::validate_app_name(&request.app)?;

        let name = identity::sandbox_name(&self.settings.namespace, owner, &request.app);
        let this = self.clone();
        detached(async move { this.tear_down(&name).await }).await
    }

    /// Lists sandboxes matching the non-zero fields of `filter`: owner, application and
    /// published port.
    ///
    /// Containers whose label cannot be decoded are skipped with a warning.
    pub async fn list(&self, filter: &SandboxRequest) -> TidepoolResult<Vec<SandboxInfo>> {
        let owner = filter.resolve_owner()?;
        let containers = self.runtime.list(SANDBOX_LABEL_KEY).await?;

        let sandboxes = containers
            .iter()
            .filter_map(|container| match decode_label(container) {
                Ok(record) => Some((container, record)),
                Err(e) => {
                    tracing::warn!("skipping sandbox {}: {}", container.name, e);
                    None
                }
            })
            .filter(|(_, record)| owner.map_or(true, |owner| record.user == owner))
            .filter(|(_, record)| filter.app.is_empty() || record.app == filter.app)
            .filter(|(container, _)| {
                filter.port == 0 || container.published_ports.contains(&filter.port)
            })
            .map(|(container, record)| info_of(container, &record))
            .collect();

        Ok(sandboxes)
    }

    /// Removes every sandbox whose deadline has passed.
    ///
    /// A container whose label cannot be decoded counts as already expired. Removals run
    /// concurrently and fail independently; the report lists every selected sandbox together
    /// with the removals that failed. Like [`Lifecycle::create`], the batch runs to completion
    /// even if the returned future is dropped.
    pub async fn purge(&self) -> TidepoolResult<PurgeReport> {
        let this = self.clone();
        detached(async move { this.purge_expired().await }).await
    }

    /// Rebuilds the used port set and the route table from the containers the runtime reports.
    ///
    /// Returns the number of labeled containers found.
    pub async fn resync(&self) -> TidepoolResult<usize> {
        let containers = self.runtime.list(SANDBOX_LABEL_KEY).await?;

        let published: Vec<u16> = containers
            .iter()
            .flat_map(|container| container.published_ports.iter().copied())
            .collect();
        self.ports.lock().await.resync(published);

        if self.settings.addressing == AddressingMode::Hostname {
            let mut routes = HashMap::new();
            for container in &containers {
                let Ok(SandboxRecord {
                    hostname: Some(key),
                    backend_port,
                    ..
                }) = decode_label(container)
                else {
                    continue;
                };

                match self.runtime.inspect(&container.name).await {
                    Ok(ContainerDetails {
                        ip_address: Some(ip),
                        ..
                    }) => {
                        let backend_port = backend_port.unwrap_or(self.settings.backend_port);
                        let route = Route {
                            sandbox: container.name.clone(),
                            addr: SocketAddr::new(ip, backend_port),
                        };
                        routes.insert(key, route);
                    }
                    Ok(_) => tracing::warn!("sandbox {} has no address, not routing", container.name),
                    Err(e) => tracing::warn!("failed to inspect sandbox {}: {}", container.name, e),
                }
            }

            tracing::info!("route table resynced with {} routes", routes.len());
            self.routes.replace_all(routes).await;
        }

        Ok(containers.len())
    }
}

impl Lifecycle {
    async fn provision(&self, request: &SandboxRequest) -> TidepoolResult<SandboxInfo> {
        let owner = request.owner()?;
        identity::validate_app_name(&request.app)?;
        if request.image.trim().is_empty() {
            return Err(TidepoolError::InvalidArgument(
                "image cannot be empty".to_string(),
            ));
        }

        let lifetime = request
            .lifetime
            .filter(|lifetime| !lifetime.is_zero())
            .unwrap_or(self.settings.default_lifetime);

        let name = identity::sandbox_name(&self.settings.namespace, owner, &request.app);
        let mut record = SandboxRecord::new(owner, &request.app, lifetime);

        // Work out the route before anything is allocated
        let route = match self.settings.addressing {
            AddressingMode::Port => {
                if request.port == 0 {
                    return Err(TidepoolError::InvalidArgument(
                        "port must be set for port-addressed sandboxes".to_string(),
                    ));
                }
                None
            }
            AddressingMode::Hostname => {
                let key = self.routing_key_for(request, owner)?;
                let backend_port = match request.port {
                    0 => self.settings.backend_port,
                    port => port,
                };
                record = record.with_route(&key, backend_port);
                Some((key, backend_port))
            }
        };

        let spec = ContainerSpec {
            name: name.clone(),
            hostname: name.clone(),
            image: request.image.clone(),
            labels: HashMap::from([(SANDBOX_LABEL_KEY.to_string(), record.encode()?)]),
            container_port: Some(route.as_ref().map_or(request.port, |(_, port)| *port)),
            host_port: None,
            network_mode: SANDBOX_NETWORK_MODE.to_string(),
            auto_remove: true,
        };

        let Some((key, backend_port)) = route else {
            return self.launch(spec, owner, lifetime, None).await;
        };

        let claimed = self
            .routes
            .claim(&key, &name)
            .await
            .map_err(|sandbox| TidepoolError::HostnameTaken {
                key: key.clone(),
                sandbox,
            })?;

        let result = self
            .launch(spec, owner, lifetime, Some((key.clone(), backend_port)))
            .await;
        if result.is_err() && claimed {
            self.routes.release_claim(&key, &name).await;
        }

        result
    }

    /// Allocates, creates and starts a sandbox whose request has been validated, rolling back
    /// whatever was done when a step fails.
    async fn launch(
        &self,
        mut spec: ContainerSpec,
        owner: u64,
        lifetime: Duration,
        route: Option<(String, u16)>,
    ) -> TidepoolResult<SandboxInfo> {
        let name = spec.name.clone();

        // The pool lock is released at the end of this statement
        let host_port = match route {
            None => Some(self.ports.lock().await.allocate()?),
            Some(_) => None,
        };
        spec.host_port = host_port;

        let id = match self.runtime.create(&spec).await {
            Ok(id) => id,
            Err(e) => {
                if let Some(port) = host_port {
                    self.ports.lock().await.release(port);
                }
                tracing::warn!("failed to create sandbox {}: {}", name, e);
                return Err(e.into());
            }
        };

        let details = match self.bring_up(&id, &name, route.is_some()).await {
            Ok(details) => details,
            Err(cause) => {
                let compensation = self.compensate(&name, host_port).await;
                tracing::error!(
                    "failed to start sandbox {}: {} (removal {}, released port {:?})",
                    name,
                    cause,
                    compensation.removal,
                    compensation.released_port
                );
                return Err(CreateFailure {
                    sandbox: name,
                    cause,
                    compensation,
                }
                .into());
            }
        };

        let hostname = match (route, details.ip_address) {
            (Some((key, backend_port)), Some(ip)) => {
                let route = Route {
                    sandbox: name.clone(),
                    addr: SocketAddr::new(ip, backend_port),
                };
                if let Err(holder) = self.routes.insert_claimed(&key, route).await {
                    let compensation = self.compensate(&name, host_port).await;
                    tracing::warn!(
                        "hostname {} went to {} while {} started (removal {})",
                        key,
                        holder,
                        name,
                        compensation.removal
                    );
                    return Err(TidepoolError::HostnameTaken {
                        key,
                        sandbox: holder,
                    });
                }
                Some(key)
            }
            _ => None,
        };

        let info = SandboxInfo {
            name,
            id,
            port: host_port.unwrap_or(0),
            hostname,
            deadline: deadline_of(details.created, lifetime),
        };

        tracing::info!(
            "created sandbox {} for owner {} (port {}, expires {})",
            info.name,
            owner,
            info.port,
            info.deadline
        );

        Ok(info)
    }

    async fn tear_down(&self, name: &str) -> TidepoolResult<()> {
        let details = match self.runtime.inspect(name).await {
            Ok(details) => details,
            Err(e @ RuntimeError::NotFound(_)) => {
                self.routes.remove_sandbox(name).await;
                return Err(e.into());
            }
            Err(e) => return Err(e.into()),
        };

        match self.runtime.remove(name).await {
            // Gone between inspect and remove, which is what was asked for
            Ok(()) | Err(RuntimeError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
        self.reclaim(name, &details.published_ports).await;

        tracing::info!("removed sandbox {}", name);
        Ok(())
    }

    async fn purge_expired(&self) -> TidepoolResult<PurgeReport> {
        let containers = self.runtime.list(SANDBOX_LABEL_KEY).await?;
        let now = self.clock.now();

        let expired: Vec<(&ContainerSummary, SandboxInfo)> = containers
            .iter()
            .filter_map(|container| match decode_label(container) {
                Ok(record) => {
                    let info = info_of(container, &record);
                    (info.deadline < now).then_some((container, info))
                }
                Err(e) => {
                    tracing::warn!("treating sandbox {} as expired: {}", container.name, e);
                    Some((container, info_of(container, &SandboxRecord::expired())))
                }
            })
            .collect();

        if expired.is_empty() {
            return Ok(PurgeReport {
                selected: Vec::new(),
                errors: None,
            });
        }

        tracing::info!("purging {} expired sandboxes", expired.len());

        let results = join_all(
            expired
                .iter()
                .map(|(_, info)| self.runtime.remove(&info.name)),
        )
        .await;

        let mut failures = Vec::new();
        for ((container, info), result) in expired.iter().zip(results) {
            match result {
                Ok(()) => {
                    self.reclaim(&info.name, &container.published_ports).await;
                    tracing::info!("purged sandbox {}", info.name);
                }
                Err(error) => {
                    tracing::warn!("failed to purge sandbox {}: {}", info.name, error);
                    failures.push(SandboxActionError {
                        action: SandboxAction::Remove,
                        sandbox: info.clone(),
                        error,
                    });
                }
            }
        }

        Ok(PurgeReport {
            selected: expired.into_iter().map(|(_, info)| info).collect(),
            errors: PurgeErrors::from_failures(failures),
        })
    }

    /// Picks the routing key for a hostname-addressed create.
    fn routing_key_for(&self, request: &SandboxRequest, owner: u64) -> TidepoolResult<String> {
        let key = match request.hostname.as_deref().map(str::trim) {
            Some(hostname) if !hostname.is_empty() => hostname.to_ascii_lowercase(),
            _ => identity::default_routing_key(&self.settings.namespace, owner, &request.app),
        };
        identity::validate_routing_key(&key)?;
        Ok(key)
    }

    /// Starts a created container and reads back its creation time and address.
    async fn bring_up(
        &self,
        id: &str,
        name: &str,
        needs_address: bool,
    ) -> Result<ContainerDetails, RuntimeError> {
        self.runtime.start(id).await?;
        let details = self.runtime.inspect(name).await?;

        if needs_address && details.ip_address.is_none() {
            return Err(RuntimeError::Incomplete(format!(
                "container {} has no network address",
                name
            )));
        }

        Ok(details)
    }

    /// Undoes a partially created sandbox.
    async fn compensate(&self, name: &str, host_port: Option<u16>) -> Compensation {
        let removal = match self.runtime.remove(name).await {
            Ok(()) => CompensationStep::Succeeded,
            Err(RuntimeError::NotFound(_)) => CompensationStep::Skipped,
            Err(e) => CompensationStep::Failed(e),
        };

        if let Some(port) = host_port {
            self.ports.lock().await.release(port);
        }

        Compensation {
            removal,
            released_port: host_port,
        }
    }

    /// Returns the resources of a removed sandbox.
    async fn reclaim(&self, name: &str, published_ports: &[u16]) {
        {
            let mut ports = self.ports.lock().await;
            for port in published_ports {
                ports.release(*port);
            }
        }

        self.routes.remove_sandbox(name).await;
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for AddressingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressingMode::Port => write!(f, "port"),
            AddressingMode::Hostname => write!(f, "hostname"),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// The moment a sandbox created at `created` with `lifetime` expires.
///
/// The creation time is truncated to whole seconds first, so the deadline is stable across
/// reads. A deadline past the representable range saturates.
pub fn deadline_of(created: DateTime<Utc>, lifetime: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(lifetime)
        .ok()
        .and_then(|lifetime| created.trunc_subsecs(0).checked_add_signed(lifetime))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

/// Runs `work` on its own task and waits for it.
async fn detached<T, F>(work: F) -> TidepoolResult<T>
where
    T: Send + 'static,
    F: Future<Output = TidepoolResult<T>> + Send + 'static,
{
    tokio::spawn(work).await?
}

fn decode_label(container: &ContainerSummary) -> TidepoolResult<SandboxRecord> {
    let label = container.labels.get(SANDBOX_LABEL_KEY).ok_or_else(|| {
        TidepoolError::InvalidArgument(format!("container {} has no sandbox label", container.name))
    })?;

    SandboxRecord::decode(label)
}

fn info_of(container: &ContainerSummary, record: &SandboxRecord) -> SandboxInfo {
    SandboxInfo {
        name: container.name.clone(),
        id: container.id.clone(),
        port: container.published_ports.first().copied().unwrap_or(0),
        hostname: record.hostname.clone(),
        deadline: deadline_of(container.created, record.lifetime),
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadline_truncates_creation_time() {
        let created = DateTime::from_timestamp(1_700_000_000, 999_000_000).unwrap();
        assert_eq!(
            deadline_of(created, Duration::from_secs(60)),
            DateTime::from_timestamp(1_700_000_060, 0).unwrap()
        );
        assert_eq!(
            deadline_of(created, Duration::ZERO),
            DateTime::from_timestamp(1_700_000_000, 0).unwrap()
        );
    }

    #[test]
    fn test_deadline_saturates() {
        let created = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        assert_eq!(
            deadline_of(created, Duration::from_secs(u64::MAX)),
            DateTime::<Utc>::MAX_UTC
        );
    }

    #[test]
    fn test_addressing_mode_serde() {
        assert_eq!(
            serde_json::from_str::<AddressingMode>(r#""hostname""#).unwrap(),
            AddressingMode::Hostname
        );
        assert_eq!(serde_json::to_string(&AddressingMode::Port).unwrap(), r#""port""#);
        assert_eq!(AddressingMode::default(), AddressingMode::Port);
    }
}
