use std::{collections::HashMap, net::IpAddr};

use async_trait::async_trait;
use bollard::{
    container::{
        Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions,
        RemoveContainerOptions, StartContainerOptions,
    },
    models::{ContainerInspectResponse, HostConfig, PortBinding, PortMap},
    Docker,
};
use chrono::{DateTime, Utc};

use super::{
    ContainerDetails, ContainerRuntime, ContainerSpec, ContainerSummary, RuntimeError,
    RuntimeResult,
};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The host address published ports are bound to.
const PUBLISH_HOST_IP: &str = "0.0.0.0";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A [`ContainerRuntime`] backed by the Docker Engine API.
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl DockerRuntime {
    /// Connects to the Docker daemon using `DOCKER_HOST` or the platform default socket.
    pub fn connect() -> RuntimeResult<Self> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self { docker })
    }

    /// Wraps an existing client.
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }

    /// Checks that the daemon answers.
    pub async fn ping(&self) -> RuntimeResult<()> {
        self.docker.ping().await?;
        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn create(&self, spec: &ContainerSpec) -> RuntimeResult<String> {
        let port_key = spec.container_port.map(|port| format!("{}/tcp", port));

        let exposed_ports = port_key
            .as_ref()
            .map(|key| HashMap::from([(key.clone(), HashMap::new())]));

        let port_bindings = match (&port_key, spec.host_port) {
            (Some(key), Some(host_port)) => Some(HashMap::from([(
                key.clone(),
                Some(vec![PortBinding {
                    host_ip: Some(PUBLISH_HOST_IP.to_string()),
                    host_port: Some(host_port.to_string()),
                }]),
            )])),
            _ => None,
        };

        let config = Config {
            hostname: Some(spec.hostname.clone()),
            image: Some(spec.image.clone()),
            labels: Some(spec.labels.clone()),
            exposed_ports,
            host_config: Some(HostConfig {
                network_mode: Some(spec.network_mode.clone()),
                port_bindings,
                auto_remove: Some(spec.auto_remove),
                ..Default::default()
            }),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };

        let response = self.docker.create_container(Some(options), config).await?;
        for warning in &response.warnings {
            tracing::warn!("docker warning while creating {}: {}", spec.name, warning);
        }

        Ok(response.id)
    }

    async fn start(&self, id: &str) -> RuntimeResult<()> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await?;
        Ok(())
    }

    async fn remove(&self, name: &str) -> RuntimeResult<()> {
        let options = RemoveContainerOptions {
            force: true,
            v: true,
            ..Default::default()
        };

        self.docker.remove_container(name, Some(options)).await?;
        Ok(())
    }

    async fn list(&self, label_key: &str) -> RuntimeResult<Vec<ContainerSummary>> {
        let options = ListContainersOptions::<String> {
            all: true,
            filters: HashMap::from([("label".to_string(), vec![label_key.to_string()])]),
            ..Default::default()
        };

        let containers = self.docker.list_containers(Some(options)).await?;

        let summaries = containers
            .into_iter()
            .filter_map(|container| {
                let Some(id) = container.id else {
                    tracing::warn!("skipping labeled container without an id");
                    return None;
                };

                let name = container
                    .names
                    .as_ref()
                    .and_then(|names| names.first())
                    .map(|name| name.trim_start_matches('/').to_string())
                    .unwrap_or_else(|| id.clone());

                let created = container
                    .created
                    .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
                    .unwrap_or_default();

                let mut published_ports: Vec<u16> = container
                    .ports
                    .unwrap_or_default()
                    .iter()
                    .filter_map(|port| port.public_port)
                    .collect();
                published_ports.sort_unstable();
                published_ports.dedup();

                Some(ContainerSummary {
                    id,
                    name,
                    created,
                    labels: container.labels.unwrap_or_default(),
                    published_ports,
                })
            })
            .collect();

        Ok(summaries)
    }

    async fn inspect(&self, name: &str) -> RuntimeResult<ContainerDetails> {
        let response = self
            .docker
            .inspect_container(name, None::<InspectContainerOptions>)
            .await?;

        details_from_inspect(name, response)
    }
}

impl From<bollard::errors::Error> for RuntimeError {
    fn from(error: bollard::errors::Error) -> Self {
        match error {
            bollard::errors::Error::DockerResponseServerError {
                status_code: 404,
                message,
            } => RuntimeError::NotFound(message),
            bollard::errors::Error::DockerResponseServerError {
                status_code: 409,
                message,
            } => RuntimeError::Conflict(message),
            other => RuntimeError::Docker(other),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

fn details_from_inspect(
    requested: &str,
    response: ContainerInspectResponse,
) -> RuntimeResult<ContainerDetails> {
    let id = response
        .id
        .ok_or_else(|| RuntimeError::Incomplete(format!("container {} has no id", requested)))?;

    let created = response
        .created
        .as_deref()
        .and_then(|created| DateTime::parse_from_rfc3339(created).ok())
        .map(|created| created.with_timezone(&Utc))
        .ok_or_else(|| {
            RuntimeError::Incomplete(format!("container {} has no creation time", requested))
        })?;

    let name = response
        .name
        .map(|name| name.trim_start_matches('/').to_string())
        .unwrap_or_else(|| requested.to_string());

    let network = response.network_settings.unwrap_or_default();

    let ip_address = network
        .ip_address
        .iter()
        .chain(
            network
                .networks
                .iter()
                .flat_map(|networks| networks.values())
                .filter_map(|endpoint| endpoint.ip_address.as_ref()),
        )
        .find_map(|ip| ip.parse::<IpAddr>().ok());

    Ok(ContainerDetails {
        id,
        name,
        created,
        ip_address,
        published_ports: host_ports(network.ports.as_ref()),
    })
}

fn host_ports(ports: Option<&PortMap>) -> Vec<u16> {
    let mut published: Vec<u16> = ports
        .into_iter()
        .flat_map(|map| map.values())
        .flatten()
        .flatten()
        .filter_map(|binding| binding.host_port.as_deref())
        .filter_map(|port| port.parse().ok())
        .collect();

    published.sort_unstable();
    published.dedup();
    published
}
