//! Configuration of the tidepool server.
//!
//! The configuration is a YAML file with kebab-case keys; every key is optional and falls back to
//! the defaults in `tidepool_utils`. The file is looked up in this order:
//! - the path given on the command line
//! - the path in `TIDEPOOL_CONFIG`
//! - `./tidepool.yaml`
//! - `/etc/tidepool/tidepool.yaml`
//!
//! When none exists, a default configuration is written to `tidepool.example.yaml` so it can be
//! copied into place.

use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use getset::Getters;
use serde::{Deserialize, Serialize};
use tidepool_core::{
    management::{AddressingMode, LifecycleSettings},
    ports::PortPool,
};
use tidepool_utils::{
    CONFIG_FILENAME, DEFAULT_BACKEND_PORT, DEFAULT_CONTAINER_PREFIX, DEFAULT_HEADER_BUFFER_SIZE,
    DEFAULT_INGRESS_ADDR, DEFAULT_LIFETIME, DEFAULT_LISTEN_ADDR, DEFAULT_PORT_MAX,
    DEFAULT_PORT_MIN, DEFAULT_REQUEST_TIMEOUT, EXAMPLE_CONFIG_FILENAME, SYSTEM_CONFIG_DIR,
    TIDEPOOL_CONFIG_ENV_VAR,
};

use crate::{ServerError, ServerResult};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The smallest header buffer the ingress router accepts.
const MIN_HEADER_BUFFER_SIZE: usize = 64;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Server settings loaded from the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
#[getset(get = "pub with_prefix")]
pub struct Config {
    /// Address of the control plane.
    listen_addr: SocketAddr,

    /// Address of the ingress router.
    ingress_addr: SocketAddr,

    /// Prefix of every sandbox container name.
    container_prefix: String,

    /// Lowest host port handed out to sandboxes.
    port_min: u16,

    /// Highest host port handed out to sandboxes.
    port_max: u16,

    /// How sandboxes are addressed.
    addressing: AddressingMode,

    /// Lifetime of sandboxes whose request carries none.
    #[serde(with = "tidepool_utils::duration_string")]
    default_lifetime: Duration,

    /// Container port ingress traffic goes to when a request names none.
    backend_port: u16,

    /// Maximum number of header bytes read per ingress connection.
    header_buffer_size: usize,

    /// Time a single control plane request may take.
    #[serde(with = "tidepool_utils::duration_string")]
    request_timeout: Duration,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Config {
    /// Parses and validates a configuration document.
    pub fn from_yaml(yaml: &str) -> ServerResult<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads the configuration file at `path`.
    pub fn load(path: &Path) -> ServerResult<Self> {
        let yaml = std::fs::read_to_string(path)?;
        let config = Self::from_yaml(&yaml)
            .map_err(|e| ServerError::Config(format!("{}: {}", path.display(), e)))?;

        tracing::info!("loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Writes the configuration to `path`.
    pub fn save(&self, path: &Path) -> ServerResult<()> {
        std::fs::write(path, self.to_yaml()?)?;
        Ok(())
    }

    /// Renders the configuration as YAML.
    pub fn to_yaml(&self) -> ServerResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Finds and loads the configuration file.
    ///
    /// An explicitly given path, either as `explicit` or through `TIDEPOOL_CONFIG`, must exist.
    /// When no file is found at all, the default configuration is written to
    /// `tidepool.example.yaml` in the working directory and [`ServerError::ConfigNotFound`] is
    /// returned.
    pub fn discover(explicit: Option<&Path>) -> ServerResult<Self> {
        let from_env = std::env::var_os(TIDEPOOL_CONFIG_ENV_VAR).map(PathBuf::from);
        if let Some(path) = explicit.map(Path::to_path_buf).or(from_env) {
            return Self::load(&path);
        }

        if let Some(path) = Self::search_paths().into_iter().find(|path| path.is_file()) {
            return Self::load(&path);
        }

        let example = PathBuf::from(EXAMPLE_CONFIG_FILENAME);
        Self::default().save(&example)?;
        tracing::warn!(
            "no configuration found, wrote defaults to {}",
            example.display()
        );

        Err(ServerError::ConfigNotFound { example })
    }

    /// The implicit locations of the configuration file, in lookup order.
    pub fn search_paths() -> Vec<PathBuf> {
        vec![
            PathBuf::from(CONFIG_FILENAME),
            Path::new(SYSTEM_CONFIG_DIR).join(CONFIG_FILENAME),
        ]
    }

    /// Checks the values that cannot be expressed by the types alone.
    pub fn validate(&self) -> ServerResult<()> {
        if self.port_min > self.port_max {
            return Err(ServerError::Config(format!(
                "port-min {} is greater than port-max {}",
                self.port_min, self.port_max
            )));
        }

        if self.container_prefix.is_empty()
            || !self
                .container_prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return Err(ServerError::Config(format!(
                "container-prefix {:?} must be non-empty and contain only alphanumeric characters or hyphens",
                self.container_prefix
            )));
        }

        if self.header_buffer_size < MIN_HEADER_BUFFER_SIZE {
            return Err(ServerError::Config(format!(
                "header-buffer-size must be at least {} bytes",
                MIN_HEADER_BUFFER_SIZE
            )));
        }

        if self.request_timeout.is_zero() {
            return Err(ServerError::Config(
                "request-timeout must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Overrides the control plane address.
    pub fn with_listen_addr(mut self, listen_addr: SocketAddr) -> Self {
        self.listen_addr = listen_addr;
        self
    }

    /// Overrides the ingress router address.
    pub fn with_ingress_addr(mut self, ingress_addr: SocketAddr) -> Self {
        self.ingress_addr = ingress_addr;
        self
    }

    /// Overrides the addressing mode.
    pub fn with_addressing(mut self, addressing: AddressingMode) -> Self {
        self.addressing = addressing;
        self
    }

    /// Overrides the request timeout.
    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    /// The lifecycle settings described by this configuration.
    pub fn lifecycle_settings(&self) -> LifecycleSettings {
        LifecycleSettings::new(&self.container_prefix, self.addressing)
            .with_default_lifetime(self.default_lifetime)
            .with_backend_port(self.backend_port)
    }

    /// An empty port pool over the configured range.
    pub fn port_pool(&self) -> ServerResult<PortPool> {
        Ok(PortPool::new(self.port_min, self.port_max)?)
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: parse_default_addr(DEFAULT_LISTEN_ADDR, 9998),
            ingress_addr: parse_default_addr(DEFAULT_INGRESS_ADDR, 9999),
            container_prefix: DEFAULT_CONTAINER_PREFIX.to_string(),
            port_min: DEFAULT_PORT_MIN,
            port_max: DEFAULT_PORT_MAX,
            addressing: AddressingMode::default(),
            default_lifetime: DEFAULT_LIFETIME,
            backend_port: DEFAULT_BACKEND_PORT,
            header_buffer_size: DEFAULT_HEADER_BUFFER_SIZE,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

fn parse_default_addr(addr: &str, port: u16) -> SocketAddr {
    addr.parse()
        .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], port)))
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
