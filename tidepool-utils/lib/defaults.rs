//! Default values shared by the tidepool crates.

use std::time::Duration;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The name of the project, used for the default namespace prefix and config paths.
pub const PROJECT_NAME: &str = "tidepool";

/// The label key under which sandbox metadata is stored on every container.
pub const SANDBOX_LABEL_KEY: &str = "dev.tidepool.sandbox";

/// The default namespace prefix for container names.
pub const DEFAULT_CONTAINER_PREFIX: &str = PROJECT_NAME;

/// The default address of the control plane.
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:9998";

/// The default address of the ingress router.
pub const DEFAULT_INGRESS_ADDR: &str = "127.0.0.1:9999";

/// The lowest host port handed out to sandboxes by default.
pub const DEFAULT_PORT_MIN: u16 = 10000;

/// The highest host port handed out to sandboxes by default.
pub const DEFAULT_PORT_MAX: u16 = 19999;

/// The lifetime given to sandboxes whose request carries none.
pub const DEFAULT_LIFETIME: Duration = Duration::from_secs(60);

/// The container port traffic is routed to in hostname addressing mode.
pub const DEFAULT_BACKEND_PORT: u16 = 80;

/// The maximum number of header bytes the ingress router buffers per connection.
pub const DEFAULT_HEADER_BUFFER_SIZE: usize = 8192;

/// The time a single control plane request may take.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// The file name of the configuration file.
pub const CONFIG_FILENAME: &str = "tidepool.yaml";

/// The file name the default configuration is written to when none exists.
pub const EXAMPLE_CONFIG_FILENAME: &str = "tidepool.example.yaml";

/// The system-wide configuration directory.
pub const SYSTEM_CONFIG_DIR: &str = "/etc/tidepool";

/// Environment variable pointing at the configuration file.
pub const TIDEPOOL_CONFIG_ENV_VAR: &str = "TIDEPOOL_CONFIG";

/// Environment variable overriding the control plane address used by the client.
pub const TIDEPOOL_SERVER_ENV_VAR: &str = "TIDEPOOL_SERVER";
