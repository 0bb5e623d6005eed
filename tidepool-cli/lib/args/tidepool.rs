use std::{fmt, net::SocketAddr, path::PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use tidepool_utils::{DEFAULT_LISTEN_ADDR, EXAMPLE_CONFIG_FILENAME, TIDEPOOL_SERVER_ENV_VAR};

use crate::styles;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Provision short-lived container sandboxes
#[derive(Debug, Parser)]
#[command(name = "tidepool", author, styles = styles::styles())]
pub struct TidepoolArgs {
    /// The subcommand to run
    #[command(subcommand)]
    pub subcommand: Option<TidepoolSubcommand>,

    /// Show version
    #[arg(short = 'V', long)]
    pub version: bool,

    /// Log level of the tidepool crates, overriding RUST_LOG
    #[arg(long, global = true, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Address of the control plane
    #[arg(long, global = true, env = TIDEPOOL_SERVER_ENV_VAR, default_value = DEFAULT_LISTEN_ADDR)]
    pub server: String,

    /// Seconds to wait for the control plane to answer
    #[arg(long, global = true, default_value_t = 60)]
    pub timeout: u64,
}

/// Available subcommands
#[derive(Debug, Subcommand)]
pub enum TidepoolSubcommand {
    /// Create a sandbox for an application
    #[command(name = "create")]
    Create {
        /// Access token of the owner, `<owner>:<secret>`
        token: String,

        /// Application name
        app: String,

        /// Image to run
        image: String,

        /// Port the application listens on inside the sandbox
        port: u16,

        /// How long the sandbox lives, e.g. `90s` or `1h30m`. Defaults to the server setting
        lifetime: Option<String>,

        /// Routing key to request in hostname addressing mode
        #[arg(long)]
        hostname: Option<String>,
    },

    /// Remove the sandbox of an application
    #[command(name = "remove")]
    Remove {
        /// Owner id or access token
        #[arg(value_name = "USER|TOKEN")]
        owner: String,

        /// Application name
        app: String,
    },

    /// List sandboxes
    #[command(name = "list")]
    List {
        /// Only list sandboxes of this owner
        #[arg(long)]
        user: Option<u64>,

        /// Only list sandboxes of this application
        #[arg(long)]
        app: Option<String>,

        /// Only list the sandbox published on this host port
        #[arg(long)]
        port: Option<u16>,
    },

    /// Remove every expired sandbox
    #[command(name = "purge")]
    Purge,

    /// Run the control plane and, in hostname addressing mode, the ingress router
    #[command(name = "server")]
    Server {
        /// Configuration file to load instead of searching the default locations
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Address of the control plane, overriding the configuration
        #[arg(short, long)]
        listen: Option<SocketAddr>,
    },

    /// Write the default configuration
    #[command(name = "defaultconfig")]
    Defaultconfig {
        /// File to write to
        #[arg(default_value = EXAMPLE_CONFIG_FILENAME)]
        path: PathBuf,

        /// Print the configuration instead of writing it
        #[arg(long)]
        stdout: bool,
    },
}

/// Log levels selectable on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// Only errors
    Error,

    /// Warnings and errors
    Warn,

    /// Informational messages and above
    Info,

    /// Debug messages and above
    Debug,

    /// Everything
    Trace,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl LogLevel {
    /// The level as a tracing filter directive.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
