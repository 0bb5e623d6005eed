use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use tidepool_cli::{
    list_sandboxes, show_sandbox, AnsiStyles, LogLevel, TidepoolCliError, TidepoolCliResult,
    TidepoolClient,
};
use tidepool_core::{models::SandboxRequest, runtime::DockerRuntime, token};
use tidepool_server::{Config, ServerError};
use tidepool_utils::{parse_duration, CHECKMARK, CROSSMARK};
use tracing_subscriber::EnvFilter;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The crates whose log level `--log-level` sets.
const LOG_TARGETS: [&str; 4] = ["tidepool", "tidepool_cli", "tidepool_core", "tidepool_server"];

/// The filter used when neither `--log-level` nor `RUST_LOG` is given.
const DEFAULT_LOG_FILTER: &str = "warn,tidepool_core=info,tidepool_server=info";

//--------------------------------------------------------------------------------------------------
// Functions: Handlers
//--------------------------------------------------------------------------------------------------

pub fn init_tracing(level: Option<LogLevel>) {
    let filter = match level {
        Some(level) => EnvFilter::new(
            LOG_TARGETS
                .iter()
                .map(|target| format!("{}={}", target, level))
                .collect::<Vec<_>>()
                .join(","),
        ),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

pub async fn create_subcommand(
    client: &TidepoolClient,
    token: String,
    app: String,
    image: String,
    port: u16,
    lifetime: Option<String>,
    hostname: Option<String>,
) -> TidepoolCliResult<()> {
    let user = token::parse_owner_id(&token)?;
    let lifetime = lifetime.as_deref().map(parse_duration).transpose()?;

    let request = SandboxRequest {
        user,
        token,
        app,
        image,
        port,
        hostname,
        lifetime,
    };

    let info = client.create(&request).await?;
    print!("{}", show_sandbox(&info));
    Ok(())
}

pub async fn remove_subcommand(
    client: &TidepoolClient,
    owner: String,
    app: String,
) -> TidepoolCliResult<()> {
    let user = match owner.parse::<u64>() {
        Ok(user) => user,
        Err(_) => token::parse_owner_id(&owner)?,
    };

    client.remove(&SandboxRequest::new(user, app.as_str())).await?;
    println!("{} Removed {} of owner {}", &*CHECKMARK, app.literal(), user);
    Ok(())
}

pub async fn list_subcommand(
    client: &TidepoolClient,
    user: Option<u64>,
    app: Option<String>,
    port: Option<u16>,
) -> TidepoolCliResult<()> {
    let mut request = SandboxRequest::new(user.unwrap_or_default(), app.unwrap_or_default());
    request.port = port.unwrap_or_default();

    let infos = client.list(&request).await?;
    print!("{}", list_sandboxes(&infos));
    Ok(())
}

pub async fn purge_subcommand(client: &TidepoolClient) -> TidepoolCliResult<()> {
    let infos = client.purge().await?;
    if infos.is_empty() {
        println!("{} No expired sandboxes", &*CHECKMARK);
        return Ok(());
    }

    print!("{}", list_sandboxes(&infos));
    println!(
        "{} Purged {} expired sandboxes. Sandboxes that failed to be removed are retried on the next purge.",
        &*CHECKMARK,
        infos.len()
    );
    Ok(())
}

pub async fn server_subcommand(
    config: Option<PathBuf>,
    listen: Option<SocketAddr>,
) -> TidepoolCliResult<()> {
    let config = match Config::discover(config.as_deref()) {
        Ok(config) => config,
        Err(ServerError::ConfigNotFound { example }) => {
            eprintln!(
                "{} No configuration found. Defaults were written to {}; copy it to {} or use `{}` to generate one.",
                &*CROSSMARK,
                example.display().to_string().literal(),
                tidepool_utils::CONFIG_FILENAME.literal(),
                "tidepool defaultconfig".literal(),
            );
            return Err(ServerError::ConfigNotFound { example }.into());
        }
        Err(e) => return Err(e.into()),
    };

    let config = match listen {
        Some(addr) => config.with_listen_addr(addr),
        None => config,
    };

    let runtime = DockerRuntime::connect()?;
    runtime.ping().await?;
    tracing::info!("connected to the docker daemon");

    println!(
        "{} Control plane listening on {} ({} addressing)",
        &*CHECKMARK,
        console::style(config.get_listen_addr()).yellow(),
        config.get_addressing()
    );

    tidepool_server::run(config, Arc::new(runtime)).await?;
    Ok(())
}

pub fn defaultconfig_subcommand(path: PathBuf, stdout: bool) -> TidepoolCliResult<()> {
    let config = Config::default();
    if stdout {
        print!("{}", config.to_yaml()?);
        return Ok(());
    }

    if path.exists() {
        return Err(TidepoolCliError::InvalidArgument(format!(
            "{} already exists",
            path.display()
        )));
    }

    config.save(&path)?;
    println!(
        "{} Wrote the default configuration to {}",
        &*CHECKMARK,
        path.display().to_string().literal()
    );
    Ok(())
}
