mod handlers;

use std::time::Duration;

use clap::{CommandFactory, Parser};
use tidepool_cli::{AnsiStyles, TidepoolArgs, TidepoolCliResult, TidepoolClient, TidepoolSubcommand};

//--------------------------------------------------------------------------------------------------
// Functions: main
//--------------------------------------------------------------------------------------------------

#[tokio::main]
async fn main() -> TidepoolCliResult<()> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    let args = TidepoolArgs::parse();
    handlers::init_tracing(args.log_level);

    if args.version {
        println!("{}", format!("v{}", env!("CARGO_PKG_VERSION")).literal());
        return Ok(());
    }

    let client = || TidepoolClient::new(&args.server, Duration::from_secs(args.timeout));

    match args.subcommand {
        Some(TidepoolSubcommand::Create {
            token,
            app,
            image,
            port,
            lifetime,
            hostname,
        }) => {
            handlers::create_subcommand(&client()?, token, app, image, port, lifetime, hostname)
                .await?;
        }
        Some(TidepoolSubcommand::Remove { owner, app }) => {
            handlers::remove_subcommand(&client()?, owner, app).await?;
        }
        Some(TidepoolSubcommand::List { user, app, port }) => {
            handlers::list_subcommand(&client()?, user, app, port).await?;
        }
        Some(TidepoolSubcommand::Purge) => {
            handlers::purge_subcommand(&client()?).await?;
        }
        Some(TidepoolSubcommand::Server { config, listen }) => {
            handlers::server_subcommand(config, listen).await?;
        }
        Some(TidepoolSubcommand::Defaultconfig { path, stdout }) => {
            handlers::defaultconfig_subcommand(path, stdout)?;
        }
        None => {
            TidepoolArgs::command().print_help()?;
        }
    }

    Ok(())
}
