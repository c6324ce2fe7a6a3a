use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{LevelFilter, debug, info};
use tokio::net::TcpListener;

use quill::api::{AppState, create_router};
use quill::config::ServerConfig;
use quill::db::Database;
use quill::inference::HttpInference;

fn main() {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "{err:?}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.common);

    let config = ServerConfig::load(cli.common.config.as_deref())?;
    debug!("resolved configuration: {config:#?}");

    match cli.command {
        Command::Serve(cmd) => async_serve(config, cmd),
        Command::Config { command } => handle_config(&config, command),
    }
}

#[tokio::main]
async fn async_serve(config: ServerConfig, cmd: ServeCommand) -> Result<()> {
    handle_serve(config, cmd).await
}

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Quill - streaming conversational relay server.",
    propagate_version = true
)]
struct Cli {
    #[command(flatten)]
    common: CommonOpts,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Args)]
struct CommonOpts {
    /// Override the config file path
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Reduce output to only errors
    #[arg(short, long, action = clap::ArgAction::SetTrue, global = true)]
    quiet: bool,
    /// Increase logging verbosity (stackable)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Enable debug logging (equivalent to -vv)
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the HTTP/WebSocket server
    Serve(ServeCommand),
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Debug, Args)]
struct ServeCommand {
    /// Override the listen address from configuration
    #[arg(long, value_name = "ADDR", env = "QUILL_LISTEN")]
    listen: Option<String>,
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Print the resolved configuration as TOML
    Show,
}

fn init_logging(opts: &CommonOpts) {
    let level = if opts.quiet {
        LevelFilter::Error
    } else if opts.verbose >= 2 {
        LevelFilter::Trace
    } else if opts.debug || opts.verbose == 1 {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level.to_string()))
        .init();
}

async fn handle_serve(mut config: ServerConfig, cmd: ServeCommand) -> Result<()> {
    if let Some(listen) = cmd.listen {
        config.listen = listen;
    }

    let db = Database::open(&config.database)
        .await
        .context("opening conversation database")?;
    let backend = Arc::new(HttpInference::new(config.inference.clone()));
    let state = AppState::new(db, backend);
    let router = create_router(state);

    let listener = TcpListener::bind(&config.listen)
        .await
        .with_context(|| format!("binding {}", config.listen))?;
    info!("quill listening on {}", config.listen);

    axum::serve(listener, router)
        .await
        .context("serving HTTP")?;

    Ok(())
}

fn handle_config(config: &ServerConfig, command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Show => {
            let rendered = toml::to_string_pretty(config).context("rendering configuration")?;
            print!("{rendered}");
            Ok(())
        }
    }
}
