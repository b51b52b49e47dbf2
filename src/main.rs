mod classify;
mod config;
mod control;
mod gateway;
mod lifecycle;
mod net;
mod request;
mod response;
mod store;
mod strategy;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::io::Write;
use std::path::PathBuf;
use url::Url;

use crate::control::ControlCommand;
use crate::gateway::Gateway;
use crate::net::ReqwestClient;
use crate::request::Request;
use crate::store::SqliteBackend;

#[derive(Parser, Debug)]
#[command(name = "offramp")]
#[command(about = "An offline-first request interception and caching gateway")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/offramp/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Run one request through the gateway and print the outcome
  Fetch {
    url: String,
    /// Treat the request as a top-level navigation
    #[arg(long)]
    navigate: bool,
    /// Print the response body to stdout
    #[arg(long)]
    body: bool,
  },
  /// Precache the application shell for the current version
  Install,
  /// Activate the current version, sweeping stale-version caches
  Activate,
  /// Send a SKIP_WAITING control command
  SkipWaiting,
  /// Send a CLEAR_CACHES control command
  ClearCaches,
  /// Show the lifecycle phase and per-store entry counts
  Status,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;
  tracing_subscriber::fmt()
    .with_env_filter(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("offramp=info")),
    )
    .with_writer(std::io::stderr)
    .init();

  let args = Args::parse();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;

  let backend = match &config.db_path {
    Some(path) => SqliteBackend::open(path)?,
    None => SqliteBackend::open_default()?,
  };
  let net = ReqwestClient::new()?;
  let gateway = Gateway::new(&config, backend, net)?;

  match args.command {
    Command::Fetch {
      url,
      navigate,
      body,
    } => {
      gateway.install().await?;
      gateway.activate().await?;

      let url = Url::parse(&url)?;
      let request = if navigate {
        Request::navigation(url)
      } else {
        Request::get(url)
      };
      let response = gateway.handle(request).await;

      eprintln!(
        "HTTP {} ({:?}, {} bytes)",
        response.status,
        response.source,
        response.body.len()
      );
      if body {
        std::io::stdout().write_all(&response.body)?;
      }
    }
    Command::Install => gateway.install().await?,
    Command::Activate => {
      gateway.install().await?;
      gateway.activate().await?;
    }
    Command::SkipWaiting => {
      gateway.install().await?;
      gateway.control().send(ControlCommand::SkipWaiting);
    }
    Command::ClearCaches => gateway.control().send(ControlCommand::ClearCaches),
    Command::Status => {
      println!("phase: {:?}", gateway.phase());
      for (name, count) in gateway.namespaces().store_counts()? {
        println!("{:<24} {} entries", name, count);
      }
    }
  }

  gateway.shutdown().await
}
