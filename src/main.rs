use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tessera_remote::RemoteConfig;
use tessera_runtime::{ExtensionRuntime, InvocationRunner, RunnerConfig, RuntimeConfig};
use tessera_server::{AppState, router};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod operators;

/// Tessera - an extension node serving operators to a graph dispatcher
#[derive(Parser)]
#[command(name = "tessera")]
#[command(version, about, long_about = None)]
struct Cli {
  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Serve the registered operators over HTTP
  Serve(ServeArgs),

  /// Print operator metadata as JSON
  Operators,
}

#[derive(clap::Args)]
struct ServeArgs {
  #[arg(long, env = "TESSERA_HOST", default_value = "0.0.0.0")]
  host: String,

  /// Listen port; `MODE=PROD` forces port 80
  #[arg(long, env = "TESSERA_PORT", default_value_t = 4823)]
  port: u16,

  /// Dispatcher for requests that do not name one
  #[arg(long, env = "DISPATCHER_URL")]
  dispatcher_url: Option<String>,

  /// Maximum concurrently executing invocations
  #[arg(long, default_value_t = 16)]
  workers: usize,

  /// Accepted invocations waiting for a worker
  #[arg(long, default_value_t = 1024)]
  queue_size: usize,

  /// Per-attempt budget for remote subgraph calls
  #[arg(long, default_value_t = 600)]
  remote_timeout_secs: u64,
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  match cli.command {
    Some(Commands::Serve(args)) => {
      init_tracing();
      let rt = tokio::runtime::Runtime::new()?;
      rt.block_on(serve(args))?;
    }
    Some(Commands::Operators) => {
      let registry = operators::registry().context("failed to register operators")?;
      println!("{}", serde_json::to_string_pretty(&registry.schemas())?);
    }
    None => {
      println!("tessera - use --help to see available commands");
    }
  }

  Ok(())
}

fn init_tracing() {
  tracing_subscriber::registry()
    .with(fmt::layer())
    .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();
}

/// A bare `host:port` dispatcher address is taken as plain http.
fn normalize_dispatcher_url(url: &str) -> String {
  let url = url.trim().trim_end_matches('/');
  if url.contains("://") {
    url.to_string()
  } else {
    format!("http://{}", url)
  }
}

fn listen_port(configured: u16) -> u16 {
  if std::env::var("MODE").as_deref() == Ok("PROD") {
    80
  } else {
    configured
  }
}

async fn serve(args: ServeArgs) -> Result<()> {
  let registry = operators::registry().context("failed to register operators")?;
  info!(operators = registry.len(), "operators registered");

  let config = RuntimeConfig {
    dispatcher_url: args
      .dispatcher_url
      .as_deref()
      .filter(|url| !url.trim().is_empty())
      .map(normalize_dispatcher_url),
    remote: RemoteConfig {
      timeout: Duration::from_secs(args.remote_timeout_secs),
      ..RemoteConfig::default()
    },
  };
  let runtime = Arc::new(ExtensionRuntime::with_http(registry, config));

  let runner = InvocationRunner::new(
    runtime.clone(),
    RunnerConfig {
      workers: args.workers,
      queue_size: args.queue_size,
    },
  );
  let app = router(AppState::new(runtime, runner.sender()));

  let cancel = CancellationToken::new();
  let runner_handle = tokio::spawn(runner.start(cancel.clone()));

  let addr: SocketAddr = format!("{}:{}", args.host, listen_port(args.port))
    .parse()
    .context("invalid listen address")?;
  let listener = tokio::net::TcpListener::bind(addr)
    .await
    .with_context(|| format!("failed to bind {}", addr))?;
  info!(addr = %addr, "listening");

  let shutdown = cancel.clone();
  axum::serve(listener, app)
    .with_graceful_shutdown(async move {
      let _ = tokio::signal::ctrl_c().await;
      info!("shutting down");
      shutdown.cancel();
    })
    .await
    .context("server failed")?;

  cancel.cancel();
  runner_handle.await.context("invocation runner panicked")?;
  Ok(())
}
