// SPDX-License-Identifier: MIT

//! immapd — the image-map placement daemon.
//!
//! Standalone mode: runs a single instance against an in-memory object
//! store and a no-op peer-RPC adapter (spec: the durable backend and the
//! replication workers are both external collaborators this crate only
//! defines the boundary for). Useful for local development and for
//! exercising the engine end to end without a real cluster.

use std::sync::Arc;

use immap_adapters::{FakeReplicaAdapter, ReplicaAdapter};
use immap_core::{Config, InstanceId, SystemClock};
use immap_daemon::Runtime;
use immap_store::{InMemoryGateway, ObjectStoreGateway};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("immapd {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("Usage: immapd [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    setup_logging();

    let local_instance_id = match std::env::var("IMMAP_INSTANCE_ID") {
        Ok(id) if !id.is_empty() => InstanceId::new(id),
        _ => {
            eprintln!("error: IMMAP_INSTANCE_ID must be set to this instance's client id");
            std::process::exit(1);
        }
    };
    let config = config_from_env();

    info!(%local_instance_id, ?config, "starting immapd in standalone mode");

    let gateway: Arc<dyn ObjectStoreGateway> = Arc::new(InMemoryGateway::new());
    let replica: Arc<dyn ReplicaAdapter> = Arc::new(FakeReplicaAdapter::new());

    let runtime = Runtime::start(local_instance_id, config, gateway, replica, SystemClock).await?;

    info!("immapd ready");

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        _ = sigint.recv() => info!("received SIGINT, shutting down"),
    }

    runtime.shut_down().await;
    info!("immapd stopped");
    Ok(())
}

/// Reads `Config`'s fields from `IMMAP_*` environment variables,
/// falling back to each field's default on an absent or unparsable
/// value.
fn config_from_env() -> Config {
    let defaults = Config::default();
    Config {
        heartbeat_interval_secs: env_u64("IMMAP_HEARTBEAT_INTERVAL_SECS")
            .unwrap_or(defaults.heartbeat_interval_secs),
        max_missed_heartbeats: env_u64("IMMAP_MAX_MISSED_HEARTBEATS")
            .unwrap_or(defaults.max_missed_heartbeats),
        max_acquire_attempts_before_break: env_u64("IMMAP_MAX_ACQUIRE_ATTEMPTS_BEFORE_BREAK")
            .unwrap_or(defaults.max_acquire_attempts_before_break),
        policy_name: defaults.policy_name,
        list_page_size: env_u64("IMMAP_LIST_PAGE_SIZE")
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(defaults.list_page_size),
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let result = tracing_subscriber::registry().with(filter).with(fmt::layer()).try_init();
    if let Err(err) = result {
        error!(%err, "tracing subscriber already initialized");
    }
}

fn print_help() {
    println!("immapd {}", env!("CARGO_PKG_VERSION"));
    println!("Image-map placement daemon — standalone mode");
    println!();
    println!("USAGE:");
    println!("    immapd");
    println!();
    println!("Reads IMMAP_INSTANCE_ID (required) and the IMMAP_* config");
    println!("overrides from the environment; see immap_core::Config.");
    println!();
    println!("OPTIONS:");
    println!("    -h, --help       Print help information");
    println!("    -V, --version    Print version information");
}
