// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Headless playback host.
//
// Usage:
//   playback_host [--config host.toml] [--prefix NAME] [--client-lock NAME] [-v] [--json]
//
// Exits immediately (status 0) if another host already runs under the same
// prefix. Stops when the client releases its liveness lock or on Ctrl-C.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use playback_ipc::config::{ConfigError, ConfigLoader, HostConfig, LogLevel};
use playback_ipc::engine::{PlaybackEngine, SessionEngine};
use playback_ipc::{InstanceAcquire, Server, ServerOptions, SingleInstanceGuard, Transport};

#[derive(Parser, Debug)]
#[command(name = "playback_host")]
#[command(version)]
#[command(about = "Audio playback host serving a UI client over shared memory")]
struct Args {
    /// TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Prefix for the region, signal and instance lock names
    #[arg(long)]
    prefix: Option<String>,

    /// Name of the lock the client holds while alive
    #[arg(long, value_name = "NAME")]
    client_lock: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = run() {
        error!("host failed: {}", e);
        std::process::exit(1);
    }
    Ok(())
}

fn load_config(args: &Args) -> Result<HostConfig, ConfigError> {
    let mut config = match &args.config {
        Some(path) => HostConfig::load(path)?,
        None => HostConfig::default(),
    };
    if let Some(prefix) = &args.prefix {
        config.names.prefix = prefix.clone();
    }
    if let Some(lock) = &args.client_lock {
        config.names.client_lock = lock.clone();
    }
    config.validate()?;
    Ok(config)
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = load_config(&args);
    let level = config.as_ref().map_or(LogLevel::Info, |c| c.log_level);
    setup_tracing(&args, level);
    let config = config?;

    info!("playback host v{} starting", env!("CARGO_PKG_VERSION"));
    let names = config.resource_names();

    let guard = match SingleInstanceGuard::acquire(&names.instance_lock)? {
        InstanceAcquire::Owned(guard) => guard,
        InstanceAcquire::AlreadyHeld => {
            info!(lock = %names.instance_lock, "another host is already running, exiting");
            return Ok(());
        }
    };

    let transport = Transport::open(&names)?;
    let options = ServerOptions {
        listener: config.listener_config(),
        liveness: Some(config.liveness_config()),
    };
    let mut server = Server::start(guard, transport, options, |events| {
        Ok(Arc::new(SessionEngine::new(events)?) as Arc<dyn PlaybackEngine>)
    })?;

    let token = server.token();
    ctrlc::set_handler(move || {
        info!("received shutdown signal");
        token.cancel();
    })?;

    server.wait();
    server.shutdown();
    Ok(())
}

fn setup_tracing(args: &Args, configured: LogLevel) {
    let filter = if args.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::default().add_directive(configured.as_level().into()))
    };

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
