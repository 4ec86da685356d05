use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

use dmproxy::args::Args;
use dmproxy::device::AccessMode;
use dmproxy::{config, logging, server, ProxyEngine, StackRegistry, TARGET_NAME};

fn main() -> Result<()> {
    logging::init_dual_logging();

    let args = Args::parse();
    let worker_threads = args.worker_threads();

    if worker_threads == 1 {
        info!("starting dmproxy with single-threaded runtime");
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        rt.block_on(run(args))
    } else {
        info!("starting dmproxy with {} worker threads", worker_threads);
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(worker_threads)
            .enable_all()
            .build()?;
        rt.block_on(run(args))
    }
}

async fn run(args: Args) -> Result<()> {
    let config = if std::path::Path::new(&args.config).exists() {
        config::load_config(&args.config)?
    } else {
        warn!(
            "Config file '{}' not found, creating default config",
            args.config
        );
        let default_config = config::create_default_config();
        let config_toml = toml::to_string_pretty(&default_config)?;
        std::fs::write(&args.config, config_toml)?;
        default_config
    };

    let resolver = Arc::new(config::resolver_from(&config));
    let stack = StackRegistry::new();
    let engine = ProxyEngine::new(&stack, resolver)?;

    // If any proxy fails to come up the engine unwinds on the error path,
    // leaving no published node and no held device behind.
    let mut devices = Vec::with_capacity(config.devices.len());
    for device in &config.devices {
        let mode = if device.read_only {
            AccessMode::ReadOnly
        } else {
            AccessMode::ReadWrite
        };
        let vdev = stack.create_device(TARGET_NAME, &device.name, &[device.name.clone()], mode)?;
        devices.push(vdev);
    }
    info!(devices = devices.len(), "all proxies active");

    let listener = TcpListener::bind(&args.listen).await?;

    tokio::select! {
        result = server::serve(listener, engine.namespace()) => result?,
        _ = signal::ctrl_c() => info!("interrupt received, shutting down"),
    }

    // Proxies go first so every per-device node is retracted before the
    // aggregate node and the namespace root.
    drop(devices);
    engine.shutdown();
    Ok(())
}
