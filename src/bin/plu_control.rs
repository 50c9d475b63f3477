// src/bin/plu_control.rs
//! PLU control center daemon.
//!
//! Polls the configured address range for production line units, keeps the
//! registry and topology current, and serves them over the status API.
//!
//! ```bash
//! plu_control --config control.json
//! plu_control --ip-range 192.168.22.0-20 --delay 2 --roles roles.db
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use plu_control::{server, ControlCenter, ControlConfig, ControlError};

#[derive(Parser, Debug)]
#[command(name = "plu_control")]
#[command(author, version, about = "Production line unit control center", long_about = None)]
struct Args {
    /// Configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address range to poll, e.g. 192.168.22.0-20
    #[arg(long)]
    ip_range: Option<String>,

    /// Seconds between discovery cycles
    #[arg(long)]
    delay: Option<u64>,

    /// Role catalog file
    #[arg(long)]
    roles: Option<PathBuf>,

    /// Status API bind address
    #[arg(long)]
    listen: Option<SocketAddr>,
}

fn build_config(args: Args) -> anyhow::Result<ControlConfig> {
    let mut config = match &args.config {
        Some(path) => ControlConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ControlConfig::default(),
    };

    if let Some(ip_range) = args.ip_range {
        config.ip_range = ip_range;
    }
    if let Some(delay) = args.delay {
        config.delay_secs = delay;
    }
    if let Some(roles) = args.roles {
        config.role_store = roles;
    }
    if let Some(listen) = args.listen {
        config.status_addr = listen;
    }
    config.validate()?;
    Ok(config)
}

async fn run(config: ControlConfig) -> anyhow::Result<()> {
    let center = Arc::new(ControlCenter::from_config(config)?);
    let status_addr = center.config().status_addr;

    log::info!(
        "Polling {} every {}s ({} roles loaded)",
        center.config().ip_range,
        center.config().delay_secs,
        center.roles().read().await.len()
    );

    let (_, status_server) = server::launch(Arc::clone(&center), status_addr, async {
        let _ = tokio::signal::ctrl_c().await;
        log::info!("Shutdown signal received");
    })
    .await
    .context("starting status API")?;

    status_server.await;
    center.shutdown().await;
    log::info!("Control center stopped");
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match build_config(Args::parse()) {
        Ok(config) => config,
        Err(e) => {
            log::error!("Invalid configuration: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if let Some(ControlError::Roles(_)) = e.downcast_ref::<ControlError>() {
                log::error!("Cannot start without a role catalog: {:#}", e);
            } else {
                log::error!("{:#}", e);
            }
            ExitCode::FAILURE
        }
    }
}
