//! NextGCore AMF daemon
//!
//! Loads the configuration, starts the NGAP listener and runs until
//! interrupted.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::Ordering;

use anyhow::{Context, Result};
use clap::Parser;
use ngc_amfd::{AmfApp, AmfConfig};

/// NextGCore AMF - Access and Mobility Management Function
#[derive(Parser, Debug)]
#[command(name = "ngc-amfd")]
#[command(author = "NextGCore")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "5G Core Access and Mobility Management Function")]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/nextgcore/amf.yaml")]
    config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// NGAP bind address, overrides the configuration (e.g., "0.0.0.0:38412")
    #[arg(long)]
    ngap_addr: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = match args.log_level.to_lowercase().as_str() {
        "trace" => log::LevelFilter::Trace,
        "debug" => log::LevelFilter::Debug,
        "info" => log::LevelFilter::Info,
        "warn" => log::LevelFilter::Warn,
        "error" => log::LevelFilter::Error,
        _ => log::LevelFilter::Info,
    };

    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp_millis()
        .init();

    log::info!("NextGCore AMF v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Configuration: {}", args.config);

    let config = if Path::new(&args.config).exists() {
        AmfConfig::load(&args.config).with_context(|| format!("loading {}", args.config))?
    } else {
        log::warn!("Could not find config file '{}'. Using defaults.", args.config);
        AmfConfig::default()
    };

    let ngap_addr: SocketAddr = match &args.ngap_addr {
        Some(addr) => addr
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid NGAP address '{}': {}", addr, e))?,
        None => config.ngap_addr()?,
    };

    let mut app = AmfApp::new(config)?;

    let running = app.running_flag();
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        running.store(false, Ordering::SeqCst);
    })?;

    let bound = app.start_ngap(ngap_addr)?;
    log::info!("NGAP listening on {}", bound);

    app.run_until_stopped().await;
    app.shutdown().await;

    log::info!("NextGCore AMF terminated");
    Ok(())
}
