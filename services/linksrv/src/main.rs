//! Link service entry point

use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use linksrv::{bootstrap, LinkConfig, Result};

#[derive(Parser)]
#[command(
    name = "linksrv",
    version = env!("CARGO_PKG_VERSION"),
    about = "DriveLink link service: host packet fabric and VFD bus master"
)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/linksrv.yaml")]
    config: String,

    /// Override the configured log level
    #[arg(long)]
    log_level: Option<String>,
}

fn init_tracing(config: &LinkConfig, override_level: Option<&str>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let level = override_level
        .unwrap_or(&config.service.logging.level)
        .to_string();
    let filter = || EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("info"));

    let console = fmt::layer().compact().with_filter(filter());

    if let Some(directory) = &config.service.logging.directory {
        let appender = tracing_appender::rolling::daily(
            directory,
            format!("{}.log", config.service.name),
        );
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let file = fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_filter(filter());
        tracing_subscriber::registry().with(console).with(file).init();
        Some(guard)
    } else {
        tracing_subscriber::registry().with(console).init();
        None
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = LinkConfig::load(&args.config)?;
    let _log_guard = init_tracing(&config, args.log_level.as_deref());

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %args.config,
        "starting link service"
    );
    info!(
        host = %config.host_link.device,
        bus = %config.modbus.device,
        simulate = config.modbus.simulate,
        nodes = config.vfd.nodes,
        "link configuration"
    );

    let service = bootstrap::start(&config)?;

    match tokio::signal::ctrl_c().await {
        Ok(_) => info!("received shutdown signal"),
        Err(e) => tracing::error!(error = %e, "failed to listen for shutdown signal"),
    }

    service.shutdown().await;
    Ok(())
}
