//! Qenus Arbitrage Intelligence - Main entry point
//!
//! Scans the configured exchanges, then follows swap events and emits
//! opportunity records until interrupted.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::{Arg, Command};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::io::AsyncWriteExt;
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use qenus_arb_intelligence::{
    ArbConfig, BookSink, ChannelSink, LogSink, OpportunityBook, OpportunityRecord, Runtime, SinkSet, VERSION,
};
use qenus_pool_dataplane::prices::StaticPriceSource;
use qenus_pool_dataplane::providers::EthersConnector;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let matches = Command::new("arb-intelligence")
        .version(VERSION)
        .about("Qenus Arbitrage Intelligence - event-driven opportunity detection")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path (layered over config/default)"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level (trace, debug, info, warn, error)")
                .default_value("info"),
        )
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .help("Log opportunities instead of handing them downstream")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("scan-only")
                .long("scan-only")
                .help("Run the bootstrap scan and one full pass, then exit")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    let log_level = matches
        .get_one::<String>("log-level")
        .map(String::as_str)
        .unwrap_or("info");
    init_logging(log_level);

    info!(version = VERSION, "Starting Qenus Arbitrage Intelligence");

    let config = ArbConfig::load(matches.get_one::<String>("config").map(String::as_str))
        .context("loading configuration")?;
    info!(
        chain = %config.dataplane.chain,
        read_endpoints = config.dataplane.endpoints.read.len(),
        write_endpoints = config.dataplane.endpoints.write.len(),
        "Configuration loaded successfully"
    );

    if config.monitoring.prometheus_enabled {
        let bind: SocketAddr = config
            .monitoring
            .prometheus_bind
            .parse()
            .context("parsing prometheus_bind")?;
        PrometheusBuilder::new()
            .with_http_listener(bind)
            .install()
            .context("installing Prometheus exporter")?;
        info!(%bind, "Prometheus exporter listening");
    }

    let dry_run = matches.get_flag("dry-run");
    let book = Arc::new(OpportunityBook::new());
    let mut sinks = SinkSet::new().with(BookSink::new(book.clone()));
    if dry_run {
        warn!("Running in dry-run mode - opportunities are logged only");
        sinks = sinks.with(LogSink);
    } else {
        let (channel, records) = ChannelSink::channel(config.dataplane.events.channel_capacity);
        tokio::spawn(write_records(records));
        sinks = sinks.with(channel);
    }

    let connector = Arc::new(EthersConnector::new(config.dataplane.endpoints.request_timeout()));
    let prices = Arc::new(StaticPriceSource::from_tokens(&config.dataplane.tokens));
    let runtime = Runtime::new(config, connector, prices, sinks, book);

    if matches.get_flag("scan-only") {
        let boot = runtime.bootstrap().await?;
        info!(
            pools = boot.registry.read().len(),
            inserted = boot.report.pools_inserted,
            gated_out = boot.report.gated_out,
            opportunities = boot.initial.len(),
            "Scan-only run complete"
        );
        return Ok(());
    }

    // Set up graceful shutdown
    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received, stopping..."),
            Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
        }
        shutdown.cancel();
    });

    match runtime.run(cancel).await {
        Ok(()) => info!("Qenus Arbitrage Intelligence stopped"),
        Err(e) => {
            error!(error = %e, "Runtime stopped with error");
            return Err(e.into());
        }
    }

    Ok(())
}

/// Install the tracing subscriber; `RUST_LOG` wins over `--log-level`
fn init_logging(log_level: &str) {
    let level: tracing::Level = log_level.parse().unwrap_or_else(|_| {
        eprintln!("Invalid log level: {}. Using 'info'", log_level);
        tracing::Level::INFO
    });

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("qenus_arb_intelligence={level},qenus_pool_dataplane={level}").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Downstream hand-off: one JSON record per line on stdout
async fn write_records(mut records: mpsc::Receiver<OpportunityRecord>) {
    let mut stdout = tokio::io::stdout();

    while let Some(record) = records.recv().await {
        let mut line = match serde_json::to_vec(&record) {
            Ok(line) => line,
            Err(e) => {
                warn!(id = %record.id, error = %e, "Failed to serialize opportunity");
                continue;
            }
        };
        line.push(b'\n');

        if let Err(e) = stdout.write_all(&line).await {
            error!(error = %e, "Opportunity stream closed");
            break;
        }
        let _ = stdout.flush().await;
    }
}
