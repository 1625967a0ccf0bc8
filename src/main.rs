// Relay latency reconciler - Main Entry Point
// Copyright (C) 2024 relay-latency contributors
// Licensed under AGPL v3

use clap::Parser;
use relay_latency::config::Config;
use relay_latency::coordinator::Coordinator;
use relay_latency::intake::{read_lines, MqttIntake, TcpIntake};
use relay_latency::output::{write_synthetic_csv, CsvOutput, JsonOutput};
use relay_latency::synthetic::synthesize_samples;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command-line arguments
    let config = Config::parse();

    // Initialize logging
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {:#}", e);
        return Err(e.into());
    }

    // Synthetic mode never touches the reconciliation path
    if let Some(n) = config.synthetic {
        warn!("Writing {} SYNTHETIC samples (seed {}); these are not measurements", n, config.seed);
        let samples = synthesize_samples(n, config.seed);
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        write_synthetic_csv(&mut out, &samples)?;
        return Ok(());
    }

    info!("Starting relay latency reconciler");

    let coordinator = Arc::new(Coordinator::new(
        config.calibration_window,
        config.limits(),
        config.summary_every,
    ));

    // 1. Setup Outputs
    for filename in &config.write_csv {
        info!("Writing CSV results to {}", filename);
        match CsvOutput::create(filename) {
            Ok(csv_out) => coordinator.add_output(Box::new(csv_out)).await,
            Err(e) => error!("Failed to open CSV output file {}: {}", filename, e),
        }
    }
    if config.json {
        coordinator.add_output(Box::new(JsonOutput::stdout())).await;
    }

    // 2. Setup Intake
    // Capacity 100 lines
    let (tx, rx) = mpsc::channel(100);

    let coordinator_clone = coordinator.clone();
    let runner = tokio::spawn(async move {
        coordinator_clone.run(rx).await;
    });

    let networked = config.mqtt_broker.is_some() || !config.listen.is_empty();
    if !networked {
        let stamped = config.stamped;
        let result = match &config.input {
            Some(path) => {
                info!("Reading telemetry from {}", path);
                let file = tokio::fs::File::open(path).await?;
                read_lines(file, tx, stamped).await
            }
            None => {
                info!("Reading telemetry from stdin");
                read_lines(tokio::io::stdin(), tx, stamped).await
            }
        };
        match result {
            Ok(n) => info!("Input exhausted after {} lines", n),
            Err(e) => error!("Input read error: {}", e),
        }
        runner.await?;
        return Ok(());
    }

    let mut servers: Vec<TcpIntake> = Vec::new();
    for listen_addr in &config.listen {
        // Already validated
        let addr: std::net::SocketAddr = match listen_addr.parse() {
            Ok(addr) => addr,
            Err(e) => {
                error!("Invalid listen address '{}': {}", listen_addr, e);
                continue;
            }
        };
        match TcpIntake::start(addr, tx.clone()).await {
            Ok(server) => servers.push(server),
            Err(e) => error!("Failed to start TCP intake on {}: {}", addr, e),
        }
    }

    let mqtt = match &config.mqtt_broker {
        Some(url) => match MqttIntake::start(url, &config.client_id, &config.mqtt_topic, tx.clone()).await {
            Ok(intake) => Some(intake),
            Err(e) => {
                error!("Failed to start MQTT intake: {:#}", e);
                None
            }
        },
        None => None,
    };
    drop(tx);

    if servers.is_empty() && mqtt.is_none() {
        return Err("no intake could be started".into());
    }

    info!("Reconciler ready");

    // Wait for shutdown signal (Ctrl+C)
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received shutdown signal (Ctrl+C)");
        }
        Err(err) => {
            error!("Unable to listen for shutdown signal: {}", err);
            return Err(err.into());
        }
    }

    // Graceful shutdown
    info!("Shutting down...");
    for mut server in servers {
        server.shutdown().await;
    }
    if let Some(mqtt) = mqtt {
        mqtt.shutdown().await;
    }
    // Open TCP connections may still hold senders, so do not wait for the runner
    runner.abort();
    coordinator.flush().await;

    info!(
        "Stopped after {} samples ({} unmatched lines). {}",
        coordinator.sample_count(),
        coordinator.miss_count(),
        coordinator.snapshot().status()
    );

    Ok(())
}

/// Initialize logging subsystem
///
/// Logs go to stderr so CSV/JSON on stdout stays clean.
fn init_logging(verbose: bool) {
    use tracing_subscriber::fmt::format::FmtSpan;

    let subscriber = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true)
        .with_span_events(if verbose {
            FmtSpan::ENTER | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        });

    if verbose {
        subscriber
            .with_max_level(tracing::Level::DEBUG)
            .init();
        info!("Verbose logging enabled (DEBUG level)");
    } else {
        subscriber
            .with_max_level(tracing::Level::INFO)
            .init();
    }
}
