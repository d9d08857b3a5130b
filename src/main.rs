// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/trailsense

//! TrailSense - field simulation of the motion-fusion core
//!
//! Drives the detection coordinator with a simulated base detector and
//! simulated field conditions, one cycle per tick.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use trailsense::detection::DetectionMethod;
use trailsense::simulation::{EnvironmentSimulator, SimulatedDetector};
use trailsense::{build_info, Config, DetectionCoordinator, Frame, NAME, VERSION};

/// TrailSense - adaptive motion fusion for wildlife cameras
#[derive(Parser, Debug)]
#[command(name = "trailsense")]
#[command(author = "TrailSense Project")]
#[command(version = VERSION)]
#[command(about = "Simulated field run of the wildlife-camera motion-fusion core")]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of sensing cycles (0 runs until Ctrl+C)
    #[arg(long, default_value = "120")]
    cycles: u64,

    /// Milliseconds between sensing cycles
    #[arg(long, default_value = "1000")]
    interval_ms: u64,

    /// Override the configured detection method
    #[arg(long)]
    method: Option<DetectionMethod>,

    /// Seed for reproducible simulation runs
    #[arg(long)]
    seed: Option<u64>,

    /// Starting battery voltage
    #[arg(long, default_value = "3.9")]
    battery: f32,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable trace-level logging
    #[arg(long)]
    trace: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.trace {
        Level::TRACE
    } else if args.debug {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(args.debug)
        .with_line_number(args.debug)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let build = build_info();
    info!("{} v{} ({}/{})", NAME, VERSION, build.os, build.target);

    // Load or create configuration
    let config_path = args.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load_or_create(&config_path)?;
    if let Some(method) = args.method {
        config.coordinator.method = method;
    }
    info!("Configuration loaded from {:?}", config_path);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(args, config))
}

async fn run(args: Args, config: Config) -> Result<()> {
    let detector = SimulatedDetector::new(
        args.seed,
        config.analyzer.frame_width,
        config.analyzer.frame_height,
    );
    let mut coordinator = DetectionCoordinator::from_config(&config, Box::new(detector))?;
    let memory = Arc::clone(coordinator.memory());

    coordinator.register_callback(|result| {
        if result.should_alert {
            warn!("ALERT {}", result.description);
        }
    });

    // Environment task
    let mut environment = EnvironmentSimulator::new(args.seed, args.battery);
    let (env_tx, mut env_rx) = watch::channel(environment.sample(Utc::now()));
    let interval = Duration::from_millis(args.interval_ms.max(1));
    let env_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if env_tx.send(environment.sample(Utc::now())).is_err() {
                break;
            }
        }
    });

    // Maintenance task
    let sweep_every = Duration::from_secs(config.memory.cleanup_interval_secs.max(1));
    let maintenance_memory = Arc::clone(&memory);
    let maintenance_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_every);
        loop {
            ticker.tick().await;
            let reclaimed = maintenance_memory.maybe_collect_at(Utc::now());
            if reclaimed > 0 {
                info!("Maintenance reclaimed {} stale blocks", reclaimed);
            }
        }
    });

    // Subscriber task
    let mut motion_rx = coordinator.subscribe();
    let subscriber_task = tokio::spawn(async move {
        loop {
            match motion_rx.recv().await {
                Ok(result) => info!(
                    "Motion {:.2} via {} capture={} transmit={}",
                    result.fusion_confidence,
                    result.method_used,
                    result.should_capture,
                    result.should_transmit
                ),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Motion subscriber lagged, {} events dropped", n)
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    info!("Sensing every {:?}; press Ctrl+C to stop", interval);
    let mut ticker = tokio::time::interval(interval);
    let mut sequence = 0u64;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }

        let conditions = env_rx.borrow_and_update().clone();
        coordinator.update_environment(conditions.clone());

        let now = Utc::now();
        let frame = Frame {
            sequence,
            width: config.analyzer.frame_width,
            height: config.analyzer.frame_height,
            captured_at: now,
            data: Vec::new(),
        };
        let result = coordinator.detect_at(now, Some(&frame), &conditions);
        debug!(
            "Cycle {}: {} [{:?}, skip={}]",
            sequence, result.description, result.processing.level, result.processing.skip_frame
        );

        sequence += 1;
        if args.cycles > 0 && sequence >= args.cycles {
            break;
        }
    }

    env_task.abort();
    maintenance_task.abort();

    info!("Final status:\n{}", coordinator.status_json());
    info!(
        "Power savings estimate: {:.0}%",
        coordinator.adaptive().power_savings() * 100.0
    );
    drop(coordinator);
    let _ = subscriber_task.await;

    info!("{} shutdown complete", NAME);
    Ok(())
}
