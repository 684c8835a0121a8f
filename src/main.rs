//! taskbus - coordination bus entry point
//!
//! Runs the bus-side services: the message store, the health/metrics
//! endpoints, a coordinator consumer, the monitor loop (blocker
//! detection, risk prediction, health scoring, knowledge indexing,
//! impact reporting), the recovery engine, and the retention sweep.
//! Producer and consumer agents embed the library and speak through the
//! store contract.

use async_trait::async_trait;
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info, warn};

use taskbus::classify::Classifier;
use taskbus::config::BusConfig;
use taskbus::consumer::{HandlerFailure, MessageHandler, PollingConsumer};
use taskbus::error::BusResult;
use taskbus::impact::ImpactQuantifier;
use taskbus::knowledge::{AccessPolicy, KnowledgeIndexer};
use taskbus::monitor::{BlockerDetector, HealthScorer, RiskPredictor};
use taskbus::observability::{init_default_logging, BusMetrics, HealthServer};
use taskbus::protocol::{Message, MessageType};
use taskbus::recovery::{RecoveryEngine, RecoveryStatus, StoreStepExecutor};
use taskbus::store::{MemoryStore, MessageStore};

/// Seconds between retention sweeps
const SWEEP_INTERVAL_SECS: u64 = 3600;

/// Agent task-delegation and coordination bus
#[derive(Parser)]
#[command(name = "taskbus")]
#[command(about = "Durable task-delegation and coordination bus for named agents")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bus services
    Run,
    /// Validate configuration
    Config {
        /// Show the resolved configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();
    info!("Starting taskbus v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run => run_bus(config).await,
        Commands::Config { show } => handle_config_command(config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Shutdown complete");
}

fn load_configuration(
    config_path: &Option<PathBuf>,
) -> Result<BusConfig, Box<dyn std::error::Error>> {
    match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Ok(BusConfig::load_from_file(path)?)
        }
        None => {
            let default_paths = ["taskbus.toml", "config/taskbus.toml"];
            for path_str in default_paths {
                let path = PathBuf::from(path_str);
                if path.exists() {
                    info!("Loading configuration from: {}", path.display());
                    return Ok(BusConfig::load_from_file(&path)?);
                }
            }
            error!("No configuration file found. Provide one with -c/--config or create taskbus.toml");
            process::exit(1);
        }
    }
}

fn handle_config_command(
    config: BusConfig,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Configuration valid: {} agents registered", config.agents.len());
    if show {
        println!("{}", toml::to_string_pretty(&config)?);
    }
    Ok(())
}

/// Coordinator inbox handler: surfaces escalations and alerts to the log
struct CoordinatorInbox;

#[async_trait]
impl MessageHandler for CoordinatorInbox {
    async fn handle(&self, message: &Message) -> BusResult<()> {
        info!(
            id = %message.id,
            from = %message.sender,
            r#type = %message.message_type,
            payload = %message.payload,
            "coordinator inbox"
        );
        Ok(())
    }
}

async fn run_bus(config: BusConfig) -> Result<(), Box<dyn std::error::Error>> {
    let directory = config.directory();
    let coordinator = directory.coordinator().to_string();
    info!(
        agents = directory.len(),
        coordinator = %coordinator,
        "bus starting"
    );

    let store = Arc::new(MemoryStore::new(directory.clone()));
    let metrics = Arc::new(BusMetrics::new());
    let classifier = Classifier::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Health and metrics endpoints
    let health_server = Arc::new(HealthServer::new(
        config.bus.health_port,
        store.clone(),
        metrics.clone(),
    ));
    let health_task = tokio::spawn(async move {
        if let Err(e) = health_server.start().await {
            error!("Health server error: {}", e);
        }
    });

    // Recovery engine, fed by consumer handler failures and monitor scans
    let executor = Arc::new(StoreStepExecutor::new(
        store.clone(),
        coordinator.clone(),
        coordinator.clone(),
    ));
    let engine = Arc::new(RecoveryEngine::new(
        store.clone(),
        executor,
        coordinator.clone(),
        coordinator.clone(),
        shutdown_rx.clone(),
    ));

    let (failure_tx, mut failure_rx) = mpsc::unbounded_channel::<HandlerFailure>();
    let (engine_tx, engine_rx) = mpsc::unbounded_channel::<HandlerFailure>();
    {
        let metrics = metrics.clone();
        tokio::spawn(async move {
            while let Some(failure) = failure_rx.recv().await {
                metrics.record_handler_failure();
                if engine_tx.send(failure).is_err() {
                    return;
                }
            }
        });
    }
    let engine_task = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.run(engine_rx).await })
    };

    // Coordinator consumer: settles escalations, alerts, and reports
    let consumer_task = {
        let mut consumer = PollingConsumer::new(
            coordinator.clone(),
            store.clone(),
            &config.consumer,
            shutdown_rx.clone(),
        )
        .with_failure_sink(failure_tx);
        for message_type in [
            MessageType::Escalation,
            MessageType::PredictiveAlert,
            MessageType::Blocker,
            MessageType::ImpactReport,
        ] {
            consumer.register_handler(message_type, Box::new(CoordinatorInbox));
        }
        tokio::spawn(async move { consumer.run().await })
    };

    // Monitor loop: detector, predictor, health scorer, indexer, quantifier
    let monitor_task = {
        let store = store.clone();
        let engine = engine.clone();
        let metrics = metrics.clone();
        let config = config.clone();
        let coordinator = coordinator.clone();
        let mut shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            let detector = BlockerDetector::new(config.monitor.clone(), classifier.clone());
            let predictor = RiskPredictor::new(config.monitor.clone());
            let scorer = HealthScorer::new(config.monitor.clone(), classifier.clone());
            let quantifier = ImpactQuantifier::new(classifier.clone(), config.impact.clone());
            let indexer = Mutex::new(KnowledgeIndexer::new(
                classifier.clone(),
                AccessPolicy::new(),
                vec![coordinator.clone()],
            ));

            let mut ticker = interval(Duration::from_secs(config.monitor.scan_interval_secs));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        run_scan(
                            &store, &detector, &predictor, &scorer, &quantifier,
                            &indexer, &engine, &metrics, &config, &coordinator,
                        )
                        .await;
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            info!("monitor loop shutting down");
                            return;
                        }
                    }
                }
            }
        })
    };

    // Retention sweep
    let sweep_task = {
        let store = store.clone();
        let retention = config.retention.clone();
        let mut shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(SWEEP_INTERVAL_SECS));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match store
                            .cleanup(retention.max_age_days, &retention.protected_severities)
                            .await
                        {
                            Ok(removed) if removed > 0 => {
                                info!(removed, "retention sweep complete")
                            }
                            Ok(_) => {}
                            Err(e) => warn!(error = %e, "retention sweep failed"),
                        }
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            return;
                        }
                    }
                }
            }
        })
    };

    info!("bus running; waiting for shutdown signal");
    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())?;
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    tokio::select! {
        _ = sigint.recv() => info!("Received SIGINT, shutting down gracefully"),
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully"),
    }

    shutdown_tx.send(true)?;
    let _ = tokio::join!(consumer_task, monitor_task, sweep_task, engine_task);
    health_task.abort();
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run_scan(
    store: &Arc<MemoryStore>,
    detector: &BlockerDetector,
    predictor: &RiskPredictor,
    scorer: &HealthScorer,
    quantifier: &ImpactQuantifier,
    indexer: &Mutex<KnowledgeIndexer>,
    engine: &Arc<RecoveryEngine<MemoryStore>>,
    metrics: &Arc<BusMetrics>,
    config: &BusConfig,
    coordinator: &str,
) {
    let now = Utc::now();
    let since = now - chrono::Duration::minutes(config.monitor.window_minutes);
    let window = match store.window(since).await {
        Ok(window) => window,
        Err(e) => {
            warn!(error = %e, "window read failed, skipping scan");
            return;
        }
    };

    let alerts = detector.scan(&window, now);
    metrics.record_scan(alerts.len() as u64);
    for alert in &alerts {
        warn!(
            pattern = %alert.pattern,
            severity = %alert.severity,
            agent = alert.agent.as_deref().unwrap_or("-"),
            detail = %alert.detail,
            "blocker detected"
        );
    }

    // Detected failures feed the recovery engine; each recovery runs its
    // own backoff schedule without stalling the scan
    for event in engine.detect(&window) {
        let engine = engine.clone();
        let metrics = metrics.clone();
        tokio::spawn(async move {
            match engine.execute(&event).await {
                Ok(RecoveryStatus::Exhausted) => metrics.record_recovery_exhausted(),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "recovery execution failed"),
            }
        });
    }

    if let Some(assessment) = predictor
        .predict_and_alert(&window, now, store.as_ref(), coordinator, coordinator)
        .await
    {
        if assessment.probability >= config.monitor.risk_threshold {
            metrics.record_predictive_alert();
        }
    }

    let health = scorer.score(&window);
    metrics.set_health_score(health.composite);

    {
        let mut indexer = indexer.lock().unwrap();
        indexer.ingest(&window);
        metrics.set_knowledge_items(indexer.len() as u64);
    }

    let report = quantifier.report(&window, now);
    if report.messages_scored > 0 {
        info!(
            total = report.total,
            daily_rate = report.daily_rate,
            annual_projection = report.annual_projection,
            health = health.composite,
            "scan complete"
        );
    }
}
