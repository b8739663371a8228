//! Matchday prediction service entry point

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use matchday_ai_service::{routes, AppContext};
use matchday_prediction_engine::features::FEATURES;
use matchday_prediction_engine::{training_source, EngineConfig, ModelStore};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "matchday-ai-service")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Sports-outcome prediction service", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load or train a model bundle and serve HTTP requests
    Serve {
        /// Port to listen on (overrides the config file)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Train a bundle offline and write it to the model directory
    Train {
        /// Number of training samples
        #[arg(long)]
        samples: Option<usize>,

        /// Labelled CSV of historical games (features then a 0/1 label)
        #[arg(long)]
        data: Option<PathBuf>,

        /// Model directory (overrides the config file)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;
    let cli = Cli::parse();

    let mut config = EngineConfig::load(cli.config.as_deref())
        .context("Failed to load configuration")?;

    match cli.command.unwrap_or(Command::Serve { port: None }) {
        Command::Serve { port } => {
            if let Some(port) = port {
                config.service.port = port;
            }
            serve(config).await
        }
        Command::Train {
            samples,
            data,
            output,
        } => {
            if let Some(samples) = samples {
                config.training.n_samples = samples;
            }
            if data.is_some() {
                config.training.data_path = data;
            }
            if let Some(output) = output {
                config.store.model_dir = output;
            }
            config.validate().context("Invalid training configuration")?;
            train(config).await
        }
    }
}

/// Initialize logging from `RUST_LOG`, defaulting to `info`
fn init_logging() -> Result<()> {
    let env = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(env)),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(())
}

async fn serve(config: EngineConfig) -> Result<()> {
    info!("Starting Matchday prediction service v{}", env!("CARGO_PKG_VERSION"));

    let addr: SocketAddr = format!("{}:{}", config.service.bind, config.service.port)
        .parse()
        .with_context(|| {
            format!(
                "Invalid bind address {}:{}",
                config.service.bind, config.service.port
            )
        })?;

    let ctx = AppContext::from_config(config).context("Failed to build application context")?;
    let state = ctx.engine.initialize().await;
    info!(state = state.as_str(), "Prediction engine initialized");

    let (bound, server) = warp::serve(routes(ctx))
        .try_bind_with_graceful_shutdown(addr, async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Received shutdown signal"),
                Err(err) => error!("Unable to listen for shutdown signal: {}", err),
            }
        })
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!("Listening on {}", bound);
    server.await;
    info!("Prediction service stopped");
    Ok(())
}

async fn train(config: EngineConfig) -> Result<()> {
    let names: Vec<String> = FEATURES.iter().map(|(name, _)| name.to_string()).collect();
    let store = ModelStore::new(config.store.clone(), config.training.clone(), names);
    let source = training_source(&config.training);
    let (n_samples, n_features) = (config.training.n_samples, config.training.n_features);

    info!(
        n_samples,
        n_features,
        source = source.name(),
        model_dir = %config.store.model_dir.display(),
        "Training model bundle"
    );

    let path = tokio::task::spawn_blocking(move || {
        let bundle = store.train(source.as_ref(), n_samples, n_features)?;
        if let Some(metrics) = &bundle.performance_metrics {
            info!(
                accuracy = metrics.accuracy,
                log_loss = metrics.log_loss,
                auc_roc = metrics.auc_roc,
                calibration = metrics.calibration_score,
                "Validation metrics"
            );
        }
        store.save(&bundle)
    })
    .await
    .context("Training task failed")?
    .context("Training failed")?;

    info!("Model bundle written to {}", path.display());
    Ok(())
}
