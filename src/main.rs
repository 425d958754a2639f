// =============================================================================
// Quality Scoring Engine — Main Entry Point
// =============================================================================
//
// Loads the runtime config and the weight file, opens the quality metrics log,
// and serves the REST API. Weights are re-read on a fixed interval; a bad
// file is rejected and the last good snapshot stays in service.
// =============================================================================

use std::path::Path;
use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use quality_scoring::api;
use quality_scoring::app_state::AppState;
use quality_scoring::tracker::{QualityLogWriter, QualityMetricsTracker, TargetBand};
use quality_scoring::{
    JsonFileWeightSource, RuntimeConfig, ScoringEngine, WeightConfigurationSource, WeightStore,
};

const DEFAULT_CONFIG_PATH: &str = "runtime_config.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Quality Scoring Engine starting up");

    let config_path =
        std::env::var("SCORING_CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
    let mut config = RuntimeConfig::load(&config_path).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        RuntimeConfig::default()
    });
    config.validate();

    info!(
        weights_path = %config.weights_path,
        quality_log = %config.quality_log_path,
        buy_threshold = config.risk.buy_threshold,
        sell_threshold = config.risk.sell_threshold,
        quality_haircut = config.risk.enable_quality_haircut,
        "Configuration ready"
    );

    // ── 2. Weights ───────────────────────────────────────────────────────
    let weight_source: Arc<dyn WeightConfigurationSource> =
        Arc::new(JsonFileWeightSource::new(&config.weights_path));
    let weights = Arc::new(WeightStore::from_source(weight_source.as_ref()));

    // ── 3. Quality tracker (replay existing log, then append) ────────────
    let band = TargetBand {
        low: config.risk.amplification_target_low,
        high: config.risk.amplification_target_high,
    };
    let tracker = if Path::new(&config.quality_log_path).exists() {
        match QualityMetricsTracker::from_log(
            &config.quality_log_path,
            config.tracker_memory_capacity,
            band,
        ) {
            Ok((tracker, summary)) => {
                info!(
                    evaluations = summary.evaluations,
                    outcomes = summary.outcomes,
                    rejected = summary.rejected,
                    "Quality history restored"
                );
                tracker
            }
            Err(e) => {
                warn!(error = %e, "Quality log unreadable, starting with empty history");
                QualityMetricsTracker::from_config(&config)
            }
        }
    } else {
        QualityMetricsTracker::from_config(&config)
    };

    let log_writer = QualityLogWriter::spawn(&config.quality_log_path).await?;
    let tracker = Arc::new(tracker.with_log_sink(log_writer.sender()));

    // ── 4. Engine & shared state ─────────────────────────────────────────
    let engine = Arc::new(ScoringEngine::new(&config, weights.clone()));
    let reload_secs = config.weights_reload_secs;
    let state = Arc::new(AppState::new(
        config,
        weight_source,
        engine,
        tracker.clone(),
    ));

    // ── 5. Periodic weight reload ────────────────────────────────────────
    if reload_secs > 0 {
        let reload_state = state.clone();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(tokio::time::Duration::from_secs(reload_secs));
            interval.tick().await;
            loop {
                interval.tick().await;
                // Failures are logged by the weight store.
                let _ = reload_state.reload_weights();
            }
        });
        info!(every_secs = reload_secs, "Weight reload loop started");
    }

    // ── 6. API server ────────────────────────────────────────────────────
    let bind_addr =
        std::env::var("SCORING_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3001".into());
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "API server listening");

    let app = api::rest::router(state.clone());
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            warn!("Shutdown signal received — stopping gracefully");
        })
        .await?;

    // ── 7. Graceful shutdown ─────────────────────────────────────────────
    tracker.detach_log();
    match log_writer.close().await {
        Ok(written) => info!(written, "Quality log flushed"),
        Err(e) => error!(error = %e, "Failed to flush quality log"),
    }

    info!("Quality Scoring Engine shut down complete.");
    Ok(())
}
