use std::env;

use oi_monitor::capture::BrowserCapture;
use oi_monitor::config::AppConfig;
use oi_monitor::engine::MonitorEngine;
use oi_monitor::error::ErrorHandler;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    dotenv::dotenv().ok();

    let config_path = env::args().nth(1).unwrap_or_else(|| "config.json".to_string());
    let (mut config, load_error) = match AppConfig::from_file(&config_path) {
        Ok(config) => (config, None),
        Err(e) => (AppConfig::default(), Some(e)),
    };
    config.apply_env();

    init_tracing(&config.logging.level);
    if let Some(e) = load_error {
        warn!("{}, using defaults", e);
    }
    config.validate()?;

    if config.webhook().is_none() && env::var("GITHUB_ACTIONS").is_err() {
        println!("\n[WARN] Running locally without feishu_webhook.");
        println!("For GitHub Actions, add a FEISHU_WEBHOOK secret under Settings -> Secrets and variables -> Actions.\n");
    }

    info!(
        "OI monitor: threshold {:.1}%, min notional {}, scheduled every {}s",
        config.monitor_settings.oi_change_threshold * 100.0,
        config.monitor_settings.min_oi_usdt,
        config.monitor_settings.interval_seconds
    );

    let source = BrowserCapture::new(config.capture.clone());
    let engine = MonitorEngine::from_config(source, &config);

    match engine.run().await {
        Ok(report) => {
            info!(
                "Run complete: {} captured, {} kept, {} rejected, {} filtered, {} alerts, persisted: {}, delivery: {:?}",
                report.captured,
                report.accepted,
                report.rejected,
                report.filtered,
                report.alerts.len(),
                report.persisted,
                report.delivery
            );
            Ok(())
        }
        Err(e) if ErrorHandler::is_fatal(&e) => {
            ErrorHandler::handle_error(&e);
            Err(e.into())
        }
        Err(e) => {
            ErrorHandler::handle_error(&e);
            Ok(())
        }
    }
}
