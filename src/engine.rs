use tracing::{info, warn};

use crate::capture::{extract_records, PayloadSource};
use crate::config::{AppConfig, MonitorSettings};
use crate::data::Alert;
use crate::diff::diff;
use crate::error::MonitorResult;
use crate::normalizer::normalize;
use crate::notify::{Delivery, Dispatcher};
use crate::store::HistoryStore;
use crate::utils::now_secs;

#[derive(Debug)]
pub struct RunReport {
    pub captured: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub filtered: usize,
    pub alerts: Vec<Alert>,
    pub persisted: bool,
    pub delivery: Delivery
}

/// One capture, compare, persist, notify cycle.
pub struct MonitorEngine<S: PayloadSource> {
    pub source: S,
    pub store: HistoryStore,
    pub dispatcher: Dispatcher,
    pub settings: MonitorSettings
}

impl<S: PayloadSource> MonitorEngine<S> {
    pub fn new(source: S, store: HistoryStore, dispatcher: Dispatcher, settings: MonitorSettings) -> Self {
        Self { source, store, dispatcher, settings }
    }

    pub fn from_config(source: S, config: &AppConfig) -> Self {
        let settings = config.monitor_settings.clone();
        let dispatcher = Dispatcher::new(
            config.webhook().map(str::to_string),
            settings.oi_change_threshold,
            settings.min_oi_usdt
        );
        Self::new(source, HistoryStore::new(&config.history.path), dispatcher, settings)
    }

    /// Fails only when nothing usable was captured. Persistence and delivery
    /// problems are logged and reflected in the report.
    pub async fn run(&self) -> MonitorResult<RunReport> {
        let raw = self.source.fetch().await?;
        let records = extract_records(&raw)?;
        info!("Parsed {} raw records", records.len());

        let report = normalize(&records, self.settings.min_oi_usdt, now_secs());
        if !report.rejected.is_empty() {
            warn!("Dropped {} unusable records", report.rejected.len());
        }

        let previous = self.store.load();
        let alerts = diff(&report.snapshot, &previous, self.settings.oi_change_threshold);
        info!(
            "Compared {} symbols against {} previous, {} alerts",
            report.snapshot.len(), previous.len(), alerts.len()
        );

        let persisted = match self.store.save(&report.snapshot) {
            Ok(()) => true,
            Err(e) => {
                warn!("{}, alerts are still dispatched", e);
                false
            }
        };

        let delivery = self.dispatcher.dispatch(&alerts).await;

        Ok(RunReport {
            captured: records.len(),
            accepted: report.accepted(),
            rejected: report.rejected.len(),
            filtered: report.filtered,
            alerts,
            persisted,
            delivery
        })
    }
}
