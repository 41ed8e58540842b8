use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::data::Alert;
use crate::error::{MonitorError, MonitorResult};
use crate::normalizer::QUOTE_ASSET;
use crate::utils::{beijing_clock, format_change, format_notional, format_wan};

pub const CARD_LIMIT: usize = 20;
pub const LOCAL_LIMIT: usize = 5;
pub const CHART_BASE_URL: &str = "https://www.coinglass.com/tv/Binance_";

#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Webhook,
    /// No endpoint configured, or the endpoint failed.
    LocalSummary,
    /// Nothing crossed the threshold.
    Skipped
}

fn card_line(alert: &Alert) -> String {
    let base = alert.symbol.strip_suffix(QUOTE_ASSET).unwrap_or(&alert.symbol);
    format!(
        "{} **[{}]({}{})** `{}` <font color='grey'>{}</font>",
        alert.trend().glyph(),
        base,
        CHART_BASE_URL,
        alert.symbol,
        format_change(alert.change),
        format_notional(alert.oi_usdt)
    )
}

/// Interactive Feishu card for a ranked alert list. Expects at least one
/// alert; the header theme follows the sign of the top mover.
pub fn build_card(alerts: &[Alert], threshold: f64, min_oi_usdt: f64, now: DateTime<Utc>) -> Value {
    let mut lines: Vec<String> = alerts.iter().take(CARD_LIMIT).map(card_line).collect();
    if alerts.len() > CARD_LIMIT {
        lines.push(format!("... 还有 {} 个异动未显示", alerts.len() - CARD_LIMIT));
    }

    let template = match alerts.first() {
        Some(top) if top.change > 0.0 => "orange",
        _ => "indigo"
    };

    json!({
        "msg_type": "interactive",
        "card": {
            "header": {
                "title": {
                    "tag": "plain_text",
                    "content": format!("⚡ 持仓异动监控 [{}]", beijing_clock(now))
                },
                "template": template
            },
            "elements": [
                {
                    "tag": "div",
                    "text": {
                        "tag": "lark_md",
                        "content": lines.join("\n")
                    }
                },
                {
                    "tag": "note",
                    "elements": [{
                        "tag": "plain_text",
                        "content": format!("阈值: {:.0}% | 最小持仓: {}U", threshold * 100.0, format_wan(min_oi_usdt))
                    }]
                }
            ]
        }
    })
}

/// Short plain-text digest for when the webhook is unavailable.
pub fn local_summary(alerts: &[Alert]) -> Vec<String> {
    alerts
        .iter()
        .take(LOCAL_LIMIT)
        .map(|a| format!(
            "{} {} OI: {} (${})",
            a.trend().glyph(),
            a.symbol,
            format_change(a.change),
            format_wan(a.oi_usdt)
        ))
        .collect()
}

pub struct Dispatcher {
    pub client: Client,
    pub webhook: Option<String>,
    pub threshold: f64,
    pub min_oi_usdt: f64
}

impl Dispatcher {
    pub fn new(webhook: Option<String>, threshold: f64, min_oi_usdt: f64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|e| {
                warn!("Falling back to default HTTP client: {}", e);
                Client::new()
            });

        Self { client, webhook, threshold, min_oi_usdt }
    }

    /// Deliver alerts. Never fails the run: transport errors are logged and
    /// the local summary is written instead.
    pub async fn dispatch(&self, alerts: &[Alert]) -> Delivery {
        if alerts.is_empty() {
            info!("No significant OI change (threshold: {:.1}%)", self.threshold * 100.0);
            return Delivery::Skipped;
        }

        let Some(webhook) = self.webhook.as_deref() else {
            warn!("FEISHU_WEBHOOK not configured, printing summary instead");
            self.print_summary(alerts);
            return Delivery::LocalSummary;
        };

        let card = build_card(alerts, self.threshold, self.min_oi_usdt, Utc::now());
        match self.post(webhook, &card).await {
            Ok(()) => {
                info!("Pushed {} OI alerts", alerts.len());
                Delivery::Webhook
            }
            Err(e) => {
                error!("{}", e);
                self.print_summary(alerts);
                Delivery::LocalSummary
            }
        }
    }

    async fn post(&self, webhook: &str, card: &Value) -> MonitorResult<()> {
        let response = self.client.post(webhook).json(card).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(MonitorError::Dispatch(format!(
                "webhook returned {}: {}", status, response.text().await.unwrap_or_default()
            )));
        }

        // Feishu reports application errors in the body with a 200.
        let body: Value = response.json().await.unwrap_or(Value::Null);
        match body.get("code").and_then(Value::as_i64) {
            Some(code) if code != 0 => Err(MonitorError::Dispatch(format!(
                "webhook rejected card (code {}): {}", code, body.get("msg").unwrap_or(&Value::Null)
            ))),
            _ => Ok(())
        }
    }

    fn print_summary(&self, alerts: &[Alert]) {
        for line in local_summary(alerts) {
            println!("   {}", line);
        }
    }
}
