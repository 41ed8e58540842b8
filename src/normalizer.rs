use serde_json::{Map, Value};
use tracing::debug;

use crate::data::{InstrumentRecord, Snapshot};
use crate::error::{MonitorError, MonitorResult};

pub const SYMBOL_FIELDS: &[&str] = &["symbol", "uSymbol"];
pub const OI_FIELDS: &[&str] = &["openInterest", "oi"];
pub const PRICE_FIELDS: &[&str] = &["price", "lastPrice", "close"];
/// Source-supplied notional; overrides `oi * price` when present.
pub const NOTIONAL_FIELD: &str = "openInterestAmount";

pub const QUOTE_ASSET: &str = "USDT";
const PAIR_SUFFIX: &str = "/USDT";

#[derive(Debug, Default)]
pub struct NormalizeReport {
    pub snapshot: Snapshot,
    /// Index into the raw batch and the reason each record was dropped.
    pub rejected: Vec<(usize, MonitorError)>,
    /// Records below the minimum notional.
    pub filtered: usize
}

impl NormalizeReport {
    pub fn accepted(&self) -> usize {
        self.snapshot.len()
    }
}

/// Canonical instrument key: pair form collapsed, quote suffix forced.
/// Idempotent for every input.
pub fn normalize_symbol(raw: &str) -> String {
    let mut symbol = raw.trim().to_ascii_uppercase();
    while symbol.contains(PAIR_SUFFIX) {
        symbol = symbol.replace(PAIR_SUFFIX, "");
    }
    symbol.retain(|c| c != '/');
    if !symbol.ends_with(QUOTE_ASSET) {
        symbol.push_str(QUOTE_ASSET);
    }
    symbol
}

/// First candidate whose key holds a usable value. Null and empty strings
/// count as absent.
fn first_present<'a>(record: &'a Map<String, Value>, fields: &[&str]) -> Option<&'a Value> {
    fields
        .iter()
        .filter_map(|field| record.get(*field))
        .find(|value| match value {
            Value::Null => false,
            Value::String(s) => !s.trim().is_empty(),
            _ => true
        })
}

fn coerce_f64(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None
    };
    parsed.filter(|v| v.is_finite())
}

fn numeric(value: &Value, field: &str) -> MonitorResult<f64> {
    coerce_f64(value).ok_or_else(|| MonitorError::RecordRejected(format!("non-numeric {}: {}", field, value)))
}

/// A zero price falls through to the next candidate; 0 when none is usable.
fn resolve_price(record: &Map<String, Value>) -> MonitorResult<f64> {
    for field in PRICE_FIELDS {
        let Some(value) = first_present(record, &[*field]) else {
            continue;
        };
        let price = numeric(value, field)?;
        if price != 0.0 {
            return Ok(price);
        }
    }
    Ok(0.0)
}

pub fn normalize_record(raw: &Value, captured_at: f64) -> MonitorResult<InstrumentRecord> {
    let record = raw
        .as_object()
        .ok_or_else(|| MonitorError::RecordRejected("record is not an object".to_string()))?;

    let symbol = first_present(record, SYMBOL_FIELDS)
        .ok_or_else(|| MonitorError::RecordRejected("missing symbol".to_string()))?
        .as_str()
        .ok_or_else(|| MonitorError::RecordRejected("symbol is not a string".to_string()))?;

    let oi = first_present(record, OI_FIELDS)
        .ok_or_else(|| MonitorError::RecordRejected(format!("{}: missing open interest", symbol)))
        .and_then(|value| numeric(value, "open interest"))?;

    let price = resolve_price(record)?;

    let mut oi_usdt = if price > 0.0 { oi * price } else { 0.0 };
    if let Some(value) = record.get(NOTIONAL_FIELD).filter(|v| !v.is_null()) {
        oi_usdt = numeric(value, NOTIONAL_FIELD)?;
    }
    if !oi_usdt.is_finite() {
        return Err(MonitorError::RecordRejected(format!("{}: notional overflows", symbol)));
    }

    Ok(InstrumentRecord {
        symbol: normalize_symbol(symbol),
        oi,
        price,
        oi_usdt,
        time: captured_at
    })
}

/// Build a snapshot from a raw batch. Bad records are collected, never
/// propagated, so one broken row cannot sink the rest.
pub fn normalize(records: &[Value], min_oi_usdt: f64, captured_at: f64) -> NormalizeReport {
    let mut report = NormalizeReport::default();

    for (index, raw) in records.iter().enumerate() {
        match normalize_record(raw, captured_at) {
            Ok(record) if record.oi_usdt < min_oi_usdt => {
                report.filtered += 1;
            }
            Ok(record) => report.snapshot.insert(record),
            Err(e) => {
                debug!("Dropping record #{}: {}", index, e);
                report.rejected.push((index, e));
            }
        }
    }

    report
}
