use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Trend {
    Up,
    Down
}

impl Trend {
    pub fn glyph(&self) -> &'static str {
        match self {
            Trend::Up => "🚀",
            Trend::Down => "📉"
        }
    }
}

/// Canonical per-instrument state. The symbol is the snapshot key and is not
/// repeated inside the persisted value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentRecord {
    #[serde(skip)]
    pub symbol: String,
    #[serde(default)]
    pub oi: f64,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub oi_usdt: f64,
    #[serde(default)]
    pub time: f64
}

/// Symbol keyed state, kept in capture order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    records: IndexMap<String, InstrumentRecord>
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Later records for the same symbol replace earlier ones in place.
    pub fn insert(&mut self, record: InstrumentRecord) {
        self.records.insert(record.symbol.clone(), record);
    }

    pub fn get(&self, symbol: &str) -> Option<&InstrumentRecord> {
        self.records.get(symbol)
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.records.contains_key(symbol)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &InstrumentRecord> {
        self.records.values()
    }

    /// Restore the in-record symbol from the map key after deserializing.
    pub(crate) fn rekeyed(mut self) -> Self {
        for (symbol, record) in self.records.iter_mut() {
            record.symbol = symbol.clone();
        }
        self
    }
}

impl FromIterator<InstrumentRecord> for Snapshot {
    fn from_iter<I: IntoIterator<Item = InstrumentRecord>>(iter: I) -> Self {
        let mut snapshot = Snapshot::new();
        for record in iter {
            snapshot.insert(record);
        }
        snapshot
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub symbol: String,
    pub oi: f64,
    pub oi_usdt: f64,
    pub price: f64,
    pub change: f64,
    pub prev_oi: f64
}

impl Alert {
    pub fn trend(&self) -> Trend {
        if self.change > 0.0 { Trend::Up } else { Trend::Down }
    }
}
