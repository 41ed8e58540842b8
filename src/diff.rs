use crate::data::{Alert, Snapshot};

/// Relative OI moves between two snapshots, largest first.
///
/// Only symbols present in both snapshots are compared, and a previous OI at
/// or below zero has no defined relative change. Ties keep the order of
/// `current`.
pub fn diff(current: &Snapshot, previous: &Snapshot, threshold: f64) -> Vec<Alert> {
    let mut alerts: Vec<Alert> = current
        .iter()
        .filter_map(|curr| {
            let prev = previous.get(&curr.symbol)?;
            if prev.oi <= 0.0 {
                return None;
            }

            let change = (curr.oi - prev.oi) / prev.oi;
            (change.abs() >= threshold).then(|| Alert {
                symbol: curr.symbol.clone(),
                oi: curr.oi,
                oi_usdt: curr.oi_usdt,
                price: curr.price,
                change,
                prev_oi: prev.oi
            })
        })
        .collect();

    alerts.sort_by(|a, b| b.change.abs().total_cmp(&a.change.abs()));
    alerts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::InstrumentRecord;

    fn snap(entries: &[(&str, f64)]) -> Snapshot {
        entries
            .iter()
            .map(|(symbol, oi)| InstrumentRecord {
                symbol: symbol.to_string(),
                oi: *oi,
                price: 2.0,
                oi_usdt: oi * 2.0,
                time: 0.0
            })
            .collect()
    }

    #[test]
    fn change_at_or_above_threshold_alerts() {
        let alerts = diff(&snap(&[("BTCUSDT", 106.0)]), &snap(&[("BTCUSDT", 100.0)]), 0.05);
        assert_eq!(alerts.len(), 1);
        assert!((alerts[0].change - 0.06).abs() < 1e-12);
        assert_eq!(alerts[0].prev_oi, 100.0);
        assert_eq!(alerts[0].oi_usdt, 212.0);

        assert!(diff(&snap(&[("BTCUSDT", 104.0)]), &snap(&[("BTCUSDT", 100.0)]), 0.05).is_empty());

        let drop = diff(&snap(&[("BTCUSDT", 90.0)]), &snap(&[("BTCUSDT", 100.0)]), 0.05);
        assert!((drop[0].change + 0.1).abs() < 1e-12);
    }

    #[test]
    fn non_positive_previous_oi_never_alerts() {
        let previous = snap(&[("A", 0.0), ("B", -5.0)]);
        let current = snap(&[("A", 1_000_000.0), ("B", 10.0)]);
        assert!(diff(&current, &previous, 0.0001).is_empty());
    }

    #[test]
    fn symbols_without_baseline_are_ignored() {
        let previous = snap(&[("A", 100.0), ("GONE", 100.0)]);
        let current = snap(&[("A", 100.0), ("NEW", 500.0)]);
        assert!(diff(&current, &previous, 0.01).is_empty());
    }

    #[test]
    fn ranking_is_stable_by_magnitude() {
        let previous = snap(&[("C", 100.0), ("A", 100.0), ("B", 100.0)]);
        let current = snap(&[("C", 110.0), ("A", 120.0), ("B", 80.0)]);
        let order: Vec<_> = diff(&current, &previous, 0.05)
            .into_iter()
            .map(|a| a.symbol)
            .collect();
        assert_eq!(order, vec!["A", "B", "C"]);

        let current = snap(&[("B", 80.0), ("A", 120.0), ("C", 110.0)]);
        let order: Vec<_> = diff(&current, &previous, 0.05)
            .into_iter()
            .map(|a| a.symbol)
            .collect();
        assert_eq!(order, vec!["B", "A", "C"]);
    }
}
