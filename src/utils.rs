use chrono::{DateTime, FixedOffset, Utc};

const YI: f64 = 100_000_000.0;
const WAN: f64 = 10_000.0;

/// Seconds since epoch with sub-second precision.
pub fn now_secs() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

/// `+5.20%` / `-3.10%`
pub fn format_change(change: f64) -> String {
    if change > 0.0 {
        format!("+{:.2}%", change * 100.0)
    } else {
        format!("{:.2}%", change * 100.0)
    }
}

/// Notional in 亿 above one hundred million, otherwise in 万.
pub fn format_notional(value: f64) -> String {
    if value > YI {
        format!("${:.2}亿", value / YI)
    } else {
        format!("${:.0}万", value / WAN)
    }
}

pub fn format_wan(value: f64) -> String {
    format!("{:.0}万", value / WAN)
}

/// Wall clock in UTC+8, the audience's local time.
pub fn beijing_clock(now: DateTime<Utc>) -> String {
    match FixedOffset::east_opt(8 * 3600) {
        Some(tz) => now.with_timezone(&tz).format("%H:%M").to_string(),
        None => now.format("%H:%M").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn change_is_signed() {
        assert_eq!(format_change(0.052), "+5.20%");
        assert_eq!(format_change(-0.031), "-3.10%");
        assert_eq!(format_change(0.0), "0.00%");
    }

    #[test]
    fn notional_switches_unit() {
        assert_eq!(format_notional(1_230_000_000.0), "$12.30亿");
        assert_eq!(format_notional(56_000_000.0), "$5600万");
        assert_eq!(format_wan(10_000_000.0), "1000万");
    }

    #[test]
    fn clock_is_shifted_eight_hours() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 23, 5, 0).unwrap();
        assert_eq!(beijing_clock(now), "07:05");
    }
}
