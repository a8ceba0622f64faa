//! Unit formatting shared by the human-facing renderers

use crate::summarize::ReasonCount;

const GIB: f64 = (1u64 << 30) as f64;

pub fn format_gb(bytes: Option<f64>) -> String {
    match bytes {
        None => "n/a".to_string(),
        Some(b) => {
            let gb = b / GIB;
            if gb >= 10.0 {
                format!("{gb:.0} GB")
            } else {
                format!("{gb:.1} GB")
            }
        }
    }
}

/// `format_gb` without the space, for table cells
pub fn format_gb_compact(bytes: Option<f64>) -> String {
    format_gb(bytes).replace(" GB", "G")
}

pub fn format_load(load: Option<f64>) -> String {
    load.map_or_else(|| "n/a".to_string(), |l| format!("{l:.2}"))
}

/// `reason:count, ...` or `none`
pub fn join_reason_counts(reasons: &[ReasonCount]) -> String {
    if reasons.is_empty() {
        return "none".to_string();
    }
    reasons
        .iter()
        .map(|r| format!("{}:{}", r.reason, r.count))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_gb() {
        assert_eq!(format_gb(None), "n/a");
        assert_eq!(format_gb(Some(1.5 * GIB)), "1.5 GB");
        assert_eq!(format_gb(Some(120.4 * GIB)), "120 GB");
        assert_eq!(format_gb_compact(Some(1.5 * GIB)), "1.5G");
    }

    #[test]
    fn test_format_load() {
        assert_eq!(format_load(Some(0.5)), "0.50");
        assert_eq!(format_load(None), "n/a");
    }

    #[test]
    fn test_join_reason_counts() {
        assert_eq!(join_reason_counts(&[]), "none");
        let reasons = vec![
            ReasonCount { reason: "collector_failed:cpu".into(), count: 1 },
            ReasonCount { reason: "signal:cpu_high".into(), count: 4 },
        ];
        assert_eq!(join_reason_counts(&reasons), "collector_failed:cpu:1, signal:cpu_high:4");
    }
}
