// ==================== PROGRESS AGGREGATOR ====================
// Pure, deterministic statistics over a sparse count map. Every function
// tolerates absent or malformed input by returning 0.

use serde_json::Value;

use crate::record::{CompletedCounts, DerivedStats};

/// Share of the catalog touched, as a whole percentage in [0, 100].
/// Counts every key present, including zero-valued ones.
pub fn percent_of_catalog(counts: Option<&CompletedCounts>, catalog_size: usize) -> u32 {
    let counts = match counts {
        Some(counts) if !counts.is_empty() => counts,
        _ => return 0,
    };
    if catalog_size == 0 {
        return 0;
    }

    let percent = (100.0 * counts.len() as f64 / catalog_size as f64).round();
    percent.clamp(0.0, 100.0) as u32
}

/// Keys whose count is strictly positive
pub fn unique_units_collected(counts: Option<&CompletedCounts>) -> u64 {
    counts.map_or(0, |counts| counts.values().filter(|count| **count > 0).count() as u64)
}

pub fn total_units_collected(counts: Option<&CompletedCounts>) -> u64 {
    counts.map_or(0, |counts| {
        counts.values().fold(0u64, |sum, count| sum.saturating_add(*count))
    })
}

/// Σ unit_number × count. Rarer (heavier) units weigh more; keys that are not
/// positive integers are skipped.
pub fn weighted_sum(counts: Option<&CompletedCounts>) -> u64 {
    counts.map_or(0, |counts| {
        counts
            .iter()
            .filter(|(_, count)| **count > 0)
            .filter_map(|(key, count)| {
                parse_unit_number(key).map(|number| number.saturating_mul(*count))
            })
            .fold(0u64, |sum, weight| sum.saturating_add(weight))
    })
}

/// All derived leaderboard fields for one count map
pub fn derive_stats(counts: Option<&CompletedCounts>, catalog_size: usize) -> DerivedStats {
    let total = total_units_collected(counts);
    DerivedStats {
        pt_percent: percent_of_catalog(counts, catalog_size),
        unique_elements: unique_units_collected(counts),
        elements_created: total,
        total_collected: total,
        protons_gathered: weighted_sum(counts),
    }
}

fn parse_unit_number(key: &str) -> Option<u64> {
    key.trim().parse::<u64>().ok().filter(|number| *number > 0)
}

/// Coerce an untrusted JSON value into a count map.
/// Non-objects become empty; non-numeric or negative counts become 0;
/// fractional counts are floored.
pub fn counts_from_value(value: &Value) -> CompletedCounts {
    let Some(object) = value.as_object() else {
        return CompletedCounts::new();
    };

    object
        .iter()
        .filter_map(|(key, raw)| {
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), coerce_count(raw)))
        })
        .collect()
}

fn coerce_count(raw: &Value) -> u64 {
    let number = match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match number {
        Some(n) if n.is_finite() && n > 0.0 => {
            if n >= u64::MAX as f64 {
                u64::MAX
            } else {
                n.floor() as u64
            }
        }
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn counts(value: Value) -> CompletedCounts {
        counts_from_value(&value)
    }

    #[test]
    fn test_percent_of_empty_is_zero() {
        assert_eq!(percent_of_catalog(None, 118), 0);
        assert_eq!(percent_of_catalog(Some(&CompletedCounts::new()), 118), 0);
        assert_eq!(percent_of_catalog(Some(&counts(json!({"1": 1}))), 0), 0);
    }

    #[test]
    fn test_catalog_of_ten_example() {
        let c = counts(json!({"1": 2, "2": 0}));
        assert_eq!(unique_units_collected(Some(&c)), 1);
        assert_eq!(percent_of_catalog(Some(&c), 10), 20);
        assert_eq!(total_units_collected(Some(&c)), 2);
    }

    #[test]
    fn test_percent_is_clamped() {
        let c = counts(json!({"1": 1, "2": 1, "3": 1, "4": 1}));
        assert_eq!(percent_of_catalog(Some(&c), 2), 100);
        // 1/118 = 0.85% rounds up
        assert_eq!(percent_of_catalog(Some(&counts(json!({"1": 1}))), 118), 1);
        // 1/300 = 0.33% rounds down
        assert_eq!(percent_of_catalog(Some(&counts(json!({"1": 1}))), 300), 0);
    }

    #[test]
    fn test_weighted_sum_skips_malformed_keys() {
        let c = counts(json!({"1": 3, "8": 2, "abc": 5, "0": 4, "-2": 9, "26": 0}));
        // 1×3 + 8×2
        assert_eq!(weighted_sum(Some(&c)), 19);
        assert_eq!(weighted_sum(None), 0);
    }

    #[test]
    fn test_counts_from_malformed_values() {
        assert!(counts_from_value(&Value::Null).is_empty());
        assert!(counts_from_value(&json!([1, 2, 3])).is_empty());
        assert!(counts_from_value(&json!("nope")).is_empty());

        let c = counts(json!({"1": "4", "2": -3, "3": 2.9, "4": null, "5": true, " ": 7}));
        assert_eq!(c.get("1"), Some(&4));
        assert_eq!(c.get("2"), Some(&0));
        assert_eq!(c.get("3"), Some(&2));
        assert_eq!(c.get("4"), Some(&0));
        assert_eq!(c.get("5"), Some(&0));
        assert_eq!(c.len(), 5);
    }

    #[test]
    fn test_derive_stats() {
        let c = counts(json!({"1": 2, "6": 1, "7": 0}));
        let stats = derive_stats(Some(&c), 118);
        assert_eq!(stats.pt_percent, 3); // 3/118 = 2.54%
        assert_eq!(stats.unique_elements, 2);
        assert_eq!(stats.elements_created, 3);
        assert_eq!(stats.total_collected, 3);
        assert_eq!(stats.protons_gathered, 8);
    }
}
