//! Order statistics over request latencies.

use serde::{ Deserialize, Serialize };

/// Latency summary in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub mean_ms: f64,
    pub median_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub p95_ms: f64,
}

impl LatencySummary {
    /// Summarize the given samples. Returns `None` for an empty slice.
    pub fn from_samples(samples_ms: &[f64]) -> Option<Self> {
        if samples_ms.is_empty() {
            return None;
        }
        let mut sorted = samples_ms.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        Some(LatencySummary {
            mean_ms: mean(&sorted),
            median_ms: median_sorted(&sorted),
            min_ms: sorted[0],
            max_ms: sorted[sorted.len() - 1],
            p95_ms: percentile_sorted(&sorted, 95),
        })
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / (values.len() as f64)
}

/// Middle value, or the average of the two middle values for an even count.
fn median_sorted(sorted: &[f64]) -> f64 {
    debug_assert!(!sorted.is_empty());
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted[mid]
    } else {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    }
}

/// Nearest-rank percentile: the value at 1-indexed rank `ceil(p/100 * n)`.
///
/// The rank is computed in integers so `p95` of 20 samples is exactly rank 19.
fn percentile_sorted(sorted: &[f64], p: usize) -> f64 {
    debug_assert!(!sorted.is_empty());
    let n = sorted.len();
    let rank = (p * n).div_ceil(100).clamp(1, n);
    sorted[rank - 1]
}

/// Requests per second for `count` requests completed in `duration_ms`.
pub fn throughput(count: usize, duration_ms: f64) -> f64 {
    if duration_ms <= 0.0 {
        0.0
    } else {
        ((count as f64) * 1000.0) / duration_ms
    }
}

/// Fraction of `part` in `total`, 0 when `total` is 0.
pub fn fraction(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        (part as f64) / (total as f64)
    }
}

/// Milliseconds as `f64` without the rounding of `as_secs_f64() * 1000`.
pub fn duration_ms(d: std::time::Duration) -> f64 {
    (d.as_nanos() as f64) / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_even_count_averages_middle_pair() {
        let s = LatencySummary::from_samples(&[40.0, 10.0, 30.0, 20.0]).unwrap();
        assert_eq!(s.median_ms, 25.0);
    }

    #[test]
    fn median_odd_count_takes_middle() {
        let s = LatencySummary::from_samples(&[30.0, 10.0, 20.0]).unwrap();
        assert_eq!(s.median_ms, 20.0);
    }

    #[test]
    fn p95_uses_ceiling_rank() {
        let samples: Vec<f64> = (1..=20).rev().map(|v| v as f64).collect();
        let s = LatencySummary::from_samples(&samples).unwrap();
        assert_eq!(s.p95_ms, 19.0);
    }

    #[test]
    fn p95_of_small_batches() {
        // ceil(0.95 * 5) = 5, ceil(0.95 * 1) = 1
        let five = LatencySummary::from_samples(&[1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        assert_eq!(five.p95_ms, 5.0);
        let one = LatencySummary::from_samples(&[7.5]).unwrap();
        assert_eq!(one.p95_ms, 7.5);
        assert_eq!(one.median_ms, 7.5);
    }

    #[test]
    fn p95_of_hundred_samples_is_rank_95() {
        let samples: Vec<f64> = (1..=100).map(|v| v as f64).collect();
        let s = LatencySummary::from_samples(&samples).unwrap();
        assert_eq!(s.p95_ms, 95.0);
    }

    #[test]
    fn mean_min_max() {
        let s = LatencySummary::from_samples(&[10.0, 20.0, 30.0, 40.0]).unwrap();
        assert_eq!(s.mean_ms, 25.0);
        assert_eq!(s.min_ms, 10.0);
        assert_eq!(s.max_ms, 40.0);
    }

    #[test]
    fn empty_samples_have_no_summary() {
        assert!(LatencySummary::from_samples(&[]).is_none());
    }

    #[test]
    fn throughput_guards_zero_duration() {
        assert_eq!(throughput(10, 0.0), 0.0);
        assert_eq!(throughput(10, 500.0), 20.0);
    }

    #[test]
    fn fraction_guards_zero_total() {
        assert_eq!(fraction(1, 0), 0.0);
        assert_eq!(fraction(1, 4), 0.25);
    }
}
