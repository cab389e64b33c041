//! Aggregate statistics over a ping run

use crate::models::{HttpMeasure, Measure};
use serde::{Deserialize, Serialize};

/// Round-trip summary of the successful measurements
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Latencies {
    pub min_ms: f64,
    pub avg_ms: f64,
    pub max_ms: f64,
    /// Population standard deviation
    pub std_dev_ms: f64,
}

impl Latencies {
    /// Summarize total times; `None` when there are none
    pub fn from_measures(measures: &[Measure]) -> Option<Self> {
        let times: Vec<f64> = measures.iter().filter_map(Measure::as_millis_f64).collect();
        let count = times.len();
        if count == 0 {
            return None;
        }

        let avg = times.iter().sum::<f64>() / count as f64;
        let min = times.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = times.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

        let variance = if count > 1 {
            times.iter().map(|&x| (x - avg).powi(2)).sum::<f64>() / count as f64
        } else {
            0.0
        };

        Some(Self {
            min_ms: min,
            avg_ms: avg,
            max_ms: max,
            std_dev_ms: variance.sqrt(),
        })
    }
}

impl std::fmt::Display for Latencies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "round-trip min/avg/max/stddev = {:.3}/{:.3}/{:.3}/{:.3} ms",
            self.min_ms, self.avg_ms, self.max_ms, self.std_dev_ms
        )
    }
}

/// Running tally of a ping run
#[derive(Debug, Clone, Default)]
pub struct PingStatistics {
    attempts: u64,
    failures: u64,
    latencies: Vec<Measure>,
}

impl PingStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for one reported measurement
    pub fn record(&mut self, measure: &HttpMeasure) {
        self.attempts += 1;
        if measure.is_failure {
            self.failures += 1;
        } else {
            self.latencies.push(measure.total_time);
        }
    }

    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    pub fn answers(&self) -> u64 {
        self.attempts - self.failures
    }

    /// Share of failed attempts, in percent
    pub fn loss_percent(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            100.0 * self.failures as f64 / self.attempts as f64
        }
    }

    pub fn latencies(&self) -> Option<Latencies> {
        Latencies::from_measures(&self.latencies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn ok(ms: u64) -> HttpMeasure {
        HttpMeasure {
            total_time: Measure::new(Duration::from_millis(ms)),
            ..HttpMeasure::default()
        }
    }

    #[test]
    fn test_empty_run() {
        let stats = PingStatistics::new();
        assert_eq!(stats.attempts(), 0);
        assert_eq!(stats.loss_percent(), 0.0);
        assert!(stats.latencies().is_none());
    }

    #[test]
    fn test_loss_and_latencies() {
        let mut stats = PingStatistics::new();
        stats.record(&ok(10));
        stats.record(&ok(20));
        stats.record(&ok(30));
        stats.record(&HttpMeasure::failure("Request timeout"));

        assert_eq!(stats.attempts(), 4);
        assert_eq!(stats.answers(), 3);
        assert_eq!(stats.loss_percent(), 25.0);

        let latencies = stats.latencies().unwrap();
        assert_eq!(latencies.min_ms, 10.0);
        assert_eq!(latencies.max_ms, 30.0);
        assert!((latencies.avg_ms - 20.0).abs() < 1e-9);
        assert!((latencies.std_dev_ms - 8.164_965_809).abs() < 1e-6);
    }

    #[test]
    fn test_single_sample_has_no_deviation() {
        let latencies = Latencies::from_measures(&[Measure::new(Duration::from_millis(5))]).unwrap();
        assert_eq!(latencies.std_dev_ms, 0.0);
        assert_eq!(
            latencies.to_string(),
            "round-trip min/avg/max/stddev = 5.000/5.000/5.000/0.000 ms"
        );
    }
}
