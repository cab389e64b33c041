//! Measurement data models

use http::HeaderMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// A phase duration, or nothing if the phase was never observed
///
/// An invalid measure is not the same thing as a zero one: a TLS handshake
/// on a plaintext connection never happened and must not be shown as 0 ms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Measure(Option<Duration>);

impl Measure {
    /// The "not measured" value
    pub const INVALID: Measure = Measure(None);

    pub fn new(duration: Duration) -> Self {
        Self(Some(duration))
    }

    pub fn is_valid(&self) -> bool {
        self.0.is_some()
    }

    pub fn duration(&self) -> Option<Duration> {
        self.0
    }

    /// Express the measure as a number of `unit`s
    pub fn to_float(&self, unit: Duration) -> Option<f64> {
        self.0.map(|d| d.as_secs_f64() / unit.as_secs_f64())
    }

    pub fn as_millis_f64(&self) -> Option<f64> {
        self.to_float(Duration::from_millis(1))
    }
}

impl From<Duration> for Measure {
    fn from(duration: Duration) -> Self {
        Self::new(duration)
    }
}

impl fmt::Display for Measure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_millis_f64() {
            Some(ms) => write!(f, "{:.1} ms", ms),
            None => f.write_str("n/a"),
        }
    }
}

/// Outcome of one HTTP transaction attempt
///
/// On failure only `is_failure` and `failure_cause` carry meaning; every
/// other field keeps its zero value.
#[derive(Debug, Clone, Default)]
pub struct HttpMeasure {
    /// Protocol version of the response, e.g. `HTTP/1.1`
    pub proto: String,
    pub status_code: u16,
    /// Payload bytes drained from the response body
    pub bytes: u64,
    /// Bytes read from the socket
    pub in_bytes: u64,
    /// Bytes written to the socket
    pub out_bytes: u64,
    pub socket_reused: bool,
    pub compressed: bool,
    pub remote_addr: String,
    pub tls_enabled: bool,
    pub tls_version: String,

    pub total_time: Measure,
    pub dns_resolution: Measure,
    pub tcp_handshake: Measure,
    pub tls_duration: Measure,
    pub conn_establishment: Measure,
    pub request_sending: Measure,
    pub wait: Measure,
    pub response_ingesting: Measure,

    pub is_failure: bool,
    pub failure_cause: String,
    pub headers: HeaderMap,
}

impl HttpMeasure {
    /// A failed attempt with the given cause
    pub fn failure<S: Into<String>>(cause: S) -> Self {
        Self {
            is_failure: true,
            failure_cause: cause.into(),
            ..Self::default()
        }
    }

    /// Phases that add up sequentially to at most `total_time`
    pub fn sequential_phases(&self) -> [Measure; 4] {
        [
            self.conn_establishment,
            self.request_sending,
            self.wait,
            self.response_ingesting,
        ]
    }
}

/// Sum of the valid measures in a slice
pub fn sum_valid(measures: &[Measure]) -> Duration {
    measures.iter().filter_map(Measure::duration).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_measure() {
        let measure = Measure::INVALID;
        assert!(!measure.is_valid());
        assert_eq!(measure.as_millis_f64(), None);
        assert_eq!(measure.to_string(), "n/a");
        assert_eq!(Measure::default(), Measure::INVALID);
    }

    #[test]
    fn test_zero_is_valid() {
        let measure = Measure::new(Duration::ZERO);
        assert!(measure.is_valid());
        assert_eq!(measure.as_millis_f64(), Some(0.0));
    }

    #[test]
    fn test_unit_conversion() {
        let measure = Measure::from(Duration::from_micros(12_500));
        assert_eq!(measure.as_millis_f64(), Some(12.5));
        assert_eq!(measure.to_float(Duration::from_secs(1)), Some(0.0125));
        assert_eq!(measure.to_string(), "12.5 ms");
    }

    #[test]
    fn test_failure_measure_is_zeroed() {
        let measure = HttpMeasure::failure("Request timeout");
        assert!(measure.is_failure);
        assert_eq!(measure.failure_cause, "Request timeout");
        assert_eq!(measure.status_code, 0);
        assert_eq!(measure.bytes, 0);
        assert!(!measure.total_time.is_valid());
    }

    #[test]
    fn test_sum_valid_skips_invalid() {
        let measures = [
            Measure::new(Duration::from_millis(3)),
            Measure::INVALID,
            Measure::new(Duration::from_millis(4)),
        ];
        assert_eq!(sum_valid(&measures), Duration::from_millis(7));
    }
}
