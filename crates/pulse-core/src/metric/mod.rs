//! Metric value model: the two supported kinds and their canonical encodings

mod record;

pub use record::{Record, RecordWire};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{PulseError, PulseResult};

/// Metric kind discriminant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Monotonically accumulating integer metric
    Counter,
    /// Last-write-wins floating point metric
    Gauge,
}

impl MetricKind {
    /// Stable textual name, used in composite keys and on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Counter => "counter",
            Self::Gauge => "gauge",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = PulseError;

    fn from_str(s: &str) -> PulseResult<Self> {
        match s {
            "counter" => Ok(Self::Counter),
            "gauge" => Ok(Self::Gauge),
            other => Err(PulseError::not_implemented(other)),
        }
    }
}

/// Metric value: a closed, two-variant tagged union.
///
/// `Counter` accumulates across pushes, `Gauge` overwrites. The `Display`
/// impl is the canonical string encoding: counters render as plain decimal
/// integers, gauges as the shortest round-trip decimal without exponent
/// notation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    /// Monotonically accumulated; pushing adds to the stored value
    Counter(i64),
    /// Free-floating; pushing overwrites the stored value
    Gauge(f64),
}

impl MetricValue {
    /// The kind implied by this value's variant
    pub fn kind(&self) -> MetricKind {
        match self {
            Self::Counter(_) => MetricKind::Counter,
            Self::Gauge(_) => MetricKind::Gauge,
        }
    }

    /// Parse a canonical string encoding back into a value of the given kind
    pub fn parse(kind: MetricKind, raw: &str) -> PulseResult<Self> {
        match kind {
            MetricKind::Counter => raw
                .parse::<i64>()
                .map(Self::Counter)
                .map_err(|e| PulseError::storage(format!("bad counter value {:?}: {}", raw, e))),
            MetricKind::Gauge => raw
                .parse::<f64>()
                .map(Self::Gauge)
                .map_err(|e| PulseError::storage(format!("bad gauge value {:?}: {}", raw, e))),
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // f64 Display is the shortest decimal form that round-trips and
            // never switches to exponent notation.
            Self::Counter(v) => write!(f, "{}", v),
            Self::Gauge(v) => write!(f, "{}", v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_str() {
        assert_eq!("counter".parse::<MetricKind>().unwrap(), MetricKind::Counter);
        assert_eq!("gauge".parse::<MetricKind>().unwrap(), MetricKind::Gauge);
        assert!(matches!(
            "histogram".parse::<MetricKind>(),
            Err(PulseError::MetricNotImplemented { kind }) if kind == "histogram"
        ));
    }

    #[test]
    fn canonical_counter_encoding() {
        assert_eq!(MetricValue::Counter(42).to_string(), "42");
        assert_eq!(MetricValue::Counter(-3).to_string(), "-3");
        assert_eq!(MetricValue::Counter(0).to_string(), "0");
    }

    #[test]
    fn canonical_gauge_encoding_has_no_exponent() {
        assert_eq!(MetricValue::Gauge(11.123).to_string(), "11.123");
        assert_eq!(MetricValue::Gauge(0.0000001).to_string(), "0.0000001");
        assert_eq!(MetricValue::Gauge(-9.0).to_string(), "-9");
    }

    #[test]
    fn parse_restores_exact_value() {
        let g = MetricValue::Gauge(11.123);
        assert_eq!(MetricValue::parse(MetricKind::Gauge, &g.to_string()).unwrap(), g);

        let c = MetricValue::Counter(-17);
        assert_eq!(MetricValue::parse(MetricKind::Counter, &c.to_string()).unwrap(), c);
    }
}
