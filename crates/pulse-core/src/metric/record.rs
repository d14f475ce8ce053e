//! Named metric records and their JSON wire encoding

use serde::{Deserialize, Serialize};

use crate::error::{PulseError, PulseResult};
use crate::metric::{MetricKind, MetricValue};

/// A named, typed metric value.
///
/// Records are immutable value objects; storage identity is the
/// `(name, kind)` pair, encoded as the composite key `"<name>_<kind>"`.
/// Two records with the same name but different kinds are distinct
/// storage entities.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    name: String,
    value: MetricValue,
}

impl Record {
    /// Create a new record
    pub fn new(name: impl Into<String>, value: MetricValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    /// Metric name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Metric value
    pub fn value(&self) -> MetricValue {
        self.value
    }

    /// Kind of the stored value
    pub fn kind(&self) -> MetricKind {
        self.value.kind()
    }

    /// Composite storage key: `"<name>_<kind>"`
    pub fn storage_key(&self) -> String {
        format!("{}_{}", self.name, self.kind())
    }

    /// Apply the per-kind merge rule against an incoming push.
    ///
    /// Counters accumulate; gauges (and any kind change) take the
    /// incoming value.
    pub fn merged_with(&self, incoming: &Record) -> Record {
        let value = match (self.value, incoming.value) {
            (MetricValue::Counter(prev), MetricValue::Counter(next)) => {
                MetricValue::Counter(prev.wrapping_add(next))
            }
            (_, next) => next,
        };
        Record::new(incoming.name.clone(), value)
    }

    /// Encode into the wire form, optionally attaching a signature
    pub fn to_wire(&self, hash: Option<String>) -> RecordWire {
        let (delta, value) = match self.value {
            MetricValue::Counter(v) => (Some(v), None),
            MetricValue::Gauge(v) => (None, Some(v)),
        };
        RecordWire {
            id: self.name.clone(),
            kind: self.kind(),
            delta,
            value,
            hash,
        }
    }
}

/// JSON wire encoding of a [`Record`].
///
/// Exactly one of `delta`/`value` is populated, selected by `type`;
/// `hash` carries the hex HMAC digest when signing is enabled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordWire {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MetricKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

impl TryFrom<&RecordWire> for Record {
    type Error = PulseError;

    fn try_from(wire: &RecordWire) -> PulseResult<Self> {
        // Exactly one numeric field may be populated, selected by the kind.
        let value = match wire.kind {
            MetricKind::Counter => {
                if wire.value.is_some() {
                    return Err(PulseError::incomplete(format!(
                        "counter {:?} carries a gauge value field",
                        wire.id
                    )));
                }
                MetricValue::Counter(wire.delta.ok_or_else(|| {
                    PulseError::incomplete(format!("counter {:?} is missing delta", wire.id))
                })?)
            }
            MetricKind::Gauge => {
                if wire.delta.is_some() {
                    return Err(PulseError::incomplete(format!(
                        "gauge {:?} carries a counter delta field",
                        wire.id
                    )));
                }
                MetricValue::Gauge(wire.value.ok_or_else(|| {
                    PulseError::incomplete(format!("gauge {:?} is missing value", wire.id))
                })?)
            }
        };
        Ok(Record::new(wire.id.clone(), value))
    }
}

impl TryFrom<RecordWire> for Record {
    type Error = PulseError;

    fn try_from(wire: RecordWire) -> PulseResult<Self> {
        Record::try_from(&wire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_key_carries_the_kind() {
        let counter = Record::new("PollCount", MetricValue::Counter(1));
        let gauge = Record::new("PollCount", MetricValue::Gauge(1.0));
        assert_eq!(counter.storage_key(), "PollCount_counter");
        assert_eq!(gauge.storage_key(), "PollCount_gauge");
        assert_ne!(counter.storage_key(), gauge.storage_key());
    }

    #[test]
    fn counter_merge_accumulates() {
        let stored = Record::new("PollCount", MetricValue::Counter(10));
        let incoming = Record::new("PollCount", MetricValue::Counter(5));
        let merged = stored.merged_with(&incoming);
        assert_eq!(merged.value(), MetricValue::Counter(15));
    }

    #[test]
    fn gauge_merge_overwrites() {
        let stored = Record::new("Alloc", MetricValue::Gauge(11.123));
        let incoming = Record::new("Alloc", MetricValue::Gauge(9.0));
        let merged = stored.merged_with(&incoming);
        assert_eq!(merged.value(), MetricValue::Gauge(9.0));
    }

    #[test]
    fn wire_round_trip() {
        for record in [
            Record::new("PollCount", MetricValue::Counter(10)),
            Record::new("Zero", MetricValue::Counter(0)),
            Record::new("Neg", MetricValue::Counter(-42)),
            Record::new("Alloc", MetricValue::Gauge(11.123)),
            Record::new("Freed", MetricValue::Gauge(-0.5)),
        ] {
            let json = serde_json::to_string(&record.to_wire(None)).unwrap();
            let wire: RecordWire = serde_json::from_str(&json).unwrap();
            assert_eq!(Record::try_from(&wire).unwrap(), record);
        }
    }

    #[test]
    fn wire_json_shape() {
        let wire = Record::new("PollCount", MetricValue::Counter(10)).to_wire(None);
        let json = serde_json::to_value(&wire).unwrap();
        assert_eq!(json["id"], "PollCount");
        assert_eq!(json["type"], "counter");
        assert_eq!(json["delta"], 10);
        assert!(json.get("value").is_none());
        assert!(json.get("hash").is_none());
    }

    #[test]
    fn missing_numeric_field_is_incomplete() {
        let wire = RecordWire {
            id: "PollCount".into(),
            kind: MetricKind::Counter,
            delta: None,
            value: None,
            hash: None,
        };
        assert!(matches!(
            Record::try_from(&wire),
            Err(PulseError::IncompleteRequest(_))
        ));
    }

    #[test]
    fn both_numeric_fields_populated_is_rejected() {
        for kind in [MetricKind::Counter, MetricKind::Gauge] {
            let wire = RecordWire {
                id: "PollCount".into(),
                kind,
                delta: Some(1),
                value: Some(1.0),
                hash: None,
            };
            assert!(matches!(
                Record::try_from(&wire),
                Err(PulseError::IncompleteRequest(_))
            ));
        }
    }
}
