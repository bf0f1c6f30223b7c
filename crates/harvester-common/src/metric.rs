use crate::error::MetricError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Discriminator of a metric, as carried in the `type` JSON field and the
/// `/update/{kind}/...` path segment.
///
/// # Examples
///
/// ```
/// use harvester_common::MetricKind;
///
/// let kind: MetricKind = "counter".parse().unwrap();
/// assert_eq!(kind, MetricKind::Counter);
/// assert_eq!(kind.to_string(), "counter");
/// assert!("histogram".parse::<MetricKind>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Gauge,
    Counter,
}

impl MetricKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
        }
    }

    /// Parses a textual value (a path segment) into this kind's payload.
    pub fn parse_value(self, raw: &str) -> Result<MetricValue, MetricError> {
        let invalid = || MetricError::InvalidValue {
            kind: self.as_str(),
            raw: raw.to_string(),
        };
        match self {
            MetricKind::Gauge => raw
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(MetricValue::Gauge)
                .ok_or_else(invalid),
            MetricKind::Counter => raw
                .parse::<i64>()
                .map(MetricValue::Counter)
                .map_err(|_| invalid()),
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MetricKind {
    type Err = MetricError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gauge" => Ok(MetricKind::Gauge),
            "counter" => Ok(MetricKind::Counter),
            _ => Err(MetricError::UnknownKind(s.to_string())),
        }
    }
}

/// Payload of a metric. A Gauge holds an absolute reading, a Counter an
/// integer delta that accumulates in storage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Gauge(f64),
    Counter(i64),
}

impl MetricValue {
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricValue::Gauge(_) => MetricKind::Gauge,
            MetricValue::Counter(_) => MetricKind::Counter,
        }
    }

    /// Gauges must be finite: NaN and infinities have no JSON form.
    pub fn is_valid(&self) -> bool {
        match self {
            MetricValue::Gauge(v) => v.is_finite(),
            MetricValue::Counter(_) => true,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Gauge(v) => write!(f, "{v}"),
            MetricValue::Counter(d) => write!(f, "{d}"),
        }
    }
}

/// A named metric.
///
/// Serializes to `{"id": .., "type": "gauge"|"counter", "delta"|"value": ..}`
/// with exactly one payload field present.
///
/// # Examples
///
/// ```
/// use harvester_common::Metric;
///
/// let mut hits = Metric::counter("hits", 5);
/// hits.update(Metric::counter("hits", 7).value).unwrap();
/// assert_eq!(hits.render(), "12");
///
/// let json = serde_json::to_string(&hits).unwrap();
/// assert_eq!(json, r#"{"id":"hits","type":"counter","delta":12}"#);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "MetricWire", into = "MetricWire")]
pub struct Metric {
    pub id: String,
    pub value: MetricValue,
}

impl Metric {
    pub fn new(id: impl Into<String>, value: MetricValue) -> Self {
        Self {
            id: id.into(),
            value,
        }
    }

    pub fn gauge(id: impl Into<String>, value: f64) -> Self {
        Self::new(id, MetricValue::Gauge(value))
    }

    pub fn counter(id: impl Into<String>, delta: i64) -> Self {
        Self::new(id, MetricValue::Counter(delta))
    }

    pub fn kind(&self) -> MetricKind {
        self.value.kind()
    }

    /// Applies `incoming`: a Gauge is replaced, a Counter is incremented.
    /// A counter sum outside the `i64` range is rejected and leaves the
    /// stored value unchanged.
    ///
    /// Mixing kinds under one name is not guarded; the incoming payload
    /// replaces the stored one.
    pub fn update(&mut self, incoming: MetricValue) -> Result<(), MetricError> {
        match (&mut self.value, incoming) {
            (MetricValue::Counter(total), MetricValue::Counter(delta)) => {
                *total = total
                    .checked_add(delta)
                    .ok_or_else(|| MetricError::CounterOverflow {
                        id: self.id.clone(),
                    })?;
            }
            (current, incoming) => *current = incoming,
        }
        Ok(())
    }

    /// Rejects payloads that cannot be stored or serialized.
    pub fn validate(&self) -> Result<(), MetricError> {
        if self.value.is_valid() {
            Ok(())
        } else {
            Err(MetricError::InvalidValue {
                kind: self.kind().as_str(),
                raw: self.render(),
            })
        }
    }

    /// Canonical decimal text of the current value, as served by the
    /// plain-text and HTML endpoints.
    pub fn render(&self) -> String {
        self.value.to_string()
    }
}

/// Merges an incoming metric into the stored one. With nothing stored the
/// incoming metric is kept verbatim.
pub fn merge(existing: Option<Metric>, incoming: Metric) -> Result<Metric, MetricError> {
    incoming.validate()?;
    match existing {
        Some(mut stored) => {
            stored.update(incoming.value)?;
            Ok(stored)
        }
        None => Ok(incoming),
    }
}

/// Lookup request for `POST /value/`: only the name and kind are carried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricRequest {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl MetricRequest {
    pub fn kind(&self) -> Result<MetricKind, MetricError> {
        self.kind.parse()
    }
}

#[derive(Serialize, Deserialize)]
struct MetricWire {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    delta: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<f64>,
}

impl TryFrom<MetricWire> for Metric {
    type Error = MetricError;

    fn try_from(wire: MetricWire) -> Result<Self, Self::Error> {
        let kind: MetricKind = wire.kind.parse()?;
        let value = match kind {
            MetricKind::Gauge => wire.value.map(MetricValue::Gauge),
            MetricKind::Counter => wire.delta.map(MetricValue::Counter),
        };
        let value = value.ok_or_else(|| MetricError::MissingPayload {
            id: wire.id.clone(),
            kind: kind.as_str(),
            field: match kind {
                MetricKind::Gauge => "value",
                MetricKind::Counter => "delta",
            },
        })?;
        let metric = Metric { id: wire.id, value };
        metric.validate()?;
        Ok(metric)
    }
}

impl From<Metric> for MetricWire {
    fn from(metric: Metric) -> Self {
        let (delta, value) = match metric.value {
            MetricValue::Gauge(v) => (None, Some(v)),
            MetricValue::Counter(d) => (Some(d), None),
        };
        MetricWire {
            id: metric.id,
            kind: metric.value.kind().as_str().to_string(),
            delta,
            value,
        }
    }
}
