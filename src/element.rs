use std::f64;
use std::time::{SystemTime, UNIX_EPOCH};

use num_traits::ToPrimitive;


/// A single measurement to be sent to carbon
///
/// Records are immutable once built, the encoder only reads them.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRecord {
    name: String,
    value: f64,
    timestamp: i64,
    tags: Vec<(String, String)>,
}

impl MetricRecord {
    /// Create a record with an explicit unix timestamp (in seconds)
    ///
    /// Any numeric value is accepted. Values that can't be represented as
    /// `f64` become NaN and are dropped by the encoder.
    pub fn new<N, V>(name: N, value: V, timestamp: i64) -> MetricRecord
        where N: Into<String>, V: ToPrimitive,
    {
        MetricRecord {
            name: name.into(),
            value: value.to_f64().unwrap_or(f64::NAN),
            timestamp: timestamp,
            tags: Vec::new(),
        }
    }

    /// Create a record at the specified time
    ///
    /// Times before the unix epoch give negative timestamps.
    pub fn at<N, V>(name: N, value: V, ts: SystemTime) -> MetricRecord
        where N: Into<String>, V: ToPrimitive,
    {
        let secs = match ts.duration_since(UNIX_EPOCH) {
            Ok(dur) => dur.as_secs() as i64,
            Err(e) => -(e.duration().as_secs() as i64),
        };
        MetricRecord::new(name, value, secs)
    }

    /// Create a record stamped with the current time
    pub fn now<N, V>(name: N, value: V) -> MetricRecord
        where N: Into<String>, V: ToPrimitive,
    {
        MetricRecord::at(name, value, SystemTime::now())
    }

    /// Add a tag, tags keep their insertion order
    pub fn tag<K, V>(mut self, key: K, value: V) -> MetricRecord
        where K: Into<String>, V: Into<String>,
    {
        self.tags.push((key.into(), value.into()));
        self
    }

    /// Metric name (path without tags)
    pub fn name(&self) -> &str {
        &self.name
    }
    /// Value of the measurement
    pub fn value(&self) -> f64 {
        self.value
    }
    /// Unix timestamp in seconds
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }
    /// Tags in the order they were added
    pub fn tags(&self) -> &[(String, String)] {
        &self.tags
    }
}
