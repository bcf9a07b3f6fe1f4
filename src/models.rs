use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ImporterError, Result};

/// Field-name to value mapping used for pipeline rows and plugin config.
pub type Row = serde_json::Map<String, Value>;

pub const TIMESTAMP_FIELD: &str = "timestamp";
pub const DURATION_FIELD: &str = "duration";
pub const DURATION_ROLLUP_FIELD: &str = "duration-rollup";

/// A validated pipeline input row.
///
/// The raw fields are kept as received; `timestamp` and `duration` are parsed
/// once so the measurement window can be derived without re-reading the map.
#[derive(Debug, Clone)]
pub struct InputRow {
    fields: Row,
    timestamp: DateTime<Utc>,
    duration: f64,
    window_end_secs: i64,
    window_end_millis: i64,
}

impl InputRow {
    pub fn fields(&self) -> &Row {
        &self.fields
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Query range start, whole seconds since epoch.
    pub fn window_start_secs(&self) -> i64 {
        self.timestamp.timestamp_millis().div_euclid(1000)
    }

    /// Query range end, whole seconds since epoch.
    pub fn window_end_secs(&self) -> i64 {
        self.window_end_secs
    }

    /// Exact end of the measurement window in milliseconds.
    pub fn window_end_millis(&self) -> i64 {
        self.window_end_millis
    }
}

/// Adds a non-negative float offset to an epoch value, failing when the result
/// does not fit in an `i64`.
fn offset_epoch(base: i64, offset: f64) -> Option<i64> {
    if offset >= i64::MAX as f64 {
        return None;
    }
    base.checked_add(offset as i64)
}

impl TryFrom<Row> for InputRow {
    type Error = ImporterError;

    fn try_from(fields: Row) -> Result<Self> {
        let timestamp = match fields.get(TIMESTAMP_FIELD) {
            Some(Value::String(raw)) => DateTime::parse_from_rfc3339(raw)
                .map_err(|e| {
                    ImporterError::InvalidInput(format!("timestamp '{}' is not ISO-8601: {}", raw, e))
                })?
                .with_timezone(&Utc),
            Some(other) => {
                return Err(ImporterError::InvalidInput(format!(
                    "timestamp must be a string, got {}",
                    other
                )))
            }
            None => {
                return Err(ImporterError::InvalidInput(
                    "timestamp is missing".to_string(),
                ))
            }
        };

        let duration = fields
            .get(DURATION_FIELD)
            .and_then(Value::as_f64)
            .ok_or_else(|| ImporterError::InvalidInput("duration must be a number".to_string()))?;
        if duration <= 0.0 || !duration.is_finite() {
            return Err(ImporterError::InvalidInput(format!(
                "duration must be positive, got {}",
                duration
            )));
        }

        let start_millis = timestamp.timestamp_millis();
        let (window_end_secs, window_end_millis) = offset_epoch(
            start_millis.div_euclid(1000),
            duration.ceil(),
        )
        .zip(offset_epoch(start_millis, (duration * 1000.0).round()))
        .ok_or_else(|| {
            ImporterError::InvalidInput(format!("duration {} overflows the query window", duration))
        })?;

        Ok(Self {
            fields,
            timestamp,
            duration,
            window_end_secs,
            window_end_millis,
        })
    }
}

/// Formats epoch milliseconds the way pipeline timestamps are written,
/// e.g. `2024-06-10T05:00:00.000Z`.
pub fn to_iso8601(timestamp_millis: i64) -> String {
    match Utc.timestamp_millis_opt(timestamp_millis).single() {
        Some(instant) => instant.to_rfc3339_opts(SecondsFormat::Millis, true),
        None => timestamp_millis.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub timestamp_millis: i64,
    pub value: Option<f64>,
}

impl SeriesPoint {
    pub fn new(timestamp_millis: i64, value: f64) -> Self {
        Self {
            timestamp_millis,
            value: Some(value),
        }
    }
}

// Wire format is a two-element array `[timestamp_ms, value]`; the timestamp
// arrives as a float and the value may be null.
impl<'de> Deserialize<'de> for SeriesPoint {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let (timestamp, value): (Option<f64>, Option<f64>) = Deserialize::deserialize(deserializer)?;
        let timestamp = timestamp.ok_or_else(|| de::Error::custom("point timestamp is null"))?;
        Ok(SeriesPoint {
            timestamp_millis: timestamp as i64,
            value,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Series {
    #[serde(default)]
    pub tag_set: Vec<String>,
    #[serde(default, rename = "pointlist")]
    pub points: Vec<SeriesPoint>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub series: Vec<Series>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginMetadata {
    pub kind: String,
}
