//! Field-data record types as returned by the Chrome UX Report API
//!
//! The API is inconsistent about numeric encoding: timing metrics use JSON
//! numbers while layout shift uses decimal strings (`"0.10"`), and history
//! responses mark gaps with `"NaN"` or `null`. Every numeric field here goes
//! through the [`lenient`] decoders so callers only ever see `f64` or
//! `Option<f64>`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Device class a record is aggregated over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormFactor {
    /// Aggregated over every device class
    All,
    Phone,
    Desktop,
    Tablet,
}

impl FormFactor {
    /// Every form factor, in ingestion order
    pub const ALL_VARIANTS: [FormFactor; 4] = [
        FormFactor::All,
        FormFactor::Phone,
        FormFactor::Desktop,
        FormFactor::Tablet,
    ];

    /// Name used by the API
    ///
    /// `ALL_FORM_FACTORS` is never sent on the wire; the API aggregates over
    /// all devices when the field is omitted.
    pub fn api_name(&self) -> &'static str {
        match self {
            FormFactor::All => "ALL_FORM_FACTORS",
            FormFactor::Phone => "PHONE",
            FormFactor::Desktop => "DESKTOP",
            FormFactor::Tablet => "TABLET",
        }
    }

    /// Suffix used in snapshot document ids
    pub fn suffix(&self) -> &'static str {
        match self {
            FormFactor::All => "all",
            FormFactor::Phone => "phone",
            FormFactor::Desktop => "desktop",
            FormFactor::Tablet => "tablet",
        }
    }

    /// Value for the request body `formFactor` field
    pub fn request_value(&self) -> Option<&'static str> {
        match self {
            FormFactor::All => None,
            other => Some(other.api_name()),
        }
    }
}

impl fmt::Display for FormFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// A calendar date as reported by the API
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CalendarDate {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl CalendarDate {
    pub fn new(year: i32, month: u32, day: u32) -> Self {
        Self { year, month, day }
    }
}

impl fmt::Display for CalendarDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

/// The rolling aggregation window behind a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionPeriod {
    pub first_date: CalendarDate,
    pub last_date: CalendarDate,
}

/// One bin of a density histogram
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramBin {
    #[serde(default, deserialize_with = "lenient::or_zero")]
    pub start: f64,
    /// Upper bound; `None` is the open tail
    #[serde(
        default,
        deserialize_with = "lenient::optional",
        skip_serializing_if = "Option::is_none"
    )]
    pub end: Option<f64>,
    #[serde(default, deserialize_with = "lenient::or_zero")]
    pub density: f64,
}

impl HistogramBin {
    pub fn new(start: f64, end: Option<f64>, density: f64) -> Self {
        Self { start, end, density }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Percentiles {
    #[serde(default, deserialize_with = "lenient::optional")]
    pub p75: Option<f64>,
}

/// A single metric of a single-window record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MetricRecord {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub histogram: Vec<HistogramBin>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentiles: Option<Percentiles>,
    /// Payloads of non-histogram metrics (`fractions` and the like), kept as-is
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl MetricRecord {
    pub fn p75(&self) -> Option<f64> {
        self.percentiles.as_ref().and_then(|p| p.p75)
    }
}

/// Identifies what a record was aggregated for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RecordKey {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form_factor: Option<String>,
}

/// `queryRecord` response body
#[derive(Debug, Clone, Deserialize)]
pub struct RecordResponse {
    pub record: FieldRecord,
}

/// Latest-window record for one origin and form factor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldRecord {
    #[serde(default)]
    pub key: RecordKey,
    #[serde(default)]
    pub metrics: BTreeMap<String, MetricRecord>,
    pub collection_period: CollectionPeriod,
}

/// `queryHistoryRecord` response body
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryResponse {
    pub record: HistoryRecord,
}

/// Trailing windows for one origin, as parallel arrays aligned by index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    #[serde(default)]
    pub key: RecordKey,
    #[serde(default)]
    pub metrics: BTreeMap<String, MetricTimeseries>,
    #[serde(default)]
    pub collection_periods: Vec<CollectionPeriod>,
}

impl HistoryRecord {
    /// Number of windows every array can serve: the common prefix length of
    /// the periods and each metric's series
    ///
    /// Metrics without a percentile or histogram series do not constrain it.
    pub fn aligned_len(&self) -> usize {
        self.metrics
            .values()
            .filter_map(MetricTimeseries::series_len)
            .fold(self.collection_periods.len(), usize::min)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PercentilesTimeseries {
    #[serde(default, deserialize_with = "lenient::optional_vec")]
    pub p75s: Vec<Option<f64>>,
}

/// A histogram bin whose density is given per window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeseriesBin {
    #[serde(default, deserialize_with = "lenient::or_zero")]
    pub start: f64,
    #[serde(
        default,
        deserialize_with = "lenient::optional",
        skip_serializing_if = "Option::is_none"
    )]
    pub end: Option<f64>,
    #[serde(default, deserialize_with = "lenient::optional_vec")]
    pub densities: Vec<Option<f64>>,
}

/// A single metric of a history record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct MetricTimeseries {
    #[serde(default)]
    pub histogram_timeseries: Vec<TimeseriesBin>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentiles_timeseries: Option<PercentilesTimeseries>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl MetricTimeseries {
    /// Number of windows in the series, `None` when the metric carries
    /// neither percentiles nor a histogram
    ///
    /// The percentile array is authoritative when present; otherwise the
    /// longest density array.
    pub fn series_len(&self) -> Option<usize> {
        match &self.percentiles_timeseries {
            Some(p) => Some(p.p75s.len()),
            None => self
                .histogram_timeseries
                .iter()
                .map(|bin| bin.densities.len())
                .max(),
        }
    }

    /// The p75 of one window, if the source reported it
    pub fn p75_at(&self, index: usize) -> Option<f64> {
        self.percentiles_timeseries
            .as_ref()
            .and_then(|p| p.p75s.get(index).copied().flatten())
    }

    /// Project one window out of the series
    ///
    /// Missing densities count as zero mass. Other `*Timeseries` payloads are
    /// reduced to their value at `index` under the single-window name
    /// (`fractionTimeseries` becomes `fractions`).
    pub fn at(&self, index: usize) -> MetricRecord {
        let histogram = self
            .histogram_timeseries
            .iter()
            .map(|bin| HistogramBin {
                start: bin.start,
                end: bin.end,
                density: bin.densities.get(index).copied().flatten().unwrap_or(0.0),
            })
            .collect();

        MetricRecord {
            histogram,
            percentiles: self.percentiles_timeseries.as_ref().map(|_| Percentiles {
                p75: self.p75_at(index),
            }),
            other: project_other(&self.other, index),
        }
    }
}

fn project_other(other: &Map<String, Value>, index: usize) -> Map<String, Value> {
    other
        .iter()
        .map(|(key, value)| match key.strip_suffix("Timeseries") {
            Some("fraction") => ("fractions".to_string(), project_window(value, index)),
            Some(stem) => (stem.to_string(), project_window(value, index)),
            None => (key.clone(), value.clone()),
        })
        .collect()
}

/// Take element `index` of every array in `value`; a single-array wrapper
/// such as `{"fractions": [..]}` collapses to the element itself
fn project_window(value: &Value, index: usize) -> Value {
    match value {
        Value::Array(items) => items.get(index).cloned().unwrap_or(Value::Null),
        Value::Object(fields) => match fields.values().next() {
            Some(Value::Array(items)) if fields.len() == 1 => {
                items.get(index).cloned().unwrap_or(Value::Null)
            }
            _ => Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), project_window(v, index)))
                    .collect(),
            ),
        },
        scalar => scalar.clone(),
    }
}

/// Serde decoders for numbers that may arrive as JSON numbers, decimal
/// strings, `"NaN"` or `null`
mod lenient {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    #[derive(Deserialize)]
    struct Slot(#[serde(deserialize_with = "optional")] Option<f64>);

    fn decode<E: Error>(raw: Option<Raw>) -> Result<Option<f64>, E> {
        let value = match raw {
            None => return Ok(None),
            Some(Raw::Number(v)) => v,
            Some(Raw::Text(s)) => {
                let trimmed = s.trim();
                if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
                    return Ok(None);
                }
                trimmed
                    .parse::<f64>()
                    .map_err(|e| E::custom(format!("invalid number '{}': {}", s, e)))?
            }
        };
        Ok(value.is_finite().then_some(value))
    }

    pub fn optional<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        decode(Option::<Raw>::deserialize(deserializer)?)
    }

    pub fn or_zero<'de, D>(deserializer: D) -> Result<f64, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(optional(deserializer)?.unwrap_or(0.0))
    }

    pub fn optional_vec<'de, D>(deserializer: D) -> Result<Vec<Option<f64>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let slots = Option::<Vec<Slot>>::deserialize(deserializer)?.unwrap_or_default();
        Ok(slots.into_iter().map(|Slot(v)| v).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_calendar_date_is_zero_padded() {
        assert_eq!(CalendarDate::new(2024, 5, 4).to_string(), "2024-05-04");
        assert_eq!(CalendarDate::new(987, 12, 31).to_string(), "0987-12-31");
    }

    #[test]
    fn test_form_factor_request_value_omits_all() {
        assert_eq!(FormFactor::All.request_value(), None);
        assert_eq!(FormFactor::Phone.request_value(), Some("PHONE"));
        assert_eq!(FormFactor::Tablet.suffix(), "tablet");
    }

    #[test]
    fn test_parse_record_with_string_encoded_layout_shift() {
        let json = r#"{
            "record": {
                "key": { "origin": "https://www.example.com" },
                "metrics": {
                    "cumulative_layout_shift": {
                        "histogram": [
                            { "start": "0.00", "end": "0.10", "density": 0.8 },
                            { "start": "0.10", "end": "0.25", "density": 0.15 },
                            { "start": "0.25", "density": 0.05 }
                        ],
                        "percentiles": { "p75": "0.03" }
                    },
                    "navigation_types": {
                        "fractions": { "navigate": 0.7, "reload": 0.3 }
                    }
                },
                "collectionPeriod": {
                    "firstDate": { "year": 2024, "month": 4, "day": 7 },
                    "lastDate": { "year": 2024, "month": 5, "day": 4 }
                }
            }
        }"#;

        let response: RecordResponse = serde_json::from_str(json).unwrap();
        let record = response.record;
        assert_eq!(record.collection_period.last_date, CalendarDate::new(2024, 5, 4));

        let cls = &record.metrics["cumulative_layout_shift"];
        assert_eq!(cls.p75(), Some(0.03));
        assert_eq!(cls.histogram[0].end, Some(0.10));
        assert_eq!(cls.histogram[2].end, None);

        let nav = &record.metrics["navigation_types"];
        assert!(nav.histogram.is_empty());
        assert!(nav.other.contains_key("fractions"));
    }

    #[test]
    fn test_history_gaps_decode_as_missing() {
        let json = r#"{
            "histogramTimeseries": [
                { "start": 0, "end": 2500, "densities": [0.5, "NaN", null] },
                { "start": 2500, "densities": [0.5, 0.4] }
            ],
            "percentilesTimeseries": { "p75s": [2100, "NaN", 2300] }
        }"#;

        let series: MetricTimeseries = serde_json::from_str(json).unwrap();
        assert_eq!(series.series_len(), Some(3));
        assert_eq!(series.p75_at(1), None);
        assert_eq!(series.p75_at(2), Some(2300.0));

        let window = series.at(1);
        assert_eq!(window.histogram[0].density, 0.0);
        assert_eq!(window.histogram[1].density, 0.4);
        assert_eq!(window.p75(), None);

        let tail_gap = series.at(2);
        assert_eq!(tail_gap.histogram[1].density, 0.0);
    }

    #[test]
    fn test_aligned_len_truncates_to_shortest() {
        let period = CollectionPeriod {
            first_date: CalendarDate::new(2024, 1, 1),
            last_date: CalendarDate::new(2024, 1, 28),
        };
        let mut record = HistoryRecord {
            key: RecordKey::default(),
            metrics: BTreeMap::new(),
            collection_periods: vec![period; 5],
        };
        assert_eq!(record.aligned_len(), 5);

        record.metrics.insert(
            "largest_contentful_paint".to_string(),
            MetricTimeseries {
                percentiles_timeseries: Some(PercentilesTimeseries {
                    p75s: vec![Some(1.0); 3],
                }),
                ..Default::default()
            },
        );
        assert_eq!(record.aligned_len(), 3);
    }

    #[test]
    fn test_aligned_len_ignores_metrics_without_series() {
        let json = r#"{
            "key": { "origin": "https://example.com" },
            "metrics": {
                "largest_contentful_paint": {
                    "percentilesTimeseries": { "p75s": [2100, 2200, 2300] }
                },
                "navigation_types": {
                    "fractionTimeseries": {
                        "navigate": { "fractions": [0.7, 0.6, 0.5] },
                        "reload": { "fractions": [0.3, 0.4, "NaN"] }
                    }
                }
            },
            "collectionPeriods": [
                { "firstDate": { "year": 2024, "month": 1, "day": 1 },
                  "lastDate": { "year": 2024, "month": 1, "day": 28 } },
                { "firstDate": { "year": 2024, "month": 1, "day": 8 },
                  "lastDate": { "year": 2024, "month": 2, "day": 4 } },
                { "firstDate": { "year": 2024, "month": 1, "day": 15 },
                  "lastDate": { "year": 2024, "month": 2, "day": 11 } }
            ]
        }"#;

        let record: HistoryRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.metrics["navigation_types"].series_len(), None);
        assert_eq!(record.aligned_len(), 3);
    }

    #[test]
    fn test_window_keeps_fraction_timeseries() {
        let json = r#"{
            "fractionTimeseries": {
                "navigate": { "fractions": [0.7, 0.6] },
                "reload": { "fractions": [0.3, 0.4] }
            },
            "unit": "fraction"
        }"#;

        let series: MetricTimeseries = serde_json::from_str(json).unwrap();
        let window = series.at(1);
        assert!(window.histogram.is_empty());
        assert_eq!(
            Value::Object(window.other),
            serde_json::json!({
                "fractions": { "navigate": 0.6, "reload": 0.4 },
                "unit": "fraction"
            })
        );

        let past_end = series.at(5);
        assert_eq!(past_end.other["fractions"]["navigate"], Value::Null);
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        let result = serde_json::from_str::<HistogramBin>(r#"{"start": "abc", "density": 1}"#);
        assert!(result.is_err());
    }
}
