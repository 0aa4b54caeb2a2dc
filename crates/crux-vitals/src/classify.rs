//! Histogram classification into good / needs-improvement / poor shares
//!
//! Boundaries follow the published Core Web Vitals categories, in the
//! metric's native unit (milliseconds for timings, unitless for layout
//! shift). A bin is classified by its upper bound only, so a bin straddling a
//! boundary counts entirely towards the worse bucket.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ClassifyError;
use crate::record::HistogramBin;

/// Upper bounds of the good and needs-improvement buckets
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub good_upper: f64,
    pub ok_upper: f64,
}

impl Thresholds {
    pub const fn new(good_upper: f64, ok_upper: f64) -> Self {
        Self {
            good_upper,
            ok_upper,
        }
    }
}

pub const LARGEST_CONTENTFUL_PAINT: &str = "largest_contentful_paint";
pub const INTERACTION_TO_NEXT_PAINT: &str = "interaction_to_next_paint";
pub const CUMULATIVE_LAYOUT_SHIFT: &str = "cumulative_layout_shift";
pub const FIRST_CONTENTFUL_PAINT: &str = "first_contentful_paint";
pub const TIME_TO_FIRST_BYTE: &str = "experimental_time_to_first_byte";
pub const FIRST_INPUT_DELAY: &str = "first_input_delay";

const THRESHOLDS: [(&str, Thresholds); 6] = [
    (LARGEST_CONTENTFUL_PAINT, Thresholds::new(2500.0, 4000.0)),
    (INTERACTION_TO_NEXT_PAINT, Thresholds::new(200.0, 500.0)),
    (CUMULATIVE_LAYOUT_SHIFT, Thresholds::new(0.1, 0.25)),
    (FIRST_CONTENTFUL_PAINT, Thresholds::new(1800.0, 3000.0)),
    (TIME_TO_FIRST_BYTE, Thresholds::new(800.0, 1800.0)),
    (FIRST_INPUT_DELAY, Thresholds::new(100.0, 300.0)),
];

/// Look up the boundaries for a metric by its API name
pub fn thresholds_for(metric: &str) -> Option<Thresholds> {
    THRESHOLDS
        .iter()
        .find(|(name, _)| *name == metric)
        .map(|(_, t)| *t)
}

/// Fraction of measurement mass per quality bucket
///
/// All three fields are `None` together when the metric has no defined
/// boundaries; that is persisted as `null` so it can never read as "0% good".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Shares {
    pub good: Option<f64>,
    pub ok: Option<f64>,
    pub poor: Option<f64>,
}

impl Shares {
    pub fn known(good: f64, ok: f64, poor: f64) -> Self {
        Self {
            good: Some(good),
            ok: Some(ok),
            poor: Some(poor),
        }
    }

    /// Sentinel for metrics without boundaries
    pub fn unknown() -> Self {
        Self {
            good: None,
            ok: None,
            poor: None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.good.is_none() && self.ok.is_none() && self.poor.is_none()
    }
}

/// Classify a histogram against explicit boundaries
pub fn classify_with(thresholds: Thresholds, bins: &[HistogramBin]) -> Shares {
    let (mut good, mut ok, mut poor) = (0.0_f64, 0.0_f64, 0.0_f64);

    for bin in bins {
        match bin.end {
            // open tail is never acceptable
            None => poor += bin.density,
            Some(end) if end <= thresholds.good_upper => good += bin.density,
            Some(end) if end <= thresholds.ok_upper => ok += bin.density,
            Some(_) => poor += bin.density,
        }
    }

    Shares::known(clamp_share(good), clamp_share(ok), clamp_share(poor))
}

/// Classify a metric's histogram using the built-in threshold table
pub fn try_classify(metric: &str, bins: &[HistogramBin]) -> Result<Shares, ClassifyError> {
    let thresholds =
        thresholds_for(metric).ok_or_else(|| ClassifyError::UnknownMetric(metric.to_string()))?;
    Ok(classify_with(thresholds, bins))
}

/// Like [`try_classify`], degrading unknown metrics to [`Shares::unknown`]
pub fn classify(metric: &str, bins: &[HistogramBin]) -> Shares {
    try_classify(metric, bins).unwrap_or_else(|e| {
        debug!(metric, "{}", e);
        Shares::unknown()
    })
}

/// Mass at or below a single boundary, for callers that only need a
/// pass/fail share
pub fn good_share(bins: &[HistogramBin], threshold: f64) -> f64 {
    let sum: f64 = bins
        .iter()
        .filter(|bin| matches!(bin.end, Some(end) if end <= threshold))
        .map(|bin| bin.density)
        .sum();
    clamp_share(sum)
}

fn clamp_share(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}
