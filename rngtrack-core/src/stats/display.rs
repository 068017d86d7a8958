//! Display formatting and deviation classification.
//!
//! Rounding to two decimals happens only when producing strings. Bands are
//! classified on the unrounded value so a figure sitting on a threshold does
//! not flip between bands as it is re-rendered.
use serde::{Deserialize, Serialize};

use super::{Deviation, Rate, StatsReport};
use crate::config::DeviationThresholds;
use crate::numbers::round_2dp;

const NO_DATA: &str = "N/A";

impl Rate {
    /// `"15.00%"`, or `"N/A"` without data.
    #[must_use]
    pub fn display(self) -> String {
        match self {
            Self::NoData => NO_DATA.to_string(),
            Self::Observed(pct) => format!("{:.2}%", round_2dp(pct)),
        }
    }
}

/// Signed percentage-point deviation, e.g. `"+5.00%"`.
#[must_use]
pub fn format_points(points: Option<f64>) -> String {
    points.map_or_else(|| NO_DATA.to_string(), |value| format!("{}%", signed(value)))
}

/// Signed absolute-count deviation, e.g. `"+95.00"`.
#[must_use]
pub fn format_hits(hits: Option<f64>) -> String {
    hits.map_or_else(|| NO_DATA.to_string(), signed)
}

/// Expected rate as declared, trimmed of needless zeros (`"5%"`, `"12.5%"`).
#[must_use]
pub fn format_expected(expected_rate: f64) -> String {
    let rounded = round_2dp(expected_rate);
    let text = format!("{rounded:.2}");
    let text = text.trim_end_matches('0').trim_end_matches('.');
    format!("{text}%")
}

fn signed(value: f64) -> String {
    let rounded = round_2dp(value);
    if rounded.abs() < f64::EPSILON {
        "0.00".to_string()
    } else {
        format!("{rounded:+.2}")
    }
}

/// Display color bucket for a deviation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviationBand {
    NoData,
    AsExpected,
    Above,
    Below,
    FarAbove,
    FarBelow,
}

impl DeviationBand {
    #[must_use]
    pub fn for_points(points: Option<f64>, thresholds: &DeviationThresholds) -> Self {
        points.map_or(Self::NoData, |value| {
            Self::classify(value, thresholds.notable_points, thresholds.large_points)
        })
    }

    #[must_use]
    pub fn for_hits(hits: Option<f64>, thresholds: &DeviationThresholds) -> Self {
        hits.map_or(Self::NoData, |value| {
            Self::classify(value, thresholds.notable_hits, thresholds.large_hits)
        })
    }

    fn classify(value: f64, notable: f64, large: f64) -> Self {
        if !value.is_finite() {
            return Self::NoData;
        }
        if value >= large {
            Self::FarAbove
        } else if value <= -large {
            Self::FarBelow
        } else if value >= notable {
            Self::Above
        } else if value <= -notable {
            Self::Below
        } else {
            Self::AsExpected
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::NoData => "no data",
            Self::AsExpected => "as expected",
            Self::Above => "above expected",
            Self::Below => "below expected",
            Self::FarAbove => "far above expected",
            Self::FarBelow => "far below expected",
        }
    }
}

/// One ready-to-render line of a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayRow {
    pub name: String,
    pub count: u64,
    pub actual: String,
    pub expected: String,
    pub deviation: String,
    pub band: DeviationBand,
}

/// Summary line for binary events (`None` for multi-outcome reports).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitsLine {
    pub success_count: u64,
    pub total_attempts: u64,
    pub expected_hits: String,
    pub deviation: String,
    pub band: DeviationBand,
}

impl StatsReport {
    /// Per-outcome rows. Binary reports leave the per-row deviation as `N/A`
    /// and carry their figure in [`StatsReport::hits_line`].
    #[must_use]
    pub fn display_rows(&self, thresholds: &DeviationThresholds) -> Vec<DisplayRow> {
        self.outcomes
            .iter()
            .map(|stats| {
                let points = self.point_deviation(stats.outcome_id);
                let band = match self.deviation {
                    Deviation::PercentagePoints { .. } => {
                        DeviationBand::for_points(points, thresholds)
                    }
                    Deviation::AbsoluteCount(_) => DeviationBand::NoData,
                };
                DisplayRow {
                    name: stats.name.clone(),
                    count: stats.count,
                    actual: stats.actual_rate.display(),
                    expected: format_expected(stats.expected_rate),
                    deviation: format_points(points),
                    band,
                }
            })
            .collect()
    }

    #[must_use]
    pub fn hits_line(&self, thresholds: &DeviationThresholds) -> Option<HitsLine> {
        self.hit_deviation().map(|hits| HitsLine {
            success_count: hits.success_count,
            total_attempts: hits.total_attempts,
            expected_hits: format!("{:.2}", round_2dp(hits.expected_hits)),
            deviation: format_hits(hits.deviation),
            band: DeviationBand::for_hits(hits.deviation, thresholds),
        })
    }
}
