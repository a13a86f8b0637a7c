//! Statistics and plotting over uploaded result series.

mod plot;
mod savgol;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

pub use plot::{render_line_plot, PlotLabels};
pub use savgol::savgol_filter;

/// Which statistic summarises a result's metric series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum SummaryKind {
    Max,
    Mean,
}

impl SummaryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SummaryKind::Max => "max",
            SummaryKind::Mean => "mean",
        }
    }
}

impl fmt::Display for SummaryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SummaryKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "max" => Ok(SummaryKind::Max),
            "mean" => Ok(SummaryKind::Mean),
            other => Err(StoreError::validation(format!(
                "unknown summary statistic '{other}' (expected max or mean)"
            ))),
        }
    }
}

/// Derived summary of a metric series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SummaryStat {
    pub kind: SummaryKind,
    pub value: f64,
}

impl SummaryStat {
    /// `None` when the series is empty.
    pub fn compute(kind: SummaryKind, series: &[f64]) -> Option<Self> {
        let value = match kind {
            SummaryKind::Max => max(series)?,
            SummaryKind::Mean => mean(series)?,
        };
        Some(Self { kind, value })
    }
}

pub fn mean(series: &[f64]) -> Option<f64> {
    if series.is_empty() {
        return None;
    }
    Some(series.iter().sum::<f64>() / series.len() as f64)
}

pub fn max(series: &[f64]) -> Option<f64> {
    series.iter().copied().reduce(f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_and_max() {
        let s = [10.0, 25.0, 40.0];
        assert_eq!(mean(&s), Some(25.0));
        assert_eq!(max(&s), Some(40.0));
        assert_eq!(mean(&[]), None);
        assert_eq!(max(&[]), None);
    }

    #[test]
    fn summary_compute_uses_kind() {
        let s = [1.0, 2.0, 6.0];
        assert_eq!(
            SummaryStat::compute(SummaryKind::Max, &s),
            Some(SummaryStat { kind: SummaryKind::Max, value: 6.0 })
        );
        assert_eq!(
            SummaryStat::compute(SummaryKind::Mean, &s),
            Some(SummaryStat { kind: SummaryKind::Mean, value: 3.0 })
        );
        assert_eq!(SummaryStat::compute(SummaryKind::Mean, &[]), None);
    }

    #[test]
    fn summary_kind_parses_case_insensitively() {
        assert_eq!("MAX".parse::<SummaryKind>().unwrap(), SummaryKind::Max);
        assert_eq!(" mean ".parse::<SummaryKind>().unwrap(), SummaryKind::Mean);
        assert!(matches!(
            "median".parse::<SummaryKind>(),
            Err(StoreError::Validation(_))
        ));
    }

    #[test]
    fn summary_kind_serializes_lowercase() {
        let json = serde_json::to_string(&SummaryKind::Mean).unwrap();
        assert_eq!(json, "\"mean\"");
    }
}
