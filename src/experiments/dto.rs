use serde::{Deserialize, Serialize};

use super::repo_types::{DeleteSummary, ReactionWithSynthesis, ResultRecord, Synthesis};
use super::services::{Smoothing, UploadOptions};
use crate::analysis::SummaryKind;

/// Selector entry: the client keeps `id` and only ever displays `label`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectOption {
    pub id: i64,
    pub label: String,
}

impl From<&Synthesis> for SelectOption {
    fn from(s: &Synthesis) -> Self {
        Self {
            id: s.id,
            label: format!("{} - {}", s.date, s.name),
        }
    }
}

impl From<&ReactionWithSynthesis> for SelectOption {
    fn from(r: &ReactionWithSynthesis) -> Self {
        Self {
            id: r.reaction.id,
            label: format!(
                "{} - {} ({} °C)",
                r.reaction.date, r.synthesis_name, r.reaction.temperature
            ),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub id: i64,
    pub cascaded: DeleteSummary,
}

#[derive(Debug, Serialize)]
pub struct ResultDetails {
    #[serde(flatten)]
    pub result: ResultRecord,
    pub has_plot: bool,
}

impl From<ResultRecord> for ResultDetails {
    fn from(result: ResultRecord) -> Self {
        let has_plot = result.plot_artifact.is_some();
        Self { result, has_plot }
    }
}

/// Query string of `POST /reactions/:id/results`.
#[derive(Debug, Default, Deserialize)]
pub struct UploadParams {
    pub summary: Option<SummaryKind>,
    pub time_column: Option<String>,
    pub metric_column: Option<String>,
    pub window: Option<usize>,
    pub polyorder: Option<usize>,
}

impl From<UploadParams> for UploadOptions {
    fn from(p: UploadParams) -> Self {
        Self {
            time_column: p.time_column,
            metric_column: p.metric_column,
            summary: p.summary,
            smoothing: p.window.map(|window| Smoothing {
                window,
                polyorder: p.polyorder.unwrap_or(default_polyorder()),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SmoothingParams {
    #[serde(default = "default_window")]
    pub window: usize,
    #[serde(default = "default_polyorder")]
    pub polyorder: usize,
}

impl From<SmoothingParams> for Smoothing {
    fn from(p: SmoothingParams) -> Self {
        Self {
            window: p.window,
            polyorder: p.polyorder,
        }
    }
}

fn default_window() -> usize { 5 }
fn default_polyorder() -> usize { 2 }
