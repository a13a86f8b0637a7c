use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow};
use time::{Date, OffsetDateTime};

use crate::analysis::{SummaryKind, SummaryStat};
use crate::auth::repo_types::UserId;

pub type SynthesisId = i64;
pub type ReactionId = i64;
pub type ResultId = i64;

/// `YYYY-MM-DD` serde format for calendar dates.
pub mod iso_date {
    use serde::{de::Error as _, ser::Error as _, Deserialize, Deserializer, Serializer};
    use time::{format_description::FormatItem, macros::format_description, Date};

    const FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");

    pub fn serialize<S: Serializer>(date: &Date, s: S) -> Result<S::Ok, S::Error> {
        let text = date.format(FORMAT).map_err(S::Error::custom)?;
        s.serialize_str(&text)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Date, D::Error> {
        let text = String::deserialize(d)?;
        Date::parse(text.trim(), FORMAT).map_err(D::Error::custom)
    }
}

/// A prepared catalyst batch.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Synthesis {
    pub id: SynthesisId,
    pub user_id: UserId,
    #[serde(with = "iso_date")]
    pub date: Date,
    pub name: String,
    pub memo: String,
    pub amount: Option<f64>, // produced mass
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewSynthesis {
    #[serde(with = "iso_date")]
    pub date: Date,
    pub name: String,
    #[serde(default)]
    pub memo: String,
    pub amount: Option<f64>,
}

/// A run performed with one synthesis batch.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Reaction {
    pub id: ReactionId,
    pub user_id: UserId,
    pub synthesis_id: SynthesisId,
    #[serde(with = "iso_date")]
    pub date: Date,
    pub temperature: f64,
    pub pressure: Option<f64>,
    pub catalyst_amount: Option<f64>,
    pub lhsv: Option<f64>,
    pub memo: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewReaction {
    pub synthesis_id: SynthesisId,
    #[serde(with = "iso_date")]
    pub date: Date,
    pub temperature: f64,
    pub pressure: Option<f64>,
    pub catalyst_amount: Option<f64>,
    pub lhsv: Option<f64>,
    #[serde(default)]
    pub memo: String,
}

/// Reaction joined with the display fields of its synthesis.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct ReactionWithSynthesis {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub reaction: Reaction,
    pub synthesis_name: String,
    #[serde(with = "iso_date")]
    pub synthesis_date: Date,
}

#[derive(Debug, FromRow)]
pub(super) struct ResultRow {
    pub id: ResultId,
    pub reaction_id: ReactionId,
    pub user_id: UserId,
    pub time_series: Json<Vec<f64>>,
    pub metric_series: Json<Vec<f64>>,
    pub summary_kind: SummaryKind,
    pub summary_value: f64,
    pub plot_artifact: Option<Vec<u8>>,
    pub created_at: OffsetDateTime,
}

/// Measured outcome of a reaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRecord {
    pub id: ResultId,
    pub reaction_id: ReactionId,
    pub user_id: UserId,
    pub time_series: Vec<f64>,
    pub metric_series: Vec<f64>,
    pub summary: SummaryStat,
    #[serde(skip_serializing)]
    pub plot_artifact: Option<Vec<u8>>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<ResultRow> for ResultRecord {
    fn from(r: ResultRow) -> Self {
        Self {
            id: r.id,
            reaction_id: r.reaction_id,
            user_id: r.user_id,
            time_series: r.time_series.0,
            metric_series: r.metric_series.0,
            summary: SummaryStat {
                kind: r.summary_kind,
                value: r.summary_value,
            },
            plot_artifact: r.plot_artifact,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewResult {
    pub time_series: Vec<f64>,
    pub metric_series: Vec<f64>,
    pub summary: SummaryStat,
    pub plot_artifact: Option<Vec<u8>>,
}

/// Result row without its series, for overview listings.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct ResultListing {
    pub id: ResultId,
    pub reaction_id: ReactionId,
    #[serde(with = "iso_date")]
    pub reaction_date: Date,
    pub synthesis_name: String,
    pub summary_kind: SummaryKind,
    pub summary_value: f64,
    pub has_plot: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// What a cascading delete removed besides the target row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeleteSummary {
    pub reactions: u64,
    pub results: u64,
}

/// Whether a reaction keeps every uploaded result or only the latest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultPolicy {
    Append,
    ReplacePerReaction,
}

impl ResultPolicy {
    pub fn from_config(allow_multiple_results_per_reaction: bool) -> Self {
        if allow_multiple_results_per_reaction {
            ResultPolicy::Append
        } else {
            ResultPolicy::ReplacePerReaction
        }
    }
}
