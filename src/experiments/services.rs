use serde::Serialize;
use tracing::{info, warn};

use super::repo;
use super::repo_types::{NewResult, ReactionId, ResultRecord};
use super::upload::decode_csv;
use crate::analysis::{self, render_line_plot, savgol_filter, PlotLabels, SummaryKind, SummaryStat};
use crate::auth::repo_types::UserId;
use crate::error::StoreError;
use crate::state::AppState;

/// How one upload should be read and summarised. Unset fields fall back to
/// the configured defaults.
#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    pub time_column: Option<String>,
    pub metric_column: Option<String>,
    pub summary: Option<SummaryKind>,
    pub smoothing: Option<Smoothing>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Smoothing {
    pub window: usize,
    pub polyorder: usize,
}

/// Decode an uploaded CSV, summarise it, render its plot and store the result.
pub async fn ingest_upload(
    st: &AppState,
    user_id: UserId,
    reaction_id: ReactionId,
    body: &[u8],
    opts: UploadOptions,
) -> Result<ResultRecord, StoreError> {
    let defaults = &st.config.upload;
    let time_column = opts.time_column.as_deref().unwrap_or(&defaults.time_column);
    let metric_column = opts.metric_column.as_deref().unwrap_or(&defaults.metric_column);
    let kind = opts.summary.unwrap_or(defaults.summary);

    let decoded = decode_csv(body, time_column, metric_column)?;
    let summary = SummaryStat::compute(kind, &decoded.metric)
        .ok_or_else(|| StoreError::validation("metric series is empty"))?;

    let smoothed = match opts.smoothing {
        Some(s) => Some(savgol_filter(&decoded.metric, s.window, s.polyorder)?),
        None => None,
    };

    let title = format!("Reaction {reaction_id}");
    let plot_artifact = match render_line_plot(
        &decoded.time,
        &decoded.metric,
        smoothed.as_deref(),
        &PlotLabels {
            title: &title,
            x: time_column,
            y: metric_column,
        },
    ) {
        Ok(svg) => Some(svg),
        Err(e) => {
            // The series are still worth keeping without a picture.
            warn!(error = %e, reaction_id, "plot rendering failed");
            None
        }
    };

    let record = repo::add_result(
        &st.db,
        user_id,
        reaction_id,
        &NewResult {
            time_series: decoded.time,
            metric_series: decoded.metric,
            summary,
            plot_artifact,
        },
        st.result_policy(),
    )
    .await?;

    info!(
        user_id,
        reaction_id,
        result_id = record.id,
        samples = record.time_series.len(),
        summary = %record.summary.kind,
        value = record.summary.value,
        "result uploaded"
    );
    Ok(record)
}

/// Stored series next to its Savitzky-Golay smoothing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SmoothedSeries {
    pub reaction_id: ReactionId,
    pub window: usize,
    pub polyorder: usize,
    pub time: Vec<f64>,
    pub metric: Vec<f64>,
    pub smoothed: Vec<f64>,
    pub metric_mean: f64,
    pub smoothed_mean: f64,
}

pub async fn smoothed_result(
    st: &AppState,
    user_id: UserId,
    reaction_id: ReactionId,
    smoothing: Smoothing,
) -> Result<SmoothedSeries, StoreError> {
    let record = repo::get_result(&st.db, user_id, reaction_id)
        .await?
        .ok_or(StoreError::NotFound("result"))?;
    let smoothed = savgol_filter(&record.metric_series, smoothing.window, smoothing.polyorder)?;
    let metric_mean = analysis::mean(&record.metric_series).unwrap_or_default();
    let smoothed_mean = analysis::mean(&smoothed).unwrap_or_default();

    Ok(SmoothedSeries {
        reaction_id,
        window: smoothing.window,
        polyorder: smoothing.polyorder,
        time: record.time_series,
        metric: record.metric_series,
        smoothed,
        metric_mean,
        smoothed_mean,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::repo_types::User;
    use crate::experiments::repo_types::{NewReaction, NewSynthesis};
    use time::macros::date;

    async fn seeded() -> (AppState, UserId, ReactionId) {
        let st = AppState::for_tests().await;
        let u = User::create(&st.db, "alice", "h").await.unwrap().id;
        let s = repo::add_synthesis(
            &st.db,
            u,
            &NewSynthesis {
                date: date!(2024 - 01 - 01),
                name: "Pt/Al2O3".into(),
                memo: String::new(),
                amount: Some(5.0),
            },
        )
        .await
        .unwrap();
        let r = repo::add_reaction(
            &st.db,
            u,
            &NewReaction {
                synthesis_id: s.id,
                date: date!(2024 - 01 - 02),
                temperature: 350.0,
                pressure: None,
                catalyst_amount: Some(2.0),
                lhsv: None,
                memo: String::new(),
            },
        )
        .await
        .unwrap();
        (st, u, r.id)
    }

    const CSV: &[u8] = b"time,conversion\n1,10\n2,25\n3,40\n4,38\n5,41\n";

    #[tokio::test]
    async fn upload_stores_series_summary_and_plot() {
        let (st, u, r) = seeded().await;
        let record = ingest_upload(&st, u, r, CSV, UploadOptions::default()).await.unwrap();

        assert_eq!(record.time_series, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(record.summary, SummaryStat { kind: SummaryKind::Max, value: 41.0 });
        let svg = record.plot_artifact.expect("plot rendered");
        assert!(String::from_utf8(svg).unwrap().contains("<svg"));
    }

    #[tokio::test]
    async fn upload_honours_summary_and_column_overrides() {
        let (st, u, r) = seeded().await;
        let opts = UploadOptions {
            time_column: Some("t".into()),
            metric_column: Some("DoDH".into()),
            summary: Some(SummaryKind::Mean),
            smoothing: Some(Smoothing { window: 3, polyorder: 1 }),
        };
        let record = ingest_upload(&st, u, r, b"t,DoDH\n0,10\n1,20\n2,30\n", opts)
            .await
            .unwrap();
        assert_eq!(record.summary, SummaryStat { kind: SummaryKind::Mean, value: 20.0 });
    }

    #[tokio::test]
    async fn malformed_upload_never_reaches_the_store() {
        let (st, u, r) = seeded().await;
        let err = ingest_upload(&st, u, r, b"time,yield\n1,2\n", UploadOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert!(repo::get_result(&st.db, u, r).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upload_to_foreign_reaction_is_not_found() {
        let (st, _, r) = seeded().await;
        let intruder = User::create(&st.db, "mallory", "h").await.unwrap().id;
        let err = ingest_upload(&st, intruder, r, CSV, UploadOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound("reaction")));
    }

    #[tokio::test]
    async fn smoothing_view_reports_means() {
        let (st, u, r) = seeded().await;
        ingest_upload(&st, u, r, CSV, UploadOptions::default()).await.unwrap();

        let view = smoothed_result(&st, u, r, Smoothing { window: 3, polyorder: 1 })
            .await
            .unwrap();
        assert_eq!(view.smoothed.len(), 5);
        assert!((view.metric_mean - 30.8).abs() < 1e-9);
        // First window is exactly linear, so its samples survive unchanged.
        assert!((view.smoothed[0] - 10.0).abs() < 1e-9);
        assert!((view.smoothed[1] - 25.0).abs() < 1e-9);
        assert!((view.smoothed_mean - 29.833_333_333).abs() < 1e-6);
    }

    #[tokio::test]
    async fn smoothing_without_result_is_not_found() {
        let (st, u, r) = seeded().await;
        let err = smoothed_result(&st, u, r, Smoothing { window: 3, polyorder: 1 })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound("result")));
    }
}
