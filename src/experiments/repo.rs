use sqlx::{sqlite::SqliteExecutor, types::Json, SqlitePool};
use time::OffsetDateTime;
use tracing::debug;

use super::repo_types::{
    DeleteSummary, NewReaction, NewResult, NewSynthesis, Reaction, ReactionId,
    ReactionWithSynthesis, ResultId, ResultListing, ResultPolicy, ResultRecord, ResultRow,
    Synthesis, SynthesisId,
};
use crate::auth::repo_types::UserId;
use crate::error::StoreError;

fn check_quantity(field: &str, value: Option<f64>) -> Result<(), StoreError> {
    match value {
        Some(v) if !v.is_finite() || v < 0.0 => Err(StoreError::validation(format!(
            "{field} must be a non-negative number"
        ))),
        _ => Ok(()),
    }
}

fn check_series(time_series: &[f64], metric_series: &[f64]) -> Result<(), StoreError> {
    if time_series.is_empty() || metric_series.is_empty() {
        return Err(StoreError::validation("result series must not be empty"));
    }
    if time_series.len() != metric_series.len() {
        return Err(StoreError::validation(format!(
            "time series has {} samples but metric series has {}",
            time_series.len(),
            metric_series.len()
        )));
    }
    if time_series.iter().chain(metric_series).any(|v| !v.is_finite()) {
        return Err(StoreError::validation("result series must be finite numbers"));
    }
    Ok(())
}

// ---- Synthesis ----

pub async fn add_synthesis(
    db: &SqlitePool,
    user_id: UserId,
    new: &NewSynthesis,
) -> Result<Synthesis, StoreError> {
    if new.name.trim().is_empty() {
        return Err(StoreError::validation("catalyst name must not be empty"));
    }
    check_quantity("amount", new.amount)?;

    let row = sqlx::query_as::<_, Synthesis>(
        r#"
        INSERT INTO synthesis (user_id, date, name, memo, amount, created_at)
        SELECT u.id, ?2, ?3, ?4, ?5, ?6
          FROM users u
         WHERE u.id = ?1
        RETURNING id, user_id, date, name, memo, amount, created_at
        "#,
    )
    .bind(user_id)
    .bind(new.date)
    .bind(&new.name)
    .bind(&new.memo)
    .bind(new.amount)
    .bind(OffsetDateTime::now_utc())
    .fetch_optional(db)
    .await?
    .ok_or(StoreError::NotFound("user"))?;

    debug!(user_id, synthesis_id = row.id, "synthesis added");
    Ok(row)
}

/// All syntheses of a user in creation order.
pub async fn list_synthesis(db: &SqlitePool, user_id: UserId) -> Result<Vec<Synthesis>, StoreError> {
    let rows = sqlx::query_as::<_, Synthesis>(
        r#"
        SELECT id, user_id, date, name, memo, amount, created_at
          FROM synthesis
         WHERE user_id = ?1
         ORDER BY id ASC
        "#,
    )
    .bind(user_id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

/// Delete a synthesis together with its reactions and their results.
///
/// Every statement in the transaction is a write scoped to the owner, so the
/// write lock is taken by the first one and a busy database is waited on
/// rather than failing a read-to-write upgrade.
pub async fn delete_synthesis(
    db: &SqlitePool,
    user_id: UserId,
    synthesis_id: SynthesisId,
) -> Result<DeleteSummary, StoreError> {
    let mut tx = db.begin().await?;

    let results = sqlx::query(
        r#"
        DELETE FROM results
         WHERE reaction_id IN (
               SELECT r.id
                 FROM reaction r
                 JOIN synthesis s ON s.id = r.synthesis_id
                WHERE s.id = ?1 AND s.user_id = ?2)
        "#,
    )
    .bind(synthesis_id)
    .bind(user_id)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    let reactions = sqlx::query(
        r#"
        DELETE FROM reaction
         WHERE synthesis_id IN (SELECT id FROM synthesis WHERE id = ?1 AND user_id = ?2)
        "#,
    )
    .bind(synthesis_id)
    .bind(user_id)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    let deleted = sqlx::query("DELETE FROM synthesis WHERE id = ?1 AND user_id = ?2")
        .bind(synthesis_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    if deleted == 0 {
        // Nothing above matched either; dropping `tx` rolls back.
        return Err(StoreError::NotFound("synthesis"));
    }

    tx.commit().await?;
    debug!(user_id, synthesis_id, reactions, results, "synthesis deleted");
    Ok(DeleteSummary { reactions, results })
}

// ---- Reaction ----

/// Record a reaction against one of the user's own syntheses.
pub async fn add_reaction(
    db: &SqlitePool,
    user_id: UserId,
    new: &NewReaction,
) -> Result<Reaction, StoreError> {
    check_quantity("temperature", Some(new.temperature))?;
    check_quantity("pressure", new.pressure)?;
    check_quantity("catalyst amount", new.catalyst_amount)?;
    check_quantity("LHSV", new.lhsv)?;

    let row = sqlx::query_as::<_, Reaction>(
        r#"
        INSERT INTO reaction
            (user_id, synthesis_id, date, temperature, pressure, catalyst_amount, lhsv, memo, created_at)
        SELECT s.user_id, s.id, ?3, ?4, ?5, ?6, ?7, ?8, ?9
          FROM synthesis s
         WHERE s.id = ?2 AND s.user_id = ?1
        RETURNING id, user_id, synthesis_id, date, temperature, pressure, catalyst_amount, lhsv, memo, created_at
        "#,
    )
    .bind(user_id)
    .bind(new.synthesis_id)
    .bind(new.date)
    .bind(new.temperature)
    .bind(new.pressure)
    .bind(new.catalyst_amount)
    .bind(new.lhsv)
    .bind(&new.memo)
    .bind(OffsetDateTime::now_utc())
    .fetch_optional(db)
    .await?
    .ok_or(StoreError::NotFound("synthesis"))?;

    debug!(user_id, reaction_id = row.id, synthesis_id = row.synthesis_id, "reaction added");
    Ok(row)
}

/// Reactions of a user with the synthesis fields needed to label them.
pub async fn list_reactions_with_synthesis(
    db: &SqlitePool,
    user_id: UserId,
) -> Result<Vec<ReactionWithSynthesis>, StoreError> {
    let rows = sqlx::query_as::<_, ReactionWithSynthesis>(
        r#"
        SELECT r.id, r.user_id, r.synthesis_id, r.date, r.temperature, r.pressure,
               r.catalyst_amount, r.lhsv, r.memo, r.created_at,
               s.name AS synthesis_name, s.date AS synthesis_date
          FROM reaction r
          JOIN synthesis s ON s.id = r.synthesis_id
         WHERE r.user_id = ?1
         ORDER BY r.id ASC
        "#,
    )
    .bind(user_id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

/// Delete a reaction together with its results.
pub async fn delete_reaction(
    db: &SqlitePool,
    user_id: UserId,
    reaction_id: ReactionId,
) -> Result<DeleteSummary, StoreError> {
    let mut tx = db.begin().await?;

    let results = sqlx::query(
        r#"
        DELETE FROM results
         WHERE reaction_id IN (SELECT id FROM reaction WHERE id = ?1 AND user_id = ?2)
        "#,
    )
    .bind(reaction_id)
    .bind(user_id)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    let deleted = sqlx::query("DELETE FROM reaction WHERE id = ?1 AND user_id = ?2")
        .bind(reaction_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    if deleted == 0 {
        return Err(StoreError::NotFound("reaction"));
    }

    tx.commit().await?;
    debug!(user_id, reaction_id, results, "reaction deleted");
    Ok(DeleteSummary { reactions: 0, results })
}

// ---- Result ----

/// Attach a result to one of the user's reactions.
///
/// Under [`ResultPolicy::ReplacePerReaction`] an existing result is
/// overwritten in place and keeps its id.
pub async fn add_result(
    db: &SqlitePool,
    user_id: UserId,
    reaction_id: ReactionId,
    new: &NewResult,
    policy: ResultPolicy,
) -> Result<ResultRecord, StoreError> {
    check_series(&new.time_series, &new.metric_series)?;
    if !new.summary.value.is_finite() {
        return Err(StoreError::validation("summary statistic must be finite"));
    }

    let row = match policy {
        ResultPolicy::Append => insert_result(db, user_id, reaction_id, new).await?,
        ResultPolicy::ReplacePerReaction => {
            replace_result(db, user_id, reaction_id, new).await?
        }
    };

    debug!(user_id, reaction_id, result_id = row.id, ?policy, "result stored");
    Ok(row.into())
}

async fn insert_result<'e>(
    db: impl SqliteExecutor<'e>,
    user_id: UserId,
    reaction_id: ReactionId,
    new: &NewResult,
) -> Result<ResultRow, StoreError> {
    sqlx::query_as::<_, ResultRow>(
        r#"
        INSERT INTO results
            (reaction_id, user_id, time_series, metric_series, summary_kind, summary_value,
             plot_artifact, created_at)
        SELECT r.id, r.user_id, ?3, ?4, ?5, ?6, ?7, ?8
          FROM reaction r
         WHERE r.id = ?2 AND r.user_id = ?1
        RETURNING id, reaction_id, user_id, time_series, metric_series, summary_kind,
                  summary_value, plot_artifact, created_at
        "#,
    )
    .bind(user_id)
    .bind(reaction_id)
    .bind(Json(&new.time_series))
    .bind(Json(&new.metric_series))
    .bind(new.summary.kind)
    .bind(new.summary.value)
    .bind(new.plot_artifact.as_deref())
    .bind(OffsetDateTime::now_utc())
    .fetch_optional(db)
    .await?
    .ok_or(StoreError::NotFound("reaction"))
}

/// Overwrite the latest result of the reaction, or insert the first one.
///
/// The transaction opens with the owner-scoped `UPDATE`, so it holds the
/// write lock before reading anything.
async fn replace_result(
    db: &SqlitePool,
    user_id: UserId,
    reaction_id: ReactionId,
    new: &NewResult,
) -> Result<ResultRow, StoreError> {
    let mut tx = db.begin().await?;

    let updated = sqlx::query_as::<_, ResultRow>(
        r#"
        UPDATE results
           SET time_series = ?3, metric_series = ?4, summary_kind = ?5,
               summary_value = ?6, plot_artifact = ?7, created_at = ?8
         WHERE id = (SELECT MAX(id) FROM results WHERE reaction_id = ?1 AND user_id = ?2)
        RETURNING id, reaction_id, user_id, time_series, metric_series, summary_kind,
                  summary_value, plot_artifact, created_at
        "#,
    )
    .bind(reaction_id)
    .bind(user_id)
    .bind(Json(&new.time_series))
    .bind(Json(&new.metric_series))
    .bind(new.summary.kind)
    .bind(new.summary.value)
    .bind(new.plot_artifact.as_deref())
    .bind(OffsetDateTime::now_utc())
    .fetch_optional(&mut *tx)
    .await?;

    let row = match updated {
        Some(row) => {
            // Rows left over from append mode collapse into the kept one.
            sqlx::query("DELETE FROM results WHERE reaction_id = ?1 AND id <> ?2")
                .bind(reaction_id)
                .bind(row.id)
                .execute(&mut *tx)
                .await?;
            row
        }
        None => insert_result(&mut *tx, user_id, reaction_id, new).await?,
    };

    tx.commit().await?;
    Ok(row)
}

/// Latest result of one of the user's reactions.
pub async fn get_result(
    db: &SqlitePool,
    user_id: UserId,
    reaction_id: ReactionId,
) -> Result<Option<ResultRecord>, StoreError> {
    let row = sqlx::query_as::<_, ResultRow>(
        r#"
        SELECT id, reaction_id, user_id, time_series, metric_series, summary_kind,
               summary_value, plot_artifact, created_at
          FROM results
         WHERE reaction_id = ?1 AND user_id = ?2
         ORDER BY id DESC
         LIMIT 1
        "#,
    )
    .bind(reaction_id)
    .bind(user_id)
    .fetch_optional(db)
    .await?;
    Ok(row.map(ResultRecord::from))
}

pub async fn list_results(db: &SqlitePool, user_id: UserId) -> Result<Vec<ResultListing>, StoreError> {
    let rows = sqlx::query_as::<_, ResultListing>(
        r#"
        SELECT res.id, res.reaction_id, r.date AS reaction_date, s.name AS synthesis_name,
               res.summary_kind, res.summary_value,
               res.plot_artifact IS NOT NULL AS has_plot, res.created_at
          FROM results res
          JOIN reaction r ON r.id = res.reaction_id
          JOIN synthesis s ON s.id = r.synthesis_id
         WHERE res.user_id = ?1
         ORDER BY res.id ASC
        "#,
    )
    .bind(user_id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn delete_result(
    db: &SqlitePool,
    user_id: UserId,
    result_id: ResultId,
) -> Result<(), StoreError> {
    let done = sqlx::query("DELETE FROM results WHERE id = ?1 AND user_id = ?2")
        .bind(result_id)
        .bind(user_id)
        .execute(db)
        .await?;
    if done.rows_affected() == 0 {
        return Err(StoreError::NotFound("result"));
    }
    debug!(user_id, result_id, "result deleted");
    Ok(())
}
