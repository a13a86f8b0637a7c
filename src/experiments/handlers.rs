use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use tracing::{instrument, warn};

use crate::{auth::jwt::AuthUser, error::store_error, state::AppState};

use super::dto::{DeletedResponse, ResultDetails, SelectOption, SmoothingParams, UploadParams};
use super::repo;
use super::repo_types::{
    NewReaction, NewSynthesis, Reaction, ReactionId, ReactionWithSynthesis, ResultId,
    ResultListing, Synthesis, SynthesisId,
};
use super::services::{ingest_upload, smoothed_result, SmoothedSeries};

const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

pub fn synthesis_routes() -> Router<AppState> {
    Router::new()
        .route("/synthesis", get(list_synthesis).post(create_synthesis))
        .route("/synthesis/options", get(synthesis_options))
        .route("/synthesis/:id", delete(delete_synthesis))
}

pub fn reaction_routes() -> Router<AppState> {
    Router::new()
        .route("/reactions", get(list_reactions).post(create_reaction))
        .route("/reactions/options", get(reaction_options))
        .route("/reactions/:id", delete(delete_reaction))
}

pub fn result_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/reactions/:id/results",
            post(upload_result).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/reactions/:id/result", get(get_result))
        .route("/reactions/:id/result/plot", get(get_result_plot))
        .route("/reactions/:id/result/smoothed", get(get_smoothed))
        .route("/results", get(list_results))
        .route("/results/:id", delete(delete_result))
}

// ---- synthesis ----

#[instrument(skip(state))]
pub async fn list_synthesis(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Vec<Synthesis>>, (StatusCode, String)> {
    let rows = repo::list_synthesis(&state.db, user_id)
        .await
        .map_err(store_error)?;
    Ok(Json(rows))
}

#[instrument(skip(state))]
pub async fn synthesis_options(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Vec<SelectOption>>, (StatusCode, String)> {
    let rows = repo::list_synthesis(&state.db, user_id)
        .await
        .map_err(store_error)?;
    Ok(Json(rows.iter().map(SelectOption::from).collect()))
}

#[instrument(skip(state, body))]
pub async fn create_synthesis(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<NewSynthesis>,
) -> Result<(StatusCode, Json<Synthesis>), (StatusCode, String)> {
    let created = repo::add_synthesis(&state.db, user_id, &body)
        .await
        .map_err(store_error)?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[instrument(skip(state))]
pub async fn delete_synthesis(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<SynthesisId>,
) -> Result<Json<DeletedResponse>, (StatusCode, String)> {
    let cascaded = repo::delete_synthesis(&state.db, user_id, id)
        .await
        .map_err(store_error)?;
    Ok(Json(DeletedResponse { id, cascaded }))
}

// ---- reactions ----

#[instrument(skip(state))]
pub async fn list_reactions(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Vec<ReactionWithSynthesis>>, (StatusCode, String)> {
    let rows = repo::list_reactions_with_synthesis(&state.db, user_id)
        .await
        .map_err(store_error)?;
    Ok(Json(rows))
}

#[instrument(skip(state))]
pub async fn reaction_options(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Vec<SelectOption>>, (StatusCode, String)> {
    let rows = repo::list_reactions_with_synthesis(&state.db, user_id)
        .await
        .map_err(store_error)?;
    Ok(Json(rows.iter().map(SelectOption::from).collect()))
}

#[instrument(skip(state, body))]
pub async fn create_reaction(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<NewReaction>,
) -> Result<(StatusCode, Json<Reaction>), (StatusCode, String)> {
    let created = repo::add_reaction(&state.db, user_id, &body)
        .await
        .map_err(store_error)?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[instrument(skip(state))]
pub async fn delete_reaction(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<ReactionId>,
) -> Result<Json<DeletedResponse>, (StatusCode, String)> {
    let cascaded = repo::delete_reaction(&state.db, user_id, id)
        .await
        .map_err(store_error)?;
    Ok(Json(DeletedResponse { id, cascaded }))
}

// ---- results ----

/// POST /reactions/:id/results (multipart, field `file`)
#[instrument(skip(state, mp))]
pub async fn upload_result(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(reaction_id): Path<ReactionId>,
    Query(params): Query<UploadParams>,
    mut mp: Multipart,
) -> Result<(StatusCode, Json<ResultDetails>), (StatusCode, String)> {
    let mut body = None;
    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?
    {
        if field.name() == Some("file") {
            let data = field
                .bytes()
                .await
                .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
            body = Some(data);
        }
    }
    let Some(body) = body else {
        warn!(user_id, reaction_id, "upload without file field");
        return Err((StatusCode::BAD_REQUEST, "file is required".into()));
    };

    let record = ingest_upload(&state, user_id, reaction_id, &body, params.into())
        .await
        .map_err(store_error)?;
    Ok((StatusCode::CREATED, Json(record.into())))
}

#[instrument(skip(state))]
pub async fn get_result(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(reaction_id): Path<ReactionId>,
) -> Result<Json<ResultDetails>, (StatusCode, String)> {
    match repo::get_result(&state.db, user_id, reaction_id).await {
        Ok(Some(record)) => Ok(Json(record.into())),
        Ok(None) => Err((StatusCode::NOT_FOUND, "result not found".into())),
        Err(e) => Err(store_error(e)),
    }
}

#[instrument(skip(state))]
pub async fn get_result_plot(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(reaction_id): Path<ReactionId>,
) -> Result<Response, (StatusCode, String)> {
    let record = repo::get_result(&state.db, user_id, reaction_id)
        .await
        .map_err(store_error)?
        .ok_or((StatusCode::NOT_FOUND, "result not found".to_string()))?;
    let Some(svg) = record.plot_artifact else {
        return Err((StatusCode::NOT_FOUND, "plot not found".into()));
    };
    Ok(([(header::CONTENT_TYPE, "image/svg+xml")], svg).into_response())
}

#[instrument(skip(state))]
pub async fn get_smoothed(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(reaction_id): Path<ReactionId>,
    Query(params): Query<SmoothingParams>,
) -> Result<Json<SmoothedSeries>, (StatusCode, String)> {
    let view = smoothed_result(&state, user_id, reaction_id, params.into())
        .await
        .map_err(store_error)?;
    Ok(Json(view))
}

#[instrument(skip(state))]
pub async fn list_results(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Vec<ResultListing>>, (StatusCode, String)> {
    let rows = repo::list_results(&state.db, user_id)
        .await
        .map_err(store_error)?;
    Ok(Json(rows))
}

#[instrument(skip(state))]
pub async fn delete_result(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<ResultId>,
) -> Result<StatusCode, (StatusCode, String)> {
    repo::delete_result(&state.db, user_id, id)
        .await
        .map_err(store_error)?;
    Ok(StatusCode::NO_CONTENT)
}
