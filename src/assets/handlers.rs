use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument};

use crate::{
    assets::{
        dto::{Ack, CreateForm, IdentifierQuery, LimitQuery, Moved},
        repo_types::{AssetPatch, AssetRecord, LifecycleState, ScanEntry},
        reports::{self, FleetSummary},
    },
    auth::{jwt::AuthUser, repo_types::Role},
    error::AppError,
    extract::{AppJson, AppPath, AppQuery},
    images::services::{self as images, ContentKind},
    state::AppState,
};

/// Roles allowed to change records; everyone authenticated may read and scan.
const WRITERS: &[Role] = &[Role::Admin, Role::User];

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/pcuser/inactive", get(list_inactive))
        .route("/pcuser/search", get(get_asset))
        .route("/pcuser/scan", get(record_scan))
        .route("/pcuser/scans", get(recent_scans))
        .route("/pcuser/year/:year", get(list_active_by_year))
        .route("/pcuser/inactive/year/:year", get(list_inactive_by_year))
        .route("/pcuser/summary", get(summary))
        .route("/pcuser/images/:filename", get(fetch_image))
        .route("/pcuser/barcodes/:filename", get(fetch_barcode))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/pcuser",
            post(create_asset)
                .get(list_active)
                .put(update_asset)
                .delete(delete_asset),
        )
        .route("/pcuser/archive", post(archive_one))
        .route("/pcuser/archive/year/:year", post(archive_by_year))
        .route("/pcuser/restore", post(restore_one))
        .route("/pcuser/restore/year/:year", post(restore_by_year))
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024))
}

#[instrument(skip(state, mp), fields(user_id = %auth.id))]
pub async fn create_asset(
    State(state): State<AppState>,
    auth: AuthUser,
    mp: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<AssetRecord>), AppError> {
    auth.require_any(WRITERS)?;
    let form = CreateForm::from_multipart(mp?).await?;
    state.engine.ensure_available(&form.asset).await?;
    let image =
        images::store_upload(state.storage.as_ref(), &form.image.filename, form.image.body).await?;
    let record = state.engine.create(form.asset, image).await?;
    info!(identifier = %record.identifier, "asset registered");
    Ok((StatusCode::CREATED, Json(record)))
}

#[instrument(skip(state))]
pub async fn list_active(
    State(state): State<AppState>,
    _auth: AuthUser,
) -> Result<Json<Vec<AssetRecord>>, AppError> {
    Ok(Json(state.engine.list(LifecycleState::Active).await?))
}

#[instrument(skip(state))]
pub async fn list_inactive(
    State(state): State<AppState>,
    _auth: AuthUser,
) -> Result<Json<Vec<AssetRecord>>, AppError> {
    Ok(Json(state.engine.list(LifecycleState::Inactive).await?))
}

#[instrument(skip(state))]
pub async fn get_asset(
    State(state): State<AppState>,
    _auth: AuthUser,
    AppQuery(q): AppQuery<IdentifierQuery>,
) -> Result<Json<AssetRecord>, AppError> {
    Ok(Json(state.engine.get(&q.identifier).await?))
}

#[instrument(skip(state, patch), fields(user_id = %auth.id))]
pub async fn update_asset(
    State(state): State<AppState>,
    auth: AuthUser,
    AppQuery(q): AppQuery<IdentifierQuery>,
    AppJson(patch): AppJson<AssetPatch>,
) -> Result<Json<Ack>, AppError> {
    auth.require_any(WRITERS)?;
    state.engine.update(&q.identifier, patch).await?;
    Ok(Json(Ack::new("updated")))
}

#[instrument(skip(state), fields(user_id = %auth.id))]
pub async fn delete_asset(
    State(state): State<AppState>,
    auth: AuthUser,
    AppQuery(q): AppQuery<IdentifierQuery>,
) -> Result<Json<Ack>, AppError> {
    auth.require_any(WRITERS)?;
    state.engine.delete(&q.identifier).await?;
    Ok(Json(Ack::new("deleted")))
}

#[instrument(skip(state))]
pub async fn record_scan(
    State(state): State<AppState>,
    _auth: AuthUser,
    AppQuery(q): AppQuery<IdentifierQuery>,
) -> Result<Json<AssetRecord>, AppError> {
    Ok(Json(state.engine.record_scan(&q.identifier).await?))
}

#[instrument(skip(state))]
pub async fn recent_scans(
    State(state): State<AppState>,
    _auth: AuthUser,
    AppQuery(q): AppQuery<LimitQuery>,
) -> Result<Json<Vec<ScanEntry>>, AppError> {
    Ok(Json(state.engine.recent_scans(q.limit).await?))
}

#[instrument(skip(state))]
pub async fn list_active_by_year(
    State(state): State<AppState>,
    _auth: AuthUser,
    AppPath(year): AppPath<i32>,
) -> Result<Json<Vec<AssetRecord>>, AppError> {
    Ok(Json(
        state
            .engine
            .list_by_year(LifecycleState::Active, year)
            .await?,
    ))
}

#[instrument(skip(state))]
pub async fn list_inactive_by_year(
    State(state): State<AppState>,
    _auth: AuthUser,
    AppPath(year): AppPath<i32>,
) -> Result<Json<Vec<AssetRecord>>, AppError> {
    Ok(Json(
        state
            .engine
            .list_by_year(LifecycleState::Inactive, year)
            .await?,
    ))
}

#[instrument(skip(state), fields(user_id = %auth.id))]
pub async fn archive_one(
    State(state): State<AppState>,
    auth: AuthUser,
    AppQuery(q): AppQuery<IdentifierQuery>,
) -> Result<Json<Ack>, AppError> {
    auth.require_any(WRITERS)?;
    state.engine.archive_one(&q.identifier).await?;
    Ok(Json(Ack::new("archived")))
}

#[instrument(skip(state), fields(user_id = %auth.id))]
pub async fn archive_by_year(
    State(state): State<AppState>,
    auth: AuthUser,
    AppPath(year): AppPath<i32>,
) -> Result<Json<Moved>, AppError> {
    auth.require_any(WRITERS)?;
    let moved = state.engine.archive_by_year(year).await?;
    Ok(Json(Moved {
        msg: "archived".into(),
        moved,
    }))
}

#[instrument(skip(state), fields(user_id = %auth.id))]
pub async fn restore_one(
    State(state): State<AppState>,
    auth: AuthUser,
    AppQuery(q): AppQuery<IdentifierQuery>,
) -> Result<Json<Ack>, AppError> {
    auth.require_any(WRITERS)?;
    state.engine.restore_one(&q.identifier).await?;
    Ok(Json(Ack::new("restored")))
}

#[instrument(skip(state), fields(user_id = %auth.id))]
pub async fn restore_by_year(
    State(state): State<AppState>,
    auth: AuthUser,
    AppPath(year): AppPath<i32>,
) -> Result<Json<Moved>, AppError> {
    auth.require_any(WRITERS)?;
    let moved = state.engine.restore_by_year(year).await?;
    Ok(Json(Moved {
        msg: "restored".into(),
        moved,
    }))
}

#[instrument(skip(state))]
pub async fn summary(
    State(state): State<AppState>,
    _auth: AuthUser,
) -> Result<Json<FleetSummary>, AppError> {
    Ok(Json(reports::summarize(state.engine.store()).await?))
}

#[instrument(skip(state))]
pub async fn fetch_image(
    State(state): State<AppState>,
    AppPath(filename): AppPath<String>,
) -> Result<impl IntoResponse, AppError> {
    let (body, content_type) =
        images::fetch(state.storage.as_ref(), ContentKind::Image, &filename).await?;
    Ok(([(header::CONTENT_TYPE, content_type)], body))
}

#[instrument(skip(state))]
pub async fn fetch_barcode(
    State(state): State<AppState>,
    AppPath(filename): AppPath<String>,
) -> Result<impl IntoResponse, AppError> {
    let (body, content_type) =
        images::fetch(state.storage.as_ref(), ContentKind::Barcode, &filename).await?;
    Ok(([(header::CONTENT_TYPE, content_type)], body))
}
