//! Organization settings handlers

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    response::Json,
    Extension,
};
use uuid::Uuid;

use crate::entity::organization_settings;
use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::org::{SettingsPatch, SettingsStore};
use crate::routes::ApiResponse;
use crate::state::AppState;

/// POST /api/orgs/:org_id/provision
pub async fn provision(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    path: Result<Path<Uuid>, PathRejection>,
) -> AppResult<Json<ApiResponse<organization_settings::Model>>> {
    let Path(org_id) = path?;
    user.ensure_super_admin()?;
    let settings = SettingsStore::new(&state.db).provision(org_id).await?;
    Ok(Json(ApiResponse::success(settings)))
}

/// GET /api/orgs/:org_id/settings
pub async fn get_settings(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    path: Result<Path<Uuid>, PathRejection>,
) -> AppResult<Json<ApiResponse<organization_settings::Model>>> {
    let Path(org_id) = path?;
    user.ensure_org(org_id)?;
    let settings = SettingsStore::new(&state.db).get(org_id).await?;
    Ok(Json(ApiResponse::success(settings)))
}

/// PATCH /api/orgs/:org_id/settings
pub async fn update_settings(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<SettingsPatch>, JsonRejection>,
) -> AppResult<Json<ApiResponse<organization_settings::Model>>> {
    let Path(org_id) = path?;
    user.ensure_org(org_id)?;
    let Json(patch) = payload?;
    let settings = SettingsStore::new(&state.db).update(org_id, patch).await?;
    Ok(Json(ApiResponse::success(settings)))
}
