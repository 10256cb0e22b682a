//! Position and position level handlers

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    response::Json,
    Extension,
};
use uuid::Uuid;

use crate::entity::position::{self, PositionWithLevels};
use crate::entity::position_level;
use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::org::hierarchy::DeleteSummary;
use crate::org::payload::{DeleteOptions, LevelPatch, LevelSpec, NewPosition, PositionPatch};
use crate::org::HierarchyStore;
use crate::routes::ApiResponse;
use crate::state::AppState;

/// GET /api/orgs/:org_id/positions
pub async fn list_positions(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    path: Result<Path<Uuid>, PathRejection>,
) -> AppResult<Json<ApiResponse<Vec<PositionWithLevels>>>> {
    let Path(org_id) = path?;
    user.ensure_org(org_id)?;
    let positions = HierarchyStore::new(&state.db).list_positions(org_id).await?;
    Ok(Json(ApiResponse::success(positions)))
}

/// GET /api/orgs/:org_id/positions/:id
pub async fn get_position(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    path: Result<Path<(Uuid, Uuid)>, PathRejection>,
) -> AppResult<Json<ApiResponse<PositionWithLevels>>> {
    let Path((org_id, id)) = path?;
    user.ensure_org(org_id)?;
    let position = HierarchyStore::new(&state.db).get_position(org_id, id).await?;
    Ok(Json(ApiResponse::success(position)))
}

/// POST /api/orgs/:org_id/positions
pub async fn create_position(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<NewPosition>, JsonRejection>,
) -> AppResult<Json<ApiResponse<PositionWithLevels>>> {
    let Path(org_id) = path?;
    user.ensure_org(org_id)?;
    let Json(payload) = payload?;
    let position = HierarchyStore::new(&state.db)
        .create_position(org_id, payload)
        .await?;
    Ok(Json(ApiResponse::success(position)))
}

/// PATCH /api/orgs/:org_id/positions/:id
pub async fn update_position(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    path: Result<Path<(Uuid, Uuid)>, PathRejection>,
    payload: Result<Json<PositionPatch>, JsonRejection>,
) -> AppResult<Json<ApiResponse<position::Model>>> {
    let Path((org_id, id)) = path?;
    user.ensure_org(org_id)?;
    let Json(patch) = payload?;
    let position = HierarchyStore::new(&state.db)
        .update_position(org_id, id, patch)
        .await?;
    Ok(Json(ApiResponse::success(position)))
}

/// DELETE /api/orgs/:org_id/positions/:id?cascade=true
pub async fn delete_position(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    path: Result<Path<(Uuid, Uuid)>, PathRejection>,
    options: Result<Query<DeleteOptions>, QueryRejection>,
) -> AppResult<Json<ApiResponse<DeleteSummary>>> {
    let Path((org_id, id)) = path?;
    user.ensure_org(org_id)?;
    let Query(options) = options?;
    let summary = HierarchyStore::new(&state.db)
        .delete_position(org_id, id, options)
        .await?;
    Ok(Json(ApiResponse::success(summary)))
}

/// POST /api/orgs/:org_id/positions/:id/levels
pub async fn create_level(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    path: Result<Path<(Uuid, Uuid)>, PathRejection>,
    payload: Result<Json<LevelSpec>, JsonRejection>,
) -> AppResult<Json<ApiResponse<position_level::Model>>> {
    let Path((org_id, position_id)) = path?;
    user.ensure_org(org_id)?;
    let Json(spec) = payload?;
    let level = HierarchyStore::new(&state.db)
        .create_position_level(org_id, position_id, spec)
        .await?;
    Ok(Json(ApiResponse::success(level)))
}

/// PATCH /api/orgs/:org_id/levels/:id
pub async fn update_level(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    path: Result<Path<(Uuid, Uuid)>, PathRejection>,
    payload: Result<Json<LevelPatch>, JsonRejection>,
) -> AppResult<Json<ApiResponse<position_level::Model>>> {
    let Path((org_id, id)) = path?;
    user.ensure_org(org_id)?;
    let Json(patch) = payload?;
    let level = HierarchyStore::new(&state.db)
        .update_position_level(org_id, id, patch)
        .await?;
    Ok(Json(ApiResponse::success(level)))
}

/// DELETE /api/orgs/:org_id/levels/:id?cascade=true
pub async fn delete_level(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    path: Result<Path<(Uuid, Uuid)>, PathRejection>,
    options: Result<Query<DeleteOptions>, QueryRejection>,
) -> AppResult<Json<ApiResponse<DeleteSummary>>> {
    let Path((org_id, id)) = path?;
    user.ensure_org(org_id)?;
    let Query(options) = options?;
    let summary = HierarchyStore::new(&state.db)
        .delete_position_level(org_id, id, options)
        .await?;
    Ok(Json(ApiResponse::success(summary)))
}
