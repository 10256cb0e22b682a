//! Division handlers

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    response::Json,
    Extension,
};
use uuid::Uuid;

use crate::entity::division::{self, DivisionTree};
use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::org::hierarchy::DeleteSummary;
use crate::org::payload::{DeleteOptions, DivisionPatch, NewDivision};
use crate::org::HierarchyStore;
use crate::routes::ApiResponse;
use crate::state::AppState;

/// GET /api/orgs/:org_id/divisions
pub async fn list_divisions(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    path: Result<Path<Uuid>, PathRejection>,
) -> AppResult<Json<ApiResponse<Vec<division::Model>>>> {
    let Path(org_id) = path?;
    user.ensure_org(org_id)?;
    let divisions = HierarchyStore::new(&state.db).list_divisions(org_id).await?;
    Ok(Json(ApiResponse::success(divisions)))
}

/// GET /api/orgs/:org_id/divisions/tree
pub async fn division_tree(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    path: Result<Path<Uuid>, PathRejection>,
) -> AppResult<Json<ApiResponse<Vec<DivisionTree>>>> {
    let Path(org_id) = path?;
    user.ensure_org(org_id)?;
    let tree = HierarchyStore::new(&state.db).division_tree(org_id).await?;
    Ok(Json(ApiResponse::success(tree)))
}

/// GET /api/orgs/:org_id/divisions/:id
pub async fn get_division(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    path: Result<Path<(Uuid, Uuid)>, PathRejection>,
) -> AppResult<Json<ApiResponse<division::Model>>> {
    let Path((org_id, id)) = path?;
    user.ensure_org(org_id)?;
    let division = HierarchyStore::new(&state.db).get_division(org_id, id).await?;
    Ok(Json(ApiResponse::success(division)))
}

/// POST /api/orgs/:org_id/divisions
pub async fn create_division(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<NewDivision>, JsonRejection>,
) -> AppResult<Json<ApiResponse<division::Model>>> {
    let Path(org_id) = path?;
    user.ensure_org(org_id)?;
    let Json(payload) = payload?;
    let division = HierarchyStore::new(&state.db)
        .create_division(org_id, payload)
        .await?;
    Ok(Json(ApiResponse::success(division)))
}

/// PATCH /api/orgs/:org_id/divisions/:id
pub async fn update_division(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    path: Result<Path<(Uuid, Uuid)>, PathRejection>,
    payload: Result<Json<DivisionPatch>, JsonRejection>,
) -> AppResult<Json<ApiResponse<division::Model>>> {
    let Path((org_id, id)) = path?;
    user.ensure_org(org_id)?;
    let Json(patch) = payload?;
    let division = HierarchyStore::new(&state.db)
        .update_division(org_id, id, patch)
        .await?;
    Ok(Json(ApiResponse::success(division)))
}

/// DELETE /api/orgs/:org_id/divisions/:id?cascade=true
pub async fn delete_division(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    path: Result<Path<(Uuid, Uuid)>, PathRejection>,
    options: Result<Query<DeleteOptions>, QueryRejection>,
) -> AppResult<Json<ApiResponse<DeleteSummary>>> {
    let Path((org_id, id)) = path?;
    user.ensure_org(org_id)?;
    let Query(options) = options?;
    let summary = HierarchyStore::new(&state.db)
        .delete_division(org_id, id, options)
        .await?;
    Ok(Json(ApiResponse::success(summary)))
}
