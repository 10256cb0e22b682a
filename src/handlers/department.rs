//! Department handlers

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    response::Json,
    Extension,
};
use uuid::Uuid;

use crate::entity::department;
use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::org::hierarchy::DeleteSummary;
use crate::org::payload::{DeleteOptions, DepartmentPatch, NewDepartment};
use crate::org::HierarchyStore;
use crate::routes::ApiResponse;
use crate::state::AppState;

/// GET /api/orgs/:org_id/departments
pub async fn list_departments(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    path: Result<Path<Uuid>, PathRejection>,
) -> AppResult<Json<ApiResponse<Vec<department::Model>>>> {
    let Path(org_id) = path?;
    user.ensure_org(org_id)?;
    let departments = HierarchyStore::new(&state.db).list_departments(org_id).await?;
    Ok(Json(ApiResponse::success(departments)))
}

/// GET /api/orgs/:org_id/departments/:id
pub async fn get_department(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    path: Result<Path<(Uuid, Uuid)>, PathRejection>,
) -> AppResult<Json<ApiResponse<department::Model>>> {
    let Path((org_id, id)) = path?;
    user.ensure_org(org_id)?;
    let department = HierarchyStore::new(&state.db).get_department(org_id, id).await?;
    Ok(Json(ApiResponse::success(department)))
}

/// POST /api/orgs/:org_id/departments
pub async fn create_department(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<NewDepartment>, JsonRejection>,
) -> AppResult<Json<ApiResponse<department::Model>>> {
    let Path(org_id) = path?;
    user.ensure_org(org_id)?;
    let Json(payload) = payload?;
    let department = HierarchyStore::new(&state.db)
        .create_department(org_id, payload)
        .await?;
    Ok(Json(ApiResponse::success(department)))
}

/// PATCH /api/orgs/:org_id/departments/:id
pub async fn update_department(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    path: Result<Path<(Uuid, Uuid)>, PathRejection>,
    payload: Result<Json<DepartmentPatch>, JsonRejection>,
) -> AppResult<Json<ApiResponse<department::Model>>> {
    let Path((org_id, id)) = path?;
    user.ensure_org(org_id)?;
    let Json(patch) = payload?;
    let department = HierarchyStore::new(&state.db)
        .update_department(org_id, id, patch)
        .await?;
    Ok(Json(ApiResponse::success(department)))
}

/// DELETE /api/orgs/:org_id/departments/:id?cascade=true
pub async fn delete_department(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    path: Result<Path<(Uuid, Uuid)>, PathRejection>,
    options: Result<Query<DeleteOptions>, QueryRejection>,
) -> AppResult<Json<ApiResponse<DeleteSummary>>> {
    let Path((org_id, id)) = path?;
    user.ensure_org(org_id)?;
    let Query(options) = options?;
    let summary = HierarchyStore::new(&state.db)
        .delete_department(org_id, id, options)
        .await?;
    Ok(Json(ApiResponse::success(summary)))
}
