//! Assignment handlers

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    response::Json,
    Extension,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::entity::employee_assignment;
use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::org::payload::{AssignRequest, EndAssignment};
use crate::org::AssignmentEngine;
use crate::routes::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AssignmentQuery {
    /// Only assignments open on this date
    pub open_at: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct AsOfQuery {
    pub as_of: Option<NaiveDate>,
}

/// POST /api/orgs/:org_id/assignments
pub async fn assign(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<AssignRequest>, JsonRejection>,
) -> AppResult<Json<ApiResponse<employee_assignment::Model>>> {
    let Path(org_id) = path?;
    user.ensure_org(org_id)?;
    let Json(request) = payload?;
    let assignment = AssignmentEngine::new(&state.db).assign(org_id, request).await?;
    Ok(Json(ApiResponse::success(assignment)))
}

/// POST /api/orgs/:org_id/assignments/:id/end
pub async fn end_assignment(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    path: Result<Path<(Uuid, Uuid)>, PathRejection>,
    payload: Result<Json<EndAssignment>, JsonRejection>,
) -> AppResult<Json<ApiResponse<employee_assignment::Model>>> {
    let Path((org_id, id)) = path?;
    user.ensure_org(org_id)?;
    let Json(request) = payload?;
    let assignment = AssignmentEngine::new(&state.db).end(org_id, id, request).await?;
    Ok(Json(ApiResponse::success(assignment)))
}

/// GET /api/orgs/:org_id/employees/:employee_id/assignments?open_at=YYYY-MM-DD
pub async fn list_for_employee(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    path: Result<Path<(Uuid, Uuid)>, PathRejection>,
    query: Result<Query<AssignmentQuery>, QueryRejection>,
) -> AppResult<Json<ApiResponse<Vec<employee_assignment::Model>>>> {
    let Path((org_id, employee_id)) = path?;
    user.ensure_org(org_id)?;
    let Query(query) = query?;
    let assignments = AssignmentEngine::new(&state.db)
        .list_for_employee(org_id, employee_id, query.open_at)
        .await?;
    Ok(Json(ApiResponse::success(assignments)))
}

/// GET /api/orgs/:org_id/employees/:employee_id/primary?as_of=YYYY-MM-DD
pub async fn primary_assignment(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    path: Result<Path<(Uuid, Uuid)>, PathRejection>,
    query: Result<Query<AsOfQuery>, QueryRejection>,
) -> AppResult<Json<ApiResponse<Option<employee_assignment::Model>>>> {
    let Path((org_id, employee_id)) = path?;
    user.ensure_org(org_id)?;
    let Query(query) = query?;
    let as_of = query.as_of.unwrap_or_else(|| Utc::now().date_naive());
    let assignment = AssignmentEngine::new(&state.db)
        .primary_assignment(org_id, employee_id, as_of)
        .await?;
    Ok(Json(ApiResponse::success(assignment)))
}
