use axum::{
    http::StatusCode,
    middleware,
    response::Json,
    routing::{get, patch, post},
    Router,
};
use serde::Serialize;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::handlers;
use crate::middleware::auth_layer;
use crate::state::AppState;

pub mod health;

/// API response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub code: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: true,
            message: "success".to_string(),
            data: Some(data),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            code: false,
            message: message.into(),
            data: None,
        }
    }
}

/// Create the main router
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // API routes
    let api_routes = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Settings
        .route("/orgs/:org_id/provision", post(handlers::settings::provision))
        .route(
            "/orgs/:org_id/settings",
            get(handlers::settings::get_settings).patch(handlers::settings::update_settings),
        )
        // Divisions
        .route(
            "/orgs/:org_id/divisions",
            get(handlers::division::list_divisions).post(handlers::division::create_division),
        )
        .route("/orgs/:org_id/divisions/tree", get(handlers::division::division_tree))
        .route(
            "/orgs/:org_id/divisions/:id",
            get(handlers::division::get_division)
                .patch(handlers::division::update_division)
                .delete(handlers::division::delete_division),
        )
        // Departments
        .route(
            "/orgs/:org_id/departments",
            get(handlers::department::list_departments).post(handlers::department::create_department),
        )
        .route(
            "/orgs/:org_id/departments/:id",
            get(handlers::department::get_department)
                .patch(handlers::department::update_department)
                .delete(handlers::department::delete_department),
        )
        // Positions and levels
        .route(
            "/orgs/:org_id/positions",
            get(handlers::position::list_positions).post(handlers::position::create_position),
        )
        .route(
            "/orgs/:org_id/positions/:id",
            get(handlers::position::get_position)
                .patch(handlers::position::update_position)
                .delete(handlers::position::delete_position),
        )
        .route("/orgs/:org_id/positions/:id/levels", post(handlers::position::create_level))
        .route(
            "/orgs/:org_id/levels/:id",
            patch(handlers::position::update_level).delete(handlers::position::delete_level),
        )
        // Assignments
        .route("/orgs/:org_id/assignments", post(handlers::assignment::assign))
        .route("/orgs/:org_id/assignments/:id/end", post(handlers::assignment::end_assignment))
        .route(
            "/orgs/:org_id/employees/:employee_id/assignments",
            get(handlers::assignment::list_for_employee),
        )
        .route(
            "/orgs/:org_id/employees/:employee_id/primary",
            get(handlers::assignment::primary_assignment),
        );

    Router::new()
        .nest("/api", api_routes)
        .fallback(fallback)
        .layer(middleware::from_fn(auth_layer))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Fallback handler for 404
pub async fn fallback() -> (StatusCode, Json<ApiResponse<()>>) {
    (StatusCode::NOT_FOUND, Json(ApiResponse::error("Not Found")))
}
