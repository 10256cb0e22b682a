//! Identity middleware
//!
//! Authentication happens upstream; the gateway forwards the resolved
//! identity in request headers. This layer turns them into a [`CurrentUser`]
//! extension and rejects requests that carry none.

use axum::{
    body::Body,
    http::{HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const ORGANIZATION_ID_HEADER: &str = "x-organization-id";
pub const ROLE_HEADER: &str = "x-user-role";

/// Role allowed to act on any organization
pub const SUPER_ADMIN: &str = "super_admin";

/// Extension to store current user in request
#[derive(Clone, Debug)]
pub struct CurrentUser {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub role: Option<String>,
}

impl CurrentUser {
    pub fn is_super_admin(&self) -> bool {
        self.role.as_deref() == Some(SUPER_ADMIN)
    }

    /// Allow access to `org_id` only for its own members or a super admin
    pub fn ensure_org(&self, org_id: Uuid) -> AppResult<()> {
        if self.organization_id == org_id || self.is_super_admin() {
            Ok(())
        } else {
            tracing::warn!(
                user_id = %self.id,
                organization_id = %org_id,
                "Cross-organization access denied"
            );
            Err(AppError::Forbidden)
        }
    }

    pub fn ensure_super_admin(&self) -> AppResult<()> {
        if self.is_super_admin() {
            Ok(())
        } else {
            Err(AppError::Forbidden)
        }
    }

    fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let uuid = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| Uuid::parse_str(v.trim()).ok())
        };
        let role = headers
            .get(ROLE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        Some(Self {
            id: uuid(USER_ID_HEADER)?,
            organization_id: uuid(ORGANIZATION_ID_HEADER)?,
            role,
        })
    }
}

/// Paths that don't require an identity
fn is_public_path(path: &str) -> bool {
    !path.starts_with("/api") || path == "/api/health"
}

/// Authentication middleware
pub async fn auth_layer(mut request: Request<Body>, next: Next) -> Response {
    if is_public_path(request.uri().path()) {
        return next.run(request).await;
    }

    let Some(user) = CurrentUser::from_headers(request.headers()) else {
        tracing::debug!(path = %request.uri().path(), "Request without identity");
        return AppError::Unauthorized.into_response();
    };

    request.extensions_mut().insert(user);
    next.run(request).await
}
