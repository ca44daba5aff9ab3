//! Role-based access: each route group declares the roles it admits and one
//! middleware enforces any such declaration.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, HeaderMap};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::Router;
use sqlx::SqlitePool;

use super::app::AppState;
use super::error::ApiError;
use crate::auth::TokenIssuer;
use crate::db::queries::users;
use crate::db::{Role, User};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessPolicy {
    roles: &'static [Role],
    denied: &'static str,
}

impl AccessPolicy {
    pub const ADMINS: AccessPolicy = AccessPolicy {
        roles: &[Role::Admin, Role::SuperAdmin],
        denied: "Administrator rights required",
    };
    pub const SUPERADMINS: AccessPolicy = AccessPolicy {
        roles: &[Role::SuperAdmin],
        denied: "Superadministrator rights required",
    };

    pub fn permits(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// Puts every route currently in `router` behind this policy.
    pub fn guard(self, router: Router<AppState>, state: &AppState) -> Router<AppState> {
        let guard = PolicyGuard {
            policy: self,
            pool: state.pool.clone(),
            tokens: state.tokens.clone(),
        };
        router.route_layer(middleware::from_fn_with_state(guard, enforce))
    }
}

/// The account behind the request's bearer token; set by the policy middleware.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

#[derive(Clone)]
struct PolicyGuard {
    policy: AccessPolicy,
    pool: SqlitePool,
    tokens: Arc<TokenIssuer>,
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| ApiError::Unauthorized("Authentication token is missing".to_owned()))
}

async fn enforce(
    State(guard): State<PolicyGuard>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(request.headers())?;
    let claims = guard.tokens.verify(token).map_err(|e| {
        tracing::debug!("Rejected bearer token: {e}");
        ApiError::Forbidden("Invalid token".to_owned())
    })?;
    let user = users::find_user(&guard.pool, claims.user_id()?)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("User not found".to_owned()))?;

    if !guard.policy.permits(user.role) {
        tracing::info!(user_id = user.id, role = %user.role, "Access denied");
        return Err(ApiError::Forbidden(guard.policy.denied.to_owned()));
    }

    request.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(request).await)
}
