//! Authentication middleware

use axum::{
    extract::{State, Request},
    middleware::Next,
    response::Response,
    http::header::AUTHORIZATION,
};
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::{AppState, AppError};
use crate::error::AccessDenied;
use crate::access::{ClearanceLevel, Role};
use crate::audit;
use crate::handlers::auth::decode_jwt;
use crate::models::User;

/// User context resolved from the bearer token and the stored account
#[derive(Debug, Clone)]
pub struct UserContext {
    pub user_id: Uuid,
    pub matricule: String,
    pub role: Role,
    pub clearance: ClearanceLevel,
}

impl UserContext {
    /// Check if user has admin role
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl TryFrom<&User> for UserContext {
    type Error = AppError;

    fn try_from(user: &User) -> Result<Self, Self::Error> {
        Ok(Self {
            user_id: user.id,
            matricule: user.matricule.clone(),
            role: user.role()?,
            clearance: user.clearance()?,
        })
    }
}

/// Client address as reported by the proxy, if any
#[derive(Debug, Clone, Default)]
pub struct ClientIp(pub Option<String>);

/// Middleware: Require user JWT authentication
///
/// The token only identifies the user; role and clearance are read from the
/// stored account so that deactivation and demotion apply immediately.
pub async fn require_user_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_bearer_token(&req)?;

    let claims = decode_jwt(&token, &state.config.jwt_secret)?;
    let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AppError::TokenInvalid)?;

    let user = match User::find_by_id(&state.pool, user_id).await? {
        Some(user) => user,
        None => {
            tracing::warn!(matricule = %claims.matricule, action = "token_invalid_user", "Token references unknown user");
            return Err(AppError::TokenInvalid);
        }
    };

    if !user.is_active {
        audit::auth_event(&state, &user.matricule, "inactive_access", "Inactive account used a valid token", None).await;
        return Err(AppError::InactiveAccount);
    }

    let user_ctx = UserContext::try_from(&user)?;
    let ip = ClientIp(client_ip(&req));
    let route = format!("{} {}", req.method(), req.uri().path());

    // Insert into request extensions
    req.extensions_mut().insert(user_ctx.clone());
    req.extensions_mut().insert(ip.clone());

    let response = next.run(req).await;

    if let Some(details) = denial_details(&response, &route) {
        audit::user_action(&state, &user_ctx, &ip, "permission_denied", "access", None, details).await;
    }

    Ok(response)
}

/// Audit text for a response refused by an access check
fn denial_details(response: &Response, route: &str) -> Option<String> {
    response
        .extensions()
        .get::<AccessDenied>()
        .map(|AccessDenied(reason)| format!("{}: {}", route, reason))
}

/// Extract bearer token from Authorization header
fn extract_bearer_token(req: &Request) -> Result<String, AppError> {
    let auth_header = req.headers()
        .get(AUTHORIZATION)
        .ok_or(AppError::Unauthorized)?
        .to_str()
        .map_err(|_| AppError::Unauthorized)?;

    auth_header
        .strip_prefix("Bearer ")
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or(AppError::Unauthorized)
}

/// First hop of X-Forwarded-For, if present
pub fn client_ip(req: &Request) -> Option<String> {
    req.headers()
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.split(',').next().unwrap_or(s).trim().to_string())
        .filter(|s| !s.is_empty())
}

// Implement FromRequestParts for UserContext
#[axum::async_trait]
impl<S> FromRequestParts<S> for UserContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions
            .get::<UserContext>()
            .cloned()
            .ok_or(AppError::Unauthorized)
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(ip) = parts.extensions.get::<ClientIp>() {
            return Ok(ip.clone());
        }
        let ip = parts.headers
            .get("X-Forwarded-For")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.split(',').next())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        Ok(ClientIp(ip))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request_with_auth(value: &str) -> Request {
        axum::http::Request::builder()
            .uri("/")
            .header(AUTHORIZATION, value)
            .header("X-Forwarded-For", "10.0.0.7, 172.16.0.1")
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn test_extract_bearer_token() {
        let req = request_with_auth("Bearer abc.def.ghi");
        assert_eq!(extract_bearer_token(&req).unwrap(), "abc.def.ghi");

        let req = request_with_auth("Basic dXNlcjpwYXNz");
        assert!(matches!(extract_bearer_token(&req), Err(AppError::Unauthorized)));

        let req = request_with_auth("Bearer ");
        assert!(extract_bearer_token(&req).is_err());
    }

    #[test]
    fn test_denials_are_described_for_the_audit_trail() {
        use axum::response::IntoResponse;

        let denied = AppError::forbidden("Insufficient permissions. Required roles: admin").into_response();
        assert_eq!(
            denial_details(&denied, "GET /api/v1/audit").as_deref(),
            Some("GET /api/v1/audit: Insufficient permissions. Required roles: admin")
        );

        let invalid = AppError::InvalidState("Cannot modify a report with status approved".into()).into_response();
        assert!(denial_details(&invalid, "PUT /api/v1/reports/x").is_none());
    }

    #[test]
    fn test_client_ip_takes_first_hop() {
        let req = request_with_auth("Bearer x");
        assert_eq!(client_ip(&req).as_deref(), Some("10.0.0.7"));
    }
}
