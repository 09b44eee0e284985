//! Audit trail listing (admin)

use axum::{extract::{State, Query}, Json};

use crate::{AppState, AppResult};
use crate::access::require_admin;
use crate::middleware::auth::UserContext;
use crate::models::{AuditFilter, AuditLog};

/// Most recent audit entries, newest first
pub async fn list(
    State(state): State<AppState>,
    user: UserContext,
    Query(filter): Query<AuditFilter>,
) -> AppResult<Json<Vec<AuditLog>>> {
    require_admin(&user)?;
    Ok(Json(AuditLog::list_recent(&state.pool, &filter).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{ClearanceLevel, Role};
    use crate::handlers::test_support::{offline_state, user};
    use crate::AppError;

    #[tokio::test]
    async fn test_audit_trail_is_admin_only() {
        let commander = user(Role::Commander, ClearanceLevel::TopSecret);
        let result = list(State(offline_state()), commander, Query(AuditFilter::default())).await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }
}
