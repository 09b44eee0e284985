//! User administration handlers (admin only)

use axum::{extract::{State, Path, Query}, http::StatusCode, Json};
use uuid::Uuid;
use validator::Validate;

use crate::{AppState, AppResult, AppError};
use crate::access::require_admin;
use crate::audit;
use crate::handlers::auth::hash_password;
use crate::middleware::auth::{ClientIp, UserContext};
use crate::models::{CreateUser, UpdateUser, User, UserDetail, UserFilter};

/// List users
pub async fn list(
    State(state): State<AppState>,
    user: UserContext,
    Query(filter): Query<UserFilter>,
) -> AppResult<Json<Vec<User>>> {
    require_admin(&user)?;
    let users = User::list(&state.pool, &filter).await?;
    Ok(Json(users))
}

/// Get one user with activity counters
pub async fn get(
    State(state): State<AppState>,
    user: UserContext,
    Path(id): Path<Uuid>,
) -> AppResult<Json<UserDetail>> {
    require_admin(&user)?;
    let account = find(&state, id).await?;
    Ok(Json(account.detail(&state.pool).await?))
}

/// Create a user
pub async fn create(
    State(state): State<AppState>,
    user: UserContext,
    ip: ClientIp,
    Json(req): Json<CreateUser>,
) -> AppResult<(StatusCode, Json<User>)> {
    require_admin(&user)?;
    req.validate()?;

    let password_hash = hash_password(&req.password)?;
    let created = User::create(&state.pool, &req, password_hash).await?;

    audit::user_action(
        &state, &user, &ip, "user_created", "user", Some(created.id),
        format!("Created {} ({}, {})", created.matricule, created.role, created.clearance_level),
    ).await;

    Ok((StatusCode::CREATED, Json(created)))
}

/// Update a user
pub async fn update(
    State(state): State<AppState>,
    user: UserContext,
    ip: ClientIp,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateUser>,
) -> AppResult<Json<User>> {
    require_admin(&user)?;
    req.validate()?;

    if id == user.user_id && req.is_active == Some(false) {
        return Err(AppError::InvalidState("You cannot deactivate your own account".to_string()));
    }

    let password_hash = match &req.password {
        Some(password) => Some(hash_password(password)?),
        None => None,
    };

    let updated = User::update(&state.pool, id, &req, password_hash)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    audit::user_action(
        &state, &user, &ip, "user_updated", "user", Some(updated.id),
        format!("Updated {}", updated.matricule),
    ).await;

    Ok(Json(updated))
}

/// Permanently delete a user
pub async fn delete(
    State(state): State<AppState>,
    user: UserContext,
    ip: ClientIp,
    Path(id): Path<Uuid>,
) -> AppResult<Json<User>> {
    require_admin(&user)?;

    if id == user.user_id {
        return Err(AppError::InvalidState("You cannot delete your own account".to_string()));
    }

    let deleted = User::delete(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    audit::user_action(
        &state, &user, &ip, "user_deleted", "user", Some(deleted.id),
        format!("Deleted {}", deleted.matricule),
    ).await;

    Ok(Json(deleted))
}

/// Soft delete: the account stays but can no longer log in
pub async fn deactivate(
    State(state): State<AppState>,
    user: UserContext,
    ip: ClientIp,
    Path(id): Path<Uuid>,
) -> AppResult<Json<User>> {
    require_admin(&user)?;

    if id == user.user_id {
        return Err(AppError::InvalidState("You cannot deactivate your own account".to_string()));
    }

    let account = User::deactivate(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    audit::user_action(
        &state, &user, &ip, "user_deactivated", "user", Some(account.id),
        format!("Deactivated {}", account.matricule),
    ).await;

    Ok(Json(account))
}

async fn find(state: &AppState, id: Uuid) -> AppResult<User> {
    User::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}
