//! Alert handlers and per-user notifications

use axum::{extract::{State, Path, Query}, http::StatusCode, Json};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::{AppState, AppResult, AppError};
use crate::access::{ensure_owner_or_admin, require_supervisor};
use crate::audit;
use crate::middleware::auth::{ClientIp, UserContext};
use crate::models::{
    Alert, AlertAction, AlertFilter, AlertNotification, AssignAlert, CreateAlert, NotifyUsers,
    ResolveAlert, UpdateAlert, User,
};

#[derive(Debug, Default, Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread_only: bool,
}

/// List alerts
pub async fn list(
    State(state): State<AppState>,
    _user: UserContext,
    Query(filter): Query<AlertFilter>,
) -> AppResult<Json<Vec<Alert>>> {
    Ok(Json(Alert::list(&state.pool, &filter).await?))
}

/// Raise an alert
pub async fn create(
    State(state): State<AppState>,
    user: UserContext,
    ip: ClientIp,
    Json(req): Json<CreateAlert>,
) -> AppResult<(StatusCode, Json<Alert>)> {
    req.validate()?;

    if let Some(assignee) = req.assigned_to {
        require_supervisor(&user)?;
        ensure_active_user(&state, assignee).await?;
    }

    let alert = Alert::create(&state.pool, &req, user.user_id).await?;

    AlertAction::record(
        &state.pool, alert.id, user.user_id, "created",
        &format!("Alert raised with severity {}", req.severity),
        None,
    ).await?;

    audit::user_action(
        &state, &user, &ip, "alert_created", "alert", Some(alert.id),
        format!("Alert '{}' ({})", alert.title, alert.severity),
    ).await;

    Ok((StatusCode::CREATED, Json(alert)))
}

/// Get an alert
pub async fn get(
    State(state): State<AppState>,
    _user: UserContext,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Alert>> {
    Ok(Json(find(&state, id).await?))
}

/// Edit an alert (its creator, a commander or an admin)
pub async fn update(
    State(state): State<AppState>,
    user: UserContext,
    ip: ClientIp,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateAlert>,
) -> AppResult<Json<Alert>> {
    req.validate()?;

    let alert = find(&state, id).await?;
    if !user.role.is_supervisor() {
        ensure_owner_or_admin(&user, alert.created_by)?;
    }

    let updated = Alert::update(&state.pool, id, &req)
        .await?
        .ok_or_else(|| AppError::NotFound("Alert not found".to_string()))?;

    if updated.status != alert.status {
        AlertAction::record(
            &state.pool, id, user.user_id, "status_changed",
            &format!("Status {} -> {}", alert.status, updated.status),
            Some(json!({ "from": alert.status, "to": updated.status })),
        ).await?;
    } else {
        AlertAction::record(&state.pool, id, user.user_id, "updated", "Alert updated", None).await?;
    }

    audit::user_action(
        &state, &user, &ip, "alert_updated", "alert", Some(id),
        format!("Alert '{}' updated", updated.title),
    ).await;

    Ok(Json(updated))
}

/// Assign an alert to a user
pub async fn assign(
    State(state): State<AppState>,
    user: UserContext,
    ip: ClientIp,
    Path(id): Path<Uuid>,
    Json(req): Json<AssignAlert>,
) -> AppResult<Json<Alert>> {
    require_supervisor(&user)?;
    let assignee = ensure_active_user(&state, req.assigned_to).await?;

    let alert = Alert::assign(&state.pool, id, assignee.id)
        .await?
        .ok_or_else(|| AppError::NotFound("Alert not found".to_string()))?;

    AlertAction::record(
        &state.pool, id, user.user_id, "assigned",
        &format!("Assigned to {}", assignee.matricule),
        Some(json!({ "assigned_to": assignee.id })),
    ).await?;

    audit::user_action(
        &state, &user, &ip, "alert_assigned", "alert", Some(id),
        format!("Alert '{}' assigned to {}", alert.title, assignee.matricule),
    ).await;

    Ok(Json(alert))
}

/// Mark an alert resolved
pub async fn resolve(
    State(state): State<AppState>,
    user: UserContext,
    ip: ClientIp,
    Path(id): Path<Uuid>,
    Json(req): Json<ResolveAlert>,
) -> AppResult<Json<Alert>> {
    require_supervisor(&user)?;

    let alert = find(&state, id).await?;
    if !alert.status()?.is_open() {
        return Err(AppError::InvalidState(format!("Alert is already {}", alert.status)));
    }

    let resolved = Alert::resolve(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Alert not found".to_string()))?;

    let description = req.resolution.as_deref().unwrap_or("Alert resolved");
    AlertAction::record(&state.pool, id, user.user_id, "resolved", description, None).await?;

    audit::user_action(
        &state, &user, &ip, "alert_resolved", "alert", Some(id),
        format!("Alert '{}' resolved", resolved.title),
    ).await;

    Ok(Json(resolved))
}

/// Action history of an alert
pub async fn actions(
    State(state): State<AppState>,
    _user: UserContext,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<AlertAction>>> {
    find(&state, id).await?;
    Ok(Json(AlertAction::list_for_alert(&state.pool, id).await?))
}

/// Notify users about an alert
pub async fn notify(
    State(state): State<AppState>,
    user: UserContext,
    ip: ClientIp,
    Path(id): Path<Uuid>,
    Json(req): Json<NotifyUsers>,
) -> AppResult<Json<serde_json::Value>> {
    require_supervisor(&user)?;
    if req.user_ids.is_empty() {
        return Err(AppError::ValidationError("user_ids must not be empty".to_string()));
    }

    let alert = find(&state, id).await?;
    let notified = AlertNotification::notify(&state.pool, id, &req.user_ids).await?;

    AlertAction::record(
        &state.pool, id, user.user_id, "notified",
        &format!("{} user(s) notified", notified),
        Some(json!({ "user_ids": req.user_ids })),
    ).await?;

    audit::user_action(
        &state, &user, &ip, "alert_notified", "alert", Some(id),
        format!("Alert '{}': {} user(s) notified", alert.title, notified),
    ).await;

    Ok(Json(json!({ "alert_id": id, "notified": notified })))
}

/// The caller's notifications
pub async fn notifications(
    State(state): State<AppState>,
    user: UserContext,
    Query(query): Query<NotificationQuery>,
) -> AppResult<Json<Vec<AlertNotification>>> {
    let list = AlertNotification::list_for_user(&state.pool, user.user_id, query.unread_only).await?;
    Ok(Json(list))
}

/// Mark one of the caller's notifications read
pub async fn mark_read(
    State(state): State<AppState>,
    user: UserContext,
    Path(alert_id): Path<Uuid>,
) -> AppResult<Json<serde_json::Value>> {
    if !AlertNotification::mark_read(&state.pool, alert_id, user.user_id).await? {
        return Err(AppError::NotFound("Notification not found".to_string()));
    }
    Ok(Json(json!({ "alert_id": alert_id, "read": true })))
}

async fn find(state: &AppState, id: Uuid) -> AppResult<Alert> {
    Alert::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Alert not found".to_string()))
}

async fn ensure_active_user(state: &AppState, id: Uuid) -> AppResult<User> {
    match User::find_by_id(&state.pool, id).await? {
        Some(user) if user.is_active => Ok(user),
        Some(_) => Err(AppError::InvalidState("Cannot assign an inactive user".to_string())),
        None => Err(AppError::NotFound("Assignee not found".to_string())),
    }
}
