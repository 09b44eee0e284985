//! Map handlers: markers and GeoJSON layers

use axum::{extract::{State, Path, Query}, http::StatusCode, Json};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::{AppState, AppResult, AppError};
use crate::access::{ensure_can_view_report, ensure_owner_or_admin};
use crate::audit;
use crate::middleware::auth::{ClientIp, UserContext};
use crate::models::{
    Alert, CreateLayer, CreateMarker, GeoLayer, MapMarker, MarkerFilter, Report,
};

/// Markers visible at the caller's clearance
pub async fn list_markers(
    State(state): State<AppState>,
    user: UserContext,
    Query(filter): Query<MarkerFilter>,
) -> AppResult<Json<Vec<MapMarker>>> {
    let markers = MapMarker::list_visible(&state.pool, &user.clearance.allowed_labels(), &filter).await?;
    Ok(Json(markers))
}

/// Place a marker
pub async fn create_marker(
    State(state): State<AppState>,
    user: UserContext,
    ip: ClientIp,
    Json(req): Json<CreateMarker>,
) -> AppResult<(StatusCode, Json<MapMarker>)> {
    req.validate()?;

    if let Some(report_id) = req.report_id {
        let report = Report::find_by_id(&state.pool, report_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Linked report not found".to_string()))?;
        ensure_can_view_report(&user, &report)?;
    }
    if let Some(alert_id) = req.alert_id {
        if Alert::find_by_id(&state.pool, alert_id).await?.is_none() {
            return Err(AppError::NotFound("Linked alert not found".to_string()));
        }
    }

    let marker = MapMarker::create(&state.pool, &req, user.user_id).await?;

    audit::user_action(
        &state, &user, &ip, "marker_created", "map_marker", Some(marker.id),
        format!("Marker '{}' at {:.4}, {:.4}", marker.title, marker.latitude, marker.longitude),
    ).await;

    Ok((StatusCode::CREATED, Json(marker)))
}

/// Remove a marker (its creator or an admin)
pub async fn delete_marker(
    State(state): State<AppState>,
    user: UserContext,
    ip: ClientIp,
    Path(id): Path<Uuid>,
) -> AppResult<Json<serde_json::Value>> {
    let marker = MapMarker::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Marker not found".to_string()))?;
    ensure_owner_or_admin(&user, marker.created_by)?;

    if !MapMarker::delete(&state.pool, id).await? {
        return Err(AppError::NotFound("Marker not found".to_string()));
    }

    audit::user_action(
        &state, &user, &ip, "marker_deleted", "map_marker", Some(id),
        format!("Marker '{}' deleted", marker.title),
    ).await;

    Ok(Json(json!({ "id": id, "deleted": true })))
}

/// Visible layers ordered by z-index
pub async fn list_layers(
    State(state): State<AppState>,
    _user: UserContext,
) -> AppResult<Json<Vec<GeoLayer>>> {
    Ok(Json(GeoLayer::list(&state.pool).await?))
}

/// Add a GeoJSON layer
pub async fn create_layer(
    State(state): State<AppState>,
    user: UserContext,
    ip: ClientIp,
    Json(req): Json<CreateLayer>,
) -> AppResult<(StatusCode, Json<GeoLayer>)> {
    req.validate()?;

    let layer = GeoLayer::create(&state.pool, &req, user.user_id).await?;

    audit::user_action(
        &state, &user, &ip, "layer_created", "geo_layer", Some(layer.id),
        format!("Layer '{}' ({})", layer.name, layer.layer_type),
    ).await;

    Ok((StatusCode::CREATED, Json(layer)))
}
