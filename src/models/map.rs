//! Map model (markers and GeoJSON layers)

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use validator::{Validate, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerType {
    Intel,
    Threat,
    Asset,
    Agent,
    Incident,
    Operation,
    Base,
    Checkpoint,
    Custom,
}

impl MarkerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Intel => "intel",
            Self::Threat => "threat",
            Self::Asset => "asset",
            Self::Agent => "agent",
            Self::Incident => "incident",
            Self::Operation => "operation",
            Self::Base => "base",
            Self::Checkpoint => "checkpoint",
            Self::Custom => "custom",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MapMarker {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub marker_type: String,
    pub created_by: Uuid,
    pub report_id: Option<Uuid>,
    pub alert_id: Option<Uuid>,
    pub color: Option<String>,
    pub icon: Option<String>,
    pub is_visible: bool,
    pub min_zoom_level: Option<i32>,
    pub custom_data: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GeoLayer {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub layer_type: String,
    pub geo_data: serde_json::Value,
    pub created_by: Uuid,
    pub color: Option<String>,
    pub fill_color: Option<String>,
    pub stroke_width: Option<i32>,
    pub opacity: Option<f64>,
    pub is_visible: bool,
    pub is_interactive: bool,
    pub min_zoom_level: Option<i32>,
    pub z_index: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateMarker {
    #[validate(length(min = 1, max = 255))]
    pub title: String,
    pub description: Option<String>,
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: f64,
    pub marker_type: MarkerType,
    pub report_id: Option<Uuid>,
    pub alert_id: Option<Uuid>,
    #[validate(length(max = 50))]
    pub color: Option<String>,
    #[validate(length(max = 50))]
    pub icon: Option<String>,
    #[serde(default = "default_true")]
    pub is_visible: bool,
    #[validate(range(min = 0, max = 22))]
    pub min_zoom_level: Option<i32>,
    pub custom_data: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateLayer {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub description: Option<String>,
    #[validate(length(min = 1, max = 50))]
    pub layer_type: String,
    #[validate(custom(function = "validate_geojson"))]
    pub geo_data: serde_json::Value,
    pub color: Option<String>,
    pub fill_color: Option<String>,
    #[validate(range(min = 0, max = 50))]
    pub stroke_width: Option<i32>,
    #[validate(range(min = 0.0, max = 1.0))]
    pub opacity: Option<f64>,
    #[serde(default = "default_true")]
    pub is_visible: bool,
    #[serde(default = "default_true")]
    pub is_interactive: bool,
    pub min_zoom_level: Option<i32>,
    #[serde(default)]
    pub z_index: i32,
}

#[derive(Debug, Default, Deserialize)]
pub struct MarkerFilter {
    pub marker_type: Option<MarkerType>,
    pub report_id: Option<Uuid>,
    pub alert_id: Option<Uuid>,
    #[serde(default)]
    pub include_hidden: bool,
}

fn default_true() -> bool {
    true
}

/// GeoJSON documents are objects carrying a string `type`
fn validate_geojson(value: &serde_json::Value) -> Result<(), ValidationError> {
    match value.get("type").and_then(|t| t.as_str()) {
        Some(_) => Ok(()),
        None => Err(ValidationError::new("geojson_type_missing")),
    }
}

const MARKER_LIST_CAP: i64 = 500;

impl MapMarker {
    pub async fn create(pool: &PgPool, data: &CreateMarker, created_by: Uuid) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, MapMarker>(
            r#"
            INSERT INTO map_markers (title, description, latitude, longitude, marker_type, created_by,
                                     report_id, alert_id, color, icon, is_visible, min_zoom_level, custom_data)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING *
            "#
        )
        .bind(&data.title)
        .bind(&data.description)
        .bind(data.latitude)
        .bind(data.longitude)
        .bind(data.marker_type.as_str())
        .bind(created_by)
        .bind(data.report_id)
        .bind(data.alert_id)
        .bind(&data.color)
        .bind(&data.icon)
        .bind(data.is_visible)
        .bind(data.min_zoom_level)
        .bind(&data.custom_data)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, MapMarker>("SELECT * FROM map_markers WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Markers tied to a report are only returned when the report's
    /// classification is in `allowed`.
    pub async fn list_visible(
        pool: &PgPool,
        allowed: &[String],
        filter: &MarkerFilter,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, MapMarker>(
            r#"
            SELECT m.* FROM map_markers m
            LEFT JOIN reports r ON r.id = m.report_id
            WHERE (m.report_id IS NULL OR r.classification = ANY($1))
              AND ($2::text IS NULL OR m.marker_type = $2)
              AND ($3::uuid IS NULL OR m.report_id = $3)
              AND ($4::uuid IS NULL OR m.alert_id = $4)
              AND ($5 OR m.is_visible = true)
            ORDER BY m.created_at DESC
            LIMIT $6
            "#
        )
        .bind(allowed)
        .bind(filter.marker_type.map(|t| t.as_str()))
        .bind(filter.report_id)
        .bind(filter.alert_id)
        .bind(filter.include_hidden)
        .bind(MARKER_LIST_CAP)
        .fetch_all(pool)
        .await
    }

    pub async fn list_since(
        pool: &PgPool,
        allowed: &[String],
        since: DateTime<Utc>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, MapMarker>(
            r#"
            SELECT m.* FROM map_markers m
            LEFT JOIN reports r ON r.id = m.report_id
            WHERE (m.report_id IS NULL OR r.classification = ANY($1))
              AND m.created_at >= $2
            ORDER BY m.created_at DESC
            "#
        )
        .bind(allowed)
        .bind(since)
        .fetch_all(pool)
        .await
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM map_markers WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

impl GeoLayer {
    pub async fn create(pool: &PgPool, data: &CreateLayer, created_by: Uuid) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, GeoLayer>(
            r#"
            INSERT INTO geo_layers (name, description, layer_type, geo_data, created_by, color, fill_color,
                                    stroke_width, opacity, is_visible, is_interactive, min_zoom_level, z_index)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING *
            "#
        )
        .bind(&data.name)
        .bind(&data.description)
        .bind(&data.layer_type)
        .bind(&data.geo_data)
        .bind(created_by)
        .bind(&data.color)
        .bind(&data.fill_color)
        .bind(data.stroke_width)
        .bind(data.opacity)
        .bind(data.is_visible)
        .bind(data.is_interactive)
        .bind(data.min_zoom_level)
        .bind(data.z_index)
        .fetch_one(pool)
        .await
    }

    pub async fn list(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, GeoLayer>(
            "SELECT * FROM geo_layers WHERE is_visible = true ORDER BY z_index ASC, created_at ASC"
        )
        .fetch_all(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_marker_coordinates_validated() {
        let ok: CreateMarker = serde_json::from_value(json!({
            "title": "Checkpoint Bravo",
            "latitude": 48.85,
            "longitude": 2.35,
            "marker_type": "checkpoint"
        })).unwrap();
        assert!(ok.validate().is_ok());
        assert!(ok.is_visible);

        let off_map: CreateMarker = serde_json::from_value(json!({
            "title": "Nowhere",
            "latitude": 91.0,
            "longitude": 2.35,
            "marker_type": "custom"
        })).unwrap();
        assert!(off_map.validate().is_err());
    }

    #[test]
    fn test_layer_requires_geojson_type() {
        let ok: CreateLayer = serde_json::from_value(json!({
            "name": "Exclusion zone",
            "layer_type": "polygon",
            "geo_data": {"type": "Polygon", "coordinates": [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0]]]}
        })).unwrap();
        assert!(ok.validate().is_ok());
        assert_eq!(ok.z_index, 0);

        let bad: CreateLayer = serde_json::from_value(json!({
            "name": "Exclusion zone",
            "layer_type": "polygon",
            "geo_data": [1, 2, 3]
        })).unwrap();
        assert!(bad.validate().is_err());
    }
}
