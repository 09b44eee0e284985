//! Alert model (alerts, actions, notifications)

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use validator::Validate;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    Tactical,
    Strategic,
    Cyber,
    Intel,
    Field,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    New,
    Acknowledged,
    InProgress,
    Resolved,
    Closed,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tactical => "tactical",
            Self::Strategic => "strategic",
            Self::Cyber => "cyber",
            Self::Intel => "intel",
            Self::Field => "field",
            Self::System => "system",
        }
    }
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Acknowledged => "acknowledged",
            Self::InProgress => "in_progress",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
        }
    }

    pub fn is_open(&self) -> bool {
        !matches!(self, Self::Resolved | Self::Closed)
    }
}

impl FromStr for AlertType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tactical" => Ok(Self::Tactical),
            "strategic" => Ok(Self::Strategic),
            "cyber" => Ok(Self::Cyber),
            "intel" => Ok(Self::Intel),
            "field" => Ok(Self::Field),
            "system" => Ok(Self::System),
            other => Err(AppError::ValidationError(format!("Unknown alert type '{}'", other))),
        }
    }
}

impl FromStr for AlertSeverity {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(AppError::ValidationError(format!("Unknown alert severity '{}'", other))),
        }
    }
}

impl FromStr for AlertStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(Self::New),
            "acknowledged" => Ok(Self::Acknowledged),
            "in_progress" => Ok(Self::InProgress),
            "resolved" => Ok(Self::Resolved),
            "closed" => Ok(Self::Closed),
            other => Err(AppError::ValidationError(format!("Unknown alert status '{}'", other))),
        }
    }
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Alert {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub alert_type: String,
    pub severity: String,
    pub status: String,
    pub location: Option<String>,
    pub coordinates: Option<String>,
    pub created_by: Uuid,
    pub assigned_to: Option<Uuid>,
    pub related_report_id: Option<Uuid>,
    pub ai_generated: bool,
    pub ai_recommendations: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AlertAction {
    pub id: Uuid,
    pub alert_id: Uuid,
    pub user_id: Uuid,
    pub action: String,
    pub description: String,
    pub data: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Notification row joined with the alert it points at
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AlertNotification {
    pub alert_id: Uuid,
    pub user_id: Uuid,
    pub notified_at: DateTime<Utc>,
    pub read: bool,
    pub title: String,
    pub severity: String,
    pub status: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateAlert {
    #[validate(length(min = 5, max = 255))]
    pub title: String,
    #[validate(length(min = 10))]
    pub description: String,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub location: Option<String>,
    pub coordinates: Option<String>,
    pub related_report_id: Option<Uuid>,
    pub assigned_to: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateAlert {
    #[validate(length(min = 5, max = 255))]
    pub title: Option<String>,
    #[validate(length(min = 10))]
    pub description: Option<String>,
    pub severity: Option<AlertSeverity>,
    pub status: Option<AlertStatus>,
    pub location: Option<String>,
    pub coordinates: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AssignAlert {
    pub assigned_to: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ResolveAlert {
    pub resolution: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NotifyUsers {
    pub user_ids: Vec<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AlertFilter {
    pub status: Option<AlertStatus>,
    pub severity: Option<AlertSeverity>,
    pub alert_type: Option<AlertType>,
    pub assigned_to: Option<Uuid>,
    pub search: Option<String>,
}

const ALERT_LIST_CAP: i64 = 100;

impl Alert {
    pub fn severity(&self) -> Result<AlertSeverity, AppError> {
        self.severity.parse()
    }

    pub fn alert_type(&self) -> Result<AlertType, AppError> {
        self.alert_type.parse()
    }

    pub fn status(&self) -> Result<AlertStatus, AppError> {
        self.status.parse()
    }

    pub async fn create(pool: &PgPool, data: &CreateAlert, created_by: Uuid) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Alert>(
            r#"
            INSERT INTO alerts (title, description, alert_type, severity, location, coordinates,
                                created_by, assigned_to, related_report_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#
        )
        .bind(&data.title)
        .bind(&data.description)
        .bind(data.alert_type.as_str())
        .bind(data.severity.as_str())
        .bind(&data.location)
        .bind(&data.coordinates)
        .bind(created_by)
        .bind(data.assigned_to)
        .bind(data.related_report_id)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Alert>("SELECT * FROM alerts WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list(pool: &PgPool, filter: &AlertFilter) -> Result<Vec<Self>, sqlx::Error> {
        let search = filter.search.as_ref().map(|s| format!("%{}%", s));

        sqlx::query_as::<_, Alert>(
            r#"
            SELECT * FROM alerts
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::text IS NULL OR severity = $2)
              AND ($3::text IS NULL OR alert_type = $3)
              AND ($4::uuid IS NULL OR assigned_to = $4)
              AND ($5::text IS NULL OR title ILIKE $5 OR description ILIKE $5)
            ORDER BY created_at DESC
            LIMIT $6
            "#
        )
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.severity.map(|s| s.as_str()))
        .bind(filter.alert_type.map(|t| t.as_str()))
        .bind(filter.assigned_to)
        .bind(search)
        .bind(ALERT_LIST_CAP)
        .fetch_all(pool)
        .await
    }

    pub async fn list_since(pool: &PgPool, since: DateTime<Utc>) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Alert>(
            "SELECT * FROM alerts WHERE created_at >= $1 ORDER BY created_at DESC"
        )
        .bind(since)
        .fetch_all(pool)
        .await
    }

    /// Moving to resolved stamps `resolved_at`; reopening clears it.
    pub async fn update(pool: &PgPool, id: Uuid, data: &UpdateAlert) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Alert>(
            r#"
            UPDATE alerts SET
                title = COALESCE($2, title),
                description = COALESCE($3, description),
                severity = COALESCE($4, severity),
                status = COALESCE($5, status),
                location = COALESCE($6, location),
                coordinates = COALESCE($7, coordinates),
                resolved_at = CASE
                    WHEN $5 = 'resolved' AND resolved_at IS NULL THEN NOW()
                    WHEN $5 IN ('new', 'acknowledged', 'in_progress') THEN NULL
                    ELSE resolved_at
                END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#
        )
        .bind(id)
        .bind(&data.title)
        .bind(&data.description)
        .bind(data.severity.map(|s| s.as_str()))
        .bind(data.status.map(|s| s.as_str()))
        .bind(&data.location)
        .bind(&data.coordinates)
        .fetch_optional(pool)
        .await
    }

    /// Assigning a new alert acknowledges it
    pub async fn assign(pool: &PgPool, id: Uuid, assignee: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Alert>(
            r#"
            UPDATE alerts
            SET assigned_to = $2,
                status = CASE WHEN status = 'new' THEN 'acknowledged' ELSE status END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#
        )
        .bind(id)
        .bind(assignee)
        .fetch_optional(pool)
        .await
    }

    pub async fn resolve(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Alert>(
            r#"
            UPDATE alerts
            SET status = 'resolved', resolved_at = NOW(), updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn set_recommendations(pool: &PgPool, id: Uuid, text: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE alerts SET ai_recommendations = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(text)
            .execute(pool)
            .await?;
        Ok(())
    }
}

impl AlertAction {
    pub async fn record(
        pool: &PgPool,
        alert_id: Uuid,
        user_id: Uuid,
        action: &str,
        description: &str,
        data: Option<serde_json::Value>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, AlertAction>(
            r#"
            INSERT INTO alert_actions (alert_id, user_id, action, description, data)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#
        )
        .bind(alert_id)
        .bind(user_id)
        .bind(action)
        .bind(description)
        .bind(data)
        .fetch_one(pool)
        .await
    }

    pub async fn list_for_alert(pool: &PgPool, alert_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, AlertAction>(
            "SELECT * FROM alert_actions WHERE alert_id = $1 ORDER BY created_at ASC"
        )
        .bind(alert_id)
        .fetch_all(pool)
        .await
    }
}

impl AlertNotification {
    /// Notify each user once; returns how many new notifications were created
    pub async fn notify(pool: &PgPool, alert_id: Uuid, user_ids: &[Uuid]) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO alert_notifications (alert_id, user_id)
            SELECT $1, u.id FROM users u
            WHERE u.id = ANY($2) AND u.is_active = true
            ON CONFLICT (alert_id, user_id) DO NOTHING
            "#
        )
        .bind(alert_id)
        .bind(user_ids)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn list_for_user(pool: &PgPool, user_id: Uuid, unread_only: bool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, AlertNotification>(
            r#"
            SELECT n.alert_id, n.user_id, n.notified_at, n.read, a.title, a.severity, a.status
            FROM alert_notifications n
            JOIN alerts a ON a.id = n.alert_id
            WHERE n.user_id = $1 AND (NOT $2 OR n.read = false)
            ORDER BY n.notified_at DESC
            LIMIT 100
            "#
        )
        .bind(user_id)
        .bind(unread_only)
        .fetch_all(pool)
        .await
    }

    pub async fn mark_read(pool: &PgPool, alert_id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE alert_notifications SET read = true WHERE alert_id = $1 AND user_id = $2"
        )
        .bind(alert_id)
        .bind(user_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_round_trip_through_strings() {
        assert_eq!("in_progress".parse::<AlertStatus>().unwrap(), AlertStatus::InProgress);
        assert_eq!(AlertStatus::InProgress.as_str(), "in_progress");
        assert_eq!("cyber".parse::<AlertType>().unwrap(), AlertType::Cyber);
        assert!("urgent".parse::<AlertSeverity>().is_err());
    }

    #[test]
    fn test_severity_ordering() {
        assert!(AlertSeverity::Critical > AlertSeverity::High);
        assert!(AlertSeverity::Low < AlertSeverity::Medium);
    }

    #[test]
    fn test_open_statuses() {
        assert!(AlertStatus::New.is_open());
        assert!(AlertStatus::InProgress.is_open());
        assert!(!AlertStatus::Resolved.is_open());
        assert!(!AlertStatus::Closed.is_open());
    }

    #[test]
    fn test_create_alert_validation() {
        let req: CreateAlert = serde_json::from_value(serde_json::json!({
            "title": "Drone sighting",
            "description": "Unidentified drone above the depot",
            "alert_type": "field",
            "severity": "high"
        })).unwrap();
        assert!(req.validate().is_ok());

        let short: CreateAlert = serde_json::from_value(serde_json::json!({
            "title": "Hey",
            "description": "short",
            "alert_type": "intel",
            "severity": "low"
        })).unwrap();
        assert!(short.validate().is_err());
    }
}
