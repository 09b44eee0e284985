//! Audit log model

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AuditLog {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub ip_address: Option<String>,
    pub action: String,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub details: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Entry to persist; `created_at` is set by the database
#[derive(Debug, Clone, Default)]
pub struct NewAuditLog {
    pub user_id: Option<Uuid>,
    pub ip_address: Option<String>,
    pub action: String,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub details: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AuditFilter {
    pub user_id: Option<Uuid>,
    pub action: Option<String>,
    pub resource_type: Option<String>,
}

const AUDIT_LIST_CAP: i64 = 200;

impl AuditLog {
    pub async fn insert(pool: &PgPool, entry: &NewAuditLog) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO audit_log (user_id, ip_address, action, resource_type, resource_id, details, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#
        )
        .bind(entry.user_id)
        .bind(&entry.ip_address)
        .bind(&entry.action)
        .bind(&entry.resource_type)
        .bind(&entry.resource_id)
        .bind(&entry.details)
        .bind(&entry.metadata)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn list_recent(pool: &PgPool, filter: &AuditFilter) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, AuditLog>(
            r#"
            SELECT * FROM audit_log
            WHERE ($1::uuid IS NULL OR user_id = $1)
              AND ($2::text IS NULL OR action = $2)
              AND ($3::text IS NULL OR resource_type = $3)
            ORDER BY created_at DESC
            LIMIT $4
            "#
        )
        .bind(filter.user_id)
        .bind(&filter.action)
        .bind(&filter.resource_type)
        .bind(AUDIT_LIST_CAP)
        .fetch_all(pool)
        .await
    }

    pub async fn list_since(pool: &PgPool, since: DateTime<Utc>) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, AuditLog>(
            "SELECT * FROM audit_log WHERE created_at >= $1 ORDER BY created_at DESC LIMIT 5000"
        )
        .bind(since)
        .fetch_all(pool)
        .await
    }
}
