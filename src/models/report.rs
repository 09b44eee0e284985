//! Report model (reports, tags, comments, attachments)

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use validator::Validate;

use crate::access::{Classification, ReportScope};
use crate::analysis::ReportAnalysis;
use crate::error::AppError;
use crate::workflow::{Decision, ReportStatus};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Report {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub source: Option<String>,
    pub classification: String,
    pub location: Option<String>,
    pub coordinates: Option<String>,
    pub report_date: DateTime<Utc>,
    pub submitted_by: Uuid,
    pub approved_by: Option<Uuid>,
    pub status: String,
    pub rejection_reason: Option<String>,
    pub ai_analysis: Option<String>,
    pub threat_level: Option<String>,
    pub credibility_score: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Tag {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Comment {
    pub id: Uuid,
    pub report_id: Uuid,
    pub user_id: Uuid,
    pub user_name: Option<String>,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Attachment {
    pub id: Uuid,
    pub report_id: Uuid,
    pub filename: String,
    pub file_type: String,
    pub file_size: i64,
    pub file_path: String,
    pub uploaded_by: Uuid,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateReport {
    #[validate(length(min = 5, max = 255))]
    pub title: String,
    #[validate(length(min = 10))]
    pub content: String,
    pub source: Option<String>,
    pub classification: Classification,
    pub location: Option<String>,
    pub coordinates: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateReport {
    #[validate(length(min = 5, max = 255))]
    pub title: Option<String>,
    #[validate(length(min = 10))]
    pub content: Option<String>,
    pub source: Option<String>,
    pub classification: Option<Classification>,
    pub location: Option<String>,
    pub coordinates: Option<String>,
    pub status: Option<ReportStatus>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateComment {
    #[validate(length(min = 1))]
    pub content: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateAttachment {
    #[validate(length(min = 1, max = 255))]
    pub filename: String,
    #[validate(length(min = 1, max = 100))]
    pub file_type: String,
    #[validate(range(min = 0))]
    pub file_size: i64,
    #[validate(length(min = 1, max = 512))]
    pub file_path: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReportFilter {
    pub status: Option<ReportStatus>,
    pub classification: Option<Classification>,
    pub submitted_by: Option<Uuid>,
    pub approved_by: Option<Uuid>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
    pub search: Option<String>,
    pub tag: Option<String>,
}

/// Report with its tags, comments and attachments
#[derive(Debug, Serialize)]
pub struct ReportDetail {
    #[serde(flatten)]
    pub report: Report,
    pub tags: Vec<Tag>,
    pub comments: Vec<Comment>,
    pub attachments: Vec<Attachment>,
}

const REPORT_LIST_CAP: i64 = 100;

impl Report {
    pub fn classification(&self) -> Result<Classification, AppError> {
        self.classification.parse()
    }

    pub fn status(&self) -> Result<ReportStatus, AppError> {
        self.status.parse()
    }

    /// New reports enter the review queue immediately
    pub async fn create(pool: &PgPool, data: &CreateReport, submitted_by: Uuid) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Report>(
            r#"
            INSERT INTO reports (title, content, source, classification, location, coordinates, submitted_by, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending')
            RETURNING *
            "#
        )
        .bind(&data.title)
        .bind(&data.content)
        .bind(&data.source)
        .bind(data.classification.as_str())
        .bind(&data.location)
        .bind(&data.coordinates)
        .bind(submitted_by)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Report>("SELECT * FROM reports WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Reports inside `scope`, newest first
    pub async fn list_visible(
        pool: &PgPool,
        scope: &ReportScope,
        filter: &ReportFilter,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let search = filter.search.as_ref().map(|s| format!("%{}%", s));

        sqlx::query_as::<_, Report>(
            r#"
            SELECT r.* FROM reports r
            WHERE r.classification = ANY($1)
              AND ($2::text IS NULL OR r.status = $2)
              AND ($3::text IS NULL OR r.classification = $3)
              AND ($4::uuid IS NULL OR r.submitted_by = $4)
              AND ($5::uuid IS NULL OR r.approved_by = $5)
              AND ($6::timestamptz IS NULL OR r.report_date >= $6)
              AND ($7::timestamptz IS NULL OR r.report_date <= $7)
              AND ($8::text IS NULL OR r.title ILIKE $8 OR r.content ILIKE $8)
              AND ($9::text IS NULL OR EXISTS (
                    SELECT 1 FROM report_tags rt JOIN tags t ON t.id = rt.tag_id
                    WHERE rt.report_id = r.id AND t.name = $9))
              AND ($11::uuid IS NULL OR r.submitted_by = $11)
            ORDER BY r.report_date DESC
            LIMIT $10
            "#
        )
        .bind(&scope.allowed)
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.classification.map(|c| c.as_str()))
        .bind(filter.submitted_by)
        .bind(filter.approved_by)
        .bind(filter.from_date)
        .bind(filter.to_date)
        .bind(search)
        .bind(&filter.tag)
        .bind(REPORT_LIST_CAP)
        .bind(scope.submitted_by)
        .fetch_all(pool)
        .await
    }

    /// Reports created since `since`, for summaries and anomaly detection
    pub async fn list_since(
        pool: &PgPool,
        scope: &ReportScope,
        since: DateTime<Utc>,
        classification: Option<Classification>,
        location: Option<&str>,
        tags: &[String],
    ) -> Result<Vec<Self>, sqlx::Error> {
        let location = location.map(|l| format!("%{}%", l));

        sqlx::query_as::<_, Report>(
            r#"
            SELECT r.* FROM reports r
            WHERE r.classification = ANY($1)
              AND r.created_at >= $2
              AND ($3::text IS NULL OR r.classification = $3)
              AND ($4::text IS NULL OR r.location ILIKE $4)
              AND (cardinality($5::text[]) = 0 OR EXISTS (
                    SELECT 1 FROM report_tags rt JOIN tags t ON t.id = rt.tag_id
                    WHERE rt.report_id = r.id AND t.name = ANY($5)))
              AND ($6::uuid IS NULL OR r.submitted_by = $6)
            ORDER BY r.created_at DESC
            "#
        )
        .bind(&scope.allowed)
        .bind(since)
        .bind(classification.map(|c| c.as_str()))
        .bind(location)
        .bind(tags)
        .bind(scope.submitted_by)
        .fetch_all(pool)
        .await
    }

    pub async fn update(pool: &PgPool, id: Uuid, data: &UpdateReport) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Report>(
            r#"
            UPDATE reports SET
                title = COALESCE($2, title),
                content = COALESCE($3, content),
                source = COALESCE($4, source),
                classification = COALESCE($5, classification),
                location = COALESCE($6, location),
                coordinates = COALESCE($7, coordinates),
                status = COALESCE($8, status),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#
        )
        .bind(id)
        .bind(&data.title)
        .bind(&data.content)
        .bind(&data.source)
        .bind(data.classification.map(|c| c.as_str()))
        .bind(&data.location)
        .bind(&data.coordinates)
        .bind(data.status.map(|s| s.as_str()))
        .fetch_optional(pool)
        .await
    }

    /// Persist a review outcome; the `status = 'pending'` guard keeps two
    /// concurrent reviewers from both deciding.
    pub async fn record_decision(
        pool: &PgPool,
        id: Uuid,
        reviewer: Uuid,
        decision: &Decision,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Report>(
            r#"
            UPDATE reports
            SET status = $2, approved_by = $3, rejection_reason = $4, updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING *
            "#
        )
        .bind(id)
        .bind(decision.status().as_str())
        .bind(reviewer)
        .bind(decision.reason())
        .fetch_optional(pool)
        .await
    }

    pub async fn apply_analysis(
        pool: &PgPool,
        id: Uuid,
        analysis: &ReportAnalysis,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Report>(
            r#"
            UPDATE reports
            SET ai_analysis = $2, threat_level = $3, credibility_score = $4, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#
        )
        .bind(id)
        .bind(&analysis.summary)
        .bind(analysis.threat_level.as_str())
        .bind(analysis.credibility_score as i32)
        .fetch_optional(pool)
        .await
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Report>("DELETE FROM reports WHERE id = $1 RETURNING *")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Other reports in scope sharing at least one tag
    pub async fn related(
        pool: &PgPool,
        id: Uuid,
        scope: &ReportScope,
    ) -> Result<Vec<Uuid>, sqlx::Error> {
        sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT DISTINCT r.id FROM reports r
            JOIN report_tags rt ON rt.report_id = r.id
            WHERE rt.tag_id IN (SELECT tag_id FROM report_tags WHERE report_id = $1)
              AND r.id <> $1
              AND r.classification = ANY($2)
              AND ($3::uuid IS NULL OR r.submitted_by = $3)
            LIMIT 10
            "#
        )
        .bind(id)
        .bind(&scope.allowed)
        .bind(scope.submitted_by)
        .fetch_all(pool)
        .await
    }

    pub async fn with_details(self, pool: &PgPool) -> Result<ReportDetail, sqlx::Error> {
        let tags = Tag::list_for_report(pool, self.id).await?;
        let comments = Comment::list_for_report(pool, self.id).await?;
        let attachments = Attachment::list_for_report(pool, self.id).await?;
        Ok(ReportDetail { report: self, tags, comments, attachments })
    }
}

impl Tag {
    /// Find or create a tag by name
    pub async fn upsert(pool: &PgPool, name: &str) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Tag>(
            r#"
            INSERT INTO tags (name) VALUES ($1)
            ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
            RETURNING id, name
            "#
        )
        .bind(name)
        .fetch_one(pool)
        .await
    }

    pub async fn list(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Tag>("SELECT id, name FROM tags ORDER BY name ASC")
            .fetch_all(pool)
            .await
    }

    pub async fn list_for_report(pool: &PgPool, report_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Tag>(
            r#"
            SELECT t.id, t.name FROM tags t
            JOIN report_tags rt ON rt.tag_id = t.id
            WHERE rt.report_id = $1
            ORDER BY t.name ASC
            "#
        )
        .bind(report_id)
        .fetch_all(pool)
        .await
    }

    pub async fn attach(pool: &PgPool, report_id: Uuid, tag_id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO report_tags (report_id, tag_id) VALUES ($1, $2) ON CONFLICT DO NOTHING"
        )
        .bind(report_id)
        .bind(tag_id)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn detach(pool: &PgPool, report_id: Uuid, name: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM report_tags
            WHERE report_id = $1 AND tag_id = (SELECT id FROM tags WHERE name = $2)
            "#
        )
        .bind(report_id)
        .bind(name)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

impl Comment {
    pub async fn create(pool: &PgPool, report_id: Uuid, user_id: Uuid, content: &str) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Comment>(
            r#"
            WITH inserted AS (
                INSERT INTO comments (report_id, user_id, content)
                VALUES ($1, $2, $3)
                RETURNING *
            )
            SELECT i.id, i.report_id, i.user_id, u.full_name AS user_name, i.content, i.created_at, i.updated_at
            FROM inserted i
            LEFT JOIN users u ON u.id = i.user_id
            "#
        )
        .bind(report_id)
        .bind(user_id)
        .bind(content)
        .fetch_one(pool)
        .await
    }

    pub async fn list_for_report(pool: &PgPool, report_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Comment>(
            r#"
            SELECT c.id, c.report_id, c.user_id, u.full_name AS user_name, c.content, c.created_at, c.updated_at
            FROM comments c
            LEFT JOIN users u ON u.id = c.user_id
            WHERE c.report_id = $1
            ORDER BY c.created_at ASC
            "#
        )
        .bind(report_id)
        .fetch_all(pool)
        .await
    }
}

impl Attachment {
    pub async fn create(
        pool: &PgPool,
        report_id: Uuid,
        uploaded_by: Uuid,
        data: &CreateAttachment,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Attachment>(
            r#"
            INSERT INTO attachments (report_id, filename, file_type, file_size, file_path, uploaded_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#
        )
        .bind(report_id)
        .bind(&data.filename)
        .bind(&data.file_type)
        .bind(data.file_size)
        .bind(&data.file_path)
        .bind(uploaded_by)
        .fetch_one(pool)
        .await
    }

    pub async fn list_for_report(pool: &PgPool, report_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Attachment>(
            "SELECT * FROM attachments WHERE report_id = $1 ORDER BY uploaded_at ASC"
        )
        .bind(report_id)
        .fetch_all(pool)
        .await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_report(submitted_by: Uuid, classification: &str, status: &str) -> Report {
        let now = Utc::now();
        Report {
            id: Uuid::new_v4(),
            title: "Movement near the eastern border".to_string(),
            content: "Several unidentified vehicles observed crossing at 0300.".to_string(),
            source: Some("Observation post Alpha-3".to_string()),
            classification: classification.to_string(),
            location: Some("48.3794 N, 25.5583 E".to_string()),
            coordinates: None,
            report_date: now,
            submitted_by,
            approved_by: None,
            status: status.to_string(),
            rejection_reason: None,
            ai_analysis: None,
            threat_level: None,
            credibility_score: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_create_report_validation() {
        let req: CreateReport = serde_json::from_value(serde_json::json!({
            "title": "Intercept",
            "content": "Encrypted traffic spike in sector Delta",
            "classification": "secret"
        })).unwrap();
        assert!(req.validate().is_ok());
        assert_eq!(req.classification, Classification::Secret);

        let short: CreateReport = serde_json::from_value(serde_json::json!({
            "title": "Hi",
            "content": "too short",
            "classification": "confidential"
        })).unwrap();
        assert!(short.validate().is_err());

        let bad_class = serde_json::from_value::<CreateReport>(serde_json::json!({
            "title": "Intercept",
            "content": "Encrypted traffic spike in sector Delta",
            "classification": "cosmic"
        }));
        assert!(bad_class.is_err());
    }

    #[test]
    fn test_report_accessors() {
        let report = sample_report(Uuid::new_v4(), "top_secret", "pending");
        assert_eq!(report.classification().unwrap(), Classification::TopSecret);
        assert_eq!(report.status().unwrap(), ReportStatus::Pending);

        let corrupt = sample_report(Uuid::new_v4(), "ultra", "pending");
        assert!(corrupt.classification().is_err());
    }
}
