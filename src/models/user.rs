//! User model

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use validator::Validate;

use crate::access::{validate_matricule, ClearanceLevel, Role};
use crate::error::AppError;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub matricule: String,
    pub full_name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: String,
    pub clearance_level: String,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateUser {
    #[validate(custom(function = "validate_matricule"))]
    pub matricule: String,
    #[validate(length(min = 1, max = 255))]
    pub full_name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    pub role: Role,
    pub clearance_level: ClearanceLevel,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateUser {
    #[validate(length(min = 1, max = 255))]
    pub full_name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: Option<String>,
    pub role: Option<Role>,
    pub clearance_level: Option<ClearanceLevel>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(custom(function = "validate_matricule"))]
    pub matricule: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub role: String,
    pub matricule: String,
    pub full_name: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePassword {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct UserInfo {
    pub id: Uuid,
    pub matricule: String,
    pub full_name: String,
    pub email: String,
    pub role: String,
    pub clearance_level: String,
    pub last_login: Option<DateTime<Utc>>,
}

/// Admin view with activity counters
#[derive(Debug, Serialize)]
pub struct UserDetail {
    #[serde(flatten)]
    pub user: User,
    pub submitted_reports_count: i64,
    pub approved_reports_count: i64,
    pub alerts_created_count: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct UserFilter {
    pub role: Option<Role>,
    pub clearance_level: Option<ClearanceLevel>,
    pub is_active: Option<bool>,
    pub search: Option<String>,
}

const USER_LIST_CAP: i64 = 100;

impl User {
    pub async fn create(pool: &PgPool, data: &CreateUser, password_hash: String) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (matricule, full_name, email, password_hash, role, clearance_level, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#
        )
        .bind(&data.matricule)
        .bind(&data.full_name)
        .bind(&data.email)
        .bind(&password_hash)
        .bind(data.role.as_str())
        .bind(data.clearance_level.as_str())
        .bind(data.is_active)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_matricule(pool: &PgPool, matricule: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE matricule = $1")
            .bind(matricule)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list(pool: &PgPool, filter: &UserFilter) -> Result<Vec<Self>, sqlx::Error> {
        let search = filter.search.as_ref().map(|s| format!("%{}%", s));

        sqlx::query_as::<_, User>(
            r#"
            SELECT * FROM users
            WHERE ($1::text IS NULL OR role = $1)
              AND ($2::text IS NULL OR clearance_level = $2)
              AND ($3::bool IS NULL OR is_active = $3)
              AND ($4::text IS NULL OR matricule ILIKE $4 OR full_name ILIKE $4 OR email ILIKE $4)
            ORDER BY matricule ASC
            LIMIT $5
            "#
        )
        .bind(filter.role.map(|r| r.as_str()))
        .bind(filter.clearance_level.map(|c| c.as_str()))
        .bind(filter.is_active)
        .bind(search)
        .bind(USER_LIST_CAP)
        .fetch_all(pool)
        .await
    }

    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        data: &UpdateUser,
        password_hash: Option<String>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET
                full_name = COALESCE($2, full_name),
                email = COALESCE($3, email),
                password_hash = COALESCE($4, password_hash),
                role = COALESCE($5, role),
                clearance_level = COALESCE($6, clearance_level),
                is_active = COALESCE($7, is_active),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#
        )
        .bind(id)
        .bind(&data.full_name)
        .bind(&data.email)
        .bind(password_hash)
        .bind(data.role.map(|r| r.as_str()))
        .bind(data.clearance_level.map(|c| c.as_str()))
        .bind(data.is_active)
        .fetch_optional(pool)
        .await
    }

    pub async fn set_password(pool: &PgPool, id: Uuid, password_hash: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn deactivate(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            "UPDATE users SET is_active = false, updated_at = NOW() WHERE id = $1 RETURNING *"
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>("DELETE FROM users WHERE id = $1 RETURNING *")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn update_last_login(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET last_login = NOW() WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn detail(self, pool: &PgPool) -> Result<UserDetail, sqlx::Error> {
        let (submitted, approved, alerts): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM reports WHERE submitted_by = $1),
                (SELECT COUNT(*) FROM reports WHERE approved_by = $1),
                (SELECT COUNT(*) FROM alerts WHERE created_by = $1)
            "#
        )
        .bind(self.id)
        .fetch_one(pool)
        .await?;

        Ok(UserDetail {
            user: self,
            submitted_reports_count: submitted,
            approved_reports_count: approved,
            alerts_created_count: alerts,
        })
    }

    pub fn role(&self) -> Result<Role, AppError> {
        self.role.parse()
    }

    pub fn clearance(&self) -> Result<ClearanceLevel, AppError> {
        self.clearance_level.parse()
    }

    pub fn to_info(&self) -> UserInfo {
        UserInfo {
            id: self.id,
            matricule: self.matricule.clone(),
            full_name: self.full_name.clone(),
            email: self.email.clone(),
            role: self.role.clone(),
            clearance_level: self.clearance_level.clone(),
            last_login: self.last_login,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_user_validation() {
        let mut req = CreateUser {
            matricule: "AF-1234P".to_string(),
            full_name: "Field Agent".to_string(),
            email: "agent@example.org".to_string(),
            password: "password123".to_string(),
            role: Role::Field,
            clearance_level: ClearanceLevel::Confidential,
            is_active: true,
        };
        assert!(req.validate().is_ok());

        req.matricule = "af-1234".to_string();
        assert!(req.validate().is_err());

        req.matricule = "AF-1234P".to_string();
        req.password = "short".to_string();
        assert!(req.validate().is_err());

        req.password = "password123".to_string();
        req.email = "not-an-email".to_string();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_create_user_deserializes_enums() {
        let req: CreateUser = serde_json::from_value(serde_json::json!({
            "matricule": "CM-5678B",
            "full_name": "Commander",
            "email": "cmd@example.org",
            "password": "password123",
            "role": "commander",
            "clearance_level": "top_secret"
        })).unwrap();
        assert_eq!(req.role, Role::Commander);
        assert_eq!(req.clearance_level, ClearanceLevel::TopSecret);
        assert!(req.is_active);

        let bad = serde_json::from_value::<CreateUser>(serde_json::json!({
            "matricule": "CM-5678B",
            "full_name": "Commander",
            "email": "cmd@example.org",
            "password": "password123",
            "role": "general",
            "clearance_level": "secret"
        }));
        assert!(bad.is_err());
    }

    #[test]
    fn test_login_request_validation() {
        let ok = LoginRequest { matricule: "AD-1234A".into(), password: "x".into() };
        assert!(ok.validate().is_ok());
        let bad = LoginRequest { matricule: "admin".into(), password: "x".into() };
        assert!(bad.validate().is_err());
    }
}
