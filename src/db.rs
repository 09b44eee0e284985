//! Database module - PostgreSQL connection, schema bootstrap and demo seed

use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::access::{ClearanceLevel, Role};
use crate::handlers::auth::hash_password;
use crate::AppResult;

/// Create database connection pool
pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
}

/// Apply the schema; every statement is idempotent
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(SCHEMA_SQL)
        .execute(pool)
        .await?;

    tracing::info!("Database schema applied successfully");
    Ok(())
}

struct DemoUser {
    matricule: &'static str,
    full_name: &'static str,
    email: &'static str,
    role: Role,
    clearance: ClearanceLevel,
}

const DEMO_PASSWORD: &str = "password123";

const DEMO_USERS: &[DemoUser] = &[
    DemoUser {
        matricule: "AD-1234A",
        full_name: "Admin User",
        email: "admin@intelligence-service.com",
        role: Role::Admin,
        clearance: ClearanceLevel::TopSecret,
    },
    DemoUser {
        matricule: "CM-5678B",
        full_name: "Commander User",
        email: "commander@intelligence-service.com",
        role: Role::Commander,
        clearance: ClearanceLevel::Secret,
    },
    DemoUser {
        matricule: "FD-9012C",
        full_name: "Field Agent",
        email: "field@intelligence-service.com",
        role: Role::Field,
        clearance: ClearanceLevel::Confidential,
    },
];

/// Create the demo accounts unless they already exist
pub async fn seed_demo_users(pool: &PgPool) -> AppResult<()> {
    let mut created = 0u64;

    for demo in DEMO_USERS {
        let password_hash = hash_password(DEMO_PASSWORD)?;
        let result = sqlx::query(
            r#"
            INSERT INTO users (matricule, full_name, email, password_hash, role, clearance_level, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, true)
            ON CONFLICT (matricule) DO NOTHING
            "#
        )
        .bind(demo.matricule)
        .bind(demo.full_name)
        .bind(demo.email)
        .bind(password_hash)
        .bind(demo.role.as_str())
        .bind(demo.clearance.as_str())
        .execute(pool)
        .await?;
        created += result.rows_affected();
    }

    if created > 0 {
        tracing::warn!("Seeded {} demo account(s) with the default password; disable SEED_DEMO_USERS in production", created);
    }
    Ok(())
}

/// Database schema SQL
const SCHEMA_SQL: &str = r#"
-- Users
CREATE TABLE IF NOT EXISTS users (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    matricule VARCHAR(20) NOT NULL UNIQUE,
    full_name VARCHAR(255) NOT NULL,
    email VARCHAR(255) NOT NULL UNIQUE,
    password_hash VARCHAR(255) NOT NULL,
    role VARCHAR(20) NOT NULL DEFAULT 'field',
    clearance_level VARCHAR(20) NOT NULL DEFAULT 'confidential',
    is_active BOOLEAN NOT NULL DEFAULT true,
    last_login TIMESTAMPTZ,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

-- Reports
CREATE TABLE IF NOT EXISTS reports (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    title VARCHAR(255) NOT NULL,
    content TEXT NOT NULL,
    source VARCHAR(255),
    classification VARCHAR(20) NOT NULL DEFAULT 'confidential',
    location VARCHAR(255),
    coordinates VARCHAR(100),
    report_date TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    submitted_by UUID NOT NULL REFERENCES users(id),
    approved_by UUID REFERENCES users(id),
    status VARCHAR(20) NOT NULL DEFAULT 'pending',
    rejection_reason TEXT,
    ai_analysis TEXT,
    threat_level VARCHAR(20),
    credibility_score INT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

-- Tags
CREATE TABLE IF NOT EXISTS tags (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    name VARCHAR(100) NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS report_tags (
    report_id UUID NOT NULL REFERENCES reports(id) ON DELETE CASCADE,
    tag_id UUID NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
    PRIMARY KEY (report_id, tag_id)
);

-- Comments
CREATE TABLE IF NOT EXISTS comments (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    report_id UUID NOT NULL REFERENCES reports(id) ON DELETE CASCADE,
    user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    content TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

-- Attachments (metadata only)
CREATE TABLE IF NOT EXISTS attachments (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    report_id UUID NOT NULL REFERENCES reports(id) ON DELETE CASCADE,
    filename VARCHAR(255) NOT NULL,
    file_type VARCHAR(100) NOT NULL,
    file_size BIGINT NOT NULL,
    file_path VARCHAR(512) NOT NULL,
    uploaded_by UUID NOT NULL REFERENCES users(id),
    uploaded_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

-- Alerts
CREATE TABLE IF NOT EXISTS alerts (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    title VARCHAR(255) NOT NULL,
    description TEXT NOT NULL,
    alert_type VARCHAR(20) NOT NULL,
    severity VARCHAR(20) NOT NULL,
    status VARCHAR(20) NOT NULL DEFAULT 'new',
    location VARCHAR(255),
    coordinates VARCHAR(100),
    created_by UUID NOT NULL REFERENCES users(id),
    assigned_to UUID REFERENCES users(id),
    related_report_id UUID REFERENCES reports(id) ON DELETE SET NULL,
    ai_generated BOOLEAN NOT NULL DEFAULT false,
    ai_recommendations TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    resolved_at TIMESTAMPTZ
);

CREATE TABLE IF NOT EXISTS alert_actions (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    alert_id UUID NOT NULL REFERENCES alerts(id) ON DELETE CASCADE,
    user_id UUID NOT NULL REFERENCES users(id),
    action VARCHAR(50) NOT NULL,
    description TEXT NOT NULL,
    data JSONB,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS alert_notifications (
    alert_id UUID NOT NULL REFERENCES alerts(id) ON DELETE CASCADE,
    user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    notified_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    read BOOLEAN NOT NULL DEFAULT false,
    PRIMARY KEY (alert_id, user_id)
);

-- Map
CREATE TABLE IF NOT EXISTS map_markers (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    title VARCHAR(255) NOT NULL,
    description TEXT,
    latitude DOUBLE PRECISION NOT NULL,
    longitude DOUBLE PRECISION NOT NULL,
    marker_type VARCHAR(20) NOT NULL,
    created_by UUID NOT NULL REFERENCES users(id),
    report_id UUID REFERENCES reports(id) ON DELETE CASCADE,
    alert_id UUID REFERENCES alerts(id) ON DELETE CASCADE,
    color VARCHAR(50),
    icon VARCHAR(50),
    is_visible BOOLEAN NOT NULL DEFAULT true,
    min_zoom_level INT,
    custom_data JSONB,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS geo_layers (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    name VARCHAR(255) NOT NULL,
    description TEXT,
    layer_type VARCHAR(50) NOT NULL,
    geo_data JSONB NOT NULL,
    created_by UUID NOT NULL REFERENCES users(id),
    color VARCHAR(50),
    fill_color VARCHAR(50),
    stroke_width INT,
    opacity DOUBLE PRECISION,
    is_visible BOOLEAN NOT NULL DEFAULT true,
    is_interactive BOOLEAN NOT NULL DEFAULT true,
    min_zoom_level INT,
    z_index INT NOT NULL DEFAULT 0,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

-- Audit Log
CREATE TABLE IF NOT EXISTS audit_log (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    user_id UUID REFERENCES users(id) ON DELETE SET NULL,
    ip_address VARCHAR(45),
    action VARCHAR(100) NOT NULL,
    resource_type VARCHAR(50),
    resource_id VARCHAR(100),
    details TEXT,
    metadata JSONB,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

-- Indexes
CREATE INDEX IF NOT EXISTS idx_reports_status ON reports(status);
CREATE INDEX IF NOT EXISTS idx_reports_classification ON reports(classification);
CREATE INDEX IF NOT EXISTS idx_reports_submitted_by ON reports(submitted_by);
CREATE INDEX IF NOT EXISTS idx_reports_created ON reports(created_at);
CREATE INDEX IF NOT EXISTS idx_comments_report ON comments(report_id);
CREATE INDEX IF NOT EXISTS idx_attachments_report ON attachments(report_id);
CREATE INDEX IF NOT EXISTS idx_alerts_status ON alerts(status);
CREATE INDEX IF NOT EXISTS idx_alerts_severity ON alerts(severity);
CREATE INDEX IF NOT EXISTS idx_alerts_created ON alerts(created_at);
CREATE INDEX IF NOT EXISTS idx_alert_actions_alert ON alert_actions(alert_id);
CREATE INDEX IF NOT EXISTS idx_alert_notifications_user ON alert_notifications(user_id, read);
CREATE INDEX IF NOT EXISTS idx_map_markers_report ON map_markers(report_id);
CREATE INDEX IF NOT EXISTS idx_map_markers_created ON map_markers(created_at);
CREATE INDEX IF NOT EXISTS idx_audit_created ON audit_log(created_at);
CREATE INDEX IF NOT EXISTS idx_audit_user ON audit_log(user_id, created_at);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::is_valid_matricule;

    #[test]
    fn test_demo_users_cover_every_role() {
        assert_eq!(DEMO_USERS.len(), 3);
        for demo in DEMO_USERS {
            assert!(is_valid_matricule(demo.matricule), "{}", demo.matricule);
        }
        assert!(DEMO_USERS.iter().any(|d| d.role == Role::Admin && d.clearance == ClearanceLevel::TopSecret));
        assert!(DEMO_USERS.iter().any(|d| d.role == Role::Field && d.clearance == ClearanceLevel::Confidential));
    }

    #[test]
    fn test_schema_is_idempotent() {
        for line in SCHEMA_SQL.lines().filter(|l| l.starts_with("CREATE")) {
            assert!(line.contains("IF NOT EXISTS"), "{}", line);
        }
    }
}
