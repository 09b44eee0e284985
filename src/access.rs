//! Clearance & role policy
//!
//! Pure rules shared by the middleware and handlers:
//! - which classifications a clearance level may read
//! - which roles may perform an operation
//! - who may view / edit a report

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::auth::UserContext;
use crate::models::Report;

pub const MIN_PASSWORD_LENGTH: usize = 8;

static MATRICULE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Z]{2}-\d{4}[A-Z]$").expect("matricule pattern is valid")
});

// ============================================================================
// ROLES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Commander,
    Field,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Commander => "commander",
            Self::Field => "field",
        }
    }

    /// Commanders and admins review reports and run fleet-wide analysis
    pub fn is_supervisor(&self) -> bool {
        matches!(self, Self::Admin | Self::Commander)
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "commander" => Ok(Self::Commander),
            "field" => Ok(Self::Field),
            other => Err(AppError::ValidationError(format!(
                "Role must be one of: admin, commander, field (got '{}')", other
            ))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// CLEARANCE & CLASSIFICATION
// ============================================================================

/// Personal clearance of a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClearanceLevel {
    Confidential,
    Secret,
    TopSecret,
}

/// Classification marking of a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Unclassified,
    Confidential,
    Secret,
    TopSecret,
}

impl ClearanceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Confidential => "confidential",
            Self::Secret => "secret",
            Self::TopSecret => "top_secret",
        }
    }

    pub fn rank(&self) -> u8 {
        match self {
            Self::Confidential => 1,
            Self::Secret => 2,
            Self::TopSecret => 3,
        }
    }

    pub fn at_least(&self, min: ClearanceLevel) -> bool {
        self.rank() >= min.rank()
    }

    /// Classifications readable at this clearance
    pub fn allowed_classifications(&self) -> &'static [Classification] {
        use Classification::*;
        match self {
            Self::Confidential => &[Unclassified, Confidential],
            Self::Secret => &[Unclassified, Confidential, Secret],
            Self::TopSecret => &[Unclassified, Confidential, Secret, TopSecret],
        }
    }

    pub fn permits(&self, classification: Classification) -> bool {
        self.allowed_classifications().contains(&classification)
    }

    /// Allowed classifications as strings, for `= ANY($n)` filters
    pub fn allowed_labels(&self) -> Vec<String> {
        self.allowed_classifications()
            .iter()
            .map(|c| c.as_str().to_string())
            .collect()
    }
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unclassified => "unclassified",
            Self::Confidential => "confidential",
            Self::Secret => "secret",
            Self::TopSecret => "top_secret",
        }
    }

    pub fn rank(&self) -> u8 {
        match self {
            Self::Unclassified => 0,
            Self::Confidential => 1,
            Self::Secret => 2,
            Self::TopSecret => 3,
        }
    }
}

impl FromStr for ClearanceLevel {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "confidential" => Ok(Self::Confidential),
            "secret" => Ok(Self::Secret),
            "top_secret" => Ok(Self::TopSecret),
            other => Err(AppError::ValidationError(format!(
                "Clearance level must be one of: confidential, secret, top_secret (got '{}')", other
            ))),
        }
    }
}

impl FromStr for Classification {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unclassified" => Ok(Self::Unclassified),
            "confidential" => Ok(Self::Confidential),
            "secret" => Ok(Self::Secret),
            "top_secret" => Ok(Self::TopSecret),
            other => Err(AppError::ValidationError(format!(
                "Classification must be one of: top_secret, secret, confidential, unclassified (got '{}')", other
            ))),
        }
    }
}

impl fmt::Display for ClearanceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// RBAC CHECKS
// ============================================================================

/// RBAC: Require one of the listed roles
pub fn require_roles(user: &UserContext, allowed: &[Role]) -> Result<(), AppError> {
    if !allowed.contains(&user.role) {
        tracing::warn!(
            user = %user.matricule,
            role = %user.role,
            action = "permission_denied",
            "Role {:?} required",
            allowed.iter().map(Role::as_str).collect::<Vec<_>>()
        );
        return Err(AppError::forbidden(format!(
            "Insufficient permissions. Required roles: {}",
            allowed.iter().map(Role::as_str).collect::<Vec<_>>().join(", ")
        )));
    }
    Ok(())
}

/// RBAC: Require admin role
pub fn require_admin(user: &UserContext) -> Result<(), AppError> {
    require_roles(user, &[Role::Admin])
}

/// RBAC: Require commander or admin
pub fn require_supervisor(user: &UserContext) -> Result<(), AppError> {
    require_roles(user, &[Role::Commander, Role::Admin])
}

/// Require a minimum clearance level
pub fn require_clearance(user: &UserContext, min: ClearanceLevel) -> Result<(), AppError> {
    if !user.clearance.at_least(min) {
        tracing::warn!(
            user = %user.matricule,
            clearance = %user.clearance,
            action = "clearance_denied",
            "Clearance {} required", min
        );
        return Err(AppError::forbidden(format!(
            "Insufficient clearance. Required level: {}", min
        )));
    }
    Ok(())
}

/// Require that the user's clearance covers `classification`
pub fn require_classification(
    user: &UserContext,
    classification: Classification,
    purpose: &str,
) -> Result<(), AppError> {
    if !user.clearance.permits(classification) {
        tracing::warn!(
            user = %user.matricule,
            clearance = %user.clearance,
            classification = %classification,
            "Clearance too low to {}", purpose
        );
        return Err(AppError::forbidden(format!(
            "Insufficient clearance to {} ({})", purpose, classification
        )));
    }
    Ok(())
}

// ============================================================================
// REPORT ACCESS
// ============================================================================

/// Read access to a report: classification within clearance, and field
/// agents only see what they submitted.
pub fn ensure_can_view_report(user: &UserContext, report: &Report) -> Result<(), AppError> {
    require_classification(user, report.classification()?, "access this report")?;

    if user.role == Role::Field && report.submitted_by != user.user_id {
        return Err(AppError::forbidden("Field agents can only access their own reports"));
    }
    Ok(())
}

/// Row-level read scope for report queries: the same rules as
/// `ensure_can_view_report`, expressed as SQL bind values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportScope {
    pub allowed: Vec<String>,
    pub submitted_by: Option<Uuid>,
}

impl ReportScope {
    pub fn for_user(user: &UserContext) -> Self {
        Self {
            allowed: user.clearance.allowed_labels(),
            submitted_by: (user.role == Role::Field).then_some(user.user_id),
        }
    }
}

/// Write access to a report.
///
/// `new_classification` is the requested classification, if the update
/// changes it.
pub fn ensure_can_edit_report(
    user: &UserContext,
    report: &Report,
    new_classification: Option<Classification>,
) -> Result<(), AppError> {
    let is_author = report.submitted_by == user.user_id;
    if !is_author && !user.role.is_supervisor() {
        return Err(AppError::forbidden("You are not allowed to modify this report"));
    }

    let status = report.status()?;
    if user.role != Role::Admin && status.is_terminal() {
        return Err(AppError::InvalidState(format!(
            "Cannot modify a report with status {}", status
        )));
    }

    if let Some(classification) = new_classification {
        if classification.as_str() != report.classification {
            require_classification(user, classification, "assign this classification")?;
        }
    }
    Ok(())
}

/// Only the submitter or an admin may act on a user-owned resource
pub fn ensure_owner_or_admin(user: &UserContext, owner: Uuid) -> Result<(), AppError> {
    if owner != user.user_id && user.role != Role::Admin {
        return Err(AppError::forbidden("Only the owner or an administrator can do this"));
    }
    Ok(())
}

// ============================================================================
// CREDENTIAL RULES
// ============================================================================

pub fn is_valid_matricule(matricule: &str) -> bool {
    MATRICULE_RE.is_match(matricule)
}

pub fn validate_matricule(matricule: &str) -> Result<(), validator::ValidationError> {
    if is_valid_matricule(matricule) {
        Ok(())
    } else {
        let mut err = validator::ValidationError::new("matricule");
        err.message = Some("Matricule must match XX-9999X (e.g. AF-1234P)".into());
        Err(err)
    }
}

pub fn check_password_strength(password: &str) -> Result<(), AppError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AppError::ValidationError(format!(
            "Password must be at least {} characters", MIN_PASSWORD_LENGTH
        )));
    }
    Ok(())
}

pub fn check_password_change(current: &str, new: &str) -> Result<(), AppError> {
    check_password_strength(new)?;
    if current == new {
        return Err(AppError::ValidationError(
            "New password must differ from the current one".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::report::tests::sample_report;

    fn ctx(role: Role, clearance: ClearanceLevel) -> UserContext {
        UserContext {
            user_id: Uuid::new_v4(),
            matricule: "AF-1234P".to_string(),
            role,
            clearance,
        }
    }

    #[test]
    fn test_allowed_classifications() {
        use Classification::*;
        assert_eq!(ClearanceLevel::Confidential.allowed_classifications(), &[Unclassified, Confidential]);
        assert!(ClearanceLevel::Secret.permits(Secret));
        assert!(!ClearanceLevel::Secret.permits(TopSecret));
        assert!(ClearanceLevel::TopSecret.permits(TopSecret));
        assert!(ClearanceLevel::Confidential.permits(Unclassified));
    }

    #[test]
    fn test_clearance_ordering() {
        assert!(ClearanceLevel::TopSecret.at_least(ClearanceLevel::Secret));
        assert!(ClearanceLevel::Secret.at_least(ClearanceLevel::Secret));
        assert!(!ClearanceLevel::Confidential.at_least(ClearanceLevel::Secret));
    }

    #[test]
    fn test_parse_labels() {
        assert_eq!("top_secret".parse::<Classification>().unwrap(), Classification::TopSecret);
        assert!("restricted".parse::<Classification>().is_err());
        assert_eq!("commander".parse::<Role>().unwrap(), Role::Commander);
        assert!("Admin".parse::<Role>().is_err());
        assert!("unclassified".parse::<ClearanceLevel>().is_err());
    }

    #[test]
    fn test_require_roles() {
        let field = ctx(Role::Field, ClearanceLevel::TopSecret);
        assert!(require_supervisor(&field).is_err());
        assert!(require_admin(&field).is_err());

        let commander = ctx(Role::Commander, ClearanceLevel::Secret);
        assert!(require_supervisor(&commander).is_ok());
        assert!(require_admin(&commander).is_err());
    }

    #[test]
    fn test_view_report_respects_clearance() {
        let user = ctx(Role::Commander, ClearanceLevel::Confidential);
        let report = sample_report(Uuid::new_v4(), "secret", "pending");
        let err = ensure_can_view_report(&user, &report).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let report = sample_report(Uuid::new_v4(), "confidential", "pending");
        assert!(ensure_can_view_report(&user, &report).is_ok());
    }

    #[test]
    fn test_field_agent_only_sees_own_reports() {
        let agent = ctx(Role::Field, ClearanceLevel::TopSecret);
        let own = sample_report(agent.user_id, "secret", "pending");
        let other = sample_report(Uuid::new_v4(), "unclassified", "approved");
        assert!(ensure_can_view_report(&agent, &own).is_ok());
        assert!(ensure_can_view_report(&agent, &other).is_err());
    }

    // Same predicate as the `ReportScope` binds in the report queries
    fn scope_admits(scope: &ReportScope, report: &Report) -> bool {
        scope.allowed.contains(&report.classification)
            && scope.submitted_by.map_or(true, |owner| owner == report.submitted_by)
    }

    #[test]
    fn test_report_scope_matches_view_rule() {
        let agent = ctx(Role::Field, ClearanceLevel::Confidential);
        let scope = ReportScope::for_user(&agent);
        assert_eq!(scope.submitted_by, Some(agent.user_id));
        assert_eq!(scope.allowed, vec!["unclassified", "confidential"]);

        let commander = ctx(Role::Commander, ClearanceLevel::Secret);
        assert_eq!(ReportScope::for_user(&commander).submitted_by, None);

        // Whatever the scope lets through, the single-report check allows too
        let reports = [
            sample_report(agent.user_id, "confidential", "pending"),
            sample_report(Uuid::new_v4(), "confidential", "approved"),
            sample_report(agent.user_id, "secret", "pending"),
            sample_report(commander.user_id, "unclassified", "approved"),
        ];
        for user in [&agent, &commander] {
            let scope = ReportScope::for_user(user);
            for report in &reports {
                assert_eq!(scope_admits(&scope, report), ensure_can_view_report(user, report).is_ok());
            }
        }
        assert!(!scope_admits(&ReportScope::for_user(&agent), &reports[1]));
    }

    #[test]
    fn test_edit_report_rules() {
        let author = ctx(Role::Field, ClearanceLevel::Confidential);
        let pending = sample_report(author.user_id, "confidential", "pending");
        assert!(ensure_can_edit_report(&author, &pending, None).is_ok());

        // Raising classification above own clearance
        let err = ensure_can_edit_report(&author, &pending, Some(Classification::Secret)).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        // Terminal status blocks non-admins
        let approved = sample_report(author.user_id, "confidential", "approved");
        let err = ensure_can_edit_report(&author, &approved, None).unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));

        let admin = ctx(Role::Admin, ClearanceLevel::TopSecret);
        assert!(ensure_can_edit_report(&admin, &approved, None).is_ok());

        // Another field agent is not the author
        let stranger = ctx(Role::Field, ClearanceLevel::TopSecret);
        assert!(ensure_can_edit_report(&stranger, &pending, None).is_err());

        // Commanders can edit reports they did not write
        let commander = ctx(Role::Commander, ClearanceLevel::Secret);
        assert!(ensure_can_edit_report(&commander, &pending, Some(Classification::Secret)).is_ok());
    }

    #[test]
    fn test_matricule_pattern() {
        assert!(is_valid_matricule("AF-1234P"));
        assert!(is_valid_matricule("CM-5678B"));
        assert!(!is_valid_matricule("af-1234p"));
        assert!(!is_valid_matricule("AF-123P"));
        assert!(!is_valid_matricule("AF1234P"));
        assert!(!is_valid_matricule("AF-1234PX"));
        assert!(validate_matricule("XX-0000").is_err());
    }

    #[test]
    fn test_password_rules() {
        assert!(check_password_strength("short").is_err());
        assert!(check_password_strength("longenough").is_ok());
        assert!(check_password_change("password123", "password123").is_err());
        assert!(check_password_change("password123", "password456").is_ok());
    }
}
