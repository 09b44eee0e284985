//! Report approval workflow
//!
//! draft -> pending -> approved | rejected, and archived as a parking state.
//! Only commanders and admins decide; the decision is validated here and
//! persisted by `Report::record_decision`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::access::{require_classification, require_supervisor, Role};
use crate::error::AppError;
use crate::middleware::auth::UserContext;
use crate::models::Report;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Draft,
    Pending,
    Approved,
    Rejected,
    Archived,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Archived => "archived",
        }
    }

    /// Reviewed or archived: frozen for everyone but admins
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected | Self::Archived)
    }
}

impl FromStr for ReportStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "archived" => Ok(Self::Archived),
            other => Err(AppError::ValidationError(format!(
                "Status must be one of: draft, pending, approved, rejected, archived (got '{}')", other
            ))),
        }
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of `POST /reports/:id/approve`
#[derive(Debug, Clone, Deserialize)]
pub struct ReportApproval {
    pub approved: bool,
    #[serde(default)]
    pub rejection_reason: Option<String>,
}

/// Validated outcome of a review
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject { reason: String },
}

impl Decision {
    pub fn status(&self) -> ReportStatus {
        match self {
            Decision::Approve => ReportStatus::Approved,
            Decision::Reject { .. } => ReportStatus::Rejected,
        }
    }

    pub fn audit_action(&self) -> &'static str {
        match self {
            Decision::Approve => "report_approved",
            Decision::Reject { .. } => "report_rejected",
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Decision::Approve => None,
            Decision::Reject { reason } => Some(reason.as_str()),
        }
    }
}

impl TryFrom<ReportApproval> for Decision {
    type Error = AppError;

    fn try_from(approval: ReportApproval) -> Result<Self, Self::Error> {
        if approval.approved {
            return Ok(Decision::Approve);
        }
        match approval.rejection_reason.map(|r| r.trim().to_string()) {
            Some(reason) if !reason.is_empty() => Ok(Decision::Reject { reason }),
            _ => Err(AppError::ValidationError(
                "A rejection reason is required when rejecting a report".to_string(),
            )),
        }
    }
}

/// Check that `reviewer` may apply `approval` to `report`.
pub fn decide(
    reviewer: &UserContext,
    report: &Report,
    approval: ReportApproval,
) -> Result<Decision, AppError> {
    require_supervisor(reviewer)?;

    let status = report.status()?;
    if status != ReportStatus::Pending {
        return Err(AppError::InvalidState(format!(
            "Report is not awaiting approval (current status: {})", status
        )));
    }

    require_classification(reviewer, report.classification()?, "approve this report")?;

    Decision::try_from(approval)
}

/// Validate a status change requested through the generic update.
///
/// Authors may move drafts to pending (or back); review outcomes only come
/// through `decide`, except for admins who may set any status.
pub fn check_status_change(
    user: &UserContext,
    from: ReportStatus,
    to: ReportStatus,
) -> Result<(), AppError> {
    if from == to || user.role == Role::Admin {
        return Ok(());
    }
    match (from, to) {
        (ReportStatus::Draft, ReportStatus::Pending)
        | (ReportStatus::Pending, ReportStatus::Draft) => Ok(()),
        (ReportStatus::Pending | ReportStatus::Draft, ReportStatus::Archived)
            if user.role.is_supervisor() => Ok(()),
        _ => Err(AppError::InvalidState(format!(
            "Cannot change report status from {} to {}", from, to
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::ClearanceLevel;
    use crate::models::report::tests::sample_report;
    use uuid::Uuid;

    fn reviewer(role: Role, clearance: ClearanceLevel) -> UserContext {
        UserContext {
            user_id: Uuid::new_v4(),
            matricule: "CM-5678B".to_string(),
            role,
            clearance,
        }
    }

    fn approve() -> ReportApproval {
        ReportApproval { approved: true, rejection_reason: None }
    }

    #[test]
    fn test_commander_approves_pending_report() {
        let commander = reviewer(Role::Commander, ClearanceLevel::Secret);
        let report = sample_report(Uuid::new_v4(), "secret", "pending");
        let decision = decide(&commander, &report, approve()).unwrap();
        assert_eq!(decision, Decision::Approve);
        assert_eq!(decision.status(), ReportStatus::Approved);
    }

    #[test]
    fn test_field_agent_cannot_decide() {
        let agent = reviewer(Role::Field, ClearanceLevel::TopSecret);
        let report = sample_report(Uuid::new_v4(), "confidential", "pending");
        let err = decide(&agent, &report, approve()).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[test]
    fn test_only_pending_reports_are_decided() {
        let admin = reviewer(Role::Admin, ClearanceLevel::TopSecret);
        for status in ["draft", "approved", "rejected", "archived"] {
            let report = sample_report(Uuid::new_v4(), "secret", status);
            let err = decide(&admin, &report, approve()).unwrap_err();
            assert!(matches!(err, AppError::InvalidState(_)), "status {}", status);
        }
    }

    #[test]
    fn test_reviewer_needs_clearance() {
        let commander = reviewer(Role::Commander, ClearanceLevel::Secret);
        let report = sample_report(Uuid::new_v4(), "top_secret", "pending");
        let err = decide(&commander, &report, approve()).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[test]
    fn test_rejection_requires_reason() {
        let commander = reviewer(Role::Commander, ClearanceLevel::Secret);
        let report = sample_report(Uuid::new_v4(), "confidential", "pending");

        let missing = ReportApproval { approved: false, rejection_reason: None };
        assert!(matches!(decide(&commander, &report, missing), Err(AppError::ValidationError(_))));

        let blank = ReportApproval { approved: false, rejection_reason: Some("   ".into()) };
        assert!(decide(&commander, &report, blank).is_err());

        let given = ReportApproval { approved: false, rejection_reason: Some("Unverified source".into()) };
        let decision = decide(&commander, &report, given).unwrap();
        assert_eq!(decision.status(), ReportStatus::Rejected);
        assert_eq!(decision.reason(), Some("Unverified source"));
        assert_eq!(decision.audit_action(), "report_rejected");
    }

    #[test]
    fn test_status_change_rules() {
        let author = reviewer(Role::Field, ClearanceLevel::Confidential);
        assert!(check_status_change(&author, ReportStatus::Draft, ReportStatus::Pending).is_ok());
        assert!(check_status_change(&author, ReportStatus::Pending, ReportStatus::Approved).is_err());
        assert!(check_status_change(&author, ReportStatus::Pending, ReportStatus::Archived).is_err());

        let commander = reviewer(Role::Commander, ClearanceLevel::Secret);
        assert!(check_status_change(&commander, ReportStatus::Pending, ReportStatus::Archived).is_ok());
        assert!(check_status_change(&commander, ReportStatus::Draft, ReportStatus::Rejected).is_err());

        let admin = reviewer(Role::Admin, ClearanceLevel::TopSecret);
        assert!(check_status_change(&admin, ReportStatus::Approved, ReportStatus::Archived).is_ok());
    }
}
