//! Report handlers: CRUD, approval workflow, comments, tags, attachments
//! and on-demand analysis.

use axum::{extract::{State, Path, Query}, http::StatusCode, Json};
use uuid::Uuid;
use validator::Validate;

use crate::{AppState, AppResult, AppError};
use crate::access::{
    ensure_can_edit_report, ensure_can_view_report, require_admin, require_classification,
    ReportScope,
};
use crate::analysis::ReportAnalysis;
use crate::audit;
use crate::middleware::auth::{ClientIp, UserContext};
use crate::models::{
    Attachment, Comment, CreateAttachment, CreateComment, CreateReport, Report, ReportDetail,
    ReportFilter, Tag, UpdateReport,
};
use crate::workflow::{check_status_change, decide, ReportApproval};

/// List reports visible to the caller
pub async fn list(
    State(state): State<AppState>,
    user: UserContext,
    Query(filter): Query<ReportFilter>,
) -> AppResult<Json<Vec<Report>>> {
    if let Some(classification) = filter.classification {
        require_classification(&user, classification, "list reports at this classification")?;
    }

    let reports = Report::list_visible(&state.pool, &ReportScope::for_user(&user), &filter).await?;
    Ok(Json(reports))
}

/// Submit a report; it enters the review queue and is analysed right away
pub async fn create(
    State(state): State<AppState>,
    user: UserContext,
    ip: ClientIp,
    Json(req): Json<CreateReport>,
) -> AppResult<(StatusCode, Json<Report>)> {
    req.validate()?;
    require_classification(&user, req.classification, "submit a report at this classification")?;

    let report = Report::create(&state.pool, &req, user.user_id).await?;

    audit::user_action(
        &state, &user, &ip, "report_created", "report", Some(report.id),
        format!("Report '{}' submitted ({})", report.title, report.classification),
    ).await;

    let report = if state.analysis.is_enabled() {
        match run_analysis(&state, &user, &report).await {
            Ok((analysed, _)) => analysed,
            Err(e) => {
                tracing::warn!(report_id = %report.id, "Automatic analysis failed: {:?}", e);
                report
            }
        }
    } else {
        report
    };

    Ok((StatusCode::CREATED, Json(report)))
}

/// Get a report with tags, comments and attachments
pub async fn get(
    State(state): State<AppState>,
    user: UserContext,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ReportDetail>> {
    let report = load_visible(&state, &user, id).await?;
    Ok(Json(report.with_details(&state.pool).await?))
}

/// Edit a report
pub async fn update(
    State(state): State<AppState>,
    user: UserContext,
    ip: ClientIp,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateReport>,
) -> AppResult<Json<Report>> {
    req.validate()?;

    let report = load_visible(&state, &user, id).await?;
    ensure_can_edit_report(&user, &report, req.classification)?;

    if let Some(to) = req.status {
        check_status_change(&user, report.status()?, to)?;
    }

    let updated = Report::update(&state.pool, id, &req)
        .await?
        .ok_or_else(|| AppError::NotFound("Report not found".to_string()))?;

    audit::user_action(
        &state, &user, &ip, "report_updated", "report", Some(id),
        format!("Report '{}' updated", updated.title),
    ).await;

    Ok(Json(updated))
}

/// Delete a report (admin)
pub async fn delete(
    State(state): State<AppState>,
    user: UserContext,
    ip: ClientIp,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Report>> {
    require_admin(&user)?;

    let deleted = Report::delete(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Report not found".to_string()))?;

    audit::user_action(
        &state, &user, &ip, "report_deleted", "report", Some(id),
        format!("Report '{}' deleted", deleted.title),
    ).await;

    Ok(Json(deleted))
}

/// Approve or reject a pending report
pub async fn approve(
    State(state): State<AppState>,
    user: UserContext,
    ip: ClientIp,
    Path(id): Path<Uuid>,
    Json(req): Json<ReportApproval>,
) -> AppResult<Json<Report>> {
    let report = find(&state, id).await?;
    let decision = decide(&user, &report, req)?;

    // None: another reviewer decided first
    let updated = Report::record_decision(&state.pool, id, user.user_id, &decision)
        .await?
        .ok_or_else(|| AppError::InvalidState("Report is no longer awaiting approval".to_string()))?;

    let details = match decision.reason() {
        Some(reason) => format!("Report '{}' rejected: {}", updated.title, reason),
        None => format!("Report '{}' approved", updated.title),
    };
    audit::user_action(&state, &user, &ip, decision.audit_action(), "report", Some(id), details).await;

    Ok(Json(updated))
}

/// List comments on a report
pub async fn list_comments(
    State(state): State<AppState>,
    user: UserContext,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<Comment>>> {
    load_visible(&state, &user, id).await?;
    Ok(Json(Comment::list_for_report(&state.pool, id).await?))
}

/// Comment on a report
pub async fn add_comment(
    State(state): State<AppState>,
    user: UserContext,
    Path(id): Path<Uuid>,
    Json(req): Json<CreateComment>,
) -> AppResult<(StatusCode, Json<Comment>)> {
    req.validate()?;
    load_visible(&state, &user, id).await?;

    let comment = Comment::create(&state.pool, id, user.user_id, req.content.trim()).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

/// Run the analysis engine on a report.
///
/// The result is stored only when the caller may edit the report; anyone
/// else who can read it gets the analysis back without side effects.
pub async fn analyze(
    State(state): State<AppState>,
    user: UserContext,
    ip: ClientIp,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ReportAnalysis>> {
    let report = load_visible(&state, &user, id).await?;

    let stored = may_store_analysis(&user, &report);
    let analysis = if stored {
        run_analysis(&state, &user, &report).await?.1
    } else {
        let mut analysis = state.analysis.analyze_report(&report)?;
        analysis.related_reports = Report::related(&state.pool, report.id, &ReportScope::for_user(&user)).await?;
        analysis
    };

    audit::user_action(
        &state, &user, &ip, "report_analyzed", "report", Some(id),
        format!(
            "Threat level {}, credibility {}{}",
            analysis.threat_level,
            analysis.credibility_score,
            if stored { "" } else { " (not stored)" },
        ),
    ).await;

    Ok(Json(analysis))
}

/// All known tags
pub async fn list_tags(
    State(state): State<AppState>,
    _user: UserContext,
) -> AppResult<Json<Vec<Tag>>> {
    Ok(Json(Tag::list(&state.pool).await?))
}

/// Tag a report
pub async fn add_tag(
    State(state): State<AppState>,
    user: UserContext,
    Path((id, name)): Path<(Uuid, String)>,
) -> AppResult<Json<Vec<Tag>>> {
    let name = normalize_tag(&name)?;
    let report = load_visible(&state, &user, id).await?;
    ensure_can_edit_report(&user, &report, None)?;

    let tag = Tag::upsert(&state.pool, &name).await?;
    Tag::attach(&state.pool, id, tag.id).await?;

    Ok(Json(Tag::list_for_report(&state.pool, id).await?))
}

/// Remove a tag from a report
pub async fn remove_tag(
    State(state): State<AppState>,
    user: UserContext,
    Path((id, name)): Path<(Uuid, String)>,
) -> AppResult<Json<Vec<Tag>>> {
    let name = normalize_tag(&name)?;
    let report = load_visible(&state, &user, id).await?;
    ensure_can_edit_report(&user, &report, None)?;

    if !Tag::detach(&state.pool, id, &name).await? {
        return Err(AppError::NotFound(format!("Report is not tagged '{}'", name)));
    }

    Ok(Json(Tag::list_for_report(&state.pool, id).await?))
}

/// List attachment metadata
pub async fn list_attachments(
    State(state): State<AppState>,
    user: UserContext,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<Attachment>>> {
    load_visible(&state, &user, id).await?;
    Ok(Json(Attachment::list_for_report(&state.pool, id).await?))
}

/// Register attachment metadata (file storage is handled elsewhere)
pub async fn add_attachment(
    State(state): State<AppState>,
    user: UserContext,
    Path(id): Path<Uuid>,
    Json(req): Json<CreateAttachment>,
) -> AppResult<(StatusCode, Json<Attachment>)> {
    req.validate()?;
    let report = load_visible(&state, &user, id).await?;
    ensure_can_edit_report(&user, &report, None)?;

    let attachment = Attachment::create(&state.pool, id, user.user_id, &req).await?;
    Ok((StatusCode::CREATED, Json(attachment)))
}

// ============================================================================
// HELPERS
// ============================================================================

async fn find(state: &AppState, id: Uuid) -> AppResult<Report> {
    Report::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Report not found".to_string()))
}

async fn load_visible(state: &AppState, user: &UserContext, id: Uuid) -> AppResult<Report> {
    let report = find(state, id).await?;
    ensure_can_view_report(user, &report)?;
    Ok(report)
}

/// Analyse, persist the scores and attach the suggested tags
async fn run_analysis(
    state: &AppState,
    user: &UserContext,
    report: &Report,
) -> AppResult<(Report, ReportAnalysis)> {
    let mut analysis = state.analysis.analyze_report(report)?;

    for name in &analysis.suggested_tags {
        let tag = Tag::upsert(&state.pool, name).await?;
        Tag::attach(&state.pool, report.id, tag.id).await?;
    }
    // after tagging, so fresh reports find their neighbours
    analysis.related_reports = Report::related(&state.pool, report.id, &ReportScope::for_user(user)).await?;

    let updated = Report::apply_analysis(&state.pool, report.id, &analysis)
        .await?
        .ok_or_else(|| AppError::NotFound("Report not found".to_string()))?;

    Ok((updated, analysis))
}

/// Analysis write-back rewrites tags and scores, so it follows the edit rule
fn may_store_analysis(user: &UserContext, report: &Report) -> bool {
    ensure_can_edit_report(user, report, None).is_ok()
}

const MAX_TAG_LEN: usize = 100;

fn normalize_tag(name: &str) -> AppResult<String> {
    let name = name.trim().to_lowercase();
    if name.is_empty() || name.chars().count() > MAX_TAG_LEN {
        return Err(AppError::ValidationError(format!(
            "Tag names must be between 1 and {} characters", MAX_TAG_LEN
        )));
    }
    Ok(name)
}
