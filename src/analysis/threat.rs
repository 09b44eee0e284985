//! Threat and credibility scoring

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::keywords::{self, REPORT_THREAT_KEYWORDS, TAG_KEYWORDS, THREAT_KEYWORDS};
use crate::models::Report;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatLevel {
    Negligible,
    Low,
    Medium,
    High,
    Critical,
}

impl ThreatLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatLevel::Negligible => "negligible",
            ThreatLevel::Low => "low",
            ThreatLevel::Medium => "medium",
            ThreatLevel::High => "high",
            ThreatLevel::Critical => "critical",
        }
    }
}

impl std::fmt::Display for ThreatLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Body of `POST /ai/analyze-threat`
#[derive(Debug, Clone, Deserialize)]
pub struct ThreatRequest {
    #[serde(default)]
    pub content: String,
    pub source: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ThreatAnalysis {
    pub threat_level: ThreatLevel,
    pub credibility_score: u32,
    pub factors: Vec<String>,
    pub summary: String,
    pub source: String,
    pub location: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Entities {
    pub locations: Vec<String>,
    pub persons: Vec<String>,
    pub organizations: Vec<String>,
    pub dates: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportAnalysis {
    pub summary: String,
    pub threat_level: ThreatLevel,
    pub credibility_score: u32,
    pub suggested_tags: Vec<String>,
    pub entities: Entities,
    /// Filled by the caller, which has access to the store
    pub related_reports: Vec<Uuid>,
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// SCORING
// ============================================================================

/// First level (most severe first) with at least one keyword hit
fn classify(text: &str, table: &[(ThreatLevel, &[&'static str])]) -> (ThreatLevel, Vec<&'static str>) {
    for (level, words) in table {
        let found = keywords::matches(text, words);
        if !found.is_empty() {
            return (*level, found);
        }
    }
    (ThreatLevel::Negligible, Vec::new())
}

/// Classify free text by keyword severity.
///
/// Credibility is one point per five words, capped at 100.
pub fn analyze_threat(request: &ThreatRequest) -> ThreatAnalysis {
    let content = request.content.to_lowercase();
    let (threat_level, factors) = classify(&content, THREAT_KEYWORDS);

    let word_count = request.content.split_whitespace().count() as u32;
    let credibility_score = (word_count / 5).min(100);

    let factors: Vec<String> = factors.into_iter().map(str::to_string).collect();
    let summary = format!(
        "Threat analysis complete. Level: {}. Factors identified: {}",
        threat_level,
        factors.join(", ")
    );

    ThreatAnalysis {
        threat_level,
        credibility_score,
        factors,
        summary,
        source: request.source.clone().unwrap_or_else(|| "unknown".to_string()),
        location: request.location.clone().unwrap_or_else(|| "unknown".to_string()),
        timestamp: Utc::now(),
    }
}

/// Credibility out of 100: length (max 20), detail (30 above 200 words,
/// else 15), source (20), location (15) and a base of 15.
pub fn report_credibility(content: &str, has_source: bool, has_location: bool) -> u32 {
    let length = (content.chars().count() as f64 / 1000.0).min(1.0) * 20.0;
    let details = if content.split_whitespace().count() > 200 { 30.0 } else { 15.0 };
    let source = if has_source { 20.0 } else { 0.0 };
    let location = if has_location { 15.0 } else { 0.0 };
    let base = 15.0;

    (length + details + source + location + base) as u32
}

fn present(value: &Option<String>) -> bool {
    value.as_deref().map(|v| !v.trim().is_empty()).unwrap_or(false)
}

/// Tags, threat level, credibility and entities for a stored report
pub fn analyze_report(report: &Report) -> ReportAnalysis {
    let combined = format!("{} {}", report.title, report.content).to_lowercase();

    let mut suggested_tags: Vec<String> = Vec::new();
    for (keyword, tag) in TAG_KEYWORDS {
        if combined.contains(keyword) && !suggested_tags.iter().any(|t| t == tag) {
            suggested_tags.push(tag.to_string());
        }
    }

    let (threat_level, _) = classify(&combined, REPORT_THREAT_KEYWORDS);

    let credibility_score = report_credibility(
        &report.content,
        present(&report.source),
        present(&report.location),
    );

    let entities = Entities {
        locations: report.location.iter().filter(|l| !l.trim().is_empty()).cloned().collect(),
        ..Default::default()
    };

    ReportAnalysis {
        summary: format!("Analysis of report '{}' complete.", report.title),
        threat_level,
        credibility_score,
        suggested_tags,
        entities,
        related_reports: Vec::new(),
        timestamp: Utc::now(),
    }
}
