//! Alert response playbook

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::keywords::ALERT_DESCRIPTION_KEYWORDS;
use crate::models::{AlertSeverity, AlertType};

pub const AI_CONFIDENCE: f64 = 0.85;

#[derive(Debug, Clone, Serialize)]
pub struct AlertRecommendations {
    pub recommendations: Vec<String>,
    pub priority: AlertSeverity,
    pub response_time: &'static str,
    pub ai_confidence: f64,
    pub timestamp: DateTime<Utc>,
}

impl AlertRecommendations {
    /// Numbered list for storage on the alert
    pub fn to_text(&self) -> String {
        self.recommendations
            .iter()
            .enumerate()
            .map(|(i, r)| format!("{}. {}", i + 1, r))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub fn response_time(severity: AlertSeverity) -> &'static str {
    match severity {
        AlertSeverity::Critical => "immediate",
        AlertSeverity::High => "< 1 hour",
        AlertSeverity::Medium => "< 4 hours",
        AlertSeverity::Low => "< 24 hours",
    }
}

fn severity_actions(severity: AlertSeverity) -> &'static [&'static str] {
    match severity {
        AlertSeverity::Critical => &[
            "Activate the crisis cell immediately",
            "Notify all key personnel",
            "Prepare a situation report every 30 minutes",
        ],
        AlertSeverity::High => &[
            "Set up a dedicated response team",
            "Notify the main decision makers",
            "Prepare a situation report every 2 hours",
        ],
        AlertSeverity::Medium => &[
            "Reinforce monitoring of the situation",
            "Notify the officers concerned",
            "Prepare a daily report",
        ],
        AlertSeverity::Low => &[
            "Standard monitoring of the situation",
            "Record in the weekly report",
        ],
    }
}

fn type_actions(alert_type: AlertType) -> &'static [&'static str] {
    match alert_type {
        AlertType::Tactical => &[
            "Deploy reconnaissance teams in the field",
            "Prepare tactical intervention plans",
        ],
        AlertType::Strategic => &[
            "Analyse the medium and long term strategic impact",
            "Assess the implications for ongoing operations",
        ],
        AlertType::Cyber => &[
            "Isolate potentially compromised systems",
            "Activate cyber defence protocols",
            "Plan a full forensic analysis",
        ],
        AlertType::Intel => &[
            "Cross-check the information with other sources",
            "Intensify intelligence collection on this subject",
        ],
        AlertType::Field => &[
            "Deploy additional teams in the field",
            "Establish a security perimeter",
        ],
        AlertType::System => &[],
    }
}

/// Severity block, then alert-type block, then one line per description
/// keyword found.
pub fn generate_alert_recommendations(
    severity: AlertSeverity,
    alert_type: AlertType,
    description: &str,
) -> AlertRecommendations {
    let description = description.to_lowercase();

    let mut recommendations: Vec<String> = severity_actions(severity)
        .iter()
        .chain(type_actions(alert_type))
        .map(|s| s.to_string())
        .collect();

    for (words, action) in ALERT_DESCRIPTION_KEYWORDS {
        if words.iter().any(|w| description.contains(w)) {
            recommendations.push(action.to_string());
        }
    }

    AlertRecommendations {
        recommendations,
        priority: severity,
        response_time: response_time(severity),
        ai_confidence: AI_CONFIDENCE,
        timestamp: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_critical_cyber_alert() {
        let recs = generate_alert_recommendations(
            AlertSeverity::Critical,
            AlertType::Cyber,
            "Intrusion detected on the communication relay",
        );
        assert_eq!(recs.recommendations.len(), 3 + 3 + 2);
        assert_eq!(recs.recommendations[0], "Activate the crisis cell immediately");
        assert_eq!(recs.recommendations[3], "Isolate potentially compromised systems");
        assert_eq!(recs.recommendations[6], "Establish secure communication channels");
        assert_eq!(recs.recommendations[7], "Reinforce physical security measures");
        assert_eq!(recs.response_time, "immediate");
        assert_eq!(recs.priority, AlertSeverity::Critical);
        assert_eq!(recs.ai_confidence, 0.85);
    }

    #[test]
    fn test_low_system_alert_has_only_severity_block() {
        let recs = generate_alert_recommendations(AlertSeverity::Low, AlertType::System, "Disk usage is high");
        assert_eq!(recs.recommendations.len(), 2);
        assert_eq!(recs.response_time, "< 24 hours");
    }

    #[test]
    fn test_french_and_english_keywords() {
        let fr = generate_alert_recommendations(AlertSeverity::Medium, AlertType::Field, "Mouvement de civils vers le nord");
        let en = generate_alert_recommendations(AlertSeverity::Medium, AlertType::Field, "Movement of civilians to the north");
        assert_eq!(fr.recommendations, en.recommendations);
        assert!(fr.recommendations.contains(&"Track movements through satellite surveillance".to_string()));
        assert_eq!(fr.response_time, "< 4 hours");
    }

    #[test]
    fn test_to_text_numbers_lines() {
        let recs = generate_alert_recommendations(AlertSeverity::High, AlertType::Intel, "routine");
        let text = recs.to_text();
        assert!(text.starts_with("1. Set up a dedicated response team\n2. "));
        assert_eq!(text.lines().count(), 5);
    }
}
