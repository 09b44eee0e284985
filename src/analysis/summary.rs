//! Intelligence summaries and timeframe parsing

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use super::keywords::THEME_KEYWORDS;
use super::AnalysisError;
use crate::models::Report;

static TIMEFRAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+)([hdwmy])$").expect("timeframe pattern is valid")
});

pub const EMPTY_SUMMARY: &str = "No reports available for the specified period.";

const SIGNIFICANT_REPORTS: usize = 3;

/// Parse `\d+[hdwmy]`; a month is 30 days and a year 365 days.
pub fn parse_timeframe(timeframe: &str) -> Result<Duration, AnalysisError> {
    let invalid = || AnalysisError::InvalidTimeframe(timeframe.to_string());

    let caps = TIMEFRAME_RE.captures(timeframe.trim()).ok_or_else(invalid)?;
    let amount: i64 = caps[1].parse().map_err(|_| invalid())?;

    let duration = match &caps[2] {
        "h" => Duration::try_hours(amount),
        "d" => Duration::try_days(amount),
        "w" => Duration::try_weeks(amount),
        "m" => amount.checked_mul(30).and_then(Duration::try_days),
        "y" => amount.checked_mul(365).and_then(Duration::try_days),
        _ => None,
    };
    duration.ok_or_else(invalid)
}

/// Start of the window described by `timeframe`, counted back from now
pub fn since(timeframe: &str) -> Result<DateTime<Utc>, AnalysisError> {
    let duration = parse_timeframe(timeframe)?;
    Utc::now()
        .checked_sub_signed(duration)
        .ok_or_else(|| AnalysisError::InvalidTimeframe(timeframe.to_string()))
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Plain-text summary grouped by classification.
///
/// Groups appear in order of first occurrence in `reports`.
pub fn generate_intelligence_summary(reports: &[Report], timeframe: &str) -> String {
    if reports.is_empty() {
        return EMPTY_SUMMARY.to_string();
    }

    let mut groups: Vec<(&str, Vec<&Report>)> = Vec::new();
    for report in reports {
        match groups.iter_mut().find(|(c, _)| *c == report.classification) {
            Some((_, members)) => members.push(report),
            None => groups.push((report.classification.as_str(), vec![report])),
        }
    }

    let mut lines = vec![
        format!("INTELLIGENCE SUMMARY - PERIOD: {}", timeframe),
        format!("Total reports: {}", reports.len()),
        String::new(),
    ];

    for (classification, members) in &groups {
        lines.push(format!(
            "== CLASSIFICATION: {} ({} reports) ==",
            classification.to_uppercase(),
            members.len()
        ));

        // Whole-word theme counts, one hit per report
        let mut themes: Vec<(&str, usize)> = Vec::new();
        for report in members {
            let content = report.content.to_lowercase();
            let words: Vec<&str> = content.split_whitespace().collect();
            for keyword in THEME_KEYWORDS {
                if words.contains(keyword) {
                    match themes.iter_mut().find(|(k, _)| k == keyword) {
                        Some((_, count)) => *count += 1,
                        None => themes.push((*keyword, 1)),
                    }
                }
            }
        }

        if !themes.is_empty() {
            themes.sort_by(|a, b| b.1.cmp(&a.1));
            lines.push("\nMain themes identified:".to_string());
            for (theme, count) in &themes {
                lines.push(format!("- {}: mentioned in {} report(s)", capitalize(theme), count));
            }
        }

        let mut recent = members.clone();
        recent.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        lines.push("\nSignificant reports:".to_string());
        for report in recent.iter().take(SIGNIFICANT_REPORTS) {
            lines.push(format!("- {} ({})", report.title, report.report_date.format("%d/%m/%Y")));
        }

        lines.push(String::new());
    }

    lines.push("== RECOMMENDATIONS ==".to_string());
    lines.push("1. Continue monitoring the reported activities".to_string());
    lines.push("2. Strengthen presence in the areas mentioned".to_string());
    lines.push("3. Verify report sources to confirm the information".to_string());
    lines.push("\nEnd of automatically generated summary.".to_string());

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;
    use crate::models::report::tests::sample_report;

    #[test]
    fn test_parse_timeframe_units() {
        assert_eq!(parse_timeframe("12h").unwrap(), Duration::hours(12));
        assert_eq!(parse_timeframe("7d").unwrap(), Duration::days(7));
        assert_eq!(parse_timeframe("2w").unwrap(), Duration::days(14));
        assert_eq!(parse_timeframe("1m").unwrap(), Duration::days(30));
        assert_eq!(parse_timeframe("1y").unwrap(), Duration::days(365));
    }

    #[test]
    fn test_parse_timeframe_rejects_garbage() {
        for bad in ["", "7", "d", "7x", "-1d", "1.5d", "7 days", "99999999999999999999d"] {
            assert!(
                matches!(parse_timeframe(bad), Err(AnalysisError::InvalidTimeframe(_))),
                "accepted {:?}", bad
            );
        }
    }

    #[test]
    fn test_since_is_in_the_past() {
        let start = since("1d").unwrap();
        let delta = Utc::now() - start;
        assert!(delta >= Duration::days(1));
        assert!(delta < Duration::days(1) + Duration::minutes(1));
    }

    #[test]
    fn test_empty_summary() {
        assert_eq!(generate_intelligence_summary(&[], "7d"), EMPTY_SUMMARY);
    }

    #[test]
    fn test_summary_groups_and_themes() {
        let author = Uuid::new_v4();
        let mut a = sample_report(author, "secret", "approved");
        a.title = "Convoy".to_string();
        a.content = "Troop movement along the river, movement confirmed".to_string();
        a.report_date = Utc.with_ymd_and_hms(2024, 3, 5, 8, 0, 0).unwrap();

        let mut b = sample_report(author, "secret", "approved");
        b.title = "Relay".to_string();
        b.content = "Radio communication and movement near relay".to_string();

        let mut c = sample_report(author, "confidential", "pending");
        c.title = "Market".to_string();
        c.content = "Nothing of note, movements only".to_string();

        let summary = generate_intelligence_summary(&[a, b, c], "7d");

        assert!(summary.starts_with("INTELLIGENCE SUMMARY - PERIOD: 7d\nTotal reports: 3"));
        let secret = summary.find("== CLASSIFICATION: SECRET (2 reports) ==").unwrap();
        let confidential = summary.find("== CLASSIFICATION: CONFIDENTIAL (1 reports) ==").unwrap();
        assert!(secret < confidential);

        // once per report, whole words only ("movements" does not count)
        assert!(summary.contains("- Movement: mentioned in 2 report(s)"));
        assert!(summary.contains("- Communication: mentioned in 1 report(s)"));
        assert!(summary.contains("- Convoy (05/03/2024)"));
        assert!(summary.contains("== RECOMMENDATIONS =="));
        assert!(summary.ends_with("End of automatically generated summary."));
    }

    #[test]
    fn test_summary_lists_three_most_recent() {
        let author = Uuid::new_v4();
        let reports: Vec<Report> = (0..5)
            .map(|i| {
                let mut r = sample_report(author, "confidential", "approved");
                r.title = format!("Report {}", i);
                r.created_at = Utc.with_ymd_and_hms(2024, 1, 1 + i, 0, 0, 0).unwrap();
                r
            })
            .collect();

        let summary = generate_intelligence_summary(&reports, "1m");
        assert!(summary.contains("- Report 4 ("));
        assert!(summary.contains("- Report 3 ("));
        assert!(summary.contains("- Report 2 ("));
        assert!(!summary.contains("- Report 1 ("));
        assert!(!summary.contains("Main themes identified"));
    }
}
