//! Natural-language query routing

use serde::Serialize;

use super::keywords::{
    self, ALERT_QUERY_KEYWORDS, MAP_QUERY_KEYWORDS, QUERY_STOP_WORDS, REPORT_QUERY_KEYWORDS,
    SUMMARY_QUERY_KEYWORDS, USER_QUERY_KEYWORDS,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryIntent {
    ReportSearch,
    AlertSearch,
    MapSearch,
    UserSearch,
    SummaryRequest,
    Unknown,
}

impl QueryIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryIntent::ReportSearch => "report_search",
            QueryIntent::AlertSearch => "alert_search",
            QueryIntent::MapSearch => "map_search",
            QueryIntent::UserSearch => "user_search",
            QueryIntent::SummaryRequest => "summary_request",
            QueryIntent::Unknown => "unknown",
        }
    }

    pub fn interpreted_as(&self) -> &'static str {
        match self {
            QueryIntent::ReportSearch => "Report search",
            QueryIntent::AlertSearch => "Alert search",
            QueryIntent::MapSearch => "Map search",
            QueryIntent::UserSearch => "User search",
            QueryIntent::SummaryRequest => "Summary request",
            QueryIntent::Unknown => "Unrecognised query",
        }
    }
}

/// Checked in this order; the first table with a hit decides
const ROUTES: &[(QueryIntent, &[&str])] = &[
    (QueryIntent::ReportSearch, REPORT_QUERY_KEYWORDS),
    (QueryIntent::AlertSearch, ALERT_QUERY_KEYWORDS),
    (QueryIntent::MapSearch, MAP_QUERY_KEYWORDS),
    (QueryIntent::UserSearch, USER_QUERY_KEYWORDS),
    (QueryIntent::SummaryRequest, SUMMARY_QUERY_KEYWORDS),
];

pub const UNKNOWN_SUGGESTIONS: &[&str] = &[
    "Try phrasing your question differently",
    "Specify the kind of information you are looking for (report, alert, map, ...)",
    "Use more specific keywords",
];

const MIN_FOCUS_LEN: usize = 4;

#[derive(Debug, Clone, Serialize)]
pub struct QueryPlan {
    pub intent: QueryIntent,
    /// Most specific remaining word, used as a text filter
    pub focus: Option<String>,
}

fn is_routing_word(word: &str) -> bool {
    ROUTES.iter().any(|(_, table)| table.iter().any(|kw| word.starts_with(kw)))
}

/// Longest word that is neither a routing keyword nor a stop word
fn extract_focus(query: &str) -> Option<String> {
    query
        .split(|c: char| !c.is_alphanumeric() && c != '-')
        .map(str::trim)
        .filter(|w| w.chars().count() >= MIN_FOCUS_LEN)
        .filter(|w| !QUERY_STOP_WORDS.contains(w) && !is_routing_word(w))
        .fold(None::<&str>, |best, w| match best {
            Some(b) if b.chars().count() >= w.chars().count() => Some(b),
            _ => Some(w),
        })
        .map(str::to_string)
}

pub fn interpret_query(query: &str) -> QueryPlan {
    let lowered = query.to_lowercase();

    let intent = ROUTES
        .iter()
        .find(|(_, table)| !keywords::matches(&lowered, table).is_empty())
        .map(|(intent, _)| *intent)
        .unwrap_or(QueryIntent::Unknown);

    QueryPlan { intent, focus: extract_focus(&lowered) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routing_by_keyword() {
        assert_eq!(interpret_query("Derniers rapports sur la frontière").intent, QueryIntent::ReportSearch);
        assert_eq!(interpret_query("Any threat near the harbour?").intent, QueryIntent::AlertSearch);
        assert_eq!(interpret_query("Affiche la carte du secteur").intent, QueryIntent::MapSearch);
        assert_eq!(interpret_query("Which agent is on duty").intent, QueryIntent::UserSearch);
        assert_eq!(interpret_query("Synthèse de la semaine").intent, QueryIntent::SummaryRequest);
        assert_eq!(interpret_query("Bonjour").intent, QueryIntent::Unknown);
    }

    #[test]
    fn test_report_keywords_take_precedence() {
        // both "report" and "threat" match; reports are checked first
        assert_eq!(interpret_query("threat report for sector 4").intent, QueryIntent::ReportSearch);
    }

    #[test]
    fn test_focus_extraction() {
        let plan = interpret_query("Show the latest reports about the harbour");
        assert_eq!(plan.focus.as_deref(), Some("harbour"));

        let plan = interpret_query("rapports");
        assert_eq!(plan.focus, None);
    }

    #[test]
    fn test_intent_labels() {
        assert_eq!(QueryIntent::SummaryRequest.as_str(), "summary_request");
        assert_eq!(QueryIntent::Unknown.interpreted_as(), "Unrecognised query");
    }
}
