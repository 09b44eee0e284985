//! Keyword tables
//!
//! Matching is done on lowercased text. Threat tables are ordered from the
//! most to the least severe level; the first level with a hit wins.

use super::threat::ThreatLevel;

// ============================================================================
// THREAT ANALYSIS (free text)
// ============================================================================

pub const THREAT_KEYWORDS: &[(ThreatLevel, &[&str])] = &[
    (ThreatLevel::Critical, &["explosion", "attaque", "sabotage", "infiltration", "attentat", "attack", "bombing"]),
    (ThreatLevel::High, &["mouvement", "troupes", "suspect", "surveillance", "intrusion", "movement", "troops"]),
    (ThreatLevel::Medium, &["activité", "inhabituel", "déplacement", "communication", "crypté", "activity", "unusual", "encrypted"]),
    (ThreatLevel::Low, &["observation", "patrouille", "routine", "reconnaissance", "patrol"]),
];

// ============================================================================
// REPORT ANALYSIS
// ============================================================================

pub const REPORT_THREAT_KEYWORDS: &[(ThreatLevel, &[&str])] = &[
    (ThreatLevel::Critical, &["imminent", "catastrophique", "attentat", "explosion", "catastrophic", "bombing"]),
    (ThreatLevel::High, &["élevé", "dangereux", "armée", "attaque", "dangerous", "armed", "attack"]),
    (ThreatLevel::Medium, &["suspect", "inhabituel", "préoccupant", "unusual", "concerning"]),
    (ThreatLevel::Low, &["mineur", "routine", "observation", "minor"]),
];

/// keyword -> suggested tag
pub const TAG_KEYWORDS: &[(&str, &str)] = &[
    ("communication", "communications"),
    ("cyber", "cyber"),
    ("réseau", "réseau"),
    ("network", "réseau"),
    ("frontière", "frontière"),
    ("border", "frontière"),
    ("véhicule", "transport"),
    ("vehicle", "transport"),
    ("armement", "armement"),
    ("weapon", "armement"),
    ("maritime", "maritime"),
    ("aérien", "aérien"),
    ("aerial", "aérien"),
    ("terrorisme", "terrorisme"),
    ("terrorism", "terrorisme"),
    ("civil", "civil"),
    ("économie", "économique"),
    ("economy", "économique"),
];

// ============================================================================
// SUMMARIES
// ============================================================================

/// Counted as whole words
pub const THEME_KEYWORDS: &[&str] = &[
    "mouvement", "communication", "activité", "menace", "intrusion",
    "movement", "activity", "threat",
];

// ============================================================================
// ALERT RECOMMENDATIONS
// ============================================================================

pub const ALERT_DESCRIPTION_KEYWORDS: &[(&[&str], &str)] = &[
    (&["communication"], "Establish secure communication channels"),
    (&["intrusion"], "Reinforce physical security measures"),
    (&["mouvement", "movement"], "Track movements through satellite surveillance"),
    (&["civils", "civilians"], "Plan protective measures for the civilian population"),
    (&["infrastructure"], "Assess the vulnerability of critical infrastructure"),
];

// ============================================================================
// QUERY ROUTING
// ============================================================================

pub const REPORT_QUERY_KEYWORDS: &[&str] = &["rapport", "document", "information", "report"];
pub const ALERT_QUERY_KEYWORDS: &[&str] = &["alerte", "menace", "danger", "alert", "threat"];
pub const MAP_QUERY_KEYWORDS: &[&str] = &["carte", "position", "localisation", "map", "location"];
pub const USER_QUERY_KEYWORDS: &[&str] = &["utilisateur", "agent", "personnel", "user"];
pub const SUMMARY_QUERY_KEYWORDS: &[&str] = &["résumé", "synthèse", "analyse", "summary", "synthesis", "analysis"];

/// Words ignored when extracting a search focus from a query
pub const QUERY_STOP_WORDS: &[&str] = &[
    "show", "find", "list", "give", "with", "about", "from", "that", "this", "what", "which",
    "latest", "recent", "last", "were", "have", "there", "their", "please", "into", "some",
    "les", "des", "une", "pour", "dans", "avec", "sur", "quels", "quelles", "derniers",
    "dernières", "montre", "trouve", "moi", "tous", "toutes",
];

/// Keywords of `table` contained in `text`, in table order
pub fn matches<'a>(text: &str, table: &[&'a str]) -> Vec<&'a str> {
    table.iter().copied().filter(|kw| text.contains(kw)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threat_tables_ordered_by_severity() {
        let levels: Vec<ThreatLevel> = THREAT_KEYWORDS.iter().map(|(l, _)| *l).collect();
        assert_eq!(levels, vec![ThreatLevel::Critical, ThreatLevel::High, ThreatLevel::Medium, ThreatLevel::Low]);
        let levels: Vec<ThreatLevel> = REPORT_THREAT_KEYWORDS.iter().map(|(l, _)| *l).collect();
        assert_eq!(levels, vec![ThreatLevel::Critical, ThreatLevel::High, ThreatLevel::Medium, ThreatLevel::Low]);
    }

    #[test]
    fn test_matches_keeps_table_order() {
        let found = matches("routine patrol, then observation", &["observation", "patrouille", "routine", "patrol"]);
        assert_eq!(found, vec!["observation", "routine", "patrol"]);
    }
}
