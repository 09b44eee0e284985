//! Analysis Module
//!
//! Heuristic scoring over reports, alerts and coordinates. Every function
//! here is pure and deterministic; `AnalysisService` only adds the switch
//! controlled by `ENABLE_AI_FEATURES`.
//!
//! ## Structure
//! - `keywords`: keyword tables (French vocabulary plus English equivalents)
//! - `threat`: threat level and credibility scoring
//! - `summary`: intelligence summaries and timeframe parsing
//! - `anomaly`: isolation forest over JSON data points
//! - `geo`: DBSCAN clustering of coordinates
//! - `recommendations`: alert response playbook
//! - `query`: natural-language query routing

pub mod keywords;
pub mod threat;
pub mod summary;
pub mod anomaly;
pub mod geo;
pub mod recommendations;
pub mod query;

use thiserror::Error;

use crate::models::{AlertSeverity, AlertType, Report};

pub use threat::{analyze_report, analyze_threat, ReportAnalysis, ThreatAnalysis, ThreatLevel, ThreatRequest};
pub use summary::{generate_intelligence_summary, parse_timeframe, since};
pub use anomaly::{detect_anomalies, Anomaly};
pub use geo::{analyze_geo_cluster, Coordinate, GeoClusterAnalysis};
pub use recommendations::{generate_alert_recommendations, AlertRecommendations};
pub use query::{interpret_query, QueryIntent, QueryPlan};

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Analysis features are disabled")]
    Disabled,

    #[error("No {0} provided")]
    EmptyInput(&'static str),

    #[error("Invalid timeframe '{0}': expected a number followed by h, d, w, m or y")]
    InvalidTimeframe(String),

    #[error("Coordinate out of range: latitude {latitude}, longitude {longitude}")]
    InvalidCoordinate { latitude: f64, longitude: f64 },

    #[error("Radius must be greater than 0 and at most {max} km (got {value})")]
    InvalidRadius { value: f64, max: f64 },
}

/// Gate in front of the analysis functions
#[derive(Debug, Clone, Copy)]
pub struct AnalysisService {
    enabled: bool,
}

impl AnalysisService {
    pub fn new(enabled: bool) -> Self {
        if !enabled {
            tracing::warn!("Analysis features are disabled");
        }
        Self { enabled }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn ensure_enabled(&self) -> Result<(), AnalysisError> {
        if self.enabled {
            Ok(())
        } else {
            Err(AnalysisError::Disabled)
        }
    }

    pub fn analyze_threat(&self, request: &ThreatRequest) -> Result<ThreatAnalysis, AnalysisError> {
        self.ensure_enabled()?;
        Ok(analyze_threat(request))
    }

    pub fn analyze_report(&self, report: &Report) -> Result<ReportAnalysis, AnalysisError> {
        self.ensure_enabled()?;
        Ok(analyze_report(report))
    }

    pub fn summarize(&self, reports: &[Report], timeframe: &str) -> Result<String, AnalysisError> {
        self.ensure_enabled()?;
        Ok(generate_intelligence_summary(reports, timeframe))
    }

    pub fn detect_anomalies(&self, points: &[serde_json::Value]) -> Result<Vec<Anomaly>, AnalysisError> {
        self.ensure_enabled()?;
        Ok(detect_anomalies(points))
    }

    pub fn analyze_geo_cluster(
        &self,
        coordinates: &[Coordinate],
        radius_km: f64,
    ) -> Result<GeoClusterAnalysis, AnalysisError> {
        self.ensure_enabled()?;
        analyze_geo_cluster(coordinates, radius_km)
    }

    pub fn alert_recommendations(
        &self,
        severity: AlertSeverity,
        alert_type: AlertType,
        description: &str,
    ) -> Result<AlertRecommendations, AnalysisError> {
        self.ensure_enabled()?;
        Ok(generate_alert_recommendations(severity, alert_type, description))
    }

    pub fn interpret_query(&self, query: &str) -> Result<QueryPlan, AnalysisError> {
        self.ensure_enabled()?;
        if query.trim().is_empty() {
            return Err(AnalysisError::EmptyInput("query"));
        }
        Ok(interpret_query(query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_service_refuses_work() {
        let service = AnalysisService::new(false);
        let request = ThreatRequest {
            content: "attaque imminente".to_string(),
            source: None,
            location: None,
        };
        assert!(matches!(service.analyze_threat(&request), Err(AnalysisError::Disabled)));
        assert!(matches!(service.interpret_query("rapport"), Err(AnalysisError::Disabled)));
    }

    #[test]
    fn test_enabled_service_delegates() {
        let service = AnalysisService::new(true);
        assert!(service.is_enabled());
        let plan = service.interpret_query("show me the latest alerts").unwrap();
        assert_eq!(plan.intent, QueryIntent::AlertSearch);
        assert!(matches!(service.interpret_query("   "), Err(AnalysisError::EmptyInput("query"))));
    }
}
