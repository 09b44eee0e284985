//! Geographic clustering
//!
//! DBSCAN over great-circle distances. `eps` is the search radius in
//! kilometres and a point counts toward its own neighbourhood.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::AnalysisError;

pub const EARTH_RADIUS_KM: f64 = 6371.0;
pub const MIN_SAMPLES: usize = 2;
pub const DEFAULT_RADIUS_KM: f64 = 10.0;
pub const MAX_RADIUS_KM: f64 = 1000.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClusterCenter {
    pub latitude: f64,
    pub longitude: f64,
    pub points_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClusterStats {
    pub density: f64,
    pub dispersion: f64,
    pub radius_km: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct GeoClusterAnalysis {
    pub clusters_count: usize,
    pub noise_points: usize,
    pub total_points: usize,
    pub cluster_centers: Vec<ClusterCenter>,
    pub analysis: ClusterStats,
    pub recommendations: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Great-circle distance in kilometres
pub fn haversine_km(a: &Coordinate, b: &Coordinate) -> f64 {
    let (lat1, lat2) = (a.latitude.to_radians(), b.latitude.to_radians());
    let dlat = lat2 - lat1;
    let dlon = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// DBSCAN labels: `Some(cluster)` in discovery order, `None` for noise
pub fn dbscan(points: &[Coordinate], eps_km: f64, min_samples: usize) -> Vec<Option<usize>> {
    let neighbours: Vec<Vec<usize>> = points
        .iter()
        .map(|p| {
            points
                .iter()
                .enumerate()
                .filter(|(_, q)| haversine_km(p, q) <= eps_km)
                .map(|(j, _)| j)
                .collect()
        })
        .collect();
    let is_core = |i: usize| neighbours[i].len() >= min_samples;

    let mut labels: Vec<Option<usize>> = vec![None; points.len()];
    let mut next_cluster = 0;

    for start in 0..points.len() {
        if labels[start].is_some() || !is_core(start) {
            continue;
        }

        let cluster = next_cluster;
        next_cluster += 1;
        labels[start] = Some(cluster);

        let mut stack = vec![start];
        while let Some(i) = stack.pop() {
            for &j in &neighbours[i] {
                if labels[j].is_none() {
                    labels[j] = Some(cluster);
                    // border points join but do not extend the cluster
                    if is_core(j) {
                        stack.push(j);
                    }
                }
            }
        }
    }

    labels
}

/// Cluster `coordinates` with DBSCAN using `radius_km` as the neighbourhood
pub fn analyze_geo_cluster(coordinates: &[Coordinate], radius_km: f64) -> Result<GeoClusterAnalysis, AnalysisError> {
    if coordinates.is_empty() {
        return Err(AnalysisError::EmptyInput("coordinates"));
    }
    if !(radius_km > 0.0 && radius_km <= MAX_RADIUS_KM) {
        return Err(AnalysisError::InvalidRadius { value: radius_km, max: MAX_RADIUS_KM });
    }
    if let Some(bad) = coordinates.iter().find(|c| !c.is_valid()) {
        return Err(AnalysisError::InvalidCoordinate { latitude: bad.latitude, longitude: bad.longitude });
    }

    let labels = dbscan(coordinates, radius_km, MIN_SAMPLES);
    let clusters_count = labels.iter().flatten().max().map(|m| m + 1).unwrap_or(0);
    let noise_points = labels.iter().filter(|l| l.is_none()).count();
    let total_points = coordinates.len();

    let cluster_centers = (0..clusters_count)
        .map(|cluster| {
            let members: Vec<&Coordinate> = coordinates
                .iter()
                .zip(&labels)
                .filter(|(_, l)| **l == Some(cluster))
                .map(|(c, _)| c)
                .collect();
            let n = members.len() as f64;
            ClusterCenter {
                latitude: members.iter().map(|c| c.latitude).sum::<f64>() / n,
                longitude: members.iter().map(|c| c.longitude).sum::<f64>() / n,
                points_count: members.len(),
            }
        })
        .collect();

    Ok(GeoClusterAnalysis {
        clusters_count,
        noise_points,
        total_points,
        cluster_centers,
        analysis: ClusterStats {
            density: clusters_count as f64 / total_points as f64,
            dispersion: noise_points as f64 / total_points as f64,
            radius_km,
        },
        recommendations: vec![
            "Monitor cluster centres for any change".to_string(),
            format!("Increase surveillance in high-density areas ({} clusters detected)", clusters_count),
            "Investigate isolated points that may indicate abnormal activity".to_string(),
        ],
        timestamp: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(latitude: f64, longitude: f64) -> Coordinate {
        Coordinate { latitude, longitude }
    }

    #[test]
    fn test_haversine_known_distance() {
        // Paris to London, roughly 344 km
        let d = haversine_km(&c(48.8566, 2.3522), &c(51.5074, -0.1278));
        assert!((d - 343.5).abs() < 2.0, "got {}", d);
        assert_eq!(haversine_km(&c(10.0, 10.0), &c(10.0, 10.0)), 0.0);
    }

    #[test]
    fn test_two_clusters_and_noise() {
        let points = vec![
            // Paris area
            c(48.8566, 2.3522), c(48.8600, 2.3400), c(48.8500, 2.3600),
            // Lyon area
            c(45.7640, 4.8357), c(45.7600, 4.8400),
            // Isolated
            c(43.2965, 5.3698),
        ];

        let result = analyze_geo_cluster(&points, 10.0).unwrap();
        assert_eq!(result.clusters_count, 2);
        assert_eq!(result.noise_points, 1);
        assert_eq!(result.total_points, 6);
        assert_eq!(result.cluster_centers[0].points_count, 3);
        assert_eq!(result.cluster_centers[1].points_count, 2);
        assert!((result.cluster_centers[1].latitude - 45.762).abs() < 1e-9);
        assert!((result.analysis.density - 2.0 / 6.0).abs() < 1e-12);
        assert!((result.analysis.dispersion - 1.0 / 6.0).abs() < 1e-12);
        assert!(result.recommendations[1].contains("2 clusters"));
    }

    #[test]
    fn test_radius_controls_reach() {
        let points = vec![c(0.0, 0.0), c(0.0, 0.1)]; // about 11 km apart
        assert_eq!(analyze_geo_cluster(&points, 5.0).unwrap().clusters_count, 0);
        assert_eq!(analyze_geo_cluster(&points, 15.0).unwrap().clusters_count, 1);
    }

    #[test]
    fn test_chain_forms_one_cluster() {
        // each hop is ~8.9 km, ends are ~26.7 km apart
        let points = vec![c(0.0, 0.0), c(0.0, 0.08), c(0.0, 0.16), c(0.0, 0.24)];
        let result = analyze_geo_cluster(&points, 10.0).unwrap();
        assert_eq!(result.clusters_count, 1);
        assert_eq!(result.noise_points, 0);
    }

    #[test]
    fn test_invalid_input() {
        assert!(matches!(analyze_geo_cluster(&[], 10.0), Err(AnalysisError::EmptyInput(_))));
        assert!(matches!(
            analyze_geo_cluster(&[c(95.0, 0.0)], 10.0),
            Err(AnalysisError::InvalidCoordinate { .. })
        ));
        assert!(matches!(analyze_geo_cluster(&[c(0.0, 0.0)], 0.0), Err(AnalysisError::InvalidRadius { .. })));
        assert!(matches!(analyze_geo_cluster(&[c(0.0, 0.0)], 5000.0), Err(AnalysisError::InvalidRadius { .. })));
    }

    #[test]
    fn test_single_point_is_noise() {
        let result = analyze_geo_cluster(&[c(1.0, 1.0)], 10.0).unwrap();
        assert_eq!(result.clusters_count, 0);
        assert_eq!(result.noise_points, 1);
        assert!(result.cluster_centers.is_empty());
    }
}
