//! Health and load reports.

use serde::Serialize;

/// Health of one cluster slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterHealth {
    /// Cluster slot.
    pub cluster_id: u32,
    /// Members alive and answering a state query in time.
    pub healthy: usize,
    /// Listed members.
    pub total: usize,
    /// `healthy / total × 100`, or 0 for an empty cluster.
    pub percentage: f64,
}

/// Health across every slot in `1..=max_clusters`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    /// One entry per slot in `1..=max_clusters`.
    pub per_cluster: Vec<ClusterHealth>,
    /// Healthy workers over all workers × 100, or 0 without workers.
    pub overall: f64,
}

impl HealthReport {
    pub(crate) fn from_counts(counts: Vec<(u32, usize, usize)>) -> Self {
        let mut healthy_sum = 0usize;
        let mut total_sum = 0usize;
        let per_cluster = counts
            .into_iter()
            .map(|(cluster_id, healthy, total)| {
                healthy_sum += healthy;
                total_sum += total;
                ClusterHealth {
                    cluster_id,
                    healthy,
                    total,
                    percentage: percent(healthy, total),
                }
            })
            .collect();
        Self {
            per_cluster,
            overall: percent(healthy_sum, total_sum),
        }
    }

    /// Entry for one cluster.
    pub fn cluster(&self, cluster_id: u32) -> Option<&ClusterHealth> {
        self.per_cluster.iter().find(|c| c.cluster_id == cluster_id)
    }
}

/// Load of one cluster slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterLoad {
    /// Cluster slot.
    pub cluster_id: u32,
    /// Members currently listed.
    pub workers: usize,
}

/// Result of a load balancing pass.
///
/// Advisory: clusters are classified, nothing is moved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadReport {
    /// Total workers divided by `max_clusters`.
    pub average: f64,
    /// One entry per slot in `1..=max_clusters`.
    pub per_cluster: Vec<ClusterLoad>,
    /// Clusters above `1.2 × average`.
    pub overloaded: Vec<u32>,
    /// Clusters below `0.8 × average`.
    pub underloaded: Vec<u32>,
}

impl LoadReport {
    pub(crate) fn from_loads(loads: Vec<(u32, usize)>, max_clusters: u32) -> Self {
        let total: usize = loads.iter().map(|(_, n)| n).sum();
        let average = if max_clusters == 0 {
            0.0
        } else {
            total as f64 / f64::from(max_clusters)
        };

        let mut overloaded = Vec::new();
        let mut underloaded = Vec::new();
        for &(id, n) in &loads {
            let n = n as f64;
            if n > 1.2 * average {
                overloaded.push(id);
            } else if n < 0.8 * average {
                underloaded.push(id);
            }
        }

        Self {
            average,
            per_cluster: loads
                .into_iter()
                .map(|(cluster_id, workers)| ClusterLoad { cluster_id, workers })
                .collect(),
            overloaded,
            underloaded,
        }
    }

    /// True when no cluster is outside the balanced band.
    pub fn is_balanced(&self) -> bool {
        self.overloaded.is_empty() && self.underloaded.is_empty()
    }
}

/// Introspection entry returned by `ClusterManager::clusters`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterInfo {
    /// Cluster slot.
    pub cluster_id: u32,
    /// Listed members.
    pub members: usize,
    /// Size requested at start.
    pub target_size: usize,
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_clusters_report_zero() {
        let report = HealthReport::from_counts(vec![(1, 0, 0), (2, 0, 0)]);
        assert_eq!(report.overall, 0.0);
        assert!(report.per_cluster.iter().all(|c| c.percentage == 0.0));
    }

    #[test]
    fn overall_weights_by_workers() {
        let report = HealthReport::from_counts(vec![(1, 2, 3), (2, 1, 1)]);
        assert_eq!(report.overall, 75.0);
        let one = report.cluster(1).expect("cluster 1");
        assert!((one.percentage - 66.666).abs() < 0.01);
    }

    #[test]
    fn load_classification() {
        // 20 workers over 10 slots: average 2.
        let mut loads: Vec<(u32, usize)> = (1..=10).map(|id| (id, 0)).collect();
        loads[0].1 = 10;
        loads[1].1 = 2;
        loads[2].1 = 8;
        let report = LoadReport::from_loads(loads, 10);
        assert_eq!(report.average, 2.0);
        assert_eq!(report.overloaded, vec![1, 3]);
        assert_eq!(report.underloaded, vec![4, 5, 6, 7, 8, 9, 10]);
        assert!(!report.is_balanced());
    }

    #[test]
    fn no_workers_is_balanced() {
        let loads: Vec<(u32, usize)> = (1..=10).map(|id| (id, 0)).collect();
        assert!(LoadReport::from_loads(loads, 10).is_balanced());
    }
}
