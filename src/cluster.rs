use anyhow::{bail, Result};
use chrono::{DateTime, Duration, Utc};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::models::{DuplicateCluster, NormalizedRecord};
use crate::similarity::record_similarity;

pub const DEFAULT_THRESHOLD: f64 = 0.85;
pub const DEFAULT_WINDOW_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DedupParams {
    pub threshold: f64, // similarity needed to join an anchor, in [0, 1]
    pub window: Duration, // max |t_anchor - t_candidate|
}

impl Default for DedupParams {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            window: Duration::hours(DEFAULT_WINDOW_HOURS),
        }
    }
}

impl DedupParams {
    pub fn new(threshold: f64, window_hours: i64) -> Result<Self> {
        if !(0.0..=1.0).contains(&threshold) {
            bail!("Similarity threshold must be within 0.0..=1.0, got {}", threshold);
        }
        if window_hours < 0 {
            bail!("Date window must be a non-negative number of hours, got {}", window_hours);
        }
        let window = Duration::try_hours(window_hours)
            .ok_or_else(|| anyhow::anyhow!("Date window of {} hours is out of range", window_hours))?;
        Ok(Self { threshold, window })
    }
}

pub fn within_window(a: DateTime<Utc>, b: DateTime<Utc>, window: Duration) -> bool {
    let gap = if a >= b { a - b } else { b - a };
    gap <= window
}

pub fn build_clusters(records: &[NormalizedRecord], params: &DedupParams) -> Vec<DuplicateCluster> {
    build_clusters_with(records, params, |i, j| record_similarity(&records[i], &records[j]))
}

/// Greedy single pass in input order.
///
/// Each unclaimed record anchors a candidate cluster and pulls in every later
/// unclaimed record that is inside the date window of the anchor and scores at
/// least `threshold` against the anchor. Membership is relative to the anchor
/// only: two non-anchor members need not be similar or close in time to each
/// other. Candidates that fail stay unclaimed for later anchors. An anchor that
/// pulls in nothing is left unclustered.
///
/// Scores for one anchor are computed in parallel; claims are applied
/// afterwards in index order, so the output matches a purely sequential scan.
pub fn build_clusters_with<F>(
    records: &[NormalizedRecord],
    params: &DedupParams,
    score: F,
) -> Vec<DuplicateCluster>
where
    F: Fn(usize, usize) -> f64 + Sync,
{
    debug!(
        "Clustering started - records={}, threshold={}, window_hours={}",
        records.len(),
        params.threshold,
        params.window.num_hours()
    );

    let total = records.len();
    let mut claimed = vec![false; total];
    let mut clusters: Vec<DuplicateCluster> = Vec::new();

    for i in 0..total {
        if i % 500 == 0 && i > 0 {
            let pct = (i as f32 / total as f32 * 100.0) as u32;
            info!("Clustering progress - processed={}/{} ({}%), clusters={}", i, total, pct, clusters.len());
        }
        if claimed[i] {
            continue;
        }

        let anchor_ts = records[i].timestamp;
        let candidates: Vec<usize> = (i + 1..total).filter(|&j| !claimed[j]).collect();
        let joined: Vec<usize> = candidates
            .par_iter()
            .filter(|&&j| {
                within_window(anchor_ts, records[j].timestamp, params.window)
                    && score(i, j) >= params.threshold
            })
            .copied()
            .collect();

        if joined.is_empty() {
            continue;
        }

        claimed[i] = true;
        let mut members = Vec::with_capacity(joined.len() + 1);
        members.push(i);
        for j in joined {
            claimed[j] = true;
            members.push(j);
        }
        clusters.push(DuplicateCluster {
            id: clusters.len() + 1,
            members,
        });
    }

    if !clusters.is_empty() {
        let sizes: Vec<usize> = clusters.iter().map(|c| c.len()).collect();
        let max_size = sizes.iter().copied().max().unwrap_or(0);
        let avg_size = sizes.iter().sum::<usize>() as f32 / sizes.len() as f32;
        debug!("Cluster size distribution - clusters={}, max={}, avg={:.1}", sizes.len(), max_size, avg_size);
    }

    clusters
}
