use anyhow::Result;
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};

use crate::models::{DuplicateCluster, NormalizedRecord, Resolution};
use crate::resolve::pick_representative;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordView {
    pub index: usize,
    pub timestamp: String, // RFC 3339
    pub display_text: String,
    pub content_fingerprint: String,
    pub summary: String,
}

impl RecordView {
    pub fn of(index: usize, record: &NormalizedRecord) -> Self {
        Self {
            index,
            timestamp: record.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            display_text: record.display_text.clone(),
            content_fingerprint: record.content_fingerprint.clone(),
            summary: record.summary(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterDetail {
    pub cluster_id: usize,
    pub size: usize,
    pub representative: RecordView,
    pub removed: Vec<RecordView>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DegradationSummary {
    pub defaulted_dates: usize,
    pub empty_texts: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub original_count: usize,
    pub kept_count: usize,
    pub removed_count: usize,
    pub cluster_count: usize,
    pub degraded: DegradationSummary,
    pub clusters: Vec<ClusterDetail>,
}

pub fn summarize_degradation(records: &[NormalizedRecord]) -> DegradationSummary {
    records.iter().fold(DegradationSummary::default(), |mut acc, r| {
        if r.outcome.date_defaulted() {
            acc.defaulted_dates += 1;
        }
        if r.outcome.text_empty() {
            acc.empty_texts += 1;
        }
        acc
    })
}

pub fn generate_report(
    records: &[NormalizedRecord],
    clusters: &[DuplicateCluster],
    resolution: &Resolution,
) -> Report {
    let details = clusters
        .iter()
        .filter_map(|cluster| {
            let rep = pick_representative(cluster, records)?;
            Some(ClusterDetail {
                cluster_id: cluster.id,
                size: cluster.len(),
                representative: RecordView::of(rep, &records[rep]),
                removed: cluster
                    .members
                    .iter()
                    .filter(|&&idx| idx != rep)
                    .map(|&idx| RecordView::of(idx, &records[idx]))
                    .collect(),
            })
        })
        .collect();

    let original_count = records.len();
    let kept_count = resolution.kept.len();
    Report {
        original_count,
        kept_count,
        removed_count: original_count - kept_count,
        cluster_count: clusters.len(),
        degraded: summarize_degradation(records),
        clusters: details,
    }
}

pub fn render_report_json(report: &Report) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(report)?)
}

/// Console summary: counts plus the first few groups.
pub fn render_summary(report: &Report, sample_groups: usize) -> String {
    let mut out = String::new();
    out.push_str("Results:\n");
    out.push_str(&format!("Original posts: {}\n", report.original_count));
    out.push_str(&format!("Kept posts: {}\n", report.kept_count));
    out.push_str(&format!("Removed duplicates: {}\n", report.removed_count));
    out.push_str(&format!("Duplicate groups found: {}\n", report.cluster_count));

    let d = &report.degraded;
    if d.defaulted_dates > 0 || d.empty_texts > 0 {
        out.push_str(&format!(
            "Degraded records: {} with unparsable dates (set to run time), {} with empty text\n",
            d.defaulted_dates, d.empty_texts
        ));
    }

    if !report.clusters.is_empty() {
        out.push_str("\nSample duplicate groups:\n");
        for c in report.clusters.iter().take(sample_groups) {
            out.push_str(&format!("\nGroup {} ({} duplicates):\n", c.cluster_id, c.size));
            out.push_str(&format!("  Kept: {}\n", c.representative.summary));
            out.push_str(&format!("  Removed: {} similar posts\n", c.removed.len()));
        }
    }
    out
}
