use tracing::debug;

use crate::models::{DuplicateCluster, NormalizedRecord, RemovedRecord, Resolution};

/// Earliest timestamp wins; equal timestamps go to the earliest input position.
/// `None` only for a cluster with no members.
pub fn pick_representative(cluster: &DuplicateCluster, records: &[NormalizedRecord]) -> Option<usize> {
    cluster
        .members
        .iter()
        .copied()
        .min_by_key(|&idx| (records[idx].timestamp, idx))
}

/// Splits every input index into kept or removed.
///
/// Records outside all clusters are always kept. Kept indices come back in
/// input order; removed ones in cluster order, then member order.
pub fn resolve(clusters: &[DuplicateCluster], records: &[NormalizedRecord]) -> Resolution {
    let mut keep = vec![true; records.len()];
    let mut removed = Vec::new();
    let mut representatives = Vec::with_capacity(clusters.len());

    for cluster in clusters {
        let Some(rep) = pick_representative(cluster, records) else {
            debug!("Skipping cluster without members - cluster={}", cluster.id);
            continue;
        };
        representatives.push(rep);
        for &idx in &cluster.members {
            if idx == rep {
                continue;
            }
            keep[idx] = false;
            removed.push(RemovedRecord {
                index: idx,
                cluster_id: cluster.id,
                representative: rep,
            });
        }
        if cluster.anchor() != Some(rep) {
            debug!(
                "Representative differs from anchor - cluster={}, anchor={:?}, representative={}",
                cluster.id,
                cluster.anchor(),
                rep
            );
        }
    }

    let kept = keep
        .iter()
        .enumerate()
        .filter_map(|(idx, &k)| k.then_some(idx))
        .collect();

    Resolution {
        kept,
        removed,
        representatives,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{build_clusters, DedupParams};
    use crate::models::RawRecord;
    use crate::normalize::Normalizer;
    use chrono::{TimeZone, Utc};

    fn records(rows: &[(&str, &str)]) -> Vec<NormalizedRecord> {
        let n = Normalizer::default().with_fallback_time(Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap());
        rows.iter()
            .map(|(date, text)| {
                n.normalize(&RawRecord {
                    date: date.to_string(),
                    text: text.to_string(),
                    ..Default::default()
                })
            })
            .collect()
    }

    #[test]
    fn test_earliest_timestamp_survives() {
        let recs = records(&[
            ("2024-01-31T12:00:00.000Z", "Hello world"),
            ("2024-01-31T09:00:00.000Z", "Hello   world"),
        ]);
        let clusters = build_clusters(&recs, &DedupParams::default());
        let res = resolve(&clusters, &recs);
        assert_eq!(res.kept, vec![1]);
        assert_eq!(
            res.removed,
            vec![RemovedRecord { index: 0, cluster_id: 1, representative: 1 }]
        );
        assert_eq!(res.representatives, vec![1]);
    }

    #[test]
    fn test_tie_goes_to_first_occurrence() {
        let recs = records(&[
            ("2024-01-31", "other"),
            ("2024-01-31", "same text"),
            ("2024-01-31", "same text"),
        ]);
        let clusters = vec![DuplicateCluster { id: 1, members: vec![1, 2] }];
        let res = resolve(&clusters, &recs);
        assert_eq!(res.kept, vec![0, 1]);
        assert_eq!(res.removed[0].index, 2);
    }

    #[test]
    fn test_unclustered_kept_in_input_order() {
        let recs = records(&[
            ("2024-01-31T10:00:00.000Z", "first unique"),
            ("2024-01-31T11:00:00.000Z", "dup me please"),
            ("2024-01-31T12:00:00.000Z", "second unique thing"),
            ("2024-01-31T08:00:00.000Z", "dup me please"),
            ("2024-01-31T13:00:00.000Z", "third"),
        ]);
        let clusters = build_clusters(&recs, &DedupParams::default());
        let res = resolve(&clusters, &recs);
        assert_eq!(res.kept, vec![0, 2, 3, 4]);
        assert_eq!(res.kept.len() + res.removed.len(), recs.len());
        let kept_texts: Vec<&str> = res
            .kept_records(&recs)
            .iter()
            .map(|r| r.display_text.as_str())
            .collect();
        assert_eq!(kept_texts[2], "dup me please");
    }

    #[test]
    fn test_representative_not_later_than_removed() {
        let recs = records(&[
            ("2024-01-31T15:00:00.000Z", "repeat after me"),
            ("2024-01-31T03:00:00.000Z", "repeat after me"),
            ("2024-01-31T20:00:00.000Z", "repeat after me!"),
            ("2024-02-01T01:00:00.000Z", "repeat after me"),
        ]);
        let clusters = build_clusters(&recs, &DedupParams::default());
        let res = resolve(&clusters, &recs);
        for r in &res.removed {
            assert!(recs[r.representative].timestamp <= recs[r.index].timestamp);
        }
        assert_eq!(res.representatives, vec![1]);
    }

    #[test]
    fn test_cluster_without_members_does_not_panic() {
        let recs = records(&[("2024-01-31", "alone"), ("2024-01-31", "also alone")]);
        let clusters = vec![DuplicateCluster { id: 1, members: vec![] }];
        assert_eq!(clusters[0].anchor(), None);
        assert_eq!(pick_representative(&clusters[0], &recs), None);
        let res = resolve(&clusters, &recs);
        assert_eq!(res.kept, vec![0, 1]);
        assert!(res.removed.is_empty() && res.representatives.is_empty());
    }

    #[test]
    fn test_empty() {
        let res = resolve(&[], &[]);
        assert!(res.kept.is_empty() && res.removed.is_empty());
    }
}
