use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One post as handed over by the acquisition side, before any cleanup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    pub date: String,            // "2024-01-31T10:46:43.000Z" | "2024-01-31" | junk
    pub text: String,
    #[serde(default)]
    pub reply_to: Option<String>, // "@alice, @bob" when scraped separately
    #[serde(default)]
    pub urls: Vec<String>,
}

/// How much of a raw record survived parsing intact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParseOutcome {
    Parsed,
    DefaultedDate { raw: String },
    EmptyText,
    DefaultedDateAndEmptyText { raw: String },
}

impl ParseOutcome {
    pub fn from_flags(date_raw: Option<&str>, empty_text: bool) -> Self {
        match (date_raw, empty_text) {
            (None, false) => ParseOutcome::Parsed,
            (None, true) => ParseOutcome::EmptyText,
            (Some(raw), false) => ParseOutcome::DefaultedDate { raw: raw.to_string() },
            (Some(raw), true) => ParseOutcome::DefaultedDateAndEmptyText { raw: raw.to_string() },
        }
    }

    pub fn date_defaulted(&self) -> bool {
        matches!(
            self,
            ParseOutcome::DefaultedDate { .. } | ParseOutcome::DefaultedDateAndEmptyText { .. }
        )
    }

    pub fn text_empty(&self) -> bool {
        matches!(
            self,
            ParseOutcome::EmptyText | ParseOutcome::DefaultedDateAndEmptyText { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub timestamp: DateTime<Utc>,
    pub display_text: String,
    pub reply_targets: BTreeSet<String>, // handles without the leading '@'
    pub urls: Vec<String>,
    pub comparison_text: String,
    pub content_fingerprint: String, // xxh3 of comparison_text
    pub record_fingerprint: String,  // xxh3 of "<day>_<comparison_text>"
    pub outcome: ParseOutcome,
}

impl NormalizedRecord {
    /// Short one-line rendering used in reports and console output.
    pub fn summary(&self) -> String {
        let head: String = self.comparison_text.chars().take(50).collect();
        format!("{} - {}...", self.timestamp.format("%Y-%m-%d %H:%M"), head)
    }
}

/// Built only by the cluster builder, which never emits fewer than two
/// members; the accessors still tolerate an empty member list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateCluster {
    pub id: usize,           // 1-based, discovery order
    pub members: Vec<usize>, // anchor first, then claimed records in input order
}

impl DuplicateCluster {
    pub fn anchor(&self) -> Option<usize> {
        self.members.first().copied()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovedRecord {
    pub index: usize,
    pub cluster_id: usize,
    pub representative: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub kept: Vec<usize>, // ascending input order
    pub removed: Vec<RemovedRecord>,
    pub representatives: Vec<usize>, // one per non-empty cluster, in cluster order
}

impl Resolution {
    pub fn kept_records<'a>(&self, records: &'a [NormalizedRecord]) -> Vec<&'a NormalizedRecord> {
        self.kept.iter().map(|&i| &records[i]).collect()
    }
}
