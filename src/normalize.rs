use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;
use unicode_normalization::UnicodeNormalization;
use xxhash_rust::xxh3::xxh3_64;

use crate::models::{NormalizedRecord, ParseOutcome, RawRecord};

static URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://\S+").unwrap());
static MENTION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"@\w+").unwrap());
static LEADING_MENTIONS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(@\w+(?:\s+@\w+)*)").unwrap());

// stripping can splice a new URL or mention together; a handful of passes always settles
const MAX_PASSES: usize = 8;

/// Character equivalence table: every source letter is replaced by the
/// canonical representative of its class.
///
/// Tables are per script/locale and can be chained. Targets are resolved
/// transitively on construction so a single fold is already a fixed point.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FoldTable {
    map: BTreeMap<char, char>,
}

impl FoldTable {
    pub fn new<I: IntoIterator<Item = (char, char)>>(pairs: I) -> Self {
        let raw: BTreeMap<char, char> = pairs.into_iter().filter(|(a, b)| a != b).collect();
        let mut map = BTreeMap::new();
        for (&src, &dst) in &raw {
            let mut target = dst;
            let mut hops = 0;
            while let Some(&next) = raw.get(&target) {
                if next == src || hops >= raw.len() {
                    break;
                }
                target = next;
                hops += 1;
            }
            map.insert(src, target);
        }
        Self { map }
    }

    /// Letter variants Arabic typists use interchangeably.
    pub fn arabic() -> Self {
        Self::new([
            ('أ', 'ا'),
            ('إ', 'ا'),
            ('آ', 'ا'),
            ('ة', 'ه'),
            ('ى', 'ي'),
            ('ئ', 'ي'),
            ('ؤ', 'و'),
        ])
    }

    pub fn chain(self, other: FoldTable) -> Self {
        Self::new(self.map.into_iter().chain(other.map))
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn fold(&self, s: &str) -> String {
        if self.map.is_empty() {
            return s.to_string();
        }
        s.chars().map(|c| *self.map.get(&c).unwrap_or(&c)).collect()
    }
}

/// Turns raw records into comparable ones.
///
/// Every record that fails date parsing in one batch receives the same
/// `fallback_time`, captured when the normalizer is built. This is lossy: such
/// records will cluster by content against whatever falls near "now", and the
/// record's [`ParseOutcome`] says so.
#[derive(Debug, Clone)]
pub struct Normalizer {
    folds: FoldTable,
    fallback_time: DateTime<Utc>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(FoldTable::arabic())
    }
}

impl Normalizer {
    pub fn new(folds: FoldTable) -> Self {
        Self {
            folds,
            fallback_time: Utc::now(),
        }
    }

    pub fn with_fallback_time(mut self, fallback_time: DateTime<Utc>) -> Self {
        self.fallback_time = fallback_time;
        self
    }

    pub fn fallback_time(&self) -> DateTime<Utc> {
        self.fallback_time
    }

    pub fn normalize(&self, raw: &RawRecord) -> NormalizedRecord {
        let parsed = parse_timestamp(&raw.date);
        if parsed.is_none() {
            debug!("Unparsable date, using fallback - raw={:?}, fallback={}", raw.date, self.fallback_time);
        }
        let timestamp = parsed.unwrap_or(self.fallback_time);

        let reply_targets = match raw.reply_to.as_deref().map(str::trim) {
            Some(explicit) if !explicit.is_empty() => parse_reply_to(explicit),
            _ => self.extract_mentions(&raw.text),
        };

        let comparison_text = self.normalize_text(&raw.text);
        let content_fingerprint = fingerprint(&comparison_text);
        let record_fingerprint = fingerprint(&format!(
            "{}_{}",
            timestamp.format("%Y-%m-%d"),
            comparison_text
        ));

        let outcome = ParseOutcome::from_flags(
            parsed.is_none().then_some(raw.date.as_str()),
            raw.text.trim().is_empty(),
        );

        NormalizedRecord {
            timestamp,
            display_text: raw.text.clone(),
            reply_targets,
            urls: raw.urls.clone(),
            comparison_text,
            content_fingerprint,
            record_fingerprint,
            outcome,
        }
    }

    /// Canonical comparison form of a post body. Idempotent.
    pub fn normalize_text(&self, text: &str) -> String {
        let mut current = self.canonical_pass(text);
        for _ in 0..MAX_PASSES {
            let next = self.canonical_pass(&current);
            if next == current {
                break;
            }
            current = next;
        }
        current
    }

    fn canonical_pass(&self, text: &str) -> String {
        let folded = self.fold_collapsed(text);
        let without_urls = URL_RE.replace_all(&folded, "");
        let without_mentions = MENTION_RE.replace_all(&without_urls, "");
        collapse_whitespace(&without_mentions)
    }

    fn fold_collapsed(&self, text: &str) -> String {
        let composed: String = text.nfc().collect();
        self.folds.fold(&collapse_whitespace(&composed))
    }

    /// Mention handles (without '@') addressed by a post.
    ///
    /// A leading run of mentions is the addressee list and wins; otherwise
    /// every mention anywhere in the text counts.
    pub fn extract_mentions(&self, text: &str) -> BTreeSet<String> {
        let cleaned = self.fold_collapsed(text);
        let scope = match LEADING_MENTIONS_RE.find(&cleaned) {
            Some(m) => m.as_str(),
            None => cleaned.as_str(),
        };
        handles_in(scope)
    }
}

/// Accepts `2024-01-31T10:46:43.000Z` style UTC timestamps and bare
/// `2024-01-31` dates (midnight UTC). Anything else is `None`.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.contains('T') && s.ends_with('Z') {
        return DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc));
    }
    if s.len() == 10 {
        return NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|ndt| ndt.and_utc());
    }
    None
}

fn parse_reply_to(explicit: &str) -> BTreeSet<String> {
    let handles = handles_in(explicit);
    if !handles.is_empty() {
        return handles;
    }
    explicit
        .split(|c: char| c == ',' || c.is_whitespace())
        .map(|t| t.trim_start_matches('@'))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn handles_in(s: &str) -> BTreeSet<String> {
    MENTION_RE
        .find_iter(s)
        .map(|m| m.as_str().trim_start_matches('@').to_string())
        .collect()
}

pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn fingerprint(s: &str) -> String {
    format!("{:016x}", xxh3_64(s.as_bytes()))
}
