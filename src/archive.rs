use anyhow::{bail, Context, Result};
use chrono::SecondsFormat;
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use std::{fs, path::Path};
use tracing::{debug, info};

use crate::models::{NormalizedRecord, RawRecord};

static POST_HEADER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^TWEET \d+$").unwrap());

const SEPARATOR_WIDTH: usize = 80;
const ESCAPE: char = '\\';

// block metadata the scraper emits that carries nothing we compare on
const IGNORED_KEYS: [&str; 6] = [
    "Author:",
    "Reply Text:",
    "Username:",
    "Date Range:",
    "Total Tweets:",
    "Total tweets:",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Section {
    #[default]
    Header,
    Body,
    Urls,
}

#[derive(Debug, Default)]
struct Block {
    date: Option<String>,
    reply_to: Option<String>,
    body: Vec<String>,
    urls: Vec<String>,
    section: Section,
}

impl Block {
    fn take_into(&mut self, out: &mut Vec<RawRecord>) {
        let block = std::mem::take(self);
        if block.date.is_none() && block.body.is_empty() {
            return;
        }
        out.push(RawRecord {
            date: block.date.unwrap_or_default(),
            text: block.body.join("\n").trim().to_string(),
            reply_to: block.reply_to.filter(|r| !r.is_empty()),
            urls: block.urls,
        });
    }
}

fn is_separator(line: &str) -> bool {
    line.len() >= 3 && line.chars().all(|c| c == '=')
}

fn is_structural(line: &str) -> bool {
    let line = line.trim();
    is_separator(line)
        || POST_HEADER_RE.is_match(line)
        || value_after(line, &["URLS:", "URLs:"]) == Some("")
}

// body lines that would read back as structure get a leading '\'; so do
// lines already starting with one, which keeps the escape unambiguous
fn escape_body_line(line: &str) -> String {
    if line.starts_with(ESCAPE) || is_structural(line) {
        format!("{}{}", ESCAPE, line)
    } else {
        line.to_string()
    }
}

fn unescape_body_line(line: &str) -> &str {
    match line.strip_prefix(ESCAPE) {
        Some(rest) if rest.starts_with(ESCAPE) || is_structural(rest) => rest,
        _ => line,
    }
}

fn value_after<'a>(line: &'a str, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|k| line.strip_prefix(*k))
        .map(str::trim)
}

/// Reads the block-per-post text layout written by the scraper and by
/// [`render_archive`].
///
/// Within a post body only separators, `TWEET n` headers and the URL list
/// header are structural; everything else is body text. Body lines escaped
/// by [`render_archive`] are read back verbatim.
pub fn parse_archive(text: &str) -> Vec<RawRecord> {
    let mut out = Vec::new();
    let mut block = Block::default();

    for raw_line in text.lines() {
        let line = raw_line.trim();

        if is_separator(line) || POST_HEADER_RE.is_match(line) {
            block.take_into(&mut out);
            continue;
        }
        if value_after(line, &["URLS:", "URLs:"]) == Some("") {
            block.section = Section::Urls;
            continue;
        }

        match block.section {
            Section::Body => block
                .body
                .push(unescape_body_line(raw_line).to_string()),
            Section::Urls => {
                if let Some(date) = value_after(line, &["Date:"]) {
                    block.take_into(&mut out);
                    block.date = Some(date.to_string());
                } else if let Some(url) = line.strip_prefix("- ") {
                    block.urls.push(url.trim().to_string());
                } else if line.starts_with("http") {
                    block.urls.push(line.to_string());
                }
            }
            Section::Header => {
                if line.is_empty() || IGNORED_KEYS.iter().any(|k| line.starts_with(*k)) {
                    continue;
                }
                if let Some(date) = value_after(line, &["Date:"]) {
                    if block.date.is_some() {
                        block.take_into(&mut out);
                    }
                    block.date = Some(date.to_string());
                } else if let Some(reply) = value_after(line, &["REPLY TO:", "Replying to:"]) {
                    block.reply_to = Some(reply.to_string());
                } else if value_after(line, &["CONTENT:", "Main Tweet:"]) == Some("") {
                    block.section = Section::Body;
                } else if block.date.is_some() {
                    // unlabeled body right after the date line
                    block.section = Section::Body;
                    block.body.push(raw_line.trim_end().to_string());
                } else {
                    debug!("Skipping archive header line - {:?}", line);
                }
            }
        }
    }
    block.take_into(&mut out);
    out
}

pub fn load_records<P: AsRef<Path>>(path: P) -> Result<Vec<RawRecord>> {
    let path = path.as_ref();
    if !path.exists() {
        bail!("Input file {} not found", path.display());
    }
    let text = fs::read_to_string(path)
        .with_context(|| format!("Reading input file {}", path.display()))?;
    let records = parse_archive(&text);
    info!("Archive loaded - path={}, records={}", path.display(), records.len());
    Ok(records)
}

/// Renders records in the same layout [`parse_archive`] reads, so the output
/// can be fed in again as input.
pub fn render_archive(records: &[&NormalizedRecord]) -> String {
    let sep = "=".repeat(SEPARATOR_WIDTH);
    let mut out = String::new();
    out.push_str("CLEANED TWEETS - DUPLICATES REMOVED\n");
    out.push_str(&format!("Total tweets: {}\n", records.len()));
    out.push_str(&format!("{}\n\n", sep));

    for (i, r) in records.iter().enumerate() {
        out.push_str(&format!("TWEET {}\n", i + 1));
        out.push_str(&format!(
            "Date: {}\n",
            r.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true)
        ));
        out.push_str(&format!(
            "REPLY TO: {}\n",
            r.reply_targets.iter().map(|h| format!("@{}", h)).join(", ")
        ));
        out.push_str("CONTENT:\n");
        for line in r.display_text.lines() {
            out.push_str(&escape_body_line(line));
            out.push('\n');
        }

        if !r.urls.is_empty() {
            out.push_str("\nURLS:\n");
            for url in &r.urls {
                out.push_str(&format!("- {}\n", url));
            }
        }
        out.push_str(&format!("\n{}\n\n", sep));
    }
    out
}
