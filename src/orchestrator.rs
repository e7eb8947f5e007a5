use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::archive::{load_records, render_archive};
use crate::cluster::{build_clusters, DedupParams};
use crate::models::{DuplicateCluster, NormalizedRecord, RawRecord, Resolution};
use crate::normalize::Normalizer;
use crate::report::{generate_report, render_report_json, Report};
use crate::resolve::resolve;

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub report: Option<PathBuf>,
    pub params: DedupParams,
}

/// Everything one batch produces, before anything touches disk.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub records: Vec<NormalizedRecord>,
    pub clusters: Vec<DuplicateCluster>,
    pub resolution: Resolution,
    pub report: Report,
}

impl BatchOutcome {
    pub fn kept_records(&self) -> Vec<&NormalizedRecord> {
        self.resolution.kept_records(&self.records)
    }
}

/// Pure in-memory pass: normalize, cluster, resolve, report.
pub fn dedup_batch(raw: &[RawRecord], normalizer: &Normalizer, params: &DedupParams) -> BatchOutcome {
    let normalize_start = std::time::Instant::now();
    let records: Vec<NormalizedRecord> = raw.iter().map(|r| normalizer.normalize(r)).collect();
    debug!(
        "Normalization completed - duration={:.2}s, records={}",
        normalize_start.elapsed().as_secs_f32(),
        records.len()
    );

    let cluster_start = std::time::Instant::now();
    let clusters = build_clusters(&records, params);
    info!(
        "Clustering completed - duration={:.2}s, clusters={}",
        cluster_start.elapsed().as_secs_f32(),
        clusters.len()
    );

    let resolution = resolve(&clusters, &records);
    let report = generate_report(&records, &clusters, &resolution);

    let d = &report.degraded;
    if d.defaulted_dates > 0 || d.empty_texts > 0 {
        warn!(
            "Degraded records absorbed - defaulted_dates={}, empty_texts={} (dates fell back to {})",
            d.defaulted_dates,
            d.empty_texts,
            normalizer.fallback_time()
        );
    }

    BatchOutcome {
        records,
        clusters,
        resolution,
        report,
    }
}

/// Load → dedup → persist. Output files are only written once the whole
/// batch has been processed; a missing input aborts before anything is written.
pub fn run_dedup(opts: &RunOptions) -> Result<BatchOutcome> {
    let pipeline_start = std::time::Instant::now();
    info!("Pipeline started - input={}", opts.input.display());

    let raw = load_records(&opts.input)?;
    if raw.is_empty() {
        warn!("No posts found in {}", opts.input.display());
    }

    info!(
        "Dedup parameters - threshold={}, window_hours={}",
        opts.params.threshold,
        opts.params.window.num_hours()
    );
    let outcome = dedup_batch(&raw, &Normalizer::default(), &opts.params);

    // render everything before touching disk
    let mut files: Vec<(&Path, Vec<u8>)> = Vec::new();
    if let Some(path) = &opts.output {
        files.push((path.as_path(), render_archive(&outcome.kept_records()).into_bytes()));
    }
    if let Some(path) = &opts.report {
        files.push((path.as_path(), render_report_json(&outcome.report)?));
    }
    persist_all(&files)?;

    info!(
        "Pipeline completed - duration={:.2}s, original={}, kept={}, removed={}, clusters={}",
        pipeline_start.elapsed().as_secs_f32(),
        outcome.report.original_count,
        outcome.report.kept_count,
        outcome.report.removed_count,
        outcome.report.cluster_count
    );
    Ok(outcome)
}

/// Writes every file or none: on the first failure, files already written
/// in this call are removed again.
fn persist_all(files: &[(&Path, Vec<u8>)]) -> Result<()> {
    for (done, (path, bytes)) in files.iter().enumerate() {
        if let Err(e) = std::fs::write(path, bytes) {
            for (written, _) in &files[..done] {
                if let Err(cleanup) = std::fs::remove_file(written) {
                    warn!("Could not remove partial output {} - {}", written.display(), cleanup);
                }
            }
            return Err(e).with_context(|| format!("Writing {}", path.display()));
        }
        info!("Output saved - path={}, bytes={}", path.display(), bytes.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::parse_archive;
    use chrono::{TimeZone, Utc};

    const INPUT: &str = "\
TWEET 1
Date: 2024-01-31T10:00:00.000Z
CONTENT:
Hello world

==========
TWEET 2
Date: 2024-01-31T08:00:00.000Z
CONTENT:
Hello   world

==========
TWEET 3
Date: 2024-01-29T08:00:00.000Z
CONTENT:
Hello world

==========
TWEET 4
Date: 2024-01-31T09:00:00.000Z
CONTENT:
@alice @bob thanks!
";

    fn opts(dir: &std::path::Path) -> RunOptions {
        let input = dir.join("in.txt");
        std::fs::write(&input, INPUT).unwrap();
        RunOptions {
            input,
            output: Some(dir.join("out.txt")),
            report: Some(dir.join("report.json")),
            params: DedupParams::default(),
        }
    }

    #[test]
    fn test_end_to_end_writes_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let o = opts(dir.path());
        let outcome = run_dedup(&o).unwrap();

        assert_eq!(outcome.report.original_count, 4);
        assert_eq!(outcome.report.kept_count, 3);
        assert_eq!(outcome.report.cluster_count, 1);
        assert_eq!(outcome.resolution.kept, vec![1, 2, 3]);

        let written = std::fs::read_to_string(o.output.as_ref().unwrap()).unwrap();
        let reread = parse_archive(&written);
        assert_eq!(reread.len(), 3);
        assert_eq!(reread[0].text, "Hello   world");
        assert_eq!(reread[2].reply_to.as_deref(), Some("@alice, @bob"));

        let report: Report =
            serde_json::from_slice(&std::fs::read(o.report.as_ref().unwrap()).unwrap()).unwrap();
        assert_eq!(report, outcome.report);
    }

    #[test]
    fn test_missing_input_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let o = RunOptions {
            input: dir.path().join("missing.txt"),
            output: Some(dir.path().join("out.txt")),
            report: Some(dir.path().join("report.json")),
            params: DedupParams::default(),
        };
        assert!(run_dedup(&o).is_err());
        assert!(!dir.path().join("out.txt").exists());
        assert!(!dir.path().join("report.json").exists());
    }

    #[test]
    fn test_failed_report_write_leaves_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let mut o = opts(dir.path());
        o.report = Some(dir.path().join("no_such_dir").join("report.json"));
        let err = run_dedup(&o).unwrap_err();
        assert!(format!("{:#}", err).contains("report.json"));
        assert!(!dir.path().join("out.txt").exists());
    }

    #[test]
    fn test_empty_batch_is_not_fatal() {
        let normalizer = Normalizer::default().with_fallback_time(Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap());
        let outcome = dedup_batch(&[], &normalizer, &DedupParams::default());
        assert!(outcome.resolution.kept.is_empty());
        assert!(outcome.clusters.is_empty());
        assert_eq!(outcome.report.removed_count, 0);
    }

    #[test]
    fn test_malformed_records_are_absorbed() {
        let normalizer = Normalizer::default().with_fallback_time(Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap());
        let raw = vec![
            RawRecord { date: "???".into(), text: "".into(), ..Default::default() },
            RawRecord { date: "2024-01-31".into(), text: "fine".into(), ..Default::default() },
        ];
        let outcome = dedup_batch(&raw, &normalizer, &DedupParams::default());
        assert_eq!(outcome.report.kept_count, 2);
        assert_eq!(outcome.report.degraded.defaulted_dates, 1);
        assert_eq!(outcome.report.degraded.empty_texts, 1);
    }
}
