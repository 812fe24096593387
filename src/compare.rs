//! Per-level deltas between a baseline and a candidate snapshot.
//!
//! Deltas are always `candidate - baseline`. Lower is better for latency and
//! failure rate, higher is better for throughput.

use crate::error::{ Error, Result };
use crate::report::{ format_latency, BatchResult, OverallStats, ResultSnapshot };
use crate::stats::{ self, LatencySummary };
use crate::store::ResultStore;

use chrono::{ DateTime, Utc };
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

const RULE_WIDTH: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Baseline,
    Candidate,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Baseline => f.write_str("baseline"),
            Side::Candidate => f.write_str("candidate"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotLabel {
    pub side: Side,
    pub source: Option<String>, // file the snapshot was loaded from
    pub target_url: String,
    pub timestamp: DateTime<Utc>,
}

/// Figures for one level of one snapshot, recomputed from its outcomes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelFigures {
    pub latency: LatencySummary,
    pub throughput_rps: f64,
    pub failure_rate: f64,
}

impl LevelFigures {
    fn from_batch(batch: &BatchResult) -> Self {
        let latencies: Vec<f64> = batch.outcomes
            .iter()
            .map(|o| o.elapsed_ms)
            .collect();
        let failures = batch.outcomes
            .iter()
            .filter(|o| !o.success)
            .count();
        LevelFigures {
            latency: LatencySummary::from_samples(&latencies).unwrap_or_default(),
            throughput_rps: stats::throughput(batch.concurrency, batch.duration_ms),
            failure_rate: stats::fraction(failures, batch.outcomes.len()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencyDelta {
    pub mean_ms: f64,
    pub median_ms: f64,
    pub p95_ms: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LevelComparison {
    pub concurrency: usize,
    pub baseline: LevelFigures,
    pub candidate: LevelFigures,
    pub latency: LatencyDelta,
    pub throughput_rps: f64,
    pub failure_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnmatchedLevel {
    pub concurrency: usize,
    pub present_in: Side,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverallDelta {
    pub success_rate: f64,
    pub throughput_rps: f64,
    pub mean_ms: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonReport {
    pub baseline: SnapshotLabel,
    pub candidate: SnapshotLabel,
    pub levels: Vec<LevelComparison>, // ascending concurrency
    pub unmatched: Vec<UnmatchedLevel>, // ascending concurrency
    pub overall: OverallDelta,
}

impl ComparisonReport {
    pub fn level(&self, concurrency: usize) -> Option<&LevelComparison> {
        self.levels.iter().find(|l| l.concurrency == concurrency)
    }
}

/// Compare two snapshots; the first argument is the baseline.
pub fn compare(baseline: &ResultSnapshot, candidate: &ResultSnapshot) -> Result<ComparisonReport> {
    for (side, snapshot) in [
        (Side::Baseline, baseline),
        (Side::Candidate, candidate),
    ] {
        if snapshot.batches.is_empty() {
            return Err(Error::input(format!("{side} snapshot contains no batch results")));
        }
    }

    let all_levels: BTreeSet<usize> = baseline
        .levels()
        .into_iter()
        .chain(candidate.levels())
        .collect();

    let mut levels = Vec::new();
    let mut unmatched = Vec::new();
    for concurrency in all_levels {
        match (baseline.batch(concurrency), candidate.batch(concurrency)) {
            (Some(b), Some(c)) => levels.push(compare_level(concurrency, b, c)),
            (Some(_), None) => unmatched.push(UnmatchedLevel { concurrency, present_in: Side::Baseline }),
            (None, Some(_)) => unmatched.push(UnmatchedLevel { concurrency, present_in: Side::Candidate }),
            (None, None) => {}
        }
    }

    let (b, c) = (OverallStats::from_batches(&baseline.batches), OverallStats::from_batches(&candidate.batches));
    let overall = OverallDelta {
        success_rate: c.success_rate - b.success_rate,
        throughput_rps: c.throughput_rps - b.throughput_rps,
        mean_ms: c.latency.mean_ms - b.latency.mean_ms,
    };

    Ok(ComparisonReport {
        baseline: label(Side::Baseline, baseline),
        candidate: label(Side::Candidate, candidate),
        levels,
        unmatched,
        overall,
    })
}

/// Load both snapshots through the store and compare them.
pub fn compare_files(store: &ResultStore, baseline: &Path, candidate: &Path) -> Result<ComparisonReport> {
    let baseline_path = store.resolve(baseline);
    let candidate_path = store.resolve(candidate);
    let base = store.load(&baseline_path)?;
    let cand = store.load(&candidate_path)?;

    let mut report = compare(&base, &cand)?;
    report.baseline.source = Some(baseline_path.display().to_string());
    report.candidate.source = Some(candidate_path.display().to_string());
    Ok(report)
}

fn label(side: Side, snapshot: &ResultSnapshot) -> SnapshotLabel {
    SnapshotLabel {
        side,
        source: None,
        target_url: snapshot.target_url.clone(),
        timestamp: snapshot.timestamp,
    }
}

fn compare_level(concurrency: usize, baseline: &BatchResult, candidate: &BatchResult) -> LevelComparison {
    let b = LevelFigures::from_batch(baseline);
    let c = LevelFigures::from_batch(candidate);
    LevelComparison {
        concurrency,
        baseline: b,
        candidate: c,
        latency: LatencyDelta {
            mean_ms: c.latency.mean_ms - b.latency.mean_ms,
            median_ms: c.latency.median_ms - b.latency.median_ms,
            p95_ms: c.latency.p95_ms - b.latency.p95_ms,
        },
        throughput_rps: c.throughput_rps - b.throughput_rps,
        failure_rate: c.failure_rate - b.failure_rate,
    }
}

/*---------= Everything related to printing =----------*/

// verdict word for a delta where `lower_is_better` decides the direction
fn verdict(delta: f64, lower_is_better: bool) -> &'static str {
    if delta == 0.0 {
        "same"
    } else if (delta < 0.0) == lower_is_better {
        "better"
    } else {
        "worse"
    }
}

fn signed_latency(delta: f64) -> String {
    if delta >= 0.0 { format!("+{}", format_latency(delta)) } else { format_latency(delta) }
}

fn write_label(f: &mut fmt::Formatter<'_>, label: &SnapshotLabel) -> fmt::Result {
    let name = match label.side {
        Side::Baseline => "Baseline",
        Side::Candidate => "Candidate",
    };
    writeln!(f, "\n{}: {}", name, label.source.as_deref().unwrap_or("(in memory)"))?;
    writeln!(f, "  URL: {}", label.target_url)?;
    writeln!(f, "  Timestamp: {}", label.timestamp.to_rfc3339())
}

impl fmt::Display for ComparisonReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(RULE_WIDTH);
        writeln!(f, "{rule}")?;
        writeln!(f, "Webhook Test Results Comparison")?;
        writeln!(f, "{rule}")?;
        write_label(f, &self.baseline)?;
        write_label(f, &self.candidate)?;

        writeln!(f, "\n{rule}\nOVERALL\n{rule}")?;
        let o = &self.overall;
        writeln!(
            f,
            "  Success rate:   {:+.2}% ({})",
            o.success_rate * 100.0,
            verdict(o.success_rate, false)
        )?;
        writeln!(
            f,
            "  Throughput:     {:+.2} req/s ({})",
            o.throughput_rps,
            verdict(o.throughput_rps, false)
        )?;
        writeln!(f, "  Mean latency:   {} ({})", signed_latency(o.mean_ms), verdict(o.mean_ms, true))?;

        writeln!(f, "\n{rule}\nPER CONCURRENCY LEVEL\n{rule}")?;
        for level in &self.levels {
            let (b, c) = (&level.baseline, &level.candidate);
            writeln!(f, "\nConcurrency {}:", level.concurrency)?;
            writeln!(
                f,
                "  Mean latency:   {} -> {}  {} ({})",
                format_latency(b.latency.mean_ms),
                format_latency(c.latency.mean_ms),
                signed_latency(level.latency.mean_ms),
                verdict(level.latency.mean_ms, true)
            )?;
            writeln!(
                f,
                "  Median latency: {} -> {}  {}",
                format_latency(b.latency.median_ms),
                format_latency(c.latency.median_ms),
                signed_latency(level.latency.median_ms)
            )?;
            writeln!(
                f,
                "  p95 latency:    {} -> {}  {}",
                format_latency(b.latency.p95_ms),
                format_latency(c.latency.p95_ms),
                signed_latency(level.latency.p95_ms)
            )?;
            writeln!(
                f,
                "  Throughput:     {:.2} -> {:.2} req/s  {:+.2} ({})",
                b.throughput_rps,
                c.throughput_rps,
                level.throughput_rps,
                verdict(level.throughput_rps, false)
            )?;
            writeln!(
                f,
                "  Failure rate:   {:.2}% -> {:.2}%  {:+.2}% ({})",
                b.failure_rate * 100.0,
                c.failure_rate * 100.0,
                level.failure_rate * 100.0,
                verdict(level.failure_rate, true)
            )?;
        }

        if !self.unmatched.is_empty() {
            writeln!(f, "\nUnmatched levels:")?;
            for u in &self.unmatched {
                writeln!(f, "  Concurrency {}: {} only", u.concurrency, u.present_in)?;
            }
        }
        writeln!(f, "{rule}")
    }
}
