use crate::error::{ Error, RequestError, Result };
use crate::payload::Payload;
use crate::stats::{ self, LatencySummary };

use chrono::{ DateTime, Utc };
use serde::{ Deserialize, Serialize };
use std::time::Duration;

pub const SNAPSHOT_SCHEMA_V1: &str = "webhook-bench.snapshot.v1";

const FIELD_WIDTH: usize = 24; //  width of each field for formatting print
const PREVIEW_CHARS: usize = 200; // response body kept per request

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Transport,
    Timeout,
    Protocol,
}

impl From<&RequestError> for FailureKind {
    fn from(err: &RequestError) -> Self {
        match err {
            RequestError::Transport(_) => FailureKind::Transport,
            RequestError::Timeout(_) => FailureKind::Timeout,
            RequestError::Protocol { .. } => FailureKind::Protocol,
        }
    }
}

/// What came back from the target when a response was received at all.
#[derive(Debug, Clone, PartialEq)]
pub struct Exchange {
    pub status: u16,
    pub reason: Option<String>,
    pub body: Option<String>,
}

/// One dispatched request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestOutcome {
    pub request_id: usize, // 1-based position within the batch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub elapsed_ms: f64,
    pub status_code: Option<u16>, // absent on transport failure
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<FailureKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_preview: Option<String>,
}

impl RequestOutcome {
    /// Record a finished request. Responses outside 2xx/3xx become protocol failures.
    pub fn record(
        request_id: usize,
        session_id: Option<String>,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
        elapsed: Duration,
        result: std::result::Result<Exchange, RequestError>
    ) -> Self {
        let mut outcome = RequestOutcome {
            request_id,
            session_id,
            started_at,
            ended_at,
            elapsed_ms: stats::duration_ms(elapsed),
            status_code: None,
            success: false,
            error: None,
            failure_kind: None,
            response_preview: None,
        };

        match result {
            Ok(exchange) => {
                outcome.status_code = Some(exchange.status);
                outcome.response_preview = exchange.body.map(|b| b.chars().take(PREVIEW_CHARS).collect());
                if (200..400).contains(&exchange.status) {
                    outcome.success = true;
                } else {
                    outcome.fail(&(RequestError::Protocol {
                        status: exchange.status,
                        reason: exchange.reason,
                    }));
                }
            }
            Err(err) => outcome.fail(&err),
        }
        outcome
    }

    fn fail(&mut self, err: &RequestError) {
        self.success = false;
        self.failure_kind = Some(err.into());
        self.error = Some(err.to_string());
    }

    fn check(&self) -> std::result::Result<(), String> {
        if self.success && self.status_code.is_none() {
            return Err(format!("request {} succeeded without a status code", self.request_id));
        }
        if !self.success && self.error.as_deref().map_or(true, str::is_empty) {
            return Err(format!("request {} failed without an error description", self.request_id));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchStats {
    pub latency: LatencySummary,
    pub success_count: usize,
    pub failure_count: usize,
    pub timeout_count: usize,
    pub failure_rate: f64,
    pub throughput_rps: f64,
}

/// All outcomes of one concurrency level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub concurrency: usize,
    pub started_at: DateTime<Utc>,
    pub duration_ms: f64, // first dispatch to last completion
    pub stats: BatchStats,
    pub outcomes: Vec<RequestOutcome>,
}

impl BatchResult {
    pub fn new(
        concurrency: usize,
        started_at: DateTime<Utc>,
        duration: Duration,
        outcomes: Vec<RequestOutcome>
    ) -> Self {
        debug_assert_eq!(outcomes.len(), concurrency);
        let duration_ms = stats::duration_ms(duration);

        let latencies: Vec<f64> = outcomes
            .iter()
            .map(|o| o.elapsed_ms)
            .collect();
        let success_count = outcomes
            .iter()
            .filter(|o| o.success)
            .count();
        let timeout_count = outcomes
            .iter()
            .filter(|o| o.failure_kind == Some(FailureKind::Timeout))
            .count();
        let failure_count = outcomes.len() - success_count;

        let stats = BatchStats {
            latency: LatencySummary::from_samples(&latencies).unwrap_or_default(),
            success_count,
            failure_count,
            timeout_count,
            failure_rate: stats::fraction(failure_count, outcomes.len()),
            throughput_rps: stats::throughput(concurrency, duration_ms),
        };

        BatchResult { concurrency, started_at, duration_ms, stats, outcomes }
    }

    /// A hint for the operator when every request of the batch failed.
    pub fn failure_hint(&self) -> Option<String> {
        if self.stats.success_count > 0 {
            return None;
        }
        let first = self.outcomes.first()?;
        if first.status_code == Some(404) {
            return Some(
                "all requests returned 404: the webhook path may not be registered or its workflow may be inactive".to_string()
            );
        }
        first.error.as_ref().map(|e| format!("all requests failed, first error: {e}"))
    }

    pub fn print_summary(&self) {
        println!();
        println!("Batch of {} parallel request(s):", self.concurrency);
        println!(
            "{:<field_width$}{:.4}s",
            "Total Time:",
            self.duration_ms / 1000.0,
            field_width = FIELD_WIDTH
        );
        println!(
            "{:<field_width$}{:.2}",
            "Requests/sec:",
            self.stats.throughput_rps,
            field_width = FIELD_WIDTH
        );
        println!(
            "{:<field_width$}{}/{}",
            "Successful:",
            self.stats.success_count,
            self.concurrency,
            field_width = FIELD_WIDTH
        );
        if self.stats.failure_count > 0 {
            println!(
                "{:<field_width$}{}/{} (timeouts {})",
                "Failed:",
                self.stats.failure_count,
                self.concurrency,
                self.stats.timeout_count,
                field_width = FIELD_WIDTH
            );
        }
        if let Some(hint) = self.failure_hint() {
            println!("Warning: {}", hint);
        }
        print_latency_row(&self.stats.latency);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub version: String,
}

impl Default for ToolInfo {
    fn default() -> Self {
        ToolInfo {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Totals across every batch of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverallStats {
    pub total_requests: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub success_rate: f64,
    pub total_duration_ms: f64, // sum of batch durations, pauses excluded
    pub throughput_rps: f64,
    pub latency: LatencySummary,
}

impl OverallStats {
    pub fn from_batches(batches: &[BatchResult]) -> Self {
        let total_requests: usize = batches
            .iter()
            .map(|b| b.outcomes.len())
            .sum();
        let success_count: usize = batches
            .iter()
            .map(|b| b.stats.success_count)
            .sum();
        let total_duration_ms: f64 = batches
            .iter()
            .map(|b| b.duration_ms)
            .sum();
        let latencies: Vec<f64> = batches
            .iter()
            .flat_map(|b| b.outcomes.iter().map(|o| o.elapsed_ms))
            .collect();

        OverallStats {
            total_requests,
            success_count,
            failure_count: total_requests - success_count,
            success_rate: stats::fraction(success_count, total_requests),
            total_duration_ms,
            throughput_rps: stats::throughput(total_requests, total_duration_ms),
            latency: LatencySummary::from_samples(&latencies).unwrap_or_default(),
        }
    }
}

/// A persisted record of one complete run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSnapshot {
    pub schema: String,
    pub tool: ToolInfo,
    pub target_url: String, // credentials, query and fragment removed
    pub payload: Payload, // sensitive fields masked, see Payload::redacted
    pub timestamp: DateTime<Utc>,
    pub batches: Vec<BatchResult>,
    pub overall: OverallStats,
}

impl ResultSnapshot {
    pub fn new(
        target_url: String,
        payload: Payload,
        timestamp: DateTime<Utc>,
        batches: Vec<BatchResult>
    ) -> Self {
        let overall = OverallStats::from_batches(&batches);
        ResultSnapshot {
            schema: SNAPSHOT_SCHEMA_V1.to_string(),
            tool: ToolInfo::default(),
            target_url,
            payload,
            timestamp,
            batches,
            overall,
        }
    }

    pub fn levels(&self) -> Vec<usize> {
        self.batches
            .iter()
            .map(|b| b.concurrency)
            .collect()
    }

    pub fn batch(&self, concurrency: usize) -> Option<&BatchResult> {
        self.batches.iter().find(|b| b.concurrency == concurrency)
    }

    /// Check the structural invariants a loaded snapshot must hold.
    pub fn validate(&self) -> Result<()> {
        if self.schema != SNAPSHOT_SCHEMA_V1 {
            return Err(
                Error::input(
                    format!("unsupported snapshot schema \"{}\" (expected {})", self.schema, SNAPSHOT_SCHEMA_V1)
                )
            );
        }
        if self.batches.is_empty() {
            return Err(Error::input("snapshot contains no batch results"));
        }
        for pair in self.batches.windows(2) {
            if pair[1].concurrency <= pair[0].concurrency {
                return Err(
                    Error::input(
                        format!(
                            "batch levels must be strictly ascending, found {} after {}",
                            pair[1].concurrency,
                            pair[0].concurrency
                        )
                    )
                );
            }
        }
        for batch in &self.batches {
            if batch.concurrency == 0 {
                return Err(Error::input("batch concurrency must be at least 1"));
            }
            if batch.outcomes.len() != batch.concurrency {
                return Err(
                    Error::input(
                        format!(
                            "batch of {} holds {} outcome(s)",
                            batch.concurrency,
                            batch.outcomes.len()
                        )
                    )
                );
            }
            for outcome in &batch.outcomes {
                outcome
                    .check()
                    .map_err(|e| Error::input(format!("batch of {}: {e}", batch.concurrency)))?;
            }
        }
        Ok(())
    }

    /// Print the run report
    pub fn print_report(&self, summarize: bool) {
        if summarize {
            self.print_summarized_report();
        } else {
            self.print_full_report();
        }
    }

    fn print_summarized_report(&self) {
        let o = &self.overall;
        print!("\n\n");
        println!(
            "Sent {} requests in {:.2}s, {} failed ({:.2}% success)",
            o.total_requests,
            o.total_duration_ms / 1000.0,
            o.failure_count,
            o.success_rate * 100.0
        );
        println!("{:<20} {:>7.3}", "Request(s) per sec:", o.throughput_rps);
        print_latency_row(&o.latency);
    }

    fn print_full_report(&self) {
        let o = &self.overall;
        print!("\n\n");
        println!("{:<field_width$}{}", "Target:", self.target_url, field_width = FIELD_WIDTH);
        println!(
            "{:<field_width$}{}",
            "Timestamp:",
            self.timestamp.to_rfc3339(),
            field_width = FIELD_WIDTH
        );
        println!("{:<field_width$}{:?}\n", "Levels:", self.levels(), field_width = FIELD_WIDTH);

        println!("{:<field_width$}{}", "Total Requests:", o.total_requests, field_width = FIELD_WIDTH);
        println!("{:<field_width$}{}", "Successful:", o.success_count, field_width = FIELD_WIDTH);
        println!("{:<field_width$}{}", "Failed:", o.failure_count, field_width = FIELD_WIDTH);
        println!(
            "{:<field_width$}{:.2}%",
            "Success Rate:",
            o.success_rate * 100.0,
            field_width = FIELD_WIDTH
        );
        println!(
            "{:<field_width$}{:.4}s",
            "Total Test Duration:",
            o.total_duration_ms / 1000.0,
            field_width = FIELD_WIDTH
        );
        println!(
            "{:<field_width$}{:.2}",
            "Requests/sec:",
            o.throughput_rps,
            field_width = FIELD_WIDTH
        );
        println!();
        print_latency_row(&o.latency);
    }
}

fn print_latency_row(latency: &LatencySummary) {
    println!("Time Taken for Requests:");
    println!(
        " {:<10} {:<10} {:<10} {:<10} {:<10}",
        "Min",
        "Avg",
        "Median",
        "p95",
        "Max"
    );
    println!(
        " {:<10} {:<10} {:<10} {:<10} {:<10}",
        format_latency(latency.min_ms),
        format_latency(latency.mean_ms),
        format_latency(latency.median_ms),
        format_latency(latency.p95_ms),
        format_latency(latency.max_ms)
    );
}

// convert into seconds if the value is greater than 1000ms
pub fn format_latency(value: f64) -> String {
    if value.abs() > 1000.0 {
        format!("{:.2}s", value / 1000.0)
    } else {
        format!("{:.2}ms", value)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Outcome with a fixed latency, failing when `status` is outside 2xx/3xx.
    pub(crate) fn outcome(request_id: usize, elapsed_ms: u64, status: u16) -> RequestOutcome {
        let at = DateTime::<Utc>::from_timestamp(1_760_000_000, 0).unwrap();
        RequestOutcome::record(
            request_id,
            None,
            at,
            at,
            Duration::from_millis(elapsed_ms),
            Ok(Exchange { status, reason: None, body: None })
        )
    }

    /// Batch whose requests all took `elapsed_ms`, `failed` of them with HTTP 500.
    pub(crate) fn batch(concurrency: usize, elapsed_ms: u64, failed: usize) -> BatchResult {
        let outcomes = (1..=concurrency)
            .map(|id| outcome(id, elapsed_ms, if id <= failed { 500 } else { 200 }))
            .collect();
        let at = DateTime::<Utc>::from_timestamp(1_760_000_000, 0).unwrap();
        BatchResult::new(concurrency, at, Duration::from_millis(elapsed_ms), outcomes)
    }

    pub(crate) fn snapshot(levels: &[(usize, u64)]) -> ResultSnapshot {
        let batches = levels
            .iter()
            .map(|&(c, ms)| batch(c, ms, 0))
            .collect();
        let at = DateTime::<Utc>::from_timestamp(1_760_000_000, 0).unwrap();
        ResultSnapshot::new("http://localhost:5678/webhook/chat".into(), Payload::default(), at, batches)
    }

    #[test]
    fn status_classification() {
        assert!(outcome(1, 5, 200).success);
        assert!(outcome(1, 5, 204).success);
        assert!(outcome(1, 5, 302).success);
        let failed = outcome(1, 5, 404);
        assert!(!failed.success);
        assert_eq!(failed.status_code, Some(404));
        assert_eq!(failed.failure_kind, Some(FailureKind::Protocol));
        assert_eq!(failed.error.as_deref(), Some("HTTP 404"));
    }

    #[test]
    fn transport_failure_has_no_status() {
        let at = Utc::now();
        let o = RequestOutcome::record(
            3,
            None,
            at,
            at,
            Duration::from_millis(2),
            Err(RequestError::Transport("connection refused".into()))
        );
        assert!(!o.success);
        assert_eq!(o.status_code, None);
        assert_eq!(o.failure_kind, Some(FailureKind::Transport));
        assert!(o.error.unwrap().contains("connection refused"));
    }

    #[test]
    fn response_preview_is_truncated() {
        let at = Utc::now();
        let o = RequestOutcome::record(
            1,
            None,
            at,
            at,
            Duration::ZERO,
            Ok(Exchange { status: 200, reason: None, body: Some("x".repeat(500)) })
        );
        assert_eq!(o.response_preview.unwrap().len(), PREVIEW_CHARS);
    }

    #[test]
    fn batch_counts_failures_and_timeouts() {
        let mut b = batch(10, 100, 3);
        assert_eq!(b.stats.success_count, 7);
        assert_eq!(b.stats.failure_count, 3);
        assert_eq!(b.stats.failure_rate, 0.3);
        assert_eq!(b.stats.throughput_rps, 100.0);

        let at = Utc::now();
        b.outcomes[9] = RequestOutcome::record(
            10,
            None,
            at,
            at,
            Duration::from_secs(60),
            Err(RequestError::Timeout(Duration::from_secs(60)))
        );
        let rebuilt = BatchResult::new(10, b.started_at, Duration::from_millis(100), b.outcomes);
        assert_eq!(rebuilt.stats.timeout_count, 1);
        assert_eq!(rebuilt.stats.failure_count, 4);
    }

    #[test]
    fn hint_only_when_everything_failed() {
        assert!(batch(5, 10, 4).failure_hint().is_none());
        let all_404 = BatchResult::new(
            2,
            Utc::now(),
            Duration::from_millis(5),
            vec![outcome(1, 5, 404), outcome(2, 5, 404)]
        );
        assert!(all_404.failure_hint().unwrap().contains("404"));
    }

    #[test]
    fn overall_stats_span_all_batches() {
        let snap = snapshot(&[(5, 100), (10, 200)]);
        assert_eq!(snap.overall.total_requests, 15);
        assert_eq!(snap.overall.success_count, 15);
        assert_eq!(snap.overall.total_duration_ms, 300.0);
        assert_eq!(snap.overall.throughput_rps, 50.0);
        assert_eq!(snap.overall.latency.min_ms, 100.0);
        assert_eq!(snap.overall.latency.max_ms, 200.0);
    }

    #[test]
    fn validate_accepts_well_formed_snapshot() {
        snapshot(&[(5, 100), (10, 150)]).validate().unwrap();
    }

    #[test]
    fn validate_rejects_empty_batches() {
        let snap = snapshot(&[]);
        assert!(snap.validate().unwrap_err().is_input());
    }

    #[test]
    fn validate_rejects_descending_or_duplicate_levels() {
        assert!(snapshot(&[(10, 1), (5, 1)]).validate().is_err());
        assert!(snapshot(&[(5, 1), (5, 1)]).validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_level() {
        let err = snapshot(&[(0, 100), (5, 100)]).validate().unwrap_err();
        assert!(err.is_input());
        assert!(err.to_string().contains("at least 1"), "{err}");
    }

    #[test]
    fn validate_rejects_outcome_count_mismatch() {
        let mut snap = snapshot(&[(5, 1)]);
        snap.batches[0].outcomes.pop();
        assert!(snap.validate().unwrap_err().is_input());
    }

    #[test]
    fn validate_rejects_failure_without_error() {
        let mut snap = snapshot(&[(2, 1)]);
        snap.batches[0].outcomes[0].success = false;
        assert!(snap.validate().is_err());
    }

    #[test]
    fn format_latency_switches_units() {
        assert_eq!(format_latency(250.0), "250.00ms");
        assert_eq!(format_latency(1500.0), "1.50s");
        assert_eq!(format_latency(-20.0), "-20.00ms");
    }
}
