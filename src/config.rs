use crate::error::{ Error, Result };
use crate::payload::{ Payload, DEFAULT_SESSION_FIELD };
use crate::runner::{ parse_target, validate_levels, DEFAULT_LEVELS };
use crate::store::DEFAULT_RESULTS_DIR;

use clap::{ Args, Parser, Subcommand };
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

#[derive(Debug, Parser)]
#[command(
    name = "webhook-bench",
    version,
    about = "Fire concurrent batches at a webhook and compare runs",
    after_help = "Durations can be specified like: 500ms, 10s, 1m"
)]
pub struct Cli {
    /// Show per-request failures (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run batches at each concurrency level and save a snapshot (JSON).
    Run(RunArgs),

    /// Compare two snapshots and print the deltas.
    Compare(CompareArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Webhook URL to test
    #[arg(env = "WEBHOOK_URL")]
    pub url: String,

    /// Ascending concurrency levels, comma separated
    #[arg(short, long, value_delimiter = ',', default_values_t = DEFAULT_LEVELS)]
    pub levels: Vec<usize>,

    /// Inline JSON payload (replaces the default chat message)
    #[arg(long, conflicts_with = "payload_file")]
    pub payload: Option<String>,

    /// JSON payload read from a file
    #[arg(long)]
    pub payload_file: Option<PathBuf>,

    /// Field that receives a fresh session id per request
    #[arg(long)]
    pub session_field: Option<String>,

    /// Request timeout, whole request/response cycle
    #[arg(short = 'T', long, default_value = "60s", value_parser = humantime::parse_duration)]
    pub timeout: Duration,

    /// Timeout for establishing the connection
    #[arg(short = 'C', long, default_value = "20s", value_parser = humantime::parse_duration)]
    pub connect_timeout: Duration,

    /// Pause between concurrency levels
    #[arg(long, default_value = "2s", value_parser = humantime::parse_duration)]
    pub pause: Duration,

    /// Number of runtime worker threads
    #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..))]
    pub threads: u16,

    /// Directory for result snapshots
    #[arg(long, env = "WEBHOOK_BENCH_RESULTS_DIR", default_value = DEFAULT_RESULTS_DIR)]
    pub results_dir: PathBuf,

    /// Snapshot file name inside the results directory (default: timestamped)
    #[arg(short, long)]
    pub out: Option<String>,

    /// Summarize the output
    #[arg(short, long)]
    pub summarize: bool,

    /// Skip the TCP reachability check before the first batch
    #[arg(long)]
    pub skip_preflight: bool,
}

#[derive(Debug, Args)]
pub struct CompareArgs {
    /// Baseline snapshot
    pub baseline: PathBuf,

    /// Candidate snapshot
    pub candidate: PathBuf,

    /// Where relative snapshot paths are looked up when not found as given
    #[arg(long, env = "WEBHOOK_BENCH_RESULTS_DIR", default_value = DEFAULT_RESULTS_DIR)]
    pub results_dir: PathBuf,
}

/// Validated settings for one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub url: Url,
    pub levels: Vec<usize>,
    pub payload: Payload,
    pub timeout: Duration, // total time for request/response cycle including DNS resolution
    pub connection_timeout: Duration, // timeout for establishing connection to the host
    pub pause: Duration,
    pub threads: usize,
    pub results_dir: PathBuf,
    pub out: Option<String>,
    pub summarize: bool, // summarize the output
    pub preflight: bool,
}

impl TryFrom<RunArgs> for RunConfig {
    type Error = Error;

    fn try_from(args: RunArgs) -> Result<Self> {
        let url = parse_target(&args.url)?;
        validate_levels(&args.levels)?;

        if args.timeout.is_zero() || args.connect_timeout.is_zero() {
            return Err(Error::input("timeouts must be greater than zero"));
        }

        let payload = match (&args.payload, &args.payload_file) {
            (Some(raw), _) => Payload::from_json(raw, args.session_field)?,
            (None, Some(path)) => Payload::from_file(path, args.session_field)?,
            (None, None) =>
                Payload {
                    session_field: Some(
                        args.session_field.unwrap_or_else(|| DEFAULT_SESSION_FIELD.to_string())
                    ),
                    ..Payload::default()
                },
        };

        Ok(RunConfig {
            url,
            levels: args.levels,
            payload,
            timeout: args.timeout,
            connection_timeout: args.connect_timeout,
            pause: args.pause,
            threads: usize::from(args.threads),
            results_dir: args.results_dir,
            out: args.out,
            summarize: args.summarize,
            preflight: !args.skip_preflight,
        })
    }
}
