use crate::dispatcher::Dispatch;
use crate::error::{ Error, Result };
use crate::payload::Payload;
use crate::report::{ BatchResult, ResultSnapshot };
use crate::store::ResultStore;

use chrono::Utc;
use std::net::{ TcpStream, ToSocketAddrs };
use std::path::PathBuf;
use std::time::Duration;
use tokio::runtime::{ Builder, Runtime };
use tokio::time::{ sleep, Instant };
use tracing::{ info, warn };
use url::Url;

pub const DEFAULT_LEVELS: [usize; 3] = [5, 10, 20];
pub const DEFAULT_PAUSE: Duration = Duration::from_secs(2); // between levels, not after the last

/// What a run produced. The snapshot is valid even when saving it failed.
#[derive(Debug)]
pub struct RunOutput {
    pub snapshot: ResultSnapshot,
    pub saved: Option<Result<PathBuf>>, // None when no store is configured
}

/// Drives a dispatcher across ascending concurrency levels, one level at a time.
#[derive(Debug, Clone)]
pub struct BatchRunner<D> {
    dispatcher: D,
    store: Option<ResultStore>,
    pause: Duration,
    print: bool, // print a summary after each batch
}

impl<D: Dispatch> BatchRunner<D> {
    /*------------------==| Public Functions |==-------------------------*/
    pub fn new(dispatcher: D) -> Self {
        Self {
            dispatcher,
            store: None,
            pause: Duration::ZERO,
            print: false,
        }
    }

    pub fn with_store(mut self, store: ResultStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    pub fn with_console(mut self, print: bool) -> Self {
        self.print = print;
        self
    }

    /// Run every level in order and assemble the snapshot.
    ///
    /// Only invalid input fails the run; request failures end up in the
    /// statistics and a failed save is returned in [`RunOutput::saved`].
    pub async fn run(&self, target: &Url, payload: &Payload, levels: &[usize]) -> Result<RunOutput> {
        validate_levels(levels)?;
        let target_url = redact_url(target);
        let timestamp = Utc::now();
        info!(url = %target_url, ?levels, "starting run");

        let mut batches = Vec::with_capacity(levels.len());
        for (index, &concurrency) in levels.iter().enumerate() {
            if index > 0 && !self.pause.is_zero() {
                sleep(self.pause).await; // let the target settle between levels
            }
            let batch = self.run_batch(target, payload, concurrency).await;
            if self.print {
                batch.print_summary();
            }
            batches.push(batch);
        }

        let snapshot = ResultSnapshot::new(target_url, payload.redacted(), timestamp, batches);

        let saved = self.store.as_ref().map(|store| store.save(&snapshot));
        if let Some(Err(err)) = &saved {
            warn!(%err, "snapshot not saved");
        }

        Ok(RunOutput { snapshot, saved })
    }

    /*-------------------==| Private/Helpers |==----------------------- */

    async fn run_batch(&self, target: &Url, payload: &Payload, concurrency: usize) -> BatchResult {
        info!(concurrency, "dispatching batch");
        let started_at = Utc::now();
        let start = Instant::now();

        let outcomes = self.dispatcher.dispatch(target, payload, concurrency).await;

        let duration = start.elapsed();
        let batch = BatchResult::new(concurrency, started_at, duration, outcomes);
        info!(
            concurrency,
            duration_ms = batch.duration_ms,
            succeeded = batch.stats.success_count,
            failed = batch.stats.failure_count,
            "batch complete"
        );
        batch
    }
}

/// Levels must be non-empty, at least 1 and strictly ascending.
pub fn validate_levels(levels: &[usize]) -> Result<()> {
    if levels.is_empty() {
        return Err(Error::input("at least one concurrency level is required"));
    }
    if levels.contains(&0) {
        return Err(Error::input("concurrency levels must be >= 1"));
    }
    if levels.windows(2).any(|pair| pair[1] <= pair[0]) {
        return Err(Error::input(format!("concurrency levels must be strictly ascending, got {:?}", levels)));
    }
    Ok(())
}

/// Parse a target URL, accepting only http(s) with a host.
pub fn parse_target(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim()).map_err(|e| Error::input(format!("invalid URL \"{raw}\": {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::input(format!("URL must start with http:// or https://, got \"{raw}\"")));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(Error::input(format!("URL \"{raw}\" has no host")));
    }
    Ok(url)
}

/// The URL as persisted: credentials, query and fragment removed.
pub fn redact_url(url: &Url) -> String {
    let mut clean = url.clone();
    let _ = clean.set_username("");
    let _ = clean.set_password(None);
    clean.set_query(None);
    clean.set_fragment(None);
    clean.to_string()
}

/// Check the target host accepts TCP connections before any batch runs.
pub fn preflight(url: &Url, connection_timeout: Duration) -> Result<()> {
    let host = url.host_str().ok_or_else(|| Error::input("URL does not have a valid hostname"))?;
    let port = url.port_or_known_default().unwrap_or(80); // HTTP port 80 if none specified

    let addrs = (host, port)
        .to_socket_addrs()
        .map_err(|e| Error::Setup(format!("failed to resolve {host}: {e}")))?;

    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, connection_timeout) {
            Ok(_) => {
                return Ok(());
            }
            Err(e) => {
                last_err = Some(e);
            }
        }
    }
    Err(
        Error::Setup(match last_err {
            Some(e) => format!("failed to connect to {host}:{port}: {e} (behind a proxy? use --skip-preflight)"),
            None => format!("{host} resolved to no addresses"),
        })
    )
}

/// Helper function to create the tokio runtime
pub fn runtime(threads: usize) -> Result<Runtime> {
    Builder::new_multi_thread()
        .worker_threads(threads.max(1))
        .enable_all()
        .build()
        .map_err(|e| Error::Setup(format!("failed to create tokio runtime: {e}")))
}
