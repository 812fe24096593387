//! Results directory: one pretty-printed JSON snapshot per run.

use crate::error::{ Error, Result };
use crate::report::ResultSnapshot;

use chrono::{ DateTime, Utc };
use std::fs::{ self, OpenOptions };
use std::io::{ self, Write };
use std::path::{ Path, PathBuf };
use tracing::info;

pub const DEFAULT_RESULTS_DIR: &str = "results";
const FILE_PREFIX: &str = "webhook_test_";
const MAX_SUFFIX: usize = 1000; // attempts before giving up on a free file name

/// `webhook_test_20251019T143000Z.json`, ISO-8601 basic format in UTC.
pub fn snapshot_file_name(timestamp: &DateTime<Utc>) -> String {
    format!("{}{}.json", FILE_PREFIX, timestamp.format("%Y%m%dT%H%M%SZ"))
}

#[derive(Debug, Clone)]
pub struct ResultStore {
    dir: PathBuf,
    file_name: Option<String>, // explicit name instead of the timestamped one
}

impl ResultStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), file_name: None }
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        let mut name = name.into();
        if !name.ends_with(".json") {
            name.push_str(".json");
        }
        self.file_name = Some(name);
        self
    }

    /// Write the snapshot, never overwriting an existing file.
    pub fn save(&self, snapshot: &ResultSnapshot) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir).map_err(|source| Error::Persistence {
            path: self.dir.clone(),
            source,
        })?;

        let bytes = serde_json
            ::to_vec_pretty(snapshot)
            .map_err(|e| Error::Persistence {
                path: self.dir.clone(),
                source: io::Error::other(e),
            })?;

        let base = self.file_name.clone().unwrap_or_else(|| snapshot_file_name(&snapshot.timestamp));
        let stem = base.strip_suffix(".json").unwrap_or(&base).to_string();

        for attempt in 0..MAX_SUFFIX {
            let name = if attempt == 0 { base.clone() } else { format!("{stem}-{attempt}.json") };
            let path = self.dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file
                        .write_all(&bytes)
                        .and_then(|_| file.write_all(b"\n"))
                        .map_err(|source| Error::Persistence { path: path.clone(), source })?;
                    info!(path = %path.display(), "snapshot saved");
                    return Ok(path);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    continue;
                }
                Err(source) => {
                    return Err(Error::Persistence { path, source });
                }
            }
        }

        Err(Error::Persistence {
            path: self.dir.join(base),
            source: io::Error::new(io::ErrorKind::AlreadyExists, "no free snapshot file name"),
        })
    }

    /// Relative paths that do not exist are looked up inside the results directory.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() || path.exists() {
            return path.to_path_buf();
        }
        let candidate = self.dir.join(path);
        if candidate.exists() {
            candidate
        } else {
            path.to_path_buf()
        }
    }

    /// Read, parse and validate a snapshot. Every failure is an input error.
    pub fn load(&self, path: &Path) -> Result<ResultSnapshot> {
        let path = self.resolve(path);
        let raw = fs
            ::read_to_string(&path)
            .map_err(|e| Error::input(format!("cannot read snapshot {}: {e}", path.display())))?;
        let snapshot: ResultSnapshot = serde_json
            ::from_str(&raw)
            .map_err(|e| Error::input(format!("invalid snapshot {}: {e}", path.display())))?;
        snapshot
            .validate()
            .map_err(|e| Error::input(format!("invalid snapshot {}: {e}", path.display())))?;
        Ok(snapshot)
    }
}
