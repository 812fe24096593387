use std::path::PathBuf;
use std::time::Duration;

/// Why a single request failed. Recorded on the outcome, never raised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("timed out after {}", format_limit(.0))]
    Timeout(Duration),

    #[error("HTTP {status}{}", format_reason(.reason))]
    Protocol { status: u16, reason: Option<String> },
}

fn format_limit(limit: &Duration) -> String {
    humantime::format_duration(*limit).to_string()
}

fn format_reason(reason: &Option<String>) -> String {
    reason.as_deref().map(|r| format!(" {r}")).unwrap_or_default()
}

/// Errors surfaced to the caller of a command.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Bad URL, bad level sequence, bad payload, unreadable or invalid snapshot.
    #[error("{0}")]
    Input(String),

    #[error("failed to write results to {}: {source}", .path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// HTTP client, runtime or preflight failures before any batch runs.
    #[error("{0}")]
    Setup(String),
}

impl Error {
    pub fn input(msg: impl Into<String>) -> Self {
        Error::Input(msg.into())
    }

    pub fn is_input(&self) -> bool {
        matches!(self, Error::Input(_))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
