use crate::error::{ Error, RequestError, Result };
use crate::payload::Payload;
use crate::report::{ Exchange, RequestOutcome };

use async_trait::async_trait;
use chrono::Utc;
use isahc::{
    config::{ Configurable, RedirectPolicy },
    AsyncReadResponseExt,
    HttpClient,
    HttpClientBuilder,
    Request,
};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;
use url::Url;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60); // whole request/response cycle
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(20);

/// Issues one batch of concurrent requests.
///
/// Implementations must return exactly `concurrency` outcomes, one per
/// request, and only once every request has reached a terminal state.
/// Request failures are outcomes, never errors.
#[async_trait]
pub trait Dispatch: Send + Sync {
    async fn dispatch(&self, target: &Url, payload: &Payload, concurrency: usize) -> Vec<RequestOutcome>;
}

/// Dispatcher backed by a shared isahc client and one tokio task per request.
#[derive(Debug, Clone)]
pub struct HttpDispatcher {
    client: HttpClient, // connection pool shared by every request of every batch
    timeout: Duration,
}

impl HttpDispatcher {
    pub fn new(timeout: Duration, connection_timeout: Duration) -> Result<Self> {
        let client = HttpClientBuilder::new()
            .timeout(timeout)
            .connect_timeout(connection_timeout)
            .redirect_policy(RedirectPolicy::None) // 3xx is recorded as-is
            .build()
            .map_err(|e| Error::Setup(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, timeout })
    }

    /// Send one request and read the full body.
    async fn send_request(
        client: &HttpClient,
        target: &Url,
        content_type: &str,
        body: Vec<u8>,
        timeout: Duration
    ) -> std::result::Result<Exchange, RequestError> {
        let request = Request::post(target.as_str())
            .header("content-type", content_type)
            .body(body)
            .map_err(|e| RequestError::Transport(e.to_string()))?;

        let exchange = async {
            let mut response = client.send_async(request).await.map_err(|e| classify(&e, timeout))?;
            let status = response.status();
            let body = response.text().await.map_err(|e| {
                if e.kind() == std::io::ErrorKind::TimedOut {
                    RequestError::Timeout(timeout)
                } else {
                    RequestError::Transport(format!("failed to read response body: {e}"))
                }
            })?;

            Ok(Exchange {
                status: status.as_u16(),
                reason: status.canonical_reason().map(str::to_string),
                body: Some(body),
            })
        };

        // the client enforces the same limit; this keeps the guarantee independent of curl
        match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(RequestError::Timeout(timeout)),
        }
    }
}

#[async_trait]
impl Dispatch for HttpDispatcher {
    async fn dispatch(&self, target: &Url, payload: &Payload, concurrency: usize) -> Vec<RequestOutcome> {
        let mut handles = Vec::with_capacity(concurrency);
        for request_id in 1..=concurrency {
            let session_id = payload.new_session_id();
            let body = payload.render(session_id.as_deref());
            let client = self.client.clone();
            let target = target.clone();
            let content_type = payload.content_type.clone();
            let timeout = self.timeout;

            handles.push(
                tokio::spawn(async move {
                    let started_at = Utc::now();
                    let start = Instant::now();
                    let result = Self::send_request(
                        &client,
                        &target,
                        &content_type,
                        body,
                        timeout
                    ).await;
                    let elapsed = start.elapsed();
                    RequestOutcome::record(request_id, session_id, started_at, Utc::now(), elapsed, result)
                })
            );
        }

        let mut outcomes = Vec::with_capacity(concurrency);
        for (index, handle) in handles.into_iter().enumerate() {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(join_err) => {
                    // a lost task still counts as one failed request
                    let now = Utc::now();
                    RequestOutcome::record(
                        index + 1,
                        None,
                        now,
                        now,
                        Duration::ZERO,
                        Err(RequestError::Transport(format!("request task aborted: {join_err}")))
                    )
                }
            };
            if let Some(error) = &outcome.error {
                debug!(request_id = outcome.request_id, status = ?outcome.status_code, %error, "request failed");
            }
            outcomes.push(outcome);
        }
        outcomes
    }
}

fn classify(err: &isahc::Error, timeout: Duration) -> RequestError {
    if err.is_timeout() {
        return RequestError::Timeout(timeout);
    }
    let msg = err.to_string();
    if msg.is_empty() {
        RequestError::Transport("request failed".to_string())
    } else {
        RequestError::Transport(msg)
    }
}
