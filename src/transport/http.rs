//! HTTP transport over `reqwest`.
//!
//! Requests are form-encoded POSTs. Blocking calls run on the transport's
//! own `tokio` runtime via `block_on`; non-blocking calls are spawned onto it
//! and resolve their [`Response`] from a worker thread.
//!
//! The transport also owns the connection-health policy: it counts
//! consecutive failed exchanges and, past the configured threshold, reports
//! the link as lost by refusing to issue non-blocking requests. A blocking
//! request is still attempted and acts as a probe; any success resets the
//! count.
//!
//! Blocking work needs a thread outside any async runtime. From inside one,
//! blocking requests fail with [`SightlineError::TransportIssue`] and
//! blocking pumps return without waiting.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;

use super::{Mode, Outcome, Request, Response, Transport};
use crate::config::TransportConfig;
use crate::error::{Result, SightlineError};

/// Form-encoded HTTP transport.
pub struct HttpTransport {
    runtime: Option<Runtime>,
    client: Client,
    health: Arc<LinkHealth>,
    in_flight: Vec<JoinHandle<()>>,
}

impl HttpTransport {
    /// Build the runtime and HTTP client from configuration.
    pub fn new(config: &TransportConfig) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.worker_threads.max(1))
            .thread_name("sightline-io")
            .enable_all()
            .build()?;

        let mut builder = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs));
        if let Some(proxy) = config.proxy.as_deref().filter(|p| !p.trim().is_empty()) {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }
        let client = builder
            .build()
            .map_err(|e| SightlineError::Network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            runtime: Some(runtime),
            client,
            health: Arc::new(LinkHealth::new(config.max_consecutive_failures)),
            in_flight: Vec::new(),
        })
    }

    /// Number of spawned exchanges not yet reaped.
    pub fn in_flight(&self) -> usize {
        self.in_flight.iter().filter(|h| !h.is_finished()).count()
    }

    /// Consecutive failed exchanges observed so far.
    pub fn consecutive_failures(&self) -> u32 {
        self.health.failures()
    }

    fn runtime(&self) -> Result<&Runtime> {
        self.runtime
            .as_ref()
            .ok_or_else(|| SightlineError::TransportIssue("runtime shut down".to_string()))
    }

    /// The runtime, if this thread may block on it.
    fn blocking_runtime(&self) -> Result<&Runtime> {
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(SightlineError::TransportIssue(
                "cannot block on the HTTP transport from inside an async runtime".to_string(),
            ));
        }
        self.runtime()
    }

    fn reap(&mut self) {
        self.in_flight.retain(|handle| !handle.is_finished());
    }
}

impl Transport for HttpTransport {
    fn request(&mut self, url: &str, params: &Request, mode: Mode) -> Result<Response> {
        self.reap();
        let builder = self.client.post(url).form(params);

        match mode {
            Mode::Blocking => match self.blocking_runtime()?.block_on(exchange(builder)) {
                Exchange::Completed(outcome) => {
                    self.health.record(&outcome);
                    Ok(Response::completed(outcome))
                }
                Exchange::Unreachable(reason) => {
                    self.health.record_failure(&reason);
                    Err(SightlineError::TransportIssue(reason))
                }
            },
            Mode::NonBlocking => {
                if self.health.is_lost() {
                    let reason = self.health.lost_description();
                    self.health.set_last_error(&reason);
                    return Err(SightlineError::TransportIssue(reason));
                }

                let (response, responder) = Response::pending();
                let health = self.health.clone();
                let handle = self.runtime()?.spawn(async move {
                    let outcome = match exchange(builder).await {
                        Exchange::Completed(outcome) => outcome,
                        Exchange::Unreachable(reason) => Outcome::Failed(reason),
                    };
                    health.record(&outcome);
                    responder.complete(outcome);
                });
                self.in_flight.push(handle);
                Ok(response)
            }
        }
    }

    fn receive(&mut self, response: Option<&Response>, blocking: bool) {
        if blocking {
            let handles = match response {
                Some(_) => Vec::new(),
                None => std::mem::take(&mut self.in_flight),
            };
            let unjoined = match self.blocking_runtime() {
                Ok(runtime) => {
                    if let Some(response) = response {
                        runtime.block_on(response.ready());
                    }
                    for handle in handles {
                        if let Err(e) = runtime.block_on(handle) {
                            tracing::debug!("In-flight exchange ended abnormally: {e}");
                        }
                    }
                    Vec::new()
                }
                Err(e) => {
                    tracing::debug!("Not waiting on in-flight exchanges: {e}");
                    handles
                }
            };
            self.in_flight.extend(unjoined);
        }
        self.reap();
    }

    fn error_description(&self) -> String {
        self.health.last_error()
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

impl Drop for HttpTransport {
    fn drop(&mut self) {
        for handle in &self.in_flight {
            handle.abort();
        }
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

enum Exchange {
    /// The server answered; the outcome reflects the HTTP status.
    Completed(Outcome),
    /// No answer at all (connect error, timeout, broken body).
    Unreachable(String),
}

async fn exchange(builder: RequestBuilder) -> Exchange {
    let response = match builder.send().await {
        Ok(response) => response,
        Err(e) => return Exchange::Unreachable(describe(&e)),
    };

    let status = response.status();
    match response.text().await {
        Ok(body) if status.is_success() => Exchange::Completed(Outcome::Ok(body)),
        Ok(body) => Exchange::Completed(Outcome::Failed(format!("HTTP {status}: {body}"))),
        Err(e) => Exchange::Unreachable(describe(&e)),
    }
}

fn describe(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("request timed out: {err}")
    } else if err.is_connect() {
        format!("could not connect: {err}")
    } else {
        err.to_string()
    }
}

/// Consecutive-failure bookkeeping shared with spawned exchanges.
#[derive(Debug)]
struct LinkHealth {
    threshold: u32,
    consecutive_failures: AtomicU32,
    last_error: Mutex<String>,
}

impl LinkHealth {
    fn new(threshold: u32) -> Self {
        Self {
            threshold,
            consecutive_failures: AtomicU32::new(0),
            last_error: Mutex::new(String::new()),
        }
    }

    fn record(&self, outcome: &Outcome) {
        match outcome {
            Outcome::Ok(_) => self.consecutive_failures.store(0, Ordering::Relaxed),
            Outcome::Failed(reason) => self.record_failure(reason),
        }
    }

    fn record_failure(&self, reason: &str) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if self.threshold > 0 && failures == self.threshold {
            tracing::warn!("Connection considered lost after {failures} consecutive failures");
        }
        self.set_last_error(reason);
    }

    fn failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    /// A threshold of zero disables the policy.
    fn is_lost(&self) -> bool {
        self.threshold > 0 && self.failures() >= self.threshold
    }

    fn lost_description(&self) -> String {
        format!(
            "connection lost after {} consecutive failed responses",
            self.failures()
        )
    }

    fn set_last_error(&self, reason: &str) {
        if let Ok(mut last) = self.last_error.lock() {
            *last = reason.to_string();
        }
    }

    fn last_error(&self) -> String {
        self.last_error
            .lock()
            .map(|last| last.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_health_threshold() {
        let health = LinkHealth::new(3);
        assert!(!health.is_lost());

        health.record(&Outcome::Failed("timeout".into()));
        health.record(&Outcome::Failed("timeout".into()));
        assert!(!health.is_lost());
        health.record(&Outcome::Failed("refused".into()));
        assert!(health.is_lost());
        assert_eq!(health.last_error(), "refused");
        assert!(health.lost_description().contains("3 consecutive"));

        health.record(&Outcome::Ok("{}".into()));
        assert!(!health.is_lost());
        assert_eq!(health.failures(), 0);
    }

    #[test]
    fn test_link_health_disabled_with_zero_threshold() {
        let health = LinkHealth::new(0);
        for _ in 0..100 {
            health.record_failure("down");
        }
        assert!(!health.is_lost());
    }

    #[test]
    fn test_unreachable_blocking_request_is_issue_failure() {
        let config = TransportConfig {
            timeout_secs: 2,
            connect_timeout_secs: 1,
            ..TransportConfig::default()
        };
        let mut transport = HttpTransport::new(&config).unwrap();
        // Port 9 (discard) is essentially never served on loopback.
        let result = transport.request(
            "http://127.0.0.1:9/start_session/",
            &Request::new().with("source_name", "cam"),
            Mode::Blocking,
        );
        assert!(matches!(result, Err(SightlineError::TransportIssue(_))));
        assert!(!transport.error_description().is_empty());
        assert_eq!(transport.consecutive_failures(), 1);
    }

    #[tokio::test]
    async fn test_blocking_inside_async_context_is_refused() {
        let mut transport = HttpTransport::new(&TransportConfig::default()).unwrap();
        let result = transport.request(
            "http://127.0.0.1:9/start_session/",
            &Request::new(),
            Mode::Blocking,
        );
        assert!(matches!(result, Err(SightlineError::TransportIssue(_))));
        assert_eq!(transport.consecutive_failures(), 0);

        let (pending, _responder) = Response::pending();
        transport.receive(Some(&pending), true);
        assert!(!pending.is_ready());
        // Dropping here must not panic inside the async context.
        drop(transport);
    }

    #[test]
    fn test_unreachable_non_blocking_request_resolves_failed() {
        let config = TransportConfig {
            timeout_secs: 2,
            connect_timeout_secs: 1,
            ..TransportConfig::default()
        };
        let mut transport = HttpTransport::new(&config).unwrap();
        let response = transport
            .request(
                "http://127.0.0.1:9/person_detection/",
                &Request::new().with("session_key", "k"),
                Mode::NonBlocking,
            )
            .unwrap();
        transport.receive(Some(&response), true);
        assert!(response.is_ready());
        assert!(!response.is_ok());

        transport.receive(None, true);
        assert_eq!(transport.in_flight(), 0);
    }
}
