//! Session client for the detection service.
//!
//! Handles the lifecycle of one detection session: start, streaming of
//! per-person records, reconciliation of their replies, and stop.

use std::collections::VecDeque;

use super::record::DetectionRecord;
use super::request;
use crate::codec::{Envelope, SESSION_KEY_FIELD};
use crate::config::{Config, EndpointConfig, ReconcilePolicy, WireConfig};
use crate::error::{Result, SightlineError};
use crate::transport::{Mode, Outcome, Request, Response, Transport};

/// Session state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session key yet (never started, or start failed)
    Unstarted,
    /// Session key held, records can be sent
    Active,
    /// Stop-session acknowledged by the server
    Stopped,
}

/// Outcome of one [`SessionClient::send_records`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Records handed to the transport
    pub dispatched: usize,
    /// Records skipped for lack of an identifier
    pub skipped: usize,
    /// Records the transport could not issue
    pub failed: usize,
    /// A reconciled reply asked the session to stop
    pub stop_requested: bool,
}

impl BatchReport {
    /// Every eligible record was dispatched and no stop signal was seen.
    pub fn all_sent(&self) -> bool {
        self.failed == 0 && !self.stop_requested
    }
}

/// Session statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Records dispatched
    pub records_sent: u64,
    /// Records skipped (no identifier)
    pub records_skipped: u64,
    /// Records the transport refused to issue
    pub dispatch_failures: u64,
    /// Replies reconciled with code 0
    pub replies_accepted: u64,
    /// Replies reconciled as a stop signal
    pub replies_rejected: u64,
    /// Replies lost at transport level
    pub replies_lost: u64,
}

/// Client side of one detection session.
///
/// Not meant for concurrent use: every operation takes `&mut self`. Teardown
/// (explicit [`close`](Self::close) or `Drop`) runs stop-session at most once
/// and discards every reply still pending.
pub struct SessionClient<T: Transport> {
    transport: T,
    endpoints: EndpointConfig,
    policy: ReconcilePolicy,
    wire: WireConfig,
    session_key: String,
    state: SessionState,
    pending: VecDeque<Response>,
    stop_attempted: bool,
    closed: bool,
    stop_signalled: bool,
    stats: SessionStats,
}

impl<T: Transport> SessionClient<T> {
    /// Create an unstarted client. No request is made.
    pub fn new(config: &Config, transport: T) -> Self {
        Self {
            transport,
            endpoints: config.endpoints.clone(),
            policy: config.reconcile,
            wire: config.wire,
            session_key: String::new(),
            state: SessionState::Unstarted,
            pending: VecDeque::new(),
            stop_attempted: false,
            closed: false,
            stop_signalled: false,
            stats: SessionStats::default(),
        }
    }

    /// Create a client and start a session for `source_name`.
    ///
    /// A failed start is logged and leaves the client
    /// [`Unstarted`](SessionState::Unstarted); teardown still calls
    /// stop-session.
    pub fn open(config: &Config, transport: T, source_name: &str) -> Self {
        let mut client = Self::new(config, transport);
        // start() already logged the failure
        let _ = client.start(source_name);
        client
    }

    /// Get current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Check if the session is active
    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    /// Session key (empty until started)
    pub fn session_key(&self) -> &str {
        &self.session_key
    }

    /// Replies still awaiting reconciliation
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Whether any reconciled reply has asked the session to stop
    pub fn stop_signalled(&self) -> bool {
        self.stop_signalled
    }

    /// Get session statistics
    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// The underlying transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Start the session.
    ///
    /// Issues a blocking start-session request. Succeeds only if the reply
    /// has code 0 and carries a `session_key`.
    pub fn start(&mut self, source_name: &str) -> Result<()> {
        if self.state != SessionState::Unstarted {
            return Err(SightlineError::InvalidState(format!(
                "Cannot start a session in state {:?}",
                self.state
            )));
        }

        let url = self.endpoints.start_session_url();
        let params = request::start_session(source_name);
        let result = self
            .exchange(&url, &params)
            .and_then(|envelope| envelope.require_str(SESSION_KEY_FIELD));

        match result {
            Ok(key) => {
                tracing::info!("Session started for source '{}'", source_name);
                tracing::debug!("Session key: {}", key);
                self.session_key = key;
                self.state = SessionState::Active;
                Ok(())
            }
            Err(e) => {
                if e.is_server_signal() {
                    tracing::error!("Server refused to start a session: {}", e);
                } else {
                    tracing::error!("Could not start a session: {}", e);
                }
                Err(e)
            }
        }
    }

    /// Stop the session.
    ///
    /// Always attempted, with an empty key if start never succeeded. The
    /// state only changes on success; teardown will not repeat the call.
    pub fn stop(&mut self) -> Result<()> {
        self.stop_attempted = true;

        let url = self.endpoints.stop_session_url();
        let params = request::stop_session(&self.session_key);
        match self.exchange(&url, &params) {
            Ok(_) => {
                tracing::info!("Session stopped");
                self.state = SessionState::Stopped;
                Ok(())
            }
            Err(e) => {
                if e.is_server_signal() {
                    tracing::error!("Server refused to stop the session: {}", e);
                } else {
                    tracing::error!("Could not stop the session: {}", e);
                }
                Err(e)
            }
        }
    }

    /// Stream one frame's records.
    ///
    /// Each record with an identifier is dispatched without waiting for its
    /// reply; after each dispatch the transport is pumped once and ready
    /// replies are reconciled. Failures never abort the batch.
    pub fn send_records(&mut self, records: &[DetectionRecord], frame: u64) -> BatchReport {
        let mut report = BatchReport::default();
        if !self.is_active() {
            tracing::warn!(
                "Sending frame {} while session is {:?}",
                frame,
                self.state
            );
        }

        let url = self.endpoints.person_detection_url();
        for record in records {
            if !record.has_id() {
                tracing::warn!("No ID on this person in frame {}, skipping", frame);
                report.skipped += 1;
                self.stats.records_skipped += 1;
                continue;
            }

            let params = request::person_detection(&self.session_key, frame, record, self.wire);
            match self.transport.request(&url, &params, Mode::NonBlocking) {
                Ok(response) => {
                    self.pending.push_back(response);
                    report.dispatched += 1;
                    self.stats.records_sent += 1;

                    self.transport.receive(None, false);
                    if !self.reconcile() {
                        report.stop_requested = true;
                    }
                }
                Err(e) => {
                    tracing::error!("{}", self.describe_transport_error(&e));
                    report.failed += 1;
                    self.stats.dispatch_failures += 1;
                }
            }
        }

        report
    }

    /// Drain ready replies from the head of the queue, in order.
    ///
    /// Returns `false` as soon as a reply asks the session to stop; replies
    /// behind it stay queued. Returns `true` once the queue is empty or its
    /// head is not ready yet.
    pub fn reconcile(&mut self) -> bool {
        while self.pending.front().is_some_and(Response::is_ready) {
            let Some(response) = self.pending.pop_front() else {
                break;
            };

            let stop = match response.outcome() {
                Some(Outcome::Ok(body)) => match Envelope::parse_success(body) {
                    Ok(_) => {
                        self.stats.replies_accepted += 1;
                        false
                    }
                    Err(e) => {
                        tracing::warn!("Server asked to stop: {}", e);
                        self.stats.replies_rejected += 1;
                        true
                    }
                },
                Some(Outcome::Failed(reason)) => {
                    self.stats.replies_lost += 1;
                    if self.policy.escalate_transport_loss {
                        tracing::warn!("Reply lost, treating as stop: {}", reason);
                        true
                    } else {
                        tracing::debug!("Reply lost: {}", reason);
                        false
                    }
                }
                None => false,
            };
            drop(response);

            if stop {
                self.stop_signalled = true;
                return false;
            }
        }
        true
    }

    /// Wait for every pending reply and reconcile it.
    ///
    /// Each wait is bounded by the transport's own request timeout. Stops
    /// early (returning `false`) on a stop signal, leaving the rest queued.
    pub fn flush(&mut self) -> bool {
        while let Some(head) = self.pending.front().cloned() {
            if !head.is_ready() {
                self.transport.receive(Some(&head), true);
                if !head.is_ready() {
                    tracing::debug!("Transport could not resolve pending reply");
                    return true;
                }
            }
            if !self.reconcile() {
                return false;
            }
        }
        true
    }

    /// Tear the session down.
    ///
    /// Runs stop-session unless it was already attempted, then discards all
    /// pending replies. Later calls do nothing.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if !self.stop_attempted {
            // stop() logs its own failure
            let _ = self.stop();
        }

        let discarded = self.pending.len();
        self.pending.clear();
        if discarded > 0 {
            tracing::debug!("Discarded {} pending replies", discarded);
        }
    }

    fn exchange(&mut self, url: &str, params: &Request) -> Result<Envelope> {
        let response = match self.transport.request(url, params, Mode::Blocking) {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("{}", self.describe_transport_error(&e));
                return Err(e);
            }
        };

        if !response.is_ready() || !response.is_ok() {
            return Err(SightlineError::TransportFailure(
                response
                    .failure()
                    .unwrap_or("reply not ready after blocking request")
                    .to_string(),
            ));
        }

        Envelope::parse_success(response.raw_body().unwrap_or_default())
    }

    fn describe_transport_error(&self, err: &SightlineError) -> String {
        let description = self.transport.error_description();
        if description.is_empty() {
            err.to_string()
        } else {
            format!("{} transport error: {}", self.transport.name(), description)
        }
    }
}

impl<T: Transport> Drop for SessionClient<T> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<T: Transport> std::fmt::Debug for SessionClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionClient")
            .field("transport", &self.transport.name())
            .field("state", &self.state)
            .field("pending", &self.pending.len())
            .field("stop_attempted", &self.stop_attempted)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{Reply, ScriptedTransport};

    fn started(transport: &ScriptedTransport) -> SessionClient<ScriptedTransport> {
        transport.reply_blocking(Reply::body(r#"{"code":0,"session_key":"abc"}"#));
        let mut client = SessionClient::new(&Config::default(), transport.clone());
        client.start("front-door").unwrap();
        client
    }

    fn people(ids: &[&str]) -> Vec<DetectionRecord> {
        ids.iter().map(|id| DetectionRecord::new(*id)).collect()
    }

    #[test]
    fn test_start_success() {
        let transport = ScriptedTransport::new();
        let client = started(&transport);

        assert_eq!(client.session_key(), "abc");
        assert_eq!(client.state(), SessionState::Active);

        let start = &transport.sent_to("/start_session/")[0];
        assert_eq!(start.mode, Mode::Blocking);
        assert_eq!(start.params.get("source_name"), Some("front-door"));
    }

    #[test]
    fn test_start_without_key_is_malformed() {
        let transport = ScriptedTransport::new();
        transport.reply_blocking(Reply::code(0));
        let mut client = SessionClient::new(&Config::default(), transport.clone());

        let err = client.start("cam").unwrap_err();
        assert!(matches!(err, SightlineError::MalformedEnvelope(_)));
        assert_eq!(client.session_key(), "");
        assert_eq!(client.state(), SessionState::Unstarted);
    }

    #[test]
    fn test_start_failures() {
        let transport = ScriptedTransport::new();
        transport
            .reply_blocking(Reply::Unreachable("connection refused".into()))
            .reply_blocking(Reply::Failed("HTTP 500".into()))
            .reply_blocking(Reply::body(r#"{"code":4,"session_key":"x"}"#));
        let mut client = SessionClient::new(&Config::default(), transport.clone());

        assert!(matches!(
            client.start("cam"),
            Err(SightlineError::TransportIssue(_))
        ));
        assert!(matches!(
            client.start("cam"),
            Err(SightlineError::TransportFailure(_))
        ));
        assert!(matches!(
            client.start("cam"),
            Err(SightlineError::Protocol { code: 4, .. })
        ));
        assert_eq!(client.session_key(), "");
        assert!(!client.is_active());
    }

    #[test]
    fn test_start_twice_is_rejected_locally() {
        let transport = ScriptedTransport::new();
        let mut client = started(&transport);
        assert!(matches!(
            client.start("again"),
            Err(SightlineError::InvalidState(_))
        ));
        assert_eq!(transport.sent_to("/start_session/").len(), 1);
        assert_eq!(client.session_key(), "abc");
    }

    #[test]
    fn test_stop_attempted_with_empty_key() {
        let transport = ScriptedTransport::new();
        transport.reply_blocking(Reply::Unreachable("down".into()));
        let client = SessionClient::open(&Config::default(), transport.clone(), "cam");
        assert!(!client.is_active());

        transport.reply_blocking(Reply::code(0));
        drop(client);

        let stops = transport.sent_to("/stop_session/");
        assert_eq!(stops.len(), 1);
        assert_eq!(stops[0].params.get("session_key"), Some(""));
    }

    #[test]
    fn test_stop_sends_key_and_transitions() {
        let transport = ScriptedTransport::new();
        let mut client = started(&transport);
        transport.reply_blocking(Reply::code(0));

        client.stop().unwrap();
        assert_eq!(client.state(), SessionState::Stopped);
        let stops = transport.sent_to("/stop_session/");
        assert_eq!(stops[0].params.get("session_key"), Some("abc"));
    }

    #[test]
    fn test_stop_failure_keeps_state() {
        let transport = ScriptedTransport::new();
        let mut client = started(&transport);
        transport.reply_blocking(Reply::body(r#"{"code":2,"description":"unknown key"}"#));

        assert!(client.stop().is_err());
        assert_eq!(client.state(), SessionState::Active);
    }

    #[test]
    fn test_send_without_session_uses_empty_key() {
        let transport = ScriptedTransport::new();
        transport.reply_blocking(Reply::Unreachable("down".into()));
        let mut client = SessionClient::open(&Config::default(), transport.clone(), "cam");
        assert_eq!(client.state(), SessionState::Unstarted);

        let report = client.send_records(&people(&["a"]), 4);
        assert_eq!(report.dispatched, 1);
        assert_eq!(client.pending(), 1);

        let sent = transport.sent_to("/person_detection/");
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].mode, Mode::NonBlocking);
        assert_eq!(sent[0].params.get("session_key"), Some(""));
        assert_eq!(sent[0].params.get("frame"), Some("4"));

        transport.reply_blocking(Reply::code(0));
    }

    #[test]
    fn test_records_dispatched_non_blocking_and_pumped() {
        let transport = ScriptedTransport::new();
        let mut client = started(&transport);

        let report = client.send_records(&people(&["a", "b"]), 9);
        assert_eq!(report.dispatched, 2);
        assert!(report.all_sent());
        assert_eq!(client.pending(), 2);
        assert_eq!(transport.pumps(), 2);

        let sent = transport.sent_to("/person_detection/");
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|r| r.mode == Mode::NonBlocking));
        assert_eq!(sent[0].params.get("session_key"), Some("abc"));
        assert_eq!(sent[0].params.get("frame"), Some("9"));
        assert_eq!(sent[1].params.get("sdk_name"), Some("b"));
    }

    #[test]
    fn test_fifo_reconciliation() {
        let transport = ScriptedTransport::new();
        let mut client = started(&transport);
        client.send_records(&people(&["first", "second", "third"]), 1);
        assert_eq!(client.pending(), 3);

        // Second reply arrives before the first: nothing can be drained.
        transport.complete(1, Reply::code(0));
        assert!(client.reconcile());
        assert_eq!(client.pending(), 3);

        // First arrives: first and second drain, third is not ready.
        transport.complete(0, Reply::code(0));
        assert!(client.reconcile());
        assert_eq!(client.pending(), 1);

        transport.complete(2, Reply::code(0));
        assert!(client.reconcile());
        assert_eq!(client.pending(), 0);
        assert_eq!(client.stats().replies_accepted, 3);
    }

    #[test]
    fn test_stop_signal_preserves_queue() {
        let transport = ScriptedTransport::new();
        let mut client = started(&transport);
        client.send_records(&people(&["a", "b", "c"]), 1);

        transport.complete(1, Reply::code(0));
        transport.complete(2, Reply::code(0));
        transport.complete(0, Reply::body(r#"{"code":7,"description":"quota"}"#));

        assert!(!client.reconcile());
        assert!(client.stop_signalled());
        assert_eq!(client.pending(), 2);

        assert!(client.reconcile());
        assert_eq!(client.pending(), 0);
    }

    #[test]
    fn test_malformed_reply_is_stop_signal() {
        let transport = ScriptedTransport::new();
        let mut client = started(&transport);
        transport.auto_reply(Some(Reply::body("<html>oops</html>")));

        let report = client.send_records(&people(&["a"]), 1);
        assert!(report.stop_requested);
        assert!(!report.all_sent());
        assert_eq!(client.stats().replies_rejected, 1);
    }

    #[test]
    fn test_lost_reply_is_tolerated_by_default() {
        let transport = ScriptedTransport::new();
        let mut client = started(&transport);
        transport.auto_reply(Some(Reply::Failed("timed out".into())));

        let report = client.send_records(&people(&["a", "b"]), 1);
        assert!(report.all_sent());
        assert_eq!(client.pending(), 0);
        assert_eq!(client.stats().replies_lost, 2);
        assert!(!client.stop_signalled());
    }

    #[test]
    fn test_lost_reply_escalates_when_configured() {
        let transport = ScriptedTransport::new();
        transport.reply_blocking(Reply::body(r#"{"code":0,"session_key":"k"}"#));
        let mut config = Config::default();
        config.reconcile.escalate_transport_loss = true;
        let mut client = SessionClient::new(&config, transport.clone());
        client.start("cam").unwrap();

        transport.auto_reply(Some(Reply::Failed("timed out".into())));
        let report = client.send_records(&people(&["a"]), 1);
        assert!(report.stop_requested);
    }

    #[test]
    fn test_empty_id_skipped() {
        let transport = ScriptedTransport::new();
        let mut client = started(&transport);

        let report = client.send_records(&people(&["", "b", ""]), 3);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.dispatched, 1);
        assert!(report.all_sent());
        assert_eq!(client.pending(), 1);
        assert_eq!(transport.dispatched(), 1);
    }

    #[test]
    fn test_dispatch_failure_does_not_abort_batch() {
        let transport = ScriptedTransport::new();
        let mut client = started(&transport);
        transport.refuse_dispatches(1);

        let report = client.send_records(&people(&["a", "b", "c"]), 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.dispatched, 2);
        assert!(!report.all_sent());
        assert_eq!(client.pending(), 2);
    }

    #[test]
    fn test_fresh_request_per_record() {
        let transport = ScriptedTransport::new();
        let mut client = started(&transport);
        let mut with_colors = DetectionRecord::new("a");
        with_colors.clothing_colors = vec![crate::protocol::Rgb(1, 2, 3)];

        client.send_records(&[with_colors, DetectionRecord::new("b")], 1);
        let sent = transport.sent_to("/person_detection/");
        assert!(sent[0].params.contains("ClothesColors_1"));
        assert!(!sent[1].params.contains("ClothesColors_1"));
    }

    #[test]
    fn test_teardown_is_idempotent() {
        let transport = ScriptedTransport::new();
        let mut client = started(&transport);
        client.send_records(&people(&["a", "b"]), 1);
        transport.reply_blocking(Reply::code(0));

        client.stop().unwrap();
        client.close();
        client.close();
        assert_eq!(client.pending(), 0);
        drop(client);

        assert_eq!(transport.sent_to("/stop_session/").len(), 1);
    }

    #[test]
    fn test_drop_stops_once_and_discards_pending() {
        let transport = ScriptedTransport::new();
        let mut client = started(&transport);
        client.send_records(&people(&["a", "b"]), 1);
        transport.reply_blocking(Reply::code(0));

        drop(client);
        assert_eq!(transport.sent_to("/stop_session/").len(), 1);
        // Unresolved handles were released with the client; resolving the
        // transport side afterwards is harmless.
        assert!(transport.complete(0, Reply::code(0)));
    }

    #[test]
    fn test_flush_drains_ready_replies() {
        let transport = ScriptedTransport::new();
        let mut client = started(&transport);
        client.send_records(&people(&["a", "b"]), 1);

        transport.complete(0, Reply::code(0));
        transport.complete(1, Reply::code(0));
        assert!(client.flush());
        assert_eq!(client.pending(), 0);
    }

    #[test]
    fn test_flush_returns_when_transport_cannot_resolve() {
        let transport = ScriptedTransport::new();
        let mut client = started(&transport);
        client.send_records(&people(&["a"]), 1);

        assert!(client.flush());
        assert_eq!(client.pending(), 1);
    }
}
