//! Response envelopes for in-flight requests.
//!
//! A [`Response`] is a small cloneable handle onto a completion slot. The
//! transport keeps the paired [`Responder`] and fills the slot exactly once,
//! from whatever thread finishes the exchange. The session client only ever
//! polls the handle.

use std::sync::{Arc, OnceLock};

use tokio::sync::Notify;

/// Final result of one exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A reply arrived with a success status; carries the raw body.
    Ok(String),
    /// The reply was lost, timed out or carried a failure status.
    Failed(String),
}

impl Outcome {
    /// Whether the exchange succeeded at the transport level.
    pub fn is_ok(&self) -> bool {
        matches!(self, Outcome::Ok(_))
    }
}

#[derive(Debug, Default)]
struct Slot {
    outcome: OnceLock<Outcome>,
    notify: Notify,
}

/// Handle to one in-flight or completed request.
#[derive(Debug, Clone)]
pub struct Response {
    slot: Arc<Slot>,
}

impl Response {
    /// Create an unresolved response and the write side that resolves it.
    pub fn pending() -> (Response, Responder) {
        let slot = Arc::new(Slot::default());
        (
            Response { slot: slot.clone() },
            Responder {
                slot,
                completed: false,
            },
        )
    }

    /// Create an already-resolved response.
    pub fn completed(outcome: Outcome) -> Response {
        let (response, responder) = Self::pending();
        responder.complete(outcome);
        response
    }

    /// Transport has produced a result (success or failure).
    pub fn is_ready(&self) -> bool {
        self.slot.outcome.get().is_some()
    }

    /// Transport-level success. Implies [`is_ready`](Self::is_ready).
    pub fn is_ok(&self) -> bool {
        self.slot.outcome.get().is_some_and(Outcome::is_ok)
    }

    /// Raw reply body, available once the response is ready and ok.
    pub fn raw_body(&self) -> Option<&str> {
        match self.slot.outcome.get()? {
            Outcome::Ok(body) => Some(body),
            Outcome::Failed(_) => None,
        }
    }

    /// Transport failure reason, available once the response is ready and not ok.
    pub fn failure(&self) -> Option<&str> {
        match self.slot.outcome.get()? {
            Outcome::Failed(reason) => Some(reason),
            Outcome::Ok(_) => None,
        }
    }

    /// The outcome, if resolved.
    pub fn outcome(&self) -> Option<&Outcome> {
        self.slot.outcome.get()
    }

    /// Wait until the response is resolved.
    pub async fn ready(&self) {
        loop {
            let notified = self.slot.notify.notified();
            if self.is_ready() {
                return;
            }
            notified.await;
        }
    }
}

/// Write side of a [`Response`].
///
/// Dropping an unused responder resolves the response as failed, so a
/// cancelled exchange never leaves a handle pending forever.
#[derive(Debug)]
pub struct Responder {
    slot: Arc<Slot>,
    completed: bool,
}

impl Responder {
    /// Resolve with a successful body.
    pub fn succeed(self, body: impl Into<String>) {
        self.complete(Outcome::Ok(body.into()));
    }

    /// Resolve as a transport failure.
    pub fn fail(self, reason: impl Into<String>) {
        self.complete(Outcome::Failed(reason.into()));
    }

    /// Resolve with the given outcome.
    pub fn complete(mut self, outcome: Outcome) {
        self.resolve(outcome);
    }

    fn resolve(&mut self, outcome: Outcome) {
        if self.completed {
            return;
        }
        self.completed = true;
        let _ = self.slot.outcome.set(outcome);
        self.slot.notify.notify_waiters();
    }
}

impl Drop for Responder {
    fn drop(&mut self) {
        self.resolve(Outcome::Failed("request abandoned".to_string()));
    }
}
