//! In-memory scripted transport.
//!
//! Blocking calls consume scripted [`Reply`] values in order. Non-blocking
//! calls return a pending [`Response`] that the test (or a dry-run driver)
//! resolves later by dispatch index, which makes it possible to complete
//! replies in any order. Every issued request is recorded.
//!
//! Clones share state, so a caller can hand one clone to a session client
//! and keep another to script and inspect it.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{Mode, Outcome, Request, Responder, Response, Transport};
use crate::error::{Result, SightlineError};

/// A scripted reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Transport success with this body.
    Body(String),
    /// Dispatched, but the reply was lost or failed at transport level.
    Failed(String),
    /// The request could not be issued at all.
    Unreachable(String),
}

impl Reply {
    /// Success body shorthand.
    pub fn body(body: impl Into<String>) -> Self {
        Reply::Body(body.into())
    }

    /// `{"code": <code>}` shorthand.
    pub fn code(code: i64) -> Self {
        Reply::Body(format!(r#"{{"code":{code}}}"#))
    }
}

/// One request seen by the scripted transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentRequest {
    /// Target URL.
    pub url: String,
    /// Fields sent.
    pub params: Request,
    /// Blocking or not.
    pub mode: Mode,
}

#[derive(Debug, Default)]
struct ScriptState {
    sent: Vec<SentRequest>,
    blocking_replies: VecDeque<Reply>,
    auto_reply: Option<Reply>,
    refuse_dispatches: usize,
    pending: Vec<Option<Responder>>,
    pumps: usize,
    last_error: String,
}

/// Scripted transport double.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTransport {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedTransport {
    /// Transport with nothing scripted.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a reply for the next blocking request.
    pub fn reply_blocking(&self, reply: Reply) -> &Self {
        self.state().blocking_replies.push_back(reply);
        self
    }

    /// Resolve every future non-blocking request immediately with `reply`
    /// (`None` leaves them pending).
    pub fn auto_reply(&self, reply: Option<Reply>) -> &Self {
        self.state().auto_reply = reply;
        self
    }

    /// Make the next `count` non-blocking requests fail to issue.
    pub fn refuse_dispatches(&self, count: usize) -> &Self {
        self.state().refuse_dispatches = count;
        self
    }

    /// Resolve the `index`-th non-blocking dispatch (0-based).
    ///
    /// Returns false if there is no such dispatch or it was already resolved.
    pub fn complete(&self, index: usize, reply: Reply) -> bool {
        let responder = self
            .state()
            .pending
            .get_mut(index)
            .and_then(Option::take);
        match responder {
            Some(responder) => {
                responder.complete(into_outcome(reply));
                true
            }
            None => false,
        }
    }

    /// Every request issued so far.
    pub fn sent(&self) -> Vec<SentRequest> {
        self.state().sent.clone()
    }

    /// Requests whose URL ends with `suffix`.
    pub fn sent_to(&self, suffix: &str) -> Vec<SentRequest> {
        self.state()
            .sent
            .iter()
            .filter(|r| r.url.ends_with(suffix))
            .cloned()
            .collect()
    }

    /// Non-blocking dispatches so far.
    pub fn dispatched(&self) -> usize {
        self.state().pending.len()
    }

    /// Non-blocking dispatches still unresolved.
    pub fn unresolved(&self) -> usize {
        self.state().pending.iter().filter(|p| p.is_some()).count()
    }

    /// Times `receive` was called.
    pub fn pumps(&self) -> usize {
        self.state().pumps
    }
}

fn into_outcome(reply: Reply) -> Outcome {
    match reply {
        Reply::Body(body) => Outcome::Ok(body),
        Reply::Failed(reason) | Reply::Unreachable(reason) => Outcome::Failed(reason),
    }
}

impl Transport for ScriptedTransport {
    fn request(&mut self, url: &str, params: &Request, mode: Mode) -> Result<Response> {
        let mut state = self.state();
        state.sent.push(SentRequest {
            url: url.to_string(),
            params: params.clone(),
            mode,
        });

        match mode {
            Mode::Blocking => match state.blocking_replies.pop_front() {
                Some(Reply::Unreachable(reason)) => {
                    state.last_error.clone_from(&reason);
                    Err(SightlineError::TransportIssue(reason))
                }
                Some(reply) => Ok(Response::completed(into_outcome(reply))),
                None => {
                    let reason = format!("no scripted reply for {url}");
                    state.last_error.clone_from(&reason);
                    Err(SightlineError::TransportIssue(reason))
                }
            },
            Mode::NonBlocking => {
                if state.refuse_dispatches > 0 {
                    state.refuse_dispatches -= 1;
                    let reason = format!("dispatch refused for {url}");
                    state.last_error.clone_from(&reason);
                    return Err(SightlineError::TransportIssue(reason));
                }

                let (response, responder) = Response::pending();
                match state.auto_reply.clone() {
                    Some(reply) => {
                        responder.complete(into_outcome(reply));
                        state.pending.push(None);
                    }
                    None => state.pending.push(Some(responder)),
                }
                Ok(response)
            }
        }
    }

    fn receive(&mut self, _response: Option<&Response>, _blocking: bool) {
        self.state().pumps += 1;
    }

    fn error_description(&self) -> String {
        self.state().last_error.clone()
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
