//! Detection session protocol.
//!
//! Implements the client side of the detection service's session protocol:
//! session start/stop, per-person record submission, and in-order
//! reconciliation of asynchronous replies.
//!
//! # Message Flow
//!
//! ```text
//! Client                                   Service
//!    |                                        |
//!    |--- start_session {source_name} ------>|  blocking
//!    |<-- {code:0, session_key} --------------|
//!    |                                        |
//!    |--- person_detection {session_key,..} ->|  non-blocking, one per person
//!    |--- person_detection {session_key,..} ->|
//!    |<-- {code} (reconciled later, FIFO) ----|
//!    |                                        |
//!    |--- stop_session {session_key} -------->|  blocking
//!    |<-- {code} -----------------------------|
//! ```
//!
//! ## State Machine
//!
//! | State       | Description                      | Valid Transitions |
//! |-------------|----------------------------------|-------------------|
//! | `Unstarted` | No key; start never succeeded    | → Active          |
//! | `Active`    | Key held, records can be sent    | → Stopped         |
//! | `Stopped`   | Stop-session acknowledged        | (terminal)        |
//!
//! ## Reconciliation
//!
//! Replies are inspected strictly in submission order. A reply that is not
//! ready blocks inspection of everything behind it. A ready reply whose
//! envelope has `code != 0` (or cannot be read) is a stop signal; a reply
//! lost at transport level is tolerated unless
//! [`ReconcilePolicy::escalate_transport_loss`](crate::config::ReconcilePolicy)
//! is set.
//!
//! # Usage
//!
//! ```rust,ignore
//! use sightline::protocol::{DetectionRecord, SessionClient};
//!
//! let mut client = SessionClient::open(&config, transport, "lobby-cam");
//! let report = client.send_records(&[DetectionRecord::new("p-1")], 0);
//! if !report.all_sent() {
//!     client.close();
//! }
//! ```

mod record;
pub mod request;
mod session;

pub use record::{DetectionRecord, Emotions, FaceRect, Frame, Point, Rgb};
pub use session::{BatchReport, SessionClient, SessionState, SessionStats};
