//! Reply decoding for the detection service.
//!
//! All endpoints answer with the same generic envelope:
//!
//! ```text
//! { "code": <int>, "description": <string>?, ...endpoint fields }
//! ```
//!
//! | Endpoint             | Extra fields     |
//! |----------------------|------------------|
//! | `/start_session/`    | `session_key`    |
//! | `/person_detection/` | (none)           |
//! | `/stop_session/`     | (none)           |
//!
//! # Usage
//!
//! ```rust,ignore
//! use sightline::codec::Envelope;
//!
//! let env = Envelope::parse_success(r#"{"code":0,"session_key":"abc"}"#)?;
//! let key = env.require_str("session_key")?;
//! ```

mod envelope;

pub use envelope::{Envelope, CODE_FIELD, DESCRIPTION_FIELD, SUCCESS_CODE};

/// Field returned by the start-session endpoint.
pub const SESSION_KEY_FIELD: &str = "session_key";
