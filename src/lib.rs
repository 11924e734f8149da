//! # Sightline - Detection Session Client
//!
//! Client-side session manager for a remote person-detection service. A
//! camera-side process opens a session, streams per-frame person records
//! without waiting on each reply, and reconciles the replies later to notice
//! when the service asks it to stop.
//!
//! ## Architecture
//!
//! ```text
//!  caller ──> SessionClient ──> Transport ──> detection service
//!                 │   ▲             │
//!                 │   └── Response ◄┘ (resolved later for non-blocking calls)
//!                 ▼
//!          pending queue (FIFO) ──> codec::Envelope {code, description?}
//! ```
//!
//! ### Lifecycle
//!
//! ```text
//!              start() ok
//!   [Unstarted] ─────────> [Active] ───── stop() ok ────> [Stopped]
//!        │                    │
//!        └── close()/Drop: stop-session once, pending replies discarded
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sightline::{Config, DetectionRecord, HttpTransport, SessionClient};
//!
//! let config = Config::load()?;
//! let transport = HttpTransport::new(&config.transport)?;
//! let mut client = SessionClient::open(&config, transport, "entrance");
//!
//! let report = client.send_records(&[DetectionRecord::new("track-1")], 0);
//! if report.stop_requested {
//!     // the service asked us to end the session
//! }
//! client.close();
//! ```
//!
//! ## Modules
//!
//! - [`protocol`]: Session client, detection records, request field mapping
//! - [`transport`]: Transport trait, response handles, HTTP and scripted backends
//! - [`codec`]: Generic reply envelope
//! - [`config`]: Configuration management
//! - [`error`]: Error types and result aliases

pub mod codec;
pub mod config;
pub mod error;
pub mod protocol;
pub mod transport;

// Re-exports for convenience
pub use codec::Envelope;
pub use config::{ColorFields, Config, EndpointConfig, ReconcilePolicy, TransportConfig, WireConfig};
pub use error::{Result, SightlineError};
pub use protocol::{
    BatchReport, DetectionRecord, Emotions, FaceRect, Frame, Point, Rgb, SessionClient,
    SessionState, SessionStats,
};
pub use transport::{HttpTransport, Mode, Request, Response, ScriptedTransport, Transport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
