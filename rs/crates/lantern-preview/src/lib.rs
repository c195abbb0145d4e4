//! lantern-preview - Live preview sessions
//!
//! Turns a stream of edits to a single-file React program into a running,
//! isolated preview:
//!   - `guest`   - engine trait + generation-stamped host
//!   - `session` - Idle / Loading / Ready state machine with error overlay
//!   - `bridge`  - guest log channel and sinks
//!   - `server`  - axum preview server with browser-tab guests
//!   - `testing` - scripted engine and recording sink

pub mod bridge;
pub mod config;
pub mod error;
pub mod guest;
pub mod server;
pub mod session;
pub mod testing;

pub use bridge::{LogSink, TracingSink, LOG_CHANNEL};
pub use config::{LanternConfig, SessionConfig};
pub use error::{ConfigError, GuestError, ServerError};
pub use guest::{Generation, GuestEngine, GuestEvent, GuestHost, GuestSignal};
pub use lantern_source::PreviewSource;
pub use session::{PreviewSession, SessionState, SessionView, EMPTY_MESSAGE};

use tracing_subscriber::EnvFilter;

/// Install the fmt subscriber. Filter comes from `LANTERN_LOG`, default `info`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_env("LANTERN_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
