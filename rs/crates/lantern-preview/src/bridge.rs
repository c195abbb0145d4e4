//! Guest → host log channel.

use crate::guest::Generation;

/// The only bridge channel the host listens on.
pub const LOG_CHANNEL: &str = "log";

/// Developer-facing destination for guest console output.
pub trait LogSink: Send + Sync {
    fn log(&self, session: &str, generation: Generation, message: &str);
}

/// Forwards guest output to `tracing` under target `lantern::guest`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, session: &str, generation: Generation, message: &str) {
        tracing::info!(
            target: "lantern::guest",
            channel = LOG_CHANNEL,
            session,
            generation,
            "[session:{}] {}",
            session,
            message
        );
    }
}

/// Bridge payloads are usually strings; anything else is logged as JSON.
pub fn payload_text(payload: &serde_json::Value) -> String {
    match payload {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
