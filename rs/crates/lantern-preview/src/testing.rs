//! Stand-ins for driving sessions without a real guest.

use std::sync::{Arc, Mutex, MutexGuard};

use lantern_document::BootstrapDocument;

use crate::bridge::LogSink;
use crate::error::GuestError;
use crate::guest::{GuestEngine, Generation};

#[derive(Debug, Clone, PartialEq)]
pub enum EngineOp {
    Load { generation: Generation, document: BootstrapDocument },
    Teardown,
}

#[derive(Default)]
struct EngineScript {
    ops: Vec<EngineOp>,
    fail_next: Option<String>,
}

/// Records every load/teardown. Clones share one record, so a test can keep
/// a handle after moving the engine into a session.
#[derive(Clone, Default)]
pub struct ScriptedEngine {
    inner: Arc<Mutex<EngineScript>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> MutexGuard<'_, EngineScript> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make the next `load` return `GuestError::Engine(message)`.
    pub fn fail_next_load(&self, message: &str) {
        self.script().fail_next = Some(message.to_string());
    }

    pub fn ops(&self) -> Vec<EngineOp> {
        self.script().ops.clone()
    }

    pub fn loads(&self) -> usize {
        self.script().ops.iter().filter(|op| matches!(op, EngineOp::Load { .. })).count()
    }

    pub fn last_document(&self) -> Option<BootstrapDocument> {
        self.script().ops.iter().rev().find_map(|op| match op {
            EngineOp::Load { document, .. } => Some(document.clone()),
            EngineOp::Teardown => None,
        })
    }
}

impl GuestEngine for ScriptedEngine {
    fn load(&mut self, generation: Generation, document: &BootstrapDocument) -> Result<(), GuestError> {
        let mut script = self.script();
        if let Some(message) = script.fail_next.take() {
            return Err(GuestError::Engine(message));
        }
        script.ops.push(EngineOp::Load { generation, document: document.clone() });
        Ok(())
    }

    fn teardown(&mut self) {
        self.script().ops.push(EngineOp::Teardown);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub session: String,
    pub generation: Generation,
    pub message: String,
}

/// Keeps every bridge log line in memory.
#[derive(Clone, Default)]
pub struct RecordingSink {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.entries().into_iter().map(|e| e.message).collect()
    }
}

impl LogSink for RecordingSink {
    fn log(&self, session: &str, generation: Generation, message: &str) {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).push(LogEntry {
            session: session.to_string(),
            generation,
            message: message.to_string(),
        });
    }
}
