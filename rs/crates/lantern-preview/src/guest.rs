//! Guest runtime host.
//!
//! A `GuestEngine` is whatever actually executes bootstrap documents: a
//! browser tab behind the preview server, a webview, or a scripted stand-in
//! in tests. `GuestHost` owns one engine and stamps every load with a
//! generation; signals carrying any other generation are stale.

use lantern_document::BootstrapDocument;
use serde::Deserialize;

use crate::error::GuestError;

pub type Generation = u64;

/// Executes bootstrap documents in an isolated environment.
pub trait GuestEngine {
    /// Replace the guest's entire global state with `document`, loaded as an
    /// in-memory document. Completion arrives later as a `GuestSignal`.
    fn load(&mut self, generation: Generation, document: &BootstrapDocument) -> Result<(), GuestError>;

    /// Destroy the current document, its timers and its bridge.
    fn teardown(&mut self);
}

/// What a guest can report.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum GuestSignal {
    Loaded,
    LoadFailed {
        #[serde(default)]
        error: String,
    },
    MountFailed {
        #[serde(default)]
        error: String,
    },
    Bridge {
        channel: String,
        #[serde(default)]
        payload: serde_json::Value,
    },
}

/// A signal tagged with the generation of the document that sent it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GuestEvent {
    pub generation: Generation,
    #[serde(flatten)]
    pub signal: GuestSignal,
}

impl GuestEvent {
    pub fn new(generation: Generation, signal: GuestSignal) -> Self {
        Self { generation, signal }
    }
}

pub struct GuestHost<E: GuestEngine> {
    engine: E,
    generation: Generation,
    live: bool,
    closed: bool,
}

impl<E: GuestEngine> GuestHost<E> {
    pub fn new(engine: E) -> Self {
        Self { engine, generation: 0, live: false, closed: false }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Whether a document is currently loaded.
    pub fn is_live(&self) -> bool {
        self.live
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Load `document` under a fresh generation.
    pub fn load(&mut self, document: &BootstrapDocument) -> Result<Generation, GuestError> {
        if self.closed {
            return Err(GuestError::Closed);
        }
        self.generation += 1;
        self.live = false;
        self.engine.load(self.generation, document)?;
        self.live = true;
        Ok(self.generation)
    }

    /// Drop the current document. Its generation becomes stale.
    pub fn teardown(&mut self) {
        if self.live {
            self.engine.teardown();
            self.live = false;
        }
        self.generation += 1;
    }

    /// Tear down for good; every later signal is rejected.
    pub fn close(&mut self) {
        if !self.closed {
            self.teardown();
            self.closed = true;
        }
    }

    pub fn accepts(&self, event: &GuestEvent) -> bool {
        !self.closed && self.live && event.generation == self.generation
    }
}
