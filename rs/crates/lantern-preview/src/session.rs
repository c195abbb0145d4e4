//! Preview session state machine.
//!
//! `Idle → Loading → Ready`, back to `Loading` on every reload, with an
//! error overlay that can sit on top of `Loading` or `Ready`. All input comes
//! through `update`, `handle_event` and `tick`; time is passed in so the
//! machine stays deterministic.

use std::sync::Arc;
use std::time::Instant;

use lantern_document::{build_from_source, BootstrapDocument, DocumentOptions};
use lantern_source::PreviewSource;
use serde::Serialize;

use crate::bridge::{payload_text, LogSink, LOG_CHANNEL};
use crate::config::SessionConfig;
use crate::error::GuestError;
use crate::guest::{GuestEngine, GuestEvent, GuestHost, GuestSignal, Generation};

pub const EMPTY_MESSAGE: &str = "Nothing to preview yet. Write a component named App to see it here.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Loading,
    Ready,
}

/// Everything the host UI needs to paint the preview surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionView {
    pub state: SessionState,
    /// Present when the error overlay is up.
    pub error: Option<String>,
    pub crossfade: bool,
    pub empty_message: Option<&'static str>,
    pub generation: Generation,
    pub has_document: bool,
}

impl SessionView {
    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }
}

pub struct PreviewSession<E: GuestEngine> {
    id: String,
    host: GuestHost<E>,
    sink: Arc<dyn LogSink>,
    options: DocumentOptions,
    timing: SessionConfig,

    state: SessionState,
    error: Option<String>,
    // Load or mount failure for the current generation; keeps the session
    // out of `Ready` even after load-finished.
    blocked: bool,
    crossfade: bool,
    crossfade_until: Option<Instant>,
    load_deadline: Option<Instant>,

    source: Option<PreviewSource>,
    refresh_token: Option<u64>,
    document: Option<BootstrapDocument>,
}

impl<E: GuestEngine> PreviewSession<E> {
    pub fn new(
        id: impl Into<String>,
        engine: E,
        sink: Arc<dyn LogSink>,
        options: DocumentOptions,
        timing: SessionConfig,
    ) -> Self {
        Self {
            id: id.into(),
            host: GuestHost::new(engine),
            sink,
            options,
            timing,
            state: SessionState::Idle,
            error: None,
            blocked: false,
            crossfade: false,
            crossfade_until: None,
            load_deadline: None,
            source: None,
            refresh_token: None,
            document: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn crossfade(&self) -> bool {
        self.crossfade
    }

    pub fn generation(&self) -> Generation {
        self.host.generation()
    }

    pub fn document(&self) -> Option<&BootstrapDocument> {
        self.document.as_ref()
    }

    pub fn engine(&self) -> &E {
        self.host.engine()
    }

    pub fn is_closed(&self) -> bool {
        self.host.is_closed()
    }

    /// Source of the current document; `None` while idle.
    pub fn source(&self) -> Option<&PreviewSource> {
        self.source.as_ref()
    }

    /// Last refresh token seen, if any.
    pub fn refresh_token(&self) -> Option<u64> {
        self.refresh_token
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            state: self.state,
            error: self.error.clone(),
            crossfade: self.crossfade,
            empty_message: (self.state == SessionState::Idle).then_some(EMPTY_MESSAGE),
            generation: self.host.generation(),
            has_document: self.host.is_live(),
        }
    }

    /// Feed the current source. Rebuilds when the source changed, or when
    /// `refresh_token` moved past the last one seen (teardown first, then a
    /// fresh load of the same document).
    pub fn update(&mut self, source: &PreviewSource, refresh_token: u64, now: Instant) -> Result<(), GuestError> {
        if self.host.is_closed() {
            return Err(GuestError::Closed);
        }
        let refresh = self.refresh_token.map_or(false, |last| refresh_token > last);
        self.refresh_token = Some(self.refresh_token.map_or(refresh_token, |last| last.max(refresh_token)));

        if source.is_empty() {
            if self.state != SessionState::Idle || self.host.is_live() {
                tracing::debug!("[session:{}] source empty, going idle", self.id);
            }
            self.host.teardown();
            self.state = SessionState::Idle;
            self.error = None;
            self.blocked = false;
            self.crossfade = false;
            self.crossfade_until = None;
            self.load_deadline = None;
            self.source = None;
            self.document = None;
            return Ok(());
        }

        let changed = self.source.as_ref() != Some(source);
        if !changed && !refresh {
            return Ok(());
        }
        if !changed {
            tracing::debug!("[session:{}] refresh, remounting", self.id);
            self.host.teardown();
        }
        self.source = Some(source.clone());

        let document = build_from_source(&source.text, &self.options);
        self.reload(document, now)
    }

    fn reload(&mut self, document: BootstrapDocument, now: Instant) -> Result<(), GuestError> {
        self.state = SessionState::Loading;
        self.error = None;
        self.blocked = false;
        self.crossfade = true;
        self.crossfade_until = None;
        self.load_deadline = self.timing.load_timeout().map(|t| now + t);

        let result = self.host.load(&document);
        self.document = Some(document);
        match result {
            Ok(generation) => {
                tracing::debug!("[session:{}] loading generation {}", self.id, generation);
                Ok(())
            }
            Err(e) => {
                tracing::warn!("[session:{}] load failed: {}", self.id, e);
                self.fail(e.to_string());
                Err(e)
            }
        }
    }

    fn fail(&mut self, message: String) {
        self.error = Some(message);
        self.blocked = true;
        self.state = SessionState::Loading;
        self.crossfade = false;
        self.crossfade_until = None;
        self.load_deadline = None;
    }

    /// Apply a guest signal. Returns `false` for stale or post-close signals,
    /// which change nothing.
    pub fn handle_event(&mut self, event: GuestEvent, now: Instant) -> bool {
        if !self.host.accepts(&event) {
            tracing::debug!(
                "[session:{}] dropped stale signal for generation {} (current {})",
                self.id,
                event.generation,
                self.host.generation()
            );
            return false;
        }
        match event.signal {
            GuestSignal::Loaded => {
                self.load_deadline = None;
                self.crossfade_until = Some(now + self.timing.crossfade());
                if !self.blocked {
                    self.state = SessionState::Ready;
                    self.error = None;
                }
            }
            GuestSignal::LoadFailed { error } => {
                tracing::warn!("[session:{}] guest load failed: {}", self.id, error);
                self.fail(if error.is_empty() { "Preview failed to load".into() } else { error });
            }
            GuestSignal::MountFailed { error } => {
                tracing::warn!("[session:{}] mount failed: {}", self.id, error);
                self.fail(if error.is_empty() { "Mount failed".into() } else { error });
            }
            GuestSignal::Bridge { channel, payload } => {
                if channel == LOG_CHANNEL {
                    self.sink.log(&self.id, event.generation, &payload_text(&payload));
                } else {
                    tracing::debug!("[session:{}] ignoring bridge channel {:?}", self.id, channel);
                }
            }
        }
        true
    }

    /// Advance timers: cross-fade expiry and load timeout.
    pub fn tick(&mut self, now: Instant) {
        if self.crossfade_until.map_or(false, |t| now >= t) {
            self.crossfade = false;
            self.crossfade_until = None;
        }
        if self.load_deadline.map_or(false, |t| now >= t) {
            self.load_deadline = None;
            if self.state == SessionState::Loading && self.error.is_none() {
                tracing::warn!("[session:{}] load timed out", self.id);
                self.error = Some(format!(
                    "Preview did not finish loading within {} ms",
                    self.timing.load_timeout_ms
                ));
            }
        }
    }

    /// Earliest instant at which `tick` would change something.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.crossfade_until, self.load_deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Tear the guest down unconditionally. Later signals are no-ops.
    pub fn close(&mut self) {
        if self.host.is_closed() {
            return;
        }
        self.host.close();
        self.state = SessionState::Idle;
        self.error = None;
        self.blocked = false;
        self.crossfade = false;
        self.crossfade_until = None;
        self.load_deadline = None;
        self.document = None;
        tracing::debug!("[session:{}] closed", self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingSink, ScriptedEngine};
    use std::time::Duration;

    fn session(timing: SessionConfig) -> (PreviewSession<ScriptedEngine>, ScriptedEngine) {
        let engine = ScriptedEngine::new();
        let s = PreviewSession::new("s1", engine.clone(), Arc::new(RecordingSink::new()), DocumentOptions::default(), timing);
        (s, engine)
    }

    fn src(text: &str) -> PreviewSource {
        PreviewSource::new("doc-1", text)
    }

    #[test]
    fn test_timeout_then_late_load_clears_error() {
        let (mut s, _) = session(SessionConfig { crossfade_ms: 300, load_timeout_ms: 1000 });
        let t0 = Instant::now();
        s.update(&src("const App = () => null;"), 1, t0).unwrap();
        assert_eq!(s.next_deadline(), Some(t0 + Duration::from_millis(1000)));

        s.tick(t0 + Duration::from_millis(1000));
        assert_eq!(s.state(), SessionState::Loading);
        assert!(s.error().unwrap().contains("1000 ms"));

        let g = s.generation();
        assert!(s.handle_event(GuestEvent::new(g, GuestSignal::Loaded), t0 + Duration::from_millis(1500)));
        assert_eq!(s.state(), SessionState::Ready);
        assert_eq!(s.error(), None);
    }

    #[test]
    fn test_disabled_timeout_never_fires() {
        let (mut s, _) = session(SessionConfig { crossfade_ms: 300, load_timeout_ms: 0 });
        let t0 = Instant::now();
        s.update(&src("const App = () => null;"), 1, t0).unwrap();
        assert_eq!(s.next_deadline(), None);
        s.tick(t0 + Duration::from_secs(3600));
        assert_eq!(s.error(), None);
    }

    #[test]
    fn test_engine_error_sets_error_overlay() {
        let (mut s, engine) = session(SessionConfig::default());
        engine.fail_next_load("no webview");
        let err = s.update(&src("const App = () => null;"), 1, Instant::now()).unwrap_err();
        assert_eq!(err, GuestError::Engine("no webview".into()));
        let view = s.view();
        assert_eq!(view.state, SessionState::Loading);
        assert_eq!(view.error.as_deref(), Some("guest engine: no webview"));
        assert!(!view.has_document);
    }

    #[test]
    fn test_non_log_bridge_channel_ignored() {
        let engine = ScriptedEngine::new();
        let sink = RecordingSink::new();
        let mut s = PreviewSession::new("s1", engine, Arc::new(sink.clone()), DocumentOptions::default(), SessionConfig::default());
        s.update(&src("const App = () => null;"), 1, Instant::now()).unwrap();
        let g = s.generation();
        s.handle_event(
            GuestEvent::new(g, GuestSignal::Bridge { channel: "metrics".into(), payload: "x".into() }),
            Instant::now(),
        );
        assert!(sink.entries().is_empty());
    }

    #[test]
    fn test_change_detection_compares_full_text() {
        let (mut s, engine) = session(SessionConfig::default());
        let now = Instant::now();
        s.update(&src("const App = () => null;"), 1, now).unwrap();
        s.update(&src("const App = () => null; "), 1, now).unwrap();
        assert_eq!(engine.loads(), 2);
        assert_eq!(s.source().map(|p| p.text.as_str()), Some("const App = () => null; "));

        s.update(&src("const App = () => null; "), 1, now).unwrap();
        assert_eq!(engine.loads(), 2);

        s.update(&src(""), 1, now).unwrap();
        assert!(s.source().is_none());
    }

    #[test]
    fn test_document_id_change_rebuilds() {
        let (mut s, engine) = session(SessionConfig::default());
        let now = Instant::now();
        s.update(&PreviewSource::new("a", "const App = () => null;"), 1, now).unwrap();
        s.update(&PreviewSource::new("b", "const App = () => null;"), 1, now).unwrap();
        assert_eq!(engine.loads(), 2);
    }
}
