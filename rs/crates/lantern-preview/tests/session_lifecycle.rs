use std::sync::Arc;
use std::time::{Duration, Instant};

use lantern_document::DocumentOptions;
use lantern_preview::testing::{EngineOp, RecordingSink, ScriptedEngine};
use lantern_preview::{
    GuestEvent, GuestSignal, PreviewSession, PreviewSource, SessionConfig, SessionState, EMPTY_MESSAGE,
};

const APP: &str = r#"import React, { useState } from 'react';

const LOCATION_ID = "loc-42";

export default function App() {
  const [n, setN] = useState(0);
  return <button onClick={() => setN(n + 1)}>{n}</button>;
}
"#;

struct Harness {
    session: PreviewSession<ScriptedEngine>,
    engine: ScriptedEngine,
    sink: RecordingSink,
    now: Instant,
}

impl Harness {
    fn new() -> Self {
        let engine = ScriptedEngine::new();
        let sink = RecordingSink::new();
        let session = PreviewSession::new(
            "surface-1",
            engine.clone(),
            Arc::new(sink.clone()),
            DocumentOptions::default(),
            SessionConfig::default(),
        );
        Self { session, engine, sink, now: Instant::now() }
    }

    fn update(&mut self, text: &str, token: u64) {
        self.session.update(&PreviewSource::new("doc", text), token, self.now).unwrap();
    }

    fn signal(&mut self, signal: GuestSignal) -> bool {
        let generation = self.session.generation();
        self.session.handle_event(GuestEvent::new(generation, signal), self.now)
    }

    fn advance(&mut self, ms: u64) {
        self.now += Duration::from_millis(ms);
        self.session.tick(self.now);
    }
}

#[test]
fn empty_source_goes_idle_without_document() {
    let mut h = Harness::new();
    h.update("   \n\t", 1);

    let view = h.session.view();
    assert_eq!(view.state, SessionState::Idle);
    assert_eq!(view.empty_message, Some(EMPTY_MESSAGE));
    assert!(!view.has_document);
    assert!(h.session.document().is_none());
    assert_eq!(h.engine.loads(), 0);
}

#[test]
fn edit_loads_then_cross_fade_clears() {
    let mut h = Harness::new();
    h.update(APP, 1);
    assert_eq!(h.session.state(), SessionState::Loading);
    assert!(h.session.crossfade());
    assert_eq!(h.engine.loads(), 1);

    let html = h.engine.last_document().unwrap();
    assert!(html.as_str().contains("window.LOCATION_ID = \"loc-42\";"));
    assert!(!html.as_str().contains("import React"));

    assert!(h.signal(GuestSignal::Loaded));
    assert_eq!(h.session.state(), SessionState::Ready);
    assert!(h.session.crossfade());

    h.advance(299);
    assert!(h.session.crossfade());
    h.advance(1);
    assert!(!h.session.crossfade());
}

#[test]
fn same_source_same_token_is_a_no_op() {
    let mut h = Harness::new();
    h.update(APP, 1);
    h.signal(GuestSignal::Loaded);
    h.update(APP, 1);
    assert_eq!(h.engine.loads(), 1);
    assert_eq!(h.session.state(), SessionState::Ready);
}

#[test]
fn refresh_with_unchanged_source_remounts_identical_document() {
    let mut h = Harness::new();
    h.update(APP, 1);
    h.signal(GuestSignal::Loaded);
    h.advance(300);
    assert_eq!(h.session.state(), SessionState::Ready);
    assert!(!h.session.crossfade());
    let first = h.engine.last_document().unwrap();

    h.update(APP, 2);
    assert_eq!(h.session.state(), SessionState::Loading);
    assert!(h.session.crossfade());

    // Forced-empty intermediate: teardown sits between the two loads.
    let ops = h.engine.ops();
    assert_eq!(ops.len(), 3);
    assert!(matches!(ops[1], EngineOp::Teardown));
    assert!(matches!(ops[2], EngineOp::Load { .. }));
    assert_eq!(h.engine.last_document().unwrap(), first);

    h.signal(GuestSignal::Loaded);
    assert_eq!(h.session.state(), SessionState::Ready);
    h.advance(300);
    assert!(!h.session.crossfade());
}

#[test]
fn stale_generation_signals_are_ignored() {
    let mut h = Harness::new();
    h.update(APP, 1);
    let old = h.session.generation();
    h.update("const App = () => <p>v2</p>;", 1);

    assert!(!h.session.handle_event(GuestEvent::new(old, GuestSignal::Loaded), h.now));
    assert_eq!(h.session.state(), SessionState::Loading);

    let failed = GuestEvent::new(old, GuestSignal::LoadFailed { error: "old".into() });
    assert!(!h.session.handle_event(failed, h.now));
    assert_eq!(h.session.error(), None);
}

#[test]
fn load_failure_sets_error_and_blocks_ready() {
    let mut h = Harness::new();
    h.update(APP, 1);
    h.signal(GuestSignal::Loaded);

    h.update("const App = () => <p>v2</p>;", 1);
    h.signal(GuestSignal::LoadFailed { error: "document 2: HTTP 404".into() });
    let view = h.session.view();
    assert_eq!(view.state, SessionState::Loading);
    assert_eq!(view.error.as_deref(), Some("document 2: HTTP 404"));
    assert!(!view.crossfade);

    h.signal(GuestSignal::Loaded);
    assert_eq!(h.session.state(), SessionState::Loading);
    assert!(h.session.view().has_error());
}

#[test]
fn mount_failure_blocks_ready_until_next_edit() {
    let mut h = Harness::new();
    h.update("const helper = 1;", 1);
    h.signal(GuestSignal::MountFailed {
        error: "No component to mount: Define one of: App, Preview, Component, Page".into(),
    });
    h.signal(GuestSignal::Loaded);
    assert_eq!(h.session.state(), SessionState::Loading);
    assert!(h.session.error().unwrap().contains("App, Preview, Component, Page"));

    h.update(APP, 1);
    assert_eq!(h.session.error(), None);
    h.signal(GuestSignal::Loaded);
    assert_eq!(h.session.state(), SessionState::Ready);
}

#[test]
fn bridge_log_reaches_sink() {
    let mut h = Harness::new();
    h.update(APP, 1);
    h.signal(GuestSignal::Bridge { channel: "log".into(), payload: "[warn] low stock".into() });

    let entries = h.sink.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].session, "surface-1");
    assert_eq!(entries[0].generation, h.session.generation());
    assert_eq!(h.sink.messages(), vec!["[warn] low stock".to_string()]);
}

#[test]
fn emptying_source_tears_down_guest() {
    let mut h = Harness::new();
    h.update(APP, 1);
    h.signal(GuestSignal::Loaded);
    let generation = h.session.generation();

    h.update("", 1);
    assert_eq!(h.session.state(), SessionState::Idle);
    assert!(matches!(h.engine.ops().last(), Some(EngineOp::Teardown)));
    assert!(!h.session.handle_event(GuestEvent::new(generation, GuestSignal::Loaded), h.now));
}

#[test]
fn closed_session_ignores_pre_close_messages() {
    let mut h = Harness::new();
    h.update(APP, 1);
    let generation = h.session.generation();
    h.session.close();

    assert!(matches!(h.engine.ops().last(), Some(EngineOp::Teardown)));
    let log = GuestSignal::Bridge { channel: "log".into(), payload: "late".into() };
    assert!(!h.session.handle_event(GuestEvent::new(generation, log), h.now));
    assert!(!h.session.handle_event(GuestEvent::new(generation, GuestSignal::Loaded), h.now));
    assert!(h.sink.entries().is_empty());
    assert_eq!(h.session.state(), SessionState::Idle);
    assert!(h.session.update(&PreviewSource::new("doc", APP), 2, h.now).is_err());
}

#[test]
fn missing_root_symbol_document_names_the_candidates() {
    let mut h = Harness::new();
    h.update("const helper = () => 1;", 1);
    let doc = h.engine.last_document().unwrap();
    assert!(doc.as_str().contains(r#""rootSymbols":["App","Preview","Component","Page"]"#));
    assert!(doc.as_str().contains("No component to mount"));
}
