//! Preview server - browser tabs as guests
//!
//! Each surface id maps to one session actor: a tokio task that owns the
//! `PreviewSession` and applies commands in arrival order. The guest is a
//! shell page holding the document in an `<iframe srcdoc>`; it learns about
//! loads over SSE and relays guest signals back over HTTP.
//!
//! Routes:
//!   POST   /api/sessions/:id            open a session
//!   GET    /api/sessions/:id            current view
//!   PUT    /api/sessions/:id/source     { source, refresh_token? }
//!   POST   /api/sessions/:id/refresh    remount unchanged source
//!   DELETE /api/sessions/:id            close
//!   GET    /sessions/:id/               shell page
//!   GET    /sessions/:id/events         SSE: load / teardown / view
//!   GET    /sessions/:id/doc/:gen       bootstrap document for a generation
//!   POST   /sessions/:id/guest          guest signal

mod shell;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{Html, IntoResponse};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use futures_util::stream::{self, Stream, StreamExt};
use lantern_document::BootstrapDocument;
use lantern_source::PreviewSource;
use notify::{Event as NotifyEvent, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, watch};

use crate::bridge::LogSink;
use crate::config::LanternConfig;
use crate::error::{GuestError, ServerError};
use crate::guest::{GuestEngine, GuestEvent, Generation};
use crate::session::{PreviewSession, SessionView};

pub use shell::render_shell;

/// Session id used by `serve --watch`.
pub const DEFAULT_SESSION: &str = "default";

// ── Browser engine ──────────────────────────────────────────────────

/// Pushed to the shell page.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ShellEvent {
    Load { generation: Generation },
    Teardown,
    View(SessionView),
}

type DocumentSlot = Arc<Mutex<Option<(Generation, Arc<str>)>>>;

/// Guest engine backed by whichever shell pages are subscribed to the
/// session's event stream.
pub struct BrowserEngine {
    slot: DocumentSlot,
    events: broadcast::Sender<ShellEvent>,
}

impl BrowserEngine {
    fn set_slot(&self, value: Option<(Generation, Arc<str>)>) {
        *self.slot.lock().unwrap_or_else(|e| e.into_inner()) = value;
    }
}

impl GuestEngine for BrowserEngine {
    fn load(&mut self, generation: Generation, document: &BootstrapDocument) -> Result<(), GuestError> {
        self.set_slot(Some((generation, document.shared())));
        // No subscribers is fine: a shell connecting later gets the slot.
        let _ = self.events.send(ShellEvent::Load { generation });
        Ok(())
    }

    fn teardown(&mut self) {
        self.set_slot(None);
        let _ = self.events.send(ShellEvent::Teardown);
    }
}

// ── Session actor ───────────────────────────────────────────────────

#[derive(Debug)]
pub enum Command {
    Update { source: PreviewSource, refresh_token: Option<u64> },
    Refresh,
    Guest(GuestEvent),
    Close,
}

struct SessionHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<ShellEvent>,
    view: watch::Receiver<SessionView>,
    slot: DocumentSlot,
}

async fn run_session(
    mut session: PreviewSession<BrowserEngine>,
    mut commands: mpsc::Receiver<Command>,
    view_tx: watch::Sender<SessionView>,
    events: broadcast::Sender<ShellEvent>,
) {
    let id = session.id().to_string();
    tracing::info!("[session:{}] opened", id);
    let mut last_source: Option<PreviewSource> = None;

    loop {
        let next = match session.next_deadline() {
            Some(deadline) => {
                tokio::select! {
                    cmd = commands.recv() => cmd,
                    _ = tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)) => {
                        session.tick(Instant::now());
                        publish(&session, &view_tx, &events);
                        continue;
                    }
                }
            }
            None => commands.recv().await,
        };

        let Some(cmd) = next else { break };
        let now = Instant::now();
        let closing = matches!(cmd, Command::Close);
        match cmd {
            Command::Update { source, refresh_token } => {
                let token = refresh_token.or(session.refresh_token()).unwrap_or(0);
                if let Err(e) = session.update(&source, token, now) {
                    tracing::warn!("[session:{}] update: {}", id, e);
                }
                last_source = Some(source);
            }
            Command::Refresh => {
                if let Some(source) = &last_source {
                    let token = session.refresh_token().unwrap_or(0) + 1;
                    if let Err(e) = session.update(source, token, now) {
                        tracing::warn!("[session:{}] refresh: {}", id, e);
                    }
                }
            }
            Command::Guest(event) => {
                session.handle_event(event, now);
            }
            Command::Close => session.close(),
        }
        publish(&session, &view_tx, &events);
        if closing {
            break;
        }
    }

    session.close();
    tracing::info!("[session:{}] closed", id);
}

fn publish(session: &PreviewSession<BrowserEngine>, view_tx: &watch::Sender<SessionView>, events: &broadcast::Sender<ShellEvent>) {
    let view = session.view();
    let changed = view_tx.send_if_modified(|current| {
        if *current == view {
            false
        } else {
            *current = view.clone();
            true
        }
    });
    if changed {
        let _ = events.send(ShellEvent::View(view));
    }
}

// ── Shared state ────────────────────────────────────────────────────

pub struct AppState {
    sessions: RwLock<HashMap<String, SessionHandle>>,
    config: LanternConfig,
    sink: Arc<dyn LogSink>,
}

impl AppState {
    pub fn new(config: LanternConfig, sink: Arc<dyn LogSink>) -> Self {
        Self { sessions: RwLock::new(HashMap::new()), config, sink }
    }

    fn sessions(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, SessionHandle>> {
        self.sessions.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Start a session actor for `id`. One session per surface id.
    pub fn open(&self, id: &str) -> Result<SessionView, ServerError> {
        validate_id(id)?;
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        if sessions.contains_key(id) {
            return Err(ServerError::Conflict(format!("session '{}' already open", id)));
        }

        let (events, _) = broadcast::channel(64);
        let slot: DocumentSlot = Arc::new(Mutex::new(None));
        let engine = BrowserEngine { slot: Arc::clone(&slot), events: events.clone() };
        let session = PreviewSession::new(
            id,
            engine,
            Arc::clone(&self.sink),
            self.config.document_options(),
            self.config.session,
        );
        let view = session.view();
        let (view_tx, view_rx) = watch::channel(view.clone());
        let (commands, rx) = mpsc::channel(64);
        tokio::spawn(run_session(session, rx, view_tx, events.clone()));

        sessions.insert(id.to_string(), SessionHandle { commands, events, view: view_rx, slot });
        Ok(view)
    }

    pub async fn send(&self, id: &str, cmd: Command) -> Result<(), ServerError> {
        let tx = self
            .sessions()
            .get(id)
            .map(|h| h.commands.clone())
            .ok_or_else(|| ServerError::NotFound(format!("session '{}'", id)))?;
        tx.send(cmd).await.map_err(|_| ServerError::NotFound(format!("session '{}' closed", id)))
    }

    /// Remove the session; the actor tears the guest down and exits.
    pub async fn close(&self, id: &str) -> Result<(), ServerError> {
        let handle = self
            .sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id)
            .ok_or_else(|| ServerError::NotFound(format!("session '{}'", id)))?;
        let _ = handle.commands.send(Command::Close).await;
        Ok(())
    }

    pub fn view(&self, id: &str) -> Result<SessionView, ServerError> {
        self.sessions()
            .get(id)
            .map(|h| h.view.borrow().clone())
            .ok_or_else(|| ServerError::NotFound(format!("session '{}'", id)))
    }

    pub fn watch_view(&self, id: &str) -> Result<watch::Receiver<SessionView>, ServerError> {
        self.sessions()
            .get(id)
            .map(|h| h.view.clone())
            .ok_or_else(|| ServerError::NotFound(format!("session '{}'", id)))
    }

    /// Document for exactly `generation`; anything older is gone.
    pub fn document(&self, id: &str, generation: Generation) -> Result<Arc<str>, ServerError> {
        let sessions = self.sessions();
        let handle = sessions.get(id).ok_or_else(|| ServerError::NotFound(format!("session '{}'", id)))?;
        let slot = handle.slot.lock().unwrap_or_else(|e| e.into_inner());
        match slot.as_ref() {
            Some((g, html)) if *g == generation => Ok(Arc::clone(html)),
            _ => Err(ServerError::NotFound(format!("document {} of session '{}'", generation, id))),
        }
    }

    fn subscribe(&self, id: &str) -> Result<(Vec<ShellEvent>, broadcast::Receiver<ShellEvent>), ServerError> {
        let sessions = self.sessions();
        let handle = sessions.get(id).ok_or_else(|| ServerError::NotFound(format!("session '{}'", id)))?;
        let rx = handle.events.subscribe();
        let mut initial = vec![ShellEvent::View(handle.view.borrow().clone())];
        if let Some((generation, _)) = handle.slot.lock().unwrap_or_else(|e| e.into_inner()).as_ref() {
            initial.push(ShellEvent::Load { generation: *generation });
        }
        Ok((initial, rx))
    }

    pub fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions().keys().cloned().collect();
        ids.sort();
        ids
    }
}

fn validate_id(id: &str) -> Result<(), ServerError> {
    let ok = !id.is_empty()
        && id.len() <= 128
        && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');
    if ok {
        Ok(())
    } else {
        Err(ServerError::BadRequest(format!("invalid session id '{}'", id)))
    }
}

// ── Router ──────────────────────────────────────────────────────────

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/sessions", get(list_sessions))
        .route("/api/sessions/:id", post(open_session).get(get_view).delete(close_session))
        .route("/api/sessions/:id/source", put(put_source))
        .route("/api/sessions/:id/refresh", post(refresh))
        .route("/sessions/:id/", get(shell_page))
        .route("/sessions/:id/events", get(events))
        .route("/sessions/:id/doc/:generation", get(document))
        .route("/sessions/:id/guest", post(guest_signal))
        .with_state(state)
}

#[derive(Deserialize)]
pub struct SourceRequest {
    pub source: String,
    #[serde(default)]
    pub document_id: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<u64>,
}

async fn health() -> &'static str {
    "ok"
}

async fn list_sessions(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "sessions": state.session_ids() }))
}

async fn open_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<SessionView>), ServerError> {
    let view = state.open(&id)?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn get_view(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<Json<SessionView>, ServerError> {
    Ok(Json(state.view(&id)?))
}

async fn close_session(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<StatusCode, ServerError> {
    state.close(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn put_source(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<SourceRequest>,
) -> Result<StatusCode, ServerError> {
    let document_id = req.document_id.unwrap_or_else(|| id.clone());
    let source = PreviewSource::new(document_id, req.source);
    state.send(&id, Command::Update { source, refresh_token: req.refresh_token }).await?;
    Ok(StatusCode::ACCEPTED)
}

async fn refresh(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<StatusCode, ServerError> {
    state.send(&id, Command::Refresh).await?;
    Ok(StatusCode::ACCEPTED)
}

async fn shell_page(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<Html<String>, ServerError> {
    state.view(&id)?;
    Ok(Html(render_shell(&id, &state.config.session)))
}

async fn events(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ServerError> {
    let (initial, rx) = state.subscribe(&id)?;
    let live = stream::unfold(rx, move |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => return Some((event, rx)),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::debug!("[preview] shell lagged {} events", n);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    });
    let stream = stream::iter(initial).chain(live).map(|event| Event::default().json_data(&event));
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

async fn document(
    State(state): State<Arc<AppState>>,
    Path((id, generation)): Path<(String, Generation)>,
) -> Result<impl IntoResponse, ServerError> {
    let html = state.document(&id, generation)?;
    Ok((
        [(header::CONTENT_TYPE, "text/html; charset=utf-8"), (header::CACHE_CONTROL, "no-store")],
        html.to_string(),
    ))
}

async fn guest_signal(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(event): Json<GuestEvent>,
) -> Result<StatusCode, ServerError> {
    state.send(&id, Command::Guest(event)).await?;
    Ok(StatusCode::ACCEPTED)
}

// ── Serve ───────────────────────────────────────────────────────────

pub struct ServeOptions {
    pub port: u16,
    pub watch: Option<PathBuf>,
}

pub async fn serve(config: LanternConfig, sink: Arc<dyn LogSink>, opts: ServeOptions) -> Result<(), ServerError> {
    let state = Arc::new(AppState::new(config, sink));

    if let Some(path) = opts.watch {
        state.open(DEFAULT_SESSION)?;
        let (watcher, changes) = start_file_watcher(&path)
            .map_err(|e| ServerError::Internal(format!("watch {}: {}", path.display(), e)))?;
        tokio::spawn(watch_file(Arc::clone(&state), path, watcher, changes));
    }

    let addr = format!("127.0.0.1:{}", opts.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ServerError::Internal(format!("bind {}: {}", addr, e)))?;
    tracing::info!("[preview] http://{}/sessions/{}/", addr, DEFAULT_SESSION);

    axum::serve(listener, router(state))
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))
}

/// Watch the directory holding `path` and signal once per event that touches
/// the file. Watching the directory keeps rename-on-save editors visible.
fn start_file_watcher(path: &std::path::Path) -> notify::Result<(RecommendedWatcher, mpsc::UnboundedReceiver<()>)> {
    let (tx, rx) = mpsc::unbounded_channel();
    let target = path.file_name().map(|name| name.to_os_string());
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<NotifyEvent>| match res {
        Ok(event) => {
            let touches = event.paths.iter().any(|p| p.file_name() == target.as_deref());
            if touches && (event.kind.is_modify() || event.kind.is_create()) {
                let _ = tx.send(());
            }
        }
        Err(_) => {
            let _ = tx.send(());
        }
    })?;

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => std::path::Path::new("."),
    };
    watcher.watch(dir, RecursiveMode::NonRecursive)?;
    Ok((watcher, rx))
}

/// Feed the file into the default session: once at start, then after every
/// burst of change events.
async fn watch_file(
    state: Arc<AppState>,
    path: PathBuf,
    _watcher: RecommendedWatcher,
    mut changes: mpsc::UnboundedReceiver<()>,
) {
    let document_id = path.display().to_string();
    tracing::info!("[preview] watching {}", document_id);

    loop {
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => {
                let cmd = Command::Update { source: PreviewSource::new(document_id.clone(), text), refresh_token: None };
                if state.send(DEFAULT_SESSION, cmd).await.is_err() {
                    tracing::info!("[preview] default session gone, stopping watch");
                    break;
                }
            }
            Err(e) => tracing::warn!("[preview] read {}: {}", document_id, e),
        }

        if changes.recv().await.is_none() {
            break;
        }
        while changes.try_recv().is_ok() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guest::GuestSignal;
    use crate::session::SessionState;
    use crate::testing::RecordingSink;
    use std::time::Duration;

    fn state() -> (Arc<AppState>, RecordingSink) {
        let sink = RecordingSink::new();
        (Arc::new(AppState::new(LanternConfig::default(), Arc::new(sink.clone()))), sink)
    }

    async fn wait_for(state: &AppState, id: &str, pred: impl Fn(&SessionView) -> bool) -> SessionView {
        let mut rx = state.watch_view(id).unwrap();
        let wait = async {
            loop {
                let view = rx.borrow_and_update().clone();
                if pred(&view) {
                    return view;
                }
                if rx.changed().await.is_err() {
                    panic!("session ended");
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(5), wait).await.expect("view never matched")
    }

    fn update(text: &str) -> Command {
        Command::Update { source: PreviewSource::new("doc", text), refresh_token: None }
    }

    #[tokio::test]
    async fn test_one_session_per_id() {
        let (state, _) = state();
        state.open("s1").unwrap();
        assert!(matches!(state.open("s1"), Err(ServerError::Conflict(_))));
        assert!(matches!(state.open("bad id"), Err(ServerError::BadRequest(_))));
        assert_eq!(state.session_ids(), vec!["s1".to_string()]);
    }

    #[tokio::test]
    async fn test_update_load_and_ready() {
        let (state, sink) = state();
        state.open("s1").unwrap();
        let (_, mut rx) = state.subscribe("s1").unwrap();

        state.send("s1", update("const App = () => <h1>hi</h1>;")).await.unwrap();
        let view = wait_for(&state, "s1", |v| v.state == SessionState::Loading).await;
        assert!(view.crossfade);

        let html = state.document("s1", view.generation).unwrap();
        assert!(html.contains("id=\"lantern-source\""));
        assert!(state.document("s1", view.generation + 1).is_err());
        assert_eq!(rx.recv().await.unwrap(), ShellEvent::Load { generation: view.generation });

        let log = GuestEvent::new(view.generation, GuestSignal::Bridge { channel: "log".into(), payload: "[log] hi".into() });
        state.send("s1", Command::Guest(log)).await.unwrap();
        state.send("s1", Command::Guest(GuestEvent::new(view.generation, GuestSignal::Loaded))).await.unwrap();
        wait_for(&state, "s1", |v| v.state == SessionState::Ready).await;
        assert_eq!(sink.messages(), vec!["[log] hi".to_string()]);

        // Cross-fade clears on the actor's own timer.
        wait_for(&state, "s1", |v| !v.crossfade).await;
    }

    #[tokio::test]
    async fn test_refresh_remounts_same_document() {
        let (state, _) = state();
        state.open("s1").unwrap();
        state.send("s1", update("const App = () => null;")).await.unwrap();
        let first = wait_for(&state, "s1", |v| v.has_document).await;
        let html = state.document("s1", first.generation).unwrap();

        state.send("s1", Command::Refresh).await.unwrap();
        let second = wait_for(&state, "s1", |v| v.generation > first.generation && v.has_document).await;
        assert_eq!(state.document("s1", second.generation).unwrap(), html);
    }

    async fn wait_for_program(state: &AppState, needle: &str) {
        let wait = async {
            loop {
                if let Ok(view) = state.view(DEFAULT_SESSION) {
                    if let Ok(html) = state.document(DEFAULT_SESSION, view.generation) {
                        if html.contains(needle) {
                            return;
                        }
                    }
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(10), wait)
            .await
            .unwrap_or_else(|_| panic!("document never contained {needle:?}"));
    }

    #[tokio::test]
    async fn test_watch_feeds_every_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("App.jsx");
        std::fs::write(&path, "const App = () => 'one';\n").unwrap();

        let (state, _) = state();
        state.open(DEFAULT_SESSION).unwrap();
        let (watcher, changes) = start_file_watcher(&path).unwrap();
        tokio::spawn(watch_file(Arc::clone(&state), path.clone(), watcher, changes));
        wait_for_program(&state, "'one'").await;

        // Back-to-back saves can share an mtime; each must still land.
        std::fs::write(&path, "const App = () => 'two';\n").unwrap();
        wait_for_program(&state, "'two'").await;
        std::fs::write(&path, "const App = () => 'three';\n").unwrap();
        wait_for_program(&state, "'three'").await;
    }

    #[tokio::test]
    async fn test_watch_ignores_sibling_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("App.jsx");
        std::fs::write(&path, "const App = 1;\n").unwrap();

        let (_watcher, mut changes) = start_file_watcher(&path).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();
        let quiet = tokio::time::timeout(Duration::from_millis(300), changes.recv()).await;
        assert!(quiet.is_err());

        std::fs::write(&path, "const App = 2;\n").unwrap();
        let signalled = tokio::time::timeout(Duration::from_secs(10), changes.recv()).await;
        assert_eq!(signalled.unwrap(), Some(()));
    }

    #[tokio::test]
    async fn test_close_removes_session() {
        let (state, sink) = state();
        state.open("s1").unwrap();
        state.send("s1", update("const App = () => null;")).await.unwrap();
        let view = wait_for(&state, "s1", |v| v.has_document).await;

        state.close("s1").await.unwrap();
        let late = GuestEvent::new(view.generation, GuestSignal::Bridge { channel: "log".into(), payload: "late".into() });
        assert!(matches!(state.send("s1", Command::Guest(late)).await, Err(ServerError::NotFound(_))));
        assert!(state.view("s1").is_err());
        assert!(sink.entries().is_empty());
    }
}
