use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde_json::Value;

use crate::{DataError, QueryState};

/// Background re-fetch loop: one immediate tick, then one per interval until
/// stopped or dropped. Every tick's state goes to `on_state`.
pub struct Poller {
    stop: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Poller {
    pub fn start<F, C>(label: &str, interval: Duration, mut tick: F, mut on_state: C) -> Self
    where
        F: FnMut() -> Result<Vec<Value>, DataError> + Send + 'static,
        C: FnMut(&QueryState) + Send + 'static,
    {
        let (stop, rx) = mpsc::channel::<()>();
        let label = label.to_string();
        let handle = thread::spawn(move || {
            tracing::debug!("[data] poll '{}' started (every {:?})", label, interval);
            let mut state = QueryState::new();
            loop {
                let outcome = tick();
                if let Err(e) = &outcome {
                    tracing::warn!("[data] poll '{}' error: {}", label, e);
                }
                state.apply(outcome);
                on_state(&state);
                match rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            tracing::debug!("[data] poll '{}' stopped", label);
        });
        Self { stop: Some(stop), handle: Some(handle) }
    }

    /// Stop and wait for an in-flight tick to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.shutdown();
    }
}
