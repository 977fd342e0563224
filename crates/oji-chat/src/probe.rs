//! Connection probe: checks that an endpoint is reachable and accepts the
//! credential by listing its models under a hard deadline.
//!
//! Each call to [`ConnectionProbe::start`] begins a new attempt with its own
//! generation number. State transitions are only applied while the state
//! still belongs to that generation and is `Running`, which gives every
//! attempt exactly one terminal state and makes late cancels harmless.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use oji_ai::{ChatClient, ErrorKind, ModelDescriptor, Transport};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::{sync::watch, time::Instant};
use tokio_util::sync::CancellationToken;

/// Lifecycle of a probe attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStatus {
    #[default]
    Idle,
    Running,
    Success,
    Error,
    Timeout,
    Cancelled,
}

impl ProbeStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProbeStatus::Success | ProbeStatus::Error | ProbeStatus::Timeout | ProbeStatus::Cancelled
        )
    }
}

/// Snapshot of the current (or last) probe attempt
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeState {
    /// Attempt this snapshot belongs to; 0 before the first start
    pub generation: u64,
    pub status: ProbeStatus,
    pub elapsed_seconds: u64,
    pub error_title: String,
    pub error_detail: String,
    /// Models found on success, staged until taken
    pub discovered_models: Vec<ModelDescriptor>,
}

/// How a frontend should surface a probe state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbePresentation {
    Nothing,
    /// Non-modal status line
    Status(String),
    /// Blocking error dialog
    ErrorDialog { title: String, detail: String },
}

impl ProbeState {
    pub fn presentation(&self) -> ProbePresentation {
        match self.status {
            ProbeStatus::Idle | ProbeStatus::Cancelled => ProbePresentation::Nothing,
            ProbeStatus::Running => ProbePresentation::Status(format!(
                "Testing connection... {}s",
                self.elapsed_seconds
            )),
            ProbeStatus::Success => ProbePresentation::Status(format!(
                "Connection OK, {} model(s) available",
                self.discovered_models.len()
            )),
            ProbeStatus::Timeout => ProbePresentation::Status(self.error_detail.clone()),
            ProbeStatus::Error => ProbePresentation::ErrorDialog {
                title: self.error_title.clone(),
                detail: self.error_detail.clone(),
            },
        }
    }
}

/// Identifies one probe attempt
#[derive(Debug, Clone)]
pub struct ProbeHandle {
    generation: u64,
    cancel: CancellationToken,
}

impl ProbeHandle {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Runs connection probes one at a time
pub struct ConnectionProbe {
    transport: Arc<dyn Transport>,
    timeout: Duration,
    state_tx: Arc<watch::Sender<ProbeState>>,
    current: Mutex<Option<ProbeHandle>>,
    next_generation: AtomicU64,
}

impl ConnectionProbe {
    pub fn new(transport: Arc<dyn Transport>, timeout: Duration) -> Self {
        let (state_tx, _) = watch::channel(ProbeState::default());
        Self {
            transport,
            timeout,
            state_tx: Arc::new(state_tx),
            current: Mutex::new(None),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Watch state changes
    pub fn subscribe(&self) -> watch::Receiver<ProbeState> {
        self.state_tx.subscribe()
    }

    /// Current state snapshot
    pub fn state(&self) -> ProbeState {
        self.state_tx.borrow().clone()
    }

    /// Begin a probe of `base_url`, superseding any attempt still running.
    ///
    /// A running attempt is moved to `Cancelled` before the new one is
    /// published as `Running`. Watchers only see the latest snapshot, so a
    /// lagging receiver may observe the new `Running` state directly.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, base_url: &str, credential: Option<&str>) -> ProbeHandle {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let handle = ProbeHandle {
            generation,
            cancel: CancellationToken::new(),
        };
        if let Some(previous) = self.current.lock().replace(handle.clone()) {
            self.cancel(&previous);
        }

        self.state_tx.send_replace(ProbeState {
            generation,
            status: ProbeStatus::Running,
            ..ProbeState::default()
        });
        tracing::debug!(generation, base_url, "Starting connection probe");

        let client = ChatClient::new(
            Arc::clone(&self.transport),
            base_url,
            credential.map(str::to_string),
        );
        tokio::spawn(run_probe(
            client,
            self.timeout,
            Arc::clone(&self.state_tx),
            handle.clone(),
        ));
        handle
    }

    /// Cancel an attempt. Ignored once it has terminated or been superseded.
    pub fn cancel(&self, handle: &ProbeHandle) {
        handle.cancel.cancel();
        let applied = transition(&self.state_tx, handle.generation, |s| {
            s.status = ProbeStatus::Cancelled;
            s.error_detail.clear();
        });
        if applied {
            tracing::debug!(generation = handle.generation, "Connection probe cancelled");
        }
    }

    /// Take the models staged by a successful probe, leaving none behind
    pub fn take_discovered_models(&self) -> Vec<ModelDescriptor> {
        let mut models = Vec::new();
        self.state_tx.send_if_modified(|s| {
            if s.discovered_models.is_empty() {
                return false;
            }
            models = std::mem::take(&mut s.discovered_models);
            true
        });
        models
    }
}

/// Apply `f` only if the state still belongs to a running `generation`.
fn transition(
    state_tx: &watch::Sender<ProbeState>,
    generation: u64,
    f: impl FnOnce(&mut ProbeState),
) -> bool {
    state_tx.send_if_modified(|s| {
        if s.generation != generation || s.status != ProbeStatus::Running {
            return false;
        }
        f(s);
        true
    })
}

async fn run_probe(
    client: ChatClient,
    timeout: Duration,
    state_tx: Arc<watch::Sender<ProbeState>>,
    handle: ProbeHandle,
) {
    let generation = handle.generation;
    let cancel = handle.cancel;
    let started = Instant::now();
    let tick = Duration::from_secs(1);

    let request = client.list_models(timeout, cancel.clone());
    tokio::pin!(request);
    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);
    let mut ticker = tokio::time::interval_at(started + tick, tick);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = &mut deadline => {
                let secs = timeout.as_secs();
                transition(&state_tx, generation, |s| {
                    s.status = ProbeStatus::Timeout;
                    s.elapsed_seconds = secs;
                    s.error_title = ErrorKind::Timeout.title().to_string();
                    s.error_detail = format!("No response from the server after {} seconds", secs);
                });
                tracing::debug!(generation, "Connection probe timed out");
                break;
            }
            result = &mut request => {
                let elapsed = started.elapsed().as_secs();
                match result {
                    Ok(models) => {
                        tracing::debug!(generation, models = models.len(), "Connection probe succeeded");
                        transition(&state_tx, generation, |s| {
                            s.status = ProbeStatus::Success;
                            s.elapsed_seconds = elapsed;
                            s.discovered_models = models;
                        });
                    }
                    Err(e) if e.is_silent() => {}
                    Err(e) => {
                        let classified = e.classify();
                        tracing::debug!(generation, error = %e, "Connection probe failed");
                        let status = if classified.kind == ErrorKind::Timeout {
                            ProbeStatus::Timeout
                        } else {
                            ProbeStatus::Error
                        };
                        transition(&state_tx, generation, |s| {
                            s.status = status;
                            s.elapsed_seconds = elapsed;
                            s.error_title = classified.title;
                            s.error_detail = classified.detail;
                        });
                    }
                }
                break;
            }
            _ = ticker.tick() => {
                let elapsed = started.elapsed().as_secs();
                transition(&state_tx, generation, |s| s.elapsed_seconds = elapsed);
            }
        }
    }

    // Drops the in-flight request if it is still pending
    cancel.cancel();
}
