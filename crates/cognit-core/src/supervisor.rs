//! The Supervisor State Machine: drives authentication, requirements
//! registration, cluster selection, and call serving.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing::warn;

use crate::cache::UploadCache;
use crate::call::Call;
use crate::call::ExecResponse;
use crate::call::Mode;
use crate::cfa::CognitFrontendAdapter;
use crate::config::Config;
use crate::eca::EdgeClusterAdapter;
use crate::latency;
use crate::queue::CallQueue;
use crate::rendezvous::SyncRendezvous;
use crate::requirements::Requirements;
use crate::selector;

/// Number of consecutive failed attempts `REGISTER`/`SELECT` tolerate
/// before falling back to `INIT`.
const MAX_ATTEMPTS: u32 = 3;

/// One of the four states the supervisor cycles through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Authenticating against the Cognit Frontend.
    Init,
    /// Registering or updating the active requirements.
    Register,
    /// Listing and selecting an Edge Cluster Frontend.
    Select,
    /// Draining the call queue against the selected cluster.
    Serve,
}

/// Requirements pending application by the supervisor, set by
/// [`crate::facade::DeviceRuntime::update_requirements`].
#[derive(Default)]
struct Pending {
    value: Option<Requirements>,
}

/// Shared state between the facade and the running supervisor task.
pub struct SupervisorHandle {
    cancel: CancellationToken,
    pending: Arc<Mutex<Pending>>,
    active: Arc<Mutex<Requirements>>,
    task: JoinHandle<()>,
}

impl SupervisorHandle {
    /// Requests a requirements change. Returns `false` if `requirements`
    /// is identical to the currently active set.
    pub fn update_requirements(&self, requirements: Requirements) -> bool {
        if *self.active.lock() == requirements {
            return false;
        }
        self.pending.lock().value = Some(requirements);
        true
    }

    /// Signals the supervisor to stop and waits for it to exit.
    pub async fn stop(self) {
        self.cancel.cancel();
        let _ = self.task.await;
    }
}

/// Spawns the supervisor task and returns a handle to it.
///
/// `queue`/`rendezvous`/`cache` are owned by the facade and shared with the
/// supervisor only through these `Arc`s; the token, `applicationId`, and
/// active-cluster URL stay local to the spawned task.
pub fn spawn(
    config: Arc<Config>,
    initial_requirements: Requirements,
    queue: Arc<CallQueue>,
    rendezvous: Arc<SyncRendezvous>,
    cache: Arc<UploadCache>,
) -> SupervisorHandle {
    let cancel = CancellationToken::new();
    let pending = Arc::new(Mutex::new(Pending::default()));
    let active = Arc::new(Mutex::new(initial_requirements.clone()));

    let task_cancel = cancel.clone();
    let task_pending = pending.clone();
    let task_active = active.clone();
    let task = tokio::spawn(async move {
        let mut machine = Machine::new(config, queue, rendezvous, cache, task_pending, task_active);
        machine.run(task_cancel).await;
    });

    SupervisorHandle {
        cancel,
        pending,
        active,
        task,
    }
}

/// Holds everything the running loop needs across iterations; a plain
/// struct instead of a long parameter list threaded through free
/// functions.
struct Machine {
    config: Arc<Config>,
    queue: Arc<CallQueue>,
    rendezvous: Arc<SyncRendezvous>,
    cache: Arc<UploadCache>,
    pending: Arc<Mutex<Pending>>,
    active: Arc<Mutex<Requirements>>,
    cfa: CognitFrontendAdapter,
    eca: Option<Arc<EdgeClusterAdapter>>,
    probe: Option<(CancellationToken, JoinHandle<()>)>,
    register_attempts: u32,
    select_attempts: u32,
}

impl Machine {
    fn new(
        config: Arc<Config>,
        queue: Arc<CallQueue>,
        rendezvous: Arc<SyncRendezvous>,
        cache: Arc<UploadCache>,
        pending: Arc<Mutex<Pending>>,
        active: Arc<Mutex<Requirements>>,
    ) -> Self {
        let cfa = CognitFrontendAdapter::new(&config);
        Self {
            config,
            queue,
            rendezvous,
            cache,
            pending,
            active,
            cfa,
            eca: None,
            probe: None,
            register_attempts: 0,
            select_attempts: 0,
        }
    }

    /// Cancels and joins the latency probe, if one is running. Entry to
    /// every state except `SERVE` stops it unconditionally.
    async fn stop_probe(&mut self) {
        if let Some((cancel, task)) = self.probe.take() {
            cancel.cancel();
            let _ = task.await;
        }
    }

    /// Starts a fresh latency probe against `adapter`.
    fn start_probe(&mut self, adapter: Arc<EdgeClusterAdapter>) {
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let period = Duration::from_millis(self.config.probe_period_ms);
        let task = tokio::spawn(async move {
            latency::run(&adapter, period, task_cancel).await;
        });
        self.probe = Some((cancel, task));
    }

    fn has_pending_requirements(&self) -> bool {
        self.pending.lock().value.is_some()
    }

    async fn enter_init(&mut self) -> State {
        self.stop_probe().await;
        self.cfa = CognitFrontendAdapter::new(&self.config);
        self.eca = None;
        self.register_attempts = 0;
        self.select_attempts = 0;

        match self.cfa.authenticate().await {
            Ok(true) => State::Register,
            Ok(false) => State::Init,
            Err(error) => {
                warn!(%error, "authentication failed");
                State::Init
            }
        }
    }

    async fn enter_register(&mut self) -> State {
        self.stop_probe().await;

        let mut requirements = self.active.lock().clone();
        if let Some(new_requirements) = self.pending.lock().value.take() {
            requirements = new_requirements;
            *self.active.lock() = requirements.clone();
        }

        self.register_attempts += 1;
        let outcome = self.cfa.register_or_update(&requirements).await;

        let uploaded = matches!(outcome, Ok(true));
        if !uploaded {
            if !self.cfa.connected() || self.register_attempts >= MAX_ATTEMPTS {
                self.register_attempts = 0;
                return State::Init;
            }
            return State::Register;
        }

        self.register_attempts = 0;
        if self.has_pending_requirements() {
            State::Register
        } else {
            State::Select
        }
    }

    async fn enter_select(&mut self) -> State {
        self.stop_probe().await;
        self.register_attempts = 0;

        if !self.cfa.connected() {
            self.select_attempts = 0;
            return State::Init;
        }
        if self.has_pending_requirements() {
            self.select_attempts = 0;
            return State::Register;
        }

        self.select_attempts += 1;
        let candidates = self.cfa.list_clusters().await.unwrap_or_default();
        let budget = self.active.lock().latency_budget();
        let chosen = selector::select(&candidates, budget).await.cloned();

        let Some(candidate) = chosen else {
            if self.select_attempts >= MAX_ATTEMPTS {
                self.select_attempts = 0;
                return State::Init;
            }
            return State::Select;
        };

        let adapter = Arc::new(EdgeClusterAdapter::new(candidate.endpoint));
        // Probe once up front so SELECT's "ECA connected" guard reflects
        // reality rather than the adapter's unexercised default.
        let reachable = latency::measure(adapter.endpoint()).await.is_some();
        self.eca = Some(adapter.clone());

        if !reachable {
            if self.select_attempts >= MAX_ATTEMPTS {
                self.select_attempts = 0;
                return State::Init;
            }
            return State::Select;
        }

        self.start_probe(adapter);
        self.select_attempts = 0;
        State::Serve
    }

    async fn enter_serve(&mut self) -> State {
        self.select_attempts = 0;

        if !self.cfa.connected() {
            self.stop_probe().await;
            return State::Init;
        }

        let Some(eca) = self.eca.clone() else {
            self.stop_probe().await;
            return State::Init;
        };

        if self.has_pending_requirements() {
            self.stop_probe().await;
            return State::Register;
        }

        let Some(call) = self.queue.dequeue() else {
            return State::Serve;
        };

        let Some(application_id) = self.cfa.application_id() else {
            self.stop_probe().await;
            return State::Init;
        };

        self.serve_call(&eca, application_id, call).await;

        if !eca.connected() {
            self.stop_probe().await;
            State::Init
        } else {
            State::Serve
        }
    }

    /// Uploads the call's function (if needed) and executes it, delivering
    /// the result through the rendezvous for a sync call.
    async fn serve_call(&mut self, eca: &EdgeClusterAdapter, application_id: u64, call: Call) {
        let is_sync = matches!(call.mode, Mode::Sync);
        let function = call.function.clone();

        let remote_id = match self.cfa.upload_function(&function, &self.cache).await {
            Ok(id) => id,
            Err(error) => {
                warn!(%error, "function upload failed");
                if is_sync {
                    self.rendezvous
                        .put(ExecResponse::error(format!("upload failed: {error}")));
                }
                return;
            }
        };

        match eca.execute_function(remote_id, application_id, call).await {
            Ok(response) => {
                if is_sync {
                    self.rendezvous.put(response);
                }
            }
            Err(error) => {
                warn!(%error, "function execution failed");
                if is_sync {
                    self.rendezvous
                        .put(ExecResponse::error(format!("execution failed: {error}")));
                }
            }
        }
    }

    /// The supervisor's main loop: evaluates the current state's guards at
    /// a fixed cadence until cancelled, discarding queued calls on exit.
    async fn run(&mut self, cancel: CancellationToken) {
        let tick = Duration::from_millis(self.config.tick_ms);
        let mut state = State::Init;

        loop {
            if cancel.is_cancelled() {
                break;
            }

            state = match state {
                State::Init => self.enter_init().await,
                State::Register => self.enter_register().await,
                State::Select => self.enter_select().await,
                State::Serve => self.enter_serve().await,
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(tick) => {}
            }
        }

        self.stop_probe().await;
        for call in self.queue.drain() {
            if matches!(call.mode, Mode::Sync) {
                self.rendezvous.put(ExecResponse::error("supervisor stopped"));
            }
        }
        info!("supervisor stopped");
    }
}
