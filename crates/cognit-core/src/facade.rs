//! `DeviceRuntime`: the public facade applications embed.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::cache::UploadCache;
use crate::call::Call;
use crate::call::Callback;
use crate::call::ExecResponse;
use crate::call::FunctionRegistry;
use crate::call::Language;
use crate::call::LocalFunctionId;
use crate::call::Value;
use crate::config::Config;
use crate::error::CognitError;
use crate::error::ValidationError;
use crate::queue::CallQueue;
use crate::rendezvous::SyncRendezvous;
use crate::requirements::Requirements;
use crate::supervisor;
use crate::supervisor::SupervisorHandle;

/// The device-side entry point: owns the call queue, the sync rendezvous,
/// the function registry, and the currently-running supervisor, if any.
///
/// `call`/`call_async`/`register_function` are safe to invoke from multiple
/// application threads concurrently; `init`/`stop`/`update_requirements`
/// serialize against each other through the same lock.
pub struct DeviceRuntime {
    config: Arc<Config>,
    queue: Arc<CallQueue>,
    rendezvous: Arc<SyncRendezvous>,
    cache: Arc<UploadCache>,
    functions: FunctionRegistry,
    supervisor: Mutex<Option<SupervisorHandle>>,
}

impl DeviceRuntime {
    /// Builds a runtime from `config`. The supervisor is not started; call
    /// [`Self::init`] to begin serving calls.
    pub fn new(config: Config) -> Self {
        let queue = CallQueue::new(config.queue_bound);
        Self {
            config: Arc::new(config),
            queue: Arc::new(queue),
            rendezvous: Arc::new(SyncRendezvous::new()),
            cache: Arc::new(UploadCache::new()),
            functions: FunctionRegistry::new(),
            supervisor: Mutex::new(None),
        }
    }

    /// Starts the supervisor with the given initial requirements.
    ///
    /// Fails with [`ValidationError::AlreadyRunning`] if a supervisor is
    /// already active.
    pub fn init(&self, requirements: Requirements) -> Result<(), CognitError> {
        let mut supervisor = self.supervisor.lock();
        if supervisor.is_some() {
            return Err(ValidationError::AlreadyRunning.into());
        }
        *supervisor = Some(supervisor::spawn(
            self.config.clone(),
            requirements,
            self.queue.clone(),
            self.rendezvous.clone(),
            self.cache.clone(),
        ));
        Ok(())
    }

    /// Stops the supervisor, discarding any queued calls.
    ///
    /// Fails with [`ValidationError::NotRunning`] if no supervisor is
    /// active.
    pub async fn stop(&self) -> Result<(), CognitError> {
        let handle = self.supervisor.lock().take();
        match handle {
            Some(handle) => {
                handle.stop().await;
                Ok(())
            }
            None => Err(ValidationError::NotRunning.into()),
        }
    }

    /// Requests a requirements change, picked up by the supervisor from any
    /// state at or past `REGISTER`.
    ///
    /// Fails with [`ValidationError::NotRunning`] if no supervisor is
    /// active, or [`ValidationError::DuplicateRequirements`] if
    /// `requirements` equals the currently active set.
    pub fn update_requirements(&self, requirements: Requirements) -> Result<(), CognitError> {
        let supervisor = self.supervisor.lock();
        match supervisor.as_ref() {
            Some(handle) => {
                if handle.update_requirements(requirements) {
                    Ok(())
                } else {
                    Err(ValidationError::DuplicateRequirements.into())
                }
            }
            None => Err(ValidationError::NotRunning.into()),
        }
    }

    /// Registers a function body for later offload, returning a handle the
    /// application holds onto instead of the original closure.
    pub fn register_function(&self, language: Language, blob: String) -> LocalFunctionId {
        self.functions.register(language, blob)
    }

    /// Invokes a registered function synchronously and blocks until the
    /// fabric's result (or a local failure, reported the same way) is
    /// available.
    ///
    /// Never fails at this layer: an unregistered `function`, a full queue,
    /// or a call made while no supervisor is running all come back as an
    /// `ExecResponse { ret_code: Error, .. }` rather than a `Result`.
    pub async fn call(
        &self,
        function: LocalFunctionId,
        params: Vec<Value>,
        timeout: Option<Duration>,
    ) -> ExecResponse {
        let function = match self.functions.get(function) {
            Some(function) => function,
            None => return ExecResponse::error(ValidationError::UnknownFunction.to_string()),
        };
        if self.supervisor.lock().is_none() {
            return ExecResponse::error("supervisor is not running");
        }
        if !self.queue.enqueue(Call::sync(function, params, timeout)) {
            return ExecResponse::error("call queue is at capacity");
        }
        self.rendezvous.take().await
    }

    /// Invokes a registered function asynchronously; `callback` runs on the
    /// supervisor task at most once, when the fabric replies.
    ///
    /// Fails with [`ValidationError::NotRunning`] if no supervisor is
    /// active, or the call is rejected with a [`crate::error::CapacityError`]
    /// if the queue is full.
    pub fn call_async(
        &self,
        function: LocalFunctionId,
        params: Vec<Value>,
        callback: Callback,
    ) -> Result<(), CognitError> {
        let function = self
            .functions
            .get(function)
            .ok_or(ValidationError::UnknownFunction)?;
        if self.supervisor.lock().is_none() {
            return Err(ValidationError::NotRunning.into());
        }
        if !self.queue.enqueue(Call::asynchronous(function, params, callback)) {
            return Err(crate::error::CapacityError.into());
        }
        Ok(())
    }
}
