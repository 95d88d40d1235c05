//! Invocation records: registered functions, enqueued calls, and results.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Deserialize;
use serde::Serialize;

/// An opaque value exchanged with the fabric: a function parameter or an
/// execution result. Concrete representation is intentionally left to
/// `serde_json::Value` since any richer source-language value is already
/// reduced to something JSON-representable before it reaches the core.
pub type Value = serde_json::Value;

/// The runtime language a registered function's compiled body targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Language {
    /// Python.
    #[serde(rename = "PY")]
    Py,
    /// C.
    #[serde(rename = "C")]
    C,
}

/// Whether a call waits for its result in-band or delivers it via callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// The caller blocks on the sync rendezvous for the result.
    Sync,
    /// The result is delivered to a callback on the supervisor task.
    Async,
}

/// The outcome the fabric reported for a single function execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecResponse {
    /// Whether the function executed successfully.
    pub ret_code: RetCode,
    /// The decoded result, present iff `ret_code == Success` and the
    /// function returned a value.
    pub result: Option<Value>,
    /// A human-readable error description, present iff `ret_code ==
    /// Error`.
    pub err: Option<String>,
}

impl ExecResponse {
    /// Builds a successful response.
    pub fn success(result: Option<Value>) -> Self {
        Self {
            ret_code: RetCode::Success,
            result,
            err: None,
        }
    }

    /// Builds an error response with the given message.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ret_code: RetCode::Error,
            result: None,
            err: Some(message.into()),
        }
    }
}

/// The two possible outcomes of a function execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetCode {
    /// The function executed and returned (or had no return value).
    #[serde(rename = "SUCCESS")]
    Success,
    /// The function itself failed, or the fabric could not run it.
    #[serde(rename = "ERROR")]
    Error,
}

/// Process-local handle to a function registered via
/// [`crate::DeviceRuntime::register_function`].
///
/// Without reflective function pickling available, shipping a function
/// means shipping a pre-compiled blob the application registered ahead of
/// time; this handle is what the application holds onto instead of the
/// original closure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocalFunctionId(u64);

/// A function registered for offload: its target language and compiled
/// body.
#[derive(Debug, Clone)]
pub struct Function {
    /// The local handle identifying this function.
    pub id: LocalFunctionId,
    /// The language the compiled body targets.
    pub language: Language,
    /// The serialized compiled body. The upload cache's fingerprint is the
    /// SHA-256 digest of this blob.
    pub blob: String,
}

/// The callback invoked with the result of an asynchronous call.
///
/// Invoked at most once, on the supervisor task.
pub type Callback = Box<dyn FnOnce(ExecResponse) + Send + 'static>;

/// An immutable invocation record enqueued by the facade.
pub struct Call {
    /// The function being invoked.
    pub function: Arc<Function>,
    /// The language of the function being invoked (copied from
    /// `function.language` at construction for parity with the documented
    /// data model).
    pub language: Language,
    /// Whether this call expects an in-band result or a callback.
    pub mode: Mode,
    /// Present iff `mode == Mode::Async`.
    pub callback: Option<Callback>,
    /// Ordered sequence of opaque parameter values.
    pub params: Vec<Value>,
    /// Optional per-call timeout, applied by the ECA's HTTP client.
    pub timeout: Option<Duration>,
}

impl fmt::Debug for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Call")
            .field("function", &self.function.id)
            .field("language", &self.language)
            .field("mode", &self.mode)
            .field("has_callback", &self.callback.is_some())
            .field("params", &self.params)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Call {
    /// Builds a synchronous call.
    pub fn sync(function: Arc<Function>, params: Vec<Value>, timeout: Option<Duration>) -> Self {
        let language = function.language;
        Self {
            function,
            language,
            mode: Mode::Sync,
            callback: None,
            params,
            timeout,
        }
    }

    /// Builds an asynchronous call with the given result callback.
    pub fn asynchronous(
        function: Arc<Function>,
        params: Vec<Value>,
        callback: Callback,
    ) -> Self {
        let language = function.language;
        Self {
            function,
            language,
            mode: Mode::Async,
            callback: Some(callback),
            params,
            timeout: None,
        }
    }
}

/// Process-local registry of functions the application has registered for
/// offload.
///
/// Owned exclusively by the facade; the supervisor never looks functions up
/// by id, since a `Call` embeds its `Arc<Function>` directly.
#[derive(Default)]
pub struct FunctionRegistry {
    /// Monotonically increasing id counter.
    next: AtomicU64,
    /// Registered functions, by id.
    functions: Mutex<HashMap<LocalFunctionId, Arc<Function>>>,
}

impl FunctionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a function and returns its local handle.
    pub fn register(&self, language: Language, blob: String) -> LocalFunctionId {
        let id = LocalFunctionId(self.next.fetch_add(1, Ordering::Relaxed));
        let function = Arc::new(Function { id, language, blob });
        self.functions.lock().insert(id, function);
        id
    }

    /// Looks up a previously registered function.
    pub fn get(&self, id: LocalFunctionId) -> Option<Arc<Function>> {
        self.functions.lock().get(&id).cloned()
    }

    /// Duration helper kept here so callers don't need to depend on
    /// `std::time` directly when constructing a timeout.
    pub fn millis(ms: u64) -> Duration {
        Duration::from_millis(ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_round_trips_functions() {
        let registry = FunctionRegistry::new();
        let id = registry.register(Language::Py, "def f(): pass".into());
        let function = registry.get(id).expect("function should be registered");
        assert_eq!(function.language, Language::Py);
        assert_eq!(function.blob, "def f(): pass");
    }

    #[test]
    fn unregistered_id_is_none() {
        let registry = FunctionRegistry::new();
        let first = registry.register(Language::C, "int f(void);".into());
        let second = LocalFunctionId(first.0 + 1);
        assert!(registry.get(second).is_none());
    }
}
