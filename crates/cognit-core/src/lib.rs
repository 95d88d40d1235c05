//! Device-side supervisor for offloading function calls to a Cognit compute
//! fabric.
//!
//! [`DeviceRuntime`] is the only type most embedders need: construct it from
//! a [`Config`], [`DeviceRuntime::init`] it with a [`Requirements`] record,
//! register functions, then call them with [`DeviceRuntime::call`] or
//! [`DeviceRuntime::call_async`].

pub mod cache;
pub mod call;
pub mod cfa;
pub mod config;
pub mod eca;
pub mod error;
pub mod facade;
pub mod latency;
pub mod queue;
pub mod rendezvous;
pub mod requirements;
pub mod selector;
pub mod supervisor;

pub use call::Callback;
pub use call::ExecResponse;
pub use call::Language;
pub use call::LocalFunctionId;
pub use call::Mode;
pub use call::RetCode;
pub use call::Value;
pub use config::Config;
pub use error::CognitError;
pub use facade::DeviceRuntime;
pub use requirements::Geolocation;
pub use requirements::Requirements;
