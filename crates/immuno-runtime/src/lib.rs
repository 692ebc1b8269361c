//! Plugin runtime for immune-algorithm engines.
//!
//! Plugins are shared libraries that register one module each, a set of typed settings for
//! that module and, optionally, setting stores that persist every module's settings.

pub mod config;
pub mod diagnostics;
pub mod error;
mod host;
pub mod list;
pub mod loader;
pub mod manager;
pub mod registry;
pub mod status;
pub mod types;
mod util;
pub mod value;
pub mod variable;

pub use config::RuntimeConfig;
pub use diagnostics::{DiagnosticsSink, LogLevel, TracingSink, init_tracing};
pub use error::{Error, Result};
pub use loader::{LoaderError, NativePlatform, Platform, SharedLibrary};
pub use manager::{BuiltinPlugin, LoadReport, LoadedPluginInfo, ManagerState, PluginManager};
pub use registry::{Metadata, ModuleId, Registry, SettingId, StoreId};
pub use status::{InitStatus, Method, StatusRecord, ValueError};
pub use types::{TypeCategory, TypeDescriptor, TypeKind};
pub use value::Value;
pub use variable::{Backing, ExternalBuffer, Variable, VariableDecl};
