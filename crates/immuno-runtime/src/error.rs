use std::path::PathBuf;

use immuno_plugin_api::{
    IM_ALLOCATION_FAILURE, IM_ERR_INTERNAL, IM_PLUGIN_DIR_NOT_FOUND, IM_PLUGIN_ENTRY_MISSING,
    IM_PLUGIN_INIT_FAILED, IM_PLUGIN_OPEN_FAILED,
};
use thiserror::Error;

use crate::manager::ManagerState;
use crate::status::InitStatus;

pub type Result<T> = std::result::Result<T, Error>;

/// Fatal startup and lifecycle failures.
#[derive(Debug, Error)]
pub enum Error {
    #[error("plugin directory not found: `{path}`")]
    PluginDirNotFound { path: PathBuf },
    #[error("failed to open plugin library `{path}`: {details}")]
    PluginOpen { path: PathBuf, details: String },
    #[error("plugin `{path}` does not export `{symbol}`")]
    PluginEntryMissing { path: PathBuf, symbol: &'static str },
    #[error("plugin `{plugin}` failed to initialize: {reason}")]
    PluginInitFailed { plugin: String, reason: String },
    #[error("out of memory while registering plugin `{plugin}`")]
    AllocationFailure { plugin: String },
    #[error("plugin manager is {actual:?}, expected {expected:?}")]
    InvalidState {
        expected: ManagerState,
        actual: ManagerState,
    },
    #[error("io failed at `{path}`: {source}")]
    IoAt {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn plugin_open(path: impl Into<PathBuf>, details: impl ToString) -> Self {
        Self::PluginOpen {
            path: path.into(),
            details: details.to_string(),
        }
    }

    pub fn entry_missing(path: impl Into<PathBuf>, symbol: &'static str) -> Self {
        Self::PluginEntryMissing {
            path: path.into(),
            symbol,
        }
    }

    pub fn init_failed(plugin: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PluginInitFailed {
            plugin: plugin.into(),
            reason: reason.into(),
        }
    }

    pub fn io_at(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::IoAt {
            path: path.into(),
            source,
        }
    }

    /// Initialization status this failure leaves the runtime in.
    pub fn init_status(&self) -> InitStatus {
        match self {
            Self::PluginDirNotFound { .. } => InitStatus::PluginDirNotFound,
            Self::PluginOpen { .. } | Self::IoAt { .. } => InitStatus::PluginOpenFailed,
            Self::PluginEntryMissing { .. } => InitStatus::PluginEntryMissing,
            Self::AllocationFailure { .. } => InitStatus::OutOfMemory,
            Self::PluginInitFailed { .. } | Self::InvalidState { .. } | Self::Json(_) => {
                InitStatus::PluginInitFailed
            }
        }
    }

    /// ABI status code reported for this failure.
    pub fn code(&self) -> i32 {
        match self {
            Self::PluginDirNotFound { .. } => IM_PLUGIN_DIR_NOT_FOUND,
            Self::PluginOpen { .. } | Self::IoAt { .. } => IM_PLUGIN_OPEN_FAILED,
            Self::PluginEntryMissing { .. } => IM_PLUGIN_ENTRY_MISSING,
            Self::PluginInitFailed { .. } => IM_PLUGIN_INIT_FAILED,
            Self::AllocationFailure { .. } => IM_ALLOCATION_FAILURE,
            Self::InvalidState { .. } | Self::Json(_) => IM_ERR_INTERNAL,
        }
    }
}
