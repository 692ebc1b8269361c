#![allow(clippy::missing_safety_doc)]

mod common;
mod host;

pub use common::*;
pub use host::*;

// Single in-development ABI version. Bumped whenever a vtable slot or layout changes.
pub const IMMUNO_PLUGIN_API_VERSION: u32 = 1;

/// Required. `extern "C" fn() -> i32`, zero on success.
pub const IMMUNO_PLUGIN_INIT_SYMBOL: &str = "immuno_plugin_init";
/// Optional. `extern "C" fn()`, called once at shutdown before the library closes.
pub const IMMUNO_PLUGIN_EXIT_SYMBOL: &str = "immuno_plugin_exit";
/// Optional. `extern "C" fn(*const ImHostVTable)`, called right before the initializer.
pub const IMMUNO_PLUGIN_BIND_HOST_SYMBOL: &str = "immuno_plugin_bind_host";

pub type ImPluginInit = unsafe extern "C" fn() -> i32;
pub type ImPluginExit = unsafe extern "C" fn();
pub type ImPluginBindHost = unsafe extern "C" fn(host: *const ImHostVTable);

// Value validation outcomes, ordered by severity.
pub const IM_OK: i32 = 0;
pub const IM_VALUE_NOT_FOUND: i32 = 1;
pub const IM_SET_NULL: i32 = 2;
pub const IM_SET_NEGATIVE: i32 = 3;
pub const IM_CAPACITY_CHANGE_REJECTED: i32 = 4;
pub const IM_OUT_OF_RANGE: i32 = 5;
pub const IM_INDEX_OUT_OF_BOUNDS: i32 = 6;
pub const IM_OVERFLOW: i32 = 7;
pub const IM_TYPE_MISMATCH: i32 = 8;
pub const IM_ALLOCATION_FAILURE: i32 = 9;

// Host call outcomes.
pub const IM_END_OF_SEQUENCE: i32 = 10;
pub const IM_ERR_INVALID_HANDLE: i32 = 11;
pub const IM_ERR_INVALID_ARG: i32 = 12;
pub const IM_ERR_HOST_UNAVAILABLE: i32 = 13;
pub const IM_ERR_INTERNAL: i32 = 14;

// Startup outcomes reported by the plugin manager.
pub const IM_PLUGIN_DIR_NOT_FOUND: i32 = 20;
pub const IM_PLUGIN_OPEN_FAILED: i32 = 21;
pub const IM_PLUGIN_ENTRY_MISSING: i32 = 22;
pub const IM_PLUGIN_INIT_FAILED: i32 = 23;
