//! Plugin-side SDK for the immuno runtime.
//!
//! A plugin exports its entry points with [`export_plugin!`], registers its module with
//! [`register_module`] from the initializer and then declares settings and stores through the
//! returned [`ModuleHandle`].

pub use immuno_plugin_api::*;

mod error;
mod export;
pub mod ffi_guard;
mod host;
mod metadata;
mod setting;
mod store;

pub use error::{SdkError, SdkResult};
pub use host::{__bind_host, __release_storage, host_log, is_host_bound, register_module};
pub use metadata::{ModuleMetadata, PluginInfo};
pub use setting::{ModuleHandle, SettingHandle, SettingInfo, SettingPrimitive};
pub use store::StoreHandle;

#[doc(hidden)]
pub use export::__init_status;

#[cfg(test)]
mod tests;
