use immuno_plugin_api::{ImStoreDumpHook, ImStoreHandle, ImStoreModuleHook};

use crate::error::SdkResult;
use crate::host::host_call;

/// A setting store provided by this plugin.
///
/// Hooks are plain `extern "C"` functions; wrap their bodies in
/// [`crate::ffi_guard::guard_void`] or [`crate::ffi_guard::guard_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StoreHandle(ImStoreHandle);

impl StoreHandle {
    pub const fn from_raw(raw: ImStoreHandle) -> Self {
        Self(raw)
    }

    pub const fn raw(&self) -> ImStoreHandle {
        self.0
    }

    /// Called once per module after every plugin has loaded.
    pub fn on_load(&self, hook: Option<ImStoreModuleHook>) -> SdkResult<()> {
        host_call!("store_set_load", store_set_load, self.0, hook)
    }

    /// Called once per module when the host saves settings.
    pub fn on_save(&self, hook: Option<ImStoreModuleHook>) -> SdkResult<()> {
        host_call!("store_set_save", store_set_save, self.0, hook)
    }

    /// Called when the store is pending and the host flushes stores.
    pub fn on_dump(&self, hook: Option<ImStoreDumpHook>) -> SdkResult<()> {
        host_call!("store_set_dump", store_set_dump, self.0, hook)
    }

    /// Requests a dump at the next flush.
    pub fn mark_pending(&self) -> SdkResult<()> {
        host_call!("store_mark_pending", store_mark_pending, self.0)
    }
}
