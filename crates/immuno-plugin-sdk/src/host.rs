use core::sync::atomic::{AtomicPtr, AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};

use immuno_plugin_api::{IM_OK, ImHostVTable, ImLogLevel, ImModuleHandle, ImStr};

use crate::error::{SdkError, SdkResult};
use crate::metadata::PluginInfo;
use crate::setting::ModuleHandle;

static HOST_VTABLE: AtomicPtr<ImHostVTable> = AtomicPtr::new(core::ptr::null_mut());
/// Module this library registered, `0` before registration.
static MODULE: AtomicU32 = AtomicU32::new(0);
/// Backing memory of the settings declared with SDK-owned storage.
static STORAGE: Mutex<Vec<Box<[u8]>>> = Mutex::new(Vec::new());

/// Calls one vtable slot and maps its status onto [`SdkResult`].
macro_rules! host_call {
    ($op:literal, $slot:ident $(, $arg:expr)*) => {{
        let host = $crate::host::host()?;
        let callback = host.$slot.ok_or($crate::SdkError::Unsupported($op))?;
        $crate::host::check($op, callback(host.user_data $(, $arg)*))
    }};
}

pub(crate) use host_call;

#[doc(hidden)]
pub unsafe fn __bind_host(host: *const ImHostVTable) {
    HOST_VTABLE.store(host as *mut ImHostVTable, Ordering::Release);
}

/// Frees SDK-owned setting storage and forgets the host. Called after the plugin's own exit,
/// or when its initializer fails since the host then unloads it without calling exit.
#[doc(hidden)]
pub fn __release_storage() {
    STORAGE
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clear();
    MODULE.store(0, Ordering::Release);
    HOST_VTABLE.store(core::ptr::null_mut(), Ordering::Release);
}

pub fn is_host_bound() -> bool {
    !HOST_VTABLE.load(Ordering::Acquire).is_null()
}

pub(crate) fn host() -> SdkResult<&'static ImHostVTable> {
    let host = HOST_VTABLE.load(Ordering::Acquire);
    // SAFETY: the host keeps the vtable alive for as long as this library is loaded.
    unsafe { host.as_ref() }.ok_or(SdkError::HostUnavailable)
}

pub(crate) fn check(op: &'static str, code: i32) -> SdkResult<()> {
    if code == IM_OK {
        Ok(())
    } else {
        Err(SdkError::Host { op, code })
    }
}

/// Log a message to the host on behalf of this plugin's module.
///
/// This is purely best-effort: without a bound host this is a no-op.
pub fn host_log(level: ImLogLevel, msg: &str) {
    let Ok(host) = host() else {
        return;
    };
    let Some(cb) = host.log_utf8 else {
        return;
    };
    let module = ImModuleHandle {
        id: MODULE.load(Ordering::Acquire),
    };
    cb(host.user_data, module, level, ImStr::from_str(msg));
}

/// Registers this plugin's module. Call exactly once, from the initializer.
pub fn register_module(info: &PluginInfo) -> SdkResult<ModuleHandle> {
    if info.name.is_empty() {
        return Err(SdkError::invalid_arg("plugin name must not be empty"));
    }
    let metadata = info.to_raw();
    let mut out = ImModuleHandle::default();
    host_call!("register_module", register_module, &metadata, &mut out)?;
    MODULE.store(out.id, Ordering::Release);
    Ok(ModuleHandle::from_raw(out))
}

#[cfg(test)]
pub(crate) fn storage_blocks() -> usize {
    STORAGE.lock().unwrap_or_else(PoisonError::into_inner).len()
}

/// Zeroed SDK-owned storage of `len` bytes, alive until [`__release_storage`].
pub(crate) fn allocate_storage(len: usize) -> *mut u8 {
    let mut block = vec![0u8; len].into_boxed_slice();
    let ptr = block.as_mut_ptr();
    STORAGE
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push(block);
    ptr
}
