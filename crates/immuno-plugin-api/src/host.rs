use core::ffi::c_void;

use crate::{ImLogLevel, ImMetadata, ImStr, ImTypeKind, ImValue};

/// Module handle. `id == 0` is never issued.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ImModuleHandle {
    pub id: u32,
}

/// Setting handle, scoped to its owning module. `module == 0` is never issued.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ImSettingHandle {
    pub module: u32,
    pub slot: u32,
}

/// Setting store handle. `id == 0` is never issued.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ImStoreHandle {
    pub id: u32,
}

/// Setting declaration passed to `register_setting`.
///
/// A null `backing` asks the host to own growable storage; otherwise `backing` must point at
/// `element_size * max` writable bytes that outlive the module. For numeric kinds
/// `element_size` must equal the kind's width; for strings it is the byte width of one element
/// including the NUL terminator.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ImSettingDecl {
    pub kind: ImTypeKind,
    pub name: ImStr,
    pub description: ImStr,
    pub backing: *mut c_void,
    pub element_size: usize,
    pub max: usize,
}

/// Host-owned description of a setting. Strings stay valid while the module is loaded.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ImSettingInfo {
    pub kind: ImTypeKind,
    pub name: ImStr,
    pub description: ImStr,
    pub element_size: usize,
    pub count: usize,
    pub max: usize,
    pub resizable: bool,
}

impl Default for ImSettingInfo {
    fn default() -> Self {
        Self {
            kind: ImTypeKind::Bool,
            name: ImStr::null(),
            description: ImStr::null(),
            element_size: 0,
            count: 0,
            max: 0,
            resizable: false,
        }
    }
}

pub type ImModuleCallback = extern "C" fn(module: ImModuleHandle);
pub type ImStoreModuleHook = extern "C" fn(store: ImStoreHandle, module: ImModuleHandle);
/// Returns `IM_OK` once the medium is flushed.
pub type ImStoreDumpHook = extern "C" fn(store: ImStoreHandle) -> i32;

/// Registration primitives the host hands to a plugin before its initializer runs.
///
/// Every slot returning `i32` answers with one of the `IM_*` status codes. String values written
/// through `setting_get` point into host storage and are invalidated by the next `setting_set`
/// or `setting_resize` on the same setting.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ImHostVTable {
    pub api_version: u32,
    pub user_data: *mut c_void,
    pub log_utf8: Option<
        extern "C" fn(
            user_data: *mut c_void,
            module: ImModuleHandle,
            level: ImLogLevel,
            msg: ImStr,
        ),
    >,

    pub register_module: Option<
        extern "C" fn(
            user_data: *mut c_void,
            metadata: *const ImMetadata,
            out_module: *mut ImModuleHandle,
        ) -> i32,
    >,
    /// Writes host-owned views of the module identity.
    pub module_metadata: Option<
        extern "C" fn(
            user_data: *mut c_void,
            module: ImModuleHandle,
            out_metadata: *mut ImMetadata,
        ) -> i32,
    >,
    pub module_set_post_load: Option<
        extern "C" fn(
            user_data: *mut c_void,
            module: ImModuleHandle,
            callback: Option<ImModuleCallback>,
        ) -> i32,
    >,
    pub module_set_teardown: Option<
        extern "C" fn(
            user_data: *mut c_void,
            module: ImModuleHandle,
            callback: Option<ImModuleCallback>,
        ) -> i32,
    >,

    pub register_setting: Option<
        extern "C" fn(
            user_data: *mut c_void,
            module: ImModuleHandle,
            decl: *const ImSettingDecl,
            out_setting: *mut ImSettingHandle,
        ) -> i32,
    >,
    pub setting_rewind: Option<extern "C" fn(user_data: *mut c_void, module: ImModuleHandle) -> i32>,
    /// `IM_END_OF_SEQUENCE` once every setting has been read.
    pub setting_read: Option<
        extern "C" fn(
            user_data: *mut c_void,
            module: ImModuleHandle,
            out_setting: *mut ImSettingHandle,
        ) -> i32,
    >,
    pub setting_find: Option<
        extern "C" fn(
            user_data: *mut c_void,
            module: ImModuleHandle,
            name: ImStr,
            out_setting: *mut ImSettingHandle,
        ) -> i32,
    >,
    pub setting_info: Option<
        extern "C" fn(
            user_data: *mut c_void,
            setting: ImSettingHandle,
            out_info: *mut ImSettingInfo,
        ) -> i32,
    >,
    pub setting_get: Option<
        extern "C" fn(
            user_data: *mut c_void,
            setting: ImSettingHandle,
            index: usize,
            kind: ImTypeKind,
            out_value: *mut ImValue,
        ) -> i32,
    >,
    pub setting_set: Option<
        extern "C" fn(
            user_data: *mut c_void,
            setting: ImSettingHandle,
            index: usize,
            value: *const ImValue,
        ) -> i32,
    >,
    pub setting_resize: Option<
        extern "C" fn(user_data: *mut c_void, setting: ImSettingHandle, max: usize) -> i32,
    >,
    pub setting_set_range: Option<
        extern "C" fn(
            user_data: *mut c_void,
            setting: ImSettingHandle,
            min: *const ImValue,
            max: *const ImValue,
        ) -> i32,
    >,
    pub setting_set_null_permitted: Option<
        extern "C" fn(user_data: *mut c_void, setting: ImSettingHandle, permitted: bool) -> i32,
    >,
    /// Copies `count` entries. A zero count clears the allow-list.
    pub setting_set_allow_list: Option<
        extern "C" fn(
            user_data: *mut c_void,
            setting: ImSettingHandle,
            items: *const ImStr,
            count: usize,
        ) -> i32,
    >,

    pub register_store: Option<
        extern "C" fn(
            user_data: *mut c_void,
            provider: ImModuleHandle,
            out_store: *mut ImStoreHandle,
        ) -> i32,
    >,
    pub store_set_load: Option<
        extern "C" fn(
            user_data: *mut c_void,
            store: ImStoreHandle,
            hook: Option<ImStoreModuleHook>,
        ) -> i32,
    >,
    pub store_set_save: Option<
        extern "C" fn(
            user_data: *mut c_void,
            store: ImStoreHandle,
            hook: Option<ImStoreModuleHook>,
        ) -> i32,
    >,
    pub store_set_dump: Option<
        extern "C" fn(
            user_data: *mut c_void,
            store: ImStoreHandle,
            hook: Option<ImStoreDumpHook>,
        ) -> i32,
    >,
    pub store_mark_pending:
        Option<extern "C" fn(user_data: *mut c_void, store: ImStoreHandle) -> i32>,
}

// Raw pointers make this not auto-Send/Sync. The vtable is immutable once handed out and the
// host only calls into plugins from the thread that owns the registry.
unsafe impl Send for ImHostVTable {}
unsafe impl Sync for ImHostVTable {}
