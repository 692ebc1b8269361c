//! Host vtable handed to plugins and the translation of its calls into registry operations.

use std::cell::{Cell, RefCell};
use std::ffi::c_void;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::ptr;

use immuno_plugin_api::{
    IM_END_OF_SEQUENCE, IM_ERR_HOST_UNAVAILABLE, IM_ERR_INTERNAL, IM_ERR_INVALID_ARG,
    IM_ERR_INVALID_HANDLE, IM_OK, IM_VALUE_NOT_FOUND, IMMUNO_PLUGIN_API_VERSION, ImHostVTable,
    ImLogLevel, ImMetadata, ImModuleCallback, ImModuleHandle, ImSettingDecl, ImSettingHandle,
    ImSettingInfo, ImStoreDumpHook, ImStoreHandle, ImStoreModuleHook, ImStr, ImTypeKind, ImValue,
};

use crate::diagnostics::{DiagnosticsSink, TracingSink};
use crate::registry::{Metadata, ModuleHook, ModuleId, Registry, SettingId, StoreId};
use crate::status::ValueError;
use crate::types::{TypeCategory, TypeDescriptor, TypeKind, until_nul};
use crate::util::{imstr_to_string_lossy, write_out};
use crate::value::Value;
use crate::variable::{Backing, ExternalBuffer, VariableDecl};

/// State behind the vtable's `user_data`.
pub(crate) struct HostContext {
    registry: Cell<*mut Registry>,
    /// Backs text rendered from non-string settings until the next `setting_get`.
    scratch: RefCell<String>,
}

impl HostContext {
    /// Publishes `registry` to plugin callbacks for the duration of `f`.
    pub(crate) fn enter<R>(&self, registry: &mut Registry, f: impl FnOnce() -> R) -> R {
        struct Restore<'a> {
            cell: &'a Cell<*mut Registry>,
            previous: *mut Registry,
        }

        impl Drop for Restore<'_> {
            fn drop(&mut self) {
                self.cell.set(self.previous);
            }
        }

        let previous = self.registry.replace(registry);
        let _restore = Restore {
            cell: &self.registry,
            previous,
        };
        f()
    }
}

/// Owns the host vtable and its context at stable addresses.
pub(crate) struct HostBridge {
    context: Box<HostContext>,
    vtable: Box<ImHostVTable>,
}

impl HostBridge {
    pub(crate) fn new() -> Self {
        let context = Box::new(HostContext {
            registry: Cell::new(ptr::null_mut()),
            scratch: RefCell::new(String::new()),
        });
        let mut vtable = Box::new(host_vtable());
        vtable.user_data = (&*context) as *const HostContext as *mut c_void;
        Self { context, vtable }
    }

    pub(crate) fn vtable(&self) -> *const ImHostVTable {
        &*self.vtable
    }

    pub(crate) fn enter<R>(&self, registry: &mut Registry, f: impl FnOnce() -> R) -> R {
        self.context.enter(registry, f)
    }
}

fn host_vtable() -> ImHostVTable {
    ImHostVTable {
        api_version: IMMUNO_PLUGIN_API_VERSION,
        user_data: ptr::null_mut(),
        log_utf8: Some(host_log),
        register_module: Some(host_register_module),
        module_metadata: Some(host_module_metadata),
        module_set_post_load: Some(host_module_set_post_load),
        module_set_teardown: Some(host_module_set_teardown),
        register_setting: Some(host_register_setting),
        setting_rewind: Some(host_setting_rewind),
        setting_read: Some(host_setting_read),
        setting_find: Some(host_setting_find),
        setting_info: Some(host_setting_info),
        setting_get: Some(host_setting_get),
        setting_set: Some(host_setting_set),
        setting_resize: Some(host_setting_resize),
        setting_set_range: Some(host_setting_set_range),
        setting_set_null_permitted: Some(host_setting_set_null_permitted),
        setting_set_allow_list: Some(host_setting_set_allow_list),
        register_store: Some(host_register_store),
        store_set_load: Some(host_store_set_load),
        store_set_save: Some(host_store_set_save),
        store_set_dump: Some(host_store_set_dump),
        store_mark_pending: Some(host_store_mark_pending),
    }
}

pub(crate) fn module_handle(id: ModuleId) -> ImModuleHandle {
    ImModuleHandle { id: id.0 + 1 }
}

pub(crate) fn module_id(handle: ImModuleHandle) -> Option<ModuleId> {
    handle.id.checked_sub(1).map(ModuleId)
}

pub(crate) fn setting_handle(id: SettingId) -> ImSettingHandle {
    ImSettingHandle {
        module: id.module.0 + 1,
        slot: id.slot,
    }
}

pub(crate) fn setting_id(handle: ImSettingHandle) -> Option<SettingId> {
    Some(SettingId {
        module: module_id(ImModuleHandle { id: handle.module })?,
        slot: handle.slot,
    })
}

pub(crate) fn store_handle(id: StoreId) -> ImStoreHandle {
    ImStoreHandle { id: id.0 + 1 }
}

pub(crate) fn store_id(handle: ImStoreHandle) -> Option<StoreId> {
    handle.id.checked_sub(1).map(StoreId)
}

fn status_of(result: Result<(), ValueError>) -> i32 {
    result.map_or_else(ValueError::code, |()| IM_OK)
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        return (*msg).to_string();
    }
    if let Some(msg) = payload.downcast_ref::<String>() {
        return msg.clone();
    }
    "non-string panic payload".to_string()
}

/// Resolves the live registry behind `user_data` and runs `f`, converting panics to
/// `IM_ERR_INTERNAL`.
fn with_registry(
    user_data: *mut c_void,
    op: &'static str,
    f: impl FnOnce(&HostContext, &mut Registry) -> i32,
) -> i32 {
    match catch_unwind(AssertUnwindSafe(|| {
        // SAFETY: `user_data` is the boxed context installed by `HostBridge::new`.
        let Some(context) = (unsafe { (user_data as *const HostContext).as_ref() }) else {
            return IM_ERR_HOST_UNAVAILABLE;
        };
        let registry = context.registry.get();
        if registry.is_null() {
            return IM_ERR_HOST_UNAVAILABLE;
        }
        // SAFETY: set by `HostContext::enter` for the duration of the plugin call that reached
        // here; the caller's borrow is not used until that call returns.
        f(context, unsafe { &mut *registry })
    })) {
        Ok(status) => status,
        Err(payload) => {
            tracing::error!(op, "panic in host callback: {}", panic_message(payload));
            IM_ERR_INTERNAL
        }
    }
}

extern "C" fn host_log(
    user_data: *mut c_void,
    module: ImModuleHandle,
    level: ImLogLevel,
    msg: ImStr,
) {
    // SAFETY: plugins pass a readable UTF-8 view.
    let text = unsafe { imstr_to_string_lossy(msg) };
    let status = with_registry(user_data, "log", |_, registry| {
        registry.log(module_id(module), level.into(), format_args!("{text}"));
        IM_OK
    });
    if status == IM_ERR_HOST_UNAVAILABLE {
        TracingSink.puts("plugin", level.into(), &text);
    }
}

extern "C" fn host_register_module(
    user_data: *mut c_void,
    metadata: *const ImMetadata,
    out_module: *mut ImModuleHandle,
) -> i32 {
    with_registry(user_data, "register_module", |_, registry| {
        // SAFETY: null or a valid metadata record owned by the plugin for this call.
        let Some(metadata) = (unsafe { metadata.as_ref() }) else {
            return IM_ERR_INVALID_ARG;
        };
        // SAFETY: metadata strings are readable views supplied by the plugin.
        let metadata = unsafe {
            Metadata {
                name: imstr_to_string_lossy(metadata.name),
                version: imstr_to_string_lossy(metadata.version),
                description: imstr_to_string_lossy(metadata.description),
                author: imstr_to_string_lossy(metadata.author),
            }
        };
        if metadata.name.is_empty() || out_module.is_null() {
            return IM_ERR_INVALID_ARG;
        }
        match registry.register_module(metadata) {
            Ok(id) => {
                // SAFETY: checked non-null above.
                unsafe { write_out(out_module, module_handle(id)) };
                IM_OK
            }
            Err(error) => error.code(),
        }
    })
}

extern "C" fn host_module_metadata(
    user_data: *mut c_void,
    module: ImModuleHandle,
    out_metadata: *mut ImMetadata,
) -> i32 {
    with_registry(user_data, "module_metadata", |_, registry| {
        let Some(metadata) = module_id(module).and_then(|id| registry.metadata(id)) else {
            return IM_ERR_INVALID_HANDLE;
        };
        let view = ImMetadata {
            name: ImStr::from_str(&metadata.name),
            version: ImStr::from_str(&metadata.version),
            description: ImStr::from_str(&metadata.description),
            author: ImStr::from_str(&metadata.author),
        };
        // SAFETY: null or a writable out-pointer supplied by the plugin.
        if unsafe { write_out(out_metadata, view) } {
            IM_OK
        } else {
            IM_ERR_INVALID_ARG
        }
    })
}

fn module_hook(context: &HostContext, callback: ImModuleCallback) -> ModuleHook {
    let context = context as *const HostContext;
    Box::new(move |registry: &mut Registry, module: ModuleId| {
        // SAFETY: hooks live inside the registry, which the manager clears before dropping the
        // bridge that owns the context.
        let context = unsafe { &*context };
        context.enter(registry, || callback(module_handle(module)));
    })
}

extern "C" fn host_module_set_post_load(
    user_data: *mut c_void,
    module: ImModuleHandle,
    callback: Option<ImModuleCallback>,
) -> i32 {
    with_registry(user_data, "module_set_post_load", |context, registry| {
        let Some(id) = module_id(module) else {
            return IM_ERR_INVALID_HANDLE;
        };
        let hook = callback.map(|callback| module_hook(context, callback));
        status_of(registry.set_post_load(id, hook))
    })
}

extern "C" fn host_module_set_teardown(
    user_data: *mut c_void,
    module: ImModuleHandle,
    callback: Option<ImModuleCallback>,
) -> i32 {
    with_registry(user_data, "module_set_teardown", |context, registry| {
        let Some(id) = module_id(module) else {
            return IM_ERR_INVALID_HANDLE;
        };
        let hook = callback.map(|callback| module_hook(context, callback));
        status_of(registry.set_teardown(id, hook))
    })
}

extern "C" fn host_register_setting(
    user_data: *mut c_void,
    module: ImModuleHandle,
    decl: *const ImSettingDecl,
    out_setting: *mut ImSettingHandle,
) -> i32 {
    with_registry(user_data, "register_setting", |_, registry| {
        let Some(id) = module_id(module) else {
            return IM_ERR_INVALID_HANDLE;
        };
        // SAFETY: null or a valid declaration owned by the plugin for this call.
        let Some(decl) = (unsafe { decl.as_ref() }) else {
            return IM_ERR_INVALID_ARG;
        };
        if out_setting.is_null() {
            return IM_ERR_INVALID_ARG;
        }
        let kind = TypeKind::from(decl.kind);
        let descriptor = TypeDescriptor::of(kind);
        if descriptor.category != TypeCategory::String && decl.element_size != descriptor.size {
            return IM_ERR_INVALID_ARG;
        }
        let backing = if decl.backing.is_null() {
            Backing::Growable
        } else {
            let Some(len) = decl.element_size.checked_mul(decl.max) else {
                return IM_ERR_INVALID_ARG;
            };
            // SAFETY: the declaration contract requires `element_size * max` writable bytes that
            // outlive the module.
            match unsafe { ExternalBuffer::from_raw_parts(decl.backing.cast(), len) } {
                Some(buffer) => Backing::External(buffer),
                None => return IM_ERR_INVALID_ARG,
            }
        };
        // SAFETY: name and description are readable views supplied by the plugin.
        let (name, description) = unsafe {
            (
                imstr_to_string_lossy(decl.name),
                imstr_to_string_lossy(decl.description),
            )
        };
        if name.is_empty() {
            return IM_ERR_INVALID_ARG;
        }
        let decl = VariableDecl::new(kind, name, backing, decl.max)
            .description(description)
            .width(decl.element_size);
        match registry.register_setting(id, decl) {
            Ok(setting) => {
                // SAFETY: checked non-null above.
                unsafe { write_out(out_setting, setting_handle(setting)) };
                IM_OK
            }
            Err(error) => error.code(),
        }
    })
}

extern "C" fn host_setting_rewind(user_data: *mut c_void, module: ImModuleHandle) -> i32 {
    with_registry(user_data, "setting_rewind", |_, registry| {
        let Some(id) = module_id(module) else {
            return IM_ERR_INVALID_HANDLE;
        };
        status_of(registry.rewind(id))
    })
}

extern "C" fn host_setting_read(
    user_data: *mut c_void,
    module: ImModuleHandle,
    out_setting: *mut ImSettingHandle,
) -> i32 {
    with_registry(user_data, "setting_read", |_, registry| {
        let Some(id) = module_id(module).filter(|id| registry.contains_module(*id)) else {
            return IM_ERR_INVALID_HANDLE;
        };
        if out_setting.is_null() {
            return IM_ERR_INVALID_ARG;
        }
        match registry.read(id) {
            Some(setting) => {
                // SAFETY: checked non-null above.
                unsafe { write_out(out_setting, setting_handle(setting)) };
                IM_OK
            }
            None => IM_END_OF_SEQUENCE,
        }
    })
}

extern "C" fn host_setting_find(
    user_data: *mut c_void,
    module: ImModuleHandle,
    name: ImStr,
    out_setting: *mut ImSettingHandle,
) -> i32 {
    with_registry(user_data, "setting_find", |_, registry| {
        let Some(id) = module_id(module).filter(|id| registry.contains_module(*id)) else {
            return IM_ERR_INVALID_HANDLE;
        };
        // SAFETY: a readable view supplied by the plugin.
        let name = unsafe { imstr_to_string_lossy(name) };
        match registry.find_setting(id, &name) {
            // SAFETY: null or a writable out-pointer supplied by the plugin.
            Some(setting) if unsafe { write_out(out_setting, setting_handle(setting)) } => IM_OK,
            Some(_) => IM_ERR_INVALID_ARG,
            None => IM_VALUE_NOT_FOUND,
        }
    })
}

extern "C" fn host_setting_info(
    user_data: *mut c_void,
    setting: ImSettingHandle,
    out_info: *mut ImSettingInfo,
) -> i32 {
    with_registry(user_data, "setting_info", |_, registry| {
        let Some(setting) = setting_id(setting).and_then(|id| registry.setting(id)) else {
            return IM_ERR_INVALID_HANDLE;
        };
        let info = ImSettingInfo {
            kind: setting.descriptor().kind.into(),
            name: ImStr::from_str(setting.name()),
            description: ImStr::from_str(setting.description()),
            element_size: setting.element_size(),
            count: setting.count(),
            max: setting.max(),
            resizable: setting.is_resizable(),
        };
        // SAFETY: null or a writable out-pointer supplied by the plugin.
        if unsafe { write_out(out_info, info) } {
            IM_OK
        } else {
            IM_ERR_INVALID_ARG
        }
    })
}

fn to_im_value(value: &Value, kind: ImTypeKind) -> ImValue {
    match *value {
        Value::Bool(v) => ImValue::bool(v),
        Value::I8(v) => ImValue::signed(kind, v.into()),
        Value::I16(v) => ImValue::signed(kind, v.into()),
        Value::I32(v) => ImValue::signed(kind, v.into()),
        Value::I64(v) => ImValue::signed(kind, v),
        Value::U8(v) => ImValue::unsigned(kind, v.into()),
        Value::U16(v) => ImValue::unsigned(kind, v.into()),
        Value::U32(v) => ImValue::unsigned(kind, v.into()),
        Value::U64(v) => ImValue::unsigned(kind, v),
        Value::F32(v) => ImValue::real(kind, v.into()),
        Value::F64(v) => ImValue::real(kind, v),
        Value::Str(_) => ImValue::text(ImStr::null()),
    }
}

/// Widest host value for a plugin value. Destination checks happen in the variable.
///
/// # Safety
/// A string value's view must be readable.
unsafe fn from_im_value(value: &ImValue) -> Option<Value> {
    Some(match value.kind {
        ImTypeKind::Bool => Value::Bool(value.as_bool()),
        ImTypeKind::I8 | ImTypeKind::I16 | ImTypeKind::I32 | ImTypeKind::I64 => {
            Value::I64(value.as_i64())
        }
        ImTypeKind::U8 | ImTypeKind::U16 | ImTypeKind::U32 | ImTypeKind::U64 => {
            Value::U64(value.as_u64())
        }
        ImTypeKind::F32 | ImTypeKind::UF32 | ImTypeKind::F64 | ImTypeKind::UF64 => {
            Value::F64(value.as_f64())
        }
        ImTypeKind::Str => {
            let text = unsafe { value.text.as_str() }.ok()?;
            Value::Str(text.map(ToOwned::to_owned))
        }
    })
}

extern "C" fn host_setting_get(
    user_data: *mut c_void,
    setting: ImSettingHandle,
    index: usize,
    kind: ImTypeKind,
    out_value: *mut ImValue,
) -> i32 {
    with_registry(user_data, "setting_get", |context, registry| {
        let Some(id) = setting_id(setting) else {
            return IM_ERR_INVALID_HANDLE;
        };
        if out_value.is_null() {
            return IM_ERR_INVALID_ARG;
        }
        let value = match registry.get(id, index, kind.into()) {
            Ok(value) => value,
            Err(error) => return error.code(),
        };
        let out = if kind != ImTypeKind::Str {
            to_im_value(&value, kind)
        } else if let Some(element) = registry
            .setting(id)
            .filter(|s| s.descriptor().kind == TypeKind::Str)
            .and_then(|s| s.element(index).ok())
        {
            let bytes = until_nul(element);
            ImValue::text(ImStr {
                ptr: bytes.as_ptr(),
                len: bytes.len(),
            })
        } else {
            let mut scratch = context.scratch.borrow_mut();
            *scratch = value.render();
            ImValue::text(ImStr::from_str(&scratch))
        };
        // SAFETY: checked non-null above.
        unsafe { write_out(out_value, out) };
        IM_OK
    })
}

extern "C" fn host_setting_set(
    user_data: *mut c_void,
    setting: ImSettingHandle,
    index: usize,
    value: *const ImValue,
) -> i32 {
    with_registry(user_data, "setting_set", |_, registry| {
        let Some(id) = setting_id(setting) else {
            return IM_ERR_INVALID_HANDLE;
        };
        // SAFETY: null or a valid value owned by the plugin for this call.
        let value = unsafe { value.as_ref() }.and_then(|v| unsafe { from_im_value(v) });
        let Some(value) = value else {
            return IM_ERR_INVALID_ARG;
        };
        status_of(registry.set(id, index, value))
    })
}

extern "C" fn host_setting_resize(
    user_data: *mut c_void,
    setting: ImSettingHandle,
    max: usize,
) -> i32 {
    with_registry(user_data, "setting_resize", |_, registry| {
        let Some(id) = setting_id(setting) else {
            return IM_ERR_INVALID_HANDLE;
        };
        status_of(registry.resize(id, max))
    })
}

extern "C" fn host_setting_set_range(
    user_data: *mut c_void,
    setting: ImSettingHandle,
    min: *const ImValue,
    max: *const ImValue,
) -> i32 {
    with_registry(user_data, "setting_set_range", |_, registry| {
        let Some(id) = setting_id(setting) else {
            return IM_ERR_INVALID_HANDLE;
        };
        // SAFETY: null or valid values owned by the plugin for this call.
        let bounds = unsafe {
            min.as_ref()
                .and_then(|v| from_im_value(v))
                .zip(max.as_ref().and_then(|v| from_im_value(v)))
        };
        let Some((min, max)) = bounds else {
            return IM_ERR_INVALID_ARG;
        };
        status_of(registry.set_range(id, min, max))
    })
}

extern "C" fn host_setting_set_null_permitted(
    user_data: *mut c_void,
    setting: ImSettingHandle,
    permitted: bool,
) -> i32 {
    with_registry(user_data, "setting_set_null_permitted", |_, registry| {
        let Some(id) = setting_id(setting) else {
            return IM_ERR_INVALID_HANDLE;
        };
        status_of(registry.set_null_permitted(id, permitted))
    })
}

extern "C" fn host_setting_set_allow_list(
    user_data: *mut c_void,
    setting: ImSettingHandle,
    items: *const ImStr,
    count: usize,
) -> i32 {
    with_registry(user_data, "setting_set_allow_list", |_, registry| {
        let Some(id) = setting_id(setting) else {
            return IM_ERR_INVALID_HANDLE;
        };
        let items: Vec<String> = if count == 0 {
            Vec::new()
        } else if items.is_null() {
            return IM_ERR_INVALID_ARG;
        } else {
            // SAFETY: `items` points at `count` readable string views.
            unsafe { std::slice::from_raw_parts(items, count) }
                .iter()
                .map(|item| unsafe { imstr_to_string_lossy(*item) })
                .collect()
        };
        status_of(registry.set_allow_list(id, items))
    })
}

extern "C" fn host_register_store(
    user_data: *mut c_void,
    provider: ImModuleHandle,
    out_store: *mut ImStoreHandle,
) -> i32 {
    with_registry(user_data, "register_store", |_, registry| {
        let Some(id) = module_id(provider) else {
            return IM_ERR_INVALID_HANDLE;
        };
        if out_store.is_null() {
            return IM_ERR_INVALID_ARG;
        }
        match registry.register_store(id) {
            Ok(store) => {
                // SAFETY: checked non-null above.
                unsafe { write_out(out_store, store_handle(store)) };
                IM_OK
            }
            Err(error) => error.code(),
        }
    })
}

fn store_module_hook(
    context: &HostContext,
    hook: ImStoreModuleHook,
) -> crate::registry::StoreModuleHook {
    let context = context as *const HostContext;
    Box::new(move |registry: &mut Registry, store: StoreId, module: ModuleId| {
        // SAFETY: see `module_hook`.
        let context = unsafe { &*context };
        context.enter(registry, || hook(store_handle(store), module_handle(module)));
    })
}

extern "C" fn host_store_set_load(
    user_data: *mut c_void,
    store: ImStoreHandle,
    hook: Option<ImStoreModuleHook>,
) -> i32 {
    with_registry(user_data, "store_set_load", |context, registry| {
        let Some(id) = store_id(store) else {
            return IM_ERR_INVALID_HANDLE;
        };
        let hook = hook.map(|hook| store_module_hook(context, hook));
        status_of(registry.set_store_load(id, hook))
    })
}

extern "C" fn host_store_set_save(
    user_data: *mut c_void,
    store: ImStoreHandle,
    hook: Option<ImStoreModuleHook>,
) -> i32 {
    with_registry(user_data, "store_set_save", |context, registry| {
        let Some(id) = store_id(store) else {
            return IM_ERR_INVALID_HANDLE;
        };
        let hook = hook.map(|hook| store_module_hook(context, hook));
        status_of(registry.set_store_save(id, hook))
    })
}

extern "C" fn host_store_set_dump(
    user_data: *mut c_void,
    store: ImStoreHandle,
    hook: Option<ImStoreDumpHook>,
) -> i32 {
    with_registry(user_data, "store_set_dump", |context, registry| {
        let Some(id) = store_id(store) else {
            return IM_ERR_INVALID_HANDLE;
        };
        let context = context as *const HostContext;
        let hook = hook.map(|hook| -> crate::registry::StoreDumpHook {
            Box::new(move |registry: &mut Registry, store: StoreId| {
                // SAFETY: see `module_hook`.
                let context = unsafe { &*context };
                context.enter(registry, || hook(store_handle(store)) == IM_OK)
            })
        });
        status_of(registry.set_store_dump(id, hook))
    })
}

extern "C" fn host_store_mark_pending(user_data: *mut c_void, store: ImStoreHandle) -> i32 {
    with_registry(user_data, "store_mark_pending", |_, registry| {
        let Some(id) = store_id(store) else {
            return IM_ERR_INVALID_HANDLE;
        };
        status_of(registry.mark_store_pending(id))
    })
}

#[cfg(test)]
#[path = "tests/host_tests.rs"]
mod tests;
