use core::ffi::c_void;

use immuno_plugin_api::{
    ImLogLevel, ImMetadata, ImModuleCallback, ImModuleHandle, ImSettingDecl, ImSettingHandle,
    ImSettingInfo, ImStoreHandle, ImStr, ImTypeKind, ImValue,
};

use crate::error::{SdkError, SdkResult};
use crate::host::{allocate_storage, host_call, host_log};
use crate::metadata::ModuleMetadata;
use crate::store::StoreHandle;

/// Fixed-width Rust types a setting can be read or written as.
pub trait SettingPrimitive: Copy + sealed::Sealed {
    const KIND: ImTypeKind;

    fn to_value(self) -> ImValue;

    fn from_value(value: &ImValue) -> Self;

    fn to_ne_bytes(self) -> Vec<u8>;
}

mod sealed {
    pub trait Sealed {}
}

impl sealed::Sealed for bool {}

impl SettingPrimitive for bool {
    const KIND: ImTypeKind = ImTypeKind::Bool;

    fn to_value(self) -> ImValue {
        ImValue::bool(self)
    }

    fn from_value(value: &ImValue) -> Self {
        value.as_bool()
    }

    fn to_ne_bytes(self) -> Vec<u8> {
        vec![u8::from(self)]
    }
}

macro_rules! primitive {
    ($($ty:ty => $kind:ident, $ctor:ident, $as:ident;)*) => {
        $(
            impl sealed::Sealed for $ty {}

            impl SettingPrimitive for $ty {
                const KIND: ImTypeKind = ImTypeKind::$kind;

                fn to_value(self) -> ImValue {
                    ImValue::$ctor(Self::KIND, self.into())
                }

                // The host converts into `KIND` before answering, so the narrowing is exact.
                fn from_value(value: &ImValue) -> Self {
                    value.$as() as $ty
                }

                fn to_ne_bytes(self) -> Vec<u8> {
                    <$ty>::to_ne_bytes(self).to_vec()
                }
            }
        )*
    };
}

primitive! {
    i8 => I8, signed, as_i64;
    i16 => I16, signed, as_i64;
    i32 => I32, signed, as_i64;
    i64 => I64, signed, as_i64;
    u8 => U8, unsigned, as_u64;
    u16 => U16, unsigned, as_u64;
    u32 => U32, unsigned, as_u64;
    u64 => U64, unsigned, as_u64;
    f32 => F32, real, as_f64;
    f64 => F64, real, as_f64;
}

/// Owned copy of a setting's description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingInfo {
    pub kind: ImTypeKind,
    pub name: String,
    pub description: String,
    pub element_size: usize,
    pub count: usize,
    pub max: usize,
    pub resizable: bool,
}

/// This plugin's module, as issued by [`crate::register_module`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleHandle(ImModuleHandle);

impl ModuleHandle {
    pub const fn from_raw(raw: ImModuleHandle) -> Self {
        Self(raw)
    }

    pub const fn raw(&self) -> ImModuleHandle {
        self.0
    }

    pub fn log(&self, level: ImLogLevel, msg: &str) {
        host_log(level, msg);
    }

    pub fn metadata(&self) -> SdkResult<ModuleMetadata> {
        let mut out = ImMetadata {
            name: ImStr::null(),
            version: ImStr::null(),
            description: ImStr::null(),
            author: ImStr::null(),
        };
        host_call!("module_metadata", module_metadata, self.0, &mut out)?;
        // SAFETY: the host hands out views of metadata it keeps for the module's lifetime.
        unsafe {
            Ok(ModuleMetadata {
                name: owned(out.name)?,
                version: owned(out.version)?,
                description: owned(out.description)?,
                author: owned(out.author)?,
            })
        }
    }

    /// Runs `callback` once every store has loaded this module's settings.
    pub fn on_post_load(&self, callback: Option<ImModuleCallback>) -> SdkResult<()> {
        host_call!("module_set_post_load", module_set_post_load, self.0, callback)
    }

    /// Runs `callback` at shutdown, before the library's exit symbol.
    pub fn on_teardown(&self, callback: Option<ImModuleCallback>) -> SdkResult<()> {
        host_call!("module_set_teardown", module_set_teardown, self.0, callback)
    }

    /// Scalar setting in SDK-owned storage, starting at `initial`.
    pub fn register_scalar<T: SettingPrimitive>(
        &self,
        name: &str,
        description: &str,
        initial: T,
    ) -> SdkResult<SettingHandle> {
        self.register_scalar_as(T::KIND, name, description, initial)
    }

    /// Scalar setting stored as `kind`, which must have `T`'s width. Used for the
    /// non-negative real kinds.
    pub fn register_scalar_as<T: SettingPrimitive>(
        &self,
        kind: ImTypeKind,
        name: &str,
        description: &str,
        initial: T,
    ) -> SdkResult<SettingHandle> {
        let bytes = initial.to_ne_bytes();
        let backing = allocate_storage(bytes.len());
        // SAFETY: `backing` was just allocated with exactly `bytes.len()` bytes.
        unsafe { core::ptr::copy_nonoverlapping(bytes.as_ptr(), backing, bytes.len()) };
        // SAFETY: SDK-owned storage outlives the module.
        unsafe { self.register_raw(kind, name, description, backing.cast(), bytes.len(), 1) }
    }

    /// Fixed-capacity array in SDK-owned storage. It starts empty.
    pub fn register_array<T: SettingPrimitive>(
        &self,
        name: &str,
        description: &str,
        capacity: usize,
    ) -> SdkResult<SettingHandle> {
        let width = size_of::<T>();
        let len = width
            .checked_mul(capacity)
            .ok_or_else(|| SdkError::invalid_arg("array capacity overflows"))?;
        let backing = allocate_storage(len);
        // SAFETY: SDK-owned storage outlives the module.
        unsafe { self.register_raw(T::KIND, name, description, backing.cast(), width, capacity) }
    }

    /// Host-owned array that grows by one slot whenever a write lands at its end.
    pub fn register_growable(
        &self,
        kind: ImTypeKind,
        name: &str,
        description: &str,
        width: usize,
        initial_capacity: usize,
    ) -> SdkResult<SettingHandle> {
        // SAFETY: a null backing asks the host for its own storage.
        unsafe {
            self.register_raw(
                kind,
                name,
                description,
                core::ptr::null_mut(),
                width,
                initial_capacity,
            )
        }
    }

    /// Scalar string of at most `width - 1` bytes, starting at `initial`.
    pub fn register_string(
        &self,
        name: &str,
        description: &str,
        width: usize,
        initial: &str,
    ) -> SdkResult<SettingHandle> {
        if initial.len() >= width {
            return Err(SdkError::invalid_arg(format!(
                "initial value of `{name}` does not fit {width} bytes"
            )));
        }
        let backing = allocate_storage(width);
        // SAFETY: `backing` holds `width` zeroed bytes, more than `initial` needs.
        unsafe { core::ptr::copy_nonoverlapping(initial.as_ptr(), backing, initial.len()) };
        // SAFETY: SDK-owned storage outlives the module.
        unsafe {
            self.register_raw(ImTypeKind::Str, name, description, backing.cast(), width, 1)
        }
    }

    /// Registers a setting over caller-provided memory.
    ///
    /// # Safety
    /// `backing` must be null or point at `element_size * max` bytes that stay valid, and are
    /// only accessed through the host, until the module is unloaded.
    pub unsafe fn register_raw(
        &self,
        kind: ImTypeKind,
        name: &str,
        description: &str,
        backing: *mut c_void,
        element_size: usize,
        max: usize,
    ) -> SdkResult<SettingHandle> {
        let decl = ImSettingDecl {
            kind,
            name: ImStr::from_str(name),
            description: ImStr::from_str(description),
            backing,
            element_size,
            max,
        };
        let mut out = ImSettingHandle::default();
        host_call!("register_setting", register_setting, self.0, &decl, &mut out)?;
        Ok(SettingHandle(out))
    }

    pub fn find(&self, name: &str) -> SdkResult<Option<SettingHandle>> {
        let mut out = ImSettingHandle::default();
        match host_call!("setting_find", setting_find, self.0, ImStr::from_str(name), &mut out) {
            Ok(()) => Ok(Some(SettingHandle(out))),
            Err(error) if error.is_not_found() => Ok(None),
            Err(error) => Err(error),
        }
    }

    /// Every setting of this module in registration order. Uses the module's cursor.
    pub fn settings(&self) -> SdkResult<Vec<SettingHandle>> {
        host_call!("setting_rewind", setting_rewind, self.0)?;
        let mut settings = Vec::new();
        loop {
            let mut out = ImSettingHandle::default();
            match host_call!("setting_read", setting_read, self.0, &mut out) {
                Ok(()) => settings.push(SettingHandle(out)),
                Err(error) if error.is_end_of_sequence() => return Ok(settings),
                Err(error) => return Err(error),
            }
        }
    }

    pub fn register_store(&self) -> SdkResult<StoreHandle> {
        let mut out = ImStoreHandle::default();
        host_call!("register_store", register_store, self.0, &mut out)?;
        Ok(StoreHandle::from_raw(out))
    }
}

/// One registered setting. Valid for as long as its module is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SettingHandle(ImSettingHandle);

impl SettingHandle {
    pub const fn from_raw(raw: ImSettingHandle) -> Self {
        Self(raw)
    }

    pub const fn raw(&self) -> ImSettingHandle {
        self.0
    }

    pub fn info(&self) -> SdkResult<SettingInfo> {
        let mut out = ImSettingInfo::default();
        host_call!("setting_info", setting_info, self.0, &mut out)?;
        // SAFETY: the host keeps the views alive while the module is loaded.
        unsafe {
            Ok(SettingInfo {
                kind: out.kind,
                name: owned(out.name)?,
                description: owned(out.description)?,
                element_size: out.element_size,
                count: out.count,
                max: out.max,
                resizable: out.resizable,
            })
        }
    }

    pub fn get<T: SettingPrimitive>(&self, index: usize) -> SdkResult<T> {
        let value = self.get_raw(index, T::KIND)?;
        Ok(T::from_value(&value))
    }

    /// Element `index` as text. Numeric settings are rendered by the host.
    pub fn get_string(&self, index: usize) -> SdkResult<String> {
        let value = self.get_raw(index, ImTypeKind::Str)?;
        // SAFETY: the view stays valid until the next write to this setting.
        unsafe { owned(value.text) }
    }

    pub fn get_raw(&self, index: usize, kind: ImTypeKind) -> SdkResult<ImValue> {
        let mut out = ImValue::bool(false);
        host_call!("setting_get", setting_get, self.0, index, kind, &mut out)?;
        Ok(out)
    }

    pub fn set<T: SettingPrimitive>(&self, index: usize, value: T) -> SdkResult<()> {
        self.set_raw(index, &value.to_value())
    }

    /// Writes text, or null when `value` is `None`. Numeric settings parse the text.
    pub fn set_string(&self, index: usize, value: Option<&str>) -> SdkResult<()> {
        self.set_raw(index, &ImValue::text(ImStr::from_option(value)))
    }

    pub fn set_raw(&self, index: usize, value: &ImValue) -> SdkResult<()> {
        host_call!("setting_set", setting_set, self.0, index, value)
    }

    /// Appends at the current count.
    pub fn push<T: SettingPrimitive>(&self, value: T) -> SdkResult<()> {
        let count = self.info()?.count;
        self.set(count, value)
    }

    pub fn resize(&self, max: usize) -> SdkResult<()> {
        host_call!("setting_resize", setting_resize, self.0, max)
    }

    pub fn set_range<T: SettingPrimitive>(&self, min: T, max: T) -> SdkResult<()> {
        let (min, max) = (min.to_value(), max.to_value());
        host_call!("setting_set_range", setting_set_range, self.0, &min, &max)
    }

    pub fn set_null_permitted(&self, permitted: bool) -> SdkResult<()> {
        host_call!("setting_set_null_permitted", setting_set_null_permitted, self.0, permitted)
    }

    pub fn set_allow_list(&self, items: &[&str]) -> SdkResult<()> {
        let views: Vec<ImStr> = items.iter().map(|item| ImStr::from_str(item)).collect();
        let (items, count) = (views.as_ptr(), views.len());
        host_call!("setting_set_allow_list", setting_set_allow_list, self.0, items, count)
    }
}

/// # Safety
/// `s` must be null or readable for the duration of the call.
unsafe fn owned(s: ImStr) -> SdkResult<String> {
    Ok(unsafe { s.as_str() }?.unwrap_or_default().to_owned())
}
