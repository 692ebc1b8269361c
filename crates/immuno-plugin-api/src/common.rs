#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ImLogLevel {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Fatal = 5,
}

/// Immutable UTF-8 bytes. Not NUL-terminated.
///
/// A null `ptr` encodes an absent string, which is distinct from an empty one.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImStr {
    pub ptr: *const u8,
    pub len: usize,
}

impl ImStr {
    pub const fn null() -> Self {
        Self {
            ptr: core::ptr::null(),
            len: 0,
        }
    }

    pub const fn from_str(s: &str) -> Self {
        Self {
            ptr: s.as_ptr(),
            len: s.len(),
        }
    }

    pub fn from_option(s: Option<&str>) -> Self {
        s.map_or_else(Self::null, Self::from_str)
    }

    pub const fn is_null(&self) -> bool {
        self.ptr.is_null()
    }

    /// Borrows the bytes as UTF-8. `Ok(None)` for a null view.
    ///
    /// # Safety
    /// `ptr..ptr+len` must be readable for the returned lifetime.
    pub unsafe fn as_str<'a>(&self) -> Result<Option<&'a str>, core::str::Utf8Error> {
        if self.ptr.is_null() {
            return Ok(None);
        }
        if self.len == 0 {
            return Ok(Some(""));
        }
        let bytes = unsafe { core::slice::from_raw_parts(self.ptr, self.len) };
        core::str::from_utf8(bytes).map(Some)
    }
}

// Immutable byte view used across FFI boundaries. Callers are responsible for lifetime validity.
unsafe impl Send for ImStr {}
unsafe impl Sync for ImStr {}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImTypeKind {
    Bool = 1,
    I8 = 2,
    I16 = 3,
    I32 = 4,
    I64 = 5,
    U8 = 6,
    U16 = 7,
    U32 = 8,
    U64 = 9,
    F32 = 10,
    /// Non-negative `f32`.
    UF32 = 11,
    F64 = 12,
    /// Non-negative `f64`.
    UF64 = 13,
    Str = 14,
}

/// Tagged value crossing the boundary.
///
/// `bits` carries booleans as 0/1, signed integers sign-extended to `i64`, unsigned integers as
/// `u64` and every real kind as `f64` bits. `text` is only meaningful for [`ImTypeKind::Str`].
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImValue {
    pub kind: ImTypeKind,
    pub bits: u64,
    pub text: ImStr,
}

impl ImValue {
    pub const fn bool(value: bool) -> Self {
        Self {
            kind: ImTypeKind::Bool,
            bits: value as u64,
            text: ImStr::null(),
        }
    }

    pub const fn signed(kind: ImTypeKind, value: i64) -> Self {
        Self {
            kind,
            bits: value as u64,
            text: ImStr::null(),
        }
    }

    pub const fn unsigned(kind: ImTypeKind, value: u64) -> Self {
        Self {
            kind,
            bits: value,
            text: ImStr::null(),
        }
    }

    pub fn real(kind: ImTypeKind, value: f64) -> Self {
        Self {
            kind,
            bits: value.to_bits(),
            text: ImStr::null(),
        }
    }

    pub const fn text(text: ImStr) -> Self {
        Self {
            kind: ImTypeKind::Str,
            bits: 0,
            text,
        }
    }

    pub const fn as_bool(&self) -> bool {
        self.bits != 0
    }

    pub const fn as_i64(&self) -> i64 {
        self.bits as i64
    }

    pub const fn as_u64(&self) -> u64 {
        self.bits
    }

    pub fn as_f64(&self) -> f64 {
        f64::from_bits(self.bits)
    }
}

unsafe impl Send for ImValue {}
unsafe impl Sync for ImValue {}

/// Plugin identity handed over once at registration. The host copies every field.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImMetadata {
    pub name: ImStr,
    pub version: ImStr,
    pub description: ImStr,
    pub author: ImStr,
}

unsafe impl Send for ImMetadata {}
unsafe impl Sync for ImMetadata {}
