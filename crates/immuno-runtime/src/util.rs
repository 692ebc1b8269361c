use immuno_plugin_api::ImStr;

/// # Safety
/// `s` must be null or point at `len` readable bytes.
pub(crate) unsafe fn imstr_to_string_lossy(s: ImStr) -> String {
    if s.ptr.is_null() || s.len == 0 {
        return String::new();
    }
    let bytes = unsafe { core::slice::from_raw_parts(s.ptr, s.len) };
    String::from_utf8_lossy(bytes).into_owned()
}

/// Writes through an out-pointer supplied by a plugin. Returns `false` for null.
///
/// # Safety
/// `out` must be null or valid for a write of `T`.
pub(crate) unsafe fn write_out<T>(out: *mut T, value: T) -> bool {
    if out.is_null() {
        return false;
    }
    unsafe { out.write(value) };
    true
}
