//! Panic containment for code the host calls.
//!
//! A panic must never unwind into the host. Wrap the body of every hand-written hook
//! (`on_post_load`, `on_teardown`, store hooks) in one of these; [`crate::export_plugin!`]
//! already does so for the entry points.

use std::any::Any;
use std::backtrace::Backtrace;
use std::panic::{AssertUnwindSafe, catch_unwind};

use immuno_plugin_api::{IM_ERR_INTERNAL, ImLogLevel};

use crate::host_log;

pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&'static str>()
        .map(|msg| (*msg).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panic payload is not a string".to_owned())
}

/// Runs `f`, returning `fallback` if it panics. The panic is logged through the host.
pub fn guard_with_default<T>(hook: &'static str, fallback: T, f: impl FnOnce() -> T) -> T {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        // Empty unless RUST_BACKTRACE is set.
        let backtrace = Backtrace::capture();
        host_log(
            ImLogLevel::Fatal,
            &format!("`{hook}` panicked: {}\n{backtrace}", panic_message(&*payload)),
        );
        fallback
    })
}

/// For hooks that report a status. A panic becomes `IM_ERR_INTERNAL`.
pub fn guard_status(hook: &'static str, f: impl FnOnce() -> i32) -> i32 {
    guard_with_default(hook, IM_ERR_INTERNAL, f)
}

pub fn guard_void(hook: &'static str, f: impl FnOnce()) {
    guard_with_default(hook, (), f);
}
