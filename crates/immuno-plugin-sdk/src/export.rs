use immuno_plugin_api::{IM_OK, ImLogLevel};

use crate::error::SdkResult;
use crate::host::{__release_storage, host_log};

/// Status the exported initializer reports for `result`. A failed initializer gets no exit
/// call, so the storage it allocated is released here.
#[doc(hidden)]
pub fn __init_status(result: SdkResult<()>) -> i32 {
    match result {
        Ok(()) => IM_OK,
        Err(error) => {
            host_log(ImLogLevel::Error, &format!("plugin initialization failed: {error}"));
            __release_storage();
            error.code()
        }
    }
}

/// Emits the plugin's ABI symbols.
///
/// `init` is a `fn() -> SdkResult<()>` that registers the module and its settings. The optional
/// `exit` is a `fn()` run at shutdown, before the SDK releases the storage it allocated for
/// settings.
///
/// ```ignore
/// fn init() -> SdkResult<()> {
///     let module = register_module(&INFO)?;
///     module.register_scalar("det_n", "detector count", 200i32)?;
///     Ok(())
/// }
///
/// immuno_plugin_sdk::export_plugin! { init: init }
/// ```
#[macro_export]
macro_rules! export_plugin {
    (init: $init:path $(, exit: $exit:path)? $(,)?) => {
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn immuno_plugin_bind_host(host: *const $crate::ImHostVTable) {
            $crate::ffi_guard::guard_void("immuno_plugin_bind_host", || unsafe {
                $crate::__bind_host(host)
            });
        }

        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn immuno_plugin_init() -> i32 {
            $crate::ffi_guard::guard_status("immuno_plugin_init", || {
                $crate::__init_status($init())
            })
        }

        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn immuno_plugin_exit() {
            $crate::ffi_guard::guard_void("immuno_plugin_exit", || {
                $( $exit(); )?
                $crate::__release_storage();
            });
        }
    };
}
