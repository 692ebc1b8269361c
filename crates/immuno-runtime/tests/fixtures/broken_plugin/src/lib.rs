//! A library in the plugin directory that never exports an initializer.

#[unsafe(no_mangle)]
pub extern "C" fn immuno_plugin_api_version() -> u32 {
    1
}
