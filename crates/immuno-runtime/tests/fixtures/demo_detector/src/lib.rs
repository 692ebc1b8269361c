//! Negative-selection detector generator settings.

use immuno_plugin_sdk::{
    ImLogLevel, ImModuleHandle, ImTypeKind, ModuleHandle, PluginInfo, SdkError, SdkResult,
    export_plugin, ffi_guard, register_module,
};

const INFO: PluginInfo = PluginInfo::new("negsel", "0.1.0")
    .description("negative selection detector generator")
    .author("immuno");

fn init() -> SdkResult<()> {
    let module = register_module(&INFO)?;

    let det_n = module.register_scalar("det_n", "number of detectors to generate", 200i32)?;
    det_n.set_range(1i32, 1000i32)?;
    module.register_scalar_as(ImTypeKind::UF64, "radius", "matching radius", 0.1f64)?;
    let metric = module.register_string("metric", "affinity metric", 16, "hamming")?;
    metric.set_allow_list(&["hamming", "euclidean", "r-contiguous"])?;
    module.register_scalar(
        "effective_det_n",
        "detector count in effect after loading",
        0i32,
    )?;

    module.on_post_load(Some(post_load))
}

extern "C" fn post_load(module: ImModuleHandle) {
    ffi_guard::guard_void("negsel_post_load", || {
        let module = ModuleHandle::from_raw(module);
        if let Err(error) = apply_settings(module) {
            module.log(ImLogLevel::Error, &format!("post-load failed: {error}"));
        }
    });
}

fn apply_settings(module: ModuleHandle) -> SdkResult<()> {
    let (Some(det_n), Some(effective)) = (module.find("det_n")?, module.find("effective_det_n")?)
    else {
        return Err(SdkError::msg("detector settings are missing"));
    };
    let n = det_n.get::<i32>(0)?;
    effective.set(0, n)?;
    module.log(ImLogLevel::Info, &format!("generating {n} detectors"));
    Ok(())
}

export_plugin! { init: init }
