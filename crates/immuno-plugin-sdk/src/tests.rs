use crate::*;

const INFO: PluginInfo = PluginInfo::new("negsel", "0.3.1")
    .description("negative selection detector")
    .author("immuno");

#[test]
fn plugin_info_builds_in_const_context() {
    assert_eq!(INFO.name, "negsel");
    assert_eq!(INFO.version, "0.3.1");
    assert_eq!(INFO.description, "negative selection detector");
    assert_eq!(INFO.author, "immuno");

    let raw = INFO.to_raw();
    // SAFETY: views of `'static` strings.
    let name = unsafe { raw.name.as_str() }.unwrap();
    assert_eq!(name, Some("negsel"));
}

#[test]
fn sdk_error_codes_are_never_success() {
    assert_eq!(SdkError::HostUnavailable.code(), IM_ERR_HOST_UNAVAILABLE);
    assert_eq!(SdkError::invalid_arg("x").code(), IM_ERR_INVALID_ARG);
    assert_eq!(SdkError::msg("boom").code(), IM_ERR_INTERNAL);
    assert_eq!(SdkError::Unsupported("setting_get").code(), IM_ERR_INTERNAL);
    assert_eq!(
        SdkError::Host {
            op: "setting_set",
            code: IM_OUT_OF_RANGE
        }
        .code(),
        IM_OUT_OF_RANGE
    );
    assert_eq!(
        SdkError::Host {
            op: "setting_set",
            code: IM_OK
        }
        .code(),
        IM_ERR_INTERNAL
    );
}

#[test]
fn host_status_helpers_classify_sequence_codes() {
    let end = SdkError::Host {
        op: "setting_read",
        code: IM_END_OF_SEQUENCE,
    };
    assert!(end.is_end_of_sequence());
    assert!(!end.is_not_found());

    let missing = SdkError::Host {
        op: "setting_find",
        code: IM_VALUE_NOT_FOUND,
    };
    assert!(missing.is_not_found());
}

#[test]
fn init_status_maps_results() {
    crate::host::allocate_storage(16);
    assert_eq!(__init_status(Ok(())), IM_OK);
    assert_eq!(crate::host::storage_blocks(), 1);

    assert_eq!(__init_status(Err(SdkError::msg("no detectors"))), IM_ERR_INTERNAL);
    assert_eq!(crate::host::storage_blocks(), 0, "failed init releases its storage");
}

#[test]
fn guard_status_turns_panics_into_internal_errors() {
    let status = ffi_guard::guard_status("test_op", || panic!("boom"));
    assert_eq!(status, IM_ERR_INTERNAL);

    let status = ffi_guard::guard_status("test_op", || IM_OK);
    assert_eq!(status, IM_OK);

    let value = ffi_guard::guard_with_default("test_op", 7u8, || panic!("{}", 3));
    assert_eq!(value, 7);
}

#[test]
fn panic_message_reads_both_payload_kinds() {
    let payload = std::panic::catch_unwind(|| panic!("static message")).unwrap_err();
    assert_eq!(ffi_guard::panic_message(&*payload), "static message");

    let payload = std::panic::catch_unwind(|| panic!("formatted {}", 42)).unwrap_err();
    assert_eq!(ffi_guard::panic_message(&*payload), "formatted 42");
}

#[test]
fn setting_primitives_round_trip_through_values() {
    assert_eq!(i32::from_value(&(-5i32).to_value()), -5);
    assert_eq!(u64::from_value(&u64::MAX.to_value()), u64::MAX);
    assert_eq!(f32::from_value(&1.5f32.to_value()), 1.5);
    assert!(bool::from_value(&true.to_value()));
    assert_eq!(<i16 as SettingPrimitive>::KIND, ImTypeKind::I16);
}
