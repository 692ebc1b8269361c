use super::*;

fn leaked<T: Primitive + 'static>(values: Vec<T>) -> Backing {
    Backing::External(ExternalBuffer::from_static(Box::leak(values.into_boxed_slice())))
}

fn leaked_bytes(len: usize) -> Backing {
    Backing::External(ExternalBuffer::from_static_bytes(Box::leak(
        vec![0u8; len].into_boxed_slice(),
    )))
}

fn scalar<T: Primitive + 'static>(name: &str, initial: T) -> Variable {
    Variable::register(VariableDecl::new(T::KIND, name, leaked(vec![initial]), 1)).unwrap()
}

fn text(name: &str, width: usize) -> Variable {
    Variable::register(VariableDecl::new(TypeKind::Str, name, leaked_bytes(width), 1).width(width))
        .unwrap()
}

#[test]
fn scalar_starts_with_its_backing_value() {
    let det_n = scalar("det_n", 200i32);
    assert_eq!(det_n.count(), 1);
    assert_eq!(det_n.max(), 1);
    assert!(!det_n.is_resizable());
    assert_eq!(det_n.value(0), Ok(Value::I32(200)));
    assert_eq!(det_n.render(0).as_deref(), Ok("200"));
}

#[test]
fn range_rejections_keep_the_previous_value() {
    let mut det_n = scalar("det_n", 200i32);
    det_n.set_range(&Value::I32(1), &Value::I32(1000)).unwrap();

    det_n.set(0, &Value::I32(50)).unwrap();
    assert_eq!(det_n.set(0, &Value::I32(0)), Err(ValueError::OutOfRange));
    assert_eq!(det_n.set(0, &Value::I64(1001)), Err(ValueError::OutOfRange));
    assert_eq!(det_n.value(0), Ok(Value::I32(50)));
    assert_eq!(det_n.range(), Some(Range::Signed { min: 1, max: 1000 }));
}

#[test]
fn unsigned_variables_never_take_negative_input() {
    let mut window = scalar("window", 16u16);
    assert_eq!(window.set(0, &Value::I32(-3)), Err(ValueError::Negative));
    assert_eq!(window.set(0, &Value::text("-3")), Err(ValueError::Negative));
    assert_eq!(window.value(0), Ok(Value::U16(16)));

    let mut rate =
        Variable::register(VariableDecl::new(TypeKind::UF32, "rate", leaked(vec![0.5f32]), 1))
            .unwrap();
    assert_eq!(rate.set(0, &Value::F64(-0.1)), Err(ValueError::Negative));
    rate.set(0, &Value::F64(0.25)).unwrap();
    assert_eq!(rate.value(0), Ok(Value::F32(0.25)));
}

#[test]
fn fixed_array_appends_one_at_a_time_up_to_capacity() {
    let mut radii = Variable::register(VariableDecl::new(
        TypeKind::U32,
        "radii",
        leaked(vec![0u32; 3]),
        3,
    ))
    .unwrap();
    assert_eq!(radii.count(), 0);
    assert_eq!(radii.set(1, &Value::U32(9)), Err(ValueError::IndexOutOfBounds));

    for (i, v) in [4u32, 5, 6].into_iter().enumerate() {
        radii.set(i, &Value::U32(v)).unwrap();
        assert_eq!(radii.count(), i + 1);
    }
    assert_eq!(radii.set(3, &Value::U32(7)), Err(ValueError::IndexOutOfBounds));
    assert_eq!(radii.count(), 3);

    radii.set(1, &Value::U32(50)).unwrap();
    assert_eq!(radii.count(), 3);
    assert_eq!(radii.value(1), Ok(Value::U32(50)));
}

#[test]
fn value_validation_runs_before_index_checks() {
    let mut radii = Variable::register(VariableDecl::new(
        TypeKind::U8,
        "radii",
        leaked(vec![0u8; 1]),
        1,
    ))
    .unwrap();
    assert_eq!(radii.set(5, &Value::I32(-1)), Err(ValueError::Negative));
    assert_eq!(radii.set(5, &Value::I32(1)), Err(ValueError::IndexOutOfBounds));
}

#[test]
fn growable_array_from_zero_grows_by_one_per_append() {
    let mut samples =
        Variable::register(VariableDecl::new(TypeKind::F64, "samples", Backing::Growable, 0))
            .unwrap();
    assert!(samples.is_resizable());
    assert_eq!((samples.count(), samples.max()), (0, 0));

    for i in 0..5 {
        samples.set(i, &Value::F64(i as f64 * 0.5)).unwrap();
        assert_eq!(samples.count(), i + 1);
        assert_eq!(samples.max(), i + 1);
    }
    let values: Vec<_> = (0..5).map(|i| samples.value(i).unwrap()).collect();
    assert_eq!(
        values,
        vec![
            Value::F64(0.0),
            Value::F64(0.5),
            Value::F64(1.0),
            Value::F64(1.5),
            Value::F64(2.0)
        ]
    );
    assert_eq!(samples.set(6, &Value::F64(1.0)), Err(ValueError::IndexOutOfBounds));
}

#[test]
fn growable_scalar_is_rejected() {
    let result = Variable::register(VariableDecl::new(TypeKind::I32, "n", Backing::Growable, 1));
    assert_eq!(result.err(), Some(ValueError::Null));
}

#[test]
fn fixed_backing_must_cover_the_capacity() {
    let result = Variable::register(VariableDecl::new(
        TypeKind::I64,
        "short",
        leaked(vec![0i64; 2]),
        3,
    ));
    assert_eq!(result.err(), Some(ValueError::Overflow));

    let result = Variable::register(VariableDecl::new(TypeKind::Str, "name", leaked_bytes(4), 1));
    assert_eq!(result.err(), Some(ValueError::Overflow), "strings need a width");
}

#[test]
fn fixed_arrays_only_shrink_and_never_grow_back() {
    let mut radii = Variable::register(VariableDecl::new(
        TypeKind::I16,
        "radii",
        leaked(vec![0i16; 3]),
        3,
    ))
    .unwrap();
    for i in 0..3 {
        radii.set(i, &Value::I16(i as i16)).unwrap();
    }
    assert_eq!(radii.resize(0), Err(ValueError::CapacityChangeRejected));
    assert_eq!(radii.resize(5), Err(ValueError::CapacityChangeRejected));

    radii.resize(2).unwrap();
    assert_eq!((radii.count(), radii.max()), (2, 2));
    assert_eq!(radii.resize(3), Err(ValueError::CapacityChangeRejected));
    assert_eq!(radii.set(2, &Value::I16(9)), Err(ValueError::IndexOutOfBounds));
}

#[test]
fn growable_resize_truncates_and_regrows() {
    let mut ids =
        Variable::register(VariableDecl::new(TypeKind::U64, "ids", Backing::Growable, 4)).unwrap();
    for i in 0..4 {
        ids.set(i, &Value::U64(i as u64 + 100)).unwrap();
    }
    ids.resize(2).unwrap();
    assert_eq!(ids.count(), 2);
    ids.resize(8).unwrap();
    assert_eq!((ids.count(), ids.max()), (2, 8));
    assert_eq!(ids.value(1), Ok(Value::U64(101)));
    assert_eq!(ids.resize(0), Err(ValueError::CapacityChangeRejected));
}

#[test]
fn overlong_strings_leave_the_destination_untouched() {
    let mut label = text("label", 8);
    label.set(0, &Value::text("abc")).unwrap();
    let before = label.element(0).unwrap().to_vec();

    assert_eq!(label.set(0, &Value::text("12345678")), Err(ValueError::Overflow));
    assert_eq!(label.element(0).unwrap(), before.as_slice());
    label.set(0, &Value::text("1234567")).unwrap();
    assert_eq!(label.value(0), Ok(Value::text("1234567")));
}

#[test]
fn null_is_accepted_only_when_permitted() {
    let mut label = text("label", 8);
    label.set(0, &Value::text("x")).unwrap();
    assert_eq!(label.set(0, &Value::null_text()), Err(ValueError::Null));
    assert_eq!(label.value(0), Ok(Value::text("x")));

    label.set_null_permitted(true).unwrap();
    label.set(0, &Value::null_text()).unwrap();
    assert_eq!(label.value(0), Ok(Value::text("")));
}

#[test]
fn allow_list_requires_an_exact_match() {
    let mut metric = text("metric", 16);
    metric
        .set_allow_list(vec!["hamming".into(), "euclidean".into()])
        .unwrap();
    metric.set(0, &Value::text("hamming")).unwrap();
    assert_eq!(metric.set(0, &Value::text("Hamming")), Err(ValueError::NotFound));
    assert_eq!(metric.value(0), Ok(Value::text("hamming")));

    metric.set_allow_list(Vec::new()).unwrap();
    metric.set(0, &Value::text("r-chunk")).unwrap();
}

#[test]
fn text_constraints_only_apply_to_strings() {
    let mut det_n = scalar("det_n", 1i32);
    assert_eq!(det_n.set_null_permitted(true), Err(ValueError::TypeMismatch));
    assert_eq!(
        det_n.set_allow_list(vec!["1".into()]),
        Err(ValueError::TypeMismatch)
    );

    let mut label = text("label", 8);
    assert_eq!(
        label.set_range(&Value::I32(0), &Value::I32(1)),
        Err(ValueError::TypeMismatch)
    );
}

#[test]
fn numbers_written_to_strings_are_rendered() {
    let mut label = text("label", 8);
    label.set(0, &Value::I32(42)).unwrap();
    assert_eq!(label.value(0), Ok(Value::text("42")));
}

#[test]
fn get_converts_to_the_requested_kind() {
    let det_n = scalar("det_n", 200i32);
    assert_eq!(det_n.get(0, TypeKind::I64), Ok(Value::I64(200)));
    assert_eq!(det_n.get(0, TypeKind::U8), Ok(Value::U8(200)));
    assert_eq!(det_n.get(0, TypeKind::I8), Err(ValueError::Overflow));
    assert_eq!(det_n.get(0, TypeKind::Str), Ok(Value::text("200")));
    assert_eq!(det_n.get(1, TypeKind::I32), Err(ValueError::IndexOutOfBounds));
}

#[test]
fn render_uses_the_descriptor_text_function() {
    assert_eq!(scalar("flag", true).render(0).as_deref(), Ok("true"));
    assert_eq!(scalar("rate", 2.5f64).render(0).as_deref(), Ok("2.5E0"));
    assert_eq!(scalar("shift", -7i8).render(0).as_deref(), Ok("-7"));
}
