//! Scenario tests for the interpreting backend.

use std::cell::RefCell;
use std::rc::Rc;
use value_ir::{
    function_body, BinaryOperation, ComputeContext, ConstantData, EmitError, EmitterContext, FunctionDeclaration,
    GlobalAllocationScope, InputError, Intrinsic, LogicError, LogicalOperation, MemoryLayout, ParameterDescription,
    TypeDescription, UnaryOperation, Value, ValueType,
};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn vector_param(ty: ValueType, len: usize) -> ParameterDescription {
    ParameterDescription::new(TypeDescription::pointer_to(ty), Some(MemoryLayout::new([len])))
}

#[test]
fn test_padded_layouts_only_touch_active_region() {
    init();
    let mut ctx = ComputeContext::new("pad");
    // 2x2 active block at (1, 1) of a 3x4 allocation
    let layout = MemoryLayout::padded([2, 2], [3, 4], [1, 1]).unwrap();
    let destination = ctx.allocate(ValueType::Int32, layout.clone()).unwrap();
    let ones = Value::constant(ConstantData::from_vec(vec![1i32; 12]), 0, Some(layout));

    let result = ctx.binary_operation(BinaryOperation::Add, destination, &ones).unwrap();
    assert_eq!(
        result.to_vec::<i32>().unwrap(),
        vec![0, 0, 0, 0, 0, 1, 1, 0, 0, 1, 1, 0]
    );
}

#[test]
fn test_for_each_visits_logical_coordinates() {
    init();
    let mut ctx = ComputeContext::new("walk");
    let layout = MemoryLayout::new([2, 3]).with_dimension_order([1, 0]).unwrap();
    let mut visited = Vec::new();
    ctx.for_each(&layout, &mut |_, index| {
        let coordinate = index
            .iter()
            .map(|scalar| scalar.get::<i32>())
            .collect::<Result<Vec<_>, _>>()?;
        visited.push(coordinate);
        Ok(())
    })
    .unwrap();
    assert_eq!(visited.len(), 6);
    assert_eq!(visited[0], vec![0, 0]);
    assert_eq!(visited[1], vec![1, 0]);
}

#[test]
fn test_functions_run_eagerly_and_nest() {
    init();
    let mut ctx = ComputeContext::new("calls");
    let norm = FunctionDeclaration::new("sum_of_squares")
        .parameters([vector_param(ValueType::Double, 3)])
        .returns(ParameterDescription::new(TypeDescription::scalar(ValueType::Double), None));
    let outer = FunctionDeclaration::new("doubled_norm")
        .parameters([vector_param(ValueType::Double, 3)])
        .returns(ParameterDescription::new(TypeDescription::scalar(ValueType::Double), None));

    ctx.create_function(
        &norm,
        function_body(|ctx, args| {
            let mut squares = ctx.allocate(ValueType::Double, args[0].layout_or_scalar())?;
            ctx.copy_data(&args[0], &mut squares)?;
            let squares = ctx.binary_operation(BinaryOperation::Multiply, squares, &args[0])?;
            let total: f64 = squares.to_vec::<f64>()?.iter().sum();
            Ok(Some(Value::from_vec(vec![total])))
        }),
    )
    .unwrap();

    let inner = norm.clone();
    ctx.create_function(
        &outer,
        function_body(move |ctx, args| {
            let norm = ctx
                .call(&inner, args)?
                .ok_or_else(|| EmitError::illegal_state("missing return"))?;
            ctx.binary_operation(BinaryOperation::Add, norm.clone(), &norm).map(Some)
        }),
    )
    .unwrap();

    let result = ctx
        .call(&outer, vec![Value::from_vec(vec![1.0f64, 2.0, 2.0])])
        .unwrap()
        .unwrap();
    assert_eq!(result.element::<f64>(0).unwrap(), 18.0);
}

#[test]
fn test_undefined_function_is_input_error() {
    init();
    let mut ctx = ComputeContext::new("missing");
    let decl = FunctionDeclaration::new("nowhere");
    let err = ctx.call(&decl, vec![]).unwrap_err();
    assert_eq!(
        err,
        EmitError::Input(InputError::UndefinedFunction {
            name: "nowhere".to_string()
        })
    );
    assert!(err.is_input());
}

#[test]
fn test_call_checks_arguments() {
    init();
    let mut ctx = ComputeContext::new("args");
    let decl = FunctionDeclaration::new("takes_ints").parameters([vector_param(ValueType::Int32, 2)]);
    ctx.create_function(&decl, function_body(|_, _| Ok(None))).unwrap();

    let err = ctx.call(&decl, vec![Value::from_vec(vec![1.0f64, 2.0])]).unwrap_err();
    assert!(matches!(err, EmitError::Input(InputError::InvalidArgument { .. })));

    let empty = Value::constant(ConstantData::from_vec(Vec::<i32>::new()), 0, Some(MemoryLayout::new([0])));
    let err = ctx.call(&decl, vec![empty]).unwrap_err();
    assert!(matches!(err, EmitError::Input(InputError::InvalidArgument { .. })));
}

#[test]
fn test_intrinsics() {
    init();
    let mut ctx = ComputeContext::new("math");

    let powered = ctx
        .call(
            &Intrinsic::Pow.declaration(),
            vec![Value::from_vec(vec![2.0f32, 3.0]), Value::from_vec(vec![2.0f32])],
        )
        .unwrap()
        .unwrap();
    assert_eq!(powered.to_vec::<f32>().unwrap(), vec![4.0, 9.0]);

    let smaller = ctx
        .call(
            &Intrinsic::Min.declaration(),
            vec![Value::from_vec(vec![7i64]), Value::from_vec(vec![-3i64])],
        )
        .unwrap()
        .unwrap();
    assert_eq!(smaller.element::<i64>(0).unwrap(), -3);

    let err = ctx
        .call(&Intrinsic::Sqrt.declaration(), vec![Value::from_vec(vec![true])])
        .unwrap_err();
    assert!(matches!(err, EmitError::Input(InputError::TypeMismatch { .. })));

    let err = ctx
        .call(
            &Intrinsic::Max.declaration(),
            vec![Value::from_vec(vec![1i32, 2]), Value::from_vec(vec![3i32])],
        )
        .unwrap_err();
    assert!(matches!(err, EmitError::Input(InputError::InvalidSize { .. })));
}

#[test]
fn test_globals_and_types() {
    init();
    let mut ctx = ComputeContext::new("reg");
    let table = ctx
        .global_allocate_data(
            GlobalAllocationScope::Global,
            "lut",
            ConstantData::from_vec(vec![1u8, 2, 3, 4]),
            MemoryLayout::new([2, 2]),
        )
        .unwrap();
    assert_eq!(ctx.get_type(&table).unwrap(), TypeDescription::pointer_to(ValueType::Byte));

    let found = ctx
        .get_global_value(GlobalAllocationScope::Global, "lut")
        .unwrap()
        .unwrap();
    assert!(found.constant_data().unwrap().0.same_buffer(table.constant_data().unwrap().0));
    assert!(ctx
        .get_global_value(GlobalAllocationScope::Global, "other")
        .unwrap()
        .is_none());

    let err = ctx
        .global_allocate(GlobalAllocationScope::Global, "lut", ValueType::Byte, MemoryLayout::scalar())
        .unwrap_err();
    assert!(matches!(err, EmitError::Input(InputError::InvalidArgument { .. })));

    let err = ctx
        .get_type(&Value::undefined(TypeDescription::pointer_to(ValueType::Int16), None))
        .unwrap_err();
    assert_eq!(err, EmitError::Input(InputError::UndefinedValue));
}

#[test]
fn test_logical_operations_and_if_chain() {
    init();
    let mut ctx = ComputeContext::new("logic");
    let lhs = Value::from_vec(vec![1.0f64, 2.0, 3.0]);
    let rhs = Value::from_vec(vec![1.0f64, 5.0, 3.0]);

    let equal = ctx.logical_operation(LogicalOperation::Equality, &lhs, &rhs).unwrap();
    let at_most = ctx.logical_operation(LogicalOperation::LessThanOrEqual, &lhs, &rhs).unwrap();
    assert!(!equal.element::<bool>(0).unwrap());
    assert!(at_most.element::<bool>(0).unwrap());
    assert_eq!(equal.type_description(), TypeDescription::pointer_to(ValueType::Boolean));

    let taken = Rc::new(RefCell::new(Vec::new()));
    let (first, second, last) = (taken.clone(), taken.clone(), taken.clone());
    value_ir::if_(&mut ctx, &value_ir::Scalar::new(equal).unwrap(), |_| {
        first.borrow_mut().push("equal");
        Ok(())
    })
    .unwrap()
    .else_if(&value_ir::Scalar::new(at_most).unwrap(), |_| {
        second.borrow_mut().push("at most");
        Ok(())
    })
    .unwrap()
    .else_(|_| {
        last.borrow_mut().push("neither");
        Ok(())
    })
    .unwrap();
    assert_eq!(*taken.borrow(), vec!["at most"]);
}

#[test]
fn test_unary_operations_are_not_implemented() {
    init();
    let mut ctx = ComputeContext::new("unary");
    let err = ctx
        .unary_operation(UnaryOperation::Unspecified, Value::from_vec(vec![true]))
        .unwrap_err();
    assert!(matches!(err, EmitError::Logic(LogicError::NotImplemented { .. })));
    assert!(err.is_logic());
}

#[test]
fn test_move_data_resets_source() {
    init();
    let mut ctx = ComputeContext::new("mv");
    let mut source = Value::from_vec(vec![4i16, 5]);
    let mut destination = ctx.allocate(ValueType::Int16, MemoryLayout::new([2])).unwrap();
    ctx.move_data(&mut source, &mut destination).unwrap();
    assert!(!source.is_defined());
    assert_eq!(destination.to_vec::<i16>().unwrap(), vec![4, 5]);
}

#[test]
fn test_views_longer_than_their_buffer_are_rejected() {
    init();
    let mut ctx = ComputeContext::new("short");
    let short = Value::constant(ConstantData::from_vec(vec![1i32, 2]), 0, Some(MemoryLayout::new([3])));
    let full = Value::from_vec(vec![1i32, 2, 5]);

    let err = ctx
        .binary_operation(BinaryOperation::Add, short.clone(), &full)
        .unwrap_err();
    assert!(matches!(err, EmitError::Input(InputError::InvalidSize { .. })));

    let err = ctx.logical_operation(LogicalOperation::Equality, &short, &full).unwrap_err();
    assert!(matches!(err, EmitError::Input(InputError::InvalidSize { .. })));

    let mut destination = short.clone();
    let err = ctx.copy_data(&full, &mut destination).unwrap_err();
    assert!(matches!(err, EmitError::Input(InputError::InvalidSize { .. })));

    // reading past the end fails the same way
    let err = ctx.binary_operation(BinaryOperation::Add, full, &short).unwrap_err();
    assert!(matches!(err, EmitError::Input(InputError::InvalidSize { .. })));
}
