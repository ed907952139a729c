//! End-to-end scenarios: emit with LlvmContext, run through the MCJIT engine.

use inkwell::context::Context;
use inkwell::execution_engine::ExecutionEngine;
use inkwell::module::Module;
use inkwell::targets::{InitializationConfig, Target};
use inkwell::OptimizationLevel;
use value_ir::{
    function_body, if_, BinaryOperation, EmitterContext, FunctionDeclaration, Intrinsic, LlvmContext,
    LogicalOperation, MemoryLayout, ParameterDescription, Scalar, TypeDescription, Value, ValueType,
};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn jit<'ctx>(module: &Module<'ctx>) -> ExecutionEngine<'ctx> {
    Target::initialize_native(&InitializationConfig::default()).unwrap();
    module.create_jit_execution_engine(OptimizationLevel::None).unwrap()
}

fn pointer_param(ty: ValueType, len: usize) -> ParameterDescription {
    ParameterDescription::new(TypeDescription::pointer_to(ty), Some(MemoryLayout::new([len])))
}

fn scalar_param(ty: ValueType) -> ParameterDescription {
    ParameterDescription::new(TypeDescription::scalar(ty), None)
}

#[test]
fn test_max_of_runtime_vector() {
    init();
    let context = Context::create();
    let mut emitter = LlvmContext::new(&context, "reduce");
    let decl = FunctionDeclaration::new("max4")
        .parameters([pointer_param(ValueType::Double, 4)])
        .returns(scalar_param(ValueType::Double));

    let body = function_body(|ctx, args| ctx.call(&Intrinsic::Max.declaration(), vec![args[0].clone()]));
    emitter.create_function(&decl, body).unwrap();
    let module = emitter.finish().unwrap();

    let engine = jit(&module);
    let input = [1.0f64, 2.0, 3.0, 4.0];
    unsafe {
        let max4 = engine
            .get_function::<unsafe extern "C" fn(*const f64) -> f64>("max4")
            .unwrap();
        assert_eq!(max4.call(input.as_ptr()), 4.0);
    }
}

#[test]
fn test_pow_through_output_pointer() {
    init();
    let context = Context::create();
    let mut emitter = LlvmContext::new(&context, "math");
    let decl = FunctionDeclaration::new("square_all")
        .parameters([pointer_param(ValueType::Double, 2), pointer_param(ValueType::Double, 2)]);

    let body = function_body(|ctx, args| {
        let exponent = Value::from_vec(vec![2.0f64]);
        let squared = ctx
            .call(&Intrinsic::Pow.declaration(), vec![args[0].clone(), exponent])?
            .ok_or_else(|| value_ir::EmitError::illegal_state("pow returned nothing"))?;
        let mut out = args[1].clone();
        ctx.copy_data(&squared, &mut out)?;
        Ok(None)
    });
    emitter.create_function(&decl, body).unwrap();
    let module = emitter.finish().unwrap();

    let engine = jit(&module);
    let input = [2.0f64, 3.0];
    let mut output = [0.0f64; 2];
    unsafe {
        let square_all = engine
            .get_function::<unsafe extern "C" fn(*const f64, *mut f64)>("square_all")
            .unwrap();
        square_all.call(input.as_ptr(), output.as_mut_ptr());
    }
    assert_eq!(output, [4.0, 9.0]);
}

#[test]
fn test_scalar_arguments_and_returns() {
    init();
    let context = Context::create();
    let mut emitter = LlvmContext::new(&context, "scalars");
    let square = FunctionDeclaration::new("square")
        .parameters([scalar_param(ValueType::Double)])
        .returns(scalar_param(ValueType::Double));
    let shifted = FunctionDeclaration::new("square_plus_one")
        .parameters([scalar_param(ValueType::Double)])
        .returns(scalar_param(ValueType::Double));

    let square_body = function_body(|ctx, args| {
        let mut product = ctx.allocate(ValueType::Double, MemoryLayout::scalar())?;
        ctx.copy_data(&args[0], &mut product)?;
        ctx.binary_operation(BinaryOperation::Multiply, product, &args[0]).map(Some)
    });
    emitter.create_function(&square, square_body).unwrap();

    let callee = square.clone();
    let shifted_body = function_body(move |ctx, args| {
        let squared = ctx
            .call(&callee, vec![args[0].clone()])?
            .ok_or_else(|| value_ir::EmitError::illegal_state("square returned nothing"))?;
        ctx.binary_operation(BinaryOperation::Add, squared, &Value::from_vec(vec![1.0f64]))
            .map(Some)
    });
    emitter.create_function(&shifted, shifted_body).unwrap();
    let module = emitter.finish().unwrap();

    let engine = jit(&module);
    unsafe {
        let square_plus_one = engine
            .get_function::<unsafe extern "C" fn(f64) -> f64>("square_plus_one")
            .unwrap();
        assert_eq!(square_plus_one.call(3.0), 10.0);
        assert_eq!(square_plus_one.call(-0.5), 1.25);
    }
}

#[test]
fn test_branch_on_runtime_flag() {
    init();
    let context = Context::create();
    let mut emitter = LlvmContext::new(&context, "branch");
    let decl = FunctionDeclaration::new("choose")
        .parameters([scalar_param(ValueType::Boolean), pointer_param(ValueType::Double, 1)]);

    let body = function_body(|ctx, args| {
        let flag = Scalar::new(args[0].clone())?;
        let mut then_out = args[1].clone();
        let mut else_out = args[1].clone();
        if_(ctx, &flag, |ctx| ctx.copy_data(&Value::from_vec(vec![1.0f64]), &mut then_out))?
            .else_(|ctx| ctx.copy_data(&Value::from_vec(vec![2.0f64]), &mut else_out))?;
        Ok(None)
    });
    emitter.create_function(&decl, body).unwrap();
    let module = emitter.finish().unwrap();

    let engine = jit(&module);
    let mut out = [0.0f64];
    unsafe {
        let choose = engine
            .get_function::<unsafe extern "C" fn(i8, *mut f64)>("choose")
            .unwrap();
        choose.call(1, out.as_mut_ptr());
        assert_eq!(out[0], 1.0);
        choose.call(0, out.as_mut_ptr());
        assert_eq!(out[0], 2.0);
    }
}

#[test]
fn test_equality_over_vectors() {
    init();
    let context = Context::create();
    let mut emitter = LlvmContext::new(&context, "cmp");
    let decl = FunctionDeclaration::new("same")
        .parameters([pointer_param(ValueType::Int32, 3), pointer_param(ValueType::Int32, 3)])
        .returns(scalar_param(ValueType::Boolean));

    let body = function_body(|ctx, args| {
        ctx.logical_operation(LogicalOperation::Equality, &args[0], &args[1])
            .map(Some)
    });
    emitter.create_function(&decl, body).unwrap();
    let module = emitter.finish().unwrap();

    let engine = jit(&module);
    let a = [1i32, 2, 3];
    let b = [1i32, 2, 3];
    let c = [1i32, 2, 4];
    unsafe {
        let same = engine
            .get_function::<unsafe extern "C" fn(*const i32, *const i32) -> i8>("same")
            .unwrap();
        assert_eq!(same.call(a.as_ptr(), b.as_ptr()), 1);
        assert_eq!(same.call(a.as_ptr(), c.as_ptr()), 0);
    }
}

#[test]
fn test_cast_and_constant_operands() {
    init();
    let context = Context::create();
    let mut emitter = LlvmContext::new(&context, "conv");
    let decl = FunctionDeclaration::new("widen_and_offset")
        .parameters([pointer_param(ValueType::Int32, 3), pointer_param(ValueType::Double, 3)]);

    let body = function_body(|ctx, args| {
        let widened = ctx.cast(&args[0], ValueType::Double)?;
        let bias = Value::from_vec(vec![0.5f64, 0.25, 0.125]);
        let biased = ctx.binary_operation(BinaryOperation::Add, widened, &bias)?;
        let mut out = args[1].clone();
        ctx.copy_data(&biased, &mut out)?;
        Ok(None)
    });
    emitter.create_function(&decl, body).unwrap();
    let module = emitter.finish().unwrap();

    let engine = jit(&module);
    let input = [1i32, -2, 3];
    let mut output = [0.0f64; 3];
    unsafe {
        let widen = engine
            .get_function::<unsafe extern "C" fn(*const i32, *mut f64)>("widen_and_offset")
            .unwrap();
        widen.call(input.as_ptr(), output.as_mut_ptr());
    }
    assert_eq!(output, [1.5, -1.75, 3.125]);
}

fn layout_param(ty: ValueType, layout: MemoryLayout) -> ParameterDescription {
    ParameterDescription::new(TypeDescription::pointer_to(ty), Some(layout))
}

#[test]
fn test_padded_destination_keeps_its_padding() {
    init();
    let context = Context::create();
    let mut emitter = LlvmContext::new(&context, "pad");
    // 2x3 active block at (1, 1) of a 4x5 allocation
    let padded = MemoryLayout::padded([2, 3], [4, 5], [1, 1]).unwrap();
    let decl = FunctionDeclaration::new("shift_into").parameters([
        layout_param(ValueType::Double, MemoryLayout::new([2, 3])),
        layout_param(ValueType::Double, padded.clone()),
    ]);

    let body = function_body(move |ctx, args| {
        let mut out = args[1].clone();
        ctx.copy_data(&args[0], &mut out)?;
        let bias = Value::constant(
            value_ir::ConstantData::from_vec(vec![100.0f64; 20]),
            0,
            Some(padded.clone()),
        );
        ctx.binary_operation(BinaryOperation::Add, out, &bias)?;
        Ok(None)
    });
    emitter.create_function(&decl, body).unwrap();
    let module = emitter.finish().unwrap();

    let engine = jit(&module);
    let input = [1.0f64, 2.0, 3.0, 4.0, 5.0, 6.0];
    let mut output = [-1.0f64; 20];
    unsafe {
        let shift_into = engine
            .get_function::<unsafe extern "C" fn(*const f64, *mut f64)>("shift_into")
            .unwrap();
        shift_into.call(input.as_ptr(), output.as_mut_ptr());
    }

    let mut expected = [-1.0f64; 20];
    for row in 0..2 {
        for col in 0..3 {
            expected[(row + 1) * 5 + col + 1] = input[row * 3 + col] + 100.0;
        }
    }
    assert_eq!(output, expected);
}

#[test]
fn test_copy_into_permuted_layout_transposes() {
    init();
    let context = Context::create();
    let mut emitter = LlvmContext::new(&context, "perm");
    // logical 2x3 stored column-major
    let column_major = MemoryLayout::new([3, 2]).with_dimension_order([1, 0]).unwrap();
    let decl = FunctionDeclaration::new("transpose").parameters([
        layout_param(ValueType::Int32, MemoryLayout::new([2, 3])),
        layout_param(ValueType::Int32, column_major),
    ]);

    let body = function_body(|ctx, args| {
        let mut out = args[1].clone();
        ctx.copy_data(&args[0], &mut out)?;
        Ok(None)
    });
    emitter.create_function(&decl, body).unwrap();
    let module = emitter.finish().unwrap();

    let engine = jit(&module);
    let input = [1i32, 2, 3, 4, 5, 6];
    let mut output = [0i32; 6];
    unsafe {
        let transpose = engine
            .get_function::<unsafe extern "C" fn(*const i32, *mut i32)>("transpose")
            .unwrap();
        transpose.call(input.as_ptr(), output.as_mut_ptr());
    }
    assert_eq!(output, [1, 4, 2, 5, 3, 6]);
}

#[test]
fn test_intrinsic_over_padded_input() {
    init();
    let context = Context::create();
    let mut emitter = LlvmContext::new(&context, "padabs");
    let padded = MemoryLayout::padded([2, 2], [3, 3], [1, 1]).unwrap();
    let decl = FunctionDeclaration::new("magnitudes").parameters([
        layout_param(ValueType::Double, padded),
        layout_param(ValueType::Double, MemoryLayout::new([2, 2])),
    ]);

    let body = function_body(|ctx, args| {
        let magnitudes = ctx
            .call(&Intrinsic::Abs.declaration(), vec![args[0].clone()])?
            .ok_or_else(|| value_ir::EmitError::illegal_state("abs returned nothing"))?;
        let mut out = args[1].clone();
        ctx.copy_data(&magnitudes, &mut out)?;
        Ok(None)
    });
    emitter.create_function(&decl, body).unwrap();
    let module = emitter.finish().unwrap();

    let engine = jit(&module);
    let input = [-99.0f64, -99.0, -99.0, -99.0, -1.5, 2.0, -99.0, -3.0, 4.25];
    let mut output = [0.0f64; 4];
    unsafe {
        let magnitudes = engine
            .get_function::<unsafe extern "C" fn(*const f64, *mut f64)>("magnitudes")
            .unwrap();
        magnitudes.call(input.as_ptr(), output.as_mut_ptr());
    }
    assert_eq!(output, [1.5, 2.0, 3.0, 4.25]);
}
