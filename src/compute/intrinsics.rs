//! Interpreted intrinsic kernels.
//!
//! Float inputs are evaluated in single precision, everything else through
//! `f64`, mirroring the runtime functions the LLVM backend calls.

use crate::core::{ConstantData, Element, EmitError, EmitResult, Intrinsic, LogicalOperation, MemoryLayout, Value, ValueType};
use crate::with_constant_data;

fn math_f32(intrinsic: Intrinsic, x: f32) -> f32 {
    match intrinsic {
        Intrinsic::Abs => x.abs(),
        Intrinsic::Sin => x.sin(),
        Intrinsic::Cos => x.cos(),
        Intrinsic::Exp => x.exp(),
        Intrinsic::Log => x.ln(),
        Intrinsic::Sqrt => x.sqrt(),
        Intrinsic::Tanh => x.tanh(),
        Intrinsic::Pow | Intrinsic::Max | Intrinsic::Min => x,
    }
}

fn math_f64(intrinsic: Intrinsic, x: f64) -> f64 {
    match intrinsic {
        Intrinsic::Abs => x.abs(),
        Intrinsic::Sin => x.sin(),
        Intrinsic::Cos => x.cos(),
        Intrinsic::Exp => x.exp(),
        Intrinsic::Log => x.ln(),
        Intrinsic::Sqrt => x.sqrt(),
        Intrinsic::Tanh => x.tanh(),
        Intrinsic::Pow | Intrinsic::Max | Intrinsic::Min => x,
    }
}

fn apply_unary<T: Element>(intrinsic: Intrinsic, x: T) -> T {
    if T::VALUE_TYPE == ValueType::Float {
        T::from_f64(math_f32(intrinsic, x.to_f64() as f32) as f64)
    } else {
        T::from_f64(math_f64(intrinsic, x.to_f64()))
    }
}

fn apply_pow<T: Element>(base: T, exponent: T) -> T {
    if T::VALUE_TYPE == ValueType::Float {
        T::from_f64((base.to_f64() as f32).powf(exponent.to_f64() as f32) as f64)
    } else {
        T::from_f64(base.to_f64().powf(exponent.to_f64()))
    }
}

/// Keeps `current` when it satisfies the relation against `candidate`.
fn select_extremum<T: Element>(intrinsic: Intrinsic, current: T, candidate: T) -> T {
    let relation = if intrinsic == Intrinsic::Max {
        LogicalOperation::GreaterThanOrEqual
    } else {
        LogicalOperation::LessThanOrEqual
    };
    if relation.holds(T::compare(current, candidate)) {
        current
    } else {
        candidate
    }
}

fn element_wise<T: Element>(
    intrinsic: Intrinsic,
    out: &crate::core::Buffer<T>,
    input: &Value<'_>,
    exponent: Option<&Value<'_>>,
    layout: &MemoryLayout,
) -> EmitResult<()> {
    let exponent: Option<T> = exponent.map(|value| value.element(0)).transpose()?;
    let mut out = out.borrow_mut();
    for coord in layout.coordinates() {
        let offset = layout.entry_offset(&coord);
        let x: T = input.element(offset)?;
        out[offset] = match exponent {
            Some(exponent) => apply_pow(x, exponent),
            None => apply_unary(intrinsic, x),
        };
    }
    Ok(())
}

fn extremum<T: Element>(intrinsic: Intrinsic, out: &crate::core::Buffer<T>, args: &[Value<'_>]) -> EmitResult<()> {
    let result = match args {
        [input] => {
            let layout = input.layout_or_scalar();
            let mut coords = layout.coordinates();
            let first = coords
                .next()
                .ok_or_else(|| EmitError::invalid_size(format!("`{}` of an empty value", intrinsic.name())))?;
            let mut running: T = input.element(layout.entry_offset(&first))?;
            for coord in coords {
                let candidate: T = input.element(layout.entry_offset(&coord))?;
                running = select_extremum(intrinsic, running, candidate);
            }
            running
        }
        [lhs, rhs] => select_extremum(intrinsic, lhs.element::<T>(0)?, rhs.element::<T>(0)?),
        _ => return Err(EmitError::invalid_size(format!("`{}` arity", intrinsic.name()))),
    };
    out.borrow_mut()[0] = result;
    Ok(())
}

/// Evaluates an intrinsic over constant arguments.
pub(crate) fn call_intrinsic<'ctx>(intrinsic: Intrinsic, args: &[Value<'ctx>]) -> EmitResult<Value<'ctx>> {
    intrinsic.validate(args)?;
    let input = &args[0];
    let base = input.base_type();

    if matches!(intrinsic, Intrinsic::Max | Intrinsic::Min) {
        let out = ConstantData::zeroed(base, 1)?;
        with_constant_data!(&out, buffer => extremum(intrinsic, buffer, args))?;
        return Ok(Value::constant(out, 0, Some(MemoryLayout::scalar())));
    }

    let layout = input.layout_or_scalar();
    let out = ConstantData::zeroed(base, layout.memory_size())?;
    let exponent = if intrinsic == Intrinsic::Pow { args.get(1) } else { None };
    with_constant_data!(&out, buffer => element_wise(intrinsic, buffer, input, exponent, &layout))?;
    Ok(Value::constant(out, 0, Some(layout)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_min_reduction() {
        let values = Value::from_vec(vec![1.0f64, 4.0, 3.0, 2.0]);
        let max = call_intrinsic(Intrinsic::Max, &[values.clone()]).unwrap();
        let min = call_intrinsic(Intrinsic::Min, &[values]).unwrap();
        assert_eq!(max.element::<f64>(0).unwrap(), 4.0);
        assert_eq!(min.element::<f64>(0).unwrap(), 1.0);
    }

    #[test]
    fn test_two_operand_min() {
        let a = Value::from_vec(vec![5i32]);
        let b = Value::from_vec(vec![-2i32]);
        let min = call_intrinsic(Intrinsic::Min, &[a, b]).unwrap();
        assert_eq!(min.element::<i32>(0).unwrap(), -2);
    }

    #[test]
    fn test_integer_inputs_go_through_double() {
        let values = Value::from_vec(vec![-3i32, 16]);
        let abs = call_intrinsic(Intrinsic::Abs, &[values.clone()]).unwrap();
        assert_eq!(abs.to_vec::<i32>().unwrap(), vec![3, 16]);

        let sqrt = call_intrinsic(Intrinsic::Sqrt, &[Value::from_vec(vec![16i32, 10])]).unwrap();
        assert_eq!(sqrt.to_vec::<i32>().unwrap(), vec![4, 3]);
    }

    #[test]
    fn test_pow_with_scalar_exponent() {
        let base = Value::from_vec(vec![2.0f32, 3.0]);
        let exponent = Value::from_vec(vec![2.0f32]);
        let result = call_intrinsic(Intrinsic::Pow, &[base, exponent]).unwrap();
        assert_eq!(result.to_vec::<f32>().unwrap(), vec![4.0, 9.0]);
    }

    #[test]
    fn test_padded_input_skips_padding() {
        let data = ConstantData::from_vec(vec![100.0f64, 1.0, 2.0, 100.0]);
        let layout = MemoryLayout::padded([2], [4], [1]).unwrap();
        let window = Value::constant(data, 0, Some(layout));
        let max = call_intrinsic(Intrinsic::Max, &[window]).unwrap();
        assert_eq!(max.element::<f64>(0).unwrap(), 2.0);
    }
}
