// This module lowers the intrinsic catalog for runtime arguments. Element-wise intrinsics
// (abs, sin, cos, exp, log, sqrt, tanh, pow) allocate an output with the input's layout and
// emit one runtime call per active coordinate. Float inputs call the single-precision
// function; every other type is converted to double, evaluated, and converted back into
// the input's storage type. pow loads its scalar exponent once, before the loop. max and
// min produce a scalar: the one-operand form seeds the result with the first active element
// and folds every coordinate in with a select on >= (max) or <= (min); the two-operand form
// is a single compare-and-select. Argument checks are shared with the interpreter so both
// backends reject the same calls.

//! Intrinsic lowering.

use super::context::LlvmContext;
use super::runtime::MathWidth;
use crate::core::{
    EmitError, EmitResult, EmitterContext, Emittable, Intrinsic, LogicalOperation, MemoryLayout, Value, ValueType,
};
use inkwell::values::{BasicMetadataValueEnum, BasicValueEnum};

impl<'ctx> LlvmContext<'ctx> {
    pub(crate) fn emit_intrinsic(&mut self, intrinsic: Intrinsic, args: &[Value<'ctx>]) -> EmitResult<Value<'ctx>> {
        intrinsic.validate(args)?;
        let result = match intrinsic {
            Intrinsic::Max | Intrinsic::Min => self.emit_extremum(intrinsic, args),
            _ => self.emit_element_wise(intrinsic, args),
        }?;
        self.stats.record_emitted(intrinsic.name());
        Ok(result)
    }

    /// Calls `function` on `x` of type `ty`, going through double for non-float types.
    fn call_math(
        &self,
        function: inkwell::values::FunctionValue<'ctx>,
        ty: ValueType,
        x: BasicValueEnum<'ctx>,
        exponent: Option<BasicValueEnum<'ctx>>,
    ) -> EmitResult<BasicValueEnum<'ctx>> {
        let through_double = ty != ValueType::Float;
        let x = if through_double { self.convert(x, ty, ValueType::Double)? } else { x };
        let mut operands: Vec<BasicMetadataValueEnum<'ctx>> = vec![x.into()];
        if let Some(exponent) = exponent {
            operands.push(exponent.into());
        }
        let result = self
            .builder
            .build_call(function, &operands, "math")?
            .try_as_basic_value()
            .left()
            .ok_or_else(|| EmitError::backend("math runtime function returned void"))?;
        if through_double {
            self.convert(result, ValueType::Double, ty)
        } else {
            Ok(result)
        }
    }

    fn emit_element_wise(&mut self, intrinsic: Intrinsic, args: &[Value<'ctx>]) -> EmitResult<Value<'ctx>> {
        let input = &args[0];
        let ty = input.base_type();
        let width = if ty == ValueType::Float { MathWidth::Single } else { MathWidth::Double };
        let function = self.math_function(intrinsic, width)?;

        let exponent = match args.get(1) {
            Some(exponent) if intrinsic == Intrinsic::Pow => {
                let raw = self.scalar_operand(exponent)?;
                Some(if ty == ValueType::Float {
                    raw
                } else {
                    self.convert(raw, ty, ValueType::Double)?
                })
            }
            _ => None,
        };

        let layout = input.layout_or_scalar();
        let source = self.emittable_of(input)?;
        let output = self.allocate(ty, layout.clone())?;
        let target = output
            .emittable()
            .ok_or_else(|| EmitError::illegal_state("allocation produced no runtime handle"))?;

        for coord in layout.coordinates() {
            let offset = layout.logical_entry_offset(&layout.logical_coordinates(&coord));
            let x = self.value_at(&source, offset)?;
            let y = self.call_math(function, ty, x, exponent)?;
            self.set_value_at(&target, offset, y)?;
        }
        Ok(output)
    }

    fn select_extremum(
        &self,
        intrinsic: Intrinsic,
        current: BasicValueEnum<'ctx>,
        candidate: BasicValueEnum<'ctx>,
        floating_point: bool,
    ) -> EmitResult<BasicValueEnum<'ctx>> {
        let relation = if intrinsic == Intrinsic::Max {
            LogicalOperation::GreaterThanOrEqual
        } else {
            LogicalOperation::LessThanOrEqual
        };
        let keep = self.compare(relation, current, candidate, floating_point)?;
        Ok(self.builder.build_select(keep, current, candidate, "select")?)
    }

    fn emit_extremum(&mut self, intrinsic: Intrinsic, args: &[Value<'ctx>]) -> EmitResult<Value<'ctx>> {
        let ty = args[0].base_type();
        let floating_point = ty.is_floating_point();
        let result = self.allocate(ty, MemoryLayout::scalar())?;
        let target: Emittable<'ctx> = result
            .emittable()
            .ok_or_else(|| EmitError::illegal_state("allocation produced no runtime handle"))?;

        match args {
            [input] => {
                let layout = input.layout_or_scalar();
                let source = self.emittable_of(input)?;
                let first = layout
                    .coordinates()
                    .next()
                    .ok_or_else(|| EmitError::invalid_size(format!("`{}` of an empty value", intrinsic.name())))?;
                let seed = self.value_at(&source, layout.entry_offset(&first))?;
                self.set_value_at(&target, 0, seed)?;

                for coord in layout.coordinates() {
                    let offset = layout.logical_entry_offset(&layout.logical_coordinates(&coord));
                    let current = self.value_at(&target, 0)?;
                    let candidate = self.value_at(&source, offset)?;
                    let selected = self.select_extremum(intrinsic, current, candidate, floating_point)?;
                    self.set_value_at(&target, 0, selected)?;
                }
            }
            [lhs, rhs] => {
                let lhs = self.scalar_operand(lhs)?;
                let rhs = self.scalar_operand(rhs)?;
                let selected = self.select_extremum(intrinsic, lhs, rhs, floating_point)?;
                self.set_value_at(&target, 0, selected)?;
            }
            _ => {
                return Err(EmitError::invalid_size(format!(
                    "`{}` received {} arguments",
                    intrinsic.name(),
                    args.len()
                )))
            }
        }
        Ok(result)
    }
}
