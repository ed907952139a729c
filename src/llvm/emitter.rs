// This module holds the instruction-level helpers LlvmContext is built from: element
// addressing through in-bounds GEPs, typed loads and stores that hide the difference
// between SSA scalars (pointer level 0) and addressed storage, entry-block stack allocation,
// bulk memset/memcpy, scalar conversions with signed integer semantics, and the arithmetic
// and comparison selectors that pick the float or integer instruction for an operation.
// Every per-coordinate loop in the backend bottoms out in these functions.

//! Instruction helpers shared by the LLVM backend.

use super::context::LlvmContext;
use super::types::{array_of, storage_type};
use crate::core::{BinaryOperation, EmitError, EmitResult, Emittable, LogicalOperation, ValueType};
use inkwell::builder::Builder;
use inkwell::types::BasicTypeEnum;
use inkwell::values::{BasicValue, BasicValueEnum, FunctionValue, IntValue, PointerValue};
use inkwell::{AddressSpace, FloatPredicate, IntPredicate};

pub(crate) fn backend_error(err: impl std::fmt::Debug) -> EmitError {
    EmitError::backend(format!("{:?}", err))
}

impl<'ctx> LlvmContext<'ctx> {
    /// The function currently being emitted.
    pub(crate) fn current_function(&self) -> EmitResult<FunctionValue<'ctx>> {
        self.builder
            .get_insert_block()
            .and_then(|block| block.get_parent())
            .ok_or_else(|| EmitError::illegal_state("no function is being emitted"))
    }

    pub(crate) fn index(&self, offset: usize) -> IntValue<'ctx> {
        self.context.i64_type().const_int(offset as u64, false)
    }

    /// Type one step below the emittable's pointer.
    pub(crate) fn pointee_type(&self, emittable: &Emittable<'ctx>) -> BasicTypeEnum<'ctx> {
        if emittable.pointer_level > 1 {
            self.context.ptr_type(AddressSpace::default()).into()
        } else {
            emittable.element_type
        }
    }

    pub(crate) fn element_pointer(
        &self,
        emittable: &Emittable<'ctx>,
        index: IntValue<'ctx>,
    ) -> EmitResult<PointerValue<'ctx>> {
        if emittable.pointer_level == 0 {
            return Err(EmitError::illegal_state("scalar SSA values cannot be addressed"));
        }
        let base = emittable.value.into_pointer_value();
        let pointee = self.pointee_type(emittable);
        Ok(unsafe { self.builder.build_in_bounds_gep(pointee, base, &[index], "elem")? })
    }

    /// Loads element `offset`; `i1` results are widened to their byte storage.
    pub(crate) fn value_at(&self, emittable: &Emittable<'ctx>, offset: usize) -> EmitResult<BasicValueEnum<'ctx>> {
        if emittable.pointer_level == 0 {
            if offset != 0 {
                return Err(EmitError::illegal_state("scalar SSA values have a single element"));
            }
            return self.widen_bool(emittable.value);
        }
        let pointer = if offset == 0 {
            emittable.value.into_pointer_value()
        } else {
            self.element_pointer(emittable, self.index(offset))?
        };
        Ok(self.builder.build_load(self.pointee_type(emittable), pointer, "load")?)
    }

    pub(crate) fn set_value_at(
        &self,
        emittable: &Emittable<'ctx>,
        offset: usize,
        value: BasicValueEnum<'ctx>,
    ) -> EmitResult<()> {
        if emittable.pointer_level == 0 {
            return Err(EmitError::illegal_state("cannot store through a scalar SSA value"));
        }
        let pointer = if offset == 0 {
            emittable.value.into_pointer_value()
        } else {
            self.element_pointer(emittable, self.index(offset))?
        };
        self.builder.build_store(pointer, value)?;
        Ok(())
    }

    pub(crate) fn widen_bool(&self, value: BasicValueEnum<'ctx>) -> EmitResult<BasicValueEnum<'ctx>> {
        match value {
            BasicValueEnum::IntValue(int) if int.get_type().get_bit_width() == 1 => Ok(self
                .builder
                .build_int_z_extend(int, self.context.i8_type(), "widen")?
                .into()),
            other => Ok(other),
        }
    }

    /// `i1` truth value of a stored boolean.
    pub(crate) fn truth(&self, value: BasicValueEnum<'ctx>) -> EmitResult<IntValue<'ctx>> {
        let int = value.into_int_value();
        if int.get_type().get_bit_width() == 1 {
            return Ok(int);
        }
        Ok(self
            .builder
            .build_int_compare(IntPredicate::NE, int, int.get_type().const_zero(), "truth")?)
    }

    /// Builder positioned at the top of the current function's entry block.
    fn entry_builder(&self) -> EmitResult<Builder<'ctx>> {
        let function = self.current_function()?;
        let entry = function
            .get_first_basic_block()
            .ok_or_else(|| EmitError::illegal_state("function has no entry block"))?;
        let builder = self.context.create_builder();
        match entry.get_first_instruction() {
            Some(first) => builder.position_before(&first),
            None => builder.position_at_end(entry),
        }
        Ok(builder)
    }

    /// Stack storage for `count` elements, hoisted into the entry block.
    pub(crate) fn alloca_in_entry(
        &self,
        ty: BasicTypeEnum<'ctx>,
        count: usize,
        name: &str,
    ) -> EmitResult<PointerValue<'ctx>> {
        let builder = self.entry_builder()?;
        Ok(builder.build_alloca(array_of(ty, count)?, name)?)
    }

    /// Builder placed after the entry block's allocas and before its
    /// terminator, so work it emits runs once on every path.
    pub(crate) fn entry_tail_builder(&self) -> EmitResult<Builder<'ctx>> {
        let function = self.current_function()?;
        let entry = function
            .get_first_basic_block()
            .ok_or_else(|| EmitError::illegal_state("function has no entry block"))?;
        let builder = self.context.create_builder();
        match entry.get_terminator() {
            Some(terminator) => builder.position_before(&terminator),
            None => builder.position_at_end(entry),
        }
        Ok(builder)
    }

    pub(crate) fn memset_zero(&self, pointer: PointerValue<'ctx>, bytes: u64) -> EmitResult<()> {
        let zero = self.context.i8_type().const_zero();
        let size = self.context.i64_type().const_int(bytes, false);
        self.builder
            .build_memset(pointer, 1, zero, size)
            .map_err(backend_error)?;
        Ok(())
    }

    pub(crate) fn memcpy(
        &self,
        builder: &Builder<'ctx>,
        destination: PointerValue<'ctx>,
        source: PointerValue<'ctx>,
        bytes: u64,
    ) -> EmitResult<()> {
        let size = self.context.i64_type().const_int(bytes, false);
        builder
            .build_memcpy(destination, 1, source, 1, size)
            .map_err(backend_error)?;
        Ok(())
    }

    /// Converts a stored scalar of type `from` into storage of type `to`.
    /// Integers are treated as signed; booleans normalize to 0/1.
    pub(crate) fn convert(
        &self,
        value: BasicValueEnum<'ctx>,
        from: ValueType,
        to: ValueType,
    ) -> EmitResult<BasicValueEnum<'ctx>> {
        if from == to {
            return Ok(value);
        }
        let target = storage_type(self.context, to)?;
        let b = &self.builder;

        if to == ValueType::Boolean {
            let truth = if from.is_floating_point() {
                let float = value.into_float_value();
                b.build_float_compare(FloatPredicate::UNE, float, float.get_type().const_zero(), "tobool")?
            } else {
                self.truth(value)?
            };
            return Ok(b.build_int_z_extend(truth, target.into_int_type(), "bool")?.into());
        }

        Ok(match (from.is_floating_point(), to.is_floating_point()) {
            (true, true) => b
                .build_float_cast(value.into_float_value(), target.into_float_type(), "fcast")?
                .into(),
            (true, false) => b
                .build_float_to_signed_int(value.into_float_value(), target.into_int_type(), "fptosi")?
                .into(),
            (false, true) => b
                .build_signed_int_to_float(value.into_int_value(), target.into_float_type(), "sitofp")?
                .into(),
            (false, false) => b
                .build_int_cast_sign_flag(value.into_int_value(), target.into_int_type(), true, "icast")?
                .into(),
        })
    }

    pub(crate) fn arithmetic(
        &self,
        op: BinaryOperation,
        lhs: BasicValueEnum<'ctx>,
        rhs: BasicValueEnum<'ctx>,
        floating_point: bool,
    ) -> EmitResult<BasicValueEnum<'ctx>> {
        let b = &self.builder;
        if floating_point {
            let (lhs, rhs) = (lhs.into_float_value(), rhs.into_float_value());
            let result = match op {
                BinaryOperation::Add => b.build_float_add(lhs, rhs, "fadd")?,
                BinaryOperation::Subtract => b.build_float_sub(lhs, rhs, "fsub")?,
                BinaryOperation::Multiply => b.build_float_mul(lhs, rhs, "fmul")?,
                BinaryOperation::Divide => b.build_float_div(lhs, rhs, "fdiv")?,
                BinaryOperation::Modulus => {
                    return Err(EmitError::invalid_argument("modulus requires integer operands"))
                }
            };
            Ok(result.as_basic_value_enum())
        } else {
            let (lhs, rhs) = (lhs.into_int_value(), rhs.into_int_value());
            let result = match op {
                BinaryOperation::Add => b.build_int_add(lhs, rhs, "add")?,
                BinaryOperation::Subtract => b.build_int_sub(lhs, rhs, "sub")?,
                BinaryOperation::Multiply => b.build_int_mul(lhs, rhs, "mul")?,
                BinaryOperation::Divide => b.build_int_signed_div(lhs, rhs, "sdiv")?,
                BinaryOperation::Modulus => b.build_int_signed_rem(lhs, rhs, "srem")?,
            };
            Ok(result.as_basic_value_enum())
        }
    }

    /// Ordered float or signed integer comparison.
    pub(crate) fn compare(
        &self,
        op: LogicalOperation,
        lhs: BasicValueEnum<'ctx>,
        rhs: BasicValueEnum<'ctx>,
        floating_point: bool,
    ) -> EmitResult<IntValue<'ctx>> {
        if floating_point {
            let predicate = match op {
                LogicalOperation::Equality => FloatPredicate::OEQ,
                LogicalOperation::Inequality => FloatPredicate::ONE,
                LogicalOperation::GreaterThan => FloatPredicate::OGT,
                LogicalOperation::GreaterThanOrEqual => FloatPredicate::OGE,
                LogicalOperation::LessThan => FloatPredicate::OLT,
                LogicalOperation::LessThanOrEqual => FloatPredicate::OLE,
            };
            Ok(self
                .builder
                .build_float_compare(predicate, lhs.into_float_value(), rhs.into_float_value(), "fcmp")?)
        } else {
            let predicate = match op {
                LogicalOperation::Equality => IntPredicate::EQ,
                LogicalOperation::Inequality => IntPredicate::NE,
                LogicalOperation::GreaterThan => IntPredicate::SGT,
                LogicalOperation::GreaterThanOrEqual => IntPredicate::SGE,
                LogicalOperation::LessThan => IntPredicate::SLT,
                LogicalOperation::LessThanOrEqual => IntPredicate::SLE,
            };
            Ok(self
                .builder
                .build_int_compare(predicate, lhs.into_int_value(), rhs.into_int_value(), "icmp")?)
        }
    }
}
