//! Mapping between value types and LLVM storage types.
//!
//! Booleans occupy a full `i8` in memory so every element stays addressable;
//! only comparison results live as `i1` SSA values.

use crate::core::{ConstantData, EmitError, EmitResult, TypeDescription, ValueType};
use inkwell::context::Context;
use inkwell::types::{BasicType, BasicTypeEnum};
use inkwell::values::{BasicValueEnum, FloatValue, IntValue};
use inkwell::AddressSpace;

/// In-memory type of one element of `ty`.
pub(crate) fn storage_type<'ctx>(context: &'ctx Context, ty: ValueType) -> EmitResult<BasicTypeEnum<'ctx>> {
    Ok(match ty {
        ValueType::Boolean | ValueType::Byte | ValueType::Char8 => context.i8_type().into(),
        ValueType::Int16 => context.i16_type().into(),
        ValueType::Int32 => context.i32_type().into(),
        ValueType::Int64 => context.i64_type().into(),
        ValueType::Float => context.f32_type().into(),
        ValueType::Double => context.f64_type().into(),
        ValueType::Void | ValueType::Undefined => {
            return Err(EmitError::invalid_argument(format!("{} has no storage type", ty)))
        }
    })
}

/// Parameter or return type for a description: pointers for indirection,
/// the storage type for plain scalars.
pub(crate) fn abi_type<'ctx>(context: &'ctx Context, ty: TypeDescription) -> EmitResult<BasicTypeEnum<'ctx>> {
    if ty.is_pointer() {
        Ok(context.ptr_type(AddressSpace::default()).into())
    } else {
        storage_type(context, ty.base)
    }
}

/// Recovers the value type of an LLVM element type. 8-bit storage reads back
/// as `Char8`, whatever it was allocated as.
pub(crate) fn value_type_of<'ctx>(context: &'ctx Context, ty: BasicTypeEnum<'ctx>) -> Option<ValueType> {
    match ty {
        BasicTypeEnum::IntType(int) => match int.get_bit_width() {
            1 => Some(ValueType::Boolean),
            8 => Some(ValueType::Char8),
            16 => Some(ValueType::Int16),
            32 => Some(ValueType::Int32),
            64 => Some(ValueType::Int64),
            _ => None,
        },
        BasicTypeEnum::FloatType(float) if float == context.f32_type() => Some(ValueType::Float),
        BasicTypeEnum::FloatType(float) if float == context.f64_type() => Some(ValueType::Double),
        _ => None,
    }
}

/// Literal for element `index` of a constant buffer, in storage type.
pub(crate) fn literal<'ctx>(context: &'ctx Context, data: &ConstantData, index: usize) -> EmitResult<BasicValueEnum<'ctx>> {
    let ty = data.value_type();
    let storage = storage_type(context, ty)?;
    Ok(if ty.is_floating_point() {
        storage.into_float_type().const_float(data.get::<f64>(index)?).into()
    } else {
        storage.into_int_type().const_int(data.get::<i64>(index)? as u64, true).into()
    })
}

/// Constant array holding the whole buffer; the initializer of promoted and
/// data-initialized globals.
pub(crate) fn literal_array<'ctx>(context: &'ctx Context, data: &ConstantData) -> EmitResult<BasicValueEnum<'ctx>> {
    let storage = storage_type(context, data.value_type())?;
    let len = data.len();
    if data.value_type().is_floating_point() {
        let elements = (0..len)
            .map(|index| literal(context, data, index).map(BasicValueEnum::into_float_value))
            .collect::<EmitResult<Vec<FloatValue<'ctx>>>>()?;
        Ok(storage.into_float_type().const_array(&elements).into())
    } else {
        let elements = (0..len)
            .map(|index| literal(context, data, index).map(BasicValueEnum::into_int_value))
            .collect::<EmitResult<Vec<IntValue<'ctx>>>>()?;
        Ok(storage.into_int_type().const_array(&elements).into())
    }
}

/// Array type spanning `count` elements of `ty`.
pub(crate) fn array_of<'ctx>(ty: BasicTypeEnum<'ctx>, count: usize) -> EmitResult<inkwell::types::ArrayType<'ctx>> {
    let count = u32::try_from(count)
        .map_err(|_| EmitError::invalid_size(format!("{} elements exceed the largest LLVM array", count)))?;
    Ok(ty.array_type(count))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boolean_storage_is_a_byte() {
        let context = Context::create();
        assert_eq!(storage_type(&context, ValueType::Boolean).unwrap(), context.i8_type().into());
        assert!(storage_type(&context, ValueType::Void).is_err());
    }

    #[test]
    fn test_value_type_round_trip() {
        let context = Context::create();
        for ty in [ValueType::Int16, ValueType::Int32, ValueType::Int64, ValueType::Float, ValueType::Double] {
            let storage = storage_type(&context, ty).unwrap();
            assert_eq!(value_type_of(&context, storage), Some(ty));
        }
        let byte = storage_type(&context, ValueType::Byte).unwrap();
        assert_eq!(value_type_of(&context, byte), Some(ValueType::Char8));
        assert_eq!(value_type_of(&context, context.bool_type().into()), Some(ValueType::Boolean));
    }

    #[test]
    fn test_literals() {
        let context = Context::create();
        let flags = ConstantData::from_vec(vec![false, true]);
        let one = literal(&context, &flags, 1).unwrap().into_int_value();
        assert_eq!(one.get_zero_extended_constant(), Some(1));
        assert_eq!(one.get_type().get_bit_width(), 8);

        let bytes = ConstantData::from_vec(vec![0xFEu8]);
        let byte = literal(&context, &bytes, 0).unwrap().into_int_value();
        assert_eq!(byte.get_sign_extended_constant(), Some(-2));

        let doubles = ConstantData::from_vec(vec![1.5f64, 2.5]);
        let array = literal_array(&context, &doubles).unwrap().into_array_value();
        assert_eq!(array.get_type().len(), 2);
    }
}
