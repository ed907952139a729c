//! Host scalar types that can back constant buffers.
//!
//! [`Element`] ties each Rust scalar to its [`ValueType`] and supplies the
//! arithmetic, comparison and conversion rules the interpreter uses. Integer
//! arithmetic wraps and division, modulus and ordering are signed, matching the
//! instructions the LLVM backend emits (`Byte` is compared and divided as `i8`).

use super::context::{BinaryOperation, LogicalOperation};
use super::error::{EmitError, EmitResult};
use super::types::ValueType;
use super::value::{Buffer, ConstantData};
use std::cmp::Ordering;
use std::fmt;

/// A Rust scalar type usable as constant data.
pub trait Element: Copy + Default + PartialOrd + fmt::Debug + fmt::Display + 'static {
    const VALUE_TYPE: ValueType;

    fn wrap(buffer: Buffer<Self>) -> ConstantData;
    fn buffer(data: &ConstantData) -> Option<&Buffer<Self>>;

    fn to_f64(self) -> f64;
    fn to_i64(self) -> i64;
    fn from_f64(value: f64) -> Self;
    fn from_i64(value: i64) -> Self;

    fn binary(op: BinaryOperation, lhs: Self, rhs: Self) -> EmitResult<Self>;

    /// Ordering used by comparisons; `None` for unordered floats.
    fn compare(lhs: Self, rhs: Self) -> Option<Ordering>;

    /// Converts through the widest type of the source's kind.
    fn cast<T: Element>(self) -> T {
        if Self::VALUE_TYPE.is_floating_point() {
            T::from_f64(self.to_f64())
        } else {
            T::from_i64(self.to_i64())
        }
    }
}

impl LogicalOperation {
    /// Evaluates the relation; unordered operands never satisfy it.
    pub fn holds(self, ordering: Option<Ordering>) -> bool {
        let Some(ordering) = ordering else {
            return false;
        };
        match self {
            LogicalOperation::Equality => ordering == Ordering::Equal,
            LogicalOperation::Inequality => ordering != Ordering::Equal,
            LogicalOperation::GreaterThan => ordering == Ordering::Greater,
            LogicalOperation::GreaterThanOrEqual => ordering != Ordering::Less,
            LogicalOperation::LessThan => ordering == Ordering::Less,
            LogicalOperation::LessThanOrEqual => ordering != Ordering::Greater,
        }
    }
}

macro_rules! integer_element {
    ($ty:ty, $signed:ty, $variant:ident) => {
        impl Element for $ty {
            const VALUE_TYPE: ValueType = ValueType::$variant;

            fn wrap(buffer: Buffer<Self>) -> ConstantData {
                ConstantData::$variant(buffer)
            }

            fn buffer(data: &ConstantData) -> Option<&Buffer<Self>> {
                match data {
                    ConstantData::$variant(buffer) => Some(buffer),
                    _ => None,
                }
            }

            fn to_f64(self) -> f64 {
                self as $signed as f64
            }

            fn to_i64(self) -> i64 {
                self as $signed as i64
            }

            fn from_f64(value: f64) -> Self {
                value as $signed as $ty
            }

            fn from_i64(value: i64) -> Self {
                value as $ty
            }

            fn binary(op: BinaryOperation, lhs: Self, rhs: Self) -> EmitResult<Self> {
                let (lhs, rhs) = (lhs as $signed, rhs as $signed);
                let result = match op {
                    BinaryOperation::Add => lhs.wrapping_add(rhs),
                    BinaryOperation::Subtract => lhs.wrapping_sub(rhs),
                    BinaryOperation::Multiply => lhs.wrapping_mul(rhs),
                    BinaryOperation::Divide | BinaryOperation::Modulus if rhs == 0 => {
                        return Err(EmitError::invalid_argument("integer division by zero"));
                    }
                    BinaryOperation::Divide => lhs.wrapping_div(rhs),
                    BinaryOperation::Modulus => lhs.wrapping_rem(rhs),
                };
                Ok(result as $ty)
            }

            fn compare(lhs: Self, rhs: Self) -> Option<Ordering> {
                (lhs as $signed).partial_cmp(&(rhs as $signed))
            }
        }
    };
}

integer_element!(u8, i8, Byte);
integer_element!(i8, i8, Char8);
integer_element!(i16, i16, Int16);
integer_element!(i32, i32, Int32);
integer_element!(i64, i64, Int64);

macro_rules! float_element {
    ($ty:ty, $variant:ident) => {
        impl Element for $ty {
            const VALUE_TYPE: ValueType = ValueType::$variant;

            fn wrap(buffer: Buffer<Self>) -> ConstantData {
                ConstantData::$variant(buffer)
            }

            fn buffer(data: &ConstantData) -> Option<&Buffer<Self>> {
                match data {
                    ConstantData::$variant(buffer) => Some(buffer),
                    _ => None,
                }
            }

            fn to_f64(self) -> f64 {
                self as f64
            }

            fn to_i64(self) -> i64 {
                self as i64
            }

            fn from_f64(value: f64) -> Self {
                value as $ty
            }

            fn from_i64(value: i64) -> Self {
                value as $ty
            }

            fn binary(op: BinaryOperation, lhs: Self, rhs: Self) -> EmitResult<Self> {
                match op {
                    BinaryOperation::Add => Ok(lhs + rhs),
                    BinaryOperation::Subtract => Ok(lhs - rhs),
                    BinaryOperation::Multiply => Ok(lhs * rhs),
                    BinaryOperation::Divide => Ok(lhs / rhs),
                    BinaryOperation::Modulus => Err(EmitError::invalid_argument(
                        "modulus is not defined for floating point values",
                    )),
                }
            }

            fn compare(lhs: Self, rhs: Self) -> Option<Ordering> {
                lhs.partial_cmp(&rhs)
            }
        }
    };
}

float_element!(f32, Float);
float_element!(f64, Double);

impl Element for bool {
    const VALUE_TYPE: ValueType = ValueType::Boolean;

    fn wrap(buffer: Buffer<Self>) -> ConstantData {
        ConstantData::Boolean(buffer)
    }

    fn buffer(data: &ConstantData) -> Option<&Buffer<Self>> {
        match data {
            ConstantData::Boolean(buffer) => Some(buffer),
            _ => None,
        }
    }

    fn to_f64(self) -> f64 {
        if self {
            1.0
        } else {
            0.0
        }
    }

    fn to_i64(self) -> i64 {
        self as i64
    }

    fn from_f64(value: f64) -> Self {
        value != 0.0
    }

    fn from_i64(value: i64) -> Self {
        value != 0
    }

    fn binary(_op: BinaryOperation, _lhs: Self, _rhs: Self) -> EmitResult<Self> {
        Err(EmitError::not_implemented("arithmetic on boolean values"))
    }

    fn compare(lhs: Self, rhs: Self) -> Option<Ordering> {
        lhs.partial_cmp(&rhs)
    }
}
