// This module defines Value, the central data abstraction of the IR: a typed handle with an
// optional MemoryLayout whose underlying data is a tagged variant over three states. An
// Undefined value has no storage yet. A Constant value points into a shared, reference
// counted host buffer (ConstantData) at some element offset, so Values copy cheaply and
// sub-views alias the same buffer; buffer identity is what constant promotion keys on. An
// Emittable value references backend storage (an LLVM value plus the element type and
// pointer level needed to address it under opaque pointers); the backend's module or
// function owns that storage. Scalar is a single-element convenience wrapper.

//! Values, scalars and their underlying data.

use super::element::Element;
use super::error::{EmitError, EmitResult, InputError};
use super::layout::MemoryLayout;
use super::types::{TypeDescription, ValueType};
use inkwell::types::BasicTypeEnum;
use inkwell::values::BasicValueEnum;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Shared host storage for constant elements.
pub type Buffer<T> = Rc<RefCell<Vec<T>>>;

/// A typed constant buffer.
#[derive(Debug, Clone)]
pub enum ConstantData {
    Boolean(Buffer<bool>),
    Byte(Buffer<u8>),
    Char8(Buffer<i8>),
    Int16(Buffer<i16>),
    Int32(Buffer<i32>),
    Int64(Buffer<i64>),
    Float(Buffer<f32>),
    Double(Buffer<f64>),
}

/// Expands `$body` once per buffer variant with `$buffer` bound to the typed buffer.
#[macro_export]
macro_rules! with_constant_data {
    ($data:expr, $buffer:ident => $body:expr) => {
        match $data {
            $crate::core::ConstantData::Boolean($buffer) => $body,
            $crate::core::ConstantData::Byte($buffer) => $body,
            $crate::core::ConstantData::Char8($buffer) => $body,
            $crate::core::ConstantData::Int16($buffer) => $body,
            $crate::core::ConstantData::Int32($buffer) => $body,
            $crate::core::ConstantData::Int64($buffer) => $body,
            $crate::core::ConstantData::Float($buffer) => $body,
            $crate::core::ConstantData::Double($buffer) => $body,
        }
    };
}

impl ConstantData {
    pub fn from_vec<T: Element>(data: Vec<T>) -> Self {
        T::wrap(Rc::new(RefCell::new(data)))
    }

    /// Zero-filled buffer of `len` elements.
    pub fn zeroed(ty: ValueType, len: usize) -> EmitResult<Self> {
        Ok(match ty {
            ValueType::Boolean => Self::from_vec(vec![false; len]),
            ValueType::Byte => Self::from_vec(vec![0u8; len]),
            ValueType::Char8 => Self::from_vec(vec![0i8; len]),
            ValueType::Int16 => Self::from_vec(vec![0i16; len]),
            ValueType::Int32 => Self::from_vec(vec![0i32; len]),
            ValueType::Int64 => Self::from_vec(vec![0i64; len]),
            ValueType::Float => Self::from_vec(vec![0f32; len]),
            ValueType::Double => Self::from_vec(vec![0f64; len]),
            ValueType::Void | ValueType::Undefined => {
                return Err(EmitError::invalid_argument(format!(
                    "cannot allocate storage of type {}",
                    ty
                )))
            }
        })
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            ConstantData::Boolean(_) => ValueType::Boolean,
            ConstantData::Byte(_) => ValueType::Byte,
            ConstantData::Char8(_) => ValueType::Char8,
            ConstantData::Int16(_) => ValueType::Int16,
            ConstantData::Int32(_) => ValueType::Int32,
            ConstantData::Int64(_) => ValueType::Int64,
            ConstantData::Float(_) => ValueType::Float,
            ConstantData::Double(_) => ValueType::Double,
        }
    }

    pub fn len(&self) -> usize {
        with_constant_data!(self, buffer => buffer.borrow().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when both refer to the very same buffer.
    pub fn same_buffer(&self, other: &ConstantData) -> bool {
        match (self, other) {
            (ConstantData::Boolean(a), ConstantData::Boolean(b)) => Rc::ptr_eq(a, b),
            (ConstantData::Byte(a), ConstantData::Byte(b)) => Rc::ptr_eq(a, b),
            (ConstantData::Char8(a), ConstantData::Char8(b)) => Rc::ptr_eq(a, b),
            (ConstantData::Int16(a), ConstantData::Int16(b)) => Rc::ptr_eq(a, b),
            (ConstantData::Int32(a), ConstantData::Int32(b)) => Rc::ptr_eq(a, b),
            (ConstantData::Int64(a), ConstantData::Int64(b)) => Rc::ptr_eq(a, b),
            (ConstantData::Float(a), ConstantData::Float(b)) => Rc::ptr_eq(a, b),
            (ConstantData::Double(a), ConstantData::Double(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Reads one element converted to `T`.
    pub fn get<T: Element>(&self, index: usize) -> EmitResult<T> {
        with_constant_data!(self, buffer => {
            let buffer = buffer.borrow();
            buffer
                .get(index)
                .map(|element| element.cast::<T>())
                .ok_or_else(|| out_of_bounds(index, buffer.len()))
        })
    }

    /// Renders one element for diagnostics.
    pub fn format_element(&self, index: usize) -> String {
        with_constant_data!(self, buffer => buffer
            .borrow()
            .get(index)
            .map(|element| element.to_string())
            .unwrap_or_else(|| "<out of bounds>".to_string()))
    }
}

pub(crate) fn out_of_bounds(index: usize, len: usize) -> EmitError {
    EmitError::invalid_size(format!("element {} is outside a buffer of {} elements", index, len))
}

/// Backend-owned runtime storage referenced by a Value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Emittable<'ctx> {
    /// The LLVM handle: a pointer for `pointer_level > 0`, otherwise an SSA scalar.
    pub value: BasicValueEnum<'ctx>,
    /// Type of the innermost element.
    pub element_type: BasicTypeEnum<'ctx>,
    pub pointer_level: u32,
}

impl<'ctx> Emittable<'ctx> {
    pub fn new(value: BasicValueEnum<'ctx>, element_type: BasicTypeEnum<'ctx>, pointer_level: u32) -> Self {
        Self {
            value,
            element_type,
            pointer_level,
        }
    }
}

/// What a Value currently holds.
#[derive(Debug, Clone)]
pub enum UnderlyingData<'ctx> {
    Undefined,
    Emittable(Emittable<'ctx>),
    Constant { data: ConstantData, offset: usize },
}

/// Typed, laid-out handle to constant or backend data.
#[derive(Debug, Clone)]
pub struct Value<'ctx> {
    ty: TypeDescription,
    layout: Option<MemoryLayout>,
    data: UnderlyingData<'ctx>,
}

impl<'ctx> Value<'ctx> {
    /// A declared but unallocated value.
    pub fn undefined(ty: TypeDescription, layout: Option<MemoryLayout>) -> Self {
        Self {
            ty,
            layout,
            data: UnderlyingData::Undefined,
        }
    }

    /// Wraps `offset..` of a constant buffer.
    pub fn constant(data: ConstantData, offset: usize, layout: Option<MemoryLayout>) -> Self {
        Self {
            ty: TypeDescription::pointer_to(data.value_type()),
            layout,
            data: UnderlyingData::Constant { data, offset },
        }
    }

    /// 1-D constant over the whole vector.
    pub fn from_vec<T: Element>(data: Vec<T>) -> Self {
        let layout = MemoryLayout::new([data.len()]);
        Self::constant(ConstantData::from_vec(data), 0, Some(layout))
    }

    /// References backend storage.
    pub fn emitted(emittable: Emittable<'ctx>, ty: TypeDescription, layout: Option<MemoryLayout>) -> Self {
        Self {
            ty,
            layout,
            data: UnderlyingData::Emittable(emittable),
        }
    }

    pub fn base_type(&self) -> ValueType {
        self.ty.base
    }

    pub fn pointer_level(&self) -> u32 {
        self.ty.pointer_level
    }

    pub fn type_description(&self) -> TypeDescription {
        self.ty
    }

    pub fn layout(&self) -> Option<&MemoryLayout> {
        self.layout.as_ref()
    }

    /// The layout, or the scalar layout for unconstrained values.
    pub fn layout_or_scalar(&self) -> MemoryLayout {
        self.layout.clone().unwrap_or_else(MemoryLayout::scalar)
    }

    pub fn set_layout(&mut self, layout: MemoryLayout) {
        self.layout = Some(layout);
    }

    /// Whether the value carries a layout.
    pub fn is_constrained(&self) -> bool {
        self.layout.is_some()
    }

    /// Unconstrained or exactly the scalar layout.
    pub fn is_scalar_shaped(&self) -> bool {
        self.layout.as_ref().map_or(true, MemoryLayout::is_scalar)
    }

    pub fn data(&self) -> &UnderlyingData<'ctx> {
        &self.data
    }

    pub fn is_defined(&self) -> bool {
        !matches!(self.data, UnderlyingData::Undefined)
    }

    pub fn is_constant(&self) -> bool {
        matches!(self.data, UnderlyingData::Constant { .. })
    }

    pub fn is_emittable(&self) -> bool {
        matches!(self.data, UnderlyingData::Emittable(_))
    }

    /// True when the layout has no active elements.
    pub fn is_empty(&self) -> bool {
        self.layout.as_ref().map_or(false, MemoryLayout::is_empty)
    }

    pub fn is_floating_point(&self) -> bool {
        self.ty.base.is_floating_point()
    }

    pub fn is_boolean(&self) -> bool {
        self.ty.base == ValueType::Boolean
    }

    /// Reassigns the underlying data; for constants the type follows the buffer.
    pub fn set_data(&mut self, data: UnderlyingData<'ctx>) {
        if let UnderlyingData::Constant { data: buffer, .. } = &data {
            self.ty = TypeDescription::pointer_to(buffer.value_type());
        }
        self.data = data;
    }

    /// Forgets the underlying data, keeping type and layout.
    pub fn reset(&mut self) {
        self.data = UnderlyingData::Undefined;
    }

    pub fn emittable(&self) -> Option<Emittable<'ctx>> {
        match &self.data {
            UnderlyingData::Emittable(emittable) => Some(*emittable),
            _ => None,
        }
    }

    /// The constant buffer and this value's offset into it.
    pub fn constant_data(&self) -> Option<(&ConstantData, usize)> {
        match &self.data {
            UnderlyingData::Constant { data, offset } => Some((data, *offset)),
            _ => None,
        }
    }

    /// Fails with [`InputError::UndefinedValue`] unless the value holds data.
    pub fn ensure_defined(&self) -> EmitResult<&Self> {
        if self.is_defined() {
            Ok(self)
        } else {
            Err(InputError::UndefinedValue.into())
        }
    }

    /// Reads the element at physical `offset` of a constant value.
    pub fn element<T: Element>(&self, offset: usize) -> EmitResult<T> {
        match &self.data {
            UnderlyingData::Constant { data, offset: base } => data.get(base + offset),
            UnderlyingData::Undefined => Err(InputError::UndefinedValue.into()),
            UnderlyingData::Emittable(_) => Err(EmitError::illegal_state(
                "runtime values cannot be read at compile time",
            )),
        }
    }

    /// Active elements of a constant value in coordinate order.
    pub fn to_vec<T: Element>(&self) -> EmitResult<Vec<T>> {
        let layout = self.layout_or_scalar();
        layout
            .coordinates()
            .map(|coord| self.element(layout.entry_offset(&coord)))
            .collect()
    }
}

impl fmt::Display for Value<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.data {
            UnderlyingData::Undefined => write!(f, "<undefined {}>", self.ty),
            UnderlyingData::Emittable(emittable) => {
                write!(f, "<emitted {}> {}", self.ty, emittable.value.print_to_string())
            }
            UnderlyingData::Constant { data, offset } => {
                let layout = self.layout_or_scalar();
                let elements: Vec<String> = layout
                    .coordinates()
                    .map(|coord| data.format_element(offset + layout.entry_offset(&coord)))
                    .collect();
                write!(f, "[{}]", elements.join(", "))
            }
        }
    }
}

/// Single-element value.
#[derive(Debug, Clone)]
pub struct Scalar<'ctx>(Value<'ctx>);

impl<'ctx> Scalar<'ctx> {
    /// Wraps a scalar-shaped value, giving unconstrained values the scalar layout.
    pub fn new(mut value: Value<'ctx>) -> EmitResult<Self> {
        if !value.is_scalar_shaped() {
            return Err(EmitError::invalid_size(format!(
                "scalar requires a single-element layout, got {:?}",
                value.layout().map(MemoryLayout::active_size)
            )));
        }
        if !value.is_constrained() {
            value.set_layout(MemoryLayout::scalar());
        }
        Ok(Self(value))
    }

    pub fn from_constant<T: Element>(value: T) -> Self {
        Self(Value::constant(
            ConstantData::from_vec(vec![value]),
            0,
            Some(MemoryLayout::scalar()),
        ))
    }

    pub fn value(&self) -> &Value<'ctx> {
        &self.0
    }

    pub fn into_value(self) -> Value<'ctx> {
        self.0
    }

    pub fn get<T: Element>(&self) -> EmitResult<T> {
        self.0.element(0)
    }
}

impl<'ctx> From<Scalar<'ctx>> for Value<'ctx> {
    fn from(scalar: Scalar<'ctx>) -> Self {
        scalar.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_value_predicates() {
        let value = Value::from_vec(vec![1.0f64, 2.0, 3.0]);
        assert!(value.is_defined());
        assert!(value.is_constant());
        assert!(!value.is_emittable());
        assert!(value.is_floating_point());
        assert_eq!(value.type_description(), TypeDescription::pointer_to(ValueType::Double));
        assert_eq!(value.to_vec::<f64>().unwrap(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_reset_keeps_shape() {
        let mut value = Value::from_vec(vec![1i32, 2]);
        value.reset();
        assert!(!value.is_defined());
        assert_eq!(value.layout().unwrap().active_size(), &[2]);
        assert_eq!(
            value.element::<i32>(0).unwrap_err(),
            EmitError::from(InputError::UndefinedValue)
        );
    }

    #[test]
    fn test_sub_view_shares_buffer() {
        let data = ConstantData::from_vec(vec![10i16, 20, 30, 40]);
        let tail = Value::constant(data.clone(), 2, Some(MemoryLayout::new([2])));
        assert_eq!(tail.to_vec::<i16>().unwrap(), vec![30, 40]);

        if let ConstantData::Int16(buffer) = &data {
            buffer.borrow_mut()[3] = 41;
        }
        assert_eq!(tail.to_vec::<i16>().unwrap(), vec![30, 41]);
        assert!(tail.constant_data().unwrap().0.same_buffer(&data));
    }

    #[test]
    fn test_scalar_rejects_arrays() {
        assert!(Scalar::new(Value::from_vec(vec![1, 2])).is_err());

        let unconstrained = Value::constant(ConstantData::from_vec(vec![7i64]), 0, None);
        let scalar = Scalar::new(unconstrained).unwrap();
        assert!(scalar.value().layout().unwrap().is_scalar());
        assert_eq!(scalar.get::<i64>().unwrap(), 7);
    }

    #[test]
    fn test_display_constant() {
        let value = Value::from_vec(vec![true, false]);
        assert_eq!(value.to_string(), "[true, false]");
    }
}
