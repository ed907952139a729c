//! Scalar type system of the value IR.
//!
//! A [`TypeDescription`] pairs a base [`ValueType`] with a pointer level:
//! level 0 is a plain scalar, level N is N-fold indirection.

use std::fmt;

/// Base type tag of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Undefined,
    Void,
    Boolean,
    Byte,
    Char8,
    Int16,
    Int32,
    Int64,
    Float,
    Double,
}

impl ValueType {
    pub fn is_floating_point(self) -> bool {
        matches!(self, ValueType::Float | ValueType::Double)
    }

    pub fn is_integral(self) -> bool {
        matches!(
            self,
            ValueType::Byte | ValueType::Char8 | ValueType::Int16 | ValueType::Int32 | ValueType::Int64
        )
    }

    /// Whether values of this type can be stored in memory.
    pub fn is_storable(self) -> bool {
        !matches!(self, ValueType::Undefined | ValueType::Void)
    }

    /// Bytes one element occupies in memory. Booleans take a full byte.
    pub fn size_in_bytes(self) -> Option<u64> {
        match self {
            ValueType::Boolean | ValueType::Byte | ValueType::Char8 => Some(1),
            ValueType::Int16 => Some(2),
            ValueType::Int32 | ValueType::Float => Some(4),
            ValueType::Int64 | ValueType::Double => Some(8),
            ValueType::Undefined | ValueType::Void => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ValueType::Undefined => "undefined",
            ValueType::Void => "void",
            ValueType::Boolean => "bool",
            ValueType::Byte => "byte",
            ValueType::Char8 => "char8",
            ValueType::Int16 => "int16",
            ValueType::Int32 => "int32",
            ValueType::Int64 => "int64",
            ValueType::Float => "float",
            ValueType::Double => "double",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Base type plus pointer indirection level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeDescription {
    pub base: ValueType,
    pub pointer_level: u32,
}

impl TypeDescription {
    pub const fn new(base: ValueType, pointer_level: u32) -> Self {
        Self { base, pointer_level }
    }

    pub const fn scalar(base: ValueType) -> Self {
        Self::new(base, 0)
    }

    /// One level of indirection over `base`; the shape of allocated data.
    pub const fn pointer_to(base: ValueType) -> Self {
        Self::new(base, 1)
    }

    pub const fn undefined() -> Self {
        Self::new(ValueType::Undefined, 0)
    }

    /// Void and Undefined never carry indirection.
    pub fn is_valid(&self) -> bool {
        self.base.is_storable() || self.pointer_level == 0
    }

    pub fn is_pointer(&self) -> bool {
        self.pointer_level > 0
    }

    /// Bytes one element of this description occupies; pointers take a host word.
    pub fn storage_bytes(&self) -> Option<u64> {
        if self.pointer_level > 1 {
            Some(std::mem::size_of::<usize>() as u64)
        } else {
            self.base.size_in_bytes()
        }
    }
}

impl fmt::Display for TypeDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.base)?;
        for _ in 0..self.pointer_level {
            f.write_str("*")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_description_validity() {
        assert!(TypeDescription::pointer_to(ValueType::Double).is_valid());
        assert!(TypeDescription::scalar(ValueType::Void).is_valid());
        assert!(!TypeDescription::new(ValueType::Void, 1).is_valid());
        assert!(!TypeDescription::new(ValueType::Undefined, 2).is_valid());
    }

    #[test]
    fn test_display() {
        assert_eq!(TypeDescription::new(ValueType::Int32, 2).to_string(), "int32**");
        assert_eq!(TypeDescription::scalar(ValueType::Boolean).to_string(), "bool");
    }

    #[test]
    fn test_storage_bytes() {
        assert_eq!(TypeDescription::pointer_to(ValueType::Boolean).storage_bytes(), Some(1));
        assert_eq!(TypeDescription::pointer_to(ValueType::Int16).storage_bytes(), Some(2));
        assert_eq!(TypeDescription::scalar(ValueType::Void).storage_bytes(), None);
    }
}
