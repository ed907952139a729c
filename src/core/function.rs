//! Function declarations and the built-in intrinsic catalog.
//!
//! A [`FunctionDeclaration`] is an immutable key: two declarations are equal
//! iff name, parameter descriptions and return description all match. It keys
//! user-defined functions in both backends and identifies intrinsics.

use super::context::EmitterContext;
use super::error::{EmitError, EmitResult};
use super::layout::MemoryLayout;
use super::types::TypeDescription;
use super::value::Value;
use std::fmt;

/// Type and optional shape of a parameter or return value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParameterDescription {
    pub ty: TypeDescription,
    pub layout: Option<MemoryLayout>,
}

impl ParameterDescription {
    pub fn new(ty: TypeDescription, layout: Option<MemoryLayout>) -> Self {
        Self { ty, layout }
    }

    /// Placeholder used by intrinsics, which accept any numeric type.
    pub fn any() -> Self {
        Self::new(TypeDescription::undefined(), None)
    }

    pub fn of_value(value: &Value<'_>) -> Self {
        Self::new(value.type_description(), value.layout().cloned())
    }

    /// An undefined value with this description.
    pub fn to_value<'ctx>(&self) -> Value<'ctx> {
        Value::undefined(self.ty, self.layout.clone())
    }
}

/// Name plus signature of a function.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionDeclaration {
    name: String,
    parameters: Vec<ParameterDescription>,
    return_type: Option<ParameterDescription>,
}

impl FunctionDeclaration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: Vec::new(),
            return_type: None,
        }
    }

    pub fn parameters(mut self, parameters: impl IntoIterator<Item = ParameterDescription>) -> Self {
        self.parameters = parameters.into_iter().collect();
        self
    }

    pub fn returns(mut self, return_type: ParameterDescription) -> Self {
        self.return_type = Some(return_type);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameter_types(&self) -> &[ParameterDescription] {
        &self.parameters
    }

    pub fn return_type(&self) -> Option<&ParameterDescription> {
        self.return_type.as_ref()
    }

    pub fn is_intrinsic(&self) -> bool {
        Intrinsic::from_declaration(self).is_some()
    }

    /// Checks arity and base types of a call against this declaration.
    /// A base type mismatch is an invalid argument.
    pub fn check_arguments(&self, args: &[Value<'_>]) -> EmitResult<()> {
        self.check_with(args, |reason| EmitError::invalid_argument(reason))
    }

    /// Like [`check_arguments`](Self::check_arguments), but a base type
    /// mismatch is reported as a type mismatch.
    pub fn check_argument_types(&self, args: &[Value<'_>]) -> EmitResult<()> {
        self.check_with(args, |reason| EmitError::type_mismatch(reason))
    }

    fn check_with(&self, args: &[Value<'_>], mismatch: fn(String) -> EmitError) -> EmitResult<()> {
        if args.len() != self.parameters.len() {
            return Err(EmitError::invalid_argument(format!(
                "`{}` expects {} arguments, got {}",
                self.name,
                self.parameters.len(),
                args.len()
            )));
        }
        for (idx, (arg, param)) in args.iter().zip(&self.parameters).enumerate() {
            if arg.base_type() != param.ty.base {
                return Err(mismatch(format!(
                    "argument {} of `{}` is {}, expected {}",
                    idx,
                    self.name,
                    arg.base_type(),
                    param.ty.base
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Display for FunctionDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<String> = self.parameters.iter().map(|p| p.ty.to_string()).collect();
        write!(f, "{}({})", self.name, params.join(", "))?;
        if let Some(ret) = &self.return_type {
            write!(f, " -> {}", ret.ty)?;
        }
        Ok(())
    }
}

/// Built-in math functions with dedicated lowering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intrinsic {
    Abs,
    Sin,
    Cos,
    Exp,
    Log,
    Sqrt,
    Tanh,
    Pow,
    Max,
    Min,
}

impl Intrinsic {
    pub const ALL: [Intrinsic; 10] = [
        Intrinsic::Abs,
        Intrinsic::Sin,
        Intrinsic::Cos,
        Intrinsic::Exp,
        Intrinsic::Log,
        Intrinsic::Sqrt,
        Intrinsic::Tanh,
        Intrinsic::Pow,
        Intrinsic::Max,
        Intrinsic::Min,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Intrinsic::Abs => "abs",
            Intrinsic::Sin => "sin",
            Intrinsic::Cos => "cos",
            Intrinsic::Exp => "exp",
            Intrinsic::Log => "log",
            Intrinsic::Sqrt => "sqrt",
            Intrinsic::Tanh => "tanh",
            Intrinsic::Pow => "pow",
            Intrinsic::Max => "max",
            Intrinsic::Min => "min",
        }
    }

    /// The fixed declaration callers use to invoke this intrinsic.
    pub fn declaration(self) -> FunctionDeclaration {
        let arity = if self == Intrinsic::Pow { 2 } else { 1 };
        FunctionDeclaration::new(self.name())
            .parameters(vec![ParameterDescription::any(); arity])
            .returns(ParameterDescription::any())
    }

    pub fn from_declaration(decl: &FunctionDeclaration) -> Option<Self> {
        Self::ALL.into_iter().find(|intrinsic| intrinsic.declaration() == *decl)
    }

    /// Element-wise single-operand intrinsics.
    pub fn is_unary(self) -> bool {
        !matches!(self, Intrinsic::Pow | Intrinsic::Max | Intrinsic::Min)
    }

    /// Argument checks shared by folding and emission.
    pub fn validate(self, args: &[Value<'_>]) -> EmitResult<()> {
        let reject_boolean = |value: &Value<'_>| {
            if value.is_boolean() {
                Err(EmitError::type_mismatch(format!(
                    "`{}` does not accept boolean operands",
                    self.name()
                )))
            } else {
                Ok(())
            }
        };
        let same_type = |lhs: &Value<'_>, rhs: &Value<'_>| {
            if lhs.base_type() != rhs.base_type() {
                Err(EmitError::type_mismatch(format!(
                    "`{}` operands differ: {} vs {}",
                    self.name(),
                    lhs.base_type(),
                    rhs.base_type()
                )))
            } else {
                Ok(())
            }
        };

        match (self, args) {
            (Intrinsic::Pow, [base, exponent]) => {
                same_type(base, exponent)?;
                reject_boolean(base)?;
                if !exponent.is_scalar_shaped() {
                    return Err(EmitError::invalid_size("`pow` exponent must be a scalar"));
                }
                Ok(())
            }
            (Intrinsic::Max | Intrinsic::Min, [lhs, rhs]) => {
                same_type(lhs, rhs)?;
                reject_boolean(lhs)?;
                if !lhs.is_scalar_shaped() || !rhs.is_scalar_shaped() {
                    return Err(EmitError::invalid_size(format!(
                        "two-operand `{}` requires scalar operands",
                        self.name()
                    )));
                }
                Ok(())
            }
            (Intrinsic::Pow, _) => Err(EmitError::invalid_size(format!(
                "`pow` expects 2 arguments, got {}",
                args.len()
            ))),
            (_, [value]) => reject_boolean(value),
            _ => Err(EmitError::invalid_size(format!(
                "`{}` received {} arguments",
                self.name(),
                args.len()
            ))),
        }
    }
}

/// Handle to a function defined through [`EmitterContext::create_function`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinedFunction {
    declaration: FunctionDeclaration,
}

impl DefinedFunction {
    pub fn new(declaration: FunctionDeclaration) -> Self {
        Self { declaration }
    }

    pub fn declaration(&self) -> &FunctionDeclaration {
        &self.declaration
    }

    pub fn call<'ctx>(
        &self,
        ctx: &mut dyn EmitterContext<'ctx>,
        args: Vec<Value<'ctx>>,
    ) -> EmitResult<Option<Value<'ctx>>> {
        ctx.call(&self.declaration, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ValueType;

    fn double_param() -> ParameterDescription {
        ParameterDescription::new(TypeDescription::pointer_to(ValueType::Double), Some(MemoryLayout::new([4])))
    }

    #[test]
    fn test_declaration_equality() {
        let a = FunctionDeclaration::new("f").parameters([double_param()]);
        let b = FunctionDeclaration::new("f").parameters([double_param()]);
        let c = FunctionDeclaration::new("f")
            .parameters([double_param()])
            .returns(double_param());
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, FunctionDeclaration::new("g").parameters([double_param()]));
    }

    #[test]
    fn test_intrinsic_lookup() {
        for intrinsic in Intrinsic::ALL {
            assert_eq!(Intrinsic::from_declaration(&intrinsic.declaration()), Some(intrinsic));
        }
        let user_abs = FunctionDeclaration::new("abs").parameters([double_param()]);
        assert!(!user_abs.is_intrinsic());
    }

    #[test]
    fn test_intrinsic_validation() {
        let doubles = Value::from_vec(vec![2.0f64, 3.0]);
        let exponent = Value::from_vec(vec![2.0f64]);
        assert!(Intrinsic::Pow.validate(&[doubles.clone(), exponent]).is_ok());

        let err = Intrinsic::Pow.validate(&[doubles.clone(), doubles.clone()]).unwrap_err();
        assert_eq!(err, EmitError::invalid_size("`pow` exponent must be a scalar"));

        let flags = Value::from_vec(vec![true]);
        let err = Intrinsic::Sqrt.validate(&[flags]).unwrap_err();
        assert!(matches!(err, EmitError::Input(crate::core::InputError::TypeMismatch { .. })));

        assert!(Intrinsic::Max.validate(&[doubles.clone(), doubles]).is_err());
    }

    #[test]
    fn test_check_arguments() {
        let decl = FunctionDeclaration::new("f").parameters([double_param()]);
        assert!(decl.check_arguments(&[Value::from_vec(vec![1.0f64; 4])]).is_ok());
        assert!(decl.check_arguments(&[Value::from_vec(vec![1i32; 4])]).is_err());
        assert!(decl.check_arguments(&[]).is_err());

        let err = decl.check_argument_types(&[Value::from_vec(vec![1i32; 4])]).unwrap_err();
        assert!(matches!(err, EmitError::Input(crate::core::InputError::TypeMismatch { .. })));
        let err = decl.check_argument_types(&[]).unwrap_err();
        assert!(matches!(err, EmitError::Input(crate::core::InputError::InvalidArgument { .. })));
    }
}
