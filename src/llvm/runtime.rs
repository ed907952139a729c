//! Math runtime table backing the intrinsics.
//!
//! Functions are declared in the module on first use. Everything LLVM knows
//! as an intrinsic is called through `llvm.<op>.f32|f64`; `tanh` goes to libm.

use super::context::LlvmContext;
use crate::core::{EmitError, EmitResult, Intrinsic};
use inkwell::types::{AnyType, BasicMetadataTypeEnum};
use inkwell::values::FunctionValue;

/// Floating-point width an intrinsic is evaluated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MathWidth {
    Single,
    Double,
}

fn symbol(intrinsic: Intrinsic, width: MathWidth) -> Option<String> {
    let suffix = match width {
        MathWidth::Single => "f32",
        MathWidth::Double => "f64",
    };
    let llvm = |name: &str| Some(format!("llvm.{}.{}", name, suffix));
    match intrinsic {
        Intrinsic::Abs => llvm("fabs"),
        Intrinsic::Sin => llvm("sin"),
        Intrinsic::Cos => llvm("cos"),
        Intrinsic::Exp => llvm("exp"),
        Intrinsic::Log => llvm("log"),
        Intrinsic::Sqrt => llvm("sqrt"),
        Intrinsic::Pow => llvm("pow"),
        Intrinsic::Tanh => Some(match width {
            MathWidth::Single => "tanhf".to_string(),
            MathWidth::Double => "tanh".to_string(),
        }),
        Intrinsic::Max | Intrinsic::Min => None,
    }
}

impl<'ctx> LlvmContext<'ctx> {
    /// Runtime function computing `intrinsic` at `width`, declared on demand.
    pub(crate) fn math_function(&self, intrinsic: Intrinsic, width: MathWidth) -> EmitResult<FunctionValue<'ctx>> {
        let name = symbol(intrinsic, width).ok_or_else(|| {
            EmitError::illegal_state(format!("`{}` has no runtime function", intrinsic.name()))
        })?;
        let float = match width {
            MathWidth::Single => self.context.f32_type(),
            MathWidth::Double => self.context.f64_type(),
        };
        let arity = if intrinsic == Intrinsic::Pow { 2 } else { 1 };
        let params: Vec<BasicMetadataTypeEnum<'ctx>> = vec![float.into(); arity];
        let expected = float.fn_type(&params, false);

        if let Some(function) = self.module.get_function(&name) {
            if function.get_type() != expected {
                return Err(EmitError::type_mismatch(format!(
                    "`{}` already exists in the module as {}",
                    name,
                    function.get_type().print_to_string()
                )));
            }
            return Ok(function);
        }
        log::trace!("declaring math runtime function {}", name);
        Ok(self.module.add_function(&name, expected, None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbols() {
        assert_eq!(symbol(Intrinsic::Abs, MathWidth::Single).as_deref(), Some("llvm.fabs.f32"));
        assert_eq!(symbol(Intrinsic::Pow, MathWidth::Double).as_deref(), Some("llvm.pow.f64"));
        assert_eq!(symbol(Intrinsic::Tanh, MathWidth::Single).as_deref(), Some("tanhf"));
        assert_eq!(symbol(Intrinsic::Max, MathWidth::Double), None);
    }
}
