//! Value IR - typed, shaped values over an interpreter and an LLVM backend.
//!
//! Code is written once against [`EmitterContext`] and either evaluated
//! directly or compiled to LLVM IR. Values carry a base type, a pointer level
//! and an optional [`MemoryLayout`] describing padding and dimension order.
//!
//! # Primary Usage
//!
//! ```ignore
//! use value_ir::{ComputeContext, EmitterContext, BinaryOperation, Value};
//!
//! let mut ctx = ComputeContext::new("demo");
//! let sum = ctx.binary_operation(BinaryOperation::Add, Value::from_vec(vec![1.0, 2.0]), &Value::from_vec(vec![3.0, 4.0]))?;
//! assert_eq!(sum.to_vec::<f64>()?, vec![4.0, 6.0]);
//! ```
//!
//! # Architecture
//!
//! - [`core`] - Types, layouts, values, functions and the emitter protocol
//! - [`compute`] - Interpreter over host buffers
//! - [`llvm`] - Code generation through inkwell

pub mod compute;
pub mod core;
pub mod llvm;

pub use compute::ComputeContext;
pub use core::{
    function_body, if_, BinaryOperation, ConstantData, DefinedFunction, Element, EmissionStats, EmitError,
    EmitResult, Emittable, EmitterContext, FunctionBody, FunctionDeclaration, GlobalAllocationScope, IfState,
    InputError, Intrinsic, LogicError, LogicalOperation, MemoryLayout, ParameterDescription, Scalar,
    TypeDescription, UnaryOperation, Value, ValueType,
};
pub use llvm::{LlvmContext, LlvmContextOptions};
