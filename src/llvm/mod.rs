// This module is the compiling backend. LlvmContext implements the EmitterContext protocol
// on top of inkwell: values that are entirely constant are folded through the interpreter,
// constant buffers that meet runtime code are promoted into globals or stack arrays, and
// every other operation is lowered per coordinate into the current function. The finished
// inkwell Module is handed back to the caller for verification, printing or JIT execution.

//! LLVM code generation for the value IR.
//!
//! # Example
//! ```ignore
//! use inkwell::context::Context;
//! use value_ir::llvm::LlvmContext;
//!
//! let context = Context::create();
//! let mut emitter = LlvmContext::new(&context, "kernels");
//! // define functions through EmitterContext::create_function
//! let module = emitter.finish()?;
//! ```

mod branch;
mod context;
mod emitter;
mod intrinsics;
mod promotion;
mod runtime;
mod types;

pub use context::{LlvmContext, LlvmContextOptions};
