// This module is the backend-independent half of the value IR. It defines the scalar type
// system (ValueType, TypeDescription), the host element trait backing constant buffers,
// MemoryLayout with the shared coordinate odometer, Value/Scalar and their tagged
// underlying data, function declarations with the intrinsic catalog, the EmitterContext
// protocol both backends implement, the input/logic error taxonomy, and emission
// statistics.

//! Core value IR infrastructure.
//!
//! # Key Components
//!
//! ## Types (`types`, `element`)
//! - Base type tags plus pointer level
//! - Host scalar trait used by constant buffers and the interpreter
//!
//! ## Layouts (`layout`)
//! - Active region, padding and dimension order of an allocation
//! - Odometer iteration, last dimension fastest
//!
//! ## Values (`value`)
//! - Undefined / constant / emitted data as one tagged variant
//!
//! ## Protocol (`context`, `function`)
//! - `EmitterContext` operation set and if-chains
//! - Function declarations and intrinsics

pub mod context;
pub mod element;
pub mod error;
pub mod function;
pub mod layout;
pub mod stats;
pub mod types;
pub mod value;

pub use context::{
    function_body, if_, BinaryOperation, BlockFn, ElementFn, EmitterContext, FunctionBody, GlobalAllocationScope, IfContext,
    IfState, LogicalOperation, UnaryOperation,
};
pub use element::Element;
pub use error::{EmitError, EmitResult, InputError, LogicError};
pub use function::{DefinedFunction, FunctionDeclaration, Intrinsic, ParameterDescription};
pub use layout::{increment_coordinate, CoordinateIter, MemoryLayout};
pub use stats::EmissionStats;
pub use types::{TypeDescription, ValueType};
pub use value::{Buffer, ConstantData, Emittable, Scalar, UnderlyingData, Value};
