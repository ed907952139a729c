// This module defines EmitterContext, the operation set shared by every backend: allocation
// (stack and named globals), constant wrapping, data copy/move, pointer offset, unary,
// binary and logical operations, casts, function definition and call, unrolled iteration
// over a layout, and chained if/else-if/else branching. ComputeContext implements it by
// interpreting over constant buffers; LlvmContext lowers it to LLVM IR, folding through an
// embedded ComputeContext whenever all operands are constant. Function bodies and branch
// bodies receive the active context explicitly as `&mut dyn EmitterContext`, so several
// independent sessions can coexist without any process-wide state.

//! The abstract emitter protocol.

use super::error::{EmitError, EmitResult};
use super::function::{DefinedFunction, FunctionDeclaration};
use super::layout::MemoryLayout;
use super::types::{TypeDescription, ValueType};
use super::value::{ConstantData, Scalar, Value};
use inkwell::basic_block::BasicBlock;
use std::io::Write;
use std::rc::Rc;

/// Where a named global lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GlobalAllocationScope {
    /// Named `<module>_<name>`.
    Global,
    /// Named `<module>_<function>_<name>` after the function being emitted.
    Function,
}

/// Single-operand operations. No operator is specified yet; every backend
/// rejects them as not implemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum UnaryOperation {
    Unspecified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperation {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOperation {
    Equality,
    Inequality,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
}

/// Body of a user-defined function.
pub type FunctionBody<'ctx> =
    Rc<dyn Fn(&mut dyn EmitterContext<'ctx>, Vec<Value<'ctx>>) -> EmitResult<Option<Value<'ctx>>> + 'ctx>;

/// Boxes a closure as a [`FunctionBody`], pinning down its signature.
pub fn function_body<'ctx>(
    body: impl Fn(&mut dyn EmitterContext<'ctx>, Vec<Value<'ctx>>) -> EmitResult<Option<Value<'ctx>>> + 'ctx,
) -> FunctionBody<'ctx> {
    Rc::new(body)
}

/// Body of a branch.
pub type BlockFn<'a, 'ctx> = &'a mut dyn FnMut(&mut dyn EmitterContext<'ctx>) -> EmitResult<()>;

/// Body invoked per coordinate by [`EmitterContext::for_each`].
pub type ElementFn<'a, 'ctx> = &'a mut dyn FnMut(&mut dyn EmitterContext<'ctx>, &[Scalar<'ctx>]) -> EmitResult<()>;

/// Progress of an if/else-if/else chain.
#[derive(Debug, Clone, Copy)]
pub enum IfState<'ctx> {
    /// Interpreted chain; `taken` once a branch has run.
    Interpreted { taken: bool },
    /// Emitted chain. `pending` holds only a branch to `merge` until another
    /// arm claims it.
    Emitted {
        pending: BasicBlock<'ctx>,
        merge: BasicBlock<'ctx>,
    },
}

/// Operation set every backend supports.
pub trait EmitterContext<'ctx> {
    /// Fresh zero-initialized storage.
    fn allocate(&mut self, ty: ValueType, layout: MemoryLayout) -> EmitResult<Value<'ctx>>;

    /// Registers a named, zero-initialized global.
    fn global_allocate(
        &mut self,
        scope: GlobalAllocationScope,
        name: &str,
        ty: ValueType,
        layout: MemoryLayout,
    ) -> EmitResult<Value<'ctx>>;

    /// Registers a named global initialized from `data`.
    fn global_allocate_data(
        &mut self,
        scope: GlobalAllocationScope,
        name: &str,
        data: ConstantData,
        layout: MemoryLayout,
    ) -> EmitResult<Value<'ctx>>;

    fn get_global_value(&self, scope: GlobalAllocationScope, name: &str) -> EmitResult<Option<Value<'ctx>>>;

    /// Type of the value's storage.
    fn get_type(&self, value: &Value<'ctx>) -> EmitResult<TypeDescription>;

    /// Defines `decl` once; later definitions return the cached function.
    fn create_function(&mut self, decl: &FunctionDeclaration, body: FunctionBody<'ctx>) -> EmitResult<DefinedFunction>;

    fn is_function_defined(&self, decl: &FunctionDeclaration) -> bool;

    fn call(&mut self, decl: &FunctionDeclaration, args: Vec<Value<'ctx>>) -> EmitResult<Option<Value<'ctx>>>;

    /// Wraps caller data without allocating backend storage.
    fn store_constant_data(&mut self, data: ConstantData) -> EmitResult<Value<'ctx>>;

    /// Runs `body` once per coordinate of `layout`, last dimension fastest.
    fn for_each(&mut self, layout: &MemoryLayout, body: ElementFn<'_, 'ctx>) -> EmitResult<()>;

    fn copy_data(&mut self, source: &Value<'ctx>, destination: &mut Value<'ctx>) -> EmitResult<()>;

    /// Copies, then forgets the source's data.
    fn move_data(&mut self, source: &mut Value<'ctx>, destination: &mut Value<'ctx>) -> EmitResult<()> {
        self.copy_data(source, destination)?;
        source.reset();
        Ok(())
    }

    /// `base` advanced by `index` elements.
    fn offset(&mut self, base: &Value<'ctx>, index: &Scalar<'ctx>) -> EmitResult<Value<'ctx>>;

    fn unary_operation(&mut self, op: UnaryOperation, destination: Value<'ctx>) -> EmitResult<Value<'ctx>> {
        let _ = (op, destination);
        Err(EmitError::not_implemented("unary operation"))
    }

    /// `destination op= source`, allocating `destination` when undefined.
    fn binary_operation(
        &mut self,
        op: BinaryOperation,
        destination: Value<'ctx>,
        source: &Value<'ctx>,
    ) -> EmitResult<Value<'ctx>>;

    /// Boolean scalar: whether the relation holds at every coordinate.
    fn logical_operation(
        &mut self,
        op: LogicalOperation,
        lhs: &Value<'ctx>,
        rhs: &Value<'ctx>,
    ) -> EmitResult<Value<'ctx>>;

    fn cast(&mut self, value: &Value<'ctx>, ty: ValueType) -> EmitResult<Value<'ctx>>;

    fn begin_if(&mut self, test: &Scalar<'ctx>, body: BlockFn<'_, 'ctx>) -> EmitResult<IfState<'ctx>>;

    fn else_if(
        &mut self,
        state: IfState<'ctx>,
        test: &Scalar<'ctx>,
        body: BlockFn<'_, 'ctx>,
    ) -> EmitResult<IfState<'ctx>>;

    fn else_(&mut self, state: IfState<'ctx>, body: BlockFn<'_, 'ctx>) -> EmitResult<()>;

    /// Best-effort diagnostic output; never fails.
    fn debug_dump(&self, value: &Value<'ctx>, tag: &str, out: &mut dyn Write);
}

/// Chainable handle returned by [`if_`].
pub struct IfContext<'a, 'ctx> {
    ctx: &'a mut dyn EmitterContext<'ctx>,
    state: IfState<'ctx>,
}

impl<'a, 'ctx> IfContext<'a, 'ctx> {
    pub fn else_if(
        self,
        test: &Scalar<'ctx>,
        mut body: impl FnMut(&mut dyn EmitterContext<'ctx>) -> EmitResult<()>,
    ) -> EmitResult<Self> {
        let state = self.ctx.else_if(self.state, test, &mut body)?;
        Ok(Self { ctx: self.ctx, state })
    }

    pub fn else_(self, mut body: impl FnMut(&mut dyn EmitterContext<'ctx>) -> EmitResult<()>) -> EmitResult<()> {
        self.ctx.else_(self.state, &mut body)
    }
}

/// Starts an if-chain on `ctx`.
pub fn if_<'a, 'ctx>(
    ctx: &'a mut dyn EmitterContext<'ctx>,
    test: &Scalar<'ctx>,
    mut body: impl FnMut(&mut dyn EmitterContext<'ctx>) -> EmitResult<()>,
) -> EmitResult<IfContext<'a, 'ctx>> {
    let state = ctx.begin_if(test, &mut body)?;
    Ok(IfContext { ctx, state })
}

/// Base types must match for copies and arithmetic.
pub(crate) fn check_type_compatible(lhs: &Value<'_>, rhs: &Value<'_>) -> EmitResult<()> {
    if lhs.base_type() != rhs.base_type() {
        return Err(EmitError::type_mismatch(format!(
            "{} vs {}",
            lhs.type_description(),
            rhs.type_description()
        )));
    }
    Ok(())
}

/// Layouts must be identical for element-wise operations.
pub(crate) fn check_same_layout(lhs: &Value<'_>, rhs: &Value<'_>) -> EmitResult<MemoryLayout> {
    let layout = lhs.layout_or_scalar();
    let other = rhs.layout_or_scalar();
    if layout != other {
        return Err(EmitError::size_mismatch(format!(
            "layouts differ: {:?} vs {:?}",
            layout.active_size(),
            other.active_size()
        )));
    }
    Ok(layout)
}

/// Constant `Int32` index scalars for one coordinate.
pub(crate) fn index_scalars<'ctx>(coordinate: &[usize]) -> EmitResult<Vec<Scalar<'ctx>>> {
    coordinate
        .iter()
        .map(|&index| {
            i32::try_from(index)
                .map(Scalar::from_constant)
                .map_err(|_| EmitError::invalid_size(format!("coordinate {} does not fit an Int32 index", index)))
        })
        .collect()
}
