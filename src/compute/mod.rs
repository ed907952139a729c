// This module implements ComputeContext, the interpreting backend. Every Value it produces
// or accepts is a constant: allocation creates a zero-filled host buffer sized to the
// layout's allocated element count, binary/logical/cast operations walk the layout's
// coordinates in odometer order and compute with the host type matching the base type, and
// function calls run the registered body eagerly with this context as the active emitter.
// It doubles as the constant folder embedded in the LLVM backend, which hands operations
// over whenever every operand is already constant.

//! Interpreting backend over constant buffers.

mod intrinsics;

pub(crate) use intrinsics::call_intrinsic;

use crate::core::context::{check_same_layout, check_type_compatible, index_scalars};
use crate::core::{
    BinaryOperation, BlockFn, Buffer, ConstantData, DefinedFunction, Element, ElementFn, EmitError, EmitResult,
    EmitterContext, FunctionBody, FunctionDeclaration, GlobalAllocationScope, IfState, InputError, Intrinsic,
    LogicalOperation, MemoryLayout, Scalar, TypeDescription, Value, ValueType,
};
use crate::core::value::out_of_bounds;
use crate::with_constant_data;
use hashbrown::HashMap;
use std::io::Write;

/// Interpreter for the value IR.
pub struct ComputeContext<'ctx> {
    module_name: String,
    globals: HashMap<String, Value<'ctx>>,
    functions: HashMap<FunctionDeclaration, FunctionBody<'ctx>>,
    /// Names of the functions currently executing, innermost last.
    call_stack: Vec<String>,
}

impl<'ctx> ComputeContext<'ctx> {
    pub fn new(module_name: impl Into<String>) -> Self {
        Self {
            module_name: module_name.into(),
            globals: HashMap::new(),
            functions: HashMap::new(),
            call_stack: Vec::new(),
        }
    }

    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    fn global_name(&self, scope: GlobalAllocationScope, name: &str) -> EmitResult<String> {
        match scope {
            GlobalAllocationScope::Global => Ok(format!("{}_{}", self.module_name, name)),
            GlobalAllocationScope::Function => {
                let function = self.call_stack.last().ok_or_else(|| {
                    EmitError::illegal_state(format!("function-scope global `{}` outside of a function", name))
                })?;
                Ok(format!("{}_{}_{}", self.module_name, function, name))
            }
        }
    }

    fn register_global(&mut self, qualified: String, value: Value<'ctx>) -> EmitResult<Value<'ctx>> {
        if self.globals.contains_key(&qualified) {
            return Err(EmitError::invalid_argument(format!("global `{}` already exists", qualified)));
        }
        log::debug!("registered global {}", qualified);
        self.globals.insert(qualified, value.clone());
        Ok(value)
    }
}

fn require_constant(value: &Value<'_>, role: &str) -> EmitResult<()> {
    value.ensure_defined()?;
    if !value.is_constant() {
        return Err(EmitError::illegal_state(format!(
            "{} is a runtime value; the interpreter only handles constants",
            role
        )));
    }
    Ok(())
}

/// Collects the active elements of `source` in coordinate order before any
/// buffer is borrowed mutably, so aliasing views stay sound.
fn snapshot<T: Element>(source: &Value<'_>, layout: &MemoryLayout) -> EmitResult<Vec<T>> {
    layout
        .coordinates()
        .map(|coord| source.element(layout.entry_offset(&coord)))
        .collect()
}

/// Buffer indices a write will touch, checked against the buffer length up
/// front so a failing operation leaves the destination untouched.
fn writable_indices(indices: impl Iterator<Item = usize>, len: usize) -> EmitResult<Vec<usize>> {
    indices
        .map(|index| if index < len { Ok(index) } else { Err(out_of_bounds(index, len)) })
        .collect()
}

fn apply_binary<T: Element>(
    op: BinaryOperation,
    destination: &Buffer<T>,
    offset: usize,
    source: &Value<'_>,
    layout: &MemoryLayout,
) -> EmitResult<()> {
    let rhs = snapshot::<T>(source, layout)?;
    let mut destination = destination.borrow_mut();
    let indices = writable_indices(
        layout.coordinates().map(|coord| offset + layout.entry_offset(&coord)),
        destination.len(),
    )?;
    let results = indices
        .iter()
        .zip(rhs)
        .map(|(&index, rhs)| T::binary(op, destination[index], rhs))
        .collect::<EmitResult<Vec<T>>>()?;
    for (index, result) in indices.into_iter().zip(results) {
        destination[index] = result;
    }
    Ok(())
}

fn all_hold<T: Element>(
    op: LogicalOperation,
    lhs: &Buffer<T>,
    offset: usize,
    rhs: &Value<'_>,
    layout: &MemoryLayout,
) -> EmitResult<bool> {
    let rhs = snapshot::<T>(rhs, layout)?;
    let lhs = lhs.borrow();
    for (coord, rhs) in layout.coordinates().zip(rhs) {
        let index = offset + layout.entry_offset(&coord);
        let element = lhs.get(index).ok_or_else(|| out_of_bounds(index, lhs.len()))?;
        if !op.holds(T::compare(*element, rhs)) {
            return Ok(false);
        }
    }
    Ok(true)
}

fn copy_into<T: Element>(
    destination: &Buffer<T>,
    offset: usize,
    destination_layout: &MemoryLayout,
    source: &Value<'_>,
    source_layout: &MemoryLayout,
) -> EmitResult<()> {
    let elements = snapshot::<T>(source, source_layout)?;
    let mut destination = destination.borrow_mut();
    let indices = writable_indices(
        source_layout.coordinates().map(|coord| {
            offset + destination_layout.logical_entry_offset(&source_layout.logical_coordinates(&coord))
        }),
        destination.len(),
    )?;
    for (index, element) in indices.into_iter().zip(elements) {
        destination[index] = element;
    }
    Ok(())
}

fn cast_into<S: Element, T: Element>(
    source: &Buffer<S>,
    source_offset: usize,
    destination: &Buffer<T>,
    len: usize,
) -> EmitResult<()> {
    let source = source.borrow();
    let mut destination = destination.borrow_mut();
    let available = source.len().saturating_sub(source_offset);
    if available < len {
        return Err(EmitError::invalid_size(format!(
            "cast reads {} elements from a view of {}",
            len, available
        )));
    }
    for (out, element) in destination.iter_mut().zip(&source[source_offset..source_offset + len]) {
        *out = element.cast::<T>();
    }
    Ok(())
}

/// Extracts the boolean of a constant branch condition.
fn constant_test(test: &Scalar<'_>) -> EmitResult<bool> {
    let value = test.value();
    require_constant(value, "branch condition")?;
    if !value.is_boolean() {
        return Err(EmitError::type_mismatch(format!(
            "branch condition must be boolean, got {}",
            value.base_type()
        )));
    }
    test.get::<bool>()
}

impl<'ctx> EmitterContext<'ctx> for ComputeContext<'ctx> {
    fn allocate(&mut self, ty: ValueType, layout: MemoryLayout) -> EmitResult<Value<'ctx>> {
        let data = ConstantData::zeroed(ty, layout.memory_size())?;
        Ok(Value::constant(data, 0, Some(layout)))
    }

    fn global_allocate(
        &mut self,
        scope: GlobalAllocationScope,
        name: &str,
        ty: ValueType,
        layout: MemoryLayout,
    ) -> EmitResult<Value<'ctx>> {
        let qualified = self.global_name(scope, name)?;
        let value = self.allocate(ty, layout)?;
        self.register_global(qualified, value)
    }

    fn global_allocate_data(
        &mut self,
        scope: GlobalAllocationScope,
        name: &str,
        data: ConstantData,
        layout: MemoryLayout,
    ) -> EmitResult<Value<'ctx>> {
        let qualified = self.global_name(scope, name)?;
        if data.len() < layout.memory_size() {
            return Err(EmitError::size_mismatch(format!(
                "global `{}` has {} elements for a layout of {}",
                qualified,
                data.len(),
                layout.memory_size()
            )));
        }
        self.register_global(qualified, Value::constant(data, 0, Some(layout)))
    }

    fn get_global_value(&self, scope: GlobalAllocationScope, name: &str) -> EmitResult<Option<Value<'ctx>>> {
        let qualified = self.global_name(scope, name)?;
        Ok(self.globals.get(&qualified).cloned())
    }

    fn get_type(&self, value: &Value<'ctx>) -> EmitResult<TypeDescription> {
        value.ensure_defined()?;
        if value.is_emittable() {
            return Err(EmitError::illegal_state("the interpreter cannot inspect runtime storage"));
        }
        Ok(value.type_description())
    }

    fn create_function(&mut self, decl: &FunctionDeclaration, body: FunctionBody<'ctx>) -> EmitResult<DefinedFunction> {
        if decl.is_intrinsic() {
            return Err(EmitError::invalid_argument(format!(
                "`{}` collides with a built-in intrinsic",
                decl
            )));
        }
        self.functions.entry(decl.clone()).or_insert_with(|| {
            log::debug!("defined {}", decl);
            body
        });
        Ok(DefinedFunction::new(decl.clone()))
    }

    fn is_function_defined(&self, decl: &FunctionDeclaration) -> bool {
        decl.is_intrinsic() || self.functions.contains_key(decl)
    }

    fn call(&mut self, decl: &FunctionDeclaration, args: Vec<Value<'ctx>>) -> EmitResult<Option<Value<'ctx>>> {
        for arg in &args {
            require_constant(arg, "call argument")?;
            if arg.is_empty() {
                return Err(EmitError::invalid_argument(format!("empty argument passed to `{}`", decl.name())));
            }
        }
        if let Some(intrinsic) = Intrinsic::from_declaration(decl) {
            return call_intrinsic(intrinsic, &args).map(Some);
        }

        let body = self
            .functions
            .get(decl)
            .cloned()
            .ok_or_else(|| EmitError::from(InputError::UndefinedFunction { name: decl.name().to_string() }))?;
        decl.check_arguments(&args)?;

        self.call_stack.push(decl.name().to_string());
        let result = body(self, args);
        self.call_stack.pop();
        result
    }

    fn store_constant_data(&mut self, data: ConstantData) -> EmitResult<Value<'ctx>> {
        let layout = MemoryLayout::new([data.len()]);
        Ok(Value::constant(data, 0, Some(layout)))
    }

    fn for_each(&mut self, layout: &MemoryLayout, body: ElementFn<'_, 'ctx>) -> EmitResult<()> {
        for coord in layout.coordinates() {
            let logical = layout.logical_coordinates(&coord);
            body(self, &index_scalars(&logical)?)?;
        }
        Ok(())
    }

    fn copy_data(&mut self, source: &Value<'ctx>, destination: &mut Value<'ctx>) -> EmitResult<()> {
        require_constant(source, "copy source")?;
        require_constant(destination, "copy destination")?;
        check_type_compatible(source, destination)?;

        let source_layout = source.layout_or_scalar();
        let destination_layout = destination.layout_or_scalar();
        if source_layout.logical_active_size() != destination_layout.logical_active_size() {
            return Err(EmitError::size_mismatch(format!(
                "copy from {:?} into {:?}",
                source_layout.logical_active_size(),
                destination_layout.logical_active_size()
            )));
        }

        let (data, offset) = destination
            .constant_data()
            .ok_or_else(|| EmitError::illegal_state("copy destination lost its buffer"))?;
        with_constant_data!(data, buffer => copy_into(buffer, offset, &destination_layout, source, &source_layout))
    }

    fn offset(&mut self, base: &Value<'ctx>, index: &Scalar<'ctx>) -> EmitResult<Value<'ctx>> {
        require_constant(base, "offset base")?;
        require_constant(index.value(), "offset index")?;
        if index.value().is_floating_point() || index.value().is_boolean() {
            return Err(EmitError::type_mismatch(format!(
                "offset index must be an integer, got {}",
                index.value().base_type()
            )));
        }

        let (data, offset) = base
            .constant_data()
            .ok_or_else(|| EmitError::illegal_state("offset base lost its buffer"))?;
        let target = offset as i64 + index.get::<i64>()?;
        if target < 0 || target as usize >= data.len() {
            return Err(EmitError::invalid_size(format!(
                "offset {} is outside a buffer of {} elements",
                target,
                data.len()
            )));
        }
        Ok(Value::constant(data.clone(), target as usize, Some(MemoryLayout::scalar())))
    }

    fn binary_operation(
        &mut self,
        op: BinaryOperation,
        mut destination: Value<'ctx>,
        source: &Value<'ctx>,
    ) -> EmitResult<Value<'ctx>> {
        require_constant(source, "binary operand")?;
        if !destination.is_defined() {
            destination = self.allocate(source.base_type(), source.layout_or_scalar())?;
        }
        require_constant(&destination, "binary destination")?;
        check_type_compatible(&destination, source)?;
        let layout = check_same_layout(&destination, source)?;

        if op == BinaryOperation::Modulus && destination.is_floating_point() {
            return Err(EmitError::invalid_argument("modulus requires integer operands"));
        }
        if destination.is_boolean() {
            return Err(EmitError::not_implemented("arithmetic on boolean values"));
        }

        let (data, offset) = destination
            .constant_data()
            .ok_or_else(|| EmitError::illegal_state("binary destination lost its buffer"))?;
        with_constant_data!(data, buffer => apply_binary(op, buffer, offset, source, &layout))?;
        Ok(destination)
    }

    fn logical_operation(
        &mut self,
        op: LogicalOperation,
        lhs: &Value<'ctx>,
        rhs: &Value<'ctx>,
    ) -> EmitResult<Value<'ctx>> {
        require_constant(lhs, "comparison operand")?;
        require_constant(rhs, "comparison operand")?;
        check_type_compatible(lhs, rhs)?;
        let layout = check_same_layout(lhs, rhs)?;

        let (data, offset) = lhs
            .constant_data()
            .ok_or_else(|| EmitError::illegal_state("comparison operand lost its buffer"))?;
        let result = with_constant_data!(data, buffer => all_hold(op, buffer, offset, rhs, &layout))?;
        Ok(Scalar::from_constant(result).into_value())
    }

    fn cast(&mut self, value: &Value<'ctx>, ty: ValueType) -> EmitResult<Value<'ctx>> {
        require_constant(value, "cast source")?;
        let layout = value.layout_or_scalar();
        let len = layout.memory_size();
        let target = ConstantData::zeroed(ty, len)?;

        let (data, offset) = value
            .constant_data()
            .ok_or_else(|| EmitError::illegal_state("cast source lost its buffer"))?;
        with_constant_data!(data, source => with_constant_data!(&target, destination => {
            cast_into(source, offset, destination, len)
        }))?;
        Ok(Value::constant(target, 0, Some(layout)))
    }

    fn begin_if(&mut self, test: &Scalar<'ctx>, body: BlockFn<'_, 'ctx>) -> EmitResult<IfState<'ctx>> {
        let taken = constant_test(test)?;
        if taken {
            body(self)?;
        }
        Ok(IfState::Interpreted { taken })
    }

    fn else_if(
        &mut self,
        state: IfState<'ctx>,
        test: &Scalar<'ctx>,
        body: BlockFn<'_, 'ctx>,
    ) -> EmitResult<IfState<'ctx>> {
        let IfState::Interpreted { taken } = state else {
            return Err(EmitError::illegal_state("emitted if-chain continued in the interpreter"));
        };
        if taken {
            return Ok(state);
        }
        self.begin_if(test, body)
    }

    fn else_(&mut self, state: IfState<'ctx>, body: BlockFn<'_, 'ctx>) -> EmitResult<()> {
        match state {
            IfState::Interpreted { taken: true } => Ok(()),
            IfState::Interpreted { taken: false } => body(self),
            IfState::Emitted { .. } => Err(EmitError::illegal_state("emitted if-chain continued in the interpreter")),
        }
    }

    fn debug_dump(&self, value: &Value<'ctx>, tag: &str, out: &mut dyn Write) {
        let _ = if tag.is_empty() {
            writeln!(out, "{}", value)
        } else {
            writeln!(out, "{}: {}", tag, value)
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::function_body;
    use std::cell::RefCell;

    #[test]
    fn test_binary_in_place() {
        let mut ctx = ComputeContext::new("m");
        let a = Value::from_vec(vec![1i32, 2, 3]);
        let b = Value::from_vec(vec![10i32, 20, 30]);
        let sum = ctx.binary_operation(BinaryOperation::Add, a.clone(), &b).unwrap();
        assert_eq!(sum.to_vec::<i32>().unwrap(), vec![11, 22, 33]);
        // the destination buffer is updated in place
        assert_eq!(a.to_vec::<i32>().unwrap(), vec![11, 22, 33]);
    }

    #[test]
    fn test_binary_allocates_undefined_destination() {
        let mut ctx = ComputeContext::new("m");
        let source = Value::from_vec(vec![1.5f64, 2.5]);
        let destination = Value::undefined(source.type_description(), None);
        let result = ctx.binary_operation(BinaryOperation::Subtract, destination, &source).unwrap();
        assert_eq!(result.to_vec::<f64>().unwrap(), vec![-1.5, -2.5]);
        assert!(!result.constant_data().unwrap().0.same_buffer(source.constant_data().unwrap().0));
    }

    #[test]
    fn test_binary_aliasing_operands() {
        let mut ctx = ComputeContext::new("m");
        let a = Value::from_vec(vec![3i64, 4]);
        let doubled = ctx.binary_operation(BinaryOperation::Add, a.clone(), &a).unwrap();
        assert_eq!(doubled.to_vec::<i64>().unwrap(), vec![6, 8]);
    }

    #[test]
    fn test_float_modulus_rejected() {
        let mut ctx = ComputeContext::new("m");
        let a = Value::from_vec(vec![1.0f32]);
        let err = ctx.binary_operation(BinaryOperation::Modulus, a.clone(), &a).unwrap_err();
        assert!(matches!(err, EmitError::Input(InputError::InvalidArgument { .. })));
    }

    #[test]
    fn test_cast_keeps_layout() {
        let mut ctx = ComputeContext::new("m");
        let data = ConstantData::from_vec(vec![0.5f64, 1.5, 2.5, 3.5]);
        let layout = MemoryLayout::padded([2], [4], [1]).unwrap();
        let value = Value::constant(data, 0, Some(layout.clone()));
        let cast = ctx.cast(&value, ValueType::Int32).unwrap();
        assert_eq!(cast.layout(), Some(&layout));
        assert_eq!(cast.to_vec::<i32>().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_offset_into_buffer() {
        let mut ctx = ComputeContext::new("m");
        let base = Value::from_vec(vec![5i16, 6, 7]);
        let second = ctx.offset(&base, &Scalar::from_constant(2i32)).unwrap();
        assert_eq!(second.element::<i16>(0).unwrap(), 7);
        assert!(ctx.offset(&base, &Scalar::from_constant(3i32)).is_err());
    }

    #[test]
    fn test_copy_through_dimension_order() {
        let mut ctx = ComputeContext::new("m");
        let source = Value::constant(ConstantData::from_vec(vec![1i32, 2, 3, 4, 5, 6]), 0, Some(MemoryLayout::new([2, 3])));
        let column_major = MemoryLayout::new([3, 2]).with_dimension_order([1, 0]).unwrap();
        let mut destination = ctx.allocate(ValueType::Int32, column_major).unwrap();
        ctx.copy_data(&source, &mut destination).unwrap();

        let (data, _) = destination.constant_data().unwrap();
        let raw: Vec<i32> = (0..6).map(|i| data.get(i).unwrap()).collect();
        assert_eq!(raw, vec![1, 4, 2, 5, 3, 6]);
    }

    #[test]
    fn test_function_scope_globals() {
        let mut ctx = ComputeContext::new("m");
        assert!(ctx
            .global_allocate(GlobalAllocationScope::Function, "w", ValueType::Float, MemoryLayout::scalar())
            .unwrap_err()
            .is_logic());

        let body = function_body(|ctx, _args| {
            ctx.global_allocate(GlobalAllocationScope::Function, "w", ValueType::Float, MemoryLayout::scalar())?;
            Ok(None)
        });
        let decl = FunctionDeclaration::new("f");
        let f = ctx.create_function(&decl, body).unwrap();
        f.call(&mut ctx, vec![]).unwrap();
        assert!(f.call(&mut ctx, vec![]).is_err());
        assert!(ctx.globals.contains_key("m_f_w"));
    }

    #[test]
    fn test_if_chain_picks_first_true_arm() {
        let mut ctx = ComputeContext::new("m");
        let hits = RefCell::new(Vec::new());
        {
            crate::core::if_(&mut ctx, &Scalar::from_constant(false), |_| {
                hits.borrow_mut().push("if");
                Ok(())
            })
            .unwrap()
            .else_if(&Scalar::from_constant(true), |_| {
                hits.borrow_mut().push("else if");
                Ok(())
            })
            .unwrap()
            .else_(|_| {
                hits.borrow_mut().push("else");
                Ok(())
            })
            .unwrap();
        }
        assert_eq!(hits.into_inner(), vec!["else if"]);
    }

    #[test]
    fn test_debug_dump() {
        let ctx = ComputeContext::new("m");
        let mut out = Vec::new();
        ctx.debug_dump(&Value::from_vec(vec![1i8, -1]), "v", &mut out);
        assert_eq!(String::from_utf8(out).unwrap(), "v: [1, -1]\n");
    }
}
