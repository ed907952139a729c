// This module implements LlvmContext, the compiling backend. It owns one inkwell Module and
// Builder for the whole emission session together with every piece of mutable session
// state: the scope-qualified global registry, the declaration-to-function cache, the stack
// of functions being emitted, the per-scope constant promotion records, and the emission
// statistics. Operations whose operands are all constant are handed to an embedded
// ComputeContext and never reach the builder. Everything else is lowered per coordinate
// through the layout's offset mapping, promoting constant operands into addressable
// storage on demand. Calls dispatch in three tiers: built-in intrinsics, functions defined
// through create_function, and external functions declared on first use with the
// one-level pointer reconciliation rule applied to each argument.

//! The LLVM code-generation backend.

use super::promotion::PromotedConstant;
use super::types::{abi_type, array_of, literal, literal_array, storage_type, value_type_of};
use crate::compute::ComputeContext;
use crate::core::context::{check_same_layout, check_type_compatible, index_scalars};
use crate::core::{
    BinaryOperation, BlockFn, ConstantData, DefinedFunction, ElementFn, EmissionStats, EmitError, EmitResult,
    Emittable, EmitterContext, FunctionBody, FunctionDeclaration, GlobalAllocationScope, IfState, InputError,
    Intrinsic, LogicalOperation, MemoryLayout, ParameterDescription, Scalar, TypeDescription, UnderlyingData,
    Value, ValueType,
};
use hashbrown::HashMap;
use inkwell::attributes::{Attribute, AttributeLoc};
use inkwell::builder::Builder;
use inkwell::context::Context;
use inkwell::module::Module;
use inkwell::types::{AnyType, BasicMetadataTypeEnum, BasicType, FunctionType};
use inkwell::values::{AnyValue, BasicMetadataValueEnum, BasicValueEnum, FunctionValue, GlobalValue};
use std::io::Write;

/// Knobs for one emission session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LlvmContextOptions {
    /// Run the LLVM verifier in [`LlvmContext::finish`].
    pub verify_on_finish: bool,
    /// Copy constants promoted inside a function into a stack array instead
    /// of addressing the function-scoped global directly.
    pub promote_locally: bool,
}

impl Default for LlvmContextOptions {
    fn default() -> Self {
        Self {
            verify_on_finish: true,
            promote_locally: true,
        }
    }
}

/// One operand of an element-wise loop.
enum Operand<'a, 'ctx> {
    Literal { data: &'a ConstantData, offset: usize },
    Runtime(Emittable<'ctx>),
}

/// A module global created while a function body was being emitted.
struct ScopedGlobal<'ctx> {
    /// Registry key, for globals made through `global_allocate*`.
    registered: Option<String>,
    global: GlobalValue<'ctx>,
}

/// Emitter that lowers the value IR into an LLVM module.
pub struct LlvmContext<'ctx> {
    pub(crate) context: &'ctx Context,
    pub(crate) module: Module<'ctx>,
    pub(crate) builder: Builder<'ctx>,
    pub(crate) module_name: String,
    pub(crate) options: LlvmContextOptions,
    compute: ComputeContext<'ctx>,
    globals: HashMap<String, Value<'ctx>>,
    defined: HashMap<FunctionDeclaration, FunctionValue<'ctx>>,
    /// Names of the functions being emitted, innermost last.
    pub(crate) frames: Vec<String>,
    /// Promotion records; index 0 is the module scope.
    pub(crate) promoted: Vec<Vec<PromotedConstant<'ctx>>>,
    /// Globals created by each function being emitted, innermost last.
    scoped_globals: Vec<Vec<ScopedGlobal<'ctx>>>,
    pub(crate) stats: EmissionStats,
}

impl<'ctx> LlvmContext<'ctx> {
    pub fn new(context: &'ctx Context, module_name: &str) -> Self {
        Self::with_options(context, module_name, LlvmContextOptions::default())
    }

    pub fn with_options(context: &'ctx Context, module_name: &str, options: LlvmContextOptions) -> Self {
        Self {
            context,
            module: context.create_module(module_name),
            builder: context.create_builder(),
            module_name: module_name.to_string(),
            options,
            compute: ComputeContext::new(module_name),
            globals: HashMap::new(),
            defined: HashMap::new(),
            frames: Vec::new(),
            promoted: vec![Vec::new()],
            scoped_globals: Vec::new(),
            stats: EmissionStats::default(),
        }
    }

    pub fn module(&self) -> &Module<'ctx> {
        &self.module
    }

    pub fn stats(&self) -> &EmissionStats {
        &self.stats
    }

    pub fn options(&self) -> &LlvmContextOptions {
        &self.options
    }

    /// Ends the session and hands back the module, verified unless disabled.
    pub fn finish(self) -> EmitResult<Module<'ctx>> {
        if self.options.verify_on_finish {
            self.module
                .verify()
                .map_err(|err| EmitError::backend(err.to_string()))?;
        }
        log::debug!("finished module {}\n{}", self.module_name, self.stats);
        Ok(self.module)
    }

    fn global_name(&self, scope: GlobalAllocationScope, name: &str) -> EmitResult<String> {
        match scope {
            GlobalAllocationScope::Global => Ok(format!("{}_{}", self.module_name, name)),
            GlobalAllocationScope::Function => {
                let function = self.frames.last().ok_or_else(|| {
                    EmitError::illegal_state(format!("function-scope global `{}` outside of a function", name))
                })?;
                Ok(format!("{}_{}_{}", self.module_name, function, name))
            }
        }
    }

    fn register_global(
        &mut self,
        scope: GlobalAllocationScope,
        qualified: String,
        global: GlobalValue<'ctx>,
        value: Value<'ctx>,
    ) -> EmitResult<Value<'ctx>> {
        log::debug!("registered global {}", qualified);
        self.stats.globals_allocated += 1;
        if scope == GlobalAllocationScope::Function {
            self.track_scoped_global(Some(qualified.clone()), global);
        }
        self.globals.insert(qualified, value.clone());
        Ok(value)
    }

    /// Remembers `global` as owned by the innermost function being emitted.
    pub(crate) fn track_scoped_global(&mut self, registered: Option<String>, global: GlobalValue<'ctx>) {
        if let Some(scope) = self.scoped_globals.last_mut() {
            scope.push(ScopedGlobal { registered, global });
        }
    }

    fn ensure_global_free(&self, qualified: &str) -> EmitResult<()> {
        if self.globals.contains_key(qualified) {
            return Err(EmitError::invalid_argument(format!("global `{}` already exists", qualified)));
        }
        Ok(())
    }

    /// Runs `emit` with `name` as the innermost function and a fresh promotion
    /// record, restoring both and the insertion point on every path. When
    /// `emit` fails, `function` is deleted along with every global created in
    /// its scope.
    fn with_function_scope<R>(
        &mut self,
        name: &str,
        function: FunctionValue<'ctx>,
        emit: impl FnOnce(&mut Self) -> EmitResult<R>,
    ) -> EmitResult<R> {
        let resume = self.builder.get_insert_block();
        self.frames.push(name.to_string());
        self.promoted.push(Vec::new());
        self.scoped_globals.push(Vec::new());
        log::debug!("entering function scope {}", name);

        let result = emit(self);

        let created = self.scoped_globals.pop().unwrap_or_default();
        self.promoted.pop();
        self.frames.pop();
        match resume {
            Some(block) => self.builder.position_at_end(block),
            None => self.builder.clear_insertion_position(),
        }
        if let Err(err) = &result {
            log::debug!("discarding {} and {} scoped globals after error: {}", name, created.len(), err);
            // the body's uses go first, then the globals they referenced
            unsafe { function.delete() };
            for scoped in created {
                if let Some(qualified) = scoped.registered {
                    self.globals.remove(&qualified);
                    self.stats.globals_allocated = self.stats.globals_allocated.saturating_sub(1);
                }
                unsafe { scoped.global.delete() };
            }
        }
        log::trace!("left function scope {}", name);
        result
    }

    fn function_type(&self, decl: &FunctionDeclaration) -> EmitResult<FunctionType<'ctx>> {
        let params = decl
            .parameter_types()
            .iter()
            .map(|param| abi_type(self.context, param.ty).map(BasicMetadataTypeEnum::from))
            .collect::<EmitResult<Vec<_>>>()?;
        Ok(match returned_description(decl) {
            None => self.context.void_type().fn_type(&params, false),
            Some(ret) => abi_type(self.context, ret.ty)?.fn_type(&params, false),
        })
    }

    /// Arguments as seen inside the body. By-value scalars are spilled into
    /// scalar storage so every argument is addressable.
    fn parameter_values(
        &mut self,
        decl: &FunctionDeclaration,
        function: FunctionValue<'ctx>,
    ) -> EmitResult<Vec<Value<'ctx>>> {
        let mut values = Vec::with_capacity(decl.parameter_types().len());
        for (index, param) in decl.parameter_types().iter().enumerate() {
            let raw = function
                .get_nth_param(index as u32)
                .ok_or_else(|| EmitError::illegal_state(format!("`{}` lost parameter {}", decl.name(), index)))?;
            raw.set_name(&format!("arg{}", index));

            if param.ty.is_pointer() {
                let element = storage_type(self.context, param.ty.base)?;
                values.push(Value::emitted(
                    Emittable::new(raw, element, param.ty.pointer_level),
                    param.ty,
                    param.layout.clone(),
                ));
            } else {
                let spilled = self.allocate(param.ty.base, MemoryLayout::scalar())?;
                self.set_value_at(&runtime_handle(&spilled)?, 0, raw)?;
                values.push(spilled);
            }
        }
        Ok(values)
    }

    fn emit_return(&mut self, decl: &FunctionDeclaration, returned: Option<Value<'ctx>>) -> EmitResult<()> {
        match (returned_description(decl), returned) {
            (None, None) => {
                self.builder.build_return(None)?;
            }
            (None, Some(_)) => {
                return Err(EmitError::invalid_argument(format!(
                    "`{}` declares no return value but its body produced one",
                    decl.name()
                )))
            }
            (Some(_), None) => {
                return Err(EmitError::invalid_argument(format!(
                    "body of `{}` produced no return value",
                    decl.name()
                )))
            }
            (Some(desc), Some(value)) => {
                if value.base_type() != desc.ty.base {
                    return Err(EmitError::type_mismatch(format!(
                        "`{}` returns {}, body produced {}",
                        decl.name(),
                        desc.ty,
                        value.type_description()
                    )));
                }
                let result = if desc.ty.is_pointer() {
                    self.emittable_of(&value)?.value
                } else {
                    self.scalar_operand(&value)?
                };
                self.builder.build_return(Some(&result))?;
            }
        }
        Ok(())
    }

    /// Emits a call, reconciling each argument with the declared pointer
    /// level: equal levels pass through, one level higher passes element 0.
    /// Arity and base types are checked by the caller.
    fn emit_call(
        &mut self,
        function: FunctionValue<'ctx>,
        decl: &FunctionDeclaration,
        args: &[Value<'ctx>],
    ) -> EmitResult<Option<Value<'ctx>>> {
        let mut operands: Vec<BasicMetadataValueEnum<'ctx>> = Vec::with_capacity(args.len());
        for (index, (arg, param)) in args.iter().zip(decl.parameter_types()).enumerate() {
            let expected = param.ty.pointer_level;
            let level = arg.pointer_level();
            let operand = if expected == 0 && (level == 0 || level == 1) {
                self.scalar_operand(arg)?
            } else if level == expected {
                self.emittable_of(arg)?.value
            } else if level == expected + 1 {
                let emittable = self.emittable_of(arg)?;
                self.value_at(&emittable, 0)?
            } else {
                return Err(EmitError::type_mismatch(format!(
                    "argument {} of `{}` has pointer level {}, expected {}",
                    index,
                    decl.name(),
                    level,
                    expected
                )));
            };
            operands.push(operand.into());
        }

        let site = self.builder.build_call(function, &operands, "call")?;
        self.stats.record_emitted("call");
        let Some(desc) = returned_description(decl) else {
            return Ok(None);
        };
        let result = site
            .try_as_basic_value()
            .left()
            .ok_or_else(|| EmitError::backend(format!("call to `{}` produced no value", decl.name())))?;

        if desc.ty.is_pointer() {
            let element = storage_type(self.context, desc.ty.base)?;
            return Ok(Some(Value::emitted(
                Emittable::new(result, element, desc.ty.pointer_level),
                desc.ty,
                desc.layout.clone(),
            )));
        }
        let storage = self.allocate(desc.ty.base, MemoryLayout::scalar())?;
        self.set_value_at(&runtime_handle(&storage)?, 0, result)?;
        Ok(Some(storage))
    }

    fn operand<'a>(&mut self, value: &'a Value<'ctx>) -> EmitResult<Operand<'a, 'ctx>> {
        match value.constant_data() {
            Some((data, offset)) => Ok(Operand::Literal { data, offset }),
            None => Ok(Operand::Runtime(self.emittable_of(value)?)),
        }
    }

    fn load(&self, operand: &Operand<'_, 'ctx>, offset: usize) -> EmitResult<BasicValueEnum<'ctx>> {
        match operand {
            Operand::Literal { data, offset: base } => literal(self.context, data, base + offset),
            Operand::Runtime(emittable) => self.value_at(emittable, offset),
        }
    }
}

/// Non-void return description of a declaration.
fn returned_description(decl: &FunctionDeclaration) -> Option<&ParameterDescription> {
    decl.return_type().filter(|ret| ret.ty.base != ValueType::Void)
}

fn runtime_handle<'ctx>(value: &Value<'ctx>) -> EmitResult<Emittable<'ctx>> {
    value
        .emittable()
        .ok_or_else(|| EmitError::illegal_state("expected a runtime value"))
}

fn all_constant(values: &[Value<'_>]) -> bool {
    values.iter().all(Value::is_constant)
}

impl<'ctx> EmitterContext<'ctx> for LlvmContext<'ctx> {
    fn allocate(&mut self, ty: ValueType, layout: MemoryLayout) -> EmitResult<Value<'ctx>> {
        let element = storage_type(self.context, ty)?;
        let pointer = self.alloca_in_entry(element, layout.memory_size(), "alloc")?;
        let bytes = layout.memory_size() as u64 * ty.size_in_bytes().unwrap_or(1);
        self.memset_zero(pointer, bytes)?;
        Ok(Value::emitted(
            Emittable::new(pointer.into(), element, 1),
            TypeDescription::pointer_to(ty),
            Some(layout),
        ))
    }

    fn global_allocate(
        &mut self,
        scope: GlobalAllocationScope,
        name: &str,
        ty: ValueType,
        layout: MemoryLayout,
    ) -> EmitResult<Value<'ctx>> {
        let qualified = self.global_name(scope, name)?;
        self.ensure_global_free(&qualified)?;

        let element = storage_type(self.context, ty)?;
        let array = array_of(element, layout.memory_size())?;
        let global = self.module.add_global(array, None, &qualified);
        global.set_initializer(&array.const_zero());

        let value = Value::emitted(
            Emittable::new(global.as_pointer_value().into(), element, 1),
            TypeDescription::pointer_to(ty),
            Some(layout),
        );
        self.register_global(scope, qualified, global, value)
    }

    fn global_allocate_data(
        &mut self,
        scope: GlobalAllocationScope,
        name: &str,
        data: ConstantData,
        layout: MemoryLayout,
    ) -> EmitResult<Value<'ctx>> {
        let qualified = self.global_name(scope, name)?;
        self.ensure_global_free(&qualified)?;
        if data.len() < layout.memory_size() {
            return Err(EmitError::size_mismatch(format!(
                "global `{}` has {} elements for a layout of {}",
                qualified,
                data.len(),
                layout.memory_size()
            )));
        }

        let element = storage_type(self.context, data.value_type())?;
        let array = array_of(element, data.len())?;
        let global = self.module.add_global(array, None, &qualified);
        global.set_initializer(&literal_array(self.context, &data)?);

        let value = Value::emitted(
            Emittable::new(global.as_pointer_value().into(), element, 1),
            TypeDescription::pointer_to(data.value_type()),
            Some(layout),
        );
        self.register_global(scope, qualified, global, value)
    }

    fn get_global_value(&self, scope: GlobalAllocationScope, name: &str) -> EmitResult<Option<Value<'ctx>>> {
        let qualified = self.global_name(scope, name)?;
        Ok(self.globals.get(&qualified).cloned())
    }

    fn get_type(&self, value: &Value<'ctx>) -> EmitResult<TypeDescription> {
        match value.data() {
            UnderlyingData::Undefined => Err(InputError::UndefinedValue.into()),
            UnderlyingData::Constant { .. } => Ok(value.type_description()),
            UnderlyingData::Emittable(emittable) => value_type_of(self.context, emittable.element_type)
                .map(|base| TypeDescription::new(base, emittable.pointer_level))
                .ok_or_else(|| {
                    EmitError::illegal_state(format!(
                        "no value type for {}",
                        emittable.element_type.print_to_string()
                    ))
                }),
        }
    }

    fn create_function(&mut self, decl: &FunctionDeclaration, body: FunctionBody<'ctx>) -> EmitResult<DefinedFunction> {
        if decl.is_intrinsic() {
            return Err(EmitError::invalid_argument(format!(
                "`{}` collides with a built-in intrinsic",
                decl
            )));
        }
        if self.defined.contains_key(decl) {
            log::trace!("{} already defined", decl);
            return Ok(DefinedFunction::new(decl.clone()));
        }

        if let Some(existing) = self.module.get_function(decl.name()) {
            return Err(EmitError::invalid_argument(format!(
                "cannot define {}: `{}` already exists in the module as {}",
                decl,
                decl.name(),
                existing.get_type().print_to_string()
            )));
        }
        let function = self.module.add_function(decl.name(), self.function_type(decl)?, None);
        let noalias = Attribute::get_named_enum_kind_id("noalias");
        for (index, param) in decl.parameter_types().iter().enumerate() {
            if param.ty.is_pointer() {
                function.add_attribute(
                    AttributeLoc::Param(index as u32),
                    self.context.create_enum_attribute(noalias, 0),
                );
            }
        }
        // registered up front so the body can call itself
        self.defined.insert(decl.clone(), function);

        let entry = self.context.append_basic_block(function, "entry");
        let emitted = self.with_function_scope(decl.name(), function, |ctx| {
            ctx.builder.position_at_end(entry);
            let args = ctx.parameter_values(decl, function)?;
            let returned = body(ctx, args)?;
            ctx.emit_return(decl, returned)
        });

        if let Err(err) = emitted {
            self.defined.remove(decl);
            return Err(err);
        }
        self.stats.functions_defined += 1;
        Ok(DefinedFunction::new(decl.clone()))
    }

    fn is_function_defined(&self, decl: &FunctionDeclaration) -> bool {
        decl.is_intrinsic() || self.defined.contains_key(decl)
    }

    fn call(&mut self, decl: &FunctionDeclaration, args: Vec<Value<'ctx>>) -> EmitResult<Option<Value<'ctx>>> {
        for arg in &args {
            arg.ensure_defined()?;
            if arg.is_empty() {
                return Err(EmitError::invalid_argument(format!("empty argument passed to `{}`", decl.name())));
            }
        }

        if let Some(intrinsic) = Intrinsic::from_declaration(decl) {
            if all_constant(&args) {
                self.stats.record_folded(intrinsic.name());
                return self.compute.call(decl, args);
            }
            return self.emit_intrinsic(intrinsic, &args).map(Some);
        }

        self.current_function()?;
        if let Some(&function) = self.defined.get(decl) {
            decl.check_arguments(&args)?;
            return self.emit_call(function, decl, &args);
        }

        decl.check_argument_types(&args)?;
        let expected = self.function_type(decl)?;
        let function = match self.module.get_function(decl.name()) {
            Some(function) if function.get_type() != expected => {
                return Err(EmitError::type_mismatch(format!(
                    "`{}` already exists in the module as {}",
                    decl,
                    function.get_type().print_to_string()
                )))
            }
            Some(function) => function,
            None => {
                log::debug!("declaring external function {}", decl);
                self.stats.external_declarations += 1;
                self.module.add_function(decl.name(), expected, None)
            }
        };
        self.emit_call(function, decl, &args)
    }

    fn store_constant_data(&mut self, data: ConstantData) -> EmitResult<Value<'ctx>> {
        self.compute.store_constant_data(data)
    }

    fn for_each(&mut self, layout: &MemoryLayout, body: ElementFn<'_, 'ctx>) -> EmitResult<()> {
        for coord in layout.coordinates() {
            let logical = layout.logical_coordinates(&coord);
            body(self, &index_scalars(&logical)?)?;
        }
        Ok(())
    }

    fn copy_data(&mut self, source: &Value<'ctx>, destination: &mut Value<'ctx>) -> EmitResult<()> {
        source.ensure_defined()?;
        destination.ensure_defined()?;
        if destination.is_constant() {
            if !source.is_constant() {
                return Err(EmitError::illegal_state("cannot copy runtime data into a constant"));
            }
            self.stats.record_folded("copy");
            return self.compute.copy_data(source, destination);
        }
        check_type_compatible(source, destination)?;

        let target = runtime_handle(destination)?;
        if target.pointer_level == 0 {
            return Err(EmitError::illegal_state("cannot copy into a scalar SSA value"));
        }
        let source_layout = source.layout_or_scalar();
        let destination_layout = destination.layout_or_scalar();
        let same_shape = source_layout.logical_active_size() == destination_layout.logical_active_size();

        if let Some(emittable) = source.emittable() {
            if emittable.value == target.value {
                return Ok(());
            }
            if target.pointer_level == emittable.pointer_level + 1 {
                let value = if emittable.pointer_level == 0 {
                    self.value_at(&emittable, 0)?
                } else {
                    emittable.value
                };
                self.set_value_at(&target, 0, value)?;
                self.stats.record_emitted("copy");
                return Ok(());
            }
            if target.pointer_level != emittable.pointer_level {
                return Err(EmitError::type_mismatch(format!(
                    "cannot copy pointer level {} into pointer level {}",
                    emittable.pointer_level, target.pointer_level
                )));
            }
        }
        if !same_shape {
            return Err(EmitError::size_mismatch(format!(
                "copy from {:?} into {:?}",
                source_layout.logical_active_size(),
                destination_layout.logical_active_size()
            )));
        }

        let operand = self.operand(source)?;
        if let Operand::Runtime(emittable) = &operand {
            if source_layout.is_contiguous() && source_layout == destination_layout {
                let bytes = source_layout.memory_size() as u64 * source.type_description().storage_bytes().unwrap_or(1);
                self.memcpy(
                    &self.builder,
                    target.value.into_pointer_value(),
                    emittable.value.into_pointer_value(),
                    bytes,
                )?;
                self.stats.record_emitted("copy");
                return Ok(());
            }
        }

        for coord in source_layout.coordinates() {
            let logical = source_layout.logical_coordinates(&coord);
            let value = self.load(&operand, source_layout.entry_offset(&coord))?;
            self.set_value_at(&target, destination_layout.logical_entry_offset(&logical), value)?;
        }
        self.stats.record_emitted("copy");
        Ok(())
    }

    fn offset(&mut self, base: &Value<'ctx>, index: &Scalar<'ctx>) -> EmitResult<Value<'ctx>> {
        base.ensure_defined()?;
        index.value().ensure_defined()?;
        if base.is_constant() && index.value().is_constant() {
            self.stats.record_folded("offset");
            return self.compute.offset(base, index);
        }
        if !index.value().base_type().is_integral() {
            return Err(EmitError::type_mismatch(format!(
                "offset index must be an integer, got {}",
                index.value().base_type()
            )));
        }

        let origin = self.emittable_of(base)?;
        let raw = self.scalar_operand(index.value())?.into_int_value();
        let wide = self
            .builder
            .build_int_cast_sign_flag(raw, self.context.i64_type(), true, "index")?;
        let pointer = self.element_pointer(&origin, wide)?;
        self.stats.record_emitted("offset");
        Ok(Value::emitted(
            Emittable::new(pointer.into(), origin.element_type, origin.pointer_level),
            base.type_description(),
            Some(MemoryLayout::scalar()),
        ))
    }

    fn binary_operation(
        &mut self,
        op: BinaryOperation,
        mut destination: Value<'ctx>,
        source: &Value<'ctx>,
    ) -> EmitResult<Value<'ctx>> {
        source.ensure_defined()?;
        if destination.is_defined() {
            if destination.is_constant() && source.is_constant() {
                self.stats.record_folded("binary operation");
                return self.compute.binary_operation(op, destination, source);
            }
        } else {
            destination = self.allocate(source.base_type(), source.layout_or_scalar())?;
        }

        check_type_compatible(&destination, source)?;
        let layout = check_same_layout(&destination, source)?;
        if destination.is_boolean() {
            return Err(EmitError::not_implemented("arithmetic on boolean values"));
        }
        let floating_point = destination.is_floating_point();
        if op == BinaryOperation::Modulus && floating_point {
            return Err(EmitError::invalid_argument("modulus requires integer operands"));
        }

        let destination = self.ensure_emittable(&destination)?;
        let target = runtime_handle(&destination)?;
        let operand = self.operand(source)?;
        for coord in layout.coordinates() {
            let offset = layout.entry_offset(&coord);
            let lhs = self.value_at(&target, offset)?;
            let rhs = self.load(&operand, offset)?;
            let result = self.arithmetic(op, lhs, rhs, floating_point)?;
            self.set_value_at(&target, offset, result)?;
        }
        self.stats.record_emitted("binary operation");
        Ok(destination)
    }

    fn logical_operation(
        &mut self,
        op: LogicalOperation,
        lhs: &Value<'ctx>,
        rhs: &Value<'ctx>,
    ) -> EmitResult<Value<'ctx>> {
        lhs.ensure_defined()?;
        rhs.ensure_defined()?;
        let layout = check_same_layout(lhs, rhs)?;
        if lhs.is_constant() && rhs.is_constant() {
            self.stats.record_folded("logical operation");
            return self.compute.logical_operation(op, lhs, rhs);
        }
        check_type_compatible(lhs, rhs)?;

        let floating_point = lhs.is_floating_point();
        let left = self.operand(lhs)?;
        let right = self.operand(rhs)?;
        let mut result = self.context.bool_type().const_int(1, false);
        for coord in layout.coordinates() {
            let offset = layout.logical_entry_offset(&layout.logical_coordinates(&coord));
            let a = self.load(&left, offset)?;
            let b = self.load(&right, offset)?;
            let holds = self.compare(op, a, b, floating_point)?;
            result = self.builder.build_and(result, holds, "all")?;
        }
        self.stats.record_emitted("logical operation");
        Ok(Value::emitted(
            Emittable::new(result.into(), self.context.bool_type().into(), 0),
            TypeDescription::scalar(ValueType::Boolean),
            Some(MemoryLayout::scalar()),
        ))
    }

    fn cast(&mut self, value: &Value<'ctx>, ty: ValueType) -> EmitResult<Value<'ctx>> {
        value.ensure_defined()?;
        if value.is_constant() {
            self.stats.record_folded("cast");
            return self.compute.cast(value, ty);
        }

        let origin = runtime_handle(value)?;
        let from = value.base_type();
        let layout = value.layout_or_scalar();
        let cast = self.allocate(ty, layout.clone())?;
        let target = runtime_handle(&cast)?;
        let count = if origin.pointer_level == 0 { 1 } else { layout.memory_size() };
        for index in 0..count {
            let element = self.value_at(&origin, index)?;
            let converted = self.convert(element, from, ty)?;
            self.set_value_at(&target, index, converted)?;
        }
        self.stats.record_emitted("cast");
        Ok(cast)
    }

    fn begin_if(&mut self, test: &Scalar<'ctx>, body: BlockFn<'_, 'ctx>) -> EmitResult<IfState<'ctx>> {
        self.emit_begin_if(test, body)
    }

    fn else_if(
        &mut self,
        state: IfState<'ctx>,
        test: &Scalar<'ctx>,
        body: BlockFn<'_, 'ctx>,
    ) -> EmitResult<IfState<'ctx>> {
        self.emit_else_if(state, test, body)
    }

    fn else_(&mut self, state: IfState<'ctx>, body: BlockFn<'_, 'ctx>) -> EmitResult<()> {
        self.emit_else(state, body)
    }

    fn debug_dump(&self, value: &Value<'ctx>, tag: &str, out: &mut dyn Write) {
        let realized = self.realize(value).unwrap_or_else(|_| value.clone());
        match realized.emittable() {
            Some(emittable) => {
                let ir = emittable.value.print_to_string();
                let _ = if tag.is_empty() {
                    writeln!(out, "{}", ir)
                } else {
                    writeln!(out, "{}: {}", tag, ir)
                };
            }
            None => self.compute.debug_dump(&realized, tag, out),
        }
    }
}
