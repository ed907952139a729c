// This module materializes constant buffers into addressable LLVM storage. A constant
// Value needs a real address when it meets a runtime operand, is passed to a call, or is
// returned. Promotions are keyed by buffer identity (Rc pointer equality), never by
// contents, and recorded per emission scope: the module scope sits at the bottom of the
// stack and every function being emitted pushes its own record. At module scope the buffer
// becomes an internal global named `<module>__<n>`; inside a function it becomes
// `<module>_<function>__<n>` and, when local promotion is enabled, is copied once into a
// stack array from the entry block so writes stay private to the invocation. A Value that
// points into the middle of its buffer receives a pointer offset by the same element count.

//! Constant promotion.

use super::context::LlvmContext;
use super::types::{array_of, literal_array, storage_type};
use crate::core::{ConstantData, EmitError, EmitResult, Emittable, InputError, Value};
use inkwell::module::Linkage;
use inkwell::values::{BasicValueEnum, PointerValue};

/// Backend storage a constant buffer was materialized into.
#[derive(Debug, Clone)]
pub(crate) struct PromotedConstant<'ctx> {
    pub(crate) data: ConstantData,
    pub(crate) storage: PointerValue<'ctx>,
}

impl<'ctx> LlvmContext<'ctx> {
    fn find_promotion(&self, data: &ConstantData) -> Option<PointerValue<'ctx>> {
        self.promoted
            .last()?
            .iter()
            .find(|promoted| promoted.data.same_buffer(data))
            .map(|promoted| promoted.storage)
    }

    /// `storage` advanced by `offset` elements of `data`.
    fn offset_into(
        &self,
        storage: PointerValue<'ctx>,
        data: &ConstantData,
        offset: usize,
    ) -> EmitResult<PointerValue<'ctx>> {
        if offset == 0 {
            return Ok(storage);
        }
        let element = storage_type(self.context, data.value_type())?;
        if self.frames.is_empty() {
            Ok(unsafe { storage.const_gep(element, &[self.index(offset)]) })
        } else {
            Ok(unsafe { self.builder.build_in_bounds_gep(element, storage, &[self.index(offset)], "promoted")? })
        }
    }

    fn promoted_value(
        &self,
        value: &Value<'ctx>,
        storage: PointerValue<'ctx>,
        data: &ConstantData,
        offset: usize,
    ) -> EmitResult<Value<'ctx>> {
        let pointer = self.offset_into(storage, data, offset)?;
        let element = storage_type(self.context, data.value_type())?;
        Ok(Value::emitted(
            Emittable::new(pointer.into(), element, 1),
            value.type_description(),
            value.layout().cloned(),
        ))
    }

    fn promote_buffer(&mut self, data: &ConstantData) -> EmitResult<PointerValue<'ctx>> {
        let serial = self.promoted.last().map_or(0, Vec::len);
        let name = match self.frames.last() {
            None => format!("{}__{}", self.module_name, serial),
            Some(function) => format!("{}_{}__{}", self.module_name, function, serial),
        };

        let element = storage_type(self.context, data.value_type())?;
        let array = array_of(element, data.len())?;
        let global = self.module.add_global(array, None, &name);
        global.set_initializer(&literal_array(self.context, data)?);
        global.set_linkage(Linkage::Internal);
        self.track_scoped_global(None, global);

        let storage = if !self.frames.is_empty() && self.options.promote_locally {
            let local = self.alloca_in_entry(element, data.len(), &format!("{}.local", name))?;
            let bytes = data.len() as u64 * data.value_type().size_in_bytes().unwrap_or(1);
            let builder = self.entry_tail_builder()?;
            self.memcpy(&builder, local, global.as_pointer_value(), bytes)?;
            local
        } else {
            global.as_pointer_value()
        };

        log::debug!("promoted {} {} elements into {}", data.len(), data.value_type(), name);
        self.stats.constants_promoted += 1;
        if let Some(record) = self.promoted.last_mut() {
            record.push(PromotedConstant {
                data: data.clone(),
                storage,
            });
        }
        Ok(storage)
    }

    /// The runtime view of an already promoted constant, without promoting.
    /// Anything else comes back unchanged.
    pub fn realize(&self, value: &Value<'ctx>) -> EmitResult<Value<'ctx>> {
        let Some((data, offset)) = value.constant_data() else {
            return Ok(value.clone());
        };
        match self.find_promotion(data) {
            Some(storage) => self.promoted_value(value, storage, data, offset),
            None => Ok(value.clone()),
        }
    }

    /// Runtime view of `value`, promoting its constant buffer on first use in
    /// the current scope.
    pub fn ensure_emittable(&mut self, value: &Value<'ctx>) -> EmitResult<Value<'ctx>> {
        if !value.is_defined() {
            return Err(InputError::UndefinedValue.into());
        }
        let Some((data, offset)) = value.constant_data() else {
            return Ok(value.clone());
        };
        if value.is_empty() {
            return Err(EmitError::invalid_argument("cannot promote an empty value"));
        }
        let storage = match self.find_promotion(data) {
            Some(storage) => storage,
            None => self.promote_buffer(data)?,
        };
        self.promoted_value(value, storage, data, offset)
    }

    /// The emittable handle of `value`, promoting constants.
    pub(crate) fn emittable_of(&mut self, value: &Value<'ctx>) -> EmitResult<Emittable<'ctx>> {
        self.ensure_emittable(value)?
            .emittable()
            .ok_or_else(|| EmitError::illegal_state("promotion produced no runtime handle"))
    }

    /// Scalar operand for element 0: a literal for constants, a load otherwise.
    pub(crate) fn scalar_operand(&mut self, value: &Value<'ctx>) -> EmitResult<BasicValueEnum<'ctx>> {
        if let Some((data, offset)) = value.constant_data() {
            return super::types::literal(self.context, data, offset);
        }
        let emittable = self.emittable_of(value)?;
        self.value_at(&emittable, 0)
    }
}
