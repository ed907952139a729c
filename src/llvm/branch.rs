//! If / else-if / else emission.
//!
//! Every arm leaves a *pending* block behind that only branches to the
//! merge block. A following `else_if` or `else_` drops that branch and emits
//! its own test or body there, so an unfinished chain is always well formed.

use super::context::LlvmContext;
use crate::core::{BlockFn, EmitError, EmitResult, IfState, Scalar, ValueType};
use inkwell::basic_block::BasicBlock;
use inkwell::values::IntValue;

impl<'ctx> LlvmContext<'ctx> {
    /// `i1` condition: a literal for constant tests, the runtime value otherwise.
    fn branch_condition(&mut self, test: &Scalar<'ctx>) -> EmitResult<IntValue<'ctx>> {
        let value = test.value();
        value.ensure_defined()?;
        if value.base_type() != ValueType::Boolean {
            return Err(EmitError::type_mismatch(format!(
                "branch condition must be boolean, got {}",
                value.base_type()
            )));
        }
        if value.is_constant() {
            let taken = test.get::<bool>()?;
            return Ok(self.context.bool_type().const_int(taken as u64, false));
        }
        let emittable = self.emittable_of(value)?;
        if emittable.pointer_level == 0 {
            return self.truth(emittable.value);
        }
        let stored = self.value_at(&emittable, 0)?;
        self.truth(stored)
    }

    /// Closes the current block with a branch to `target` unless the body
    /// already terminated it.
    fn fall_through(&self, target: BasicBlock<'ctx>) -> EmitResult<()> {
        let terminated = self
            .builder
            .get_insert_block()
            .map_or(true, |block| block.get_terminator().is_some());
        if !terminated {
            self.builder.build_unconditional_branch(target)?;
        }
        Ok(())
    }

    /// Emits `if (test) body` with control continuing at `merge`; returns the
    /// new pending block.
    fn emit_arm(
        &mut self,
        test: &Scalar<'ctx>,
        body: BlockFn<'_, 'ctx>,
        merge: BasicBlock<'ctx>,
    ) -> EmitResult<BasicBlock<'ctx>> {
        let condition = self.branch_condition(test)?;
        let then_block = self.context.prepend_basic_block(merge, "if.then");
        let pending = self.context.prepend_basic_block(merge, "if.next");
        self.builder.build_conditional_branch(condition, then_block, pending)?;

        self.builder.position_at_end(then_block);
        body(self)?;
        self.fall_through(merge)?;

        self.builder.position_at_end(pending);
        self.builder.build_unconditional_branch(merge)?;
        self.builder.position_at_end(merge);
        self.stats.record_emitted("branch");
        Ok(pending)
    }

    /// Drops the pending block's placeholder branch and positions there.
    fn reopen(&self, pending: BasicBlock<'ctx>) {
        if let Some(terminator) = pending.get_terminator() {
            terminator.erase_from_basic_block();
        }
        self.builder.position_at_end(pending);
    }

    pub(crate) fn emit_begin_if(&mut self, test: &Scalar<'ctx>, body: BlockFn<'_, 'ctx>) -> EmitResult<IfState<'ctx>> {
        let function = self.current_function()?;
        let merge = self.context.append_basic_block(function, "if.end");
        let pending = self.emit_arm(test, body, merge)?;
        Ok(IfState::Emitted { pending, merge })
    }

    pub(crate) fn emit_else_if(
        &mut self,
        state: IfState<'ctx>,
        test: &Scalar<'ctx>,
        body: BlockFn<'_, 'ctx>,
    ) -> EmitResult<IfState<'ctx>> {
        let IfState::Emitted { pending, merge } = state else {
            return Err(EmitError::illegal_state("interpreted if-chain continued in emitted code"));
        };
        self.reopen(pending);
        let pending = self.emit_arm(test, body, merge)?;
        Ok(IfState::Emitted { pending, merge })
    }

    pub(crate) fn emit_else(&mut self, state: IfState<'ctx>, body: BlockFn<'_, 'ctx>) -> EmitResult<()> {
        let IfState::Emitted { pending, merge } = state else {
            return Err(EmitError::illegal_state("interpreted if-chain continued in emitted code"));
        };
        self.reopen(pending);
        body(self)?;
        self.fall_through(merge)?;
        self.builder.position_at_end(merge);
        Ok(())
    }
}
