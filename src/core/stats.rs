//! Emission statistics.
//!
//! Counters the compiling backend keeps for the lifetime of one module
//! emission session; useful for debugging and for asserting folding and
//! promotion behavior in tests.

use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmissionStats {
    /// User functions emitted (cache hits not counted).
    pub functions_defined: usize,
    /// Named globals registered.
    pub globals_allocated: usize,
    /// Constant buffers materialized into backend storage.
    pub constants_promoted: usize,
    /// Operations answered by the interpreter because every operand was constant.
    pub operations_folded: usize,
    /// Operations lowered to instructions.
    pub operations_emitted: usize,
    /// External functions declared on first call.
    pub external_declarations: usize,
}

impl EmissionStats {
    pub(crate) fn record_folded(&mut self, operation: &str) {
        self.operations_folded += 1;
        log::trace!("folded {} through the interpreter", operation);
    }

    pub(crate) fn record_emitted(&mut self, operation: &str) {
        self.operations_emitted += 1;
        log::trace!("emitted {}", operation);
    }
}

impl fmt::Display for EmissionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Emission Statistics:")?;
        writeln!(f, "  Functions defined: {}", self.functions_defined)?;
        writeln!(f, "  Globals allocated: {}", self.globals_allocated)?;
        writeln!(f, "  Constants promoted: {}", self.constants_promoted)?;
        writeln!(f, "  Operations folded: {}", self.operations_folded)?;
        writeln!(f, "  Operations emitted: {}", self.operations_emitted)?;
        write!(f, "  External declarations: {}", self.external_declarations)
    }
}
