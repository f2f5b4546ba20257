//! Shared configuration for an [`Assembler`](crate::assembler::Assembler)
//! or [`Compiler`](crate::compiler::Compiler).
//!
//! Modeled on `cranelift-codegen`'s `settings::Flags`/`Configurable`
//! builder: a small set of named, validated options built once and
//! shared read-only afterwards, rather than loose constructor
//! parameters threaded through every call.

use crate::isa::Mode;

/// A builder for [`Flags`]. Every setter returns `self` so configuration
/// reads as a chain, the way `cranelift_codegen::settings::Builder`'s
/// callers use it.
#[derive(Debug, Clone)]
pub struct Builder {
    mode: Mode,
    validate_operands: bool,
    relax_long_jumps: bool,
    push_pop_prologue: bool,
}

impl Builder {
    /// Starts a builder for the given addressing mode.
    pub fn new(mode: Mode) -> Self {
        Builder {
            mode,
            validate_operands: true,
            relax_long_jumps: true,
            push_pop_prologue: true,
        }
    }

    /// See [`Flags::validate_operands`].
    pub fn validate_operands(mut self, enabled: bool) -> Self {
        self.validate_operands = enabled;
        self
    }

    /// See [`Flags::relax_long_jumps`].
    pub fn relax_long_jumps(mut self, enabled: bool) -> Self {
        self.relax_long_jumps = enabled;
        self
    }

    /// See [`Flags::push_pop_prologue`].
    pub fn push_pop_prologue(mut self, enabled: bool) -> Self {
        self.push_pop_prologue = enabled;
        self
    }

    /// Freezes the builder into an immutable [`Flags`].
    pub fn finish(self) -> Flags {
        Flags {
            mode: self.mode,
            validate_operands: self.validate_operands,
            relax_long_jumps: self.relax_long_jumps,
            push_pop_prologue: self.push_pop_prologue,
        }
    }
}

/// Immutable configuration consulted by the encoder and the compiler's
/// lowering pass.
#[derive(Debug, Clone, Copy)]
pub struct Flags {
    mode: Mode,
    validate_operands: bool,
    relax_long_jumps: bool,
    push_pop_prologue: bool,
}

impl Flags {
    /// Default flags for `mode`: operand validation on, jump relaxation
    /// on, push/pop prologues on.
    pub fn new(mode: Mode) -> Self {
        Builder::new(mode).finish()
    }

    /// Starts a [`Builder`] for custom configuration.
    pub fn builder(mode: Mode) -> Builder {
        Builder::new(mode)
    }

    /// The addressing mode (32- or 64-bit).
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Whether the encoder checks operand-kind/size legality before
    /// emitting (spec §4.3.1). Disabling this is only safe for
    /// previously-validated, trusted re-emission.
    pub fn validate_operands(&self) -> bool {
        self.validate_operands
    }

    /// Whether `bind`/finalize may shrink a near jump-to-external
    /// relocation to a short form (spec §4.3.3).
    pub fn relax_long_jumps(&self) -> bool {
        self.relax_long_jumps
    }

    /// Default for `FunctionDecl`'s push/pop-sequence hint (spec
    /// §4.4.2), overridable per function.
    pub fn push_pop_prologue(&self) -> bool {
        self.push_pop_prologue
    }
}
