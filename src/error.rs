//! The latched error model shared by the [`Assembler`](crate::assembler::Assembler)
//! and the [`Compiler`](crate::compiler::Compiler).
//!
//! Both emitters keep a single sticky error code (spec: "Failure semantics").
//! The first failure wins; every call after that returns the same error
//! without doing any work, so user code that doesn't check return values
//! after every single emit still compiles cleanly instead of emitting
//! garbage bytes.

use failure_derive::Fail;

/// Everything that can go latch an [`Assembler`](crate::assembler::Assembler)
/// or a [`Compiler`](crate::compiler::Compiler).
#[derive(Fail, Debug, Clone, PartialEq, Eq)]
pub enum AsmError {
    /// The executable memory manager or the host allocator is out of memory.
    #[fail(display = "allocation failure: {}", reason)]
    Allocation {
        /// Human-readable detail, e.g. "mmap failed" or "region exhausted".
        reason: &'static str,
    },

    /// No instruction form accepts the given combination of operand kinds
    /// or sizes.
    #[fail(
        display = "invalid operand combination for `{}`: {}",
        mnemonic, detail
    )]
    InvalidOperands {
        /// The mnemonic that rejected its operands.
        mnemonic: &'static str,
        /// What was wrong with them.
        detail: &'static str,
    },

    /// An immediate does not fit into the slot its instruction form
    /// reserves for it.
    #[fail(
        display = "immediate {} does not fit in {} bits",
        value, bits
    )]
    InvalidImmediate {
        /// The offending value (sign-extended to 64 bits).
        value: i64,
        /// The width of the slot it was supposed to occupy.
        bits: u8,
    },

    /// A label was bound twice, or was left unbound (still linked) when
    /// `make`/`finalize` was called.
    #[fail(display = "label misuse: {}", detail)]
    LabelMisuse {
        /// e.g. "label already bound" or "label never bound".
        detail: &'static str,
    },

    /// Compiler-only: a variable was used outside the function that
    /// created it, pinned to an already-occupied register without leave
    /// to spill it, or referenced by an unreachable emittable.
    #[fail(display = "variable misuse: {}", detail)]
    VariableMisuse {
        /// What went wrong.
        detail: &'static str,
    },

    /// The instruction form is recognized but the active ISA mode or CPU
    /// feature set doesn't support it (e.g. an SSE4.2 form without the
    /// feature bit, or a qword operand outside 64-bit mode).
    #[fail(display = "`{}` is not encodable here: {}", mnemonic, detail)]
    Unencodable {
        /// The mnemonic that was rejected.
        mnemonic: &'static str,
        /// Why.
        detail: &'static str,
    },
}

/// Shorthand used throughout the crate, mirroring `cranelift_codegen::CodegenResult`.
pub type AsmResult<T> = Result<T, AsmError>;
