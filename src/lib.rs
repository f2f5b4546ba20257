//! Native x86/x86-64 machine code generation at runtime.
//!
//! This crate provides three layers, from lowest to highest level (see
//! the module docs on each for the full story):
//!
//! - [`assembler`]: a typed one-to-one emitter. Every method call
//!   produces exactly the bytes of one instruction.
//! - [`compiler`]: a register-allocating IR. Emit virtual-register
//!   operations against an unbounded set of [`compiler::Variable`]s and
//!   let the allocator assign physical registers and stack slots before
//!   lowering into an [`assembler::Assembler`].
//! - [`vmem`]: an executable memory manager that turns a finished
//!   buffer into pages the CPU can jump into.
//!
//! Everything above is single-threaded and non-reentrant except the
//! memory manager, which is safe to share across threads (see each
//! type's docs for the precise contract).

#![warn(missing_docs)]

pub mod assembler;
pub mod buffer;
pub mod compiler;
pub mod cpuinfo;
pub mod error;
pub mod flags;
pub mod isa;
pub mod label;
pub mod logger;
pub mod operand;
pub mod reloc;
pub mod vmem;

pub use assembler::{Assembler, CondCode, ExecutableBuffer};
pub use compiler::{Compiler, FunctionHints, IrLabel, VarId, VarType, Variable};
pub use error::{AsmError, AsmResult};
pub use flags::{Builder, Flags};
pub use isa::{CallConv, Mode, Reg, RegClass};
pub use label::Label;
pub use logger::{Logger, NullLogger, TraceLogger};
pub use operand::{Imm, Mem, Operand, Scale, Size};

/// The crate's semantic version, for embedding in diagnostics or IR dumps.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
