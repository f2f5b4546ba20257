//! The text-formatter collaborator (spec §6).
//!
//! This is deliberately *not* the `log` crate: `log` carries this
//! crate's own implementor-facing diagnostics (buffer growth, register
//! allocator decisions — see `SPEC_FULL.md` §A.1). `Logger` is the
//! caller-facing hook for a disassembly-style trace of what was
//! actually emitted. Attaching one is optional; when absent, the
//! `Assembler`/`Compiler` do no text formatting at all.

use crate::label::Label;
use crate::operand::Operand;

/// Sink for human-readable assembly text.
///
/// The structured hooks (`log_instruction`, `log_label`, `log_align`,
/// `log_comment`) have default implementations that format themselves
/// and forward to [`log`](Logger::log), so a minimal implementor only
/// needs that one method; a collaborator that wants richer formatting
/// (column alignment, syntax coloring) can override the specific hooks.
pub trait Logger {
    /// Receives a single already-formatted line of text (no trailing
    /// newline).
    fn log(&mut self, text: &str);

    /// Called once per emitted instruction.
    fn log_instruction(&mut self, mnemonic: &str, operands: &[Operand]) {
        let mut line = String::from(mnemonic);
        for (i, op) in operands.iter().enumerate() {
            line.push_str(if i == 0 { " " } else { ", " });
            line.push_str(&op.to_string());
        }
        self.log(&line);
    }

    /// Called when a label is bound.
    fn log_label(&mut self, label: Label) {
        self.log(&format!("{}:", label));
    }

    /// Called when `align(n)` emits padding.
    fn log_align(&mut self, n: u32) {
        self.log(&format!("; align {}", n));
    }

    /// Called for a `Comment` emittable (Compiler only).
    fn log_comment(&mut self, text: &str) {
        self.log(&format!("; {}", text));
    }
}

/// A [`Logger`] that discards everything. Used as the default so callers
/// never have to special-case "no logger attached".
#[derive(Default)]
pub struct NullLogger;

impl Logger for NullLogger {
    fn log(&mut self, _text: &str) {}
}

/// A [`Logger`] that forwards every line to the `log` crate at `trace`
/// level, for callers who already have a `log` backend configured and
/// don't want a separate text sink.
#[derive(Default)]
pub struct TraceLogger;

impl Logger for TraceLogger {
    fn log(&mut self, text: &str) {
        log::trace!("{}", text);
    }
}
