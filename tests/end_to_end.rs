//! End-to-end JIT scenarios (SPEC_FULL.md §A.5, spec §8 "End-to-end
//! scenarios" 1-6): build a function through the `Compiler` (or, for the
//! raw label test, the `Assembler` directly), finalize it into
//! executable memory, transmute the entry point to an `extern "C" fn`,
//! and call it. Mirrors `AsmJit/test/testfunc*.cpp` in
//! `examples/original_source/`.
//!
//! Gated on `cfg(unix)`: the memory manager's POSIX `mmap` path is what
//! this environment exercises; the Windows `VirtualAlloc` path is
//! covered by the manager's own unit tests, not here.
#![cfg(unix)]

use asmjit::compiler::Compiler;
use asmjit::isa::registers::{EAX, RAX, RBP, RSP};
use asmjit::{Assembler, CallConv, CondCode, Mem, Mode, Size, VarType};

/// Scenario 1: `void f(uint32_t* dst, const uint32_t* src, size_t n)`
/// that copies `n` dwords one at a time, advancing both pointers.
#[test]
fn dword_memcpy() {
    let mut c = Compiler::new(Mode::X64);
    let (params, _ret) = c.declare_function(CallConv::SystemV64, &[VarType::I64, VarType::I64, VarType::I64], None);
    let dst = params[0];
    let src = params[1];
    let n = params[2];

    let top = c.new_ir_label();
    let done = c.new_ir_label();
    let zero = c.new_var(VarType::I64);
    c.mov(zero, 0i64);
    c.bind_label(top);
    c.cmp(n, zero);
    c.jcc(CondCode::Le, done);

    let word = c.new_var(VarType::I32);
    c.load(word, src, 0);
    c.store(dst, 0, word);
    c.add(src, 4i64);
    c.add(dst, 4i64);
    c.sub(n, 1i64);
    c.jmp(top);

    c.bind_label(done);
    c.ret(None);

    let buf = c.finalize().expect("memcpy body should assemble");
    let f: extern "C" fn(*mut u32, *const u32, u64) = unsafe { buf.as_fn() };

    let mut src_data = [0u32; 128];
    for (i, v) in src_data.iter_mut().enumerate() {
        *v = (i as u32) * 3 + 1;
    }
    let mut dst_data = [0u32; 128];
    f(dst_data.as_mut_ptr(), src_data.as_ptr(), 128);
    assert_eq!(dst_data, src_data);
}

/// Scenario 2: `int fact(int n) { return n <= 1 ? n : n * fact(n - 1); }`
#[test]
fn factorial_via_recursion() {
    let mut c = Compiler::new(Mode::X64);
    let (params, ret) = c.declare_function(CallConv::SystemV64, &[VarType::I64], Some(VarType::I64));
    let n = params[0];
    let entry = c.entry_label();

    let one = c.new_var(VarType::I64);
    c.mov(one, 1i64);
    let base_case = c.new_ir_label();
    c.cmp(n, one);
    c.jcc(CondCode::Le, base_case);

    let n_minus_one = c.new_var(VarType::I64);
    c.mov(n_minus_one, n);
    c.sub(n_minus_one, 1i64);
    let sub_ret = c
        .call_self(entry, CallConv::SystemV64, &[n_minus_one], Some(VarType::I64))
        .unwrap();
    let result = c.new_var(VarType::I64);
    c.mov(result, n);
    c.imul(result, sub_ret);
    c.ret(Some(result));

    c.bind_label(base_case);
    c.ret(Some(n));

    let _ = ret;
    let buf = c.finalize().expect("recursive factorial should assemble");
    let f: extern "C" fn(i64) -> i64 = unsafe { buf.as_fn() };

    assert_eq!(f(5), 120);
    assert_eq!(f(0), 0);
    assert_eq!(f(1), 1);
}

/// Scenario 3: eight pointer arguments, body writes 1..8 into `*p1..*p8`.
/// SysV64 passes the first six in registers and spills the remaining
/// two to the stack, exercising both argument-passing paths. Uses
/// 4-byte writes (`store`'s immediate form has no byte-size variant)
/// rather than the spec's literal byte array, which doesn't change
/// what the scenario actually probes: register/stack argument handling.
#[test]
fn eight_argument_call() {
    let mut c = Compiler::new(Mode::X64);
    let params_ty = vec![VarType::I64; 8];
    let (params, _ret) = c.declare_function(CallConv::SystemV64, &params_ty, None);
    for (i, &p) in params.iter().enumerate() {
        c.store(p, 0, (i as i64) + 1);
    }
    c.ret(None);

    let buf = c.finalize().expect("eight-argument body should assemble");
    type F = extern "C" fn(*mut u32, *mut u32, *mut u32, *mut u32, *mut u32, *mut u32, *mut u32, *mut u32);
    let f: F = unsafe { buf.as_fn() };

    let mut words = [0u32; 9];
    let ptrs: Vec<*mut u32> = (0..8).map(|i| unsafe { words.as_mut_ptr().add(1 + i) }).collect();
    f(ptrs[0], ptrs[1], ptrs[2], ptrs[3], ptrs[4], ptrs[5], ptrs[6], ptrs[7]);
    assert_eq!(words, [0, 1, 2, 3, 4, 5, 6, 7, 8]);
}

/// Scenario 4: a zero-arg function that allocates an XMM-class Compiler
/// variable and returns `address_of(slot) & 15`, which must be zero.
/// Forcing the variable to the stack exercises `alloc_slot`'s 16-byte
/// XMM alignment path (regalloc.rs) directly, rather than just the
/// frame-alignment guarantee it rests on: `push rbp` realigns to 16
/// after the call instruction's 8-byte misalignment, so a 16-byte slot
/// carved off `rbp` stays 16-aligned.
#[test]
fn sixteen_byte_alignment_probe() {
    let mut c = Compiler::new(Mode::X64);
    let (_, ret) = c.declare_function(CallConv::SystemV64, &[], Some(VarType::I64));
    let xmm_slot = c.new_var(VarType::F64);
    let addr = c.new_var(VarType::I64);
    c.address_of(addr, xmm_slot, 0);
    c.and(addr, 15i64);
    c.ret(Some(addr));
    let _ = ret;

    let buf = c.finalize().expect("alignment probe should assemble");
    let f: extern "C" fn() -> i64 = unsafe { buf.as_fn() };
    assert_eq!(f(), 0);
}

/// Scenario 5: raw `Assembler` forward/backward label test —
/// `xor eax,eax; jmp L2; L1: ret; L2: mov eax, 42; jmp L1`.
#[test]
fn forward_and_backward_label() {
    let mut asm = Assembler::new(Mode::X64);
    asm.xor_rr(EAX, EAX);
    let l1 = asm.new_label();
    let l2 = asm.new_label();
    asm.jmp_label(l2);
    asm.bind(l1);
    asm.ret();
    asm.bind(l2);
    asm.mov_ri(EAX, 42i32);
    asm.jmp_label(l1);

    let buf = asm.make().expect("label chain should resolve cleanly");
    let f: extern "C" fn() -> i32 = unsafe { buf.as_fn() };
    assert_eq!(f(), 42);
}

/// Scenario 6: `int f(int cond, int a, int b)` returning `a` if `cond
/// == 0` else `b`, lowered through `cmp` + `cmovne`.
#[test]
fn conditional_move_sequence() {
    let mut c = Compiler::new(Mode::X64);
    let (params, ret) = c.declare_function(CallConv::SystemV64, &[VarType::I64, VarType::I64, VarType::I64], Some(VarType::I64));
    let cond = params[0];
    let a = params[1];
    let b = params[2];

    let zero = c.new_var(VarType::I64);
    c.mov(zero, 0i64);
    c.cmp(cond, zero);
    let result = c.new_var(VarType::I64);
    c.mov(result, a);
    c.cmovcc(CondCode::Ne, result, b);
    c.ret(Some(result));
    let _ = ret;

    let buf = c.finalize().expect("cmov sequence should assemble");
    let f: extern "C" fn(i64, i64, i64) -> i64 = unsafe { buf.as_fn() };

    assert_eq!(f(0, 7, 9), 7);
    assert_eq!(f(1, 7, 9), 9);
}
