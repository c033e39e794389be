//! This file defines the opcodes and the instruction type the vm executes.
//! Every instruction has the same shape, an opcode plus two integer operands, so that
//! code can be patched in place by the debugger.

use serde::{Deserialize, Serialize};
use strum_macros::{Display, IntoStaticStr};

/// The instruction set. All operands are taken from, and all results are put on,
/// the integer operand stack of the vm.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, IntoStaticStr,
)]
#[strum(serialize_all = "UPPERCASE")]
pub enum OpCode {
    /// Does nothing
    Noop,
    /// Halts the vm. Never emitted by the compiler, it only ever appears where the
    /// debugger injected a breakpoint
    Break,

    /// Pops an address and pushes the frame memory at address + immediate
    Read,
    /// Pops an address and writes the stack top to the frame memory at address + immediate.
    /// The written value stays on the stack
    Write,
    /// Pushes the immediate. For string operands the immediate is an index into the
    /// string pool of the module
    Push,
    /// Discards `size` values, but at least one
    Pop,

    /// Calls the function with the index given by the immediate
    Call,
    /// Returns to the caller, operands left on the stack are the return value
    Return,

    /// Pops b and a, pushes 1 if a == b, 0 otherwise
    Cmpe,
    /// Pops b and a, pushes 1 if a < b, 0 otherwise
    Cmplt,
    /// Pops b and a, pushes 1 if a <= b, 0 otherwise
    Cmplte,

    /// Jumps relative to the next instruction by the immediate
    Jump,
    /// Pops a value and jumps like [OpCode::Jump] if it is zero
    Jumpz,
    /// Pops a value and jumps like [OpCode::Jump] if it is not zero
    Jumpnz,

    /// Pops a and pushes 1 if a != 0, 0 otherwise
    Bool,
    /// Logical not
    Lnot,
    Add,
    Sub,
    Or,
    And,
    Xor,
    Mul,
    Div,
    Mod,
}

impl OpCode {
    /// whether executing this opcode transfers control to another function
    pub fn is_call(self) -> bool {
        self == OpCode::Call
    }
}

/// A single instruction. Instructions are plain values, the debugger replaces them in
/// place to inject breakpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instruction {
    pub op: OpCode,
    pub immediate: i32,
    pub size: i32,
}

impl Instruction {
    pub const fn new(op: OpCode) -> Self {
        Self {
            op,
            immediate: 0,
            size: 0,
        }
    }

    pub const fn with_immediate(op: OpCode, immediate: i32) -> Self {
        Self {
            op,
            immediate,
            size: 0,
        }
    }

    pub const fn with_size(op: OpCode, immediate: i32, size: i32) -> Self {
        Self { op, immediate, size }
    }

    /// the instruction the debugger writes over a breakpoint location
    pub const fn breakpoint() -> Self {
        Self::new(OpCode::Break)
    }
}

impl From<OpCode> for Instruction {
    fn from(op: OpCode) -> Self {
        Instruction::new(op)
    }
}
