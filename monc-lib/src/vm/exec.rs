//! contains the exec functions that correspond to the [OpCode] variants
//!
//! They only ever see the current frame and the operand stack. Everything that needs the
//! module or the call stack (entering and leaving functions) is reported back to the
//! interpreter loop as an [ExecOutcome].

use super::{FaultKind, OperandStack, StackFrame};
use crate::il::{Instruction, OpCode};

/// returned by all exec functions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecOutcome {
    /// the new pc of the current frame
    Pc(usize),
    /// enter the function with this index, it is not validated yet
    Call(i64),
    /// leave the current frame
    Return,
    /// halt, without moving the pc
    Break,
}

pub type ExecResult = Result<ExecOutcome, FaultKind>;

macro_rules! ok_next {
    ($frame:expr) => {
        Ok(ExecOutcome::Pc($frame.pc + 1))
    };
}

macro_rules! binary_op {
    ($frame:expr, $stack:expr, |$a:ident, $b:ident| $body:expr) => {{
        let $b = $stack.pop_above($frame.stack_base)?;
        let $a = $stack.pop_above($frame.stack_base)?;
        $stack.push($body);
        ok_next!($frame)
    }};
}

pub fn exec(ins: Instruction, frame: &mut StackFrame, stack: &mut OperandStack) -> ExecResult {
    use OpCode::*;
    match ins.op {
        Noop => ok_next!(frame),
        Break => Ok(ExecOutcome::Break),
        Read => exec_read(ins, frame, stack),
        Write => exec_write(ins, frame, stack),
        Push => {
            stack.push(ins.immediate);
            ok_next!(frame)
        }
        Pop => exec_pop(ins, frame, stack),
        Call => Ok(ExecOutcome::Call(ins.immediate.into())),
        Return => Ok(ExecOutcome::Return),
        Cmpe => binary_op!(frame, stack, |a, b| (a == b).into()),
        Cmplt => binary_op!(frame, stack, |a, b| (a < b).into()),
        Cmplte => binary_op!(frame, stack, |a, b| (a <= b).into()),
        Jump => jump_target(frame, ins.immediate).map(ExecOutcome::Pc),
        Jumpz => exec_cond_jump(ins, frame, stack, |cond| cond == 0),
        Jumpnz => exec_cond_jump(ins, frame, stack, |cond| cond != 0),
        Bool => exec_unary(frame, stack, |a| (a != 0).into()),
        Lnot => exec_unary(frame, stack, |a| (a == 0).into()),
        Add => binary_op!(frame, stack, |a, b| a.wrapping_add(b)),
        Sub => binary_op!(frame, stack, |a, b| a.wrapping_sub(b)),
        Or => binary_op!(frame, stack, |a, b| a | b),
        And => binary_op!(frame, stack, |a, b| a & b),
        Xor => binary_op!(frame, stack, |a, b| a ^ b),
        Mul => binary_op!(frame, stack, |a, b| a.wrapping_mul(b)),
        Div => exec_division(frame, stack, i32::wrapping_div),
        Mod => exec_division(frame, stack, i32::wrapping_rem),
    }
}

fn exec_read(ins: Instruction, frame: &mut StackFrame, stack: &mut OperandStack) -> ExecResult {
    let address = stack.pop_above(frame.stack_base)?;
    let value = frame
        .memory
        .read(i64::from(address) + i64::from(ins.immediate))?;
    stack.push(value);
    ok_next!(frame)
}

fn exec_write(ins: Instruction, frame: &mut StackFrame, stack: &mut OperandStack) -> ExecResult {
    let address = stack.pop_above(frame.stack_base)?;
    let value = stack.peek_above(frame.stack_base)?;
    frame
        .memory
        .write(i64::from(address) + i64::from(ins.immediate), value)?;
    ok_next!(frame)
}

fn exec_pop(ins: Instruction, frame: &mut StackFrame, stack: &mut OperandStack) -> ExecResult {
    for _ in 0..ins.size.max(1) {
        stack.pop_above(frame.stack_base)?;
    }
    ok_next!(frame)
}

fn exec_unary(
    frame: &mut StackFrame,
    stack: &mut OperandStack,
    f: impl FnOnce(i32) -> i32,
) -> ExecResult {
    let a = stack.pop_above(frame.stack_base)?;
    stack.push(f(a));
    ok_next!(frame)
}

fn exec_division(
    frame: &mut StackFrame,
    stack: &mut OperandStack,
    f: fn(i32, i32) -> i32,
) -> ExecResult {
    let b = stack.pop_above(frame.stack_base)?;
    let a = stack.pop_above(frame.stack_base)?;
    if b == 0 {
        return Err(FaultKind::DivisionByZero);
    }
    stack.push(f(a, b));
    ok_next!(frame)
}

fn exec_cond_jump(
    ins: Instruction,
    frame: &mut StackFrame,
    stack: &mut OperandStack,
    taken: impl FnOnce(i32) -> bool,
) -> ExecResult {
    let cond = stack.pop_above(frame.stack_base)?;
    if taken(cond) {
        jump_target(frame, ins.immediate).map(ExecOutcome::Pc)
    } else {
        ok_next!(frame)
    }
}

/// jumps are relative to the instruction following the jump
fn jump_target(frame: &StackFrame, offset: i32) -> Result<usize, FaultKind> {
    let target = frame.pc as i64 + 1 + i64::from(offset);
    usize::try_from(target).map_err(|_| FaultKind::InvalidCodeAddress(target))
}
