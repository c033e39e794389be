#![allow(dead_code)]

use monc_lib::debugging::{Debugger, VmDebugger};
use monc_lib::il::{IlFunction, IlModule, Instruction, OpCode::*, Symbol};
use monc_lib::vm::{Interpreter, StackFrameInfo};

pub const FILE: &str = "prog.mc";

pub const FOO: usize = 0;
pub const BAR: usize = 1;

fn push(v: i32) -> Instruction {
    Instruction::with_immediate(Push, v)
}

/// ```text
/// 2  bar() { x = 5;
/// 3          return 7; }
///
/// 10 foo() { bar();
/// 11         x = 1;
/// 12         return; }
/// ```
/// foo returns 1, bar leaves 7 on the stack
pub fn prog() -> IlModule {
    let foo = IlFunction::new([
        Instruction::with_immediate(Call, BAR as i32),
        Pop.into(),
        push(1),
        push(0),
        Instruction::with_immediate(Write, 0),
        Return.into(),
    ])
    .with_symbols([
        (0, Symbol::line(FILE, 10)),
        (2, Symbol::line(FILE, 11)),
        (5, Symbol::line(FILE, 12)),
    ]);
    let bar = IlFunction::new([
        push(5),
        push(0),
        Instruction::with_immediate(Write, 0),
        Pop.into(),
        push(7),
        Return.into(),
    ])
    .with_symbols([(0, Symbol::line(FILE, 2)), (4, Symbol::line(FILE, 3))]);
    IlModule::new(vec![foo, bar])
        .export("foo", FOO)
        .export("bar", BAR)
}

pub fn debugger() -> Debugger {
    let mut debugger = Debugger::new(Interpreter::new());
    debugger.load_module(prog());
    debugger
}

pub fn vm_debugger() -> VmDebugger {
    VmDebugger::new(debugger())
}

/// function and pc of the innermost frame
pub fn location(debugger: &Debugger) -> Option<(usize, usize)> {
    debugger
        .vm()
        .stack_frame(0)
        .map(|StackFrameInfo { function, pc, .. }| (function, pc))
}

pub fn patched(debugger: &Debugger, function: usize) -> Vec<usize> {
    debugger
        .vm()
        .module()
        .and_then(|m| m.function(function))
        .map(|f| f.code.patched_addresses().collect())
        .unwrap_or_default()
}
