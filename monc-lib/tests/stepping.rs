mod common;

use std::cell::RefCell;
use std::rc::Rc;

use common::*;
use monc_lib::debugging::{ActionState, Breakpoint, DebugError, Debugger, VmDebugger};
use monc_lib::il::{IlFunction, IlModule, Instruction, OpCode::*, Symbol};
use monc_lib::vm::{ExecState, Interpreter, Stop};
use pretty_assertions::assert_eq;

fn at(vdbg: &VmDebugger) -> Option<(usize, usize)> {
    location(vdbg.debugger())
}

fn break_at_foo() -> VmDebugger {
    let mut vdbg = vm_debugger();
    vdbg.set_breakpoint(Breakpoint::new(FOO, 0));
    assert_eq!(vdbg.call("foo", &[]), Ok(Stop::Paused));
    assert!(vdbg.last_break_was_breakpoint());
    vdbg
}

#[test]
fn test_step_over_skips_callee() {
    let mut vdbg = break_at_foo();
    assert_eq!(vdbg.state(), ActionState::Idle);
    assert_eq!(vdbg.step_over(), Ok(true));
    assert_eq!(at(&vdbg), Some((FOO, 2)));
    assert_eq!(vdbg.state(), ActionState::Completed);
    // the breakpoint that was stepped off is armed again
    assert_eq!(patched(vdbg.debugger(), FOO), vec![0]);
}

#[test]
fn test_step_into_enters_callee() {
    let mut vdbg = break_at_foo();
    assert_eq!(vdbg.step_into(), Ok(true));
    assert_eq!(at(&vdbg), Some((BAR, 0)));
}

#[test]
fn test_step_out_returns_to_caller() {
    let mut vdbg = vm_debugger();
    vdbg.set_breakpoint(Breakpoint::new(BAR, 0));
    vdbg.call("foo", &[]).unwrap();
    assert_eq!(at(&vdbg), Some((BAR, 0)));

    assert_eq!(vdbg.step_out(), Ok(true));
    assert_eq!(at(&vdbg), Some((FOO, 1)));
    assert_eq!(vdbg.debugger().vm().operand_stack(), &[7]);
}

#[test]
fn test_breakpoint_preempts_step_over() {
    let mut vdbg = break_at_foo();
    vdbg.set_breakpoint(Breakpoint::new(BAR, 4));

    assert_eq!(vdbg.step_over(), Ok(true));
    assert_eq!(at(&vdbg), Some((BAR, 4)));
    assert!(vdbg.last_break_was_breakpoint());

    assert_eq!(vdbg.continue_(), Ok(true));
    assert!(!vdbg.is_paused());
    assert_eq!(vdbg.debugger().vm().state(), ExecState::Finished);
    assert_eq!(vdbg.debugger().vm().return_value(), 1);
}

#[test]
fn test_breakpoint_preempts_step_into() {
    let line = IlFunction::new([
        Noop.into(),
        Noop.into(),
        Noop.into(),
        Noop.into(),
        Return.into(),
    ])
    .with_symbols([(0, Symbol::line(FILE, 1)), (3, Symbol::line(FILE, 2))]);
    let mut debugger = Debugger::new(Interpreter::new());
    debugger.load_module(IlModule::new(vec![line]).export("line", 0));
    let mut vdbg = VmDebugger::new(debugger);
    vdbg.set_breakpoint(Breakpoint::new(0, 0));
    vdbg.set_breakpoint(Breakpoint::new(0, 2));
    vdbg.call("line", &[]).unwrap();

    // address 2 has no symbol, only the breakpoint stops the step there
    assert_eq!(vdbg.step_into(), Ok(true));
    assert_eq!(at(&vdbg), Some((0, 2)));
    assert!(vdbg.last_break_was_breakpoint());

    assert_eq!(vdbg.step_into(), Ok(true));
    assert_eq!(at(&vdbg), Some((0, 3)));
}

#[test]
fn test_step_finishing_the_program_completes() {
    let breaks = Rc::new(RefCell::new(0));
    let mut vdbg = vm_debugger();
    vdbg.set_breakpoint(Breakpoint::new(FOO, 5));
    vdbg.call("foo", &[]).unwrap();
    assert_eq!(at(&vdbg), Some((FOO, 5)));
    {
        let breaks = breaks.clone();
        vdbg.on_break(move |_| *breaks.borrow_mut() += 1);
    }

    assert_eq!(vdbg.step_over(), Ok(true));
    assert_eq!(vdbg.state(), ActionState::Completed);
    assert!(!vdbg.is_paused());
    assert_eq!(vdbg.debugger().vm().return_value(), 1);
    assert_eq!(*breaks.borrow(), 0);
}

#[test]
fn test_continue_runs_to_breakpoint() {
    let mut vdbg = break_at_foo();
    vdbg.set_breakpoint(Breakpoint::new(BAR, 4));
    assert_eq!(vdbg.continue_(), Ok(true));
    assert_eq!(at(&vdbg), Some((BAR, 4)));
    assert_eq!(patched(vdbg.debugger(), FOO), vec![0]);
}

#[test]
fn test_continue_ends_on_adjacent_breakpoint() {
    let mut vdbg = break_at_foo();
    vdbg.set_breakpoint(Breakpoint::new(BAR, 0));
    assert_eq!(vdbg.continue_(), Ok(true));
    assert_eq!(at(&vdbg), Some((BAR, 0)));
    assert!(vdbg.last_break_was_breakpoint());
}

#[test]
fn test_walk_through_program() {
    let mut vdbg = vm_debugger();
    vdbg.pause();
    vdbg.call("foo", &[]).unwrap();
    assert_eq!(at(&vdbg), Some((BAR, 0)));

    assert_eq!(vdbg.step_out(), Ok(true));
    assert_eq!(at(&vdbg), Some((FOO, 1)));
    // no symbol at the start, so the next symbol ends the step
    assert_eq!(vdbg.step_over(), Ok(true));
    assert_eq!(at(&vdbg), Some((FOO, 2)));
    assert_eq!(vdbg.step_over(), Ok(true));
    assert_eq!(at(&vdbg), Some((FOO, 5)));
    assert_eq!(vdbg.step(), Ok(true));
    assert_eq!(vdbg.debugger().vm().state(), ExecState::Finished);
    assert_eq!(vdbg.debugger().vm().return_value(), 1);
    assert_eq!(
        vdbg.step(),
        Err(DebugError::NotPaused("step"))
    );
}

#[test]
fn test_break_event_only_for_asynchronous_halts() {
    let breaks = Rc::new(RefCell::new(vec![]));
    let pauses = Rc::new(RefCell::new(vec![]));
    let mut vdbg = vm_debugger();
    {
        let breaks = breaks.clone();
        vdbg.on_break(move |frame| breaks.borrow_mut().push((frame.function, frame.pc)));
        let pauses = pauses.clone();
        vdbg.on_pause_changed(move |paused| pauses.borrow_mut().push(*paused));
    }
    vdbg.set_breakpoint(Breakpoint::new(FOO, 0));

    vdbg.call("foo", &[]).unwrap();
    assert_eq!(*breaks.borrow(), vec![(FOO, 0)]);
    assert_eq!(*pauses.borrow(), vec![true]);

    assert_eq!(vdbg.step_into(), Ok(true));
    assert_eq!(*breaks.borrow(), vec![(FOO, 0)]);
    assert_eq!(*pauses.borrow(), vec![true, false, true]);
    assert!(vdbg.is_paused());
}

#[test]
fn test_protocol_errors() {
    let mut vdbg = vm_debugger();
    assert_eq!(vdbg.step_into(), Err(DebugError::NotPaused("step into")));
    assert_eq!(vdbg.continue_(), Err(DebugError::NotPaused("continue")));

    vdbg.set_breakpoint(Breakpoint::new(FOO, 0));
    vdbg.call("foo", &[]).unwrap();
    assert!(matches!(
        vdbg.call("foo", &[]),
        Err(DebugError::Vm(_))
    ));
    // a rejected call leaves the vm where it was
    assert!(vdbg.is_paused());
    assert_eq!(at(&vdbg), Some((FOO, 0)));
}
