mod common;

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use common::*;
use monc_lib::debugging::{Breakpoint, Debugger, StepOutcome};
use monc_lib::il::{IlFunction, IlModule, Instruction, OpCode, Symbol};
use monc_lib::vm::{Interpreter, Stop};
use pretty_assertions::assert_eq;

#[test]
fn test_breakpoint_in_straight_line_code() {
    let main = IlFunction::new([
        Instruction::with_immediate(OpCode::Push, 1),
        Instruction::with_immediate(OpCode::Push, 2),
        Instruction::new(OpCode::Add),
        Instruction::new(OpCode::Return),
    ])
    .with_symbols([(0, Symbol::line("main.mc", 1)), (2, Symbol::line("main.mc", 2))]);
    let mut dbg = Debugger::new(Interpreter::new());
    dbg.load_module(IlModule::new(vec![main]).export("main", 0));

    dbg.set_breakpoint(Breakpoint::new(0, 2));
    let code = |dbg: &Debugger| dbg.vm().module().unwrap().function(0).unwrap().code[2].op;
    assert_eq!(code(&dbg), OpCode::Break);

    assert_eq!(dbg.call("main", &[]), Ok(Stop::Paused));
    let frame = dbg.vm().stack_frame(0).unwrap();
    assert_eq!((frame.function, frame.pc), (0, 2));

    assert!(dbg.restore_instruction(frame));
    assert_eq!(code(&dbg), OpCode::Add);
    assert_eq!(dbg.get_source_location(frame), Some(("main.mc", 2)));
}

#[test]
fn test_step_next_runs_the_call() {
    let mut dbg = debugger();
    dbg.set_breakpoint(Breakpoint::new(FOO, 0));
    dbg.call("foo", &[]).unwrap();
    assert_eq!(location(&dbg), Some((FOO, 0)));

    let outcome = dbg.step_next().unwrap();
    assert_eq!(outcome.frame().map(|f| (f.function, f.pc)), Some((FOO, 2)));
    assert_eq!(patched(&dbg, FOO), vec![0]);
    assert_eq!(patched(&dbg, BAR), Vec::<usize>::new());

    let outcome = dbg.step_next().unwrap();
    assert_eq!(outcome.frame().map(|f| (f.function, f.pc)), Some((FOO, 5)));
    assert_eq!(dbg.step_next(), Ok(StepOutcome::Finished(1)));
}

#[test]
fn test_step_next_removes_unhit_temporary_breakpoint() {
    let mut dbg = debugger();
    dbg.set_breakpoint(Breakpoint::new(FOO, 0));
    dbg.set_breakpoint(Breakpoint::new(BAR, 4));
    dbg.call("foo", &[]).unwrap();

    let outcome = dbg.step_next().unwrap();
    assert_eq!(
        outcome,
        StepOutcome::Paused {
            frame: dbg.vm().stack_frame(0).unwrap(),
            on_breakpoint: true
        }
    );
    assert_eq!(location(&dbg), Some((BAR, 4)));
    // foo@2 held the temporary breakpoint, bar@4 is restored while the vm sits on it
    assert_eq!(patched(&dbg, FOO), vec![0]);
    assert_eq!(patched(&dbg, BAR), Vec::<usize>::new());

    assert_eq!(dbg.continue_(), Ok(StepOutcome::Finished(1)));
    assert_eq!(patched(&dbg, BAR), vec![4]);
}

#[test]
fn test_step_into_enters_callee() {
    let mut dbg = debugger();
    dbg.set_breakpoint(Breakpoint::new(FOO, 0));
    dbg.call("foo", &[]).unwrap();
    dbg.step_into().unwrap();
    assert_eq!(location(&dbg), Some((BAR, 0)));
    assert_eq!(dbg.get_source_location(dbg.vm().stack_frame(0).unwrap()), Some((FILE, 2)));
}

#[test]
fn test_continue_stops_at_next_breakpoint() {
    let mut dbg = debugger();
    dbg.set_breakpoint(Breakpoint::new(FOO, 0));
    dbg.set_breakpoint(Breakpoint::new(BAR, 4));
    dbg.call("foo", &[]).unwrap();

    dbg.continue_().unwrap();
    assert_eq!(location(&dbg), Some((BAR, 4)));
    assert_eq!(dbg.vm().operand_stack(), &[] as &[i32]);
    assert_eq!(dbg.vm().frame_memory(0).map(|m| m.as_slice()), Some(&[5][..]));
}

#[test]
fn test_pause_before_call() {
    let mut dbg = debugger();
    dbg.pause();
    assert_eq!(dbg.call("foo", &[]), Ok(Stop::Paused));
    assert_eq!(location(&dbg), Some((BAR, 0)));
}

#[test]
fn test_events() {
    let breaks = Rc::new(RefCell::new(vec![]));
    let active = Rc::new(RefCell::new(vec![]));
    let mut dbg = debugger();
    {
        let breaks = breaks.clone();
        dbg.on_break(move |frame| breaks.borrow_mut().push((frame.function, frame.pc)));
        let active = active.clone();
        dbg.on_active_changed(move |a| active.borrow_mut().push(*a));
    }

    dbg.set_breakpoint(Breakpoint::new(FOO, 0));
    dbg.call("foo", &[]).unwrap();
    dbg.step_into().unwrap();
    dbg.continue_().unwrap();

    assert_eq!(*breaks.borrow(), vec![(FOO, 0), (BAR, 0)]);
    assert_eq!(*active.borrow(), vec![true, false]);
}

#[test]
fn test_line_breakpoints_follow_reloads() {
    let mut dbg = debugger();
    assert_eq!(
        dbg.set_breakpoint_at_line(FILE, 11),
        Some(Breakpoint::new(FOO, 2))
    );
    assert_eq!(dbg.set_breakpoint_at_line(FILE, 3), Some(Breakpoint::new(BAR, 4)));

    let mut moved = prog();
    moved.function_mut(FOO).unwrap().symbols = BTreeMap::from([
        (0, Symbol::line(FILE, 10)),
        (3, Symbol::line(FILE, 11)),
    ]);
    dbg.load_module(moved);

    assert_eq!(
        dbg.breakpoints().collect::<Vec<_>>(),
        vec![Breakpoint::new(FOO, 3), Breakpoint::new(BAR, 4)]
    );
    assert_eq!(patched(&dbg, FOO), vec![3]);

    dbg.remove_breakpoint_at_line(FILE, 11);
    assert_eq!(patched(&dbg, FOO), Vec::<usize>::new());
    assert_eq!(patched(&dbg, BAR), vec![4]);
}
