//! Currently, what you need to do to run a module is the following:
//! 1. get an [`il::IlModule`] from the front end, or decode one with
//!    [`il::IlModule::from_bytes`]
//! 1. create a [`vm::Interpreter`] and load the module with
//!    [`vm::Interpreter::load_module`]
//! 1. call an exported function:
//!
//!    ```
//!    # use monc_lib::il::{IlFunction, IlModule, Instruction, OpCode};
//!    # use monc_lib::vm::{Interpreter, Stop};
//!    # let module = IlModule::new(vec![IlFunction::new([
//!    #     Instruction::with_immediate(OpCode::Push, 42),
//!    #     Instruction::new(OpCode::Return),
//!    # ])])
//!    # .export("main", 0);
//!    let mut vm = Interpreter::new();
//!    vm.load_module(module);
//!    assert_eq!(vm.call("main", &[]), Ok(Stop::Finished(42)));
//!    ```
//!
//! To debug it instead, hand the interpreter to a [`debugging::Debugger`] and drive it
//! with a [`debugging::VmDebugger`]:
//!
//!    ```
//!    # use monc_lib::il::{IlFunction, IlModule, Instruction, OpCode, Symbol};
//!    # use monc_lib::vm::Interpreter;
//!    # use monc_lib::debugging::{Breakpoint, Debugger, VmDebugger};
//!    # let module = IlModule::new(vec![IlFunction::new([
//!    #     Instruction::with_immediate(OpCode::Push, 1),
//!    #     Instruction::with_immediate(OpCode::Push, 2),
//!    #     Instruction::new(OpCode::Add),
//!    #     Instruction::new(OpCode::Return),
//!    # ])
//!    # .with_symbols([(0, Symbol::line("main.mc", 1)), (2, Symbol::line("main.mc", 2))])])
//!    # .export("main", 0);
//!    let mut debugger = Debugger::new(Interpreter::new());
//!    debugger.load_module(module);
//!    let mut vm_debugger = VmDebugger::new(debugger);
//!    vm_debugger.set_breakpoint(Breakpoint::new(0, 0));
//!    vm_debugger.call("main", &[]).unwrap();
//!    assert!(vm_debugger.step_over().unwrap());
//!    ```
//!
pub mod debugging;
pub mod il;
pub mod utils;
pub mod vm;
