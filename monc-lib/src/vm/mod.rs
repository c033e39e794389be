//! The bytecode interpreter.
//!
//! An [Interpreter] holds one loaded module, an operand stack shared by all frames and a
//! call stack. Every run request, [Interpreter::call] or [Interpreter::resume], executes
//! on the caller's thread until the next halt and notifies the registered break handler
//! exactly once.

use derive_more::Display;
use thiserror::Error;
use tracing::{debug, trace};

use crate::il::{IlModule, ModuleId};

pub mod exec;
use exec::ExecOutcome;

pub mod frame;
pub use frame::*;

pub mod stack;
pub use stack::*;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VmError {
    #[error("No module is loaded")]
    NoModule,

    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("The vm is not paused")]
    NotPaused,

    #[error("The vm is paused inside a call, resume it instead")]
    AlreadyRunning,

    #[error("A break handler is registered already")]
    HandlerAlreadyRegistered,

    #[error("Runtime fault in function {function} at {address}: {kind}")]
    Fault {
        function: usize,
        address: usize,
        kind: FaultKind,
    },
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    #[error("stack underflow")]
    StackUnderflow,

    #[error("invalid code address {0}")]
    InvalidCodeAddress(i64),

    #[error("invalid memory address {0}")]
    InvalidMemoryAddress(i64),

    #[error("invalid function index {0}")]
    InvalidFunction(i64),

    #[error("division by zero")]
    DivisionByZero,
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum ExecState {
    NotStarted,
    Paused,
    /// only set while a run request executes
    Running,
    Finished,
}

/// How a run request ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stop {
    Paused,
    Finished(i32),
}

/// Passed to the break handler once per run request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HaltEvent {
    Break(StackFrameInfo),
    Finished(i32),
    Faulted(VmError),
}

pub type BreakHandler = Box<dyn FnMut(&HaltEvent)>;

macro_rules! fault {
    ($frame:expr, $kind:expr) => {
        VmError::Fault {
            function: $frame.function,
            address: $frame.pc,
            kind: $kind,
        }
    };
}

pub struct Interpreter {
    module: Option<IlModule>,
    module_id: ModuleId,
    next_module_id: u32,
    call_stack: Vec<StackFrame>,
    stack: OperandStack,
    stepping: bool,
    state: ExecState,
    return_value: i32,
    break_handler: Option<BreakHandler>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Self {
            module: None,
            module_id: ModuleId(0),
            next_module_id: 0,
            call_stack: vec![],
            stack: OperandStack::default(),
            stepping: false,
            state: ExecState::NotStarted,
            return_value: 0,
            break_handler: None,
        }
    }

    /// Replaces the loaded module. Any call in progress is dropped.
    pub fn load_module(&mut self, module: IlModule) -> ModuleId {
        self.module_id = ModuleId(self.next_module_id);
        self.next_module_id += 1;
        debug!(
            "loaded {} with {} functions",
            self.module_id,
            module.defined_functions.len()
        );
        self.module = Some(module);
        self.call_stack.clear();
        self.stack.clear();
        self.state = ExecState::NotStarted;
        self.module_id
    }

    pub fn module(&self) -> Option<&IlModule> {
        self.module.as_ref()
    }

    pub(crate) fn module_mut(&mut self) -> Option<&mut IlModule> {
        self.module.as_mut()
    }

    pub fn module_id(&self) -> ModuleId {
        self.module_id
    }

    /// Calls an exported function and runs until it halts, finishes or faults.
    /// `args` become the initial memory of the new frame.
    pub fn call(&mut self, name: &str, args: &[i32]) -> Result<Stop, VmError> {
        if self.state == ExecState::Paused {
            return Err(VmError::AlreadyRunning);
        }
        let module = self.module.as_ref().ok_or(VmError::NoModule)?;
        let function = module
            .lookup_function(name)
            .filter(|idx| module.function(*idx).is_some())
            .ok_or_else(|| VmError::UnknownFunction(name.to_owned()))?;

        debug!("calling {} ({}) with {:?}", name, function, args);
        self.stack.clear();
        self.call_stack.clear();
        self.call_stack
            .push(StackFrame::new(function, args.to_vec(), 0));
        self.run()
    }

    /// Resumes a paused vm from the pc of the top frame
    pub fn resume(&mut self) -> Result<Stop, VmError> {
        if self.state != ExecState::Paused {
            return Err(VmError::NotPaused);
        }
        self.run()
    }

    /// In stepping mode, every run request executes exactly one instruction
    pub fn set_stepping(&mut self, stepping: bool) {
        self.stepping = stepping;
    }

    pub fn is_stepping(&self) -> bool {
        self.stepping
    }

    pub fn state(&self) -> ExecState {
        self.state
    }

    pub fn is_paused(&self) -> bool {
        self.state == ExecState::Paused
    }

    /// the value the last finished call returned
    pub fn return_value(&self) -> i32 {
        self.return_value
    }

    pub fn operand_stack(&self) -> &[i32] {
        &self.stack
    }

    pub fn call_stack_frame_count(&self) -> usize {
        self.call_stack.len()
    }

    /// depth 0 is the innermost frame
    pub fn stack_frame(&self, depth: usize) -> Option<StackFrameInfo> {
        self.frame_at(depth).map(|frame| StackFrameInfo {
            module: self.module_id,
            function: frame.function,
            pc: frame.pc,
        })
    }

    pub fn frame_memory(&self, depth: usize) -> Option<&FrameMemory> {
        self.frame_at(depth).map(|frame| &frame.memory)
    }

    /// Registers the single consumer of halt events
    pub fn set_break_handler(
        &mut self,
        handler: impl FnMut(&HaltEvent) + 'static,
    ) -> Result<(), VmError> {
        if self.break_handler.is_some() {
            return Err(VmError::HandlerAlreadyRegistered);
        }
        self.break_handler = Some(Box::new(handler));
        Ok(())
    }

    pub fn clear_break_handler(&mut self) {
        self.break_handler = None;
    }

    fn frame_at(&self, depth: usize) -> Option<&StackFrame> {
        self.call_stack.iter().rev().nth(depth)
    }

    fn run(&mut self) -> Result<Stop, VmError> {
        self.state = ExecState::Running;
        let (result, event) = match self.run_until_halt() {
            Ok(HaltEvent::Break(info)) => {
                debug!("halted at {}", info);
                self.state = ExecState::Paused;
                (Ok(Stop::Paused), HaltEvent::Break(info))
            }
            Ok(HaltEvent::Finished(value)) => {
                debug!("finished with {}", value);
                self.state = ExecState::Finished;
                self.return_value = value;
                (Ok(Stop::Finished(value)), HaltEvent::Finished(value))
            }
            Ok(HaltEvent::Faulted(e)) | Err(e) => {
                debug!("{}", e);
                self.call_stack.clear();
                self.state = ExecState::Finished;
                (Err(e.clone()), HaltEvent::Faulted(e))
            }
        };
        if let Some(handler) = self.break_handler.as_mut() {
            handler(&event);
        }
        result
    }

    fn run_until_halt(&mut self) -> Result<HaltEvent, VmError> {
        let module = self.module.as_ref().ok_or(VmError::NoModule)?;
        loop {
            let Some(frame) = self.call_stack.last_mut() else {
                return Ok(HaltEvent::Finished(self.return_value));
            };
            let code = &module
                .function(frame.function)
                .ok_or_else(|| fault!(frame, FaultKind::InvalidFunction(frame.function as i64)))?
                .code;
            let ins = *code
                .get(frame.pc)
                .ok_or_else(|| fault!(frame, FaultKind::InvalidCodeAddress(frame.pc as i64)))?;
            trace!("{}@{}: {} {}", frame.function, frame.pc, ins.op, ins.immediate);

            match exec::exec(ins, frame, &mut self.stack).map_err(|kind| fault!(frame, kind))? {
                ExecOutcome::Pc(pc) => frame.pc = pc,
                ExecOutcome::Break => {
                    return Ok(HaltEvent::Break(StackFrameInfo {
                        module: self.module_id,
                        function: frame.function,
                        pc: frame.pc,
                    }));
                }
                ExecOutcome::Call(index) => {
                    let callee = usize::try_from(index)
                        .ok()
                        .and_then(|idx| module.function(idx).map(|f| (idx, f)));
                    let Some((callee, callee_fn)) = callee else {
                        return Err(fault!(frame, FaultKind::InvalidFunction(index)));
                    };
                    let args = self
                        .stack
                        .split_off_above(frame.stack_base, callee_fn.arg_memory_size)
                        .map_err(|kind| fault!(frame, kind))?;
                    debug!("entering function {} with {:?}", callee, args);
                    self.call_stack
                        .push(StackFrame::new(callee, args, self.stack.len()));
                }
                ExecOutcome::Return => {
                    self.call_stack.pop();
                    match self.call_stack.last_mut() {
                        Some(caller) => {
                            caller.pc += 1;
                            debug!("returned to function {}", caller.function);
                        }
                        None => {
                            let value = self.stack.last().copied().unwrap_or(0);
                            return Ok(HaltEvent::Finished(value));
                        }
                    }
                }
            }

            if self.stepping {
                if let Some(info) = self.stack_frame(0) {
                    return Ok(HaltEvent::Break(info));
                }
            }
        }
    }
}
