//! Breakpoints and stepping on top of the [Interpreter](crate::vm::Interpreter).
//!
//! [Debugger] owns the vm and provides the breakpoint layer plus blocking stepping
//! primitives. [VmDebugger] owns a [Debugger] and expresses the stepping commands as
//! small state machines that are driven one vm halt at a time.

use thiserror::Error;

use crate::vm::VmError;

pub mod actions;

pub mod breakpoint;
pub use breakpoint::*;

pub mod debugger;
pub use debugger::*;

pub mod events;

pub mod vm_debugger;
pub use vm_debugger::*;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DebugError {
    #[error("Cannot {0}, the vm is not paused")]
    NotPaused(&'static str),

    #[error(transparent)]
    Vm(#[from] VmError),
}

pub type Result<T> = std::result::Result<T, DebugError>;
