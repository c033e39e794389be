use derive_more::Display;

use crate::vm::StackFrameInfo;

/// A location the debugger wants the vm to halt at
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[display(fmt = "{}@{}", function, address)]
pub struct Breakpoint {
    pub function: usize,
    pub address: usize,
}

impl Breakpoint {
    pub fn new(function: usize, address: usize) -> Self {
        Self { function, address }
    }
}

impl From<StackFrameInfo> for Breakpoint {
    fn from(frame: StackFrameInfo) -> Self {
        Self::new(frame.function, frame.pc)
    }
}
