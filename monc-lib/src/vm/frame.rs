use derive_more::Display;

use super::FaultKind;
use crate::il::ModuleId;

/// Identity of one function activation
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
#[display(fmt = "{}:{}@{}", module, function, pc)]
pub struct StackFrameInfo {
    pub module: ModuleId,
    /// index into the defined functions of the module
    pub function: usize,
    pub pc: usize,
}

/// A live activation on the call stack of a vm
#[derive(Debug, Clone)]
pub struct StackFrame {
    pub function: usize,
    pub pc: usize,
    pub memory: FrameMemory,
    /// length of the operand stack when the frame was entered, the frame can't pop
    /// below it
    pub stack_base: usize,
}

impl StackFrame {
    pub fn new(function: usize, args: Vec<i32>, stack_base: usize) -> Self {
        Self {
            function,
            pc: 0,
            memory: FrameMemory::with_args(args),
            stack_base,
        }
    }
}

/// number of cells a single frame may address
pub const MAX_FRAME_MEMORY: usize = 1 << 20;

/// The memory of one stack frame, holding arguments and locals.
///
/// It grows on demand: reads of addresses that were never written yield 0. Addresses at
/// or above [MAX_FRAME_MEMORY] fault.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FrameMemory {
    data: Vec<i32>,
}

impl FrameMemory {
    pub fn with_args(args: Vec<i32>) -> Self {
        Self { data: args }
    }

    pub fn read(&self, address: i64) -> Result<i32, FaultKind> {
        let idx = Self::index(address)?;
        Ok(self.data.get(idx).copied().unwrap_or(0))
    }

    pub fn write(&mut self, address: i64, value: i32) -> Result<(), FaultKind> {
        let idx = Self::index(address)?;
        if idx >= self.data.len() {
            self.data.resize(idx + 1, 0);
        }
        self.data[idx] = value;
        Ok(())
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn as_slice(&self) -> &[i32] {
        &self.data
    }

    fn index(address: i64) -> Result<usize, FaultKind> {
        usize::try_from(address)
            .ok()
            .filter(|&idx| idx < MAX_FRAME_MEMORY)
            .ok_or(FaultKind::InvalidMemoryAddress(address))
    }
}
