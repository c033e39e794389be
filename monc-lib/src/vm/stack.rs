use std::ops::Deref;

use super::FaultKind;

/// the integer operand stack shared by all frames of a vm
#[derive(Debug, Default, Clone)]
pub struct OperandStack(Vec<i32>);

impl OperandStack {
    pub fn push(&mut self, value: i32) {
        self.0.push(value);
    }

    /// pops the top value, but never below `base`, which is where the current frame's
    /// operands start
    pub fn pop_above(&mut self, base: usize) -> Result<i32, FaultKind> {
        if self.0.len() <= base {
            return Err(FaultKind::StackUnderflow);
        }
        self.0.pop().ok_or(FaultKind::StackUnderflow)
    }

    pub fn peek_above(&self, base: usize) -> Result<i32, FaultKind> {
        if self.0.len() <= base {
            return Err(FaultKind::StackUnderflow);
        }
        self.0.last().copied().ok_or(FaultKind::StackUnderflow)
    }

    /// removes the `n` topmost values and returns them in the order they were pushed
    pub fn split_off_above(&mut self, base: usize, n: usize) -> Result<Vec<i32>, FaultKind> {
        if self.0.len() < base + n {
            return Err(FaultKind::StackUnderflow);
        }
        Ok(self.0.split_off(self.0.len() - n))
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

impl Deref for OperandStack {
    type Target = [i32];
    fn deref(&self) -> &[i32] {
        &self.0
    }
}
