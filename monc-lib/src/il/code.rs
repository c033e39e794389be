//! The instruction buffer of one function.
//!
//! The debugger implements breakpoints by overwriting live instructions with
//! [OpCode::Break](super::OpCode::Break). The displaced originals are kept in a side table
//! inside the same type, and the only way to write an instruction is through
//! [Code::patch] and [Code::restore]. That way an address is in the side table if and
//! only if the live code at that address is a patched in break.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Index;

use super::Instruction;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<Instruction>", into = "Vec<Instruction>")]
pub struct Code {
    live: Vec<Instruction>,
    /// maps address to the original instruction, for every patched address
    originals: BTreeMap<usize, Instruction>,
}

impl Code {
    pub fn new(instructions: Vec<Instruction>) -> Self {
        Self {
            live: instructions,
            originals: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// the instruction the vm will execute at `address`
    pub fn get(&self, address: usize) -> Option<&Instruction> {
        self.live.get(address)
    }

    /// the instruction at `address` as the compiler emitted it, regardless of patches
    pub fn original(&self, address: usize) -> Option<Instruction> {
        self.originals
            .get(&address)
            .or_else(|| self.live.get(address))
            .copied()
    }

    pub fn is_patched(&self, address: usize) -> bool {
        self.originals.contains_key(&address)
    }

    /// addresses that currently hold an injected break, ascending
    pub fn patched_addresses(&self) -> impl Iterator<Item = usize> + '_ {
        self.originals.keys().copied()
    }

    /// Replaces the instruction at `address` with a break.
    ///
    /// Returns `None` if the address is out of range, `Some(false)` if it was patched
    /// already and `Some(true)` if the patch was applied now.
    pub fn patch(&mut self, address: usize) -> Option<bool> {
        let slot = self.live.get_mut(address)?;
        if self.originals.contains_key(&address) {
            return Some(false);
        }
        let original = std::mem::replace(slot, Instruction::breakpoint());
        self.originals.insert(address, original);
        Some(true)
    }

    /// Puts the original instruction back at `address`, returns it if the address was patched
    pub fn restore(&mut self, address: usize) -> Option<Instruction> {
        let original = self.originals.remove(&address)?;
        self.live[address] = original;
        Some(original)
    }

    /// removes every patch
    pub fn restore_all(&mut self) {
        let addresses: Vec<_> = self.patched_addresses().collect();
        for address in addresses {
            self.restore(address);
        }
    }

    /// iterates over the live instructions
    pub fn iter(&self) -> impl Iterator<Item = &Instruction> {
        self.live.iter()
    }

    /// iterates over the unpatched instructions
    pub fn iter_original(&self) -> impl Iterator<Item = Instruction> + '_ {
        (0..self.live.len()).filter_map(|address| self.original(address))
    }
}

impl Index<usize> for Code {
    type Output = Instruction;

    fn index(&self, address: usize) -> &Instruction {
        &self.live[address]
    }
}

impl From<Vec<Instruction>> for Code {
    fn from(instructions: Vec<Instruction>) -> Self {
        Code::new(instructions)
    }
}

impl From<Code> for Vec<Instruction> {
    fn from(code: Code) -> Self {
        code.iter_original().collect()
    }
}

impl FromIterator<Instruction> for Code {
    fn from_iter<T: IntoIterator<Item = Instruction>>(iter: T) -> Self {
        Code::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::il::OpCode::*;
    use pretty_assertions::assert_eq;

    fn sample() -> Code {
        vec![
            Instruction::with_immediate(Push, 1),
            Instruction::with_immediate(Push, 2),
            Instruction::new(Add),
            Instruction::new(Return),
        ]
        .into()
    }

    #[test]
    fn test_patch_then_restore_is_identity() {
        let mut code = sample();
        let before = code.clone();
        for address in 0..code.len() {
            assert_eq!(code.patch(address), Some(true));
            assert_eq!(code[address].op, Break);
            assert_eq!(code.restore(address), before.get(address).copied());
        }
        assert_eq!(code, before);
    }

    #[test]
    fn test_patch_is_idempotent() {
        let mut code = sample();
        assert_eq!(code.patch(2), Some(true));
        let once = code.clone();
        assert_eq!(code.patch(2), Some(false));
        assert_eq!(code, once);
        assert_eq!(code.original(2), Some(Instruction::new(Add)));
    }

    #[test]
    fn test_restore_happens_once() {
        let mut code = sample();
        code.patch(1);
        assert!(code.restore(1).is_some());
        assert!(code.restore(1).is_none());
        assert!(code.restore(3).is_none());
        assert_eq!(code[1], Instruction::with_immediate(Push, 2));
    }

    #[test]
    fn test_out_of_range() {
        let mut code = sample();
        assert_eq!(code.patch(4), None);
        assert!(code.restore(4).is_none());
        assert_eq!(code.original(4), None);
    }

    #[test]
    fn test_patched_addresses_match_live_breaks() {
        let mut code = sample();
        code.patch(3);
        code.patch(0);
        let patched: Vec<_> = code.patched_addresses().collect();
        let breaks: Vec<_> = code
            .iter()
            .enumerate()
            .filter(|(_, ins)| ins.op == Break)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(patched, vec![0, 3]);
        assert_eq!(patched, breaks);
        code.restore_all();
        assert_eq!(code, sample());
    }

    #[test]
    fn test_unpatched_view_is_serialized() {
        let mut code = sample();
        code.patch(2);
        let plain: Vec<Instruction> = code.into();
        assert_eq!(plain[2], Instruction::new(Add));
    }
}
