//! The breakpoint and symbol layer, plus blocking stepping primitives.
//!
//! Breakpoints are implemented by patching the live code of a function with
//! [OpCode::Break](crate::il::OpCode::Break). Whenever the vm halts, the instruction at
//! the halt location is restored so execution can carry on from there, and it is patched
//! again as soon as the vm moved past it.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use super::{events::Listeners, Breakpoint, DebugError, Result};
use crate::il::{Code, IlFunction, IlModule, ModuleId, Symbol};
use crate::vm::{Interpreter, StackFrameInfo, Stop, VmError};

/// Where a blocking stepping primitive left the vm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Paused {
        frame: StackFrameInfo,
        /// the vm halted on an address that was patched with a break
        on_breakpoint: bool,
    },
    Finished(i32),
}

impl StepOutcome {
    pub fn frame(&self) -> Option<StackFrameInfo> {
        match self {
            StepOutcome::Paused { frame, .. } => Some(*frame),
            StepOutcome::Finished(_) => None,
        }
    }
}

/// Scans the functions in declaration order for the first address whose symbol covers
/// `line` in `source_file`.
///
/// The symbols of one function are assumed to come from a single file: the scan of a
/// function ends at the first symbol from another file.
pub fn lookup_symbol(module: &IlModule, source_file: &str, line: u32) -> Option<(usize, usize)> {
    for (index, function) in module.defined_functions.iter().enumerate() {
        for (address, symbol) in function.symbols.range(..function.code.len()) {
            if !symbol.has_source_file() {
                continue;
            }
            if symbol.source_file != source_file {
                break;
            }
            if symbol.covers_line(line) {
                return Some((index, *address));
            }
        }
    }
    None
}

pub struct Debugger {
    vm: Interpreter,
    breakpoints: BTreeSet<Breakpoint>,
    /// breakpoints set by source line, and what they resolve to in the loaded module
    line_breakpoints: BTreeMap<(String, u32), Option<Breakpoint>>,
    on_break: Listeners<StackFrameInfo>,
    on_active_changed: Listeners<bool>,
}

impl Debugger {
    pub fn new(vm: Interpreter) -> Self {
        Self {
            vm,
            breakpoints: BTreeSet::new(),
            line_breakpoints: BTreeMap::new(),
            on_break: Listeners::default(),
            on_active_changed: Listeners::default(),
        }
    }

    pub fn vm(&self) -> &Interpreter {
        &self.vm
    }

    pub fn vm_mut(&mut self) -> &mut Interpreter {
        &mut self.vm
    }

    pub fn into_vm(self) -> Interpreter {
        self.vm
    }

    /// Loads a module into the vm and applies all breakpoints to it. Source line
    /// breakpoints are resolved against the new module.
    pub fn load_module(&mut self, module: IlModule) -> ModuleId {
        let id = self.vm.load_module(module);
        let lines: Vec<_> = self.line_breakpoints.keys().cloned().collect();
        for (file, line) in lines {
            let resolved = self.resolve_line(&file, line);
            if let Some(Some(previous)) = self
                .line_breakpoints
                .insert((file.clone(), line), resolved)
            {
                if Some(previous) != resolved {
                    self.breakpoints.remove(&previous);
                }
            }
            match resolved {
                Some(bp) => {
                    self.breakpoints.insert(bp);
                }
                None => warn!("breakpoint at {}:{} does not resolve in {}", file, line, id),
            }
        }
        self.reapply_all();
        id
    }

    pub fn breakpoints(&self) -> impl Iterator<Item = Breakpoint> + '_ {
        self.breakpoints.iter().copied()
    }

    pub fn has_breakpoint(&self, bp: Breakpoint) -> bool {
        self.breakpoints.contains(&bp)
    }

    pub fn set_breakpoint(&mut self, bp: Breakpoint) {
        if self.breakpoints.insert(bp) {
            debug!("breakpoint set at {}", bp);
        }
        self.replace_instruction(bp.function, bp.address);
    }

    pub fn remove_breakpoint(&mut self, bp: Breakpoint) {
        if self.breakpoints.remove(&bp) {
            debug!("breakpoint removed from {}", bp);
        }
        self.restore_at(bp.function, bp.address);
    }

    /// Sets a breakpoint on the first instruction generated for `line`. Returns where it
    /// was placed, `None` if no code belongs to that line.
    pub fn set_breakpoint_at_line(&mut self, source_file: &str, line: u32) -> Option<Breakpoint> {
        let resolved = self.resolve_line(source_file, line);
        self.line_breakpoints
            .insert((source_file.to_owned(), line), resolved);
        match resolved {
            Some(bp) => self.set_breakpoint(bp),
            None => warn!("no code found for {}:{}", source_file, line),
        }
        resolved
    }

    pub fn remove_breakpoint_at_line(&mut self, source_file: &str, line: u32) {
        let previous = self
            .line_breakpoints
            .remove(&(source_file.to_owned(), line))
            .flatten();
        let current = self.resolve_line(source_file, line);
        if let Some(bp) = current {
            self.remove_breakpoint(bp);
        }
        if let Some(bp) = previous.filter(|bp| Some(*bp) != current) {
            self.remove_breakpoint(bp);
        }
    }

    pub fn lookup_symbol(&self, source_file: &str, line: u32) -> Option<(usize, usize)> {
        lookup_symbol(self.vm.module()?, source_file, line)
    }

    /// The function a frame is executing. `None` for frames of another module
    pub fn get_il_function(&self, frame: StackFrameInfo) -> Option<&IlFunction> {
        if frame.module != self.vm.module_id() {
            return None;
        }
        self.vm.module()?.function(frame.function)
    }

    /// the symbol exactly at the pc of `frame`
    pub fn get_symbol(&self, frame: StackFrameInfo) -> Option<&Symbol> {
        self.get_il_function(frame)?.symbol_at(frame.pc)
    }

    /// Source file and line of the nearest symbol at or after the pc of `frame`
    pub fn get_source_location(&self, frame: StackFrameInfo) -> Option<(&str, u32)> {
        let (_, symbol) = self.get_il_function(frame)?.next_symbol_from(frame.pc)?;
        Some((symbol.source_file.as_str(), symbol.start.line))
    }

    /// Patches a break into the code. Returns true if the patch was applied now.
    pub fn replace_instruction(&mut self, function: usize, address: usize) -> bool {
        let Some(code) = self.code_mut(function) else {
            return false;
        };
        match code.patch(address) {
            Some(applied) => {
                if applied {
                    debug!("patched {}@{}", function, address);
                }
                applied
            }
            None => {
                warn!("can't patch {}@{}, address out of range", function, address);
                false
            }
        }
    }

    /// Restores the instruction at the pc of `frame`. Returns true if a break was
    /// patched in there.
    pub fn restore_instruction(&mut self, frame: StackFrameInfo) -> bool {
        if !self.is_current(frame) {
            return false;
        }
        self.restore_at(frame.function, frame.pc)
    }

    /// Patches the pc of `frame` again, if a breakpoint lives there
    pub fn reapply_breakpoint(&mut self, frame: StackFrameInfo) {
        if self.is_current(frame) && self.breakpoints.contains(&Breakpoint::from(frame)) {
            self.replace_instruction(frame.function, frame.pc);
        }
    }

    pub fn reapply_all(&mut self) {
        let breakpoints: Vec<_> = self.breakpoints.iter().copied().collect();
        for bp in breakpoints {
            self.replace_instruction(bp.function, bp.address);
        }
    }

    /// Calls an exported function. When the vm halts, the instruction it halted on is
    /// left untouched.
    pub fn call(&mut self, name: &str, args: &[i32]) -> Result<Stop> {
        self.on_active_changed.notify(&true);
        match self.vm.call(name, args) {
            Ok(Stop::Paused) => {
                if let Some(frame) = self.vm.stack_frame(0) {
                    self.on_break.notify(&frame);
                }
                Ok(Stop::Paused)
            }
            Ok(Stop::Finished(value)) => {
                self.on_active_changed.notify(&false);
                Ok(Stop::Finished(value))
            }
            Err(e) => {
                self.on_active_changed.notify(&false);
                Err(e.into())
            }
        }
    }

    /// Steps until the vm reaches an address that carries a symbol or a breakpoint
    pub fn step_into(&mut self) -> Result<StepOutcome> {
        let outcome = self.step_until_stop_point()?;
        self.report(outcome);
        Ok(outcome)
    }

    /// Like [Debugger::step_into], but a call is run to completion. That is done by placing
    /// a temporary breakpoint on the next symbol of the calling function, so a recursive
    /// call of the same function may hit it early.
    pub fn step_next(&mut self) -> Result<StepOutcome> {
        let origin = self.paused_frame("step over")?;
        let executed = self
            .get_il_function(origin)
            .and_then(|function| function.code.original(origin.pc));

        let outcome = match self.step_instruction()? {
            outcome @ StepOutcome::Paused {
                on_breakpoint: false,
                ..
            } if executed.map_or(false, |ins| ins.op.is_call()) => {
                self.run_over_call(origin, outcome)?
            }
            outcome if self.is_stop_point(outcome) => outcome,
            _ => self.step_until_stop_point()?,
        };
        self.report(outcome);
        Ok(outcome)
    }

    /// Steps past the current location, then runs until a breakpoint is hit or the
    /// program finishes
    pub fn continue_(&mut self) -> Result<StepOutcome> {
        let outcome = match self.step_instruction()? {
            outcome @ (StepOutcome::Finished(_)
            | StepOutcome::Paused {
                on_breakpoint: true,
                ..
            }) => outcome,
            StepOutcome::Paused { .. } => {
                self.reapply_all();
                self.vm.set_stepping(false);
                self.resume_vm()?
            }
        };
        self.report(outcome);
        Ok(outcome)
    }

    /// the next run request of the vm will halt after one instruction
    pub fn pause(&mut self) {
        self.vm.set_stepping(true);
    }

    /// called with the halt location whenever a run request ended paused
    pub fn on_break(&mut self, listener: impl FnMut(&StackFrameInfo) + 'static) {
        self.on_break.subscribe(listener);
    }

    /// called with true when a call starts and with false when it ended
    pub fn on_active_changed(&mut self, listener: impl FnMut(&bool) + 'static) {
        self.on_active_changed.subscribe(listener);
    }

    pub(super) fn restore_at(&mut self, function: usize, address: usize) -> bool {
        let Some(code) = self.code_mut(function) else {
            return false;
        };
        let restored = code.restore(address).is_some();
        if restored {
            debug!("restored {}@{}", function, address);
        }
        restored
    }

    fn code_mut(&mut self, function: usize) -> Option<&mut Code> {
        let Some(module) = self.vm.module_mut() else {
            warn!("no module loaded");
            return None;
        };
        let Some(il_function) = module.function_mut(function) else {
            warn!("no function with index {}", function);
            return None;
        };
        Some(&mut il_function.code)
    }

    fn is_current(&self, frame: StackFrameInfo) -> bool {
        let current = frame.module == self.vm.module_id();
        if !current {
            warn!("frame {} belongs to a module that is not loaded", frame);
        }
        current
    }

    fn resolve_line(&self, source_file: &str, line: u32) -> Option<Breakpoint> {
        self.lookup_symbol(source_file, line)
            .map(|(function, address)| Breakpoint::new(function, address))
    }

    fn paused_frame(&self, operation: &'static str) -> Result<StackFrameInfo> {
        if !self.vm.is_paused() {
            return Err(DebugError::NotPaused(operation));
        }
        self.vm
            .stack_frame(0)
            .ok_or(DebugError::NotPaused(operation))
    }

    /// Executes one instruction. The breakpoint at the origin, if any, is patched
    /// again afterwards
    fn step_instruction(&mut self) -> Result<StepOutcome> {
        let origin = self.paused_frame("step")?;
        self.restore_instruction(origin);
        self.vm.set_stepping(true);
        let outcome = self.resume_vm()?;
        self.reapply_breakpoint(origin);
        Ok(outcome)
    }

    /// resumes the vm and restores the instruction it halts on
    fn resume_vm(&mut self) -> Result<StepOutcome> {
        match self.vm.resume()? {
            Stop::Finished(value) => Ok(StepOutcome::Finished(value)),
            Stop::Paused => {
                let frame = self
                    .vm
                    .stack_frame(0)
                    .ok_or(DebugError::Vm(VmError::NotPaused))?;
                let on_breakpoint = self.restore_instruction(frame);
                Ok(StepOutcome::Paused {
                    frame,
                    on_breakpoint,
                })
            }
        }
    }

    fn step_until_stop_point(&mut self) -> Result<StepOutcome> {
        loop {
            let outcome = self.step_instruction()?;
            if self.is_stop_point(outcome) {
                return Ok(outcome);
            }
        }
    }

    fn is_stop_point(&self, outcome: StepOutcome) -> bool {
        match outcome {
            StepOutcome::Finished(_) => true,
            StepOutcome::Paused {
                frame,
                on_breakpoint,
            } => {
                on_breakpoint
                    || self.breakpoints.contains(&Breakpoint::from(frame))
                    || self.get_symbol(frame).is_some()
            }
        }
    }

    /// `stepped` is where the vm halted after executing the call at `origin`
    fn run_over_call(
        &mut self,
        origin: StackFrameInfo,
        stepped: StepOutcome,
    ) -> Result<StepOutcome> {
        let target = self.get_il_function(origin).and_then(|function| {
            function
                .next_symbol_from(origin.pc + 1)
                .map(|(address, _)| address)
                .or_else(|| function.code.len().checked_sub(1))
        });
        let Some(target) = target else {
            return Ok(stepped);
        };

        self.reapply_all();
        let installed = self.replace_instruction(origin.function, target);
        self.vm.set_stepping(false);
        let outcome = self.resume_vm();
        if installed {
            // the temporary breakpoint was not hit if the call stopped somewhere else
            self.restore_at(origin.function, target);
        }
        outcome
    }

    fn report(&mut self, outcome: StepOutcome) {
        match outcome {
            StepOutcome::Paused { frame, .. } => self.on_break.notify(&frame),
            StepOutcome::Finished(_) => self.on_active_changed.notify(&false),
        }
    }
}
