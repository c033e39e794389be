//! Stepping commands that are driven one vm halt at a time.
//!
//! Each command is an [Action] that yields `Step` and `Continue` requests. After every
//! halt the action is asked for its next request, until it is done. A halt that happens
//! while a request is still being issued is reported through the return value of that
//! call. The [VmDebugger::on_break] event is reserved for halts that reach the debugger
//! after control went back to the host, like the first halt of [VmDebugger::call].
//!
//! A breakpoint always wins: when a request ends on an armed breakpoint, the action in
//! flight is abandoned and the vm stays on the breakpoint.

use derive_more::Display;
use tracing::debug;

use super::actions::{Action, ActionRequest, Next, Observation};
use super::{events::Listeners, Breakpoint, DebugError, Debugger, Result};
use crate::il::IlModule;
use crate::vm::{StackFrameInfo, Stop};

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum ActionState {
    /// no action was started yet
    Idle,
    /// an action is driven from within the call that started it
    Starting,
    /// a request of the current action is in flight
    Active,
    /// the last action ran out of requests
    Completed,
}

pub struct VmDebugger {
    debugger: Debugger,
    action: Option<Action>,
    state: ActionState,
    last_break_was_breakpoint: bool,
    /// set while the vm runs on behalf of a request
    updating: bool,
    did_break_immediately: bool,
    paused: bool,
    on_break: Listeners<StackFrameInfo>,
    on_pause_changed: Listeners<bool>,
}

impl VmDebugger {
    pub fn new(debugger: Debugger) -> Self {
        let paused = debugger.vm().is_paused();
        Self {
            debugger,
            action: None,
            state: ActionState::Idle,
            last_break_was_breakpoint: false,
            updating: false,
            did_break_immediately: false,
            paused,
            on_break: Listeners::default(),
            on_pause_changed: Listeners::default(),
        }
    }

    pub fn debugger(&self) -> &Debugger {
        &self.debugger
    }

    pub fn debugger_mut(&mut self) -> &mut Debugger {
        &mut self.debugger
    }

    pub fn load_module(&mut self, module: IlModule) {
        self.debugger.load_module(module);
        self.action = None;
        self.last_break_was_breakpoint = false;
        self.set_paused(false);
    }

    pub fn state(&self) -> ActionState {
        self.state
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// true if the vm is paused on an armed breakpoint
    pub fn last_break_was_breakpoint(&self) -> bool {
        self.last_break_was_breakpoint
    }

    pub fn set_breakpoint(&mut self, bp: Breakpoint) {
        self.debugger.set_breakpoint(bp);
    }

    pub fn remove_breakpoint(&mut self, bp: Breakpoint) {
        self.debugger.remove_breakpoint(bp);
    }

    /// Calls an exported function. If the vm halts, [VmDebugger::on_break] listeners are
    /// notified.
    pub fn call(&mut self, name: &str, args: &[i32]) -> Result<Stop> {
        let stop = self
            .debugger
            .vm_mut()
            .call(name, args)
            .map_err(DebugError::from);
        self.deliver(stop.clone())?;
        stop
    }

    /// Each of the stepping commands returns true if it completed before returning. The vm
    /// is then paused where the command ended, or finished if the program ran to its end.
    pub fn step_into(&mut self) -> Result<bool> {
        self.start_action(Action::step_into())
    }

    pub fn step_over(&mut self) -> Result<bool> {
        self.start_action(Action::step_over())
    }

    pub fn step_out(&mut self) -> Result<bool> {
        self.start_action(Action::step_out())
    }

    pub fn continue_(&mut self) -> Result<bool> {
        self.start_action(Action::continue_())
    }

    pub fn step(&mut self) -> Result<bool> {
        self.start_action(Action::step())
    }

    /// the next request will halt after a single instruction
    pub fn pause(&mut self) {
        self.debugger.pause();
    }

    /// called with the halt location when a halt reaches the debugger asynchronously
    pub fn on_break(&mut self, listener: impl FnMut(&StackFrameInfo) + 'static) {
        self.on_break.subscribe(listener);
    }

    pub fn on_pause_changed(&mut self, listener: impl FnMut(&bool) + 'static) {
        self.on_pause_changed.subscribe(listener);
    }

    fn start_action(&mut self, action: Action) -> Result<bool> {
        let name = action.name();
        if !self.debugger.vm().is_paused() {
            return Err(DebugError::NotPaused(name));
        }
        debug!("starting {}", name);
        self.action = Some(action);
        self.state = ActionState::Starting;

        loop {
            match self.update_action(true) {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    self.action = None;
                    self.state = ActionState::Completed;
                    return Err(e);
                }
            }
        }
        Ok(self.action.is_none())
    }

    /// Asks the current action for its next request and issues it. Returns true if a
    /// request was issued.
    fn update_action(&mut self, starting: bool) -> Result<bool> {
        if self.updating {
            self.did_break_immediately = true;
            return Ok(false);
        }

        let observation = self.observe();
        let next = match self.action.as_mut() {
            Some(action) => action.next(&observation),
            None => Next::Done,
        };
        match next {
            Next::Done => {
                if let Some(action) = self.action.take() {
                    debug!("{} completed", action.name());
                    self.state = ActionState::Completed;
                }
                if !starting {
                    if let Some(frame) = observation.frame {
                        self.on_break.notify(&frame);
                    }
                }
                Ok(false)
            }
            Next::Request(request) => {
                self.state = ActionState::Active;
                self.run_request(request)?;
                Ok(true)
            }
        }
    }

    fn run_request(&mut self, request: ActionRequest) -> Result<()> {
        debug!("issuing {:?}", request);
        if self.last_break_was_breakpoint || request == ActionRequest::Step {
            self.debugger.vm_mut().set_stepping(true);
            let origin = self.debugger.vm().stack_frame(0);
            let halted = self.continue_vm()?;
            // only the origin is patched again, the vm may have halted on another
            // breakpoint that has to stay restored
            if let Some(origin) = origin {
                self.debugger.reapply_breakpoint(origin);
            }
            if !halted || self.last_break_was_breakpoint {
                return Ok(());
            }
        }

        if request == ActionRequest::Continue {
            self.debugger.vm_mut().set_stepping(false);
            self.continue_vm()?;
        }
        Ok(())
    }

    /// Resumes the vm and hands the halt to the debugger. Returns true if the vm halted
    /// before this call returned.
    fn continue_vm(&mut self) -> Result<bool> {
        self.updating = true;
        self.did_break_immediately = false;
        self.set_paused(false);
        let stop = self.debugger.vm_mut().resume();
        let delivered = self.deliver(stop.map_err(DebugError::from));
        self.updating = false;
        delivered?;
        Ok(self.did_break_immediately)
    }

    fn deliver(&mut self, stop: Result<Stop>) -> Result<()> {
        match stop {
            Ok(Stop::Paused) => self.handle_break(),
            Ok(Stop::Finished(value)) => {
                debug!("program finished with {}", value);
                self.handle_finished();
                Ok(())
            }
            Err(e) => {
                if !self.debugger.vm().is_paused() {
                    self.handle_finished();
                }
                Err(e)
            }
        }
    }

    fn handle_break(&mut self) -> Result<()> {
        self.set_paused(true);
        if let Some(frame) = self.debugger.vm().stack_frame(0) {
            self.last_break_was_breakpoint = self.debugger.restore_instruction(frame);
            if self.last_break_was_breakpoint {
                debug!("hit breakpoint at {}", frame);
                self.debugger.vm_mut().set_stepping(true);
            }
        }
        while self.update_action(false)? {}
        Ok(())
    }

    fn handle_finished(&mut self) {
        self.last_break_was_breakpoint = false;
        self.set_paused(false);
    }

    fn observe(&self) -> Observation {
        let vm = self.debugger.vm();
        let frame = vm.stack_frame(0).filter(|_| vm.is_paused());
        Observation {
            frame,
            depth: vm.call_stack_frame_count(),
            symbol: frame.and_then(|f| self.debugger.get_symbol(f)).cloned(),
            hit_breakpoint: self.last_break_was_breakpoint,
        }
    }

    fn set_paused(&mut self, paused: bool) {
        if self.paused != paused {
            self.paused = paused;
            self.on_pause_changed.notify(&paused);
        }
    }
}
