//! The stepping commands of [VmDebugger](super::VmDebugger) as resumable state machines.
//!
//! An action is asked for its next request after every halt of the vm. It sees the
//! vm only through an [Observation], which makes the stopping rules testable without
//! running any code.

use crate::il::Symbol;
use crate::vm::StackFrameInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionRequest {
    /// execute a single instruction
    Step,
    /// run until a breakpoint is hit
    Continue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    Request(ActionRequest),
    Done,
}

/// The state of the vm after a halt, as far as actions care
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    /// the top frame, `None` once the vm finished
    pub frame: Option<StackFrameInfo>,
    pub depth: usize,
    /// the symbol exactly at the pc of `frame`
    pub symbol: Option<Symbol>,
    /// the last halt was caused by a breakpoint
    pub hit_breakpoint: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Phase {
    #[default]
    Start,
    Stepping,
    Done,
}

/// Where an action started
#[derive(Debug, Clone, Default)]
struct Origin {
    function: usize,
    depth: usize,
    symbol: Option<Symbol>,
}

impl Origin {
    fn capture(obs: &Observation) -> Option<Self> {
        obs.frame.map(|frame| Self {
            function: frame.function,
            depth: obs.depth,
            symbol: obs.symbol.clone(),
        })
    }

    /// Without a symbol at the origin, any symbol counts as a new line. Otherwise it has
    /// to be in the same file, on a later line.
    fn reached_new_line(&self, current: Option<&Symbol>) -> bool {
        match (&self.symbol, current) {
            (_, None) => false,
            (None, Some(_)) => true,
            (Some(start), Some(current)) => {
                current.source_file == start.source_file && current.start.line > start.start.line
            }
        }
    }
}

/// what every stepping action does after a halt, before its own rules apply
fn must_stop(obs: &Observation) -> bool {
    obs.hit_breakpoint || obs.frame.is_none()
}

/// Steps until the function changes, a later line is reached or the starting frame
/// returned
#[derive(Debug, Clone, Default)]
pub struct StepInto {
    origin: Origin,
    phase: Phase,
}

impl StepInto {
    pub fn next(&mut self, obs: &Observation) -> Next {
        match self.phase {
            Phase::Start => start(&mut self.origin, &mut self.phase, obs),
            Phase::Stepping => {
                let stop = must_stop(obs)
                    || obs.depth < self.origin.depth
                    || obs.frame.map(|f| f.function) != Some(self.origin.function)
                    || self.origin.reached_new_line(obs.symbol.as_ref());
                advance(&mut self.phase, stop)
            }
            Phase::Done => Next::Done,
        }
    }
}

/// Like [StepInto], but calls made from the starting frame run to completion
#[derive(Debug, Clone, Default)]
pub struct StepOver {
    origin: Origin,
    phase: Phase,
}

impl StepOver {
    pub fn next(&mut self, obs: &Observation) -> Next {
        match self.phase {
            Phase::Start => start(&mut self.origin, &mut self.phase, obs),
            Phase::Stepping => {
                let stop = if must_stop(obs) || obs.depth < self.origin.depth {
                    true
                } else if obs.depth > self.origin.depth {
                    false
                } else {
                    obs.frame.map(|f| f.function) == Some(self.origin.function)
                        && self.origin.reached_new_line(obs.symbol.as_ref())
                };
                advance(&mut self.phase, stop)
            }
            Phase::Done => Next::Done,
        }
    }
}

/// Steps until the starting frame returned
#[derive(Debug, Clone, Default)]
pub struct StepOut {
    origin: Origin,
    phase: Phase,
}

impl StepOut {
    pub fn next(&mut self, obs: &Observation) -> Next {
        match self.phase {
            Phase::Start => start(&mut self.origin, &mut self.phase, obs),
            Phase::Stepping => {
                let stop = must_stop(obs) || obs.depth < self.origin.depth;
                advance(&mut self.phase, stop)
            }
            Phase::Done => Next::Done,
        }
    }
}

fn start(origin: &mut Origin, phase: &mut Phase, obs: &Observation) -> Next {
    match Origin::capture(obs) {
        Some(captured) => {
            *origin = captured;
            *phase = Phase::Stepping;
            Next::Request(ActionRequest::Step)
        }
        None => {
            *phase = Phase::Done;
            Next::Done
        }
    }
}

fn advance(phase: &mut Phase, stop: bool) -> Next {
    if stop {
        *phase = Phase::Done;
        Next::Done
    } else {
        Next::Request(ActionRequest::Step)
    }
}

/// issues one request and is done
#[derive(Debug, Clone)]
pub struct Single {
    request: ActionRequest,
    issued: bool,
}

impl Single {
    pub fn new(request: ActionRequest) -> Self {
        Self {
            request,
            issued: false,
        }
    }

    pub fn next(&mut self) -> Next {
        if self.issued {
            Next::Done
        } else {
            self.issued = true;
            Next::Request(self.request)
        }
    }
}

#[derive(Debug, Clone)]
pub enum Action {
    StepInto(StepInto),
    StepOver(StepOver),
    StepOut(StepOut),
    Single(Single),
}

impl Action {
    pub fn step_into() -> Self {
        Action::StepInto(StepInto::default())
    }

    pub fn step_over() -> Self {
        Action::StepOver(StepOver::default())
    }

    pub fn step_out() -> Self {
        Action::StepOut(StepOut::default())
    }

    pub fn continue_() -> Self {
        Action::Single(Single::new(ActionRequest::Continue))
    }

    pub fn step() -> Self {
        Action::Single(Single::new(ActionRequest::Step))
    }

    pub fn next(&mut self, obs: &Observation) -> Next {
        match self {
            Action::StepInto(action) => action.next(obs),
            Action::StepOver(action) => action.next(obs),
            Action::StepOut(action) => action.next(obs),
            Action::Single(action) => action.next(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Action::StepInto(_) => "step into",
            Action::StepOver(_) => "step over",
            Action::StepOut(_) => "step out",
            Action::Single(Single {
                request: ActionRequest::Continue,
                ..
            }) => "continue",
            Action::Single(_) => "step",
        }
    }
}
