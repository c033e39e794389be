//! The intermediate language: the linked module the vm executes.
//!
//! This is plain data. After the front end produced a module, the only thing that ever
//! mutates it is the debugger, through [Code::patch] and [Code::restore].

pub mod code;
pub use code::*;

pub mod listing;
pub use listing::*;

pub mod module;
pub use module::*;

pub mod opcode;
pub use opcode::*;

pub mod symbol;
pub use symbol::*;
