//! Command modules for the SymStack CLI

pub mod opcode;
pub mod replay;

pub use opcode::show_opcodes;
pub use replay::replay_trace;
