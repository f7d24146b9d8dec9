//! The Mani stack virtual machine.
//!
//! Four cooperating structures drive execution: the operand stack, the
//! call stack of frames, the code stream with its cursor, and the list of
//! open upvalue cells. The dispatcher fetches one code unit at a time and
//! executes it until the root closure returns.

pub mod arith;
pub mod compare;
pub mod dispatch;
pub mod error;
pub mod frame;
pub mod stack;
pub mod vm;
