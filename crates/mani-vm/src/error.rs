//! Runtime error types.

use std::fmt;

/// The category of a VM fault.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VmErrorKind {
    /// Stack under- or overflow, or an out-of-range slot index.
    StackFlow,
    /// Wrong value kind at a primitive.
    TypeMismatch,
    /// `GetFromTable` or positional access on an absent entry.
    MissingTableEntry,
    /// Constant-pool index outside `[0, MAX_CONST)`.
    BadConstantIndex,
    /// Instruction expected where a value sits (or vice versa), a branch
    /// outside the running closure, or a missing end marker.
    MalformedCode,
    /// Numeric domain fault: modulo by zero, negative bitwise operand,
    /// shift amount out of range.
    Arithmetic,
    /// An opcode with no implementation (concurrent calls).
    Unsupported,
}

impl fmt::Display for VmErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VmErrorKind::StackFlow => "stack flow",
            VmErrorKind::TypeMismatch => "type mismatch",
            VmErrorKind::MissingTableEntry => "missing table entry",
            VmErrorKind::BadConstantIndex => "bad constant index",
            VmErrorKind::MalformedCode => "malformed code",
            VmErrorKind::Arithmetic => "arithmetic",
            VmErrorKind::Unsupported => "unsupported",
        };
        write!(f, "{name}")
    }
}

/// Snapshot of the machine at the moment of a fault, sufficient to
/// reproduce: the offending PC and all stack pointers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VmTrace {
    pub pc: usize,
    pub operand_top: usize,
    pub call_depth: usize,
    pub frame_base: usize,
    pub code_len: usize,
}

/// A fatal VM error. Faults are not caught; they unwind to the driver.
#[derive(Clone, Debug)]
pub struct VmError {
    pub kind: VmErrorKind,
    pub message: String,
    pub trace: VmTrace,
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "vm fault at pc {}: {} ({}) [operand={} frames={} base={} code={}]",
            self.trace.pc,
            self.message,
            self.kind,
            self.trace.operand_top,
            self.trace.call_depth,
            self.trace.frame_base,
            self.trace.code_len,
        )
    }
}

impl std::error::Error for VmError {}

/// A fault produced by a primitive before the trace is attached.
#[derive(Clone, Debug, PartialEq)]
pub struct Fault {
    pub kind: VmErrorKind,
    pub message: String,
}

impl Fault {
    pub fn new(kind: VmErrorKind, message: impl Into<String>) -> Self {
        Fault {
            kind,
            message: message.into(),
        }
    }

    pub fn type_mismatch(expected: &str, found: &str) -> Self {
        Fault::new(
            VmErrorKind::TypeMismatch,
            format!("expected {expected}, found {found}"),
        )
    }

    pub fn arithmetic(message: impl Into<String>) -> Self {
        Fault::new(VmErrorKind::Arithmetic, message)
    }
}
