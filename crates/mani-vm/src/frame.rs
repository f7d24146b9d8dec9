//! Call frames.

use crate::error::{Fault, VmErrorKind};
use mani_compiler::code::MAX_CONST;
use mani_core::heap::{Closure, HeapId};
use mani_core::value::Value;

/// The activation record of one call.
///
/// `static_link` is the operand-stack pointer recorded at call time (the
/// frame base, before the arguments); return truncates the operand stack
/// back to it. `dynamic_link` is the code address to resume, and
/// `frame_link` the caller's frame base. The frame owns its constant pool
/// exclusively; the pool dies with the frame.
#[derive(Clone, Debug)]
pub struct CallFrame {
    pub num_args: usize,
    pub num_params: usize,
    pub num_locals: usize,
    pub static_link: usize,
    pub dynamic_link: usize,
    pub frame_link: usize,
    pub closure: HeapId<Closure>,
    constants: Box<[Value]>,
}

impl CallFrame {
    pub fn new(
        num_args: usize,
        num_params: usize,
        num_locals: usize,
        static_link: usize,
        dynamic_link: usize,
        frame_link: usize,
        closure: HeapId<Closure>,
    ) -> Self {
        CallFrame {
            num_args,
            num_params,
            num_locals,
            static_link,
            dynamic_link,
            frame_link,
            closure,
            constants: vec![Value::Nil; MAX_CONST].into_boxed_slice(),
        }
    }

    pub fn load_constant(&self, index: usize) -> Result<Value, Fault> {
        self.constants
            .get(index)
            .copied()
            .ok_or_else(|| bad_constant(index))
    }

    pub fn store_constant(&mut self, index: usize, value: Value) -> Result<(), Fault> {
        match self.constants.get_mut(index) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(bad_constant(index)),
        }
    }
}

fn bad_constant(index: usize) -> Fault {
    Fault::new(
        VmErrorKind::BadConstantIndex,
        format!("constant index {index} outside [0, {MAX_CONST})"),
    )
}
