//! VM state: stacks, code cursor, heap, and upvalue-cell bookkeeping.

use crate::dispatch;
use crate::error::{Fault, VmError, VmErrorKind, VmTrace};
use crate::frame::CallFrame;
use crate::stack::{Stack, StackFlow};
use mani_compiler::code::{Chunk, Code};
use mani_core::heap::{Cell, Closure, Heap, HeapId};
use mani_core::string::{StringId, StringInterner};
use mani_core::table::Table;
use mani_core::value::Value;

/// The virtual machine.
pub struct Vm {
    /// Operand stack. Slots `[0, num_globals)` are the global region.
    pub operand: Stack<Value>,
    /// Call stack.
    pub frames: Stack<CallFrame>,
    /// The code stream; `pc` is its cursor.
    code: Vec<Code>,
    pc: usize,
    /// PC of the instruction currently executing, for fault traces.
    current_pc: usize,
    frame_base: usize,
    num_globals: usize,
    pub heap: Heap,
    pub strings: StringInterner,
    /// Open upvalue cells, sorted by slot descending.
    open_cells: Vec<(usize, HeapId<Cell>)>,
    pub max_call_depth: usize,
}

impl Vm {
    pub fn new() -> Self {
        Vm {
            operand: Stack::new(),
            frames: Stack::new(),
            code: Vec::new(),
            pc: 0,
            current_pc: 0,
            frame_base: 0,
            num_globals: 0,
            heap: Heap::new(),
            strings: StringInterner::new(),
            open_cells: Vec::new(),
            max_call_depth: 200,
        }
    }

    /// Execute a compiled chunk with its string interner, returning the
    /// root closure's result.
    pub fn execute(&mut self, chunk: &Chunk, strings: StringInterner) -> Result<Value, VmError> {
        self.strings = strings;
        self.code = chunk.code.clone();
        self.pc = 0;
        self.current_pc = 0;
        self.frame_base = 0;
        self.num_globals = chunk.num_globals;
        self.operand.clear();
        self.frames.clear();
        self.open_cells.clear();

        // The global region occupies the lowest operand slots.
        for _ in 0..chunk.num_globals {
            self.operand.push(Value::Nil);
        }

        // The whole chunk is the body of a root closure ending at the
        // final marker.
        let end_pc = self.code.len().saturating_sub(1);
        let root = self.heap.alloc_closure(Closure {
            num_params: 0,
            num_locals: chunk.root_locals,
            is_varargs: false,
            entry_pc: 0,
            end_pc,
            upvalues: Vec::new(),
        });
        self.call(root, 0)?;
        dispatch::run(self)
    }

    // ---- Faults ----

    pub fn trace(&self) -> VmTrace {
        VmTrace {
            pc: self.current_pc,
            operand_top: self.operand.len(),
            call_depth: self.frames.len(),
            frame_base: self.frame_base,
            code_len: self.code.len(),
        }
    }

    pub fn fault(&self, kind: VmErrorKind, message: impl Into<String>) -> VmError {
        VmError {
            kind,
            message: message.into(),
            trace: self.trace(),
        }
    }

    pub fn lift(&self, fault: Fault) -> VmError {
        VmError {
            kind: fault.kind,
            message: fault.message,
            trace: self.trace(),
        }
    }

    pub fn flow(&self, flow: StackFlow) -> VmError {
        self.fault(VmErrorKind::StackFlow, flow.to_string())
    }

    // ---- Code cursor ----

    /// Fetch the next code unit and advance the cursor.
    pub fn fetch(&mut self) -> Result<Code, VmError> {
        let unit = self
            .code
            .get(self.pc)
            .copied()
            .ok_or_else(|| self.fault(VmErrorKind::MalformedCode, "ran off the end of code"))?;
        self.current_pc = self.pc;
        self.pc += 1;
        Ok(unit)
    }

    /// The inline value at the cursor; used by `LoadFromCode`.
    pub fn take_inline_value(&mut self) -> Result<Value, VmError> {
        match self.code.get(self.pc) {
            Some(Code::Lit(value)) => {
                let value = *value;
                self.pc += 1;
                Ok(value)
            }
            _ => Err(self.fault(
                VmErrorKind::MalformedCode,
                "inline value expected after load",
            )),
        }
    }

    /// The inline value at an arbitrary offset; the cursor is unchanged.
    pub fn inline_value_at(&self, offset: usize) -> Result<Value, VmError> {
        match self.code.get(offset) {
            Some(Code::Lit(value)) => Ok(*value),
            _ => Err(self.fault(
                VmErrorKind::MalformedCode,
                format!("no inline value at offset {offset}"),
            )),
        }
    }

    pub fn code_at(&self, offset: usize) -> Option<Code> {
        self.code.get(offset).copied()
    }

    pub fn set_pc(&mut self, pc: usize) {
        self.pc = pc;
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    // ---- Typed pops ----

    pub fn push(&mut self, value: Value) {
        self.operand.push(value);
    }

    pub fn pop_value(&mut self) -> Result<Value, VmError> {
        self.operand.pop().map_err(|e| self.flow(e))
    }

    pub fn pop_number(&mut self) -> Result<f64, VmError> {
        let v = self.pop_value()?;
        v.as_number()
            .ok_or_else(|| self.lift(Fault::type_mismatch("number", v.kind_name())))
    }

    pub fn pop_boolean(&mut self) -> Result<bool, VmError> {
        let v = self.pop_value()?;
        v.as_boolean()
            .ok_or_else(|| self.lift(Fault::type_mismatch("boolean", v.kind_name())))
    }

    pub fn pop_index(&mut self) -> Result<usize, VmError> {
        let v = self.pop_value()?;
        v.as_index()
            .map(|i| i as usize)
            .ok_or_else(|| self.lift(Fault::type_mismatch("index", v.kind_name())))
    }

    pub fn pop_address(&mut self) -> Result<i64, VmError> {
        let v = self.pop_value()?;
        v.as_address()
            .ok_or_else(|| self.lift(Fault::type_mismatch("address", v.kind_name())))
    }

    pub fn pop_str(&mut self) -> Result<StringId, VmError> {
        let v = self.pop_value()?;
        v.as_str()
            .ok_or_else(|| self.lift(Fault::type_mismatch("string", v.kind_name())))
    }

    pub fn pop_table(&mut self) -> Result<HeapId<Table>, VmError> {
        let v = self.pop_value()?;
        v.as_table()
            .ok_or_else(|| self.lift(Fault::type_mismatch("table", v.kind_name())))
    }

    pub fn pop_closure(&mut self) -> Result<HeapId<Closure>, VmError> {
        let v = self.pop_value()?;
        v.as_closure().ok_or_else(|| {
            self.lift(Fault::new(
                VmErrorKind::TypeMismatch,
                format!("attempt to call a {} value", v.kind_name()),
            ))
        })
    }

    pub fn pop_pointer(&mut self) -> Result<HeapId<Cell>, VmError> {
        let v = self.pop_value()?;
        v.as_pointer()
            .ok_or_else(|| self.lift(Fault::type_mismatch("pointer", v.kind_name())))
    }

    // ---- Frame layout ----

    pub fn current_frame(&self) -> Result<&CallFrame, VmError> {
        self.frames.last().map_err(|e| self.flow(e))
    }

    fn frame_mut(&mut self) -> Result<&mut CallFrame, VmError> {
        if self.frames.is_empty() {
            return Err(self.fault(VmErrorKind::StackFlow, "no active call frame"));
        }
        Ok(self.frames.last_mut().expect("frame checked above"))
    }

    pub fn num_globals(&self) -> usize {
        self.num_globals
    }

    pub fn frame_base(&self) -> usize {
        self.frame_base
    }

    /// Absolute operand slot of local `i` in the current frame.
    pub fn local_slot(&self, index: usize) -> Result<usize, VmError> {
        let frame = self.current_frame()?;
        if index >= frame.num_locals {
            return Err(self.fault(
                VmErrorKind::StackFlow,
                format!("local index {index} outside frame of {}", frame.num_locals),
            ));
        }
        Ok(self.frame_base + frame.num_args + index)
    }

    /// Absolute operand slot of argument `i` in the current frame.
    pub fn argument_slot(&self, index: usize) -> Result<usize, VmError> {
        let frame = self.current_frame()?;
        if index >= frame.num_args {
            return Err(self.fault(
                VmErrorKind::StackFlow,
                format!("argument index {index} outside frame of {}", frame.num_args),
            ));
        }
        Ok(self.frame_base + index)
    }

    pub fn load_operand(&self, slot: usize) -> Result<Value, VmError> {
        self.operand.get(slot).copied().map_err(|e| self.flow(e))
    }

    pub fn store_operand(&mut self, slot: usize, value: Value) -> Result<(), VmError> {
        self.operand.set(slot, value).map_err(|e| self.flow(e))
    }

    pub fn load_constant(&self, index: usize) -> Result<Value, VmError> {
        let frame = self.current_frame()?;
        frame.load_constant(index).map_err(|f| self.lift(f))
    }

    pub fn store_constant(&mut self, index: usize, value: Value) -> Result<(), VmError> {
        let result = self.frame_mut()?.store_constant(index, value);
        result.map_err(|f| self.lift(f))
    }

    // ---- Calls ----

    /// Establish a frame for `closure` over `argc` already-pushed
    /// arguments and transfer control to its entry.
    pub fn call(&mut self, closure: HeapId<Closure>, argc: usize) -> Result<(), VmError> {
        if self.frames.len() >= self.max_call_depth {
            return Err(self.fault(VmErrorKind::StackFlow, "call stack overflow"));
        }
        let (num_params, num_locals, is_varargs, entry_pc) = {
            let c = self.heap.get_closure(closure);
            (c.num_params, c.num_locals, c.is_varargs, c.entry_pc)
        };
        if argc > self.operand.len() {
            return Err(self.fault(
                VmErrorKind::StackFlow,
                format!("{argc} arguments claimed with operand top {}", self.operand.len()),
            ));
        }

        // Adjust arity: pad missing parameters with nil; drop extras
        // unless the callee is varargs.
        let mut num_args = argc;
        while num_args < num_params {
            self.operand.push(Value::Nil);
            num_args += 1;
        }
        if num_args > num_params && !is_varargs {
            for _ in num_params..num_args {
                self.pop_value()?;
            }
            num_args = num_params;
        }

        let base = self.operand.len() - num_args;
        for _ in 0..num_locals {
            self.operand.push(Value::Nil);
        }
        self.frames.push(CallFrame::new(
            num_args,
            num_params,
            num_locals,
            base,
            self.pc,
            self.frame_base,
            closure,
        ));
        self.frame_base = base;
        self.pc = entry_pc;
        Ok(())
    }

    /// Tear down the current frame: close its upvalue cells, truncate the
    /// operand stack to the static link, push the return value, and resume
    /// the caller. Returns true when the root frame was torn down.
    pub fn finish_frame(&mut self, ret: Value) -> Result<bool, VmError> {
        let frame = self.frames.pop().map_err(|e| self.flow(e))?;
        self.close_cells(frame.static_link);
        self.operand.truncate(frame.static_link);
        self.operand.push(ret);
        self.pc = frame.dynamic_link;
        self.frame_base = frame.frame_link;
        Ok(self.frames.is_empty())
    }

    /// Bounds for branch targets: the running closure's body.
    pub fn branch_bounds(&self) -> Result<(usize, usize), VmError> {
        let frame = self.current_frame()?;
        let closure = self.heap.get_closure(frame.closure);
        Ok((closure.entry_pc, closure.end_pc))
    }

    // ---- Upvalue cells ----

    /// The open cell over `slot`, creating one if none exists.
    pub fn find_or_create_open_cell(&mut self, slot: usize) -> HeapId<Cell> {
        for &(s, id) in &self.open_cells {
            if s == slot {
                return id;
            }
        }
        let id = self.heap.alloc_cell(Cell::Open(slot));
        self.open_cells.push((slot, id));
        self.open_cells.sort_by(|a, b| b.0.cmp(&a.0));
        id
    }

    /// Close every open cell at or above `level`: copy the referenced
    /// value into the cell and drop it from the open list. Idempotent.
    pub fn close_cells(&mut self, level: usize) {
        let mut i = 0;
        while i < self.open_cells.len() {
            let (slot, id) = self.open_cells[i];
            if slot >= level {
                let value = self.operand.get(slot).copied().unwrap_or(Value::Nil);
                *self.heap.get_cell_mut(id) = Cell::Closed(value);
                self.open_cells.remove(i);
            } else {
                i += 1;
            }
        }
    }

    /// Read through a cell.
    pub fn read_cell(&self, id: HeapId<Cell>) -> Result<Value, VmError> {
        match self.heap.get_cell(id) {
            Cell::Open(slot) => self.load_operand(*slot),
            Cell::Closed(value) => Ok(*value),
        }
    }

    /// Write through a cell.
    pub fn write_cell(&mut self, id: HeapId<Cell>, value: Value) -> Result<(), VmError> {
        match self.heap.get_cell(id) {
            Cell::Open(slot) => {
                let slot = *slot;
                self.store_operand(slot, value)
            }
            Cell::Closed(_) => {
                *self.heap.get_cell_mut(id) = Cell::Closed(value);
                Ok(())
            }
        }
    }

    pub fn open_cell_count(&self) -> usize {
        self.open_cells.len()
    }

    // ---- Garbage collection ----

    /// Run a full mark/sweep pass rooted in the operand stack, the frames'
    /// closures and constant pools, and the open-cell list.
    pub fn collect_garbage(&mut self) -> usize {
        let mut roots: Vec<Value> = self.operand.iter().copied().collect();
        for frame in self.frames.iter() {
            roots.push(Value::Closure(frame.closure));
            for i in 0..mani_compiler::code::MAX_CONST {
                if let Ok(v) = frame.load_constant(i) {
                    roots.push(v);
                }
            }
        }
        for &(_, id) in &self.open_cells {
            roots.push(Value::Pointer(id));
        }
        for unit in &self.code {
            if let Code::Lit(v) = unit {
                roots.push(*v);
            }
        }
        self.heap.collect(&roots)
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}
