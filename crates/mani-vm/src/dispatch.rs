//! The fetch–decode–execute loop.
//!
//! One unit is fetched per iteration. An end marker tears the current
//! frame down with a nil result; an inline value in instruction position
//! is a fault; everything else executes. The loop ends when the root
//! frame is torn down, yielding the program result.

use crate::arith::{self, ArithOp, BitOp};
use crate::compare::{self, CmpOp};
use crate::error::{VmError, VmErrorKind};
use crate::vm::Vm;
use mani_compiler::code::{Code, Instruction};
use mani_core::heap::{Cell, Closure};
use mani_core::value::Value;

/// Run until the root closure returns.
pub fn run(vm: &mut Vm) -> Result<Value, VmError> {
    loop {
        match vm.fetch()? {
            Code::EndClosure => {
                // A body that reaches its marker yields nil.
                if vm.finish_frame(Value::Nil)? {
                    return vm.pop_value();
                }
            }
            Code::Lit(_) => {
                return Err(vm.fault(
                    VmErrorKind::MalformedCode,
                    "instruction expected, found inline value",
                ));
            }
            Code::Inst(inst) => {
                if let Some(result) = execute(vm, inst)? {
                    return Ok(result);
                }
            }
        }
    }
}

/// Execute one instruction. Returns the program result when the root
/// frame returned.
fn execute(vm: &mut Vm, inst: Instruction) -> Result<Option<Value>, VmError> {
    match inst {
        // ---- Arithmetic ----
        Instruction::Add
        | Instruction::Sub
        | Instruction::Mul
        | Instruction::Div
        | Instruction::Mod
        | Instruction::FPow
        | Instruction::IPow => {
            let rhs = vm.pop_number()?;
            let lhs = vm.pop_number()?;
            let op = match inst {
                Instruction::Add => ArithOp::Add,
                Instruction::Sub => ArithOp::Sub,
                Instruction::Mul => ArithOp::Mul,
                Instruction::Div => ArithOp::Div,
                Instruction::Mod => ArithOp::Mod,
                Instruction::FPow => ArithOp::FPow,
                _ => ArithOp::IPow,
            };
            let result = arith::binary(op, lhs, rhs).map_err(|f| vm.lift(f))?;
            vm.push(Value::Number(result));
        }
        Instruction::Negate => {
            let n = vm.pop_number()?;
            vm.push(Value::Number(-n));
        }
        Instruction::TruncateReal => {
            let n = vm.pop_number()?;
            vm.push(Value::Number(n.trunc()));
        }
        Instruction::FloorReal => {
            let n = vm.pop_number()?;
            vm.push(Value::Number(n.floor()));
        }

        // ---- Bitwise ----
        Instruction::BitAnd
        | Instruction::BitOr
        | Instruction::BitXor
        | Instruction::ShiftLeft
        | Instruction::ShiftRight => {
            let rhs = vm.pop_number()?;
            let lhs = vm.pop_number()?;
            let op = match inst {
                Instruction::BitAnd => BitOp::And,
                Instruction::BitOr => BitOp::Or,
                Instruction::BitXor => BitOp::Xor,
                Instruction::ShiftLeft => BitOp::ShiftLeft,
                _ => BitOp::ShiftRight,
            };
            let result = arith::bitwise(op, lhs, rhs).map_err(|f| vm.lift(f))?;
            vm.push(Value::Number(result));
        }
        Instruction::BitNot => {
            let n = vm.pop_number()?;
            let result = arith::bitwise_not(n).map_err(|f| vm.lift(f))?;
            vm.push(Value::Number(result));
        }

        // ---- Logical and strings ----
        Instruction::Conjunction => {
            let rhs = vm.pop_boolean()?;
            let lhs = vm.pop_boolean()?;
            vm.push(Value::Boolean(lhs && rhs));
        }
        Instruction::Disjunction => {
            let rhs = vm.pop_boolean()?;
            let lhs = vm.pop_boolean()?;
            vm.push(Value::Boolean(lhs || rhs));
        }
        Instruction::Not => {
            let b = vm.pop_boolean()?;
            vm.push(Value::Boolean(!b));
        }
        Instruction::ConcatStrings => {
            let rhs = vm.pop_str()?;
            let lhs = vm.pop_str()?;
            let joined = vm.strings.concat(lhs, rhs);
            vm.push(Value::Str(joined));
        }

        // ---- Comparison ----
        Instruction::Eq => {
            let rhs = vm.pop_value()?;
            let lhs = vm.pop_value()?;
            vm.push(Value::Boolean(lhs == rhs));
        }
        Instruction::Ne => {
            let rhs = vm.pop_value()?;
            let lhs = vm.pop_value()?;
            vm.push(Value::Boolean(lhs != rhs));
        }
        Instruction::Lt | Instruction::Le | Instruction::Gt | Instruction::Ge => {
            let rhs = vm.pop_number()?;
            let lhs = vm.pop_number()?;
            let op = match inst {
                Instruction::Lt => CmpOp::Lt,
                Instruction::Le => CmpOp::Le,
                Instruction::Gt => CmpOp::Gt,
                _ => CmpOp::Ge,
            };
            vm.push(Value::Boolean(compare::number_compare(op, lhs, rhs)));
        }

        // ---- Memory ----
        Instruction::LoadLocal => {
            let index = vm.pop_index()?;
            let slot = vm.local_slot(index)?;
            let value = vm.load_operand(slot)?;
            vm.push(value);
        }
        Instruction::StoreLocal => {
            let index = vm.pop_index()?;
            let value = vm.pop_value()?;
            let slot = vm.local_slot(index)?;
            vm.store_operand(slot, value)?;
        }
        Instruction::LoadNthArgument => {
            let index = vm.pop_index()?;
            let slot = vm.argument_slot(index)?;
            let value = vm.load_operand(slot)?;
            vm.push(value);
        }
        Instruction::LoadGlobal => {
            let slot = vm.pop_index()?;
            let value = global_slot(vm, slot).and_then(|s| vm.load_operand(s))?;
            vm.push(value);
        }
        Instruction::StoreGlobal => {
            let slot = vm.pop_index()?;
            let value = vm.pop_value()?;
            let slot = global_slot(vm, slot)?;
            vm.store_operand(slot, value)?;
        }
        Instruction::LoadGlobalPointer => {
            let index = vm.pop_index()?;
            let slot = global_slot(vm, index)?;
            let cell = vm.find_or_create_open_cell(slot);
            vm.push(Value::Pointer(cell));
        }
        Instruction::LoadConstant => {
            let index = vm.pop_index()?;
            let value = vm.load_constant(index)?;
            vm.push(value);
        }
        Instruction::StoreConstant => {
            let index = vm.pop_index()?;
            let value = vm.pop_value()?;
            vm.store_constant(index, value)?;
        }
        Instruction::LoadFromCode => {
            let value = vm.take_inline_value()?;
            vm.push(value);
        }
        Instruction::LoadFromCodeAtOffset => {
            let offset = vm.pop_index()?;
            let value = vm.inline_value_at(offset)?;
            vm.push(value);
        }
        Instruction::Pop => {
            vm.pop_value()?;
        }

        // ---- Tables ----
        Instruction::NewTable => {
            let id = vm.heap.alloc_table();
            vm.push(Value::Table(id));
        }
        Instruction::InsertIntoTable | Instruction::SetIntoTable => {
            let value = vm.pop_value()?;
            let key = vm.pop_value()?;
            let table = vm.pop_table()?;
            let result = if inst == Instruction::InsertIntoTable {
                vm.heap.get_table_mut(table).insert(key, value)
            } else {
                vm.heap.get_table_mut(table).set(key, value)
            };
            result.map_err(|msg| vm.fault(VmErrorKind::TypeMismatch, msg))?;
            vm.push(Value::Table(table));
        }
        Instruction::GetFromTable => {
            let key = vm.pop_value()?;
            let table = vm.pop_table()?;
            let value = vm.heap.get_table(table).get(key).ok_or_else(|| {
                vm.fault(
                    VmErrorKind::MissingTableEntry,
                    format!("no entry for key {key}"),
                )
            })?;
            vm.push(value);
        }
        Instruction::CheckIfTableHas => {
            let key = vm.pop_value()?;
            let table = vm.pop_table()?;
            let present = vm.heap.get_table(table).has(key);
            vm.push(Value::Boolean(present));
        }
        Instruction::Length => {
            let value = vm.pop_value()?;
            let length = match value {
                Value::Table(id) => vm.heap.get_table(id).len() as f64,
                Value::Str(id) => vm.strings.get(id).len() as f64,
                other => {
                    return Err(vm.fault(
                        VmErrorKind::TypeMismatch,
                        format!("cannot take the length of a {}", other.kind_name()),
                    ))
                }
            };
            vm.push(Value::Number(length));
        }
        Instruction::KeyAtPosition | Instruction::ValueAtPosition => {
            let position = vm.pop_index()?;
            let table = vm.pop_table()?;
            let entry = if inst == Instruction::KeyAtPosition {
                vm.heap.get_table(table).key_at(position)
            } else {
                vm.heap.get_table(table).value_at(position)
            };
            let value = entry.ok_or_else(|| {
                vm.fault(
                    VmErrorKind::MissingTableEntry,
                    format!("no entry at position {position}"),
                )
            })?;
            vm.push(value);
        }
        Instruction::CollectVarargs => {
            let frame = vm.current_frame()?;
            let (num_params, num_args) = (frame.num_params, frame.num_args);
            let base = vm.frame_base();
            let table = vm.heap.alloc_table();
            for (position, arg) in (num_params..num_args).enumerate() {
                let value = vm.load_operand(base + arg)?;
                vm.heap
                    .get_table_mut(table)
                    .insert(Value::Number((position + 1) as f64), value)
                    .map_err(|msg| vm.fault(VmErrorKind::TypeMismatch, msg))?;
            }
            vm.push(Value::Table(table));
        }

        // ---- Closures and calls ----
        Instruction::MakeClosure => {
            let num_params = vm.pop_index()?;
            let num_locals = vm.pop_index()?;
            let is_varargs = vm.pop_boolean()?;
            let entry_pc = vm.pc();
            let end_pc = find_end_marker(vm, entry_pc)?;
            let id = vm.heap.alloc_closure(Closure {
                num_params,
                num_locals,
                is_varargs,
                entry_pc,
                end_pc,
                upvalues: Vec::new(),
            });
            vm.push(Value::Closure(id));
            // Definition continues after the body.
            vm.set_pc(end_pc + 1);
        }
        Instruction::CallClosure => {
            let callee = vm.pop_closure()?;
            let argc = vm.pop_index()?;
            vm.call(callee, argc)?;
        }
        Instruction::CallConcurrently => {
            return Err(vm.fault(
                VmErrorKind::Unsupported,
                "concurrent calls are not supported",
            ));
        }
        Instruction::ReturnFromClosure => {
            let ret = vm.pop_value()?;
            if vm.finish_frame(ret)? {
                return Ok(Some(vm.pop_value()?));
            }
        }
        Instruction::LoadUpvalue => {
            let index = vm.pop_index()?;
            let slot = vm.local_slot(index)?;
            let cell = vm.find_or_create_open_cell(slot);
            attach_upvalue(vm, cell)?;
        }
        Instruction::CopyUpvalue => {
            let index = vm.pop_index()?;
            let cell = running_upvalue(vm, index)?;
            attach_upvalue(vm, cell)?;
        }
        Instruction::StoreUpvalue => {
            let index = vm.pop_index()?;
            let cell = running_upvalue(vm, index)?;
            vm.push(Value::Pointer(cell));
        }
        Instruction::LoadPointer => {
            let pointer = vm.pop_pointer()?;
            let value = vm.read_cell(pointer)?;
            vm.push(value);
        }
        Instruction::StorePointer => {
            let pointer = vm.pop_pointer()?;
            let value = vm.pop_value()?;
            vm.write_cell(pointer, value)?;
        }

        // ---- Control flow ----
        Instruction::Branch => {
            let target = vm.pop_address()?;
            branch_to(vm, target)?;
        }
        Instruction::BranchIfTrue => {
            let target = vm.pop_address()?;
            let cond = vm.pop_boolean()?;
            if cond {
                branch_to(vm, target)?;
            }
        }
        Instruction::BranchIfFalse => {
            let target = vm.pop_address()?;
            let cond = vm.pop_boolean()?;
            if !cond {
                branch_to(vm, target)?;
            }
        }
    }
    Ok(None)
}

/// Validate a global-region slot.
fn global_slot(vm: &Vm, slot: usize) -> Result<usize, VmError> {
    if slot >= vm.num_globals() {
        return Err(vm.fault(
            VmErrorKind::StackFlow,
            format!("global slot {slot} outside region of {}", vm.num_globals()),
        ));
    }
    Ok(slot)
}

/// An intra-closure jump; targets outside the running body are faults.
fn branch_to(vm: &mut Vm, target: i64) -> Result<(), VmError> {
    let (entry, end) = vm.branch_bounds()?;
    if target < 0 || (target as usize) < entry || (target as usize) >= end {
        return Err(vm.fault(
            VmErrorKind::MalformedCode,
            format!("branch target {target} outside body [{entry}, {end})"),
        ));
    }
    vm.set_pc(target as usize);
    Ok(())
}

/// Scan forward for the end marker matching the body that begins at
/// `entry`. Nested closure bodies open with MakeClosure and close with
/// their own markers.
fn find_end_marker(vm: &Vm, entry: usize) -> Result<usize, VmError> {
    let mut depth = 0usize;
    let mut offset = entry;
    while let Some(unit) = vm.code_at(offset) {
        match unit {
            Code::Inst(Instruction::MakeClosure) => depth += 1,
            Code::EndClosure => {
                if depth == 0 {
                    return Ok(offset);
                }
                depth -= 1;
            }
            _ => {}
        }
        offset += 1;
    }
    Err(vm.fault(
        VmErrorKind::MalformedCode,
        format!("no end marker for closure body at {entry}"),
    ))
}

/// The running closure's upvalue cell at `index`.
fn running_upvalue(
    vm: &Vm,
    index: usize,
) -> Result<mani_core::heap::HeapId<Cell>, VmError> {
    let frame = vm.current_frame()?;
    let closure = vm.heap.get_closure(frame.closure);
    closure.upvalues.get(index).copied().ok_or_else(|| {
        vm.fault(
            VmErrorKind::MalformedCode,
            format!(
                "upvalue index {index} outside closure with {}",
                closure.upvalues.len()
            ),
        )
    })
}

/// Attach a cell to the closure being built (on top of the stack).
fn attach_upvalue(vm: &mut Vm, cell: mani_core::heap::HeapId<Cell>) -> Result<(), VmError> {
    let top = vm
        .operand
        .last()
        .map_err(|e| vm.flow(e))
        .and_then(|v| {
            v.as_closure().ok_or_else(|| {
                vm.fault(
                    VmErrorKind::TypeMismatch,
                    format!("capture needs a closure on top, found {}", v.kind_name()),
                )
            })
        })?;
    vm.heap.get_closure_mut(top).upvalues.push(cell);
    Ok(())
}
