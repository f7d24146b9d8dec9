/// Single-pass code generator: Block AST → Code stream.
///
/// Each function body is emitted inline between its `MakeClosure` and end
/// marker; `MakeClosure` skips the body at definition time. Branch targets
/// are emitted as placeholder inline addresses and patched once known.
/// Frame constant-pool slots double as generator-managed scratch storage
/// (staging for multiple assignment, call receivers, loop control values).
pub mod scope;

use crate::ast::*;
use crate::code::{Chunk, Code, Instruction, MAX_CONST};
use crate::token::Span;
use mani_core::string::{StringId, StringInterner};
use mani_core::value::Value;
use scope::{ScopeSet, UpvalDesc};
use std::collections::HashMap;
use std::fmt;

/// Code generation error.
#[derive(Clone, Debug)]
pub struct CompileError {
    pub message: String,
    pub line: u32,
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.line, self.message)
    }
}

impl std::error::Error for CompileError {}

/// Generate an executable chunk from a parsed block.
pub fn generate(block: &Block, strings: &StringInterner) -> Result<Chunk, CompileError> {
    let mut gen = Generator {
        code: Vec::new(),
        funcs: Vec::new(),
        globals: Vec::new(),
        global_slots: HashMap::new(),
        strings,
    };
    gen.funcs.push(FuncState::new());
    gen.fs_mut().scope.enter_block(false);
    gen.gen_block(block)?;
    gen.lit(Value::Nil);
    gen.inst(Instruction::ReturnFromClosure);
    gen.emit(Code::EndClosure);
    gen.resolve_gotos()?;
    gen.fs_mut().scope.leave_block();
    let root = gen.funcs.pop().expect("root function state");
    Ok(Chunk {
        code: gen.code,
        num_globals: gen.globals.len(),
        root_locals: root.scope.max_slots,
    })
}

/// Generation state for one function.
struct FuncState {
    scope: ScopeSet,
    upvalues: Vec<UpvalDesc>,
    /// Next free constant-pool scratch slot.
    scratch: usize,
    max_scratch: usize,
    labels: Vec<(StringId, usize)>,
    /// Unresolved gotos: label, placeholder position, source span.
    gotos: Vec<(StringId, usize, Span)>,
}

impl FuncState {
    fn new() -> Self {
        FuncState {
            scope: ScopeSet::new(),
            upvalues: Vec::new(),
            scratch: 0,
            max_scratch: 0,
            labels: Vec::new(),
            gotos: Vec::new(),
        }
    }
}

/// How a name resolves at a use site.
enum NameRef {
    Local(usize),
    Upvalue(usize),
    Global(usize),
}

struct Generator<'a> {
    code: Vec<Code>,
    funcs: Vec<FuncState>,
    globals: Vec<StringId>,
    global_slots: HashMap<StringId, usize>,
    strings: &'a StringInterner,
}

impl<'a> Generator<'a> {
    fn fs(&self) -> &FuncState {
        self.funcs.last().expect("function state")
    }

    fn fs_mut(&mut self) -> &mut FuncState {
        self.funcs.last_mut().expect("function state")
    }

    fn error(&self, span: Span, msg: impl Into<String>) -> CompileError {
        CompileError {
            message: msg.into(),
            line: span.line,
        }
    }

    // ---- Emission ----

    fn here(&self) -> usize {
        self.code.len()
    }

    fn emit(&mut self, code: Code) -> usize {
        let pos = self.code.len();
        self.code.push(code);
        pos
    }

    fn inst(&mut self, inst: Instruction) -> usize {
        self.emit(Code::Inst(inst))
    }

    /// Emit a push of an inline value; returns the position of the value
    /// unit (for patching).
    fn lit(&mut self, value: Value) -> usize {
        self.inst(Instruction::LoadFromCode);
        self.emit(Code::Lit(value))
    }

    fn lit_index(&mut self, index: usize) -> usize {
        self.lit(Value::Index(index as u64))
    }

    /// Emit a branch-address placeholder to be patched later.
    fn lit_addr_placeholder(&mut self) -> usize {
        self.lit(Value::Address(0))
    }

    /// Patch the placeholder at `pos` to branch to the current position.
    fn patch_here(&mut self, pos: usize) {
        self.code[pos] = Code::Lit(Value::Address(self.here() as i64));
    }

    // ---- Scratch constant-pool slots ----

    fn alloc_scratch(&mut self, span: Span) -> Result<usize, CompileError> {
        if self.fs().scratch >= MAX_CONST {
            return Err(self.error(span, "function too complex: out of scratch slots"));
        }
        let fs = self.fs_mut();
        let slot = fs.scratch;
        fs.scratch += 1;
        if fs.scratch > fs.max_scratch {
            fs.max_scratch = fs.scratch;
        }
        Ok(slot)
    }

    fn free_scratch(&mut self, count: usize) {
        self.fs_mut().scratch -= count;
    }

    fn store_scratch(&mut self, slot: usize) {
        self.lit_index(slot);
        self.inst(Instruction::StoreConstant);
    }

    fn load_scratch(&mut self, slot: usize) {
        self.lit_index(slot);
        self.inst(Instruction::LoadConstant);
    }

    // ---- Name resolution ----

    fn global_slot(&mut self, name: StringId) -> usize {
        if let Some(&slot) = self.global_slots.get(&name) {
            return slot;
        }
        let slot = self.globals.len();
        self.globals.push(name);
        self.global_slots.insert(name, slot);
        slot
    }

    fn resolve_name(&mut self, name: StringId) -> NameRef {
        if let Some(slot) = self.fs().scope.resolve(name) {
            return NameRef::Local(slot);
        }
        let top = self.funcs.len() - 1;
        if let Some(index) = self.resolve_upvalue(top, name) {
            return NameRef::Upvalue(index);
        }
        NameRef::Global(self.global_slot(name))
    }

    /// Resolve `name` as an upvalue of the function at `level`, threading
    /// the capture through intermediate functions as needed.
    fn resolve_upvalue(&mut self, level: usize, name: StringId) -> Option<usize> {
        if level == 0 {
            return None;
        }
        if let Some(i) = self.funcs[level].upvalues.iter().position(|u| u.name == name) {
            return Some(i);
        }
        let parent = level - 1;
        if let Some(slot) = self.funcs[parent].scope.resolve(name) {
            self.funcs[level].upvalues.push(UpvalDesc {
                name,
                in_stack: true,
                index: slot,
            });
            return Some(self.funcs[level].upvalues.len() - 1);
        }
        if let Some(parent_index) = self.resolve_upvalue(parent, name) {
            self.funcs[level].upvalues.push(UpvalDesc {
                name,
                in_stack: false,
                index: parent_index,
            });
            return Some(self.funcs[level].upvalues.len() - 1);
        }
        None
    }

    /// Push the value of a name.
    fn load_name(&mut self, name: StringId) {
        match self.resolve_name(name) {
            NameRef::Local(slot) => {
                self.lit_index(slot);
                self.inst(Instruction::LoadLocal);
            }
            NameRef::Upvalue(index) => {
                self.lit_index(index);
                self.inst(Instruction::StoreUpvalue);
                self.inst(Instruction::LoadPointer);
            }
            NameRef::Global(slot) => {
                self.lit_index(slot);
                self.inst(Instruction::LoadGlobal);
            }
        }
    }

    /// Store the value on top of the stack into a name.
    fn store_name(&mut self, name: StringId) {
        match self.resolve_name(name) {
            NameRef::Local(slot) => {
                self.lit_index(slot);
                self.inst(Instruction::StoreLocal);
            }
            NameRef::Upvalue(index) => {
                self.lit_index(index);
                self.inst(Instruction::StoreUpvalue);
                self.inst(Instruction::StorePointer);
            }
            NameRef::Global(slot) => {
                self.lit_index(slot);
                self.inst(Instruction::StoreGlobal);
            }
        }
    }

    // ---- Blocks and statements ----

    fn gen_block(&mut self, block: &Block) -> Result<(), CompileError> {
        for stat in &block.statements {
            self.gen_stat(stat)?;
        }
        if let Some(last) = &block.laststat {
            self.gen_laststat(last)?;
        }
        Ok(())
    }

    fn gen_scoped_block(&mut self, block: &Block) -> Result<(), CompileError> {
        self.fs_mut().scope.enter_block(false);
        self.gen_block(block)?;
        self.fs_mut().scope.leave_block();
        Ok(())
    }

    fn gen_laststat(&mut self, stat: &Stat) -> Result<(), CompileError> {
        match stat {
            Stat::Return { values, span } => {
                match values.len() {
                    0 => {
                        self.lit(Value::Nil);
                    }
                    1 => self.gen_expr(&values[0])?,
                    _ => {
                        // All value expressions run; only the first returns.
                        let slot = self.alloc_scratch(*span)?;
                        self.gen_expr(&values[0])?;
                        self.store_scratch(slot);
                        for extra in &values[1..] {
                            self.gen_expr(extra)?;
                            self.inst(Instruction::Pop);
                        }
                        self.load_scratch(slot);
                        self.free_scratch(1);
                    }
                }
                self.inst(Instruction::ReturnFromClosure);
            }
            Stat::Break { span } => {
                let pos = self.lit_addr_placeholder();
                self.inst(Instruction::Branch);
                match self.fs_mut().scope.find_loop_block() {
                    Some(block) => block.break_patches.push(pos),
                    None => return Err(self.error(*span, "break outside a loop")),
                }
            }
            Stat::Goto { label, span } => {
                let pos = self.lit_addr_placeholder();
                self.inst(Instruction::Branch);
                self.fs_mut().gotos.push((*label, pos, *span));
            }
            _ => unreachable!("laststat is return, break, or goto"),
        }
        Ok(())
    }

    fn gen_stat(&mut self, stat: &Stat) -> Result<(), CompileError> {
        match stat {
            Stat::Do { body, .. } => self.gen_scoped_block(body),
            Stat::Call(call) => {
                self.gen_prefix(call)?;
                self.inst(Instruction::Pop);
                Ok(())
            }
            Stat::Assign {
                targets,
                values,
                span,
            } => self.gen_assign(targets, values, *span),
            Stat::While { cond, body, .. } => {
                self.fs_mut().scope.enter_block(true);
                let top = self.here();
                self.gen_expr(cond)?;
                let exit = self.lit_addr_placeholder();
                self.inst(Instruction::BranchIfFalse);
                self.gen_block(body)?;
                self.lit(Value::Address(top as i64));
                self.inst(Instruction::Branch);
                self.patch_here(exit);
                let block = self.fs_mut().scope.leave_block();
                for pos in block.break_patches {
                    self.patch_here(pos);
                }
                Ok(())
            }
            Stat::Repeat { body, cond, .. } => {
                // The until-condition sees the body's locals.
                self.fs_mut().scope.enter_block(true);
                let top = self.here();
                self.gen_block(body)?;
                self.gen_expr(cond)?;
                self.lit(Value::Address(top as i64));
                self.inst(Instruction::BranchIfFalse);
                let block = self.fs_mut().scope.leave_block();
                for pos in block.break_patches {
                    self.patch_here(pos);
                }
                Ok(())
            }
            Stat::If {
                cond_blocks,
                else_block,
                ..
            } => {
                let mut exits = Vec::new();
                let mut next = None;
                for (i, (cond, body)) in cond_blocks.iter().enumerate() {
                    if let Some(pos) = next.take() {
                        self.patch_here(pos);
                    }
                    self.gen_expr(cond)?;
                    let skip = self.lit_addr_placeholder();
                    self.inst(Instruction::BranchIfFalse);
                    self.gen_scoped_block(body)?;
                    let is_last_arm = i == cond_blocks.len() - 1 && else_block.is_none();
                    if !is_last_arm {
                        exits.push(self.lit_addr_placeholder());
                        self.inst(Instruction::Branch);
                    }
                    next = Some(skip);
                }
                if let Some(pos) = next.take() {
                    self.patch_here(pos);
                }
                if let Some(body) = else_block {
                    self.gen_scoped_block(body)?;
                }
                for pos in exits {
                    self.patch_here(pos);
                }
                Ok(())
            }
            Stat::NumericFor {
                var,
                start,
                stop,
                step,
                body,
                span,
            } => self.gen_numeric_for(*var, start, stop, step.as_ref(), body, *span),
            Stat::GenericFor {
                vars,
                exprs,
                body,
                span,
            } => self.gen_generic_for(vars, exprs, body, *span),
            Stat::FunctionDef { name, body, .. } => {
                if name.path.len() == 1 && name.method.is_none() {
                    self.gen_func(body)?;
                    self.store_name(name.path[0]);
                } else {
                    self.load_name(name.path[0]);
                    let middle_end = if name.method.is_some() {
                        name.path.len()
                    } else {
                        name.path.len() - 1
                    };
                    for &segment in &name.path[1..middle_end] {
                        self.lit(Value::Str(segment));
                        self.inst(Instruction::GetFromTable);
                    }
                    let key = name.method.unwrap_or(*name.path.last().expect("path"));
                    self.lit(Value::Str(key));
                    self.gen_func(body)?;
                    self.inst(Instruction::SetIntoTable);
                    self.inst(Instruction::Pop);
                }
                Ok(())
            }
            Stat::LocalFunction { name, body, .. } => {
                // Declared before the body so the function can recurse.
                let slot = self.fs_mut().scope.add_local(*name);
                self.gen_func(body)?;
                self.lit_index(slot);
                self.inst(Instruction::StoreLocal);
                Ok(())
            }
            Stat::LocalVars {
                names,
                values,
                span,
            } => {
                let staged = self.stage_values(values, names.len(), *span)?;
                for (i, &name) in names.iter().enumerate() {
                    let slot = self.fs_mut().scope.add_local(name);
                    match staged.get(i) {
                        Some(&scratch) => self.load_scratch(scratch),
                        None => {
                            self.lit(Value::Nil);
                        }
                    }
                    self.lit_index(slot);
                    self.inst(Instruction::StoreLocal);
                }
                self.free_scratch(staged.len());
                Ok(())
            }
            Stat::Label { name, .. } => {
                let pc = self.here();
                self.fs_mut().labels.push((*name, pc));
                Ok(())
            }
            Stat::Return { .. } | Stat::Break { .. } | Stat::Goto { .. } => {
                self.gen_laststat(stat)
            }
        }
    }

    /// Evaluate `values` left to right into scratch slots, keeping at most
    /// `wanted`; extra values still run for their effects.
    fn stage_values(
        &mut self,
        values: &[Expr],
        wanted: usize,
        span: Span,
    ) -> Result<Vec<usize>, CompileError> {
        let mut staged = Vec::new();
        for (i, value) in values.iter().enumerate() {
            self.gen_expr(value)?;
            if i < wanted {
                let slot = self.alloc_scratch(span)?;
                self.store_scratch(slot);
                staged.push(slot);
            } else {
                self.inst(Instruction::Pop);
            }
        }
        Ok(staged)
    }

    fn gen_assign(
        &mut self,
        targets: &[PrefixExpr],
        values: &[Expr],
        span: Span,
    ) -> Result<(), CompileError> {
        // Single name = single value needs no staging.
        if targets.len() == 1 && values.len() == 1 {
            if let PrefixExpr::Name(name, _) = &targets[0] {
                self.gen_expr(&values[0])?;
                self.store_name(*name);
                return Ok(());
            }
        }
        let staged = self.stage_values(values, targets.len(), span)?;
        for (i, target) in targets.iter().enumerate() {
            match target {
                PrefixExpr::Name(name, _) => {
                    match staged.get(i) {
                        Some(&slot) => self.load_scratch(slot),
                        None => {
                            self.lit(Value::Nil);
                        }
                    }
                    self.store_name(*name);
                }
                PrefixExpr::Index { base, key, .. } => {
                    self.gen_prefix(base)?;
                    self.gen_expr(key)?;
                    match staged.get(i) {
                        Some(&slot) => self.load_scratch(slot),
                        None => {
                            self.lit(Value::Nil);
                        }
                    }
                    self.inst(Instruction::SetIntoTable);
                    self.inst(Instruction::Pop);
                }
                PrefixExpr::Field { base, name, .. } => {
                    self.gen_prefix(base)?;
                    self.lit(Value::Str(*name));
                    match staged.get(i) {
                        Some(&slot) => self.load_scratch(slot),
                        None => {
                            self.lit(Value::Nil);
                        }
                    }
                    self.inst(Instruction::SetIntoTable);
                    self.inst(Instruction::Pop);
                }
                _ => return Err(self.error(span, "cannot assign to this expression")),
            }
        }
        self.free_scratch(staged.len());
        Ok(())
    }

    fn gen_numeric_for(
        &mut self,
        var: StringId,
        start: &Expr,
        stop: &Expr,
        step: Option<&Expr>,
        body: &Block,
        span: Span,
    ) -> Result<(), CompileError> {
        let cur = self.alloc_scratch(span)?;
        let limit = self.alloc_scratch(span)?;
        let step_slot = self.alloc_scratch(span)?;
        self.gen_expr(start)?;
        self.store_scratch(cur);
        self.gen_expr(stop)?;
        self.store_scratch(limit);
        match step {
            Some(step) => self.gen_expr(step)?,
            None => {
                self.lit(Value::Number(1.0));
            }
        }
        self.store_scratch(step_slot);

        self.fs_mut().scope.enter_block(true);
        let var_slot = self.fs_mut().scope.add_local(var);
        let top = self.here();

        // Pick the comparison by step sign each iteration.
        self.load_scratch(step_slot);
        self.lit(Value::Number(0.0));
        self.inst(Instruction::Gt);
        let ascending = self.lit_addr_placeholder();
        self.inst(Instruction::BranchIfTrue);

        self.load_scratch(cur);
        self.load_scratch(limit);
        self.inst(Instruction::Ge);
        let enter_desc = self.lit_addr_placeholder();
        self.inst(Instruction::BranchIfTrue);
        let exit_desc = self.lit_addr_placeholder();
        self.inst(Instruction::Branch);

        self.patch_here(ascending);
        self.load_scratch(cur);
        self.load_scratch(limit);
        self.inst(Instruction::Le);
        let enter_asc = self.lit_addr_placeholder();
        self.inst(Instruction::BranchIfTrue);
        let exit_asc = self.lit_addr_placeholder();
        self.inst(Instruction::Branch);

        self.patch_here(enter_desc);
        self.patch_here(enter_asc);
        self.load_scratch(cur);
        self.lit_index(var_slot);
        self.inst(Instruction::StoreLocal);
        self.gen_block(body)?;

        self.load_scratch(cur);
        self.load_scratch(step_slot);
        self.inst(Instruction::Add);
        self.store_scratch(cur);
        self.lit(Value::Address(top as i64));
        self.inst(Instruction::Branch);

        self.patch_here(exit_desc);
        self.patch_here(exit_asc);
        let block = self.fs_mut().scope.leave_block();
        for pos in block.break_patches {
            self.patch_here(pos);
        }
        self.free_scratch(3);
        Ok(())
    }

    /// Generic for follows the iterator protocol: the first expression
    /// yields an iterator closure, called each pass with (state, control);
    /// the loop ends when the call returns nil.
    fn gen_generic_for(
        &mut self,
        vars: &[StringId],
        exprs: &[Expr],
        body: &Block,
        span: Span,
    ) -> Result<(), CompileError> {
        let iter = self.alloc_scratch(span)?;
        let state = self.alloc_scratch(span)?;
        let control = self.alloc_scratch(span)?;
        for (i, slot) in [iter, state, control].into_iter().enumerate() {
            match exprs.get(i) {
                Some(expr) => self.gen_expr(expr)?,
                None => {
                    self.lit(Value::Nil);
                }
            }
            self.store_scratch(slot);
        }
        for extra in exprs.iter().skip(3) {
            self.gen_expr(extra)?;
            self.inst(Instruction::Pop);
        }

        self.fs_mut().scope.enter_block(true);
        let var_slots: Vec<usize> = vars
            .iter()
            .map(|&v| self.fs_mut().scope.add_local(v))
            .collect();
        let top = self.here();

        self.load_scratch(state);
        self.load_scratch(control);
        self.lit_index(2);
        self.load_scratch(iter);
        self.inst(Instruction::CallClosure);
        self.store_scratch(control);

        self.load_scratch(control);
        self.lit(Value::Nil);
        self.inst(Instruction::Eq);
        let exit = self.lit_addr_placeholder();
        self.inst(Instruction::BranchIfTrue);

        self.load_scratch(control);
        self.lit_index(var_slots[0]);
        self.inst(Instruction::StoreLocal);
        // Single-value calls: trailing loop variables are nil.
        for &slot in &var_slots[1..] {
            self.lit(Value::Nil);
            self.lit_index(slot);
            self.inst(Instruction::StoreLocal);
        }
        self.gen_block(body)?;
        self.lit(Value::Address(top as i64));
        self.inst(Instruction::Branch);

        self.patch_here(exit);
        let block = self.fs_mut().scope.leave_block();
        for pos in block.break_patches {
            self.patch_here(pos);
        }
        self.free_scratch(3);
        Ok(())
    }

    // ---- Expressions ----

    fn gen_expr(&mut self, expr: &Expr) -> Result<(), CompileError> {
        match expr {
            Expr::Factor(factor) => self.gen_factor(factor),
            Expr::Function(body) => self.gen_func(body),
            Expr::Unary { op, operand, .. } => {
                self.gen_expr(operand)?;
                self.inst(match op {
                    UnOp::Negate => Instruction::Negate,
                    UnOp::Not => Instruction::Not,
                    UnOp::Length => Instruction::Length,
                });
                Ok(())
            }
            Expr::Binary { op, lhs, rhs, span } => self.gen_binary(*op, lhs, rhs, *span),
        }
    }

    fn gen_binary(
        &mut self,
        op: BinOp,
        lhs: &Expr,
        rhs: &Expr,
        span: Span,
    ) -> Result<(), CompileError> {
        match op {
            BinOp::And | BinOp::Or => {
                // Short-circuit: the right operand only runs if the left
                // does not decide the result.
                let slot = self.alloc_scratch(span)?;
                self.gen_expr(lhs)?;
                self.store_scratch(slot);
                self.load_scratch(slot);
                let take_rhs = self.lit_addr_placeholder();
                self.inst(match op {
                    BinOp::And => Instruction::BranchIfTrue,
                    _ => Instruction::BranchIfFalse,
                });
                self.load_scratch(slot);
                let done = self.lit_addr_placeholder();
                self.inst(Instruction::Branch);
                self.patch_here(take_rhs);
                self.gen_expr(rhs)?;
                self.patch_here(done);
                self.free_scratch(1);
                Ok(())
            }
            BinOp::Pow => {
                self.gen_expr(lhs)?;
                self.gen_expr(rhs)?;
                // A literal whole exponent uses the integer power path.
                let whole = matches!(
                    rhs,
                    Expr::Factor(Factor::Number(n, _)) if n.fract() == 0.0 && n.is_finite()
                );
                self.inst(if whole {
                    Instruction::IPow
                } else {
                    Instruction::FPow
                });
                Ok(())
            }
            _ => {
                self.gen_expr(lhs)?;
                self.gen_expr(rhs)?;
                self.inst(match op {
                    BinOp::Add => Instruction::Add,
                    BinOp::Sub => Instruction::Sub,
                    BinOp::Mul => Instruction::Mul,
                    BinOp::Div => Instruction::Div,
                    BinOp::Mod => Instruction::Mod,
                    BinOp::Concat => Instruction::ConcatStrings,
                    BinOp::Equal => Instruction::Eq,
                    BinOp::NotEqual => Instruction::Ne,
                    BinOp::Less => Instruction::Lt,
                    BinOp::LessEq => Instruction::Le,
                    BinOp::Greater => Instruction::Gt,
                    BinOp::GreaterEq => Instruction::Ge,
                    BinOp::And | BinOp::Or | BinOp::Pow => unreachable!(),
                });
                Ok(())
            }
        }
    }

    fn gen_factor(&mut self, factor: &Factor) -> Result<(), CompileError> {
        match factor {
            Factor::Nil(_) => {
                self.lit(Value::Nil);
            }
            Factor::True(_) => {
                self.lit(Value::Boolean(true));
            }
            Factor::False(_) => {
                self.lit(Value::Boolean(false));
            }
            Factor::Number(n, _) => {
                self.lit(Value::Number(*n));
            }
            Factor::Str(id, _) => {
                self.lit(Value::Str(*id));
            }
            Factor::Varargs(_) => {
                self.inst(Instruction::CollectVarargs);
            }
            Factor::Table(ctor) => self.gen_table_ctor(ctor)?,
            Factor::Prefix(prefix) => self.gen_prefix(prefix)?,
        }
        Ok(())
    }

    fn gen_table_ctor(&mut self, ctor: &TableCtor) -> Result<(), CompileError> {
        self.inst(Instruction::NewTable);
        let mut position = 1.0;
        for field in &ctor.fields {
            match field {
                TableField::Named(name, value) => {
                    self.lit(Value::Str(*name));
                    self.gen_expr(value)?;
                }
                TableField::Bracketed(key, value) => {
                    self.gen_expr(key)?;
                    self.gen_expr(value)?;
                }
                TableField::Positional(value) => {
                    self.lit(Value::Number(position));
                    position += 1.0;
                    self.gen_expr(value)?;
                }
            }
            // The instruction pushes the table back for the next field.
            self.inst(Instruction::InsertIntoTable);
        }
        Ok(())
    }

    fn gen_prefix(&mut self, prefix: &PrefixExpr) -> Result<(), CompileError> {
        match prefix {
            PrefixExpr::Name(name, _) => {
                self.load_name(*name);
                Ok(())
            }
            PrefixExpr::Paren(inner, _) => self.gen_expr(inner),
            PrefixExpr::Field { base, name, span } => {
                self.gen_table_read(base, *span, |gen| {
                    gen.lit(Value::Str(*name));
                    Ok(())
                })
            }
            PrefixExpr::Index { base, key, span } => {
                self.gen_table_read(base, *span, |gen| gen.gen_expr(key))
            }
            PrefixExpr::Call { base, args, span } => {
                let callee = self.alloc_scratch(*span)?;
                self.gen_prefix(base)?;
                self.store_scratch(callee);
                for arg in args {
                    self.gen_expr(arg)?;
                }
                self.lit_index(args.len());
                self.load_scratch(callee);
                self.inst(Instruction::CallClosure);
                self.free_scratch(1);
                Ok(())
            }
            PrefixExpr::MethodCall {
                base,
                name,
                args,
                span,
            } => {
                let receiver = self.alloc_scratch(*span)?;
                self.gen_prefix(base)?;
                self.store_scratch(receiver);
                self.load_scratch(receiver);
                for arg in args {
                    self.gen_expr(arg)?;
                }
                self.lit_index(args.len() + 1);
                self.load_scratch(receiver);
                self.lit(Value::Str(*name));
                self.inst(Instruction::GetFromTable);
                self.inst(Instruction::CallClosure);
                self.free_scratch(1);
                Ok(())
            }
        }
    }

    /// Read `base[key]`, yielding nil when the key is absent. The raw get
    /// faults on a missing key, so the read is guarded by a has-check.
    fn gen_table_read<F>(
        &mut self,
        base: &PrefixExpr,
        span: Span,
        gen_key: F,
    ) -> Result<(), CompileError>
    where
        F: Fn(&mut Self) -> Result<(), CompileError>,
    {
        let table = self.alloc_scratch(span)?;
        let key = self.alloc_scratch(span)?;
        self.gen_prefix(base)?;
        self.store_scratch(table);
        gen_key(self)?;
        self.store_scratch(key);

        self.load_scratch(table);
        self.load_scratch(key);
        self.inst(Instruction::CheckIfTableHas);
        let present = self.lit_addr_placeholder();
        self.inst(Instruction::BranchIfTrue);
        self.lit(Value::Nil);
        let done = self.lit_addr_placeholder();
        self.inst(Instruction::Branch);
        self.patch_here(present);
        self.load_scratch(table);
        self.load_scratch(key);
        self.inst(Instruction::GetFromTable);
        self.patch_here(done);
        self.free_scratch(2);
        Ok(())
    }

    // ---- Function literals ----

    fn gen_func(&mut self, body: &FuncBody) -> Result<(), CompileError> {
        self.lit(Value::Boolean(body.is_varargs));
        let locals_pos = self.lit_index(0); // patched once the body is known
        self.lit_index(body.params.len());
        self.inst(Instruction::MakeClosure);

        self.funcs.push(FuncState::new());
        self.fs_mut().scope.enter_block(false);
        // Prologue: copy parameters into local slots so captures are
        // uniformly captures of locals.
        for (i, &param) in body.params.iter().enumerate() {
            let slot = self.fs_mut().scope.add_local(param);
            self.lit_index(i);
            self.inst(Instruction::LoadNthArgument);
            self.lit_index(slot);
            self.inst(Instruction::StoreLocal);
        }
        self.gen_block(&body.body)?;
        self.lit(Value::Nil);
        self.inst(Instruction::ReturnFromClosure);
        self.emit(Code::EndClosure);
        self.resolve_gotos()?;
        self.fs_mut().scope.leave_block();
        let fs = self.funcs.pop().expect("function state");
        self.code[locals_pos] = Code::Lit(Value::Index(fs.scope.max_slots as u64));

        // Captures attach to the closure left on the stack by MakeClosure.
        for upval in &fs.upvalues {
            self.lit_index(upval.index);
            self.inst(if upval.in_stack {
                Instruction::LoadUpvalue
            } else {
                Instruction::CopyUpvalue
            });
        }
        Ok(())
    }

    fn resolve_gotos(&mut self) -> Result<(), CompileError> {
        let gotos = std::mem::take(&mut self.fs_mut().gotos);
        for (label, pos, span) in gotos {
            let target = self
                .fs()
                .labels
                .iter()
                .find(|(name, _)| *name == label)
                .map(|(_, pc)| *pc);
            match target {
                Some(pc) => self.code[pos] = Code::Lit(Value::Address(pc as i64)),
                None => {
                    let text = self.strings.get_lossy(label).into_owned();
                    return Err(self.error(span, format!("no visible label '{text}' for goto")));
                }
            }
        }
        Ok(())
    }
}
