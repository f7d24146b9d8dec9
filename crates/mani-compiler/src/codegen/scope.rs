/// Scope and variable bookkeeping for one function being generated.
use mani_core::string::StringId;

/// A local variable: its name, frame slot, and declaring block depth.
#[derive(Clone, Debug)]
pub struct LocalVar {
    pub name: StringId,
    pub slot: usize,
    pub depth: usize,
}

/// One lexical block. Loop blocks collect break-branch patch positions.
#[derive(Clone, Debug)]
pub struct BlockScope {
    pub locals_on_entry: usize,
    pub is_loop: bool,
    /// Positions of placeholder branch addresses to patch to the loop end.
    pub break_patches: Vec<usize>,
}

/// Tracks blocks and locals for a single function.
///
/// Slots are never reused within a function: a closure may capture any
/// local, and its cell stays open until the frame is popped, so a freed
/// slot could be observed through a stale capture.
pub struct ScopeSet {
    pub locals: Vec<LocalVar>,
    pub blocks: Vec<BlockScope>,
    pub depth: usize,
    next_slot: usize,
    pub max_slots: usize,
}

impl ScopeSet {
    pub fn new() -> Self {
        ScopeSet {
            locals: Vec::new(),
            blocks: Vec::new(),
            depth: 0,
            next_slot: 0,
            max_slots: 0,
        }
    }

    pub fn enter_block(&mut self, is_loop: bool) {
        self.depth += 1;
        self.blocks.push(BlockScope {
            locals_on_entry: self.locals.len(),
            is_loop,
            break_patches: Vec::new(),
        });
    }

    /// Leave the current block, dropping its local names from scope.
    pub fn leave_block(&mut self) -> BlockScope {
        self.depth -= 1;
        let block = self.blocks.pop().expect("mismatched block");
        self.locals.truncate(block.locals_on_entry);
        block
    }

    /// Declare a local, returning its frame slot.
    pub fn add_local(&mut self, name: StringId) -> usize {
        let slot = self.next_slot;
        self.locals.push(LocalVar {
            name,
            slot,
            depth: self.depth,
        });
        self.next_slot += 1;
        if self.next_slot > self.max_slots {
            self.max_slots = self.next_slot;
        }
        slot
    }

    /// Resolve a name to a local slot, innermost declaration first.
    pub fn resolve(&self, name: StringId) -> Option<usize> {
        self.locals.iter().rev().find(|v| v.name == name).map(|v| v.slot)
    }

    /// The nearest enclosing loop block, for break patching.
    pub fn find_loop_block(&mut self) -> Option<&mut BlockScope> {
        self.blocks.iter_mut().rev().find(|b| b.is_loop)
    }
}

impl Default for ScopeSet {
    fn default() -> Self {
        Self::new()
    }
}

/// An upvalue of a function under generation: either a slot of the
/// immediately enclosing frame, or an upvalue index of the enclosing
/// closure (transitive capture).
#[derive(Clone, Debug)]
pub struct UpvalDesc {
    pub name: StringId,
    pub in_stack: bool,
    pub index: usize,
}
