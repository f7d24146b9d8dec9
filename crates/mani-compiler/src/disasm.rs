//! Code stream disassembler, one unit per line.

use crate::code::{Chunk, Code};
use mani_core::string::StringInterner;
use mani_core::value::Value;
use std::fmt::Write;

/// Render a chunk for inspection: addresses, units, and resolved string
/// literals.
pub fn disassemble(chunk: &Chunk, strings: &StringInterner) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "; {} units, {} globals, {} root locals",
        chunk.code.len(),
        chunk.num_globals,
        chunk.root_locals
    );
    for (addr, unit) in chunk.code.iter().enumerate() {
        match unit {
            Code::Inst(inst) => {
                let _ = writeln!(out, "{addr:5}  {inst:?}");
            }
            Code::Lit(Value::Str(id)) => {
                let _ = writeln!(out, "{addr:5}    = \"{}\"", strings.get_lossy(*id));
            }
            Code::Lit(value) => {
                let _ = writeln!(out, "{addr:5}    = {value}");
            }
            Code::EndClosure => {
                let _ = writeln!(out, "{addr:5}  -- end closure --");
            }
        }
    }
    out
}
