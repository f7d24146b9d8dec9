//! Mani front end: scanner, recursive-descent parser, and the AST→Code
//! generator targeting the stack VM.

pub mod ast;
pub mod code;
pub mod codegen;
pub mod disasm;
pub mod parser;
pub mod scanner;
pub mod token;

use mani_core::string::StringInterner;
use std::fmt;

/// Any front-end failure: scanning, parsing, or code generation.
#[derive(Clone, Debug)]
pub enum FrontError {
    Scan(scanner::ScanError),
    Parse(parser::ParseError),
    Gen(codegen::CompileError),
}

impl fmt::Display for FrontError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrontError::Scan(e) => write!(f, "{e}"),
            FrontError::Parse(e) => write!(f, "{e}"),
            FrontError::Gen(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for FrontError {}

impl From<scanner::ScanError> for FrontError {
    fn from(e: scanner::ScanError) -> Self {
        FrontError::Scan(e)
    }
}

impl From<parser::ParseError> for FrontError {
    fn from(e: parser::ParseError) -> Self {
        FrontError::Parse(e)
    }
}

impl From<codegen::CompileError> for FrontError {
    fn from(e: codegen::CompileError) -> Self {
        FrontError::Gen(e)
    }
}

/// Compile source text to an executable chunk and its string interner.
pub fn compile(source: &str) -> Result<(code::Chunk, StringInterner), FrontError> {
    let (tokens, mut strings) = scanner::scan(source)?;
    let block = parser::parse(&tokens, &mut strings)?;
    let chunk = codegen::generate(&block, &strings)?;
    Ok((chunk, strings))
}
