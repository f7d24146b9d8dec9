//! The syntax tree.
//!
//! Three nested sorts mirror the grammar: every prefix expression is a
//! factor, every factor is an expression. Statements form blocks; a block
//! may end with one terminating statement (return, break, or goto), which
//! is always its final node.

use crate::token::Span;
use mani_core::string::StringId;

/// An ordered sequence of statements with an optional terminator.
#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    pub statements: Vec<Stat>,
    /// Return, Break, or Goto; present only as the final node.
    pub laststat: Option<Box<Stat>>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Stat {
    /// `do ... end`
    Do { body: Block, span: Span },
    /// `a, t[k] = e1, e2`
    Assign {
        targets: Vec<PrefixExpr>,
        values: Vec<Expr>,
        span: Span,
    },
    /// A call or method call in statement position.
    Call(PrefixExpr),
    While {
        cond: Expr,
        body: Block,
        span: Span,
    },
    Repeat {
        body: Block,
        cond: Expr,
        span: Span,
    },
    /// `if c1 then b1 elseif c2 then b2 ... else be end`
    If {
        cond_blocks: Vec<(Expr, Block)>,
        else_block: Option<Block>,
        span: Span,
    },
    /// `for v = start, stop [, step] do body end`
    NumericFor {
        var: StringId,
        start: Expr,
        stop: Expr,
        step: Option<Expr>,
        body: Block,
        span: Span,
    },
    /// `for v1, v2, ... in explist do body end`
    GenericFor {
        vars: Vec<StringId>,
        exprs: Vec<Expr>,
        body: Block,
        span: Span,
    },
    /// `function a.b.c:m(...) body end`
    FunctionDef {
        name: FuncName,
        body: FuncBody,
        span: Span,
    },
    /// `local function f(...) body end`
    LocalFunction {
        name: StringId,
        body: FuncBody,
        span: Span,
    },
    /// `local a, b = e1, e2`
    LocalVars {
        names: Vec<StringId>,
        values: Vec<Expr>,
        span: Span,
    },
    Return { values: Vec<Expr>, span: Span },
    Break { span: Span },
    Goto { label: StringId, span: Span },
    /// `::name::`
    Label { name: StringId, span: Span },
}

impl Stat {
    pub fn span(&self) -> Span {
        match self {
            Stat::Do { span, .. }
            | Stat::Assign { span, .. }
            | Stat::While { span, .. }
            | Stat::Repeat { span, .. }
            | Stat::If { span, .. }
            | Stat::NumericFor { span, .. }
            | Stat::GenericFor { span, .. }
            | Stat::FunctionDef { span, .. }
            | Stat::LocalFunction { span, .. }
            | Stat::LocalVars { span, .. }
            | Stat::Return { span, .. }
            | Stat::Break { span }
            | Stat::Goto { span, .. }
            | Stat::Label { span, .. } => *span,
            Stat::Call(p) => p.span(),
        }
    }

    /// Whether this statement terminates its block.
    pub fn is_laststat(&self) -> bool {
        matches!(self, Stat::Return { .. } | Stat::Break { .. } | Stat::Goto { .. })
    }
}

/// The dotted path and optional method name of a function definition,
/// e.g. `a.b.c:m`.
#[derive(Clone, Debug, PartialEq)]
pub struct FuncName {
    pub path: Vec<StringId>,
    pub method: Option<StringId>,
    pub span: Span,
}

/// A function literal: parameters, vararg flag, and body.
#[derive(Clone, Debug, PartialEq)]
pub struct FuncBody {
    pub params: Vec<StringId>,
    pub is_varargs: bool,
    pub body: Block,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Factor(Factor),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        span: Span,
    },
    Unary {
        op: UnOp,
        operand: Box<Expr>,
        span: Span,
    },
    /// An anonymous function literal.
    Function(FuncBody),
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Factor(f) => f.span(),
            Expr::Binary { span, .. } | Expr::Unary { span, .. } => *span,
            Expr::Function(body) => body.span,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Factor {
    Nil(Span),
    True(Span),
    False(Span),
    Number(f64, Span),
    Str(StringId, Span),
    /// `...`
    Varargs(Span),
    Table(TableCtor),
    Prefix(PrefixExpr),
}

impl Factor {
    pub fn span(&self) -> Span {
        match self {
            Factor::Nil(span)
            | Factor::True(span)
            | Factor::False(span)
            | Factor::Number(_, span)
            | Factor::Str(_, span)
            | Factor::Varargs(span) => *span,
            Factor::Table(t) => t.span,
            Factor::Prefix(p) => p.span(),
        }
    }
}

/// A base (name or parenthesised expression) followed by suffixes.
#[derive(Clone, Debug, PartialEq)]
pub enum PrefixExpr {
    Name(StringId, Span),
    Paren(Box<Expr>, Span),
    /// `base[key]`
    Index {
        base: Box<PrefixExpr>,
        key: Box<Expr>,
        span: Span,
    },
    /// `base.name`
    Field {
        base: Box<PrefixExpr>,
        name: StringId,
        span: Span,
    },
    /// `base(args)`, `base "s"`, `base {t}`
    Call {
        base: Box<PrefixExpr>,
        args: Vec<Expr>,
        span: Span,
    },
    /// `base:name(args)`
    MethodCall {
        base: Box<PrefixExpr>,
        name: StringId,
        args: Vec<Expr>,
        span: Span,
    },
}

impl PrefixExpr {
    pub fn span(&self) -> Span {
        match self {
            PrefixExpr::Name(_, span)
            | PrefixExpr::Paren(_, span)
            | PrefixExpr::Index { span, .. }
            | PrefixExpr::Field { span, .. }
            | PrefixExpr::Call { span, .. }
            | PrefixExpr::MethodCall { span, .. } => *span,
        }
    }

    /// Whether this prefix expression is a call (valid as a statement).
    pub fn is_call(&self) -> bool {
        matches!(self, PrefixExpr::Call { .. } | PrefixExpr::MethodCall { .. })
    }

    /// Whether this prefix expression can be assigned to.
    pub fn is_lvalue(&self) -> bool {
        matches!(
            self,
            PrefixExpr::Name(..) | PrefixExpr::Index { .. } | PrefixExpr::Field { .. }
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TableCtor {
    pub fields: Vec<TableField>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TableField {
    /// `name = expr`
    Named(StringId, Expr),
    /// `[key] = expr`
    Bracketed(Expr, Expr),
    /// `expr` (gets the next positional key)
    Positional(Expr),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Or,
    And,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    Equal,
    NotEqual,
    Concat,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnOp {
    Negate,
    Not,
    Length,
}
