//! Recursive-descent parser: tokens → Block AST.
//!
//! Statements dispatch on their leading token; expressions are climbed by
//! precedence with `^` and `..` associating to the right. The parser fails
//! fast on the first grammar violation.

use crate::ast::*;
use crate::token::{Span, Token, TokenKind};
use mani_core::string::{StringId, StringInterner};
use std::fmt;
use std::mem::discriminant;

/// Parser error: the grammar was violated at (or just before) `token`.
/// `token` is None when the violation is at end of input.
#[derive(Clone, Debug)]
pub struct ParseError {
    pub message: String,
    pub token: Option<Token>,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.token {
            Some(t) => write!(
                f,
                "{}:{}: {} near '{}'",
                t.span.line, t.span.column, self.message, t.lexeme
            ),
            None => write!(f, "{} at end of input", self.message),
        }
    }
}

impl std::error::Error for ParseError {}

/// Parse a token stream (as produced by the scanner, Eof-terminated) into
/// a top-level block. The interner is needed to spell the implicit `self`
/// parameter of method definitions.
pub fn parse(tokens: &[Token], strings: &mut StringInterner) -> Result<Block, ParseError> {
    let mut parser = Parser {
        tokens,
        pos: 0,
        strings,
    };
    let block = parser.block()?;
    parser.expect(TokenKind::Eof, "expected end of input")?;
    Ok(block)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    strings: &'a mut StringInterner,
}

impl<'a> Parser<'a> {
    // ---- Token helpers ----

    fn current(&self) -> &Token {
        // The scanner always terminates the stream with Eof.
        self.tokens.get(self.pos).unwrap_or(
            self.tokens
                .last()
                .expect("token stream must not be empty"),
        )
    }

    fn kind(&self) -> &TokenKind {
        &self.current().kind
    }

    fn span(&self) -> Span {
        self.current().span
    }

    fn at_eof(&self) -> bool {
        matches!(self.kind(), TokenKind::Eof)
    }

    fn check(&self, kind: TokenKind) -> bool {
        discriminant(self.kind()) == discriminant(&kind)
    }

    fn advance(&mut self) -> Token {
        let tok = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn test_next(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<Token, ParseError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error(format!("{what} (expected '{kind}')")))
        }
    }

    fn expect_name(&mut self) -> Result<(StringId, Span), ParseError> {
        match self.kind() {
            TokenKind::Name(id) => {
                let id = *id;
                let span = self.span();
                self.advance();
                Ok((id, span))
            }
            _ => Err(self.error("expected name")),
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            message: message.into(),
            token: if self.at_eof() {
                None
            } else {
                Some(self.current().clone())
            },
        }
    }

    /// Skip statement separators (`;` and synthetic newlines).
    fn skip_separators(&mut self) {
        while matches!(self.kind(), TokenKind::Semi | TokenKind::Newline) {
            self.advance();
        }
    }

    fn skip_newlines(&mut self) {
        while matches!(self.kind(), TokenKind::Newline) {
            self.advance();
        }
    }

    /// True at a token that closes the current block.
    fn at_block_end(&self) -> bool {
        matches!(
            self.kind(),
            TokenKind::End
                | TokenKind::Until
                | TokenKind::Else
                | TokenKind::ElseIf
                | TokenKind::Eof
        )
    }

    // ---- Blocks and statements ----

    fn block(&mut self) -> Result<Block, ParseError> {
        let mut statements = Vec::new();
        let mut laststat = None;
        self.skip_separators();
        while !self.at_block_end() {
            if matches!(
                self.kind(),
                TokenKind::Return | TokenKind::Break | TokenKind::Goto
            ) {
                laststat = Some(Box::new(self.laststat()?));
                self.skip_separators();
                if !self.at_block_end() {
                    return Err(self.error("expected end of block after terminating statement"));
                }
                break;
            }
            statements.push(self.statement()?);
            self.skip_separators();
        }
        Ok(Block {
            statements,
            laststat,
        })
    }

    fn laststat(&mut self) -> Result<Stat, ParseError> {
        let span = self.span();
        match self.kind() {
            TokenKind::Break => {
                self.advance();
                Ok(Stat::Break { span })
            }
            TokenKind::Goto => {
                self.advance();
                let (label, _) = self.expect_name()?;
                Ok(Stat::Goto { label, span })
            }
            TokenKind::Return => {
                self.advance();
                let values = if self.at_block_end()
                    || matches!(self.kind(), TokenKind::Semi | TokenKind::Newline)
                {
                    Vec::new()
                } else {
                    self.explist()?
                };
                Ok(Stat::Return { values, span })
            }
            _ => unreachable!("laststat dispatch"),
        }
    }

    fn statement(&mut self) -> Result<Stat, ParseError> {
        let span = self.span();
        match self.kind() {
            TokenKind::Do => {
                self.advance();
                let body = self.block()?;
                self.expect(TokenKind::End, "unfinished do block")?;
                Ok(Stat::Do { body, span })
            }
            TokenKind::While => {
                self.advance();
                let cond = self.expr()?;
                self.expect(TokenKind::Do, "expected 'do' after while condition")?;
                let body = self.block()?;
                self.expect(TokenKind::End, "unfinished while loop")?;
                Ok(Stat::While { cond, body, span })
            }
            TokenKind::Repeat => {
                self.advance();
                let body = self.block()?;
                self.expect(TokenKind::Until, "unfinished repeat loop")?;
                let cond = self.expr()?;
                Ok(Stat::Repeat { body, cond, span })
            }
            TokenKind::If => self.if_statement(span),
            TokenKind::For => self.for_statement(span),
            TokenKind::Function => {
                self.advance();
                let name = self.funcname()?;
                let is_method = name.method.is_some();
                let body = self.funcbody(is_method)?;
                Ok(Stat::FunctionDef { name, body, span })
            }
            TokenKind::Local => {
                self.advance();
                if self.test_next(TokenKind::Function) {
                    let (name, _) = self.expect_name()?;
                    let body = self.funcbody(false)?;
                    Ok(Stat::LocalFunction { name, body, span })
                } else {
                    let mut names = vec![self.expect_name()?.0];
                    while self.test_next(TokenKind::Comma) {
                        names.push(self.expect_name()?.0);
                    }
                    let values = if self.test_next(TokenKind::Assign) {
                        self.explist()?
                    } else {
                        Vec::new()
                    };
                    Ok(Stat::LocalVars {
                        names,
                        values,
                        span,
                    })
                }
            }
            TokenKind::DoubleColon => {
                self.advance();
                let (name, _) = self.expect_name()?;
                self.expect(TokenKind::DoubleColon, "unfinished label")?;
                Ok(Stat::Label { name, span })
            }
            _ => self.expr_statement(),
        }
    }

    fn if_statement(&mut self, span: Span) -> Result<Stat, ParseError> {
        self.advance(); // if
        let mut cond_blocks = Vec::new();
        let cond = self.expr()?;
        self.expect(TokenKind::Then, "expected 'then' after if condition")?;
        cond_blocks.push((cond, self.block()?));
        let mut else_block = None;
        loop {
            match self.kind() {
                TokenKind::ElseIf => {
                    self.advance();
                    let cond = self.expr()?;
                    self.expect(TokenKind::Then, "expected 'then' after elseif condition")?;
                    cond_blocks.push((cond, self.block()?));
                }
                TokenKind::Else => {
                    self.advance();
                    else_block = Some(self.block()?);
                    self.expect(TokenKind::End, "unfinished if statement")?;
                    break;
                }
                TokenKind::End => {
                    self.advance();
                    break;
                }
                _ => return Err(self.error("unfinished if statement")),
            }
        }
        Ok(Stat::If {
            cond_blocks,
            else_block,
            span,
        })
    }

    fn for_statement(&mut self, span: Span) -> Result<Stat, ParseError> {
        self.advance(); // for
        let (first, _) = self.expect_name()?;
        match self.kind() {
            TokenKind::Assign => {
                self.advance();
                let start = self.expr()?;
                self.expect(TokenKind::Comma, "expected ',' in numeric for")?;
                let stop = self.expr()?;
                let step = if self.test_next(TokenKind::Comma) {
                    Some(self.expr()?)
                } else {
                    None
                };
                self.expect(TokenKind::Do, "expected 'do' in numeric for")?;
                let body = self.block()?;
                self.expect(TokenKind::End, "unfinished for loop")?;
                Ok(Stat::NumericFor {
                    var: first,
                    start,
                    stop,
                    step,
                    body,
                    span,
                })
            }
            TokenKind::Comma | TokenKind::In => {
                let mut vars = vec![first];
                while self.test_next(TokenKind::Comma) {
                    vars.push(self.expect_name()?.0);
                }
                self.expect(TokenKind::In, "expected 'in' in generic for")?;
                let exprs = self.explist()?;
                self.expect(TokenKind::Do, "expected 'do' in generic for")?;
                let body = self.block()?;
                self.expect(TokenKind::End, "unfinished for loop")?;
                Ok(Stat::GenericFor {
                    vars,
                    exprs,
                    body,
                    span,
                })
            }
            _ => Err(self.error("expected '=' or 'in' after for variable")),
        }
    }

    /// A statement starting with a prefix expression: a call, or the first
    /// target of an assignment.
    fn expr_statement(&mut self) -> Result<Stat, ParseError> {
        let span = self.span();
        let first = self.suffixedexp()?;
        if first.is_call() && !self.check(TokenKind::Assign) && !self.check(TokenKind::Comma) {
            return Ok(Stat::Call(first));
        }
        // Assignment: targets = explist
        let mut targets = vec![first];
        while self.test_next(TokenKind::Comma) {
            targets.push(self.suffixedexp()?);
        }
        for target in &targets {
            if !target.is_lvalue() {
                return Err(self.error("cannot assign to this expression"));
            }
        }
        self.expect(TokenKind::Assign, "expected '=' in assignment")?;
        let values = self.explist()?;
        Ok(Stat::Assign {
            targets,
            values,
            span,
        })
    }

    fn funcname(&mut self) -> Result<FuncName, ParseError> {
        let (first, span) = self.expect_name()?;
        let mut path = vec![first];
        while self.test_next(TokenKind::Dot) {
            path.push(self.expect_name()?.0);
        }
        let method = if self.test_next(TokenKind::Colon) {
            Some(self.expect_name()?.0)
        } else {
            None
        };
        Ok(FuncName { path, method, span })
    }

    /// Parse `( params ) block end`. A method body gets an implicit `self`
    /// as its first parameter.
    fn funcbody(&mut self, is_method: bool) -> Result<FuncBody, ParseError> {
        let span = self.span();
        self.expect(TokenKind::LParen, "expected '(' in function definition")?;
        let mut params = Vec::new();
        if is_method {
            params.push(self.strings.intern(b"self"));
        }
        let mut is_varargs = false;
        if !self.check(TokenKind::RParen) {
            loop {
                if self.test_next(TokenKind::Ellipsis) {
                    is_varargs = true;
                    break;
                }
                params.push(self.expect_name()?.0);
                if !self.test_next(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "expected ')' after parameters")?;
        let body = self.block()?;
        self.expect(TokenKind::End, "unfinished function body")?;
        Ok(FuncBody {
            params,
            is_varargs,
            body,
            span,
        })
    }

    // ---- Expressions ----

    fn explist(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut exprs = vec![self.expr()?];
        loop {
            // Allow a line break before the comma of a continued list.
            let save = self.pos;
            self.skip_newlines();
            if self.test_next(TokenKind::Comma) {
                exprs.push(self.expr()?);
            } else {
                self.pos = save;
                break;
            }
        }
        Ok(exprs)
    }

    fn expr(&mut self) -> Result<Expr, ParseError> {
        self.subexpr(0)
    }

    /// Precedence climbing: unary operators bind at UNARY_PRIORITY; each
    /// binary operator has a (left, right) pair and right-associates when
    /// right < left.
    fn subexpr(&mut self, limit: u8) -> Result<Expr, ParseError> {
        let mut lhs = if let Some(op) = unary_op(self.kind()) {
            let span = self.span();
            self.advance();
            let operand = self.subexpr(UNARY_PRIORITY)?;
            Expr::Unary {
                op,
                operand: Box::new(operand),
                span,
            }
        } else {
            self.simple_expr()?
        };

        while let Some((op, left, right)) = binary_op(self.kind()) {
            if left <= limit {
                break;
            }
            self.advance();
            let rhs = self.subexpr(right)?;
            let span = lhs.span();
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                span,
            };
        }
        Ok(lhs)
    }

    fn simple_expr(&mut self) -> Result<Expr, ParseError> {
        let span = self.span();
        let factor = match self.kind() {
            TokenKind::Nil => {
                self.advance();
                Factor::Nil(span)
            }
            TokenKind::True => {
                self.advance();
                Factor::True(span)
            }
            TokenKind::False => {
                self.advance();
                Factor::False(span)
            }
            TokenKind::Number(n) => {
                let n = *n;
                self.advance();
                Factor::Number(n, span)
            }
            TokenKind::Str(id) => {
                let id = *id;
                self.advance();
                Factor::Str(id, span)
            }
            TokenKind::Ellipsis => {
                self.advance();
                Factor::Varargs(span)
            }
            TokenKind::LBrace => Factor::Table(self.table_ctor()?),
            TokenKind::Function => {
                self.advance();
                return Ok(Expr::Function(self.funcbody(false)?));
            }
            _ => Factor::Prefix(self.suffixedexp()?),
        };
        Ok(Expr::Factor(factor))
    }

    fn primaryexp(&mut self) -> Result<PrefixExpr, ParseError> {
        let span = self.span();
        match self.kind() {
            TokenKind::Name(id) => {
                let id = *id;
                self.advance();
                Ok(PrefixExpr::Name(id, span))
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.expr()?;
                self.expect(TokenKind::RParen, "expected ')'")?;
                Ok(PrefixExpr::Paren(Box::new(inner), span))
            }
            _ => Err(self.error("unexpected symbol")),
        }
    }

    fn suffixedexp(&mut self) -> Result<PrefixExpr, ParseError> {
        let mut base = self.primaryexp()?;
        loop {
            let span = self.span();
            match self.kind() {
                TokenKind::Dot => {
                    self.advance();
                    let (name, _) = self.expect_name()?;
                    base = PrefixExpr::Field {
                        base: Box::new(base),
                        name,
                        span,
                    };
                }
                TokenKind::LBracket => {
                    self.advance();
                    let key = self.expr()?;
                    self.expect(TokenKind::RBracket, "expected ']'")?;
                    base = PrefixExpr::Index {
                        base: Box::new(base),
                        key: Box::new(key),
                        span,
                    };
                }
                TokenKind::Colon => {
                    self.advance();
                    let (name, _) = self.expect_name()?;
                    let args = self.call_args()?;
                    base = PrefixExpr::MethodCall {
                        base: Box::new(base),
                        name,
                        args,
                        span,
                    };
                }
                TokenKind::LParen | TokenKind::LBrace | TokenKind::Str(_) => {
                    let args = self.call_args()?;
                    base = PrefixExpr::Call {
                        base: Box::new(base),
                        args,
                        span,
                    };
                }
                _ => return Ok(base),
            }
        }
    }

    fn call_args(&mut self) -> Result<Vec<Expr>, ParseError> {
        match self.kind() {
            TokenKind::LParen => {
                self.advance();
                self.skip_newlines();
                let args = if self.check(TokenKind::RParen) {
                    Vec::new()
                } else {
                    self.explist()?
                };
                self.skip_newlines();
                self.expect(TokenKind::RParen, "expected ')' after arguments")?;
                Ok(args)
            }
            TokenKind::Str(id) => {
                let id = *id;
                let span = self.span();
                self.advance();
                Ok(vec![Expr::Factor(Factor::Str(id, span))])
            }
            TokenKind::LBrace => {
                let ctor = self.table_ctor()?;
                Ok(vec![Expr::Factor(Factor::Table(ctor))])
            }
            _ => Err(self.error("expected arguments")),
        }
    }

    fn table_ctor(&mut self) -> Result<TableCtor, ParseError> {
        let span = self.span();
        self.expect(TokenKind::LBrace, "expected '{'")?;
        let mut fields = Vec::new();
        loop {
            self.skip_newlines();
            if self.check(TokenKind::RBrace) {
                break;
            }
            let field = match self.kind() {
                TokenKind::LBracket => {
                    self.advance();
                    let key = self.expr()?;
                    self.expect(TokenKind::RBracket, "expected ']' in table key")?;
                    self.expect(TokenKind::Assign, "expected '=' in table field")?;
                    TableField::Bracketed(key, self.expr()?)
                }
                TokenKind::Name(id)
                    if matches!(
                        self.tokens.get(self.pos + 1).map(|t| &t.kind),
                        Some(TokenKind::Assign)
                    ) =>
                {
                    let id = *id;
                    self.advance(); // name
                    self.advance(); // =
                    TableField::Named(id, self.expr()?)
                }
                _ => TableField::Positional(self.expr()?),
            };
            fields.push(field);
            self.skip_newlines();
            if !self.test_next(TokenKind::Comma) && !self.test_next(TokenKind::Semi) {
                break;
            }
        }
        self.skip_newlines();
        self.expect(TokenKind::RBrace, "unfinished table constructor")?;
        Ok(TableCtor { fields, span })
    }
}

const UNARY_PRIORITY: u8 = 12;

fn unary_op(kind: &TokenKind) -> Option<UnOp> {
    match kind {
        TokenKind::Minus => Some(UnOp::Negate),
        TokenKind::Not => Some(UnOp::Not),
        TokenKind::Hash => Some(UnOp::Length),
        _ => None,
    }
}

fn binary_op(kind: &TokenKind) -> Option<(BinOp, u8, u8)> {
    match kind {
        TokenKind::Or => Some((BinOp::Or, 1, 1)),
        TokenKind::And => Some((BinOp::And, 2, 2)),
        TokenKind::Less => Some((BinOp::Less, 3, 3)),
        TokenKind::LessEq => Some((BinOp::LessEq, 3, 3)),
        TokenKind::Greater => Some((BinOp::Greater, 3, 3)),
        TokenKind::GreaterEq => Some((BinOp::GreaterEq, 3, 3)),
        TokenKind::Equal => Some((BinOp::Equal, 3, 3)),
        TokenKind::NotEqual => Some((BinOp::NotEqual, 3, 3)),
        TokenKind::Concat => Some((BinOp::Concat, 9, 8)),
        TokenKind::Plus => Some((BinOp::Add, 10, 10)),
        TokenKind::Minus => Some((BinOp::Sub, 10, 10)),
        TokenKind::Star => Some((BinOp::Mul, 11, 11)),
        TokenKind::Slash => Some((BinOp::Div, 11, 11)),
        TokenKind::Percent => Some((BinOp::Mod, 11, 11)),
        TokenKind::Caret => Some((BinOp::Pow, 14, 13)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::scan;

    fn parse_source(source: &str) -> Block {
        let (tokens, mut strings) = scan(source).unwrap();
        parse(&tokens, &mut strings).unwrap_or_else(|e| panic!("parse error: {e}"))
    }

    fn parse_err(source: &str) -> ParseError {
        let (tokens, mut strings) = scan(source).unwrap();
        parse(&tokens, &mut strings).expect_err("expected parse error")
    }

    fn only_expr(source: &str) -> Expr {
        // Wrap in a return so the expression is the whole program
        let block = parse_source(&format!("return {source}"));
        match *block.laststat.unwrap() {
            Stat::Return { mut values, .. } => values.remove(0),
            s => panic!("expected return, got {s:?}"),
        }
    }

    #[test]
    fn test_add_mul_precedence() {
        // a + b * c: the right child of Add is the Mul node
        match only_expr("a + b * c") {
            Expr::Binary { op: BinOp::Add, rhs, .. } => match *rhs {
                Expr::Binary { op: BinOp::Mul, .. } => {}
                e => panic!("right child should be Mul, got {e:?}"),
            },
            e => panic!("expected Add at root, got {e:?}"),
        }
    }

    #[test]
    fn test_pow_right_associative() {
        // a ^ b ^ c parses as a ^ (b ^ c)
        match only_expr("a ^ b ^ c") {
            Expr::Binary { op: BinOp::Pow, lhs, rhs, .. } => {
                assert!(matches!(*lhs, Expr::Factor(Factor::Prefix(PrefixExpr::Name(..)))));
                assert!(matches!(*rhs, Expr::Binary { op: BinOp::Pow, .. }));
            }
            e => panic!("expected Pow at root, got {e:?}"),
        }
    }

    #[test]
    fn test_concat_right_associative() {
        match only_expr("a .. b .. c") {
            Expr::Binary { op: BinOp::Concat, rhs, .. } => {
                assert!(matches!(*rhs, Expr::Binary { op: BinOp::Concat, .. }));
            }
            e => panic!("expected Concat at root, got {e:?}"),
        }
    }

    #[test]
    fn test_unary_binds_below_pow() {
        // -a ^ b parses as -(a ^ b)
        match only_expr("-a ^ b") {
            Expr::Unary { op: UnOp::Negate, operand, .. } => {
                assert!(matches!(*operand, Expr::Binary { op: BinOp::Pow, .. }));
            }
            e => panic!("expected Negate at root, got {e:?}"),
        }
    }

    #[test]
    fn test_chained_calls() {
        // f(1)(2) is a call whose base is a call on the name f
        match only_expr("f(1)(2)") {
            Expr::Factor(Factor::Prefix(PrefixExpr::Call { base, args, .. })) => {
                assert_eq!(args.len(), 1);
                match *base {
                    PrefixExpr::Call { base: inner, .. } => {
                        assert!(matches!(*inner, PrefixExpr::Name(..)));
                    }
                    p => panic!("base should be a call, got {p:?}"),
                }
            }
            e => panic!("expected call, got {e:?}"),
        }
    }

    #[test]
    fn test_prefix_suffix_chain() {
        // a.b[c]:m(1) — field, then index, then method call
        match only_expr("a.b[c]:m(1)") {
            Expr::Factor(Factor::Prefix(PrefixExpr::MethodCall { base, args, .. })) => {
                assert_eq!(args.len(), 1);
                assert!(matches!(*base, PrefixExpr::Index { .. }));
            }
            e => panic!("expected method call, got {e:?}"),
        }
    }

    #[test]
    fn test_if_shape() {
        let block = parse_source("if a then x = 1 elseif b then x = 2 else x = 3 end");
        match &block.statements[0] {
            Stat::If { cond_blocks, else_block, .. } => {
                assert_eq!(cond_blocks.len(), 2);
                assert!(else_block.is_some());
            }
            s => panic!("expected if, got {s:?}"),
        }
    }

    #[test]
    fn test_assign_shape() {
        let block = parse_source("a, t[1] = 1, 2");
        match &block.statements[0] {
            Stat::Assign { targets, values, .. } => {
                assert_eq!(targets.len(), 2);
                assert_eq!(values.len(), 2);
                assert!(matches!(targets[0], PrefixExpr::Name(..)));
                assert!(matches!(targets[1], PrefixExpr::Index { .. }));
            }
            s => panic!("expected assignment, got {s:?}"),
        }
    }

    #[test]
    fn test_assign_to_call_rejected() {
        let err = parse_err("f() = 1");
        assert!(err.message.contains("assign"));
    }

    #[test]
    fn test_laststat_must_be_final() {
        assert!(parse_err("return 1 x = 2").token.is_some());
        // break in the middle of a block is also rejected
        parse_err("while true do break x = 1 end");
    }

    #[test]
    fn test_laststat_variants() {
        assert!(parse_source("return").laststat.is_some());
        assert!(parse_source("return 1, 2").laststat.is_some());
        let block = parse_source("::top:: goto top");
        match &**block.laststat.as_ref().unwrap() {
            Stat::Goto { .. } => {}
            s => panic!("expected goto, got {s:?}"),
        }
    }

    #[test]
    fn test_for_lookahead() {
        let block = parse_source("for i = 1, 5 do end for k, v in f do end");
        assert!(matches!(block.statements[0], Stat::NumericFor { .. }));
        match &block.statements[1] {
            Stat::GenericFor { vars, .. } => assert_eq!(vars.len(), 2),
            s => panic!("expected generic for, got {s:?}"),
        }
    }

    #[test]
    fn test_local_function_and_vars() {
        let block = parse_source("local function f() end local a, b = 1");
        assert!(matches!(block.statements[0], Stat::LocalFunction { .. }));
        match &block.statements[1] {
            Stat::LocalVars { names, values, .. } => {
                assert_eq!(names.len(), 2);
                assert_eq!(values.len(), 1);
            }
            s => panic!("expected local vars, got {s:?}"),
        }
    }

    #[test]
    fn test_method_def_gets_self() {
        let (tokens, mut strings) = scan("function a.b:m() end").unwrap();
        let block = parse(&tokens, &mut strings).unwrap();
        match &block.statements[0] {
            Stat::FunctionDef { name, body, .. } => {
                assert_eq!(name.path.len(), 2);
                assert!(name.method.is_some());
                assert_eq!(body.params.len(), 1);
                assert_eq!(strings.get(body.params[0]), b"self");
            }
            s => panic!("expected function def, got {s:?}"),
        }
    }

    #[test]
    fn test_table_ctor_fields() {
        let block = parse_source("t = {1, x = 2, [3] = 4, 5}");
        match &block.statements[0] {
            Stat::Assign { values, .. } => match &values[0] {
                Expr::Factor(Factor::Table(ctor)) => {
                    assert_eq!(ctor.fields.len(), 4);
                    assert!(matches!(ctor.fields[0], TableField::Positional(_)));
                    assert!(matches!(ctor.fields[1], TableField::Named(..)));
                    assert!(matches!(ctor.fields[2], TableField::Bracketed(..)));
                    assert!(matches!(ctor.fields[3], TableField::Positional(_)));
                }
                e => panic!("expected table, got {e:?}"),
            },
            s => panic!("expected assignment, got {s:?}"),
        }
    }

    #[test]
    fn test_call_args_sugar() {
        // Both string and table-constructor argument sugar produce calls
        let block = parse_source("f 'x' g {1}");
        assert!(matches!(&block.statements[0], Stat::Call(PrefixExpr::Call { .. })));
        assert!(matches!(&block.statements[1], Stat::Call(PrefixExpr::Call { .. })));
    }

    #[test]
    fn test_missing_end() {
        let err = parse_err("while true do x = 1");
        assert!(err.token.is_none(), "error at eof should carry no token");
    }

    #[test]
    fn test_varargs_param() {
        let block = parse_source("local f = function(a, ...) return ... end");
        match &block.statements[0] {
            Stat::LocalVars { values, .. } => match &values[0] {
                Expr::Function(body) => {
                    assert_eq!(body.params.len(), 1);
                    assert!(body.is_varargs);
                }
                e => panic!("expected function, got {e:?}"),
            },
            s => panic!("expected local, got {s:?}"),
        }
    }

    /// Collect spans of statements and expressions in document order.
    fn preorder_spans(block: &Block, out: &mut Vec<Span>) {
        for stat in &block.statements {
            stat_spans(stat, out);
        }
        if let Some(last) = &block.laststat {
            stat_spans(last, out);
        }
    }

    fn stat_spans(stat: &Stat, out: &mut Vec<Span>) {
        out.push(stat.span());
        match stat {
            Stat::Do { body, .. } => preorder_spans(body, out),
            Stat::Assign { targets, values, .. } => {
                for t in targets {
                    out.push(t.span());
                }
                for v in values {
                    expr_spans(v, out);
                }
            }
            Stat::While { cond, body, .. } => {
                expr_spans(cond, out);
                preorder_spans(body, out);
            }
            Stat::If { cond_blocks, else_block, .. } => {
                for (cond, body) in cond_blocks {
                    expr_spans(cond, out);
                    preorder_spans(body, out);
                }
                if let Some(body) = else_block {
                    preorder_spans(body, out);
                }
            }
            Stat::Return { values, .. } => {
                for v in values {
                    expr_spans(v, out);
                }
            }
            _ => {}
        }
    }

    fn expr_spans(expr: &Expr, out: &mut Vec<Span>) {
        out.push(expr.span());
        if let Expr::Binary { lhs, rhs, .. } = expr {
            expr_spans(lhs, out);
            expr_spans(rhs, out);
        }
    }

    #[test]
    fn test_positions_non_decreasing() {
        let source = "x = 1 + 2\nif x then\n  y = x * 3\nend\nreturn y";
        let block = parse_source(source);
        let mut spans = Vec::new();
        preorder_spans(&block, &mut spans);
        for pair in spans.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            assert!(
                (a.line, a.column) <= (b.line, b.column),
                "span {a:?} after {b:?} in document order"
            );
        }
    }
}

