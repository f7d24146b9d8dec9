//! The scanner: source text → token stream.
//!
//! Whitespace and `--` comments are consumed between lexemes. A synthetic
//! Newline token is emitted at a line end only when the previous token can
//! end a statement, so expressions may span lines freely while the parser
//! still sees statement boundaries.

use crate::token::{Span, Token, TokenKind};
use mani_core::string::StringInterner;
use std::fmt;

/// Scanner error: a malformed lexeme at the recorded position.
#[derive(Clone, Debug, PartialEq)]
pub struct ScanError {
    pub message: String,
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.line, self.column, self.message)
    }
}

impl std::error::Error for ScanError {}

/// Scan source text into tokens. The returned interner owns every name and
/// string literal and is threaded through to the VM.
pub fn scan(source: &str) -> Result<(Vec<Token>, StringInterner), ScanError> {
    let mut scanner = Scanner::new(source.as_bytes());
    scanner.run()?;
    Ok((scanner.tokens, scanner.strings))
}

struct Scanner<'a> {
    source: &'a [u8],
    pos: usize,
    line: u32,
    column: u32,
    strings: StringInterner,
    tokens: Vec<Token>,
}

impl<'a> Scanner<'a> {
    fn new(source: &'a [u8]) -> Self {
        Scanner {
            source,
            pos: 0,
            line: 1,
            column: 1,
            strings: StringInterner::new(),
            tokens: Vec::new(),
        }
    }

    fn run(&mut self) -> Result<(), ScanError> {
        loop {
            let saw_newline = self.skip_whitespace_and_comments();
            if saw_newline {
                self.maybe_emit_newline();
            }
            if self.peek().is_none() {
                let span = self.span_here();
                self.push(TokenKind::Eof, "<eof>".to_string(), span);
                return Ok(());
            }
            let start = self.pos;
            let span = self.span_here();
            let kind = self.scan_token(span)?;
            let lexeme = String::from_utf8_lossy(&self.source[start..self.pos]).into_owned();
            self.push(kind, lexeme, span);
        }
    }

    fn maybe_emit_newline(&mut self) {
        let ends_statement = self
            .tokens
            .last()
            .map(|t| t.kind.can_end_statement())
            .unwrap_or(false);
        if ends_statement {
            let span = self.span_here();
            self.push(TokenKind::Newline, "\n".to_string(), span);
        }
    }

    fn push(&mut self, kind: TokenKind, lexeme: String, span: Span) {
        self.tokens.push(Token { kind, lexeme, span });
    }

    fn span_here(&self) -> Span {
        Span {
            line: self.line,
            column: self.column,
        }
    }

    fn error(&self, span: Span, msg: impl Into<String>) -> ScanError {
        ScanError {
            message: msg.into(),
            line: span.line,
            column: span.column,
        }
    }

    // ---- Character handling ----

    fn peek(&self) -> Option<u8> {
        self.source.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.source.get(self.pos + offset).copied()
    }

    fn advance_char(&mut self) -> Option<u8> {
        let ch = self.source.get(self.pos).copied()?;
        self.pos += 1;
        if ch == b'\n' {
            self.line += 1;
            self.column = 1;
        } else if ch == b'\r' {
            // \r\n counts as one newline
            if self.peek() == Some(b'\n') {
                self.pos += 1;
            }
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    /// Skip whitespace and comments. Returns true if a line end was crossed.
    fn skip_whitespace_and_comments(&mut self) -> bool {
        let mut saw_newline = false;
        loop {
            match self.peek() {
                Some(b' ') | Some(b'\t') | Some(b'\x0B') | Some(b'\x0C') => {
                    self.advance_char();
                }
                Some(b'\n') | Some(b'\r') => {
                    saw_newline = true;
                    self.advance_char();
                }
                Some(b'-') if self.peek_at(1) == Some(b'-') => {
                    self.advance_char();
                    self.advance_char();
                    while let Some(ch) = self.peek() {
                        if ch == b'\n' || ch == b'\r' {
                            break;
                        }
                        self.advance_char();
                    }
                }
                _ => break,
            }
        }
        saw_newline
    }

    // ---- Token scanning ----

    fn scan_token(&mut self, span: Span) -> Result<TokenKind, ScanError> {
        let ch = self.peek().expect("scan_token at eof");
        match ch {
            b'+' => self.single(TokenKind::Plus),
            b'-' => self.single(TokenKind::Minus),
            b'*' => self.single(TokenKind::Star),
            b'/' => self.single(TokenKind::Slash),
            b'^' => self.single(TokenKind::Caret),
            b'%' => self.single(TokenKind::Percent),
            b'#' => self.single(TokenKind::Hash),
            b'(' => self.single(TokenKind::LParen),
            b')' => self.single(TokenKind::RParen),
            b'{' => self.single(TokenKind::LBrace),
            b'}' => self.single(TokenKind::RBrace),
            b'[' => self.single(TokenKind::LBracket),
            b']' => self.single(TokenKind::RBracket),
            b',' => self.single(TokenKind::Comma),
            b';' => self.single(TokenKind::Semi),
            b'=' => {
                self.advance_char();
                if self.peek() == Some(b'=') {
                    self.advance_char();
                    Ok(TokenKind::Equal)
                } else {
                    Ok(TokenKind::Assign)
                }
            }
            b'~' => {
                self.advance_char();
                if self.peek() == Some(b'=') {
                    self.advance_char();
                    Ok(TokenKind::NotEqual)
                } else {
                    Err(self.error(span, "unknown operator '~'"))
                }
            }
            b'<' => {
                self.advance_char();
                if self.peek() == Some(b'=') {
                    self.advance_char();
                    Ok(TokenKind::LessEq)
                } else {
                    Ok(TokenKind::Less)
                }
            }
            b'>' => {
                self.advance_char();
                if self.peek() == Some(b'=') {
                    self.advance_char();
                    Ok(TokenKind::GreaterEq)
                } else {
                    Ok(TokenKind::Greater)
                }
            }
            b':' => {
                self.advance_char();
                if self.peek() == Some(b':') {
                    self.advance_char();
                    Ok(TokenKind::DoubleColon)
                } else {
                    Ok(TokenKind::Colon)
                }
            }
            b'.' => {
                self.advance_char();
                if self.peek() == Some(b'.') {
                    self.advance_char();
                    if self.peek() == Some(b'.') {
                        self.advance_char();
                        Ok(TokenKind::Ellipsis)
                    } else {
                        Ok(TokenKind::Concat)
                    }
                } else if self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.scan_decimal_after_dot(span)
                } else {
                    Ok(TokenKind::Dot)
                }
            }
            b'"' | b'\'' => self.scan_string(span),
            b'0'..=b'9' => self.scan_number(span),
            _ if is_name_start(ch) => Ok(self.scan_name()),
            _ => {
                self.advance_char();
                let near = if ch.is_ascii_graphic() {
                    format!("'{}'", ch as char)
                } else {
                    format!("'<\\{ch}>'")
                };
                Err(self.error(span, format!("unexpected character near {near}")))
            }
        }
    }

    fn single(&mut self, kind: TokenKind) -> Result<TokenKind, ScanError> {
        self.advance_char();
        Ok(kind)
    }

    fn scan_name(&mut self) -> TokenKind {
        let start = self.pos;
        while self.peek().is_some_and(is_name_continue) {
            self.advance_char();
        }
        let text = std::str::from_utf8(&self.source[start..self.pos]).unwrap_or("");
        if let Some(keyword) = TokenKind::keyword_from_str(text) {
            keyword
        } else {
            TokenKind::Name(self.strings.intern(text.as_bytes()))
        }
    }

    fn scan_string(&mut self, span: Span) -> Result<TokenKind, ScanError> {
        let quote = self.advance_char().expect("string quote");
        let mut bytes = Vec::new();
        loop {
            match self.peek() {
                None | Some(b'\n') | Some(b'\r') => {
                    return Err(self.error(span, "unterminated string"));
                }
                Some(b'\\') => {
                    self.advance_char();
                    let esc = self
                        .advance_char()
                        .ok_or_else(|| self.error(span, "unterminated string"))?;
                    match esc {
                        b'n' => bytes.push(b'\n'),
                        b't' => bytes.push(b'\t'),
                        b'r' => bytes.push(b'\r'),
                        b'0' => bytes.push(0),
                        b'\\' => bytes.push(b'\\'),
                        b'"' => bytes.push(b'"'),
                        b'\'' => bytes.push(b'\''),
                        _ => {
                            return Err(self.error(
                                span,
                                format!("invalid escape sequence '\\{}'", esc as char),
                            ));
                        }
                    }
                }
                Some(ch) if ch == quote => {
                    self.advance_char();
                    return Ok(TokenKind::Str(self.strings.intern(&bytes)));
                }
                Some(ch) => {
                    self.advance_char();
                    bytes.push(ch);
                }
            }
        }
    }

    fn scan_number(&mut self, span: Span) -> Result<TokenKind, ScanError> {
        if self.peek() == Some(b'0') {
            match self.peek_at(1) {
                Some(b'x') | Some(b'X') => return self.scan_radix(span, 16),
                Some(b'o') | Some(b'O') => return self.scan_radix(span, 8),
                Some(b'b') | Some(b'B') => return self.scan_radix(span, 2),
                _ => {}
            }
        }
        self.scan_decimal(span)
    }

    fn scan_radix(&mut self, span: Span, radix: u32) -> Result<TokenKind, ScanError> {
        self.advance_char(); // 0
        self.advance_char(); // x/o/b
        let digits_start = self.pos;
        while self
            .peek()
            .is_some_and(|c| (c as char).is_digit(radix))
        {
            self.advance_char();
        }
        if self.pos == digits_start {
            return Err(self.error(span, "malformed number: missing digits after base prefix"));
        }
        let text = std::str::from_utf8(&self.source[digits_start..self.pos]).unwrap();
        self.reject_trailing_name(span)?;
        match u64::from_str_radix(text, radix) {
            Ok(n) => Ok(TokenKind::Number(n as f64)),
            Err(_) => Err(self.error(span, format!("malformed number near '{text}'"))),
        }
    }

    fn scan_decimal(&mut self, span: Span) -> Result<TokenKind, ScanError> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance_char();
        }
        if self.peek() == Some(b'.') && self.peek_at(1) != Some(b'.') {
            self.advance_char();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance_char();
            }
        }
        self.scan_exponent(span)?;
        self.finish_decimal(start, span)
    }

    fn scan_decimal_after_dot(&mut self, span: Span) -> Result<TokenKind, ScanError> {
        // The dot is already consumed; pos - 1 points at it.
        let start = self.pos - 1;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance_char();
        }
        self.scan_exponent(span)?;
        self.finish_decimal(start, span)
    }

    fn scan_exponent(&mut self, span: Span) -> Result<(), ScanError> {
        if matches!(self.peek(), Some(b'e') | Some(b'E')) {
            self.advance_char();
            if matches!(self.peek(), Some(b'+') | Some(b'-')) {
                self.advance_char();
            }
            let exp_start = self.pos;
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance_char();
            }
            if self.pos == exp_start {
                return Err(self.error(span, "malformed number: expected exponent digits"));
            }
        }
        Ok(())
    }

    fn finish_decimal(&mut self, start: usize, span: Span) -> Result<TokenKind, ScanError> {
        self.reject_trailing_name(span)?;
        let text = std::str::from_utf8(&self.source[start..self.pos]).unwrap();
        match text.parse::<f64>() {
            Ok(n) => Ok(TokenKind::Number(n)),
            Err(_) => Err(self.error(span, format!("malformed number near '{text}'"))),
        }
    }

    /// A number immediately followed by a name character is malformed.
    fn reject_trailing_name(&mut self, span: Span) -> Result<(), ScanError> {
        if self.peek().is_some_and(|c| c.is_ascii_alphabetic() || c == b'_') {
            let bad_start = self.pos;
            while self.peek().is_some_and(is_name_continue) {
                self.advance_char();
            }
            let text = std::str::from_utf8(&self.source[bad_start..self.pos]).unwrap_or("?");
            return Err(self.error(span, format!("malformed number near '{text}'")));
        }
        Ok(())
    }
}

fn is_name_start(ch: u8) -> bool {
    ch.is_ascii_alphabetic() || ch == b'_'
}

fn is_name_continue(ch: u8) -> bool {
    ch.is_ascii_alphanumeric() || ch == b'_'
}
