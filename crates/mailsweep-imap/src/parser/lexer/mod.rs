//! Tokenizer for server responses.
//!
//! Works over a complete response buffer (as assembled by the framed
//! stream, literals included) and never performs I/O.

#![allow(clippy::missing_errors_doc)]

mod token;

pub use token::Token;

use crate::{Error, Result};

/// Cursor over one response buffer.
pub struct Lexer<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    /// Creates a lexer positioned at the start of `input`.
    #[must_use]
    pub const fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    /// Current byte offset.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// Unconsumed input.
    #[must_use]
    pub fn remaining(&self) -> &'a [u8] {
        &self.input[self.pos..]
    }

    /// Returns true once all input is consumed.
    #[must_use]
    pub const fn is_eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    /// Current byte, if any.
    #[must_use]
    pub fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    /// Consumes one byte.
    pub fn advance(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        Some(byte)
    }

    /// Consumes up to `n` bytes.
    pub fn skip(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.input.len());
    }

    /// Consumes the current byte if it equals `byte`.
    pub fn eat(&mut self, byte: u8) -> bool {
        if self.peek() == Some(byte) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Consumes bytes while `pred` holds and returns them.
    fn take_while(&mut self, pred: impl Fn(u8) -> bool) -> &'a [u8] {
        let start = self.pos;
        while self.peek().is_some_and(&pred) {
            self.pos += 1;
        }
        &self.input[start..self.pos]
    }

    /// Reads the next token.
    pub fn next_token(&mut self) -> Result<Token<'a>> {
        let Some(byte) = self.peek() else {
            return Ok(Token::Eof);
        };

        let single = match byte {
            b' ' => Some(Token::Space),
            b'(' => Some(Token::LParen),
            b')' => Some(Token::RParen),
            b'[' => Some(Token::LBracket),
            b']' => Some(Token::RBracket),
            b'*' => Some(Token::Asterisk),
            b'+' => Some(Token::Plus),
            _ => None,
        };
        if let Some(token) = single {
            self.pos += 1;
            return Ok(token);
        }

        match byte {
            b'\r' => {
                if self.remaining().starts_with(b"\r\n") {
                    self.pos += 2;
                    Ok(Token::Crlf)
                } else {
                    Err(self.error("CR not followed by LF"))
                }
            }
            b'"' => self.quoted(),
            b'{' => self.literal(),
            _ if is_atom_char(byte) => self.atom(),
            _ => Err(self.error(&format!("unexpected byte {byte:#04x}"))),
        }
    }

    fn quoted(&mut self) -> Result<Token<'a>> {
        self.pos += 1;
        let mut out = Vec::new();
        loop {
            match self.advance() {
                Some(b'"') => break,
                Some(b'\\') => match self.advance() {
                    Some(c @ (b'"' | b'\\')) => out.push(c),
                    Some(c) => return Err(self.error(&format!("invalid escape \\{}", c as char))),
                    None => return Err(self.error("unterminated quoted string")),
                },
                Some(c) => out.push(c),
                None => return Err(self.error("unterminated quoted string")),
            }
        }
        // Servers occasionally put raw 8-bit header bytes in quoted strings.
        Ok(Token::QuotedString(String::from_utf8_lossy(&out).into_owned()))
    }

    fn literal(&mut self) -> Result<Token<'a>> {
        self.pos += 1;
        let digits = self.take_while(|b| b.is_ascii_digit());
        // LITERAL+ / LITERAL- marker is only meaningful client-to-server.
        self.eat(b'+');
        if !self.eat(b'}') {
            return Err(self.error("malformed literal length"));
        }
        let size: usize = std::str::from_utf8(digits)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| self.error("invalid literal length"))?;

        if !self.remaining().starts_with(b"\r\n") {
            return Err(self.error("literal length not followed by CRLF"));
        }
        self.pos += 2;

        let Some(data) = self.input.get(self.pos..self.pos + size) else {
            return Err(self.error("truncated literal"));
        };
        self.pos += size;
        Ok(Token::Literal(data.to_vec()))
    }

    fn atom(&mut self) -> Result<Token<'a>> {
        let start = self.pos;
        let raw = self.take_while(is_atom_char);
        let s = std::str::from_utf8(raw).map_err(|_| Error::Parse {
            position: start,
            message: "atom is not UTF-8".to_string(),
        })?;

        if s.bytes().all(|b| b.is_ascii_digit())
            && let Ok(n) = s.parse::<u32>()
        {
            return Ok(Token::Number(n));
        }
        if s.eq_ignore_ascii_case("NIL") {
            return Ok(Token::Nil);
        }
        Ok(Token::Atom(s))
    }

    /// Builds a parse error at the current position.
    pub(crate) fn error(&self, message: &str) -> Error {
        Error::Parse {
            position: self.pos,
            message: message.to_string(),
        }
    }

    /// Consumes a token of the same kind as `expected`.
    #[allow(clippy::needless_pass_by_value)]
    pub fn expect(&mut self, expected: Token<'_>) -> Result<()> {
        let token = self.next_token()?;
        if std::mem::discriminant(&token) == std::mem::discriminant(&expected) {
            Ok(())
        } else {
            Err(self.error(&format!("expected {expected:?}, got {token:?}")))
        }
    }

    /// Consumes a single space.
    pub fn expect_space(&mut self) -> Result<()> {
        self.expect(Token::Space)
    }

    /// Reads an atom, quoted string or literal as a string.
    pub fn read_astring(&mut self) -> Result<String> {
        match self.next_token()? {
            Token::Atom(s) => Ok(s.to_string()),
            Token::Number(n) => Ok(n.to_string()),
            Token::QuotedString(s) => Ok(s),
            Token::Literal(data) => Ok(String::from_utf8_lossy(&data).into_owned()),
            token => Err(self.error(&format!("expected astring, got {token:?}"))),
        }
    }

    /// Reads `NIL` or a string.
    pub fn read_nstring(&mut self) -> Result<Option<String>> {
        match self.next_token()? {
            Token::Nil => Ok(None),
            Token::QuotedString(s) => Ok(Some(s)),
            Token::Literal(data) => Ok(Some(String::from_utf8_lossy(&data).into_owned())),
            token => Err(self.error(&format!("expected nstring, got {token:?}"))),
        }
    }

    /// Reads a number.
    pub fn read_number(&mut self) -> Result<u32> {
        match self.next_token()? {
            Token::Number(n) => Ok(n),
            token => Err(self.error(&format!("expected number, got {token:?}"))),
        }
    }

    /// Reads an unsigned 64-bit number, which lexes as an atom above `u32::MAX`.
    pub fn read_number64(&mut self) -> Result<u64> {
        match self.next_token()? {
            Token::Number(n) => Ok(u64::from(n)),
            Token::Atom(s) => s
                .parse()
                .map_err(|_| self.error(&format!("expected number, got {s}"))),
            token => Err(self.error(&format!("expected number, got {token:?}"))),
        }
    }

    /// Reads an atom.
    pub fn read_atom(&mut self) -> Result<&'a str> {
        match self.next_token()? {
            Token::Atom(s) => Ok(s),
            token => Err(self.error(&format!("expected atom, got {token:?}"))),
        }
    }
}

/// Returns true for bytes allowed in an atom.
///
/// `\` is accepted so that flags such as `\Seen` lex as one atom.
#[must_use]
pub const fn is_atom_char(b: u8) -> bool {
    matches!(b,
        0x21 | 0x23..=0x24 | 0x26..=0x27 | // ! # $ & '
        0x2B..=0x5A |                      // + , - . / digits : ; < = > ? @ A-Z
        0x5C |                             // backslash
        0x5E..=0x7A |                      // ^ _ ` a-z
        0x7C | 0x7E                        // | ~
    )
}
