//! Lexer tokens.

/// A token of server response grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token<'a> {
    /// Atom, borrowed from the input. Includes flag atoms like `\Seen`.
    Atom(&'a str),
    /// Quoted string with escapes resolved.
    QuotedString(String),
    /// Literal payload (`{n}\r\n` followed by n bytes).
    Literal(Vec<u8>),
    /// Number that fits in 32 bits. Larger digit runs lex as atoms.
    Number(u32),
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// Single space.
    Space,
    /// `*`
    Asterisk,
    /// `+`
    Plus,
    /// `NIL`, case-insensitive.
    Nil,
    /// `\r\n`
    Crlf,
    /// End of input.
    Eof,
}
