//! Parser helper functions.

use crate::parser::lexer::{Lexer, Token};
use crate::types::{
    Capability, Flag, Flags, ListResponse, Mailbox, MailboxAttribute, ResponseCode, Uid,
    UidValidity,
};
use crate::{Error, Result};

/// Parses a bracketed response code. The lexer must sit on `[`.
pub fn parse_response_code(lexer: &mut Lexer<'_>) -> Result<ResponseCode> {
    lexer.expect(Token::LBracket)?;

    let atom = lexer.read_atom()?;
    let code = match atom.to_ascii_uppercase().as_str() {
        "ALERT" => ResponseCode::Alert,
        "READ-ONLY" => ResponseCode::ReadOnly,
        "READ-WRITE" => ResponseCode::ReadWrite,
        "TRYCREATE" => ResponseCode::TryCreate,
        "NONEXISTENT" => ResponseCode::Nonexistent,
        "AUTHENTICATIONFAILED" => ResponseCode::AuthenticationFailed,
        "UNAVAILABLE" => ResponseCode::Unavailable,
        "LIMIT" => ResponseCode::Limit,
        "THROTTLED" => ResponseCode::Throttled,
        "UIDNEXT" => {
            lexer.expect_space()?;
            let n = lexer.read_number()?;
            ResponseCode::UidNext(Uid::new(n).ok_or_else(|| lexer.error("UIDNEXT of 0"))?)
        }
        "UIDVALIDITY" => {
            lexer.expect_space()?;
            let n = lexer.read_number()?;
            ResponseCode::UidValidity(
                UidValidity::new(n).ok_or_else(|| lexer.error("UIDVALIDITY of 0"))?,
            )
        }
        "UNSEEN" => {
            lexer.expect_space()?;
            ResponseCode::Unseen(lexer.read_number()?)
        }
        "CAPABILITY" => ResponseCode::Capability(parse_capability_data(lexer)?),
        "PERMANENTFLAGS" => {
            lexer.expect_space()?;
            ResponseCode::PermanentFlags(parse_flag_list(lexer)?.iter().cloned().collect())
        }
        "COPYUID" => {
            lexer.expect_space()?;
            let n = lexer.read_number()?;
            let uidvalidity = UidValidity::new(n).ok_or_else(|| lexer.error("COPYUID of 0"))?;
            lexer.expect_space()?;
            let source = lexer.read_astring()?;
            lexer.expect_space()?;
            let dest = lexer.read_astring()?;
            ResponseCode::CopyUid {
                uidvalidity,
                source,
                dest,
            }
        }
        other => ResponseCode::Unknown(other.to_string()),
    };

    skip_past_bracket(lexer)?;
    Ok(code)
}

fn skip_past_bracket(lexer: &mut Lexer<'_>) -> Result<()> {
    while let Some(b) = lexer.peek() {
        lexer.advance();
        if b == b']' {
            return Ok(());
        }
    }
    Err(lexer.error("unterminated response code"))
}

/// Parses the space-separated atoms following `CAPABILITY`.
pub fn parse_capability_data(lexer: &mut Lexer<'_>) -> Result<Vec<Capability>> {
    let mut caps = Vec::new();
    while lexer.eat(b' ') {
        if let Token::Atom(s) = lexer.next_token()? {
            caps.push(Capability::parse(s));
        }
    }
    Ok(caps)
}

/// Parses a parenthesized flag list.
pub fn parse_flag_list(lexer: &mut Lexer<'_>) -> Result<Flags> {
    lexer.expect(Token::LParen)?;
    let mut flags = Flags::new();
    loop {
        match lexer.next_token()? {
            Token::RParen => return Ok(flags),
            Token::Space => {}
            Token::Atom(s) => flags.insert(Flag::parse(s)),
            // Some servers advertise `\*` in PERMANENTFLAGS.
            Token::Asterisk => {}
            token => return Err(lexer.error(&format!("unexpected {token:?} in flag list"))),
        }
    }
}

/// Parses a parenthesized list of astrings, as used by `X-GM-LABELS`.
pub fn parse_string_list(lexer: &mut Lexer<'_>) -> Result<Vec<String>> {
    lexer.expect(Token::LParen)?;
    let mut out = Vec::new();
    loop {
        match lexer.next_token()? {
            Token::RParen => return Ok(out),
            Token::Space => {}
            Token::Atom(s) => out.push(s.to_string()),
            Token::Number(n) => out.push(n.to_string()),
            Token::QuotedString(s) => out.push(s),
            Token::Literal(data) => out.push(String::from_utf8_lossy(&data).into_owned()),
            token => return Err(lexer.error(&format!("unexpected {token:?} in string list"))),
        }
    }
}

/// Parses the body of a LIST response.
pub fn parse_list_response(lexer: &mut Lexer<'_>) -> Result<ListResponse> {
    let attributes = parse_flag_list(lexer)?
        .iter()
        .map(|f| MailboxAttribute::parse(f.as_str()))
        .collect();
    lexer.expect_space()?;

    let delimiter = match lexer.next_token()? {
        Token::Nil => None,
        Token::QuotedString(s) => s.chars().next(),
        token => return Err(lexer.error(&format!("expected delimiter, got {token:?}"))),
    };
    lexer.expect_space()?;

    let name = lexer.read_astring()?;
    Ok(ListResponse {
        attributes,
        delimiter,
        mailbox: Mailbox::new(name),
    })
}

/// Parses the numbers following `SEARCH`.
///
/// A trailing `(MODSEQ n)` from CONDSTORE servers is ignored.
pub fn parse_search_response(lexer: &mut Lexer<'_>) -> Result<Vec<u32>> {
    let mut nums = Vec::new();
    while lexer.eat(b' ') {
        match lexer.next_token()? {
            Token::Number(n) if n > 0 => nums.push(n),
            Token::LParen | Token::Crlf | Token::Eof => break,
            token => return Err(lexer.error(&format!("unexpected {token:?} in SEARCH"))),
        }
    }
    Ok(nums)
}

/// Reads the rest of the line as text and consumes the CRLF.
pub fn read_text_until_crlf(lexer: &mut Lexer<'_>) -> String {
    let remaining = lexer.remaining();
    let end = remaining
        .windows(2)
        .position(|w| w == b"\r\n")
        .unwrap_or(remaining.len());
    lexer.skip(end + 2);
    String::from_utf8_lossy(&remaining[..end]).into_owned()
}

/// Builds a parse error without a lexer at hand.
pub fn parse_error(position: usize, message: impl Into<String>) -> Error {
    Error::Parse {
        position,
        message: message.into(),
    }
}
