//! Response parser.
//!
//! Turns one complete response (a line plus any literals it announced)
//! into a [`Response`].

#![allow(clippy::missing_errors_doc)]

mod fetch;
mod helpers;
mod types;

pub use types::{Address, Envelope, FetchItem, UntaggedResponse};

use crate::parser::lexer::{Lexer, Token};
use crate::types::{ResponseCode, SeqNum, Status, Tag};
use crate::Result;

use helpers::{
    parse_capability_data, parse_error, parse_flag_list, parse_list_response,
    parse_response_code, parse_search_response, read_text_until_crlf,
};

/// A parsed server response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Command completion.
    Tagged {
        /// Tag of the completed command.
        tag: Tag,
        /// Completion status.
        status: Status,
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// Server data.
    Untagged(UntaggedResponse),
    /// Continuation request (`+ ...`).
    Continuation {
        /// Text after the `+`, if any.
        text: Option<String>,
    },
}

/// Stateless response parser.
pub struct ResponseParser;

impl ResponseParser {
    /// Parses one complete response.
    pub fn parse(input: &[u8]) -> Result<Response> {
        let mut lexer = Lexer::new(input);

        match lexer.next_token()? {
            Token::Asterisk => Self::parse_untagged(&mut lexer).map(Response::Untagged),
            Token::Plus => {
                lexer.eat(b' ');
                let text = read_text_until_crlf(&mut lexer);
                Ok(Response::Continuation {
                    text: (!text.is_empty()).then_some(text),
                })
            }
            Token::Atom(tag) => {
                let tag = Tag::new(tag);
                lexer.expect_space()?;
                let status = Self::parse_status(&mut lexer)?;
                let (code, text) = Self::parse_resp_text(&mut lexer)?;
                Ok(Response::Tagged {
                    tag,
                    status,
                    code,
                    text,
                })
            }
            token => Err(parse_error(0, format!("expected *, + or tag, got {token:?}"))),
        }
    }

    fn parse_untagged(lexer: &mut Lexer<'_>) -> Result<UntaggedResponse> {
        lexer.expect_space()?;

        match lexer.next_token()? {
            Token::Number(n) => Self::parse_message_data(lexer, n),
            Token::Atom(keyword) => {
                let upper = keyword.to_ascii_uppercase();
                match upper.as_str() {
                    "OK" | "NO" | "BAD" | "PREAUTH" | "BYE" => {
                        let (code, text) = Self::parse_resp_text(lexer)?;
                        Ok(match upper.as_str() {
                            "OK" => UntaggedResponse::Ok { code, text },
                            "NO" => UntaggedResponse::No { code, text },
                            "BAD" => UntaggedResponse::Bad { code, text },
                            "PREAUTH" => UntaggedResponse::PreAuth { code, text },
                            _ => UntaggedResponse::Bye { code, text },
                        })
                    }
                    "CAPABILITY" => Ok(UntaggedResponse::Capability(parse_capability_data(lexer)?)),
                    "FLAGS" => {
                        lexer.expect_space()?;
                        Ok(UntaggedResponse::Flags(parse_flag_list(lexer)?))
                    }
                    "LIST" => {
                        lexer.expect_space()?;
                        Ok(UntaggedResponse::List(parse_list_response(lexer)?))
                    }
                    "SEARCH" => Ok(UntaggedResponse::Search(parse_search_response(lexer)?)),
                    _ => Ok(UntaggedResponse::Other(upper)),
                }
            }
            token => Err(lexer.error(&format!("unexpected {token:?} in untagged response"))),
        }
    }

    fn parse_message_data(lexer: &mut Lexer<'_>, n: u32) -> Result<UntaggedResponse> {
        lexer.expect_space()?;
        let keyword = lexer.read_atom()?.to_ascii_uppercase();
        let seq = || SeqNum::new(n).ok_or_else(|| parse_error(0, "sequence number 0"));

        match keyword.as_str() {
            "EXISTS" => Ok(UntaggedResponse::Exists(n)),
            "RECENT" => Ok(UntaggedResponse::Recent(n)),
            "EXPUNGE" => Ok(UntaggedResponse::Expunge(seq()?)),
            "FETCH" => {
                let seq = seq()?;
                lexer.expect_space()?;
                let items = fetch::parse_fetch_response(lexer)?;
                Ok(UntaggedResponse::Fetch { seq, items })
            }
            _ => Ok(UntaggedResponse::Other(keyword)),
        }
    }

    fn parse_status(lexer: &mut Lexer<'_>) -> Result<Status> {
        let s = lexer.read_atom()?;
        match s.to_ascii_uppercase().as_str() {
            "OK" => Ok(Status::Ok),
            "NO" => Ok(Status::No),
            "BAD" => Ok(Status::Bad),
            "PREAUTH" => Ok(Status::PreAuth),
            "BYE" => Ok(Status::Bye),
            _ => Err(lexer.error(&format!("invalid status {s}"))),
        }
    }

    /// Parses `[code] text` after a status keyword. Tolerates servers that
    /// send a bare status with no text.
    fn parse_resp_text(lexer: &mut Lexer<'_>) -> Result<(Option<ResponseCode>, String)> {
        lexer.eat(b' ');
        let code = if lexer.peek() == Some(b'[') {
            Some(parse_response_code(lexer)?)
        } else {
            None
        };
        lexer.eat(b' ');
        Ok((code, read_text_until_crlf(lexer)))
    }
}
