//! Sans-I/O response parser.
//!
//! The [`lexer`] tokenizes a complete response buffer and [`response`]
//! builds typed responses from the tokens. Neither touches the network.
//!
//! ```
//! use mailsweep_imap::parser::{Response, ResponseParser, UntaggedResponse};
//!
//! let response = ResponseParser::parse(b"* 42 EXISTS\r\n").unwrap();
//! assert_eq!(response, Response::Untagged(UntaggedResponse::Exists(42)));
//! ```

pub mod lexer;
pub mod response;

pub use lexer::{Lexer, Token};
pub use response::{Address, Envelope, FetchItem, Response, ResponseParser, UntaggedResponse};
