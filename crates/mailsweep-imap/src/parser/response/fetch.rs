//! FETCH response parsing.

use crate::parser::lexer::{Lexer, Token};
use crate::types::Uid;
use crate::Result;

use super::helpers::{parse_flag_list, parse_string_list};
use super::types::{Address, Envelope, FetchItem};

/// Parses the parenthesized data of a FETCH response.
///
/// Items this client never requests are skipped rather than rejected.
pub fn parse_fetch_response(lexer: &mut Lexer<'_>) -> Result<Vec<FetchItem>> {
    lexer.expect(Token::LParen)?;
    let mut items = Vec::new();

    loop {
        let name = match lexer.next_token()? {
            Token::RParen => return Ok(items),
            Token::Space => continue,
            Token::Atom(name) => name.to_ascii_uppercase(),
            token => return Err(lexer.error(&format!("unexpected {token:?} in FETCH"))),
        };

        match name.as_str() {
            "UID" => {
                lexer.expect_space()?;
                let n = lexer.read_number()?;
                let uid = Uid::new(n).ok_or_else(|| lexer.error("UID of 0 in FETCH"))?;
                items.push(FetchItem::Uid(uid));
            }
            "FLAGS" => {
                lexer.expect_space()?;
                items.push(FetchItem::Flags(parse_flag_list(lexer)?));
            }
            "INTERNALDATE" => {
                lexer.expect_space()?;
                if let Some(date) = lexer.read_nstring()? {
                    items.push(FetchItem::InternalDate(date));
                }
            }
            "RFC822.SIZE" => {
                lexer.expect_space()?;
                items.push(FetchItem::Rfc822Size(lexer.read_number()?));
            }
            "ENVELOPE" => {
                lexer.expect_space()?;
                items.push(FetchItem::Envelope(Box::new(parse_envelope(lexer)?)));
            }
            "X-GM-LABELS" => {
                lexer.expect_space()?;
                items.push(FetchItem::GmailLabels(parse_string_list(lexer)?));
            }
            "BODY" | "BODY.PEEK" if lexer.peek() == Some(b'[') => {
                let section = parse_section(lexer)?;
                lexer.expect_space()?;
                let data = match lexer.next_token()? {
                    Token::Literal(d) => Some(d),
                    Token::QuotedString(s) => Some(s.into_bytes()),
                    _ => None,
                };
                items.push(FetchItem::Body { section, data });
            }
            _ => skip_value(lexer)?,
        }
    }
}

/// Parses `[section]` and an optional `<origin>` after BODY.
///
/// The section is read raw because it may contain a parenthesized
/// header-field list.
fn parse_section(lexer: &mut Lexer<'_>) -> Result<Option<String>> {
    if !lexer.eat(b'[') {
        return Ok(None);
    }
    let rest = lexer.remaining();
    let Some(end) = rest.iter().position(|&b| b == b']') else {
        return Err(lexer.error("unterminated body section"));
    };
    let section = String::from_utf8_lossy(&rest[..end]).into_owned();
    lexer.skip(end + 1);

    if lexer.eat(b'<') {
        while lexer.peek().is_some_and(|b| b != b'>') {
            lexer.advance();
        }
        lexer.eat(b'>');
    }

    Ok((!section.is_empty()).then_some(section))
}

/// Parses an ENVELOPE structure.
pub fn parse_envelope(lexer: &mut Lexer<'_>) -> Result<Envelope> {
    lexer.expect(Token::LParen)?;

    let date = lexer.read_nstring()?;
    lexer.expect_space()?;
    let subject = lexer.read_nstring()?;
    lexer.expect_space()?;

    let mut lists: [Vec<Address>; 6] = Default::default();
    for list in &mut lists {
        *list = parse_address_list(lexer)?;
        lexer.expect_space()?;
    }
    let [from, sender, reply_to, to, cc, bcc] = lists;

    let in_reply_to = lexer.read_nstring()?;
    lexer.expect_space()?;
    let message_id = lexer.read_nstring()?;
    lexer.expect(Token::RParen)?;

    Ok(Envelope {
        date,
        subject,
        from,
        sender,
        reply_to,
        to,
        cc,
        bcc,
        in_reply_to,
        message_id,
    })
}

fn parse_address_list(lexer: &mut Lexer<'_>) -> Result<Vec<Address>> {
    match lexer.next_token()? {
        Token::Nil => Ok(Vec::new()),
        Token::LParen => {
            let mut addresses = Vec::new();
            loop {
                match lexer.peek() {
                    Some(b')') => {
                        lexer.advance();
                        return Ok(addresses);
                    }
                    Some(b'(') => addresses.push(parse_address(lexer)?),
                    Some(b' ') => {
                        lexer.advance();
                    }
                    _ => return Err(lexer.error("malformed address list")),
                }
            }
        }
        token => Err(lexer.error(&format!("expected address list, got {token:?}"))),
    }
}

fn parse_address(lexer: &mut Lexer<'_>) -> Result<Address> {
    lexer.expect(Token::LParen)?;
    let name = lexer.read_nstring()?;
    lexer.expect_space()?;
    let adl = lexer.read_nstring()?;
    lexer.expect_space()?;
    let mailbox = lexer.read_nstring()?;
    lexer.expect_space()?;
    let host = lexer.read_nstring()?;
    lexer.expect(Token::RParen)?;

    Ok(Address {
        name,
        adl,
        mailbox,
        host,
    })
}

/// Skips one value of an unrequested FETCH item (`X-GM-MSGID 123`,
/// `BODYSTRUCTURE (...)`, `MODSEQ (5)`).
fn skip_value(lexer: &mut Lexer<'_>) -> Result<()> {
    lexer.eat(b' ');
    let mut depth = 0usize;
    loop {
        match lexer.next_token()? {
            Token::LParen => depth += 1,
            Token::RParen if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    return Ok(());
                }
            }
            Token::RParen | Token::Eof | Token::Crlf => {
                return Err(lexer.error("unbalanced FETCH item"));
            }
            Token::Space if depth == 0 => return Ok(()),
            _ if depth == 0 => return Ok(()),
            _ => {}
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn parse(input: &[u8]) -> Vec<FetchItem> {
        parse_fetch_response(&mut Lexer::new(input)).unwrap()
    }

    #[test]
    fn uid_flags_size_date() {
        let items = parse(
            b"(UID 4827 FLAGS (\\Seen $Promotions) RFC822.SIZE 20811 INTERNALDATE \"03-Feb-2021 09:15:02 +0000\")",
        );
        assert_eq!(items.len(), 4);
        assert_eq!(items[0], FetchItem::Uid(Uid::new(4827).unwrap()));
        assert!(matches!(&items[1], FetchItem::Flags(f) if f.len() == 2));
        assert_eq!(items[2], FetchItem::Rfc822Size(20811));
        assert_eq!(
            items[3],
            FetchItem::InternalDate("03-Feb-2021 09:15:02 +0000".to_string())
        );
    }

    #[test]
    fn uid_zero_rejected() {
        assert!(parse_fetch_response(&mut Lexer::new(b"(UID 0)")).is_err());
    }

    #[test]
    fn gmail_labels_and_skipped_ids() {
        let items = parse(
            b"(X-GM-THRID 1278455344230334865 X-GM-LABELS (\\Inbox \"Promotions\") UID 9)",
        );
        assert_eq!(
            items,
            vec![
                FetchItem::GmailLabels(vec!["\\Inbox".to_string(), "Promotions".to_string()]),
                FetchItem::Uid(Uid::new(9).unwrap()),
            ]
        );
    }

    #[test]
    fn empty_gmail_labels() {
        assert_eq!(parse(b"(X-GM-LABELS ())"), vec![FetchItem::GmailLabels(vec![])]);
    }

    #[test]
    fn header_fields_section() {
        let header = b"List-Id: Rust Users <rust-users.example.org>\r\n\r\n";
        let mut input = format!("(BODY[HEADER.FIELDS (LIST-ID)] {{{}}}\r\n", header.len()).into_bytes();
        input.extend_from_slice(header);
        input.extend_from_slice(b" UID 3)");

        let items = parse(&input);
        assert_eq!(items.len(), 2);
        match &items[0] {
            FetchItem::Body { section, data } => {
                assert_eq!(section.as_deref(), Some("HEADER.FIELDS (LIST-ID)"));
                assert_eq!(data.as_deref(), Some(&header[..]));
            }
            other => panic!("expected body section, got {other:?}"),
        }
    }

    #[test]
    fn skips_nested_structures() {
        let items = parse(b"(BODYSTRUCTURE (\"TEXT\" \"PLAIN\" NIL NIL NIL \"7BIT\" 10 1) MODSEQ (12) UID 5)");
        assert_eq!(items, vec![FetchItem::Uid(Uid::new(5).unwrap())]);
    }

    #[test]
    fn envelope_sender_and_subject() {
        let data = b"(\"Tue, 2 Feb 2021 10:00:00 +0000\" \"Weekly deals\" ((\"Shop\" NIL \"deals\" \"shop.example\")) NIL NIL NIL NIL NIL NIL \"<id@shop.example>\")";
        let envelope = parse_envelope(&mut Lexer::new(data)).unwrap();
        assert_eq!(envelope.subject.as_deref(), Some("Weekly deals"));
        assert_eq!(
            envelope.from[0].email().as_deref(),
            Some("deals@shop.example")
        );
        assert!(envelope.sender.is_empty());
        assert_eq!(envelope.message_id.as_deref(), Some("<id@shop.example>"));
    }
}
