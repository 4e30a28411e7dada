//! Command serialization helpers.

use crate::types::{Flag, Mailbox};

use super::types::{FetchAttribute, SearchCriteria, StoreAction};

/// Writes an astring (atom or quoted string).
pub fn write_astring(buf: &mut Vec<u8>, s: &str) {
    if s.is_empty() || s.bytes().any(needs_quoting) {
        write_quoted(buf, s);
    } else {
        buf.extend_from_slice(s.as_bytes());
    }
}

fn write_quoted(buf: &mut Vec<u8>, s: &str) {
    buf.push(b'"');
    for b in s.bytes() {
        if b == b'"' || b == b'\\' {
            buf.push(b'\\');
        }
        buf.push(b);
    }
    buf.push(b'"');
}

/// Writes a mailbox name.
pub fn write_mailbox(buf: &mut Vec<u8>, mailbox: &Mailbox) {
    write_astring(buf, mailbox.as_str());
}

const fn needs_quoting(b: u8) -> bool {
    matches!(
        b,
        b' ' | b'"' | b'\\' | b'(' | b')' | b'{' | b'%' | b'*' | b']'
    ) || b < 0x20
        || b == 0x7F
}

/// Writes a Gmail label.
///
/// System labels such as `\Inbox` and `\Trash` go out as bare flag atoms;
/// user labels are astrings.
pub fn write_label(buf: &mut Vec<u8>, label: &str) {
    match label.strip_prefix('\\') {
        Some(rest) if !rest.is_empty() && !rest.bytes().any(needs_quoting) => {
            buf.extend_from_slice(label.as_bytes());
        }
        _ => write_astring(buf, label),
    }
}

fn write_flag(buf: &mut Vec<u8>, flag: &Flag) {
    match flag {
        Flag::Keyword(k) if k.bytes().any(needs_quoting) => write_quoted(buf, k),
        _ => buf.extend_from_slice(flag.as_str().as_bytes()),
    }
}

/// Writes a parenthesized list with a per-item writer.
fn write_list<T>(buf: &mut Vec<u8>, items: &[T], mut write: impl FnMut(&mut Vec<u8>, &T)) {
    buf.push(b'(');
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            buf.push(b' ');
        }
        write(buf, item);
    }
    buf.push(b')');
}

/// Writes FETCH items. A single item goes out bare, several are parenthesized.
pub fn write_fetch_items(buf: &mut Vec<u8>, items: &[FetchAttribute]) {
    if let [single] = items {
        write_fetch_attribute(buf, single);
    } else {
        write_list(buf, items, write_fetch_attribute);
    }
}

fn write_fetch_attribute(buf: &mut Vec<u8>, attr: &FetchAttribute) {
    match attr {
        FetchAttribute::Uid => buf.extend_from_slice(b"UID"),
        FetchAttribute::Flags => buf.extend_from_slice(b"FLAGS"),
        FetchAttribute::InternalDate => buf.extend_from_slice(b"INTERNALDATE"),
        FetchAttribute::Rfc822Size => buf.extend_from_slice(b"RFC822.SIZE"),
        FetchAttribute::Envelope => buf.extend_from_slice(b"ENVELOPE"),
        FetchAttribute::GmailLabels => buf.extend_from_slice(b"X-GM-LABELS"),
        FetchAttribute::HeaderFields(fields) => {
            buf.extend_from_slice(b"BODY.PEEK[HEADER.FIELDS ");
            write_list(buf, fields, |buf, field| {
                buf.extend_from_slice(field.to_ascii_uppercase().as_bytes());
            });
            buf.push(b']');
        }
    }
}

/// Writes a STORE action.
pub fn write_store_action(buf: &mut Vec<u8>, action: &StoreAction, silent: bool) {
    let item: &[u8] = match action {
        StoreAction::AddFlags(_) => b"+FLAGS",
        StoreAction::RemoveFlags(_) => b"-FLAGS",
        StoreAction::AddLabels(_) => b"+X-GM-LABELS",
        StoreAction::RemoveLabels(_) => b"-X-GM-LABELS",
    };
    buf.extend_from_slice(item);
    if silent {
        buf.extend_from_slice(b".SILENT");
    }
    buf.push(b' ');

    match action {
        StoreAction::AddFlags(flags) | StoreAction::RemoveFlags(flags) => {
            write_list(buf, flags, write_flag);
        }
        StoreAction::AddLabels(labels) | StoreAction::RemoveLabels(labels) => {
            write_list(buf, labels, |buf, label| write_label(buf, label));
        }
    }
}

/// Writes SEARCH criteria.
pub fn write_search_criteria(buf: &mut Vec<u8>, criteria: &SearchCriteria) {
    match criteria {
        SearchCriteria::All => buf.extend_from_slice(b"ALL"),
        SearchCriteria::Deleted => buf.extend_from_slice(b"DELETED"),
        SearchCriteria::Uid(set) => {
            buf.extend_from_slice(b"UID ");
            buf.extend_from_slice(set.to_string().as_bytes());
        }
        SearchCriteria::Not(inner) => {
            buf.extend_from_slice(b"NOT ");
            write_search_criteria(buf, inner);
        }
        SearchCriteria::And(all) => {
            for (i, c) in all.iter().enumerate() {
                if i > 0 {
                    buf.push(b' ');
                }
                write_search_criteria(buf, c);
            }
        }
    }
}
