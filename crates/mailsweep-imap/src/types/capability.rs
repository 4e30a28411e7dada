//! Server capabilities and response status.

/// Status of a tagged or untagged status response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Command completed.
    Ok,
    /// Command refused (operational failure).
    No,
    /// Command rejected (syntax or protocol failure).
    Bad,
    /// Greeting for a pre-authenticated connection.
    PreAuth,
    /// Server is closing the connection.
    Bye,
}

impl Status {
    /// Returns true for `OK` and `PREAUTH`.
    #[must_use]
    pub fn is_ok(self) -> bool {
        matches!(self, Self::Ok | Self::PreAuth)
    }
}

/// A capability advertised by the server.
///
/// Only capabilities that change how bulk mutations are planned get their
/// own variant; everything else is kept verbatim in `Unknown`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Capability {
    /// `IMAP4rev1` (RFC 3501)
    Imap4Rev1,
    /// `IMAP4rev2` (RFC 9051)
    Imap4Rev2,
    /// UIDPLUS (RFC 4315): enables `UID EXPUNGE`.
    UidPlus,
    /// MOVE (RFC 6851)
    Move,
    /// LITERAL+ (RFC 7888)
    LiteralPlus,
    /// STARTTLS
    StartTls,
    /// LOGIN is disabled on this connection.
    LoginDisabled,
    /// SASL mechanism, e.g. `AUTH=XOAUTH2`.
    Auth(String),
    /// SPECIAL-USE mailboxes (RFC 6154)
    SpecialUse,
    /// `X-GM-EXT-1`: Gmail labels, message and thread ids.
    GmailExt1,
    /// Anything else.
    Unknown(String),
}

impl Capability {
    /// Parses a capability atom.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        let upper = s.to_ascii_uppercase();
        match upper.as_str() {
            "IMAP4REV1" => Self::Imap4Rev1,
            "IMAP4REV2" => Self::Imap4Rev2,
            "UIDPLUS" => Self::UidPlus,
            "MOVE" => Self::Move,
            "LITERAL+" => Self::LiteralPlus,
            "STARTTLS" => Self::StartTls,
            "LOGINDISABLED" => Self::LoginDisabled,
            "SPECIAL-USE" => Self::SpecialUse,
            "X-GM-EXT-1" => Self::GmailExt1,
            _ if upper.starts_with("AUTH=") => Self::Auth(s[5..].to_ascii_uppercase()),
            _ => Self::Unknown(s.to_string()),
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Imap4Rev1 => f.write_str("IMAP4rev1"),
            Self::Imap4Rev2 => f.write_str("IMAP4rev2"),
            Self::UidPlus => f.write_str("UIDPLUS"),
            Self::Move => f.write_str("MOVE"),
            Self::LiteralPlus => f.write_str("LITERAL+"),
            Self::StartTls => f.write_str("STARTTLS"),
            Self::LoginDisabled => f.write_str("LOGINDISABLED"),
            Self::Auth(mech) => write!(f, "AUTH={mech}"),
            Self::SpecialUse => f.write_str("SPECIAL-USE"),
            Self::GmailExt1 => f.write_str("X-GM-EXT-1"),
            Self::Unknown(s) => f.write_str(s),
        }
    }
}
