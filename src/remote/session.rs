//! The protocol operations the archiver needs, independent of any IMAP
//! library.
//!
//! [`Connector`] dials and authenticates; [`MailSession`] is one
//! authenticated session. The archiver only ever talks to these traits, so
//! tests drive it with an in-memory server.

use crate::config::Account;
use crate::error::Result;
use crate::model::message::FetchedItem;

/// What to fetch in one round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchTarget {
    /// A single message by UID (`UID FETCH <uid>`).
    Uid(u32),
    /// A contiguous, inclusive range of sequence numbers (`FETCH a:b`).
    Sequence { start: u32, end: u32 },
}

impl FetchTarget {
    /// The sequence-set string sent on the wire.
    pub fn to_set(self) -> String {
        match self {
            Self::Uid(uid) => uid.to_string(),
            Self::Sequence { start, end } if start == end => start.to_string(),
            Self::Sequence { start, end } => format!("{start}:{end}"),
        }
    }
}

/// Message data items requested alongside the UID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchItems {
    pub envelope: bool,
    pub size: bool,
    pub body: bool,
}

impl FetchItems {
    /// Everything needed to archive a message.
    pub const ARCHIVE: FetchItems = FetchItems {
        envelope: true,
        size: true,
        body: true,
    };

    /// The parenthesized item list for a FETCH command.
    ///
    /// The body is requested with `BODY.PEEK[]` so archiving never sets `\Seen`.
    pub fn query(&self) -> String {
        let mut items = vec!["UID"];
        if self.size {
            items.push("RFC822.SIZE");
        }
        if self.envelope {
            items.push("ENVELOPE");
        }
        if self.body {
            items.push("BODY.PEEK[]");
        }
        format!("({})", items.join(" "))
    }
}

/// Opens authenticated sessions for accounts.
pub trait Connector {
    type Session: MailSession;

    /// Dial the account's endpoint and log in.
    ///
    /// Fails with `Connect` when the server cannot be reached and with `Auth`
    /// when it rejects the credentials.
    fn connect(&self, account: &Account) -> Result<Self::Session>;
}

/// One authenticated IMAP session.
pub trait MailSession {
    /// Capabilities advertised by the server.
    fn capabilities(&mut self) -> Result<Vec<String>>;

    /// Names of every selectable mailbox, spelled as the server spells them.
    fn list_mailboxes(&mut self) -> Result<Vec<String>>;

    /// Select a mailbox and return its message count.
    fn select(&mut self, mailbox: &str) -> Result<u32>;

    /// Every UID in the selected mailbox, with no filtering.
    fn search_all_uids(&mut self) -> Result<Vec<u32>>;

    /// Fetch items from the selected mailbox.
    fn fetch(&mut self, target: FetchTarget, items: FetchItems) -> Result<Vec<FetchedItem>>;

    fn logout(&mut self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_target_set() {
        assert_eq!(FetchTarget::Uid(42).to_set(), "42");
        assert_eq!(FetchTarget::Sequence { start: 3, end: 12 }.to_set(), "3:12");
        assert_eq!(FetchTarget::Sequence { start: 5, end: 5 }.to_set(), "5");
    }

    #[test]
    fn test_fetch_items_query() {
        assert_eq!(
            FetchItems::ARCHIVE.query(),
            "(UID RFC822.SIZE ENVELOPE BODY.PEEK[])"
        );
        let uid_only = FetchItems {
            envelope: false,
            size: false,
            body: false,
        };
        assert_eq!(uid_only.query(), "(UID)");
    }
}
