//! IMAP access: the session traits the archiver is written against and
//! their TLS implementation.

pub mod client;
pub mod mutf7;
pub mod session;

pub use client::{ImapConnector, ImapSession};
pub use session::{Connector, FetchItems, FetchTarget, MailSession};
