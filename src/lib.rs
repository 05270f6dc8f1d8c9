//! `imapvault`: incremental IMAP mailbox archiver.
//!
//! This crate provides the core library for enumerating remote mailboxes,
//! working out which messages are not archived yet, fetching them, and
//! writing each one to its own `.eml` file. The archive directory is the
//! only state: re-running after an interruption picks up where it stopped.

pub mod config;
pub mod error;
pub mod model;
pub mod parser;
pub mod remote;
pub mod store;
pub mod sync;
