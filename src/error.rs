//! Centralized error types for imapvault.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the imapvault library.
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// Dialing the server or setting up TLS failed.
    #[error("Cannot connect to '{endpoint}': {reason}")]
    Connect { endpoint: String, reason: String },

    /// The server rejected the credentials.
    #[error("Login failed for '{username}': {reason}")]
    Auth { username: String, reason: String },

    /// A LIST, SELECT, SEARCH, FETCH or LOGOUT command failed.
    #[error("{command} failed for '{username}' mailbox '{mailbox}': {reason}")]
    Protocol {
        username: String,
        mailbox: String,
        command: &'static str,
        reason: String,
    },

    /// A fetched item carries a different UID than the one requested.
    #[error("UID mismatch in '{username}' mailbox '{mailbox}': requested {requested}, got {returned}")]
    UidMismatch {
        username: String,
        mailbox: String,
        requested: u32,
        returned: u32,
    },

    /// The envelope subject could not be decoded.
    #[error("Cannot decode subject of UID {uid} in '{username}' mailbox '{mailbox}': {reason}")]
    Decode {
        username: String,
        mailbox: String,
        uid: u32,
        reason: String,
    },

    /// A fetched item does not resolve to exactly one body section.
    #[error("UID {uid} in '{username}' mailbox '{mailbox}' has {sections} body section(s), expected 1")]
    BodyShape {
        username: String,
        mailbox: String,
        uid: u32,
        sections: usize,
    },

    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// An archive entry already exists at the target path.
    #[error("Archive entry already exists: {0}")]
    EntryExists(PathBuf),

    /// A filename would not round-trip to the UID it was built for.
    #[error("Filename '{filename}' does not recover UID {uid}")]
    InvalidEntryName { uid: u32, filename: String },

    /// The configuration file is missing, unreadable or invalid.
    #[error("Invalid configuration '{path}': {reason}")]
    Config { path: PathBuf, reason: String },

    /// The run was stopped between mailboxes.
    #[error("Operation cancelled")]
    Cancelled,
}

/// Convenience alias for `Result<T, ArchiveError>`.
pub type Result<T> = std::result::Result<T, ArchiveError>;

impl ArchiveError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a `Protocol` variant for a failed IMAP command.
    pub fn protocol(
        username: &str,
        mailbox: &str,
        command: &'static str,
        reason: impl ToString,
    ) -> Self {
        Self::Protocol {
            username: username.to_string(),
            mailbox: mailbox.to_string(),
            command,
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_message() {
        let err = ArchiveError::protocol("alice", "INBOX", "SELECT", "NO such mailbox");
        assert_eq!(
            err.to_string(),
            "SELECT failed for 'alice' mailbox 'INBOX': NO such mailbox"
        );
    }

    #[test]
    fn test_io_error_names_path() {
        let err = ArchiveError::io(
            "/tmp/x",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.to_string().contains("/tmp/x"));
    }
}
