//! Per-mailbox, per-account and per-run outcome summaries.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Outcome of syncing one mailbox.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct MailboxReport {
    pub name: String,
    /// `EXISTS` count returned by SELECT.
    pub exists: u32,
    /// UIDs returned by the full UID SEARCH.
    pub remote: usize,
    /// UIDs already present in the local archive.
    pub archived: usize,
    /// UIDs planned for fetching.
    pub planned: usize,
    /// Entries written during this run.
    pub written: usize,
    /// Payload bytes written during this run.
    pub bytes: u64,
}

/// Outcome of archiving one account.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AccountReport {
    pub username: String,
    pub mailboxes: Vec<MailboxReport>,
    /// Mailboxes left out by the include/exclude filter.
    pub skipped: Vec<String>,
    /// Rendered error if the account aborted.
    pub error: Option<String>,
}

impl AccountReport {
    pub fn new(username: &str) -> Self {
        Self {
            username: username.to_string(),
            ..Self::default()
        }
    }

    pub fn written(&self) -> usize {
        self.mailboxes.iter().map(|m| m.written).sum()
    }

    pub fn planned(&self) -> usize {
        self.mailboxes.iter().map(|m| m.planned).sum()
    }

    pub fn bytes(&self) -> u64 {
        self.mailboxes.iter().map(|m| m.bytes).sum()
    }

    pub fn failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Outcome of a whole run across accounts.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub dry_run: bool,
    pub accounts: Vec<AccountReport>,
}

impl RunReport {
    pub fn start(dry_run: bool) -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            dry_run,
            accounts: Vec::new(),
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Accounts that aborted with an error.
    pub fn failures(&self) -> impl Iterator<Item = &AccountReport> {
        self.accounts.iter().filter(|a| a.failed())
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }

    pub fn written(&self) -> usize {
        self.accounts.iter().map(|a| a.written()).sum()
    }

    pub fn bytes(&self) -> u64 {
        self.accounts.iter().map(|a| a.bytes()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mailbox(name: &str, written: usize, bytes: u64) -> MailboxReport {
        MailboxReport {
            name: name.to_string(),
            planned: written,
            written,
            bytes,
            ..MailboxReport::default()
        }
    }

    #[test]
    fn test_totals() {
        let mut run = RunReport::start(false);
        let mut a = AccountReport::new("a");
        a.mailboxes.push(mailbox("INBOX", 3, 300));
        a.mailboxes.push(mailbox("Sent", 1, 50));
        let mut b = AccountReport::new("b");
        b.error = Some("Login failed".into());
        run.accounts.push(a);
        run.accounts.push(b);
        run.finish();

        assert_eq!(run.written(), 4);
        assert_eq!(run.bytes(), 350);
        assert!(run.has_failures());
        assert_eq!(run.failures().count(), 1);
        assert!(run.finished_at.is_some());
    }

    #[test]
    fn test_report_serializes() {
        let mut a = AccountReport::new("a");
        a.skipped.push("Trash".into());
        let json = serde_json::to_value(&a).expect("serialize");
        assert_eq!(json["username"], "a");
        assert_eq!(json["skipped"][0], "Trash");
        assert!(json["error"].is_null());
    }
}
