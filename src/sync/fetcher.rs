//! Message fetching: turns planned UIDs into verified [`MessageRecord`]s.
//!
//! Two strategies:
//!
//! - [`FetchMode::Single`] issues one `UID FETCH` per UID and rejects any
//!   response whose UID differs from the requested one.
//! - [`FetchMode::Batched`] maps UIDs to sequence numbers, fetches runs of up
//!   to `window` consecutive messages with one `FETCH a:b`, and pairs each
//!   response with the UID expected at its offset in the run. Pairing by
//!   position trusts the server's response order, so every item that carries
//!   a UID is then checked against the expected one.
//!
//! Either way a record only reaches the sink once its UID and body shape
//! have been verified and its subject decoded.

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::{ArchiveError, Result};
use crate::model::message::{FetchedItem, MessageRecord};
use crate::parser::subject::{decode_subject, subject_from_payload, SubjectPolicy};
use crate::remote::session::{FetchItems, FetchTarget, MailSession};
use crate::sync::planner::sequence_runs;

/// Fetch strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchMode {
    /// One `UID FETCH` per message.
    #[default]
    Single,
    /// `FETCH` of consecutive sequence numbers, `batch_size` at a time.
    Batched,
}

/// Fetches messages from the mailbox currently selected on `session`.
pub struct Fetcher<'a, S: MailSession> {
    session: &'a mut S,
    username: &'a str,
    mailbox: &'a str,
    mode: FetchMode,
    window: usize,
    subject_policy: SubjectPolicy,
}

impl<'a, S: MailSession> Fetcher<'a, S> {
    pub fn new(session: &'a mut S, username: &'a str, mailbox: &'a str) -> Self {
        Self {
            session,
            username,
            mailbox,
            mode: FetchMode::Single,
            window: crate::config::DEFAULT_BATCH_SIZE,
            subject_policy: SubjectPolicy::Abort,
        }
    }

    pub fn mode(mut self, mode: FetchMode, window: usize) -> Self {
        self.mode = mode;
        self.window = window.max(1);
        self
    }

    pub fn subject_policy(mut self, policy: SubjectPolicy) -> Self {
        self.subject_policy = policy;
        self
    }

    /// Fetch every planned UID and hand each record to `sink`, in plan order.
    ///
    /// `remote_sorted` is the mailbox's full ascending UID list (needed to
    /// locate sequence numbers in batched mode). The first error, from the
    /// server or from `sink`, stops the loop and is returned; records already
    /// delivered stay delivered. Returns the number of records delivered.
    pub fn fetch_all(
        &mut self,
        planned: &[u32],
        remote_sorted: &[u32],
        sink: &mut dyn FnMut(MessageRecord) -> Result<()>,
    ) -> Result<usize> {
        match self.mode {
            FetchMode::Single => self.fetch_single(planned, sink),
            FetchMode::Batched => self.fetch_batched(planned, remote_sorted, sink),
        }
    }

    fn fetch_single(
        &mut self,
        planned: &[u32],
        sink: &mut dyn FnMut(MessageRecord) -> Result<()>,
    ) -> Result<usize> {
        let mut delivered = 0;
        for &uid in planned {
            let items = self
                .session
                .fetch(FetchTarget::Uid(uid), FetchItems::ARCHIVE)
                .inspect_err(|e| error!(uid, error = %e, "Fetch error"))?;

            for item in &items {
                self.verify_uid(uid, item)?;
            }

            let count = items.len();
            let mut items = items.into_iter();
            let (Some(item), None) = (items.next(), items.next()) else {
                let reason = format!("{count} responses for UID {uid}, expected 1");
                error!(uid, reason = %reason, "Fetch error");
                return Err(ArchiveError::protocol(
                    self.username,
                    self.mailbox,
                    "UID FETCH",
                    reason,
                ));
            };

            sink(self.to_record(uid, item)?)?;
            delivered += 1;
        }
        Ok(delivered)
    }

    fn fetch_batched(
        &mut self,
        planned: &[u32],
        remote_sorted: &[u32],
        sink: &mut dyn FnMut(MessageRecord) -> Result<()>,
    ) -> Result<usize> {
        let mut delivered = 0;
        for run in sequence_runs(planned, remote_sorted, self.window) {
            let target = FetchTarget::Sequence {
                start: run.start,
                end: run.end,
            };
            debug!(set = %target.to_set(), count = run.expected.len(), "Fetching batch");

            let items = self
                .session
                .fetch(target, FetchItems::ARCHIVE)
                .inspect_err(|e| error!(set = %target.to_set(), error = %e, "Fetch error"))?;

            if items.len() != run.expected.len() {
                let reason = format!(
                    "{} responses for sequence set {}, expected {}",
                    items.len(),
                    target.to_set(),
                    run.expected.len()
                );
                error!(reason = %reason, "Fetch error");
                return Err(ArchiveError::protocol(
                    self.username,
                    self.mailbox,
                    "FETCH",
                    reason,
                ));
            }

            // Verify the whole batch before anything is written
            for (item, &uid) in items.iter().zip(&run.expected) {
                if item.uid.is_some() {
                    self.verify_uid(uid, item)?;
                }
            }

            for (item, &uid) in items.into_iter().zip(&run.expected) {
                sink(self.to_record(uid, item)?)?;
                delivered += 1;
            }
        }
        Ok(delivered)
    }

    fn verify_uid(&self, requested: u32, item: &FetchedItem) -> Result<()> {
        match item.uid {
            Some(uid) if uid == requested => Ok(()),
            returned => {
                let returned = returned.unwrap_or(0);
                error!(
                    uid = requested,
                    returned,
                    seq = item.seq,
                    "Invalid UID in fetch response"
                );
                Err(ArchiveError::UidMismatch {
                    username: self.username.to_string(),
                    mailbox: self.mailbox.to_string(),
                    requested,
                    returned,
                })
            }
        }
    }

    /// Resolve the body and subject of a verified item.
    fn to_record(&self, uid: u32, mut item: FetchedItem) -> Result<MessageRecord> {
        if item.body_sections.len() != 1 {
            error!(
                uid,
                sections = item.body_sections.len(),
                rfc822size = item.size,
                "Body section error"
            );
            return Err(ArchiveError::BodyShape {
                username: self.username.to_string(),
                mailbox: self.mailbox.to_string(),
                uid,
                sections: item.body_sections.len(),
            });
        }
        let payload = item.body_sections.remove(0);

        let raw_subject = item.subject.or_else(|| subject_from_payload(&payload));
        let subject = match raw_subject.as_deref().map(decode_subject).transpose() {
            Ok(subject) => subject.filter(|s| !s.is_empty()),
            Err(e) => {
                let raw = String::from_utf8_lossy(raw_subject.as_deref().unwrap_or_default());
                match self.subject_policy {
                    SubjectPolicy::Abort => {
                        error!(uid, subject = %raw, error = %e, "Decode subject error");
                        return Err(ArchiveError::Decode {
                            username: self.username.to_string(),
                            mailbox: self.mailbox.to_string(),
                            uid,
                            reason: e.to_string(),
                        });
                    }
                    SubjectPolicy::Placeholder => {
                        warn!(uid, subject = %raw, error = %e, "Undecodable subject, archiving without it");
                        None
                    }
                }
            }
        };

        let record = MessageRecord {
            uid,
            subject,
            size: item.size,
            payload,
        };
        if !record.size_matches() {
            warn!(
                uid,
                rfc822size = record.size,
                bodysize = record.len(),
                "RFC822.SIZE disagrees with body length"
            );
        }
        info!(
            uid,
            subject = record.subject.as_deref().unwrap_or(""),
            rfc822size = record.size,
            bodysize = record.len(),
            "Fetch success"
        );
        Ok(record)
    }
}
