//! Per-account orchestration: connect, enumerate, then inventory, plan,
//! fetch and write each kept mailbox in turn.
//!
//! Everything runs sequentially on one session per account. An error aborts
//! the account it happens in; entries written before it stay on disk and are
//! skipped as already archived on the next run.

use serde::{Deserialize, Serialize};
use tracing::{error, info, info_span, warn};

use crate::config::{Account, Config};
use crate::error::{ArchiveError, Result};
use crate::model::report::{AccountReport, MailboxReport, RunReport};
use crate::remote::session::{Connector, MailSession};
use crate::store::archive::{ensure_dir, inventory, mailbox_dir, write_entry};
use crate::sync::fetcher::Fetcher;
use crate::sync::filter::MailboxFilter;
use crate::sync::planner::plan;

/// What to do when an account fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Stop the run at the first failing account.
    #[default]
    FailFast,
    /// Record the failure and go on with the next account.
    Continue,
}

/// Progress notifications. The callback returns `false` to stop the run
/// before the next account or mailbox starts.
#[derive(Debug, Clone, Copy)]
pub enum Progress<'a> {
    Account {
        username: &'a str,
    },
    Mailbox {
        username: &'a str,
        mailbox: &'a str,
    },
    /// Fired after a mailbox has been planned.
    Planned {
        mailbox: &'a str,
        planned: usize,
    },
    /// Fired after each written entry. The return value is ignored: a
    /// mailbox is never interrupted halfway.
    Written {
        mailbox: &'a str,
        uid: u32,
        written: usize,
        planned: usize,
    },
}

type ProgressFn<'a> = &'a dyn Fn(&Progress<'_>) -> bool;

/// Drives archiving for the accounts of one [`Config`].
pub struct Archiver<'a, C: Connector> {
    config: &'a Config,
    connector: C,
    failure_policy: FailurePolicy,
    dry_run: bool,
    progress: Option<ProgressFn<'a>>,
}

impl<'a, C: Connector> Archiver<'a, C> {
    pub fn new(config: &'a Config, connector: C) -> Self {
        Self {
            config,
            connector,
            failure_policy: config.failure_policy,
            dry_run: false,
            progress: None,
        }
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Plan only: nothing is fetched, written or created on disk.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn progress(mut self, progress: ProgressFn<'a>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    fn tick(&self, event: Progress<'_>) -> bool {
        self.progress.is_none_or(|f| f(&event))
    }

    /// Archive every configured account.
    pub fn run_all(&self) -> RunReport {
        self.run(&self.config.accounts)
    }

    /// Archive `accounts` in order.
    ///
    /// Failures are logged and recorded in the report. Under
    /// [`FailurePolicy::FailFast`] the first failure ends the run; a
    /// cancellation always does.
    pub fn run<'b>(&self, accounts: impl IntoIterator<Item = &'b Account>) -> RunReport {
        let mut run = RunReport::start(self.dry_run);

        for account in accounts {
            let span = info_span!("account", username = %account.username);
            let _enter = span.enter();

            let mut report = AccountReport::new(&account.username);
            let result = if self.tick(Progress::Account {
                username: &account.username,
            }) {
                info!("Archive start");
                self.archive_account(account, &mut report)
            } else {
                Err(ArchiveError::Cancelled)
            };

            let stop = match result {
                Ok(()) => {
                    info!(
                        written = report.written(),
                        bytes = report.bytes(),
                        "Archive success"
                    );
                    false
                }
                Err(e) => {
                    error!(error = %e, "Archive error");
                    let cancelled = matches!(e, ArchiveError::Cancelled);
                    report.error = Some(e.to_string());
                    cancelled || self.failure_policy == FailurePolicy::FailFast
                }
            };

            run.accounts.push(report);
            if stop {
                break;
            }
        }

        run.finish();
        run
    }

    /// Archive one account, filling `report` as mailboxes complete.
    pub fn archive_account(&self, account: &Account, report: &mut AccountReport) -> Result<()> {
        let mut session = self.connector.connect(account)?;

        let capabilities = session.capabilities()?;
        info!(capabilities = ?capabilities, "Capability success");

        let kept = self.enumerate(&mut session, account, report)?;

        for mailbox in &kept {
            if !self.tick(Progress::Mailbox {
                username: &account.username,
                mailbox,
            }) {
                return Err(ArchiveError::Cancelled);
            }

            let span = info_span!("mailbox", mailbox = %mailbox);
            let _enter = span.enter();

            let mut mailbox_report = MailboxReport {
                name: mailbox.clone(),
                ..MailboxReport::default()
            };
            let result = self.sync_mailbox(&mut session, account, mailbox, &mut mailbox_report);
            report.mailboxes.push(mailbox_report);
            result?;
        }

        session.logout()?;
        info!("Logout success");
        Ok(())
    }

    /// List the account's mailboxes and keep those its filter allows.
    ///
    /// Every decision is logged before any mailbox is selected; skipped
    /// names go to `report.skipped`.
    pub fn enumerate(
        &self,
        session: &mut C::Session,
        account: &Account,
        report: &mut AccountReport,
    ) -> Result<Vec<String>> {
        let mailboxes = session.list_mailboxes()?;
        let decided = MailboxFilter::from_account(account).partition(&mailboxes);

        let mut kept = Vec::new();
        for (mailbox, decision) in decided {
            if decision.is_kept() {
                info!(mailbox = %mailbox, "Mailbox selected for archiving");
                kept.push(mailbox);
            } else {
                info!(mailbox = %mailbox, reason = decision.reason(), "Skip");
                report.skipped.push(mailbox);
            }
        }
        Ok(kept)
    }

    /// Select, inventory, plan, fetch and write one mailbox.
    fn sync_mailbox(
        &self,
        session: &mut C::Session,
        account: &Account,
        mailbox: &str,
        report: &mut MailboxReport,
    ) -> Result<()> {
        report.exists = session.select(mailbox)?;
        info!(messages = report.exists, "Select success");

        let dir = mailbox_dir(&self.config.dir, &account.username, mailbox);
        let local = if self.dry_run && !dir.exists() {
            Default::default()
        } else {
            if !self.dry_run {
                ensure_dir(&dir)?;
            }
            inventory(&dir).inspect_err(|e| error!(dir = %dir.display(), error = %e, "Inventory error"))?
        };

        let mut remote = session.search_all_uids()?;
        remote.sort_unstable();
        remote.dedup();

        let delta = plan(&remote, &local);
        report.remote = delta.remote;
        report.archived = delta.archived;
        report.planned = delta.len();
        info!(
            remote = delta.remote,
            archived = delta.archived,
            planned = delta.len(),
            "Sync plan"
        );
        if delta.archived < local.len() {
            warn!(
                local_only = local.len() - delta.archived,
                "Archive holds UIDs the server no longer reports"
            );
        }

        self.tick(Progress::Planned {
            mailbox,
            planned: delta.len(),
        });
        if self.dry_run || delta.is_empty() {
            return Ok(());
        }

        let naming = self.config.naming;
        let planned = delta.len();
        Fetcher::new(session, &account.username, mailbox)
            .mode(account.fetch_mode, account.batch_size())
            .subject_policy(self.config.subject_policy)
            .fetch_all(&delta.uids, &remote, &mut |record| {
                let path = write_entry(
                    &dir,
                    record.uid,
                    record.subject.as_deref(),
                    &record.payload,
                    naming,
                )
                .inspect_err(|e| {
                    error!(
                        uid = record.uid,
                        subject = record.subject.as_deref().unwrap_or(""),
                        rfc822size = record.size,
                        bodysize = record.len(),
                        error = %e,
                        "Write file error"
                    )
                })?;

                report.written += 1;
                report.bytes += record.len() as u64;
                info!(
                    uid = record.uid,
                    path = %path.display(),
                    bodysize = record.len(),
                    "Write file success"
                );
                self.tick(Progress::Written {
                    mailbox,
                    uid: record.uid,
                    written: report.written,
                    planned,
                });
                Ok(())
            })?;

        Ok(())
    }
}
