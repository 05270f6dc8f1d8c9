//! [`Connector`] and [`MailSession`] on top of the blocking `imap` crate over
//! `native-tls`.

use std::collections::HashMap;
use std::net::TcpStream;

use imap::types::NameAttribute;
use native_tls::{TlsConnector, TlsStream};
use tracing::{debug, info};

use crate::config::Account;
use crate::error::{ArchiveError, Result};
use crate::model::message::FetchedItem;
use crate::remote::mutf7;
use crate::remote::session::{Connector, FetchItems, FetchTarget, MailSession};

type TlsSession = imap::Session<TlsStream<TcpStream>>;

/// Opens implicit-TLS (IMAPS) sessions.
#[derive(Debug, Clone, Default)]
pub struct ImapConnector;

impl Connector for ImapConnector {
    type Session = ImapSession;

    fn connect(&self, account: &Account) -> Result<ImapSession> {
        let (host, port) = account.host_port()?;
        let connect_err = |reason: String| ArchiveError::Connect {
            endpoint: account.imap.clone(),
            reason,
        };

        let tls = TlsConnector::builder()
            .build()
            .map_err(|e| connect_err(format!("TLS connector build failed: {e}")))?;

        debug!(host = %host, port, "Dialing");
        let mut client = imap::connect((host.as_str(), port), &host, &tls)
            .map_err(|e| connect_err(e.to_string()))?;
        client.debug = account.debug;

        let session = client
            .login(&account.username, &account.password)
            .map_err(|(e, _)| ArchiveError::Auth {
                username: account.username.clone(),
                reason: e.to_string(),
            })?;

        info!(username = %account.username, "Login success");
        Ok(ImapSession {
            inner: session,
            username: account.username.clone(),
            selected: String::new(),
            wire_names: HashMap::new(),
        })
    }
}

/// An authenticated session. Keeps the username and selected mailbox so
/// every error carries them.
pub struct ImapSession {
    inner: TlsSession,
    username: String,
    selected: String,
    /// Decoded mailbox name to the name as the server listed it.
    wire_names: HashMap<String, String>,
}

impl ImapSession {
    fn err(&self, command: &'static str, e: imap::error::Error) -> ArchiveError {
        ArchiveError::protocol(&self.username, &self.selected, command, e)
    }
}

impl MailSession for ImapSession {
    fn capabilities(&mut self) -> Result<Vec<String>> {
        let caps = self
            .inner
            .capabilities()
            .map_err(|e| self.err("CAPABILITY", e))?;
        Ok(caps.iter().map(|c| format!("{c:?}")).collect())
    }

    fn list_mailboxes(&mut self) -> Result<Vec<String>> {
        let names = self
            .inner
            .list(Some(""), Some("*"))
            .map_err(|e| self.err("LIST", e))?;

        let mut mailboxes = Vec::with_capacity(names.len());
        for name in names.iter() {
            if name.attributes().contains(&NameAttribute::NoSelect) {
                debug!(mailbox = name.name(), "Not selectable, skipping");
                continue;
            }
            let decoded = mutf7::decode(name.name()).into_owned();
            if decoded != name.name() {
                debug!(wire = name.name(), mailbox = %decoded, "Decoded mailbox name");
            }
            self.wire_names
                .insert(decoded.clone(), name.name().to_string());
            mailboxes.push(decoded);
        }
        Ok(mailboxes)
    }

    /// Opened read-only with EXAMINE: archiving never changes the mailbox.
    fn select(&mut self, mailbox: &str) -> Result<u32> {
        self.selected = mailbox.to_string();
        let wire = match self.wire_names.get(mailbox) {
            Some(wire) => wire.clone(),
            None => mutf7::encode(mailbox).into_owned(),
        };
        let status = self
            .inner
            .examine(&wire)
            .map_err(|e| self.err("EXAMINE", e))?;
        Ok(status.exists)
    }

    fn search_all_uids(&mut self) -> Result<Vec<u32>> {
        let uids = self
            .inner
            .uid_search("ALL")
            .map_err(|e| self.err("UID SEARCH", e))?;
        let mut uids: Vec<u32> = uids.into_iter().collect();
        uids.sort_unstable();
        Ok(uids)
    }

    fn fetch(&mut self, target: FetchTarget, items: FetchItems) -> Result<Vec<FetchedItem>> {
        let set = target.to_set();
        let query = items.query();
        let fetches = match target {
            FetchTarget::Uid(_) => self
                .inner
                .uid_fetch(&set, &query)
                .map_err(|e| self.err("UID FETCH", e))?,
            FetchTarget::Sequence { .. } => self
                .inner
                .fetch(&set, &query)
                .map_err(|e| self.err("FETCH", e))?,
        };

        Ok(fetches
            .iter()
            .map(|f| FetchedItem {
                seq: f.message,
                uid: f.uid,
                size: f.size,
                subject: f
                    .envelope()
                    .and_then(|env| env.subject)
                    .map(|s| s.to_vec()),
                body_sections: f.body().map(|b| vec![b.to_vec()]).unwrap_or_default(),
            })
            .collect())
    }

    fn logout(&mut self) -> Result<()> {
        self.selected.clear();
        self.inner.logout().map_err(|e| self.err("LOGOUT", e))
    }
}
