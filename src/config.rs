//! Application configuration.
//!
//! Configuration is loaded once at startup from the first file found at:
//! 1. `--config PATH` on the command line
//! 2. `$IMAPVAULT_CONFIG` (environment variable)
//! 3. `./config.json`
//! 4. `~/.config/imapvault/config.json` (Linux/macOS)
//!    `%APPDATA%\imapvault\config.json` (Windows)
//!
//! Files ending in `.toml` are parsed as TOML, everything else as JSON.
//! Field names are also accepted capitalized (`Dir`, `Accounts`, `Imap`, ...).

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ArchiveError, Result};
use crate::parser::subject::SubjectPolicy;
use crate::store::archive::Naming;
use crate::sync::archiver::FailurePolicy;
use crate::sync::fetcher::FetchMode;

/// Default IMAPS port used when the endpoint has none.
pub const DEFAULT_IMAP_PORT: u16 = 993;

/// Default number of sequence positions per batched FETCH.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Archive root directory.
    #[serde(alias = "Dir")]
    pub dir: PathBuf,
    /// Accounts to archive, processed in order.
    #[serde(alias = "Accounts")]
    pub accounts: Vec<Account>,
    /// Filename grammar for new archive entries.
    #[serde(default)]
    pub naming: Naming,
    /// What to do with a subject that cannot be decoded.
    #[serde(default)]
    pub subject_policy: SubjectPolicy,
    /// What to do when an account fails.
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    /// Log level: "error", "warn", "info", "debug", "trace".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// One remote identity to archive.
#[derive(Clone, Serialize, Deserialize)]
pub struct Account {
    /// Server endpoint as `host` or `host:port`.
    #[serde(alias = "Imap")]
    pub imap: String,
    #[serde(alias = "Username")]
    pub username: String,
    #[serde(alias = "Password")]
    pub password: String,
    /// Mailboxes to archive. Empty means every mailbox not excluded.
    #[serde(default, alias = "Include")]
    pub include: Vec<String>,
    /// Mailboxes never to archive. Wins over `include`.
    #[serde(default, alias = "Exclude")]
    pub exclude: Vec<String>,
    /// Batch window override for `FetchMode::Batched`.
    #[serde(default, alias = "BatchSize")]
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub fetch_mode: FetchMode,
    /// Print the raw IMAP conversation to stderr.
    #[serde(default, alias = "Debug")]
    pub debug: bool,
}

// The password never reaches the logs.
impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("imap", &self.imap)
            .field("username", &self.username)
            .field("include", &self.include)
            .field("exclude", &self.exclude)
            .field("batch_size", &self.batch_size)
            .field("fetch_mode", &self.fetch_mode)
            .field("debug", &self.debug)
            .finish()
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Account {
    /// Split the endpoint into host and port, defaulting to [`DEFAULT_IMAP_PORT`].
    ///
    /// IPv6 literals are written `[addr]` or `[addr]:port`; a bare address
    /// with several colons is taken as a host without a port.
    pub fn host_port(&self) -> Result<(String, u16)> {
        let endpoint = self.imap.trim();
        let invalid = |reason: String| ArchiveError::Connect {
            endpoint: endpoint.to_string(),
            reason,
        };
        let parse_port = |port: &str| {
            port.parse::<u16>()
                .map_err(|e| invalid(format!("invalid port '{port}': {e}")))
        };

        let (host, port) = if let Some(bracketed) = endpoint.strip_prefix('[') {
            let (host, rest) = bracketed
                .split_once(']')
                .ok_or_else(|| invalid("missing ']'".to_string()))?;
            let port = match rest {
                "" => DEFAULT_IMAP_PORT,
                _ => match rest.strip_prefix(':') {
                    Some(port) => parse_port(port)?,
                    None => return Err(invalid(format!("unexpected '{rest}' after ']'"))),
                },
            };
            (host, port)
        } else if endpoint.matches(':').count() > 1 {
            (endpoint, DEFAULT_IMAP_PORT)
        } else {
            match endpoint.rsplit_once(':') {
                Some((host, port)) => (host, parse_port(port)?),
                None => (endpoint, DEFAULT_IMAP_PORT),
            }
        };

        if host.is_empty() {
            return Err(invalid("missing host".to_string()));
        }
        Ok((host.to_string(), port))
    }

    /// Effective batch window.
    pub fn batch_size(&self) -> usize {
        self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE)
    }
}

impl Config {
    /// Check the invariants serde cannot express.
    pub fn validate(&self, path: &Path) -> Result<()> {
        let invalid = |reason: String| ArchiveError::Config {
            path: path.to_path_buf(),
            reason,
        };

        if self.dir.as_os_str().is_empty() {
            return Err(invalid("'dir' must not be empty".into()));
        }
        if self.accounts.is_empty() {
            return Err(invalid("no accounts configured".into()));
        }

        let mut seen = HashSet::new();
        for (i, account) in self.accounts.iter().enumerate() {
            if account.imap.trim().is_empty() {
                return Err(invalid(format!("account #{i}: 'imap' must not be empty")));
            }
            if account.username.is_empty() {
                return Err(invalid(format!("account #{i}: 'username' must not be empty")));
            }
            if account.batch_size == Some(0) {
                return Err(invalid(format!(
                    "account '{}': 'batch_size' must be at least 1",
                    account.username
                )));
            }
            if !seen.insert(account.username.as_str()) {
                return Err(invalid(format!(
                    "account '{}' is configured twice",
                    account.username
                )));
            }
        }
        Ok(())
    }

    /// Look up an account by username.
    pub fn account(&self, username: &str) -> Option<&Account> {
        self.accounts.iter().find(|a| a.username == username)
    }
}

// ── Load ────────────────────────────────────────────────────────

/// Load and validate the configuration at `path`.
pub fn load_config(path: &Path) -> Result<Config> {
    let contents = std::fs::read_to_string(path).map_err(|e| ArchiveError::Config {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let config = parse_config(path, &contents)?;
    config.validate(path)?;
    Ok(config)
}

/// Parse configuration text, choosing the format from the file extension.
pub fn parse_config(path: &Path, contents: &str) -> Result<Config> {
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

    let parsed = if is_toml {
        toml::from_str::<Config>(contents).map_err(|e| e.to_string())
    } else {
        serde_json::from_str::<Config>(contents).map_err(|e| e.to_string())
    };

    parsed.map_err(|reason| ArchiveError::Config {
        path: path.to_path_buf(),
        reason,
    })
}

/// Determine the config file path.
///
/// An explicit path always wins; otherwise the first existing candidate is
/// returned, falling back to `./config.json` so the error names a real path.
pub fn config_file_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }

    if let Ok(env_path) = std::env::var("IMAPVAULT_CONFIG") {
        return PathBuf::from(env_path);
    }

    let local = PathBuf::from("config.json");
    if local.exists() {
        return local;
    }

    if let Some(user) = dirs::config_dir().map(|d| d.join("imapvault").join("config.json")) {
        if user.exists() {
            return user;
        }
    }

    local
}

/// Return the cache directory used for the log file.
pub fn cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("imapvault")
}

/// Name of the log file inside [`cache_dir`].
pub const LOG_FILE_NAME: &str = "imapvault.log";

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "dir": "/srv/mail",
        "accounts": [
            {
                "imap": "imap.example.com:993",
                "username": "alice@example.com",
                "password": "secret",
                "exclude": ["Trash", "Junk"]
            },
            {
                "imap": "mail.example.org",
                "username": "bob",
                "password": "hunter2",
                "include": ["INBOX"],
                "batch_size": 25,
                "fetch_mode": "batched",
                "debug": true
            }
        ]
    }"#;

    #[test]
    fn test_parse_json_config() {
        let cfg = parse_config(Path::new("config.json"), SAMPLE).expect("parse");
        assert_eq!(cfg.dir, PathBuf::from("/srv/mail"));
        assert_eq!(cfg.accounts.len(), 2);
        assert_eq!(cfg.accounts[0].exclude, vec!["Trash", "Junk"]);
        assert!(cfg.accounts[0].include.is_empty());
        assert_eq!(cfg.accounts[0].batch_size(), DEFAULT_BATCH_SIZE);
        assert_eq!(cfg.accounts[1].batch_size(), 25);
        assert_eq!(cfg.accounts[1].fetch_mode, FetchMode::Batched);
        assert!(cfg.accounts[1].debug);
        assert_eq!(cfg.naming, Naming::UidSubject);
        assert_eq!(cfg.subject_policy, SubjectPolicy::Abort);
        assert_eq!(cfg.failure_policy, FailurePolicy::FailFast);
        assert_eq!(cfg.log_level, "info");
        cfg.validate(Path::new("config.json")).expect("valid");
    }

    #[test]
    fn test_parse_capitalized_fields() {
        let legacy = r#"{
            "Dir": "archive",
            "Accounts": [
                {"Imap": "imap.example.com:993", "Username": "u", "Password": "p",
                 "Include": [], "Exclude": ["Spam"]}
            ]
        }"#;
        let cfg = parse_config(Path::new("config.json"), legacy).expect("parse");
        assert_eq!(cfg.dir, PathBuf::from("archive"));
        assert_eq!(cfg.accounts[0].exclude, vec!["Spam"]);
    }

    #[test]
    fn test_parse_toml_config() {
        let text = r#"
dir = "/srv/mail"
naming = "uid"
subject_policy = "placeholder"
failure_policy = "continue"

[[accounts]]
imap = "imap.example.com"
username = "carol"
password = "pw"
"#;
        let cfg = parse_config(Path::new("vault.toml"), text).expect("parse");
        assert_eq!(cfg.naming, Naming::Uid);
        assert_eq!(cfg.subject_policy, SubjectPolicy::Placeholder);
        assert_eq!(cfg.failure_policy, FailurePolicy::Continue);
        assert_eq!(cfg.accounts[0].username, "carol");
    }

    #[test]
    fn test_host_port() {
        let mut cfg = parse_config(Path::new("c.json"), SAMPLE).expect("parse");
        assert_eq!(
            cfg.accounts[0].host_port().unwrap(),
            ("imap.example.com".to_string(), 993)
        );
        assert_eq!(
            cfg.accounts[1].host_port().unwrap(),
            ("mail.example.org".to_string(), DEFAULT_IMAP_PORT)
        );
        cfg.accounts[1].imap = "mail.example.org:abc".into();
        assert!(cfg.accounts[1].host_port().is_err());
        cfg.accounts[1].imap = ":143".into();
        assert!(cfg.accounts[1].host_port().is_err());
    }

    #[test]
    fn test_host_port_ipv6() {
        let mut account = parse_config(Path::new("c.json"), SAMPLE).expect("parse").accounts[0].clone();
        account.imap = "[::1]:993".into();
        assert_eq!(account.host_port().unwrap(), ("::1".to_string(), 993));
        account.imap = "[2001:db8::7]".into();
        assert_eq!(
            account.host_port().unwrap(),
            ("2001:db8::7".to_string(), DEFAULT_IMAP_PORT)
        );
        account.imap = "fe80::2".into();
        assert_eq!(
            account.host_port().unwrap(),
            ("fe80::2".to_string(), DEFAULT_IMAP_PORT)
        );
        account.imap = "[::1".into();
        assert!(account.host_port().is_err());
        account.imap = "[]:993".into();
        assert!(account.host_port().is_err());
        account.imap = "[::1]993".into();
        assert!(account.host_port().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_configs() {
        let path = Path::new("c.json");
        let mut cfg = parse_config(path, SAMPLE).expect("parse");
        cfg.accounts[1].batch_size = Some(0);
        assert!(cfg.validate(path).is_err());

        let mut cfg = parse_config(path, SAMPLE).expect("parse");
        cfg.accounts[1].username = cfg.accounts[0].username.clone();
        assert!(cfg.validate(path).is_err());

        let mut cfg = parse_config(path, SAMPLE).expect("parse");
        cfg.accounts.clear();
        assert!(cfg.validate(path).is_err());
    }

    #[test]
    fn test_debug_hides_password() {
        let cfg = parse_config(Path::new("c.json"), SAMPLE).expect("parse");
        let printed = format!("{:?}", cfg.accounts[0]);
        assert!(printed.contains("alice@example.com"));
        assert!(!printed.contains("secret"));
    }

    #[test]
    fn test_config_file_path_explicit_wins() {
        let path = config_file_path(Some(Path::new("/etc/imapvault.json")));
        assert_eq!(path, PathBuf::from("/etc/imapvault.json"));
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config(Path::new("/nonexistent/imapvault.json")).unwrap_err();
        assert!(matches!(err, ArchiveError::Config { .. }));
    }
}
