//! Local archive store: one directory per account and mailbox, one `.eml`
//! file per UID.
//!
//! ```text
//! <root>/<username>/<mailbox>/<uid>.eml
//! <root>/<username>/<mailbox>/<uid>-<sanitized subject>.eml
//! ```
//!
//! The filenames are the only record of what has been archived. The UID is
//! recovered from the leading digits of each name, so both grammars (and any
//! mix of them in one directory) inventory the same way.

use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{ArchiveError, Result};

/// Extension of every archive entry.
pub const ENTRY_EXTENSION: &str = "eml";

/// Longest subject fragment kept in a filename, in characters.
pub const MAX_SUBJECT_LEN: usize = 80;

/// Longest entry filename, in bytes. Well under the usual 255-byte
/// `NAME_MAX` even for subjects made of 4-byte characters.
pub const MAX_FILENAME_BYTES: usize = 200;

/// Filename grammar for new archive entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Naming {
    /// `<uid>.eml`
    Uid,
    /// `<uid>-<sanitized subject>.eml`, or `<uid>.eml` without a subject.
    #[default]
    UidSubject,
}

/// Directory holding the entries of one mailbox.
///
/// Hierarchy separators in the mailbox name become nested directories.
/// Components that could walk out of the archive (`""`, `.`, `..`) are
/// replaced by `_`.
pub fn mailbox_dir(root: &Path, username: &str, mailbox: &str) -> PathBuf {
    let mut dir = account_dir(root, username);
    for part in mailbox.split('/') {
        dir.push(safe_component(part));
    }
    dir
}

/// Directory holding every mailbox of one account.
pub fn account_dir(root: &Path, username: &str) -> PathBuf {
    root.join(safe_component(username))
}

fn safe_component(part: &str) -> &str {
    match part {
        "" | "." | ".." => "_",
        other => other,
    }
}

/// Create `dir` and its parents. An existing directory is fine.
pub fn ensure_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| ArchiveError::io(dir, e))
}

/// Recover the UID from an entry filename.
///
/// The UID is everything before the first `.` or `-`. Zero, an empty prefix
/// or anything that is not an unsigned integer yields `None`.
pub fn parse_uid(filename: &str) -> Option<u32> {
    let prefix = filename
        .split(['.', '-'])
        .next()
        .filter(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()))?;
    prefix.parse::<u32>().ok().filter(|&uid| uid > 0)
}

/// UIDs already archived in `dir`.
///
/// Only regular files directly inside `dir` count. Names that do not start
/// with a UID are ignored. Any error reading the directory is returned as is:
/// an inventory that cannot be trusted must never look empty.
pub fn inventory(dir: &Path) -> Result<BTreeSet<u32>> {
    let mut uids = BTreeSet::new();
    let entries = std::fs::read_dir(dir).map_err(|e| ArchiveError::io(dir, e))?;

    for entry in entries {
        let entry = entry.map_err(|e| ArchiveError::io(dir, e))?;
        let file_type = entry
            .file_type()
            .map_err(|e| ArchiveError::io(entry.path(), e))?;
        if !file_type.is_file() {
            continue;
        }

        let name = entry.file_name();
        match name.to_str().and_then(parse_uid) {
            Some(uid) => {
                trace!(uid, "Already archived");
                uids.insert(uid);
            }
            None => debug!(name = %name.to_string_lossy(), "Ignoring non-entry file"),
        }
    }

    Ok(uids)
}

/// Filename for a new entry.
pub fn entry_filename(uid: u32, subject: Option<&str>, naming: Naming) -> String {
    let fragment = match naming {
        Naming::Uid => None,
        Naming::UidSubject => subject.and_then(|s| sanitize_subject(s, MAX_SUBJECT_LEN)),
    };

    let prefix = format!("{uid}-");
    let budget = MAX_FILENAME_BYTES.saturating_sub(prefix.len() + ENTRY_EXTENSION.len() + 1);
    let fragment = fragment
        .map(|f| truncate_bytes(&f, budget).trim_end_matches(['_', '.']).to_string())
        .filter(|f| !f.is_empty());

    match fragment {
        Some(fragment) => format!("{prefix}{fragment}.{ENTRY_EXTENSION}"),
        None => format!("{uid}.{ENTRY_EXTENSION}"),
    }
}

/// Longest prefix of `s` that fits in `max` bytes without splitting a character.
fn truncate_bytes(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Sanitize a subject for use in a filename.
///
/// Keeps alphanumerics and `-._@`, maps everything else to `_`, collapses
/// runs of `_` and truncates to `max_len` characters. Returns `None` if
/// nothing meaningful is left.
pub fn sanitize_subject(s: &str, max_len: usize) -> Option<String> {
    let mut out = String::with_capacity(s.len().min(max_len * 4));
    for c in s.trim().chars() {
        let c = if c.is_alphanumeric() || matches!(c, '-' | '.' | '_' | '@') {
            c
        } else {
            '_'
        };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }

    let out: String = out.chars().take(max_len).collect();
    let out = out.trim_matches(|c| c == '_' || c == '.');
    if out.is_empty() {
        None
    } else {
        Some(out.to_string())
    }
}

/// Write one archive entry and return its path.
///
/// The payload is staged in a hidden temporary file inside `dir`, synced,
/// and then linked into place without replacing anything: an existing entry
/// with the same name is reported as [`ArchiveError::EntryExists`] and left
/// untouched. The staged name never parses as a UID, so a crash mid-write
/// leaves nothing [`inventory`] would count.
pub fn write_entry(
    dir: &Path,
    uid: u32,
    subject: Option<&str>,
    payload: &[u8],
    naming: Naming,
) -> Result<PathBuf> {
    let filename = entry_filename(uid, subject, naming);
    if parse_uid(&filename) != Some(uid) {
        return Err(ArchiveError::InvalidEntryName { uid, filename });
    }

    ensure_dir(dir)?;
    let path = dir.join(&filename);

    let mut staged = tempfile::Builder::new()
        .prefix(".tmp-")
        .tempfile_in(dir)
        .map_err(|e| ArchiveError::io(dir, e))?;
    staged
        .as_file_mut()
        .write_all(payload)
        .map_err(|e| ArchiveError::io(staged.path(), e))?;
    staged
        .as_file_mut()
        .sync_all()
        .map_err(|e| ArchiveError::io(staged.path(), e))?;

    staged.persist_noclobber(&path).map_err(|e| {
        if e.error.kind() == std::io::ErrorKind::AlreadyExists {
            ArchiveError::EntryExists(path.clone())
        } else {
            ArchiveError::io(&path, e.error)
        }
    })?;

    debug!(path = %path.display(), bytes = payload.len(), "Entry written");
    Ok(path)
}

/// Summary of one mailbox directory, for offline inspection.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct DirStats {
    /// Mailbox name relative to the account directory.
    pub mailbox: String,
    pub entries: usize,
    pub bytes: u64,
    /// Highest archived UID.
    pub max_uid: Option<u32>,
}

/// Walk an account directory and summarize every mailbox directory in it.
///
/// Nested mailboxes are reported with `/`-joined names. Directories without
/// entries are still listed if they hold sub-mailboxes with entries.
pub fn account_stats(account_dir: &Path) -> Result<Vec<DirStats>> {
    let mut stats = Vec::new();
    walk_stats(account_dir, String::new(), &mut stats)?;
    stats.sort_by(|a, b| a.mailbox.cmp(&b.mailbox));
    Ok(stats)
}

fn walk_stats(dir: &Path, name: String, out: &mut Vec<DirStats>) -> Result<()> {
    let mut here = DirStats {
        mailbox: name.clone(),
        ..DirStats::default()
    };

    let entries = std::fs::read_dir(dir).map_err(|e| ArchiveError::io(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| ArchiveError::io(dir, e))?;
        let path = entry.path();
        let meta = entry.metadata().map_err(|e| ArchiveError::io(&path, e))?;
        let child = entry.file_name().to_string_lossy().into_owned();

        if meta.is_dir() {
            let child_name = if name.is_empty() {
                child
            } else {
                format!("{name}/{child}")
            };
            walk_stats(&path, child_name, out)?;
        } else if let Some(uid) = parse_uid(&child) {
            here.entries += 1;
            here.bytes += meta.len();
            here.max_uid = here.max_uid.max(Some(uid));
        }
    }

    if !name.is_empty() && here.entries > 0 {
        out.push(here);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_uid_both_grammars() {
        assert_eq!(parse_uid("42.eml"), Some(42));
        assert_eq!(parse_uid("42-Hello World.eml"), Some(42));
        assert_eq!(parse_uid("42-Re-Re.eml"), Some(42));
        assert_eq!(parse_uid("7"), Some(7));
    }

    #[test]
    fn test_parse_uid_rejects_non_entries() {
        assert_eq!(parse_uid("0.eml"), None);
        assert_eq!(parse_uid("abc.eml"), None);
        assert_eq!(parse_uid("notes.txt"), None);
        assert_eq!(parse_uid(".tmp-abc123"), None);
        assert_eq!(parse_uid("-5.eml"), None);
        assert_eq!(parse_uid("+5.eml"), None);
        assert_eq!(parse_uid("99999999999.eml"), None);
        assert_eq!(parse_uid(""), None);
    }

    #[test]
    fn test_entry_filename() {
        assert_eq!(entry_filename(42, None, Naming::UidSubject), "42.eml");
        assert_eq!(
            entry_filename(42, Some("Hello World"), Naming::UidSubject),
            "42-Hello_World.eml"
        );
        assert_eq!(entry_filename(42, Some("Hello World"), Naming::Uid), "42.eml");
        assert_eq!(entry_filename(42, Some("///"), Naming::UidSubject), "42.eml");
    }

    #[test]
    fn test_sanitize_subject() {
        assert_eq!(sanitize_subject("a/b\\c:d*e", 20).unwrap(), "a_b_c_d_e");
        assert_eq!(sanitize_subject("Re: [list]  hi", 40).unwrap(), "Re_list_hi");
        assert_eq!(sanitize_subject("Café", 10).unwrap(), "Café");
        assert_eq!(sanitize_subject("abcdef", 3).unwrap(), "abc");
        assert_eq!(sanitize_subject("..", 10), None);
        assert_eq!(sanitize_subject("", 10), None);
    }

    #[test]
    fn test_filename_byte_budget() {
        // U+1D412 is alphanumeric and four bytes long
        let wide = "\u{1D412}".repeat(100);
        let name = entry_filename(4_000_000_000, Some(&wide), Naming::UidSubject);
        assert!(name.len() <= MAX_FILENAME_BYTES, "{} bytes", name.len());
        assert!(name.starts_with("4000000000-\u{1D412}"));
        assert!(name.ends_with(".eml"));
        assert_eq!(parse_uid(&name), Some(4_000_000_000));

        let ascii = entry_filename(7, Some(&"a".repeat(300)), Naming::UidSubject);
        assert_eq!(ascii, format!("7-{}.eml", "a".repeat(MAX_SUBJECT_LEN)));
    }

    #[test]
    fn test_truncate_bytes_respects_char_boundaries() {
        assert_eq!(truncate_bytes("héllo", 2), "h");
        assert_eq!(truncate_bytes("héllo", 3), "hé");
        assert_eq!(truncate_bytes("abc", 10), "abc");
    }

    #[test]
    fn test_sanitized_names_round_trip() {
        for subject in ["-leading dash", "42 is the answer", ".hidden", "a.b-c"] {
            let name = entry_filename(9, Some(subject), Naming::UidSubject);
            assert_eq!(parse_uid(&name), Some(9), "{name}");
        }
    }

    #[test]
    fn test_mailbox_dir() {
        let root = Path::new("/archive");
        assert_eq!(
            mailbox_dir(root, "alice", "INBOX/Sent"),
            PathBuf::from("/archive/alice/INBOX/Sent")
        );
        assert_eq!(
            mailbox_dir(root, "alice", "../../etc"),
            PathBuf::from("/archive/alice/_/_/etc")
        );
        assert_eq!(
            mailbox_dir(root, "..", "INBOX"),
            PathBuf::from("/archive/_/INBOX")
        );
    }

    #[test]
    fn test_account_stats_sees_what_sync_writes() {
        let tmp = tempfile::tempdir().unwrap();
        for username in ["alice", ".."] {
            let dir = mailbox_dir(tmp.path(), username, "INBOX");
            write_entry(&dir, 3, Some("hi"), b"x", Naming::UidSubject).unwrap();

            let stats = account_stats(&account_dir(tmp.path(), username)).unwrap();
            assert_eq!(stats.len(), 1, "{username}");
            assert_eq!(stats[0].mailbox, "INBOX");
            assert_eq!(stats[0].max_uid, Some(3));
        }
    }

    #[test]
    fn test_inventory_and_write() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("INBOX");
        ensure_dir(&dir).unwrap();
        ensure_dir(&dir).unwrap();

        std::fs::write(dir.join("notes.txt"), b"x").unwrap();
        std::fs::create_dir(dir.join("5")).unwrap();
        write_entry(&dir, 3, Some("Hi"), b"Subject: Hi\r\n\r\n", Naming::UidSubject).unwrap();
        write_entry(&dir, 1, None, b"x", Naming::UidSubject).unwrap();

        let uids = inventory(&dir).unwrap();
        assert_eq!(uids.into_iter().collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(
            std::fs::read(dir.join("3-Hi.eml")).unwrap(),
            b"Subject: Hi\r\n\r\n"
        );
    }

    #[test]
    fn test_write_never_overwrites() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        write_entry(dir, 8, None, b"first", Naming::Uid).unwrap();
        let err = write_entry(dir, 8, None, b"second", Naming::Uid).unwrap_err();
        assert!(matches!(err, ArchiveError::EntryExists(_)));
        assert_eq!(std::fs::read(dir.join("8.eml")).unwrap(), b"first");
        // No staged leftovers
        assert_eq!(std::fs::read_dir(dir).unwrap().count(), 1);
    }

    #[test]
    fn test_write_rejects_uid_zero() {
        let tmp = tempfile::tempdir().unwrap();
        let err = write_entry(tmp.path(), 0, None, b"x", Naming::Uid).unwrap_err();
        assert!(matches!(err, ArchiveError::InvalidEntryName { uid: 0, .. }));
    }

    #[test]
    fn test_inventory_missing_dir_is_error() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(inventory(&tmp.path().join("missing")).is_err());
    }

    #[test]
    fn test_account_stats() {
        let tmp = tempfile::tempdir().unwrap();
        let inbox = tmp.path().join("INBOX");
        let sent = inbox.join("Sent");
        write_entry(&inbox, 1, None, b"abc", Naming::Uid).unwrap();
        write_entry(&inbox, 4, None, b"de", Naming::Uid).unwrap();
        write_entry(&sent, 2, Some("x"), b"f", Naming::UidSubject).unwrap();
        ensure_dir(&tmp.path().join("Empty")).unwrap();

        let stats = account_stats(tmp.path()).unwrap();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].mailbox, "INBOX");
        assert_eq!(stats[0].entries, 2);
        assert_eq!(stats[0].bytes, 5);
        assert_eq!(stats[0].max_uid, Some(4));
        assert_eq!(stats[1].mailbox, "INBOX/Sent");
        assert_eq!(stats[1].entries, 1);
    }
}
