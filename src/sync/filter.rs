//! Include/exclude filtering of remote mailbox names.

use crate::config::Account;

/// Why a mailbox was kept or skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    Keep,
    /// Named in the exclude list.
    Excluded,
    /// An include list is configured and does not name it.
    NotIncluded,
}

impl FilterDecision {
    pub fn is_kept(self) -> bool {
        self == Self::Keep
    }

    pub fn reason(self) -> &'static str {
        match self {
            Self::Keep => "kept",
            Self::Excluded => "excluded",
            Self::NotIncluded => "not in include list",
        }
    }
}

/// The two mailbox lists of an account. Matching is exact and case-sensitive.
#[derive(Debug, Clone, Copy)]
pub struct MailboxFilter<'a> {
    include: &'a [String],
    exclude: &'a [String],
}

impl<'a> MailboxFilter<'a> {
    pub fn new(include: &'a [String], exclude: &'a [String]) -> Self {
        Self { include, exclude }
    }

    pub fn from_account(account: &'a Account) -> Self {
        Self::new(&account.include, &account.exclude)
    }

    /// Exclusion is checked first; an empty include list includes everything.
    pub fn decide(&self, mailbox: &str) -> FilterDecision {
        if self.exclude.iter().any(|m| m == mailbox) {
            FilterDecision::Excluded
        } else if !self.include.is_empty() && !self.include.iter().any(|m| m == mailbox) {
            FilterDecision::NotIncluded
        } else {
            FilterDecision::Keep
        }
    }

    /// Decide every mailbox up front, preserving server order.
    pub fn partition<S: AsRef<str>>(&self, mailboxes: &[S]) -> Vec<(String, FilterDecision)> {
        mailboxes
            .iter()
            .map(|m| (m.as_ref().to_string(), self.decide(m.as_ref())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_exclude_only() {
        let (include, exclude) = (list(&[]), list(&["Trash"]));
        let filter = MailboxFilter::new(&include, &exclude);
        assert_eq!(filter.decide("Trash"), FilterDecision::Excluded);
        assert_eq!(filter.decide("INBOX"), FilterDecision::Keep);
        assert_eq!(filter.decide("trash"), FilterDecision::Keep);
    }

    #[test]
    fn test_include_only() {
        let (include, exclude) = (list(&["INBOX"]), list(&[]));
        let filter = MailboxFilter::new(&include, &exclude);
        assert_eq!(filter.decide("INBOX"), FilterDecision::Keep);
        assert_eq!(filter.decide("Archive"), FilterDecision::NotIncluded);
        assert_eq!(filter.decide("INBOX/Sub"), FilterDecision::NotIncluded);
    }

    #[test]
    fn test_exclude_wins_over_include() {
        let (include, exclude) = (list(&["INBOX", "Spam"]), list(&["Spam"]));
        let filter = MailboxFilter::new(&include, &exclude);
        assert_eq!(filter.decide("Spam"), FilterDecision::Excluded);
        assert!(filter.decide("INBOX").is_kept());
    }

    #[test]
    fn test_partition_keeps_order() {
        let (include, exclude) = (list(&[]), list(&["Junk"]));
        let filter = MailboxFilter::new(&include, &exclude);
        let decided = filter.partition(&["INBOX", "Junk", "Sent"]);
        let kept: Vec<&str> = decided
            .iter()
            .filter(|(_, d)| d.is_kept())
            .map(|(m, _)| m.as_str())
            .collect();
        assert_eq!(kept, vec!["INBOX", "Sent"]);
        assert_eq!(decided[1].1.reason(), "excluded");
    }
}
