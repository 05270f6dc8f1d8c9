//! Sync planning: which remote UIDs are not archived yet.

use std::collections::BTreeSet;

/// The delta for one mailbox.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    /// UIDs to fetch, ascending and unique.
    pub uids: Vec<u32>,
    /// Distinct valid UIDs reported by the server.
    pub remote: usize,
    /// Remote UIDs already present locally.
    pub archived: usize,
}

impl SyncPlan {
    pub fn is_empty(&self) -> bool {
        self.uids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.uids.len()
    }
}

/// Compute remote minus local.
///
/// `remote` may arrive unsorted or with repeats; UID 0 is not a valid UID
/// and never planned. Local UIDs the server no longer has are ignored.
pub fn plan(remote: &[u32], local: &BTreeSet<u32>) -> SyncPlan {
    let remote: BTreeSet<u32> = remote.iter().copied().filter(|&uid| uid > 0).collect();
    let uids: Vec<u32> = remote.difference(local).copied().collect();
    SyncPlan {
        archived: remote.len() - uids.len(),
        remote: remote.len(),
        uids,
    }
}

/// A contiguous run of sequence numbers and the UIDs expected at each one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceRun {
    pub start: u32,
    pub end: u32,
    /// `expected[k]` is the UID at sequence number `start + k`.
    pub expected: Vec<u32>,
}

/// Group planned UIDs into runs of at most `window` consecutive sequence
/// numbers.
///
/// `remote_sorted` is the full ascending UID list of the mailbox; UIDs
/// ascend with sequence numbers, so the UID at index `i` has sequence
/// number `i + 1`. Planned UIDs missing from `remote_sorted` are skipped.
pub fn sequence_runs(planned: &[u32], remote_sorted: &[u32], window: usize) -> Vec<SequenceRun> {
    let window = window.max(1);
    let mut runs: Vec<SequenceRun> = Vec::new();

    for &uid in planned {
        let Ok(index) = remote_sorted.binary_search(&uid) else {
            continue;
        };
        let seq = index as u32 + 1;

        match runs.last_mut() {
            Some(run) if run.end + 1 == seq && run.expected.len() < window => {
                run.end = seq;
                run.expected.push(uid);
            }
            _ => runs.push(SequenceRun {
                start: seq,
                end: seq,
                expected: vec![uid],
            }),
        }
    }

    runs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[u32]) -> BTreeSet<u32> {
        items.iter().copied().collect()
    }

    #[test]
    fn test_first_sync_plans_everything() {
        let p = plan(&[3, 1, 2], &set(&[]));
        assert_eq!(p.uids, vec![1, 2, 3]);
        assert_eq!(p.remote, 3);
        assert_eq!(p.archived, 0);
    }

    #[test]
    fn test_empty_remote() {
        let p = plan(&[], &set(&[1, 2]));
        assert!(p.is_empty());
        assert_eq!(p.archived, 0);
    }

    #[test]
    fn test_steady_state_plans_nothing() {
        let p = plan(&[1, 2, 3], &set(&[1, 2, 3]));
        assert!(p.is_empty());
        assert_eq!(p.archived, 3);
    }

    #[test]
    fn test_difference_dedup_and_zero() {
        let p = plan(&[9, 4, 4, 0, 7, 9, 12], &set(&[7, 100]));
        assert_eq!(p.uids, vec![4, 9, 12]);
        assert_eq!(p.remote, 4);
        assert_eq!(p.archived, 1);
    }

    #[test]
    fn test_sequence_runs_split_on_gaps_and_window() {
        let remote = [10, 11, 12, 13, 14, 20, 21];
        // seq: 10→1 11→2 12→3 13→4 14→5 20→6 21→7
        let runs = sequence_runs(&[10, 11, 12, 14, 20, 21], &remote, 2);
        let spans: Vec<(u32, u32)> = runs.iter().map(|r| (r.start, r.end)).collect();
        assert_eq!(spans, vec![(1, 2), (3, 3), (5, 6), (7, 7)]);
        assert_eq!(runs[2].expected, vec![14, 20]);
    }

    #[test]
    fn test_sequence_runs_default_window() {
        let remote: Vec<u32> = (1..=25).collect();
        let runs = sequence_runs(&remote, &remote, 10);
        assert_eq!(runs.len(), 3);
        assert_eq!(runs[2].start, 21);
        assert_eq!(runs[2].end, 25);
        assert_eq!(runs[2].expected, vec![21, 22, 23, 24, 25]);
    }

    #[test]
    fn test_sequence_runs_skip_unknown() {
        let runs = sequence_runs(&[5, 6], &[1, 5], 10);
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].expected, vec![5]);
        assert_eq!(runs[0].start, 2);
    }
}
