//! Reconciler - merges a remote batch into the local record set
//!
//! Last-writer-wins per record with an explicit conflict log. Not a
//! three-way merge: when the server wins, the local record is replaced as a
//! whole and its previous version only survives inside the `Conflict`.

use super::models::Conflict;
use crate::quotes::Quote;

/// Result of one merge pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeOutcome {
    pub merged: Vec<Quote>,
    pub conflicts: Vec<Conflict>,
    pub updated: bool,
    pub appended: usize,
    pub overwritten: usize,
}

/// Merge `remote` into a copy of `local`
///
/// - unknown id: appended
/// - known id, remote strictly newer and not identical: slot overwritten,
///   conflict recorded with the pre-merge local copy
/// - known id otherwise (older, same timestamp, identical): untouched
pub fn merge(local: &[Quote], remote: &[Quote]) -> MergeOutcome {
    let mut outcome = MergeOutcome {
        merged: local.to_vec(),
        ..Default::default()
    };

    for server_item in remote {
        match outcome.merged.iter().position(|q| q.id == server_item.id) {
            None => {
                outcome.merged.push(server_item.clone());
                outcome.appended += 1;
                outcome.updated = true;
            }
            Some(index) => {
                let local_item = &outcome.merged[index];
                let server_is_newer = server_item.last_updated > local_item.last_updated;

                if server_is_newer && server_item != local_item {
                    log::debug!(
                        "Quote {} changed on server ({} > {})",
                        server_item.id,
                        server_item.last_updated,
                        local_item.last_updated
                    );

                    let previous = std::mem::replace(&mut outcome.merged[index], server_item.clone());
                    outcome.conflicts.push(Conflict {
                        id: server_item.id,
                        local: previous,
                        server: server_item.clone(),
                    });
                    outcome.overwritten += 1;
                    outcome.updated = true;
                }
            }
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quotes::QuoteSource;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn quote(id: i64, text: &str, category: &str, at: DateTime<Utc>) -> Quote {
        Quote {
            id,
            text: text.to_string(),
            category: category.to_string(),
            last_updated: at,
            source: None,
            synced: None,
            last_synced: None,
            resolved: None,
            resolution: None,
        }
    }

    #[test]
    fn test_newer_server_record_overwrites_and_conflicts() {
        let t1 = t0() + Duration::minutes(5);
        let local = vec![quote(1, "A", "x", t0())];
        let remote = vec![quote(1, "B", "server", t1)];

        let outcome = merge(&local, &remote);

        assert!(outcome.updated);
        assert_eq!(outcome.merged, vec![quote(1, "B", "server", t1)]);
        assert_eq!(outcome.conflicts.len(), 1);
        assert_eq!(outcome.conflicts[0].id, 1);
        assert_eq!(outcome.conflicts[0].local, local[0]);
        assert_eq!(outcome.conflicts[0].server, remote[0]);
        assert_eq!(outcome.overwritten, 1);
    }

    #[test]
    fn test_unknown_remote_ids_are_appended() {
        let local = vec![quote(1, "A", "x", t0())];
        let remote = vec![quote(2, "B", "server", t0()), quote(3, "C", "server", t0())];

        let outcome = merge(&local, &remote);

        assert!(outcome.updated);
        assert!(outcome.conflicts.is_empty());
        assert_eq!(outcome.merged.len(), 3);
        assert_eq!(outcome.merged[0], local[0]);
        assert_eq!(outcome.appended, 2);
    }

    #[test]
    fn test_local_records_missing_from_remote_untouched() {
        let local = vec![quote(1, "A", "x", t0()), quote(2, "B", "y", t0())];
        let remote = vec![quote(3, "C", "server", t0())];

        let outcome = merge(&local, &remote);
        assert_eq!(&outcome.merged[..2], &local[..]);
    }

    #[test]
    fn test_equal_timestamp_favors_local() {
        let local = vec![quote(1, "A", "x", t0())];
        let remote = vec![quote(1, "B", "server", t0())];

        let outcome = merge(&local, &remote);

        assert!(!outcome.updated);
        assert!(outcome.conflicts.is_empty());
        assert_eq!(outcome.merged, local);
    }

    #[test]
    fn test_older_server_record_ignored() {
        let local = vec![quote(1, "A", "x", t0())];
        let remote = vec![quote(1, "B", "server", t0() - Duration::hours(1))];

        let outcome = merge(&local, &remote);

        assert!(!outcome.updated);
        assert!(outcome.conflicts.is_empty());
        assert_eq!(outcome.merged, local);
    }

    #[test]
    fn test_comparison_is_full_structural() {
        let t1 = t0() + Duration::seconds(1);
        let mut local_item = quote(1, "A", "x", t0());
        local_item.source = Some(QuoteSource::Local);
        let mut server_item = quote(1, "A", "x", t1);
        server_item.source = Some(QuoteSource::Local);

        // Same text and category, but the timestamp differs: still a conflict
        let outcome = merge(&[local_item], &[server_item.clone()]);
        assert_eq!(outcome.conflicts.len(), 1);
        assert_eq!(outcome.merged, vec![server_item]);
    }

    #[test]
    fn test_empty_remote_is_noop() {
        let local = vec![quote(1, "A", "x", t0())];
        let outcome = merge(&local, &[]);
        assert!(!outcome.updated);
        assert_eq!(outcome.merged, local);
    }

    #[test]
    fn test_duplicate_ids_in_batch_compare_against_merged() {
        let t1 = t0() + Duration::seconds(1);
        let remote = vec![quote(9, "first", "server", t0()), quote(9, "second", "server", t1)];

        let outcome = merge(&[], &remote);

        assert_eq!(outcome.merged, vec![quote(9, "second", "server", t1)]);
        assert_eq!(outcome.appended, 1);
        assert_eq!(outcome.conflicts.len(), 1);
    }
}
