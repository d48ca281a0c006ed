//! Property-based test generators using proptest.
//!
//! Names and timestamps are drawn from small domains so that generated
//! catalogs overlap, share names with different creation times, and tie on
//! timestamps often enough to matter.

use proptest::prelude::*;
use zbackup_engine::{Catalog, Snapshot};

/// Strategy for generating valid snapshot names.
pub fn snapshot_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_.-]{0,15}").expect("Invalid regex")
}

/// Strategy for snapshot values drawn from a small name and time domain.
pub fn snapshot_strategy() -> impl Strategy<Value = Snapshot> {
    (0u8..8, 1i64..20).prop_map(|(name, created_at)| Snapshot::new(format!("s{name}"), created_at))
}

/// Strategy for catalogs of up to `max_len` snapshots on `volume`.
pub fn catalog_strategy(volume: &'static str, max_len: usize) -> impl Strategy<Value = Catalog> {
    prop::collection::vec(snapshot_strategy(), 0..=max_len)
        .prop_map(move |snapshots| Catalog::from_snapshots(volume, snapshots))
}

/// Strategy for a primary and backup catalog pair.
///
/// About half of the pairs have the backup built from a subset of the
/// primary, so checkpoints are common.
pub fn catalog_pair_strategy() -> impl Strategy<Value = (Catalog, Catalog)> {
    let independent = (catalog_strategy("tank", 8), catalog_strategy("backup", 8));
    let derived = (
        catalog_strategy("tank", 8),
        prop::collection::vec(any::<bool>(), 8),
        catalog_strategy("backup", 3),
    )
        .prop_map(|(primary, keep, extra)| {
            let mut snapshots: Vec<Snapshot> = primary
                .iter()
                .zip(keep)
                .filter(|(_, keep)| *keep)
                .map(|(s, _)| s.clone())
                .collect();
            snapshots.extend(extra.iter().cloned());
            (primary, Catalog::from_snapshots("backup", snapshots))
        });
    prop_oneof![independent, derived]
}

/// Strategy for a linear primary history and how much of it the backup
/// already holds.
///
/// Names are unique and creation times strictly increase, as on a real
/// volume. The second value is the length of the replicated prefix.
pub fn replicated_history_strategy(
    max_len: usize,
) -> impl Strategy<Value = (Vec<(String, i64)>, usize)> {
    prop::collection::vec(1i64..1000, 0..=max_len)
        .prop_flat_map(|gaps| {
            let len = gaps.len();
            (Just(gaps), 0..=len)
        })
        .prop_map(|(gaps, replicated)| {
            let mut created_at = 0;
            let history = gaps
                .into_iter()
                .enumerate()
                .map(|(i, gap)| {
                    created_at += gap;
                    (format!("snap{i}"), created_at)
                })
                .collect();
            (history, replicated)
        })
}
