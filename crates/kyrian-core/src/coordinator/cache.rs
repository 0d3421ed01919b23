use std::collections::HashMap;
use std::sync::Arc;

use crate::engine::{DiffMap, Timestamp};
use crate::tree::SnapshotTree;

#[derive(Debug, Default)]
struct Entry {
    tree: Option<SnapshotTree>,
    diff: Option<Arc<DiffMap>>,
}

/// Per-snapshot results kept between tree builds. Trees are stored without
/// highlights.
#[derive(Debug, Default)]
pub(super) struct SnapshotCache {
    entries: HashMap<Timestamp, Entry>,
}

impl SnapshotCache {
    pub(super) fn tree(&self, time: Timestamp) -> Option<SnapshotTree> {
        self.entries.get(&time)?.tree.clone()
    }

    pub(super) fn diff(&self, time: Timestamp) -> Option<Arc<DiffMap>> {
        self.entries.get(&time)?.diff.clone()
    }

    pub(super) fn store_tree(&mut self, time: Timestamp, mut tree: SnapshotTree) {
        tree.clear_highlights();
        self.entries.entry(time).or_default().tree = Some(tree);
    }

    pub(super) fn store_diff(&mut self, time: Timestamp, diff: Arc<DiffMap>) {
        self.entries.entry(time).or_default().diff = Some(diff);
    }

    /// Drop every diff; the live source may have changed.
    pub(super) fn invalidate_diffs(&mut self) {
        for entry in self.entries.values_mut() {
            entry.diff = None;
        }
    }

    /// Keep only snapshots for which `keep` holds.
    pub(super) fn retain(&mut self, mut keep: impl FnMut(Timestamp) -> bool) {
        self.entries.retain(|&time, _| keep(time));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::DiffStatus;

    #[test]
    fn stores_trees_and_diffs_per_snapshot() {
        let mut cache = SnapshotCache::default();
        assert!(cache.tree(100).is_none());

        cache.store_tree(100, SnapshotTree::new("src", 100));
        let diff: DiffMap = [(b"a".to_vec(), DiffStatus::Added)].into_iter().collect();
        cache.store_diff(100, Arc::new(diff));

        assert_eq!(cache.tree(100).unwrap().timestamp(), 100);
        assert_eq!(cache.diff(100).unwrap().len(), 1);
        assert!(cache.diff(200).is_none());

        cache.invalidate_diffs();
        assert!(cache.diff(100).is_none());
        assert!(cache.tree(100).is_some());
    }

    #[test]
    fn retain_forgets_vanished_snapshots() {
        let mut cache = SnapshotCache::default();
        cache.store_tree(100, SnapshotTree::new("src", 100));
        cache.store_tree(200, SnapshotTree::new("src", 200));
        cache.store_diff(200, Arc::new(DiffMap::new()));

        cache.retain(|time| time == 200);
        assert!(cache.tree(100).is_none());
        assert!(cache.tree(200).is_some());
        assert!(cache.diff(200).is_some());
    }
}
