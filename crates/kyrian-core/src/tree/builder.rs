use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, warn};

use super::node::{segments, Lookup, SnapshotTree};
use crate::engine::{DiffMap, DiffStatus, FileRecord, Timestamp};
use crate::error::{KyrianError, Result};

/// Folds a snapshot listing into a [`SnapshotTree`], one record at a time.
pub struct TreeBuilder {
    tree: SnapshotTree,
    lookup: Lookup,
    seen_root: bool,
}

impl TreeBuilder {
    pub fn new(root_name: impl Into<String>, timestamp: Timestamp, lookup: Lookup) -> Self {
        Self {
            tree: SnapshotTree::new(root_name, timestamp),
            lookup,
            seen_root: false,
        }
    }

    /// Add one record. The first record of a listing is the snapshot root
    /// and is consumed without touching the tree.
    pub fn insert(&mut self, record: &FileRecord) -> Result<()> {
        if !self.seen_root {
            self.seen_root = true;
            if record.path != b"." {
                warn!(path = %record.path_str(), "listing did not start with the snapshot root");
            }
            return Ok(());
        }
        if record.diff_status == Some(DiffStatus::Deleted) {
            return Ok(());
        }

        let parts: Vec<&[u8]> = segments(&record.path).collect();
        let mut parent = self.tree.root();
        for (i, name) in parts.iter().enumerate() {
            let terminal = i + 1 == parts.len();
            match self.tree.child(parent, name, self.lookup) {
                Some(id) => {
                    if terminal {
                        let node = self.tree.node_mut(id);
                        node.full_path = Some(record.path.clone());
                        node.node_type = record.entry_type;
                        node.timestamp = record.mtime;
                    }
                    parent = id;
                }
                None if terminal => {
                    self.tree.add_child(
                        parent,
                        name,
                        record.entry_type,
                        record.mtime,
                        Some(record.path.clone()),
                    );
                }
                None => return Err(KyrianError::PathBroken(record.path_str().into_owned())),
            }
        }
        Ok(())
    }

    pub fn finish(self) -> SnapshotTree {
        self.tree
    }
}

/// Build a whole tree from `records`, checking `cancelled` after every
/// record. Returns `Ok(None)` when cancelled.
pub fn build_tree<I>(
    records: I,
    root_name: &str,
    timestamp: Timestamp,
    lookup: Lookup,
    cancelled: &AtomicBool,
) -> Result<Option<SnapshotTree>>
where
    I: IntoIterator<Item = Result<FileRecord>>,
{
    let mut builder = TreeBuilder::new(root_name, timestamp, lookup);
    for record in records {
        builder.insert(&record?)?;
        if cancelled.load(Ordering::Relaxed) {
            debug!("tree build cancelled");
            return Ok(None);
        }
    }
    Ok(Some(builder.finish()))
}

/// Mark every node whose exact path differs in `diff`. Paths absent from the
/// tree are skipped. Returns `false` if cancelled part way.
pub fn apply_highlights(tree: &mut SnapshotTree, diff: &DiffMap, cancelled: &AtomicBool) -> bool {
    for (path, status) in diff {
        if status.is_difference() {
            if let Some(id) = tree.find(path) {
                tree.node_mut(id).highlighted = true;
            }
        }
        if cancelled.load(Ordering::Relaxed) {
            debug!("highlight pass cancelled");
            return false;
        }
    }
    true
}
