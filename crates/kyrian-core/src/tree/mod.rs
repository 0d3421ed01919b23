mod builder;
mod node;

pub use self::builder::{apply_highlights, build_tree, TreeBuilder};
pub use self::node::{Lookup, NodeId, SnapshotTree, TreeNode, Walk};

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::AtomicBool;

    use super::*;
    use crate::engine::{DiffMap, DiffStatus, EntryType, FileRecord};
    use crate::error::{KyrianError, Result};

    fn dir(path: &str) -> FileRecord {
        FileRecord::new(path, 100, EntryType::Directory)
    }

    fn reg(path: &str) -> FileRecord {
        FileRecord::new(path, 100, EntryType::RegularFile)
    }

    fn build(records: Vec<FileRecord>, lookup: Lookup) -> Result<SnapshotTree> {
        let stop = AtomicBool::new(false);
        build_tree(records.into_iter().map(Ok), "home", 200, lookup, &stop)
            .map(|t| t.expect("not cancelled"))
    }

    fn names(tree: &SnapshotTree, id: NodeId) -> Vec<&str> {
        tree.node(id)
            .children()
            .iter()
            .map(|&c| tree.node(c).name.as_str())
            .collect()
    }

    fn ordered_listing() -> Vec<FileRecord> {
        vec![
            dir("."),
            dir("a"),
            reg("a/b.txt"),
            reg("a/c.txt"),
            dir("a/sub"),
            reg("a/sub/x"),
            reg("d.txt"),
            dir("e"),
        ]
    }

    #[test]
    fn folds_listing_into_hierarchy() {
        let tree = build(
            vec![dir("."), dir("a"), reg("a/b.txt"), reg("a/c.txt"), reg("d.txt")],
            Lookup::Ordered,
        )
        .unwrap();
        let root = tree.root();
        assert_eq!(tree.node(root).name, "home");
        assert_eq!(tree.timestamp(), 200);
        assert_eq!(names(&tree, root), ["a", "d.txt"]);

        let a = tree.find("a").unwrap();
        assert!(tree.node(a).is_dir());
        assert_eq!(names(&tree, a), ["b.txt", "c.txt"]);
        let d = tree.find("d.txt").unwrap();
        assert_eq!(tree.node(d).node_type, EntryType::RegularFile);
        assert_eq!(tree.node(d).full_path.as_deref(), Some(&b"d.txt"[..]));
    }

    #[test]
    fn root_record_only_gives_empty_tree() {
        let tree = build(vec![dir(".")], Lookup::Ordered).unwrap();
        assert!(tree.is_empty());
        assert_eq!(tree.len(), 1);

        let tree = build(vec![], Lookup::Ordered).unwrap();
        assert!(tree.is_empty());
    }

    #[test]
    fn every_node_path_matches_its_record_and_is_unique() {
        let tree = build(ordered_listing(), Lookup::Ordered).unwrap();
        for (_, id) in tree.walk().skip(1) {
            let node = tree.node(id);
            assert_eq!(node.full_path.as_deref(), Some(tree.path_of(id).as_bytes()));
            let siblings = names(&tree, node.parent().unwrap());
            let unique: HashSet<_> = siblings.iter().collect();
            assert_eq!(unique.len(), siblings.len());
        }
    }

    #[test]
    fn ordered_and_unordered_lookup_agree_on_ordered_input() {
        let fast = build(ordered_listing(), Lookup::Ordered).unwrap();
        let scan = build(ordered_listing(), Lookup::Unordered).unwrap();
        assert_eq!(fast, scan);
    }

    #[test]
    fn child_before_parent_is_path_broken() {
        for lookup in [Lookup::Ordered, Lookup::Unordered] {
            let err = build(vec![dir("."), reg("a/b.txt"), dir("a")], lookup).unwrap_err();
            assert!(matches!(err, KyrianError::PathBroken(ref p) if p == "a/b.txt"));
        }
    }

    #[test]
    fn revisiting_an_earlier_sibling_breaks_ordered_lookup_only() {
        let listing = vec![dir("."), dir("a"), reg("d.txt"), reg("a/late.txt")];
        assert!(matches!(
            build(listing.clone(), Lookup::Ordered),
            Err(KyrianError::PathBroken(_))
        ));
        let tree = build(listing, Lookup::Unordered).unwrap();
        assert!(tree.find("a/late.txt").is_some());
    }

    #[test]
    fn undecodable_names_stay_separate_nodes() {
        let mut tree = build(
            vec![
                dir("."),
                FileRecord::new(b"a\xff".to_vec(), 100, EntryType::RegularFile),
                FileRecord::new(b"a\xfe".to_vec(), 100, EntryType::RegularFile),
            ],
            Lookup::Ordered,
        )
        .unwrap();
        let root = tree.root();
        assert_eq!(tree.node(root).children().len(), 2);

        let second = tree.find(b"a\xfe").unwrap();
        assert_eq!(tree.node(second).full_path.as_deref(), Some(&b"a\xfe"[..]));
        assert_eq!(tree.node(second).name, "a\u{fffd}");

        let diff: DiffMap = [(b"a\xfe".to_vec(), DiffStatus::Changed)].into_iter().collect();
        assert!(apply_highlights(&mut tree, &diff, &AtomicBool::new(false)));
        assert_eq!(tree.highlighted().collect::<Vec<_>>(), [second]);
    }

    #[test]
    fn deleted_records_are_skipped() {
        let tree = build(
            vec![
                dir("."),
                reg("kept"),
                reg("gone").with_status(DiffStatus::Deleted),
                reg("new").with_status(DiffStatus::Added),
            ],
            Lookup::Ordered,
        )
        .unwrap();
        assert_eq!(names(&tree, tree.root()), ["kept", "new"]);
    }

    #[test]
    fn highlights_exact_paths_only() {
        let mut tree = build(
            vec![dir("."), dir("a"), reg("a/b.txt"), reg("a/c.txt"), reg("d.txt")],
            Lookup::Ordered,
        )
        .unwrap();
        let diff: DiffMap = [
            (b"a/c.txt".to_vec(), DiffStatus::Changed),
            (b"d.txt".to_vec(), DiffStatus::Unchanged),
            (b"missing/file".to_vec(), DiffStatus::Deleted),
        ]
        .into_iter()
        .collect();

        assert!(apply_highlights(&mut tree, &diff, &AtomicBool::new(false)));
        let lit: Vec<String> = tree.highlighted().map(|id| tree.path_of(id)).collect();
        assert_eq!(lit, ["a/c.txt"]);
        assert!(!tree.node(tree.root()).highlighted);
        assert!(!tree.node(tree.find("a").unwrap()).highlighted);

        tree.clear_highlights();
        assert_eq!(tree.highlighted().count(), 0);
    }

    #[test]
    fn cancellation_stops_build_and_highlight() {
        let stop = AtomicBool::new(true);
        let built = build_tree(
            ordered_listing().into_iter().map(Ok),
            "home",
            1,
            Lookup::Ordered,
            &stop,
        )
        .unwrap();
        assert!(built.is_none());

        let mut tree = build(ordered_listing(), Lookup::Ordered).unwrap();
        let diff: DiffMap = [
            (b"a/b.txt".to_vec(), DiffStatus::Changed),
            (b"d.txt".to_vec(), DiffStatus::Changed),
        ]
        .into_iter()
        .collect();
        assert!(!apply_highlights(&mut tree, &diff, &stop));
        assert_eq!(tree.highlighted().count(), 1);
    }

    #[test]
    fn stream_errors_abort_the_build() {
        let stop = AtomicBool::new(false);
        let records = vec![
            Ok(dir(".")),
            Ok(reg("a")),
            Err(KyrianError::Parse("bad line".into())),
        ];
        let err = build_tree(records, "home", 1, Lookup::Ordered, &stop).unwrap_err();
        assert!(matches!(err, KyrianError::Parse(_)));
    }

    #[test]
    fn walk_is_preorder_with_depths() {
        let tree = build(ordered_listing(), Lookup::Ordered).unwrap();
        let order: Vec<(usize, String)> = tree
            .walk()
            .map(|(d, id)| (d, tree.node(id).name.clone()))
            .collect();
        assert_eq!(
            order,
            [
                (0, "home"),
                (1, "a"),
                (2, "b.txt"),
                (2, "c.txt"),
                (2, "sub"),
                (3, "x"),
                (1, "d.txt"),
                (1, "e"),
            ]
            .map(|(d, n)| (d, n.to_string()))
        );
    }
}
