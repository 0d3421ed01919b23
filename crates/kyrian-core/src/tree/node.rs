use crate::engine::{EntryType, Timestamp};

/// Index of a node inside its [`SnapshotTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    /// Display name; `raw_name` decoded lossily.
    pub name: String,
    /// Path segment exactly as the engine listed it.
    pub raw_name: Vec<u8>,
    /// Raw relative path of the listing record that created or last visited
    /// this node. `None` for the root.
    pub full_path: Option<Vec<u8>>,
    pub node_type: EntryType,
    pub timestamp: Timestamp,
    pub highlighted: bool,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl TreeNode {
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn is_dir(&self) -> bool {
        self.node_type == EntryType::Directory
    }
}

/// How a child is located by name while walking a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// Only the most recently added child is considered. Correct for
    /// depth-first, lexicographically ordered input.
    Ordered,
    /// Most recent child first, then every child.
    Unordered,
}

/// Arena-backed hierarchy for one snapshot. Node 0 is the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotTree {
    nodes: Vec<TreeNode>,
}

impl SnapshotTree {
    pub fn new(root_name: impl Into<String>, timestamp: Timestamp) -> Self {
        let name = root_name.into();
        Self {
            nodes: vec![TreeNode {
                raw_name: name.as_bytes().to_vec(),
                name,
                full_path: None,
                node_type: EntryType::Directory,
                timestamp,
                highlighted: false,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn node(&self, id: NodeId) -> &TreeNode {
        &self.nodes[id.0]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut TreeNode {
        &mut self.nodes[id.0]
    }

    /// Number of nodes, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes[0].children.is_empty()
    }

    pub fn timestamp(&self) -> Timestamp {
        self.nodes[0].timestamp
    }

    pub(crate) fn add_child(
        &mut self,
        parent: NodeId,
        name: &[u8],
        node_type: EntryType,
        timestamp: Timestamp,
        full_path: Option<Vec<u8>>,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(TreeNode {
            name: String::from_utf8_lossy(name).into_owned(),
            raw_name: name.to_vec(),
            full_path,
            node_type,
            timestamp,
            highlighted: false,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    /// Child of `parent` whose raw name is `name`.
    pub fn child(&self, parent: NodeId, name: &[u8], lookup: Lookup) -> Option<NodeId> {
        let children = &self.nodes[parent.0].children;
        let last = *children.last()?;
        if self.nodes[last.0].raw_name == name {
            return Some(last);
        }
        match lookup {
            Lookup::Ordered => None,
            Lookup::Unordered => children
                .iter()
                .copied()
                .find(|c| self.nodes[c.0].raw_name == name),
        }
    }

    /// Node at relative `path`, if present.
    pub fn find(&self, path: impl AsRef<[u8]>) -> Option<NodeId> {
        segments(path.as_ref()).try_fold(self.root(), |id, seg| {
            self.child(id, seg, Lookup::Unordered)
        })
    }

    /// Display names from below the root down to `id`, joined by `/`.
    pub fn path_of(&self, id: NodeId) -> String {
        let mut names = Vec::new();
        let mut cur = id;
        while let Some(parent) = self.nodes[cur.0].parent {
            names.push(self.nodes[cur.0].name.as_str());
            cur = parent;
        }
        names.reverse();
        names.join("/")
    }

    pub fn clear_highlights(&mut self) {
        for node in &mut self.nodes {
            node.highlighted = false;
        }
    }

    pub fn highlighted(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len())
            .map(NodeId)
            .filter(|id| self.nodes[id.0].highlighted)
    }

    /// Pre-order traversal yielding `(depth, node)`; the root has depth 0.
    pub fn walk(&self) -> Walk<'_> {
        Walk {
            tree: self,
            stack: vec![(0, self.root())],
        }
    }
}

pub struct Walk<'a> {
    tree: &'a SnapshotTree,
    stack: Vec<(usize, NodeId)>,
}

impl Iterator for Walk<'_> {
    type Item = (usize, NodeId);

    fn next(&mut self) -> Option<Self::Item> {
        let (depth, id) = self.stack.pop()?;
        let children = self.tree.node(id).children();
        self.stack
            .extend(children.iter().rev().map(|&c| (depth + 1, c)));
        Some((depth, id))
    }
}

/// Non-empty path segments, ignoring `.` components.
pub(crate) fn segments(path: &[u8]) -> impl Iterator<Item = &[u8]> {
    path.split(|&b| b == b'/').filter(|s| !s.is_empty() && *s != b".")
}
