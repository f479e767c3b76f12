use crate::{
    basic::BasicNode,
    dense::{DenseNode, KeyClass},
    error::{error_corrupted, error_validation},
    node::AnyNode,
    options::TreeOptions,
    page::{Page, PageArena},
    repr::{PageId, PAGE_ID_SIZE},
    utils::EscapedBytes,
    Error, KeyBuf,
};

/// Node counts of a tree, see [Tree::stats]
#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct TreeStats {
    /// Number of levels, a tree with a single leaf has height 1
    pub height: usize,
    pub inner_nodes: usize,
    pub basic_leaves: usize,
    pub dense_leaves: usize,
    /// Number of key-value pairs
    pub entries: usize,
}

/// An ordered map of byte keys to byte values stored in fixed size pages.
///
/// Inner nodes and most leafs use the basic (slotted page) representation,
/// leafs holding runs of fixed length numeric keys may switch to the dense representation.
#[derive(Debug)]
pub struct Tree {
    #[debug("{} pages", pages.len())]
    pages: PageArena,
    root: PageId,
    options: TreeOptions,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    /// Creates an empty tree with the default options
    pub fn new() -> Self {
        Self::init(TreeOptions::default())
    }

    pub fn with_options(options: TreeOptions) -> Result<Self, Error> {
        options.validate()?;
        Ok(Self::init(options))
    }

    fn init(options: TreeOptions) -> Self {
        let mut pages = PageArena::default();
        let root = pages.allocate();
        let mut leaf = BasicNode::init(pages.get_mut(root), true);
        leaf.set_fences(b"", b"");
        Self {
            pages,
            root,
            options,
        }
    }

    pub fn options(&self) -> &TreeOptions {
        &self.options
    }

    fn node(&self, id: PageId) -> Result<AnyNode<&Page>, Error> {
        AnyNode::from_page(self.pages.get(id))
    }

    /// Page ids from the root to the leaf covering `key`
    fn path_to_leaf(&self, key: &[u8]) -> Result<Vec<PageId>, Error> {
        let mut path = vec![self.root];
        loop {
            let node_id = path[path.len() - 1];
            match self.node(node_id)? {
                AnyNode::Basic(node) if !node.is_leaf() => path.push(node.child_for(key)),
                _ => return Ok(path),
            }
        }
    }

    fn find_leaf(&self, key: &[u8]) -> Result<PageId, Error> {
        let mut node_id = self.root;
        loop {
            match self.node(node_id)? {
                AnyNode::Basic(node) if !node.is_leaf() => node_id = node.child_for(key),
                _ => return Ok(node_id),
            }
        }
    }

    /// Returns the value corresponding to the key.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        let leaf = self.node(self.find_leaf(key)?)?;
        Ok(leaf.lookup(key).map(<[u8]>::to_vec))
    }

    /// Returns whether the tree has an entry for `key`.
    pub fn contains_key(&self, key: &[u8]) -> Result<bool, Error> {
        let leaf = self.node(self.find_leaf(key)?)?;
        Ok(leaf.lookup(key).is_some())
    }

    /// Inserts a key-value pair into the map.
    ///
    /// If the map did have this key present, the value is updated.
    pub fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<(), Error> {
        self.validate_key_value_lengths(key, value)?;
        loop {
            let path = self.path_to_leaf(key)?;
            let leaf_id = path[path.len() - 1];
            let densify = match AnyNode::from_page(self.pages.get_mut(leaf_id))?.insert(key, value) {
                (_, true) => return Ok(()),
                (AnyNode::Basic(_), false) => self.options.dense_leaves,
                (AnyNode::Dense(_), false) => false,
            };
            if densify && self.densify_leaf(leaf_id, key, value) {
                continue;
            }
            self.split_node(&path, key)?;
        }
    }

    /// Delete `key` from the tree.
    ///
    /// Returns a boolean indicating whether an entry was deleted.
    pub fn remove(&mut self, key: &[u8]) -> Result<bool, Error> {
        let leaf_id = self.find_leaf(key)?;
        Ok(AnyNode::from_page(self.pages.get_mut(leaf_id))?.remove(key))
    }

    /// Calls `f` with the entries >= `start` in key order until it returns false.
    pub fn scan(
        &self,
        start: &[u8],
        mut f: impl FnMut(&[u8], &[u8]) -> bool,
    ) -> Result<(), Error> {
        let mut key = KeyBuf::from_slice(start);
        loop {
            let leaf = self.node(self.find_leaf(&key)?)?;
            if !leaf.for_each_from(&key, &mut f) {
                return Ok(());
            }
            let upper = leaf.upper_fence();
            if upper.is_empty() {
                return Ok(());
            }
            // smallest key greater than the upper fence, the first one of the next leaf
            key.clear();
            key.extend_from_slice(upper);
            key.push(0);
        }
    }

    fn validate_key_value_lengths(&self, key: &[u8], value: &[u8]) -> Result<(), Error> {
        if key.is_empty() {
            return Err(error_validation!("Empty keys aren't supported"));
        }
        if key.len() > self.options.max_key_len {
            return Err(Error::KeyTooLarge(key.len()));
        }
        if value.len() > self.options.max_value_len {
            return Err(Error::ValueTooLarge(value.len()));
        }
        Ok(())
    }

    /// Replaces a full basic leaf with its dense version if that one can take the entry.
    fn densify_leaf(&mut self, leaf_id: PageId, key: &[u8], value: &[u8]) -> bool {
        let page = self.pages.get(leaf_id).clone();
        let Ok(dense) = DenseNode::try_densify(BasicNode::from_page(page)) else {
            return false;
        };
        let fits = value.len() == dense.val_len()
            && matches!(dense.classify_full_key(key), KeyClass::Index(_));
        if !fits {
            return false;
        }
        debug!(
            "densified leaf {leaf_id}, {} keys in {} slots",
            dense.len(),
            dense.slot_count()
        );
        *self.pages.get_mut(leaf_id) = dense.into_page();
        true
    }

    /// Adds an empty root above the current one
    fn grow_root(&mut self) -> PageId {
        let new_root = self.pages.allocate();
        let mut root = BasicNode::init(self.pages.get_mut(new_root), false);
        root.set_fences(b"", b"");
        root.set_upper_child(self.root);
        debug!("new root {new_root} above {}", self.root);
        self.root = new_root;
        new_root
    }

    /// Splits the last node of `path` (from the root) that couldn't take `key`.
    ///
    /// If the parent doesn't have space for the separator the parent is split instead,
    /// either way the caller is expected to retry the insert.
    fn split_node(&mut self, path: &[PageId], key: &[u8]) -> Result<(), Error> {
        let node_id = path[path.len() - 1];
        let sep_len = match self.node(node_id)? {
            AnyNode::Dense(dense) if dense.is_empty() => None,
            AnyNode::Dense(dense) => Some(dense.full_key_len()),
            AnyNode::Basic(basic) => Some(basic.find_separator().len),
        };
        let Some(sep_len) = sep_len else {
            // no separator, a basic leaf takes any key
            let page = self.pages.get_mut(node_id);
            DenseNode::from_page(page).into_basic();
            debug!("empty dense leaf {node_id} converted to basic");
            return Ok(());
        };

        let parent_id = match path.len() {
            1 => self.grow_root(),
            len => path[len - 2],
        };
        let parent_has_space =
            BasicNode::from_page(self.pages.get(parent_id)).has_space_for(sep_len, PAGE_ID_SIZE);
        if !parent_has_space {
            trace!("parent {parent_id} of {node_id} is full, splitting it first");
            return self.split_node(&path[..path.len() - 1], key);
        }

        let left_id = self.pages.allocate();
        let [node_page, parent_page, left_page] =
            self.pages.get_disjoint_mut([node_id, parent_id, left_id]);
        let mut parent = BasicNode::from_page(parent_page);
        match AnyNode::from_page(node_page)? {
            AnyNode::Basic(basic) => {
                let sep = basic.find_separator();
                basic.split(&mut parent, left_id, left_page, sep);
            }
            AnyNode::Dense(dense) => {
                dense.split(&mut parent, left_id, left_page, key);
            }
        }
        trace!("split {node_id} into {left_id} and {node_id}, parent {parent_id}");
        Ok(())
    }

    /// Node counts by representation, height and number of entries.
    pub fn stats(&self) -> Result<TreeStats, Error> {
        let mut stats = TreeStats::default();
        self.collect_stats(self.root, 1, &mut stats)?;
        Ok(stats)
    }

    fn collect_stats(&self, id: PageId, depth: usize, stats: &mut TreeStats) -> Result<(), Error> {
        stats.height = stats.height.max(depth);
        match self.node(id)? {
            AnyNode::Basic(node) if !node.is_leaf() => {
                stats.inner_nodes += 1;
                for slot in 0..node.count() {
                    self.collect_stats(node.child_at(slot), depth + 1, stats)?;
                }
                self.collect_stats(node.upper_child(), depth + 1, stats)?;
            }
            AnyNode::Basic(node) => {
                stats.basic_leaves += 1;
                stats.entries += node.count();
            }
            AnyNode::Dense(node) => {
                stats.dense_leaves += 1;
                stats.entries += node.len();
            }
        }
        Ok(())
    }

    /// Walks the whole tree checking that fences match the parent separators,
    /// keys are sorted and within their node fences and all leafs are at the same depth.
    pub fn validate(&self) -> Result<(), Error> {
        self.validate_node(self.root, b"", b"").map(drop)
    }

    /// Returns the height of the subtree
    fn validate_node(&self, id: PageId, lower: &[u8], upper: &[u8]) -> Result<usize, Error> {
        let node = self.node(id)?;
        if node.lower_fence() != lower || node.upper_fence() != upper {
            return Err(error_corrupted!(
                "node {id} fences ({:?}, {:?}] differ from its parent ({:?}, {:?}]",
                EscapedBytes(node.lower_fence()),
                EscapedBytes(node.upper_fence()),
                EscapedBytes(lower),
                EscapedBytes(upper)
            ));
        }
        let mut keys = Vec::with_capacity(node.len());
        let children = match &node {
            AnyNode::Basic(basic) if !basic.is_leaf() => {
                let mut children = (0..basic.count())
                    .map(|slot| (basic.full_key(slot), basic.child_at(slot)))
                    .collect::<Vec<_>>();
                keys.extend(children.iter().map(|(key, _)| key.clone()));
                children.push((KeyBuf::from_slice(upper), basic.upper_child()));
                children
            }
            _ => {
                node.for_each_from(b"", |key, _| {
                    keys.push(KeyBuf::from_slice(key));
                    true
                });
                Vec::new()
            }
        };
        for (i, key) in keys.iter().enumerate() {
            if i != 0 && keys[i - 1][..] >= key[..] {
                return Err(Error::corrupted_key("key out of order", key));
            }
            if (!lower.is_empty() && key[..] <= *lower) || (!upper.is_empty() && key[..] > *upper) {
                return Err(Error::corrupted_key("key outside the node fences", key));
            }
        }

        let mut height = None;
        let mut child_lower = KeyBuf::from_slice(lower);
        for (sep, child) in children {
            let child_height = self.validate_node(child, &child_lower, &sep)?;
            if *height.get_or_insert(child_height) != child_height {
                return Err(error_corrupted!("node {id} has children at different depths"));
            }
            child_lower = sep;
        }
        Ok(height.map_or(1, |h| h + 1))
    }
}
