use crate::{
    basic::BasicNode, dense::DenseNode, error::error_corrupted, repr::NodeTag, Error,
};

/// A node of either representation over the same page storage.
///
/// Operations that may change the representation consume the node and return the
/// (possibly different) node now living in the page.
pub enum AnyNode<P> {
    Basic(BasicNode<P>),
    Dense(DenseNode<P>),
}

impl<P: AsRef<[u8]>> AnyNode<P> {
    pub fn from_page(page: P) -> Result<Self, Error> {
        let tag = page.as_ref()[0];
        match NodeTag::try_from(tag) {
            Ok(NodeTag::Basic) => Ok(Self::Basic(BasicNode::from_page(page))),
            Ok(NodeTag::Dense) => Ok(Self::Dense(DenseNode::from_page(page))),
            Err(tag) => Err(error_corrupted!("unknown node tag {tag}")),
        }
    }

    pub fn into_page(self) -> P {
        match self {
            Self::Basic(n) => n.into_page(),
            Self::Dense(n) => n.into_page(),
        }
    }

    /// Dense nodes are always leafs
    pub fn is_leaf(&self) -> bool {
        match self {
            Self::Basic(n) => n.is_leaf(),
            Self::Dense(_) => true,
        }
    }

    pub fn lookup(&self, key: &[u8]) -> Option<&[u8]> {
        match self {
            Self::Basic(n) => n.lookup(key),
            Self::Dense(n) => n.lookup(key),
        }
    }

    /// Number of entries (children for inner nodes, excluding the upper child)
    pub fn len(&self) -> usize {
        match self {
            Self::Basic(n) => n.count(),
            Self::Dense(n) => n.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn lower_fence(&self) -> &[u8] {
        match self {
            Self::Basic(n) => n.lower_fence(),
            Self::Dense(n) => n.lower_fence(),
        }
    }

    pub fn upper_fence(&self) -> &[u8] {
        match self {
            Self::Basic(n) => n.upper_fence(),
            Self::Dense(n) => n.upper_fence(),
        }
    }

    pub fn for_each_from(&self, start: &[u8], f: impl FnMut(&[u8], &[u8]) -> bool) -> bool {
        match self {
            Self::Basic(n) => n.for_each_from(start, f),
            Self::Dense(n) => n.for_each_from(start, f),
        }
    }
}

impl<P: AsRef<[u8]> + AsMut<[u8]>> AnyNode<P> {
    /// Inserts or updates an entry, returns false if the node must be split first
    pub fn insert(self, key: &[u8], value: &[u8]) -> (Self, bool) {
        match self {
            Self::Basic(mut n) => {
                let inserted = n.insert(key, value);
                (Self::Basic(n), inserted)
            }
            Self::Dense(n) => n.insert(key, value),
        }
    }

    pub fn remove(&mut self, key: &[u8]) -> bool {
        match self {
            Self::Basic(n) => n.remove(key),
            Self::Dense(n) => n.remove(key),
        }
    }
}

impl<P: AsRef<[u8]>> std::fmt::Debug for AnyNode<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Basic(n) => n.fmt(f),
            Self::Dense(n) => n.fmt(f),
        }
    }
}
