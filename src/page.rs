use std::fmt;

use zerocopy::IntoBytes;

use crate::{
    error::error_corrupted,
    repr::{NodeTag, PageId},
    Error, PAGE_SIZE,
};

const PAGE_WORDS: usize = PAGE_SIZE / size_of::<u64>();

/// A fixed size, 8 byte aligned, block of memory holding one node.
#[derive(Clone, PartialEq, Eq)]
pub struct Page {
    // The main Page invariant is that it's backing data are well aligned bytes of PAGE_SIZE
    words: Box<[u64; PAGE_WORDS]>,
}

impl Page {
    /// A zeroed page, not yet a valid node
    pub fn new() -> Self {
        Self {
            words: Box::new([0; PAGE_WORDS]),
        }
    }

    pub fn tag(&self) -> Result<NodeTag, Error> {
        NodeTag::try_from(self.as_ref()[0])
            .map_err(|tag| error_corrupted!("unknown node tag {tag}"))
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

impl AsRef<[u8]> for Page {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        self.words.as_bytes()
    }
}

impl AsMut<[u8]> for Page {
    #[inline]
    fn as_mut(&mut self) -> &mut [u8] {
        self.words.as_mut_bytes()
    }
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page").field("tag", &self.tag()).finish()
    }
}

/// Owner of all pages of a tree, pages are addressed by their index.
#[derive(Debug, Default, Deref)]
pub struct PageArena {
    #[deref]
    pages: Vec<Page>,
}

impl PageArena {
    /// Allocates a zeroed page, the caller is responsible for initializing it as a node
    pub fn allocate(&mut self) -> PageId {
        let id = self.pages.len() as PageId;
        self.pages.push(Page::new());
        id
    }

    #[inline]
    pub fn get(&self, id: PageId) -> &Page {
        &self.pages[id as usize]
    }

    #[inline]
    pub fn get_mut(&mut self, id: PageId) -> &mut Page {
        &mut self.pages[id as usize]
    }

    /// Mutable access to multiple pages at once, panics if ids aren't distinct
    pub fn get_disjoint_mut<const N: usize>(&mut self, ids: [PageId; N]) -> [&mut Page; N] {
        self.pages
            .get_disjoint_mut(ids.map(|id| id as usize))
            .unwrap()
    }
}
