use std::{cmp::Ordering, fmt};

use zerocopy::{FromBytes, IntoBytes};

use crate::{
    page::Page,
    repr::{
        header_cast, header_cast_mut, BasicHeader, NodeFlags, NodeTag, PageId, Slot,
        BASIC_HEADER_SIZE, SLOT_SIZE,
    },
    utils::{common_prefix_len, key_head, EscapedBytes},
    KeyBuf, PAGE_SIZE,
};

/// Describes how a basic node is split, see [BasicNode::find_separator]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SeparatorInfo {
    /// Full length of the separator key
    pub len: usize,
    /// Slot of the separator, leafs keep it on the left node
    pub slot: usize,
    /// Whether the separator is a prefix of the key at `slot + 1`
    pub truncated: bool,
}

/// Slotted node with variable length keys and payloads.
///
/// Layout: `[header | slots -> ... free ... <- heap]`. Slots are sorted by key,
/// the heap holds the key suffixes (keys without the node prefix), payloads and fences.
/// Inner nodes store child page ids as payloads and the right most child in the header.
pub struct BasicNode<P> {
    page: P,
}

impl<P: AsRef<[u8]>> BasicNode<P> {
    pub fn from_page(page: P) -> Self {
        debug_assert_eq!(page.as_ref()[0], NodeTag::Basic as u8);
        Self { page }
    }

    pub fn into_page(self) -> P {
        self.page
    }

    #[inline]
    fn data(&self) -> &[u8] {
        self.page.as_ref()
    }

    #[inline]
    pub fn header(&self) -> &BasicHeader {
        header_cast(self.data())
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.header().flags.contains(NodeFlags::Leaf)
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.header().count as usize
    }

    #[inline]
    pub fn prefix_len(&self) -> usize {
        self.header().prefix_len as usize
    }

    /// Right most child of an inner node
    #[inline]
    pub fn upper_child(&self) -> PageId {
        self.header().upper
    }

    pub fn lower_fence(&self) -> &[u8] {
        let header = self.header();
        &self.data()[header.lower_fence_offset as usize..][..header.lower_fence_len as usize]
    }

    pub fn upper_fence(&self) -> &[u8] {
        let header = self.header();
        &self.data()[header.upper_fence_offset as usize..][..header.upper_fence_len as usize]
    }

    /// Bytes shared by all keys of the node
    pub fn prefix(&self) -> &[u8] {
        &self.lower_fence()[..self.prefix_len()]
    }

    #[inline]
    fn slots(&self) -> &[Slot] {
        <[Slot]>::ref_from_prefix_with_elems(&self.data()[BASIC_HEADER_SIZE..], self.count())
            .unwrap()
            .0
    }

    #[inline]
    fn slot_key(&self, slot: &Slot) -> &[u8] {
        let (offset, len) = (slot.offset as usize, slot.key_len as usize);
        &self.data()[offset..][..len]
    }

    /// Key stored at `slot`, without the node prefix
    #[inline]
    pub fn key_suffix(&self, slot: usize) -> &[u8] {
        self.slot_key(&self.slots()[slot])
    }

    #[inline]
    pub fn payload(&self, slot: usize) -> &[u8] {
        let slot = self.slots()[slot];
        let offset = slot.offset as usize + slot.key_len as usize;
        &self.data()[offset..][..slot.payload_len as usize]
    }

    pub fn full_key(&self, slot: usize) -> KeyBuf {
        let mut key = KeyBuf::from_slice(self.prefix());
        key.extend_from_slice(self.key_suffix(slot));
        key
    }

    /// Child page id stored at `slot` of an inner node
    pub fn child_at(&self, slot: usize) -> PageId {
        debug_assert!(!self.is_leaf());
        PageId::from_le_bytes(self.payload(slot).try_into().unwrap())
    }

    #[inline]
    fn slots_end(&self) -> usize {
        BASIC_HEADER_SIZE + self.count() * SLOT_SIZE
    }

    /// Contiguous free space between the slots and the heap
    pub fn free_space(&self) -> usize {
        self.header().data_offset as usize - self.slots_end()
    }

    pub fn free_space_after_compaction(&self) -> usize {
        PAGE_SIZE - self.slots_end() - self.header().space_used as usize
    }

    /// Bytes required to store an entry with a full key of `key_len`
    pub fn space_needed(&self, key_len: usize, payload_len: usize) -> usize {
        debug_assert!(key_len >= self.prefix_len());
        SLOT_SIZE + key_len - self.prefix_len() + payload_len
    }

    pub fn has_space_for(&self, key_len: usize, payload_len: usize) -> bool {
        self.space_needed(key_len, payload_len) <= self.free_space_after_compaction()
    }

    /// Position of the first key >= `key` and whether it's an exact match
    pub fn lower_bound(&self, key: &[u8]) -> (usize, bool) {
        let prefix = self.prefix();
        let cmp_len = prefix.len().min(key.len());
        match key[..cmp_len].cmp(&prefix[..cmp_len]) {
            Ordering::Less => return (0, false),
            Ordering::Greater => return (self.count(), false),
            // key is a prefix of the node prefix
            Ordering::Equal if key.len() < prefix.len() => return (0, false),
            Ordering::Equal => (),
        }
        let suffix = &key[prefix.len()..];
        let head = key_head(suffix);
        let search = self.slots().binary_search_by(|slot| {
            let slot_head = slot.head;
            slot_head
                .cmp(&head)
                .then_with(|| self.slot_key(slot).cmp(suffix))
        });
        match search {
            Ok(i) => (i, true),
            Err(i) => (i, false),
        }
    }

    pub fn lookup(&self, key: &[u8]) -> Option<&[u8]> {
        match self.lower_bound(key) {
            (slot, true) => Some(self.payload(slot)),
            _ => None,
        }
    }

    /// Child of an inner node that covers `key`
    pub fn child_for(&self, key: &[u8]) -> PageId {
        let (pos, _) = self.lower_bound(key);
        if pos == self.count() {
            self.upper_child()
        } else {
            self.child_at(pos)
        }
    }

    /// Picks the split point. Inner nodes move the middle key up to the parent,
    /// leafs keep the separator slot on the left and use the shortest separator that
    /// still sorts between the separator slot key and the next one.
    pub fn find_separator(&self) -> SeparatorInfo {
        let count = self.count();
        debug_assert!(count >= 2, "can't split node with {count} keys");
        if !self.is_leaf() {
            let slot = count / 2;
            return SeparatorInfo {
                len: self.prefix_len() + self.key_suffix(slot).len(),
                slot,
                truncated: false,
            };
        }
        let slot = (count - 1) / 2;
        let key = self.key_suffix(slot);
        if slot + 1 < count {
            let next = self.key_suffix(slot + 1);
            let common = common_prefix_len(key, next);
            if key.len() > common && next.len() > common + 1 {
                return SeparatorInfo {
                    len: self.prefix_len() + common + 1,
                    slot,
                    truncated: true,
                };
            }
        }
        SeparatorInfo {
            len: self.prefix_len() + key.len(),
            slot,
            truncated: false,
        }
    }

    pub fn separator_key(&self, sep: SeparatorInfo) -> KeyBuf {
        let mut key = KeyBuf::from_slice(self.prefix());
        if sep.truncated {
            let suffix_len = sep.len - self.prefix_len();
            key.extend_from_slice(&self.key_suffix(sep.slot + 1)[..suffix_len]);
        } else {
            key.extend_from_slice(self.key_suffix(sep.slot));
        }
        key
    }

    /// Calls `f` with the entries >= `start` in order, stops early (returning false) if `f` returns false
    pub fn for_each_from(&self, start: &[u8], mut f: impl FnMut(&[u8], &[u8]) -> bool) -> bool {
        let (pos, _) = self.lower_bound(start);
        let mut key = KeyBuf::from_slice(self.prefix());
        let prefix_len = key.len();
        for slot in pos..self.count() {
            key.truncate(prefix_len);
            key.extend_from_slice(self.key_suffix(slot));
            if !f(&key, self.payload(slot)) {
                return false;
            }
        }
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = (KeyBuf, &[u8])> + '_ {
        (0..self.count()).map(|slot| (self.full_key(slot), self.payload(slot)))
    }
}

impl<P: AsRef<[u8]> + AsMut<[u8]>> BasicNode<P> {
    /// Initializes `page` as an empty basic node without fences
    pub fn init(mut page: P, is_leaf: bool) -> Self {
        let header: &mut BasicHeader = header_cast_mut(page.as_mut());
        *header = BasicHeader {
            tag: NodeTag::Basic as u8,
            flags: if is_leaf {
                NodeFlags::Leaf
            } else {
                NodeFlags::empty()
            },
            data_offset: PAGE_SIZE as u16,
            lower_fence_offset: PAGE_SIZE as u16,
            upper_fence_offset: PAGE_SIZE as u16,
            ..Default::default()
        };
        Self { page }
    }

    #[inline]
    fn data_mut(&mut self) -> &mut [u8] {
        self.page.as_mut()
    }

    #[inline]
    fn header_mut(&mut self) -> &mut BasicHeader {
        header_cast_mut(self.data_mut())
    }

    pub fn set_upper_child(&mut self, child: PageId) {
        self.header_mut().upper = child;
    }

    pub fn payload_mut(&mut self, slot: usize) -> &mut [u8] {
        let slot = self.slots()[slot];
        let offset = slot.offset as usize + slot.key_len as usize;
        &mut self.data_mut()[offset..][..slot.payload_len as usize]
    }

    /// Reserves `len` bytes from the heap, returns their offset
    fn alloc_heap(&mut self, len: usize) -> usize {
        debug_assert!(len <= self.free_space());
        let header = self.header_mut();
        header.data_offset -= len as u16;
        header.space_used += len as u16;
        header.data_offset as usize
    }

    fn store_bytes(&mut self, bytes: &[u8]) -> u16 {
        let offset = self.alloc_heap(bytes.len());
        self.data_mut()[offset..][..bytes.len()].copy_from_slice(bytes);
        offset as u16
    }

    /// Sets the fences of an empty node and derives the prefix length from them
    pub fn set_fences(&mut self, lower: &[u8], upper: &[u8]) {
        debug_assert_eq!(self.count(), 0);
        let lower_offset = self.store_bytes(lower);
        let upper_offset = self.store_bytes(upper);
        let header = self.header_mut();
        header.lower_fence_offset = lower_offset;
        header.lower_fence_len = lower.len() as u16;
        header.upper_fence_offset = upper_offset;
        header.upper_fence_len = upper.len() as u16;
        header.prefix_len = common_prefix_len(lower, upper) as u16;
    }

    /// Inserts the entry at `slot`, the caller must ensure there's enough contiguous space
    pub(crate) fn store_key_value(&mut self, slot: usize, key_suffix: &[u8], payload: &[u8]) {
        let count = self.count();
        debug_assert!(slot <= count);
        debug_assert!(SLOT_SIZE + key_suffix.len() + payload.len() <= self.free_space());
        let offset = self.alloc_heap(key_suffix.len() + payload.len());
        let new_slot = Slot {
            offset: offset as u16,
            key_len: key_suffix.len() as u16,
            payload_len: payload.len() as u16,
            head: key_head(key_suffix),
        };
        let data = self.data_mut();
        data[offset..][..key_suffix.len()].copy_from_slice(key_suffix);
        data[offset + key_suffix.len()..][..payload.len()].copy_from_slice(payload);
        let slot_start = BASIC_HEADER_SIZE + slot * SLOT_SIZE;
        let slots_end = BASIC_HEADER_SIZE + count * SLOT_SIZE;
        data.copy_within(slot_start..slots_end, slot_start + SLOT_SIZE);
        data[slot_start..][..SLOT_SIZE].copy_from_slice(new_slot.as_bytes());
        self.header_mut().count += 1;
    }

    /// Inserts or updates the entry, returns false if the node can't hold it
    pub fn insert(&mut self, key: &[u8], payload: &[u8]) -> bool {
        let (pos, found) = self.lower_bound(key);
        let needed = self.space_needed(key.len(), payload.len());
        if found {
            if self.payload(pos).len() == payload.len() {
                self.payload_mut(pos).copy_from_slice(payload);
                return true;
            }
            let reclaimed = SLOT_SIZE + self.key_suffix(pos).len() + self.payload(pos).len();
            if needed > self.free_space_after_compaction() + reclaimed {
                return false;
            }
            self.remove_slot(pos);
        } else if needed > self.free_space_after_compaction() {
            return false;
        }
        if needed > self.free_space() {
            self.compactify();
        }
        let prefix_len = self.prefix_len();
        self.store_key_value(pos, &key[prefix_len..], payload);
        true
    }

    fn remove_slot(&mut self, slot: usize) {
        let removed = self.slots()[slot];
        let freed = removed.key_len + removed.payload_len;
        let slot_start = BASIC_HEADER_SIZE + slot * SLOT_SIZE;
        let slots_end = self.slots_end();
        self.data_mut()
            .copy_within(slot_start + SLOT_SIZE..slots_end, slot_start);
        let header = self.header_mut();
        header.space_used -= freed;
        header.count -= 1;
    }

    pub fn remove(&mut self, key: &[u8]) -> bool {
        match self.lower_bound(key) {
            (slot, true) => {
                self.remove_slot(slot);
                true
            }
            _ => false,
        }
    }

    /// Rewrites the node so that all free space is contiguous
    pub fn compactify(&mut self) {
        let mut tmp = BasicNode::init(Page::new(), self.is_leaf());
        tmp.set_fences(self.lower_fence(), self.upper_fence());
        tmp.copy_key_value_range(self, 0, 0, self.count());
        tmp.set_upper_child(self.upper_child());
        debug_assert_eq!(tmp.free_space(), self.free_space_after_compaction());
        self.data_mut().copy_from_slice(tmp.page.as_ref());
    }

    /// Copies `count` entries starting at `src_slot` into this node starting at `dst_slot`,
    /// re-encoding keys if the prefixes differ.
    pub fn copy_key_value_range<Q: AsRef<[u8]>>(
        &mut self,
        src: &BasicNode<Q>,
        dst_slot: usize,
        src_slot: usize,
        count: usize,
    ) {
        let prefix_len = self.prefix_len();
        if prefix_len == src.prefix_len() {
            for i in 0..count {
                self.store_key_value(
                    dst_slot + i,
                    src.key_suffix(src_slot + i),
                    src.payload(src_slot + i),
                );
            }
        } else {
            for i in 0..count {
                let key = src.full_key(src_slot + i);
                debug_assert!(key.starts_with(self.prefix()));
                self.store_key_value(dst_slot + i, &key[prefix_len..], src.payload(src_slot + i));
            }
        }
    }

    /// Splits the node at `sep`. The left half goes to `left_page` (registered in `parent`
    /// under the separator) and this node is rebuilt in place as the right half.
    ///
    /// Panics if `parent` doesn't have space for the separator.
    pub fn split<Q>(
        mut self,
        parent: &mut BasicNode<Q>,
        left_id: PageId,
        left_page: &mut Page,
        sep: SeparatorInfo,
    ) -> Self
    where
        Q: AsRef<[u8]> + AsMut<[u8]>,
    {
        let sep_key = self.separator_key(sep);
        let is_leaf = self.is_leaf();
        let count = self.count();
        let mut left = BasicNode::init(left_page, is_leaf);
        left.set_fences(self.lower_fence(), &sep_key);
        let mut right = BasicNode::init(Page::new(), is_leaf);
        right.set_fences(&sep_key, self.upper_fence());

        let inserted = parent.insert(&sep_key, &left_id.to_le_bytes());
        assert!(inserted, "parent has no space for separator {:?}", EscapedBytes(&sep_key));

        if is_leaf {
            left.copy_key_value_range(&self, 0, 0, sep.slot + 1);
            right.copy_key_value_range(&self, 0, sep.slot + 1, count - sep.slot - 1);
        } else {
            left.copy_key_value_range(&self, 0, 0, sep.slot);
            left.set_upper_child(self.child_at(sep.slot));
            right.copy_key_value_range(&self, 0, sep.slot + 1, count - sep.slot - 1);
            right.set_upper_child(self.upper_child());
        }
        trace!(
            "basic split {count} keys into {} {}, separator {:?} ({sep:?})",
            left.count(),
            right.count(),
            EscapedBytes(&sep_key)
        );
        self.data_mut().copy_from_slice(right.page.as_ref());
        self
    }
}

impl<P: AsRef<[u8]>> fmt::Debug for BasicNode<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicNode")
            .field("leaf", &self.is_leaf())
            .field("count", &self.count())
            .field("lower_fence", &EscapedBytes(self.lower_fence()))
            .field("upper_fence", &EscapedBytes(self.upper_fence()))
            .field("prefix_len", &self.prefix_len())
            .finish()
    }
}
