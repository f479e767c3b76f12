//! Leaf representation for fixed length keys forming a (nearly) contiguous numeric range.
//!
//! Instead of storing keys, slot `i` stands for the key whose numeric part is
//! `array_start + i`, a presence bit marks whether the slot holds a value and
//! values are stored in a fixed width array.
//!
//! Layout: `[header | mask words | values -> ... free ... | upper fence region | lower fence]`.
//! The upper fence region is `max(upper_fence_len, full_key_len)` bytes so that
//! the upper fence can be replaced by any full length key in place.

use std::fmt;

use crate::{
    basic::BasicNode,
    mask::{mask_bytes, PresenceMask},
    node::AnyNode,
    numeric::{self, read_numeric, write_numeric, NumericPart, MAX_NUMERIC_PART_LEN},
    page::Page,
    repr::{
        header_cast, header_cast_mut, DenseHeader, NodeTag, PageId, BASIC_HEADER_SIZE,
        DENSE_HEADER_SIZE, SLOT_SIZE,
    },
    utils::{common_prefix_len, EscapedBytes},
    KeyBuf, PAGE_SIZE,
};

/// Result of mapping a key to a slot of a dense node
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum KeyClass {
    /// The key is represented by this slot
    Index(usize),
    /// The key length differs from the node key length
    WrongLen,
    /// The bytes between the prefix and the numeric part differ from the lower fence,
    /// the key sorts after every slot
    NotNumericRange,
    /// The key is past the last slot, by less than half the slot count
    SlightlyTooLarge,
    /// The key is past the last slot, by at least half the slot count
    FarTooLarge,
}

/// Largest slot count whose mask and value array fit in `budget` bytes.
pub fn compute_slot_count(val_len: usize, budget: usize) -> usize {
    let mut count = budget * 8 / (val_len * 8 + 1);
    while count > 0 && mask_bytes(count) + count * val_len > budget {
        count -= 1;
    }
    count.min(u16::MAX as usize)
}

pub struct DenseNode<P> {
    page: P,
}

impl<P: AsRef<[u8]>> DenseNode<P> {
    pub fn from_page(page: P) -> Self {
        debug_assert_eq!(page.as_ref()[0], NodeTag::Dense as u8);
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
    pub fn header(&self) -> &DenseHeader {
        header_cast(self.data())
    }

    #[inline]
    pub fn full_key_len(&self) -> usize {
        self.header().full_key_len as usize
    }

    #[inline]
    pub fn val_len(&self) -> usize {
        self.header().val_len as usize
    }

    #[inline]
    pub fn slot_count(&self) -> usize {
        self.header().slot_count as usize
    }

    #[inline]
    pub fn array_start(&self) -> NumericPart {
        self.header().array_start
    }

    #[inline]
    pub fn prefix_len(&self) -> usize {
        self.header().prefix_len as usize
    }

    #[inline]
    fn numeric_part_len(&self) -> usize {
        numeric::numeric_part_len(self.prefix_len(), self.full_key_len())
    }

    #[inline]
    fn numeric_prefix_len(&self) -> usize {
        numeric::numeric_prefix_len(self.prefix_len(), self.full_key_len())
    }

    #[inline]
    fn fence_region_len(&self) -> usize {
        (self.header().upper_fence_len as usize).max(self.full_key_len())
    }

    #[inline]
    fn lower_fence_offset(&self) -> usize {
        PAGE_SIZE - self.header().lower_fence_len as usize
    }

    #[inline]
    fn upper_fence_offset(&self) -> usize {
        self.lower_fence_offset() - self.fence_region_len()
    }

    pub fn lower_fence(&self) -> &[u8] {
        &self.data()[self.lower_fence_offset()..]
    }

    pub fn upper_fence(&self) -> &[u8] {
        &self.data()[self.upper_fence_offset()..][..self.header().upper_fence_len as usize]
    }

    /// Bytes shared by all keys of the node
    pub fn prefix(&self) -> &[u8] {
        &self.lower_fence()[..self.prefix_len()]
    }

    #[inline]
    fn values_offset(&self) -> usize {
        DENSE_HEADER_SIZE + mask_bytes(self.slot_count())
    }

    pub fn mask(&self) -> PresenceMask<&[u8]> {
        PresenceMask::new(&self.data()[DENSE_HEADER_SIZE..][..mask_bytes(self.slot_count())])
    }

    #[inline]
    pub fn is_present(&self, slot: usize) -> bool {
        self.mask().get(slot)
    }

    /// Value of `slot`, only meaningful if the slot is present
    #[inline]
    pub fn value(&self, slot: usize) -> &[u8] {
        let val_len = self.val_len();
        &self.data()[self.values_offset() + slot * val_len..][..val_len]
    }

    /// Number of present entries
    pub fn len(&self) -> usize {
        self.mask().count_ones()
    }

    pub fn is_empty(&self) -> bool {
        self.mask().last_one().is_none()
    }

    /// Classifies a key already stripped of the node prefix
    pub fn classify_key(&self, truncated_key: &[u8]) -> KeyClass {
        let prefix_len = self.prefix_len();
        if truncated_key.len() + prefix_len != self.full_key_len() {
            return KeyClass::WrongLen;
        }
        let numeric_prefix_len = self.numeric_prefix_len();
        let (middle, numeric_bytes) = truncated_key.split_at(numeric_prefix_len - prefix_len);
        let fence_middle = &self.lower_fence()[prefix_len..numeric_prefix_len];
        if middle != fence_middle {
            // keys routed here are greater than the lower fence
            debug_assert!(
                middle > fence_middle,
                "key middle {:?} sorts before the lower fence {:?}",
                EscapedBytes(middle),
                EscapedBytes(fence_middle)
            );
            return KeyClass::NotNumericRange;
        }
        let numeric = read_numeric(numeric_bytes);
        let array_start = self.array_start();
        debug_assert!(numeric >= array_start, "{numeric} < array start {array_start}");
        // below array_start wraps around to a very large index
        let index = numeric.wrapping_sub(array_start) as usize;
        let slot_count = self.slot_count();
        if index < slot_count {
            KeyClass::Index(index)
        } else if index < slot_count + slot_count / 2 {
            KeyClass::SlightlyTooLarge
        } else {
            KeyClass::FarTooLarge
        }
    }

    /// Classifies a full key, which must share the node prefix
    pub fn classify_full_key(&self, key: &[u8]) -> KeyClass {
        debug_assert!(key.starts_with(self.prefix()) || key.len() < self.prefix_len());
        match key.get(self.prefix_len()..) {
            Some(truncated) => self.classify_key(truncated),
            None => KeyClass::WrongLen,
        }
    }

    /// Reconstructs the full key represented by `slot`
    pub fn restore_key(&self, slot: usize) -> KeyBuf {
        let numeric_prefix_len = self.numeric_prefix_len();
        let mut key = KeyBuf::from_slice(&self.lower_fence()[..numeric_prefix_len]);
        key.resize(self.full_key_len(), 0);
        write_numeric(
            self.array_start().wrapping_add(slot as NumericPart),
            &mut key[numeric_prefix_len..],
        );
        key
    }

    pub fn lookup(&self, key: &[u8]) -> Option<&[u8]> {
        match self.classify_full_key(key) {
            KeyClass::Index(slot) if self.is_present(slot) => Some(self.value(slot)),
            _ => None,
        }
    }

    /// Calls `f` with the entries >= `start` in order, stops early (returning false) if `f` returns false
    pub fn for_each_from(&self, start: &[u8], mut f: impl FnMut(&[u8], &[u8]) -> bool) -> bool {
        let first_slot = if start <= self.lower_fence() {
            0
        } else if !start.starts_with(self.prefix()) {
            // sorts after every key of the node
            return true;
        } else {
            match self.classify_full_key(start) {
                KeyClass::Index(slot) => slot,
                KeyClass::WrongLen => 0,
                KeyClass::NotNumericRange
                | KeyClass::SlightlyTooLarge
                | KeyClass::FarTooLarge => return true,
            }
        };
        for slot in self.mask().iter_ones_from(first_slot) {
            let key = self.restore_key(slot);
            if key[..] < *start {
                continue;
            }
            if !f(&key, self.value(slot)) {
                return false;
            }
        }
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = (KeyBuf, &[u8])> + '_ {
        self.mask()
            .into_iter_ones_from(0)
            .map(move |slot| (self.restore_key(slot), self.value(slot)))
    }

    /// Page bytes needed by a basic node with the same fences holding the present entries
    fn basic_space_needed(&self) -> usize {
        let (lower, upper) = (self.lower_fence(), self.upper_fence());
        let basic_prefix_len = common_prefix_len(lower, upper);
        let entry_size = SLOT_SIZE + self.full_key_len() - basic_prefix_len + self.val_len();
        BASIC_HEADER_SIZE + lower.len() + upper.len() + self.len() * entry_size
    }

    /// Appends the present entries of `[start_slot, end_slot)` to the empty basic node `dst`
    pub fn copy_key_value_range_to_basic<Q>(
        &self,
        dst: &mut BasicNode<Q>,
        start_slot: usize,
        end_slot: usize,
    ) where
        Q: AsRef<[u8]> + AsMut<[u8]>,
    {
        debug_assert!(dst.prefix_len() >= self.prefix_len());
        debug_assert_eq!(dst.count(), 0);
        let dst_prefix_len = dst.prefix_len();
        for slot in self
            .mask()
            .iter_ones_from(start_slot)
            .take_while(|&slot| slot < end_slot)
        {
            let key = self.restore_key(slot);
            debug_assert!(key.starts_with(dst.prefix()));
            let count = dst.count();
            dst.store_key_value(count, &key[dst_prefix_len..], self.value(slot));
        }
    }
}

/// What takes over the split page, to the right of the boundary
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum RightSide {
    EmptyDense,
    EmptyBasic,
    /// dense node holding the entries above the boundary
    Dense,
    /// basic node holding the entries above the boundary
    Basic,
}

impl<P: AsRef<[u8]> + AsMut<[u8]>> DenseNode<P> {
    /// Initializes `page` as an empty dense node.
    ///
    /// Panics if the fences can't describe a numeric range of `full_key_len` keys.
    pub fn init(
        mut page: P,
        lower_fence: &[u8],
        upper_fence: &[u8],
        prefix_len: usize,
        full_key_len: usize,
        val_len: usize,
    ) -> Self {
        assert!(lower_fence.len() <= full_key_len);
        assert!(prefix_len < full_key_len);
        assert!(numeric::numeric_prefix_len(prefix_len, full_key_len) <= lower_fence.len());
        debug_assert!(prefix_len <= common_prefix_len(lower_fence, upper_fence));
        let data = page.as_mut();
        data.fill(0);
        let lower_offset = PAGE_SIZE - lower_fence.len();
        let upper_offset = lower_offset - upper_fence.len().max(full_key_len);
        data[lower_offset..].copy_from_slice(lower_fence);
        data[upper_offset..][..upper_fence.len()].copy_from_slice(upper_fence);
        let slot_count = compute_slot_count(val_len, upper_offset - DENSE_HEADER_SIZE);
        *header_cast_mut(data) = DenseHeader {
            tag: NodeTag::Dense as u8,
            full_key_len: full_key_len as u16,
            val_len: val_len as u16,
            slot_count: slot_count as u16,
            lower_fence_len: lower_fence.len() as u16,
            upper_fence_len: upper_fence.len() as u16,
            prefix_len: prefix_len as u16,
            ..Default::default()
        };
        let mut node = Self { page };
        node.update_array_start();
        node
    }

    #[inline]
    fn data_mut(&mut self) -> &mut [u8] {
        self.page.as_mut()
    }

    #[inline]
    fn header_mut(&mut self) -> &mut DenseHeader {
        header_cast_mut(self.data_mut())
    }

    fn mask_mut(&mut self) -> PresenceMask<&mut [u8]> {
        let mask_len = mask_bytes(self.slot_count());
        PresenceMask::new(&mut self.data_mut()[DENSE_HEADER_SIZE..][..mask_len])
    }

    fn value_mut(&mut self, slot: usize) -> &mut [u8] {
        let val_len = self.val_len();
        let offset = self.values_offset() + slot * val_len;
        &mut self.data_mut()[offset..][..val_len]
    }

    /// Derives the numeric value of slot 0 from the lower fence.
    ///
    /// A full length lower fence is excluded from the node, so slot 0 is the next number.
    /// A shorter lower fence is zero padded, the padded key is greater than the fence itself.
    fn update_array_start(&mut self) {
        let lower = self.lower_fence();
        let numeric_prefix_len = self.numeric_prefix_len();
        let array_start = if lower.len() < self.full_key_len() {
            let numeric_part_len = self.numeric_part_len();
            let tail = &lower[numeric_prefix_len..];
            let tail_len = tail.len().min(numeric_part_len);
            let mut padded = [0u8; MAX_NUMERIC_PART_LEN];
            padded[..tail_len].copy_from_slice(&tail[..tail_len]);
            read_numeric(&padded[..numeric_part_len])
        } else {
            read_numeric(&lower[numeric_prefix_len..]).wrapping_add(1)
        };
        self.header_mut().array_start = array_start;
    }

    /// Replaces the upper fence, recomputing the prefix length and the array start.
    ///
    /// Panics if the fence doesn't fit the upper fence region.
    pub fn change_upper_fence(&mut self, fence: &[u8]) {
        assert!(
            fence.len() <= self.fence_region_len(),
            "upper fence {:?} doesn't fit",
            EscapedBytes(fence)
        );
        self.header_mut().upper_fence_len = fence.len() as u16;
        let offset = self.upper_fence_offset();
        self.data_mut()[offset..][..fence.len()].copy_from_slice(fence);
        let prefix_len = common_prefix_len(self.lower_fence(), fence);
        self.header_mut().prefix_len = prefix_len as u16;
        self.update_array_start();
    }

    /// Stores a key with the node shape, returns false if the key is outside the slot range
    fn store(&mut self, key: &[u8], value: &[u8]) -> bool {
        match self.classify_full_key(key) {
            KeyClass::Index(slot) => {
                self.mask_mut().set(slot);
                self.value_mut(slot).copy_from_slice(value);
                true
            }
            KeyClass::NotNumericRange | KeyClass::SlightlyTooLarge | KeyClass::FarTooLarge => {
                false
            }
            KeyClass::WrongLen => unreachable!("key length is checked before classification"),
        }
    }

    /// Inserts or updates an entry.
    ///
    /// Entries that don't match the node key and value lengths convert the node into a
    /// basic node (in place) first, unless the existing entries don't fit a basic node.
    /// Returns false if the entry couldn't be inserted and the node must be split.
    pub fn insert(mut self, key: &[u8], value: &[u8]) -> (AnyNode<P>, bool) {
        if key.len() != self.full_key_len() || value.len() != self.val_len() {
            let needed = self.basic_space_needed() + SLOT_SIZE + key.len() + value.len()
                - common_prefix_len(self.lower_fence(), self.upper_fence()).min(key.len());
            if needed > PAGE_SIZE {
                return (AnyNode::Dense(self), false);
            }
            let mut basic = self.into_basic();
            let inserted = basic.insert(key, value);
            debug_assert!(inserted);
            return (AnyNode::Basic(basic), inserted);
        }
        let inserted = self.store(key, value);
        (AnyNode::Dense(self), inserted)
    }

    pub fn remove(&mut self, key: &[u8]) -> bool {
        match self.classify_full_key(key) {
            KeyClass::Index(slot) if self.is_present(slot) => {
                self.mask_mut().clear(slot);
                true
            }
            _ => false,
        }
    }

    /// Whether the present entries fit in a basic node with the same fences
    pub fn fits_basic(&self) -> bool {
        self.basic_space_needed() <= PAGE_SIZE
    }

    /// Rewrites the node in place as a basic leaf with the same fences and entries.
    ///
    /// Panics if the entries don't fit, see [Self::fits_basic].
    pub fn into_basic(self) -> BasicNode<P> {
        assert!(self.fits_basic());
        let mut basic = BasicNode::init(Page::new(), true);
        basic.set_fences(self.lower_fence(), self.upper_fence());
        self.copy_key_value_range_to_basic(&mut basic, 0, self.slot_count());
        debug!(
            "dense node ({} slots) converted to basic with {} keys",
            self.slot_count(),
            basic.count()
        );
        let mut page = self.into_page();
        page.as_mut().copy_from_slice(basic.into_page().as_ref());
        BasicNode::from_page(page)
    }

    /// Rewrites a basic leaf in place as a dense node, if its entries allow it.
    ///
    /// Requires a non empty leaf whose keys and values all have the same lengths,
    /// with fences that pin the bytes before the numeric part and a slot range covering
    /// every key. Otherwise the basic node is returned untouched.
    pub fn try_densify(basic: BasicNode<P>) -> Result<Self, BasicNode<P>> {
        let count = basic.count();
        if !basic.is_leaf() || count == 0 {
            return Err(basic);
        }
        let prefix_len = basic.prefix_len();
        let full_key_len = prefix_len + basic.key_suffix(0).len();
        let val_len = basic.payload(0).len();
        let lower = basic.lower_fence();
        let uniform = (1..count).all(|slot| {
            basic.key_suffix(slot).len() + prefix_len == full_key_len
                && basic.payload(slot).len() == val_len
        });
        if !uniform
            || full_key_len <= prefix_len
            || lower.len() > full_key_len
            || numeric::numeric_prefix_len(prefix_len, full_key_len) > lower.len()
        {
            return Err(basic);
        }

        let mut dense = DenseNode::init(
            Page::new(),
            lower,
            basic.upper_fence(),
            prefix_len,
            full_key_len,
            val_len,
        );
        // keys are sorted and have the same length, if both ends map to slots every key does
        let maps_to_slot = |slot| {
            matches!(
                dense.classify_full_key(&basic.full_key(slot)),
                KeyClass::Index(_)
            )
        };
        if !maps_to_slot(0) || !maps_to_slot(count - 1) {
            return Err(basic);
        }
        for slot in 0..count {
            let stored = dense.store(&basic.full_key(slot), basic.payload(slot));
            assert!(stored);
        }
        debug!(
            "basic node with {count} keys densified into {} slots",
            dense.slot_count()
        );
        let mut page = basic.into_page();
        page.as_mut().copy_from_slice(dense.page.as_ref());
        Ok(DenseNode::from_page(page))
    }

    /// Builds the node that replaces this one to the right of `boundary`,
    /// returns None if the entries above the boundary don't fit `side`.
    fn build_right(&self, boundary: usize, boundary_key: &[u8], side: RightSide) -> Option<Page> {
        let upper = self.upper_fence();
        let prefix_len = common_prefix_len(boundary_key, upper);
        // an upper fence extending the boundary key leaves no numeric part
        let new_dense = || {
            (prefix_len < self.full_key_len()).then(|| {
                DenseNode::init(
                    Page::new(),
                    boundary_key,
                    upper,
                    prefix_len,
                    self.full_key_len(),
                    self.val_len(),
                )
            })
        };
        let new_basic = || {
            let mut basic = BasicNode::init(Page::new(), true);
            basic.set_fences(boundary_key, upper);
            basic
        };
        let page = match side {
            RightSide::EmptyDense => match new_dense() {
                Some(right) => right.into_page(),
                None => new_basic().into_page(),
            },
            RightSide::EmptyBasic => new_basic().into_page(),
            RightSide::Dense => {
                let mut right = new_dense()?;
                for slot in self.mask().iter_ones_from(boundary + 1) {
                    if !right.store(&self.restore_key(slot), self.value(slot)) {
                        return None;
                    }
                }
                right.into_page()
            }
            RightSide::Basic => {
                let mut right = new_basic();
                let above = self.mask().iter_ones_from(boundary + 1).count();
                let entry_size = SLOT_SIZE + self.full_key_len() - right.prefix_len() + self.val_len();
                if above * entry_size > right.free_space() {
                    return None;
                }
                self.copy_key_value_range_to_basic(&mut right, boundary + 1, self.slot_count());
                right.into_page()
            }
        };
        Some(page)
    }

    /// Split point for keys that don't match the node shape: starting from the median
    /// entry, the first boundary whose upper entries fit a single right node.
    fn shape_split_point(&self, present: &[usize]) -> (usize, Page) {
        let candidates = &present[(present.len() - 1) / 2..present.len() - 1];
        for &boundary in candidates {
            let boundary_key = self.restore_key(boundary);
            for side in [RightSide::Dense, RightSide::Basic] {
                if let Some(page) = self.build_right(boundary, &boundary_key, side) {
                    trace!(
                        "shape split at slot {boundary} of {} entries, right {side:?}",
                        present.len()
                    );
                    return (boundary, page);
                }
            }
        }
        let last = present[present.len() - 1];
        let right = self.build_right(last, &self.restore_key(last), RightSide::EmptyBasic);
        (last, right.unwrap())
    }

    /// Splits the node because `key` couldn't be inserted.
    ///
    /// The entries up to the boundary move to `left_page`, which is registered in `parent`
    /// under the boundary key, and this page is rebuilt as the node to the right of the boundary:
    /// * past the slot range by a little: an empty dense node continuing the range
    /// * far past the slot range: an empty basic node
    /// * key with a different shape: entries above the median entry, dense if they fit
    ///
    /// An empty node has no boundary, it's converted to an empty basic node instead and
    /// nothing is added to `parent`.
    ///
    /// Panics if `parent` doesn't have space for the separator.
    pub fn split<Q>(
        self,
        parent: &mut BasicNode<Q>,
        left_id: PageId,
        left_page: &mut Page,
        key: &[u8],
    ) -> AnyNode<P>
    where
        Q: AsRef<[u8]> + AsMut<[u8]>,
    {
        let present = self.mask().iter_ones().collect::<Vec<_>>();
        let Some(&last) = present.last() else {
            // nothing to separate, a basic node takes any key
            return AnyNode::Basic(self.into_basic());
        };
        let class = self.classify_full_key(key);
        let (boundary, right_page) = match class {
            KeyClass::SlightlyTooLarge => {
                let right = self.build_right(last, &self.restore_key(last), RightSide::EmptyDense);
                (last, right.unwrap())
            }
            KeyClass::FarTooLarge | KeyClass::NotNumericRange => {
                let right = self.build_right(last, &self.restore_key(last), RightSide::EmptyBasic);
                (last, right.unwrap())
            }
            // an in range key only gets here if its value length differs
            KeyClass::WrongLen | KeyClass::Index(_) => self.shape_split_point(&present),
        };
        let boundary_key = self.restore_key(boundary);

        left_page.as_mut().copy_from_slice(self.data());
        let mut left = DenseNode::from_page(left_page);
        left.mask_mut().clear_from(boundary + 1);
        let inserted = parent.insert(&boundary_key, &left_id.to_le_bytes());
        assert!(
            inserted,
            "parent has no space for separator {:?}",
            EscapedBytes(&boundary_key)
        );
        left.change_upper_fence(&boundary_key);
        trace!(
            "dense split ({class:?}) at {:?}, left {} keys, right {:?}",
            EscapedBytes(&boundary_key),
            left.len(),
            right_page.tag()
        );

        let mut page = self.into_page();
        page.as_mut().copy_from_slice(right_page.as_ref());
        if page.as_ref()[0] == NodeTag::Dense as u8 {
            AnyNode::Dense(DenseNode::from_page(page))
        } else {
            AnyNode::Basic(BasicNode::from_page(page))
        }
    }
}

impl<P: AsRef<[u8]>> fmt::Debug for DenseNode<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DenseNode")
            .field("header", self.header())
            .field("len", &self.len())
            .field("lower_fence", &EscapedBytes(self.lower_fence()))
            .field("upper_fence", &EscapedBytes(self.upper_fence()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key4(n: u16) -> [u8; 4] {
        let [hi, lo] = n.to_be_bytes();
        [0xaa, 0xbb, hi, lo]
    }

    /// Dense node for keys `aa bb xx xx` with 1 byte values
    fn dense_node() -> DenseNode<Page> {
        DenseNode::init(Page::new(), &key4(0), &key4(0xffff), 2, 4, 1)
    }

    fn parent() -> BasicNode<Page> {
        let mut parent = BasicNode::init(Page::new(), false);
        parent.set_fences(b"", b"");
        parent.set_upper_child(1);
        parent
    }

    fn assert_dense(node: AnyNode<Page>) -> DenseNode<Page> {
        match node {
            AnyNode::Dense(dense) => dense,
            AnyNode::Basic(basic) => panic!("expected dense node, got {basic:?}"),
        }
    }

    fn assert_basic(node: AnyNode<Page>) -> BasicNode<Page> {
        match node {
            AnyNode::Basic(basic) => basic,
            AnyNode::Dense(dense) => panic!("expected basic node, got {dense:?}"),
        }
    }

    #[test]
    fn test_concrete_scenario() {
        let _ = env_logger::try_init();
        let node = DenseNode::init(Page::new(), &[0, 0, 0, 0], &[0, 0, 1, 0], 2, 4, 1);
        assert_eq!(node.prefix_len(), 2);
        // the lower fence is excluded, slot 0 is 00 00 00 01
        assert_eq!(node.array_start(), 1);
        let key = [0, 0, 0, 5];
        assert_eq!(node.classify_key(&key[2..]), KeyClass::Index(4));
        assert_eq!(&node.restore_key(4)[..], &key);

        let (node, inserted) = node.insert(&key, &[0x2a]);
        assert!(inserted);
        let node = assert_dense(node);
        assert_eq!(node.lookup(&key), Some(&[0x2a][..]));
        assert_eq!(node.len(), 1);

        let long_key = [0, 0, 0, 5, 1];
        let (node, inserted) = node.insert(&long_key, &[7]);
        assert!(inserted);
        let basic = assert_basic(node);
        assert_eq!(basic.count(), 2);
        assert_eq!(basic.lookup(&key), Some(&[0x2a][..]));
        assert_eq!(basic.lookup(&long_key), Some(&[7][..]));
        assert_eq!(basic.lower_fence(), &[0, 0, 0, 0]);
        assert_eq!(basic.upper_fence(), &[0, 0, 1, 0]);
    }

    #[test]
    fn test_capacity() {
        assert_eq!(compute_slot_count(1, 0), 0);
        assert_eq!(compute_slot_count(1, 8), 0);
        assert_eq!(compute_slot_count(1, 9), 1);
        // 64 slots need 8 mask bytes
        assert_eq!(compute_slot_count(1, 72), 64);
        assert_eq!(compute_slot_count(1, 73), 64);
        assert_eq!(compute_slot_count(1, 81), 65);
        assert_eq!(compute_slot_count(0, 8), 64);

        let node = dense_node();
        let budget = PAGE_SIZE - 4 - 4 - DENSE_HEADER_SIZE;
        assert_eq!(node.slot_count(), compute_slot_count(1, budget));
        assert!(node.values_offset() + node.slot_count() <= node.upper_fence_offset());
    }

    #[test]
    fn test_zero_capacity() {
        let node = DenseNode::init(Page::new(), &key4(0), &key4(1), 2, 4, 4060);
        assert_eq!(node.slot_count(), 0);
        assert_eq!(node.classify_full_key(&key4(1)), KeyClass::FarTooLarge);
        let (node, inserted) = node.insert(&key4(1), &[0; 4060]);
        assert!(!inserted);
        assert!(assert_dense(node).is_empty());
    }

    #[test]
    fn test_classification() {
        // prefix 01, middle 00, numeric part 4 bytes
        let lower = [1, 0, 0, 0, 0, 0];
        let node = DenseNode::init(Page::new(), &lower, &[1, 9, 9, 9, 9, 9], 1, 6, 2);
        assert_eq!(node.array_start(), 1);
        let slot_count = node.slot_count() as u32;
        let key = |n: u32| {
            let mut key = vec![1, 0];
            key.extend_from_slice(&n.to_be_bytes());
            key
        };
        assert_eq!(node.classify_full_key(&key(1)), KeyClass::Index(0));
        assert_eq!(node.classify_full_key(&key(5)), KeyClass::Index(4));
        assert_eq!(
            node.classify_full_key(&key(slot_count)),
            KeyClass::Index(slot_count as usize - 1)
        );
        assert_eq!(
            node.classify_full_key(&key(slot_count + 1)),
            KeyClass::SlightlyTooLarge
        );
        assert_eq!(
            node.classify_full_key(&key(slot_count + slot_count / 2)),
            KeyClass::SlightlyTooLarge
        );
        assert_eq!(
            node.classify_full_key(&key(slot_count + slot_count / 2 + 1)),
            KeyClass::FarTooLarge
        );
        assert_eq!(
            node.classify_full_key(&[1, 1, 0, 0, 0, 0]),
            KeyClass::NotNumericRange
        );
        assert_eq!(node.classify_full_key(&[1, 0, 0, 0, 0]), KeyClass::WrongLen);
        assert_eq!(node.classify_key(&[0, 0, 0, 0, 0, 1]), KeyClass::WrongLen);
    }

    #[test]
    fn test_short_lower_fence() {
        // 3 byte keys after the fence "aa", which sorts before "aa 00 00"
        let node = DenseNode::init(Page::new(), &[0xaa], &[0xab], 0, 3, 1);
        assert_eq!(node.array_start(), 0xaa0000);
        assert_eq!(node.classify_full_key(&[0xaa, 0, 0]), KeyClass::Index(0));
        assert_eq!(node.classify_full_key(&[0xaa, 0, 5]), KeyClass::Index(5));
        assert_eq!(&node.restore_key(5)[..], &[0xaa, 0, 5]);
    }

    #[test]
    fn test_overwrite() {
        let node = dense_node();
        let (node, inserted) = node.insert(&key4(10), &[1]);
        assert!(inserted);
        let (node, inserted) = node.insert(&key4(10), &[1]);
        assert!(inserted);
        let (node, inserted) = node.insert(&key4(10), &[2]);
        assert!(inserted);
        let mut node = assert_dense(node);
        assert_eq!(node.len(), 1);
        assert_eq!(node.lookup(&key4(10)), Some(&[2][..]));
        assert!(node.remove(&key4(10)));
        assert!(!node.remove(&key4(10)));
        assert_eq!(node.lookup(&key4(10)), None);
        assert!(node.is_empty());
    }

    #[test]
    fn test_insert_out_of_range() {
        let node = dense_node();
        let far = key4(node.slot_count() as u16 * 2);
        let (node, inserted) = node.insert(&far, &[1]);
        assert!(!inserted);
        assert!(assert_dense(node).is_empty());
    }

    #[test]
    fn test_shape_mismatch_too_large_for_basic() {
        let mut node = AnyNode::Dense(dense_node());
        for n in 1..=1000 {
            let inserted;
            (node, inserted) = node.insert(&key4(n), &[n as u8]);
            assert!(inserted);
        }
        let (node, inserted) = node.insert(&key4(500), &[1, 2]);
        assert!(!inserted);
        let node = assert_dense(node);
        assert_eq!(node.len(), 1000);
        assert_eq!(node.lookup(&key4(500)), Some(&[500u16 as u8][..]));
    }

    #[test]
    fn test_change_upper_fence() {
        let mut node = DenseNode::init(Page::new(), &[0, 0, 0, 0], &[], 0, 4, 1);
        assert_eq!(node.prefix_len(), 0);
        assert_eq!(node.array_start(), 1);
        for n in [1u32, 2, 30] {
            assert!(node.store(&n.to_be_bytes(), &[n as u8]));
        }
        node.change_upper_fence(&[0, 0, 0, 0x20]);
        assert_eq!(node.prefix_len(), 3);
        assert_eq!(node.upper_fence(), &[0, 0, 0, 0x20]);
        assert_eq!(node.lower_fence(), &[0, 0, 0, 0]);
        assert_eq!(node.array_start(), 1);
        let entries = node.iter().map(|(k, v)| (k.to_vec(), v.to_vec())).collect::<Vec<_>>();
        assert_eq!(
            entries,
            [
                (vec![0, 0, 0, 1], vec![1]),
                (vec![0, 0, 0, 2], vec![2]),
                (vec![0, 0, 0, 30], vec![30])
            ]
        );
        assert_eq!(node.lookup(&[0, 0, 0, 30]), Some(&[30][..]));
    }

    #[test]
    fn test_densify() {
        let mut basic = BasicNode::init(Page::new(), true);
        basic.set_fences(&key4(0), &key4(0xffff));
        for n in [9u16, 3, 100, 7] {
            assert!(basic.insert(&key4(n), &n.to_le_bytes()));
        }
        let dense = DenseNode::try_densify(basic).unwrap();
        assert_eq!(dense.len(), 4);
        assert_eq!(dense.val_len(), 2);
        assert_eq!(dense.lower_fence(), &key4(0));
        assert_eq!(dense.upper_fence(), &key4(0xffff));
        assert_eq!(dense.lookup(&key4(100)), Some(&100u16.to_le_bytes()[..]));
        assert_eq!(dense.lookup(&key4(101)), None);

        let basic = dense.into_basic();
        assert_eq!(basic.count(), 4);
        assert_eq!(basic.lookup(&key4(7)), Some(&7u16.to_le_bytes()[..]));
    }

    #[test]
    fn test_densify_rejected() {
        let new_basic = || {
            let mut basic = BasicNode::init(Page::new(), true);
            basic.set_fences(&key4(0), &key4(0xffff));
            basic
        };
        // empty
        let basic = DenseNode::try_densify(new_basic()).unwrap_err();
        // mixed key lengths
        let mut basic = basic;
        basic.insert(&key4(1), b"v");
        basic.insert(&[0xaa, 0xbb, 0, 2, 0], b"v");
        let basic = DenseNode::try_densify(basic).unwrap_err();
        assert_eq!(basic.count(), 2);
        // mixed value lengths
        let mut basic = new_basic();
        basic.insert(&key4(1), b"v");
        basic.insert(&key4(2), b"vv");
        let basic = DenseNode::try_densify(basic).unwrap_err();
        assert_eq!(basic.count(), 2);
        // range wider than the slots
        let mut basic = new_basic();
        basic.insert(&key4(1), b"v");
        basic.insert(&key4(60000), b"v");
        let basic = DenseNode::try_densify(basic).unwrap_err();
        assert_eq!(basic.count(), 2);
        assert_eq!(basic.lookup(&key4(60000)), Some(&b"v"[..]));
        // middle bytes not pinned by the lower fence
        let mut basic = BasicNode::init(Page::new(), true);
        basic.set_fences(b"", b"");
        basic.insert(b"12345678", b"v");
        let basic = DenseNode::try_densify(basic).unwrap_err();
        assert_eq!(basic.count(), 1);
    }

    fn filled(numbers: impl IntoIterator<Item = u16>) -> DenseNode<Page> {
        let mut node = dense_node();
        for n in numbers {
            assert!(node.store(&key4(n), &[n as u8]));
        }
        node
    }

    #[test]
    fn test_split_far_too_large() {
        let node = filled(1..=10);
        let far = key4(node.slot_count() as u16 * 2);
        let mut parent = parent();
        let mut left_page = Page::new();
        let right = node.split(&mut parent, 2, &mut left_page, &far);
        let right = assert_basic(right);
        let left = DenseNode::from_page(&left_page);
        assert_eq!(left.len(), 10);
        assert_eq!(right.count(), 0);
        assert_eq!(left.upper_fence(), &key4(10));
        assert_eq!(right.lower_fence(), &key4(10));
        assert_eq!(right.upper_fence(), &key4(0xffff));
        assert_eq!(&parent.full_key(0)[..], &key4(10));
        assert_eq!(parent.child_for(&key4(5)), 2);
        assert_eq!(parent.child_for(&far), 1);
    }

    #[test]
    fn test_split_empty() {
        let node = dense_node();
        let mut parent = parent();
        let mut left_page = Page::new();
        let right = node.split(&mut parent, 2, &mut left_page, &[0xaa, 0xbb, 0]);
        let right = assert_basic(right);
        assert_eq!(right.count(), 0);
        assert_eq!(right.lower_fence(), &key4(0));
        assert_eq!(parent.count(), 0);
    }

    #[test]
    fn test_split_slightly_too_large() {
        let node = filled([1, 2, 3]);
        let slot_count = node.slot_count() as u16;
        let next = key4(slot_count + 2);
        assert_eq!(node.classify_full_key(&next), KeyClass::SlightlyTooLarge);
        let mut parent = parent();
        let mut left_page = Page::new();
        let right = node.split(&mut parent, 2, &mut left_page, &next);
        let right = assert_dense(right);
        let left = DenseNode::from_page(&left_page);
        assert_eq!(left.len(), 3);
        assert!(right.is_empty());
        assert_eq!(right.lower_fence(), &key4(3));
        assert_eq!(right.array_start(), 4);
        let (right, inserted) = right.insert(&next, &[9]);
        assert!(inserted);
        assert_eq!(assert_dense(right).lookup(&next), Some(&[9][..]));
    }

    #[test]
    fn test_split_wrong_len() {
        let node = filled(1..=1000);
        let odd_key = [0xaa, 0xbb, 0x01, 0x00, 0x07];
        assert_eq!(node.classify_full_key(&odd_key), KeyClass::WrongLen);
        let mut parent = parent();
        let mut left_page = Page::new();
        let right = node.split(&mut parent, 2, &mut left_page, &odd_key);
        let right = assert_dense(right);
        let left = DenseNode::from_page(&left_page);
        assert_eq!(left.len(), 500);
        assert_eq!(right.len(), 500);
        assert_eq!(left.upper_fence(), &key4(500));
        assert_eq!(right.lower_fence(), &key4(500));
        assert_eq!(right.upper_fence(), &key4(0xffff));
        assert_eq!(right.lookup(&key4(501)), Some(&[501u16 as u8][..]));
        assert_eq!(right.lookup(&key4(1000)), Some(&[1000u16 as u8][..]));
        assert_eq!(left.lookup(&key4(1)), Some(&[1][..]));
        assert_eq!(left.lookup(&key4(500)), Some(&[500u16 as u8][..]));
        let mut all = left.iter().chain(right.iter()).map(|(k, _)| k.to_vec());
        assert!((1..=1000).all(|n| all.next() == Some(key4(n).to_vec())));
        assert_eq!(all.next(), None);
    }

    #[test]
    fn test_split_wrong_len_sparse() {
        let node = filled([1, 2, 3, 3000]);
        let mut parent = parent();
        let mut left_page = Page::new();
        let right = node.split(&mut parent, 2, &mut left_page, &[0xaa, 0xbb, 0, 0, 1]);
        let left = DenseNode::from_page(&left_page);
        assert_eq!(left.len(), 2);
        assert_eq!(left.upper_fence(), &key4(2));
        let right = assert_dense(right);
        assert_eq!(right.len(), 2);
        assert_eq!(right.array_start(), 3);
        assert_eq!(right.lookup(&key4(3)), Some(&[3][..]));
        assert_eq!(right.lookup(&key4(3000)), Some(&[3000u16 as u8][..]));
    }

    #[test]
    fn test_for_each_from() {
        let node = filled([1, 5, 9, 200]);
        let keys_from = |start: &[u8]| {
            let mut keys = Vec::new();
            assert!(node.for_each_from(start, |k, _| {
                keys.push(k.to_vec());
                true
            }));
            keys
        };
        let all = [1, 5, 9, 200].map(|n| key4(n).to_vec());
        assert_eq!(keys_from(b""), all);
        assert_eq!(keys_from(&key4(0)), all);
        assert_eq!(keys_from(&[0xaa, 0xbb, 0]), all);
        assert_eq!(keys_from(&key4(5)), &all[1..]);
        assert_eq!(keys_from(&key4(6)), &all[2..]);
        assert_eq!(keys_from(&[0xaa, 0xbb, 0, 5, 0]), &all[2..]);
        assert!(keys_from(&key4(201)).is_empty());
        assert!(keys_from(&key4(node.slot_count() as u16 + 1)).is_empty());
        assert!(keys_from(&[0xaa, 0xbc]).is_empty());

        let mut seen = 0;
        assert!(!node.for_each_from(&key4(2), |k, v| {
            assert_eq!(k, key4(5));
            assert_eq!(v, [5]);
            seen += 1;
            false
        }));
        assert_eq!(seen, 1);
    }

    #[test]
    fn test_split_not_numeric_range() {
        // 8 byte keys, byte 3 sits between the prefix and the numeric part
        let key8 = |middle: u8, n: u8| [0, 0, 0, middle, 0, 0, 0, n];
        let mut node = DenseNode::init(Page::new(), &key8(0, 0), &key8(2, 0), 3, 8, 1);
        for n in 1..=5 {
            assert!(node.store(&key8(0, n), &[n]));
        }
        let key = key8(1, 3);
        assert_eq!(node.classify_full_key(&key), KeyClass::NotNumericRange);
        let mut parent = parent();
        let mut left_page = Page::new();
        let right = node.split(&mut parent, 2, &mut left_page, &key);
        let left = DenseNode::from_page(&left_page);
        assert_eq!(left.len(), 5);
        assert_eq!(left.upper_fence(), &key8(0, 5));
        assert_eq!(left.lookup(&key8(0, 1)), Some(&[1][..]));
        assert_eq!(left.lookup(&key8(0, 5)), Some(&[5][..]));
        let mut right = assert_basic(right);
        assert_eq!(right.count(), 0);
        assert_eq!(right.lower_fence(), &key8(0, 5));
        assert_eq!(right.upper_fence(), &key8(2, 0));
        assert_eq!(&parent.full_key(0)[..], &key8(0, 5));
        assert_eq!(parent.child_for(&key8(0, 4)), 2);
        assert_eq!(parent.child_for(&key), 1);
        assert!(right.insert(&key, &[9]));
        assert_eq!(right.lookup(&key), Some(&[9][..]));
        assert_eq!(right.count(), 1);
    }

    #[test]
    fn test_split_right_without_numeric_part() {
        // the upper fence extends the last key, only a basic node fits to its right
        let mut node = DenseNode::init(Page::new(), &key4(0), &[0xaa, 0xbb, 0, 9, 1], 3, 4, 100);
        for n in [1, 9] {
            assert!(node.store(&key4(n), &[n as u8; 100]));
        }
        let next = key4(node.slot_count() as u16 + 5);
        assert_eq!(node.classify_full_key(&next), KeyClass::SlightlyTooLarge);
        let mut parent = parent();
        let mut left_page = Page::new();
        let right = node.split(&mut parent, 2, &mut left_page, &next);
        assert_eq!(&parent.full_key(0)[..], &key4(9));
        let right = assert_basic(right);
        assert_eq!(right.lower_fence(), &key4(9));
    }
}
