use std::mem::size_of;
use zerocopy::*;

pub type PageId = u32;

/// Size of a child pointer stored as an inner node payload
pub const PAGE_ID_SIZE: usize = size_of::<PageId>();

/// First byte of every node page.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum NodeTag {
    Basic = 1,
    Dense = 2,
}

impl TryFrom<u8> for NodeTag {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Basic),
            2 => Ok(Self::Dense),
            _ => Err(value),
        }
    }
}

#[derive(Default, Copy, Debug, Clone, FromBytes, IntoBytes, KnownLayout, Immutable, PartialEq, Eq)]
#[repr(C)]
pub struct NodeFlags(u8);

bitflags::bitflags! {
    impl NodeFlags: u8 {
        /// Set if the basic node holds values instead of child pointers
        const Leaf = 0b1;
    }
}

/// Header of a dense node page. The presence mask starts right after it.
#[derive(Default, Copy, Debug, Clone, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct DenseHeader {
    pub tag: u8,
    #[debug(skip)]
    pub _padding0: u8,
    pub full_key_len: u16,
    /// numeric value represented by slot 0
    pub array_start: u32,
    pub val_len: u16,
    pub slot_count: u16,
    pub lower_fence_len: u16,
    pub upper_fence_len: u16,
    pub prefix_len: u16,
    #[debug(skip)]
    pub _padding1: [u8; 6],
}

#[derive(Default, Copy, Debug, Clone, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct BasicHeader {
    pub tag: u8,
    pub flags: NodeFlags,
    pub count: u16,
    /// heap bytes in use, including the fences
    pub space_used: u16,
    /// start of the heap, it grows downwards from the end of the page
    pub data_offset: u16,
    pub prefix_len: u16,
    pub lower_fence_offset: u16,
    pub lower_fence_len: u16,
    pub upper_fence_offset: u16,
    pub upper_fence_len: u16,
    #[debug(skip)]
    pub _padding: [u8; 2],
    /// right most child of inner nodes
    pub upper: PageId,
}

#[derive(Copy, Clone, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(packed)]
pub struct Slot {
    /// Offset of the key suffix (followed by the payload) from the beginning of the page
    pub offset: u16,
    pub key_len: u16,
    pub payload_len: u16,
    /// see [crate::utils::key_head]
    pub head: u32,
}

pub const DENSE_HEADER_SIZE: usize = size_of::<DenseHeader>();
pub const BASIC_HEADER_SIZE: usize = size_of::<BasicHeader>();
pub const SLOT_SIZE: usize = size_of::<Slot>();

const _: () = assert!(DENSE_HEADER_SIZE == 24);
const _: () = assert!(BASIC_HEADER_SIZE == 24);
const _: () = assert!(SLOT_SIZE == 10);

#[inline(always)]
pub(crate) fn header_cast<T, P>(slice: &P) -> &T
where
    T: FromBytes + IntoBytes + KnownLayout + Immutable,
    P: HeaderProvider + ?Sized,
{
    slice.cast()
}

#[inline(always)]
pub(crate) fn header_cast_mut<T, P>(slice: &mut P) -> &mut T
where
    T: FromBytes + IntoBytes + KnownLayout + Immutable,
    P: HeaderProvider + ?Sized,
{
    slice.cast_mut()
}

pub(crate) trait HeaderProvider {
    fn cast<T: FromBytes + IntoBytes + KnownLayout + Immutable>(&self) -> &T;
    fn cast_mut<T: FromBytes + IntoBytes + KnownLayout + Immutable>(&mut self) -> &mut T;
}

// Page storage is 8 byte aligned and PAGE_SIZE long, so the casts below never fail for node pages
impl HeaderProvider for [u8] {
    #[inline]
    fn cast<T: FromBytes + IntoBytes + KnownLayout + Immutable>(&self) -> &T {
        T::ref_from_prefix(self).unwrap().0
    }

    #[inline]
    fn cast_mut<T: FromBytes + IntoBytes + KnownLayout + Immutable>(&mut self) -> &mut T {
        T::mut_from_prefix(self).unwrap().0
    }
}
