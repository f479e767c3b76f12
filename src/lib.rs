//! Paged B-tree node encodings.
//!
//! Nodes live in fixed size [Page]s and come in two representations:
//! * [BasicNode]: a slotted page with variable length keys and payloads, used for inner nodes and leafs.
//! * [DenseNode]: a leaf for fixed length keys forming a numeric range, storing only a
//!   presence bit and a fixed width value per key.
//!
//! [Tree] puts them together into an ordered map, switching leafs between the two representations
//! as their contents allow.

#[macro_use]
extern crate derive_more;
#[macro_use]
extern crate log;

mod basic;
mod dense;
mod error;
mod mask;
mod node;
mod numeric;
mod options;
mod page;
mod repr;
mod tree;
pub mod utils;


pub use basic::{BasicNode, SeparatorInfo};
pub use dense::{compute_slot_count, DenseNode, KeyClass};
pub use error::Error;
pub use mask::PresenceMask;
pub use node::AnyNode;
pub use options::TreeOptions;
pub use page::{Page, PageArena};
pub use repr::{NodeTag, PageId};
pub use tree::{Tree, TreeStats};

/// Size of every node page
pub const PAGE_SIZE: usize = 4096;
/// Upper bound of [TreeOptions::max_key_len]
pub const MAX_KEY_LEN: usize = 256;
/// Upper bound of [TreeOptions::max_value_len]
pub const MAX_VALUE_LEN: usize = 1024;

/// Owned key, inline for short keys
pub type KeyBuf = smallvec::SmallVec<u8, 32>;
