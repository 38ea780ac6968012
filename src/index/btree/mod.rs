pub mod error;
pub mod index;

pub use error::BTreeError;
pub use index::{BPlusTree, TreeIterator};
