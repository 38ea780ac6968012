pub mod btree_page;
pub mod error;
pub mod header_page;
pub mod internal_page;
pub mod leaf_page;

pub use btree_page::{IndexPageType, OperationType};
pub use error::PageError;
pub use header_page::{HeaderPageMut, HeaderPageRef};
pub use internal_page::{InternalMut, InternalRef};
pub use leaf_page::{LeafMut, LeafRef};
