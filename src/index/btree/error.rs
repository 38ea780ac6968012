use thiserror::Error;

use crate::common::types::PageId;
use crate::storage::buffer::BufferPoolError;
use crate::storage::page::PageError;

#[derive(Error, Debug)]
pub enum BTreeError {
    #[error("Buffer pool error: {0}")]
    BufferPool(#[from] BufferPoolError),

    #[error("Header page error: {0}")]
    HeaderPage(#[from] PageError),

    #[error("Page {0} has an unexpected page type")]
    UnexpectedPageType(PageId),

    #[error("Page {0} is not latched by this operation")]
    PageNotLatched(PageId),

    #[error("Page {child} is not a child of page {parent}")]
    ChildMissing { parent: PageId, child: PageId },

    #[error("Root id lock is not held at a root modification")]
    RootLockNotHeld,
}
