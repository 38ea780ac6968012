use thiserror::Error;

#[derive(Error, Debug)]
pub enum PageError {
    #[error("Header page directory is full")]
    DirectoryFull,

    #[error("Index name `{0}` is too long")]
    NameTooLong(String),

    #[error("Record for index `{0}` not found")]
    RecordNotFound(String),

    #[error("Unexpected page type tag {0}")]
    InvalidPageType(u32),
}
