//! CLI Error Types

use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    #[display("configuration error")]
    Config,
    /// A file named on the command line could not be read or written.
    #[display("file error: {_0}")]
    File(#[error(not(source))] String),
    #[display("could not open the library")]
    Storage,
    #[display("library operation failed")]
    Library,
    /// The input is not what the command expects.
    #[display("invalid input: {_0}")]
    Input(#[error(not(source))] String),
    #[display("some operations failed")]
    Partial,
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Library | Self::Partial)
    }
}
