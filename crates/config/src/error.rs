use derive_more::{Display, Error};
use std::path::PathBuf;

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

/// Every variant here is a setup failure: the run cannot sensibly start.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    #[display("configuration file not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    #[display("invalid settings")]
    InvalidSettings,
    #[display("invalid podcast list at {}", _0.display())]
    InvalidPodcasts(#[error(not(source))] PathBuf),
    #[display("invalid show table")]
    InvalidShowTable,
    #[display("embedded asset not found: {_0}")]
    AssetNotFound(#[error(not(source))] String),
    #[display("remote credentials could not be found")]
    MissingCredentials,
    #[display("I/O error")]
    Io,
}
