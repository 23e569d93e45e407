//! Feed handling for podarc: RSS parsing, episode identity, metadata
//! resolution into filenames, and rewriting feeds to point at a mirror.

mod consts;
pub mod error;
mod identity;
pub mod models;
mod parse;
pub mod resolve;
mod rewrite;
mod template;
#[cfg(test)]
mod testing;

pub use crate::consts::DEFAULT_FILENAME_TEMPLATE;
pub use crate::identity::Identity;
pub use crate::parse::parse_feed;
pub use crate::resolve::{Resolved, Resolver};
pub use crate::rewrite::{RemoteEnclosure, Rewrite, RewriteReport, rewrite_feed};
pub use crate::template::FilenameGenerator;
