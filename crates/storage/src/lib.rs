//! Storage for podarc: the local archive on disk, and the HTTP seam through
//! which everything remote is reached.

mod archive;
pub mod error;
mod models;
mod path;
pub mod remote;
mod stage;

pub use crate::archive::{Archive, FileInfoStream, SCRATCH_DIR};
pub use crate::models::{FileInfo, Published};
pub use crate::path::validate as validate_path;
pub use crate::remote::{HttpOptions, HttpRemote, Remote, Response};
pub use crate::stage::Staged;
use std::sync::Arc;

pub type RemoteHandle = Arc<dyn Remote>;
