mod descriptor;
mod feed;

pub use descriptor::{EpisodeDescriptor, UNSET};
pub use feed::{Enclosure, Feed, FeedEntry};
