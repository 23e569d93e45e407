mod credentials;
pub mod error;
mod podcasts;
mod settings;
mod shows;

pub use crate::credentials::Credentials;
pub use crate::podcasts::{KNOWN_SHOWS, Loaded, Podcast, Podcasts};
pub use crate::settings::{ROOT_ENV_VAR, Settings};
pub use crate::shows::{Override, ShowPolicy, ShowTable, TitlePattern};
