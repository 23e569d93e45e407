//! Download reconciliation: does an episode need fetching at all?

use std::fmt::{Display, Formatter, Result as FmtResult};

/// Where an episode stands relative to its feed entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Decision {
    #[default]
    Unknown,
    /// The local file is exactly the declared length.
    SkipUpToDate,
    /// The lengths disagree, but this show's declared lengths can't be trusted.
    SkipSizeMismatchTolerated,
    NeedsDownload,
}

impl Decision {
    pub fn needs_download(&self) -> bool {
        matches!(self, Self::NeedsDownload)
    }
}

impl Display for Decision {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(match self {
            Self::Unknown => "unknown",
            Self::SkipUpToDate => "up-to-date",
            Self::SkipSizeMismatchTolerated => "size-mismatch-tolerated",
            Self::NeedsDownload => "download",
        })
    }
}

/// Compare what is on disk with what the feed declares.
///
/// Byte-length equality is only a heuristic; the fetch executor does a
/// stronger check before actually transferring anything.
///
/// ```
/// use podarc_archive::{Decision, decide};
/// assert_eq!(decide(None, 100, false), Decision::NeedsDownload);
/// assert_eq!(decide(Some(100), 100, false), Decision::SkipUpToDate);
/// assert_eq!(decide(Some(99), 100, true), Decision::SkipSizeMismatchTolerated);
/// ```
pub fn decide(local_size: Option<u64>, declared_length: i64, tolerate_mismatch: bool) -> Decision {
    let Some(local_size) = local_size else {
        return Decision::NeedsDownload;
    };
    if i64::try_from(local_size).is_ok_and(|size| size == declared_length) {
        return Decision::SkipUpToDate;
    }
    match tolerate_mismatch {
        true => Decision::SkipSizeMismatchTolerated,
        false => Decision::NeedsDownload,
    }
}
