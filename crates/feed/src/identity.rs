//! Canonical episode identity.
//!
//! Feeds identify items with a `<guid>` that is usually a dashed 128-bit
//! value, but older items carry a small integer instead. Both forms collapse
//! to the same 36-character lowercase string, which seeds ledger keys and
//! filenames, so the mapping must never change.

use crate::error::{ErrorKind, Result};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use uuid::Uuid;

const IDENTITY_LEN: usize = 36;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Normalize a raw `<guid>` value. `title` only feeds the error message.
    ///
    /// ```
    /// use podarc_feed::Identity;
    /// let id = Identity::normalize("123", "Show #5").unwrap();
    /// assert_eq!(id.as_str(), "00000000-0000-0000-0000-00007b000000");
    /// ```
    pub fn normalize(raw: &str, title: &str) -> Result<Self> {
        if raw.chars().count() == IDENTITY_LEN {
            return Ok(Self(raw.to_lowercase()));
        }
        let Ok(number) = raw.trim().parse::<i32>() else {
            exn::bail!(ErrorKind::InvalidIdentifier { raw: raw.to_string(), title: title.to_string() });
        };
        let mut bytes = [0u8; 16];
        bytes[12..].copy_from_slice(&number.to_le_bytes());
        Ok(Self(Uuid::from_bytes(bytes).hyphenated().to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for Identity {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.0)
    }
}
