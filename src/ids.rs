//! History and version identifiers

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VersionControlError};

macro_rules! token_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Borrow the token text
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

token_id!(
    /// Repository-unique version history identifier
    HistoryId
);

token_id!(
    /// History-scoped version identifier
    VersionId
);

/// Random draws tried before falling back to a scan of the id space
const RANDOM_ATTEMPTS: usize = 64;

/// Draw a random integer token from `1..=ceiling` that `taken` rejects.
///
/// Callers hold `&mut` on the owning map, so the check and the insert that
/// follows cannot interleave with another allocation. After
/// `RANDOM_ATTEMPTS` misses the space is scanned in order; a full space
/// fails with `IdSpaceExhausted`.
pub(crate) fn allocate<T, F>(kind: &str, ceiling: u64, taken: F) -> Result<T>
where
    T: From<String>,
    F: Fn(&str) -> bool,
{
    let ceiling = ceiling.max(1);
    let mut rng = rand::thread_rng();
    for _ in 0..RANDOM_ATTEMPTS {
        let candidate = rng.gen_range(1..=ceiling).to_string();
        if !taken(&candidate) {
            return Ok(T::from(candidate));
        }
    }

    (1..=ceiling)
        .map(|n| n.to_string())
        .find(|candidate| !taken(candidate))
        .map(T::from)
        .ok_or_else(|| VersionControlError::IdSpaceExhausted(format!("{} ids up to {}", kind, ceiling)))
}
