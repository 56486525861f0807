//! Unique identifiers for links and edges.
//!
//! Identifiers are random 128-bit UUIDs drawn from the OS CSPRNG. Their
//! canonical string form is the lowercase hyphenated UUID, and the derived
//! ordering (byte order) agrees with the ordering of that string form, so
//! range bounds computed on either representation select the same ids.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{GraphError, Result};

/// Upper bound on identifier draws before giving up.
pub const MAX_ID_ATTEMPTS: usize = 16;

/// Identifier of a [`Link`](crate::Link).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct LinkId(Uuid);

impl LinkId {
    /// Lowest id in the id space; also the "unassigned" value.
    pub const MIN: Self = Self(Uuid::nil());

    /// Highest id in the id space.
    pub const MAX: Self = Self(Uuid::from_u128(u128::MAX));

    /// The unassigned id.
    #[must_use]
    pub const fn nil() -> Self {
        Self::MIN
    }

    /// Draw a fresh random id.
    #[must_use]
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub const fn from_u128(v: u128) -> Self {
        Self(Uuid::from_u128(v))
    }

    #[must_use]
    pub const fn as_u128(self) -> u128 {
        self.0.as_u128()
    }

    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    #[must_use]
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl From<Uuid> for LinkId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for LinkId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Identifier of an [`Edge`](crate::Edge).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EdgeId(Uuid);

impl EdgeId {
    /// The unassigned id.
    #[must_use]
    pub const fn nil() -> Self {
        Self(Uuid::nil())
    }

    /// Draw a fresh random id.
    #[must_use]
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    #[must_use]
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl From<Uuid> for EdgeId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for EdgeId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Draw ids from `fresh` until one is not `taken`.
///
/// Each collision is logged at `warn` and retried with a new draw.
///
/// # Errors
///
/// Returns [`GraphError::IdSpaceExhausted`] after [`MAX_ID_ATTEMPTS`] collisions.
pub fn generate_unique<T: fmt::Display + Copy>(
    fresh: impl FnMut() -> T,
    mut taken: impl FnMut(&T) -> bool,
) -> Result<T> {
    claim_unique(fresh, |id| Ok((!taken(id)).then_some(*id)))
}

/// Draw ids from `fresh` and hand each to `claim` until one is claimed.
///
/// `claim` returns `Ok(None)` when the id is already in use, which triggers
/// a new draw. Its errors are returned unchanged.
///
/// # Errors
///
/// Returns the first error from `claim`, or
/// [`GraphError::IdSpaceExhausted`] after [`MAX_ID_ATTEMPTS`] collisions.
pub fn claim_unique<T: fmt::Display, R>(
    mut fresh: impl FnMut() -> T,
    mut claim: impl FnMut(&T) -> Result<Option<R>>,
) -> Result<R> {
    for _ in 0..MAX_ID_ATTEMPTS {
        let id = fresh();
        if let Some(claimed) = claim(&id)? {
            return Ok(claimed);
        }
        tracing::warn!(%id, "identifier collision, drawing a new one");
    }
    Err(GraphError::IdSpaceExhausted {
        attempts: MAX_ID_ATTEMPTS,
    })
}
