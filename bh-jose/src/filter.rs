// Copyright (C) 2020-2026  The Blockhouse Technology Limited (TBTL).
//
// This program is free software: you can redistribute it and/or modify it
// under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or (at your
// option) any later version.
//
// This program is distributed in the hope that it will be useful, but
// WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public
// License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Algorithm allow-lists.

use std::str::FromStr;

use bherror::traits::ForeignError as _;
use wildcard::Wildcard;

use crate::{JoseError, Result};

/// A caller supplied list of acceptable algorithms.
///
/// Each pattern is a [`Wildcard`] over the algorithm identifier, anchored at
/// both ends, in which `*` matches any run of characters, e.g. `"A*KW"` or
/// `"PS*"`.  A pattern prefixed with `!` excludes the algorithms it matches,
/// and exclusions always win.  When there are only exclusions, everything
/// else is allowed.
///
/// ```
/// use bh_jose::AlgorithmFilter;
///
/// let filter = AlgorithmFilter::parse("* !A*KW").unwrap();
/// assert!(filter.allows("A256GCM"));
/// assert!(filter.allows("RSA-OAEP"));
/// assert!(!filter.allows("A128KW"));
/// // the pattern is anchored, `ECDH-ES+A128KW` does not start with `A`
/// assert!(filter.allows("ECDH-ES+A128KW"));
///
/// let filter = AlgorithmFilter::parse("!*KW").unwrap();
/// assert!(!filter.allows("ECDH-ES+A128KW"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct AlgorithmFilter {
    allowed: Vec<Wildcard<'static>>,
    denied: Vec<Wildcard<'static>>,
}

impl AlgorithmFilter {
    /// A filter that allows every algorithm.
    pub fn any() -> Self {
        Self::default()
    }

    /// Builds a filter from a list of patterns.  Each entry may itself be a
    /// space separated list.
    pub fn new<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut filter = Self::default();
        for pattern in patterns {
            for pattern in pattern.as_ref().split_whitespace() {
                match pattern.strip_prefix('!') {
                    Some(denied) => filter.denied.push(wildcard(denied)?),
                    None => filter.allowed.push(wildcard(pattern)?),
                }
            }
        }
        Ok(filter)
    }

    /// Builds a filter from a space separated list of patterns.
    pub fn parse(patterns: &str) -> Result<Self> {
        Self::new([patterns])
    }

    /// Whether `alg` is acceptable.
    pub fn allows(&self, alg: &str) -> bool {
        let alg = alg.as_bytes();
        let allowed =
            self.allowed.is_empty() || self.allowed.iter().any(|pattern| pattern.is_match(alg));
        allowed && !self.denied.iter().any(|pattern| pattern.is_match(alg))
    }
}

fn wildcard(pattern: &str) -> Result<Wildcard<'static>> {
    Wildcard::from_owned(pattern.as_bytes().to_vec())
        .foreign_err(|| JoseError::InvalidAlgorithmPattern(pattern.to_owned()))
}

impl FromStr for AlgorithmFilter {
    type Err = bherror::Error<JoseError>;

    fn from_str(patterns: &str) -> Result<Self> {
        Self::parse(patterns)
    }
}

impl TryFrom<&str> for AlgorithmFilter {
    type Error = bherror::Error<JoseError>;

    fn try_from(patterns: &str) -> Result<Self> {
        Self::parse(patterns)
    }
}

impl TryFrom<Vec<&str>> for AlgorithmFilter {
    type Error = bherror::Error<JoseError>;

    fn try_from(patterns: Vec<&str>) -> Result<Self> {
        Self::new(patterns)
    }
}
