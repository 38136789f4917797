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

//! Interchangeable implementations of the algorithm families that have more
//! than one.
//!
//! The portable implementations are always compiled in.  The `native` feature
//! adds implementations that defer to OpenSSL's own routines.  Every
//! implementation of a family produces byte-identical results, which the tests
//! of each family check.

use crate::{aes_kw, kdf, utils::constant_time_eq, HashAlgorithm, Result};

/// AES Key Wrap as defined by RFC 3394.
pub trait KeyWrap: Send + Sync {
    /// Wraps `key` under the key encryption key `kek`.
    ///
    /// The caller has already checked the `kek` size and that `key` is at
    /// least 16 bytes and a multiple of 8 bytes long.
    fn wrap(&self, kek: &[u8], key: &[u8]) -> Result<Vec<u8>>;

    /// Unwraps `wrapped` with the key encryption key `kek`, failing with
    /// [`DecryptionFailed`](crate::AlgorithmError::DecryptionFailed) if the
    /// integrity check does not pass.
    fn unwrap(&self, kek: &[u8], wrapped: &[u8]) -> Result<Vec<u8>>;
}

/// HKDF extract-and-expand as defined by RFC 5869.
pub trait Hkdf: Send + Sync {
    /// Derives `len` bytes from `ikm`.  A missing `salt` stands for a string
    /// of `hash.size()` zeros.
    ///
    /// The caller has already checked that `len` is at most `255` times the
    /// hash size.
    fn derive(
        &self,
        hash: HashAlgorithm,
        ikm: &[u8],
        salt: Option<&[u8]>,
        info: &[u8],
        len: usize,
    ) -> Result<Vec<u8>>;
}

/// Comparison of MACs and authentication tags.
pub trait TagCompare: Send + Sync {
    /// Returns `true` if `expected` and `actual` are equal.  The running time
    /// depends only on the lengths of the inputs.
    fn equal(&self, expected: &[u8], actual: &[u8]) -> bool;
}

/// `XOR`-accumulating comparison.
pub struct SoftwareTagCompare;

impl TagCompare for SoftwareTagCompare {
    fn equal(&self, expected: &[u8], actual: &[u8]) -> bool {
        constant_time_eq(expected, actual)
    }
}

/// OpenSSL's `CRYPTO_memcmp`.
#[cfg(feature = "native")]
pub struct NativeTagCompare;

#[cfg(feature = "native")]
impl TagCompare for NativeTagCompare {
    fn equal(&self, expected: &[u8], actual: &[u8]) -> bool {
        // `memcmp::eq` panics on a length mismatch
        expected.len() == actual.len() && openssl::memcmp::eq(expected, actual)
    }
}

/// Selects the implementation of each algorithm family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// The portable implementations.
    Software,
    /// OpenSSL's native routines.
    #[cfg(feature = "native")]
    Native,
}

impl Default for Backend {
    fn default() -> Self {
        #[cfg(feature = "native")]
        return Self::Native;

        #[cfg(not(feature = "native"))]
        return Self::Software;
    }
}

impl Backend {
    /// All backends compiled into this build.
    pub fn available() -> Vec<Backend> {
        vec![
            Self::Software,
            #[cfg(feature = "native")]
            Self::Native,
        ]
    }

    /// The AES key wrap implementation.
    pub fn key_wrap(&self) -> &'static dyn KeyWrap {
        match self {
            Self::Software => &aes_kw::SoftwareKeyWrap,
            #[cfg(feature = "native")]
            Self::Native => &aes_kw::NativeKeyWrap,
        }
    }

    /// The HKDF implementation.
    pub fn hkdf(&self) -> &'static dyn Hkdf {
        match self {
            Self::Software => &kdf::SoftwareHkdf,
            #[cfg(feature = "native")]
            Self::Native => &kdf::NativeHkdf,
        }
    }

    /// The tag comparison implementation.
    pub fn tag_compare(&self) -> &'static dyn TagCompare {
        match self {
            Self::Software => &SoftwareTagCompare,
            #[cfg(feature = "native")]
            Self::Native => &NativeTagCompare,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_compare_backends_agree() {
        let cases: [(&[u8], &[u8]); 5] = [
            (b"", b""),
            (b"0123456789abcdef", b"0123456789abcdef"),
            (b"0123456789abcdef", b"0123456789abcdeF"),
            (b"0123456789abcdef", b"0123456789abcde"),
            (b"x", b""),
        ];

        for backend in Backend::available() {
            let compare = backend.tag_compare();
            let results: Vec<bool> = cases.iter().map(|(a, b)| compare.equal(a, b)).collect();
            assert_eq!(results, [true, true, false, false, false], "{backend:?}");
        }
    }

    #[test]
    fn test_default_backend_is_available() {
        assert!(Backend::available().contains(&Backend::default()));
    }
}
