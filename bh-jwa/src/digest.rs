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

//! Plain message digests (`SHA-1`, `SHA-256`, `SHA-384`, `SHA-512`).

use bherror::traits::ForeignError as _;
use openssl::hash::{hash, MessageDigest};

use crate::{AlgorithmError, Operation, Output, RegistryBuilder, Result};

/// The hash functions used by the JOSE algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    /// SHA-1, only for `HS1`, `RSA-OAEP` and thumbprints.
    Sha1,
    /// SHA-256
    Sha256,
    /// SHA-384
    Sha384,
    /// SHA-512
    Sha512,
}

impl HashAlgorithm {
    /// All hash functions, in increasing output size.
    pub const ALL: [HashAlgorithm; 4] = [Self::Sha1, Self::Sha256, Self::Sha384, Self::Sha512];

    /// The registry name, e.g. `SHA-256`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sha1 => "SHA-1",
            Self::Sha256 => "SHA-256",
            Self::Sha384 => "SHA-384",
            Self::Sha512 => "SHA-512",
        }
    }

    /// The output size in bytes.
    pub fn size(&self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }

    /// Returns the SHA-2 function with an output of `bits` bits.
    pub fn from_bits(bits: usize) -> Option<Self> {
        match bits {
            256 => Some(Self::Sha256),
            384 => Some(Self::Sha384),
            512 => Some(Self::Sha512),
            _ => None,
        }
    }

    pub(crate) fn message_digest(&self) -> MessageDigest {
        match self {
            Self::Sha1 => MessageDigest::sha1(),
            Self::Sha256 => MessageDigest::sha256(),
            Self::Sha384 => MessageDigest::sha384(),
            Self::Sha512 => MessageDigest::sha512(),
        }
    }

    #[cfg(feature = "native")]
    pub(crate) fn md(&self) -> &'static openssl::md::MdRef {
        use openssl::md::Md;

        match self {
            Self::Sha1 => Md::sha1(),
            Self::Sha256 => Md::sha256(),
            Self::Sha384 => Md::sha384(),
            Self::Sha512 => Md::sha512(),
        }
    }

    /// Hashes `data`.
    pub fn digest(&self, data: &[u8]) -> Result<Vec<u8>> {
        let digest =
            hash(self.message_digest(), data).foreign_err(|| AlgorithmError::CryptoBackend)?;
        Ok(digest.to_vec())
    }
}

pub(crate) fn register(builder: &mut RegistryBuilder) {
    for alg in HashAlgorithm::ALL {
        builder.register(Operation::Digest, alg.name(), move |_, data, _| {
            Ok(Output::data(alg.digest(data)?))
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_vectors() {
        // FIPS 180-2 "abc" test vectors
        let cases = [
            (
                HashAlgorithm::Sha1,
                "a9993e364706816aba3e25717850c26c9cd0d89d",
            ),
            (
                HashAlgorithm::Sha256,
                "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad",
            ),
            (
                HashAlgorithm::Sha384,
                "cb00753f45a35e8bb5a03d699ac65007272c32ab0eded1631a8b605a43ff5bed\
                 8086072ba1e7cc2358baeca134c825a7",
            ),
            (
                HashAlgorithm::Sha512,
                "ddaf35a193617abacc417349ae20413112e6fa4e89a97ea20a9eeee64b55d39a\
                 2192992a274fc1a836ba3c23a3feebbd454d4423643ce80e2a9ac94fa54ca49f",
            ),
        ];

        for (alg, expected) in cases {
            let digest = alg.digest(b"abc").unwrap();
            assert_eq!(digest.len(), alg.size());
            assert_eq!(hex::encode(digest), expected, "{}", alg.name());
        }
    }

    #[test]
    fn test_from_bits() {
        assert_eq!(HashAlgorithm::from_bits(256), Some(HashAlgorithm::Sha256));
        assert_eq!(HashAlgorithm::from_bits(512), Some(HashAlgorithm::Sha512));
        assert_eq!(HashAlgorithm::from_bits(160), None);
    }
}
