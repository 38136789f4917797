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

/// Error returned by the algorithm primitives and the [`Registry`](crate::Registry).
///
/// The authentication failures ([`MacCheckFailed`](Self::MacCheckFailed),
/// [`DecryptionFailed`](Self::DecryptionFailed) and
/// [`VerificationFailed`](Self::VerificationFailed)) carry a fixed message and
/// never a source, so they cannot be used to tell apart *which* check failed.
#[derive(strum_macros::Display, Debug, PartialEq, Eq, Clone)]
pub enum AlgorithmError {
    /// No primitive is registered for the requested identifier and operation.
    #[strum(to_string = "unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),
    /// The key has the wrong length for the algorithm.
    #[strum(to_string = "invalid key size")]
    InvalidKeySize,
    /// The initialization vector is missing or has the wrong length.
    #[strum(to_string = "invalid iv")]
    InvalidIv,
    /// The authentication tag is missing or has the wrong length.
    #[strum(to_string = "invalid tag")]
    InvalidTag,
    /// An input other than the key or the IV is not acceptable.
    #[strum(to_string = "invalid input: {0}")]
    InvalidInput(String),
    /// The key material is of the wrong type for the algorithm.
    #[strum(to_string = "improper key")]
    ImproperKey,
    /// The MAC did not match.
    #[strum(to_string = "mac check failed")]
    MacCheckFailed,
    /// Decryption or key unwrapping failed.
    #[strum(to_string = "decryption failed")]
    DecryptionFailed,
    /// The signature did not verify.
    #[strum(to_string = "verification failed")]
    VerificationFailed,
    /// An ECDSA signature is not well formed.
    #[strum(to_string = "malformed ECDSA signature")]
    MalformedSignature,
    /// The cryptographic backend failed unexpectedly.
    #[strum(to_string = "crypto backend failed")]
    CryptoBackend,
}

impl bherror::BhError for AlgorithmError {}

impl AlgorithmError {
    /// Returns `true` for authentication failures, i.e. the errors which mean
    /// that the input was rejected by the primitive, rather than misused.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            Self::MacCheckFailed | Self::DecryptionFailed | Self::VerificationFailed
        )
    }
}

/// The [`bherror::Result`] type with the error type of [`AlgorithmError`],
/// used throughout this crate.
pub type Result<T> = bherror::Result<T, AlgorithmError>;
