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

use bh_jwa::AlgorithmError;

/// Error returned by the [`Key`](crate::Key) operations and the
/// [`KeyStore`](crate::KeyStore).
#[derive(strum_macros::Display, Debug, PartialEq, Eq, Clone)]
pub enum KeyError {
    /// No [`KeyTypeConfig`](crate::KeyTypeConfig) is registered for the `kty`.
    #[strum(to_string = "unsupported key type: {0}")]
    UnsupportedKeyType(String),
    /// The key cannot be used with the algorithm in the requested mode.
    #[strum(to_string = "unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),
    /// The key has no material suitable for the requested operation.
    #[strum(to_string = "improper key")]
    ImproperKey,
    /// The JWK members do not describe a valid key.
    #[strum(to_string = "invalid key: {0}")]
    InvalidKey(String),
    /// The input is not in the expected JSON, PEM or DER format.
    #[strum(to_string = "invalid format: {0}")]
    InvalidFormat(String),
    /// The algorithm primitive failed.
    #[strum(to_string = "{0}")]
    Algorithm(AlgorithmError),
    /// Key generation failed.
    #[strum(to_string = "key generation failed")]
    KeyGenerationFailed,
    /// The cryptographic backend failed unexpectedly.
    #[strum(to_string = "crypto backend failed")]
    CryptoBackend,
}

impl bherror::BhError for KeyError {}

impl KeyError {
    /// Returns `true` if the error is an authentication failure of the
    /// underlying primitive (`mac check failed`, `decryption failed` or
    /// `verification failed`).
    pub fn is_authentication_failure(&self) -> bool {
        matches!(self, Self::Algorithm(error) if error.is_authentication_failure())
    }
}

/// The [`bherror::Result`] type with the error type of [`KeyError`].
pub type Result<T> = bherror::Result<T, KeyError>;
