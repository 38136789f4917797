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
use bh_jwk::KeyError;

/// Error returned by the JWS and JWE operations.
#[derive(strum_macros::Display, Debug, PartialEq, Eq, Clone)]
pub enum JoseError {
    /// The input is not a JWS or JWE in any known serialization.
    #[strum(to_string = "invalid format: {0}")]
    InvalidFormat(String),
    /// A header member is missing or malformed.
    #[strum(to_string = "invalid header: {0}")]
    InvalidHeader(String),
    /// No key or primitive supports the algorithm.
    #[strum(to_string = "unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),
    /// A pattern of an algorithm allow-list is malformed.
    #[strum(to_string = "invalid algorithm pattern: {0}")]
    InvalidAlgorithmPattern(String),
    /// The algorithm is excluded by the caller's allow-list.
    #[strum(to_string = "algorithm not allowed: {0}")]
    AlgorithmNotAllowed(String),
    /// The key cannot be embedded in the header.
    #[strum(to_string = "cannot embed key")]
    CannotEmbedKey,
    /// A `crit` extension has no registered handler.
    #[strum(to_string = "unsupported critical extension: {0}")]
    UnsupportedCriticalExtension(String),
    /// The `crit` header or one of the extensions it lists is not acceptable.
    #[strum(to_string = "invalid critical header: {0}")]
    InvalidCriticalHeader(String),
    /// The serialization holds a single entry, but more were given.
    #[strum(to_string = "too many signers or recipients")]
    TooManyEntries,
    /// No candidate key verified the signature or decrypted the content.
    #[strum(to_string = "no key found")]
    NoKeyFound,
    /// Compressing or decompressing the plaintext failed.
    #[strum(to_string = "compression failed")]
    Compression,
    /// A key operation failed.
    #[strum(to_string = "{0}")]
    Key(KeyError),
    /// A content encryption primitive failed.
    #[strum(to_string = "{0}")]
    Algorithm(AlgorithmError),
}

impl bherror::BhError for JoseError {}

/// The [`bherror::Result`] type with the error type of [`JoseError`].
pub type Result<T> = bherror::Result<T, JoseError>;
