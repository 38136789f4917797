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

use crate::{EcComponents, JsonObject};

/// The operation category a primitive is registered under.
///
/// Key management algorithms (`A128KW`, `RSA-OAEP`, `ECDH-ES+A128KW`, ...) are
/// registered under [`Operation::Encrypt`] for wrapping and
/// [`Operation::Decrypt`] for unwrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum Operation {
    /// Hash the input.
    #[strum(to_string = "digest")]
    Digest,
    /// Produce a signature or MAC over the input.
    #[strum(to_string = "sign")]
    Sign,
    /// Check [`Props::signature`] against the input.
    #[strum(to_string = "verify")]
    Verify,
    /// Encrypt content or wrap a key.
    #[strum(to_string = "encrypt")]
    Encrypt,
    /// Decrypt content or unwrap a key.
    #[strum(to_string = "decrypt")]
    Decrypt,
    /// Derive key material.
    #[strum(to_string = "derive")]
    Derive,
}

impl Operation {
    /// All operations.
    pub const ALL: [Operation; 6] = [
        Self::Digest,
        Self::Sign,
        Self::Verify,
        Self::Encrypt,
        Self::Decrypt,
        Self::Derive,
    ];
}

/// Auxiliary inputs of a primitive call.
///
/// Every primitive reads only the members relevant to it and ignores the rest.
#[derive(Debug, Clone, Default)]
pub struct Props {
    /// Initialization vector (AES-GCM, AES-CBC-HMAC, `A*GCMKW`).
    pub iv: Option<Vec<u8>>,
    /// Additional authenticated data.
    pub aad: Option<Vec<u8>>,
    /// Authentication tag to check on decryption.
    pub tag: Option<Vec<u8>>,
    /// Signature or MAC to check on verification.
    pub signature: Option<Vec<u8>>,
    /// PBES2 salt input (`p2s`), before the algorithm prefix is added.
    pub p2s: Option<Vec<u8>>,
    /// PBES2 iteration count (`p2c`).
    pub p2c: Option<u32>,
    /// ECDH-ES ephemeral key: the sender's private key when encrypting (a
    /// fresh one is generated if absent), the received public key when
    /// decrypting.
    pub epk: Option<EcComponents>,
    /// ECDH-ES `PartyUInfo`.
    pub apu: Option<Vec<u8>>,
    /// ECDH-ES `PartyVInfo`.
    pub apv: Option<Vec<u8>>,
    /// Content encryption algorithm, used by direct key agreement to size
    /// the agreed key.
    pub enc: Option<String>,
    /// Requested output length in bits for key derivation.
    pub length: Option<usize>,
    /// HKDF salt.
    pub salt: Option<Vec<u8>>,
    /// HKDF info.
    pub info: Option<Vec<u8>>,
    /// Concat KDF `OtherInfo`.
    pub other_info: Option<Vec<u8>>,
    /// Relaxes the HMAC minimum key length, for the MAC half-key of the
    /// composite AES-CBC-HMAC algorithms.
    pub loose: bool,
}

impl Props {
    /// Props with just an IV and AAD, the common content encryption case.
    pub fn with_iv_aad(iv: impl Into<Vec<u8>>, aad: impl Into<Vec<u8>>) -> Self {
        Self {
            iv: Some(iv.into()),
            aad: Some(aad.into()),
            ..Default::default()
        }
    }
}

/// The result of a primitive call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Output {
    /// The primary output: digest, signature, ciphertext, plaintext, wrapped
    /// or unwrapped key, or derived key.  Empty for verification.
    pub data: Vec<u8>,
    /// The authentication tag produced by an AEAD encryption.
    pub tag: Option<Vec<u8>>,
    /// The IV used by the encryption, when it was generated.
    pub iv: Option<Vec<u8>>,
    /// Header members the key management algorithm contributes (`iv`/`tag`
    /// for `A*GCMKW`, `p2s`/`p2c` for PBES2, `epk`/`apu`/`apv` for ECDH-ES).
    pub header: JsonObject,
    /// Set by direct key agreement: `data` is the content encryption key
    /// itself and nothing is wrapped.
    pub direct: bool,
}

impl Output {
    /// An output carrying only `data`.
    pub fn data(data: Vec<u8>) -> Self {
        Self {
            data,
            ..Default::default()
        }
    }
}
