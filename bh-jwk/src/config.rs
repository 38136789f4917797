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

//! The [`KeyTypeConfig`] trait and the types shared by its implementations.

use bh_jwa::{base64_url_decode, base64_url_encode, JsonObject, KeyMaterial, Operation, Props};
use bherror::{traits::ForeignError as _, Error};
use serde_json::Value;

use crate::{ec::parse_ec_public, KeyError, Result};

/// What a key is asked to do.
///
/// [`Wrap`](Self::Wrap) and [`Unwrap`](Self::Unwrap) are the JWE key
/// management modes; they are dispatched as [`Operation::Encrypt`] and
/// [`Operation::Decrypt`] of the key management algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum Mode {
    /// Produce a signature or MAC.
    #[strum(to_string = "sign")]
    Sign,
    /// Check a signature or MAC.
    #[strum(to_string = "verify")]
    Verify,
    /// Encrypt content.
    #[strum(to_string = "encrypt")]
    Encrypt,
    /// Decrypt content.
    #[strum(to_string = "decrypt")]
    Decrypt,
    /// Protect a content encryption key.
    #[strum(to_string = "wrap")]
    Wrap,
    /// Recover a content encryption key.
    #[strum(to_string = "unwrap")]
    Unwrap,
}

impl Mode {
    /// All modes.
    pub const ALL: [Mode; 6] = [
        Self::Sign,
        Self::Verify,
        Self::Encrypt,
        Self::Decrypt,
        Self::Wrap,
        Self::Unwrap,
    ];

    /// The registry operation the mode is dispatched as.
    pub fn operation(&self) -> Operation {
        match self {
            Self::Sign => Operation::Sign,
            Self::Verify => Operation::Verify,
            Self::Encrypt | Self::Wrap => Operation::Encrypt,
            Self::Decrypt | Self::Unwrap => Operation::Decrypt,
        }
    }

    /// Whether a key declared for `key_use` may be used in this mode.
    pub fn permitted_by(&self, key_use: KeyUse) -> bool {
        match key_use {
            KeyUse::Sig => matches!(self, Self::Sign | Self::Verify),
            KeyUse::Enc => !matches!(self, Self::Sign | Self::Verify),
        }
    }
}

/// The JWK `use` member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum KeyUse {
    /// `"sig"`
    #[strum(to_string = "sig")]
    Sig,
    /// `"enc"`
    #[strum(to_string = "enc")]
    Enc,
}

impl KeyUse {
    /// Parses the member value.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sig" => Some(Self::Sig),
            "enc" => Some(Self::Enc),
            _ => None,
        }
    }
}

/// The public and private material of a key.  At least one of them is
/// present in every [`Key`](crate::Key).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyPair {
    /// Material for the public operations, if the key type has a public form.
    pub public: Option<KeyMaterial>,
    /// Material for the private operations.
    pub private: Option<KeyMaterial>,
}

/// The behaviour of one key type (`kty`).
///
/// A [`Key`](crate::Key) holds its base members (`kid`, `use`, `alg`, ...)
/// itself and defers everything type specific to its config: parsing the
/// material, the algorithms the material can be used with, which part of the
/// material an operation needs and the serialization of the material.
pub trait KeyTypeConfig: Send + Sync + 'static {
    /// The `kty` member value.
    fn kty(&self) -> &'static str;

    /// Every type specific member, public and private.
    fn members(&self) -> &'static [&'static str];

    /// The members hashed by the RFC 7638 thumbprint, in lexicographic order.
    fn thumbprint_members(&self) -> &'static [&'static str];

    /// Parses the public material, returning `None` if the members needed for
    /// it are missing.
    fn public_key(&self, fields: &JsonObject) -> Result<Option<KeyMaterial>>;

    /// Parses the private material, returning `None` if the members needed for
    /// it are missing.
    fn private_key(&self, fields: &JsonObject) -> Result<Option<KeyMaterial>>;

    /// The algorithms the material supports in `mode`, most preferred first.
    ///
    /// The `use` and `alg` restrictions of the key are applied by
    /// [`Key::algorithms`](crate::Key::algorithms) on top of this.
    fn algorithms(&self, keys: &KeyPair, mode: Mode) -> Vec<&'static str>;

    /// The material handed to the primitive of `alg` in `mode`.
    fn select_key<'a>(
        &self,
        keys: &'a KeyPair,
        mode: Mode,
        _alg: &str,
    ) -> Option<&'a KeyMaterial> {
        match mode {
            Mode::Sign | Mode::Decrypt | Mode::Unwrap => keys.private.as_ref(),
            Mode::Verify | Mode::Encrypt | Mode::Wrap => {
                keys.public.as_ref().or(keys.private.as_ref())
            }
        }
    }

    /// The public members, `base64url` encoded.
    fn public_fields(&self, keys: &KeyPair) -> JsonObject;

    /// The private members, `base64url` encoded.
    fn private_fields(&self, keys: &KeyPair) -> JsonObject;

    /// The members of a fresh key of `size` bits, `kty` included.
    fn generate(&self, size: usize) -> Result<JsonObject>;

    /// The primitive properties of a key management operation, taken from
    /// the (merged) JOSE header.
    fn props(&self, _mode: Mode, header: &JsonObject) -> Result<Props> {
        header_props(header)
    }
}

/// Reads a `base64url` member.
pub(crate) fn binary(fields: &JsonObject, name: &str) -> Result<Option<Vec<u8>>> {
    match fields.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => base64_url_decode(value)
            .foreign_err(|| KeyError::InvalidKey(format!("`{name}` is not base64url")))
            .map(Some),
        Some(_) => Err(Error::root(KeyError::InvalidKey(format!(
            "`{name}` is not a string"
        )))),
    }
}

/// Reads a string member.
pub(crate) fn string<'a>(fields: &'a JsonObject, name: &str) -> Result<Option<&'a str>> {
    match fields.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value)),
        Some(_) => Err(Error::root(KeyError::InvalidKey(format!(
            "`{name}` is not a string"
        )))),
    }
}

pub(crate) fn put_binary(object: &mut JsonObject, name: &str, value: &[u8]) {
    object.insert(name.to_owned(), Value::String(base64_url_encode(value)));
}

/// Key management properties from a JOSE header: `iv`, `tag`, `p2s`, `p2c`,
/// `epk`, `apu`, `apv` and `enc`.
pub fn header_props(header: &JsonObject) -> Result<Props> {
    let p2c = match header.get("p2c") {
        None => None,
        Some(value) => Some(
            value
                .as_u64()
                .and_then(|p2c| u32::try_from(p2c).ok())
                .ok_or_else(|| {
                    Error::root(KeyError::InvalidFormat("`p2c` is not a count".to_owned()))
                })?,
        ),
    };

    let epk = match header.get("epk") {
        None => None,
        Some(Value::Object(epk)) => Some(parse_ec_public(epk)?.ok_or_else(|| {
            Error::root(KeyError::InvalidFormat("incomplete `epk`".to_owned()))
        })?),
        Some(_) => {
            return Err(Error::root(KeyError::InvalidFormat(
                "`epk` is not an object".to_owned(),
            )))
        }
    };

    Ok(Props {
        iv: binary(header, "iv")?,
        tag: binary(header, "tag")?,
        p2s: binary(header, "p2s")?,
        p2c,
        epk,
        apu: binary(header, "apu")?,
        apv: binary(header, "apv")?,
        enc: string(header, "enc")?.map(str::to_owned),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use bh_jwa::json_object;

    #[test]
    fn test_mode_restrictions() {
        assert!(Mode::Sign.permitted_by(KeyUse::Sig));
        assert!(!Mode::Encrypt.permitted_by(KeyUse::Sig));
        assert!(Mode::Unwrap.permitted_by(KeyUse::Enc));
        assert!(!Mode::Verify.permitted_by(KeyUse::Enc));

        assert_eq!(Mode::Wrap.operation(), Operation::Encrypt);
        assert_eq!(Mode::Unwrap.operation(), Operation::Decrypt);
    }

    #[test]
    fn test_header_props() {
        let header = json_object!({
            "alg": "PBES2-HS256+A128KW",
            "enc": "A128GCM",
            "p2s": "2WCTcJZ1Rvd_CJuJripQ1w",
            "p2c": 4096,
            "apu": "QWxpY2U",
        });
        let props = header_props(&header).unwrap();

        assert_eq!(props.p2s.unwrap().len(), 16);
        assert_eq!(props.p2c, Some(4096));
        assert_eq!(props.apu.as_deref(), Some(&b"Alice"[..]));
        assert_eq!(props.enc.as_deref(), Some("A128GCM"));
        assert!(props.iv.is_none());
        assert!(props.epk.is_none());
    }

    #[test]
    fn test_header_props_rejects_bad_members() {
        let error = header_props(&json_object!({ "p2c": -1 })).unwrap_err();
        assert_matches!(error.error, KeyError::InvalidFormat(_));

        let error = header_props(&json_object!({ "iv": "not base64!" })).unwrap_err();
        assert_matches!(error.error, KeyError::InvalidKey(_));

        let error = header_props(&json_object!({ "epk": { "kty": "EC" } })).unwrap_err();
        assert_matches!(error.error, KeyError::InvalidFormat(_));
    }
}
