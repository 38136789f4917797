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

//! `kty: "oct"` symmetric keys.

use bh_jwa::{random_bytes, JsonObject, KeyMaterial};
use bherror::{traits::ErrorContext as _, Error};
use serde_json::Value;

use crate::{
    config::{binary, put_binary},
    KeyError, KeyPair, KeyTypeConfig, Mode, Result,
};

/// Symmetric keys: HMAC, content encryption, AES key wrapping, PBES2 and
/// direct encryption.
///
/// A symmetric key has no public form; all its material is private.
#[derive(Debug, Default, Clone, Copy)]
pub struct OctConfig;

fn sign_algorithms(bits: usize) -> Vec<&'static str> {
    [("HS256", 256), ("HS384", 384), ("HS512", 512)]
        .into_iter()
        .filter(|(_, min)| bits >= *min)
        .map(|(alg, _)| alg)
        .collect()
}

fn content_algorithms(bits: usize) -> Vec<&'static str> {
    let gcm = match bits {
        128 => Some("A128GCM"),
        192 => Some("A192GCM"),
        256 => Some("A256GCM"),
        _ => None,
    };
    let cbc = match bits {
        256 => Some("A128CBC-HS256"),
        384 => Some("A192CBC-HS384"),
        512 => Some("A256CBC-HS512"),
        _ => None,
    };
    gcm.into_iter().chain(cbc).collect()
}

fn wrap_algorithms(bits: usize) -> Vec<&'static str> {
    let mut algorithms = match bits {
        128 => vec!["A128KW", "A128GCMKW"],
        192 => vec!["A192KW", "A192GCMKW"],
        256 => vec!["A256KW", "A256GCMKW"],
        _ => Vec::new(),
    };
    algorithms.extend([
        "PBES2-HS256+A128KW",
        "PBES2-HS384+A192KW",
        "PBES2-HS512+A256KW",
        "dir",
    ]);
    algorithms
}

impl KeyTypeConfig for OctConfig {
    fn kty(&self) -> &'static str {
        "oct"
    }

    fn members(&self) -> &'static [&'static str] {
        &["k"]
    }

    fn thumbprint_members(&self) -> &'static [&'static str] {
        &["k", "kty"]
    }

    fn public_key(&self, _fields: &JsonObject) -> Result<Option<KeyMaterial>> {
        Ok(None)
    }

    fn private_key(&self, fields: &JsonObject) -> Result<Option<KeyMaterial>> {
        match binary(fields, "k")? {
            Some(k) if k.is_empty() => Err(Error::root(KeyError::InvalidKey(
                "`k` is empty".to_owned(),
            ))),
            k => Ok(k.map(KeyMaterial::Oct)),
        }
    }

    fn algorithms(&self, keys: &KeyPair, mode: Mode) -> Vec<&'static str> {
        let Some(KeyMaterial::Oct(k)) = &keys.private else {
            return Vec::new();
        };
        let bits = k.len() * 8;

        match mode {
            Mode::Sign | Mode::Verify => sign_algorithms(bits),
            Mode::Encrypt | Mode::Decrypt => content_algorithms(bits),
            Mode::Wrap | Mode::Unwrap => wrap_algorithms(bits),
        }
    }

    fn public_fields(&self, _keys: &KeyPair) -> JsonObject {
        JsonObject::new()
    }

    fn private_fields(&self, keys: &KeyPair) -> JsonObject {
        let mut fields = JsonObject::new();
        if let Some(KeyMaterial::Oct(k)) = &keys.private {
            put_binary(&mut fields, "k", k);
        }
        fields
    }

    fn generate(&self, size: usize) -> Result<JsonObject> {
        if size == 0 || size % 8 != 0 {
            return Err(Error::root(KeyError::KeyGenerationFailed))
                .ctx(|| format!("cannot generate a {size}-bit octet key"));
        }

        let mut fields = JsonObject::new();
        fields.insert("kty".to_owned(), Value::from(self.kty()));
        put_binary(&mut fields, "k", &random_bytes(size / 8));
        Ok(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use bh_jwa::json_object;

    fn keys(bits: usize) -> KeyPair {
        let fields = OctConfig.generate(bits).unwrap();
        KeyPair {
            public: OctConfig.public_key(&fields).unwrap(),
            private: OctConfig.private_key(&fields).unwrap(),
        }
    }

    #[test]
    fn test_algorithms_by_length() {
        let keys128 = keys(128);
        assert!(OctConfig.algorithms(&keys128, Mode::Sign).is_empty());
        assert_eq!(OctConfig.algorithms(&keys128, Mode::Encrypt), ["A128GCM"]);
        assert_eq!(
            OctConfig.algorithms(&keys128, Mode::Wrap)[..2],
            ["A128KW", "A128GCMKW"]
        );

        let keys256 = keys(256);
        assert_eq!(OctConfig.algorithms(&keys256, Mode::Sign), ["HS256"]);
        assert_eq!(
            OctConfig.algorithms(&keys256, Mode::Decrypt),
            ["A256GCM", "A128CBC-HS256"]
        );

        let keys512 = keys(512);
        assert_eq!(
            OctConfig.algorithms(&keys512, Mode::Verify),
            ["HS256", "HS384", "HS512"]
        );
        assert_eq!(OctConfig.algorithms(&keys512, Mode::Encrypt), ["A256CBC-HS512"]);
        assert_eq!(
            OctConfig.algorithms(&keys512, Mode::Unwrap),
            ["PBES2-HS256+A128KW", "PBES2-HS384+A192KW", "PBES2-HS512+A256KW", "dir"]
        );
    }

    #[test]
    fn test_no_public_form() {
        let keys = keys(256);
        assert!(keys.public.is_none());
        assert!(OctConfig.public_fields(&keys).is_empty());
        assert_eq!(OctConfig.private_fields(&keys)["k"].as_str().unwrap().len(), 43);
    }

    #[test]
    fn test_invalid_keys() {
        let error = OctConfig
            .private_key(&json_object!({ "kty": "oct", "k": "" }))
            .unwrap_err();
        assert_matches!(error.error, KeyError::InvalidKey(_));

        assert!(OctConfig
            .private_key(&json_object!({ "kty": "oct" }))
            .unwrap()
            .is_none());
        assert!(OctConfig.generate(12).is_err());
    }
}
