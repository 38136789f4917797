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

//! `kty: "RSA"` keys.

use bh_jwa::{JsonObject, KeyMaterial, RsaComponents, RsaPrimes, RsaPrivateComponents};
use bherror::{
    traits::{ErrorContext as _, PropagateError as _},
    Error,
};
use serde_json::Value;

use crate::{
    config::{binary, put_binary},
    KeyError, KeyPair, KeyTypeConfig, Mode, Result,
};

const SIGN_ALGORITHMS: [&str; 6] = ["PS256", "PS384", "PS512", "RS256", "RS384", "RS512"];
const WRAP_ALGORITHMS: [&str; 3] = ["RSA-OAEP", "RSA-OAEP-256", "RSA1_5"];

/// Smallest modulus [`RsaConfig::generate`] accepts.
pub const MIN_RSA_BITS: usize = 2048;

/// RSA keys: `PS*`/`RS*` signatures and `RSA-OAEP*`/`RSA1_5` key wrapping.
#[derive(Debug, Default, Clone, Copy)]
pub struct RsaConfig;

fn rsa(material: Option<&KeyMaterial>) -> Option<&RsaComponents> {
    match material {
        Some(KeyMaterial::Rsa(rsa)) => Some(rsa),
        _ => None,
    }
}

impl KeyTypeConfig for RsaConfig {
    fn kty(&self) -> &'static str {
        "RSA"
    }

    fn members(&self) -> &'static [&'static str] {
        &["n", "e", "d", "p", "q", "dp", "dq", "qi", "oth"]
    }

    fn thumbprint_members(&self) -> &'static [&'static str] {
        &["e", "kty", "n"]
    }

    fn public_key(&self, fields: &JsonObject) -> Result<Option<KeyMaterial>> {
        match (binary(fields, "n")?, binary(fields, "e")?) {
            (Some(n), Some(e)) => Ok(Some(KeyMaterial::Rsa(RsaComponents {
                n,
                e,
                private: None,
            }))),
            _ => Ok(None),
        }
    }

    fn private_key(&self, fields: &JsonObject) -> Result<Option<KeyMaterial>> {
        let (n, e, d) = match (
            binary(fields, "n")?,
            binary(fields, "e")?,
            binary(fields, "d")?,
        ) {
            (Some(n), Some(e), Some(d)) => (n, e, d),
            _ => return Ok(None),
        };

        let primes = match (
            binary(fields, "p")?,
            binary(fields, "q")?,
            binary(fields, "dp")?,
            binary(fields, "dq")?,
            binary(fields, "qi")?,
        ) {
            (Some(p), Some(q), Some(dp), Some(dq), Some(qi)) => Some(RsaPrimes {
                p,
                q,
                dp,
                dq,
                qi,
            }),
            _ => None,
        };

        let has_primes = primes.is_some();
        let material = KeyMaterial::Rsa(RsaComponents {
            n,
            e,
            private: Some(RsaPrivateComponents { d, primes }),
        });
        let pkey = material
            .to_private_pkey()
            .with_err(|| KeyError::InvalidKey("malformed RSA private key".to_owned()))?;

        // OpenSSL can only check keys that carry their primes
        if has_primes && !pkey.rsa().and_then(|rsa| rsa.check_key()).unwrap_or(false) {
            return Err(Error::root(KeyError::InvalidKey(
                "inconsistent RSA private key".to_owned(),
            )));
        }
        Ok(Some(material))
    }

    fn algorithms(&self, keys: &KeyPair, mode: Mode) -> Vec<&'static str> {
        let material = match mode {
            Mode::Sign | Mode::Unwrap => keys.private.as_ref(),
            Mode::Verify | Mode::Wrap => keys.public.as_ref(),
            Mode::Encrypt | Mode::Decrypt => None,
        };
        if material.is_none() {
            return Vec::new();
        }

        match mode {
            Mode::Sign | Mode::Verify => SIGN_ALGORITHMS.to_vec(),
            Mode::Wrap | Mode::Unwrap => WRAP_ALGORITHMS.to_vec(),
            Mode::Encrypt | Mode::Decrypt => Vec::new(),
        }
    }

    fn public_fields(&self, keys: &KeyPair) -> JsonObject {
        let mut fields = JsonObject::new();
        if let Some(rsa) = rsa(keys.public.as_ref()).or(rsa(keys.private.as_ref())) {
            put_binary(&mut fields, "n", &rsa.n);
            put_binary(&mut fields, "e", &rsa.e);
        }
        fields
    }

    fn private_fields(&self, keys: &KeyPair) -> JsonObject {
        let mut fields = JsonObject::new();
        let Some(private) = rsa(keys.private.as_ref()).and_then(|rsa| rsa.private.as_ref()) else {
            return fields;
        };

        put_binary(&mut fields, "d", &private.d);
        if let Some(primes) = &private.primes {
            put_binary(&mut fields, "p", &primes.p);
            put_binary(&mut fields, "q", &primes.q);
            put_binary(&mut fields, "dp", &primes.dp);
            put_binary(&mut fields, "dq", &primes.dq);
            put_binary(&mut fields, "qi", &primes.qi);
        }
        fields
    }

    fn generate(&self, size: usize) -> Result<JsonObject> {
        if size < MIN_RSA_BITS {
            return Err(Error::root(KeyError::KeyGenerationFailed))
                .ctx(|| format!("RSA keys must have at least {MIN_RSA_BITS} bits"));
        }
        let bits = u32::try_from(size)
            .map_err(|_| Error::root(KeyError::KeyGenerationFailed))
            .ctx(|| format!("{size} bits is out of range"))?;

        let private = RsaComponents::generate(bits).with_err(|| KeyError::KeyGenerationFailed)?;
        let keys = KeyPair {
            public: Some(KeyMaterial::Rsa(private.to_public())),
            private: Some(KeyMaterial::Rsa(private)),
        };

        let mut fields = JsonObject::new();
        fields.insert("kty".to_owned(), Value::from(self.kty()));
        fields.extend(self.public_fields(&keys));
        fields.extend(self.private_fields(&keys));
        Ok(fields)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use bh_jwa::json_object;

    /// RFC 7515 appendix A.2.
    pub(crate) fn rfc7515_rsa() -> JsonObject {
        json_object!({
            "kty": "RSA",
            "n": "ofgWCuLjybRlzo0tZWJjNiuSfb4p4fAkd_wWJcyQoTbji9k0l8W26mPddxHmfHQp-Vaw-4qPCJrcS2mJPMEzP1Pt0Bm4d4QlL-yRT-SFd2lZS-pCgNMsD1W_YpRPEwOWvG6b32690r2jZ47soMZo9wGzjb_7OMg0LOL-bSf63kpaSHSXndS5z5rexMdbBYUsLA9e-KXBdQOS-UTo7WTBEMa2R2CapHg665xsmtdVMTBQY4uDZlxvb3qCo5ZwKh9kG4LT6_I5IhlJH7aGhyxXFvUK-DWNmoudF8NAco9_h9iaGNj8q2ethFkMLs91kzk2PAcDTW9gb54h4FRWyuXpoQ",
            "e": "AQAB",
            "d": "Eq5xpGnNCivDflJsRQBXHx1hdR1k6Ulwe2JZD50LpXyWPEAeP88vLNO97IjlA7_GQ5sLKMgvfTeXZx9SE-7YwVol2NXOoAJe46sui395IW_GO-pWJ1O0BkTGoVEn2bKVRUCgu-GjBVaYLU6f3l9kJfFNS3E0QbVdxzubSu3Mkqzjkn439X0M_V51gfpRLI9JYanrC4D4qAdGcopV_0ZHHzQlBjudU2QvXt4ehNYTCBr6XCLQUShb1juUO1ZdiYoFaFQT5Tw8bGUl_x_jTj3ccPDVZFD9pIuhLhBOneufuBiB4cS98l2SR_RQyGWSeWjnczT0QU91p1DhOVRuOopznQ",
            "p": "4BzEEOtIpmVdVEZNCqS7baC4crd0pqnRH_5IB3jw3bcxGn6QLvnEtfdUdiYrqBdss1l58BQ3KhooKeQTa9AB0Hw_Py5PJdTJNPY8cQn7ouZ2KKDcmnPGBY5t7yLc1QlQ5xHdwW1VhvKn-nXqhJTBgIPgtldC-KDV5z-y2XDwGUc",
            "q": "uQPEfgmVtjL0Uyyx88GZFF1fOunH3-7cepKmtH4pxhtCoHqpWmT8YAmZxaewHgHAjLYsp1ZSe7zFYHj7C6ul7TjeLQeZD_YwD66t62wDmpe_HlB-TnBA-njbglfIsRLtXlnDzQkv5dTltRJ11BKBBypeeF6689rjcJIDEz9RWdc",
            "dp": "BwKfV3Akq5_MFZDFZCnW-wzl-CCo83WoZvnLQwCTeDv8uzluRSnm71I3QCLdhrqE2e9YkxvuxdBfpT_PI7Yz-FOKnu1R6HsJeDCjn12Sk3vmAktV2zb34MCdy7cpdTh_YVr7tss2u6vneTwrA86rZtu5Mbr1C1XsmvkxHQAdYo0",
            "dq": "h_96-mK1R_7glhsum81dZxjTnYynPbZpHziZjeeHcXYsXaaMwkOlODsWa7I9xXDoRwbKgB719rrmI2oKr6N3Do9U0ajaHF-NKJnwgjMd2w9cjz3_-kyNlxAr2v4IKhGNpmM5iIgOS1VZnOZ68m6_pbLBSp3nssTdlqvd0tIiTHU",
            "qi": "IYd7DHOhrWvxkwPQsRM2tOgrjbcrfvtQJipd-DlcxyVuuM9sQLdgjVk2oy26F0EmpScGLq2MowX7fhd_QJQ3ydy5cY7YIBi87w93IKLEdfnbJtoOPLUW0ITrJReOgo1cq9SbsxYawBgfp_gh6A5603k2-ZQwVK0JKSHuLFkuQ3U",
        })
    }

    #[test]
    fn test_parse_private_key() {
        let fields = rfc7515_rsa();
        let public = RsaConfig.public_key(&fields).unwrap().unwrap();
        let private = RsaConfig.private_key(&fields).unwrap().unwrap();

        assert_eq!(public.bits(), 2048);
        assert!(!public.is_private());
        assert!(private.is_private());

        let keys = KeyPair {
            public: Some(public),
            private: Some(private),
        };
        let mut exported = json_object!({ "kty": "RSA" });
        exported.extend(RsaConfig.public_fields(&keys));
        exported.extend(RsaConfig.private_fields(&keys));
        assert_eq!(exported, fields);
    }

    #[test]
    fn test_algorithms_depend_on_material() {
        let mut fields = rfc7515_rsa();
        let keys = KeyPair {
            public: RsaConfig.public_key(&fields).unwrap(),
            private: RsaConfig.private_key(&fields).unwrap(),
        };
        assert_eq!(RsaConfig.algorithms(&keys, Mode::Sign), SIGN_ALGORITHMS);
        assert_eq!(RsaConfig.algorithms(&keys, Mode::Unwrap), WRAP_ALGORITHMS);
        assert!(RsaConfig.algorithms(&keys, Mode::Encrypt).is_empty());

        fields.remove("d");
        let keys = KeyPair {
            public: RsaConfig.public_key(&fields).unwrap(),
            private: RsaConfig.private_key(&fields).unwrap(),
        };
        assert!(keys.private.is_none());
        assert!(RsaConfig.algorithms(&keys, Mode::Sign).is_empty());
        assert_eq!(RsaConfig.algorithms(&keys, Mode::Verify), SIGN_ALGORITHMS);
        assert_eq!(RsaConfig.algorithms(&keys, Mode::Wrap), WRAP_ALGORITHMS);
    }

    #[test]
    fn test_inconsistent_private_key_is_rejected() {
        let mut fields = rfc7515_rsa();
        fields.insert("q".to_owned(), fields["p"].clone());

        let error = RsaConfig.private_key(&fields).unwrap_err();
        assert_matches!(error.error, KeyError::InvalidKey(_));
    }

    #[test]
    fn test_generate() {
        let fields = RsaConfig.generate(2048).unwrap();
        let private = RsaConfig.private_key(&fields).unwrap().unwrap();
        assert_eq!(private.bits(), 2048);

        let error = RsaConfig.generate(1024).unwrap_err();
        assert_eq!(error.error, KeyError::KeyGenerationFailed);
    }
}
