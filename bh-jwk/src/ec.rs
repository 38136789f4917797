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

//! `kty: "EC"` keys on the NIST curves.

use bh_jwa::{Curve, EcComponents, JsonObject, KeyMaterial};
use bherror::{
    traits::{ErrorContext as _, PropagateError as _},
    Error,
};
use serde_json::Value;

use crate::{
    config::{binary, put_binary, string},
    KeyError, KeyPair, KeyTypeConfig, Mode, Result,
};

const WRAP_ALGORITHMS: [&str; 4] = ["ECDH-ES", "ECDH-ES+A128KW", "ECDH-ES+A192KW", "ECDH-ES+A256KW"];

/// EC keys: one `ES*` signature algorithm per curve and `ECDH-ES*` key
/// agreement.
#[derive(Debug, Default, Clone, Copy)]
pub struct EcConfig;

/// Parses `crv`, `x` and `y`, validating the point.  Returns `None` if any of
/// them is missing.
pub(crate) fn parse_ec_public(fields: &JsonObject) -> Result<Option<EcComponents>> {
    let (crv, x, y) = match (
        string(fields, "crv")?,
        binary(fields, "x")?,
        binary(fields, "y")?,
    ) {
        (Some(crv), Some(x), Some(y)) => (crv, x, y),
        _ => return Ok(None),
    };

    let curve = Curve::from_name(crv)
        .ok_or_else(|| Error::root(KeyError::InvalidKey(format!("unsupported curve {crv}"))))?;
    let public = EcComponents {
        curve,
        x,
        y,
        d: None,
    };
    KeyMaterial::Ec(public.clone())
        .to_public_pkey()
        .with_err(|| KeyError::InvalidKey(format!("invalid {crv} point")))?;

    Ok(Some(public))
}

fn ec(material: Option<&KeyMaterial>) -> Option<&EcComponents> {
    match material {
        Some(KeyMaterial::Ec(ec)) => Some(ec),
        _ => None,
    }
}

impl KeyTypeConfig for EcConfig {
    fn kty(&self) -> &'static str {
        "EC"
    }

    fn members(&self) -> &'static [&'static str] {
        &["crv", "x", "y", "d"]
    }

    fn thumbprint_members(&self) -> &'static [&'static str] {
        &["crv", "kty", "x", "y"]
    }

    fn public_key(&self, fields: &JsonObject) -> Result<Option<KeyMaterial>> {
        Ok(parse_ec_public(fields)?.map(KeyMaterial::Ec))
    }

    fn private_key(&self, fields: &JsonObject) -> Result<Option<KeyMaterial>> {
        let (Some(public), Some(d)) = (parse_ec_public(fields)?, binary(fields, "d")?) else {
            return Ok(None);
        };

        let private = KeyMaterial::Ec(EcComponents {
            d: Some(d),
            ..public
        });
        private
            .to_private_pkey()
            .with_err(|| KeyError::InvalidKey("`d` does not match the public point".to_owned()))?;
        Ok(Some(private))
    }

    fn algorithms(&self, keys: &KeyPair, mode: Mode) -> Vec<&'static str> {
        let material = match mode {
            Mode::Sign | Mode::Unwrap => ec(keys.private.as_ref()),
            Mode::Verify | Mode::Wrap => ec(keys.public.as_ref()),
            Mode::Encrypt | Mode::Decrypt => None,
        };
        let Some(material) = material else {
            return Vec::new();
        };

        match mode {
            Mode::Sign | Mode::Verify => vec![material.curve.signature_algorithm()],
            Mode::Wrap | Mode::Unwrap => WRAP_ALGORITHMS.to_vec(),
            Mode::Encrypt | Mode::Decrypt => Vec::new(),
        }
    }

    fn public_fields(&self, keys: &KeyPair) -> JsonObject {
        let mut fields = JsonObject::new();
        if let Some(ec) = ec(keys.public.as_ref()).or(ec(keys.private.as_ref())) {
            fields.insert("crv".to_owned(), Value::from(ec.curve.name()));
            put_binary(&mut fields, "x", &ec.x);
            put_binary(&mut fields, "y", &ec.y);
        }
        fields
    }

    fn private_fields(&self, keys: &KeyPair) -> JsonObject {
        let mut fields = JsonObject::new();
        if let Some(d) = ec(keys.private.as_ref()).and_then(|ec| ec.d.as_ref()) {
            put_binary(&mut fields, "d", d);
        }
        fields
    }

    fn generate(&self, size: usize) -> Result<JsonObject> {
        let curve = Curve::from_bits(size)
            .ok_or_else(|| Error::root(KeyError::KeyGenerationFailed))
            .ctx(|| format!("no curve of {size} bits"))?;
        let private = EcComponents::generate(curve).with_err(|| KeyError::KeyGenerationFailed)?;
        let keys = KeyPair {
            public: Some(KeyMaterial::Ec(private.to_public())),
            private: Some(KeyMaterial::Ec(private)),
        };

        let mut fields = JsonObject::new();
        fields.insert("kty".to_owned(), Value::from(self.kty()));
        fields.extend(self.public_fields(&keys));
        fields.extend(self.private_fields(&keys));
        Ok(fields)
    }
}
