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

//! Parsing of JWS and JWE in any serialization.

use bh_jwa::JsonObject;
use bh_jwk::KeyStore;
use bherror::{traits::ForeignError as _, Error};
use serde_json::Value;

use crate::{
    format::{GeneralJwe, GeneralJws},
    header::{decode_protected, HeaderSources},
    DecryptOptions, DecryptResult, Decrypter, JoseError, Result, Serialization, VerifyOptions,
    VerifyResult, Verifier,
};

/// A parsed JWS or JWE, normalized to the general JSON form.
#[derive(Debug, Clone, PartialEq)]
pub enum JoseObject {
    /// A JWS.
    Jws(GeneralJws),
    /// A JWE.
    Jwe(GeneralJwe),
}

/// The result of [`parse`].
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed {
    /// The serialization of the input.
    pub format: Serialization,
    /// The parsed object.
    pub object: JoseObject,
    /// The effective header of the first signature or recipient.
    pub header: JsonObject,
    /// The effective headers of every signature or recipient.
    pub all: Vec<JsonObject>,
}

/// The result of [`Parsed::perform`].
#[derive(Debug, Clone)]
pub enum Performed {
    /// A verified JWS.
    Verified(VerifyResult),
    /// A decrypted JWE.
    Decrypted(DecryptResult),
}

impl Parsed {
    fn new(format: Serialization, object: JoseObject) -> Result<Self> {
        let all = match &object {
            JoseObject::Jws(jws) => jws
                .signatures
                .iter()
                .map(|signature| {
                    let protected =
                        decode_protected(signature.protected.as_deref().unwrap_or_default())?;
                    Ok(HeaderSources {
                        protected: Some(&protected),
                        shared: None,
                        entry: signature.header.as_ref(),
                    }
                    .merge())
                })
                .collect::<Result<Vec<_>>>()?,
            JoseObject::Jwe(jwe) => {
                let protected = decode_protected(jwe.protected.as_deref().unwrap_or_default())?;
                jwe.recipients
                    .iter()
                    .map(|recipient| {
                        HeaderSources {
                            protected: Some(&protected),
                            shared: jwe.unprotected.as_ref(),
                            entry: recipient.header.as_ref(),
                        }
                        .merge()
                    })
                    .collect()
            }
        };

        let header = all.first().cloned().ok_or_else(|| {
            Error::root(JoseError::InvalidFormat(
                "no signatures or recipients".to_owned(),
            ))
        })?;

        Ok(Self {
            format,
            object,
            header,
            all,
        })
    }

    /// Whether the input is a JWS.
    pub fn is_jws(&self) -> bool {
        matches!(self.object, JoseObject::Jws(_))
    }

    /// Whether the input is a JWE.
    pub fn is_jwe(&self) -> bool {
        matches!(self.object, JoseObject::Jwe(_))
    }

    /// Verifies or decrypts with the keys of `store` and the default options.
    pub async fn perform(&self, store: &KeyStore) -> Result<Performed> {
        match &self.object {
            JoseObject::Jws(jws) => Ok(Performed::Verified(
                Verifier::new(store.clone(), VerifyOptions::default())
                    .verify_jws(jws)
                    .await?,
            )),
            JoseObject::Jwe(jwe) => Ok(Performed::Decrypted(
                Decrypter::new(store.clone(), DecryptOptions::default())
                    .decrypt_jwe(jwe)
                    .await?,
            )),
        }
    }
}

/// Parses a JWS or JWE, detecting its serialization.
pub fn parse(input: &str) -> Result<Parsed> {
    let input = input.trim();
    if input.starts_with('{') {
        let json: Value = serde_json::from_str(input)
            .foreign_err(|| JoseError::InvalidFormat("input is not JSON".to_owned()))?;
        parse_json(&json)
    } else {
        parse_compact(input)
    }
}

/// Parses a compact JWS (three parts) or JWE (five parts).
pub fn parse_compact(input: &str) -> Result<Parsed> {
    let object = match input.split('.').count() {
        3 => JoseObject::Jws(GeneralJws::from_compact(input)?),
        5 => JoseObject::Jwe(GeneralJwe::from_compact(input)?),
        parts => {
            return Err(Error::root(JoseError::InvalidFormat(format!(
                "compact serialization with {parts} parts"
            ))))
        }
    };
    Parsed::new(Serialization::Compact, object)
}

/// Parses a flattened or general JSON JWS or JWE.
pub fn parse_json(json: &Value) -> Result<Parsed> {
    let general = json.get("signatures").is_some() || json.get("recipients").is_some();
    let format = if general {
        Serialization::General
    } else {
        Serialization::Flattened
    };

    let object = if json.get("signatures").is_some() || json.get("signature").is_some() {
        JoseObject::Jws(GeneralJws::from_json(json)?)
    } else if json.get("ciphertext").is_some() {
        JoseObject::Jwe(GeneralJwe::from_json(json)?)
    } else {
        return Err(Error::root(JoseError::InvalidFormat(
            "neither a JWS nor a JWE".to_owned(),
        )));
    };
    Parsed::new(format, object)
}
