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

//! The compact and JSON serializations of JWS and JWE.

use bh_jwa::JsonObject;
use bherror::{traits::ForeignError as _, Error};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{JoseError, Result};

/// A JOSE serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Serialization {
    /// The dot separated compact serialization, with a single signature or
    /// recipient and only a protected header.
    #[default]
    Compact,
    /// The flattened JSON serialization, with a single signature or recipient.
    Flattened,
    /// The general JSON serialization.
    General,
}

/// A serialized JWS or JWE.
#[derive(Debug, Clone, PartialEq)]
pub enum Serialized {
    /// The compact serialization.
    Compact(String),
    /// One of the JSON serializations.
    Json(Value),
}

impl Serialized {
    /// The compact string, if compact.
    pub fn as_compact(&self) -> Option<&str> {
        match self {
            Serialized::Compact(compact) => Some(compact),
            Serialized::Json(_) => None,
        }
    }

    /// The JSON value, if JSON.
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Serialized::Compact(_) => None,
            Serialized::Json(json) => Some(json),
        }
    }
}

impl std::fmt::Display for Serialized {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Serialized::Compact(compact) => f.write_str(compact),
            Serialized::Json(json) => write!(f, "{json}"),
        }
    }
}

/// One signature of a JWS.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JwsSignature {
    /// The encoded protected header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protected: Option<String>,
    /// The unprotected header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<JsonObject>,
    /// The encoded signature.
    pub signature: String,
}

/// A JWS in the general JSON form, to which every serialization normalizes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralJws {
    /// The payload, encoded unless `b64` is `false`.
    pub payload: String,
    /// The signatures.
    pub signatures: Vec<JwsSignature>,
}

#[derive(Serialize, Deserialize)]
struct FlattenedJws {
    payload: String,
    #[serde(flatten)]
    signature: JwsSignature,
}

impl GeneralJws {
    /// Parses a compact JWS.
    pub fn from_compact(compact: &str) -> Result<Self> {
        let parts: Vec<&str> = compact.split('.').collect();
        let [protected, payload, signature] = parts[..] else {
            return Err(Error::root(JoseError::InvalidFormat(
                "compact JWS needs three parts".to_owned(),
            )));
        };
        Ok(Self {
            payload: payload.to_owned(),
            signatures: vec![JwsSignature {
                protected: Some(protected.to_owned()),
                header: None,
                signature: signature.to_owned(),
            }],
        })
    }

    /// Parses a flattened or general JSON JWS.
    pub fn from_json(json: &Value) -> Result<Self> {
        let invalid = || JoseError::InvalidFormat("malformed JSON JWS".to_owned());
        if json.get("signatures").is_some() {
            return serde_json::from_value(json.clone()).foreign_err(invalid);
        }
        let flattened: FlattenedJws = serde_json::from_value(json.clone()).foreign_err(invalid)?;
        Ok(Self {
            payload: flattened.payload,
            signatures: vec![flattened.signature],
        })
    }

    /// Serializes in `format`.
    pub fn serialize(self, format: Serialization) -> Result<Serialized> {
        match format {
            Serialization::General => Ok(Serialized::Json(to_json(&self)?)),
            _ => {
                let Ok([signature]) = <[JwsSignature; 1]>::try_from(self.signatures) else {
                    return Err(Error::root(JoseError::TooManyEntries));
                };
                if format == Serialization::Flattened {
                    return Ok(Serialized::Json(to_json(&FlattenedJws {
                        payload: self.payload,
                        signature,
                    })?));
                }
                if signature.header.is_some() {
                    return Err(Error::root(JoseError::InvalidHeader(
                        "compact JWS cannot carry an unprotected header".to_owned(),
                    )));
                }
                Ok(Serialized::Compact(format!(
                    "{}.{}.{}",
                    signature.protected.unwrap_or_default(),
                    self.payload,
                    signature.signature
                )))
            }
        }
    }
}

/// One recipient of a JWE.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JweRecipient {
    /// The per-recipient unprotected header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<JsonObject>,
    /// The encoded encrypted key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_key: Option<String>,
}

/// A JWE in the general JSON form, to which every serialization normalizes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralJwe {
    /// The encoded protected header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protected: Option<String>,
    /// The unprotected header shared by all recipients.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unprotected: Option<JsonObject>,
    /// The recipients.
    pub recipients: Vec<JweRecipient>,
    /// The encoded initialization vector.
    #[serde(default)]
    pub iv: String,
    /// The encoded ciphertext.
    pub ciphertext: String,
    /// The encoded authentication tag.
    #[serde(default)]
    pub tag: String,
    /// The encoded additional authenticated data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aad: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct FlattenedJwe {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    protected: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    unprotected: Option<JsonObject>,
    #[serde(flatten)]
    recipient: JweRecipient,
    #[serde(default)]
    iv: String,
    ciphertext: String,
    #[serde(default)]
    tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    aad: Option<String>,
}

impl GeneralJwe {
    /// Parses a compact JWE.
    pub fn from_compact(compact: &str) -> Result<Self> {
        let parts: Vec<&str> = compact.split('.').collect();
        let [protected, encrypted_key, iv, ciphertext, tag] = parts[..] else {
            return Err(Error::root(JoseError::InvalidFormat(
                "compact JWE needs five parts".to_owned(),
            )));
        };
        Ok(Self {
            protected: Some(protected.to_owned()),
            unprotected: None,
            recipients: vec![JweRecipient {
                header: None,
                encrypted_key: Some(encrypted_key.to_owned()),
            }],
            iv: iv.to_owned(),
            ciphertext: ciphertext.to_owned(),
            tag: tag.to_owned(),
            aad: None,
        })
    }

    /// Parses a flattened or general JSON JWE.
    pub fn from_json(json: &Value) -> Result<Self> {
        let invalid = || JoseError::InvalidFormat("malformed JSON JWE".to_owned());
        if json.get("recipients").is_some() {
            return serde_json::from_value(json.clone()).foreign_err(invalid);
        }
        let flattened: FlattenedJwe = serde_json::from_value(json.clone()).foreign_err(invalid)?;
        Ok(Self {
            protected: flattened.protected,
            unprotected: flattened.unprotected,
            recipients: vec![flattened.recipient],
            iv: flattened.iv,
            ciphertext: flattened.ciphertext,
            tag: flattened.tag,
            aad: flattened.aad,
        })
    }

    /// Serializes in `format`.
    pub fn serialize(self, format: Serialization) -> Result<Serialized> {
        if format == Serialization::General {
            return Ok(Serialized::Json(to_json(&self)?));
        }

        let Ok([recipient]) = <[JweRecipient; 1]>::try_from(self.recipients) else {
            return Err(Error::root(JoseError::TooManyEntries));
        };
        if format == Serialization::Flattened {
            return Ok(Serialized::Json(to_json(&FlattenedJwe {
                protected: self.protected,
                unprotected: self.unprotected,
                recipient,
                iv: self.iv,
                ciphertext: self.ciphertext,
                tag: self.tag,
                aad: self.aad,
            })?));
        }

        if self.unprotected.is_some() || recipient.header.is_some() {
            return Err(Error::root(JoseError::InvalidHeader(
                "compact JWE cannot carry an unprotected header".to_owned(),
            )));
        }
        if self.aad.is_some() {
            return Err(Error::root(JoseError::InvalidFormat(
                "compact JWE cannot carry additional authenticated data".to_owned(),
            )));
        }
        Ok(Serialized::Compact(format!(
            "{}.{}.{}.{}.{}",
            self.protected.unwrap_or_default(),
            recipient.encrypted_key.unwrap_or_default(),
            self.iv,
            self.ciphertext,
            self.tag
        )))
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value)
        .foreign_err(|| JoseError::InvalidFormat("cannot serialize to JSON".to_owned()))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_jws_compact() {
        let jws = GeneralJws::from_compact("aGVhZGVy.cGF5bG9hZA.c2ln").unwrap();
        assert_eq!(jws.payload, "cGF5bG9hZA");
        assert_eq!(jws.signatures[0].protected.as_deref(), Some("aGVhZGVy"));

        let serialized = jws.serialize(Serialization::Compact).unwrap();
        assert_eq!(serialized.as_compact(), Some("aGVhZGVy.cGF5bG9hZA.c2ln"));

        for input in ["a.b", "a.b.c.d", ""] {
            let error = GeneralJws::from_compact(input).unwrap_err();
            assert_matches!(error.error, JoseError::InvalidFormat(_));
        }
    }

    #[test]
    fn test_jws_flattened_and_general() {
        let flattened = json!({
            "payload": "cA",
            "protected": "eyJhbGciOiJIUzI1NiJ9",
            "header": {"kid": "k"},
            "signature": "cw"
        });
        let jws = GeneralJws::from_json(&flattened).unwrap();
        assert_eq!(jws.signatures.len(), 1);
        assert_eq!(
            jws.clone().serialize(Serialization::Flattened).unwrap(),
            Serialized::Json(flattened)
        );

        let general = jws.serialize(Serialization::General).unwrap();
        assert_eq!(
            general.as_json().unwrap()["signatures"][0]["header"]["kid"],
            "k"
        );

        // the unprotected header has no compact form
        let jws = GeneralJws::from_json(general.as_json().unwrap()).unwrap();
        let error = jws.serialize(Serialization::Compact).unwrap_err();
        assert_matches!(error.error, JoseError::InvalidHeader(_));
    }

    #[test]
    fn test_single_entry_forms() {
        let jws = GeneralJws {
            payload: "cA".to_owned(),
            signatures: vec![
                JwsSignature {
                    protected: None,
                    header: None,
                    signature: "cw".to_owned(),
                };
                2
            ],
        };
        for format in [Serialization::Compact, Serialization::Flattened] {
            let error = jws.clone().serialize(format).unwrap_err();
            assert_eq!(error.error, JoseError::TooManyEntries);
        }
    }

    #[test]
    fn test_jwe_forms() {
        let compact = "eyJhbGciOiJkaXIifQ..aXY.Y3Q.dGFn";
        let jwe = GeneralJwe::from_compact(compact).unwrap();
        assert_eq!(jwe.recipients[0].encrypted_key.as_deref(), Some(""));
        assert_eq!(
            jwe.clone().serialize(Serialization::Compact).unwrap().to_string(),
            compact
        );

        let flattened = jwe.clone().serialize(Serialization::Flattened).unwrap();
        assert_eq!(
            flattened,
            Serialized::Json(json!({
                "protected": "eyJhbGciOiJkaXIifQ",
                "encrypted_key": "",
                "iv": "aXY",
                "ciphertext": "Y3Q",
                "tag": "dGFn"
            }))
        );
        assert_eq!(GeneralJwe::from_json(flattened.as_json().unwrap()).unwrap(), jwe);

        let general = jwe.clone().serialize(Serialization::General).unwrap();
        assert_eq!(GeneralJwe::from_json(general.as_json().unwrap()).unwrap(), jwe);

        let error = GeneralJwe::from_compact("a.b.c").unwrap_err();
        assert_matches!(error.error, JoseError::InvalidFormat(_));
        let error = GeneralJwe::from_json(&json!({"recipients": 1})).unwrap_err();
        assert_matches!(error.error, JoseError::InvalidFormat(_));
    }

    #[test]
    fn test_compact_jwe_rejects_aad() {
        let mut jwe = GeneralJwe::from_compact("e30..aXY.Y3Q.dGFn").unwrap();
        jwe.aad = Some("YWFk".to_owned());
        let error = jwe.serialize(Serialization::Compact).unwrap_err();
        assert_matches!(error.error, JoseError::InvalidFormat(_));
    }
}
