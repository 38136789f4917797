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

//! Importing keys from JWK, PEM and DER encodings.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bh_jwa::{JsonObject, KeyMaterial};
use bherror::{
    traits::{ErrorContext as _, ForeignError as _, PropagateError as _},
    Error,
};
use openssl::{
    pkey::{PKey, Private, Public},
    rsa::Rsa,
    x509::X509,
};
use serde_json::Value;

use crate::{Key, KeyError, KeyPair, KeyRegistry, Result};

/// The encoding of key material handed to [`import_key`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum KeyFormat {
    /// A JWK object.
    #[strum(to_string = "json")]
    Json,
    /// A DER private key: PKCS#1, SEC 1 or PKCS#8.
    #[strum(to_string = "private")]
    Private,
    /// A DER PKCS#8 private key.
    #[strum(to_string = "pkcs8")]
    Pkcs8,
    /// A DER public key: SPKI or PKCS#1.
    #[strum(to_string = "public")]
    Public,
    /// A DER SubjectPublicKeyInfo.
    #[strum(to_string = "spki")]
    Spki,
    /// Same as [`Spki`](Self::Spki).
    #[strum(to_string = "pkix")]
    Pkix,
    /// A DER X.509 certificate.
    #[strum(to_string = "x509")]
    X509,
    /// Any of the above in PEM armour.
    #[strum(to_string = "pem")]
    Pem,
}

impl KeyFormat {
    /// Parses a format name as accepted on the command line.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "json" => Self::Json,
            "private" => Self::Private,
            "pkcs8" => Self::Pkcs8,
            "public" => Self::Public,
            "spki" => Self::Spki,
            "pkix" => Self::Pkix,
            "x509" => Self::X509,
            "pem" => Self::Pem,
            _ => return None,
        })
    }

    /// Guesses the format from the first bytes of `input`.  DER input is
    /// reported as [`Private`](Self::Private) and resolved by trial.
    pub fn detect(input: &[u8]) -> Self {
        let trimmed = input.trim_ascii_start();
        if trimmed.starts_with(b"{") {
            Self::Json
        } else if trimmed.starts_with(b"-----BEGIN ") {
            Self::Pem
        } else {
            Self::Private
        }
    }
}

fn invalid(format: KeyFormat) -> impl FnOnce() -> KeyError {
    move || KeyError::InvalidFormat(format!("not a {format} key"))
}

/// Parsed, not yet converted key material.
enum Imported {
    Private(PKey<Private>),
    Public(PKey<Public>),
    Certificate(X509),
}

fn pem_label(input: &[u8]) -> Result<&str> {
    let text = std::str::from_utf8(input).foreign_err(invalid(KeyFormat::Pem))?;
    let start = text
        .find("-----BEGIN ")
        .ok_or_else(|| Error::root(invalid(KeyFormat::Pem)()))?
        + "-----BEGIN ".len();
    let len = text[start..]
        .find("-----")
        .ok_or_else(|| Error::root(invalid(KeyFormat::Pem)()))?;
    Ok(&text[start..start + len])
}

fn parse_pem(input: &[u8]) -> Result<Imported> {
    let imported = match pem_label(input)? {
        "CERTIFICATE" => X509::from_pem(input).map(Imported::Certificate),
        "PUBLIC KEY" => PKey::public_key_from_pem(input).map(Imported::Public),
        "RSA PUBLIC KEY" => Rsa::public_key_from_pem_pkcs1(input)
            .and_then(PKey::from_rsa)
            .map(Imported::Public),
        "PRIVATE KEY" | "RSA PRIVATE KEY" | "EC PRIVATE KEY" => {
            PKey::private_key_from_pem(input).map(Imported::Private)
        }
        label => {
            return Err(Error::root(KeyError::InvalidFormat(format!(
                "unsupported PEM label {label}"
            ))))
        }
    };

    imported.foreign_err(invalid(KeyFormat::Pem))
}

fn parse_der(input: &[u8], format: KeyFormat) -> Result<Imported> {
    let imported = match format {
        KeyFormat::Private => PKey::private_key_from_der(input).map(Imported::Private),
        KeyFormat::Pkcs8 => PKey::private_key_from_pkcs8(input).map(Imported::Private),
        KeyFormat::Spki | KeyFormat::Pkix => {
            PKey::public_key_from_der(input).map(Imported::Public)
        }
        KeyFormat::Public => PKey::public_key_from_der(input)
            .or_else(|_| Rsa::public_key_from_der_pkcs1(input).and_then(PKey::from_rsa))
            .map(Imported::Public),
        KeyFormat::X509 => X509::from_der(input).map(Imported::Certificate),
        KeyFormat::Json | KeyFormat::Pem => {
            return Err(Error::root(KeyError::InvalidFormat(format!(
                "{format} is not a DER format"
            ))))
        }
    };

    imported.foreign_err(invalid(format))
}

/// Tries every DER format in turn.
fn parse_any_der(input: &[u8]) -> Result<Imported> {
    [KeyFormat::Private, KeyFormat::Spki, KeyFormat::Public, KeyFormat::X509]
        .into_iter()
        .find_map(|format| parse_der(input, format).ok())
        .ok_or_else(|| Error::root(KeyError::InvalidFormat("unrecognized DER input".to_owned())))
}

fn to_material(imported: &Imported) -> Result<KeyMaterial> {
    let material = match imported {
        Imported::Private(pkey) => KeyMaterial::from_private_pkey(pkey),
        Imported::Public(pkey) => KeyMaterial::from_public_pkey(pkey),
        Imported::Certificate(certificate) => {
            let pkey = certificate
                .public_key()
                .foreign_err(|| KeyError::InvalidFormat("certificate key".to_owned()))?;
            KeyMaterial::from_public_pkey(&pkey)
        }
    };

    material.match_err(|error| KeyError::InvalidFormat(error.to_string()))
}

/// Imports a key from `input`, encoded as `format` (detected when `None`).
///
/// A certificate becomes the public key of its subject, with the certificate
/// itself as the single `x5c` entry.
pub fn import_key(registry: &KeyRegistry, input: &[u8], format: Option<KeyFormat>) -> Result<Key> {
    let explicit = format.is_some();
    let format = format.unwrap_or_else(|| KeyFormat::detect(input));

    let imported = match format {
        KeyFormat::Json => {
            let fields: JsonObject =
                serde_json::from_slice(input).foreign_err(invalid(KeyFormat::Json))?;
            return registry.key_from_json(&fields);
        }
        KeyFormat::Pem => parse_pem(input)?,
        format if explicit => parse_der(input, format)?,
        _ => parse_any_der(input)?,
    };

    let material = to_material(&imported)?;
    let config = registry
        .get(material.kty())
        .ok_or_else(|| Error::root(KeyError::UnsupportedKeyType(material.kty().to_owned())))?;

    let keys = if material.is_private() {
        KeyPair {
            public: None,
            private: Some(material),
        }
    } else {
        KeyPair {
            public: Some(material),
            private: None,
        }
    };

    let mut fields = JsonObject::new();
    fields.insert("kty".to_owned(), Value::from(config.kty()));
    fields.extend(config.public_fields(&keys));
    fields.extend(config.private_fields(&keys));
    if let Imported::Certificate(certificate) = &imported {
        let der = certificate
            .to_der()
            .foreign_err(|| KeyError::CryptoBackend)?;
        fields.insert("x5c".to_owned(), Value::from(vec![STANDARD.encode(der)]));
    }

    Key::new(config, &fields).ctx(|| format!("importing a {format} key"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ec::tests::bob, key_registry, Mode};
    use assert_matches::assert_matches;
    use openssl::{
        asn1::Asn1Time,
        hash::MessageDigest,
        x509::{X509Builder, X509NameBuilder},
    };

    fn bob_key() -> Key {
        Key::from_json(&bob()).unwrap()
    }

    #[test]
    fn test_format_names() {
        for format in [
            KeyFormat::Json,
            KeyFormat::Private,
            KeyFormat::Pkcs8,
            KeyFormat::Public,
            KeyFormat::Spki,
            KeyFormat::Pkix,
            KeyFormat::X509,
            KeyFormat::Pem,
        ] {
            assert_eq!(KeyFormat::from_name(&format.to_string()), Some(format));
        }
        assert_eq!(KeyFormat::from_name("jwk"), None);

        assert_eq!(KeyFormat::detect(b"  {\"kty\":\"oct\"}"), KeyFormat::Json);
        assert_eq!(KeyFormat::detect(b"-----BEGIN PUBLIC KEY-----"), KeyFormat::Pem);
        assert_eq!(KeyFormat::detect(&[0x30, 0x82]), KeyFormat::Private);
    }

    #[test]
    fn test_pem_round_trip() {
        let key = bob_key();
        let registry = key_registry();

        let private = import_key(&registry, key.to_pem(true).unwrap().as_bytes(), None).unwrap();
        assert_eq!(private.kid(), key.kid());
        assert_eq!(private.keys().private, key.keys().private);
        assert_eq!(private.algorithms(Mode::Sign), ["ES256"]);

        let public = import_key(
            &registry,
            key.to_pem(false).unwrap().as_bytes(),
            Some(KeyFormat::Pem),
        )
        .unwrap();
        assert_eq!(public.kid(), key.kid());
        assert!(!public.has_private());
    }

    #[test]
    fn test_der_formats() {
        let key = bob_key();
        let registry = key_registry();
        let private = key.keys().private.as_ref().unwrap().to_private_pkey().unwrap();

        let pkcs8 = private.private_key_to_pkcs8().unwrap();
        let spki = private.public_key_to_der().unwrap();

        for (input, format) in [
            (&pkcs8, Some(KeyFormat::Pkcs8)),
            (&pkcs8, Some(KeyFormat::Private)),
            (&pkcs8, None),
        ] {
            let imported = import_key(&registry, input, format).unwrap();
            assert!(imported.has_private());
            assert_eq!(imported.kid(), key.kid());
        }

        for (input, format) in [
            (&spki, Some(KeyFormat::Spki)),
            (&spki, Some(KeyFormat::Pkix)),
            (&spki, Some(KeyFormat::Public)),
            (&spki, None),
        ] {
            let imported = import_key(&registry, input, format).unwrap();
            assert!(!imported.has_private());
            assert_eq!(imported.kid(), key.kid());
        }

        let error = import_key(&registry, &spki, Some(KeyFormat::Pkcs8)).unwrap_err();
        assert_matches!(error.error, KeyError::InvalidFormat(_));
        let error = import_key(&registry, b"\x01\x02\x03", None).unwrap_err();
        assert_matches!(error.error, KeyError::InvalidFormat(_));
    }

    #[test]
    fn test_certificate() {
        let key = bob_key();
        let pkey = key.keys().private.as_ref().unwrap().to_private_pkey().unwrap();

        let mut name = X509NameBuilder::new().unwrap();
        name.append_entry_by_text("CN", "bob").unwrap();
        let name = name.build();
        let mut builder = X509Builder::new().unwrap();
        builder.set_version(2).unwrap();
        builder.set_subject_name(&name).unwrap();
        builder.set_issuer_name(&name).unwrap();
        builder.set_pubkey(&pkey).unwrap();
        builder
            .set_not_before(&Asn1Time::days_from_now(0).unwrap())
            .unwrap();
        builder
            .set_not_after(&Asn1Time::days_from_now(1).unwrap())
            .unwrap();
        builder.sign(&pkey, MessageDigest::sha256()).unwrap();
        let certificate = builder.build();

        let der = certificate.to_der().unwrap();
        let imported = import_key(&key_registry(), &der, Some(KeyFormat::X509)).unwrap();
        assert_eq!(imported.kid(), key.kid());
        assert_eq!(imported.x5c().unwrap(), [STANDARD.encode(&der)]);

        let pem = certificate.to_pem().unwrap();
        let imported = import_key(&key_registry(), &pem, None).unwrap();
        assert_eq!(imported.x5c().unwrap().len(), 1);
    }

    #[test]
    fn test_json() {
        let json = serde_json::to_vec(&bob()).unwrap();
        let imported = import_key(&key_registry(), &json, None).unwrap();
        assert_eq!(imported.kid(), bob_key().kid());

        let error = import_key(&key_registry(), b"{]", Some(KeyFormat::Json)).unwrap_err();
        assert_matches!(error.error, KeyError::InvalidFormat(_));
    }
}
