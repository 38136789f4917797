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

//! JSON Web Signature (RFC 7515), including unencoded payloads (RFC 7797).

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bh_jwa::{base64_url_encode, JsonObject};
use bh_jwk::{import_key, Key, KeyFormat, KeySelector, KeyStore, KeyUse, Mode};
use bherror::{
    traits::{ErrorContext as _, ForeignError as _, PropagateError as _},
    Error,
};
use serde_json::Value;

use crate::{
    format::{GeneralJws, JwsSignature},
    header::{
        decode_member, decode_protected, encode_protected, member_names, merge_headers,
        required_alg, string_member, HeaderSources,
    },
    parse::{parse, JoseObject},
    AlgorithmFilter, CritHandlers, JoseError, KeyReference, Protect, Result, Serialization,
    Serialized,
};

/// The `b64` header member, `true` when absent.
fn b64_flag(header: &JsonObject) -> Result<bool> {
    match header.get("b64") {
        None => Ok(true),
        Some(Value::Bool(b64)) => Ok(*b64),
        Some(_) => Err(Error::root(JoseError::InvalidHeader(
            "`b64` is not a boolean".to_owned(),
        ))),
    }
}

/// Lists `b64` in `crit`, which RFC 7797 requires of unencoded payloads.
fn require_b64_crit(header: &mut JsonObject) -> Result<()> {
    let crit = header
        .entry("crit")
        .or_insert_with(|| Value::Array(Vec::new()));
    let Value::Array(names) = crit else {
        return Err(Error::root(JoseError::InvalidCriticalHeader(
            "crit".to_owned(),
        )));
    };
    if !names.iter().any(|name| name == "b64") {
        names.push(Value::from("b64"));
    }
    Ok(())
}

/// A key signing a JWS, with the header members specific to it.
#[derive(Debug, Clone)]
pub struct SignerEntry {
    /// The signing key.
    pub key: Arc<Key>,
    /// Header members of this signature, taking precedence over
    /// [`SignOptions::fields`].
    pub header: JsonObject,
    /// How the header refers to the key.
    pub reference: KeyReference,
}

impl SignerEntry {
    /// A signer with no extra header members, referring to the key by `kid`.
    pub fn new(key: impl Into<Arc<Key>>) -> Self {
        Self {
            key: key.into(),
            header: JsonObject::new(),
            reference: KeyReference::default(),
        }
    }

    /// Sets the header members of this signature.
    pub fn with_header(mut self, header: JsonObject) -> Self {
        self.header = header;
        self
    }

    /// Sets how the header refers to the key.
    pub fn with_reference(mut self, reference: KeyReference) -> Self {
        self.reference = reference;
        self
    }

    /// The full header of the signature.
    fn resolve_header(&self, fields: &JsonObject) -> Result<JsonObject> {
        let mut header = merge_headers([Some(&self.header), Some(fields)]);

        if !header.contains_key("alg") {
            let alg = self
                .key
                .algorithms(Mode::Sign)
                .first()
                .copied()
                .ok_or_else(|| {
                    Error::root(JoseError::UnsupportedAlgorithm(self.key.kty().to_owned()))
                })
                .ctx(|| format!("key {} cannot sign", self.key.kid()))?;
            header.insert("alg".to_owned(), Value::from(alg));
        }
        self.reference.apply(&self.key, &mut header)?;

        if !b64_flag(&header)? {
            require_b64_crit(&mut header)?;
        }
        Ok(header)
    }
}

impl From<Arc<Key>> for SignerEntry {
    fn from(key: Arc<Key>) -> Self {
        Self::new(key)
    }
}

impl From<Key> for SignerEntry {
    fn from(key: Key) -> Self {
        Self::new(key)
    }
}

/// Options of a [`Signer`].
#[derive(Debug, Clone, Default)]
pub struct SignOptions {
    /// The serialization of the output.
    pub format: Serialization,
    /// Header members shared by all signatures.
    pub fields: JsonObject,
    /// Which header members are protected.  The compact serialization
    /// protects every member.
    pub protect: Protect,
    /// The critical extensions the signer may list in `crit`.
    pub handlers: CritHandlers,
}

/// Produces a JWS.
///
/// The payload is accumulated with [`Self::update`] and signed by every
/// [`SignerEntry`] in [`Self::finalize`], which consumes the signer.
#[derive(Debug)]
pub struct Signer {
    options: SignOptions,
    entries: Vec<SignerEntry>,
    payload: Vec<u8>,
}

impl Signer {
    /// Creates a signer.  The compact and flattened serializations take a
    /// single entry.
    pub fn new<I, E>(options: SignOptions, entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = E>,
        E: Into<SignerEntry>,
    {
        let entries: Vec<SignerEntry> = entries.into_iter().map(Into::into).collect();
        if entries.is_empty() {
            return Err(Error::root(JoseError::NoKeyFound)).ctx(|| "no signers");
        }
        if entries.len() > 1 && options.format != Serialization::General {
            return Err(Error::root(JoseError::TooManyEntries))
                .ctx(|| format!("{} serialization has a single signature", options.format));
        }

        Ok(Self {
            options,
            entries,
            payload: Vec::new(),
        })
    }

    /// Appends `data` to the payload.
    pub fn update(&mut self, data: impl AsRef<[u8]>) -> &mut Self {
        self.payload.extend_from_slice(data.as_ref());
        self
    }

    /// Appends `data` to the payload, then finalizes.
    pub async fn finalize_with(mut self, data: impl AsRef<[u8]>) -> Result<Serialized> {
        self.update(data);
        self.finalize().await
    }

    /// Signs the payload and serializes the JWS.
    pub async fn finalize(self) -> Result<Serialized> {
        let format = self.options.format;
        let protect = match format {
            Serialization::Compact => Protect::All,
            _ => self.options.protect.clone(),
        };

        let mut payload: Option<String> = None;
        let mut signatures = Vec::with_capacity(self.entries.len());

        for entry in &self.entries {
            let header = entry.resolve_header(&self.options.fields)?;
            let alg = required_alg(&header)?.to_owned();
            let b64 = b64_flag(&header)?;

            let (protected, unprotected) = protect.split(header);
            self.options.handlers.prepare(&protected, &unprotected)?;

            let encoded = if b64 {
                base64_url_encode(&self.payload)
            } else {
                unencoded_payload(&self.payload, format)?
            };
            if payload.as_ref().is_some_and(|previous| *previous != encoded) {
                return Err(Error::root(JoseError::InvalidHeader(
                    "signatures disagree on `b64`".to_owned(),
                )));
            }
            payload = Some(encoded);

            let encoded_protected = encode_protected(&protected);
            let signing_input = signing_input(&encoded_protected, payload.as_deref().unwrap_or_default());
            let signature = entry
                .key
                .sign(&alg, &signing_input)
                .await
                .match_err(|error| JoseError::Key(error.clone()))?;

            tracing::debug!(kid = entry.key.kid(), alg = %alg, "signed JWS");
            signatures.push(JwsSignature {
                protected: (!encoded_protected.is_empty()).then_some(encoded_protected),
                header: (!unprotected.is_empty()).then_some(unprotected),
                signature: base64_url_encode(signature),
            });
        }

        GeneralJws {
            payload: payload.unwrap_or_default(),
            signatures,
        }
        .serialize(format)
    }
}

/// Creates a [`Signer`].
pub fn create_sign<I, E>(options: SignOptions, entries: I) -> Result<Signer>
where
    I: IntoIterator<Item = E>,
    E: Into<SignerEntry>,
{
    Signer::new(options, entries)
}

/// An unencoded payload must be text, and free of `.` in the compact form.
fn unencoded_payload(payload: &[u8], format: Serialization) -> Result<String> {
    let payload = String::from_utf8(payload.to_vec()).foreign_err(|| {
        JoseError::InvalidFormat("unencoded payload is not UTF-8".to_owned())
    })?;
    if format == Serialization::Compact && payload.contains('.') {
        return Err(Error::root(JoseError::InvalidFormat(
            "unencoded compact payload contains `.`".to_owned(),
        )));
    }
    Ok(payload)
}

fn signing_input(encoded_protected: &str, payload: &str) -> Vec<u8> {
    [encoded_protected.as_bytes(), b".", payload.as_bytes()].concat()
}

/// Options of a [`Verifier`].
#[derive(Debug, Clone, Default)]
pub struct VerifyOptions {
    /// The acceptable `alg` values.
    pub algorithms: AlgorithmFilter,
    /// Whether a key in the `jwk` or `x5c` header member may verify the
    /// signature.  Such a key only proves integrity, not who signed.
    pub allow_embedded_key: bool,
    /// The critical extensions the verifier understands.
    pub handlers: CritHandlers,
}

/// A verified JWS.
#[derive(Debug, Clone)]
pub struct VerifyResult {
    /// The effective header of the verified signature.
    pub header: JsonObject,
    /// Names of the integrity protected header members.
    pub protected: Vec<String>,
    /// The payload.
    pub payload: Vec<u8>,
    /// The signature.
    pub signature: Vec<u8>,
    /// The key which verified the signature.
    pub key: Arc<Key>,
}

/// Verifies JWS with the keys of a [`KeyStore`].
///
/// The signatures are tried in order, each with every key matching its
/// header, and the first success wins.
#[derive(Debug, Clone)]
pub struct Verifier {
    store: KeyStore,
    options: VerifyOptions,
}

impl Verifier {
    /// Creates a verifier.
    pub fn new(store: impl Into<KeyStore>, options: VerifyOptions) -> Self {
        Self {
            store: store.into(),
            options,
        }
    }

    /// Verifies a JWS in any serialization.
    pub async fn verify(&self, input: &str) -> Result<VerifyResult> {
        match parse(input)?.object {
            JoseObject::Jws(jws) => self.verify_jws(&jws).await,
            JoseObject::Jwe(_) => Err(Error::root(JoseError::InvalidFormat(
                "expected a JWS, got a JWE".to_owned(),
            ))),
        }
    }

    /// Verifies a parsed JWS.
    pub async fn verify_jws(&self, jws: &GeneralJws) -> Result<VerifyResult> {
        let mut not_allowed = None;

        for entry in &jws.signatures {
            let encoded_protected = entry.protected.as_deref().unwrap_or_default();
            let protected = decode_protected(encoded_protected)?;
            let empty = JsonObject::new();
            let unprotected = entry.header.as_ref().unwrap_or(&empty);

            let header = HeaderSources {
                protected: Some(&protected),
                shared: None,
                entry: entry.header.as_ref(),
            }
            .merge();
            let alg = required_alg(&header)?;
            if !self.options.algorithms.allows(alg) {
                tracing::debug!(alg, "signature algorithm not allowed");
                not_allowed = Some(alg.to_owned());
                continue;
            }

            let crit = self.options.handlers.prepare(&protected, unprotected)?;
            let payload = if b64_flag(&protected)? {
                decode_member("payload", &jws.payload)?
            } else {
                jws.payload.as_bytes().to_vec()
            };
            let signature = decode_member("signature", &entry.signature)?;
            let signing_input = signing_input(encoded_protected, &jws.payload);

            for key in self.candidates(&header, alg)? {
                match key.verify(alg, &signing_input, &signature).await {
                    Ok(()) => {
                        self.options.handlers.complete(&crit, &header, &payload)?;
                        return Ok(VerifyResult {
                            protected: member_names(&protected),
                            header,
                            payload,
                            signature,
                            key,
                        });
                    }
                    Err(error) => {
                        tracing::debug!(kid = key.kid(), alg, %error, "key did not verify");
                    }
                }
            }
        }

        Err(match not_allowed {
            Some(alg) => Error::root(JoseError::AlgorithmNotAllowed(alg)),
            None => Error::root(JoseError::NoKeyFound),
        })
    }

    /// Keys to try for a signature: the matching keys of the store, then the
    /// embedded key when allowed.
    fn candidates(&self, header: &JsonObject, alg: &str) -> Result<Vec<Arc<Key>>> {
        let selector = KeySelector {
            kid: string_member(header, "kid")?.map(str::to_owned),
            key_use: Some(KeyUse::Sig),
            alg: Some(alg.to_owned()),
            kty: None,
        };
        let mut keys = self.store.all_matching(&selector);

        if self.options.allow_embedded_key {
            if let Some(key) = self.embedded_key(header)? {
                tracing::warn!(kid = key.kid(), "verifying with a key embedded in the header");
                keys.push(Arc::new(key));
            }
        }
        Ok(keys)
    }

    fn embedded_key(&self, header: &JsonObject) -> Result<Option<Key>> {
        let registry = self.store.registry();

        if let Some(jwk) = header.get("jwk") {
            let Value::Object(jwk) = jwk else {
                return Err(Error::root(JoseError::InvalidHeader(
                    "`jwk` is not an object".to_owned(),
                )));
            };
            let key = registry
                .key_from_json(jwk)
                .match_err(|error| JoseError::Key(error.clone()))?;
            return Ok(Some(key));
        }

        if let Some(x5c) = header.get("x5c") {
            let leaf = x5c
                .as_array()
                .and_then(|chain| chain.first())
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    Error::root(JoseError::InvalidHeader("`x5c` is not a chain".to_owned()))
                })?;
            let der = STANDARD.decode(leaf).foreign_err(|| {
                JoseError::InvalidHeader("`x5c` is not base64".to_owned())
            })?;
            let key = import_key(registry, &der, Some(KeyFormat::X509))
                .match_err(|error| JoseError::Key(error.clone()))?;
            return Ok(Some(key));
        }

        Ok(None)
    }
}

/// Creates a [`Verifier`].
pub fn create_verify(store: impl Into<KeyStore>, options: VerifyOptions) -> Verifier {
    Verifier::new(store, options)
}
