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

//! JSON Web Encryption (RFC 7516).

use std::sync::Arc;

use bh_jwa::{
    base64_url_encode, content_iv_size, content_key_size, random_bytes, JsonObject, KeyMaterial,
    Operation, Props, MAX_ITERATIONS,
};
use bh_jwk::{Key, KeySelector, KeyStore, KeyUse, Mode};
use bherror::{
    traits::{ErrorContext as _, PropagateError as _},
    Error,
};
use serde_json::Value;

use crate::{
    compress::{compress, decompress, is_compressed, DEFAULT_MAX_DECOMPRESSED_SIZE, DEFLATE},
    format::{GeneralJwe, JweRecipient},
    header::{
        decode_member, decode_protected, encode_protected, member_names, merge_headers,
        required_alg, string_member, HeaderSources,
    },
    parse::{parse, JoseObject},
    AlgorithmFilter, CritHandlers, JoseError, KeyReference, Protect, Result, Serialization,
    Serialized,
};

/// The content encryption algorithm used unless the caller or a `dir` key
/// picks one.
pub const DEFAULT_CONTENT_ALG: &str = "A128CBC-HS256";

/// Key management algorithms whose result is the content encryption key
/// itself, which allow a single recipient.
const DIRECT_ALGS: [&str; 2] = ["dir", "ECDH-ES"];

fn key_error(error: &bh_jwk::KeyError) -> JoseError {
    JoseError::Key(error.clone())
}

/// A recipient of a JWE, with the header members specific to it.
#[derive(Debug, Clone)]
pub struct RecipientEntry {
    /// The key management key.
    pub key: Arc<Key>,
    /// Header members of this recipient, taking precedence over
    /// [`EncryptOptions::fields`].  Key management inputs such as `p2c`,
    /// `apu` or `apv` go here.
    pub header: JsonObject,
    /// How the header refers to the key.
    pub reference: KeyReference,
}

impl RecipientEntry {
    /// A recipient with no extra header members, referring to the key by
    /// `kid`.
    pub fn new(key: impl Into<Arc<Key>>) -> Self {
        Self {
            key: key.into(),
            header: JsonObject::new(),
            reference: KeyReference::default(),
        }
    }

    /// Sets the header members of this recipient.
    pub fn with_header(mut self, header: JsonObject) -> Self {
        self.header = header;
        self
    }

    /// Sets how the header refers to the key.
    pub fn with_reference(mut self, reference: KeyReference) -> Self {
        self.reference = reference;
        self
    }

    /// The per-recipient header, with `alg` resolved against `fields`.
    fn resolve_header(&self, fields: &JsonObject) -> Result<JsonObject> {
        let mut header = self.header.clone();

        if !header.contains_key("alg") && !fields.contains_key("alg") {
            let alg = self
                .key
                .algorithms(Mode::Wrap)
                .first()
                .copied()
                .ok_or_else(|| {
                    Error::root(JoseError::UnsupportedAlgorithm(self.key.kty().to_owned()))
                })
                .ctx(|| format!("key {} cannot wrap", self.key.kid()))?;
            header.insert("alg".to_owned(), Value::from(alg));
        }
        self.reference.apply(&self.key, &mut header)?;
        Ok(header)
    }
}

impl From<Arc<Key>> for RecipientEntry {
    fn from(key: Arc<Key>) -> Self {
        Self::new(key)
    }
}

impl From<Key> for RecipientEntry {
    fn from(key: Key) -> Self {
        Self::new(key)
    }
}

/// Options of an [`Encrypter`].
#[derive(Debug, Clone, Default)]
pub struct EncryptOptions {
    /// The serialization of the output.
    pub format: Serialization,
    /// Header members shared by all recipients.
    pub fields: JsonObject,
    /// Which header members are protected.  The compact serialization
    /// protects every member.
    pub protect: Protect,
    /// The content encryption algorithm (`enc`).
    pub content_alg: Option<String>,
    /// Whether to compress the plaintext with `DEFLATE`.
    pub zip: bool,
    /// The content encryption key, generated when absent.  Ignored by the
    /// direct key management algorithms.
    pub cek: Option<Vec<u8>>,
    /// The initialization vector, generated when absent.
    pub iv: Option<Vec<u8>>,
    /// Additional authenticated data, only in the JSON serializations.
    pub aad: Option<Vec<u8>>,
    /// The critical extensions the encrypter may list in `crit`.
    pub handlers: CritHandlers,
}

/// Produces a JWE.
///
/// The plaintext is accumulated with [`Self::update`] and encrypted for every
/// [`RecipientEntry`] in [`Self::finalize`], which consumes the encrypter.
#[derive(Debug)]
pub struct Encrypter {
    options: EncryptOptions,
    recipients: Vec<RecipientEntry>,
    plaintext: Vec<u8>,
}

impl Encrypter {
    /// Creates an encrypter.  The compact and flattened serializations take
    /// a single recipient.
    pub fn new<I, E>(options: EncryptOptions, recipients: I) -> Result<Self>
    where
        I: IntoIterator<Item = E>,
        E: Into<RecipientEntry>,
    {
        let recipients: Vec<RecipientEntry> = recipients.into_iter().map(Into::into).collect();
        if recipients.is_empty() {
            return Err(Error::root(JoseError::NoKeyFound)).ctx(|| "no recipients");
        }
        if recipients.len() > 1 && options.format != Serialization::General {
            return Err(Error::root(JoseError::TooManyEntries))
                .ctx(|| format!("{} serialization has a single recipient", options.format));
        }

        Ok(Self {
            options,
            recipients,
            plaintext: Vec::new(),
        })
    }

    /// Appends `data` to the plaintext.
    pub fn update(&mut self, data: impl AsRef<[u8]>) -> &mut Self {
        self.plaintext.extend_from_slice(data.as_ref());
        self
    }

    /// Picks `enc`: the option, the shared `enc` member, the preferred
    /// content algorithm of a `dir` key, then [`DEFAULT_CONTENT_ALG`].
    fn content_alg(&self, headers: &[JsonObject]) -> Result<String> {
        if let Some(enc) = &self.options.content_alg {
            return Ok(enc.clone());
        }
        if let Some(enc) = string_member(&self.options.fields, "enc")? {
            return Ok(enc.to_owned());
        }

        if let ([recipient], [header]) = (&self.recipients[..], headers) {
            let merged = merge_headers([Some(header), Some(&self.options.fields)]);
            if required_alg(&merged)? == "dir" {
                if let Some(enc) = recipient.key.algorithms(Mode::Encrypt).first() {
                    return Ok((*enc).to_owned());
                }
            }
        }
        Ok(DEFAULT_CONTENT_ALG.to_owned())
    }

    /// Appends `data` to the plaintext, then finalizes.
    pub async fn finalize_with(mut self, data: impl AsRef<[u8]>) -> Result<Serialized> {
        self.update(data);
        self.finalize().await
    }

    /// Encrypts the plaintext and serializes the JWE.
    pub async fn finalize(self) -> Result<Serialized> {
        let format = self.options.format;
        let protect = match format {
            Serialization::Compact => Protect::All,
            _ => self.options.protect.clone(),
        };

        let mut headers = self
            .recipients
            .iter()
            .map(|recipient| recipient.resolve_header(&self.options.fields))
            .collect::<Result<Vec<_>>>()?;
        let enc = self.content_alg(&headers)?;
        let cek_bits = content_key_size(&enc)
            .ok_or_else(|| Error::root(JoseError::UnsupportedAlgorithm(enc.clone())))
            .ctx(|| "not a content encryption algorithm")?;

        let mut cek = self
            .options
            .cek
            .clone()
            .unwrap_or_else(|| random_bytes(cek_bits / 8));
        let mut encrypted_keys = Vec::with_capacity(self.recipients.len());

        for (recipient, header) in self.recipients.iter().zip(headers.iter_mut()) {
            let merged = merge_headers([Some(&*header), Some(&self.options.fields)]);
            let alg = required_alg(&merged)?.to_owned();
            if DIRECT_ALGS.contains(&alg.as_str()) && self.recipients.len() > 1 {
                return Err(Error::root(JoseError::TooManyEntries))
                    .ctx(|| format!("{alg} allows a single recipient"));
            }

            let mut props = recipient
                .key
                .props(Mode::Wrap, &merged)
                .match_err(key_error)?;
            props.enc = Some(enc.clone());

            let wrapped = recipient
                .key
                .wrap(&alg, &cek, &props)
                .await
                .match_err(key_error)?;
            tracing::debug!(kid = recipient.key.kid(), alg = %alg, enc = %enc, "wrapped content key");

            header.extend(wrapped.header);
            if wrapped.direct {
                cek = wrapped.data;
                encrypted_keys.push(String::new());
            } else {
                encrypted_keys.push(base64_url_encode(wrapped.data));
            }
        }

        let mut shared = self.options.fields.clone();
        shared.insert("enc".to_owned(), Value::from(enc.as_str()));
        if self.options.zip {
            shared.insert("zip".to_owned(), Value::from(DEFLATE));
        }

        // a single recipient shares the protected header with the content
        let (mut protected, unprotected) = protect.split(shared);
        let single = format != Serialization::General;
        let recipients: Vec<JweRecipient> = headers
            .into_iter()
            .zip(encrypted_keys)
            .map(|(header, encrypted_key)| {
                let header = if single {
                    let (covered, rest) = protect.split(header);
                    protected.extend(covered);
                    rest
                } else {
                    header
                };
                JweRecipient {
                    header: (!header.is_empty()).then_some(header),
                    encrypted_key: Some(encrypted_key),
                }
            })
            .collect();
        self.options.handlers.prepare(&protected, &unprotected)?;

        let encoded_protected = encode_protected(&protected);
        let encoded_aad = self.options.aad.as_ref().map(base64_url_encode);
        let aad = content_aad(&encoded_protected, encoded_aad.as_deref());

        let plaintext = if self.options.zip {
            compress(&self.plaintext)?
        } else {
            self.plaintext
        };
        let iv = match self.options.iv {
            Some(iv) => iv,
            None => random_bytes(content_iv_size(&enc).unwrap_or_default()),
        };

        let encrypted = bh_jwa::registry()
            .dispatch_async(
                Operation::Encrypt,
                &enc,
                Some(&KeyMaterial::Oct(cek)),
                &plaintext,
                &Props::with_iv_aad(iv.clone(), aad),
            )
            .await
            .match_err(|error| JoseError::Algorithm(error.clone()))?;

        GeneralJwe {
            protected: (!encoded_protected.is_empty()).then_some(encoded_protected),
            unprotected: (!unprotected.is_empty()).then_some(unprotected),
            recipients,
            iv: base64_url_encode(iv),
            ciphertext: base64_url_encode(encrypted.data),
            tag: base64_url_encode(encrypted.tag.unwrap_or_default()),
            aad: encoded_aad,
        }
        .serialize(format)
    }
}

/// Creates an [`Encrypter`].
pub fn create_encrypt<I, E>(options: EncryptOptions, recipients: I) -> Result<Encrypter>
where
    I: IntoIterator<Item = E>,
    E: Into<RecipientEntry>,
{
    Encrypter::new(options, recipients)
}

/// The additional authenticated data of the content encryption: the encoded
/// protected header, followed by `.` and the encoded `aad` member if any.
fn content_aad(encoded_protected: &str, encoded_aad: Option<&str>) -> Vec<u8> {
    match encoded_aad {
        Some(aad) => format!("{encoded_protected}.{aad}").into_bytes(),
        None => encoded_protected.as_bytes().to_vec(),
    }
}

/// Options of a [`Decrypter`].
#[derive(Debug, Clone, Default)]
pub struct DecryptOptions {
    /// The acceptable `alg` and `enc` values.
    pub algorithms: AlgorithmFilter,
    /// The critical extensions the decrypter understands.
    pub handlers: CritHandlers,
    /// The largest PBES2 iteration count (`p2c`) to accept, at most
    /// [`bh_jwa::MAX_ITERATIONS`], which is also the default.
    pub max_iterations: Option<u32>,
    /// The largest plaintext a compressed JWE may expand to, by default
    /// [`DEFAULT_MAX_DECOMPRESSED_SIZE`].
    pub max_decompressed_size: Option<usize>,
}

/// A decrypted JWE.
#[derive(Debug, Clone)]
pub struct DecryptResult {
    /// The effective header of the recipient that decrypted.
    pub header: JsonObject,
    /// Names of the integrity protected header members.
    pub protected: Vec<String>,
    /// The plaintext, decompressed.
    pub plaintext: Vec<u8>,
    /// The additional authenticated data, if any.
    pub aad: Option<Vec<u8>>,
    /// The key which recovered the content encryption key.
    pub key: Arc<Key>,
}

/// Decrypts JWE with the keys of a [`KeyStore`].
///
/// The recipients are tried in order, each with every key matching its
/// header, and the first one that decrypts the content wins.
#[derive(Debug, Clone)]
pub struct Decrypter {
    store: KeyStore,
    options: DecryptOptions,
}

impl Decrypter {
    /// Creates a decrypter.
    pub fn new(store: impl Into<KeyStore>, options: DecryptOptions) -> Self {
        Self {
            store: store.into(),
            options,
        }
    }

    /// Decrypts a JWE in any serialization.
    pub async fn decrypt(&self, input: &str) -> Result<DecryptResult> {
        match parse(input)?.object {
            JoseObject::Jwe(jwe) => self.decrypt_jwe(&jwe).await,
            JoseObject::Jws(_) => Err(Error::root(JoseError::InvalidFormat(
                "expected a JWE, got a JWS".to_owned(),
            ))),
        }
    }

    /// Decrypts a parsed JWE.
    pub async fn decrypt_jwe(&self, jwe: &GeneralJwe) -> Result<DecryptResult> {
        let encoded_protected = jwe.protected.as_deref().unwrap_or_default();
        let protected = decode_protected(encoded_protected)?;

        let unprotected = merge_headers(
            std::iter::once(jwe.unprotected.as_ref())
                .chain(jwe.recipients.iter().map(|recipient| recipient.header.as_ref())),
        );
        let crit = self.options.handlers.prepare(&protected, &unprotected)?;
        if unprotected.contains_key("zip") {
            return Err(Error::root(JoseError::InvalidHeader(
                "`zip` must be integrity protected".to_owned(),
            )));
        }
        let compressed = is_compressed(string_member(&protected, "zip")?)?;

        let iv = decode_member("iv", &jwe.iv)?;
        let ciphertext = decode_member("ciphertext", &jwe.ciphertext)?;
        let tag = decode_member("tag", &jwe.tag)?;
        let aad = jwe
            .aad
            .as_deref()
            .map(|aad| decode_member("aad", aad))
            .transpose()?;
        let content_props = Props {
            tag: Some(tag),
            ..Props::with_iv_aad(iv, content_aad(encoded_protected, jwe.aad.as_deref()))
        };

        let mut not_allowed = None;
        for recipient in &jwe.recipients {
            let header = HeaderSources {
                protected: Some(&protected),
                shared: jwe.unprotected.as_ref(),
                entry: recipient.header.as_ref(),
            }
            .merge();

            let enc = string_member(&header, "enc")?
                .ok_or_else(|| Error::root(JoseError::InvalidHeader("missing `enc`".to_owned())))?;
            if !self.options.algorithms.allows(enc) {
                return Err(Error::root(JoseError::AlgorithmNotAllowed(enc.to_owned())));
            }
            let alg = required_alg(&header)?;
            if !self.options.algorithms.allows(alg) {
                tracing::debug!(alg, "key management algorithm not allowed");
                not_allowed = Some(alg.to_owned());
                continue;
            }
            self.check_iterations(&header)?;

            let encrypted_key = recipient.encrypted_key.as_deref().unwrap_or_default();
            let encrypted_key = decode_member("encrypted_key", encrypted_key)?;
            let selector = KeySelector {
                kid: string_member(&header, "kid")?.map(str::to_owned),
                key_use: Some(KeyUse::Enc),
                alg: Some(alg.to_owned()),
                kty: None,
            };

            for key in self.store.all_matching(&selector) {
                let mut props = key.props(Mode::Unwrap, &header).match_err(key_error)?;
                props.enc = Some(enc.to_owned());

                let cek = match key.unwrap(alg, &encrypted_key, &props).await {
                    Ok(unwrapped) => unwrapped.data,
                    Err(error) => {
                        tracing::debug!(kid = key.kid(), alg, %error, "key did not unwrap");
                        continue;
                    }
                };

                let decrypted = bh_jwa::registry()
                    .dispatch_async(
                        Operation::Decrypt,
                        enc,
                        Some(&KeyMaterial::Oct(cek)),
                        &ciphertext,
                        &content_props,
                    )
                    .await;
                let plaintext = match decrypted {
                    Ok(decrypted) => decrypted.data,
                    Err(error) => {
                        tracing::debug!(kid = key.kid(), enc, %error, "content did not decrypt");
                        continue;
                    }
                };
                let plaintext = if compressed {
                    let limit = self
                        .options
                        .max_decompressed_size
                        .unwrap_or(DEFAULT_MAX_DECOMPRESSED_SIZE);
                    decompress(&plaintext, limit)?
                } else {
                    plaintext
                };

                self.options.handlers.complete(&crit, &header, &plaintext)?;
                return Ok(DecryptResult {
                    protected: member_names(&protected),
                    header,
                    plaintext,
                    aad,
                    key,
                });
            }
        }

        Err(match not_allowed {
            Some(alg) => Error::root(JoseError::AlgorithmNotAllowed(alg)),
            None => Error::root(JoseError::NoKeyFound),
        })
    }

    /// Rejects a `p2c` above the limit before any key derivation.
    fn check_iterations(&self, header: &JsonObject) -> Result<()> {
        let limit = self
            .options
            .max_iterations
            .map_or(MAX_ITERATIONS, |limit| limit.min(MAX_ITERATIONS));

        match header.get("p2c").and_then(Value::as_u64) {
            Some(p2c) if p2c > u64::from(limit) => Err(Error::root(JoseError::InvalidHeader(
                format!("`p2c` of {p2c} exceeds {limit}"),
            ))),
            _ => Ok(()),
        }
    }
}

/// Creates a [`Decrypter`].
pub fn create_decrypt(store: impl Into<KeyStore>, options: DecryptOptions) -> Decrypter {
    Decrypter::new(store, options)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use bh_jwa::json_object;
    use bh_jwk::KeyError;

    use super::*;
    use crate::CritHandler;

    const CONTENT: &[u8] = b"this is very good content";

    fn dir_key() -> Key {
        Key::parse(r#"{"kty":"oct","k":"wB_gTgRKTtYSk-ul_W-96WU92evFr01tPN6WE8A8BEU","alg":"A256GCM"}"#)
            .unwrap()
    }

    async fn encrypt(
        options: EncryptOptions,
        recipients: Vec<RecipientEntry>,
        plaintext: &[u8],
    ) -> Serialized {
        let mut encrypter = Encrypter::new(options, recipients).unwrap();
        encrypter.update(plaintext);
        encrypter.finalize().await.unwrap()
    }

    fn protected_header(compact: &str) -> JsonObject {
        decode_protected(compact.split('.').next().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_direct_encryption() {
        let jwe = encrypt(EncryptOptions::default(), vec![dir_key().into()], CONTENT).await;

        let compact = jwe.as_compact().unwrap();
        let parts: Vec<&str> = compact.split('.').collect();
        assert_eq!(parts.len(), 5);
        assert_eq!(parts[1], "");
        assert_eq!(
            protected_header(compact),
            json_object!({
                "alg": "dir",
                "enc": "A256GCM",
                "kid": "V5O0olRc1BSdaubnd_REP2B0xBjo8gBmNcLlv_F8hk0"
            })
        );

        let options = DecryptOptions {
            algorithms: AlgorithmFilter::new(["!A*KW"]).unwrap(),
            ..Default::default()
        };
        let result = Decrypter::new(dir_key(), options)
            .decrypt(compact)
            .await
            .unwrap();
        assert_eq!(result.plaintext, CONTENT);
        assert_eq!(result.header["enc"], "A256GCM");
        assert_eq!(result.protected.len(), 3);
        assert_eq!(result.aad, None);
    }

    #[tokio::test]
    async fn test_key_wrap_key_is_not_a_direct_key() {
        let key = Key::parse(
            r#"{"kty":"oct","k":"wB_gTgRKTtYSk-ul_W-96WU92evFr01tPN6WE8A8BEU","alg":"A256KW"}"#,
        )
        .unwrap();
        let recipient = RecipientEntry::new(key).with_header(json_object!({"alg": "dir"}));
        let encrypter = Encrypter::new(EncryptOptions::default(), vec![recipient]).unwrap();

        let error = encrypter.finalize().await.unwrap_err();
        assert_matches!(error.error, JoseError::Key(KeyError::UnsupportedAlgorithm(_)));
    }

    #[tokio::test]
    async fn test_rfc7516_a128kw() {
        // RFC 7516 appendix A.3
        let key = Key::parse(r#"{"kty":"oct","k":"GawgguFyGrWKav7AX4VKUg"}"#).unwrap();
        let jwe = "eyJhbGciOiJBMTI4S1ciLCJlbmMiOiJBMTI4Q0JDLUhTMjU2In0.\
            6KB707dM9YTIgHtLvtgWQ8mKwboJW3of9locizkDTHzBC2IlrT1oOQ.\
            AxY8DCtDaGlsbGljb3RoZQ.\
            KDlTtXchhZTGufMYmOYGS4HffxPSUrfmqCHXaI9wOGY.\
            U0m_YmjN04DJvceFICbCVQ";

        let result = Decrypter::new(key, DecryptOptions::default())
            .decrypt(jwe)
            .await
            .unwrap();
        assert_eq!(result.plaintext, b"Live long and prosper.");
        assert_eq!(result.header["alg"], "A128KW");
    }

    #[tokio::test]
    async fn test_several_recipients() {
        let mut store = KeyStore::new();
        let rsa = store
            .generate("RSA", 2048, json_object!({"kid": "rsa", "alg": "RSA-OAEP-256"}))
            .unwrap();
        let ec = store
            .generate("EC", 256, json_object!({"kid": "ec", "alg": "ECDH-ES+A128KW"}))
            .unwrap();
        let oct = store
            .generate("oct", 128, json_object!({"kid": "oct", "use": "enc"}))
            .unwrap();

        let options = EncryptOptions {
            format: Serialization::General,
            content_alg: Some("A256CBC-HS512".to_owned()),
            ..Default::default()
        };
        let jwe = encrypt(options, vec![rsa.into(), ec.into(), oct.clone().into()], CONTENT).await;

        let json = jwe.as_json().unwrap();
        let recipients = json["recipients"].as_array().unwrap();
        assert_eq!(recipients.len(), 3);
        assert_eq!(recipients[0]["header"]["alg"], "RSA-OAEP-256");
        assert_eq!(recipients[1]["header"]["alg"], "ECDH-ES+A128KW");
        assert_eq!(recipients[1]["header"]["epk"]["kty"], "EC");
        assert_eq!(recipients[2]["header"]["alg"], "A128KW");

        for kid in ["rsa", "ec", "oct"] {
            let key = store.get(kid).unwrap();
            let result = Decrypter::new(key.clone(), DecryptOptions::default())
                .decrypt(&jwe.to_string())
                .await
                .unwrap();
            assert_eq!(result.plaintext, CONTENT);
            assert_eq!(result.header["kid"], kid);
            assert!(Arc::ptr_eq(&result.key, &key));
        }

        // only the symmetric recipient is acceptable
        let options = DecryptOptions {
            algorithms: AlgorithmFilter::parse("A*KW A256CBC-HS512").unwrap(),
            ..Default::default()
        };
        let result = Decrypter::new(store, options)
            .decrypt(&jwe.to_string())
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&result.key, &oct));
    }

    #[tokio::test]
    async fn test_compression_and_aad() {
        let mut store = KeyStore::new();
        let key = store.generate("oct", 256, json_object!({"alg": "A256GCMKW"})).unwrap();
        let plaintext = CONTENT.repeat(10);

        let options = EncryptOptions {
            format: Serialization::Flattened,
            protect: Protect::from("enc"),
            zip: true,
            aad: Some(b"authenticated".to_vec()),
            ..Default::default()
        };
        let jwe = encrypt(options, vec![key.into()], &plaintext).await;

        let json = jwe.as_json().unwrap();
        assert_eq!(json["header"]["alg"], "A256GCMKW");
        assert!(json["header"]["iv"].is_string());
        assert!(json["header"]["tag"].is_string());
        assert!(json["aad"].is_string());
        let ciphertext = bh_jwa::base64_url_decode(json["ciphertext"].as_str().unwrap()).unwrap();
        assert!(ciphertext.len() < plaintext.len());

        let result = Decrypter::new(store, DecryptOptions::default())
            .decrypt(&jwe.to_string())
            .await
            .unwrap();
        assert_eq!(result.plaintext, plaintext);
        assert_eq!(result.aad.as_deref(), Some(&b"authenticated"[..]));
        assert_eq!(result.header["zip"], "DEF");

        let mut protected = result.protected;
        protected.sort();
        assert_eq!(protected, ["enc", "zip"]);
    }

    #[tokio::test]
    async fn test_decompressed_size_limit() {
        let key = Arc::new(dir_key());
        let options = EncryptOptions {
            zip: true,
            ..Default::default()
        };
        let plaintext = vec![0u8; 64 * 1024];
        let jwe = encrypt(options, vec![key.clone().into()], &plaintext).await;

        let options = DecryptOptions {
            max_decompressed_size: Some(plaintext.len() - 1),
            ..Default::default()
        };
        let error = Decrypter::new(key.clone(), options)
            .decrypt(&jwe.to_string())
            .await
            .unwrap_err();
        assert_eq!(error.error, JoseError::Compression);

        let result = Decrypter::new(key, DecryptOptions::default())
            .decrypt(&jwe.to_string())
            .await
            .unwrap();
        assert_eq!(result.plaintext, plaintext);
    }

    #[tokio::test]
    async fn test_tampered_aad_fails() {
        let key = Arc::new(dir_key());
        let options = EncryptOptions {
            format: Serialization::Flattened,
            aad: Some(b"original".to_vec()),
            ..Default::default()
        };
        let jwe = encrypt(options, vec![key.clone().into()], CONTENT).await;

        let mut json = jwe.as_json().unwrap().clone();
        json["aad"] = Value::from(base64_url_encode(b"tampered"));
        let error = Decrypter::new(key, DecryptOptions::default())
            .decrypt(&json.to_string())
            .await
            .unwrap_err();
        assert_eq!(error.error, JoseError::NoKeyFound);
    }

    #[tokio::test]
    async fn test_ecdh_es_direct() {
        let mut store = KeyStore::new();
        let key = store
            .generate("EC", 384, json_object!({"alg": "ECDH-ES"}))
            .unwrap();

        let options = EncryptOptions {
            content_alg: Some("A192GCM".to_owned()),
            ..Default::default()
        };
        let recipient = RecipientEntry::new(key.clone())
            .with_header(json_object!({"apu": "QWxpY2U", "apv": "Qm9i"}));
        let jwe = encrypt(options, vec![recipient], CONTENT).await;

        let compact = jwe.as_compact().unwrap();
        let header = protected_header(compact);
        assert_eq!(header["alg"], "ECDH-ES");
        assert_eq!(header["epk"]["crv"], "P-384");
        assert_eq!(header["apu"], "QWxpY2U");
        assert_eq!(compact.split('.').nth(1), Some(""));

        let result = Decrypter::new(store, DecryptOptions::default())
            .decrypt(compact)
            .await
            .unwrap();
        assert_eq!(result.plaintext, CONTENT);

        let options = EncryptOptions {
            format: Serialization::General,
            ..Default::default()
        };
        let encrypter = Encrypter::new(options, vec![key.clone(), key]).unwrap();
        let error = encrypter.finalize().await.unwrap_err();
        assert_eq!(error.error, JoseError::TooManyEntries);
    }

    #[tokio::test]
    async fn test_password_based() {
        let key = Arc::new(Key::parse(r#"{"kty":"oct","k":"cGFzc3dvcmQ"}"#).unwrap());
        let recipient = RecipientEntry::new(key.clone()).with_header(json_object!({
            "alg": "PBES2-HS256+A128KW",
            "p2c": 1000
        }));
        let jwe = encrypt(EncryptOptions::default(), vec![recipient], CONTENT).await;

        let header = protected_header(jwe.as_compact().unwrap());
        assert_eq!(header["p2c"], 1000);
        assert!(header["p2s"].is_string());
        assert_eq!(header["enc"], DEFAULT_CONTENT_ALG);

        let result = Decrypter::new(key, DecryptOptions::default())
            .decrypt(&jwe.to_string())
            .await
            .unwrap();
        assert_eq!(result.plaintext, CONTENT);
    }

    #[tokio::test]
    async fn test_iteration_count_limit() {
        let key = Arc::new(Key::parse(r#"{"kty":"oct","k":"cGFzc3dvcmQ"}"#).unwrap());
        let recipient = RecipientEntry::new(key.clone()).with_header(json_object!({
            "alg": "PBES2-HS512+A256KW",
            "p2c": 2000
        }));
        let jwe = encrypt(EncryptOptions::default(), vec![recipient], CONTENT).await;
        let compact = jwe.as_compact().unwrap();

        let options = DecryptOptions {
            max_iterations: Some(1000),
            ..Default::default()
        };
        let error = Decrypter::new(key.clone(), options)
            .decrypt(compact)
            .await
            .unwrap_err();
        assert_matches!(error.error, JoseError::InvalidHeader(_));

        // a forged header asking for an excessive count fails before any
        // key derivation
        let mut header = protected_header(compact);
        header.insert("p2c".to_owned(), Value::from(u32::MAX));
        let (_, rest) = compact.split_once('.').unwrap();
        let forged = format!("{}.{rest}", encode_protected(&header));

        let start = std::time::Instant::now();
        let error = Decrypter::new(key, DecryptOptions::default())
            .decrypt(&forged)
            .await
            .unwrap_err();
        assert_matches!(error.error, JoseError::InvalidHeader(_));
        assert!(start.elapsed() < std::time::Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_disallowed_algorithms() {
        let jwe = encrypt(EncryptOptions::default(), vec![dir_key().into()], CONTENT).await;

        let options = DecryptOptions {
            algorithms: AlgorithmFilter::parse("!A256GCM").unwrap(),
            ..Default::default()
        };
        let error = Decrypter::new(dir_key(), options)
            .decrypt(&jwe.to_string())
            .await
            .unwrap_err();
        assert_eq!(error.error, JoseError::AlgorithmNotAllowed("A256GCM".to_owned()));

        let options = DecryptOptions {
            algorithms: AlgorithmFilter::parse("A*KW A256GCM").unwrap(),
            ..Default::default()
        };
        let error = Decrypter::new(dir_key(), options)
            .decrypt(&jwe.to_string())
            .await
            .unwrap_err();
        assert_eq!(error.error, JoseError::AlgorithmNotAllowed("dir".to_owned()));
    }

    #[tokio::test]
    async fn test_wrong_key() {
        let mut store = KeyStore::new();
        let key = store.generate("oct", 128, JsonObject::new()).unwrap();
        let other = store.generate("oct", 128, JsonObject::new()).unwrap();

        let recipient = RecipientEntry::new(key).with_reference(KeyReference::None);
        let jwe = encrypt(EncryptOptions::default(), vec![recipient], CONTENT).await;

        let error = Decrypter::new(other.clone(), DecryptOptions::default())
            .decrypt(&jwe.to_string())
            .await
            .unwrap_err();
        assert_eq!(error.error, JoseError::NoKeyFound);

        // without a kid every matching key is tried
        let result = Decrypter::new(store, DecryptOptions::default())
            .decrypt(&jwe.to_string())
            .await
            .unwrap();
        assert!(!Arc::ptr_eq(&result.key, &other));
    }

    #[tokio::test]
    async fn test_critical_extension() {
        let handlers = CritHandlers::default().with("exp", CritHandler::Accept);
        let options = EncryptOptions {
            fields: json_object!({"exp": 1700000000, "crit": ["exp"]}),
            handlers: handlers.clone(),
            ..Default::default()
        };
        let jwe = encrypt(options, vec![dir_key().into()], CONTENT).await;

        let error = Decrypter::new(dir_key(), DecryptOptions::default())
            .decrypt(&jwe.to_string())
            .await
            .unwrap_err();
        assert_eq!(
            error.error,
            JoseError::UnsupportedCriticalExtension("exp".to_owned())
        );

        let options = DecryptOptions {
            handlers,
            ..Default::default()
        };
        let result = Decrypter::new(dir_key(), options)
            .decrypt(&jwe.to_string())
            .await
            .unwrap();
        assert_eq!(result.plaintext, CONTENT);
    }

    #[tokio::test]
    async fn test_compact_rejects_aad() {
        let options = EncryptOptions {
            aad: Some(b"aad".to_vec()),
            ..Default::default()
        };
        let encrypter = Encrypter::new(options, vec![dir_key()]).unwrap();
        let error = encrypter.finalize().await.unwrap_err();
        assert_matches!(error.error, JoseError::InvalidFormat(_));
    }
}
