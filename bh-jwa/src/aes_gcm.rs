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

//! AES-GCM content encryption (`A128GCM`, `A192GCM`, `A256GCM`) and key
//! wrapping (`A128GCMKW`, `A192GCMKW`, `A256GCMKW`).
//!
//! Large inputs can be processed in chunks of [`CHUNK_SIZE`] bytes, yielding
//! to the executor in between, see [`Registry::dispatch_async`].  The chunking
//! does not change the output.
//!
//! [`Registry::dispatch_async`]: crate::Registry::dispatch_async

use bherror::{
    traits::{ErrorContext as _, ForeignError as _},
    Error,
};
use openssl::symm::{Cipher, Crypter, Mode};
use serde_json::Value;

use crate::{
    registry::require_key,
    utils::{base64_url_encode, random_bytes},
    AlgorithmError, Operation, Output, Props, RegistryBuilder, Result,
};

/// The size of the chunks large inputs are processed in.
pub const CHUNK_SIZE: usize = 64 * 1024;

const IV_SIZE: usize = 12;
const TAG_SIZE: usize = 16;
const BLOCK_SIZE: usize = 16;

/// Returns the key size in bits of a GCM content encryption algorithm.
pub(crate) fn content_bits(alg: &str) -> Option<usize> {
    match alg {
        "A128GCM" => Some(128),
        "A192GCM" => Some(192),
        "A256GCM" => Some(256),
        _ => None,
    }
}

fn cipher(bits: usize) -> Cipher {
    match bits {
        128 => Cipher::aes_128_gcm(),
        192 => Cipher::aes_192_gcm(),
        _ => Cipher::aes_256_gcm(),
    }
}

/// An AES-GCM operation fed one chunk at a time.
struct GcmStream {
    crypter: Crypter,
    output: Vec<u8>,
}

impl GcmStream {
    fn new(mode: Mode, bits: usize, key: &[u8], iv: &[u8], aad: &[u8], len: usize) -> Result<Self> {
        if key.len() * 8 != bits {
            return Err(Error::root(AlgorithmError::InvalidKeySize))
                .ctx(|| format!("expected a {bits}-bit key, got {} bits", key.len() * 8));
        }
        if iv.len() != IV_SIZE {
            return Err(Error::root(AlgorithmError::InvalidIv))
                .ctx(|| format!("AES-GCM needs a {IV_SIZE}-byte iv"));
        }

        let mut crypter = Crypter::new(cipher(bits), mode, key, Some(iv))
            .foreign_err(|| AlgorithmError::CryptoBackend)?;
        if !aad.is_empty() {
            crypter
                .aad_update(aad)
                .foreign_err(|| AlgorithmError::CryptoBackend)?;
        }

        Ok(Self {
            crypter,
            output: Vec::with_capacity(len + BLOCK_SIZE),
        })
    }

    fn update(&mut self, chunk: &[u8]) -> Result<()> {
        let start = self.output.len();
        self.output.resize(start + chunk.len() + BLOCK_SIZE, 0);
        let written = self
            .crypter
            .update(chunk, &mut self.output[start..])
            .foreign_err(|| AlgorithmError::CryptoBackend)?;
        self.output.truncate(start + written);
        Ok(())
    }

    fn finish_encrypt(mut self) -> Result<(Vec<u8>, Vec<u8>)> {
        let mut rest = [0u8; BLOCK_SIZE];
        let written = self
            .crypter
            .finalize(&mut rest)
            .foreign_err(|| AlgorithmError::CryptoBackend)?;
        self.output.extend_from_slice(&rest[..written]);

        let mut tag = vec![0u8; TAG_SIZE];
        self.crypter
            .get_tag(&mut tag)
            .foreign_err(|| AlgorithmError::CryptoBackend)?;
        Ok((self.output, tag))
    }

    fn finish_decrypt(mut self, tag: &[u8]) -> Result<Vec<u8>> {
        self.crypter
            .set_tag(tag)
            .foreign_err(|| AlgorithmError::CryptoBackend)?;

        let mut rest = [0u8; BLOCK_SIZE];
        let written = self
            .crypter
            .finalize(&mut rest)
            .map_err(|_| Error::root(AlgorithmError::DecryptionFailed))?;
        self.output.extend_from_slice(&rest[..written]);
        Ok(self.output)
    }
}

fn check_tag(tag: Option<&[u8]>) -> Result<&[u8]> {
    match tag {
        Some(tag) if tag.len() == TAG_SIZE => Ok(tag),
        _ => Err(Error::root(AlgorithmError::InvalidTag))
            .ctx(|| format!("AES-GCM needs a {TAG_SIZE}-byte tag")),
    }
}

fn required_iv(props: &Props) -> Result<&[u8]> {
    props
        .iv
        .as_deref()
        .ok_or_else(|| Error::root(AlgorithmError::InvalidIv))
        .ctx(|| "AES-GCM needs an iv")
}

/// Encrypts in a single pass.
pub(crate) fn encrypt(bits: usize, key: &[u8], plaintext: &[u8], props: &Props) -> Result<Output> {
    let iv = required_iv(props)?;
    let aad = props.aad.as_deref().unwrap_or_default();

    let mut stream = GcmStream::new(Mode::Encrypt, bits, key, iv, aad, plaintext.len())?;
    stream.update(plaintext)?;
    let (data, tag) = stream.finish_encrypt()?;

    Ok(Output {
        data,
        tag: Some(tag),
        iv: Some(iv.to_vec()),
        ..Default::default()
    })
}

/// Decrypts in a single pass.
pub(crate) fn decrypt(bits: usize, key: &[u8], ciphertext: &[u8], props: &Props) -> Result<Output> {
    let iv = required_iv(props)?;
    let aad = props.aad.as_deref().unwrap_or_default();
    let tag = check_tag(props.tag.as_deref())?;

    let mut stream = GcmStream::new(Mode::Decrypt, bits, key, iv, aad, ciphertext.len())?;
    stream.update(ciphertext)?;
    Ok(Output::data(stream.finish_decrypt(tag)?))
}

/// Encrypts in chunks of [`CHUNK_SIZE`] bytes, yielding between them.
pub(crate) async fn encrypt_chunked(
    bits: usize,
    key: &[u8],
    plaintext: &[u8],
    props: &Props,
) -> Result<Output> {
    let iv = required_iv(props)?;
    let aad = props.aad.as_deref().unwrap_or_default();

    let mut stream = GcmStream::new(Mode::Encrypt, bits, key, iv, aad, plaintext.len())?;
    for chunk in plaintext.chunks(CHUNK_SIZE) {
        stream.update(chunk)?;
        embassy_futures::yield_now().await;
    }
    let (data, tag) = stream.finish_encrypt()?;

    Ok(Output {
        data,
        tag: Some(tag),
        iv: Some(iv.to_vec()),
        ..Default::default()
    })
}

/// Decrypts in chunks of [`CHUNK_SIZE`] bytes, yielding between them.
pub(crate) async fn decrypt_chunked(
    bits: usize,
    key: &[u8],
    ciphertext: &[u8],
    props: &Props,
) -> Result<Output> {
    let iv = required_iv(props)?;
    let aad = props.aad.as_deref().unwrap_or_default();
    let tag = check_tag(props.tag.as_deref())?;

    let mut stream = GcmStream::new(Mode::Decrypt, bits, key, iv, aad, ciphertext.len())?;
    for chunk in ciphertext.chunks(CHUNK_SIZE) {
        stream.update(chunk)?;
        embassy_futures::yield_now().await;
    }
    Ok(Output::data(stream.finish_decrypt(tag)?))
}

/// `A*GCMKW`: the IV is generated when absent, and the IV and tag are
/// returned as header members.
fn wrap(bits: usize, kek: &[u8], cek: &[u8], props: &Props) -> Result<Output> {
    let mut props = props.clone();
    props.aad = None;
    let iv = props.iv.get_or_insert_with(|| random_bytes(IV_SIZE)).clone();

    let mut output = encrypt(bits, kek, cek, &props)?;
    let tag = output.tag.take().unwrap_or_default();
    output
        .header
        .insert("iv".to_owned(), Value::String(base64_url_encode(&iv)));
    output
        .header
        .insert("tag".to_owned(), Value::String(base64_url_encode(&tag)));
    output.iv = None;
    Ok(output)
}

fn unwrap(bits: usize, kek: &[u8], wrapped: &[u8], props: &Props) -> Result<Output> {
    let mut props = props.clone();
    props.aad = None;
    decrypt(bits, kek, wrapped, &props)
}

pub(crate) fn register(builder: &mut RegistryBuilder) {
    for bits in [128, 192, 256] {
        let content = format!("A{bits}GCM");
        builder.register(Operation::Encrypt, &content, move |key, data, props| {
            encrypt(bits, require_key(key)?.oct()?, data, props)
        });
        builder.register(Operation::Decrypt, &content, move |key, data, props| {
            decrypt(bits, require_key(key)?.oct()?, data, props)
        });

        let wrapping = format!("A{bits}GCMKW");
        builder.register(Operation::Encrypt, &wrapping, move |key, data, props| {
            wrap(bits, require_key(key)?.oct()?, data, props)
        });
        builder.register(Operation::Decrypt, &wrapping, move |key, data, props| {
            unwrap(bits, require_key(key)?.oct()?, data, props)
        });
    }
}
