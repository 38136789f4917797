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

//! AES Key Wrap (`A128KW`, `A192KW`, `A256KW`), RFC 3394.

use bherror::{
    traits::{ErrorContext as _, ForeignError as _},
    Error,
};
use openssl::symm::{Cipher, Crypter, Mode};

use crate::{
    backend::KeyWrap, utils::constant_time_eq, AlgorithmError, Operation, Output,
    RegistryBuilder, Result,
};

/// The default initial value `A0`.
const DEFAULT_IV: [u8; 8] = [0xA6; 8];

const BLOCK: usize = 8;

/// The portable RFC 3394 implementation over single AES block operations.
pub struct SoftwareKeyWrap;

impl SoftwareKeyWrap {
    fn ecb(kek: &[u8], mode: Mode) -> Result<Crypter> {
        let cipher = ecb_cipher(kek.len())?;
        let mut crypter =
            Crypter::new(cipher, mode, kek, None).foreign_err(|| AlgorithmError::CryptoBackend)?;
        crypter.pad(false);
        Ok(crypter)
    }
}

fn aes_block(crypter: &mut Crypter, input: &[u8; 16]) -> Result<[u8; 16]> {
    let mut out = [0u8; 32];
    let written = crypter
        .update(input, &mut out)
        .foreign_err(|| AlgorithmError::CryptoBackend)?;
    if written != 16 {
        return Err(Error::root(AlgorithmError::CryptoBackend))
            .ctx(|| format!("AES block operation returned {written} bytes"));
    }

    let mut block = [0u8; 16];
    block.copy_from_slice(&out[..16]);
    Ok(block)
}

impl KeyWrap for SoftwareKeyWrap {
    fn wrap(&self, kek: &[u8], key: &[u8]) -> Result<Vec<u8>> {
        let mut crypter = Self::ecb(kek, Mode::Encrypt)?;
        let n = key.len() / BLOCK;

        let mut a = DEFAULT_IV;
        let mut r: Vec<[u8; BLOCK]> = key
            .chunks_exact(BLOCK)
            .map(|chunk| {
                let mut block = [0u8; BLOCK];
                block.copy_from_slice(chunk);
                block
            })
            .collect();

        for j in 0..6 {
            for (i, ri) in r.iter_mut().enumerate() {
                let mut input = [0u8; 16];
                input[..BLOCK].copy_from_slice(&a);
                input[BLOCK..].copy_from_slice(ri);
                let b = aes_block(&mut crypter, &input)?;

                let t = ((n * j + i + 1) as u64).to_be_bytes();
                for k in 0..BLOCK {
                    a[k] = b[k] ^ t[k];
                }
                ri.copy_from_slice(&b[BLOCK..]);
            }
        }

        let mut wrapped = Vec::with_capacity(key.len() + BLOCK);
        wrapped.extend_from_slice(&a);
        r.iter().for_each(|block| wrapped.extend_from_slice(block));
        Ok(wrapped)
    }

    fn unwrap(&self, kek: &[u8], wrapped: &[u8]) -> Result<Vec<u8>> {
        let mut crypter = Self::ecb(kek, Mode::Decrypt)?;
        let n = wrapped.len() / BLOCK - 1;

        let mut a = [0u8; BLOCK];
        a.copy_from_slice(&wrapped[..BLOCK]);
        let mut r: Vec<[u8; BLOCK]> = wrapped[BLOCK..]
            .chunks_exact(BLOCK)
            .map(|chunk| {
                let mut block = [0u8; BLOCK];
                block.copy_from_slice(chunk);
                block
            })
            .collect();

        for j in (0..6).rev() {
            for (i, ri) in r.iter_mut().enumerate().rev() {
                let t = ((n * j + i + 1) as u64).to_be_bytes();
                let mut input = [0u8; 16];
                for k in 0..BLOCK {
                    input[k] = a[k] ^ t[k];
                }
                input[BLOCK..].copy_from_slice(ri);
                let b = aes_block(&mut crypter, &input)?;

                a.copy_from_slice(&b[..BLOCK]);
                ri.copy_from_slice(&b[BLOCK..]);
            }
        }

        if !constant_time_eq(&a, &DEFAULT_IV) {
            return Err(Error::root(AlgorithmError::DecryptionFailed));
        }

        Ok(r.concat())
    }
}

/// OpenSSL's `AES_wrap_key`/`AES_unwrap_key`.
#[cfg(feature = "native")]
pub struct NativeKeyWrap;

#[cfg(feature = "native")]
impl KeyWrap for NativeKeyWrap {
    fn wrap(&self, kek: &[u8], key: &[u8]) -> Result<Vec<u8>> {
        use openssl::aes::{wrap_key, AesKey};

        let kek = AesKey::new_encrypt(kek)
            .map_err(|_| Error::root(AlgorithmError::InvalidKeySize))?;
        let mut out = vec![0u8; key.len() + BLOCK];
        wrap_key(&kek, Some(DEFAULT_IV), &mut out, key)
            .map_err(|_| Error::root(AlgorithmError::CryptoBackend))?;
        Ok(out)
    }

    fn unwrap(&self, kek: &[u8], wrapped: &[u8]) -> Result<Vec<u8>> {
        use openssl::aes::{unwrap_key, AesKey};

        let kek = AesKey::new_decrypt(kek)
            .map_err(|_| Error::root(AlgorithmError::InvalidKeySize))?;
        let mut out = vec![0u8; wrapped.len() - BLOCK];
        unwrap_key(&kek, Some(DEFAULT_IV), &mut out, wrapped)
            .map_err(|_| Error::root(AlgorithmError::DecryptionFailed))?;
        Ok(out)
    }
}

fn ecb_cipher(kek_len: usize) -> Result<Cipher> {
    match kek_len {
        16 => Ok(Cipher::aes_128_ecb()),
        24 => Ok(Cipher::aes_192_ecb()),
        32 => Ok(Cipher::aes_256_ecb()),
        _ => Err(Error::root(AlgorithmError::InvalidKeySize)),
    }
}

fn check_kek(kek: &[u8], bits: usize) -> Result<()> {
    if kek.len() * 8 != bits {
        return Err(Error::root(AlgorithmError::InvalidKeySize))
            .ctx(|| format!("expected a {bits}-bit key, got {} bits", kek.len() * 8));
    }
    Ok(())
}

/// Wraps `key` with a `bits`-bit `kek`, validating the sizes first.
pub(crate) fn wrap(kw: &dyn KeyWrap, bits: usize, kek: &[u8], key: &[u8]) -> Result<Vec<u8>> {
    check_kek(kek, bits)?;
    if key.len() < 2 * BLOCK || key.len() % BLOCK != 0 {
        return Err(Error::root(AlgorithmError::InvalidInput(
            "key to wrap must be a multiple of 8 bytes, at least 16".to_owned(),
        )));
    }
    kw.wrap(kek, key)
}

/// Unwraps `wrapped` with a `bits`-bit `kek`, validating the sizes first.
pub(crate) fn unwrap(kw: &dyn KeyWrap, bits: usize, kek: &[u8], wrapped: &[u8]) -> Result<Vec<u8>> {
    check_kek(kek, bits)?;
    if wrapped.len() < 3 * BLOCK || wrapped.len() % BLOCK != 0 {
        return Err(Error::root(AlgorithmError::InvalidInput(
            "wrapped key must be a multiple of 8 bytes, at least 24".to_owned(),
        )));
    }
    kw.unwrap(kek, wrapped)
}

pub(crate) fn register(builder: &mut RegistryBuilder) {
    let kw = builder.backend().key_wrap();

    for bits in [128, 192, 256] {
        let name = format!("A{bits}KW");

        builder.register(Operation::Encrypt, &name, move |key, data, _| {
            let kek = crate::registry::require_key(key)?.oct()?;
            Ok(Output::data(wrap(kw, bits, kek, data)?))
        });
        builder.register(Operation::Decrypt, &name, move |key, data, _| {
            let kek = crate::registry::require_key(key)?.oct()?;
            Ok(Output::data(unwrap(kw, bits, kek, data)?))
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Backend;

    // RFC 3394, section 4
    const VECTORS: [(&str, &str, &str); 3] = [
        (
            "000102030405060708090A0B0C0D0E0F",
            "00112233445566778899AABBCCDDEEFF",
            "1FA68B0A8112B447AEF34BD8FB5A7B829D3E862371D2CFE5",
        ),
        (
            "000102030405060708090A0B0C0D0E0F1011121314151617",
            "00112233445566778899AABBCCDDEEFF",
            "96778B25AE6CA435F92B5B97C050AED2468AB8A17AD84E5D",
        ),
        (
            "000102030405060708090A0B0C0D0E0F101112131415161718191A1B1C1D1E1F",
            "00112233445566778899AABBCCDDEEFF0001020304050607",
            "A8F9BC1612C68B3FF6E6F4FBE30E71E4769C8B80A32CB8958CD5D17D6B254DA1",
        ),
    ];

    #[test]
    fn test_rfc3394_vectors_all_backends() {
        for backend in Backend::available() {
            let kw = backend.key_wrap();
            for (kek, key, expected) in VECTORS {
                let kek = hex::decode(kek).unwrap();
                let key = hex::decode(key).unwrap();
                let bits = kek.len() * 8;

                let wrapped = wrap(kw, bits, &kek, &key).unwrap();
                assert_eq!(hex::encode_upper(&wrapped), expected, "{backend:?}");
                assert_eq!(unwrap(kw, bits, &kek, &wrapped).unwrap(), key);
            }
        }
    }

    #[test]
    fn test_integrity_check_fails_closed() {
        let kek = hex::decode(VECTORS[0].0).unwrap();
        let mut wrapped = hex::decode(VECTORS[0].2).unwrap();
        wrapped[3] ^= 0x80;

        for backend in Backend::available() {
            let error = unwrap(backend.key_wrap(), 128, &kek, &wrapped).unwrap_err();
            assert_eq!(error.error, AlgorithmError::DecryptionFailed, "{backend:?}");
        }
    }

    #[test]
    fn test_sizes_are_validated() {
        let kw = Backend::Software.key_wrap();
        let kek = [0u8; 16];

        let error = wrap(kw, 256, &kek, &[0u8; 16]).unwrap_err();
        assert_eq!(error.error, AlgorithmError::InvalidKeySize);

        for len in [0, 8, 20] {
            let error = wrap(kw, 128, &kek, &vec![0u8; len]).unwrap_err();
            assert!(matches!(error.error, AlgorithmError::InvalidInput(_)));
        }

        let error = unwrap(kw, 128, &kek, &[0u8; 16]).unwrap_err();
        assert!(matches!(error.error, AlgorithmError::InvalidInput(_)));
    }
}
