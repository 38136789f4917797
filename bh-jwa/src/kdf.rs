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

//! Key derivation: HKDF (RFC 5869) and the single-step Concat KDF of NIST
//! SP 800-56A.

use bherror::Error;
#[cfg(feature = "native")]
use bherror::traits::ForeignError as _;

use crate::{
    backend::Hkdf, hmac::hmac, registry::require_key, AlgorithmError, HashAlgorithm, Operation,
    Output, RegistryBuilder, Result,
};

/// HKDF extract-and-expand with the implementation `kdf`, producing `len`
/// bytes.
pub(crate) fn hkdf(
    kdf: &dyn Hkdf,
    hash: HashAlgorithm,
    ikm: &[u8],
    salt: Option<&[u8]>,
    info: &[u8],
    len: usize,
) -> Result<Vec<u8>> {
    if len > 255 * hash.size() {
        return Err(Error::root(AlgorithmError::InvalidInput(format!(
            "HKDF output limited to {} bytes",
            255 * hash.size()
        ))));
    }

    kdf.derive(hash, ikm, salt, info, len)
}

/// HKDF built on [`hmac`].
pub struct SoftwareHkdf;

impl Hkdf for SoftwareHkdf {
    fn derive(
        &self,
        hash: HashAlgorithm,
        ikm: &[u8],
        salt: Option<&[u8]>,
        info: &[u8],
        len: usize,
    ) -> Result<Vec<u8>> {
        let zeros = vec![0u8; hash.size()];
        let prk = hmac(hash, salt.unwrap_or(&zeros[..]), ikm, true)?;

        let mut okm = Vec::with_capacity(len + hash.size());
        let mut block: Vec<u8> = Vec::new();
        let mut counter = 1u8;
        while okm.len() < len {
            let input = [&block[..], info, &[counter][..]].concat();
            block = hmac(hash, &prk, &input, true)?;
            okm.extend_from_slice(&block);
            counter = counter.wrapping_add(1);
        }

        okm.truncate(len);
        Ok(okm)
    }
}

/// OpenSSL's `HKDF` key derivation.
#[cfg(feature = "native")]
pub struct NativeHkdf;

#[cfg(feature = "native")]
impl Hkdf for NativeHkdf {
    fn derive(
        &self,
        hash: HashAlgorithm,
        ikm: &[u8],
        salt: Option<&[u8]>,
        info: &[u8],
        len: usize,
    ) -> Result<Vec<u8>> {
        use openssl::{pkey::Id, pkey_ctx::PkeyCtx};

        // OpenSSL refuses an empty key
        if ikm.is_empty() {
            return SoftwareHkdf.derive(hash, ikm, salt, info, len);
        }

        let mut ctx = PkeyCtx::new_id(Id::HKDF).foreign_err(|| AlgorithmError::CryptoBackend)?;
        ctx.derive_init()
            .foreign_err(|| AlgorithmError::CryptoBackend)?;
        ctx.set_hkdf_md(hash.md())
            .foreign_err(|| AlgorithmError::CryptoBackend)?;
        ctx.set_hkdf_key(ikm)
            .foreign_err(|| AlgorithmError::CryptoBackend)?;
        if let Some(salt) = salt.filter(|salt| !salt.is_empty()) {
            ctx.set_hkdf_salt(salt)
                .foreign_err(|| AlgorithmError::CryptoBackend)?;
        }
        if !info.is_empty() {
            ctx.add_hkdf_info(info)
                .foreign_err(|| AlgorithmError::CryptoBackend)?;
        }

        let mut okm = vec![0u8; len];
        let written = ctx
            .derive(Some(&mut okm))
            .foreign_err(|| AlgorithmError::CryptoBackend)?;
        okm.truncate(written);
        Ok(okm)
    }
}

/// Concat KDF: `H(counter || Z || OtherInfo)` for `counter = 1, 2, ...`,
/// truncated to `len` bytes.
pub(crate) fn concat_kdf(
    hash: HashAlgorithm,
    z: &[u8],
    other_info: &[u8],
    len: usize,
) -> Result<Vec<u8>> {
    let mut output = Vec::with_capacity(len + hash.size());
    let mut counter = 1u32;
    while output.len() < len {
        let input = [&counter.to_be_bytes()[..], z, other_info].concat();
        output.extend_from_slice(&hash.digest(&input)?);
        counter += 1;
    }

    output.truncate(len);
    Ok(output)
}

/// Requested output length in bytes, the hash size by default.
pub(crate) fn output_len(hash: HashAlgorithm, length: Option<usize>) -> Result<usize> {
    match length {
        None => Ok(hash.size()),
        Some(bits) if bits > 0 && bits % 8 == 0 => Ok(bits / 8),
        Some(bits) => Err(Error::root(AlgorithmError::InvalidInput(format!(
            "cannot derive {bits} bits"
        )))),
    }
}

pub(crate) fn register(builder: &mut RegistryBuilder) {
    let kdf = builder.backend().hkdf();

    for hash in [
        HashAlgorithm::Sha256,
        HashAlgorithm::Sha384,
        HashAlgorithm::Sha512,
    ] {
        builder.register(
            Operation::Derive,
            &format!("HKDF-{}", hash.name()),
            move |key, _, props| {
                let ikm = require_key(key)?.oct()?;
                let len = output_len(hash, props.length)?;
                let info = props.info.as_deref().unwrap_or_default();
                Ok(Output::data(hkdf(
                    kdf,
                    hash,
                    ikm,
                    props.salt.as_deref(),
                    info,
                    len,
                )?))
            },
        );

        builder.register(
            Operation::Derive,
            &format!("CONCAT-{}", hash.name()),
            move |key, _, props| {
                let z = require_key(key)?.oct()?;
                let len = output_len(hash, props.length)?;
                let other_info = props.other_info.as_deref().unwrap_or_default();
                Ok(Output::data(concat_kdf(hash, z, other_info, len)?))
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Backend, KeyMaterial, Props, Registry};

    #[test]
    fn test_rfc5869_case_1() {
        let props = Props {
            salt: Some((0x00..=0x0c).collect()),
            info: Some((0xf0..=0xf9).collect()),
            length: Some(42 * 8),
            ..Default::default()
        };
        let output = Registry::default()
            .dispatch(
                Operation::Derive,
                "HKDF-SHA-256",
                Some(&KeyMaterial::Oct(vec![0x0b; 22])),
                &[],
                &props,
            )
            .unwrap();

        assert_eq!(
            hex::encode(output.data),
            "3cb25f25faacd57a90434f64d0362f2a2d2d0a90cf1a5a4c5db02d56ecc4c5bf\
             34007208d5b887185865"
        );
    }

    #[test]
    fn test_concat_kdf_multiple_rounds() {
        let z: Vec<u8> = (0..32).collect();
        let output = concat_kdf(HashAlgorithm::Sha256, &z, b"info", 48).unwrap();
        assert_eq!(
            hex::encode(output),
            "c3d6e2a35ac18f4771d72ff4a7e577ea7b98ae7fa6b6f165bbd17d7c1a24b91f\
             4660044d61757df590f5fbb2b7094ed3"
        );
    }

    #[test]
    fn test_output_length() {
        assert_eq!(output_len(HashAlgorithm::Sha384, None).unwrap(), 48);
        assert_eq!(output_len(HashAlgorithm::Sha384, Some(128)).unwrap(), 16);
        assert!(output_len(HashAlgorithm::Sha384, Some(127)).is_err());

        for backend in Backend::available() {
            let error = hkdf(
                backend.hkdf(),
                HashAlgorithm::Sha256,
                b"ikm",
                None,
                b"",
                255 * 32 + 1,
            )
            .unwrap_err();
            assert!(matches!(error.error, AlgorithmError::InvalidInput(_)));
        }
    }

    #[test]
    fn test_hkdf_backends_agree() {
        let ikm = [0x0b; 22];
        let salt: Vec<u8> = (0x00..=0x0c).collect();
        let info: Vec<u8> = (0xf0..=0xf9).collect();
        let cases: [(HashAlgorithm, &[u8], Option<&[u8]>, &[u8], usize); 5] = [
            (HashAlgorithm::Sha256, &ikm[..], Some(&salt[..]), &info[..], 42),
            // RFC 5869 test case 3
            (HashAlgorithm::Sha256, &ikm[..], None, &b""[..], 42),
            (HashAlgorithm::Sha384, &b"secret"[..], Some(&b""[..]), &b"ctx"[..], 48 * 3),
            (HashAlgorithm::Sha512, &b"secret"[..], None, &info[..], 1),
            (HashAlgorithm::Sha256, &b""[..], Some(&salt[..]), &info[..], 32),
        ];

        for (hash, ikm, salt, info, len) in cases {
            let expected = SoftwareHkdf.derive(hash, ikm, salt, info, len).unwrap();
            assert_eq!(expected.len(), len);
            for backend in Backend::available() {
                let okm = hkdf(backend.hkdf(), hash, ikm, salt, info, len).unwrap();
                assert_eq!(okm, expected, "{backend:?} {hash:?}");
            }
        }

        let okm = SoftwareHkdf
            .derive(HashAlgorithm::Sha256, &ikm, None, b"", 42)
            .unwrap();
        assert_eq!(
            hex::encode(okm),
            "8da4e775a563c18f715f802a063c5a31b8a11f5c5ee1879ec3454e5f3c738d2d\
             9d201395faa4b61a96c8"
        );
    }
}
