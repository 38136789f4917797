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

//! Password based key wrapping (`PBES2-HS256+A128KW`, `PBES2-HS384+A192KW`,
//! `PBES2-HS512+A256KW`) and plain PBKDF2 derivation (`PBKDF2-SHA-256` etc.).

use bherror::{
    traits::{ErrorContext as _, ForeignError as _},
    Error,
};
use openssl::pkcs5::pbkdf2_hmac;
use serde_json::Value;

use crate::{
    aes_kw,
    backend::KeyWrap,
    registry::require_key,
    utils::{base64_url_encode, random_bytes},
    AlgorithmError, HashAlgorithm, Operation, Output, Props, RegistryBuilder, Result,
};

/// The `p2s` size used when none is given.
pub const DEFAULT_SALT_SIZE: usize = 16;
/// The `p2c` used when none is given.
pub const DEFAULT_ITERATIONS: u32 = 8192;
/// The largest `p2c` accepted by the PBES2 algorithms.  `p2c` arrives in the
/// JWE header, so it bounds the work a single token can demand.
pub const MAX_ITERATIONS: u32 = 1_000_000;

const MIN_SALT_SIZE: usize = 8;

/// PBKDF2 with HMAC over `hash`, producing `len` bytes.
pub(crate) fn pbkdf2(
    hash: HashAlgorithm,
    password: &[u8],
    salt: &[u8],
    iterations: u32,
    len: usize,
) -> Result<Vec<u8>> {
    if iterations == 0 {
        return Err(Error::root(AlgorithmError::InvalidInput(
            "iteration count must be positive".to_owned(),
        )));
    }

    let mut key = vec![0u8; len];
    pbkdf2_hmac(
        password,
        salt,
        iterations as usize,
        hash.message_digest(),
        &mut key,
    )
    .foreign_err(|| AlgorithmError::CryptoBackend)?;
    Ok(key)
}

#[derive(Clone, Copy)]
struct Pbes2 {
    hash: HashAlgorithm,
    kw_bits: usize,
}

impl Pbes2 {
    fn name(&self) -> String {
        format!("PBES2-HS{}+A{}KW", self.hash.size() * 8, self.kw_bits)
    }

    /// `UTF8(alg) || 0x00 || p2s`
    fn salt(&self, p2s: &[u8]) -> Result<Vec<u8>> {
        if p2s.len() < MIN_SALT_SIZE {
            return Err(Error::root(AlgorithmError::InvalidInput(format!(
                "p2s must be at least {MIN_SALT_SIZE} bytes"
            ))));
        }

        let mut salt = self.name().into_bytes();
        salt.push(0x00);
        salt.extend_from_slice(p2s);
        Ok(salt)
    }

    fn kek(&self, password: &[u8], p2s: &[u8], p2c: u32) -> Result<Vec<u8>> {
        if p2c > MAX_ITERATIONS {
            return Err(Error::root(AlgorithmError::InvalidInput(format!(
                "p2c must be at most {MAX_ITERATIONS}"
            ))));
        }
        pbkdf2(self.hash, password, &self.salt(p2s)?, p2c, self.kw_bits / 8)
            .ctx(|| format!("deriving the {} key", self.name()))
    }

    fn wrap(&self, kw: &dyn KeyWrap, password: &[u8], cek: &[u8], props: &Props) -> Result<Output> {
        let p2s = props
            .p2s
            .clone()
            .unwrap_or_else(|| random_bytes(DEFAULT_SALT_SIZE));
        let p2c = props.p2c.unwrap_or(DEFAULT_ITERATIONS);

        let kek = self.kek(password, &p2s, p2c)?;
        let mut output = Output::data(aes_kw::wrap(kw, self.kw_bits, &kek, cek)?);
        output
            .header
            .insert("p2s".to_owned(), Value::String(base64_url_encode(&p2s)));
        output.header.insert("p2c".to_owned(), Value::from(p2c));
        Ok(output)
    }

    fn unwrap(
        &self,
        kw: &dyn KeyWrap,
        password: &[u8],
        wrapped: &[u8],
        props: &Props,
    ) -> Result<Output> {
        let p2s = props
            .p2s
            .as_deref()
            .ok_or_else(|| Error::root(AlgorithmError::InvalidInput("missing p2s".to_owned())))?;
        let p2c = props
            .p2c
            .ok_or_else(|| Error::root(AlgorithmError::InvalidInput("missing p2c".to_owned())))?;

        let kek = self.kek(password, p2s, p2c)?;
        Ok(Output::data(aes_kw::unwrap(kw, self.kw_bits, &kek, wrapped)?))
    }
}

pub(crate) fn register(builder: &mut RegistryBuilder) {
    let kw = builder.backend().key_wrap();

    for (hash, kw_bits) in [
        (HashAlgorithm::Sha256, 128),
        (HashAlgorithm::Sha384, 192),
        (HashAlgorithm::Sha512, 256),
    ] {
        let alg = Pbes2 { hash, kw_bits };
        let name = alg.name();

        builder.register(Operation::Encrypt, &name, move |key, data, props| {
            alg.wrap(kw, require_key(key)?.oct()?, data, props)
        });
        builder.register(Operation::Decrypt, &name, move |key, data, props| {
            alg.unwrap(kw, require_key(key)?.oct()?, data, props)
        });

        builder.register(
            Operation::Derive,
            &format!("PBKDF2-{}", hash.name()),
            move |key, _, props| {
                let password = require_key(key)?.oct()?;
                let salt = props.salt.as_deref().unwrap_or_default();
                let iterations = props.p2c.unwrap_or(DEFAULT_ITERATIONS);
                let len = props.length.unwrap_or(hash.size() * 8) / 8;
                Ok(Output::data(pbkdf2(hash, password, salt, iterations, len)?))
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{utils::base64_url_decode, Backend, KeyMaterial, Registry};

    const PASSWORD: &[u8] = b"Thus from my lips, by yours, my sin is purged.";

    #[test]
    fn test_rfc7517_appendix_c() {
        let cek = [
            111, 27, 25, 52, 66, 29, 20, 78, 92, 176, 56, 240, 65, 208, 82, 112, 161, 131, 36, 55,
            202, 236, 185, 172, 129, 23, 153, 194, 195, 48, 253, 182,
        ];
        let props = Props {
            p2s: Some(base64_url_decode("2WCTcJZ1Rvd_CJuJripQ1w").unwrap()),
            p2c: Some(4096),
            ..Default::default()
        };
        let password = KeyMaterial::Oct(PASSWORD.to_vec());

        for backend in Backend::available() {
            let registry = Registry::new(backend);
            let output = registry
                .dispatch(
                    Operation::Encrypt,
                    "PBES2-HS256+A128KW",
                    Some(&password),
                    &cek,
                    &props,
                )
                .unwrap();

            assert_eq!(
                base64_url_encode(&output.data),
                "TrqXOwuNUfDV9VPTNbyGvEJ9JMjefAVn-TR1uIxR9p6hsRQh9Tk7BA"
            );
            assert_eq!(output.header["p2s"], "2WCTcJZ1Rvd_CJuJripQ1w");
            assert_eq!(output.header["p2c"], 4096);

            let unwrapped = registry
                .dispatch(
                    Operation::Decrypt,
                    "PBES2-HS256+A128KW",
                    Some(&password),
                    &output.data,
                    &props,
                )
                .unwrap();
            assert_eq!(unwrapped.data, cek);
        }
    }

    #[test]
    fn test_defaults_are_generated() {
        let registry = Registry::default();
        let password = KeyMaterial::Oct(PASSWORD.to_vec());
        let output = registry
            .dispatch(
                Operation::Encrypt,
                "PBES2-HS512+A256KW",
                Some(&password),
                &[0x42; 64],
                &Props::default(),
            )
            .unwrap();

        let p2s = base64_url_decode(output.header["p2s"].as_str().unwrap()).unwrap();
        assert_eq!(p2s.len(), DEFAULT_SALT_SIZE);
        assert_eq!(output.header["p2c"], DEFAULT_ITERATIONS);
    }

    #[test]
    fn test_invalid_parameters() {
        let alg = Pbes2 {
            hash: HashAlgorithm::Sha256,
            kw_bits: 128,
        };
        let kw = Backend::Software.key_wrap();

        let short_salt = Props {
            p2s: Some(vec![0; 7]),
            ..Default::default()
        };
        let error = alg.wrap(kw, PASSWORD, &[0; 16], &short_salt).unwrap_err();
        assert!(matches!(error.error, AlgorithmError::InvalidInput(_)));

        let no_iterations = Props {
            p2c: Some(0),
            ..Default::default()
        };
        let error = alg.wrap(kw, PASSWORD, &[0; 16], &no_iterations).unwrap_err();
        assert!(matches!(error.error, AlgorithmError::InvalidInput(_)));
    }

    #[test]
    fn test_iteration_count_is_bounded() {
        let alg = Pbes2 {
            hash: HashAlgorithm::Sha512,
            kw_bits: 256,
        };
        let kw = Backend::Software.key_wrap();
        let props = |p2c| Props {
            p2s: Some(vec![0x11; DEFAULT_SALT_SIZE]),
            p2c: Some(p2c),
            ..Default::default()
        };

        let start = std::time::Instant::now();
        for p2c in [MAX_ITERATIONS + 1, u32::MAX] {
            let error = alg.unwrap(kw, PASSWORD, &[0; 40], &props(p2c)).unwrap_err();
            assert!(matches!(error.error, AlgorithmError::InvalidInput(_)));
            let error = alg.wrap(kw, PASSWORD, &[0; 32], &props(p2c)).unwrap_err();
            assert!(matches!(error.error, AlgorithmError::InvalidInput(_)));
        }
        // rejected before any key derivation
        assert!(start.elapsed() < std::time::Duration::from_secs(1));
    }

    #[test]
    fn test_pbkdf2_derive() {
        let props = Props {
            salt: Some(b"salt".to_vec()),
            p2c: Some(4096),
            length: Some(256),
            ..Default::default()
        };
        let output = Registry::default()
            .dispatch(
                Operation::Derive,
                "PBKDF2-SHA-256",
                Some(&KeyMaterial::Oct(b"password".to_vec())),
                &[],
                &props,
            )
            .unwrap();
        assert_eq!(
            hex::encode(output.data),
            "c5e478d59288c841aa530db6845c4c8d962893a001ce4e11a4963873aa98134a"
        );
    }
}
