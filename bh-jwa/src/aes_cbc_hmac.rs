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

//! The composite AEAD `AES_CBC_HMAC_SHA2` (`A128CBC-HS256`, `A192CBC-HS384`,
//! `A256CBC-HS512`), RFC 7518 section 5.2.

use bherror::{traits::ErrorContext as _, Error};
use openssl::symm::{decrypt, encrypt, Cipher};

use crate::{
    backend::TagCompare, hmac, registry::require_key, AlgorithmError, HashAlgorithm, Operation,
    Output, Props, RegistryBuilder, Result,
};

const IV_SIZE: usize = 16;

/// One member of the family, identified by the size of each key half.
#[derive(Clone, Copy)]
struct CbcHmac {
    half: usize,
}

impl CbcHmac {
    fn name(&self) -> String {
        format!("A{}CBC-HS{}", self.half * 8, self.half * 16)
    }

    fn hash(&self) -> HashAlgorithm {
        match self.half {
            16 => HashAlgorithm::Sha256,
            24 => HashAlgorithm::Sha384,
            _ => HashAlgorithm::Sha512,
        }
    }

    fn cipher(&self) -> Cipher {
        match self.half {
            16 => Cipher::aes_128_cbc(),
            24 => Cipher::aes_192_cbc(),
            _ => Cipher::aes_256_cbc(),
        }
    }

    /// Splits the key into its MAC and encryption halves.
    fn split<'a>(&self, key: &'a [u8]) -> Result<(&'a [u8], &'a [u8])> {
        if key.len() != 2 * self.half {
            return Err(Error::root(AlgorithmError::InvalidKeySize)).ctx(|| {
                format!("{} needs a {}-bit key", self.name(), self.half * 16)
            });
        }
        Ok(key.split_at(self.half))
    }

    fn iv<'a>(&self, props: &'a Props) -> Result<&'a [u8]> {
        match props.iv.as_deref() {
            Some(iv) if iv.len() == IV_SIZE => Ok(iv),
            _ => Err(Error::root(AlgorithmError::InvalidIv))
                .ctx(|| format!("{} needs a {IV_SIZE}-byte iv", self.name())),
        }
    }

    /// `HMAC(AAD || IV || C || AL)` truncated to the size of a key half.
    fn tag(&self, mac_key: &[u8], aad: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
        let al = ((aad.len() as u64) * 8).to_be_bytes();
        let mac_input = [aad, iv, ciphertext, &al[..]].concat();

        let mut tag = hmac::hmac(self.hash(), mac_key, &mac_input, true)?;
        tag.truncate(self.half);
        Ok(tag)
    }

    fn encrypt(&self, key: &[u8], plaintext: &[u8], props: &Props) -> Result<Output> {
        let (mac_key, enc_key) = self.split(key)?;
        let iv = self.iv(props)?;
        let aad = props.aad.as_deref().unwrap_or_default();

        let ciphertext = encrypt(self.cipher(), enc_key, Some(iv), plaintext)
            .map_err(|_| Error::root(AlgorithmError::CryptoBackend))?;
        let tag = self.tag(mac_key, aad, iv, &ciphertext)?;

        Ok(Output {
            data: ciphertext,
            tag: Some(tag),
            iv: Some(iv.to_vec()),
            ..Default::default()
        })
    }

    fn decrypt(
        &self,
        compare: &dyn TagCompare,
        key: &[u8],
        ciphertext: &[u8],
        props: &Props,
    ) -> Result<Output> {
        let (mac_key, enc_key) = self.split(key)?;
        let iv = self.iv(props)?;
        let aad = props.aad.as_deref().unwrap_or_default();
        let tag = props.tag.as_deref().unwrap_or_default();

        // the tag is checked before any decryption is attempted
        let expected = self.tag(mac_key, aad, iv, ciphertext)?;
        if !compare.equal(&expected, tag) {
            return Err(Error::root(AlgorithmError::MacCheckFailed));
        }

        let plaintext = decrypt(self.cipher(), enc_key, Some(iv), ciphertext)
            .map_err(|_| Error::root(AlgorithmError::DecryptionFailed))?;
        Ok(Output::data(plaintext))
    }
}

pub(crate) fn register(builder: &mut RegistryBuilder) {
    let compare = builder.backend().tag_compare();

    for half in [16, 24, 32] {
        let alg = CbcHmac { half };
        let name = alg.name();

        builder.register(Operation::Encrypt, &name, move |key, data, props| {
            alg.encrypt(require_key(key)?.oct()?, data, props)
        });
        builder.register(Operation::Decrypt, &name, move |key, data, props| {
            alg.decrypt(compare, require_key(key)?.oct()?, data, props)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Backend, KeyMaterial, Registry};

    const PLAINTEXT: &[u8] = b"A cipher system must not be required to be secret, and it must \
                               be able to fall into the hands of the enemy without inconvenience";
    const AAD: &[u8] = b"The second principle of Auguste Kerckhoffs";
    const IV: &str = "1af38c2dc2b96ffdd86694092341bc04";

    // RFC 7518, Appendix B
    const VECTORS: [(&str, usize, &str, &str); 3] = [
        (
            "A128CBC-HS256",
            32,
            "c80edfa32ddf39d5ef00c0b468834279a2e46a1b8049f792f76bfe54b903a9c9\
             a94ac9b47ad2655c5f10f9aef71427e2fc6f9b3f399a221489f16362c7032336\
             09d45ac69864e3321cf82935ac4096c86e133314c54019e8ca7980dfa4b9cf1b\
             384c486f3a54c51078158ee5d79de59fbd34d848b3d69550a67646344427ade5\
             4b8851ffb598f7f80074b9473c82e2db",
            "652c3fa36b0a7c5b3219fab3a30bc1c4",
        ),
        (
            "A192CBC-HS384",
            48,
            "ea65da6b59e61edb419be62d19712ae5d303eeb50052d0dfd6697f77224c8edb\
             000d279bdc14c1072654bd30944230c657bed4ca0c9f4a8466f22b226d174621\
             4bf8cfc2400add9f5126e479663fc90b3bed787a2f0ffcbf3904be2a641d5c21\
             05bfe591bae23b1d7449e532eef60a9ac8bb6c6b01d35d49787bcd57ef484927\
             f280adc91ac0c4e79c7b11efc60054e3",
            "8490ac0e58949bfe51875d733f93ac2075168039ccc733d7",
        ),
        (
            "A256CBC-HS512",
            64,
            "4affaaadb78c31c5da4b1b590d10ffbd3dd8d5d302423526912da037ecbcc7bd\
             822c301dd67c373bccb584ad3e9279c2e6d12a1374b77f077553df829410446b\
             36ebd97066296ae6427ea75c2e0846a11a09ccf5370dc80bfecbad28c73f09b3\
             a3b75e662a2594410ae496b2e2e6609e31e6e02cc837f053d21f37ff4f51950b\
             be2638d09dd7a4930930806d0703b1f6",
            "4dd3b4c088a7f45c216839645b2012bf2e6269a8c56a816dbc1b267761955bc5",
        ),
    ];

    fn props() -> Props {
        Props::with_iv_aad(hex::decode(IV).unwrap(), AAD)
    }

    #[test]
    fn test_rfc7518_vectors() {
        for backend in Backend::available() {
            let registry = Registry::new(backend);

            for (alg, key_len, ciphertext, tag) in VECTORS {
                let key = KeyMaterial::Oct((0..key_len as u8).collect());

                let output = registry
                    .dispatch(Operation::Encrypt, alg, Some(&key), PLAINTEXT, &props())
                    .unwrap();
                assert_eq!(hex::encode(&output.data), ciphertext, "{alg}");
                assert_eq!(hex::encode(output.tag.as_ref().unwrap()), tag, "{alg}");

                let mut props = props();
                props.tag = output.tag;
                let plaintext = registry
                    .dispatch(Operation::Decrypt, alg, Some(&key), &output.data, &props)
                    .unwrap();
                assert_eq!(plaintext.data, PLAINTEXT);
            }
        }
    }

    #[test]
    fn test_tampering_fails_mac_check() {
        let registry = Registry::default();
        let key = KeyMaterial::Oct((0..32).collect());
        let output = registry
            .dispatch(Operation::Encrypt, "A128CBC-HS256", Some(&key), PLAINTEXT, &props())
            .unwrap();
        let tag = output.tag.unwrap();

        let mut tampered_tag = tag.clone();
        tampered_tag[15] ^= 0x01;
        let mut tampered_ciphertext = output.data.clone();
        tampered_ciphertext[0] ^= 0x01;

        let cases = [
            (output.data.clone(), tampered_tag),
            (output.data.clone(), tag[..8].to_vec()),
            (output.data.clone(), Vec::new()),
            (tampered_ciphertext, tag.clone()),
        ];

        for (ciphertext, tag) in cases {
            let mut props = props();
            props.tag = Some(tag);
            let error = registry
                .dispatch(Operation::Decrypt, "A128CBC-HS256", Some(&key), &ciphertext, &props)
                .unwrap_err();
            assert_eq!(error.error, AlgorithmError::MacCheckFailed);
        }
    }

    #[test]
    fn test_key_and_iv_sizes() {
        let registry = Registry::default();

        let short = KeyMaterial::Oct(vec![0; 16]);
        let error = registry
            .dispatch(Operation::Encrypt, "A128CBC-HS256", Some(&short), b"x", &props())
            .unwrap_err();
        assert_eq!(error.error, AlgorithmError::InvalidKeySize);

        let key = KeyMaterial::Oct(vec![0; 32]);
        let props = Props::with_iv_aad(vec![0; 12], Vec::new());
        let error = registry
            .dispatch(Operation::Encrypt, "A128CBC-HS256", Some(&key), b"x", &props)
            .unwrap_err();
        assert_eq!(error.error, AlgorithmError::InvalidIv);
    }
}
