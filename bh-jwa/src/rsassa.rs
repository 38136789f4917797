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

//! RSA signatures, PKCS #1 v1.5 (`RS256`, `RS384`, `RS512`) and PSS (`PS256`,
//! `PS384`, `PS512`).

use bherror::{
    traits::{ErrorContext as _, ForeignError as _},
    Error,
};
use openssl::{
    rsa::Padding,
    sign::{RsaPssSaltlen, Signer, Verifier},
};

use crate::{
    registry::require_key, AlgorithmError, HashAlgorithm, Operation, Output, RegistryBuilder,
    RsaComponents, Result,
};

#[derive(Clone, Copy)]
struct RsaSignature {
    pss: bool,
    hash: HashAlgorithm,
}

impl RsaSignature {
    fn name(&self) -> String {
        let prefix = if self.pss { "PS" } else { "RS" };
        format!("{prefix}{}", self.hash.size() * 8)
    }

    fn sign(&self, key: &RsaComponents, data: &[u8]) -> Result<Vec<u8>> {
        let pkey = key.private_pkey()?;
        let mut signer = Signer::new(self.hash.message_digest(), &pkey)
            .foreign_err(|| AlgorithmError::CryptoBackend)?;

        if self.pss {
            signer
                .set_rsa_padding(Padding::PKCS1_PSS)
                .foreign_err(|| AlgorithmError::CryptoBackend)?;
            // the salt is as long as the digest
            signer
                .set_rsa_pss_saltlen(RsaPssSaltlen::DIGEST_LENGTH)
                .foreign_err(|| AlgorithmError::CryptoBackend)?;
            signer
                .set_rsa_mgf1_md(self.hash.message_digest())
                .foreign_err(|| AlgorithmError::CryptoBackend)?;
        }

        signer
            .update(data)
            .foreign_err(|| AlgorithmError::CryptoBackend)?;
        signer
            .sign_to_vec()
            .foreign_err(|| AlgorithmError::CryptoBackend)
            .ctx(|| format!("signing with {}", self.name()))
    }

    fn verify(&self, key: &RsaComponents, data: &[u8], signature: &[u8]) -> Result<()> {
        let pkey = key.public_pkey()?;
        let mut verifier = Verifier::new(self.hash.message_digest(), &pkey)
            .foreign_err(|| AlgorithmError::CryptoBackend)?;

        if self.pss {
            verifier
                .set_rsa_padding(Padding::PKCS1_PSS)
                .foreign_err(|| AlgorithmError::CryptoBackend)?;
            verifier
                .set_rsa_pss_saltlen(RsaPssSaltlen::DIGEST_LENGTH)
                .foreign_err(|| AlgorithmError::CryptoBackend)?;
            verifier
                .set_rsa_mgf1_md(self.hash.message_digest())
                .foreign_err(|| AlgorithmError::CryptoBackend)?;
        }

        verifier
            .update(data)
            .foreign_err(|| AlgorithmError::CryptoBackend)?;
        match verifier.verify(signature) {
            Ok(true) => Ok(()),
            _ => Err(Error::root(AlgorithmError::VerificationFailed)),
        }
    }
}

pub(crate) fn register(builder: &mut RegistryBuilder) {
    for pss in [false, true] {
        for hash in [
            HashAlgorithm::Sha256,
            HashAlgorithm::Sha384,
            HashAlgorithm::Sha512,
        ] {
            let alg = RsaSignature { pss, hash };
            let name = alg.name();

            builder.register(Operation::Sign, &name, move |key, data, _| {
                Ok(Output::data(alg.sign(require_key(key)?.rsa()?, data)?))
            });
            builder.register(Operation::Verify, &name, move |key, data, props| {
                let signature = props.signature.as_deref().unwrap_or_default();
                alg.verify(require_key(key)?.rsa()?, data, signature)?;
                Ok(Output::default())
            });
        }
    }
}
