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

//! RSA key encryption (`RSA1_5`, `RSA-OAEP`, `RSA-OAEP-256`).

use bherror::{traits::ForeignError as _, Error};
use openssl::{
    encrypt::{Decrypter, Encrypter},
    rsa::Padding,
};

use crate::{
    registry::require_key, AlgorithmError, HashAlgorithm, Operation, Output, RegistryBuilder,
    RsaComponents, Result,
};

#[derive(Clone, Copy)]
enum RsaPadding {
    Pkcs1,
    Oaep(HashAlgorithm),
}

impl RsaPadding {
    fn name(&self) -> &'static str {
        match self {
            Self::Pkcs1 => "RSA1_5",
            Self::Oaep(HashAlgorithm::Sha256) => "RSA-OAEP-256",
            Self::Oaep(_) => "RSA-OAEP",
        }
    }
}

fn encrypt(padding: RsaPadding, key: &RsaComponents, data: &[u8]) -> Result<Vec<u8>> {
    let pkey = key.public_pkey()?;
    let mut encrypter = Encrypter::new(&pkey).foreign_err(|| AlgorithmError::CryptoBackend)?;

    match padding {
        RsaPadding::Pkcs1 => encrypter
            .set_rsa_padding(Padding::PKCS1)
            .foreign_err(|| AlgorithmError::CryptoBackend)?,
        RsaPadding::Oaep(hash) => {
            encrypter
                .set_rsa_padding(Padding::PKCS1_OAEP)
                .foreign_err(|| AlgorithmError::CryptoBackend)?;
            encrypter
                .set_rsa_oaep_md(hash.message_digest())
                .foreign_err(|| AlgorithmError::CryptoBackend)?;
            encrypter
                .set_rsa_mgf1_md(hash.message_digest())
                .foreign_err(|| AlgorithmError::CryptoBackend)?;
        }
    }

    let len = encrypter
        .encrypt_len(data)
        .foreign_err(|| AlgorithmError::CryptoBackend)?;
    let mut out = vec![0u8; len];
    let written = encrypter
        .encrypt(data, &mut out)
        .foreign_err(|| AlgorithmError::InvalidInput("input too long for the key".to_owned()))?;
    out.truncate(written);
    Ok(out)
}

fn decrypt(padding: RsaPadding, key: &RsaComponents, data: &[u8]) -> Result<Vec<u8>> {
    let pkey = key.private_pkey()?;
    let mut decrypter = Decrypter::new(&pkey).foreign_err(|| AlgorithmError::CryptoBackend)?;

    match padding {
        RsaPadding::Pkcs1 => decrypter
            .set_rsa_padding(Padding::PKCS1)
            .foreign_err(|| AlgorithmError::CryptoBackend)?,
        RsaPadding::Oaep(hash) => {
            decrypter
                .set_rsa_padding(Padding::PKCS1_OAEP)
                .foreign_err(|| AlgorithmError::CryptoBackend)?;
            decrypter
                .set_rsa_oaep_md(hash.message_digest())
                .foreign_err(|| AlgorithmError::CryptoBackend)?;
            decrypter
                .set_rsa_mgf1_md(hash.message_digest())
                .foreign_err(|| AlgorithmError::CryptoBackend)?;
        }
    }

    let len = decrypter
        .decrypt_len(data)
        .foreign_err(|| AlgorithmError::CryptoBackend)?;
    let mut out = vec![0u8; len];
    // padding errors must look like any other failure
    let written = decrypter
        .decrypt(data, &mut out)
        .map_err(|_| Error::root(AlgorithmError::DecryptionFailed))?;
    out.truncate(written);
    Ok(out)
}

pub(crate) fn register(builder: &mut RegistryBuilder) {
    for padding in [
        RsaPadding::Pkcs1,
        RsaPadding::Oaep(HashAlgorithm::Sha1),
        RsaPadding::Oaep(HashAlgorithm::Sha256),
    ] {
        builder.register(Operation::Encrypt, padding.name(), move |key, data, _| {
            Ok(Output::data(encrypt(padding, require_key(key)?.rsa()?, data)?))
        });
        builder.register(Operation::Decrypt, padding.name(), move |key, data, _| {
            Ok(Output::data(decrypt(padding, require_key(key)?.rsa()?, data)?))
        });
    }
}
