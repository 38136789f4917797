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

//! HMAC (`HS1`, `HS256`, `HS384`, `HS512`).

use bherror::{
    traits::{ErrorContext as _, ForeignError as _},
    Error,
};
use openssl::{pkey::PKey, sign::Signer};

use crate::{
    backend::TagCompare, registry::require_key, AlgorithmError, HashAlgorithm, Operation, Output,
    RegistryBuilder, Result,
};

/// Computes the full-length HMAC of `data`.
///
/// Unless `loose` is set, the key must be at least as long as the hash output.
pub(crate) fn hmac(hash: HashAlgorithm, key: &[u8], data: &[u8], loose: bool) -> Result<Vec<u8>> {
    if !loose && key.len() < hash.size() {
        return Err(Error::root(AlgorithmError::InvalidKeySize)).ctx(|| {
            format!(
                "HMAC with {} needs at least {} key bytes",
                hash.name(),
                hash.size()
            )
        });
    }

    let pkey = PKey::hmac(key).foreign_err(|| AlgorithmError::CryptoBackend)?;
    let mut signer =
        Signer::new(hash.message_digest(), &pkey).foreign_err(|| AlgorithmError::CryptoBackend)?;
    signer
        .update(data)
        .foreign_err(|| AlgorithmError::CryptoBackend)?;
    signer
        .sign_to_vec()
        .foreign_err(|| AlgorithmError::CryptoBackend)
}

/// Recomputes the HMAC and compares all of it with `mac`.
pub(crate) fn verify(
    compare: &dyn TagCompare,
    hash: HashAlgorithm,
    key: &[u8],
    data: &[u8],
    mac: &[u8],
    loose: bool,
) -> Result<()> {
    let expected = hmac(hash, key, data, loose)?;
    if !compare.equal(&expected, mac) {
        return Err(Error::root(AlgorithmError::MacCheckFailed));
    }
    Ok(())
}

fn name(hash: HashAlgorithm) -> &'static str {
    match hash {
        HashAlgorithm::Sha1 => "HS1",
        HashAlgorithm::Sha256 => "HS256",
        HashAlgorithm::Sha384 => "HS384",
        HashAlgorithm::Sha512 => "HS512",
    }
}

pub(crate) fn register(builder: &mut RegistryBuilder) {
    let compare = builder.backend().tag_compare();

    for hash in HashAlgorithm::ALL {
        builder.register(Operation::Sign, name(hash), move |key, data, props| {
            let key = require_key(key)?.oct()?;
            Ok(Output::data(hmac(hash, key, data, props.loose)?))
        });
        builder.register(Operation::Verify, name(hash), move |key, data, props| {
            let key = require_key(key)?.oct()?;
            let mac = props
                .signature
                .as_deref()
                .ok_or_else(|| Error::root(AlgorithmError::MacCheckFailed))
                .ctx(|| "no MAC to verify")?;
            verify(compare, hash, key, data, mac, props.loose)?;
            Ok(Output::default())
        });
    }
}
