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

//! Elliptic curve key agreement.
//!
//! * `ECDH`, `ECDH-HKDF-SHA-*`, `ECDH-CONCAT-SHA-*` derive a shared secret
//!   between the private key and the peer public key in [`Props::epk`].
//! * `ECDH-ES` and `ECDH-ES+A*KW` are the JWE key agreement algorithms of
//!   RFC 7518 section 4.6.
//!
//! Peer points are validated (on the curve, in the prime order subgroup)
//! before any agreement takes place.

use bherror::{
    traits::{ErrorContext as _, ForeignError as _},
    Error,
};
use openssl::derive::Deriver;
use serde_json::Value;

use crate::{
    aes_kw,
    backend::KeyWrap,
    content_key_size,
    kdf::{concat_kdf, hkdf, output_len},
    registry::require_key,
    utils::base64_url_encode,
    AlgorithmError, EcComponents, HashAlgorithm, Operation, Output, Props, RegistryBuilder,
    Result,
};

/// Raw ECDH: the `x` coordinate of the shared point, as many bytes as a
/// coordinate of the curve.
pub(crate) fn agree(private: &EcComponents, public: &EcComponents) -> Result<Vec<u8>> {
    if private.curve != public.curve {
        return Err(Error::root(AlgorithmError::ImproperKey)).ctx(|| {
            format!(
                "cannot agree between {} and {}",
                private.curve.name(),
                public.curve.name()
            )
        });
    }

    let private = private.private_pkey()?;
    // validates the peer point
    let public = public.public_pkey()?;

    let mut deriver = Deriver::new(&private).foreign_err(|| AlgorithmError::CryptoBackend)?;
    deriver
        .set_peer(&public)
        .foreign_err(|| AlgorithmError::ImproperKey)?;
    deriver
        .derive_to_vec()
        .foreign_err(|| AlgorithmError::CryptoBackend)
}

fn peer(props: &Props) -> Result<&EcComponents> {
    props
        .epk
        .as_ref()
        .ok_or_else(|| Error::root(AlgorithmError::InvalidInput("missing peer key".to_owned())))
}

fn length_prefixed(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(data);
}

/// `AlgorithmID || PartyUInfo || PartyVInfo || SuppPubInfo`
fn other_info(alg_id: &str, apu: &[u8], apv: &[u8], bits: usize) -> Vec<u8> {
    let mut info = Vec::with_capacity(alg_id.len() + apu.len() + apv.len() + 16);
    length_prefixed(&mut info, alg_id.as_bytes());
    length_prefixed(&mut info, apu);
    length_prefixed(&mut info, apv);
    info.extend_from_slice(&(bits as u32).to_be_bytes());
    info
}

/// `ECDH-ES` with no key wrapping (the agreed key is the CEK) or with
/// `A*KW` wrapping.
#[derive(Clone, Copy)]
struct EcdhEs {
    kw_bits: Option<usize>,
}

impl EcdhEs {
    fn name(&self) -> String {
        match self.kw_bits {
            Some(bits) => format!("ECDH-ES+A{bits}KW"),
            None => "ECDH-ES".to_owned(),
        }
    }

    /// The agreed key: the CEK in direct mode, the KEK otherwise.
    fn agreed_key(
        &self,
        private: &EcComponents,
        public: &EcComponents,
        props: &Props,
    ) -> Result<Vec<u8>> {
        let (alg_id, bits) = match self.kw_bits {
            Some(bits) => (self.name(), bits),
            None => {
                let enc = props
                    .enc
                    .as_deref()
                    .ok_or_else(|| {
                        Error::root(AlgorithmError::InvalidInput(
                            "direct key agreement needs enc".to_owned(),
                        ))
                    })?;
                let bits = content_key_size(enc)
                    .ok_or_else(|| Error::root(AlgorithmError::UnsupportedAlgorithm(enc.to_owned())))?;
                (enc.to_owned(), bits)
            }
        };

        let z = agree(private, public)?;
        let info = other_info(
            &alg_id,
            props.apu.as_deref().unwrap_or_default(),
            props.apv.as_deref().unwrap_or_default(),
            bits,
        );
        concat_kdf(HashAlgorithm::Sha256, &z, &info, bits / 8)
    }

    fn wrap(
        &self,
        kw: &dyn KeyWrap,
        recipient: &EcComponents,
        cek: &[u8],
        props: &Props,
    ) -> Result<Output> {
        let ephemeral = match &props.epk {
            Some(epk) => epk.clone(),
            None => EcComponents::generate(recipient.curve)?,
        };
        let key = self.agreed_key(&ephemeral, recipient, props)?;

        let mut output = match self.kw_bits {
            Some(bits) => Output::data(aes_kw::wrap(kw, bits, &key, cek)?),
            None => Output {
                data: key,
                direct: true,
                ..Default::default()
            },
        };

        output
            .header
            .insert("epk".to_owned(), Value::Object(ephemeral.public_jwk()));
        if let Some(apu) = &props.apu {
            output
                .header
                .insert("apu".to_owned(), Value::String(base64_url_encode(apu)));
        }
        if let Some(apv) = &props.apv {
            output
                .header
                .insert("apv".to_owned(), Value::String(base64_url_encode(apv)));
        }
        Ok(output)
    }

    fn unwrap(
        &self,
        kw: &dyn KeyWrap,
        private: &EcComponents,
        wrapped: &[u8],
        props: &Props,
    ) -> Result<Output> {
        let key = self.agreed_key(private, peer(props)?, props)?;

        match self.kw_bits {
            Some(bits) => Ok(Output::data(aes_kw::unwrap(kw, bits, &key, wrapped)?)),
            None => Ok(Output {
                data: key,
                direct: true,
                ..Default::default()
            }),
        }
    }
}

pub(crate) fn register(builder: &mut RegistryBuilder) {
    let kw = builder.backend().key_wrap();
    let kdf = builder.backend().hkdf();

    builder.register(Operation::Derive, "ECDH", |key, _, props| {
        let private = require_key(key)?.ec()?;
        Ok(Output::data(agree(private, peer(props)?)?))
    });

    for hash in [
        HashAlgorithm::Sha256,
        HashAlgorithm::Sha384,
        HashAlgorithm::Sha512,
    ] {
        builder.register(
            Operation::Derive,
            &format!("ECDH-HKDF-{}", hash.name()),
            move |key, _, props| {
                let z = agree(require_key(key)?.ec()?, peer(props)?)?;
                let len = output_len(hash, props.length)?;
                let info = props.info.as_deref().unwrap_or_default();
                Ok(Output::data(hkdf(
                    kdf,
                    hash,
                    &z,
                    props.salt.as_deref(),
                    info,
                    len,
                )?))
            },
        );
        builder.register(
            Operation::Derive,
            &format!("ECDH-CONCAT-{}", hash.name()),
            move |key, _, props| {
                let z = agree(require_key(key)?.ec()?, peer(props)?)?;
                let len = output_len(hash, props.length)?;
                let other_info = props.other_info.as_deref().unwrap_or_default();
                Ok(Output::data(concat_kdf(hash, &z, other_info, len)?))
            },
        );
    }

    for kw_bits in [None, Some(128), Some(192), Some(256)] {
        let alg = EcdhEs { kw_bits };
        let name = alg.name();

        builder.register(Operation::Encrypt, &name, move |key, data, props| {
            alg.wrap(kw, require_key(key)?.ec()?, data, props)
        });
        builder.register(Operation::Decrypt, &name, move |key, data, props| {
            alg.unwrap(kw, require_key(key)?.ec()?, data, props)
        });
    }
}
