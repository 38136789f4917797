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

//! ECDSA signatures (`ES256`, `ES384`, `ES512`) and the conversion between
//! the ASN.1 DER and the JOSE `r || s` signature encodings.

use bherror::{
    traits::{ErrorContext as _, ForeignError as _},
    Error,
};
use openssl::ecdsa::EcdsaSig;

use crate::{
    registry::require_key, AlgorithmError, Curve, EcComponents, Operation, Output,
    RegistryBuilder, Result,
};

const SEQUENCE: u8 = 0x30;
const INTEGER: u8 = 0x02;

fn malformed(reason: &'static str) -> Error<AlgorithmError> {
    Error::root(AlgorithmError::MalformedSignature).ctx(reason)
}

/// Reads a DER length in short form or in the one-byte long form.
fn read_length(input: &[u8]) -> Result<(usize, &[u8])> {
    match input {
        [len, rest @ ..] if *len < 0x80 => Ok((*len as usize, rest)),
        [0x81, len, rest @ ..] if *len >= 0x80 => Ok((*len as usize, rest)),
        _ => Err(malformed("unsupported length encoding")),
    }
}

/// Reads an `INTEGER` of at most `size` significant bytes and left-pads it to
/// `size` bytes.
fn read_integer(input: &[u8], size: usize) -> Result<(Vec<u8>, &[u8])> {
    let rest = match input {
        [INTEGER, rest @ ..] => rest,
        _ => return Err(malformed("expected an INTEGER tag")),
    };
    let (len, rest) = read_length(rest)?;
    if len == 0 || len > rest.len() {
        return Err(malformed("inconsistent INTEGER length"));
    }
    let (value, rest) = rest.split_at(len);

    if value[0] & 0x80 != 0 {
        return Err(malformed("negative INTEGER"));
    }
    let leading = value.iter().take_while(|b| **b == 0).count();
    let value = &value[leading..];
    if value.len() > size {
        return Err(malformed("INTEGER larger than the curve order"));
    }

    let mut padded = vec![0u8; size - value.len()];
    padded.extend_from_slice(value);
    Ok((padded, rest))
}

/// Converts an ASN.1 DER `ECDSA-Sig-Value` into the `r || s` encoding, each
/// integer taking `size` bytes.
pub fn der_to_concat(der: &[u8], size: usize) -> Result<Vec<u8>> {
    let rest = match der {
        [SEQUENCE, rest @ ..] => rest,
        _ => return Err(malformed("expected a SEQUENCE tag")),
    };
    let (len, rest) = read_length(rest)?;
    if len != rest.len() {
        return Err(malformed("inconsistent SEQUENCE length"));
    }

    let (r, rest) = read_integer(rest, size)?;
    let (s, rest) = read_integer(rest, size)?;
    if !rest.is_empty() {
        return Err(malformed("trailing bytes after the signature"));
    }

    Ok([r, s].concat())
}

fn write_integer(out: &mut Vec<u8>, value: &[u8]) {
    let leading = value.iter().take_while(|b| **b == 0).count();
    // zero is encoded as a single zero byte
    let value = &value[leading.min(value.len().saturating_sub(1))..];
    let pad = value.first().is_some_and(|b| b & 0x80 != 0);

    out.push(INTEGER);
    out.push((value.len() + pad as usize) as u8);
    if pad {
        out.push(0x00);
    }
    out.extend_from_slice(value);
}

/// Converts an `r || s` signature with `size`-byte integers into ASN.1 DER.
pub fn concat_to_der(signature: &[u8], size: usize) -> Result<Vec<u8>> {
    if size == 0 || signature.len() != 2 * size {
        return Err(malformed("signature length does not match the curve"));
    }
    let (r, s) = signature.split_at(size);

    let mut body = Vec::with_capacity(signature.len() + 6);
    write_integer(&mut body, r);
    write_integer(&mut body, s);

    let mut der = Vec::with_capacity(body.len() + 3);
    der.push(SEQUENCE);
    if body.len() >= 0x80 {
        der.push(0x81);
    }
    der.push(body.len() as u8);
    der.extend_from_slice(&body);
    Ok(der)
}

fn check_curve(curve: Curve, key: &EcComponents) -> Result<()> {
    if key.curve != curve {
        return Err(Error::root(AlgorithmError::ImproperKey)).ctx(|| {
            format!(
                "{} needs a {} key, got {}",
                curve.signature_algorithm(),
                curve.name(),
                key.curve.name()
            )
        });
    }
    Ok(())
}

fn sign(curve: Curve, key: &EcComponents, data: &[u8]) -> Result<Vec<u8>> {
    check_curve(curve, key)?;
    let ec_key = key.private_ec_key()?;
    let digest = curve.signature_hash().digest(data)?;

    let signature =
        EcdsaSig::sign(&digest, &ec_key).foreign_err(|| AlgorithmError::CryptoBackend)?;
    let der = signature
        .to_der()
        .foreign_err(|| AlgorithmError::CryptoBackend)?;
    der_to_concat(&der, curve.coordinate_size())
}

fn verify(curve: Curve, key: &EcComponents, data: &[u8], signature: &[u8]) -> Result<()> {
    check_curve(curve, key)?;
    let ec_key = key.public_ec_key()?;
    let digest = curve.signature_hash().digest(data)?;

    let failed = || Error::root(AlgorithmError::VerificationFailed);
    let der = concat_to_der(signature, curve.coordinate_size()).map_err(|_| failed())?;
    let signature = EcdsaSig::from_der(&der).map_err(|_| failed())?;

    match signature.verify(&digest, &ec_key) {
        Ok(true) => Ok(()),
        _ => Err(failed()),
    }
}

pub(crate) fn register(builder: &mut RegistryBuilder) {
    for curve in Curve::ALL {
        let name = curve.signature_algorithm();

        builder.register(Operation::Sign, name, move |key, data, _| {
            Ok(Output::data(sign(curve, require_key(key)?.ec()?, data)?))
        });
        builder.register(Operation::Verify, name, move |key, data, props| {
            let signature = props.signature.as_deref().unwrap_or_default();
            verify(curve, require_key(key)?.ec()?, data, signature)?;
            Ok(Output::default())
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{KeyMaterial, Props, Registry};

    #[test]
    fn test_der_concat_round_trip() {
        let cases = [
            // high bits set, both integers need a sign byte
            [vec![0xff; 32], vec![0x80; 32]].concat(),
            // leading zeros are stripped in DER
            [vec![0x00, 0x00, 0x01], vec![0x7f; 29], vec![0x00; 31], vec![0x05]].concat(),
        ];

        for signature in cases {
            let der = concat_to_der(&signature, 32).unwrap();
            assert_eq!(der_to_concat(&der, 32).unwrap(), signature);
        }

        // P-521 signatures need the long length form
        let signature = [vec![0x01], vec![0xff; 65], vec![0x01], vec![0xee; 65]].concat();
        let der = concat_to_der(&signature, 66).unwrap();
        assert_eq!(&der[..3], &[SEQUENCE, 0x81, 136]);
        assert_eq!(der_to_concat(&der, 66).unwrap(), signature);
    }

    #[test]
    fn test_der_encoding() {
        let signature = [vec![0x00; 31], vec![0x01], vec![0x00; 31], vec![0x80]].concat();
        assert_eq!(
            concat_to_der(&signature, 32).unwrap(),
            [SEQUENCE, 7, INTEGER, 1, 0x01, INTEGER, 2, 0x00, 0x80]
        );
    }

    #[test]
    fn test_malformed_der_is_rejected() {
        let valid = concat_to_der(&[0x11; 64], 32).unwrap();

        let mut wrong_tag = valid.clone();
        wrong_tag[0] = 0x31;
        let mut wrong_integer_tag = valid.clone();
        wrong_integer_tag[2] = 0x03;
        let mut wrong_length = valid.clone();
        wrong_length[1] += 1;
        let mut trailing = valid.clone();
        trailing.push(0x00);
        trailing[1] += 1;
        let oversized = concat_to_der(&[0x11; 66], 33).unwrap();

        for der in [
            wrong_tag,
            wrong_integer_tag,
            wrong_length,
            trailing,
            oversized,
            valid[..valid.len() - 1].to_vec(),
            Vec::new(),
        ] {
            let error = der_to_concat(&der, 32).unwrap_err();
            assert_eq!(error.error, AlgorithmError::MalformedSignature);
        }
    }

    #[test]
    fn test_sign_verify_all_curves() {
        let registry = Registry::default();

        for curve in Curve::ALL {
            let private = EcComponents::generate(curve).unwrap();
            let public = KeyMaterial::Ec(private.to_public());
            let private = KeyMaterial::Ec(private);
            let alg = curve.signature_algorithm();

            let signature = registry
                .dispatch(Operation::Sign, alg, Some(&private), b"payload", &Props::default())
                .unwrap()
                .data;
            assert_eq!(signature.len(), 2 * curve.coordinate_size());

            let mut props = Props {
                signature: Some(signature.clone()),
                ..Default::default()
            };
            registry
                .dispatch(Operation::Verify, alg, Some(&public), b"payload", &props)
                .unwrap();

            props.signature = Some(signature[1..].to_vec());
            let error = registry
                .dispatch(Operation::Verify, alg, Some(&public), b"payload", &props)
                .unwrap_err();
            assert_eq!(error.error, AlgorithmError::VerificationFailed);
        }
    }

    #[test]
    fn test_curve_must_match_algorithm() {
        let key = KeyMaterial::Ec(EcComponents::generate(Curve::P384).unwrap());
        let error = Registry::default()
            .dispatch(Operation::Sign, "ES256", Some(&key), b"x", &Props::default())
            .unwrap_err();
        assert_eq!(error.error, AlgorithmError::ImproperKey);
    }
}
