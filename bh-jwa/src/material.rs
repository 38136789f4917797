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

//! Raw key material handed to the primitives.
//!
//! The material is kept as plain big-endian byte strings, exactly as it
//! appears (after `base64url` decoding) in a JWK.  The OpenSSL key objects are
//! built from it on demand, for the duration of a single primitive call.

use bherror::{
    traits::{ErrorContext as _, ForeignError as _},
    Error,
};
use openssl::{
    bn::{BigNum, BigNumContext},
    ec::{EcGroup, EcGroupRef, EcKey, EcPointRef},
    nid::Nid,
    pkey::{PKey, Private, Public},
    rsa::{Rsa, RsaPrivateKeyBuilder},
};
use serde_json::json;

use crate::{utils::base64_url_encode, AlgorithmError, HashAlgorithm, JsonObject, Result};

/// The NIST curves usable with `EC` keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Curve {
    /// `P-256`, also known as `secp256r1` and `prime256v1`.
    P256,
    /// `P-384`, also known as `secp384r1`.
    P384,
    /// `P-521`, also known as `secp521r1`.
    P521,
}

impl Curve {
    /// All supported curves.
    pub const ALL: [Curve; 3] = [Self::P256, Self::P384, Self::P521];

    /// The JWK `crv` value.
    pub fn name(&self) -> &'static str {
        match self {
            Self::P256 => "P-256",
            Self::P384 => "P-384",
            Self::P521 => "P-521",
        }
    }

    /// Parses the JWK `crv` value.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|curve| curve.name() == name)
    }

    /// Returns the curve with the given field size in bits.
    pub fn from_bits(bits: usize) -> Option<Self> {
        Self::ALL.into_iter().find(|curve| curve.bits() == bits)
    }

    /// The field size in bits.
    pub fn bits(&self) -> usize {
        match self {
            Self::P256 => 256,
            Self::P384 => 384,
            Self::P521 => 521,
        }
    }

    /// The size of a single coordinate (and of the private scalar) in bytes.
    pub fn coordinate_size(&self) -> usize {
        self.bits().div_ceil(8)
    }

    /// The `ES*` signature algorithm tied to the curve.
    pub fn signature_algorithm(&self) -> &'static str {
        match self {
            Self::P256 => "ES256",
            Self::P384 => "ES384",
            Self::P521 => "ES512",
        }
    }

    /// The hash function used by [`Self::signature_algorithm`].
    pub fn signature_hash(&self) -> HashAlgorithm {
        match self {
            Self::P256 => HashAlgorithm::Sha256,
            Self::P384 => HashAlgorithm::Sha384,
            Self::P521 => HashAlgorithm::Sha512,
        }
    }

    fn nid(&self) -> Nid {
        match self {
            Self::P256 => Nid::X9_62_PRIME256V1,
            Self::P384 => Nid::SECP384R1,
            Self::P521 => Nid::SECP521R1,
        }
    }

    pub(crate) fn group(&self) -> Result<EcGroup> {
        EcGroup::from_curve_name(self.nid()).foreign_err(|| AlgorithmError::CryptoBackend)
    }

    fn from_nid(nid: Nid) -> Option<Self> {
        Self::ALL.into_iter().find(|curve| curve.nid() == nid)
    }
}

/// The private part of an RSA key.
#[derive(Clone, PartialEq, Eq)]
pub struct RsaPrivateComponents {
    /// The private exponent `d`.
    pub d: Vec<u8>,
    /// The prime factors and CRT values, when known.
    pub primes: Option<RsaPrimes>,
}

/// The prime factors and CRT coefficients of an RSA key.
#[derive(Clone, PartialEq, Eq)]
pub struct RsaPrimes {
    /// First prime factor `p`.
    pub p: Vec<u8>,
    /// Second prime factor `q`.
    pub q: Vec<u8>,
    /// `d mod (p - 1)`
    pub dp: Vec<u8>,
    /// `d mod (q - 1)`
    pub dq: Vec<u8>,
    /// `q^-1 mod p`
    pub qi: Vec<u8>,
}

/// RSA key material.
#[derive(Clone, PartialEq, Eq)]
pub struct RsaComponents {
    /// The modulus `n`.
    pub n: Vec<u8>,
    /// The public exponent `e`.
    pub e: Vec<u8>,
    /// The private part, if this is a private key.
    pub private: Option<RsaPrivateComponents>,
}

impl RsaComponents {
    /// The modulus size in bits.
    pub fn bits(&self) -> usize {
        let leading = self.n.iter().take_while(|b| **b == 0).count();
        match self.n.get(leading) {
            Some(first) => (self.n.len() - leading) * 8 - first.leading_zeros() as usize,
            None => 0,
        }
    }

    /// Drops the private part.
    pub fn to_public(&self) -> Self {
        Self {
            n: self.n.clone(),
            e: self.e.clone(),
            private: None,
        }
    }

    /// Generates a fresh key with a modulus of `bits` bits.
    pub fn generate(bits: u32) -> Result<Self> {
        let rsa = Rsa::generate(bits).foreign_err(|| AlgorithmError::CryptoBackend)?;
        Self::from_openssl_private(&rsa)
    }

    pub(crate) fn from_openssl_private(rsa: &Rsa<Private>) -> Result<Self> {
        let primes = match (rsa.p(), rsa.q(), rsa.dmp1(), rsa.dmq1(), rsa.iqmp()) {
            (Some(p), Some(q), Some(dp), Some(dq), Some(qi)) => Some(RsaPrimes {
                p: p.to_vec(),
                q: q.to_vec(),
                dp: dp.to_vec(),
                dq: dq.to_vec(),
                qi: qi.to_vec(),
            }),
            _ => None,
        };

        Ok(Self {
            n: rsa.n().to_vec(),
            e: rsa.e().to_vec(),
            private: Some(RsaPrivateComponents {
                d: rsa.d().to_vec(),
                primes,
            }),
        })
    }

    pub(crate) fn from_openssl_public(rsa: &Rsa<Public>) -> Self {
        Self {
            n: rsa.n().to_vec(),
            e: rsa.e().to_vec(),
            private: None,
        }
    }

    pub(crate) fn public_pkey(&self) -> Result<PKey<Public>> {
        let rsa = Rsa::from_public_components(bn(&self.n)?, bn(&self.e)?)
            .foreign_err(|| AlgorithmError::ImproperKey)?;
        PKey::from_rsa(rsa).foreign_err(|| AlgorithmError::CryptoBackend)
    }

    pub(crate) fn private_pkey(&self) -> Result<PKey<Private>> {
        let private = self
            .private
            .as_ref()
            .ok_or_else(|| Error::root(AlgorithmError::ImproperKey))
            .ctx(|| "RSA private exponent is missing")?;

        let rsa = match &private.primes {
            Some(primes) => Rsa::from_private_components(
                bn(&self.n)?,
                bn(&self.e)?,
                bn(&private.d)?,
                bn(&primes.p)?,
                bn(&primes.q)?,
                bn(&primes.dp)?,
                bn(&primes.dq)?,
                bn(&primes.qi)?,
            )
            .foreign_err(|| AlgorithmError::ImproperKey)?,
            None => RsaPrivateKeyBuilder::new(bn(&self.n)?, bn(&self.e)?, bn(&private.d)?)
                .foreign_err(|| AlgorithmError::ImproperKey)?
                .build(),
        };

        PKey::from_rsa(rsa).foreign_err(|| AlgorithmError::CryptoBackend)
    }
}

/// Elliptic curve key material.
#[derive(Clone, PartialEq, Eq)]
pub struct EcComponents {
    /// The curve of the key.
    pub curve: Curve,
    /// The `x` coordinate of the public point, padded to the coordinate size.
    pub x: Vec<u8>,
    /// The `y` coordinate of the public point, padded to the coordinate size.
    pub y: Vec<u8>,
    /// The private scalar, if this is a private key.
    pub d: Option<Vec<u8>>,
}

impl EcComponents {
    /// Drops the private scalar.
    pub fn to_public(&self) -> Self {
        Self {
            curve: self.curve,
            x: self.x.clone(),
            y: self.y.clone(),
            d: None,
        }
    }

    /// Generates a fresh key pair on `curve`.
    pub fn generate(curve: Curve) -> Result<Self> {
        let group = curve.group()?;
        let key = EcKey::generate(&group).foreign_err(|| AlgorithmError::CryptoBackend)?;
        Self::from_openssl_private(&key)
    }

    /// The public JWK members (`kty`, `crv`, `x`, `y`), as placed in an `epk`
    /// header.
    pub fn public_jwk(&self) -> JsonObject {
        let json = json!({
            "kty": "EC",
            "crv": self.curve.name(),
            "x": base64_url_encode(&self.x),
            "y": base64_url_encode(&self.y),
        });

        match json {
            serde_json::Value::Object(object) => object,
            _ => unreachable!("a JSON object literal is always an object"),
        }
    }

    pub(crate) fn from_openssl_private(key: &EcKey<Private>) -> Result<Self> {
        let curve = key
            .group()
            .curve_name()
            .and_then(Curve::from_nid)
            .ok_or_else(|| Error::root(AlgorithmError::ImproperKey))
            .ctx(|| "unsupported curve")?;
        let size = curve.coordinate_size() as i32;

        let (x, y) = Self::affine_coordinates(key.group(), key.public_key(), size)?;
        let d = key
            .private_key()
            .to_vec_padded(size)
            .foreign_err(|| AlgorithmError::CryptoBackend)?;

        Ok(Self {
            curve,
            x,
            y,
            d: Some(d),
        })
    }

    pub(crate) fn from_openssl_public(key: &EcKey<Public>) -> Result<Self> {
        let curve = key
            .group()
            .curve_name()
            .and_then(Curve::from_nid)
            .ok_or_else(|| Error::root(AlgorithmError::ImproperKey))
            .ctx(|| "unsupported curve")?;
        let size = curve.coordinate_size() as i32;
        let (x, y) = Self::affine_coordinates(key.group(), key.public_key(), size)?;

        Ok(Self {
            curve,
            x,
            y,
            d: None,
        })
    }

    fn affine_coordinates(
        group: &EcGroupRef,
        point: &EcPointRef,
        size: i32,
    ) -> Result<(Vec<u8>, Vec<u8>)> {
        let mut x = BigNum::new().foreign_err(|| AlgorithmError::CryptoBackend)?;
        let mut y = BigNum::new().foreign_err(|| AlgorithmError::CryptoBackend)?;
        let mut ctx = BigNumContext::new().foreign_err(|| AlgorithmError::CryptoBackend)?;
        point
            .affine_coordinates(group, &mut x, &mut y, &mut ctx)
            .foreign_err(|| AlgorithmError::CryptoBackend)?;

        let x = x
            .to_vec_padded(size)
            .foreign_err(|| AlgorithmError::CryptoBackend)?;
        let y = y
            .to_vec_padded(size)
            .foreign_err(|| AlgorithmError::CryptoBackend)?;
        Ok((x, y))
    }

    /// Builds the public key, rejecting points that are not on the curve or
    /// not in the prime order subgroup.
    pub(crate) fn public_ec_key(&self) -> Result<EcKey<Public>> {
        let size = self.curve.coordinate_size();
        if self.x.len() != size || self.y.len() != size {
            return Err(Error::root(AlgorithmError::ImproperKey))
                .ctx(|| format!("coordinates of {} must be {size} bytes", self.curve.name()));
        }

        let group = self.curve.group()?;
        let key = EcKey::from_public_key_affine_coordinates(&group, &*bn(&self.x)?, &*bn(&self.y)?)
            .foreign_err(|| AlgorithmError::ImproperKey)
            .ctx(|| "point is not on the curve")?;
        key.check_key()
            .foreign_err(|| AlgorithmError::ImproperKey)
            .ctx(|| "point failed validation")?;
        Ok(key)
    }

    pub(crate) fn private_ec_key(&self) -> Result<EcKey<Private>> {
        let d = self
            .d
            .as_ref()
            .ok_or_else(|| Error::root(AlgorithmError::ImproperKey))
            .ctx(|| "EC private scalar is missing")?;

        let public = self.public_ec_key()?;
        let group = self.curve.group()?;
        let key = EcKey::from_private_components(&group, &*bn(d)?, public.public_key())
            .foreign_err(|| AlgorithmError::ImproperKey)?;

        // also checks that the public point belongs to the private scalar
        key.check_key()
            .foreign_err(|| AlgorithmError::ImproperKey)
            .ctx(|| "public point does not match the private scalar")?;
        Ok(key)
    }

    pub(crate) fn public_pkey(&self) -> Result<PKey<Public>> {
        PKey::from_ec_key(self.public_ec_key()?).foreign_err(|| AlgorithmError::CryptoBackend)
    }

    pub(crate) fn private_pkey(&self) -> Result<PKey<Private>> {
        PKey::from_ec_key(self.private_ec_key()?).foreign_err(|| AlgorithmError::CryptoBackend)
    }
}

/// Key material of any supported key type.
#[derive(Clone, PartialEq, Eq)]
pub enum KeyMaterial {
    /// A symmetric key.
    Oct(Vec<u8>),
    /// An RSA public or private key.
    Rsa(RsaComponents),
    /// An elliptic curve public or private key.
    Ec(EcComponents),
}

impl KeyMaterial {
    /// The JWK `kty` of the material.
    pub fn kty(&self) -> &'static str {
        match self {
            Self::Oct(_) => "oct",
            Self::Rsa(_) => "RSA",
            Self::Ec(_) => "EC",
        }
    }

    /// Whether the material holds private (or secret) parts.
    pub fn is_private(&self) -> bool {
        match self {
            Self::Oct(_) => true,
            Self::Rsa(rsa) => rsa.private.is_some(),
            Self::Ec(ec) => ec.d.is_some(),
        }
    }

    /// The key length in bits.
    pub fn bits(&self) -> usize {
        match self {
            Self::Oct(k) => k.len() * 8,
            Self::Rsa(rsa) => rsa.bits(),
            Self::Ec(ec) => ec.curve.bits(),
        }
    }

    pub(crate) fn oct(&self) -> Result<&[u8]> {
        match self {
            Self::Oct(k) => Ok(k),
            _ => Err(Error::root(AlgorithmError::ImproperKey)).ctx(|| "expected an octet key"),
        }
    }

    pub(crate) fn rsa(&self) -> Result<&RsaComponents> {
        match self {
            Self::Rsa(rsa) => Ok(rsa),
            _ => Err(Error::root(AlgorithmError::ImproperKey)).ctx(|| "expected an RSA key"),
        }
    }

    pub(crate) fn ec(&self) -> Result<&EcComponents> {
        match self {
            Self::Ec(ec) => Ok(ec),
            _ => Err(Error::root(AlgorithmError::ImproperKey)).ctx(|| "expected an EC key"),
        }
    }

    /// Imports the material from an OpenSSL private key.
    pub fn from_private_pkey(pkey: &PKey<Private>) -> Result<Self> {
        if let Ok(rsa) = pkey.rsa() {
            return Ok(Self::Rsa(RsaComponents::from_openssl_private(&rsa)?));
        }
        if let Ok(ec) = pkey.ec_key() {
            return Ok(Self::Ec(EcComponents::from_openssl_private(&ec)?));
        }
        Err(Error::root(AlgorithmError::ImproperKey)).ctx(|| "unsupported private key type")
    }

    /// Imports the material from an OpenSSL public key.
    pub fn from_public_pkey(pkey: &PKey<Public>) -> Result<Self> {
        if let Ok(rsa) = pkey.rsa() {
            return Ok(Self::Rsa(RsaComponents::from_openssl_public(&rsa)));
        }
        if let Ok(ec) = pkey.ec_key() {
            return Ok(Self::Ec(EcComponents::from_openssl_public(&ec)?));
        }
        Err(Error::root(AlgorithmError::ImproperKey)).ctx(|| "unsupported public key type")
    }

    /// Exports the material as an OpenSSL private key.
    pub fn to_private_pkey(&self) -> Result<PKey<Private>> {
        match self {
            Self::Rsa(rsa) => rsa.private_pkey(),
            Self::Ec(ec) => ec.private_pkey(),
            Self::Oct(_) => Err(Error::root(AlgorithmError::ImproperKey))
                .ctx(|| "octet keys have no asymmetric form"),
        }
    }

    /// Exports the public part of the material as an OpenSSL public key.
    pub fn to_public_pkey(&self) -> Result<PKey<Public>> {
        match self {
            Self::Rsa(rsa) => rsa.public_pkey(),
            Self::Ec(ec) => ec.public_pkey(),
            Self::Oct(_) => Err(Error::root(AlgorithmError::ImproperKey))
                .ctx(|| "octet keys have no asymmetric form"),
        }
    }
}

// Secrets stay out of logs.
impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("kty", &self.kty())
            .field("bits", &self.bits())
            .field("private", &self.is_private())
            .finish()
    }
}

impl std::fmt::Debug for EcComponents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EcComponents")
            .field("curve", &self.curve)
            .field("private", &self.d.is_some())
            .finish()
    }
}

fn bn(bytes: &[u8]) -> Result<BigNum> {
    BigNum::from_slice(bytes).foreign_err(|| AlgorithmError::CryptoBackend)
}
