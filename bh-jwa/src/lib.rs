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

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! This crate provides the cryptographic primitives of [JSON Web Algorithms
//! (JWA)][1] behind a single dispatch entry point.
//!
//! [1]: https://datatracker.ietf.org/doc/html/rfc7518
//!
//! # Details
//!
//! Every primitive has the same shape: it takes optional [`KeyMaterial`], the
//! input bytes and a set of auxiliary [`Props`], and returns an [`Output`].
//! The primitives are collected into an immutable [`Registry`], keyed by the
//! [`Operation`] and the JOSE algorithm identifier (`"A256GCM"`, `"PS256"`,
//! `"ECDH-ES+A128KW"`, ...).  A process-wide registry is available through
//! [`registry()`] and [`dispatch()`].
//!
//! Algorithm families with more than one implementation (AES key wrap, tag
//! comparison) are selected through the [`Backend`].  The portable software
//! implementations are always available; the `native` feature (enabled by
//! default) adds the OpenSSL native ones.  Both produce identical output.
//!
//! Authentication failures ([`AlgorithmError::MacCheckFailed`],
//! [`AlgorithmError::DecryptionFailed`], [`AlgorithmError::VerificationFailed`])
//! never reveal which check failed.
//!
//! # Examples
//!
//! ## Encrypt and decrypt with AES-GCM
//!
//! ```
//! use bh_jwa::{dispatch, KeyMaterial, Operation, Props};
//!
//! let key = KeyMaterial::Oct(vec![0x42; 32]);
//! let props = Props::with_iv_aad(vec![0x01; 12], b"header".to_vec());
//!
//! let encrypted = dispatch(Operation::Encrypt, "A256GCM", Some(&key), b"hello", &props).unwrap();
//!
//! let props = Props {
//!     tag: encrypted.tag.clone(),
//!     ..props
//! };
//! let decrypted =
//!     dispatch(Operation::Decrypt, "A256GCM", Some(&key), &encrypted.data, &props).unwrap();
//! assert_eq!(decrypted.data, b"hello");
//! ```

mod aes_cbc_hmac;
mod aes_gcm;
mod aes_kw;
mod backend;
mod digest;
mod ecdh;
mod ecdsa;
mod error;
mod hmac;
mod kdf;
mod material;
mod pbes2;
mod props;
mod registry;
mod rsaes;
mod rsassa;
mod utils;

pub use aes_gcm::CHUNK_SIZE;
pub use backend::{Backend, Hkdf, KeyWrap, SoftwareTagCompare, TagCompare};
#[cfg(feature = "native")]
pub use backend::NativeTagCompare;
pub use digest::HashAlgorithm;
pub use ecdsa::{concat_to_der, der_to_concat};
pub use error::*;
pub use material::*;
pub use pbes2::{DEFAULT_ITERATIONS, DEFAULT_SALT_SIZE, MAX_ITERATIONS};
pub use props::*;
pub use registry::{
    content_iv_size, content_key_size, dispatch, registry, Primitive, Registry, RegistryBuilder,
};
pub use utils::*;

/// Helper macro with the same syntax as [`serde_json::json`] specialized for
/// constructing JSON objects.
///
/// It will construct a more specific type ([`serde_json::Map<String,Value>`])
/// than just [`serde_json::Value`] when constructing an object, and panic if
/// the syntax is valid JSON but not an object.
#[macro_export]
macro_rules! json_object {
    ($stuff:tt) => {
        match ::serde_json::json!($stuff) {
            ::serde_json::Value::Object(o) => o,
            _ => unreachable!("JSON literal wasn't an object"),
        }
    };
}
