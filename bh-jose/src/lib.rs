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

//! This crate provides [JSON Web Signature (JWS)][1] and [JSON Web
//! Encryption (JWE)][2] on top of the keys of [`bh_jwk`] and the algorithms
//! of [`bh_jwa`].
//!
//! [1]: https://datatracker.ietf.org/doc/html/rfc7515
//! [2]: https://datatracker.ietf.org/doc/html/rfc7516
//!
//! # Details
//!
//! A [`Signer`] or an [`Encrypter`] accumulates its input with `update` and
//! produces the [`Serialized`] output in `finalize`, in the compact, the
//! flattened or the general JSON [`Serialization`].  A [`Verifier`] or a
//! [`Decrypter`] accepts any serialization, looks up candidate keys in a
//! [`KeyStore`](bh_jwk::KeyStore) and succeeds with the first signature or
//! recipient that one of them verifies or decrypts.  [`parse`] detects what
//! the input is before deciding what to do with it.
//!
//! The effective header of a signature or recipient is built with the
//! precedence protected, then shared unprotected, then per-entry, see
//! [`HeaderSources`].  The verifying side can restrict the algorithms with an
//! [`AlgorithmFilter`] and must understand every extension listed in `crit`,
//! see [`CritHandlers`].
//!
//! # Examples
//!
//! ## Encrypt and decrypt with a direct key
//!
//! ```
//! use bh_jose::{AlgorithmFilter, DecryptOptions, Decrypter, EncryptOptions, Encrypter};
//! use bh_jwk::Key;
//!
//! # futures::executor::block_on(async {
//! let key = Key::parse(
//!     r#"{"kty":"oct","k":"wB_gTgRKTtYSk-ul_W-96WU92evFr01tPN6WE8A8BEU","alg":"A256GCM"}"#,
//! )
//! .unwrap();
//!
//! let mut encrypter = Encrypter::new(EncryptOptions::default(), vec![key.clone()]).unwrap();
//! encrypter.update("this is very good content");
//! let jwe = encrypter.finalize().await.unwrap();
//!
//! let options = DecryptOptions {
//!     algorithms: AlgorithmFilter::parse("!A*KW").unwrap(),
//!     ..Default::default()
//! };
//! let decrypted = Decrypter::new(key, options)
//!     .decrypt(&jwe.to_string())
//!     .await
//!     .unwrap();
//! assert_eq!(decrypted.plaintext, b"this is very good content");
//! assert_eq!(decrypted.header["alg"], "dir");
//! # });
//! ```
//!
//! ## Sign and verify
//!
//! ```
//! use bh_jose::{parse, Performed, SignOptions, Signer};
//! use bh_jwk::KeyStore;
//!
//! # futures::executor::block_on(async {
//! let mut store = KeyStore::new();
//! let key = store
//!     .generate("EC", 256, bh_jwa::json_object!({"use": "sig"}))
//!     .unwrap();
//!
//! let mut signer = Signer::new(SignOptions::default(), vec![key]).unwrap();
//! signer.update("hello");
//! let jws = signer.finalize().await.unwrap();
//!
//! let parsed = parse(&jws.to_string()).unwrap();
//! assert_eq!(parsed.header["alg"], "ES256");
//! match parsed.perform(&store).await.unwrap() {
//!     Performed::Verified(verified) => assert_eq!(verified.payload, b"hello"),
//!     Performed::Decrypted(_) => unreachable!(),
//! }
//! # });
//! ```

mod compress;
mod crit;
mod error;
mod filter;
mod format;
mod header;
mod jwe;
mod jws;
mod parse;

pub use compress::DEFAULT_MAX_DECOMPRESSED_SIZE;
pub use crit::{CritHandler, CritHandlers, CriticalExtension};
pub use error::*;
pub use filter::AlgorithmFilter;
pub use format::{GeneralJwe, GeneralJws, JweRecipient, JwsSignature, Serialization, Serialized};
pub use header::{merge_headers, HeaderSources, KeyReference, Protect};
pub use jwe::{
    create_decrypt, create_encrypt, DecryptOptions, DecryptResult, Decrypter, EncryptOptions,
    Encrypter, RecipientEntry, DEFAULT_CONTENT_ALG,
};
pub use jws::{
    create_sign, create_verify, SignOptions, Signer, SignerEntry, VerifyOptions, VerifyResult,
    Verifier,
};
pub use parse::{parse, parse_compact, parse_json, JoseObject, Parsed, Performed};
