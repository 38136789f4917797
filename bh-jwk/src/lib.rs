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

//! This crate provides [JSON Web Keys (JWK)][1] and an in-memory [`KeyStore`].
//!
//! [1]: https://datatracker.ietf.org/doc/html/rfc7517
//!
//! # Details
//!
//! A [`Key`] is built from its JWK members by the [`KeyTypeConfig`] of its
//! `kty`, looked up in a [`KeyRegistry`].  The config parses the members into
//! typed [`KeyMaterial`](bh_jwa::KeyMaterial) and decides which algorithms
//! the material can be used with; the key narrows that down with its `use`
//! and `alg` members (see [`Key::algorithms`]).
//!
//! Configs for `RSA`, `EC` (P-256, P-384, P-521) and `oct` keys are provided.
//!
//! The cryptographic operations of a key are asynchronous and dispatch to the
//! [`bh_jwa`] algorithm registry.
//!
//! # Examples
//!
//! ```
//! use bh_jwk::{KeyStore, Mode};
//!
//! # futures::executor::block_on(async {
//! let mut store = KeyStore::new();
//! let key = store
//!     .add_str(r#"{"kty":"oct","k":"wB_gTgRKTtYSk-ul_W-96WU92evFr01tPN6WE8A8BEU","use":"sig"}"#)
//!     .unwrap();
//!
//! assert_eq!(key.algorithms(Mode::Sign), ["HS256"]);
//! assert!(key.algorithms(Mode::Encrypt).is_empty());
//!
//! let mac = key.sign("HS256", b"payload").await.unwrap();
//! key.verify("HS256", b"payload", &mac).await.unwrap();
//!
//! assert!(store.get(key.kid()).is_some());
//! # });
//! ```

mod config;
mod ec;
mod error;
mod import;
mod key;
mod oct;
mod registry;
mod rsa;
mod store;

pub use config::{header_props, KeyPair, KeyTypeConfig, KeyUse, Mode};
pub use ec::EcConfig;
pub use error::*;
pub use import::{import_key, KeyFormat};
pub use key::Key;
pub use oct::OctConfig;
pub use registry::{key_registry, KeyRegistry};
pub use rsa::{RsaConfig, MIN_RSA_BITS};
pub use store::{JwkSet, KeySelector, KeyStore};
