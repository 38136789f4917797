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

use std::collections::HashMap;

use bherror::{traits::ErrorContext as _, Error};

use crate::{
    aes_cbc_hmac, aes_gcm, aes_kw, digest, ecdh, ecdsa, hmac, kdf, pbes2, rsaes, rsassa, Backend,
    AlgorithmError, KeyMaterial, Operation, Output, Props, Result,
};

/// A primitive as stored in the [`Registry`].
pub type Primitive =
    dyn Fn(Option<&KeyMaterial>, &[u8], &Props) -> Result<Output> + Send + Sync + 'static;

/// Returns the key of a primitive call, or fails with
/// [`ImproperKey`](AlgorithmError::ImproperKey).
pub(crate) fn require_key(key: Option<&KeyMaterial>) -> Result<&KeyMaterial> {
    key.ok_or_else(|| Error::root(AlgorithmError::ImproperKey))
        .ctx(|| "the algorithm needs a key")
}

/// Collects the primitives of a [`Registry`] before it is frozen.
pub struct RegistryBuilder {
    backend: Backend,
    primitives: HashMap<(Operation, String), Box<Primitive>>,
    order: Vec<(Operation, String)>,
}

impl RegistryBuilder {
    /// An empty builder.
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            primitives: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// A builder holding every primitive of this crate, registered in a fixed
    /// order.
    pub fn with_defaults(backend: Backend) -> Self {
        let mut builder = Self::new(backend);

        digest::register(&mut builder);
        hmac::register(&mut builder);
        aes_cbc_hmac::register(&mut builder);
        aes_gcm::register(&mut builder);
        aes_kw::register(&mut builder);
        pbes2::register(&mut builder);
        rsaes::register(&mut builder);
        rsassa::register(&mut builder);
        ecdsa::register(&mut builder);
        kdf::register(&mut builder);
        ecdh::register(&mut builder);
        register_dir(&mut builder);

        builder
    }

    /// The backend the primitives are being registered for.
    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// Registers `primitive` for `operation` under the identifier `alg`,
    /// replacing an earlier registration of the same pair.
    pub fn register<F>(&mut self, operation: Operation, alg: &str, primitive: F) -> &mut Self
    where
        F: Fn(Option<&KeyMaterial>, &[u8], &Props) -> Result<Output> + Send + Sync + 'static,
    {
        let key = (operation, alg.to_owned());
        if !self.primitives.contains_key(&key) {
            self.order.push(key.clone());
        }
        self.primitives.insert(key, Box::new(primitive));
        self
    }

    /// Freezes the builder.
    pub fn build(self) -> Registry {
        tracing::trace!(
            backend = ?self.backend,
            primitives = self.order.len(),
            "algorithm registry built"
        );

        Registry {
            backend: self.backend,
            primitives: self.primitives,
            order: self.order,
        }
    }
}

/// An immutable mapping from `(operation, algorithm identifier)` to the
/// primitive implementing it.
///
/// Identifiers are case sensitive.  Key management algorithms are registered
/// under [`Operation::Encrypt`] (wrap) and [`Operation::Decrypt`] (unwrap).
pub struct Registry {
    backend: Backend,
    primitives: HashMap<(Operation, String), Box<Primitive>>,
    order: Vec<(Operation, String)>,
}

impl Registry {
    /// Builds the registry of all the primitives of this crate.
    pub fn new(backend: Backend) -> Self {
        RegistryBuilder::with_defaults(backend).build()
    }

    /// The backend of the registry.
    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// Whether a primitive is registered for the pair.
    pub fn supports(&self, operation: Operation, alg: &str) -> bool {
        self.primitives.contains_key(&(operation, alg.to_owned()))
    }

    /// The identifiers registered for `operation`, in registration order.
    pub fn algorithms(&self, operation: Operation) -> Vec<&str> {
        self.order
            .iter()
            .filter(|(op, _)| *op == operation)
            .map(|(_, alg)| alg.as_str())
            .collect()
    }

    /// Runs the primitive registered for `operation` and `alg`.
    pub fn dispatch(
        &self,
        operation: Operation,
        alg: &str,
        key: Option<&KeyMaterial>,
        data: &[u8],
        props: &Props,
    ) -> Result<Output> {
        let primitive = self
            .primitives
            .get(&(operation, alg.to_owned()))
            .ok_or_else(|| Error::root(AlgorithmError::UnsupportedAlgorithm(alg.to_owned())))
            .ctx(|| format!("no {operation} primitive"))?;

        primitive(key, data, props)
    }

    /// Like [`Self::dispatch`], but AES-GCM content encryption of inputs
    /// larger than [`CHUNK_SIZE`](crate::CHUNK_SIZE) is done in
    /// chunks, yielding to the executor between them.
    pub async fn dispatch_async(
        &self,
        operation: Operation,
        alg: &str,
        key: Option<&KeyMaterial>,
        data: &[u8],
        props: &Props,
    ) -> Result<Output> {
        if let Some(bits) = aes_gcm::content_bits(alg) {
            if data.len() > aes_gcm::CHUNK_SIZE && self.supports(operation, alg) {
                let key = require_key(key)?.oct()?;
                match operation {
                    Operation::Encrypt => {
                        return aes_gcm::encrypt_chunked(bits, key, data, props).await
                    }
                    Operation::Decrypt => {
                        return aes_gcm::decrypt_chunked(bits, key, data, props).await
                    }
                    _ => {}
                }
            }
        }

        self.dispatch(operation, alg, key, data, props)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(Backend::default())
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("backend", &self.backend)
            .field("primitives", &self.order.len())
            .finish()
    }
}

/// `dir`: the key is used as the content encryption key as is.
fn direct(key: Option<&KeyMaterial>, _: &[u8], _: &Props) -> Result<Output> {
    Ok(Output {
        data: require_key(key)?.oct()?.to_vec(),
        direct: true,
        ..Default::default()
    })
}

fn register_dir(builder: &mut RegistryBuilder) {
    builder.register(Operation::Encrypt, "dir", direct);
    builder.register(Operation::Decrypt, "dir", direct);
}

/// The key size in bits of a content encryption algorithm.
pub fn content_key_size(enc: &str) -> Option<usize> {
    match enc {
        "A128GCM" => Some(128),
        "A192GCM" => Some(192),
        "A256GCM" => Some(256),
        "A128CBC-HS256" => Some(256),
        "A192CBC-HS384" => Some(384),
        "A256CBC-HS512" => Some(512),
        _ => None,
    }
}

/// The IV size in bytes of a content encryption algorithm.
pub fn content_iv_size(enc: &str) -> Option<usize> {
    match enc {
        "A128GCM" | "A192GCM" | "A256GCM" => Some(12),
        "A128CBC-HS256" | "A192CBC-HS384" | "A256CBC-HS512" => Some(16),
        _ => None,
    }
}

lazy_static::lazy_static! {
    static ref DEFAULT_REGISTRY: Registry = Registry::default();
}

/// The process-wide registry with the default [`Backend`], built on first
/// use.
pub fn registry() -> &'static Registry {
    &DEFAULT_REGISTRY
}

/// Shorthand for [`Registry::dispatch`] on [`registry()`].
pub fn dispatch(
    operation: Operation,
    alg: &str,
    key: Option<&KeyMaterial>,
    data: &[u8],
    props: &Props,
) -> Result<Output> {
    registry().dispatch(operation, alg, key, data, props)
}
