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

use std::sync::Arc;

use bh_jwa::JsonObject;
use bherror::{
    traits::{ErrorContext as _, ForeignError as _},
    Error,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    import::import_key, key_registry, Key, KeyError, KeyFormat, KeyRegistry, KeyUse, Mode,
    Result,
};

/// A JSON Web Key Set (RFC 7517, section 5).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JwkSet {
    /// The JWKs of the set.
    pub keys: Vec<JsonObject>,
}

/// Constraints on the keys returned by [`KeyStore::get`].
///
/// Every constraint that is set must hold:
///
/// * `kid` and `kty` must be equal,
/// * `key_use` must be equal to the `use` of the key, if the key has one,
/// * `alg` must be among the [algorithms](Key::algorithms) of the key in some
///   mode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeySelector {
    /// The `kid`.
    pub kid: Option<String>,
    /// The `use`.
    pub key_use: Option<KeyUse>,
    /// An algorithm the key must support.
    pub alg: Option<String>,
    /// The `kty`.
    pub kty: Option<String>,
}

impl KeySelector {
    /// Whether `key` satisfies the selector.
    pub fn matches(&self, key: &Key) -> bool {
        if self.kid.as_deref().is_some_and(|kid| kid != key.kid()) {
            return false;
        }
        if self.kty.as_deref().is_some_and(|kty| kty != key.kty()) {
            return false;
        }
        if let (Some(wanted), Some(key_use)) = (self.key_use, key.key_use()) {
            if wanted != key_use {
                return false;
            }
        }
        match self.alg.as_deref() {
            Some(alg) => Mode::ALL.iter().any(|mode| key.supports(*mode, alg)),
            None => true,
        }
    }
}

impl From<&str> for KeySelector {
    fn from(kid: &str) -> Self {
        Self {
            kid: Some(kid.to_owned()),
            ..Default::default()
        }
    }
}

/// An in-memory collection of [`Key`]s.
///
/// Keys are shared as [`Arc<Key>`] and compared by identity: two stores, or
/// the same store twice, may hold keys with equal members.  Mutation needs
/// `&mut self`, so concurrent users share a store behind their own lock.
#[derive(Debug, Clone)]
pub struct KeyStore {
    registry: Arc<KeyRegistry>,
    keys: Vec<Arc<Key>>,
}

impl KeyStore {
    /// An empty store using the shared default [`KeyRegistry`].
    pub fn new() -> Self {
        Self::with_registry(key_registry())
    }

    /// An empty store using `registry`.
    pub fn with_registry(registry: Arc<KeyRegistry>) -> Self {
        Self {
            registry,
            keys: Vec::new(),
        }
    }

    /// The key types of the store.
    pub fn registry(&self) -> &KeyRegistry {
        &self.registry
    }

    /// Adds `key` and returns the shared handle to it.
    pub fn add(&mut self, key: impl Into<Arc<Key>>) -> Arc<Key> {
        let key = key.into();
        tracing::debug!(kid = key.kid(), kty = key.kty(), "key added");
        self.keys.push(key.clone());
        key
    }

    /// Builds a key from its JWK members and adds it.
    ///
    /// # Errors
    ///
    /// [`KeyError::UnsupportedKeyType`] if the `kty` is not registered, or any
    /// error of [`Key::new`].
    pub fn add_json(&mut self, fields: &JsonObject) -> Result<Arc<Key>> {
        let key = self.registry.key_from_json(fields)?;
        Ok(self.add(key))
    }

    /// Parses a JWK string and adds the key.
    pub fn add_str(&mut self, json: &str) -> Result<Arc<Key>> {
        let fields: JsonObject = serde_json::from_str(json)
            .foreign_err(|| KeyError::InvalidFormat("not a JWK object".to_owned()))?;
        self.add_json(&fields)
    }

    /// Imports a key with [`KeyStore::as_key`] and adds it.
    pub fn import(&mut self, input: &[u8], format: Option<KeyFormat>) -> Result<Arc<Key>> {
        let key = import_key(&self.registry, input, format)?;
        Ok(self.add(key))
    }

    /// Removes `key`, if it is in the store.
    pub fn remove(&mut self, key: &Arc<Key>) {
        self.keys.retain(|held| !Arc::ptr_eq(held, key));
    }

    /// Generates a key of type `kty` and `size` bits, with the extra members
    /// `props` (`kid`, `use`, `alg`, ...), and adds it.
    pub fn generate(&mut self, kty: &str, size: usize, props: JsonObject) -> Result<Arc<Key>> {
        let config = self
            .registry
            .get(kty)
            .ok_or_else(|| Error::root(KeyError::UnsupportedKeyType(kty.to_owned())))?;

        let mut fields = config.generate(size)?;
        for (name, value) in props {
            if !config.members().contains(&name.as_str()) && name != "kty" {
                fields.insert(name, value);
            }
        }

        let key = Key::new(config, &fields).ctx(|| format!("generating a {kty} key"))?;
        Ok(self.add(key))
    }

    /// The keys of the store, in insertion order.
    pub fn all(&self) -> Vec<Arc<Key>> {
        self.keys.clone()
    }

    /// The keys satisfying `selector`, in insertion order.
    pub fn all_matching(&self, selector: &KeySelector) -> Vec<Arc<Key>> {
        self.keys
            .iter()
            .filter(|key| selector.matches(key))
            .cloned()
            .collect()
    }

    /// The first key satisfying `selector`, a [`KeySelector`] or a bare
    /// `kid`.
    pub fn get(&self, selector: impl Into<KeySelector>) -> Option<Arc<Key>> {
        let selector = selector.into();
        self.keys.iter().find(|key| selector.matches(key)).cloned()
    }

    /// The number of keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the store has no keys.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// A store holding the current keys, independent of this one from now
    /// on.
    pub fn temp(&self) -> KeyStore {
        self.clone()
    }

    /// The keys of the store as a [`JwkSet`].
    pub fn to_jwk_set(&self, include_private: bool) -> JwkSet {
        JwkSet {
            keys: self
                .keys
                .iter()
                .map(|key| key.to_json(include_private))
                .collect(),
        }
    }

    /// The store as a JWK Set, `{"keys": [...]}`.
    pub fn to_json(&self, include_private: bool) -> Value {
        let keys = self
            .to_jwk_set(include_private)
            .keys
            .into_iter()
            .map(Value::Object)
            .collect();

        let mut set = JsonObject::new();
        set.insert("keys".to_owned(), Value::Array(keys));
        Value::Object(set)
    }

    /// Builds a store from a [`JwkSet`].
    pub fn from_jwk_set(set: &JwkSet) -> Result<KeyStore> {
        let mut store = KeyStore::new();
        for (index, fields) in set.keys.iter().enumerate() {
            store
                .add_json(fields)
                .ctx(|| format!("importing key {index}"))?;
        }
        Ok(store)
    }

    /// Builds a store from a JWK Set, an array of JWKs or a single JWK.
    pub fn from_json(value: &Value) -> Result<KeyStore> {
        let keys = match value {
            Value::Object(set) => match set.get("keys") {
                Some(Value::Array(keys)) => keys.as_slice(),
                Some(_) => {
                    return Err(Error::root(KeyError::InvalidFormat(
                        "`keys` is not an array".to_owned(),
                    )))
                }
                None => std::slice::from_ref(value),
            },
            Value::Array(keys) => keys.as_slice(),
            _ => {
                return Err(Error::root(KeyError::InvalidFormat(
                    "not a JWK Set".to_owned(),
                )))
            }
        };

        let keys = keys
            .iter()
            .enumerate()
            .map(|(index, key)| {
                key.as_object().cloned().ok_or_else(|| {
                    Error::root(KeyError::InvalidFormat(format!("key {index} is not an object")))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Self::from_jwk_set(&JwkSet { keys })
    }

    /// Parses a JWK Set (or any input accepted by [`Self::from_json`]).
    pub fn from_json_str(json: &str) -> Result<KeyStore> {
        let value: Value = serde_json::from_str(json)
            .foreign_err(|| KeyError::InvalidFormat("not JSON".to_owned()))?;
        Self::from_json(&value)
    }

    /// Whether `value` is a JWK of a type of the default registry.
    pub fn is_key(value: &Value) -> bool {
        value
            .as_object()
            .is_some_and(|fields| key_registry().key_from_json(fields).is_ok())
    }

    /// Whether `value` is a JWK Set whose keys all pass [`Self::is_key`].
    pub fn is_key_set(value: &Value) -> bool {
        value
            .get("keys")
            .and_then(Value::as_array)
            .is_some_and(|keys| keys.iter().all(Self::is_key))
    }

    /// Builds a key from JWK, PEM or DER `input` without adding it anywhere.
    /// The format is detected when `format` is `None`.
    pub fn as_key(input: &[u8], format: Option<KeyFormat>) -> Result<Key> {
        import_key(&key_registry(), input, format)
    }
}

impl Default for KeyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Key> for KeyStore {
    fn from(key: Key) -> Self {
        let mut store = Self::new();
        store.add(key);
        store
    }
}

impl From<Arc<Key>> for KeyStore {
    fn from(key: Arc<Key>) -> Self {
        let mut store = Self::new();
        store.add(key);
        store
    }
}
