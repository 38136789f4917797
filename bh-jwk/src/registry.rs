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

use std::{collections::HashMap, sync::Arc};

use bh_jwa::JsonObject;
use bherror::Error;

use crate::{config::string, EcConfig, Key, KeyError, KeyTypeConfig, OctConfig, Result, RsaConfig};

/// The key types known to a [`KeyStore`](crate::KeyStore), by `kty`.
#[derive(Clone)]
pub struct KeyRegistry {
    configs: HashMap<&'static str, Arc<dyn KeyTypeConfig>>,
}

impl KeyRegistry {
    /// A registry without any key type.
    pub fn empty() -> Self {
        Self {
            configs: HashMap::new(),
        }
    }

    /// Registers `config` for its `kty`, replacing any earlier config of the
    /// same `kty`.
    pub fn register(&mut self, config: Arc<dyn KeyTypeConfig>) -> &mut Self {
        tracing::trace!(kty = config.kty(), "key type registered");
        self.configs.insert(config.kty(), config);
        self
    }

    /// Removes the config of `kty`, if any.
    pub fn unregister(&mut self, kty: &str) -> &mut Self {
        self.configs.remove(kty);
        self
    }

    /// The config of `kty`.
    pub fn get(&self, kty: &str) -> Option<Arc<dyn KeyTypeConfig>> {
        self.configs.get(kty).cloned()
    }

    /// The registered key types, sorted.
    pub fn key_types(&self) -> Vec<&'static str> {
        let mut ktys: Vec<_> = self.configs.keys().copied().collect();
        ktys.sort_unstable();
        ktys
    }

    /// Builds a key from its JWK members with the config of its `kty`.
    pub fn key_from_json(&self, fields: &JsonObject) -> Result<Key> {
        let kty = string(fields, "kty")?
            .ok_or_else(|| Error::root(KeyError::InvalidKey("`kty` is missing".to_owned())))?;
        let config = self
            .get(kty)
            .ok_or_else(|| Error::root(KeyError::UnsupportedKeyType(kty.to_owned())))?;
        Key::new(config, fields)
    }
}

impl Default for KeyRegistry {
    /// The `RSA`, `EC` and `oct` key types.
    fn default() -> Self {
        let mut registry = Self::empty();
        registry
            .register(Arc::new(RsaConfig))
            .register(Arc::new(EcConfig))
            .register(Arc::new(OctConfig));
        registry
    }
}

impl std::fmt::Debug for KeyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyRegistry")
            .field("key_types", &self.key_types())
            .finish()
    }
}

lazy_static::lazy_static! {
    static ref DEFAULT_KEY_REGISTRY: Arc<KeyRegistry> = Arc::new(KeyRegistry::default());
}

/// The shared default [`KeyRegistry`].
pub fn key_registry() -> Arc<KeyRegistry> {
    DEFAULT_KEY_REGISTRY.clone()
}
