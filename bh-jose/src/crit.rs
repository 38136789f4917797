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

//! Critical header extensions (`crit`).

use std::{collections::HashMap, sync::Arc};

use bh_jwa::JsonObject;
use bherror::Error;
use serde_json::Value;

use crate::{JoseError, Result};

/// Header members defined by JWS and JWE, which `crit` must not list.
const REGISTERED: [&str; 17] = [
    "alg", "enc", "zip", "jku", "jwk", "kid", "x5u", "x5c", "x5t", "x5t#S256", "typ", "cty",
    "crit", "epk", "apu", "apv", "iv",
];

/// An extension with checks before and after the cryptographic operation.
pub trait CriticalExtension: Send + Sync {
    /// Checks the protected header before the signature is verified or the
    /// content decrypted.
    fn prepare(&self, _header: &JsonObject) -> bool {
        true
    }

    /// Checks the header and the payload once the operation succeeded.
    fn complete(&self, _header: &JsonObject, _payload: &[u8]) -> bool {
        true
    }
}

/// How a critical extension is handled.
#[derive(Clone)]
pub enum CritHandler {
    /// The extension is understood, with nothing to check.
    Accept,
    /// The extension is accepted if the function approves the header.
    Check(Arc<dyn Fn(&JsonObject) -> bool + Send + Sync>),
    /// The extension has checks before and after the operation.
    Extension(Arc<dyn CriticalExtension>),
}

impl std::fmt::Debug for CritHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CritHandler::Accept => f.write_str("Accept"),
            CritHandler::Check(_) => f.write_str("Check"),
            CritHandler::Extension(_) => f.write_str("Extension"),
        }
    }
}

/// The critical extensions a caller understands.
///
/// `b64` (RFC 7797) is understood by default.  Any other name listed in
/// `crit` without a handler makes the operation fail.
#[derive(Debug, Clone)]
pub struct CritHandlers {
    handlers: HashMap<String, CritHandler>,
}

impl Default for CritHandlers {
    fn default() -> Self {
        Self::empty().with("b64", CritHandler::Accept)
    }
}

impl CritHandlers {
    /// No extension is understood, not even `b64`.
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registers `handler` for the extension `name`.
    pub fn with(mut self, name: impl Into<String>, handler: CritHandler) -> Self {
        self.insert(name, handler);
        self
    }

    /// Registers `handler` for the extension `name`.
    pub fn insert(&mut self, name: impl Into<String>, handler: CritHandler) {
        self.handlers.insert(name.into(), handler);
    }

    /// Whether the extension `name` is understood.
    pub fn understands(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Validates the `crit` member of `protected` and runs the checks every
    /// listed extension has before the operation.
    ///
    /// Returns the listed names, to be passed to [`Self::complete`].
    pub fn prepare(&self, protected: &JsonObject, unprotected: &JsonObject) -> Result<Vec<String>> {
        if unprotected.contains_key("crit") {
            return Err(Error::root(JoseError::InvalidCriticalHeader("crit".to_owned()))
                .ctx("`crit` must be integrity protected"));
        }
        let names = crit_names(protected)?;

        for name in &names {
            let handler = self
                .handlers
                .get(name)
                .ok_or_else(|| Error::root(JoseError::UnsupportedCriticalExtension(name.clone())))?;

            let accepted = match handler {
                CritHandler::Accept => true,
                CritHandler::Check(check) => check(protected),
                CritHandler::Extension(extension) => extension.prepare(protected),
            };
            if !accepted {
                return Err(Error::root(JoseError::InvalidCriticalHeader(name.clone())));
            }
        }

        Ok(names)
    }

    /// Runs the checks the extensions `names` have after the operation.
    pub fn complete(&self, names: &[String], header: &JsonObject, payload: &[u8]) -> Result<()> {
        for name in names {
            if let Some(CritHandler::Extension(extension)) = self.handlers.get(name) {
                if !extension.complete(header, payload) {
                    return Err(Error::root(JoseError::InvalidCriticalHeader(name.clone()))
                        .ctx("rejected after the operation"));
                }
            }
        }
        Ok(())
    }
}

/// The names listed in `crit`, which must be a non-empty array of distinct
/// names of members present in `protected`.
fn crit_names(protected: &JsonObject) -> Result<Vec<String>> {
    let invalid = |reason: &str| {
        Err(Error::root(JoseError::InvalidCriticalHeader("crit".to_owned())).ctx(reason.to_owned()))
    };

    let list = match protected.get("crit") {
        None => return Ok(Vec::new()),
        Some(Value::Array(list)) if !list.is_empty() => list,
        Some(_) => return invalid("`crit` is not a non-empty array"),
    };

    let mut names: Vec<String> = Vec::with_capacity(list.len());
    for name in list {
        let Some(name) = name.as_str() else {
            return invalid("`crit` lists a non-string");
        };
        if REGISTERED.contains(&name) {
            return invalid("`crit` lists a registered header member");
        }
        if !protected.contains_key(name) {
            return invalid("`crit` lists a member missing from the protected header");
        }
        if names.iter().any(|seen| seen == name) {
            return invalid("`crit` lists a member twice");
        }
        names.push(name.to_owned());
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use bh_jwa::json_object;

    use super::*;

    struct NotBefore;

    impl CriticalExtension for NotBefore {
        fn prepare(&self, header: &JsonObject) -> bool {
            header.get("nbf").and_then(Value::as_u64).is_some()
        }

        fn complete(&self, _header: &JsonObject, payload: &[u8]) -> bool {
            !payload.is_empty()
        }
    }

    #[test]
    fn test_no_crit() {
        let names = CritHandlers::empty()
            .prepare(&json_object!({"alg": "HS256"}), &JsonObject::new())
            .unwrap();
        assert!(names.is_empty());
    }

    #[test]
    fn test_b64_is_understood_by_default() {
        let protected = json_object!({"alg": "HS256", "b64": false, "crit": ["b64"]});
        let names = CritHandlers::default()
            .prepare(&protected, &JsonObject::new())
            .unwrap();
        assert_eq!(names, ["b64"]);

        let error = CritHandlers::empty()
            .prepare(&protected, &JsonObject::new())
            .unwrap_err();
        assert_eq!(
            error.error,
            JoseError::UnsupportedCriticalExtension("b64".to_owned())
        );
    }

    #[test]
    fn test_unknown_extension_fails_closed() {
        let protected = json_object!({"alg": "HS256", "exp": 1, "crit": ["exp"]});
        let error = CritHandlers::default()
            .prepare(&protected, &JsonObject::new())
            .unwrap_err();
        assert_eq!(
            error.error,
            JoseError::UnsupportedCriticalExtension("exp".to_owned())
        );
    }

    #[test]
    fn test_malformed_crit() {
        let handlers = CritHandlers::default().with("exp", CritHandler::Accept);
        for protected in [
            json_object!({"alg": "HS256", "crit": []}),
            json_object!({"alg": "HS256", "crit": "exp"}),
            json_object!({"alg": "HS256", "crit": [1]}),
            json_object!({"alg": "HS256", "crit": ["alg"]}),
            json_object!({"alg": "HS256", "crit": ["exp"]}),
            json_object!({"alg": "HS256", "exp": 1, "crit": ["exp", "exp"]}),
        ] {
            let error = handlers.prepare(&protected, &JsonObject::new()).unwrap_err();
            assert_matches!(error.error, JoseError::InvalidCriticalHeader(_));
        }

        let error = handlers
            .prepare(
                &json_object!({"alg": "HS256"}),
                &json_object!({"crit": ["exp"], "exp": 1}),
            )
            .unwrap_err();
        assert_matches!(error.error, JoseError::InvalidCriticalHeader(_));
    }

    #[test]
    fn test_check_handler() {
        let handlers = CritHandlers::empty().with(
            "exp",
            CritHandler::Check(Arc::new(|header: &JsonObject| header["exp"] == 1)),
        );

        let protected = json_object!({"alg": "HS256", "exp": 1, "crit": ["exp"]});
        assert!(handlers.prepare(&protected, &JsonObject::new()).is_ok());

        let protected = json_object!({"alg": "HS256", "exp": 2, "crit": ["exp"]});
        let error = handlers.prepare(&protected, &JsonObject::new()).unwrap_err();
        assert_eq!(error.error, JoseError::InvalidCriticalHeader("exp".to_owned()));
    }

    #[test]
    fn test_extension_handler() {
        let handlers =
            CritHandlers::empty().with("nbf", CritHandler::Extension(Arc::new(NotBefore)));

        let protected = json_object!({"alg": "HS256", "nbf": 10, "crit": ["nbf"]});
        let names = handlers.prepare(&protected, &JsonObject::new()).unwrap();
        handlers.complete(&names, &protected, b"payload").unwrap();
        let error = handlers.complete(&names, &protected, b"").unwrap_err();
        assert_eq!(error.error, JoseError::InvalidCriticalHeader("nbf".to_owned()));

        let protected = json_object!({"alg": "HS256", "nbf": "soon", "crit": ["nbf"]});
        assert!(handlers.prepare(&protected, &JsonObject::new()).is_err());
    }
}
