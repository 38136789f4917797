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

//! JOSE header handling shared by JWS and JWE.

use bh_jwa::{base64_url_decode, base64_url_encode, JsonObject};
use bh_jwk::Key;
use bherror::{
    traits::{ErrorContext as _, ForeignError as _},
    Error,
};
use serde_json::Value;

use crate::{JoseError, Result};

/// Merges header sources given in precedence order.
///
/// A member present in an earlier source is never overridden by a later one,
/// so a protected member always wins over an unprotected member of the same
/// name.  Missing sources are skipped.
pub fn merge_headers<'a, I>(sources: I) -> JsonObject
where
    I: IntoIterator<Item = Option<&'a JsonObject>>,
{
    let mut merged = JsonObject::new();
    for source in sources.into_iter().flatten() {
        for (name, value) in source {
            merged
                .entry(name.clone())
                .or_insert_with(|| value.clone());
        }
    }
    merged
}

/// The header sources of one signature or recipient.
///
/// [`Self::merge`] applies the precedence protected, then shared unprotected,
/// then per-entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderSources<'a> {
    /// The integrity protected header.
    pub protected: Option<&'a JsonObject>,
    /// The unprotected header shared by all recipients (JWE only).
    pub shared: Option<&'a JsonObject>,
    /// The unprotected header of the signature or recipient.
    pub entry: Option<&'a JsonObject>,
}

impl HeaderSources<'_> {
    /// The effective header.
    pub fn merge(&self) -> JsonObject {
        merge_headers([self.protected, self.shared, self.entry])
    }
}

/// Which header members go into the protected header.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Protect {
    /// Every member.
    #[default]
    All,
    /// Only the listed members.
    Only(Vec<String>),
}

impl Protect {
    /// Members that are protected regardless of the selection.
    const ALWAYS: [&'static str; 3] = ["crit", "b64", "zip"];

    /// Whether the member `name` is protected.
    pub fn covers(&self, name: &str) -> bool {
        match self {
            Protect::All => true,
            Protect::Only(names) => {
                Self::ALWAYS.contains(&name) || names.iter().any(|protected| protected == name)
            }
        }
    }

    /// Splits `header` into its protected and unprotected members.
    pub(crate) fn split(&self, header: JsonObject) -> (JsonObject, JsonObject) {
        header
            .into_iter()
            .partition(|(name, _)| self.covers(name))
    }
}

impl From<&str> for Protect {
    /// `"*"` selects every member, anything else a space separated list.
    fn from(names: &str) -> Self {
        if names.trim() == "*" {
            return Protect::All;
        }
        Protect::Only(names.split_whitespace().map(str::to_owned).collect())
    }
}

impl From<Vec<&str>> for Protect {
    fn from(names: Vec<&str>) -> Self {
        Protect::Only(names.into_iter().map(str::to_owned).collect())
    }
}

/// How a signer or recipient refers to its key in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyReference {
    /// The `kid` of the key, unless the header already names one.
    #[default]
    Kid,
    /// The public key as a `jwk` member.
    Jwk,
    /// A certificate chain as an `x5c` member: the one already in the header,
    /// otherwise the chain of the key.
    X5c,
    /// Nothing.
    None,
}

impl KeyReference {
    /// Adds the reference to `key` to `header`.
    pub(crate) fn apply(self, key: &Key, header: &mut JsonObject) -> Result<()> {
        match self {
            KeyReference::Kid => {
                header
                    .entry("kid")
                    .or_insert_with(|| Value::String(key.kid().to_owned()));
            }
            KeyReference::Jwk => {
                let jwk = key
                    .public_jwk()
                    .ok_or_else(|| Error::root(JoseError::CannotEmbedKey))
                    .ctx(|| format!("{} keys have no public form", key.kty()))?;
                header.insert("jwk".to_owned(), Value::Object(jwk));
            }
            KeyReference::X5c if header.contains_key("x5c") => {}
            KeyReference::X5c => {
                let chain = key
                    .x5c()
                    .ok_or_else(|| Error::root(JoseError::CannotEmbedKey))
                    .ctx(|| format!("key {} has no certificate chain", key.kid()))?;
                header.insert("x5c".to_owned(), Value::from(chain.to_vec()));
            }
            KeyReference::None => {}
        }
        Ok(())
    }
}

/// Encodes a protected header.  An empty header encodes to the empty string.
pub(crate) fn encode_protected(header: &JsonObject) -> String {
    if header.is_empty() {
        return String::new();
    }
    base64_url_encode(Value::Object(header.clone()).to_string())
}

/// Decodes an encoded protected header.
pub(crate) fn decode_protected(encoded: &str) -> Result<JsonObject> {
    if encoded.is_empty() {
        return Ok(JsonObject::new());
    }
    let bytes = base64_url_decode(encoded)
        .foreign_err(|| JoseError::InvalidFormat("protected header is not base64url".to_owned()))?;
    match serde_json::from_slice(&bytes)
        .foreign_err(|| JoseError::InvalidFormat("protected header is not JSON".to_owned()))?
    {
        Value::Object(header) => Ok(header),
        _ => Err(Error::root(JoseError::InvalidFormat(
            "protected header is not an object".to_owned(),
        ))),
    }
}

/// Decodes a `base64url` member of the serialization.
pub(crate) fn decode_member(name: &str, encoded: &str) -> Result<Vec<u8>> {
    base64_url_decode(encoded)
        .foreign_err(|| JoseError::InvalidFormat(format!("`{name}` is not base64url")))
}

/// The string header member `name`, if present.
pub(crate) fn string_member<'a>(header: &'a JsonObject, name: &str) -> Result<Option<&'a str>> {
    match header.get(name) {
        None => Ok(None),
        Some(Value::String(value)) => Ok(Some(value)),
        Some(_) => Err(Error::root(JoseError::InvalidHeader(format!(
            "`{name}` is not a string"
        )))),
    }
}

/// The `alg` header member, which every JWS and JWE entry needs.
pub(crate) fn required_alg(header: &JsonObject) -> Result<&str> {
    string_member(header, "alg")?
        .ok_or_else(|| Error::root(JoseError::InvalidHeader("missing `alg`".to_owned())))
}

/// Names of the members of `header`, in order.
pub(crate) fn member_names(header: &JsonObject) -> Vec<String> {
    header.keys().cloned().collect()
}
