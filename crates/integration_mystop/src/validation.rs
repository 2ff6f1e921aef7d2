//! Base URL and numeric identifier validation
//!
//! Every value interpolated into an upstream path goes through this module
//! first, so a bad configuration fails before any request is made.

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::MyStopError;

/// A validated agency base URL
///
/// Always `http` or `https`, never carries user info or a fragment, and
/// never ends with a slash.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BaseUrl(String);

impl BaseUrl {
    /// Validate and normalize a non-empty base URL
    ///
    /// # Errors
    ///
    /// Returns [`MyStopError::InvalidConfig`] if the value does not parse or
    /// violates any of the base URL rules.
    pub fn parse(raw: &str) -> Result<Self, MyStopError> {
        let trimmed = raw.trim_end_matches('/');
        let url = Url::parse(trimmed)
            .map_err(|e| MyStopError::InvalidConfig(format!("Invalid base_url: {e}")))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(MyStopError::InvalidConfig(
                "base_url must use http or https".to_string(),
            ));
        }
        if !url.username().is_empty() || url.password().is_some() {
            return Err(MyStopError::InvalidConfig(
                "base_url must not contain user info".to_string(),
            ));
        }
        if url.fragment().is_some() {
            return Err(MyStopError::InvalidConfig(
                "base_url must not contain fragment".to_string(),
            ));
        }

        Ok(Self(url.as_str().trim_end_matches('/').to_string()))
    }

    /// The normalized URL as a string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Build the URL of a REST resource below this base
    #[must_use]
    pub fn rest_endpoint(&self, resource: &str) -> String {
        format!("{}/rest/{resource}", self.0)
    }
}

impl fmt::Display for BaseUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for BaseUrl {
    type Error = MyStopError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<BaseUrl> for String {
    fn from(value: BaseUrl) -> Self {
        value.0
    }
}

/// Normalize an optional base URL
///
/// An absent or empty value is not an error: it yields `Ok(None)` so a
/// discovery-only client can be built without one.
///
/// # Errors
///
/// Returns [`MyStopError::InvalidConfig`] for a malformed non-empty value.
pub fn normalize_base_url(raw: Option<&str>) -> Result<Option<BaseUrl>, MyStopError> {
    match raw {
        None | Some("") => Ok(None),
        Some(value) => BaseUrl::parse(value).map(Some),
    }
}

/// Raw identifier input as supplied by a caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdValue {
    /// A signed host integer
    Signed(i64),
    /// An unsigned host integer
    Unsigned(u64),
    /// Text that should contain only decimal digits
    Text(String),
}

impl From<i64> for IdValue {
    fn from(value: i64) -> Self {
        Self::Signed(value)
    }
}

impl From<i32> for IdValue {
    fn from(value: i32) -> Self {
        Self::Signed(i64::from(value))
    }
}

impl From<u64> for IdValue {
    fn from(value: u64) -> Self {
        Self::Unsigned(value)
    }
}

impl From<u32> for IdValue {
    fn from(value: u32) -> Self {
        Self::Unsigned(u64::from(value))
    }
}

impl From<&str> for IdValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for IdValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&String> for IdValue {
    fn from(value: &String) -> Self {
        Self::Text(value.clone())
    }
}

impl From<&NumericId> for IdValue {
    fn from(value: &NumericId) -> Self {
        Self::Text(value.0.clone())
    }
}

/// An identifier guaranteed to be in unsigned integer lexical form
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct NumericId(String);

impl NumericId {
    /// The identifier as text
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NumericId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NumericId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<&str> for NumericId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Validate an identifier used as a path segment
///
/// Integers are stringified, digit-only text is returned unchanged.
///
/// # Errors
///
/// Returns [`MyStopError::InvalidConfig`] naming `field` for negative
/// integers and for text that is empty or contains a non-digit.
pub fn normalize_numeric_id(
    value: impl Into<IdValue>,
    field: &str,
) -> Result<NumericId, MyStopError> {
    let invalid = || MyStopError::InvalidConfig(format!("{field} must be a numeric id"));

    match value.into() {
        IdValue::Unsigned(n) => Ok(NumericId(n.to_string())),
        IdValue::Signed(n) if n >= 0 => Ok(NumericId(n.to_string())),
        IdValue::Signed(_) => Err(invalid()),
        IdValue::Text(text) => {
            if !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit()) {
                Ok(NumericId(text))
            } else {
                Err(invalid())
            }
        },
    }
}
