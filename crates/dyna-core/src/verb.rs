//! HTTP verbs that can carry a canned response.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One of the four mocked HTTP methods.
///
/// The serialized form is the lowercase key used under `responses` in a
/// definition file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verb {
    Get,
    Post,
    Patch,
    Delete,
}

impl Verb {
    /// All verbs, in file order.
    pub const ALL: [Verb; 4] = [Verb::Get, Verb::Post, Verb::Patch, Verb::Delete];

    /// Returns the key used in definition files (`"get"`, `"post"`, ...).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Post => "post",
            Self::Patch => "patch",
            Self::Delete => "delete",
        }
    }

    /// Maps an HTTP method name to a verb, ignoring case.
    ///
    /// Returns `None` for methods that are never mocked (PUT, OPTIONS, ...).
    pub fn from_method(method: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|verb| verb.as_str().eq_ignore_ascii_case(method))
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let method = match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        };
        write!(f, "{method}")
    }
}

impl FromStr for Verb {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_method(s).ok_or_else(|| format!("unsupported HTTP method: {s}"))
    }
}
