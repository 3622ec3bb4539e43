//! Registered routes and the parameters a lookup binds.

use std::fmt;

use http::Method;

use crate::handler::BoxedHandler;

/// One registered route: method, pattern, action, and an optional display
/// name used in logs and response events.
///
/// Built once at registration and never mutated afterwards.
pub struct Route {
    pub(crate) method: Method,
    pub(crate) pattern: String,
    pub(crate) name: Option<String>,
    pub(crate) handler: BoxedHandler,
}

impl Route {
    pub fn method(&self) -> &Method { &self.method }
    pub fn pattern(&self) -> &str { &self.pattern }
    pub fn name(&self) -> Option<&str> { self.name.as_deref() }

    /// The name reported to observers: the display name if one was given,
    /// otherwise the pattern.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.pattern)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("pattern", &self.pattern)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Path parameters bound by a successful lookup.
///
/// Ordered left to right along the matched path. A name appears at most once.
///
/// Values are percent-decoded: `/users/john%20doe` against `/users/:name`
/// binds `name = "john doe"`. Matching itself runs on the raw path, so an
/// encoded `%2F` stays inside one `:param` segment and decodes to `/`.
/// Invalid UTF-8 after decoding is replaced with U+FFFD.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Params(Vec<(String, String)>);

impl Params {
    pub fn new() -> Self { Self(Vec::new()) }

    pub(crate) fn from_pairs(pairs: Vec<(&str, &str)>) -> Self {
        Self(pairs.into_iter().map(|(k, v)| (k.to_owned(), decode(v))).collect())
    }

    /// Returns the value bound to `name`.
    ///
    /// For a route `/users/:id`, `params.get("id")` on `/users/42` returns `Some("42")`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize { self.0.len() }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

fn decode(raw: &str) -> String {
    if !raw.contains('%') {
        return raw.to_owned();
    }
    String::from_utf8_lossy(&urlencoding::decode_binary(raw.as_bytes())).into_owned()
}
