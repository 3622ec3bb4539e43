//! Compressed path trie.
//!
//! One [`Tree`] holds every route registered for a single HTTP method.
//! Literal bytes are stored radix-style: a node keeps the longest literal
//! prefix its children share, and inserting a pattern that diverges halfway
//! through a prefix splits that node in two.
//!
//! Besides its literal children a node may own **one** wildcard child:
//!
//! - `:name` matches exactly one non-empty `/`-delimited segment
//! - `*name` matches the rest of the path, `/` included; must be final
//!
//! Holding both kinds at the same point would make matching ambiguous, so
//! the wildcard is a single slot and registering the other kind there fails.
//!
//! Lookup order at every branch point: literal child, then parameter, then
//! catch-all. A failed literal branch backtracks into the parameter branch,
//! so `/a/b` beats `/a/:x` for the path `/a/b` while `/a/c` still binds
//! `x = "c"`.
//!
//! ```text
//! insert /users/:id, /users/new, /static/*file
//!
//! ""
//! └── "/"
//!     ├── "users/"
//!     │   ├── "new"            ← route
//!     │   └── :id              ← route
//!     └── "static/"
//!         └── *file            ← route
//! ```

use std::mem;

use crate::error::RouteError;
use crate::route::Params;

/// Result of a [`Tree::lookup`].
#[derive(Debug)]
pub enum Lookup<'t, T> {
    /// A route terminates the walk.
    Found(&'t T, Params),
    /// No route here, but one exists with the trailing slash toggled.
    Redirect,
    /// Nothing matches.
    Miss,
}

/// A compressed trie mapping path patterns to values.
///
/// Mutated only during registration. Lookups take `&self` and are safe for
/// any number of concurrent readers.
pub struct Tree<T> {
    root: Node<T>,
}

struct Node<T> {
    prefix: String,
    // First char of each child's prefix, parallel to `children`.
    indices: Vec<char>,
    children: Vec<Node<T>>,
    wildcard: Option<Box<Wildcard<T>>>,
    value: Option<T>,
}

enum Wildcard<T> {
    Param { name: String, node: Node<T> },
    CatchAll { name: String, value: T },
}

impl<T> Wildcard<T> {
    fn label(&self) -> String {
        match self {
            Self::Param { name, .. } => format!(":{name}"),
            Self::CatchAll { name, .. } => format!("*{name}"),
        }
    }
}

#[derive(Debug, PartialEq)]
enum Token<'a> {
    Static(&'a str),
    Param(&'a str),
    CatchAll(&'a str),
}

impl<T> Tree<T> {
    pub fn new() -> Self {
        Self { root: Node::with_prefix("") }
    }

    /// Registers `value` under `pattern`.
    pub fn insert(&mut self, pattern: &str, value: T) -> Result<(), RouteError> {
        let tokens = tokenize(pattern)?;
        self.root.insert(pattern, &tokens, value)
    }

    /// Matches `path` against the registered patterns.
    ///
    /// The only allocation on a hit is the returned [`Params`]. A miss
    /// allocates nothing.
    pub fn lookup(&self, path: &str) -> Lookup<'_, T> {
        let mut params = Vec::new();
        if let Some(value) = self.root.search(path, &mut params) {
            return Lookup::Found(value, Params::from_pairs(params));
        }
        if self.trailing_slash_match(path) {
            Lookup::Redirect
        } else {
            Lookup::Miss
        }
    }

    /// Whether any pattern matches `path`. Binds no parameters.
    pub fn contains(&self, path: &str) -> bool {
        self.root.reaches(path)
    }

    /// Every stored value, in no particular order.
    pub fn values(&self) -> Vec<&T> {
        let mut out = Vec::new();
        self.root.collect(&mut out);
        out
    }

    fn trailing_slash_match(&self, path: &str) -> bool {
        if path.len() <= 1 {
            return false;
        }
        match path.strip_suffix('/') {
            Some(trimmed) => self.root.reaches(trimmed),
            None => self.root.reaches_with_slash(path),
        }
    }
}

impl<T> Default for Tree<T> {
    fn default() -> Self { Self::new() }
}

impl<T> Node<T> {
    fn with_prefix(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_owned(),
            indices: Vec::new(),
            children: Vec::new(),
            wildcard: None,
            value: None,
        }
    }

    /// Inserts the remaining `tokens` below this node. Its own prefix is
    /// already consumed.
    fn insert(&mut self, pattern: &str, tokens: &[Token<'_>], value: T) -> Result<(), RouteError> {
        let Some((token, rest)) = tokens.split_first() else {
            if self.value.is_some() {
                return Err(RouteError::Duplicate(pattern.to_owned()));
            }
            self.value = Some(value);
            return Ok(());
        };

        match *token {
            Token::Static(literal) => self.descend(literal).insert(pattern, rest, value),
            Token::Param(name) => {
                let slot = self.wildcard.get_or_insert_with(|| {
                    Box::new(Wildcard::Param { name: name.to_owned(), node: Node::with_prefix("") })
                });
                match slot.as_mut() {
                    Wildcard::Param { name: existing, node } if existing.as_str() == name => {
                        node.insert(pattern, rest, value)
                    }
                    other => Err(RouteError::Conflict {
                        pattern: pattern.to_owned(),
                        existing: other.label(),
                    }),
                }
            }
            Token::CatchAll(name) => match self.wildcard.as_deref() {
                None => {
                    self.wildcard = Some(Box::new(Wildcard::CatchAll { name: name.to_owned(), value }));
                    Ok(())
                }
                Some(Wildcard::CatchAll { name: existing, .. }) if existing.as_str() == name => {
                    Err(RouteError::Duplicate(pattern.to_owned()))
                }
                Some(other) => Err(RouteError::Conflict {
                    pattern: pattern.to_owned(),
                    existing: other.label(),
                }),
            },
        }
    }

    /// Walks (and splits, or grows) the literal children until exactly
    /// `literal` has been consumed, returning the node it ends on.
    fn descend(&mut self, literal: &str) -> &mut Node<T> {
        let Some(first) = literal.chars().next() else {
            return self;
        };

        match self.indices.iter().position(|&c| c == first) {
            Some(i) => {
                let child = &mut self.children[i];
                let common = common_prefix(&child.prefix, literal);
                if common < child.prefix.len() {
                    child.split(common);
                }
                child.descend(&literal[common..])
            }
            None => {
                self.indices.push(first);
                self.children.push(Node::with_prefix(literal));
                let last = self.children.len() - 1;
                &mut self.children[last]
            }
        }
    }

    /// Splits this node so its prefix ends at byte `at`; everything it owned
    /// moves into a single new child holding the rest of the prefix.
    fn split(&mut self, at: usize) {
        let tail = Node {
            prefix: self.prefix.split_off(at),
            indices: mem::take(&mut self.indices),
            children: mem::take(&mut self.children),
            wildcard: self.wildcard.take(),
            value: self.value.take(),
        };
        self.indices = tail.prefix.chars().next().into_iter().collect();
        self.children = vec![tail];
    }

    /// Matches `path`, the part of the request path left after this node's
    /// prefix. Parameters pushed by a branch that fails are popped again.
    fn search<'t, 'p>(&'t self, path: &'p str, params: &mut Vec<(&'t str, &'p str)>) -> Option<&'t T> {
        let Some(first) = path.chars().next() else {
            if let Some(value) = &self.value {
                return Some(value);
            }
            if let Some(Wildcard::CatchAll { name, value }) = self.wildcard.as_deref() {
                params.push((name.as_str(), path));
                return Some(value);
            }
            return None;
        };

        if let Some(i) = self.indices.iter().position(|&c| c == first) {
            let child = &self.children[i];
            if let Some(rest) = path.strip_prefix(child.prefix.as_str()) {
                if let Some(value) = child.search(rest, params) {
                    return Some(value);
                }
            }
        }

        match self.wildcard.as_deref()? {
            Wildcard::Param { name, node } => {
                let end = path.find('/').unwrap_or(path.len());
                if end == 0 {
                    return None;
                }
                let mark = params.len();
                params.push((name.as_str(), &path[..end]));
                let found = node.search(&path[end..], params);
                if found.is_none() {
                    params.truncate(mark);
                }
                found
            }
            Wildcard::CatchAll { name, value } => {
                params.push((name.as_str(), path));
                Some(value)
            }
        }
    }

    /// Same walk as [`Node::search`] without recording parameters.
    fn reaches(&self, path: &str) -> bool {
        let Some(first) = path.chars().next() else {
            return self.value.is_some()
                || matches!(self.wildcard.as_deref(), Some(Wildcard::CatchAll { .. }));
        };

        if let Some(i) = self.indices.iter().position(|&c| c == first) {
            let child = &self.children[i];
            if let Some(rest) = path.strip_prefix(child.prefix.as_str()) {
                if child.reaches(rest) {
                    return true;
                }
            }
        }

        match self.wildcard.as_deref() {
            None => false,
            Some(Wildcard::Param { node, .. }) => {
                let end = path.find('/').unwrap_or(path.len());
                end > 0 && node.reaches(&path[end..])
            }
            Some(Wildcard::CatchAll { .. }) => true,
        }
    }

    /// Whether `path` followed by one more `/` reaches a value. The slash is
    /// matched in place rather than appended to a copy of `path`.
    fn reaches_with_slash(&self, path: &str) -> bool {
        let Some(first) = path.chars().next() else {
            return self.reaches("/");
        };

        if let Some(i) = self.indices.iter().position(|&c| c == first) {
            let child = &self.children[i];
            let prefix = child.prefix.as_str();
            let hit = match path.strip_prefix(prefix) {
                Some(rest) => child.reaches_with_slash(rest),
                // The prefix ends exactly at the virtual slash.
                None => {
                    prefix.len() == path.len() + 1
                        && prefix.starts_with(path)
                        && prefix.ends_with('/')
                        && child.reaches("")
                }
            };
            if hit {
                return true;
            }
        }

        match self.wildcard.as_deref() {
            None => false,
            Some(Wildcard::Param { node, .. }) => match path.find('/') {
                Some(0) => false,
                Some(end) => node.reaches_with_slash(&path[end..]),
                None => node.reaches("/"),
            },
            Some(Wildcard::CatchAll { .. }) => true,
        }
    }

    fn collect<'t>(&'t self, out: &mut Vec<&'t T>) {
        out.extend(self.value.as_ref());
        for child in &self.children {
            child.collect(out);
        }
        match self.wildcard.as_deref() {
            Some(Wildcard::Param { node, .. }) => node.collect(out),
            Some(Wildcard::CatchAll { value, .. }) => out.push(value),
            None => {}
        }
    }
}

/// Length in bytes of the longest common prefix, always on a char boundary.
fn common_prefix(a: &str, b: &str) -> usize {
    a.char_indices()
        .zip(b.chars())
        .find(|((_, x), y)| x != y)
        .map_or_else(|| a.len().min(b.len()), |((i, _), _)| i)
}

/// Splits a pattern into literal runs and wildcard segments.
///
/// `:` and `*` are special only at the start of a segment.
fn tokenize(pattern: &str) -> Result<Vec<Token<'_>>, RouteError> {
    if pattern.is_empty() {
        return Err(RouteError::EmptyPattern);
    }
    if !pattern.starts_with('/') {
        return Err(RouteError::MissingLeadingSlash(pattern.to_owned()));
    }

    let mut tokens = Vec::new();
    let mut names: Vec<&str> = Vec::new();
    let mut literal_start = 0;
    let mut offset = 1;

    for segment in pattern[1..].split('/') {
        let end = offset + segment.len();
        let kind = segment.chars().next();

        if matches!(kind, Some(':' | '*')) {
            let name = &segment[1..];
            if name.is_empty() {
                return Err(RouteError::EmptyParameterName(pattern.to_owned()));
            }
            if names.contains(&name) {
                return Err(RouteError::DuplicateParameter {
                    pattern: pattern.to_owned(),
                    name: name.to_owned(),
                });
            }
            names.push(name);

            if literal_start < offset {
                tokens.push(Token::Static(&pattern[literal_start..offset]));
            }
            if kind == Some('*') {
                if end != pattern.len() {
                    return Err(RouteError::CatchAllNotLast(pattern.to_owned()));
                }
                tokens.push(Token::CatchAll(name));
            } else {
                tokens.push(Token::Param(name));
            }
            literal_start = end;
        }
        offset = end + 1;
    }

    if literal_start < pattern.len() {
        tokens.push(Token::Static(&pattern[literal_start..]));
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(patterns: &[&'static str]) -> Tree<&'static str> {
        let mut tree = Tree::new();
        for p in patterns {
            tree.insert(p, *p).unwrap_or_else(|e| panic!("{p}: {e}"));
        }
        tree
    }

    fn hit<'t>(tree: &'t Tree<&'static str>, path: &str) -> Option<(&'t &'static str, Params)> {
        match tree.lookup(path) {
            Lookup::Found(v, p) => Some((v, p)),
            _ => None,
        }
    }

    #[test]
    fn tokenizes_segments() {
        assert_eq!(
            tokenize("/users/:id/files/*path").unwrap(),
            vec![
                Token::Static("/users/"),
                Token::Param("id"),
                Token::Static("/files/"),
                Token::CatchAll("path"),
            ]
        );
        assert_eq!(tokenize("/v1/items:batch").unwrap(), vec![Token::Static("/v1/items:batch")]);
        assert_eq!(tokenize("/").unwrap(), vec![Token::Static("/")]);
    }

    #[test]
    fn rejects_malformed_patterns() {
        let mut t: Tree<()> = Tree::new();
        assert_eq!(t.insert("", ()), Err(RouteError::EmptyPattern));
        assert!(matches!(t.insert("users", ()), Err(RouteError::MissingLeadingSlash(_))));
        assert!(matches!(t.insert("/users/:", ()), Err(RouteError::EmptyParameterName(_))));
        assert!(matches!(t.insert("/files/*", ()), Err(RouteError::EmptyParameterName(_))));
        assert!(matches!(t.insert("/files/*rest/more", ()), Err(RouteError::CatchAllNotLast(_))));
        assert!(matches!(
            t.insert("/a/:x/b/:x", ()),
            Err(RouteError::DuplicateParameter { .. })
        ));
    }

    #[test]
    fn static_routes_split_shared_prefixes() {
        let t = tree(&["/search", "/support", "/blog", "/blog/post", "/"]);
        for p in ["/search", "/support", "/blog", "/blog/post", "/"] {
            assert_eq!(hit(&t, p).map(|(v, _)| *v), Some(p));
        }
        assert!(hit(&t, "/sea").is_none());
        assert!(hit(&t, "/searching").is_none());
    }

    #[test]
    fn multibyte_literals_split_on_char_boundaries() {
        let t = tree(&["/café", "/cafè", "/ca"]);
        assert_eq!(hit(&t, "/café").map(|(v, _)| *v), Some("/café"));
        assert_eq!(hit(&t, "/cafè").map(|(v, _)| *v), Some("/cafè"));
        assert_eq!(hit(&t, "/ca").map(|(v, _)| *v), Some("/ca"));
    }

    #[test]
    fn binds_parameters_in_path_order() {
        let t = tree(&["/repos/:owner/:repo/issues/:number"]);
        let (_, params) = hit(&t, "/repos/acme/anvil/issues/7").unwrap();
        let pairs: Vec<_> = params.iter().collect();
        assert_eq!(pairs, [("owner", "acme"), ("repo", "anvil"), ("number", "7")]);
    }

    #[test]
    fn parameter_needs_a_non_empty_segment() {
        let t = tree(&["/users/:id"]);
        assert!(hit(&t, "/users/").is_none());
        assert!(hit(&t, "/users/1/extra").is_none());
    }

    #[test]
    fn literal_beats_parameter_beats_catch_all() {
        let t = tree(&["/a/:x", "/a/b", "/c/:x/d", "/c/lit/d"]);
        assert_eq!(hit(&t, "/a/b").map(|(v, _)| *v), Some("/a/b"));
        let (v, params) = hit(&t, "/a/c").unwrap();
        assert_eq!((*v, params.get("x")), ("/a/:x", Some("c")));

        let (v, params) = hit(&t, "/c/lit/d").unwrap();
        assert_eq!((*v, params.len()), ("/c/lit/d", 0));
    }

    #[test]
    fn failed_literal_branch_backtracks_into_parameter() {
        let t = tree(&["/a/bc/x", "/a/:p/y"]);
        let (v, params) = hit(&t, "/a/bc/y").unwrap();
        assert_eq!(*v, "/a/:p/y");
        assert_eq!(params.get("p"), Some("bc"));
    }

    #[test]
    fn catch_all_takes_the_remainder() {
        let t = tree(&["/files/*rest", "/files/readme"]);
        let (_, params) = hit(&t, "/files/a/b/c").unwrap();
        assert_eq!(params.get("rest"), Some("a/b/c"));
        let (_, params) = hit(&t, "/files/").unwrap();
        assert_eq!(params.get("rest"), Some(""));
        assert_eq!(hit(&t, "/files/readme").map(|(v, _)| *v), Some("/files/readme"));
    }

    #[test]
    fn parameter_and_catch_all_conflict() {
        let mut t: Tree<()> = Tree::new();
        t.insert("/x/:id", ()).unwrap();
        assert!(matches!(t.insert("/x/*rest", ()), Err(RouteError::Conflict { .. })));

        let mut t: Tree<()> = Tree::new();
        t.insert("/x/*rest", ()).unwrap();
        assert!(matches!(t.insert("/x/:id", ()), Err(RouteError::Conflict { .. })));

        let mut t: Tree<()> = Tree::new();
        t.insert("/x/:id", ()).unwrap();
        assert!(matches!(t.insert("/x/:name/y", ()), Err(RouteError::Conflict { .. })));
    }

    #[test]
    fn duplicates_are_rejected() {
        let mut t: Tree<()> = Tree::new();
        t.insert("/a/:id", ()).unwrap();
        assert_eq!(t.insert("/a/:id", ()), Err(RouteError::Duplicate("/a/:id".into())));
        t.insert("/f/*p", ()).unwrap();
        assert_eq!(t.insert("/f/*p", ()), Err(RouteError::Duplicate("/f/*p".into())));
    }

    #[test]
    fn trailing_slash_is_recommended_both_ways() {
        let t = tree(&["/foo/", "/bar", "/files/*rest"]);
        assert!(matches!(t.lookup("/foo"), Lookup::Redirect));
        assert!(matches!(t.lookup("/bar/"), Lookup::Redirect));
        assert!(matches!(t.lookup("/files"), Lookup::Redirect));
        assert!(matches!(t.lookup("/baz"), Lookup::Miss));
        assert!(matches!(t.lookup("/"), Lookup::Miss));
    }

    #[test]
    fn missing_slash_is_found_through_params_and_split_prefixes() {
        let t = tree(&["/users/:id/", "/org/:org/repos/", "/team", "/teams/", "/blob/:ref/*path"]);
        assert!(matches!(t.lookup("/users/42"), Lookup::Redirect));
        assert!(matches!(t.lookup("/org/acme/repos"), Lookup::Redirect));
        assert!(matches!(t.lookup("/teams"), Lookup::Redirect));
        assert!(matches!(t.lookup("/blob/main"), Lookup::Redirect));
        assert!(matches!(t.lookup("/org/acme"), Lookup::Miss));
        assert!(matches!(t.lookup("/users"), Lookup::Miss));
    }

    #[test]
    fn contains_ignores_parameters() {
        let t = tree(&["/a/:id", "/b/*rest"]);
        assert!(t.contains("/a/1"));
        assert!(t.contains("/b/"));
        assert!(!t.contains("/a/"));
        assert!(!t.contains("/c"));
    }

    #[test]
    fn values_lists_every_route() {
        let t = tree(&["/a", "/a/:id", "/b/*rest"]);
        let mut values: Vec<_> = t.values().into_iter().copied().collect();
        values.sort_unstable();
        assert_eq!(values, ["/a", "/a/:id", "/b/*rest"]);
    }
}
