//! Route entries and collections.
//!
//! A [`RouteCollection`] is what a service module exports. Entries are held
//! behind `Arc` so filtered collections share them with their source.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use axum::handler::Handler;
use axum::http::Method;
use axum::routing::{on, MethodFilter, MethodRouter};
use axum::Router;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("route path '{0}' must start with '/'")]
    InvalidPath(String),

    #[error("route '{0}' declares no HTTP methods")]
    NoMethods(String),

    #[error("method {method} is not supported for route '{path}'")]
    UnsupportedMethod { path: String, method: String },

    #[error("route {method} {path} is declared more than once")]
    Duplicate { path: String, method: String },
}

/// One endpoint: a path pattern, the methods it answers and its handler.
pub struct RouteEntry {
    path: String,
    methods: Vec<Method>,
    handler: MethodRouter,
    metadata: BTreeMap<String, String>,
}

impl RouteEntry {
    /// Create an entry answering `methods` on `path`.
    pub fn new<H, T>(
        path: impl Into<String>,
        methods: impl IntoIterator<Item = Method>,
        handler: H,
    ) -> Result<Self, RouteError>
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        let path = path.into();
        if !path.starts_with('/') {
            return Err(RouteError::InvalidPath(path));
        }

        let mut methods: Vec<Method> = methods.into_iter().collect();
        methods.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        methods.dedup();

        let mut filter: Option<MethodFilter> = None;
        for method in &methods {
            let single = MethodFilter::try_from(method.clone()).map_err(|_| RouteError::UnsupportedMethod {
                path: path.clone(),
                method: method.to_string(),
            })?;
            filter = Some(match filter {
                Some(acc) => acc.or(single),
                None => single,
            });
        }
        let filter = filter.ok_or_else(|| RouteError::NoMethods(path.clone()))?;

        Ok(Self {
            handler: on(filter, handler),
            path,
            methods,
            metadata: BTreeMap::new(),
        })
    }

    /// Shorthand for a `GET` entry.
    pub fn get<H, T>(path: impl Into<String>, handler: H) -> Result<Self, RouteError>
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        Self::new(path, [Method::GET], handler)
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    pub fn handler(&self) -> &MethodRouter {
        &self.handler
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }
}

impl fmt::Debug for RouteEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteEntry")
            .field("path", &self.path)
            .field("methods", &self.methods)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

/// Ordered set of route entries exported by a service.
#[derive(Clone, Default)]
pub struct RouteCollection {
    entries: Vec<Arc<RouteEntry>>,
}

impl RouteCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a collection, rejecting duplicate (path, method) pairs.
    pub fn try_from_entries(entries: impl IntoIterator<Item = RouteEntry>) -> Result<Self, RouteError> {
        let mut collection = Self::new();
        for entry in entries {
            collection.push(entry)?;
        }
        Ok(collection)
    }

    pub fn push(&mut self, entry: RouteEntry) -> Result<(), RouteError> {
        for existing in self.entries.iter().filter(|e| e.path == entry.path) {
            if let Some(method) = entry.methods.iter().find(|m| existing.methods.contains(m)) {
                return Err(RouteError::Duplicate {
                    path: entry.path,
                    method: method.to_string(),
                });
            }
        }
        self.entries.push(Arc::new(entry));
        Ok(())
    }

    /// Builder-style [`push`](Self::push).
    pub fn with_route(mut self, entry: RouteEntry) -> Result<Self, RouteError> {
        self.push(entry)?;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<RouteEntry>> {
        self.entries.iter()
    }

    /// Paths in collection order. A path answering several methods through
    /// separate entries appears once per entry.
    pub fn paths(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.path()).collect()
    }

    pub fn contains_path(&self, path: &str) -> bool {
        self.entries.iter().any(|e| e.path == path)
    }

    /// Axum router serving every entry at its path.
    ///
    /// Panics when a path is not valid axum route syntax (for example
    /// `/:id`); callers building from untrusted tables catch the unwind.
    pub fn to_router(&self) -> Router {
        self.entries
            .iter()
            .fold(Router::new(), |router, entry| router.route(&entry.path, entry.handler.clone()))
    }

    /// New collection sharing the entries `keep` accepts, in order.
    pub(crate) fn filtered(&self, mut keep: impl FnMut(&RouteEntry) -> bool) -> Self {
        Self {
            entries: self.entries.iter().filter(|e| keep(e)).cloned().collect(),
        }
    }
}

impl fmt::Debug for RouteCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn ok() -> &'static str {
        "ok"
    }

    #[test]
    fn test_entry_requires_leading_slash() {
        let err = RouteEntry::get("users", ok).unwrap_err();
        assert_eq!(err, RouteError::InvalidPath("users".into()));
    }

    #[test]
    fn test_entry_requires_methods() {
        let err = RouteEntry::new("/users", Vec::<Method>::new(), ok).unwrap_err();
        assert!(matches!(err, RouteError::NoMethods(_)));
    }

    #[test]
    fn test_methods_deduplicated() {
        let entry = RouteEntry::new("/users", [Method::POST, Method::GET, Method::GET], ok).unwrap();
        assert_eq!(entry.methods(), &[Method::GET, Method::POST]);
    }

    #[test]
    fn test_duplicate_path_method_rejected() {
        let mut routes = RouteCollection::new();
        routes.push(RouteEntry::get("/users", ok).unwrap()).unwrap();
        // Same path, different method is fine.
        routes.push(RouteEntry::new("/users", [Method::POST], ok).unwrap()).unwrap();

        let err = routes
            .push(RouteEntry::new("/users", [Method::DELETE, Method::GET], ok).unwrap())
            .unwrap_err();
        assert_eq!(
            err,
            RouteError::Duplicate {
                path: "/users".into(),
                method: "GET".into()
            }
        );
        assert_eq!(routes.len(), 2);
    }

    #[test]
    fn test_collection_keeps_order() {
        let routes = RouteCollection::try_from_entries([
            RouteEntry::get("/b", ok).unwrap(),
            RouteEntry::get("/a", ok).unwrap().with_metadata("summary", "A"),
        ])
        .unwrap();
        assert_eq!(routes.paths(), vec!["/b", "/a"]);
        assert!(routes.contains_path("/a"));
        assert_eq!(routes.iter().nth(1).unwrap().metadata()["summary"], "A");
    }
}
