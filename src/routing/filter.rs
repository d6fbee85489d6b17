//! Endpoint filtering.
//!
//! # Matching
//! - A plain pattern matches a route path only when the strings are equal
//! - A pattern ending in `/*` matches every path starting with the pattern
//!   minus the `*`: `/admin/*` matches `/admin/users`, not `/admin`
//! - Matching is case-sensitive
//! - Trailing slashes are not normalized: `/users/` does not match `/users`
//! - A pattern matching nothing is inert
//!
//! Filtering is pure and keeps the input order.

use std::collections::BTreeSet;

use thiserror::Error;

use crate::routing::route::{RouteCollection, RouteEntry};

/// Include and exclude sets were both given.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("include_endpoints and exclude_endpoints are mutually exclusive")]
pub struct SelectionConflict;

/// Which endpoints of a service are exposed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EndpointSelection {
    /// Every endpoint.
    #[default]
    All,
    /// Only endpoints matching one of the patterns.
    Include(BTreeSet<String>),
    /// Every endpoint except those matching one of the patterns.
    Exclude(BTreeSet<String>),
}

impl EndpointSelection {
    /// Build a selection from optional include/exclude sets. Empty sets count
    /// as absent.
    pub fn from_sets(
        include: Option<BTreeSet<String>>,
        exclude: Option<BTreeSet<String>>,
    ) -> Result<Self, SelectionConflict> {
        let include = include.filter(|s| !s.is_empty());
        let exclude = exclude.filter(|s| !s.is_empty());
        match (include, exclude) {
            (Some(_), Some(_)) => Err(SelectionConflict),
            (Some(include), None) => Ok(Self::Include(include)),
            (None, Some(exclude)) => Ok(Self::Exclude(exclude)),
            (None, None) => Ok(Self::All),
        }
    }

    pub fn include<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Include(patterns.into_iter().map(Into::into).collect())
    }

    pub fn exclude<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Exclude(patterns.into_iter().map(Into::into).collect())
    }

    pub fn included(&self) -> Option<&BTreeSet<String>> {
        match self {
            Self::Include(patterns) => Some(patterns),
            _ => None,
        }
    }

    pub fn excluded(&self) -> Option<&BTreeSet<String>> {
        match self {
            Self::Exclude(patterns) => Some(patterns),
            _ => None,
        }
    }
}

/// A compiled include/exclude pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointPattern {
    Exact(String),
    /// Stored with its trailing `/`.
    Subtree(String),
}

impl EndpointPattern {
    pub fn parse(pattern: &str) -> Self {
        match pattern.strip_suffix('*') {
            Some(prefix) if prefix.ends_with('/') => Self::Subtree(prefix.to_string()),
            _ => Self::Exact(pattern.to_string()),
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        match self {
            Self::Exact(expected) => path == expected,
            Self::Subtree(prefix) => path.len() > prefix.len() && path.starts_with(prefix.as_str()),
        }
    }
}

fn compile(patterns: &BTreeSet<String>) -> Vec<EndpointPattern> {
    patterns.iter().map(|p| EndpointPattern::parse(p)).collect()
}

fn matches_any(patterns: &[EndpointPattern], entry: &RouteEntry) -> bool {
    patterns.iter().any(|p| p.matches(entry.path()))
}

/// Apply `selection` to `routes`. The result shares entries with `routes`.
pub fn filter_routes(routes: &RouteCollection, selection: &EndpointSelection) -> RouteCollection {
    match selection {
        EndpointSelection::All => routes.clone(),
        EndpointSelection::Include(patterns) => {
            let patterns = compile(patterns);
            routes.filtered(|entry| matches_any(&patterns, entry))
        }
        EndpointSelection::Exclude(patterns) => {
            let patterns = compile(patterns);
            routes.filtered(|entry| !matches_any(&patterns, entry))
        }
    }
}
