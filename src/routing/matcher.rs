//! Mapping pattern matching.
//!
//! # Responsibilities
//! - Classify a mapping pattern by shape (prefix, extension, exact, default)
//! - Decide whether a request path is served by a pattern
//! - Compute the base path used later for servlet-path/path-info math
//!
//! # Design Decisions
//! - Patterns are classified once at startup; matching is allocation-free until a hit
//! - Matching is case-sensitive
//! - No wildcard in the middle, no path parameters

use std::fmt;

/// The literal default pattern.
pub const DEFAULT_MAPPING: &str = "/";

/// A classified mapping pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mapping {
    /// `/prefix/*`, stored without the trailing `*` (so it keeps its `/`).
    Prefix(String),
    /// `*.ext`, stored as `.ext`.
    Extension(String),
    /// Exact path.
    Exact(String),
    /// `/`, serves every path.
    Default,
}

impl Mapping {
    /// Classify a raw pattern.
    pub fn parse(pattern: &str) -> Self {
        if let Some(prefix) = pattern.strip_suffix('*').filter(|p| p.ends_with('/')) {
            Mapping::Prefix(prefix.to_string())
        } else if let Some(extension) = pattern.strip_prefix('*').filter(|e| e.starts_with('.')) {
            Mapping::Extension(extension.to_string())
        } else if pattern == DEFAULT_MAPPING {
            Mapping::Default
        } else {
            Mapping::Exact(pattern.to_string())
        }
    }

    /// Returns the base path when `path` is served by this mapping.
    pub fn base_path(&self, path: &str) -> Option<String> {
        match self {
            Mapping::Prefix(prefix) if path.starts_with(prefix.as_str()) => Some(prefix.clone()),
            Mapping::Extension(extension) if path.ends_with(extension.as_str()) => {
                Some(path.to_string())
            }
            Mapping::Exact(exact) if exact == path => Some(exact.clone()),
            Mapping::Default => Some(DEFAULT_MAPPING.to_string()),
            _ => None,
        }
    }

    /// True for the `/` mapping.
    pub fn is_default(&self) -> bool {
        matches!(self, Mapping::Default)
    }
}

impl fmt::Display for Mapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mapping::Prefix(prefix) => write!(f, "{}*", prefix),
            Mapping::Extension(extension) => write!(f, "*{}", extension),
            Mapping::Exact(exact) => f.write_str(exact),
            Mapping::Default => f.write_str(DEFAULT_MAPPING),
        }
    }
}

/// Match a raw pattern against a path, returning the base path on success.
pub fn match_mapping(pattern: &str, path: &str) -> Option<String> {
    Mapping::parse(pattern).base_path(path)
}

/// Checks that a pattern has one of the supported shapes.
pub fn is_valid_pattern(pattern: &str) -> bool {
    match Mapping::parse(pattern) {
        Mapping::Prefix(prefix) => prefix.starts_with('/') && !prefix.contains('*'),
        Mapping::Extension(extension) => extension.len() > 1 && !extension.contains(['*', '/']),
        Mapping::Exact(exact) => exact.starts_with('/') && !exact.contains('*'),
        Mapping::Default => true,
    }
}
