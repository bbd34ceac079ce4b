//! Pathspec matching over repository-relative paths.
//!
//! Semantics follow the CLI contract: an empty pathspec (or `.`) matches the
//! whole repository; globs use `*` for a single segment and `**` for any
//! number of segments; a bare directory name matches everything beneath it.

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::errors::NtError;

/// A compiled set of pathspecs.
#[derive(Debug)]
pub struct PathSpec {
    /// None = match everything.
    set: Option<GlobSet>,
}

impl PathSpec {
    /// Compile CLI pathspec arguments. Empty input matches everything.
    pub fn compile(specs: &[String]) -> Result<PathSpec, NtError> {
        // `.` and empty strings widen to the whole repository.
        let effective: Vec<&String> = specs
            .iter()
            .filter(|s| !s.is_empty() && s.as_str() != ".")
            .collect();
        if effective.is_empty() {
            return Ok(PathSpec { set: None });
        }

        let mut builder = GlobSetBuilder::new();
        for spec in effective {
            let normalized = spec.trim_end_matches('/');
            for pattern in [normalized.to_string(), format!("{normalized}/**")] {
                let glob = Glob::new(&pattern)
                    .map_err(|e| NtError::InvalidPathspec(spec.clone(), e.to_string()))?;
                builder.add(glob);
            }
        }
        let set = builder
            .build()
            .map_err(|e| NtError::InvalidPathspec(specs.join(" "), e.to_string()))?;
        Ok(PathSpec { set: Some(set) })
    }

    /// Match everything.
    pub fn all() -> PathSpec {
        PathSpec { set: None }
    }

    pub fn matches(&self, rel_path: &str) -> bool {
        match &self.set {
            None => true,
            Some(set) => set.is_match(rel_path),
        }
    }
}
