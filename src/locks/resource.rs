//! Resource identifier normalization and glob interference.
//!
//! A resource is a project-relative path or glob pattern. Normalization is
//! purely lexical (the resource need not exist) and rejects anything that
//! would escape the project root.

use crate::error::{LatchError, Result};
use globset::{GlobBuilder, GlobMatcher};
use std::path::Path;

/// Characters that make a resource a glob pattern.
const GLOB_CHARS: &[char] = &['*', '?', '[', '{'];

/// Longest escaped file name we are willing to create (before `.lock`).
const MAX_FILE_STEM: usize = 240;

/// A validated, normalized resource identifier.
#[derive(Debug, Clone)]
pub struct Resource {
    normalized: String,
    matcher: Option<GlobMatcher>,
}

impl Resource {
    /// Normalize `raw` relative to `root`.
    ///
    /// - backslashes become `/`
    /// - `.` components are dropped and `..` is resolved lexically
    /// - an absolute path must lie inside `root` and is made relative
    /// - empty, root-only, NUL-containing, or escaping identifiers are rejected
    pub fn parse(root: &Path, raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Err(LatchError::Validation(
                "resource must not be empty".to_string(),
            ));
        }
        if raw.contains('\0') {
            return Err(LatchError::Validation(
                "resource must not contain NUL bytes".to_string(),
            ));
        }

        let unified = raw.replace('\\', "/");
        let relative = if is_absolute(&unified) {
            strip_root(root, &unified).ok_or_else(|| {
                LatchError::Validation(format!(
                    "resource '{}' is outside the project root '{}'",
                    raw,
                    root.display()
                ))
            })?
        } else {
            unified
        };

        let mut parts: Vec<&str> = Vec::new();
        for component in relative.split('/') {
            match component {
                "" | "." => {}
                ".." => {
                    if parts.pop().is_none() {
                        return Err(LatchError::Validation(format!(
                            "resource '{}' escapes the project root",
                            raw
                        )));
                    }
                }
                part => parts.push(part),
            }
        }

        if parts.is_empty() {
            return Err(LatchError::Validation(format!(
                "resource '{}' names the project root itself",
                raw
            )));
        }

        let normalized = parts.join("/");
        let matcher = if is_glob(&normalized) {
            let glob = GlobBuilder::new(&normalized)
                .literal_separator(true)
                .build()
                .map_err(|e| {
                    LatchError::Validation(format!("invalid glob pattern '{}': {}", raw, e))
                })?;
            Some(glob.compile_matcher())
        } else {
            None
        };

        let resource = Self {
            normalized,
            matcher,
        };

        if resource.file_stem().len() > MAX_FILE_STEM {
            return Err(LatchError::Validation(format!(
                "resource '{}' is too long",
                raw
            )));
        }

        Ok(resource)
    }

    pub fn as_str(&self) -> &str {
        &self.normalized
    }

    pub fn is_pattern(&self) -> bool {
        self.matcher.is_some()
    }

    /// Lock file name for this resource.
    pub fn file_name(&self) -> String {
        format!("{}.lock", self.file_stem())
    }

    /// Injective escaping: bytes outside `[A-Za-z0-9._-]` become `%XX`.
    fn file_stem(&self) -> String {
        let mut out = String::with_capacity(self.normalized.len());
        for byte in self.normalized.bytes() {
            match byte {
                b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'.' | b'_' | b'-' => {
                    out.push(byte as char)
                }
                _ => out.push_str(&format!("%{:02X}", byte)),
            }
        }
        out
    }

    /// Whether this resource and `other` (a normalized resource of another
    /// lock) could name the same file.
    ///
    /// Symmetric: a pattern interferes with every path it matches, and a path
    /// interferes with every pattern that matches it. Two patterns interfere
    /// when either matches the other's text.
    pub fn interferes_with(&self, other: &Resource) -> bool {
        if self.normalized == other.normalized {
            return true;
        }
        let forward = self
            .matcher
            .as_ref()
            .is_some_and(|m| m.is_match(&other.normalized));
        let backward = other
            .matcher
            .as_ref()
            .is_some_and(|m| m.is_match(&self.normalized));
        forward || backward
    }
}

impl PartialEq for Resource {
    fn eq(&self, other: &Self) -> bool {
        self.normalized == other.normalized
    }
}

impl Eq for Resource {}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.normalized)
    }
}

fn is_glob(s: &str) -> bool {
    s.contains(GLOB_CHARS)
}

fn is_absolute(s: &str) -> bool {
    s.starts_with('/') || Path::new(s).is_absolute()
}

fn strip_root(root: &Path, absolute: &str) -> Option<String> {
    let root = root.to_string_lossy().replace('\\', "/");
    let root = root.trim_end_matches('/');
    if absolute == root {
        return Some(String::new());
    }
    absolute
        .strip_prefix(root)
        .and_then(|rest| rest.strip_prefix('/'))
        .map(str::to_string)
}
