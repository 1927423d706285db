//! Agent identity validation.
//!
//! Identities are opaque tokens supplied by the caller and trusted as-is; only
//! their syntax is checked, so they are safe to embed in records, events and
//! notification text.

use crate::error::{LatchError, Result};
use regex::Regex;
use std::sync::LazyLock;

static IDENTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.@:-]{0,63}$").expect("identity regex is valid")
});

/// Check whether `id` is a syntactically valid agent identity.
pub fn is_valid(id: &str) -> bool {
    IDENTITY_RE.is_match(id)
}

/// Validate an agent identity, naming the field in the error message.
pub fn validate(field: &str, id: &str) -> Result<()> {
    if is_valid(id) {
        Ok(())
    } else {
        Err(LatchError::Validation(format!(
            "invalid {} '{}': expected 1-64 characters of [A-Za-z0-9_.@:-], starting with a letter or digit",
            field, id
        )))
    }
}
