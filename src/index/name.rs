//! Index name validation

use std::sync::OnceLock;

use regex::Regex;

use super::IndexError;

/// Longest name the index service accepts
pub const MAX_INDEX_NAME_LEN: usize = 45;

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-z0-9](?:[a-z0-9-]*[a-z0-9])?$").expect("must compile index name pattern")
    })
}

/// Check a knowledge base name against the service's rules
///
/// Names are 1-45 characters of lowercase letters, digits and hyphens, and
/// start and end with a letter or digit.
pub fn validate_index_name(name: &str) -> Result<(), IndexError> {
    if name.len() > MAX_INDEX_NAME_LEN || !name_pattern().is_match(name) {
        return Err(IndexError::InvalidName(name.to_string()));
    }
    Ok(())
}
