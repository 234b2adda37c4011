//! jokebox/crates/jb-core/src/lib.rs
//!
//! The central domain model and interface definitions for Jokebox.

pub mod documents;
pub mod error;
pub mod models;
pub mod traits;

// Re-exporting for easier access in other crates
pub use error::*;
pub use models::*;
pub use traits::*;

/// Longest accepted joke setup, in characters.
pub const MAX_SETUP_CHARS: usize = 500;
/// Longest accepted punchline, in characters.
pub const MAX_PUNCHLINE_CHARS: usize = 300;

/// Trims user text and enforces the non-empty and length rules.
pub fn validate_text(label: &str, raw: &str, max_chars: usize) -> Result<String> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(AppError::validation(format!("{label} must not be empty")));
    }
    if text.chars().count() > max_chars {
        return Err(AppError::validation(format!(
            "{label} must be at most {max_chars} characters"
        )));
    }
    Ok(text.to_string())
}

/// Usernames: 3 to 30 characters of ASCII letters, digits, `_` or `.`.
pub fn validate_username(raw: &str) -> Result<String> {
    let name = raw.trim();
    let len = name.chars().count();
    if !(3..=30).contains(&len) {
        return Err(AppError::validation("username must be 3 to 30 characters"));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.') {
        return Err(AppError::validation(
            "username may only contain letters, digits, '_' and '.'",
        ));
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_is_trimmed_and_bounded() {
        assert_eq!(validate_text("setup", "  hi  ", 10).unwrap(), "hi");
        assert!(validate_text("setup", "   ", 10).is_err());
        assert!(validate_text("setup", &"x".repeat(11), 10).is_err());
    }

    #[test]
    fn usernames_follow_charset() {
        assert_eq!(validate_username(" dad.jokes_1 ").unwrap(), "dad.jokes_1");
        assert!(validate_username("no spaces").is_err());
        assert!(validate_username("ab").is_err());
    }
}
