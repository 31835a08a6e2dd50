//! Small text helpers shared by the services

use crate::core::error::{AppError, Result};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref NON_ALNUM: Regex = Regex::new(r"[^a-z0-9]+").unwrap();
    static ref EMAIL: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    static ref PERMISSION_NAME: Regex = Regex::new(r"^[a-z][a-z_]*:[a-z][a-z_]*$").unwrap();
}

/// Lowercase ASCII slug: `"The Rust Book!"` -> `"the-rust-book"`
pub fn slugify(input: &str) -> String {
    let folded: String = input
        .chars()
        .flat_map(char::to_lowercase)
        .map(fold_diacritic)
        .collect();
    NON_ALNUM
        .replace_all(&folded, "-")
        .trim_matches('-')
        .to_string()
}

fn fold_diacritic(c: char) -> char {
    match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ạ' | 'ả' | 'ă' | 'ắ' | 'ằ' | 'ẳ' | 'ẵ' | 'ặ' | 'ấ' | 'ầ' | 'ẩ'
        | 'ẫ' | 'ậ' => 'a',
        'è' | 'é' | 'ê' | 'ë' | 'ẹ' | 'ẻ' | 'ẽ' | 'ế' | 'ề' | 'ể' | 'ễ' | 'ệ' => 'e',
        'ì' | 'í' | 'î' | 'ï' | 'ị' | 'ỉ' | 'ĩ' => 'i',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ọ' | 'ỏ' | 'ơ' | 'ố' | 'ồ' | 'ổ' | 'ỗ' | 'ộ' | 'ớ' | 'ờ' | 'ở' | 'ỡ'
        | 'ợ' => 'o',
        'ù' | 'ú' | 'û' | 'ü' | 'ụ' | 'ủ' | 'ũ' | 'ư' | 'ứ' | 'ừ' | 'ử' | 'ữ' | 'ự' => 'u',
        'ý' | 'ÿ' | 'ỳ' | 'ỵ' | 'ỷ' | 'ỹ' => 'y',
        'đ' => 'd',
        'ñ' => 'n',
        'ç' => 'c',
        other => other,
    }
}

/// Slug from an explicit value or derived from a name; never empty
pub fn slug_or_derive(explicit: Option<&str>, name: &str) -> Result<String> {
    let slug = slugify(explicit.unwrap_or(name));
    if slug.is_empty() {
        return Err(AppError::ValidationError(format!(
            "Cannot derive a slug from '{}'",
            name
        )));
    }
    Ok(slug)
}

/// Number of whitespace separated words
pub fn word_count(text: &str) -> i64 {
    text.split_whitespace().count() as i64
}

pub fn validate_email(email: &str) -> Result<()> {
    if !EMAIL.is_match(email) {
        return Err(AppError::ValidationError(format!("Invalid email address: {}", email)));
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < 8 {
        return Err(AppError::ValidationError(
            "Password must be at least 8 characters".to_string(),
        ));
    }
    Ok(())
}

/// Permission names take the form `resource:action`
pub fn validate_permission_name(name: &str) -> Result<()> {
    if !PERMISSION_NAME.is_match(name) {
        return Err(AppError::ValidationError(format!(
            "Permission name must look like 'resource:action', got '{}'",
            name
        )));
    }
    Ok(())
}

/// Reject blank required strings
pub fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AppError::ValidationError(format!("{} cannot be empty", field)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("The Rust Programming Language"), "the-rust-programming-language");
        assert_eq!(slugify("  Sci-Fi & Fantasy!! "), "sci-fi-fantasy");
        assert_eq!(slugify("Tiểu thuyết Đời"), "tieu-thuyet-doi");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_slug_or_derive() {
        assert_eq!(slug_or_derive(Some("Custom Slug"), "ignored").unwrap(), "custom-slug");
        assert_eq!(slug_or_derive(None, "Science Fiction").unwrap(), "science-fiction");
        assert!(slug_or_derive(None, "???").is_err());
    }

    #[test]
    fn test_word_count() {
        assert_eq!(word_count("one two\nthree\t four"), 4);
        assert_eq!(word_count("   "), 0);
    }

    #[test]
    fn test_validators() {
        assert!(validate_email("reader@example.com").is_ok());
        assert!(validate_email("not-an-email").is_err());
        assert!(validate_password("longenough").is_ok());
        assert!(validate_password("short").is_err());
        assert!(validate_permission_name("book:create").is_ok());
        assert!(validate_permission_name("logs:read").is_ok());
        assert!(validate_permission_name("Book").is_err());
        assert!(require_non_empty("title", "  ").is_err());
    }
}
