use url::Url;

pub const CATEGORY_NAME_MIN: usize = 2;
pub const CATEGORY_NAME_MAX: usize = 30;
pub const BOOKMARK_NAME_MIN: usize = 2;
pub const NOTE_MAX: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Name must be at least {0} characters")]
    TooShort(usize),
    #[error("Name must be at most {0} characters")]
    TooLong(usize),
    #[error("Name may only contain letters, numbers and spaces")]
    InvalidCharacters,
    #[error("Name cannot start or end with a space")]
    SurroundingWhitespace,
    #[error("Please enter a valid URL")]
    InvalidUrl,
    #[error("Note must be at most {NOTE_MAX} characters")]
    NoteTooLong,
    #[error("Username must be 3-30 characters of lowercase letters, numbers or underscores")]
    InvalidUsername,
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == ' '
}

fn check_name(name: &str, min: usize, max: Option<usize>) -> Result<(), ValidationError> {
    if name.trim().chars().count() < min {
        return Err(ValidationError::TooShort(min));
    }
    if let Some(max) = max {
        if name.chars().count() > max {
            return Err(ValidationError::TooLong(max));
        }
    }
    if !name.chars().all(is_name_char) {
        return Err(ValidationError::InvalidCharacters);
    }
    if name.starts_with(' ') || name.ends_with(' ') {
        return Err(ValidationError::SurroundingWhitespace);
    }
    Ok(())
}

pub fn validate_bookmark_name(name: &str) -> Result<(), ValidationError> {
    check_name(name, BOOKMARK_NAME_MIN, None)
}

pub fn validate_category_name(name: &str) -> Result<(), ValidationError> {
    check_name(name, CATEGORY_NAME_MIN, Some(CATEGORY_NAME_MAX))
}

/// True when `raw` starts with `scheme://`.
fn has_scheme(raw: &str) -> bool {
    let Some((scheme, _)) = raw.split_once("://") else {
        return false;
    };
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '.' | '-'))
}

/// Returns the URL with `https://` prepended when the input carries no scheme.
/// The host must contain a dot, which rules out `localhost` and bare words.
pub fn normalize_url(raw: &str) -> Result<String, ValidationError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ValidationError::InvalidUrl);
    }
    let candidate = if has_scheme(raw) {
        raw.to_string()
    } else {
        format!("https://{}", raw)
    };

    let parsed = Url::parse(&candidate).map_err(|_| ValidationError::InvalidUrl)?;
    match parsed.host_str() {
        Some(host) if host.contains('.') => Ok(candidate),
        _ => Err(ValidationError::InvalidUrl),
    }
}

pub fn validate_note(note: &str) -> Result<(), ValidationError> {
    if note.chars().count() > NOTE_MAX {
        return Err(ValidationError::NoteTooLong);
    }
    Ok(())
}

pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    let len = username.chars().count();
    let valid_chars = username
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if !(3..=30).contains(&len) || !valid_chars {
        return Err(ValidationError::InvalidUsername);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bookmark_names() {
        assert!(validate_bookmark_name("Rust Book").is_ok());
        assert!(validate_bookmark_name("ab").is_ok());
        assert_eq!(validate_bookmark_name("a"), Err(ValidationError::TooShort(2)));
        assert_eq!(validate_bookmark_name("  a "), Err(ValidationError::TooShort(2)));
        assert_eq!(
            validate_bookmark_name(" Docs"),
            Err(ValidationError::SurroundingWhitespace)
        );
        assert_eq!(
            validate_bookmark_name("Docs!"),
            Err(ValidationError::InvalidCharacters)
        );
    }

    #[test]
    fn category_names() {
        assert!(validate_category_name("Work").is_ok());
        assert_eq!(
            validate_category_name(&"x".repeat(31)),
            Err(ValidationError::TooLong(30))
        );
        assert!(validate_category_name(&"x".repeat(30)).is_ok());
        assert_eq!(
            validate_category_name("Work/Play"),
            Err(ValidationError::InvalidCharacters)
        );
    }

    #[test]
    fn urls_get_scheme_and_need_dotted_host() {
        assert_eq!(normalize_url("example.com").unwrap(), "https://example.com");
        assert_eq!(
            normalize_url("http://example.com/a?b=1").unwrap(),
            "http://example.com/a?b=1"
        );
        assert_eq!(
            normalize_url("example.com/login?next=https://other.org").unwrap(),
            "https://example.com/login?next=https://other.org"
        );
        assert_eq!(normalize_url("localhost"), Err(ValidationError::InvalidUrl));
        assert_eq!(normalize_url("not a url"), Err(ValidationError::InvalidUrl));
        assert_eq!(normalize_url(""), Err(ValidationError::InvalidUrl));
    }

    #[test]
    fn notes_and_usernames() {
        assert!(validate_note(&"n".repeat(100)).is_ok());
        assert_eq!(validate_note(&"n".repeat(101)), Err(ValidationError::NoteTooLong));
        assert!(validate_username("link_fan42").is_ok());
        assert!(validate_username("No").is_err());
        assert!(validate_username("Upper").is_err());
    }
}
