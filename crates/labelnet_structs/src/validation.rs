//! Field checks shared by the create and edit operations.

/// A user-supplied field that failed validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("{field} must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },

    #[error("invalid color {0:?}, expected #rrggbb")]
    InvalidColor(String),

    #[error("at most {max} keywords are allowed, got {count}")]
    TooManyKeywords { count: usize, max: usize },

    #[error("invalid area: {0}")]
    InvalidArea(&'static str),

    #[error("{field} must be between {min} and {max}")]
    OutOfRange {
        field: &'static str,
        min: u32,
        max: u32,
    },
}

/// Checks that a required text field is present and short enough.
///
/// # Errors
///
/// Returns an error if the trimmed value is empty or longer than `max` characters.
pub fn check_name(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Empty { field });
    }
    check_length(field, value, max)
}

/// Checks that a text field is not longer than `max` characters.
///
/// # Errors
///
/// Returns an error if the value is too long.
pub fn check_length(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(())
}

/// Checks a `#rrggbb` color string.
///
/// # Errors
///
/// Returns an error if the string is not `#` followed by six hex digits.
pub fn validate_color(color: &str) -> Result<(), ValidationError> {
    let valid = color.len() == 7
        && color.starts_with('#')
        && color[1..].chars().all(|c| c.is_ascii_hexdigit());

    if valid {
        Ok(())
    } else {
        Err(ValidationError::InvalidColor(color.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_accepts_hex() {
        assert!(validate_color("#ffffff").is_ok());
        assert!(validate_color("#A0b1C2").is_ok());
    }

    #[test]
    fn test_color_rejects_malformed() {
        for color in ["ffffff", "#fff", "#gggggg", "#ffffff0", ""] {
            assert!(validate_color(color).is_err(), "{color} should be rejected");
        }
    }

    #[test]
    fn test_check_name() {
        assert!(check_name("name", "cats", 200).is_ok());
        assert_eq!(
            check_name("name", "   ", 200),
            Err(ValidationError::Empty { field: "name" })
        );
        assert_eq!(
            check_name("name", "abcdef", 5),
            Err(ValidationError::TooLong {
                field: "name",
                max: 5
            })
        );
    }
}
