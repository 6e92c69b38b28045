//! Names accepted for prefixes and scopes.

use crate::error::Error;

/// A valid name starts with an ASCII letter followed by letters, digits or `-`.
pub fn is_valid(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '-')
        }
        _ => false,
    }
}

/// Return `name` as an owned string, or an `InvalidName` error labelled with `what`.
pub fn validate(what: &'static str, name: &str) -> Result<String, Error> {
    if is_valid(name) {
        Ok(name.to_string())
    } else {
        Err(Error::InvalidName {
            what,
            name: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        assert!(is_valid("uk"));
        assert!(is_valid("uk-scope"));
        assert!(is_valid("uk-2scope"));
        assert!(is_valid("X"));
        assert!(is_valid("my-lib-"));
    }

    #[test]
    fn test_invalid_names() {
        assert!(!is_valid(""));
        assert!(!is_valid("2scope"));
        assert!(!is_valid("-uk"));
        assert!(!is_valid("uk scope"));
        assert!(!is_valid("uk_scope"));
        assert!(!is_valid(".uk"));
        assert!(!is_valid("ük"));
    }

    #[test]
    fn test_validate_reports_name() {
        let err = validate("scope-name", "9lives").unwrap_err();
        assert!(err.to_string().contains("illegal scope-name: '9lives'"));
        assert_eq!(validate("prefix", "xy").unwrap(), "xy");
    }
}
