//! Identifier and type-name validation.
//!
//! Identifiers are never escaped: anything outside the allowed alphabet is
//! rejected, and valid identifiers are always double-quoted on output.

use std::fmt;

use crate::error::{Result, SqlError};

/// A validated SQL identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ident(String);

impl Ident {
    /// Validates `name` as an identifier.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError::InvalidIdentifier`] when `name` is empty or
    /// contains a character outside `[A-Za-z0-9_-]`.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if is_valid_identifier(&name) {
            Ok(Self(name))
        } else {
            Err(SqlError::InvalidIdentifier(name))
        }
    }

    /// Returns the unquoted name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the double-quoted form.
    #[must_use]
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", self.0)
    }
}

/// Returns true when `name` is a non-empty `[A-Za-z0-9_-]+` identifier.
#[must_use]
pub fn is_valid_identifier(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Validates and double-quotes an identifier.
///
/// # Errors
///
/// Returns [`SqlError::InvalidIdentifier`] for invalid names.
pub fn quote_ident(name: &str) -> Result<String> {
    Ident::new(name).map(|ident| ident.quoted())
}

/// Validates a type spelling such as `VARCHAR`, `DOUBLE PRECISION` or
/// `STRING[]`.
///
/// # Errors
///
/// Returns [`SqlError::InvalidTypeName`] when the spelling is empty or
/// contains characters outside `[A-Za-z0-9_ ()\[\],]`.
pub fn validate_type_name(name: &str) -> Result<&str> {
    let valid = !name.trim().is_empty()
        && name.chars().all(|c| {
            c.is_ascii_alphanumeric() || matches!(c, '_' | ' ' | '(' | ')' | '[' | ']' | ',')
        });
    if valid {
        Ok(name)
    } else {
        Err(SqlError::InvalidTypeName(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_plain_identifiers() {
        assert_eq!(quote_ident("users").unwrap(), "\"users\"");
        assert_eq!(quote_ident("user-events_2").unwrap(), "\"user-events_2\"");
    }

    #[test]
    fn test_rejects_quotes_and_spaces() {
        assert_eq!(
            quote_ident("users\"; DROP TABLE x; --"),
            Err(SqlError::InvalidIdentifier(String::from(
                "users\"; DROP TABLE x; --"
            )))
        );
        assert!(Ident::new("first name").is_err());
        assert!(Ident::new("").is_err());
        assert!(Ident::new("a.b").is_err());
    }

    #[test]
    fn test_validates_type_names() {
        assert!(validate_type_name("DOUBLE PRECISION").is_ok());
        assert!(validate_type_name("VARCHAR[]").is_ok());
        assert!(validate_type_name("DECIMAL(10,2)").is_ok());
        assert!(validate_type_name("INT; DROP").is_err());
        assert!(validate_type_name("  ").is_err());
    }

    #[test]
    fn test_display_quotes() {
        let ident = Ident::new("email").unwrap();
        assert_eq!(ident.to_string(), "\"email\"");
        assert_eq!(ident.as_str(), "email");
    }
}
