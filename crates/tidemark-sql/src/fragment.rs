//! Composable SQL fragments.
//!
//! A [`Sql`] value is a sequence of raw text pieces and bound values.
//! Placeholders are only numbered when the fragment is finalized into a
//! [`Statement`], so fragments can be nested and concatenated freely.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Result;
use crate::ident::{quote_ident, validate_type_name};
use crate::value::{SqlValue, ToSqlValue};

#[derive(Debug, Clone, PartialEq)]
enum Piece {
    Raw(String),
    Param(SqlValue),
}

/// A SQL fragment with deferred parameter numbering.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Sql {
    pieces: Vec<Piece>,
}

impl Sql {
    /// Creates an empty fragment.
    #[must_use]
    pub const fn new() -> Self {
        Self { pieces: Vec::new() }
    }

    /// Creates a fragment from raw SQL text.
    ///
    /// **Warning**: Only use this for SQL text that doesn't contain user input.
    #[must_use]
    pub fn raw(sql: impl Into<String>) -> Self {
        let mut fragment = Self::new();
        fragment.push_raw(sql);
        fragment
    }

    /// Creates a fragment holding a single bound value.
    #[must_use]
    pub fn param<T: ToSqlValue>(value: T) -> Self {
        let mut fragment = Self::new();
        fragment.push_param(value);
        fragment
    }

    /// Creates a fragment holding a validated, double-quoted identifier.
    ///
    /// # Errors
    ///
    /// Returns an error when `name` is not a valid identifier.
    pub fn ident(name: &str) -> Result<Self> {
        Ok(Self::raw(quote_ident(name)?))
    }

    /// Creates a `"schema"."name"` fragment.
    ///
    /// # Errors
    ///
    /// Returns an error when either part is not a valid identifier.
    pub fn qualified(schema: &str, name: &str) -> Result<Self> {
        Ok(Self::raw(format!(
            "{}.{}",
            quote_ident(schema)?,
            quote_ident(name)?
        )))
    }

    /// Creates a fragment holding a validated type spelling.
    ///
    /// # Errors
    ///
    /// Returns an error when the spelling contains forbidden characters.
    pub fn type_name(name: &str) -> Result<Self> {
        Ok(Self::raw(validate_type_name(name)?))
    }

    /// Appends raw SQL text.
    pub fn push_raw(&mut self, sql: impl Into<String>) -> &mut Self {
        let sql = sql.into();
        if sql.is_empty() {
            return self;
        }
        match self.pieces.last_mut() {
            Some(Piece::Raw(last)) => last.push_str(&sql),
            _ => self.pieces.push(Piece::Raw(sql)),
        }
        self
    }

    /// Appends a bound value.
    pub fn push_param<T: ToSqlValue>(&mut self, value: T) -> &mut Self {
        self.pieces.push(Piece::Param(value.to_sql_value()));
        self
    }

    /// Appends another fragment, keeping its bound values in order.
    pub fn push_sql(&mut self, other: Self) -> &mut Self {
        for piece in other.pieces {
            match piece {
                Piece::Raw(text) => {
                    self.push_raw(text);
                }
                Piece::Param(value) => self.pieces.push(Piece::Param(value)),
            }
        }
        self
    }

    /// Appends another fragment and returns the result.
    #[must_use]
    pub fn append(mut self, other: Self) -> Self {
        self.push_sql(other);
        self
    }

    /// Wraps the fragment in parentheses.
    #[must_use]
    pub fn paren(self) -> Self {
        Self::raw("(").append(self).append(Self::raw(")"))
    }

    /// Joins fragments with a raw separator.
    #[must_use]
    pub fn join<I>(fragments: I, separator: &str) -> Self
    where
        I: IntoIterator<Item = Self>,
    {
        let mut out = Self::new();
        for (i, fragment) in fragments.into_iter().enumerate() {
            if i > 0 {
                out.push_raw(separator);
            }
            out.push_sql(fragment);
        }
        out
    }

    /// Returns true when the fragment holds no text and no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }

    /// Returns the bound values in order of appearance.
    pub fn params(&self) -> impl Iterator<Item = &SqlValue> {
        self.pieces.iter().filter_map(|piece| match piece {
            Piece::Param(value) => Some(value),
            Piece::Raw(_) => None,
        })
    }

    /// Finalizes the fragment, numbering placeholders `$1..$n`.
    #[must_use]
    pub fn to_statement(&self) -> Statement {
        let mut sql = String::new();
        let mut params = Vec::new();
        for piece in &self.pieces {
            match piece {
                Piece::Raw(text) => sql.push_str(text),
                Piece::Param(value) => {
                    params.push(value.clone());
                    sql.push_str(&SqlValue::placeholder(params.len()));
                }
            }
        }
        Statement { sql, params }
    }

    /// Renders the fragment with every bound value inlined as a literal.
    #[must_use]
    pub fn to_inline(&self) -> String {
        let mut sql = String::new();
        for piece in &self.pieces {
            match piece {
                Piece::Raw(text) => sql.push_str(text),
                Piece::Param(value) => sql.push_str(&value.to_sql_inline()),
            }
        }
        sql
    }
}

impl fmt::Display for Sql {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_inline())
    }
}

impl From<&str> for Sql {
    fn from(sql: &str) -> Self {
        Self::raw(sql)
    }
}

impl Serialize for Sql {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_inline())
    }
}

impl<'de> Deserialize<'de> for Sql {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Ok(Self::raw(text))
    }
}

/// A finalized statement: query text with `$n` placeholders plus the
/// values bound to them.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// Query text.
    pub sql: String,
    /// Bound values, `params[0]` binds `$1`.
    pub params: Vec<SqlValue>,
}

impl Statement {
    /// Creates a statement without parameters.
    #[must_use]
    pub fn raw(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Renders the statement with placeholders replaced by inline literals.
    ///
    /// Placeholders inside single-quoted literals are left untouched.
    #[must_use]
    pub fn to_inline(&self) -> String {
        let mut out = String::with_capacity(self.sql.len());
        let mut chars = self.sql.chars().peekable();
        let mut in_literal = false;
        while let Some(c) = chars.next() {
            if c == '\'' {
                in_literal = !in_literal;
                out.push(c);
                continue;
            }
            if c != '$' || in_literal {
                out.push(c);
                continue;
            }
            let mut digits = String::new();
            while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
                digits.push(d);
                chars.next();
            }
            let value = digits
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|i| self.params.get(i));
            match value {
                Some(value) => out.push_str(&value.to_sql_inline()),
                None => {
                    out.push('$');
                    out.push_str(&digits);
                }
            }
        }
        out
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbers_placeholders_across_nested_fragments() {
        let left = Sql::raw("a = ").append(Sql::param(1));
        let right = Sql::raw("b = ").append(Sql::param("x"));
        let stmt = Sql::join([left, right], " AND ").paren().to_statement();
        assert_eq!(stmt.sql, "(a = $1 AND b = $2)");
        assert_eq!(
            stmt.params,
            vec![SqlValue::Int(1), SqlValue::Text(String::from("x"))]
        );
    }

    #[test]
    fn test_inline_rendering_escapes_values() {
        let sql = Sql::raw("DEFAULT ").append(Sql::param("it's"));
        assert_eq!(sql.to_inline(), "DEFAULT 'it''s'");
        assert_eq!(sql.to_statement().to_inline(), "DEFAULT 'it''s'");
    }

    #[test]
    fn test_statement_inline_handles_two_digit_placeholders() {
        let mut sql = Sql::new();
        for i in 1..=11 {
            if i > 1 {
                sql.push_raw(", ");
            }
            sql.push_param(i);
        }
        let stmt = sql.to_statement();
        assert!(stmt.sql.ends_with("$10, $11"));
        assert_eq!(stmt.to_inline(), "1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11");
    }

    #[test]
    fn test_statement_inline_skips_literals() {
        let stmt = Statement {
            sql: String::from("SELECT '$1', $1"),
            params: vec![SqlValue::Int(7)],
        };
        assert_eq!(stmt.to_inline(), "SELECT '$1', 7");
    }

    #[test]
    fn test_identifiers_are_validated() {
        assert_eq!(
            Sql::qualified("public", "users").unwrap().to_inline(),
            "\"public\".\"users\""
        );
        assert!(Sql::ident("bad name").is_err());
        assert!(Sql::type_name("INT); --").is_err());
    }

    #[test]
    fn test_serde_uses_inline_text() {
        let sql: Sql = serde_json::from_str("\"now()\"").unwrap();
        assert_eq!(sql, Sql::raw("now()"));
        let json = serde_json::to_string(&Sql::param("a")).unwrap();
        assert_eq!(json, "\"'a'\"");
    }

    #[test]
    fn test_empty_pieces_are_skipped() {
        let mut sql = Sql::new();
        sql.push_raw("");
        assert!(sql.is_empty());
        assert_eq!(Sql::join(Vec::new(), ", "), Sql::new());
    }
}
