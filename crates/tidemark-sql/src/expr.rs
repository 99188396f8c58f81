//! Expression builder producing [`Sql`] fragments.
//!
//! Used for partial-index predicates, check constraints and column
//! defaults. Values are always bound as parameters.

use crate::fragment::Sql;
use crate::value::{SqlValue, ToSqlValue};

/// Creates a column reference.
#[must_use]
pub fn col(name: &str) -> Column {
    Column {
        table: None,
        name: String::from(name),
    }
}

/// A column reference.
#[derive(Debug, Clone)]
pub struct Column {
    /// Optional table qualifier.
    pub table: Option<String>,
    /// Column name.
    pub name: String,
}

fn quote(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

impl Column {
    /// Creates a qualified column reference.
    #[must_use]
    pub fn qualified(table: &str, name: &str) -> Self {
        Self {
            table: Some(String::from(table)),
            name: String::from(name),
        }
    }

    /// Returns the quoted SQL representation.
    #[must_use]
    pub fn to_sql(&self) -> String {
        match &self.table {
            Some(t) => format!("{}.{}", quote(t), quote(&self.name)),
            None => quote(&self.name),
        }
    }

    fn expr(self) -> Expr {
        Expr::raw(self.to_sql())
    }

    /// Creates an equality expression.
    #[must_use]
    pub fn eq<T: ToSqlValue>(self, value: T) -> Expr {
        self.expr().eq(value)
    }

    /// Creates an inequality expression.
    #[must_use]
    pub fn not_eq<T: ToSqlValue>(self, value: T) -> Expr {
        self.expr().not_eq(value)
    }

    /// Creates a less-than expression.
    #[must_use]
    pub fn lt<T: ToSqlValue>(self, value: T) -> Expr {
        self.expr().binary("<", Expr::value(value))
    }

    /// Creates a less-than-or-equal expression.
    #[must_use]
    pub fn lt_eq<T: ToSqlValue>(self, value: T) -> Expr {
        self.expr().binary("<=", Expr::value(value))
    }

    /// Creates a greater-than expression.
    #[must_use]
    pub fn gt<T: ToSqlValue>(self, value: T) -> Expr {
        self.expr().binary(">", Expr::value(value))
    }

    /// Creates a greater-than-or-equal expression.
    #[must_use]
    pub fn gt_eq<T: ToSqlValue>(self, value: T) -> Expr {
        self.expr().binary(">=", Expr::value(value))
    }

    /// Creates an IS NULL expression.
    #[must_use]
    pub fn is_null(self) -> Expr {
        self.expr().postfix("IS NULL")
    }

    /// Creates an IS NOT NULL expression.
    #[must_use]
    pub fn is_not_null(self) -> Expr {
        self.expr().postfix("IS NOT NULL")
    }

    /// Creates a LIKE expression.
    #[must_use]
    pub fn like<T: ToSqlValue>(self, pattern: T) -> Expr {
        self.expr().binary("LIKE", Expr::value(pattern))
    }

    /// Creates a BETWEEN expression.
    #[must_use]
    pub fn between<T: ToSqlValue, U: ToSqlValue>(self, low: T, high: U) -> Expr {
        let mut sql = self.expr().0;
        sql.push_raw(" BETWEEN ")
            .push_param(low)
            .push_raw(" AND ")
            .push_param(high);
        Expr(sql)
    }

    /// Creates an IN expression.
    #[must_use]
    pub fn in_list<T: ToSqlValue>(self, values: Vec<T>) -> Expr {
        let values = values.into_iter().map(|v| Sql::param(v.to_sql_value()));
        let mut sql = self.expr().0;
        sql.push_raw(" IN ").push_sql(Sql::join(values, ", ").paren());
        Expr(sql)
    }
}

/// A boolean or scalar SQL expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr(Sql);

impl Expr {
    /// Creates an expression from raw SQL.
    ///
    /// **Warning**: Only use this for SQL fragments that don't contain user input.
    #[must_use]
    pub fn raw(sql: impl Into<String>) -> Self {
        Self(Sql::raw(sql))
    }

    /// Creates a parameterized value expression.
    #[must_use]
    pub fn value<T: ToSqlValue>(value: T) -> Self {
        Self(Sql::param(value))
    }

    /// Creates a function call expression such as `now()`.
    #[must_use]
    pub fn call(function: &str, args: Vec<Self>) -> Self {
        let args = Sql::join(args.into_iter().map(|a| a.0), ", ").paren();
        Self(Sql::raw(function).append(args))
    }

    fn binary(self, op: &str, right: Self) -> Self {
        let mut sql = self.0;
        sql.push_raw(format!(" {op} ")).push_sql(right.0);
        Self(sql)
    }

    fn postfix(self, op: &str) -> Self {
        let mut sql = self.0;
        sql.push_raw(format!(" {op}"));
        Self(sql)
    }

    /// Creates an equality expression.
    #[must_use]
    pub fn eq<T: ToSqlValue>(self, value: T) -> Self {
        self.binary("=", Self::value(value))
    }

    /// Creates an inequality expression.
    #[must_use]
    pub fn not_eq<T: ToSqlValue>(self, value: T) -> Self {
        self.binary("!=", Self::value(value))
    }

    /// Creates an AND expression.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        self.binary("AND", other)
    }

    /// Creates an OR expression.
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        self.binary("OR", other)
    }

    /// Wraps the expression in parentheses.
    #[must_use]
    pub fn paren(self) -> Self {
        Self(self.0.paren())
    }

    /// Negates the expression with NOT.
    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Self(Sql::raw("NOT ").append(self.0))
    }

    /// Returns the bound values in order.
    #[must_use]
    pub fn params(&self) -> Vec<SqlValue> {
        self.0.params().cloned().collect()
    }

    /// Converts the expression into a SQL fragment.
    #[must_use]
    pub fn into_sql(self) -> Sql {
        self.0
    }
}

impl From<Expr> for Sql {
    fn from(expr: Expr) -> Self {
        expr.0
    }
}

impl From<Column> for Expr {
    fn from(column: Column) -> Self {
        column.expr()
    }
}
