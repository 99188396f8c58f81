//! Recovery of indexes, primary keys and constraints from the text printed
//! by `SHOW CREATE TABLE`.
//!
//! Parsing is line oriented. Each index or constraint the database prints
//! occupies its own line, either inside the `CREATE TABLE` body or as a
//! trailing `CREATE INDEX` / `ALTER TABLE ... ADD CONSTRAINT` statement.
//! Lines that do not look like any of those are skipped.

use std::sync::LazyLock;

use regex::Regex;

use crate::observed::{Direction, IndexPart, ObservedConstraint, ObservedIndex};
use crate::schema::ConstraintKind;

static INDEX_HEAD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:CREATE\s+)?(UNIQUE\s+)?(INVERTED\s+)?INDEX\s+(?:IF\s+NOT\s+EXISTS\s+)?")
        .expect("index head pattern")
});

static ALTER_ADD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)^ALTER\s+TABLE\s+(?:IF\s+EXISTS\s+)?(?:ONLY\s+)?[\w."-]+\s+ADD\s+"#)
        .expect("alter table pattern")
});

/// Parses every index definition in `ddl`.
#[must_use]
pub fn parse_indexes(ddl: &str) -> Vec<ObservedIndex> {
    lines(ddl).filter_map(parse_index_line).collect()
}

/// Parses the primary key column list, if one is printed.
#[must_use]
pub fn parse_primary_key(ddl: &str) -> Option<Vec<String>> {
    lines(ddl).find_map(parse_primary_key_line)
}

/// Parses the name of the primary key constraint, if the key is printed as
/// a named constraint.
#[must_use]
pub fn parse_primary_key_name(ddl: &str) -> Option<String> {
    let line = lines(ddl).find(|l| parse_primary_key_line(l).is_some())?;
    let body = ALTER_ADD.find(line).map_or(line, |m| &line[m.end()..]);
    let mut cursor = Cursor::new(body);
    if cursor.keyword("CONSTRAINT") {
        cursor.ident()
    } else {
        None
    }
}

/// Parses named CHECK, FOREIGN KEY and UNIQUE constraints.
#[must_use]
pub fn parse_constraints(ddl: &str) -> Vec<ObservedConstraint> {
    lines(ddl).filter_map(parse_constraint_line).collect()
}

fn lines(ddl: &str) -> impl Iterator<Item = &str> {
    ddl.lines()
        .map(|l| l.trim().trim_end_matches([',', ';']).trim_end())
        .filter(|l| !l.is_empty())
}

fn parse_index_line(line: &str) -> Option<ObservedIndex> {
    let caps = INDEX_HEAD.captures(line)?;
    let unique = caps.get(1).is_some();
    let mut using = caps.get(2).map(|_| String::from("gin"));
    let mut cursor = Cursor::new(&line[caps.get(0)?.end()..]);

    let name = cursor.ident()?;
    if cursor.keyword("ON") {
        cursor.ident()?;
    }
    if cursor.keyword("USING") {
        using = Some(cursor.ident()?.to_ascii_lowercase());
    }

    let mut parts: Vec<IndexPart> = split_top_level(cursor.group()?)
        .into_iter()
        .map(|raw| {
            let (expression, direction) = split_direction(raw);
            IndexPart {
                expression,
                direction,
                position: 0,
                storing: false,
            }
        })
        .collect();

    let mut predicate = None;
    loop {
        if cursor.keyword("STORING") || cursor.keyword("INCLUDE") {
            let group = cursor.group()?;
            parts.extend(split_top_level(group).into_iter().map(|raw| IndexPart {
                expression: unquote(raw),
                direction: Direction::Asc,
                position: 0,
                storing: true,
            }));
        } else if cursor.keyword("USING") {
            using = Some(cursor.ident()?.to_ascii_lowercase());
            if cursor.keyword("WITH") {
                cursor.group()?;
            }
        } else if cursor.keyword("WHERE") {
            predicate = Some(cursor.rest().to_string());
            break;
        } else if cursor.keyword("NOT") {
            cursor.keyword("VISIBLE");
        } else if !cursor.keyword("VISIBLE") {
            break;
        }
    }

    for (i, part) in parts.iter_mut().enumerate() {
        part.position = i + 1;
    }

    Some(ObservedIndex {
        name,
        unique,
        parts,
        predicate,
        using,
    })
}

fn parse_primary_key_line(line: &str) -> Option<Vec<String>> {
    let upper = line.to_ascii_uppercase();
    let at = upper.find("PRIMARY KEY")?;
    let mut cursor = Cursor::new(&line[at + "PRIMARY KEY".len()..]);
    if let Some(group) = cursor.group() {
        return Some(
            split_top_level(group)
                .into_iter()
                .map(|raw| split_direction(raw).0)
                .collect(),
        );
    }
    // Inline column constraint: `id INT8 NOT NULL PRIMARY KEY`
    if upper.starts_with("CONSTRAINT") || upper.starts_with("CREATE") {
        return None;
    }
    Cursor::new(line).ident().map(|column| vec![column])
}

fn parse_constraint_line(line: &str) -> Option<ObservedConstraint> {
    let body = ALTER_ADD
        .find(line)
        .map_or(line, |m| &line[m.end()..]);
    let mut cursor = Cursor::new(body);
    if !cursor.keyword("CONSTRAINT") {
        return None;
    }
    let name = cursor.ident()?;
    let definition = cursor.rest().to_string();
    let upper = definition.to_ascii_uppercase();
    let kind = if upper.starts_with("CHECK") {
        ConstraintKind::Check
    } else if upper.starts_with("FOREIGN KEY") {
        ConstraintKind::ForeignKey
    } else if upper.starts_with("UNIQUE") {
        ConstraintKind::Unique
    } else {
        return None;
    };
    Some(ObservedConstraint {
        name,
        kind,
        definition,
    })
}

/// Splits `expr DESC` into the expression and its direction.
fn split_direction(raw: &str) -> (String, Direction) {
    let trimmed = raw.trim();
    let upper = trimmed.to_ascii_uppercase();
    for (suffix, direction) in [(" DESC", Direction::Desc), (" ASC", Direction::Asc)] {
        if upper.ends_with(suffix) {
            let expression = trimmed[..trimmed.len() - suffix.len()].trim_end();
            return (unquote(expression), direction);
        }
    }
    (unquote(trimmed), Direction::Asc)
}

/// Removes surrounding double quotes from a lone identifier.
fn unquote(raw: &str) -> String {
    let raw = raw.trim();
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        let inner = &raw[1..raw.len() - 1];
        if !inner.replace("\"\"", "").contains('"') {
            return inner.replace("\"\"", "\"");
        }
    }
    raw.to_string()
}

/// Splits on commas that are not nested in parentheses or quotes.
fn split_top_level(input: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0_usize;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in input.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                parts.push(input[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    let last = input[start..].trim();
    if !last.is_empty() {
        parts.push(last);
    }
    parts
}

/// A forward-only scanner over one DDL line.
struct Cursor<'a> {
    rest: &'a str,
}

impl<'a> Cursor<'a> {
    const fn new(input: &'a str) -> Self {
        Self { rest: input }
    }

    fn skip_ws(&mut self) {
        self.rest = self.rest.trim_start();
    }

    /// Consumes `word` if it is the next whole word (case-insensitive).
    fn keyword(&mut self, word: &str) -> bool {
        self.skip_ws();
        let Some(head) = self.rest.get(..word.len()) else {
            return false;
        };
        let boundary = self.rest[word.len()..]
            .chars()
            .next()
            .is_none_or(|c| !(c.is_ascii_alphanumeric() || c == '_'));
        if head.eq_ignore_ascii_case(word) && boundary {
            self.rest = &self.rest[word.len()..];
            true
        } else {
            false
        }
    }

    /// Consumes a possibly schema-qualified identifier and returns its last
    /// segment, unquoted.
    fn ident(&mut self) -> Option<String> {
        let mut segment = self.segment()?;
        while self.rest.starts_with('.') {
            self.rest = &self.rest[1..];
            segment = self.segment()?;
        }
        Some(segment)
    }

    fn segment(&mut self) -> Option<String> {
        self.skip_ws();
        if let Some(quoted) = self.rest.strip_prefix('"') {
            let mut out = String::new();
            let mut chars = quoted.char_indices().peekable();
            while let Some((i, c)) = chars.next() {
                if c == '"' {
                    if chars.peek().map(|(_, n)| *n) == Some('"') {
                        out.push('"');
                        chars.next();
                        continue;
                    }
                    self.rest = &quoted[i + 1..];
                    return Some(out);
                }
                out.push(c);
            }
            return None;
        }
        let end = self
            .rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '-'))
            .unwrap_or(self.rest.len());
        if end == 0 {
            return None;
        }
        let segment = self.rest[..end].to_string();
        self.rest = &self.rest[end..];
        Some(segment)
    }

    /// Consumes a balanced parenthesized group and returns its contents.
    fn group(&mut self) -> Option<&'a str> {
        self.skip_ws();
        if !self.rest.starts_with('(') {
            return None;
        }
        let mut depth = 0_usize;
        let mut quote: Option<char> = None;
        for (i, c) in self.rest.char_indices() {
            match (quote, c) {
                (Some(q), c) if c == q => quote = None,
                (Some(_), _) => {}
                (None, '\'' | '"') => quote = Some(c),
                (None, '(') => depth += 1,
                (None, ')') => {
                    depth -= 1;
                    if depth == 0 {
                        let inner = &self.rest[1..i];
                        self.rest = &self.rest[i + 1..];
                        return Some(inner);
                    }
                }
                _ => {}
            }
        }
        None
    }

    fn rest(&mut self) -> &'a str {
        self.skip_ws();
        let rest = self.rest.trim_end();
        self.rest = "";
        rest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const USERS_DDL: &str = r#"CREATE TABLE public.users (
	id INT8 NOT NULL,
	email STRING NOT NULL,
	name STRING NULL,
	tags STRING[] NULL,
	org_id INT8 NULL,
	deleted_at TIMESTAMPTZ NULL,
	CONSTRAINT users_pkey PRIMARY KEY (id ASC),
	UNIQUE INDEX users_email_key (email ASC),
	INDEX users_name_idx (name DESC, lower(email) ASC) STORING (org_id) WHERE deleted_at IS NULL,
	INVERTED INDEX users_tags_idx (tags),
	INDEX "users_Org idx" ("org_id" ASC) USING HASH WITH (bucket_count=8),
	CONSTRAINT check_email CHECK (length(email) > 3:::INT8)
);
ALTER TABLE public.users ADD CONSTRAINT users_org_fk FOREIGN KEY (org_id) REFERENCES public.orgs(id) ON DELETE CASCADE;
ALTER TABLE public.users VALIDATE CONSTRAINT users_org_fk;"#;

    #[test]
    fn test_parses_unique_index() {
        let indexes = parse_indexes(USERS_DDL);
        assert_eq!(indexes.len(), 4);
        let email = &indexes[0];
        assert_eq!(email.name, "users_email_key");
        assert!(email.unique);
        assert_eq!(email.parts.len(), 1);
        assert_eq!(email.parts[0].expression, "email");
        assert_eq!(email.parts[0].position, 1);
        assert_eq!(email.predicate, None);
    }

    #[test]
    fn test_parses_expressions_storing_and_predicate() {
        let index = &parse_indexes(USERS_DDL)[1];
        assert_eq!(index.name, "users_name_idx");
        assert!(!index.unique);
        let exprs: Vec<_> = index.parts.iter().map(|p| p.expression.as_str()).collect();
        assert_eq!(exprs, vec!["name", "lower(email)", "org_id"]);
        assert_eq!(index.parts[0].direction, Direction::Desc);
        assert!(index.parts[2].storing);
        assert_eq!(index.parts[2].position, 3);
        assert_eq!(index.predicate.as_deref(), Some("deleted_at IS NULL"));
    }

    #[test]
    fn test_parses_inverted_and_hash_indexes() {
        let indexes = parse_indexes(USERS_DDL);
        assert_eq!(indexes[2].name, "users_tags_idx");
        assert_eq!(indexes[2].using.as_deref(), Some("gin"));
        assert_eq!(indexes[3].name, "users_Org idx");
        assert_eq!(indexes[3].parts[0].expression, "org_id");
        assert_eq!(indexes[3].using.as_deref(), Some("hash"));
    }

    #[test]
    fn test_parses_create_index_statements() {
        let ddl = "CREATE UNIQUE INDEX IF NOT EXISTS events_key ON public.events \
                   USING btree (kind, (payload->>'id')) WHERE kind <> 'x';";
        let indexes = parse_indexes(ddl);
        assert_eq!(indexes.len(), 1);
        let index = &indexes[0];
        assert_eq!(index.name, "events_key");
        assert!(index.unique);
        assert_eq!(index.using.as_deref(), Some("btree"));
        assert_eq!(index.parts[1].expression, "(payload->>'id')");
        assert_eq!(index.predicate.as_deref(), Some("kind <> 'x'"));
    }

    #[test]
    fn test_column_named_like_keyword_is_not_an_index() {
        let ddl = "CREATE TABLE t (\n\tindexed BOOL NULL,\n\tindex_name STRING NULL\n)";
        assert!(parse_indexes(ddl).is_empty());
    }

    #[test]
    fn test_parses_primary_key() {
        assert_eq!(
            parse_primary_key(USERS_DDL),
            Some(vec![String::from("id")])
        );
        let composite = "CONSTRAINT \"primary\" PRIMARY KEY (tenant_id ASC, id DESC)";
        assert_eq!(
            parse_primary_key(composite),
            Some(vec![String::from("tenant_id"), String::from("id")])
        );
        assert_eq!(
            parse_primary_key("\tid UUID NOT NULL PRIMARY KEY,"),
            Some(vec![String::from("id")])
        );
        assert_eq!(parse_primary_key("CREATE TABLE t (a INT8)"), None);
    }

    #[test]
    fn test_parses_primary_key_name() {
        assert_eq!(parse_primary_key_name(USERS_DDL).as_deref(), Some("users_pkey"));
        assert_eq!(
            parse_primary_key_name("CONSTRAINT \"primary\" PRIMARY KEY (tenant_id ASC, id DESC)")
                .as_deref(),
            Some("primary")
        );
        assert_eq!(
            parse_primary_key_name("ALTER TABLE public.t ADD CONSTRAINT t_key PRIMARY KEY (id)")
                .as_deref(),
            Some("t_key")
        );
        assert_eq!(parse_primary_key_name("\tid UUID NOT NULL PRIMARY KEY,"), None);
    }

    #[test]
    fn test_parses_constraints() {
        let constraints = parse_constraints(USERS_DDL);
        assert_eq!(constraints.len(), 2);
        assert_eq!(constraints[0].name, "check_email");
        assert_eq!(constraints[0].kind, ConstraintKind::Check);
        assert_eq!(constraints[0].definition, "CHECK (length(email) > 3:::INT8)");
        assert_eq!(constraints[1].name, "users_org_fk");
        assert_eq!(constraints[1].kind, ConstraintKind::ForeignKey);
        assert!(constraints[1].definition.ends_with("ON DELETE CASCADE"));
    }

    #[test]
    fn test_split_respects_nesting_and_quotes() {
        assert_eq!(
            split_top_level("a, f(b, c), 'x,y', \"q,r\""),
            vec!["a", "f(b, c)", "'x,y'", "\"q,r\""]
        );
    }
}
