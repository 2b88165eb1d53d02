//! Column drops in raw SQL text
//!
//! Recognises `ALTER TABLE <table> DROP [COLUMN] <column>` inside the SQL
//! passed to `op.execute(...)`. Drops of constraints, checks, partitions, indexes and keys share
//! the `DROP` keyword but leave the column in place, so they are rejected.

use std::sync::LazyLock;

use regex::Regex;

/// `ALTER TABLE [IF EXISTS] [ONLY] [schema.]table` followed by its action list
static ALTER_TABLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)\bALTER\s+TABLE\s+(?:IF\s+EXISTS\s+)?(?:ONLY\s+)?(?:["`']?\w+["`']?\s*\.\s*)?["`']?(\w+)["`']?\s+"#,
    )
    .unwrap()
});

/// One action of an `ALTER TABLE` action list that starts with `DROP`
static DROP_ACTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)^\s*DROP\s+(?:(COLUMN)\s+)?(?:IF\s+EXISTS\s+)?["`']?(\w+)["`']?(?:\s+["`']?(\w+))?"#,
    )
    .unwrap()
});

/// Words after `DROP` that name something other than a column
const NON_COLUMN_TARGETS: &[&str] = &["CONSTRAINT", "INDEX", "KEY", "CHECK", "PARTITION"];

/// Words after `DROP` that name a key when followed by `KEY`
const KEY_QUALIFIERS: &[&str] = &["PRIMARY", "FOREIGN"];

/// A column dropped by a SQL statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlColumnDrop {
    pub table: String,
    pub column: String,
}

/// Extract every column drop from a SQL string, in order of appearance
pub fn parse_drop_columns(sql: &str) -> Vec<SqlColumnDrop> {
    // (header start, action list start, table)
    let headers: Vec<(usize, usize, &str)> = ALTER_TABLE_RE
        .captures_iter(sql)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some((whole.start(), whole.end(), caps.get(1)?.as_str()))
        })
        .collect();

    let mut drops = Vec::new();
    for (idx, &(_, actions_start, table)) in headers.iter().enumerate() {
        // The action list ends at the statement terminator or the next ALTER TABLE
        let next_header = headers
            .get(idx + 1)
            .map(|&(start, _, _)| start)
            .unwrap_or(sql.len());
        let statement_end = sql[actions_start..]
            .find(';')
            .map(|offset| actions_start + offset)
            .unwrap_or(sql.len());
        let actions = &sql[actions_start..next_header.min(statement_end)];

        for action in split_actions(actions) {
            if let Some(column) = dropped_column(action) {
                drops.push(SqlColumnDrop {
                    table: table.to_string(),
                    column,
                });
            }
        }
    }
    drops
}

/// Column name if `action` drops a column
fn dropped_column(action: &str) -> Option<String> {
    let caps = DROP_ACTION_RE.captures(action)?;
    let target = caps.get(2)?.as_str();

    if caps.get(1).is_none() {
        let is_non_column = NON_COLUMN_TARGETS
            .iter()
            .any(|kw| target.eq_ignore_ascii_case(kw));
        let is_key = KEY_QUALIFIERS
            .iter()
            .any(|kw| target.eq_ignore_ascii_case(kw))
            && caps
                .get(3)
                .is_some_and(|next| next.as_str().eq_ignore_ascii_case("KEY"));
        if is_non_column || is_key {
            return None;
        }
    }

    Some(target.to_string())
}

/// Split an action list on top-level commas
///
/// Commas inside parentheses (`NUMERIC(10, 2)`) or quotes do not separate
/// actions.
fn split_actions(actions: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (i, c) in actions.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '\'' | '"' | '`' => quote = Some(c),
                '(' => depth += 1,
                ')' => depth = depth.saturating_sub(1),
                ',' if depth == 0 => {
                    parts.push(&actions[start..i]);
                    start = i + 1;
                }
                _ => {}
            },
        }
    }
    parts.push(&actions[start..]);
    parts
}
