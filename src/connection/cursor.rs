//! Query cursor and fetched rows

use super::conn::{Connection, QueryResult};
use crate::protocol::FieldDescription;
use crate::{Error, Result};
use serde::Serialize;
use std::fmt::{self, Write as _};

/// Execute/fetch context for one statement at a time
///
/// Holds `&mut Connection`, so it can never outlive the connection that
/// created it. [`Cursor::close`] consumes the cursor.
#[derive(Debug)]
pub struct Cursor<'conn> {
    conn: &'conn mut Connection,
    result: Option<QueryResult>,
    position: usize,
}

impl<'conn> Cursor<'conn> {
    pub(super) fn new(conn: &'conn mut Connection) -> Self {
        Self {
            conn,
            result: None,
            position: 0,
        }
    }

    /// Run `sql` through the simple query protocol, replacing any previous result
    pub async fn execute(&mut self, sql: &str) -> Result<()> {
        self.result = None;
        self.position = 0;
        tracing::debug!(sql, "executing");
        self.result = Some(self.conn.simple_query(sql).await?);
        Ok(())
    }

    /// Columns of the current result, `None` before `execute` or for row-less commands
    pub fn description(&self) -> Option<&[FieldDescription]> {
        self.result
            .as_ref()
            .map(|r| r.columns.as_slice())
            .filter(|columns| !columns.is_empty())
    }

    /// Number of rows the last statement returned
    pub fn rowcount(&self) -> Option<usize> {
        self.result.as_ref().map(|r| r.rows.len())
    }

    /// CommandComplete tag of the last statement
    pub fn command_tag(&self) -> Option<&str> {
        self.result.as_ref().and_then(|r| r.command_tag.as_deref())
    }

    /// Next row, or `None` once the result is exhausted
    pub fn fetch_one(&mut self) -> Result<Option<Row>> {
        let result = self.result.as_ref().ok_or_else(|| Error::InvalidState {
            expected: "an executed statement".into(),
            actual: "no results to fetch".into(),
        })?;

        let Some(values) = result.rows.get(self.position) else {
            return Ok(None);
        };
        self.position += 1;

        Ok(Some(Row {
            columns: result.columns.iter().map(|c| c.name.clone()).collect(),
            values: values.clone(),
        }))
    }

    /// Discard buffered results and release the borrow on the connection
    pub fn close(self) {
        tracing::debug!(
            unread = self
                .result
                .as_ref()
                .map_or(0, |r| r.rows.len().saturating_sub(self.position)),
            "cursor closed"
        );
    }
}

/// One result row in text format
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Option<String>>,
}

impl Row {
    /// Build a row from column names and values
    pub fn new(columns: Vec<String>, values: Vec<Option<String>>) -> Self {
        Self { columns, values }
    }

    /// Value at `index`; `Some(None)` is SQL NULL
    pub fn get(&self, index: usize) -> Option<Option<&str>> {
        self.values.get(index).map(Option::as_deref)
    }

    /// Value of the first column named `name`
    pub fn get_by_name(&self, name: &str) -> Option<Option<&str>> {
        let index = self.columns.iter().position(|c| c == name)?;
        self.get(index)
    }

    /// Column names
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of values
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the row has no columns
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Renders as a tuple literal: `('PostgreSQL 16.2 ...',)`, NULL as `None`
impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_char('(')?;
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match value {
                Some(text) => write_quoted(f, text)?,
                None => f.write_str("None")?,
            }
        }
        if self.values.len() == 1 {
            f.write_char(',')?;
        }
        f.write_char(')')
    }
}

/// Single quotes unless the text contains `'` but no `"`
fn write_quoted(f: &mut fmt::Formatter<'_>, text: &str) -> fmt::Result {
    let quote = if text.contains('\'') && !text.contains('"') {
        '"'
    } else {
        '\''
    };

    f.write_char(quote)?;
    for c in text.chars() {
        match c {
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\r' => f.write_str("\\r")?,
            '\t' => f.write_str("\\t")?,
            c if c == quote => {
                f.write_char('\\')?;
                f.write_char(c)?;
            }
            c if is_printable(c) => f.write_char(c)?,
            c => match c as u32 {
                n @ 0..=0xff => write!(f, "\\x{:02x}", n)?,
                n @ 0x100..=0xffff => write!(f, "\\u{:04x}", n)?,
                n => write!(f, "\\U{:08x}", n)?,
            },
        }
    }
    f.write_char(quote)
}

/// Printable in the tuple-literal sense: not a control, format, separator
/// (other than ' ') or private-use code point
fn is_printable(c: char) -> bool {
    if c == ' ' {
        return true;
    }
    if c.is_control() {
        return false;
    }
    !matches!(
        c as u32,
        // space separators
        0xa0 | 0x1680 | 0x2000..=0x200a | 0x202f | 0x205f | 0x3000
        // line and paragraph separators
        | 0x2028 | 0x2029
        // format characters
        | 0xad | 0x600..=0x605 | 0x61c | 0x6dd | 0x70f | 0x180e
        | 0x200b..=0x200f | 0x202a..=0x202e | 0x2060..=0x206f
        | 0xfeff | 0xfff9..=0xfffb | 0x110bd | 0x1d173..=0x1d17a
        | 0xe0001 | 0xe0020..=0xe007f
        // private use
        | 0xe000..=0xf8ff | 0xf0000..=0xffffd | 0x100000..=0x10fffd
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(values: &[Option<&str>]) -> Row {
        Row::new(
            (0..values.len()).map(|i| format!("c{}", i)).collect(),
            values.iter().map(|v| v.map(str::to_string)).collect(),
        )
    }

    #[test]
    fn test_single_value_has_trailing_comma() {
        let r = row(&[Some(
            "PostgreSQL 16.2 on x86_64-pc-linux-gnu, compiled by gcc (GCC) 12.2.0, 64-bit",
        )]);
        assert_eq!(
            r.to_string(),
            "('PostgreSQL 16.2 on x86_64-pc-linux-gnu, compiled by gcc (GCC) 12.2.0, 64-bit',)"
        );
    }

    #[test]
    fn test_multiple_values_and_null() {
        let r = row(&[Some("a"), None, Some("42")]);
        assert_eq!(r.to_string(), "('a', None, '42')");
    }

    #[test]
    fn test_empty_row() {
        assert_eq!(row(&[]).to_string(), "()");
    }

    #[test]
    fn test_quote_selection() {
        assert_eq!(row(&[Some("it's")]).to_string(), "(\"it's\",)");
        assert_eq!(
            row(&[Some("it's \"quoted\"")]).to_string(),
            "('it\\'s \"quoted\"',)"
        );
    }

    #[test]
    fn test_escapes() {
        assert_eq!(
            row(&[Some("a\\b\nc\td\u{1}")]).to_string(),
            "('a\\\\b\\nc\\td\\x01',)"
        );
    }

    #[test]
    fn test_non_printable_escapes() {
        assert_eq!(row(&[Some("a\u{85}b")]).to_string(), "('a\\x85b',)");
        assert_eq!(row(&[Some("\u{7f}\u{a0}")]).to_string(), "('\\x7f\\xa0',)");
        assert_eq!(row(&[Some("x\u{200b}y\u{2028}")]).to_string(), "('x\\u200by\\u2028',)");
        assert_eq!(row(&[Some("\u{f0000}")]).to_string(), "('\\U000f0000',)");
        assert_eq!(
            row(&[Some("caf\u{e9} \u{65e5}\u{672c}")]).to_string(),
            "('caf\u{e9} \u{65e5}\u{672c}',)"
        );
    }

    #[test]
    fn test_non_ascii_passes_through() {
        assert_eq!(row(&[Some("café")]).to_string(), "('café',)");
    }

    #[test]
    fn test_get_by_name() {
        let r = Row::new(
            vec!["version".into(), "note".into()],
            vec![Some("PostgreSQL 16".into()), None],
        );
        assert_eq!(r.get_by_name("version"), Some(Some("PostgreSQL 16")));
        assert_eq!(r.get_by_name("note"), Some(None));
        assert_eq!(r.get_by_name("missing"), None);
        assert_eq!(r.len(), 2);
        assert_eq!(r.columns(), ["version", "note"]);
    }

    #[test]
    fn test_serializes_columns_and_values() {
        let r = Row::new(vec!["version".into()], vec![Some("PostgreSQL 16".into())]);
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["columns"][0], "version");
        assert_eq!(json["values"][0], "PostgreSQL 16");
    }
}
