//! INSERT statement building
//!
//! A batch becomes exactly one statement:
//!
//! ```text
//! INSERT INTO <table> (<col1>,<col2>,...) VALUES (<v1>,<v2>,...),(...),...
//! ```
//!
//! Columns come from the first record of the batch, unquoted. Values are
//! looked up by column name in every record and rendered as SQL literals by a
//! [`LiteralRenderer`].
//!
//! # Literal embedding
//!
//! Values are embedded in the statement text, not bound as parameters. The
//! default [`EscapingLiteralRenderer`] escapes quotes and backslashes, which
//! keeps ordinary text from breaking the statement. [`UnsafeLiteralRenderer`]
//! only wraps values in quotes: a value containing `'` produces a malformed
//! (or hostile) statement. It exists for byte-for-byte compatibility with
//! plain literal embedding and should not see untrusted input.

use crate::error::InsertError;
use crate::record::Record;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;

/// Renders one JSON value as a SQL literal.
pub trait LiteralRenderer: Send + Sync {
    /// Append the literal form of `value` to `out`.
    fn render(&self, value: &Value, out: &mut String);
}

/// Selects a [`LiteralRenderer`] from configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LiteralRendering {
    /// Quote and escape `'` and `\` (default)
    #[default]
    Escaped,
    /// Quote only, no escaping
    Unsafe,
}

impl LiteralRendering {
    pub fn renderer(self) -> &'static dyn LiteralRenderer {
        match self {
            Self::Escaped => &EscapingLiteralRenderer,
            Self::Unsafe => &UnsafeLiteralRenderer,
        }
    }
}

impl std::str::FromStr for LiteralRendering {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "escaped" => Ok(Self::Escaped),
            "unsafe" => Ok(Self::Unsafe),
            other => Err(format!(
                "unknown literal rendering '{}': expected 'escaped' or 'unsafe'",
                other
            )),
        }
    }
}

/// Textual form of a value before quoting.
///
/// Strings are used as-is, numbers and booleans in JSON notation, arrays and
/// objects as compact JSON, `null` as `NULL`.
fn text_of(value: &Value) -> Cow<'_, str> {
    match value {
        Value::String(s) => Cow::Borrowed(s.as_str()),
        Value::Bool(b) => Cow::Borrowed(if *b { "true" } else { "false" }),
        Value::Null => Cow::Borrowed("NULL"),
        other => Cow::Owned(other.to_string()),
    }
}

/// Quote-only renderer: `'<text>'`, embedded quotes left untouched.
///
/// UNSAFE: see the module docs.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsafeLiteralRenderer;

impl LiteralRenderer for UnsafeLiteralRenderer {
    fn render(&self, value: &Value, out: &mut String) {
        if value.is_null() {
            out.push_str("NULL");
            return;
        }
        out.push('\'');
        out.push_str(&text_of(value));
        out.push('\'');
    }
}

/// Quoting renderer that backslash-escapes `\` and `'`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EscapingLiteralRenderer;

impl LiteralRenderer for EscapingLiteralRenderer {
    fn render(&self, value: &Value, out: &mut String) {
        if value.is_null() {
            out.push_str("NULL");
            return;
        }
        out.push('\'');
        for c in text_of(value).chars() {
            if c == '\'' || c == '\\' {
                out.push('\\');
            }
            out.push(c);
        }
        out.push('\'');
    }
}

/// A fully rendered INSERT statement for one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertStatement {
    table: String,
    columns: Vec<String>,
    rows: usize,
    text: String,
}

impl InsertStatement {
    /// Render `batch` into a single statement against `table`.
    ///
    /// Returns `Ok(None)` for an empty batch. Fails with
    /// [`InsertError::MissingFieldValue`] as soon as a record lacks a value
    /// for one of the first record's fields; no partial text escapes.
    pub fn build(
        table: &str,
        batch: &[Record],
        renderer: &dyn LiteralRenderer,
    ) -> std::result::Result<Option<Self>, InsertError> {
        let Some(first) = batch.first() else {
            return Ok(None);
        };

        let columns: Vec<String> = first.fields().iter().map(|f| f.name.clone()).collect();

        let mut text = String::with_capacity(64 + batch.len() * columns.len() * 8);
        text.push_str("INSERT INTO ");
        text.push_str(table);
        text.push_str(" (");
        text.push_str(&columns.join(","));
        text.push_str(") VALUES ");

        for (record_index, record) in batch.iter().enumerate() {
            if record_index > 0 {
                text.push(',');
            }
            text.push('(');
            for (i, column) in columns.iter().enumerate() {
                let value =
                    record
                        .value(column)
                        .ok_or_else(|| InsertError::MissingFieldValue {
                            record_index,
                            field: column.clone(),
                        })?;
                if i > 0 {
                    text.push(',');
                }
                renderer.render(value, &mut text);
            }
            text.push(')');
        }

        Ok(Some(Self {
            table: table.to_string(),
            columns,
            rows: batch.len(),
            text,
        }))
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of value tuples in the statement.
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }
}
