//! Forward-only cursor over a sequence of result sets.
//!
//! A query may produce several result sets. The cursor exposes exactly one of
//! them at a time and one row of it at a time; nothing can be re-read once the
//! cursor has moved past it.

use crate::Result;
use crate::error::{Error, TypeError};
use crate::row::{ColumnInfo, ColumnMatching, FromValue, Row};
use crate::value::Value;
use std::collections::VecDeque;
use std::sync::Arc;

/// Read access to the current row.
pub trait Record {
    /// Number of columns in the current schema.
    fn field_count(&self) -> usize;

    /// Name of the column at `ordinal`.
    fn column_name(&self, ordinal: usize) -> Option<&str>;

    /// Value at `ordinal`, or `None` when there is no current row or the
    /// ordinal is out of range.
    fn value(&self, ordinal: usize) -> Option<&Value>;

    /// Ordinal of the named column (exact, then case-insensitive).
    fn ordinal(&self, name: &str) -> Option<usize>;

    /// Whether the value at `ordinal` is SQL NULL. Missing values count as NULL.
    fn is_null(&self, ordinal: usize) -> bool {
        self.value(ordinal).is_none_or(Value::is_null)
    }

    /// SQL type name of the value at `ordinal`.
    fn source_type_name(&self, ordinal: usize) -> &'static str {
        self.value(ordinal).map_or("UNKNOWN", Value::type_name)
    }

    /// Typed read by ordinal.
    fn get_as<T: FromValue>(&self, ordinal: usize) -> Result<T>
    where
        Self: Sized,
    {
        let value = self.value(ordinal).ok_or_else(|| {
            Error::Type(TypeError::new(
                std::any::type_name::<T>(),
                format!(
                    "ordinal {} out of range ({} columns)",
                    ordinal,
                    self.field_count()
                ),
            ))
        })?;
        T::from_value(value).map_err(|e| match (e, self.column_name(ordinal)) {
            (Error::Type(mut te), Some(name)) => {
                te.column = Some(name.to_string());
                Error::Type(te)
            }
            (e, _) => e,
        })
    }

    /// Typed read by column name.
    fn get_named<T: FromValue>(&self, name: &str) -> Result<T>
    where
        Self: Sized,
    {
        let ordinal = self.ordinal(name).ok_or_else(|| {
            Error::Type(
                TypeError::new(std::any::type_name::<T>(), format!("column '{}' not found", name))
                    .with_column(name),
            )
        })?;
        self.get_as(ordinal)
    }
}

/// A forward-only, single-pass cursor over one or more result sets.
pub trait ResultCursor: Record {
    /// Schema of the current result set.
    fn columns(&self) -> &ColumnInfo;

    /// Whether the current result set has at least one row.
    fn has_rows(&self) -> bool;

    /// Advance to the next row; `false` once the result set is exhausted.
    fn read(&mut self) -> Result<bool>;

    /// Advance to the next result set; `false` when none remain.
    fn next_result_set(&mut self) -> Result<bool>;
}

impl Record for Row {
    fn field_count(&self) -> usize {
        self.columns().len()
    }

    fn column_name(&self, ordinal: usize) -> Option<&str> {
        self.columns().name_at(ordinal)
    }

    fn value(&self, ordinal: usize) -> Option<&Value> {
        self.get(ordinal)
    }

    fn ordinal(&self, name: &str) -> Option<usize> {
        self.columns()
            .resolve(name, ColumnMatching::ExactThenCaseInsensitive)
    }
}

/// One buffered result set: a schema and its rows.
#[derive(Debug, Clone)]
pub struct ResultSet {
    columns: Arc<ColumnInfo>,
    rows: Vec<Row>,
}

impl ResultSet {
    /// Create an empty result set with the given column names.
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: Arc::new(ColumnInfo::new(
                columns.into_iter().map(Into::into).collect(),
            )),
            rows: Vec::new(),
        }
    }

    /// Append a row. Short rows are padded with NULL, long rows truncated.
    #[must_use]
    pub fn row<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.push_row(values);
        self
    }

    /// Append a row in place.
    pub fn push_row<I, V>(&mut self, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let width = self.columns.len();
        let mut values: Vec<Value> = values.into_iter().map(Into::into).take(width).collect();
        values.resize(width, Value::Null);
        self.rows.push(Row::with_columns(Arc::clone(&self.columns), values));
    }

    pub fn columns(&self) -> &ColumnInfo {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// In-memory implementation of [`ResultCursor`].
#[derive(Debug)]
pub struct MemoryCursor {
    current: Option<ResultSet>,
    remaining: VecDeque<ResultSet>,
    /// Index of the current row; `None` before the first `read`.
    position: Option<usize>,
    empty: Arc<ColumnInfo>,
}

impl MemoryCursor {
    /// Build a cursor positioned on the first result set.
    pub fn new(sets: impl IntoIterator<Item = ResultSet>) -> Self {
        let mut remaining: VecDeque<ResultSet> = sets.into_iter().collect();
        let current = remaining.pop_front();
        Self {
            current,
            remaining,
            position: None,
            empty: Arc::new(ColumnInfo::new(Vec::new())),
        }
    }

    /// Number of result sets not yet reached.
    pub fn remaining_sets(&self) -> usize {
        self.remaining.len()
    }

    /// Whether the cursor has moved past its last result set.
    pub fn is_exhausted(&self) -> bool {
        self.current.is_none()
    }

    fn current_row(&self) -> Option<&Row> {
        let set = self.current.as_ref()?;
        set.rows.get(self.position?)
    }
}

impl Record for MemoryCursor {
    fn field_count(&self) -> usize {
        self.columns().len()
    }

    fn column_name(&self, ordinal: usize) -> Option<&str> {
        self.columns().name_at(ordinal)
    }

    fn value(&self, ordinal: usize) -> Option<&Value> {
        self.current_row()?.get(ordinal)
    }

    fn ordinal(&self, name: &str) -> Option<usize> {
        self.columns()
            .resolve(name, ColumnMatching::ExactThenCaseInsensitive)
    }
}

impl ResultCursor for MemoryCursor {
    fn columns(&self) -> &ColumnInfo {
        self.current
            .as_ref()
            .map_or(&self.empty, |set| &set.columns)
    }

    fn has_rows(&self) -> bool {
        self.current.as_ref().is_some_and(|set| !set.rows.is_empty())
    }

    fn read(&mut self) -> Result<bool> {
        let Some(set) = self.current.as_ref() else {
            return Ok(false);
        };
        let next = self.position.map_or(0, |p| p + 1);
        if next < set.rows.len() {
            self.position = Some(next);
            Ok(true)
        } else {
            // Park past the end so `value` stops returning the last row.
            self.position = Some(set.rows.len());
            Ok(false)
        }
    }

    fn next_result_set(&mut self) -> Result<bool> {
        self.current = self.remaining.pop_front();
        self.position = None;
        Ok(self.current.is_some())
    }
}
