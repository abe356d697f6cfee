//! Error types for rowgraph operations.
//!
//! Every error is fatal for the call that produced it. Nothing in the engine
//! retries: materialization is a deterministic transform over a forward-only
//! cursor, so retrying belongs to whoever issued the query.

use std::fmt;

/// The primary error type for all rowgraph operations.
#[derive(Debug)]
pub enum Error {
    /// Relationship configuration errors (link synthesis, sealed registry)
    Config(ConfigError),
    /// A result set does not carry a column the engine needs
    Schema(SchemaError),
    /// Value conversion errors (keys and entity fields)
    Type(TypeError),
    /// Errors raised by a cursor implementation
    Cursor(CursorError),
    /// Custom error with message
    Custom(String),
}

#[derive(Debug)]
pub struct ConfigError {
    pub kind: ConfigErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigErrorKind {
    /// No field matched by name or by type
    MissingField,
    /// More than one field matched by type
    AmbiguousField,
    /// A field matched by name but has the wrong type
    IncompatibleField,
    /// Registration attempted after population started
    RegistrySealed,
}

#[derive(Debug)]
pub struct SchemaError {
    pub kind: SchemaErrorKind,
    /// Entity being populated when the column was looked up
    pub entity: &'static str,
    /// The column that was expected
    pub column: String,
    /// The other side of the relationship, if any
    pub related: Option<&'static str>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaErrorKind {
    /// Column not found in the current result set
    ColumnNotFound,
}

#[derive(Debug)]
pub struct TypeError {
    /// Rust type the value was expected to convert into
    pub expected: &'static str,
    /// What was found instead (usually the SQL type name)
    pub actual: String,
    pub column: Option<String>,
    pub rust_type: Option<&'static str>,
    /// Entity whose row produced the value
    pub entity: Option<&'static str>,
    /// Entity field the value was bound to
    pub field: Option<&'static str>,
}

impl TypeError {
    /// Create a type error with only the expected/actual pair filled in.
    pub fn new(expected: &'static str, actual: impl Into<String>) -> Self {
        Self {
            expected,
            actual: actual.into(),
            column: None,
            rust_type: None,
            entity: None,
            field: None,
        }
    }

    /// Attach the column name.
    #[must_use]
    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    /// Attach the entity name.
    #[must_use]
    pub fn with_entity(mut self, entity: &'static str) -> Self {
        self.entity = Some(entity);
        self
    }

    /// Attach the entity field and its declared Rust type.
    #[must_use]
    pub fn with_field(mut self, field: &'static str, rust_type: &'static str) -> Self {
        self.field = Some(field);
        self.rust_type = Some(rust_type);
        self
    }
}

#[derive(Debug)]
pub struct CursorError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Shorthand for a configuration error.
    pub fn config(kind: ConfigErrorKind, message: impl Into<String>) -> Self {
        Error::Config(ConfigError {
            kind,
            message: message.into(),
        })
    }

    /// Missing-column error for `entity`, naming the related entity type.
    pub fn column_not_found(
        entity: &'static str,
        column: impl Into<String>,
        related: Option<&'static str>,
    ) -> Self {
        let column = column.into();
        let message = match related {
            Some(related) => format!(
                "{} expected column {} to map with {} which was not provided",
                entity, column, related
            ),
            None => format!("{} expected column {} which was not provided", entity, column),
        };
        Error::Schema(SchemaError {
            kind: SchemaErrorKind::ColumnNotFound,
            entity,
            column,
            related,
            message,
        })
    }

    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config(_))
    }

    pub fn is_schema(&self) -> bool {
        matches!(self, Error::Schema(_))
    }

    pub fn is_type(&self) -> bool {
        matches!(self, Error::Type(_))
    }

    /// Configuration error kind, if this is a configuration error.
    pub fn config_kind(&self) -> Option<ConfigErrorKind> {
        match self {
            Error::Config(c) => Some(c.kind),
            _ => None,
        }
    }

    /// Entity the error is attributed to, if known.
    pub fn entity(&self) -> Option<&str> {
        match self {
            Error::Schema(s) => Some(s.entity),
            Error::Type(t) => t.entity,
            _ => None,
        }
    }

    /// Column the error is attributed to, if known.
    pub fn column(&self) -> Option<&str> {
        match self {
            Error::Schema(s) => Some(&s.column),
            Error::Type(t) => t.column.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
            Error::Schema(e) => write!(f, "Schema error: {}", e.message),
            Error::Type(e) => write!(f, "Type error: {}", e),
            Error::Cursor(e) => write!(f, "Cursor error: {}", e.message),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Cursor(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(entity) = self.entity {
            write!(f, "{}: ", entity)?;
        }
        match (self.field, &self.column) {
            (Some(field), Some(col)) => write!(
                f,
                "field {} (column '{}') is of type {} but source type is {}",
                field,
                col,
                self.rust_type.unwrap_or(self.expected),
                self.actual
            ),
            (None, Some(col)) => write!(
                f,
                "expected {} for column '{}', found {}",
                self.expected, col, self.actual
            ),
            (Some(field), None) => write!(
                f,
                "field {} expected {}, found {}",
                field, self.expected, self.actual
            ),
            (None, None) => write!(f, "expected {}, found {}", self.expected, self.actual),
        }
    }
}

impl fmt::Display for CursorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<SchemaError> for Error {
    fn from(err: SchemaError) -> Self {
        Error::Schema(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

impl From<CursorError> for Error {
    fn from(err: CursorError) -> Self {
        Error::Cursor(err)
    }
}

/// Result type alias for rowgraph operations.
pub type Result<T> = std::result::Result<T, Error>;
