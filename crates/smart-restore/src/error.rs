//! Error types for the restore library.

use thiserror::Error;

/// Main error type for restore operations.
#[derive(Error, Debug)]
pub enum RestoreError {
    /// Configuration error (invalid YAML, missing fields, bad URL, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error returned by the source or target database.
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// Schema reflection failed
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// A table expression or foreign key named a table the catalog does not know
    #[error("Unknown table: {0}")]
    UnknownTable(String),

    /// Table has no primary key (required for upserts)
    #[error("Table {0} has no primary key - upserts require primary keys")]
    NoPrimaryKey(String),

    /// Write failed for a specific table
    #[error("Write failed for table {table}: {message}")]
    Write {
        table: String,
        message: String,
        #[source]
        source: Option<tokio_postgres::Error>,
    },

    /// The pipelined write worker is gone
    #[error("Write worker stopped: {0}")]
    WriterStopped(String),

    /// Metadata cache error
    #[error("Metadata cache error: {0}")]
    Cache(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RestoreError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl ToString, context: impl Into<String>) -> Self {
        RestoreError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Write error
    pub fn write(table: impl Into<String>, message: impl Into<String>) -> Self {
        RestoreError::Write {
            table: table.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Create a Write error from a statement the target rejected, keeping the
    /// database error as the cause.
    pub fn write_rejected(table: impl Into<String>, err: tokio_postgres::Error) -> Self {
        let message = match err.as_db_error() {
            Some(db) => match db.detail() {
                Some(detail) => format!("{} ({})", db.message(), detail),
                None => db.message().to_string(),
            },
            None => err.to_string(),
        };
        RestoreError::Write {
            table: table.into(),
            message,
            source: Some(err),
        }
    }

    /// Process exit code for this error.
    ///
    /// Configuration problems exit with 2 (usage), everything else with 1.
    pub fn exit_code(&self) -> u8 {
        match self {
            RestoreError::Config(_) | RestoreError::Yaml(_) => 2,
            _ => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for restore operations.
pub type Result<T> = std::result::Result<T, RestoreError>;
