use std::io;

/// Errors produced while extracting a record from one log line
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// The line does not carry enough positional fields
    #[error("Malformed log line ({found} fields, need {expected}): {line}")]
    MalformedLine {
        line: String,
        found: usize,
        expected: usize,
    },

    /// The request path field was empty after trimming quotes
    #[error("Empty request path in log line: {0}")]
    EmptyPath(String),
}

/// Errors returned by a record sink
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Sink unavailable: {0}")]
    Unavailable(String),
}

/// Errors that end a single stream monitor run
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// The tail command could not be started or its stdout was not available
    #[error("Failed to spawn `{command}` for {program}: {reason}")]
    Spawn {
        program: String,
        command: String,
        reason: String,
    },

    /// Reading the stream failed with something other than end-of-stream
    #[error("Failed to read log stream for {program}: {source}")]
    Read {
        program: String,
        #[source]
        source: io::Error,
    },
}
