use thiserror::Error;

/// Failure talking to the stats API. Any of these aborts the pipeline that
/// issued the request.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{endpoint} returned HTTP {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: Box<ureq::Transport>,
    },
    #[error("could not decode JSON from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },
}

/// Failure writing a batch. Always carries the table and the batch size.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("no conflict key given for {table}")]
    NoConflictKey { table: String },
    #[error("could not serialize {rows} rows for {table}: {source}")]
    Serialize {
        table: String,
        rows: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("could not upsert {rows} rows into {table}: a record serialized to {kind}, not a row")]
    NotARow {
        table: String,
        rows: usize,
        kind: &'static str,
    },
    #[error("upsert of {rows} rows into {table} was rejected with HTTP {status}: {body}")]
    Rejected {
        table: String,
        rows: usize,
        status: u16,
        body: String,
    },
    #[error("upsert of {rows} rows into {table} failed: {message}")]
    Transport {
        table: String,
        rows: usize,
        message: String,
    },
    #[error("upsert of {rows} rows into {table} failed: {source}")]
    Sqlite {
        table: String,
        rows: usize,
        #[source]
        source: rusqlite::Error,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}
