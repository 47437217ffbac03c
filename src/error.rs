use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("failed to encode value for {key}: {source}")]
    Encode {
        key: String,
        source: serde_json::Error,
    },

    #[error("failed to prepare storage location: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("username already exists")]
    UsernameTaken,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("username and password are required")]
    MissingField,

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("no user is logged in")]
    NotLoggedIn,

    #[error("session {0} not found")]
    NotFound(String),

    #[error("session {0} is not active")]
    NotActive(String),

    #[error("session has no option labelled {0:?}")]
    UnknownOption(String),

    #[error("session {session_id} has no event at {timestamp}")]
    EventNotFound {
        session_id: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    #[error("score must be a finite number, got {0}")]
    InvalidScore(f64),

    #[error("invalid session options: {0}")]
    InvalidOptions(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
