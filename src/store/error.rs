use ulid::Ulid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    NotFound(&'static str, String),
    AlreadyExists(&'static str, String),
    /// The candidate booking collides with this existing booking.
    Conflict(Ulid),
    InvalidInput(String),
    LimitExceeded(&'static str),
    WalError(String),
}

impl StoreError {
    pub fn not_found(what: &'static str, key: impl ToString) -> Self {
        StoreError::NotFound(what, key.to_string())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        StoreError::InvalidInput(msg.into())
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NotFound(what, key) => write!(f, "{what} not found: {key}"),
            StoreError::AlreadyExists(what, key) => write!(f, "{what} already exists: {key}"),
            StoreError::Conflict(id) => write!(f, "conflict with booking: {id}"),
            StoreError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            StoreError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            StoreError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}
