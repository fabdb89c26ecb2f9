use serde::Serialize;

/// Errors surfaced to callers of the chat service.
///
/// Collaborator degradations (storage, profile, order, push) never show up
/// here; they are logged and replaced by fallback values.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Database error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("Message store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl ChatError {
    pub fn kind(&self) -> &'static str {
        match self {
            ChatError::Validation(_) => "validation",
            ChatError::Unauthorized(_) => "unauthorized",
            ChatError::Store(_) | ChatError::StoreUnavailable(_) => "store",
            ChatError::Io(_) | ChatError::Serde(_) => "internal",
        }
    }
}

/// Serialized as `{ "error": "...", "kind": "..." }` for the CLI output.
impl Serialize for ChatError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("ChatError", 2)?;
        s.serialize_field("error", &self.to_string())?;
        s.serialize_field("kind", self.kind())?;
        s.end()
    }
}

/// Failure reported by an external collaborator.
#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    #[error("invalid or expired credential")]
    InvalidCredential,

    #[error("collaborator not configured: {0}")]
    NotConfigured(String),

    #[error("collaborator request failed: {0}")]
    Request(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type ChatResult<T> = Result<T, ChatError>;
