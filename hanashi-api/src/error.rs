use crate::{CommentId, NodePath};

#[derive(
    Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize, thiserror::Error,
)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Error {
    #[error("Network error, please retry: {message}")]
    TransientNetwork { message: String },

    #[error("Comment not found at {path}")]
    NotFound { path: NodePath },

    #[error(transparent)]
    Validation {
        #[from]
        error: ValidationError,
    },

    #[error("Store refused the operation: {message}")]
    Rejected { message: String },
}

#[derive(
    Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize, thiserror::Error,
)]
#[serde(tag = "reason", rename_all = "kebab-case")]
pub enum ValidationError {
    #[error("Comment text must not be empty")]
    EmptyText,

    #[error("Null byte in text is not allowed {text:?}")]
    NullByteInText { text: String },

    #[error("Comment text is {len} bytes long, the limit is {max}")]
    TextTooLong { len: usize, max: usize },

    #[error("Comment {id:?} was deleted")]
    Tombstoned { id: CommentId },

    #[error("Comment {id:?} is not part of this thread")]
    UnknownComment { id: CommentId },

    #[error("Comment {id:?} is still being sent")]
    StillPending { id: CommentId },

    #[error("Thread is not loaded yet")]
    NotLoaded,

    #[error("Thread view is not open")]
    UnknownView,

    #[error("The anchor itself cannot be opened as a thread")]
    AnchorPath,
}

impl Error {
    pub fn transient(message: impl Into<String>) -> Error {
        Error::TransientNetwork {
            message: message.into(),
        }
    }

    pub fn not_found(path: NodePath) -> Error {
        Error::NotFound { path }
    }

    pub fn rejected(message: impl Into<String>) -> Error {
        Error::Rejected {
            message: message.into(),
        }
    }

    /// Whether the user should be offered a manual retry
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::TransientNetwork { .. })
    }

    /// Whether the view showing the failing node should go away
    pub fn closes_view(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// Whether the store guarantees the failed write did not happen
    pub fn write_did_not_happen(&self) -> bool {
        matches!(self, Error::Rejected { .. } | Error::Validation { .. })
    }
}
