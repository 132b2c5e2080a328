use thiserror::Error;

/// Errors produced by the report chat client
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Conversation is not ready: no conversation id has been assigned")]
    NotReady,

    #[error("A request is already in flight for this conversation")]
    SendInProgress,

    #[error("Message is empty and no attachment is pending")]
    EmptyMessage,

    #[error("Unsupported attachment '{0}': only PNG, JPEG and WebP images are accepted")]
    UnsupportedAttachment(String),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Service responded with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ChatError>;
