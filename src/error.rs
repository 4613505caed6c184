use thiserror::Error;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Empty command")]
    EmptyCommand,

    #[error("File argument too long for a single invocation: {0:?}")]
    ArgumentTooLong(String),

    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Batch interrupted before completion")]
    Interrupted,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, BatchError>;
