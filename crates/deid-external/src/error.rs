use thiserror::Error;

/// Errors building an adapter.
#[derive(Debug, Error)]
pub enum ExternalError {
    #[error("de-identification command is empty")]
    EmptyCommand,

    #[error("de-identification command must reference {placeholder}: {command}")]
    MissingPlaceholder {
        placeholder: &'static str,
        command: String,
    },

    #[error("failed to start async runtime for S3: {0}")]
    Runtime(#[source] std::io::Error),
}
