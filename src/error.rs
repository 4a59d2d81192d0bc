use camino::Utf8PathBuf;
use thiserror::Error;

/// Top-level error returned by [`crate::engine::execute`] and
/// [`crate::run_build`].
///
/// Everything the engine itself can detect (as opposed to a failure raised
/// from a task author's own `execute` body) is represented here, so the
/// stable message text asserted by the test suite lives in exactly one
/// place.
#[derive(Debug, Error)]
pub enum IsodError {
    #[error(transparent)]
    InvalidArgument(#[from] InvalidArgumentError),

    #[error("Clashing build specification. Found duplicate tasks: '{a}' and '{b}'.")]
    DuplicateTaskSpec { a: String, b: String },

    #[error("Tasks '{a}' and '{b}' are clashing. They have the same signature '{signature}'.")]
    SignatureCollision {
        a: String,
        b: String,
        signature: String,
    },

    #[error("Tasks '{a}' and '{b}' are clashing. They produced the same file '{path}'.")]
    OutputCollision {
        a: String,
        b: String,
        path: Utf8PathBuf,
    },

    #[error("Task '{name}' failed to build: {source}")]
    TaskExecutionFailed {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Cyclic dependency detected at task '{name}'.")]
    CyclicDependency { name: String },

    #[error("I/O error at '{path}': {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("path '{path}' is not valid UTF-8")]
    NonUtf8Path { path: std::path::PathBuf },
}

impl IsodError {
    pub(crate) fn io(path: impl Into<Utf8PathBuf>, source: std::io::Error) -> Self {
        IsodError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Raised by the hex/base64url encoding utilities in [`crate::encoding`].
#[derive(Debug, Error)]
pub enum InvalidArgumentError {
    #[error("The given string has an odd length. Hex strings must be of even length.")]
    OddLength,

    #[error(
        "The character '{0}' is not a valid hexadecimal digit. Allowed characters: 0-9, a-f, A-F."
    )]
    NotHexDigit(char),

    #[error("The given string is not valid URL-safe base64: {0}")]
    InvalidBase64(#[source] base64::DecodeError),
}
