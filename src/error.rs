use std::io;

/// Result alias for APK decoding operations.
pub type ApkResult<T> = Result<T, ApkError>;

/// Errors surfaced while decoding APK archives and their binary resources.
#[derive(Debug)]
pub enum ApkError {
    /// The input ended before a fixed-size read could complete.
    Truncated(String),
    /// A structural invariant of the binary format was violated.
    Malformed(String),
    /// ZIP container failure.
    Zip(zip::result::ZipError),
    /// Underlying I/O failure.
    Io(io::Error),
    /// XML text generation failure.
    Xml(String),
}

impl std::fmt::Display for ApkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApkError::Truncated(msg) => write!(f, "{msg}"),
            ApkError::Malformed(msg) => write!(f, "{msg}"),
            ApkError::Zip(err) => write!(f, "ZIP error: {err}"),
            ApkError::Io(err) => write!(f, "I/O error: {err}"),
            ApkError::Xml(msg) => write!(f, "XML error: {msg}"),
        }
    }
}

impl std::error::Error for ApkError {}

impl From<io::Error> for ApkError {
    fn from(value: io::Error) -> Self {
        ApkError::Io(value)
    }
}

impl From<zip::result::ZipError> for ApkError {
    fn from(value: zip::result::ZipError) -> Self {
        ApkError::Zip(value)
    }
}

impl From<quick_xml::Error> for ApkError {
    fn from(value: quick_xml::Error) -> Self {
        ApkError::Xml(value.to_string())
    }
}
