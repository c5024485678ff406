use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the library
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("manifest error in {file}: {message}")]
    Manifest { file: PathBuf, message: String },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(format!("JSON: {}", err))
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Serialization(format!("YAML: {}", err))
    }
}

/// Kind of a non-fatal parse failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseErrorKind {
    /// The file was read but is not valid Rust
    Syntax,
    /// The file could not be read
    Io,
}

/// 1-based line, 0-based column, as reported by `proc-macro2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

/// A file that was skipped during discovery.
///
/// Parse failures never abort discovery; they are accumulated and exposed
/// through [`crate::discovery::SourceRegistry::parse_errors`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseErrorRecord {
    pub file: PathBuf,
    pub message: String,
    pub kind: ParseErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

impl ParseErrorRecord {
    pub fn syntax(file: PathBuf, err: &syn::Error) -> Self {
        let start = err.span().start();
        // span-locations reports line 0 when no location is known
        let position = (start.line > 0).then(|| Position {
            line: start.line,
            column: start.column,
        });
        Self {
            file,
            message: err.to_string(),
            kind: ParseErrorKind::Syntax,
            position,
        }
    }

    pub fn io(file: PathBuf, err: &std::io::Error) -> Self {
        Self {
            file,
            message: err.to_string(),
            kind: ParseErrorKind::Io,
            position: None,
        }
    }
}

impl fmt::Display for ParseErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.position {
            Some(pos) => write!(
                f,
                "{}:{}:{}: {}",
                self.file.display(),
                pos.line,
                pos.column,
                self.message
            ),
            None => write!(f, "{}: {}", self.file.display(), self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syntax_record_has_position() {
        let err = syn::parse_file("struct User {\n    id: u32\n    name: String,\n}").unwrap_err();
        let record = ParseErrorRecord::syntax(PathBuf::from("bad.rs"), &err);

        assert_eq!(record.kind, ParseErrorKind::Syntax);
        assert_eq!(record.position.map(|p| p.line), Some(3));
        assert!(record.to_string().starts_with("bad.rs:3:"));
    }

    #[test]
    fn test_io_record_has_no_position() {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let record = ParseErrorRecord::io(PathBuf::from("gone.rs"), &err);

        assert_eq!(record.kind, ParseErrorKind::Io);
        assert!(record.position.is_none());
        assert_eq!(record.to_string(), "gone.rs: missing");
    }
}
