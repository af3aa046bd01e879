use std::error::Error as StdError;
use std::path::PathBuf;
use thiserror::Error;

/// Maximum number of characters kept in diagnostic previews.
pub(crate) const PREVIEW_CHARS: usize = 200;

/// Result type alias using the library's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Comprehensive error types for the repo-brief library.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// A context entry without a `path:content` separator.
    ///
    /// The truncator records and skips these; it never returns this error.
    #[error("Malformed context entry (missing ':' separator): '{preview}'")]
    MalformedEntry {
        /// Leading characters of the offending entry
        preview: String,
    },

    /// The text-completion collaborator returned no text.
    #[error("Empty response from LLM during {stage}")]
    EmptyResponse {
        /// Pipeline stage that issued the call
        stage: String,
    },

    /// No JSON value could be decoded from the response.
    #[error(
        "Invalid JSON response from LLM during {stage}: {message} \
         (raw: '{raw_preview}', cleaned: '{cleaned_preview}')"
    )]
    Extraction {
        /// Pipeline stage that issued the call
        stage: String,
        /// Decoder error message
        message: String,
        /// Leading characters of the raw response
        raw_preview: String,
        /// Leading characters of the extracted candidate
        cleaned_preview: String,
    },

    /// The response decoded, but not into the expected top-level shape.
    #[error("Unexpected response shape during {stage}: expected {expected}, found {found}")]
    InvalidShape {
        /// Pipeline stage that issued the call
        stage: String,
        /// Description of the expected shape
        expected: String,
        /// Description of what was found
        found: String,
    },

    /// The text-completion collaborator itself failed.
    #[error("Text completion failed during {stage}: {message}")]
    Completion {
        /// Pipeline stage that issued the call
        stage: String,
        /// Error message
        message: String,
    },

    /// Configuration validation error.
    #[error("Invalid configuration: {message}")]
    Config {
        /// Detailed error message
        message: String,
    },

    /// Invalid ignore or glob pattern.
    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The invalid pattern
        pattern: String,
        /// Reason why it's invalid
        reason: String,
    },

    /// IO error with context about the file path.
    #[error("IO error accessing '{path}': {message}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// Invalid UTF-8 encountered in file.
    #[error("Invalid UTF-8 encoding in file '{path}'. File may be binary or use unsupported encoding.")]
    InvalidUtf8 {
        /// Path to file with encoding issues
        path: PathBuf,
    },

    /// No processable files found in directory.
    #[error("No processable files found in '{path}'. Check .gitignore rules or file permissions.")]
    NoFiles {
        /// Directory that was scanned
        path: PathBuf,
    },

    /// Prompt template rendering error.
    #[error("Failed to render template '{template}': {message}")]
    Template {
        /// Template name
        template: String,
        /// Error message
        message: String,
    },

    /// JSON serialization error.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message
        message: String,
    },
}

impl Error {
    /// Creates a malformed entry error from the offending entry.
    #[must_use]
    pub fn malformed_entry(entry: &str) -> Self {
        Self::MalformedEntry {
            preview: preview(entry),
        }
    }

    /// Creates an empty response error.
    #[must_use]
    pub fn empty_response(stage: impl Into<String>) -> Self {
        Self::EmptyResponse {
            stage: stage.into(),
        }
    }

    /// Creates an extraction error carrying previews of both texts.
    #[must_use]
    pub fn extraction(
        stage: impl Into<String>,
        message: impl Into<String>,
        raw: &str,
        cleaned: &str,
    ) -> Self {
        Self::Extraction {
            stage: stage.into(),
            message: message.into(),
            raw_preview: preview(raw),
            cleaned_preview: preview(cleaned),
        }
    }

    /// Creates an invalid shape error.
    #[must_use]
    pub fn invalid_shape(
        stage: impl Into<String>,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        Self::InvalidShape {
            stage: stage.into(),
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Creates a completion error.
    #[must_use]
    pub fn completion(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Completion {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid pattern error.
    #[must_use]
    pub fn invalid_pattern(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }

    /// Creates an IO error with path context.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: source.to_string(),
        }
    }

    /// Creates an invalid UTF-8 error.
    #[must_use]
    pub fn invalid_utf8(path: impl Into<PathBuf>) -> Self {
        Self::InvalidUtf8 { path: path.into() }
    }

    /// Creates a no files error.
    #[must_use]
    pub fn no_files(path: impl Into<PathBuf>) -> Self {
        Self::NoFiles { path: path.into() }
    }

    /// Creates a template error.
    #[must_use]
    pub fn template(template: impl Into<String>, source: &tera::Error) -> Self {
        // tera nests the useful message in the source chain
        let mut message = source.to_string();
        let mut cause = StdError::source(source);
        while let Some(inner) = cause {
            message.push_str(": ");
            message.push_str(&inner.to_string());
            cause = inner.source();
        }
        Self::Template {
            template: template.into(),
            message,
        }
    }

    /// Returns true if the collaborator returned no text.
    #[must_use]
    pub const fn is_empty_response(&self) -> bool {
        matches!(self, Self::EmptyResponse { .. })
    }

    /// Returns true if a JSON value could not be decoded.
    #[must_use]
    pub const fn is_extraction(&self) -> bool {
        matches!(self, Self::Extraction { .. })
    }

    /// Returns true if the decoded value had the wrong shape.
    #[must_use]
    pub const fn is_invalid_shape(&self) -> bool {
        matches!(self, Self::InvalidShape { .. })
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. } | Self::InvalidPattern { .. })
    }

    /// Returns true if this is an IO error.
    #[must_use]
    pub const fn is_io(&self) -> bool {
        matches!(self, Self::Io { .. })
    }
}

/// Returns at most [`PREVIEW_CHARS`] leading characters of `text`.
pub(crate) fn preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

impl From<tera::Error> for Error {
    fn from(e: tera::Error) -> Self {
        Self::template("unknown", &e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization {
            message: e.to_string(),
        }
    }
}
