//! Error types for the codec crate.

use crate::value::WireKind;
use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while marshaling or unmarshaling values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// A host value could not be converted to its wire form.
    #[error("encoding failed at `{path}`: {message}")]
    Encoding {
        /// Field path of the failing value (empty for top-level values).
        path: String,
        /// Description of the encoding error.
        message: String,
    },

    /// A wire value did not have the shape the destination type expects.
    #[error("decoding failed at `{path}`: expected {expected}, found {found}")]
    Decoding {
        /// Field path of the failing value (empty for top-level values).
        path: String,
        /// What the destination type expected.
        expected: String,
        /// What the backend returned.
        found: String,
    },

    /// JSON text could not be parsed or produced.
    #[error("invalid JSON at `{path}`: {message}")]
    Json {
        /// Field path of the failing value.
        path: String,
        /// Parser message.
        message: String,
    },

    /// Two fields of one record map to the same column.
    #[error("record `{record}` maps column `{column}` more than once")]
    DuplicateField {
        /// Record type name.
        record: &'static str,
        /// Colliding column name.
        column: String,
    },
}

impl CodecError {
    /// Create an encoding error.
    pub fn encoding(message: impl Into<String>) -> Self {
        Self::Encoding {
            path: String::new(),
            message: message.into(),
        }
    }

    /// Create a decoding error for a shape mismatch.
    pub fn decoding(expected: impl Into<String>, found: WireKind) -> Self {
        Self::Decoding {
            path: String::new(),
            expected: expected.into(),
            found: found.to_string(),
        }
    }

    /// Create a decoding error with a free-form description of what was found.
    pub fn decoding_detail(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::Decoding {
            path: String::new(),
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Create a JSON error.
    pub fn json(message: impl Into<String>) -> Self {
        Self::Json {
            path: String::new(),
            message: message.into(),
        }
    }

    /// Prefixes the error's field path with `segment`.
    ///
    /// Errors bubble up from the innermost value, so each enclosing field
    /// prepends its own name: `city` becomes `address.city`.
    #[must_use]
    pub fn at(mut self, segment: &str) -> Self {
        let path = match &mut self {
            Self::Encoding { path, .. } | Self::Decoding { path, .. } | Self::Json { path, .. } => path,
            Self::DuplicateField { .. } => return self,
        };
        *path = if path.is_empty() {
            segment.to_string()
        } else if path.starts_with('[') {
            format!("{segment}{path}")
        } else {
            format!("{segment}.{path}")
        };
        self
    }

    /// Prefixes the path with an array index.
    #[must_use]
    pub fn at_index(self, index: usize) -> Self {
        self.at(&format!("[{index}]"))
    }

    /// Returns the field path carried by this error, if any.
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::Encoding { path, .. } | Self::Decoding { path, .. } | Self::Json { path, .. } => {
                Some(path)
            }
            Self::DuplicateField { .. } => None,
        }
    }
}

impl From<serde_json::Error> for CodecError {
    fn from(err: serde_json::Error) -> Self {
        Self::json(err.to_string())
    }
}
