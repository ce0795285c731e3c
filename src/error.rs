//! Error types for the preview compiler.
//!
//! Scan and classification problems never reach this type: a malformed
//! import is dropped and an unsafe dependency turns into a `disabled`
//! output record. `PreviewError` covers the failures a caller has to
//! handle itself (bad configuration, unreadable sibling files, malformed
//! wire messages).

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PreviewError {
    /// A specifier classified as unsafe (denylisted, invalid or unsupported)
    #[error("Unsupported dependency: {specifier}")]
    UnsupportedDependency { specifier: String },

    /// The request names a framework the runtime cannot mount
    #[error("Unsupported framework '{framework}' (supported: react)")]
    UnsupportedFramework { framework: String },

    /// Configuration JSON could not be parsed
    #[error("Invalid preview configuration: {source}")]
    Config {
        #[from]
        source: serde_json::Error,
    },

    /// Reading sibling files or configuration from disk failed
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The bridge document URL has no usable origin
    #[error("Invalid bridge URL '{url}': {reason}")]
    InvalidBridgeUrl { url: String, reason: String },

    /// A wire message did not match the frame protocol
    #[error("Malformed preview message: {reason}")]
    MalformedMessage { reason: String },
}

pub type Result<T> = std::result::Result<T, PreviewError>;

impl PreviewError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedMessage {
            reason: reason.into(),
        }
    }
}

/// Where a failure inside the sandbox originated. Used as the heading of
/// the in-frame diagnostic panel so the user can tell which phase broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    Compile,
    Eval,
    Mount,
    Runtime,
    Dependency,
    Timeout,
}

impl DiagnosticKind {
    pub fn title(self) -> &'static str {
        match self {
            DiagnosticKind::Compile => "Compile error",
            DiagnosticKind::Eval => "Error while evaluating component",
            DiagnosticKind::Mount => "Error while mounting component",
            DiagnosticKind::Runtime => "Runtime error",
            DiagnosticKind::Dependency => "Failed to load dependencies",
            DiagnosticKind::Timeout => "Preview timed out",
        }
    }

    pub const ALL: [DiagnosticKind; 6] = [
        DiagnosticKind::Compile,
        DiagnosticKind::Eval,
        DiagnosticKind::Mount,
        DiagnosticKind::Runtime,
        DiagnosticKind::Dependency,
        DiagnosticKind::Timeout,
    ];

    /// Key used for the generated JS title table.
    pub fn key(self) -> &'static str {
        match self {
            DiagnosticKind::Compile => "compile",
            DiagnosticKind::Eval => "eval",
            DiagnosticKind::Mount => "mount",
            DiagnosticKind::Runtime => "runtime",
            DiagnosticKind::Dependency => "dependency",
            DiagnosticKind::Timeout => "timeout",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_dependency_message() {
        let err = PreviewError::UnsupportedDependency {
            specifier: "fs".to_string(),
        };
        assert_eq!(err.to_string(), "Unsupported dependency: fs");
    }

    #[test]
    fn test_config_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: PreviewError = json_err.into();
        assert!(err.to_string().starts_with("Invalid preview configuration"));
    }

    #[test]
    fn test_diagnostic_keys_unique() {
        let mut keys: Vec<_> = DiagnosticKind::ALL.iter().map(|k| k.key()).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), DiagnosticKind::ALL.len());
    }
}
