//! Unified error handling for the medlink pipeline
//!
//! This module provides a centralized error type that encompasses all
//! errors that can occur throughout concept recognition and linking.

use std::fmt;

/// Main error type for the medlink system
#[derive(Debug)]
pub enum MedLinkError {
    /// Configuration-related errors (unknown optimizer, unknown tokenizer, ...)
    Config {
        /// Error message
        message: String,
    },

    /// I/O errors from file operations
    Io(std::io::Error),

    /// Serde JSON errors
    SerdeJson(serde_json::Error),

    /// Concept store errors
    Store {
        /// Error message
        message: String,
    },

    /// Name matcher (dictionary NER) errors
    NameMatcher {
        /// Error message
        message: String,
    },

    /// Vocabulary / embedding store errors
    Vocab {
        /// Error message
        message: String,
    },

    /// Tokenization errors
    Tokenization {
        /// Error message
        message: String,
    },

    /// Linking errors
    Linking {
        /// Error message
        message: String,
    },
}

impl fmt::Display for MedLinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MedLinkError::Config { message } => {
                write!(f, "Configuration error: {message}")
            },
            MedLinkError::Io(err) => {
                write!(f, "I/O error: {err}")
            },
            MedLinkError::SerdeJson(err) => {
                write!(f, "JSON serialization error: {err}")
            },
            MedLinkError::Store { message } => {
                write!(f, "Concept store error: {message}")
            },
            MedLinkError::NameMatcher { message } => {
                write!(f, "Name matcher error: {message}")
            },
            MedLinkError::Vocab { message } => {
                write!(f, "Vocabulary error: {message}")
            },
            MedLinkError::Tokenization { message } => {
                write!(f, "Tokenization error: {message}")
            },
            MedLinkError::Linking { message } => {
                write!(f, "Linking error: {message}")
            },
        }
    }
}

impl std::error::Error for MedLinkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MedLinkError::Io(err) => Some(err),
            MedLinkError::SerdeJson(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for MedLinkError {
    fn from(err: std::io::Error) -> Self {
        MedLinkError::Io(err)
    }
}

impl From<serde_json::Error> for MedLinkError {
    fn from(err: serde_json::Error) -> Self {
        MedLinkError::SerdeJson(err)
    }
}

/// Result type alias for medlink operations
pub type Result<T> = std::result::Result<T, MedLinkError>;
