//! Media source error types

use crate::media::{Schema, SourceKey};

/// A session descriptor could not be parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorError {
    reason: String,
}

impl DescriptorError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl std::fmt::Display for DescriptorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Invalid session descriptor: {}", self.reason)
    }
}

impl std::error::Error for DescriptorError {}

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A live source with the same schema and key is already registered
    AlreadyRegistered(Schema, SourceKey),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::AlreadyRegistered(schema, key) => {
                write!(f, "Source already registered: {}://{}", schema, key)
            }
        }
    }
}

impl std::error::Error for RegistryError {}
