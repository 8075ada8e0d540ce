use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while turning a stack configuration into resource declarations.
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("Invalid rule type '{0}': expected one of ingress, egress")]
    InvalidRuleType(String),

    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("User data template not found: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid resource name '{0}': must start with a letter or underscore and contain only letters, digits, '_' or '-'")]
    InvalidResourceName(String),

    #[error("Resource already declared: {0}")]
    DuplicateResource(String),

    #[error("Output already exported: {0}")]
    DuplicateOutput(String),

    #[error("Instance '{0}' sets both user_data and user_data_base64; supply only one")]
    ConflictingUserData(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ProvisionError>;
