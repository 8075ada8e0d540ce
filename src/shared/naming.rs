//! Resource naming, default tags and per-environment user data.

use crate::config::Tags;
use crate::error::{ProvisionError, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::path::{Path, PathBuf};

/// Value of the `ManagedBy` default tag.
pub const MANAGED_BY: &str = "Terraform";

/// `base-env` or `base-env-suffix`.
pub fn derive_name(base: &str, env: &str, suffix: Option<&str>) -> String {
    match suffix {
        Some(suffix) if !suffix.is_empty() => format!("{}-{}-{}", base, env, suffix),
        _ => format!("{}-{}", base, env),
    }
}

pub fn default_tags(name: &str, env: &str) -> Tags {
    Tags::from([
        ("Name".to_string(), name.to_string()),
        ("Environment".to_string(), env.to_string()),
        ("ManagedBy".to_string(), MANAGED_BY.to_string()),
    ])
}

/// Base64 of the UTF-8 bytes, or `None` for missing/empty input.
pub fn encode_user_data(plaintext: Option<&str>) -> Option<String> {
    match plaintext {
        Some(text) if !text.is_empty() => Some(STANDARD.encode(text.as_bytes())),
        _ => None,
    }
}

/// The environment a stack is declared for, threaded into every builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackContext {
    environment: String,
    root: PathBuf,
}

impl StackContext {
    /// `root` is the project directory holding `env/<environment>/`.
    pub fn new(environment: &str, root: impl Into<PathBuf>) -> Result<Self> {
        let valid = !environment.is_empty()
            && environment
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(ProvisionError::InvalidConfig(format!(
                "environment '{}' must be non-empty and contain only letters, digits, '-' or '_'",
                environment
            )));
        }
        Ok(Self {
            environment: environment.to_string(),
            root: root.into(),
        })
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn derive_name(&self, base: &str, suffix: Option<&str>) -> String {
        derive_name(base, &self.environment, suffix)
    }

    pub fn default_tags(&self, name: &str) -> Tags {
        default_tags(name, &self.environment)
    }

    pub fn user_data_path(&self) -> PathBuf {
        self.root
            .join("env")
            .join(&self.environment)
            .join("user_data_template.sh")
    }

    /// Contents of `env/<environment>/user_data_template.sh`, verbatim.
    pub fn load_user_data(&self) -> Result<String> {
        let path = self.user_data_path();
        if !path.exists() {
            return Err(ProvisionError::MissingFile(path));
        }
        Ok(std::fs::read_to_string(&path)?)
    }
}
