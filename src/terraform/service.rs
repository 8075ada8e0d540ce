use crate::engine::document::{TerraformDocument, DOCUMENT_FILE_NAME};
use crate::terraform::model::TerraformValidateOutput;
use crate::terraform::output::{parse_outputs, OutputResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;

/// Overrides the binary looked up in `PATH` (e.g. `tofu`).
pub const TERRAFORM_BINARY_ENV: &str = "TERRAFORM_BINARY_NAME";

#[derive(Error, Debug)]
pub enum TerraformError {
    #[error("Terraform {command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("Terraform binary not found: {0}")]
    BinaryNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The commands the provisioner needs from the engine.
#[async_trait]
pub trait TerraformExecutor: Send + Sync {
    fn project_directory(&self) -> &Path;

    /// Persist the rendered document where the engine will read it.
    fn write_document(&self, document: &TerraformDocument) -> anyhow::Result<PathBuf> {
        Ok(document.write_to(self.project_directory())?)
    }

    async fn init(&self) -> anyhow::Result<String>;
    async fn validate(&self) -> anyhow::Result<TerraformValidateOutput>;
    async fn plan(&self) -> anyhow::Result<String>;
    async fn apply(&self, auto_approve: bool) -> anyhow::Result<String>;
    async fn destroy(&self, auto_approve: bool) -> anyhow::Result<String>;
    async fn outputs(&self) -> anyhow::Result<OutputResult>;
}

pub struct TerraformService {
    terraform_path: PathBuf,
    project_directory: PathBuf,
}

impl TerraformService {
    pub fn new(terraform_path: PathBuf, project_directory: PathBuf) -> Self {
        tracing::debug!(
            terraform = %terraform_path.display(),
            directory = %project_directory.display(),
            "TerraformService initialized"
        );
        Self {
            terraform_path,
            project_directory,
        }
    }

    /// Resolve the binary: explicit path, else `TERRAFORM_BINARY_NAME` or
    /// `terraform` looked up in `PATH`.
    pub fn locate(explicit: Option<PathBuf>) -> Result<PathBuf, TerraformError> {
        let path = match explicit {
            Some(path) => path,
            None => {
                let binary = std::env::var(TERRAFORM_BINARY_ENV)
                    .unwrap_or_else(|_| "terraform".to_string());
                which::which(&binary).map_err(|_| TerraformError::BinaryNotFound(binary))?
            }
        };
        if !path.exists() {
            return Err(TerraformError::BinaryNotFound(path.display().to_string()));
        }
        Ok(path)
    }

    pub fn terraform_path(&self) -> &Path {
        &self.terraform_path
    }

    pub fn document_path(&self) -> PathBuf {
        self.project_directory.join(DOCUMENT_FILE_NAME)
    }

    async fn run(&self, args: &[&str]) -> Result<String, TerraformError> {
        tracing::debug!(?args, "running terraform");
        let output = Command::new(&self.terraform_path)
            .args(args)
            .current_dir(&self.project_directory)
            .stdin(Stdio::null())
            .output()
            .await?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            Err(TerraformError::CommandFailed {
                command: args.first().copied().unwrap_or_default().to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            })
        }
    }

    /// Run with the terminal attached so Terraform can prompt for approval.
    async fn run_interactive(&self, args: &[&str]) -> Result<String, TerraformError> {
        tracing::debug!(?args, "running terraform interactively");
        let status = Command::new(&self.terraform_path)
            .args(args)
            .current_dir(&self.project_directory)
            .status()
            .await?;
        if status.success() {
            Ok(String::new())
        } else {
            Err(TerraformError::CommandFailed {
                command: args.first().copied().unwrap_or_default().to_string(),
                stderr: format!("exited with {}", status),
            })
        }
    }

    async fn run_approvable(&self, command: &str, auto_approve: bool) -> Result<String, TerraformError> {
        if auto_approve {
            self.run(&[command, "-input=false", "-no-color", "-auto-approve"])
                .await
        } else {
            self.run_interactive(&[command]).await
        }
    }
}

#[async_trait]
impl TerraformExecutor for TerraformService {
    fn project_directory(&self) -> &Path {
        &self.project_directory
    }

    async fn init(&self) -> anyhow::Result<String> {
        Ok(self.run(&["init", "-input=false", "-no-color"]).await?)
    }

    async fn validate(&self) -> anyhow::Result<TerraformValidateOutput> {
        // validate exits non-zero on an invalid configuration but still prints JSON
        let output = Command::new(&self.terraform_path)
            .args(["validate", "-json", "-no-color"])
            .current_dir(&self.project_directory)
            .stdin(Stdio::null())
            .output()
            .await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        serde_json::from_str(&stdout).map_err(|e| {
            anyhow::anyhow!(
                "Invalid JSON from terraform validate: {} ({})",
                e,
                String::from_utf8_lossy(&output.stderr)
            )
        })
    }

    async fn plan(&self) -> anyhow::Result<String> {
        Ok(self.run(&["plan", "-input=false", "-no-color"]).await?)
    }

    async fn apply(&self, auto_approve: bool) -> anyhow::Result<String> {
        Ok(self.run_approvable("apply", auto_approve).await?)
    }

    async fn destroy(&self, auto_approve: bool) -> anyhow::Result<String> {
        Ok(self.run_approvable("destroy", auto_approve).await?)
    }

    async fn outputs(&self) -> anyhow::Result<OutputResult> {
        match self.run(&["output", "-json", "-no-color"]).await {
            Ok(stdout) => parse_outputs(&stdout),
            Err(TerraformError::CommandFailed { stderr, .. })
                if stderr.contains("No outputs found") =>
            {
                parse_outputs("")
            }
            Err(e) => Err(e.into()),
        }
    }
}
