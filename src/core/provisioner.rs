use crate::config::{ConfigSource, StackConfig};
use crate::core::stack::{declare_stack, StackOutputs};
use crate::engine::document::TerraformDocument;
use crate::shared::logging;
use crate::shared::naming::StackContext;
use crate::shared::security::{Operation, SecurityManager};
use crate::terraform::model::TerraformValidateOutput;
use crate::terraform::output::OutputResult;
use crate::terraform::service::{TerraformExecutor, TerraformService};
use std::path::{Path, PathBuf};

pub const ENVIRONMENT_ENV: &str = "TFPROVISION_ENV";
pub const ROOT_ENV: &str = "TFPROVISION_ROOT";
pub const TERRAFORM_DIR_ENV: &str = "TERRAFORM_DIR";

/// Command-line settings; unset fields fall back to environment variables.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub config: Option<PathBuf>,
    pub environment: Option<String>,
    pub root: Option<PathBuf>,
    pub work_dir: Option<PathBuf>,
    pub region: Option<String>,
    pub terraform: Option<PathBuf>,
    /// Only render the document; a missing Terraform binary is not an error.
    pub render_only: bool,
}

fn absolute(path: PathBuf) -> std::io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path)
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

pub struct Provisioner<E: TerraformExecutor> {
    ctx: StackContext,
    config: StackConfig,
    region: Option<String>,
    executor: E,
    security: SecurityManager,
}

impl Provisioner<TerraformService> {
    /// Resolve settings, load the stack config and locate Terraform.
    ///
    /// Priority for each setting: CLI flag, environment variable, default.
    pub fn from_options(options: RunOptions) -> anyhow::Result<Self> {
        let environment = options
            .environment
            .or_else(|| env_value(ENVIRONMENT_ENV))
            .ok_or_else(|| {
                anyhow::anyhow!("No environment given: pass --env or set {}", ENVIRONMENT_ENV)
            })?;

        let root = match options.root.or_else(|| env_value(ROOT_ENV).map(PathBuf::from)) {
            Some(root) => absolute(root)?,
            None => std::env::current_dir()?,
        };
        let ctx = StackContext::new(&environment, root)?;

        let work_dir = match options
            .work_dir
            .or_else(|| env_value(TERRAFORM_DIR_ENV).map(PathBuf::from))
        {
            Some(dir) => absolute(dir)?,
            None => ctx.root().join(".tfprovision").join(ctx.environment()),
        };

        let region = options
            .region
            .or_else(|| env_value("AWS_REGION"))
            .or_else(|| env_value("AWS_DEFAULT_REGION"));

        let source = ConfigSource::resolve(options.config.as_deref())?;
        logging::info(&format!(
            "Loading stack configuration for environment '{}' from {}",
            ctx.environment(),
            match &source {
                ConfigSource::File(path) => path.display().to_string(),
                ConfigSource::Inline(_) => "inline JSON".to_string(),
            }
        ));
        let config = source.load()?;

        let terraform_path =
            match TerraformService::locate(options.terraform.map(absolute).transpose()?) {
                Ok(path) => path,
                Err(e) if options.render_only => {
                    tracing::debug!(error = %e, "terraform not found, rendering only");
                    PathBuf::from("terraform")
                }
                Err(e) => return Err(e.into()),
            };
        logging::info(&format!(
            "Using Terraform binary {} with working directory {}",
            terraform_path.display(),
            work_dir.display()
        ));

        Ok(Self::new(
            ctx,
            config,
            region,
            TerraformService::new(terraform_path, work_dir),
            SecurityManager::new()?,
        ))
    }
}

impl<E: TerraformExecutor> Provisioner<E> {
    pub fn new(
        ctx: StackContext,
        config: StackConfig,
        region: Option<String>,
        executor: E,
        security: SecurityManager,
    ) -> Self {
        Self {
            ctx,
            config,
            region,
            executor,
            security,
        }
    }

    pub fn context(&self) -> &StackContext {
        &self.ctx
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn project_directory(&self) -> &Path {
        self.executor.project_directory()
    }

    /// Declare the whole stack into a fresh document.
    pub fn render(&self) -> anyhow::Result<(TerraformDocument, StackOutputs)> {
        let mut document = TerraformDocument::new(self.region.clone());
        let outputs = declare_stack(&self.ctx, &self.config, &mut document)?;
        self.security
            .check_resource_limit(document.resources().len())?;
        Ok((document, outputs))
    }

    /// Render and write `main.tf.json` into the working directory.
    pub fn write(&self) -> anyhow::Result<(PathBuf, usize)> {
        let (document, _) = self.render()?;
        let path = self.executor.write_document(&document)?;
        logging::info(&format!(
            "Wrote {} resources and {} outputs to {}",
            document.resources().len(),
            document.outputs().len(),
            path.display()
        ));
        Ok((path, document.resources().len()))
    }

    pub async fn validate(&self) -> anyhow::Result<TerraformValidateOutput> {
        self.security.check_operation(Operation::Validate, false)?;
        self.write()?;
        self.executor.init().await?;
        self.executor.validate().await
    }

    pub async fn plan(&self) -> anyhow::Result<String> {
        self.security.check_operation(Operation::Plan, false)?;
        self.write()?;
        self.executor.init().await?;
        self.executor.plan().await
    }

    pub async fn apply(&self, auto_approve: bool) -> anyhow::Result<String> {
        self.run_mutating(Operation::Apply, auto_approve).await
    }

    pub async fn destroy(&self, auto_approve: bool) -> anyhow::Result<String> {
        self.run_mutating(Operation::Destroy, auto_approve).await
    }

    pub async fn outputs(&self) -> anyhow::Result<OutputResult> {
        self.security.check_operation(Operation::Output, false)?;
        self.executor.outputs().await
    }

    async fn run_mutating(&self, operation: Operation, auto_approve: bool) -> anyhow::Result<String> {
        self.security.check_operation(operation, auto_approve)?;
        let (_, resource_count) = self.write()?;

        logging::info(&format!(
            "Executing Terraform {} for environment '{}'",
            operation.as_str(),
            self.ctx.environment()
        ));
        let outcome = match self.executor.init().await {
            Ok(_) => match operation {
                Operation::Destroy => self.executor.destroy(auto_approve).await,
                _ => self.executor.apply(auto_approve).await,
            },
            Err(e) => Err(e),
        };

        let entry = self.security.create_audit_entry(
            operation,
            self.ctx.environment(),
            &self.project_directory().display().to_string(),
            &outcome,
            Some(resource_count),
        );
        if let Err(e) = self.security.log_audit_entry(&entry) {
            logging::warn(&format!("Failed to write audit log: {}", e));
        }
        outcome
    }
}
