use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tfprovision::config;
use tfprovision::core::provisioner::{Provisioner, RunOptions};
use tfprovision::shared::logging;
use tfprovision::TerraformService;

const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(
    name = "tfprovision",
    about = "Declare a security group, IAM role and EC2 instance from one JSON config and provision them with Terraform.",
    version = APP_VERSION
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(
        long,
        short = 'c',
        global = true,
        value_name = "PATH",
        help = "Path to the stack configuration (JSON)"
    )]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        short = 'e',
        global = true,
        value_name = "ENV",
        help = "Environment name (defaults to TFPROVISION_ENV)"
    )]
    pub env: Option<String>,

    #[arg(
        long,
        global = true,
        value_name = "PATH",
        help = "Project root containing env/<ENV>/user_data_template.sh"
    )]
    pub root: Option<PathBuf>,

    #[arg(
        long,
        short = 'd',
        global = true,
        value_name = "PATH",
        help = "Terraform working directory (defaults to <root>/.tfprovision/<ENV>)"
    )]
    pub dir: Option<PathBuf>,

    #[arg(long, global = true, value_name = "REGION", help = "AWS region for the provider block")]
    pub region: Option<String>,

    #[arg(long, global = true, value_name = "PATH", help = "Terraform binary to run")]
    pub terraform: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Write main.tf.json without running Terraform")]
    Render {
        #[arg(long, help = "Print the document to stdout instead of writing it")]
        stdout: bool,
    },

    #[command(about = "Render and run terraform validate")]
    Validate,

    #[command(about = "Render and run terraform plan")]
    Plan,

    #[command(about = "Render and run terraform apply")]
    Apply {
        #[arg(long, help = "Skip interactive approval")]
        auto_approve: bool,
    },

    #[command(about = "Run terraform destroy for the stack")]
    Destroy {
        #[arg(long, help = "Skip interactive approval")]
        auto_approve: bool,
    },

    #[command(about = "Show the stack outputs recorded in Terraform state")]
    Output,

    #[command(about = "Print the JSON Schema of the stack configuration")]
    Schema,
}

impl Cli {
    fn run_options(&self) -> RunOptions {
        RunOptions {
            render_only: matches!(self.command, Commands::Render { .. }),
            config: self.config.clone(),
            environment: self.env.clone(),
            root: self.root.clone(),
            work_dir: self.dir.clone(),
            region: self.region.clone(),
            terraform: self.terraform.clone(),
        }
    }
}

#[tokio::main]
async fn main() {
    logging::init();

    let cli = Cli::parse();
    if let Err(err) = run(&cli).await {
        logging::error(&format!("{:#}", err));
        std::process::exit(1);
    }
}

async fn run(cli: &Cli) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Schema => {
            println!("{}", serde_json::to_string_pretty(&config::schema())?);
        }
        Commands::Render { stdout } => {
            let provisioner = init_provisioner(cli)?;
            if *stdout {
                let (document, _) = provisioner.render()?;
                println!("{}", document.to_string_pretty()?);
            } else {
                let (path, _) = provisioner.write()?;
                println!("{}", path.display());
            }
        }
        Commands::Validate => {
            let result = init_provisioner(cli)?.validate().await?;
            for line in result.describe() {
                println!("{}", line);
            }
            if !result.valid {
                return Err(anyhow::anyhow!(
                    "Configuration is invalid: {} error(s)",
                    result.error_count
                ));
            }
            logging::info("Configuration is valid");
        }
        Commands::Plan => {
            print!("{}", init_provisioner(cli)?.plan().await?);
        }
        Commands::Apply { auto_approve } => {
            print!("{}", init_provisioner(cli)?.apply(*auto_approve).await?);
            logging::info("Apply complete");
        }
        Commands::Destroy { auto_approve } => {
            print!("{}", init_provisioner(cli)?.destroy(*auto_approve).await?);
            logging::info("Destroy complete");
        }
        Commands::Output => {
            let result = init_provisioner(cli)?.outputs().await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }
    Ok(())
}

fn init_provisioner(cli: &Cli) -> anyhow::Result<Provisioner<TerraformService>> {
    Provisioner::from_options(cli.run_options())
}
