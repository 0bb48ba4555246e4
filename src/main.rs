use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod error;
mod pipeline;
mod process;
mod provision;
mod publish;
mod registry;
mod settings;

use pipeline::{Outcome, Pipeline};
use process::{CommandRunner, SystemRunner};
use provision::Terraform;
use publish::{ContainerCli, Publisher};
use registry::EcrAuthenticator;
use settings::Settings;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file (defaults to deploy.toml in the working directory, if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG is set
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Apply the whole Terraform configuration and print its outputs
    Deploy {
        /// Print outputs as JSON instead of a table
        #[arg(long)]
        json: bool,
        #[command(flatten)]
        terraform: TerraformArgs,
    },
    /// Provision the registry, then build the image and push it there
    BuildAndPush {
        #[command(flatten)]
        terraform: TerraformArgs,
        /// Resource address to apply (e.g., aws_ecr_repository.ecr_image_repository)
        #[arg(long)]
        target: Option<String>,
        /// Terraform output holding the registry URI
        #[arg(long)]
        output_key: Option<String>,
        #[command(flatten)]
        image: ImageArgs,
        /// AWS region used to resolve session credentials
        #[arg(long)]
        region: Option<String>,
    },
}

/// Terraform location overrides shared by both commands
#[derive(Args, Debug, Clone)]
struct TerraformArgs {
    /// Directory containing the Terraform configuration
    #[arg(long)]
    terraform_dir: Option<PathBuf>,
    /// Terraform variables file passed to `terraform init`
    #[arg(long)]
    var_file: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
struct ImageArgs {
    /// Image name (e.g., hello-world-aws)
    #[arg(long)]
    image_name: Option<String>,
    /// Image tag (e.g., latest)
    #[arg(long)]
    tag: Option<String>,
    /// Build context directory
    #[arg(long)]
    context: Option<PathBuf>,
    /// Dockerfile path, relative to the build context
    #[arg(long)]
    dockerfile: Option<PathBuf>,
    /// Container CLI to use (docker or podman)
    #[arg(long)]
    container_cli: Option<String>,
}

impl Commands {
    /// Layer this command's flags over the loaded settings
    fn apply(&self, settings: &mut Settings) {
        match self {
            Commands::Deploy { terraform, .. } => terraform.apply(settings),
            Commands::BuildAndPush {
                terraform,
                target,
                output_key,
                image,
                region,
            } => {
                terraform.apply(settings);
                image.apply(settings);
                if let Some(target) = target {
                    settings.terraform.target = Some(target.clone());
                }
                if let Some(key) = output_key {
                    settings.terraform.output_key = key.clone();
                }
                if let Some(region) = region {
                    settings.aws.region = region.clone();
                }
            }
        }
        settings.normalize();
    }
}

impl TerraformArgs {
    fn apply(&self, settings: &mut Settings) {
        if let Some(dir) = &self.terraform_dir {
            settings.terraform.dir = dir.clone();
        }
        if let Some(var_file) = &self.var_file {
            settings.terraform.var_file = Some(var_file.clone());
        }
    }
}

impl ImageArgs {
    fn apply(&self, settings: &mut Settings) {
        if let Some(name) = &self.image_name {
            settings.image.name = name.clone();
        }
        if let Some(tag) = &self.tag {
            settings.image.tag = tag.clone();
        }
        if let Some(context) = &self.context {
            settings.image.context = context.clone();
        }
        if let Some(dockerfile) = &self.dockerfile {
            settings.image.dockerfile = Some(dockerfile.clone());
        }
        if let Some(cli) = &self.container_cli {
            settings.container.cli = cli.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut settings =
        Settings::load(cli.config.as_deref()).context("Failed to load configuration")?;

    cli.command.apply(&mut settings);
    debug!("Settings: {:?}", settings);

    let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner);
    let terraform = Terraform::new(&settings.terraform.binary, runner.clone());

    let outcome = match &cli.command {
        Commands::Deploy { json, .. } => {
            let outcome = pipeline::deploy(&settings, &terraform)?;

            if let Outcome::Provisioned(outputs) = &outcome {
                if *json {
                    println!("{}", outputs.to_json_pretty()?);
                } else if outputs.is_empty() {
                    println!("No Terraform outputs defined");
                } else {
                    println!("{}", outputs.to_table());
                    println!("Note: Sensitive values are masked");
                }
            }
            outcome
        }
        Commands::BuildAndPush { .. } => {
            let publisher = publisher(&settings, runner.clone());
            let credentials = EcrAuthenticator::new(&settings.aws.region).await;
            let outcome = Pipeline::new(&settings, &terraform, &credentials, &publisher)
                .build_and_push()
                .await?;

            if let Outcome::Published { reference } = &outcome {
                info!("Published {}", reference);
            }
            outcome
        }
    };

    let code = outcome.exit_code();
    if code != 0 {
        std::process::exit(code);
    }

    Ok(())
}

/// The one container engine handle for this process
fn publisher(settings: &Settings, runner: Arc<dyn CommandRunner>) -> Publisher {
    Publisher::new(
        ContainerCli::new(&settings.container.cli, runner),
        settings.image.context.clone(),
        settings.image.dockerfile.clone(),
    )
}
