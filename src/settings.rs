use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Base name of the optional config file in the working directory
/// (`deploy.toml`, `deploy.yaml` or `deploy.yml`)
pub const DEFAULT_CONFIG_NAME: &str = "deploy";

/// Prefix of environment overrides, e.g. `DEPLOY_IMAGE__TAG=v2`
pub const ENV_PREFIX: &str = "DEPLOY";

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub terraform: TerraformSettings,
    pub image: ImageSettings,
    pub container: ContainerSettings,
    pub aws: AwsSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TerraformSettings {
    /// Terraform executable
    pub binary: String,
    /// Directory holding the Terraform configuration
    pub dir: PathBuf,
    /// Resource applied by `build-and-push`; empty applies everything
    #[serde(default)]
    pub target: Option<String>,
    /// Variables file passed to `terraform init`; empty disables it
    #[serde(default)]
    pub var_file: Option<PathBuf>,
    /// Output holding the registry URI
    pub output_key: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ImageSettings {
    pub name: String,
    pub tag: String,
    /// Build context directory
    pub context: PathBuf,
    /// Dockerfile path, relative to the context; defaults to the engine's own lookup
    #[serde(default)]
    pub dockerfile: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ContainerSettings {
    /// Container CLI to use (docker or podman)
    pub cli: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AwsSettings {
    pub region: String,
}

impl Settings {
    /// Load settings from defaults, a config file and `DEPLOY_*` environment variables.
    ///
    /// An explicit `config_file` must exist; otherwise `deploy.{toml,yaml,yml}`
    /// in the working directory is used if present.
    pub fn load(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(config_file, Environment::with_prefix(ENV_PREFIX))
    }

    fn load_with_env(config_file: Option<&Path>, env: Environment) -> Result<Self, ConfigError> {
        let file = match config_file {
            Some(path) => {
                tracing::info!("Loading config file: {}", path.display());
                File::from(path).required(true)
            }
            None => File::with_name(DEFAULT_CONFIG_NAME).required(false),
        };

        let mut settings: Settings = Self::with_defaults(Config::builder())?
            .add_source(file)
            .add_source(env.prefix_separator("_").separator("__"))
            .build()?
            .try_deserialize()?;

        settings.normalize();
        Ok(settings)
    }

    fn with_defaults(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        builder
            .set_default("terraform.binary", "terraform")?
            .set_default("terraform.dir", "./terraform/")?
            .set_default("terraform.target", "aws_ecr_repository.ecr_image_repository")?
            .set_default("terraform.var_file", "./terraform/terraform.tfvars")?
            .set_default("terraform.output_key", "ecr_image_repository")?
            .set_default("image.name", "hello-world-aws")?
            .set_default("image.tag", "latest")?
            .set_default("image.context", "..")?
            .set_default("container.cli", "docker")?
            .set_default("aws.region", "us-east-1")
    }

    /// Treat empty optional values as unset
    pub fn normalize(&mut self) {
        if self.terraform.target.as_deref().is_some_and(str::is_empty) {
            self.terraform.target = None;
        }
        if self
            .terraform
            .var_file
            .as_ref()
            .is_some_and(|p| p.as_os_str().is_empty())
        {
            self.terraform.var_file = None;
        }
        if self
            .image
            .dockerfile
            .as_ref()
            .is_some_and(|p| p.as_os_str().is_empty())
        {
            self.image.dockerfile = None;
        }
    }
}
