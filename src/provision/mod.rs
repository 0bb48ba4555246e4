// Provisioning module - Terraform init/apply/output
//
// Init and apply are fatal and surface Terraform's own output on the user's
// terminal. Output retrieval is best effort and reports failure as `None`.

mod output;

pub(crate) use output::ProvisionOutput;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

use crate::error::ProvisionError;
use crate::process::{CommandOutput, CommandRunner, Invocation, OutputMode};

/// What to provision
#[derive(Debug, Clone)]
pub(crate) struct ProvisionRequest {
    /// Directory holding the Terraform configuration
    pub config_dir: PathBuf,
    /// Resource address passed as `-target`; `None` applies everything
    pub target: Option<String>,
    /// Variables file passed to `init`
    pub var_file: Option<PathBuf>,
}

/// Terraform CLI driven through a [`CommandRunner`]
pub(crate) struct Terraform {
    binary: String,
    runner: Arc<dyn CommandRunner>,
}

impl Terraform {
    pub(crate) fn new(binary: impl Into<String>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            binary: binary.into(),
            runner,
        }
    }

    /// Run init, apply and output in order.
    ///
    /// Returns `Err` if init or apply fails, `Ok(None)` if the outputs could
    /// not be fetched or parsed.
    pub(crate) fn provision(
        &self,
        request: &ProvisionRequest,
    ) -> Result<Option<ProvisionOutput>, ProvisionError> {
        info!("** Init terraform **");
        self.init(&request.config_dir, request.var_file.as_deref())?;

        info!("** Running terraform **");
        self.apply(&request.config_dir, request.target.as_deref())?;

        Ok(self.output(&request.config_dir))
    }

    pub(crate) fn init(
        &self,
        config_dir: &Path,
        var_file: Option<&Path>,
    ) -> Result<(), ProvisionError> {
        let mut invocation = Invocation::new(&self.binary)
            .arg("init")
            .current_dir(config_dir);

        if let Some(path) = var_file {
            invocation = invocation.arg(format!("-var-file={}", absolute(path).display()));
        }

        self.run_fatal("init", &invocation)
    }

    pub(crate) fn apply(
        &self,
        config_dir: &Path,
        target: Option<&str>,
    ) -> Result<(), ProvisionError> {
        let mut invocation = Invocation::new(&self.binary)
            .args(["apply", "-auto-approve"])
            .current_dir(config_dir);

        if let Some(target) = target {
            info!("Applying target {}", target);
            invocation = invocation.arg(format!("-target={}", target));
        }

        self.run_fatal("apply", &invocation)
    }

    /// Fetch outputs as JSON; `None` on any failure
    pub(crate) fn output(&self, config_dir: &Path) -> Option<ProvisionOutput> {
        let invocation = Invocation::new(&self.binary)
            .args(["output", "-json"])
            .current_dir(config_dir);

        let result = match self.runner.run(&invocation, OutputMode::Capture) {
            Ok(result) => result,
            Err(e) => {
                error!("Error getting Terraform output: {:#}", e);
                return None;
            }
        };

        if !result.success {
            error!(
                "Error getting Terraform output ({}): {}",
                result.status_text(),
                result.stderr.trim()
            );
            return None;
        }

        match ProvisionOutput::parse(&result.stdout) {
            Ok(outputs) => Some(outputs),
            Err(e) => {
                error!("Error parsing Terraform output JSON: {}", e);
                None
            }
        }
    }

    fn run_fatal(&self, step: &'static str, invocation: &Invocation) -> Result<(), ProvisionError> {
        let result: CommandOutput = self
            .runner
            .run(invocation, OutputMode::Inherit)
            .map_err(|e| ProvisionError::Spawn {
                program: self.binary.clone(),
                step,
                message: format!("{:#}", e),
            })?;

        if !result.success {
            return Err(ProvisionError::StepFailed {
                program: self.binary.clone(),
                step,
                status: result.status_text(),
            });
        }

        Ok(())
    }
}

/// Anchor a relative path at the current working directory.
///
/// Terraform runs inside the configuration directory, so a relative
/// `-var-file` would otherwise be resolved against that directory.
fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}
