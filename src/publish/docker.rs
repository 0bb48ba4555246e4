// Image builds and local tags through the container CLI

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::process::{CommandRunner, Invocation, OutputMode};

/// Handle to the local container engine (docker or podman CLI).
///
/// Constructed once per process and owned by the [`super::Publisher`].
pub(crate) struct ContainerCli {
    pub(super) program: String,
    pub(super) runner: Arc<dyn CommandRunner>,
}

/// Inputs of a single image build
#[derive(Debug, Clone)]
pub(crate) struct BuildSpec<'a> {
    pub context: &'a Path,
    pub dockerfile: Option<&'a Path>,
    pub image_tag: &'a str,
}

impl ContainerCli {
    pub(crate) fn new(program: impl Into<String>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            program: program.into(),
            runner,
        }
    }

    pub(crate) fn program(&self) -> &str {
        &self.program
    }

    /// Run a CLI subcommand with output streamed to the terminal
    pub(super) fn run(&self, invocation: Invocation, what: &str) -> Result<()> {
        let result = self
            .runner
            .run(&invocation, OutputMode::Inherit)
            .with_context(|| format!("Failed to execute {} {}", self.program, what))?;

        if !result.success {
            bail!(
                "{} {} failed with {}",
                self.program,
                what,
                result.status_text()
            );
        }

        Ok(())
    }

    /// Build an image, removing intermediate containers afterwards
    pub(crate) fn build(&self, spec: &BuildSpec<'_>) -> Result<()> {
        info!(
            "Building image with {}: {}",
            self.program, spec.image_tag
        );

        let mut invocation = Invocation::new(&self.program).args(["build", "--rm", "-t"]);
        invocation = invocation.arg(spec.image_tag);

        if let Some(dockerfile) = spec.dockerfile {
            let dockerfile: PathBuf = if dockerfile.is_relative() {
                spec.context.join(dockerfile)
            } else {
                dockerfile.to_path_buf()
            };
            invocation = invocation.arg("-f").arg(dockerfile.to_string_lossy());
        }

        invocation = invocation.arg(spec.context.to_string_lossy());

        self.run(invocation, "build")
    }

    /// Add `target` as another local name for `source`
    pub(crate) fn tag(&self, source: &str, target: &str) -> Result<()> {
        let invocation = Invocation::new(&self.program).args(["tag", source, target]);
        self.run(invocation, "tag")
    }
}
