// Container registry operations (push and login)

use anyhow::Result;
use tracing::info;

use super::docker::ContainerCli;
use crate::process::Invocation;
use crate::registry::RegistryCredentials;

impl ContainerCli {
    /// Login to container registry, passing the password on stdin
    pub(crate) fn login(&self, credentials: &RegistryCredentials) -> Result<()> {
        let invocation = Invocation::new(&self.program)
            .args(["login", "--username"])
            .arg(&credentials.username)
            .arg("--password-stdin")
            .arg(&credentials.endpoint)
            .stdin(&credentials.password);

        self.run(invocation, "login")
    }

    /// Push image to container registry
    pub(crate) fn push(&self, image_ref: &str) -> Result<()> {
        info!("Pushing image to registry: {}", image_ref);

        let invocation = Invocation::new(&self.program).args(["push", image_ref]);
        self.run(invocation, "push")
    }
}
