// End-to-end flows behind the `deploy` and `build-and-push` commands
//
// build-and-push: PROVISION -> CREDENTIAL_FETCH -> BUILD -> PUSH
// deploy:         PROVISION (whole configuration)
//
// A step that reports failure stops the run there. Nothing already done is
// undone; provisioned infrastructure stays in place.

use std::fmt;
use tracing::{debug, info, warn};

use crate::error::ProvisionError;
use crate::provision::{ProvisionOutput, ProvisionRequest, Terraform};
use crate::publish::{ImageRef, Publisher};
use crate::registry::CredentialSource;
use crate::settings::Settings;

/// Step at which a run stopped early
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stage {
    Outputs,
    RegistryUri,
    SessionCredentials,
    Build,
    RegistryCredentials,
    Push,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Outputs => "provisioning outputs",
            Stage::RegistryUri => "registry URI lookup",
            Stage::SessionCredentials => "session credentials",
            Stage::Build => "image build",
            Stage::RegistryCredentials => "registry credentials",
            Stage::Push => "image push",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub(crate) enum Outcome {
    /// `deploy` finished and produced these outputs
    Provisioned(ProvisionOutput),
    /// `build-and-push` pushed the image under this reference
    Published { reference: String },
    Halted(Stage),
}

impl Outcome {
    /// Process exit code for this outcome.
    ///
    /// Only missing session credentials fail the process; other halts are
    /// logged and exit cleanly.
    pub(crate) fn exit_code(&self) -> i32 {
        match self {
            Outcome::Halted(Stage::SessionCredentials) => 1,
            _ => 0,
        }
    }
}

fn provision_request(settings: &Settings, target: Option<String>) -> ProvisionRequest {
    ProvisionRequest {
        config_dir: settings.terraform.dir.clone(),
        target,
        var_file: settings.terraform.var_file.clone(),
    }
}

/// Provision the whole configuration and hand back its outputs
pub(crate) fn deploy(settings: &Settings, terraform: &Terraform) -> Result<Outcome, ProvisionError> {
    match terraform.provision(&provision_request(settings, None))? {
        Some(outputs) => Ok(Outcome::Provisioned(outputs)),
        None => Ok(halt(Stage::Outputs)),
    }
}

/// Collaborators of the `build-and-push` flow
pub(crate) struct Pipeline<'a> {
    settings: &'a Settings,
    terraform: &'a Terraform,
    credentials: &'a dyn CredentialSource,
    publisher: &'a Publisher,
}

impl<'a> Pipeline<'a> {
    pub(crate) fn new(
        settings: &'a Settings,
        terraform: &'a Terraform,
        credentials: &'a dyn CredentialSource,
        publisher: &'a Publisher,
    ) -> Self {
        Self {
            settings,
            terraform,
            credentials,
            publisher,
        }
    }

    /// Provision the registry, then build and push the image into it
    pub(crate) async fn build_and_push(&self) -> Result<Outcome, ProvisionError> {
        let settings = self.settings;

        let request = provision_request(settings, settings.terraform.target.clone());
        let Some(outputs) = self.terraform.provision(&request)? else {
            return Ok(halt(Stage::Outputs));
        };

        let key = &settings.terraform.output_key;
        let Some(registry_uri) = outputs.registry_uri(key) else {
            warn!("Terraform output '{}' is missing or not a string", key);
            return Ok(halt(Stage::RegistryUri));
        };
        info!("Registry: {}", registry_uri);

        match self
            .credentials
            .session_credentials(&settings.aws.region)
            .await
        {
            Some(session) if session.is_complete() => {
                debug!("Using AWS access key {}", session.access_key);
            }
            Some(_) => {
                warn!("AWS session credentials are missing a key");
                return Ok(halt(Stage::SessionCredentials));
            }
            None => return Ok(halt(Stage::SessionCredentials)),
        }

        let image = ImageRef::new(&settings.image.name, &settings.image.tag);
        if !self.publisher.build(&image) {
            return Ok(halt(Stage::Build));
        }

        info!(
            "** Setting up {} and registry credentials... **",
            self.publisher.engine().program()
        );
        let Some(registry_credentials) = self.credentials.registry_credentials(registry_uri).await
        else {
            return Ok(halt(Stage::RegistryCredentials));
        };

        if !self
            .publisher
            .push(&image, registry_uri, &registry_credentials)
        {
            return Ok(halt(Stage::Push));
        }

        Ok(Outcome::Published {
            reference: image.qualified(registry_uri),
        })
    }
}

fn halt(stage: Stage) -> Outcome {
    warn!("Stopping: {} failed", stage);
    Outcome::Halted(stage)
}
