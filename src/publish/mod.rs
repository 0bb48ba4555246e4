// Publish module - build an image and push it to the provisioned registry
//
// Every step here is recoverable: failures are logged and reported as
// `false` so the pipeline can stop without unwinding through `main`.

mod docker;
mod registry;

pub(crate) use docker::{BuildSpec, ContainerCli};

use std::fmt;
use std::path::PathBuf;
use tracing::{error, info};

use crate::registry::{registry_host, RegistryCredentials};

/// Logical image name and tag, e.g. `hello-world-aws:latest`
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ImageRef {
    pub name: String,
    pub tag: String,
}

impl ImageRef {
    pub(crate) fn new(name: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tag: tag.into(),
        }
    }

    /// Reference under which the image is pushed to the registry at `registry_uri`
    pub(crate) fn qualified(&self, registry_uri: &str) -> String {
        qualified_reference(registry_uri, &self.name, &self.tag)
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.tag)
    }
}

/// `<first path segment of registry URI>/<name>:<tag>`
pub(crate) fn qualified_reference(registry_uri: &str, name: &str, tag: &str) -> String {
    format!("{}/{}:{}", registry_host(registry_uri), name, tag)
}

/// Builds and pushes images with one container engine handle
pub(crate) struct Publisher {
    engine: ContainerCli,
    context: PathBuf,
    dockerfile: Option<PathBuf>,
}

impl Publisher {
    pub(crate) fn new(engine: ContainerCli, context: PathBuf, dockerfile: Option<PathBuf>) -> Self {
        Self {
            engine,
            context,
            dockerfile,
        }
    }

    /// Build `image` from the configured context. Returns whether it succeeded.
    pub(crate) fn build(&self, image: &ImageRef) -> bool {
        info!("** Building the container image... **");

        let image_tag = image.to_string();
        let spec = BuildSpec {
            context: &self.context,
            dockerfile: self.dockerfile.as_deref(),
            image_tag: &image_tag,
        };

        match self.engine.build(&spec) {
            Ok(()) => {
                info!("Build complete!");
                true
            }
            Err(e) => {
                error!("Error building image: {:#}", e);
                false
            }
        }
    }

    /// Tag `image` for the registry, log in and push it.
    ///
    /// Returns whether the image was pushed; each step runs only if the
    /// previous one succeeded.
    pub(crate) fn push(
        &self,
        image: &ImageRef,
        registry_uri: &str,
        credentials: &RegistryCredentials,
    ) -> bool {
        let qualified = image.qualified(registry_uri);

        info!("** Tagging the image as {} **", qualified);
        if let Err(e) = self.engine.tag(&image.to_string(), &qualified) {
            error!("Error tagging image: {:#}", e);
            return false;
        }

        info!("** Logging in to {} **", credentials.endpoint);
        if let Err(e) = self.engine.login(credentials) {
            error!("Error logging in to registry: {:#}", e);
            return false;
        }

        info!("** Pushing the image... **");
        if let Err(e) = self.engine.push(&qualified) {
            error!("Error pushing image: {:#}", e);
            return false;
        }

        info!("Image pushed successfully: {}", qualified);
        true
    }

    pub(crate) fn engine(&self) -> &ContainerCli {
        &self.engine
    }
}
