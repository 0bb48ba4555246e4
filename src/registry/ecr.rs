use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_credential_types::provider::ProvideCredentials;
use aws_sdk_ecr::types::AuthorizationData;
use aws_sdk_ecr::Client as EcrClient;
use tracing::{debug, error, info};

use super::{
    decode_authorization_token, registry_id, CredentialSource, RegistryCredentials,
    SessionCredentials,
};

/// Extract a clean error message from an AWS SDK error's Debug output
///
/// The AWS SDK errors have verbose Debug output, but we can extract just the
/// meaningful message by parsing for the `message: Some("...")` pattern.
fn format_sdk_error<E: std::fmt::Debug>(err: &E) -> String {
    let debug_str = format!("{:?}", err);

    if let Some(start) = debug_str.find("message: Some(\"") {
        let start = start + 15; // length of 'message: Some("'
        if let Some(end) = debug_str[start..].find("\")") {
            return debug_str[start..start + end].to_string();
        }
    }

    if debug_str.len() > 200 {
        let mut cut = 200;
        while !debug_str.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}...", &debug_str[..cut])
    } else {
        debug_str
    }
}

async fn load_sdk_config(region: &str) -> SdkConfig {
    // Default credential chain (env vars, profile, SSO, IAM role, ...)
    aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(region.to_string()))
        .load()
        .await
}

/// Credentials from AWS: the default provider chain and ECR authorization tokens
pub(crate) struct EcrAuthenticator {
    config: SdkConfig,
    client: EcrClient,
}

impl EcrAuthenticator {
    /// Create an authenticator whose ECR client talks to `region`
    pub(crate) async fn new(region: &str) -> Self {
        let config = load_sdk_config(region).await;
        Self {
            client: EcrClient::new(&config),
            config,
        }
    }

    #[allow(deprecated)]
    async fn fetch_registry_credentials(&self, registry_uri: &str) -> Result<RegistryCredentials> {
        let registry_id = registry_id(registry_uri);
        info!("Requesting ECR authorization token for registry {}", registry_id);

        let response = self
            .client
            .get_authorization_token()
            .registry_ids(registry_id)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!(format_sdk_error(&e)))
            .context("Failed to get ECR authorization token")?;

        credentials_from_auth_data(response.authorization_data())
    }
}

/// Turn the first entry of a `GetAuthorizationToken` response into login credentials
fn credentials_from_auth_data(auth_data: &[AuthorizationData]) -> Result<RegistryCredentials> {
    let auth_data = auth_data
        .first()
        .context("No authorization data returned from ECR")?;

    let token = auth_data
        .authorization_token()
        .context("No authorization token in response")?;

    let endpoint = auth_data
        .proxy_endpoint()
        .context("No proxy endpoint in response")?;

    let (username, password) = decode_authorization_token(token)?;

    Ok(RegistryCredentials {
        username,
        password,
        endpoint: endpoint.to_string(),
    })
}

async fn session_credentials_from(config: &SdkConfig) -> Result<SessionCredentials> {
    let provider = config
        .credentials_provider()
        .context("No AWS credentials provider configured")?;

    let credentials = provider
        .provide_credentials()
        .await
        .context("Failed to resolve AWS credentials")?;

    Ok(SessionCredentials {
        access_key: credentials.access_key_id().to_string(),
        secret_key: credentials.secret_access_key().to_string(),
        session_token: credentials.session_token().map(str::to_string),
    })
}

/// Resolve session credentials through `config`'s provider; `None` on any failure
async fn resolve_session_credentials(config: &SdkConfig) -> Option<SessionCredentials> {
    match session_credentials_from(config).await {
        Ok(credentials) => {
            debug!("Resolved AWS session credentials");
            Some(credentials)
        }
        Err(e) => {
            error!("Error getting temporary credentials: {:#}", e);
            None
        }
    }
}

#[async_trait]
impl CredentialSource for EcrAuthenticator {
    async fn session_credentials(&self, region: &str) -> Option<SessionCredentials> {
        let configured: Option<&str> = self.config.region().map(|r| r.as_ref());
        if configured == Some(region) {
            return resolve_session_credentials(&self.config).await;
        }
        resolve_session_credentials(&load_sdk_config(region).await).await
    }

    async fn registry_credentials(&self, registry_uri: &str) -> Option<RegistryCredentials> {
        match self.fetch_registry_credentials(registry_uri).await {
            Ok(credentials) => Some(credentials),
            Err(e) => {
                error!("Error getting ECR login credentials: {:#}", e);
                None
            }
        }
    }
}
