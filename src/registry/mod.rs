mod ecr;

pub(crate) use ecr::EcrAuthenticator;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use base64::Engine;
use std::fmt;

/// Credentials for `docker login` against a registry
#[derive(Clone, PartialEq)]
pub(crate) struct RegistryCredentials {
    pub username: String,
    pub password: String,
    /// Login endpoint (e.g., "https://123456789012.dkr.ecr.us-east-1.amazonaws.com")
    pub endpoint: String,
}

impl fmt::Debug for RegistryCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// Temporary credentials of the current cloud session
#[derive(Clone)]
pub(crate) struct SessionCredentials {
    pub access_key: String,
    pub secret_key: String,
    pub session_token: Option<String>,
}

impl SessionCredentials {
    /// Both halves of the key pair are present
    pub(crate) fn is_complete(&self) -> bool {
        !self.access_key.is_empty() && !self.secret_key.is_empty()
    }
}

impl fmt::Debug for SessionCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCredentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Source of registry and session credentials.
///
/// Both paths return `None` on failure after logging it; callers decide
/// whether that halts the pipeline.
#[async_trait]
pub(crate) trait CredentialSource: Send + Sync {
    /// Resolve session credentials for `region` from the default provider chain
    async fn session_credentials(&self, region: &str) -> Option<SessionCredentials>;

    /// Get push credentials for the registry that hosts `registry_uri`
    async fn registry_credentials(&self, registry_uri: &str) -> Option<RegistryCredentials>;
}

/// Registry account identifier: the leading `.`-separated segment of the URI
///
/// # Example
/// `123456789012.dkr.ecr.us-east-1.amazonaws.com/repo` → `123456789012`
pub(crate) fn registry_id(registry_uri: &str) -> &str {
    registry_uri.split('.').next().unwrap_or(registry_uri)
}

/// Registry host: the first `/`-separated segment of the URI
pub(crate) fn registry_host(registry_uri: &str) -> &str {
    registry_uri.split('/').next().unwrap_or(registry_uri)
}

/// Decode a base64 `username:password` authorization token.
///
/// Only the first `:` separates the two, so passwords may contain colons.
pub(crate) fn decode_authorization_token(token: &str) -> Result<(String, String)> {
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(token.trim())
        .context("Failed to decode authorization token")?;

    let decoded = String::from_utf8(decoded).context("Authorization token is not valid UTF-8")?;

    match decoded.split_once(':') {
        Some((username, password)) => Ok((username.to_string(), password.to_string())),
        None => bail!("Invalid authorization token format"),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Hands out fixed credentials and records registry lookups
    pub(crate) struct StaticCredentials {
        pub session: Option<SessionCredentials>,
        pub registry: Option<RegistryCredentials>,
        pub registry_lookups: Mutex<Vec<String>>,
    }

    impl StaticCredentials {
        pub(crate) fn valid() -> Self {
            Self {
                session: Some(SessionCredentials {
                    access_key: "AKIAEXAMPLE".to_string(),
                    secret_key: "secret".to_string(),
                    session_token: Some("token".to_string()),
                }),
                registry: Some(RegistryCredentials {
                    username: "AWS".to_string(),
                    password: "ecr-password".to_string(),
                    endpoint: "https://123456789012.dkr.ecr.us-east-1.amazonaws.com".to_string(),
                }),
                registry_lookups: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn without_session(mut self) -> Self {
            self.session = None;
            self
        }

        pub(crate) fn without_registry(mut self) -> Self {
            self.registry = None;
            self
        }
    }

    #[async_trait]
    impl CredentialSource for StaticCredentials {
        async fn session_credentials(&self, _region: &str) -> Option<SessionCredentials> {
            self.session.clone()
        }

        async fn registry_credentials(&self, registry_uri: &str) -> Option<RegistryCredentials> {
            self.registry_lookups
                .lock()
                .unwrap()
                .push(registry_uri.to_string());
            self.registry.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URI: &str = "123456789012.dkr.ecr.us-east-1.amazonaws.com/repo";

    #[test]
    fn test_registry_id_from_uri() {
        assert_eq!(registry_id(URI), "123456789012");
    }

    #[test]
    fn test_registry_host_from_uri() {
        assert_eq!(
            registry_host(URI),
            "123456789012.dkr.ecr.us-east-1.amazonaws.com"
        );
        assert_eq!(
            registry_host("123456789012.dkr.ecr.us-east-1.amazonaws.com/team/app"),
            "123456789012.dkr.ecr.us-east-1.amazonaws.com"
        );
        assert_eq!(registry_host("localhost:5000"), "localhost:5000");
    }

    #[test]
    fn test_decode_authorization_token() {
        let token = base64::engine::general_purpose::STANDARD.encode("AWS:pa:ss");
        let (username, password) = decode_authorization_token(&token).unwrap();
        assert_eq!(username, "AWS");
        assert_eq!(password, "pa:ss");
    }

    #[test]
    fn test_decode_rejects_bad_tokens() {
        assert!(decode_authorization_token("!!not base64!!").is_err());

        let no_colon = base64::engine::general_purpose::STANDARD.encode("AWSpassword");
        assert!(decode_authorization_token(&no_colon).is_err());

        let not_utf8 = base64::engine::general_purpose::STANDARD.encode([0xff, 0xfe, b':']);
        assert!(decode_authorization_token(&not_utf8).is_err());
    }

    #[test]
    fn test_session_credentials_completeness() {
        let mut session = SessionCredentials {
            access_key: "AKIAEXAMPLE".to_string(),
            secret_key: "secret".to_string(),
            session_token: None,
        };
        assert!(session.is_complete());

        session.secret_key.clear();
        assert!(!session.is_complete());
    }

    #[test]
    fn test_credentials_debug_redacts_secrets() {
        let creds = RegistryCredentials {
            username: "AWS".to_string(),
            password: "ecr-password".to_string(),
            endpoint: "https://example".to_string(),
        };
        assert!(!format!("{:?}", creds).contains("ecr-password"));
    }
}
