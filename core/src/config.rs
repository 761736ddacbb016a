use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::AzureError;

pub const TENANT_ID_ENV: &str = "AZURE_TENANT_ID";
pub const CLIENT_ID_ENV: &str = "AZURE_CLIENT_ID";
pub const CLIENT_SECRET_ENV: &str = "AZURE_CLIENT_SECRET";
pub const SUBSCRIPTION_ID_ENV: &str = "AZURE_SUBSCRIPTION_ID";

pub const REQUIRED_ENV: [&str; 4] = [
    TENANT_ID_ENV,
    CLIENT_ID_ENV,
    CLIENT_SECRET_ENV,
    SUBSCRIPTION_ID_ENV,
];

pub const DEFAULT_MANAGEMENT_URL: &str = "https://management.azure.com";
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_EXPORT_DIR: &str = "export";

/// Service principal identity. Read once at startup, never mutated.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub subscription_id: String,
}

impl Credential {
    pub fn from_env() -> Result<Self, AzureError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Every missing or blank variable is reported, not just the first one.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AzureError> {
        let mut missing = Vec::new();
        let mut read = |key: &'static str| {
            let value = lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty());
            if value.is_none() {
                missing.push(key);
            }
            value.unwrap_or_default()
        };

        let credential = Credential {
            tenant_id: read(TENANT_ID_ENV),
            client_id: read(CLIENT_ID_ENV),
            client_secret: read(CLIENT_SECRET_ENV),
            subscription_id: read(SUBSCRIPTION_ID_ENV),
        };

        if missing.is_empty() {
            Ok(credential)
        } else {
            Err(AzureError::Configuration { missing })
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("subscription_id", &self.subscription_id)
            .finish()
    }
}

/// Non-secret runtime knobs, normally filled from CLI flags / env fallbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub management_url: String,
    pub authority_host: String,
    pub request_timeout: Duration,
    pub export_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            management_url: DEFAULT_MANAGEMENT_URL.to_string(),
            authority_host: DEFAULT_AUTHORITY_HOST.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            export_dir: PathBuf::from(DEFAULT_EXPORT_DIR),
        }
    }
}

/// Immutable configuration handed to every call.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub credential: Credential,
    pub settings: Settings,
}

impl RuntimeConfig {
    pub fn new(credential: Credential, settings: Settings) -> Self {
        Self {
            credential,
            settings,
        }
    }

    pub fn from_env(settings: Settings) -> Result<Self, AzureError> {
        Ok(Self::new(Credential::from_env()?, settings))
    }

    pub fn from_lookup(
        settings: Settings,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, AzureError> {
        Ok(Self::new(Credential::from_lookup(lookup)?, settings))
    }

    pub fn management_url(&self) -> &str {
        self.settings.management_url.trim_end_matches('/')
    }

    pub fn token_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.settings.authority_host.trim_end_matches('/'),
            self.credential.tenant_id
        )
    }

    /// `.default` scope of the management audience.
    pub fn token_scope(&self) -> String {
        format!("{}/.default", self.management_url())
    }

    pub fn subscription_id(&self) -> &str {
        &self.credential.subscription_id
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn full_env() -> HashMap<&'static str, String> {
        HashMap::from([
            (TENANT_ID_ENV, "tenant".to_string()),
            (CLIENT_ID_ENV, "client".to_string()),
            (CLIENT_SECRET_ENV, "secret".to_string()),
            (SUBSCRIPTION_ID_ENV, "sub".to_string()),
        ])
    }

    #[test]
    fn loads_when_all_four_values_present() {
        let env = full_env();
        let credential = Credential::from_lookup(|key| env.get(key).cloned()).unwrap();
        assert_eq!(credential.tenant_id, "tenant");
        assert_eq!(credential.subscription_id, "sub");
    }

    #[test]
    fn each_missing_value_is_a_configuration_error() {
        for key in REQUIRED_ENV {
            let mut env = full_env();
            env.remove(key);
            let err = Credential::from_lookup(|k| env.get(k).cloned()).unwrap_err();
            assert_eq!(err, AzureError::Configuration { missing: vec![key] });
        }
    }

    #[test]
    fn blank_values_count_as_missing() {
        let mut env = full_env();
        env.insert(CLIENT_SECRET_ENV, "   ".to_string());
        let err = Credential::from_lookup(|k| env.get(k).cloned()).unwrap_err();
        assert_eq!(
            err,
            AzureError::Configuration {
                missing: vec![CLIENT_SECRET_ENV]
            }
        );
    }

    #[test]
    fn debug_output_redacts_secret() {
        let env = full_env();
        let credential = Credential::from_lookup(|key| env.get(key).cloned()).unwrap();
        let rendered = format!("{credential:?}");
        assert!(!rendered.contains("secret\""));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn token_url_and_scope_follow_settings() {
        let env = full_env();
        let config = RuntimeConfig::from_lookup(
            Settings {
                management_url: "http://127.0.0.1:9/".to_string(),
                authority_host: "http://127.0.0.1:8/".to_string(),
                ..Settings::default()
            },
            |key| env.get(key).cloned(),
        )
        .unwrap();
        assert_eq!(config.token_url(), "http://127.0.0.1:8/tenant/oauth2/v2.0/token");
        assert_eq!(config.token_scope(), "http://127.0.0.1:9/.default");
    }
}
