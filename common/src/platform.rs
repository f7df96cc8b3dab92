use crate::{
    centreon::{CentreonSettings, Credentials},
    conditions::{conditions_on_failure, conditions_on_success, ApplicationCondition},
    Error, Result,
};
use k8s_openapi::api::core::v1::Secret;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub static USERNAME_KEY: &str = "username";
pub static PASSWORD_KEY: &str = "password";

#[derive(Serialize, Deserialize, Eq, PartialEq, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlatformType {
    #[default]
    Centreon,
}

/// How to reach a Centreon platform
#[derive(Serialize, Deserialize, Eq, PartialEq, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlatformCentreonSettings {
    /// Centreon base URL, e.g. https://centreon.local/centreon
    pub url: String,
    /// Accept self-signed certificates
    #[serde(default)]
    pub self_signed_certificate: bool,
    /// Name of the secret in the platform namespace holding `username` and `password`
    pub secret: String,
    /// CLAPI path relative to `url`, default to `api/index.php`
    pub endpoint: Option<String>,
}

/// Describe a monitoring platform the services are pushed to
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[kube(
    kind = "Platform",
    status = "PlatformStatus",
    shortname = "mplt",
    group = "monitor.k8s.webcenter.fr",
    version = "v1",
    namespaced
)]
#[kube(
    doc = "Custom resource representing a monitoring platform",
    printcolumn = r#"
    {"name":"default", "type":"boolean", "description":"Default platform", "jsonPath":".spec.isDefault"},
    {"name":"type",    "type":"string", "description":"Platform type", "jsonPath":".spec.platformType"},
    {"name":"ready",   "type":"string", "description":"Ready", "jsonPath":".status.conditions[?(@.type == 'Ready')].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct PlatformSpec {
    /// Used when a resource does not name its platform
    #[serde(default)]
    pub is_default: bool,
    /// Name used by `platformRef`, default to the resource name
    pub name: Option<String>,
    /// Platform type
    #[serde(default)]
    pub platform_type: PlatformType,
    /// Centreon settings
    pub centreon_settings: Option<PlatformCentreonSettings>,
}

/// The status object of `Platform`
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema, Default)]
pub struct PlatformStatus {
    /// Platform Conditions
    pub conditions: Vec<ApplicationCondition>,
}

impl Platform {
    /// Key of this platform in the registry
    pub fn registry_name(&self) -> String {
        self.spec.name.clone().unwrap_or_else(|| self.name_any())
    }

    pub fn centreon(&self) -> Result<&PlatformCentreonSettings> {
        self.spec
            .centreon_settings
            .as_ref()
            .ok_or_else(|| Error::Other(format!("Platform {} has no centreonSettings", self.name_any())))
    }

    pub fn status_on_success(&self, message: &str) -> PlatformStatus {
        let previous = self.status.clone().unwrap_or_default();
        let generation = self.metadata.generation.unwrap_or_default();
        PlatformStatus {
            conditions: conditions_on_success(&previous.conditions, generation, message),
        }
    }

    pub fn status_on_failure(&self, reason: &str) -> PlatformStatus {
        let previous = self.status.clone().unwrap_or_default();
        let generation = self.metadata.generation.unwrap_or_default();
        PlatformStatus {
            conditions: conditions_on_failure(&previous.conditions, generation, reason),
        }
    }

    pub fn settings(&self, timeout_seconds: u64) -> Result<CentreonSettings> {
        let centreon = self.centreon()?;
        Ok(CentreonSettings {
            url: centreon.url.clone(),
            self_signed_certificate: centreon.self_signed_certificate,
            endpoint: centreon.endpoint.clone(),
            timeout_seconds,
        })
    }
}

fn secret_value(secret: &Secret, key: &str) -> Result<String> {
    let missing = || Error::MissingCredentials(secret.name_any(), key.to_string());
    if let Some(value) = secret.data.as_ref().and_then(|d| d.get(key)) {
        return String::from_utf8(value.0.clone()).map_err(|_| missing());
    }
    secret
        .string_data
        .as_ref()
        .and_then(|d| d.get(key))
        .cloned()
        .ok_or_else(missing)
}

pub fn credentials_from_secret(secret: &Secret) -> Result<Credentials> {
    Ok(Credentials {
        username: secret_value(secret, USERNAME_KEY)?,
        password: secret_value(secret, PASSWORD_KEY)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::ByteString;
    use std::collections::BTreeMap;

    #[test]
    fn test_credentials_from_secret() {
        let mut secret = Secret::default();
        secret.metadata.name = Some("centreon".into());
        secret.data = Some(BTreeMap::from([
            ("username".to_string(), ByteString(b"admin".to_vec())),
            ("password".to_string(), ByteString(b"pass".to_vec())),
        ]));
        let creds = credentials_from_secret(&secret).unwrap();
        assert_eq!(creds.username, "admin");
        assert_eq!(creds.password, "pass");
    }

    #[test]
    fn test_missing_password() {
        let mut secret = Secret::default();
        secret.metadata.name = Some("centreon".into());
        secret.data = Some(BTreeMap::from([(
            "username".to_string(),
            ByteString(b"admin".to_vec()),
        )]));
        assert!(matches!(
            credentials_from_secret(&secret),
            Err(Error::MissingCredentials(s, k)) if s == "centreon" && k == "password"
        ));
    }

    #[test]
    fn test_registry_name_defaults_to_resource_name() {
        let mut platform = Platform::new("prod", PlatformSpec {
            is_default: true,
            name: None,
            platform_type: PlatformType::Centreon,
            centreon_settings: Some(PlatformCentreonSettings {
                url: "https://centreon".into(),
                self_signed_certificate: true,
                secret: "centreon".into(),
                endpoint: None,
            }),
        });
        assert_eq!(platform.registry_name(), "prod");
        platform.spec.name = Some("main".into());
        assert_eq!(platform.registry_name(), "main");
        let settings = platform.settings(30).unwrap();
        assert!(settings.self_signed_certificate);
        assert_eq!(settings.timeout_seconds, 30);
        assert_eq!(settings.clapi_url(), "https://centreon/api/index.php");
    }

    #[test]
    fn test_custom_endpoint() {
        let platform = Platform::new("prod", PlatformSpec {
            is_default: false,
            name: None,
            platform_type: PlatformType::Centreon,
            centreon_settings: Some(PlatformCentreonSettings {
                url: "https://centreon/centreon/".into(),
                self_signed_certificate: false,
                secret: "centreon".into(),
                endpoint: Some("/centreon/api/index.php".into()),
            }),
        });
        let settings = platform.settings(10).unwrap();
        assert_eq!(settings.clapi_url(), "https://centreon/centreon/centreon/api/index.php");
    }

    #[test]
    fn test_ready_platform_status_is_stable() {
        let mut platform = Platform::new("prod", PlatformSpec {
            is_default: false,
            name: None,
            platform_type: PlatformType::Centreon,
            centreon_settings: None,
        });
        let ready = platform.status_on_success("Client ready");
        platform.status = Some(ready.clone());
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert_eq!(platform.status_on_success("Client ready"), ready);
        assert!(platform.status_on_failure("no secret") != ready);
    }
}
