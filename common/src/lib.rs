use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("SerializationError: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("YamlError: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("K8s error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Registering template failed with error: {0}")]
    HbsTemplateError(#[from] Box<handlebars::TemplateError>),
    #[error("Renderer error: {0}")]
    HbsRenderError(#[from] Box<handlebars::RenderError>),

    #[error("Reqwest error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    #[error("{0} query failed: {1} {2}")]
    MethodFailed(String, u16, String),

    #[error("Request to {0} timed out")]
    Timeout(String),

    #[error("Centreon authentication failed: {0}")]
    AuthFailed(String),

    #[error("Platform {0} not found")]
    PlatformNotFound(String),

    #[error("Secret {0} is missing or lacks the {1} key")]
    MissingCredentials(String, String),

    #[error("Unsupported kind {0}")]
    UnsupportedKind(String),

    #[error("Template {0} produced an invalid {1}: {2}")]
    InvalidGenerated(String, String, String),

    #[error("Invalid template: {0}")]
    InvalidTemplate(String),

    #[error("Error: {0}")]
    Other(String),
}
impl Error {
    pub fn metric_label(&self) -> String {
        format!("{self:?}").to_lowercase()
    }

    /// Misconfigured templates and generated objects will not fix themselves on retry
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Error::InvalidGenerated(..)
                | Error::InvalidTemplate(_)
                | Error::UnsupportedKind(_)
                | Error::HbsTemplateError(_)
        )
    }
}
impl From<handlebars::TemplateError> for Error {
    fn from(e: handlebars::TemplateError) -> Self {
        Error::HbsTemplateError(Box::new(e))
    }
}
impl From<handlebars::RenderError> for Error {
    fn from(e: handlebars::RenderError) -> Self {
        Error::HbsRenderError(Box::new(e))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

pub mod centreon;
pub mod centreonservice;
pub mod centreonservicegroup;
pub mod children;
pub mod conditions;
pub mod diff;
pub mod handlebarshandler;
pub mod hasheshandlers;
pub mod placeholders;
pub mod platform;
pub mod policy;
pub mod registry;
pub mod template;

pub static DEFAULT_DOMAIN: &str = "monitor.k8s.webcenter.fr";
pub static MANAGED_COMMENT: &str = "Managed by monitoring-operator";

/// Annotation and label keys, all living under the operator domain
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Domain(String);
impl Default for Domain {
    fn default() -> Self {
        Self(DEFAULT_DOMAIN.to_string())
    }
}
impl Domain {
    #[must_use]
    pub fn new(domain: &str) -> Self {
        Self(domain.to_string())
    }

    pub fn templates_annotation(&self) -> String {
        format!("{}/templates", self.0)
    }

    pub fn template_label(&self) -> String {
        format!("{}/template", self.0)
    }

    pub fn parent_label(&self) -> String {
        format!("{}/parent", self.0)
    }
}

/// Reference to a namespaced object, as found in the templates annotation
#[derive(Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NamespacedName {
    /// Namespace of the object, default to the namespace of the referencing resource
    #[serde(default)]
    pub namespace: String,
    /// Name of the object
    pub name: String,
}
impl NamespacedName {
    #[must_use]
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    /// Label-safe rendering (`/` is not allowed in label values).
    ///
    /// Values over 63 characters keep a readable prefix and end with a digest of the full reference.
    pub fn to_label(&self) -> String {
        let raw = if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        };
        if raw.len() <= LABEL_VALUE_MAX && is_label_value(&raw) {
            return raw;
        }
        let digest = sha256::digest(raw.clone());
        let suffix = &digest[..LABEL_DIGEST_LEN];
        let prefix: String = raw
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || matches!(*c, '-' | '_' | '.'))
            .take(LABEL_VALUE_MAX - LABEL_DIGEST_LEN - 1)
            .collect();
        let prefix = prefix.trim_matches(|c: char| !c.is_ascii_alphanumeric());
        if prefix.is_empty() {
            suffix.to_string()
        } else {
            format!("{prefix}-{suffix}")
        }
    }
}

const LABEL_VALUE_MAX: usize = 63;
const LABEL_DIGEST_LEN: usize = 12;

fn is_label_value(value: &str) -> bool {
    value.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && value.starts_with(|c: char| c.is_ascii_alphanumeric())
        && value.ends_with(|c: char| c.is_ascii_alphanumeric())
}
impl std::fmt::Display for NamespacedName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}/{}", self.namespace, self.name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_label_is_readable() {
        assert_eq!(NamespacedName::new("prod", "web").to_label(), "prod.web");
        assert_eq!(NamespacedName::new("", "node-1").to_label(), "node-1");
    }

    #[test]
    fn test_long_label_is_bounded() {
        let long = NamespacedName::new("ecommerce-production", "storefront-public-api-gateway-ingress-canary");
        let label = long.to_label();
        assert!(label.len() <= 63, "{label} is {} long", label.len());
        assert!(label.starts_with("ecommerce-production.storefront"));
        assert!(is_label_value(&label));
        assert_eq!(label, long.to_label());

        let other = NamespacedName::new("ecommerce-production", "storefront-public-api-gateway-ingress-stable");
        assert_ne!(label, other.to_label());

        let huge = NamespacedName::new(&"a".repeat(253), &"b".repeat(253));
        assert!(huge.to_label().len() <= 63);
    }
}
