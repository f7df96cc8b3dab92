//! Remote Centreon state and the API used to converge it.
//!
//! Every scalar is kept in the string form Centreon uses on the wire
//! ("1"/"0"/"2" for flags), so actual and expected states compare as-is.

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[cfg(test)]
use mockall::automock;

mod clapi;
pub use clapi::{CentreonClient, CentreonSettings, Credentials};

pub static MACRO_SOURCE_DIRECT: &str = "direct";

/// A service macro as returned by `getmacro`
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Macro {
    pub name: String,
    pub value: String,
    pub is_password: String,
    pub source: String,
}
impl Macro {
    #[must_use]
    pub fn direct(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
            is_password: "0".to_string(),
            source: MACRO_SOURCE_DIRECT.to_string(),
        }
    }

    pub fn password_flag(&self) -> &str {
        if self.is_password.is_empty() {
            "0"
        } else {
            &self.is_password
        }
    }
}

/// A Centreon service, either read from the platform or expected from a spec
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Service {
    pub host: String,
    pub name: String,
    pub check_command: String,
    pub check_command_args: String,
    pub normal_check_interval: String,
    pub retry_check_interval: String,
    pub max_check_attempts: String,
    pub active_check_enabled: String,
    pub passive_check_enabled: String,
    pub activated: String,
    pub template: String,
    pub comment: String,
    pub groups: Vec<String>,
    pub categories: Vec<String>,
    pub macros: Vec<Macro>,
}

/// A Centreon service group
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ServiceGroup {
    pub name: String,
    pub activated: String,
    pub comment: String,
    pub description: String,
}

/// Operations consumed from the Centreon platform
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CentreonApi: Send + Sync {
    async fn get_service(&self, host: &str, name: &str) -> Result<Option<Service>>;
    async fn add_service(&self, host: &str, name: &str, template: &str) -> Result<()>;
    async fn set_service_param(&self, host: &str, name: &str, param: &str, value: &str) -> Result<()>;
    async fn set_service_groups(&self, host: &str, name: &str, groups: &[String]) -> Result<()>;
    async fn delete_service_groups(&self, host: &str, name: &str, groups: &[String]) -> Result<()>;
    async fn set_service_categories(&self, host: &str, name: &str, categories: &[String]) -> Result<()>;
    async fn delete_service_categories(&self, host: &str, name: &str, categories: &[String]) -> Result<()>;
    async fn set_service_macro(&self, host: &str, name: &str, service_macro: &Macro) -> Result<()>;
    async fn delete_service_macro(&self, host: &str, name: &str, macro_name: &str) -> Result<()>;
    async fn set_service_host(&self, host: &str, name: &str, new_host: &str) -> Result<()>;
    async fn delete_service(&self, host: &str, name: &str) -> Result<()>;

    async fn get_service_group(&self, name: &str) -> Result<Option<ServiceGroup>>;
    async fn add_service_group(&self, name: &str, description: &str) -> Result<()>;
    async fn set_service_group_param(&self, name: &str, param: &str, value: &str) -> Result<()>;
    async fn delete_service_group(&self, name: &str) -> Result<()>;
}
