use crate::{
    centreon::{CentreonApi, ServiceGroup},
    centreonservice::bool_flag,
    conditions::{conditions_on_failure, conditions_on_success, ApplicationCondition},
    diff::{diff_service_group, ServiceGroupDiff, GROUP_RENAME_PARAM},
    policy::{Gated, Policy, PolicyGate, SyncOutcome},
    Result, MANAGED_COMMENT,
};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::*;

/// Describe a Centreon service group to keep in sync
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[kube(
    kind = "CentreonServiceGroup",
    status = "CentreonServiceGroupStatus",
    shortname = "mcsg",
    group = "monitor.k8s.webcenter.fr",
    version = "v1",
    namespaced
)]
#[kube(
    doc = "Custom resource representing a Centreon service group",
    printcolumn = r#"
    {"name":"group", "type":"string", "description":"Service group name", "jsonPath":".spec.name"},
    {"name":"ready", "type":"string", "description":"Ready", "jsonPath":".status.conditions[?(@.type == 'Ready')].status"},
    {"name":"errors","type":"string", "description":"Errors", "jsonPath":".status.conditions[?(@.status == 'False')].message"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct CentreonServiceGroupSpec {
    /// Platform to use, default platform when empty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_ref: Option<String>,
    /// Service group name
    #[serde(default)]
    pub name: String,
    /// Service group description
    #[serde(default)]
    pub description: String,
    /// Enable the service group
    #[serde(default)]
    pub activate: bool,
    /// What the operator is allowed to do on the remote service group
    #[serde(default)]
    pub policy: Policy,
}

/// The status object of `CentreonServiceGroup`
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema, Default)]
pub struct CentreonServiceGroupStatus {
    /// Name of the service group on the platform
    pub name: Option<String>,
    /// Conditions
    #[serde(default)]
    pub conditions: Vec<ApplicationCondition>,
}

impl CentreonServiceGroupSpec {
    pub fn is_valid(&self) -> bool {
        self.validation_error().is_none()
    }

    pub fn validation_error(&self) -> Option<String> {
        if self.name.is_empty() {
            Some("name must be set".to_string())
        } else if self.description.is_empty() {
            Some("description must be set".to_string())
        } else {
            None
        }
    }

    pub fn to_centreon(&self) -> ServiceGroup {
        ServiceGroup {
            name: self.name.clone(),
            activated: bool_flag(self.activate),
            comment: MANAGED_COMMENT.to_string(),
            description: self.description.clone(),
        }
    }
}

impl CentreonServiceGroup {
    pub fn remote_name(&self) -> String {
        self.status
            .as_ref()
            .and_then(|s| s.name.clone())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| self.spec.name.clone())
    }

    pub fn platform_ref(&self) -> &str {
        self.spec.platform_ref.as_deref().unwrap_or_default()
    }

    /// Status after a successful pass. The name is only moved when the pass was applied
    pub fn status_on_success(&self, message: &str, applied: bool) -> CentreonServiceGroupStatus {
        let previous = self.status.clone().unwrap_or_default();
        let generation = self.metadata.generation.unwrap_or_default();
        CentreonServiceGroupStatus {
            name: if applied { Some(self.spec.name.clone()) } else { previous.name },
            conditions: conditions_on_success(&previous.conditions, generation, message),
        }
    }

    pub fn status_on_failure(&self, reason: &str) -> CentreonServiceGroupStatus {
        let previous = self.status.clone().unwrap_or_default();
        let generation = self.metadata.generation.unwrap_or_default();
        CentreonServiceGroupStatus {
            conditions: conditions_on_failure(&previous.conditions, generation, reason),
            ..previous
        }
    }
}

/// Rename first, the other params then address the new name
pub async fn apply_service_group_diff(api: &dyn CentreonApi, name: &str, diff: &ServiceGroupDiff) -> Result<()> {
    let mut name = name.to_string();
    if let Some(new_name) = diff.params_to_set.get(GROUP_RENAME_PARAM) {
        api.set_service_group_param(&name, GROUP_RENAME_PARAM, new_name)
            .await?;
        name = new_name.clone();
    }
    for (param, value) in diff
        .params_to_set
        .iter()
        .filter(|(param, _)| param.as_str() != GROUP_RENAME_PARAM)
    {
        api.set_service_group_param(&name, param, value).await?;
    }
    Ok(())
}

pub async fn create_service_group(api: &dyn CentreonApi, expected: &ServiceGroup) -> Result<()> {
    api.add_service_group(&expected.name, &expected.description)
        .await?;
    let blank = ServiceGroup {
        name: expected.name.clone(),
        description: expected.description.clone(),
        ..ServiceGroup::default()
    };
    let diff = diff_service_group(&blank, expected, &[]);
    apply_service_group_diff(api, &expected.name, &diff).await
}

pub async fn sync_service_group(
    api: &dyn CentreonApi,
    remote_name: &str,
    spec: &CentreonServiceGroupSpec,
    gate: &PolicyGate<'_>,
) -> Result<SyncOutcome<ServiceGroupDiff>> {
    let expected = spec.to_centreon();
    let mut actual = api.get_service_group(remote_name).await?;
    if actual.is_none() && remote_name != expected.name {
        actual = api.get_service_group(&expected.name).await?;
    }
    match actual {
        None => match gate.create(create_service_group(api, &expected)).await? {
            Gated::Done => Ok(SyncOutcome::Created),
            Gated::Skipped => Ok(SyncOutcome::Skipped),
        },
        Some(actual) => {
            let diff = diff_service_group(&actual, &expected, gate.excluded_fields());
            if !diff.is_diff {
                return Ok(SyncOutcome::Unchanged);
            }
            debug!("Service group {} differs: {:?}", actual.name, diff);
            match gate
                .update(apply_service_group_diff(api, &actual.name, &diff))
                .await?
            {
                Gated::Done => Ok(SyncOutcome::Updated(diff)),
                Gated::Skipped => Ok(SyncOutcome::Skipped),
            }
        }
    }
}

pub async fn remove_service_group(api: &dyn CentreonApi, name: &str, gate: &PolicyGate<'_>) -> Result<Gated> {
    if api.get_service_group(name).await?.is_none() {
        debug!("Service group {name} already gone");
        return Ok(Gated::Done);
    }
    gate.delete(api.delete_service_group(name)).await
}
