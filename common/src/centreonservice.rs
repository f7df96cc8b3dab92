use crate::{
    centreon::{CentreonApi, Macro, Service},
    conditions::{conditions_on_failure, conditions_on_success, ApplicationCondition},
    diff::{diff_service, ServiceDiff, SERVICE_RENAME_PARAM},
    policy::{Gated, Policy, PolicyGate, SyncOutcome},
    Result, MANAGED_COMMENT,
};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::*;

/// Describe a Centreon service to keep in sync
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[kube(
    kind = "CentreonService",
    status = "CentreonServiceStatus",
    shortname = "mcs",
    group = "monitor.k8s.webcenter.fr",
    version = "v1",
    namespaced
)]
#[kube(
    doc = "Custom resource representing a Centreon service",
    printcolumn = r#"
    {"name":"host",   "type":"string", "description":"Host", "jsonPath":".spec.host"},
    {"name":"service","type":"string", "description":"Service name", "jsonPath":".spec.name"},
    {"name":"ready",  "type":"string", "description":"Ready", "jsonPath":".status.conditions[?(@.type == 'Ready')].status"},
    {"name":"errors", "type":"string", "description":"Errors", "jsonPath":".status.conditions[?(@.status == 'False')].message"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct CentreonServiceSpec {
    /// Platform to use, default platform when empty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_ref: Option<String>,
    /// Host the service is attached to
    #[serde(default)]
    pub host: String,
    /// Service name
    #[serde(default)]
    pub name: String,
    /// Service template
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub template: String,
    /// Check command
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub check_command: String,
    /// Check command arguments
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<String>,
    /// Service groups
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,
    /// Service categories
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normal_check_interval: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_check_interval: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_check_attempts: Option<String>,
    /// Unset keeps the Centreon default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_check_enabled: Option<bool>,
    /// Unset keeps the Centreon default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passive_check_enabled: Option<bool>,
    /// Enable the service
    #[serde(default)]
    pub activate: bool,
    /// Service macros
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub macros: BTreeMap<String, String>,
    /// What the operator is allowed to do on the remote service
    #[serde(default)]
    pub policy: Policy,
}

/// The status object of `CentreonService`
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema, Default)]
pub struct CentreonServiceStatus {
    /// Host of the service on the platform
    pub host: Option<String>,
    /// Name of the service on the platform
    pub name: Option<String>,
    /// Conditions
    #[serde(default)]
    pub conditions: Vec<ApplicationCondition>,
}

pub(crate) fn bool_flag(value: bool) -> String {
    if value { "1" } else { "0" }.to_string()
}

/// "2" is the Centreon "default" value
fn optional_flag(value: Option<bool>) -> String {
    value.map(bool_flag).unwrap_or_else(|| "2".to_string())
}

impl CentreonServiceSpec {
    pub fn is_valid(&self) -> bool {
        !self.host.is_empty()
            && !self.name.is_empty()
            && (!self.check_command.is_empty() || !self.template.is_empty())
    }

    /// Why the spec is not valid, if it is not
    pub fn validation_error(&self) -> Option<String> {
        if self.host.is_empty() {
            Some("host must be set".to_string())
        } else if self.name.is_empty() {
            Some("name must be set".to_string())
        } else if self.check_command.is_empty() && self.template.is_empty() {
            Some("either checkCommand or template must be set".to_string())
        } else {
            None
        }
    }

    /// The service as Centreon should hold it
    pub fn to_centreon(&self) -> Service {
        let check_command_args = self
            .arguments
            .iter()
            .map(|a| format!("!{a}"))
            .collect::<Vec<String>>()
            .join("");
        Service {
            host: self.host.clone(),
            name: self.name.clone(),
            check_command: self.check_command.clone(),
            check_command_args,
            normal_check_interval: self.normal_check_interval.clone().unwrap_or_default(),
            retry_check_interval: self.retry_check_interval.clone().unwrap_or_default(),
            max_check_attempts: self.max_check_attempts.clone().unwrap_or_default(),
            active_check_enabled: optional_flag(self.active_check_enabled),
            passive_check_enabled: optional_flag(self.passive_check_enabled),
            activated: bool_flag(self.activate),
            template: self.template.clone(),
            comment: MANAGED_COMMENT.to_string(),
            groups: self.groups.clone(),
            categories: self.categories.clone(),
            macros: self
                .macros
                .iter()
                .map(|(name, value)| Macro::direct(&name.to_uppercase(), value))
                .collect(),
        }
    }
}

impl CentreonService {
    /// Identity of the remote service: the last synchronized one, else the wanted one
    pub fn remote_identity(&self) -> (String, String) {
        match self.status.as_ref() {
            Some(CentreonServiceStatus {
                host: Some(host),
                name: Some(name),
                ..
            }) if !host.is_empty() && !name.is_empty() => (host.clone(), name.clone()),
            _ => (self.spec.host.clone(), self.spec.name.clone()),
        }
    }

    pub fn platform_ref(&self) -> &str {
        self.spec.platform_ref.as_deref().unwrap_or_default()
    }

    /// Status after a successful pass. The identity is only moved when the pass was applied
    pub fn status_on_success(&self, message: &str, applied: bool) -> CentreonServiceStatus {
        let previous = self.status.clone().unwrap_or_default();
        let generation = self.metadata.generation.unwrap_or_default();
        let conditions = conditions_on_success(&previous.conditions, generation, message);
        if applied {
            CentreonServiceStatus {
                host: Some(self.spec.host.clone()),
                name: Some(self.spec.name.clone()),
                conditions,
            }
        } else {
            CentreonServiceStatus { conditions, ..previous }
        }
    }

    pub fn status_on_failure(&self, reason: &str) -> CentreonServiceStatus {
        let previous = self.status.clone().unwrap_or_default();
        let generation = self.metadata.generation.unwrap_or_default();
        CentreonServiceStatus {
            conditions: conditions_on_failure(&previous.conditions, generation, reason),
            ..previous
        }
    }
}

/// Apply a plan on the service known as `host`/`name`.
///
/// The rename goes first, then the other params on the renamed service,
/// then the host move; lists and macros address the moved service.
pub async fn apply_service_diff(api: &dyn CentreonApi, host: &str, name: &str, diff: &ServiceDiff) -> Result<()> {
    let mut host = host.to_string();
    let mut name = name.to_string();
    if let Some(new_name) = diff.params_to_set.get(SERVICE_RENAME_PARAM) {
        api.set_service_param(&host, &name, SERVICE_RENAME_PARAM, new_name)
            .await?;
        name = new_name.clone();
    }
    for (param, value) in diff
        .params_to_set
        .iter()
        .filter(|(param, _)| param.as_str() != SERVICE_RENAME_PARAM)
    {
        api.set_service_param(&host, &name, param, value).await?;
    }
    if let Some(new_host) = &diff.host_to_set {
        api.set_service_host(&host, &name, new_host).await?;
        host = new_host.clone();
    }
    if !diff.groups_to_set.is_empty() {
        api.set_service_groups(&host, &name, &diff.groups_to_set).await?;
    }
    if !diff.groups_to_delete.is_empty() {
        api.delete_service_groups(&host, &name, &diff.groups_to_delete)
            .await?;
    }
    if !diff.categories_to_set.is_empty() {
        api.set_service_categories(&host, &name, &diff.categories_to_set)
            .await?;
    }
    if !diff.categories_to_delete.is_empty() {
        api.delete_service_categories(&host, &name, &diff.categories_to_delete)
            .await?;
    }
    for m in &diff.macros_to_set {
        api.set_service_macro(&host, &name, m).await?;
    }
    for m in &diff.macros_to_delete {
        api.delete_service_macro(&host, &name, &m.name).await?;
    }
    Ok(())
}

/// Add the service then push everything `add` does not set
pub async fn create_service(api: &dyn CentreonApi, expected: &Service) -> Result<()> {
    api.add_service(&expected.host, &expected.name, &expected.template)
        .await?;
    let blank = Service {
        host: expected.host.clone(),
        name: expected.name.clone(),
        template: expected.template.clone(),
        ..Service::default()
    };
    let diff = diff_service(&blank, expected, &[]);
    apply_service_diff(api, &expected.host, &expected.name, &diff).await
}

/// Read, diff then apply, as far as the policy allows
pub async fn sync_service(
    api: &dyn CentreonApi,
    identity: (&str, &str),
    spec: &CentreonServiceSpec,
    gate: &PolicyGate<'_>,
) -> Result<SyncOutcome<ServiceDiff>> {
    let expected = spec.to_centreon();
    let (host, name) = identity;
    let mut actual = api.get_service(host, name).await?;
    if actual.is_none() && (host, name) != (expected.host.as_str(), expected.name.as_str()) {
        actual = api.get_service(&expected.host, &expected.name).await?;
    }
    match actual {
        None => {
            debug!("Service {}/{} not found on the platform", expected.host, expected.name);
            match gate.create(create_service(api, &expected)).await? {
                Gated::Done => Ok(SyncOutcome::Created),
                Gated::Skipped => Ok(SyncOutcome::Skipped),
            }
        }
        Some(actual) => {
            let diff = diff_service(&actual, &expected, gate.excluded_fields());
            if !diff.is_diff {
                return Ok(SyncOutcome::Unchanged);
            }
            debug!("Service {}/{} differs: {:?}", actual.host, actual.name, diff);
            match gate
                .update(apply_service_diff(api, &actual.host, &actual.name, &diff))
                .await?
            {
                Gated::Done => Ok(SyncOutcome::Updated(diff)),
                Gated::Skipped => Ok(SyncOutcome::Skipped),
            }
        }
    }
}

/// Remove the remote service, if it still exists
pub async fn remove_service(api: &dyn CentreonApi, identity: (&str, &str), gate: &PolicyGate<'_>) -> Result<Gated> {
    let (host, name) = identity;
    if api.get_service(host, name).await?.is_none() {
        debug!("Service {host}/{name} already gone");
        return Ok(Gated::Done);
    }
    gate.delete(api.delete_service(host, name)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::centreon::MockCentreonApi;
    use mockall::{predicate::*, Sequence};

    fn spec() -> CentreonServiceSpec {
        CentreonServiceSpec {
            host: "localhost".into(),
            name: "ping".into(),
            template: "generic-service".into(),
            arguments: vec!["80".into(), "90".into()],
            groups: vec!["sg1".into()],
            activate: true,
            macros: BTreeMap::from([("warning".to_string(), "80".to_string())]),
            ..CentreonServiceSpec::default()
        }
    }

    #[test]
    fn test_validity() {
        assert!(spec().is_valid());
        let mut s = spec();
        s.host = String::new();
        assert!(!s.is_valid());
        assert_eq!(s.validation_error().unwrap(), "host must be set");
        let mut s = spec();
        s.template = String::new();
        assert!(!s.is_valid());
        s.check_command = "check_ping".into();
        assert!(s.is_valid());
    }

    #[test]
    fn test_to_centreon() {
        let mut s = spec();
        s.passive_check_enabled = Some(false);
        let svc = s.to_centreon();
        assert_eq!(svc.check_command_args, "!80!90");
        assert_eq!(svc.activated, "1");
        assert_eq!(svc.active_check_enabled, "2");
        assert_eq!(svc.passive_check_enabled, "0");
        assert_eq!(svc.comment, MANAGED_COMMENT);
        assert_eq!(svc.macros, vec![Macro::direct("WARNING", "80")]);
    }

    #[test]
    fn test_remote_identity_follows_status() {
        let mut cs = CentreonService::new("ping", spec());
        assert_eq!(cs.remote_identity(), ("localhost".to_string(), "ping".to_string()));
        cs.status = Some(CentreonServiceStatus {
            host: Some("old-host".into()),
            name: Some("old-ping".into()),
            conditions: vec![],
        });
        assert_eq!(cs.remote_identity(), ("old-host".to_string(), "old-ping".to_string()));
    }

    #[tokio::test]
    async fn test_apply_order_on_rename_and_move() {
        let actual = Service {
            host: "old-host".into(),
            name: "old".into(),
            activated: "0".into(),
            macros: vec![Macro::direct("OLD", "1")],
            ..Service::default()
        };
        let expected = Service {
            host: "new-host".into(),
            name: "new".into(),
            activated: "1".into(),
            groups: vec!["sg1".into()],
            ..Service::default()
        };
        let diff = diff_service(&actual, &expected, &[]);

        let mut api = MockCentreonApi::new();
        let mut seq = Sequence::new();
        api.expect_set_service_param()
            .with(eq("old-host"), eq("old"), eq("description"), eq("new"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _, _| Ok(()));
        api.expect_set_service_param()
            .with(eq("old-host"), eq("new"), eq("activate"), eq("1"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _, _| Ok(()));
        api.expect_set_service_host()
            .with(eq("old-host"), eq("new"), eq("new-host"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));
        api.expect_set_service_groups()
            .withf(|host, name, groups| host == "new-host" && name == "new" && groups.len() == 1 && groups[0] == "sg1")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));
        api.expect_delete_service_macro()
            .with(eq("new-host"), eq("new"), eq("OLD"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));

        apply_service_diff(&api, "old-host", "old", &diff).await.unwrap();
    }

    #[tokio::test]
    async fn test_sync_creates_missing_service() {
        let mut api = MockCentreonApi::new();
        api.expect_get_service().times(1).returning(|_, _| Ok(None));
        api.expect_add_service()
            .with(eq("localhost"), eq("ping"), eq("generic-service"))
            .times(1)
            .returning(|_, _, _| Ok(()));
        api.expect_set_service_param().returning(|_, _, _, _| Ok(()));
        api.expect_set_service_groups().times(1).returning(|_, _, _| Ok(()));
        api.expect_set_service_macro()
            .withf(|_, _, m| m.name == "WARNING" && m.value == "80")
            .times(1)
            .returning(|_, _, _| Ok(()));
        let policy = Policy::default();
        let gate = PolicyGate::new(&policy, "CentreonService", "default/ping");
        let outcome = sync_service(&api, ("localhost", "ping"), &spec(), &gate)
            .await
            .unwrap();
        assert_eq!(outcome, SyncOutcome::Created);
    }

    #[tokio::test]
    async fn test_sync_respects_no_create() {
        let mut api = MockCentreonApi::new();
        api.expect_get_service().returning(|_, _| Ok(None));
        api.expect_add_service().never();
        let policy = Policy {
            no_create: true,
            ..Policy::default()
        };
        let gate = PolicyGate::new(&policy, "CentreonService", "default/ping");
        let outcome = sync_service(&api, ("localhost", "ping"), &spec(), &gate)
            .await
            .unwrap();
        assert_eq!(outcome, SyncOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_sync_unchanged_and_excluded_fields() {
        let mut remote = spec().to_centreon();
        remote.groups = vec!["hand-made".into()];
        let mut api = MockCentreonApi::new();
        api.expect_get_service()
            .returning(move |_, _| Ok(Some(remote.clone())));
        let policy = Policy {
            exclude_fields: vec!["groups".into()],
            ..Policy::default()
        };
        let gate = PolicyGate::new(&policy, "CentreonService", "default/ping");
        let outcome = sync_service(&api, ("localhost", "ping"), &spec(), &gate)
            .await
            .unwrap();
        assert_eq!(outcome, SyncOutcome::Unchanged);
    }

    #[tokio::test]
    async fn test_sync_updates_renamed_service_from_status_identity() {
        let mut remote = spec().to_centreon();
        remote.name = "ping-old".into();
        let mut api = MockCentreonApi::new();
        api.expect_get_service()
            .with(eq("localhost"), eq("ping-old"))
            .returning(move |_, _| Ok(Some(remote.clone())));
        api.expect_set_service_param()
            .with(eq("localhost"), eq("ping-old"), eq("description"), eq("ping"))
            .times(1)
            .returning(|_, _, _, _| Ok(()));
        let policy = Policy::default();
        let gate = PolicyGate::new(&policy, "CentreonService", "default/ping");
        let outcome = sync_service(&api, ("localhost", "ping-old"), &spec(), &gate)
            .await
            .unwrap();
        assert!(matches!(outcome, SyncOutcome::Updated(d) if d.params_to_set.len() == 1));
    }

    #[tokio::test]
    async fn test_remove_service() {
        let mut api = MockCentreonApi::new();
        api.expect_get_service()
            .returning(|_, _| Ok(Some(Service::default())));
        api.expect_delete_service()
            .with(eq("localhost"), eq("ping"))
            .times(1)
            .returning(|_, _| Ok(()));
        let policy = Policy::default();
        let gate = PolicyGate::new(&policy, "CentreonService", "default/ping");
        assert_eq!(remove_service(&api, ("localhost", "ping"), &gate).await.unwrap(), Gated::Done);

        let mut api = MockCentreonApi::new();
        api.expect_get_service()
            .returning(|_, _| Ok(Some(Service::default())));
        api.expect_delete_service().never();
        let policy = Policy {
            no_delete: true,
            ..Policy::default()
        };
        let gate = PolicyGate::new(&policy, "CentreonService", "default/ping");
        assert_eq!(remove_service(&api, ("localhost", "ping"), &gate).await.unwrap(), Gated::Skipped);
    }

    #[test]
    fn test_status_is_stable_across_unchanged_passes() {
        let mut svc = CentreonService::new("ping", spec());
        svc.metadata.generation = Some(3);
        svc.status = Some(svc.status_on_success("Created on the platform", true));
        let settled = svc.status_on_success("Already in sync", true);
        svc.status = Some(settled.clone());
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert_eq!(svc.status_on_success("Already in sync", true), settled);
        assert_eq!(settled.host.as_deref(), Some("localhost"));

        let failed = svc.status_on_failure("timeout");
        svc.status = Some(failed.clone());
        assert_eq!(svc.status_on_failure("timeout"), failed);
        assert_eq!(failed.name.as_deref(), Some("ping"));
    }

    #[test]
    fn test_skipped_pass_keeps_identity() {
        let mut svc = CentreonService::new("ping", spec());
        svc.status = Some(CentreonServiceStatus {
            host: Some("old-host".into()),
            name: Some("old".into()),
            conditions: vec![],
        });
        svc.spec.host = "new-host".into();
        let status = svc.status_on_success("Skipped by policy", false);
        assert_eq!(status.host.as_deref(), Some("old-host"));
        assert_eq!(status.name.as_deref(), Some("old"));
    }
}
