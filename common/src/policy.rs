use crate::Result;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::future::Future;
use tracing::*;

/// Policy describe how the operator is allowed to act on the remote object
#[derive(Serialize, Deserialize, Eq, PartialEq, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    /// Never create the remote object
    #[serde(default)]
    pub no_create: bool,
    /// Never update the remote object
    #[serde(default)]
    pub no_update: bool,
    /// Never delete the remote object
    #[serde(default)]
    pub no_delete: bool,
    /// Fields ignored when computing the difference with the remote object
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude_fields: Vec<String>,
}

/// What the gate did with a guarded call
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Gated {
    Done,
    Skipped,
}

/// What a synchronization pass did, `D` being the applied plan
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncOutcome<D> {
    Created,
    Updated(D),
    Unchanged,
    Skipped,
}
impl<D> SyncOutcome<D> {
    pub fn message(&self) -> &'static str {
        match self {
            SyncOutcome::Created => "Created on the platform",
            SyncOutcome::Updated(_) => "Updated on the platform",
            SyncOutcome::Unchanged => "Already in sync",
            SyncOutcome::Skipped => "Skipped by policy",
        }
    }
}

/// Guards remote mutations with the owning resource policy
pub struct PolicyGate<'a> {
    policy: &'a Policy,
    kind: &'a str,
    name: String,
}

impl<'a> PolicyGate<'a> {
    #[must_use]
    pub fn new(policy: &'a Policy, kind: &'a str, name: &str) -> Self {
        Self {
            policy,
            kind,
            name: name.to_string(),
        }
    }

    /// Fields the diff engines must never report
    pub fn excluded_fields(&self) -> &[String] {
        &self.policy.exclude_fields
    }

    async fn guard<F>(&self, allowed: bool, action: &str, call: F) -> Result<Gated>
    where
        F: Future<Output = Result<()>>,
    {
        if allowed {
            call.await?;
            Ok(Gated::Done)
        } else {
            info!("Skip {action} of {} {} as requested by its policy", self.kind, self.name);
            Ok(Gated::Skipped)
        }
    }

    pub async fn create<F>(&self, call: F) -> Result<Gated>
    where
        F: Future<Output = Result<()>>,
    {
        self.guard(!self.policy.no_create, "create", call).await
    }

    pub async fn update<F>(&self, call: F) -> Result<Gated>
    where
        F: Future<Output = Result<()>>,
    {
        self.guard(!self.policy.no_update, "update", call).await
    }

    pub async fn delete<F>(&self, call: F) -> Result<Gated>
    where
        F: Future<Output = Result<()>>,
    {
        self.guard(!self.policy.no_delete, "delete", call).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_gate_skips_forbidden_calls() {
        let policy = Policy {
            no_create: true,
            no_delete: true,
            ..Policy::default()
        };
        let gate = PolicyGate::new(&policy, "CentreonService", "default/ping");
        let calls = AtomicUsize::new(0);
        let create = gate
            .create(async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap();
        let update = gate
            .update(async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap();
        let delete = gate
            .delete(async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(create, Gated::Skipped);
        assert_eq!(update, Gated::Done);
        assert_eq!(delete, Gated::Skipped);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gate_propagates_errors() {
        let policy = Policy::default();
        let gate = PolicyGate::new(&policy, "CentreonService", "default/ping");
        let res = gate.update(async { Err(Error::Other("remote down".into())) }).await;
        assert!(res.is_err());
    }

    #[test]
    fn test_policy_deserialize() {
        let policy: Policy =
            serde_json::from_str(r#"{"noDelete": true, "excludeFields": ["macros", "groups"]}"#).unwrap();
        assert!(policy.no_delete);
        assert!(!policy.no_create);
        assert_eq!(policy.exclude_fields, vec!["macros".to_string(), "groups".to_string()]);
    }
}
