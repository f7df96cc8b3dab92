use crate::{events, manager::Context, Error, Reconciler, Result};
use async_trait::async_trait;
use common::{
    centreonservicegroup::{remove_service_group, sync_service_group, CentreonServiceGroup, CentreonServiceGroupStatus},
    diff::ServiceGroupDiff,
    policy::{Gated, PolicyGate, SyncOutcome},
};
use futures::{future::BoxFuture, FutureExt, StreamExt};
use kube::{
    api::{Api, Patch, PatchParams, ResourceExt},
    runtime::{
        controller::{Action, Controller},
        events::{Event, Recorder},
        finalizer::{finalizer, Event as Finalizer},
        watcher::Config,
    },
    Resource,
};
use serde_json::json;
use std::sync::Arc;
use tokio::time::Duration;
use tracing::*;

static SERVICE_GROUP_FINALIZER: &str = "centreonservicegroups.monitor.k8s.webcenter.fr";
static KIND: &str = "CentreonServiceGroup";
static REMOTE_KIND: &str = "Centreon service group";

trait ServiceGroupExt {
    fn id(&self) -> String;
    async fn update_status(&self, ctx: &Context, status: CentreonServiceGroupStatus) -> Result<()>;
    async fn publish(&self, ctx: &Context, event: Event) -> Result<()>;
    async fn synchronize(&self, ctx: &Context) -> common::Result<SyncOutcome<ServiceGroupDiff>>;
}

impl ServiceGroupExt for CentreonServiceGroup {
    fn id(&self) -> String {
        format!("{}/{}", self.namespace().unwrap_or_default(), self.name_any())
    }

    async fn update_status(&self, ctx: &Context, status: CentreonServiceGroupStatus) -> Result<()> {
        if self.status.as_ref() == Some(&status) {
            return Ok(());
        }
        let api: Api<CentreonServiceGroup> =
            Api::namespaced(ctx.client.clone(), &self.namespace().unwrap_or_default());
        api.patch_status(&self.name_any(), &PatchParams::default(), &Patch::Merge(json!({ "status": status })))
            .await
            .map_err(Error::KubeError)?;
        Ok(())
    }

    async fn publish(&self, ctx: &Context, event: Event) -> Result<()> {
        Recorder::new(ctx.client.clone(), ctx.reporter.clone(), self.object_ref(&()))
            .publish(event)
            .await
            .map_err(Error::KubeError)
    }

    async fn synchronize(&self, ctx: &Context) -> common::Result<SyncOutcome<ServiceGroupDiff>> {
        let entry = ctx.registry.get(self.platform_ref()).await?;
        let gate = PolicyGate::new(&self.spec.policy, KIND, &self.id());
        sync_service_group(entry.client.as_ref(), &self.remote_name(), &self.spec, &gate).await
    }
}

#[async_trait]
impl Reconciler for CentreonServiceGroup {
    async fn reconcile(&self, ctx: Arc<Context>) -> Result<Action> {
        if let Some(reason) = self.spec.validation_error() {
            warn!("{KIND} {} is invalid: {reason}", self.id());
            self.update_status(&ctx, self.status_on_failure(&reason)).await?;
            return Ok(Action::await_change());
        }
        match self.synchronize(&ctx).await {
            Ok(outcome) => {
                let name = &self.spec.name;
                let event = match outcome {
                    SyncOutcome::Created => Some(events::from_create(KIND, &self.id(), REMOTE_KIND, name, None)),
                    SyncOutcome::Updated(_) => Some(events::from_update(KIND, &self.id(), REMOTE_KIND, name, None)),
                    _ => None,
                };
                let applied = !matches!(outcome, SyncOutcome::Skipped);
                self.update_status(&ctx, self.status_on_success(outcome.message(), applied))
                    .await?;
                if let Some(event) = event {
                    info!("{KIND} {}: {}", self.id(), outcome.message());
                    self.publish(&ctx, event).await?;
                }
                Ok(Action::requeue(ctx.args.requeue()))
            }
            Err(e) => {
                self.update_status(&ctx, self.status_on_failure(&e.to_string())).await?;
                Err(e.into())
            }
        }
    }

    async fn cleanup(&self, ctx: Arc<Context>) -> Result<Action> {
        let entry = match ctx.registry.get(self.platform_ref()).await {
            Ok(entry) => entry,
            Err(common::Error::PlatformNotFound(p)) => {
                warn!("Platform {p} is gone, leaving the remote group of {KIND} {} as-is", self.id());
                return Ok(Action::await_change());
            }
            Err(e) => return Err(e.into()),
        };
        let name = self.remote_name();
        let gate = PolicyGate::new(&self.spec.policy, KIND, &self.id());
        if remove_service_group(entry.client.as_ref(), &name, &gate).await? == Gated::Done {
            info!("{KIND} {}: service group {name} removed", self.id());
            let event = events::from_delete(KIND, &self.id(), REMOTE_KIND, &name, None);
            if let Err(e) = self.publish(&ctx, event).await {
                warn!("{KIND} {}: could not publish the removal event: {e}", self.id());
            }
        }
        Ok(Action::await_change())
    }
}

#[instrument(skip(ctx, group))]
pub async fn reconcile(group: Arc<CentreonServiceGroup>, ctx: Arc<Context>) -> Result<Action> {
    let groups: Api<CentreonServiceGroup> = Api::namespaced(ctx.client.clone(), &group.namespace().unwrap_or_default());
    finalizer(&groups, SERVICE_GROUP_FINALIZER, group, |event| async {
        match event {
            Finalizer::Apply(group) => group.reconcile(ctx.clone()).await,
            Finalizer::Cleanup(group) => group.cleanup(ctx.clone()).await,
        }
    })
    .await
    .map_err(|e| Error::FinalizerError(Box::new(e)))
}

#[must_use]
pub fn error_policy(group: Arc<CentreonServiceGroup>, error: &Error, ctx: Arc<Context>) -> Action {
    warn!("reconcile failed for {KIND} {}: {:?}", group.id(), error);
    if error.is_retryable() {
        Action::requeue(Duration::from_secs(5 * 60))
    } else {
        Action::requeue(ctx.args.requeue())
    }
}

pub fn controller(ctx: Arc<Context>) -> BoxFuture<'static, ()> {
    let groups = Api::<CentreonServiceGroup>::all(ctx.client.clone());
    Controller::new(groups, Config::default().any_semantic())
        .run(reconcile, error_policy, ctx)
        .filter_map(|x| async move { std::result::Result::ok(x) })
        .for_each(|_| futures::future::ready(()))
        .boxed()
}
