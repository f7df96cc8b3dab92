use crate::{events, manager::Context, Error, Reconciler, Result};
use async_trait::async_trait;
use common::{
    centreonservice::{remove_service, sync_service, CentreonService, CentreonServiceStatus},
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

static SERVICE_FINALIZER: &str = "centreonservices.monitor.k8s.webcenter.fr";
static KIND: &str = "CentreonService";
static REMOTE_KIND: &str = "Centreon service";

trait ServiceExt {
    fn id(&self) -> String;
    async fn update_status(&self, ctx: &Context, status: CentreonServiceStatus) -> Result<()>;
    async fn publish(&self, ctx: &Context, event: Event) -> Result<()>;
    async fn synchronize(&self, ctx: &Context) -> common::Result<SyncOutcome<common::diff::ServiceDiff>>;
}

impl ServiceExt for CentreonService {
    fn id(&self) -> String {
        format!("{}/{}", self.namespace().unwrap_or_default(), self.name_any())
    }

    /// Write the status unless it is already the current one
    async fn update_status(&self, ctx: &Context, status: CentreonServiceStatus) -> Result<()> {
        if self.status.as_ref() == Some(&status) {
            return Ok(());
        }
        let api: Api<CentreonService> = Api::namespaced(ctx.client.clone(), &self.namespace().unwrap_or_default());
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

    async fn synchronize(&self, ctx: &Context) -> common::Result<SyncOutcome<common::diff::ServiceDiff>> {
        let entry = ctx.registry.get(self.platform_ref()).await?;
        let (host, name) = self.remote_identity();
        let gate = PolicyGate::new(&self.spec.policy, KIND, &self.id());
        sync_service(entry.client.as_ref(), (&host, &name), &self.spec, &gate).await
    }
}

#[async_trait]
impl Reconciler for CentreonService {
    async fn reconcile(&self, ctx: Arc<Context>) -> Result<Action> {
        if let Some(reason) = self.spec.validation_error() {
            warn!("{KIND} {} is invalid: {reason}", self.id());
            self.update_status(&ctx, self.status_on_failure(&reason)).await?;
            return Ok(Action::await_change());
        }
        match self.synchronize(&ctx).await {
            Ok(outcome) => {
                let remote = format!("{}/{}", self.spec.host, self.spec.name);
                let event = match outcome {
                    SyncOutcome::Created => Some(events::from_create(KIND, &self.id(), REMOTE_KIND, &remote, None)),
                    SyncOutcome::Updated(_) => Some(events::from_update(KIND, &self.id(), REMOTE_KIND, &remote, None)),
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
                warn!("Platform {p} is gone, leaving the remote service of {KIND} {} as-is", self.id());
                return Ok(Action::await_change());
            }
            Err(e) => return Err(e.into()),
        };
        let (host, name) = self.remote_identity();
        let gate = PolicyGate::new(&self.spec.policy, KIND, &self.id());
        if remove_service(entry.client.as_ref(), (&host, &name), &gate).await? == Gated::Done {
            info!("{KIND} {}: service {host}/{name} removed", self.id());
            let event = events::from_delete(KIND, &self.id(), REMOTE_KIND, &format!("{host}/{name}"), None);
            if let Err(e) = self.publish(&ctx, event).await {
                warn!("{KIND} {}: could not publish the removal event: {e}", self.id());
            }
        }
        Ok(Action::await_change())
    }
}

#[instrument(skip(ctx, service))]
pub async fn reconcile(service: Arc<CentreonService>, ctx: Arc<Context>) -> Result<Action> {
    let services: Api<CentreonService> = Api::namespaced(ctx.client.clone(), &service.namespace().unwrap_or_default());
    finalizer(&services, SERVICE_FINALIZER, service, |event| async {
        match event {
            Finalizer::Apply(service) => service.reconcile(ctx.clone()).await,
            Finalizer::Cleanup(service) => service.cleanup(ctx.clone()).await,
        }
    })
    .await
    .map_err(|e| Error::FinalizerError(Box::new(e)))
}

#[must_use]
pub fn error_policy(service: Arc<CentreonService>, error: &Error, ctx: Arc<Context>) -> Action {
    warn!("reconcile failed for {KIND} {}: {:?}", service.id(), error);
    if error.is_retryable() {
        Action::requeue(Duration::from_secs(5 * 60))
    } else {
        Action::requeue(ctx.args.requeue())
    }
}

pub fn controller(ctx: Arc<Context>) -> BoxFuture<'static, ()> {
    let services = Api::<CentreonService>::all(ctx.client.clone());
    Controller::new(services, Config::default().any_semantic())
        .run(reconcile, error_policy, ctx)
        .filter_map(|x| async move { std::result::Result::ok(x) })
        .for_each(|_| futures::future::ready(()))
        .boxed()
}
