use crate::{manager::Context, Error, Reconciler, Result};
use async_trait::async_trait;
use common::platform::{credentials_from_secret, Platform, PlatformStatus};
use futures::{future::BoxFuture, FutureExt, StreamExt};
use k8s_openapi::api::core::v1::Secret;
use kube::{
    api::{Api, Patch, PatchParams, ResourceExt},
    runtime::{
        controller::{Action, Controller},
        finalizer::{finalizer, Event as Finalizer},
        reflector::ObjectRef,
        watcher::Config,
    },
};
use serde_json::json;
use std::sync::Arc;
use tokio::time::Duration;
use tracing::*;

static PLATFORM_FINALIZER: &str = "platforms.monitor.k8s.webcenter.fr";

trait PlatformExt {
    async fn update_status(&self, ctx: &Context, status: PlatformStatus) -> Result<()>;
    async fn register(&self, ctx: &Context) -> Result<bool>;
}

impl PlatformExt for Platform {
    async fn update_status(&self, ctx: &Context, status: PlatformStatus) -> Result<()> {
        if self.status.as_ref() == Some(&status) {
            return Ok(());
        }
        let api: Api<Platform> = Api::namespaced(ctx.client.clone(), &self.namespace().unwrap_or_default());
        let patch = Patch::Merge(json!({ "status": status }));
        api.patch_status(&self.name_any(), &PatchParams::default(), &patch)
            .await
            .map_err(Error::KubeError)?;
        Ok(())
    }

    async fn register(&self, ctx: &Context) -> Result<bool> {
        let ns = self.namespace().unwrap_or_default();
        let secret_name = &self.centreon()?.secret;
        let secrets: Api<Secret> = Api::namespaced(ctx.client.clone(), &ns);
        let secret = secrets
            .get_opt(secret_name)
            .await
            .map_err(Error::KubeError)?
            .ok_or_else(|| common::Error::MissingCredentials(format!("{ns}/{secret_name}"), "data".to_string()))?;
        let credentials = credentials_from_secret(&secret)?;
        let settings = self.settings(ctx.args.request_timeout)?;
        Ok(ctx
            .registry
            .upsert(&self.registry_name(), self.spec.is_default, settings, credentials)
            .await?)
    }
}

#[async_trait]
impl Reconciler for Platform {
    async fn reconcile(&self, ctx: Arc<Context>) -> Result<Action> {
        match self.register(&ctx).await {
            Ok(rebuilt) => {
                if rebuilt {
                    info!("Platform {} is ready", self.registry_name());
                }
                self.update_status(&ctx, self.status_on_success("Client ready")).await?;
                Ok(Action::requeue(ctx.args.requeue()))
            }
            Err(e) => {
                self.update_status(&ctx, self.status_on_failure(&e.to_string())).await?;
                Err(e)
            }
        }
    }

    async fn cleanup(&self, ctx: Arc<Context>) -> Result<Action> {
        ctx.registry.remove(&self.registry_name()).await;
        Ok(Action::await_change())
    }
}

#[instrument(skip(ctx, platform))]
pub async fn reconcile(platform: Arc<Platform>, ctx: Arc<Context>) -> Result<Action> {
    let platforms: Api<Platform> = Api::namespaced(ctx.client.clone(), &platform.namespace().unwrap_or_default());
    finalizer(&platforms, PLATFORM_FINALIZER, platform, |event| async {
        match event {
            Finalizer::Apply(platform) => platform.reconcile(ctx.clone()).await,
            Finalizer::Cleanup(platform) => platform.cleanup(ctx.clone()).await,
        }
    })
    .await
    .map_err(|e| Error::FinalizerError(Box::new(e)))
}

#[must_use]
pub fn error_policy(platform: Arc<Platform>, error: &Error, _ctx: Arc<Context>) -> Action {
    warn!(
        "reconcile failed for Platform {}: {:?} ({})",
        platform.name_any(),
        error,
        error.metric_label()
    );
    Action::requeue(Duration::from_secs(5 * 60))
}

/// Platforms of the secret namespace using it for their credentials
fn platforms_using(platforms: &[Arc<Platform>], secret: &Secret) -> Vec<ObjectRef<Platform>> {
    platforms
        .iter()
        .filter(|p| p.namespace() == secret.namespace())
        .filter(|p| p.centreon().is_ok_and(|c| c.secret == secret.name_any()))
        .map(|p| ObjectRef::from_obj(p.as_ref()))
        .collect()
}

pub fn controller(ctx: Arc<Context>) -> BoxFuture<'static, ()> {
    let platforms = Api::<Platform>::all(ctx.client.clone());
    let secrets = Api::<Secret>::all(ctx.client.clone());
    let controller = Controller::new(platforms, Config::default().any_semantic());
    let store = controller.store();
    controller
        .watches(secrets, Config::default(), move |secret| {
            platforms_using(&store.state(), &secret)
        })
        .run(reconcile, error_policy, ctx)
        .filter_map(|x| async move { std::result::Result::ok(x) })
        .for_each(|_| futures::future::ready(()))
        .boxed()
}
