use crate::{centreonservice, centreonservicegroup, platform, sources, Args, Error, Result, OPERATOR};
use common::{
    centreonservice::CentreonService, centreonservicegroup::CentreonServiceGroup, platform::Platform,
    registry::PlatformRegistry, template::Template, Domain,
};
use futures::future::BoxFuture;
use k8s_openapi::api::{
    core::v1::{Namespace, Node, Secret},
    networking::v1::Ingress,
};
use kube::{
    api::{Api, DynamicObject, ListParams},
    client::Client,
    runtime::events::Reporter,
};
use std::sync::Arc;
use tracing::*;

// Context for our reconcilers
#[derive(Clone)]
pub struct Context {
    /// Kubernetes client
    pub client: Client,
    /// Clients of the known platforms
    pub registry: Arc<PlatformRegistry>,
    /// Annotation and label keys
    pub domain: Domain,
    /// Reporting component of the published events
    pub reporter: Reporter,
    pub args: Args,
}

/// Data owned by the Manager
#[derive(Clone)]
pub struct Manager {
    pub registry: Arc<PlatformRegistry>,
}

async fn ensure_crd<K>(client: &Client) -> Result<()>
where
    K: kube::Resource<DynamicType = ()> + Clone + serde::de::DeserializeOwned + std::fmt::Debug,
{
    Api::<K>::all(client.clone())
        .list(&ListParams::default().limit(1))
        .await
        .map(|_| ())
        .map_err(|e| {
            error!(
                "is the {} crd installed? please run: cargo run --bin crdgen | kubectl apply -f -",
                K::kind(&())
            );
            Error::KubeError(e)
        })
}

/// Manager that owns a Controller per watched kind
impl Manager {
    /// Lifecycle initialization interface for app
    ///
    /// This returns a `Manager` plus the controllers futures.
    /// It is up to `main` to wait for them.
    pub async fn new(args: Args) -> Result<(Self, Vec<(&'static str, BoxFuture<'static, ()>)>)> {
        let client = Client::try_default().await.map_err(Error::KubeError)?;
        ensure_crd::<Platform>(&client).await?;
        ensure_crd::<Template>(&client).await?;
        ensure_crd::<CentreonService>(&client).await?;
        ensure_crd::<CentreonServiceGroup>(&client).await?;

        let registry = Arc::new(PlatformRegistry::default());
        let context = Arc::new(Context {
            client: client.clone(),
            registry: registry.clone(),
            domain: args.domain(),
            reporter: OPERATOR.into(),
            args: args.clone(),
        });

        let mut controllers: Vec<(&'static str, BoxFuture<'static, ()>)> = vec![
            ("Platform", platform::controller(context.clone())),
            ("CentreonService", centreonservice::controller(context.clone())),
            ("CentreonServiceGroup", centreonservicegroup::controller(context.clone())),
            (
                "Ingress",
                sources::controller::<Ingress>(Api::all(client.clone()), (), context.clone()),
            ),
            (
                "Node",
                sources::controller::<Node>(Api::all(client.clone()), (), context.clone()),
            ),
            (
                "Namespace",
                sources::controller::<Namespace>(Api::all(client.clone()), (), context.clone()),
            ),
            (
                "Secret",
                sources::controller::<Secret>(Api::all(client.clone()), (), context.clone()),
            ),
        ];
        if args.enable_route {
            let ar = sources::route_resource();
            controllers.push((
                "Route",
                sources::controller::<DynamicObject>(Api::all_with(client, &ar), ar, context),
            ));
        }
        Ok((Manager { registry }, controllers))
    }

    /// Names of the platforms currently usable
    pub async fn platforms(&self) -> Vec<String> {
        self.registry.names().await
    }
}
