use crate::{events, manager::Context, store::KubeChildStore, Error, Result, OPERATOR};
use common::{
    centreonservice::CentreonService,
    centreonservicegroup::CentreonServiceGroup,
    children::{child_key, resolve_children, template_refs, ChildKey},
    placeholders::{PlaceholderContext, PlaceholderSource},
    template::{ChildKind, Template},
    Domain, NamespacedName,
};
use futures::{future::BoxFuture, FutureExt, StreamExt};
use k8s_openapi::{
    api::{
        core::v1::{Namespace, Node, ObjectReference, Secret},
        networking::v1::Ingress,
    },
    apimachinery::pkg::apis::meta::v1::OwnerReference,
};
use kube::{
    api::{Api, ApiResource, DeleteParams, DynamicObject, Patch, PatchParams, ResourceExt},
    core::GroupVersionKind,
    runtime::{
        controller::{Action, Controller},
        events::Recorder,
        reflector::ObjectRef,
        watcher::Config,
    },
    Client, Resource,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::{collections::BTreeMap, fmt::Debug, hash::Hash, sync::Arc};
use tokio::time::Duration;
use tracing::*;

static TLS_SECRET_TYPE: &str = "kubernetes.io/tls";

pub fn route_resource() -> ApiResource {
    ApiResource::from_gvk(&GroupVersionKind::gvk("route.openshift.io", "v1", "Route"))
}

/// A cluster resource templates can be rendered for
pub trait Source: Resource + PlaceholderSource + Clone + DeserializeOwned + Debug + Send + Sync + 'static {
    /// Placeholders of this object, `None` when it cannot be a source
    fn source_context(&self) -> Option<PlaceholderContext> {
        Some(self.placeholders())
    }

    /// Owner reference stamped on the children
    fn owner(&self) -> Option<OwnerReference>;

    /// Object the events are published on
    fn reference(&self) -> ObjectReference;
}

impl Source for Ingress {
    fn reference(&self) -> ObjectReference {
        self.object_ref(&())
    }

    fn owner(&self) -> Option<OwnerReference> {
        self.controller_owner_ref(&())
    }
}

impl Source for Node {
    fn reference(&self) -> ObjectReference {
        self.object_ref(&())
    }

    fn owner(&self) -> Option<OwnerReference> {
        self.controller_owner_ref(&())
    }
}

impl Source for Namespace {
    fn reference(&self) -> ObjectReference {
        self.object_ref(&())
    }

    fn owner(&self) -> Option<OwnerReference> {
        self.controller_owner_ref(&())
    }
}

impl Source for Secret {
    fn reference(&self) -> ObjectReference {
        self.object_ref(&())
    }

    fn source_context(&self) -> Option<PlaceholderContext> {
        (self.type_.as_deref() == Some(TLS_SECRET_TYPE)).then(|| self.placeholders())
    }

    fn owner(&self) -> Option<OwnerReference> {
        self.controller_owner_ref(&())
    }
}

impl Source for DynamicObject {
    fn reference(&self) -> ObjectReference {
        self.object_ref(&route_resource())
    }

    fn owner(&self) -> Option<OwnerReference> {
        self.controller_owner_ref(&route_resource())
    }
}

async fn apply_child(client: &Client, child: &DynamicObject, owner: Option<OwnerReference>) -> Result<ObjectReference> {
    let (_, kind, namespace, name) = child_key(child);
    let kind = ChildKind::from_kind(&kind).ok_or(common::Error::UnsupportedKind(kind))?;
    let api: Api<DynamicObject> = Api::namespaced_with(client.clone(), &namespace, &kind.api_resource());
    let mut child = child.clone();
    child.metadata.owner_references = owner.map(|o| vec![o]);
    child.metadata.managed_fields = None;
    child.metadata.resource_version = None;
    let applied = api
        .patch(&name, &PatchParams::apply(OPERATOR).force(), &Patch::Apply(&child))
        .await
        .map_err(Error::KubeError)?;
    Ok(applied.object_ref(&kind.api_resource()))
}

async fn delete_child(client: &Client, child: &DynamicObject) -> Result<()> {
    let (_, kind, namespace, name) = child_key(child);
    let Some(kind) = ChildKind::from_kind(&kind) else {
        return Ok(());
    };
    let api: Api<DynamicObject> = Api::namespaced_with(client.clone(), &namespace, &kind.api_resource());
    match api.delete(&name, &DeleteParams::default()).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
        Err(e) => Err(Error::KubeError(e)),
    }
}

#[derive(Debug, PartialEq, Eq)]
enum ChildChange {
    Create,
    Update,
}

/// Every field of `wanted` is found in `actual`; fields the api server defaulted are ignored
fn contains(actual: &Value, wanted: &Value) -> bool {
    match (actual, wanted) {
        (Value::Object(actual), Value::Object(wanted)) => wanted
            .iter()
            .all(|(k, v)| actual.get(k).is_some_and(|a| contains(a, v))),
        _ => actual == wanted,
    }
}

/// What applying `child` changes, `None` when the current one already has its spec
fn child_change(current: &BTreeMap<ChildKey, &DynamicObject>, child: &DynamicObject) -> Option<ChildChange> {
    let wanted = child.data.get("spec").unwrap_or(&Value::Null);
    match current.get(&child_key(child)) {
        None => Some(ChildChange::Create),
        Some(existing) if !contains(existing.data.get("spec").unwrap_or(&Value::Null), wanted) => {
            Some(ChildChange::Update)
        }
        Some(_) => None,
    }
}

#[instrument(skip(ctx, obj), fields(name = %obj.name_any()))]
pub async fn reconcile<K: Source>(obj: Arc<K>, ctx: Arc<Context>) -> Result<Action> {
    if obj.meta().deletion_timestamp.is_some() {
        return Ok(Action::await_change());
    }
    let Some(context) = obj.source_context() else {
        return Ok(Action::await_change());
    };
    let id = NamespacedName::new(&context.namespace, &context.name);
    let store = KubeChildStore::new(ctx.client.clone());
    let set = resolve_children(&store, &ctx.domain, &context).await?;
    let reference = obj.reference();
    let src_type = reference.kind.clone().unwrap_or_default();
    let recorder = Recorder::new(ctx.client.clone(), ctx.reporter.clone(), reference);
    let current: BTreeMap<ChildKey, &DynamicObject> = set.current.iter().map(|c| (child_key(c), c)).collect();
    let owner = obj.owner();
    for child in &set.expected {
        let change = child_change(&current, child);
        let applied = apply_child(&ctx.client, child, owner.clone()).await?;
        let (_, kind, _, name) = child_key(child);
        let event = match change {
            Some(ChildChange::Create) => events::from_create(&src_type, &id.to_string(), &kind, &name, Some(applied)),
            Some(ChildChange::Update) => events::from_update(&src_type, &id.to_string(), &kind, &name, Some(applied)),
            None => continue,
        };
        info!("{} {name} for {id}", event.action);
        recorder.publish(event).await.map_err(Error::KubeError)?;
    }
    for orphan in set.orphans() {
        let (_, kind, _, name) = child_key(orphan);
        info!("Deleting {kind} {name} as {id} no longer references its template");
        let child_ref = ChildKind::from_kind(&kind).map(|k| orphan.object_ref(&k.api_resource()));
        delete_child(&ctx.client, orphan).await?;
        recorder
            .publish(events::from_delete(&src_type, &id.to_string(), &kind, &name, child_ref))
            .await
            .map_err(Error::KubeError)?;
    }
    Ok(Action::requeue(ctx.args.requeue()))
}

#[must_use]
pub fn error_policy<K: Source>(obj: Arc<K>, error: &Error, ctx: Arc<Context>) -> Action {
    warn!(
        "reconcile failed for {:?}/{}: {:?}",
        obj.namespace(),
        obj.name_any(),
        error
    );
    if error.is_retryable() {
        Action::requeue(Duration::from_secs(5 * 60))
    } else {
        Action::requeue(ctx.args.requeue())
    }
}

/// Sources whose templates annotation references `template`
fn sources_using<K>(sources: &[Arc<K>], domain: &Domain, template: &Template, dt: &K::DynamicType) -> Vec<ObjectRef<K>>
where
    K: Source,
    K::DynamicType: Clone + Eq + Hash,
{
    let target = NamespacedName::new(&template.namespace().unwrap_or_default(), &template.name_any());
    sources
        .iter()
        .filter(|s| {
            template_refs(domain, s.annotations(), &s.namespace().unwrap_or_default())
                .is_ok_and(|refs| refs.contains(&target))
        })
        .map(|s| ObjectRef::from_obj_with(s.as_ref(), dt.clone()))
        .collect()
}

pub fn controller<K>(api: Api<K>, dt: K::DynamicType, ctx: Arc<Context>) -> BoxFuture<'static, ()>
where
    K: Source,
    K::DynamicType: Clone + Debug + Eq + Hash + Unpin + Send + Sync + 'static,
{
    let client = ctx.client.clone();
    let controller = Controller::new_with(api, Config::default().any_semantic(), dt.clone());
    let store = controller.store();
    let domain = ctx.domain.clone();
    controller
        .owns(Api::<CentreonService>::all(client.clone()), Config::default())
        .owns(Api::<CentreonServiceGroup>::all(client.clone()), Config::default())
        .watches(Api::<Template>::all(client), Config::default(), move |template| {
            sources_using(&store.state(), &domain, &template, &dt)
        })
        .run(reconcile::<K>, error_policy::<K>, ctx)
        .filter_map(|x| async move { std::result::Result::ok(x) })
        .for_each(|_| futures::future::ready(()))
        .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::template::TemplateSpec;
    use std::collections::BTreeMap;

    fn ingress(name: &str, annotation: Option<&str>) -> Arc<Ingress> {
        let mut ingress = Ingress::default();
        ingress.metadata.name = Some(name.into());
        ingress.metadata.namespace = Some("prod".into());
        if let Some(a) = annotation {
            ingress.metadata.annotations = Some(BTreeMap::from([(
                Domain::default().templates_annotation(),
                a.to_string(),
            )]));
        }
        Arc::new(ingress)
    }

    #[test]
    fn test_template_change_maps_to_referencing_sources() {
        let sources = vec![
            ingress("a", Some(r#"[{"namespace": "monitoring", "name": "ping"}]"#)),
            ingress("b", Some(r#"[{"namespace": "monitoring", "name": "http"}]"#)),
            ingress("c", None),
            ingress("d", Some("not json")),
        ];
        let mut template = Template::new("ping", TemplateSpec {
            template_type: Some("CentreonService".into()),
            template: "host: localhost".into(),
            name: None,
            template_delimiter: None,
        });
        template.metadata.namespace = Some("monitoring".into());
        let refs = sources_using(&sources, &Domain::default(), &template, &());
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].name, "a");
    }

    #[test]
    fn test_only_tls_secrets_are_sources() {
        let mut secret = Secret::default();
        secret.metadata.name = Some("creds".into());
        secret.type_ = Some("Opaque".into());
        assert!(secret.source_context().is_none());
        secret.type_ = Some(TLS_SECRET_TYPE.into());
        assert_eq!(secret.source_context().unwrap().name, "creds");
    }

    #[test]
    fn test_route_owner_reference() {
        let route: DynamicObject = serde_json::from_value(serde_json::json!({
            "apiVersion": "route.openshift.io/v1",
            "kind": "Route",
            "metadata": {"name": "web", "namespace": "prod", "uid": "1234"},
            "spec": {"host": "web.apps.local"}
        }))
        .unwrap();
        let owner = route.owner().unwrap();
        assert_eq!(owner.kind, "Route");
        assert_eq!(owner.api_version, "route.openshift.io/v1");
        assert_eq!(owner.controller, Some(true));
    }

    fn service(name: &str, host: &str) -> DynamicObject {
        serde_json::from_value(serde_json::json!({
            "apiVersion": "monitor.k8s.webcenter.fr/v1",
            "kind": "CentreonService",
            "metadata": {"name": name, "namespace": "prod"},
            "spec": {"host": host, "name": name, "template": "t"}
        }))
        .unwrap()
    }

    #[test]
    fn test_child_change() {
        let existing = service("ping", "localhost");
        let current = BTreeMap::from([(child_key(&existing), &existing)]);
        assert_eq!(child_change(&current, &service("http", "localhost")), Some(ChildChange::Create));
        assert_eq!(child_change(&current, &service("ping", "remote")), Some(ChildChange::Update));
        assert_eq!(child_change(&current, &service("ping", "localhost")), None);

        let mut defaulted = service("ping", "localhost");
        defaulted.data["spec"]["activate"] = serde_json::json!(false);
        let current = BTreeMap::from([(child_key(&defaulted), &defaulted)]);
        assert_eq!(child_change(&current, &service("ping", "localhost")), None);
    }

    #[test]
    fn test_event_reference_of_sources() {
        let route: DynamicObject = serde_json::from_value(serde_json::json!({
            "apiVersion": "route.openshift.io/v1",
            "kind": "Route",
            "metadata": {"name": "web", "namespace": "prod"}
        }))
        .unwrap();
        assert_eq!(route.reference().kind.as_deref(), Some("Route"));
        assert_eq!(ingress("a", None).reference().kind.as_deref(), Some("Ingress"));
    }
}
