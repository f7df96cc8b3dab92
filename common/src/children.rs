use crate::{
    placeholders::PlaceholderContext,
    template::{ChildKind, Template},
    Domain, NamespacedName, Result,
};
use async_trait::async_trait;
use kube::{api::DynamicObject, ResourceExt};
use std::collections::{BTreeMap, BTreeSet};
use tracing::*;

/// `(group, kind, namespace, name)` of a child
pub type ChildKey = (String, String, String, String);

pub fn child_key(obj: &DynamicObject) -> ChildKey {
    let (group, kind) = obj
        .types
        .as_ref()
        .map(|t| {
            let group = t.api_version.rsplit_once('/').map(|(g, _)| g).unwrap_or_default();
            (group.to_string(), t.kind.clone())
        })
        .unwrap_or_default();
    (group, kind, obj.namespace().unwrap_or_default(), obj.name_any())
}

/// Where templates and existing children are read from
#[async_trait]
pub trait ChildStore: Send + Sync {
    async fn get_template(&self, namespace: &str, name: &str) -> Result<Option<Template>>;
    async fn get_child(&self, kind: ChildKind, namespace: &str, name: &str) -> Result<Option<DynamicObject>>;
    /// Children of every namespace matching a label selector
    async fn list_children(&self, kind: ChildKind, selector: &str) -> Result<Vec<DynamicObject>>;
}

/// Template references of a source resource; an absent or empty annotation is no reference at all
pub fn template_refs(
    domain: &Domain,
    annotations: &BTreeMap<String, String>,
    default_namespace: &str,
) -> Result<Vec<NamespacedName>> {
    let raw = match annotations.get(&domain.templates_annotation()) {
        Some(raw) if !raw.trim().is_empty() => raw,
        _ => return Ok(Vec::new()),
    };
    let mut refs: Vec<NamespacedName> = serde_json::from_str(raw)?;
    for r in refs.iter_mut().filter(|r| r.namespace.is_empty()) {
        r.namespace = default_namespace.to_string();
    }
    Ok(refs)
}

/// Wanted children versus the ones already in the cluster
#[derive(Clone, Debug, Default)]
pub struct ChildSet {
    pub expected: Vec<DynamicObject>,
    pub current: Vec<DynamicObject>,
}

impl ChildSet {
    /// Current children no template produces anymore
    pub fn orphans(&self) -> Vec<&DynamicObject> {
        let expected: BTreeSet<ChildKey> = self.expected.iter().map(child_key).collect();
        self.current
            .iter()
            .filter(|c| !expected.contains(&child_key(c)))
            .collect()
    }
}

fn dedup(objects: Vec<DynamicObject>) -> Vec<DynamicObject> {
    let mut seen = BTreeSet::new();
    objects
        .into_iter()
        .filter(|o| seen.insert(child_key(o)))
        .collect()
}

/// Render every referenced template and find the children to keep and to remove
pub async fn resolve_children(
    store: &dyn ChildStore,
    domain: &Domain,
    context: &PlaceholderContext,
) -> Result<ChildSet> {
    let source = NamespacedName::new(&context.namespace, &context.name);
    let mut set = ChildSet::default();
    for tpl_ref in template_refs(domain, &context.annotations, &context.namespace)? {
        let Some(template) = store.get_template(&tpl_ref.namespace, &tpl_ref.name).await? else {
            warn!("Template {tpl_ref} referenced by {source} not found, skipping it");
            continue;
        };
        let mut child = template.render(context)?;
        let namespace = context.for_template(&tpl_ref.namespace, &tpl_ref.name).child_namespace();
        child.metadata.namespace = Some(namespace.clone());
        if child.metadata.name.as_deref().unwrap_or_default().is_empty() {
            child.metadata.name = Some(tpl_ref.name.clone());
        }
        let labels = child.labels_mut();
        labels.extend(context.labels.clone());
        labels.insert(domain.template_label(), tpl_ref.to_label());
        labels.insert(domain.parent_label(), source.to_label());

        let (_, kind, _, name) = child_key(&child);
        if let Some(kind) = ChildKind::from_kind(&kind) {
            if let Some(existing) = store.get_child(kind, &namespace, &name).await? {
                set.current.push(existing);
            }
        }
        set.expected.push(child);
    }

    let selector = format!("{}={}", domain.parent_label(), source.to_label());
    for kind in ChildKind::ALL {
        set.current.extend(store.list_children(kind, &selector).await?);
    }
    set.expected = dedup(set.expected);
    set.current = dedup(set.current);
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::TemplateSpec;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryStore {
        templates: Vec<Template>,
        children: Mutex<Vec<DynamicObject>>,
    }

    impl MemoryStore {
        fn with_template(mut self, name: &str, body: &str) -> Self {
            let mut tpl = Template::new(name, TemplateSpec {
                template_type: Some("CentreonService".into()),
                template: body.into(),
                name: None,
                template_delimiter: None,
            });
            tpl.metadata.namespace = Some("monitoring".into());
            self.templates.push(tpl);
            self
        }

        fn adopt(&self, set: &ChildSet) {
            *self.children.lock().unwrap() = set.expected.clone();
        }
    }

    #[async_trait]
    impl ChildStore for MemoryStore {
        async fn get_template(&self, namespace: &str, name: &str) -> Result<Option<Template>> {
            Ok(self
                .templates
                .iter()
                .find(|t| t.name_any() == name && t.namespace().as_deref() == Some(namespace))
                .cloned())
        }

        async fn get_child(&self, kind: ChildKind, namespace: &str, name: &str) -> Result<Option<DynamicObject>> {
            Ok(self
                .children
                .lock()
                .unwrap()
                .iter()
                .find(|c| {
                    let (_, k, ns, n) = child_key(c);
                    k == kind.kind() && ns == namespace && n == name
                })
                .cloned())
        }

        async fn list_children(&self, kind: ChildKind, selector: &str) -> Result<Vec<DynamicObject>> {
            let (key, value) = selector.split_once('=').unwrap();
            Ok(self
                .children
                .lock()
                .unwrap()
                .iter()
                .filter(|c| child_key(c).1 == kind.kind() && c.labels().get(key).map(String::as_str) == Some(value))
                .cloned()
                .collect())
        }
    }

    fn context(annotation: Option<&str>) -> PlaceholderContext {
        let mut ctx = PlaceholderContext {
            name: "web".into(),
            namespace: "prod".into(),
            labels: BTreeMap::from([("app".to_string(), "shop".to_string())]),
            ..PlaceholderContext::default()
        };
        if let Some(a) = annotation {
            ctx.annotations
                .insert(Domain::default().templates_annotation(), a.to_string());
        }
        ctx
    }

    fn store() -> MemoryStore {
        MemoryStore::default()
            .with_template("ping", "host: localhost\nname: ping-{{ name }}\ntemplate: t")
            .with_template("http", "host: localhost\nname: http-{{ name }}\ntemplate: t")
    }

    #[test]
    fn test_template_refs() {
        let domain = Domain::default();
        let annotations = BTreeMap::from([(
            domain.templates_annotation(),
            r#"[{"name": "ping"}, {"namespace": "other", "name": "http"}]"#.to_string(),
        )]);
        let refs = template_refs(&domain, &annotations, "prod").unwrap();
        assert_eq!(refs, vec![
            NamespacedName::new("prod", "ping"),
            NamespacedName::new("other", "http")
        ]);
        assert!(template_refs(&domain, &BTreeMap::new(), "prod").unwrap().is_empty());
        let broken = BTreeMap::from([(domain.templates_annotation(), "not json".to_string())]);
        assert!(template_refs(&domain, &broken, "prod").is_err());
    }

    #[tokio::test]
    async fn test_no_annotation_is_empty() {
        let set = resolve_children(&store(), &Domain::default(), &context(None)).await.unwrap();
        assert!(set.expected.is_empty());
        assert!(set.current.is_empty());
    }

    #[tokio::test]
    async fn test_children_are_stamped() {
        let ctx = context(Some(r#"[{"namespace": "monitoring", "name": "ping"}]"#));
        let set = resolve_children(&store(), &Domain::default(), &ctx).await.unwrap();
        assert_eq!(set.expected.len(), 1);
        let child = &set.expected[0];
        assert_eq!(child.name_any(), "ping");
        assert_eq!(child.namespace().as_deref(), Some("prod"));
        let labels = child.labels();
        assert_eq!(labels["monitor.k8s.webcenter.fr/template"], "monitoring.ping");
        assert_eq!(labels["monitor.k8s.webcenter.fr/parent"], "prod.web");
        assert_eq!(labels["app"], "shop");
        assert!(set.current.is_empty());
    }

    #[tokio::test]
    async fn test_missing_template_is_skipped() {
        let ctx = context(Some(
            r#"[{"namespace": "monitoring", "name": "gone"}, {"namespace": "monitoring", "name": "http"}]"#,
        ));
        let set = resolve_children(&store(), &Domain::default(), &ctx).await.unwrap();
        assert_eq!(set.expected.len(), 1);
        assert_eq!(set.expected[0].name_any(), "http");
    }

    #[tokio::test]
    async fn test_removed_reference_becomes_orphan() {
        let store = store();
        let domain = Domain::default();
        let both = context(Some(
            r#"[{"namespace": "monitoring", "name": "ping"}, {"namespace": "monitoring", "name": "http"}]"#,
        ));
        let set = resolve_children(&store, &domain, &both).await.unwrap();
        assert_eq!(set.expected.len(), 2);
        store.adopt(&set);

        let only_ping = context(Some(r#"[{"namespace": "monitoring", "name": "ping"}]"#));
        let set = resolve_children(&store, &domain, &only_ping).await.unwrap();
        assert_eq!(set.expected.len(), 1);
        assert_eq!(set.current.len(), 2);
        let orphans = set.orphans();
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].name_any(), "http");

        let set = resolve_children(&store, &domain, &context(None)).await.unwrap();
        assert_eq!(set.orphans().len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_rendered_spec_fails_the_source() {
        let domain = Domain::default();
        let store = store();
        let ping = context(Some(r#"[{"namespace": "monitoring", "name": "ping"}]"#));
        store.adopt(&resolve_children(&store, &domain, &ping).await.unwrap());

        let store = store.with_template("broken", "host: \"{{ labels.missing }}\"\nname: broken\ntemplate: t");
        let ctx = context(Some(
            r#"[{"namespace": "monitoring", "name": "broken"}, {"namespace": "monitoring", "name": "ping"}]"#,
        ));
        let err = resolve_children(&store, &domain, &ctx).await.unwrap_err();
        assert!(matches!(err, crate::Error::InvalidGenerated(_, ref kind, _) if kind == "CentreonService"));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_long_source_names_keep_their_children() {
        let domain = Domain::default();
        let store = store();
        let mut ctx = context(Some(r#"[{"namespace": "monitoring", "name": "ping"}]"#));
        ctx.namespace = "ecommerce-production".into();
        ctx.name = "storefront-public-api-gateway-ingress-canary".into();
        let set = resolve_children(&store, &domain, &ctx).await.unwrap();
        let parent = &set.expected[0].labels()[&domain.parent_label()];
        assert!(parent.len() <= 63);
        store.adopt(&set);

        let set = resolve_children(&store, &domain, &ctx).await.unwrap();
        assert_eq!(set.current.len(), 1);
        assert!(set.orphans().is_empty());
    }
}
