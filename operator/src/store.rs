use async_trait::async_trait;
use common::{children::ChildStore, template::ChildKind, template::Template};
use kube::{
    api::{Api, DynamicObject, ListParams},
    Client,
};

/// Templates and children as the api server knows them
pub struct KubeChildStore {
    client: Client,
}

impl KubeChildStore {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ChildStore for KubeChildStore {
    async fn get_template(&self, namespace: &str, name: &str) -> common::Result<Option<Template>> {
        let api: Api<Template> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn get_child(&self, kind: ChildKind, namespace: &str, name: &str) -> common::Result<Option<DynamicObject>> {
        let api: Api<DynamicObject> = Api::namespaced_with(self.client.clone(), namespace, &kind.api_resource());
        Ok(api.get_opt(name).await?)
    }

    async fn list_children(&self, kind: ChildKind, selector: &str) -> common::Result<Vec<DynamicObject>> {
        let ar = kind.api_resource();
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &ar);
        let list = api.list(&ListParams::default().labels(selector)).await?;
        Ok(list
            .items
            .into_iter()
            .map(|mut child| {
                // lists do not repeat the type of their items
                child.types.get_or_insert_with(|| kube::api::TypeMeta {
                    api_version: ar.api_version.clone(),
                    kind: ar.kind.clone(),
                });
                child
            })
            .collect())
    }
}
