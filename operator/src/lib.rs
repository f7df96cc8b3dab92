use async_trait::async_trait;
use kube::runtime::controller::Action;
use manager::Context;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("SerializationError: {0}")]
    SerializationError(#[source] serde_json::Error),

    #[error("Kube Error: {0}")]
    KubeError(#[source] kube::Error),

    #[error("Finalizer Error: {0}")]
    // NB: awkward type because finalizer::Error embeds the reconciler error (which is this)
    // so boxing this error to break cycles
    FinalizerError(#[source] Box<kube::runtime::finalizer::Error<Error>>),

    #[error("{0}")]
    CommonError(#[from] common::Error),

    #[error("Missing {0} in {1}")]
    MissingField(String, String),
}
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    #[must_use]
    pub fn metric_label(&self) -> String {
        match self {
            Error::CommonError(e) => e.metric_label(),
            other => format!("{other:?}").to_lowercase(),
        }
    }

    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::CommonError(e) => e.is_retryable(),
            Error::FinalizerError(e) => match e.as_ref() {
                kube::runtime::finalizer::Error::ApplyFailed(e) | kube::runtime::finalizer::Error::CleanupFailed(e) => {
                    e.is_retryable()
                }
                _ => true,
            },
            _ => true,
        }
    }
}

#[async_trait]
pub trait Reconciler {
    async fn reconcile(&self, ctx: Arc<Context>) -> Result<Action>;
    async fn cleanup(&self, ctx: Arc<Context>) -> Result<Action>;
}

/// Field manager of every object written by the operator
pub static OPERATOR: &str = "monitoring-operator";

pub mod centreonservice;
pub mod centreonservicegroup;
pub mod events;
pub mod platform;
pub mod sources;
pub mod store;

/// Command line and environment settings
pub mod config;
pub use config::Args;

/// State machinery for kube
pub mod manager;
pub use manager::Manager;

/// Generated type, for crdgen
pub use common::{
    centreonservice::CentreonService, centreonservicegroup::CentreonServiceGroup, platform::Platform,
    template::Template,
};
