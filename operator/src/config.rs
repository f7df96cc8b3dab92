use clap::Parser;
use common::{Domain, DEFAULT_DOMAIN};
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(version, about = "Keep Centreon services in sync with Kubernetes resources")]
pub struct Args {
    /// Domain of the annotations and labels read and written by the operator
    #[arg(
        long = "annotation-domain",
        env = "MONITOR_DOMAIN",
        value_name = "MONITOR_DOMAIN",
        default_value = DEFAULT_DOMAIN
    )]
    pub annotation_domain: String,
    /// Delay between two successful reconciliations of the same object
    #[arg(long = "requeue-seconds", env = "REQUEUE_SECONDS", value_name = "SECONDS", default_value = "3600")]
    pub requeue_seconds: u64,
    /// Log as json lines
    #[arg(long = "log-json", env = "LOG_JSON")]
    pub log_json: bool,
    /// Watch OpenShift routes
    #[arg(long = "enable-route", env = "ENABLE_ROUTE")]
    pub enable_route: bool,
    /// Timeout of the requests sent to the monitoring platforms
    #[arg(long = "request-timeout", env = "REQUEST_TIMEOUT", value_name = "SECONDS", default_value = "30")]
    pub request_timeout: u64,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            annotation_domain: DEFAULT_DOMAIN.to_string(),
            requeue_seconds: 3600,
            log_json: false,
            enable_route: false,
            request_timeout: 30,
        }
    }
}

impl Args {
    pub fn domain(&self) -> Domain {
        Domain::new(&self.annotation_domain)
    }

    pub fn requeue(&self) -> Duration {
        Duration::from_secs(self.requeue_seconds)
    }
}
