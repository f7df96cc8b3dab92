use chrono::DateTime;
use k8s_openapi::{
    api::{
        core::v1::{Namespace, Node, Secret},
        networking::v1::Ingress,
    },
    apimachinery::pkg::apis::meta::v1::ObjectMeta,
};
use kube::api::DynamicObject;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use tracing::*;
use x509_parser::{extensions::GeneralName, pem::Pem};

pub static TLS_CERT_KEY: &str = "tls.crt";

/// One host exposed by an ingress or a route
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct Rule {
    pub host: String,
    pub scheme: String,
    pub paths: Vec<String>,
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CertificateInfo {
    pub subject: String,
    pub issuer: String,
    pub serial_number: String,
    pub not_before: String,
    pub not_after: String,
    pub dns_names: Vec<String>,
}

/// Kind specific placeholders
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Extras {
    #[default]
    None,
    Rules(Vec<Rule>),
    Node {
        node_info: Value,
        addresses: Value,
        unschedulable: bool,
    },
    Certificates(Vec<CertificateInfo>),
}

impl Extras {
    fn to_map(&self) -> Map<String, Value> {
        let value = match self {
            Extras::None => json!({}),
            Extras::Rules(rules) => json!({ "rules": rules }),
            Extras::Node {
                node_info,
                addresses,
                unschedulable,
            } => json!({
                "nodeInfo": node_info,
                "addresses": addresses,
                "unschedulable": unschedulable,
            }),
            Extras::Certificates(certificates) => json!({ "certificates": certificates }),
        };
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }
}

/// Variables available to a template body
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PlaceholderContext {
    pub name: String,
    pub namespace: String,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub template_name: String,
    pub template_namespace: String,
    pub extras: Extras,
}

impl PlaceholderContext {
    #[must_use]
    pub fn from_meta(meta: &ObjectMeta) -> Self {
        Self {
            name: meta.name.clone().unwrap_or_default(),
            namespace: meta.namespace.clone().unwrap_or_default(),
            labels: meta.labels.clone().unwrap_or_default(),
            annotations: meta.annotations.clone().unwrap_or_default(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_extras(mut self, extras: Extras) -> Self {
        self.extras = extras;
        self
    }

    #[must_use]
    pub fn for_template(&self, namespace: &str, name: &str) -> Self {
        let mut ctx = self.clone();
        ctx.template_namespace = namespace.to_string();
        ctx.template_name = name.to_string();
        ctx
    }

    /// Children of cluster scoped sources live next to their template
    pub fn child_namespace(&self) -> String {
        if self.namespace.is_empty() {
            self.template_namespace.clone()
        } else {
            self.namespace.clone()
        }
    }

    pub fn to_value(&self) -> Value {
        let mut map = self.extras.to_map();
        map.insert("name".into(), json!(self.name));
        map.insert("namespace".into(), json!(self.namespace));
        map.insert("labels".into(), json!(self.labels));
        map.insert("annotations".into(), json!(self.annotations));
        map.insert("templateName".into(), json!(self.template_name));
        map.insert("templateNamespace".into(), json!(self.template_namespace));
        Value::Object(map)
    }
}

/// Source resources able to feed a template
pub trait PlaceholderSource {
    fn placeholders(&self) -> PlaceholderContext;
}

impl PlaceholderSource for Ingress {
    fn placeholders(&self) -> PlaceholderContext {
        let spec = self.spec.clone().unwrap_or_default();
        let tls_hosts: Vec<String> = spec
            .tls
            .unwrap_or_default()
            .into_iter()
            .flat_map(|tls| tls.hosts.unwrap_or_default())
            .collect();
        let rules = spec
            .rules
            .unwrap_or_default()
            .into_iter()
            .map(|rule| {
                let host = rule.host.unwrap_or_default();
                let scheme = if tls_hosts.contains(&host) { "https" } else { "http" };
                let paths = rule
                    .http
                    .map(|http| http.paths.into_iter().filter_map(|p| p.path).collect())
                    .unwrap_or_default();
                Rule {
                    host,
                    scheme: scheme.to_string(),
                    paths,
                }
            })
            .collect();
        PlaceholderContext::from_meta(&self.metadata).with_extras(Extras::Rules(rules))
    }
}

/// OpenShift routes are only known dynamically
impl PlaceholderSource for DynamicObject {
    fn placeholders(&self) -> PlaceholderContext {
        let spec = &self.data["spec"];
        let host = spec["host"].as_str().unwrap_or_default().to_string();
        let scheme = if spec["tls"].is_object() { "https" } else { "http" };
        let paths = spec["path"]
            .as_str()
            .filter(|p| !p.is_empty())
            .map(|p| vec![p.to_string()])
            .unwrap_or_else(|| vec!["/".to_string()]);
        PlaceholderContext::from_meta(&self.metadata).with_extras(Extras::Rules(vec![Rule {
            host,
            scheme: scheme.to_string(),
            paths,
        }]))
    }
}

impl PlaceholderSource for Node {
    fn placeholders(&self) -> PlaceholderContext {
        let status = self.status.clone().unwrap_or_default();
        let node_info = status
            .node_info
            .and_then(|info| serde_json::to_value(info).ok())
            .unwrap_or(Value::Null);
        let addresses = serde_json::to_value(status.addresses.unwrap_or_default()).unwrap_or(Value::Null);
        let unschedulable = self
            .spec
            .as_ref()
            .and_then(|s| s.unschedulable)
            .unwrap_or(false);
        PlaceholderContext::from_meta(&self.metadata).with_extras(Extras::Node {
            node_info,
            addresses,
            unschedulable,
        })
    }
}

impl PlaceholderSource for Namespace {
    fn placeholders(&self) -> PlaceholderContext {
        PlaceholderContext::from_meta(&self.metadata)
    }
}

impl PlaceholderSource for Secret {
    fn placeholders(&self) -> PlaceholderContext {
        let certificates = self
            .data
            .as_ref()
            .and_then(|d| d.get(TLS_CERT_KEY))
            .map(|pem| parse_certificates(&pem.0))
            .unwrap_or_default();
        PlaceholderContext::from_meta(&self.metadata).with_extras(Extras::Certificates(certificates))
    }
}

fn timestamp(ts: i64) -> String {
    DateTime::from_timestamp(ts, 0)
        .map(|d| d.to_rfc3339())
        .unwrap_or_default()
}

/// Every certificate of a PEM bundle, unparsable blocks are skipped
pub fn parse_certificates(pem: &[u8]) -> Vec<CertificateInfo> {
    Pem::iter_from_buffer(pem)
        .filter_map(|block| {
            let block = block
                .map_err(|e| warn!("Skipping unreadable PEM block: {e}"))
                .ok()?;
            let cert = block
                .parse_x509()
                .map_err(|e| warn!("Skipping unparsable certificate: {e}"))
                .ok()?;
            let dns_names = cert
                .subject_alternative_name()
                .ok()
                .flatten()
                .map(|san| {
                    san.value
                        .general_names
                        .iter()
                        .filter_map(|name| match name {
                            GeneralName::DNSName(dns) => Some(dns.to_string()),
                            _ => None,
                        })
                        .collect()
                })
                .unwrap_or_default();
            Some(CertificateInfo {
                subject: cert.subject().to_string(),
                issuer: cert.issuer().to_string(),
                serial_number: cert.raw_serial_as_string(),
                not_before: timestamp(cert.validity().not_before.timestamp()),
                not_after: timestamp(cert.validity().not_after.timestamp()),
                dns_names,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::{
        api::{
            core::v1::{NodeAddress, NodeSpec, NodeStatus},
            networking::v1::{HTTPIngressPath, HTTPIngressRuleValue, IngressRule, IngressSpec, IngressTLS},
        },
        ByteString,
    };

    fn meta(name: &str, namespace: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.into()),
            namespace: Some(namespace.into()),
            labels: Some(BTreeMap::from([("app".to_string(), "web".to_string())])),
            ..ObjectMeta::default()
        }
    }

    fn path(p: &str) -> HTTPIngressPath {
        HTTPIngressPath {
            path: Some(p.into()),
            path_type: "Prefix".into(),
            ..HTTPIngressPath::default()
        }
    }

    #[test]
    fn test_ingress_rules() {
        let ingress = Ingress {
            metadata: meta("web", "prod"),
            spec: Some(IngressSpec {
                rules: Some(vec![
                    IngressRule {
                        host: Some("secure.local".into()),
                        http: Some(HTTPIngressRuleValue {
                            paths: vec![path("/"), path("/api")],
                        }),
                    },
                    IngressRule {
                        host: Some("plain.local".into()),
                        http: None,
                    },
                ]),
                tls: Some(vec![IngressTLS {
                    hosts: Some(vec!["secure.local".into()]),
                    secret_name: None,
                }]),
                ..IngressSpec::default()
            }),
            status: None,
        };
        let value = ingress.placeholders().for_template("monitoring", "ping").to_value();
        assert_eq!(value["name"], "web");
        assert_eq!(value["namespace"], "prod");
        assert_eq!(value["labels"]["app"], "web");
        assert_eq!(value["templateName"], "ping");
        assert_eq!(value["templateNamespace"], "monitoring");
        assert_eq!(value["rules"][0]["scheme"], "https");
        assert_eq!(value["rules"][0]["paths"], json!(["/", "/api"]));
        assert_eq!(value["rules"][1]["scheme"], "http");
        assert_eq!(value["rules"][1]["paths"], json!([]));
    }

    #[test]
    fn test_route_rules() {
        let route: DynamicObject = serde_json::from_value(json!({
            "apiVersion": "route.openshift.io/v1",
            "kind": "Route",
            "metadata": {"name": "web", "namespace": "prod"},
            "spec": {"host": "web.apps.local", "tls": {"termination": "edge"}}
        }))
        .unwrap();
        let value = route.placeholders().to_value();
        assert_eq!(
            value["rules"],
            json!([{"host": "web.apps.local", "scheme": "https", "paths": ["/"]}])
        );
    }

    #[test]
    fn test_node_extras() {
        let node = Node {
            metadata: ObjectMeta {
                name: Some("worker1".into()),
                ..ObjectMeta::default()
            },
            spec: Some(NodeSpec {
                unschedulable: Some(true),
                ..NodeSpec::default()
            }),
            status: Some(NodeStatus {
                addresses: Some(vec![NodeAddress {
                    address: "10.0.0.1".into(),
                    type_: "InternalIP".into(),
                }]),
                ..NodeStatus::default()
            }),
        };
        let value = node.placeholders().to_value();
        assert_eq!(value["namespace"], "");
        assert_eq!(value["unschedulable"], true);
        assert_eq!(value["addresses"][0]["address"], "10.0.0.1");
        assert!(value["nodeInfo"].is_null());
    }

    #[test]
    fn test_tls_secret_certificates() {
        let certified = rcgen::generate_simple_self_signed(vec!["web.local".to_string()]).unwrap();
        let mut secret = Secret {
            metadata: meta("web-tls", "prod"),
            type_: Some("kubernetes.io/tls".into()),
            ..Secret::default()
        };
        secret.data = Some(BTreeMap::from([(
            TLS_CERT_KEY.to_string(),
            ByteString(certified.cert.pem().into_bytes()),
        )]));
        let value = secret.placeholders().to_value();
        assert_eq!(value["certificates"][0]["dnsNames"], json!(["web.local"]));
        assert!(!value["certificates"][0]["notAfter"].as_str().unwrap().is_empty());
    }

    #[test]
    fn test_absent_extras_leave_placeholders_empty() {
        let secret = Secret {
            metadata: meta("empty", "prod"),
            ..Secret::default()
        };
        let value = secret.placeholders().to_value();
        assert_eq!(value["certificates"], json!([]));
        assert!(value.get("rules").is_none());
    }
}
