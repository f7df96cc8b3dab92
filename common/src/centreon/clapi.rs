use super::{CentreonApi, Macro, Service, ServiceGroup};
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::*;

pub static DEFAULT_ENDPOINT: &str = "api/index.php";
static AUTH_HEADER: &str = "centreon-auth-token";

/// Connection settings of a Centreon platform
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CentreonSettings {
    pub url: String,
    pub self_signed_certificate: bool,
    pub timeout_seconds: u64,
    /// CLAPI path relative to `url`
    pub endpoint: Option<String>,
}

impl CentreonSettings {
    /// Full CLAPI url
    pub fn clapi_url(&self) -> String {
        let endpoint = self.endpoint.as_deref().unwrap_or(DEFAULT_ENDPOINT);
        format!("{}/{}", self.url.trim_end_matches('/'), endpoint.trim_start_matches('/'))
    }
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"********")
            .finish()
    }
}

/// CLAPI client for a Centreon platform
pub struct CentreonClient {
    http: Client,
    baseurl: String,
    clapi_url: String,
    credentials: Credentials,
    token: Mutex<Option<String>>,
}

impl CentreonClient {
    pub fn new(settings: &CentreonSettings, credentials: &Credentials) -> Result<Self> {
        let http = Client::builder()
            .user_agent(crate::DEFAULT_DOMAIN)
            .timeout(std::time::Duration::from_secs(settings.timeout_seconds))
            .use_rustls_tls()
            .danger_accept_invalid_certs(settings.self_signed_certificate)
            .build()
            .map_err(Error::ReqwestError)?;
        Ok(Self {
            http,
            baseurl: settings.url.trim_end_matches('/').to_string(),
            clapi_url: settings.clapi_url(),
            credentials: credentials.clone(),
            token: Mutex::new(None),
        })
    }

    fn send_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::Timeout(self.baseurl.clone())
        } else {
            Error::ReqwestError(e)
        }
    }

    async fn authenticate(&self) -> Result<String> {
        debug!("Authenticating on {} as {}", self.baseurl, self.credentials.username);
        let resp = self
            .http
            .post(&self.clapi_url)
            .query(&[("action", "authenticate")])
            .form(&[
                ("username", self.credentials.username.as_str()),
                ("password", self.credentials.password.as_str()),
            ])
            .send()
            .await
            .map_err(|e| self.send_error(e))?;
        let status = resp.status();
        let body = resp.text().await.map_err(|e| self.send_error(e))?;
        if !status.is_success() {
            return Err(Error::AuthFailed(format!("{status}: {body}")));
        }
        let parsed: Value = serde_json::from_str(&body).map_err(Error::SerializationError)?;
        parsed["authToken"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Error::AuthFailed("no authToken in the response".to_string()))
    }

    async fn token(&self, renew: bool) -> Result<String> {
        let mut token = self.token.lock().await;
        if renew || token.is_none() {
            *token = Some(self.authenticate().await?);
        }
        Ok(token.clone().unwrap_or_default())
    }

    async fn post_clapi(&self, token: &str, body: &Value) -> Result<(StatusCode, String)> {
        let resp = self
            .http
            .post(&self.clapi_url)
            .query(&[("action", "action"), ("object", "centreon_clapi")])
            .header(AUTH_HEADER, token)
            .json(body)
            .send()
            .await
            .map_err(|e| self.send_error(e))?;
        let status = resp.status();
        let text = resp.text().await.map_err(|e| self.send_error(e))?;
        Ok((status, text))
    }

    /// Run a CLAPI command and return its result rows
    async fn clapi(&self, action: &str, object: &str, values: Option<String>) -> Result<Vec<Value>> {
        let mut body = json!({"action": action, "object": object});
        if let Some(values) = values {
            body["values"] = values.into();
        }
        trace!("clapi {}", body);
        let token = self.token(false).await?;
        let (mut status, mut text) = self.post_clapi(&token, &body).await?;
        if status == StatusCode::UNAUTHORIZED {
            let token = self.token(true).await?;
            (status, text) = self.post_clapi(&token, &body).await?;
        }
        if !status.is_success() {
            return Err(Error::MethodFailed(
                format!("{action} {object}"),
                status.as_u16(),
                text,
            ));
        }
        Ok(result_rows(&text)?)
    }

    async fn service_values(&self, host: &str, name: &str, action: &str) -> Result<Vec<Value>> {
        self.clapi(action, "SERVICE", Some(format!("{host};{name}"))).await
    }
}

/// CLAPI answers `{"result": [...]}`, or a bare string for mutations
fn result_rows(text: &str) -> Result<Vec<Value>> {
    if text.trim().is_empty() {
        return Ok(vec![]);
    }
    let parsed: Value = serde_json::from_str(text).map_err(Error::SerializationError)?;
    Ok(match &parsed["result"] {
        Value::Array(rows) => rows.clone(),
        Value::Object(_) => vec![parsed["result"].clone()],
        _ => vec![],
    })
}

fn field(row: &Value, key: &str) -> String {
    match &row[key] {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
        _ => String::new(),
    }
}

fn find_service_row<'a>(rows: &'a [Value], host: &str, name: &str) -> Option<&'a Value> {
    rows.iter()
        .find(|row| field(row, "host name") == host && field(row, "description") == name)
}

fn service_from_row(row: &Value) -> Service {
    Service {
        host: field(row, "host name"),
        name: field(row, "description"),
        check_command: field(row, "check command"),
        check_command_args: field(row, "check command arg"),
        normal_check_interval: field(row, "normal check interval"),
        retry_check_interval: field(row, "retry check interval"),
        max_check_attempts: field(row, "max check attempts"),
        active_check_enabled: field(row, "active checks enabled"),
        passive_check_enabled: field(row, "passive checks enabled"),
        activated: field(row, "activate"),
        ..Service::default()
    }
}

/// `$_SERVICEFOO$` is reported for direct macros, `FOO` is what we manage
fn macro_name(raw: &str) -> String {
    raw.strip_prefix("$_SERVICE")
        .and_then(|n| n.strip_suffix('$'))
        .unwrap_or(raw)
        .to_string()
}

fn macro_from_row(row: &Value) -> Macro {
    Macro {
        name: macro_name(&field(row, "macro name")),
        value: field(row, "macro value"),
        is_password: field(row, "is_password"),
        source: field(row, "source"),
    }
}

fn names(rows: &[Value]) -> Vec<String> {
    rows.iter().map(|row| field(row, "name")).filter(|n| !n.is_empty()).collect()
}

#[async_trait]
impl CentreonApi for CentreonClient {
    async fn get_service(&self, host: &str, name: &str) -> Result<Option<Service>> {
        let rows = self.clapi("show", "SERVICE", Some(name.to_string())).await?;
        let Some(row) = find_service_row(&rows, host, name) else {
            return Ok(None);
        };
        let mut service = service_from_row(row);
        let params = self
            .clapi("getparam", "SERVICE", Some(format!("{host};{name};template|comment")))
            .await?;
        if let Some(p) = params.first() {
            service.template = field(p, "template");
            service.comment = field(p, "comment");
        }
        service.groups = names(&self.service_values(host, name, "getservicegroup").await?);
        service.categories = names(&self.service_values(host, name, "getcategory").await?);
        service.macros = self
            .service_values(host, name, "getmacro")
            .await?
            .iter()
            .map(macro_from_row)
            .collect();
        Ok(Some(service))
    }

    async fn add_service(&self, host: &str, name: &str, template: &str) -> Result<()> {
        self.clapi("add", "SERVICE", Some(format!("{host};{name};{template}")))
            .await
            .map(|_| ())
    }

    async fn set_service_param(&self, host: &str, name: &str, param: &str, value: &str) -> Result<()> {
        self.clapi("setparam", "SERVICE", Some(format!("{host};{name};{param};{value}")))
            .await
            .map(|_| ())
    }

    async fn set_service_groups(&self, host: &str, name: &str, groups: &[String]) -> Result<()> {
        self.clapi(
            "addservicegroup",
            "SERVICE",
            Some(format!("{host};{name};{}", groups.join("|"))),
        )
        .await
        .map(|_| ())
    }

    async fn delete_service_groups(&self, host: &str, name: &str, groups: &[String]) -> Result<()> {
        self.clapi(
            "delservicegroup",
            "SERVICE",
            Some(format!("{host};{name};{}", groups.join("|"))),
        )
        .await
        .map(|_| ())
    }

    async fn set_service_categories(&self, host: &str, name: &str, categories: &[String]) -> Result<()> {
        self.clapi(
            "addcategory",
            "SERVICE",
            Some(format!("{host};{name};{}", categories.join("|"))),
        )
        .await
        .map(|_| ())
    }

    async fn delete_service_categories(&self, host: &str, name: &str, categories: &[String]) -> Result<()> {
        self.clapi(
            "delcategory",
            "SERVICE",
            Some(format!("{host};{name};{}", categories.join("|"))),
        )
        .await
        .map(|_| ())
    }

    async fn set_service_macro(&self, host: &str, name: &str, service_macro: &Macro) -> Result<()> {
        self.clapi(
            "setmacro",
            "SERVICE",
            Some(format!(
                "{host};{name};{};{};{};",
                service_macro.name,
                service_macro.value,
                service_macro.password_flag()
            )),
        )
        .await
        .map(|_| ())
    }

    async fn delete_service_macro(&self, host: &str, name: &str, macro_name: &str) -> Result<()> {
        self.clapi("delmacro", "SERVICE", Some(format!("{host};{name};{macro_name}")))
            .await
            .map(|_| ())
    }

    async fn set_service_host(&self, host: &str, name: &str, new_host: &str) -> Result<()> {
        self.clapi("sethost", "SERVICE", Some(format!("{host};{name};{new_host}")))
            .await
            .map(|_| ())
    }

    async fn delete_service(&self, host: &str, name: &str) -> Result<()> {
        self.service_values(host, name, "del").await.map(|_| ())
    }

    async fn get_service_group(&self, name: &str) -> Result<Option<ServiceGroup>> {
        let rows = self.clapi("show", "SG", Some(name.to_string())).await?;
        let Some(row) = rows.iter().find(|row| field(row, "name") == name) else {
            return Ok(None);
        };
        let mut group = ServiceGroup {
            name: field(row, "name"),
            description: field(row, "alias"),
            ..ServiceGroup::default()
        };
        let params = self
            .clapi("getparam", "SG", Some(format!("{name};activate|comment")))
            .await?;
        if let Some(p) = params.first() {
            group.activated = field(p, "activate");
            group.comment = field(p, "comment");
        }
        Ok(Some(group))
    }

    async fn add_service_group(&self, name: &str, description: &str) -> Result<()> {
        self.clapi("add", "SG", Some(format!("{name};{description}")))
            .await
            .map(|_| ())
    }

    async fn set_service_group_param(&self, name: &str, param: &str, value: &str) -> Result<()> {
        self.clapi("setparam", "SG", Some(format!("{name};{param};{value}")))
            .await
            .map(|_| ())
    }

    async fn delete_service_group(&self, name: &str) -> Result<()> {
        self.clapi("del", "SG", Some(name.to_string())).await.map(|_| ())
    }
}
