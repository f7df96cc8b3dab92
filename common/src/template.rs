use crate::{
    centreonservice::{CentreonService, CentreonServiceSpec},
    centreonservicegroup::{CentreonServiceGroup, CentreonServiceGroupSpec},
    handlebarshandler::{normalize_delimiters, HandleBars, DEFAULT_LEFT_DELIMITER, DEFAULT_RIGHT_DELIMITER},
    placeholders::PlaceholderContext,
    Error, Result,
};
use kube::{
    api::{ApiResource, DynamicObject},
    CustomResource, ResourceExt,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Serialize, Deserialize, Eq, PartialEq, Clone, Debug, JsonSchema)]
pub struct TemplateDelimiter {
    pub left: String,
    pub right: String,
}

/// A reusable, parametrized monitoring object
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[kube(
    kind = "Template",
    shortname = "mtpl",
    group = "monitor.k8s.webcenter.fr",
    version = "v1",
    namespaced
)]
#[kube(
    doc = "Custom resource representing a monitoring template",
    printcolumn = r#"
    {"name":"type", "type":"string", "description":"Generated kind", "jsonPath":".spec.type"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct TemplateSpec {
    /// Kind produced, the body then only holds its spec. Without it the body is a full object
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub template_type: Option<String>,
    /// Template body
    pub template: String,
    /// Name of the produced object, rendered with the same placeholders
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Alternative delimiters for the body and the name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_delimiter: Option<TemplateDelimiter>,
}

/// Kinds a template is allowed to produce
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChildKind {
    CentreonService,
    CentreonServiceGroup,
}

impl ChildKind {
    pub const ALL: [ChildKind; 2] = [ChildKind::CentreonService, ChildKind::CentreonServiceGroup];

    pub fn from_kind(kind: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.kind() == kind)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ChildKind::CentreonService => "CentreonService",
            ChildKind::CentreonServiceGroup => "CentreonServiceGroup",
        }
    }

    pub fn api_resource(&self) -> ApiResource {
        match self {
            ChildKind::CentreonService => ApiResource::erase::<CentreonService>(&()),
            ChildKind::CentreonServiceGroup => ApiResource::erase::<CentreonServiceGroup>(&()),
        }
    }

    /// Parse a spec-only body and check it with the kind validity predicate
    fn parse_spec(&self, template: &str, text: &str) -> Result<Value> {
        let invalid = |reason: String| Error::InvalidGenerated(template.to_string(), self.kind().to_string(), reason);
        let (spec, error) = match self {
            ChildKind::CentreonService => {
                let spec: CentreonServiceSpec = serde_yaml::from_str(text).map_err(|e| invalid(e.to_string()))?;
                (serde_json::to_value(&spec)?, spec.validation_error())
            }
            ChildKind::CentreonServiceGroup => {
                let spec: CentreonServiceGroupSpec =
                    serde_yaml::from_str(text).map_err(|e| invalid(e.to_string()))?;
                (serde_json::to_value(&spec)?, spec.validation_error())
            }
        };
        match error {
            Some(reason) => Err(invalid(reason)),
            None => Ok(spec),
        }
    }

    /// Parse a full object through the typed resource
    fn parse_object(&self, template: &str, text: &str) -> Result<DynamicObject> {
        let invalid = |e: serde_yaml::Error| {
            Error::InvalidGenerated(template.to_string(), self.kind().to_string(), e.to_string())
        };
        let value = match self {
            ChildKind::CentreonService => {
                serde_json::to_value(serde_yaml::from_str::<CentreonService>(text).map_err(invalid)?)?
            }
            ChildKind::CentreonServiceGroup => {
                serde_json::to_value(serde_yaml::from_str::<CentreonServiceGroup>(text).map_err(invalid)?)?
            }
        };
        Ok(serde_json::from_value(value)?)
    }
}

fn render_error(template: &str, e: Error) -> Error {
    match e {
        Error::HbsTemplateError(e) => Error::InvalidTemplate(format!("{template}: {e}")),
        other => other,
    }
}

impl Template {
    fn delimiters(&self) -> (&str, &str) {
        match &self.spec.template_delimiter {
            Some(d) => (d.left.as_str(), d.right.as_str()),
            None => (DEFAULT_LEFT_DELIMITER, DEFAULT_RIGHT_DELIMITER),
        }
    }

    fn normalized(&self, body: &str) -> String {
        let (left, right) = self.delimiters();
        normalize_delimiters(body, left, right)
    }

    pub fn child_kind(&self) -> Result<Option<ChildKind>> {
        match self.spec.template_type.as_deref() {
            None | Some("") => Ok(None),
            Some(kind) => ChildKind::from_kind(kind)
                .map(Some)
                .ok_or_else(|| Error::UnsupportedKind(kind.to_string())),
        }
    }

    /// Reject templates that could never render
    pub fn validate(&self) -> Result<()> {
        let hbs = HandleBars::new();
        if let Some(d) = &self.spec.template_delimiter {
            if d.left.is_empty() || d.right.is_empty() {
                return Err(Error::InvalidTemplate("delimiters must not be empty".to_string()));
            }
        }
        hbs.check(&self.normalized(&self.spec.template))
            .map_err(|e| Error::InvalidTemplate(format!("template: {e}")))?;
        if let Some(name) = &self.spec.name {
            hbs.check(&self.normalized(name))
                .map_err(|e| Error::InvalidTemplate(format!("name: {e}")))?;
        }
        self.child_kind().map_err(|e| Error::InvalidTemplate(e.to_string()))?;
        Ok(())
    }

    /// Render this template against a source resource placeholders
    pub fn render(&self, context: &PlaceholderContext) -> Result<DynamicObject> {
        let id = format!("{}/{}", self.namespace().unwrap_or_default(), self.name_any());
        let hbs = HandleBars::new();
        let ctx = context.for_template(&self.namespace().unwrap_or_default(), &self.name_any());
        let data = ctx.to_value();
        let text = hbs
            .render(&self.normalized(&self.spec.template), &data)
            .map_err(|e| render_error(&id, e))?;
        let text = text.trim();

        match self.child_kind()? {
            Some(kind) => {
                let spec = kind.parse_spec(&id, text)?;
                let name = match &self.spec.name {
                    Some(expr) if !expr.trim().is_empty() => hbs
                        .render(&self.normalized(expr), &data)
                        .map_err(|e| render_error(&id, e))?
                        .trim()
                        .to_string(),
                    _ => self.name_any(),
                };
                Ok(DynamicObject::new(&name, &kind.api_resource())
                    .within(&ctx.child_namespace())
                    .data(json!({ "spec": spec })))
            }
            None => {
                let head: Value = serde_yaml::from_str(text)?;
                let found = head["kind"].as_str().unwrap_or_default();
                let kind = ChildKind::from_kind(found).ok_or_else(|| Error::UnsupportedKind(found.to_string()))?;
                kind.parse_object(&id, text)
            }
        }
    }
}
