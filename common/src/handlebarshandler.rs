use crate::{Error, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use handlebars::{handlebars_helper, Handlebars, Template};
use handlebars_misc_helpers::new_hbs;
pub use serde_json::Value;
use tracing::*;

pub static DEFAULT_LEFT_DELIMITER: &str = "{{";
pub static DEFAULT_RIGHT_DELIMITER: &str = "}}";

fn as_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

handlebars_helper!(base64_decode: |arg:Value| String::from_utf8(STANDARD.decode(arg.as_str().unwrap_or_else(|| {
    warn!("handlebars::base64_decode received a non-string parameter: {:?}",arg);
    ""
})).unwrap_or_else(|e| {
    warn!("handlebars::base64_decode failed to decode with: {e:?}");
    vec![]
})).unwrap_or_else(|e| {
    warn!("handlebars::base64_decode failed to convert to string with: {e:?}");
    String::new()
}));
handlebars_helper!(base64_encode: |arg:Value| STANDARD.encode(arg.as_str().unwrap_or_else(|| {
    warn!("handlebars::base64_encode received a non-string parameter: {:?}",arg);
    ""
})));
handlebars_helper!(concat: |a: Value, b: Value| format!("{}{}", as_text(&a), as_text(&b)));
handlebars_helper!(join: |list: array, {sep: str = ","}| list.iter().map(as_text).collect::<Vec<String>>().join(sep));
handlebars_helper!(first: |list: array| list.first().cloned().unwrap_or(Value::Null));
handlebars_helper!(last: |list: array| list.last().cloned().unwrap_or(Value::Null));
handlebars_helper!(has_key: |map: object, key: str| map.contains_key(key));
handlebars_helper!(default: |value: Value, fallback: Value| {
    if value.is_null() || value.as_str().is_some_and(str::is_empty) {
        fallback.clone()
    } else {
        value.clone()
    }
});
fn checked(op: &str, a: i64, b: i64, result: Option<i64>) -> Value {
    result.map(Value::from).unwrap_or_else(|| {
        warn!("handlebars::{op} overflowed with {a} and {b}");
        Value::Null
    })
}
handlebars_helper!(add: |a: i64, b: i64| checked("add", a, b, a.checked_add(b)));
handlebars_helper!(sub: |a: i64, b: i64| checked("sub", a, b, a.checked_sub(b)));
handlebars_helper!(mul: |a: i64, b: i64| checked("mul", a, b, a.checked_mul(b)));

/// Bring custom delimiters back to the handlebars ones.
///
/// Literal `{{` in such a body are escaped first so they render as-is.
pub fn normalize_delimiters(body: &str, left: &str, right: &str) -> String {
    if left.is_empty() || right.is_empty() || (left == DEFAULT_LEFT_DELIMITER && right == DEFAULT_RIGHT_DELIMITER) {
        return body.to_string();
    }
    body.replace(DEFAULT_LEFT_DELIMITER, "\\{{")
        .replace(left, DEFAULT_LEFT_DELIMITER)
        .replace(right, DEFAULT_RIGHT_DELIMITER)
}

#[derive(Clone, Debug)]
pub struct HandleBars<'a> {
    engine: Handlebars<'a>,
}
impl Default for HandleBars<'static> {
    fn default() -> Self {
        Self::new()
    }
}
impl HandleBars<'_> {
    #[must_use]
    pub fn new() -> HandleBars<'static> {
        let mut engine = new_hbs();
        engine.set_strict_mode(false);
        engine.register_escape_fn(handlebars::no_escape);
        engine.register_helper("concat", Box::new(concat));
        engine.register_helper("join", Box::new(join));
        engine.register_helper("first", Box::new(first));
        engine.register_helper("last", Box::new(last));
        engine.register_helper("has_key", Box::new(has_key));
        engine.register_helper("default", Box::new(default));
        engine.register_helper("add", Box::new(add));
        engine.register_helper("sub", Box::new(sub));
        engine.register_helper("mul", Box::new(mul));
        engine.register_helper("base64_decode", Box::new(base64_decode));
        engine.register_helper("base64_encode", Box::new(base64_encode));
        HandleBars { engine }
    }

    /// Parse only, to reject broken templates early
    pub fn check(&self, template: &str) -> Result<()> {
        Template::compile(template).map(|_| ()).map_err(Error::from)
    }

    pub fn render(&self, template: &str, data: &Value) -> Result<String> {
        self.engine.render_template(template, data).map_err(Error::from)
    }
}
