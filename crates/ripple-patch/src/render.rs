//! Template resolution seam and fragment render pipeline.
//!
//! The templating layer is an external collaborator: the engine only needs
//! [`TemplateResolver::render`]. Resolvers must follow the
//! missing-key-renders-as-zero-value policy — a lookup that finds nothing
//! renders as the empty string (or `0`/`false` for typed engines) rather
//! than failing, so partially-populated data never panics a render.
//!
//! [`TableResolver`] is the built-in resolver: an in-memory table of
//! template strings with `{{key}}` placeholder substitution. Applications
//! with a real template engine plug their own resolver behind the trait.

use ripple_core::errors::RippleError;
use serde_json::Value;
use std::collections::HashMap;

use crate::minify::minify_html;

/// Reference to the fragment a content patch should render.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TemplateRef {
    /// A named template resolved through the [`TemplateResolver`].
    Named(String),
    /// A literal HTML string (the ad-hoc "raw HTML" pseudo-template).
    Raw(String),
}

/// Collaborator interface to the (excluded) templating layer.
///
/// `data` is the event's payload; implementations apply the
/// missing-key-renders-as-zero-value policy described in the module docs.
pub trait TemplateResolver: Send + Sync {
    /// Render the named template against `data`.
    fn render(&self, name: &str, data: &Value) -> Result<String, RippleError>;
}

/// In-memory template table with `{{key}}` substitution.
///
/// Placeholders look up dotted paths in the data object (`{{user.name}}`);
/// a missing path substitutes the empty string. String values interpolate
/// verbatim; other JSON values interpolate in their JSON form.
#[derive(Debug, Default)]
pub struct TableResolver {
    templates: HashMap<String, String>,
}

impl TableResolver {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a template under a name, replacing any previous definition.
    pub fn define(&mut self, name: impl Into<String>, template: impl Into<String>) {
        let _ = self.templates.insert(name.into(), template.into());
    }

    /// Number of defined templates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

impl TemplateResolver for TableResolver {
    fn render(&self, name: &str, data: &Value) -> Result<String, RippleError> {
        let template = self.templates.get(name).ok_or_else(|| RippleError::Render {
            template: name.to_owned(),
            message: "template not defined".into(),
        })?;
        Ok(substitute(template, data))
    }
}

/// Replace `{{path}}` placeholders with values looked up in `data`.
fn substitute(template: &str, data: &Value) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            // Unterminated placeholder: emit verbatim.
            out.push_str(&rest[start..]);
            rest = "";
            break;
        };
        let path = after[..end].trim();
        out.push_str(&lookup(data, path));
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    out
}

/// Look up a dotted path; missing keys render as the zero value.
fn lookup(data: &Value, path: &str) -> String {
    let mut current = data;
    for segment in path.split('.') {
        match current.get(segment) {
            Some(next) => current = next,
            None => return String::new(),
        }
    }
    match current {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Resolve and minify one fragment.
///
/// Named templates go through the resolver; raw fragments skip resolution.
/// Both pass the minification stage before becoming a patch value.
pub fn render_fragment(
    resolver: &dyn TemplateResolver,
    template: &TemplateRef,
    data: &Value,
) -> Result<String, RippleError> {
    let html = match template {
        TemplateRef::Named(name) => resolver.render(name, data)?,
        TemplateRef::Raw(html) => html.clone(),
    };
    Ok(minify_html(&html))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn resolver_with(name: &str, body: &str) -> TableResolver {
        let mut resolver = TableResolver::new();
        resolver.define(name, body);
        resolver
    }

    #[test]
    fn substitutes_string_values() {
        let resolver = resolver_with("greet", "<p>hi {{name}}</p>");
        let html = resolver.render("greet", &json!({"name": "ada"})).unwrap();
        assert_eq!(html, "<p>hi ada</p>");
    }

    #[test]
    fn missing_key_renders_as_zero_value() {
        let resolver = resolver_with("greet", "<p>hi {{name}}!</p>");
        let html = resolver.render("greet", &json!({})).unwrap();
        assert_eq!(html, "<p>hi !</p>");
    }

    #[test]
    fn dotted_path_lookup() {
        let resolver = resolver_with("row", "<td>{{user.name}}</td>");
        let html = resolver
            .render("row", &json!({"user": {"name": "grace"}}))
            .unwrap();
        assert_eq!(html, "<td>grace</td>");
    }

    #[test]
    fn non_string_values_interpolate_as_json() {
        let resolver = resolver_with("count", "<span>{{n}}</span>");
        assert_eq!(
            resolver.render("count", &json!({"n": 3})).unwrap(),
            "<span>3</span>"
        );
        assert_eq!(
            resolver.render("count", &json!({"n": true})).unwrap(),
            "<span>true</span>"
        );
    }

    #[test]
    fn null_renders_empty() {
        let resolver = resolver_with("v", "[{{x}}]");
        assert_eq!(resolver.render("v", &json!({"x": null})).unwrap(), "[]");
    }

    #[test]
    fn unterminated_placeholder_passes_through() {
        let resolver = resolver_with("odd", "<p>{{name</p>");
        assert_eq!(resolver.render("odd", &json!({})).unwrap(), "<p>{{name</p>");
    }

    #[test]
    fn undefined_template_is_render_error() {
        let resolver = TableResolver::new();
        let err = resolver.render("nope", &json!({})).unwrap_err();
        assert_matches!(err, RippleError::Render { ref template, .. } if template == "nope");
    }

    #[test]
    fn redefinition_replaces() {
        let mut resolver = TableResolver::new();
        resolver.define("t", "old");
        resolver.define("t", "new");
        assert_eq!(resolver.render("t", &json!({})).unwrap(), "new");
        assert_eq!(resolver.len(), 1);
    }

    #[test]
    fn render_fragment_minifies_named_output() {
        let resolver = resolver_with("list", "<ul>\n  <li>{{a}}</li>\n</ul>");
        let html = render_fragment(
            &resolver,
            &TemplateRef::Named("list".into()),
            &json!({"a": "x"}),
        )
        .unwrap();
        assert_eq!(html, "<ul><li>x</li></ul>");
    }

    #[test]
    fn render_fragment_raw_skips_resolution_but_minifies() {
        let resolver = TableResolver::new();
        let html = render_fragment(
            &resolver,
            &TemplateRef::Raw("<div>\n  <b>hi</b>\n</div>".into()),
            &json!({}),
        )
        .unwrap();
        assert_eq!(html, "<div><b>hi</b></div>");
    }
}
