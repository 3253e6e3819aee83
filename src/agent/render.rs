//! Template rendering.
//!
//! The pipeline only depends on [`TemplateRenderer`]; [`HandlebarsRenderer`]
//! is the engine shipped with the binaries.

use handlebars::{handlebars_helper, Handlebars};
use serde_json::Value;
use std::path::Path;
use thiserror::Error;

use crate::hash::ContentHash;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("reading template {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("rendering template {name}: {message}")]
    Template { name: String, message: String },
}

/// Rendered bytes plus their hash. Never mutated after creation.
#[derive(Debug, Clone)]
pub struct RenderedArtifact {
    pub bytes: Vec<u8>,
    pub hash: ContentHash,
}

impl RenderedArtifact {
    pub fn new(bytes: Vec<u8>) -> Self {
        let hash = ContentHash::of(&bytes);
        Self { bytes, hash }
    }
}

/// Renders a template source against a decoded JSON document.
pub trait TemplateRenderer: Send + Sync {
    fn render(&self, name: &str, source: &str, data: &Value) -> Result<RenderedArtifact, RenderError>;
}

/// Read a template file and render it.
pub async fn render_file(
    renderer: &dyn TemplateRenderer,
    path: &Path,
    data: &Value,
) -> Result<RenderedArtifact, RenderError> {
    let source = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| RenderError::Read {
            path: path.display().to_string(),
            source,
        })?;
    renderer.render(&path.display().to_string(), &source, data)
}

handlebars_helper!(to_upper: |s: str| s.to_uppercase());
handlebars_helper!(to_lower: |s: str| s.to_lowercase());
handlebars_helper!(base: |s: str| s.rsplit('/').next().unwrap_or_default().to_string());
handlebars_helper!(dir: |s: str| match s.rfind('/') {
    Some(0) => "/".to_string(),
    Some(i) => s[..i].to_string(),
    None => ".".to_string(),
});
handlebars_helper!(join: |items: array, sep: str| items
    .iter()
    .map(|v| match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    })
    .collect::<Vec<_>>()
    .join(sep));
handlebars_helper!(split: |s: str, sep: str| s
    .split(sep)
    .map(|part| Value::String(part.to_string()))
    .collect::<Vec<_>>());
handlebars_helper!(json: |s: str| serde_json::from_str::<Value>(s).unwrap_or(Value::Null));
handlebars_helper!(getenv: |name: str| std::env::var(name).unwrap_or_default());
handlebars_helper!(replace: |s: str, from: str, to: str| s.replace(from, to));
handlebars_helper!(contains: |s: str, needle: str| s.contains(needle));

/// Handlebars engine without HTML escaping.
pub struct HandlebarsRenderer {
    registry: Handlebars<'static>,
}

impl HandlebarsRenderer {
    pub fn new() -> Self {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);
        registry.register_helper("toUpper", Box::new(to_upper));
        registry.register_helper("toLower", Box::new(to_lower));
        registry.register_helper("base", Box::new(base));
        registry.register_helper("dir", Box::new(dir));
        registry.register_helper("join", Box::new(join));
        registry.register_helper("split", Box::new(split));
        registry.register_helper("json", Box::new(json));
        registry.register_helper("getenv", Box::new(getenv));
        registry.register_helper("replace", Box::new(replace));
        registry.register_helper("contains", Box::new(contains));
        Self { registry }
    }
}

impl Default for HandlebarsRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateRenderer for HandlebarsRenderer {
    fn render(&self, name: &str, source: &str, data: &Value) -> Result<RenderedArtifact, RenderError> {
        let output = self
            .registry
            .render_template(source, data)
            .map_err(|e| RenderError::Template {
                name: name.to_string(),
                message: e.to_string(),
            })?;
        Ok(RenderedArtifact::new(output.into_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn render(source: &str, data: Value) -> String {
        let artifact = HandlebarsRenderer::new().render("t", source, &data).unwrap();
        String::from_utf8(artifact.bytes).unwrap()
    }

    #[test]
    fn test_renders_document_fields() {
        assert_eq!(render("host={{host}}", json!({"host": "db1"})), "host=db1");
    }

    #[test]
    fn test_no_html_escaping() {
        assert_eq!(render("{{v}}", json!({"v": "a<b&c"})), "a<b&c");
    }

    #[test]
    fn test_helpers() {
        let data = json!({"path": "/etc/app/app.conf", "hosts": ["a", "b"], "name": "Db"});
        assert_eq!(render("{{base path}}", data.clone()), "app.conf");
        assert_eq!(render("{{dir path}}", data.clone()), "/etc/app");
        assert_eq!(render("{{join hosts \",\"}}", data.clone()), "a,b");
        assert_eq!(render("{{toUpper name}}-{{toLower name}}", data.clone()), "DB-db");
        assert_eq!(render("{{replace name \"D\" \"d\"}}", data), "db");
    }

    #[test]
    fn test_missing_field_renders_empty() {
        assert_eq!(render("x={{missing}}", json!({})), "x=");
    }

    #[test]
    fn test_syntax_error_is_reported() {
        let err = HandlebarsRenderer::new()
            .render("broken", "{{#if}}", &json!({}))
            .unwrap_err();
        assert!(matches!(err, RenderError::Template { .. }));
    }

    #[test]
    fn test_artifact_hash_matches_bytes() {
        let artifact = HandlebarsRenderer::new()
            .render("t", "host={{host}}", &json!({"host": "db1"}))
            .unwrap();
        assert_eq!(artifact.hash, ContentHash::of(b"host=db1"));
    }
}
