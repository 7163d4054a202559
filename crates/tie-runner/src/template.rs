use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use regex::{Captures, Regex};

use crate::errors::TemplateError;

pub trait TemplateRenderer {
    fn render(
        &self,
        template_path: &Path,
        values: &BTreeMap<String, String>,
    ) -> Result<String, TemplateError>;
}

/// Substitutes `${name}` expressions, the form qsub templates are written in.
#[derive(Debug, Clone)]
pub struct PlaceholderTemplate {
    placeholder: Regex,
}

impl Default for PlaceholderTemplate {
    fn default() -> Self {
        Self {
            placeholder: Regex::new(r"\$\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}")
                .expect("placeholder pattern is valid"),
        }
    }
}

impl PlaceholderTemplate {
    pub fn render_str(
        &self,
        template_path: &Path,
        text: &str,
        values: &BTreeMap<String, String>,
    ) -> Result<String, TemplateError> {
        if let Some(unknown) = self
            .placeholder
            .captures_iter(text)
            .map(|c| c[1].to_string())
            .find(|name| !values.contains_key(name))
        {
            return Err(TemplateError::UnknownPlaceholder {
                path: template_path.to_path_buf(),
                name: unknown,
            });
        }
        let rendered = self
            .placeholder
            .replace_all(text, |c: &Captures| values[&c[1]].clone());
        Ok(rendered.into_owned())
    }
}

impl TemplateRenderer for PlaceholderTemplate {
    fn render(
        &self,
        template_path: &Path,
        values: &BTreeMap<String, String>,
    ) -> Result<String, TemplateError> {
        let text = fs::read_to_string(template_path).map_err(|source| TemplateError::Read {
            path: template_path.to_path_buf(),
            source,
        })?;
        self.render_str(template_path, &text, values)
    }
}
