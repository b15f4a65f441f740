//! Route templates compiled to anchored regular expressions.
//!
//! A template is a slash separated list of literal segments and `:name` placeholders.
//! `/users/:id/posts` compiles to `^/users/([^/]+)/posts$`: literals are escaped,
//! every placeholder accepts one non-empty run of characters without `/`.

use crate::path::normalize;
use crate::request::PathParams;
use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PatternError {
    #[error("route template is empty")]
    Empty,

    #[error("route template '{template}' contains a query or fragment delimiter")]
    Delimiter { template: String },

    #[error("route template '{template}' compiles to an invalid pattern: {source}")]
    Regex {
        template: String,
        #[source]
        source: regex::Error,
    },
}

/// A compiled route template.
#[derive(Debug, Clone)]
pub struct RoutePattern {
    template: String,
    regex: Regex,
    param_names: Vec<String>,
}

impl RoutePattern {
    /// Compiles `template` after normalizing it.
    ///
    /// Rejects an empty (or blank) template and one containing `?` or `#`, which
    /// normalization would otherwise cut off.
    pub fn compile(template: &str) -> Result<Self, PatternError> {
        if template.trim().is_empty() {
            return Err(PatternError::Empty);
        }
        if template.contains(['?', '#']) {
            return Err(PatternError::Delimiter { template: template.to_owned() });
        }

        let template = normalize(template);
        let mut pattern = String::with_capacity(template.len() + 16);
        let mut param_names = Vec::new();

        pattern.push('^');
        if template == "/" {
            pattern.push('/');
        } else {
            for segment in template.split('/').skip(1) {
                pattern.push('/');
                match placeholder_name(segment) {
                    Some(name) => {
                        pattern.push_str("([^/]+)");
                        param_names.push(name.to_owned());
                    }
                    None => pattern.push_str(&regex::escape(segment)),
                }
            }
        }
        pattern.push('$');

        let regex = Regex::new(&pattern).map_err(|source| PatternError::Regex { template: template.clone(), source })?;
        Ok(Self { template, regex, param_names })
    }

    /// The normalized template this pattern was compiled from.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Placeholder names in declaration order.
    pub fn param_names(&self) -> &[String] {
        &self.param_names
    }

    /// Matches the whole of `path` (normalized first) and returns the captured parameters.
    pub fn matches(&self, path: &str) -> Option<PathParams> {
        self.matches_normalized(&normalize(path))
    }

    /// Same as [`matches`](Self::matches) for a path that is already normalized.
    pub(crate) fn matches_normalized(&self, path: &str) -> Option<PathParams> {
        let captures = self.regex.captures(path)?;
        let params = self
            .param_names
            .iter()
            .zip(captures.iter().skip(1))
            .map(|(name, value)| (name.clone(), value.map(|m| m.as_str().to_owned()).unwrap_or_default()))
            .collect();
        Some(params)
    }
}

/// `:name` where name is an identifier; anything else is a literal segment.
fn placeholder_name(segment: &str) -> Option<&str> {
    let name = segment.strip_prefix(':')?;
    let mut chars = name.chars();
    let first = chars.next()?;
    let valid = (first.is_ascii_alphabetic() || first == '_') && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    valid.then_some(name)
}
