//! Field validation from rule strings.
//!
//! Each field carries a `|` separated list of rules, a rule takes its argument after
//! a `:`, for example `required|string|min:3|max:50` or `in:admin,editor`.
//!
//! ```
//! use micro_api::validation::Validator;
//! use serde_json::json;
//!
//! let validator = Validator::new(&[("username", "required|string|min:3"), ("email", "required|email")]).unwrap();
//!
//! let input = json!({ "username": "ab", "email": "a@b.io" });
//! let errors = validator.validate(input.as_object().unwrap());
//!
//! assert_eq!(errors["username"], ["The username must be at least 3 characters."]);
//! assert!(!errors.contains_key("email"));
//! ```

use crate::response::ValidationErrors;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;

static EMAIL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RuleError {
    #[error("unknown rule '{rule}' for field '{field}'")]
    UnknownRule { field: String, rule: String },

    #[error("invalid argument '{argument}' of rule '{rule}' for field '{field}'")]
    InvalidArgument { field: String, rule: String, argument: String },
}

#[derive(Debug, Clone, PartialEq)]
enum Rule {
    Required,
    String,
    Numeric,
    Email,
    Min(f64),
    Max(f64),
    In(Vec<String>),
}

impl Rule {
    fn parse(field: &str, rule: &str) -> Result<Self, RuleError> {
        let (name, argument) = match rule.split_once(':') {
            Some((name, argument)) => (name.trim(), Some(argument.trim())),
            None => (rule.trim(), None),
        };

        let invalid = |argument: &str| RuleError::InvalidArgument {
            field: field.to_owned(),
            rule: name.to_owned(),
            argument: argument.to_owned(),
        };
        let bound = |argument: Option<&str>| {
            let argument = argument.unwrap_or_default();
            argument.parse::<f64>().ok().filter(|n| n.is_finite() && *n >= 0.0).ok_or_else(|| invalid(argument))
        };

        match name {
            "required" => Ok(Self::Required),
            "string" => Ok(Self::String),
            "numeric" => Ok(Self::Numeric),
            "email" => Ok(Self::Email),
            "min" => bound(argument).map(Self::Min),
            "max" => bound(argument).map(Self::Max),
            "in" => {
                let options: Vec<String> = argument
                    .unwrap_or_default()
                    .split(',')
                    .map(str::trim)
                    .filter(|option| !option.is_empty())
                    .map(str::to_owned)
                    .collect();
                if options.is_empty() {
                    return Err(invalid(argument.unwrap_or_default()));
                }
                Ok(Self::In(options))
            }
            _ => Err(RuleError::UnknownRule { field: field.to_owned(), rule: rule.to_owned() }),
        }
    }
}

#[derive(Debug, Clone)]
struct FieldRules {
    field: String,
    rules: Vec<Rule>,
}

impl FieldRules {
    fn has(&self, rule: &Rule) -> bool {
        self.rules.contains(rule)
    }

    fn check(&self, value: Option<&Value>, errors: &mut Vec<String>) {
        let field = &self.field;

        if is_absent(value) {
            if self.has(&Rule::Required) {
                errors.push(format!("The {field} field is required."));
            }
            return;
        }
        let Some(value) = value else { return };

        let numeric = self.has(&Rule::Numeric);
        for rule in &self.rules {
            match rule {
                Rule::Required => {}
                Rule::String => {
                    if !value.is_string() {
                        errors.push(format!("The {field} must be a string."));
                    }
                }
                Rule::Numeric => {
                    if as_number(value).is_none() {
                        errors.push(format!("The {field} must be a number."));
                    }
                }
                Rule::Email => {
                    if !value.as_str().is_some_and(|email| EMAIL.is_match(email)) {
                        errors.push(format!("The {field} must be a valid email address."));
                    }
                }
                Rule::Min(min) => match size(value, numeric) {
                    Some(Size::Length(len)) if len < *min => {
                        errors.push(format!("The {field} must be at least {min} characters."));
                    }
                    Some(Size::Value(n)) if n < *min => errors.push(format!("The {field} must be at least {min}.")),
                    _ => {}
                },
                Rule::Max(max) => match size(value, numeric) {
                    Some(Size::Length(len)) if len > *max => {
                        errors.push(format!("The {field} may not be greater than {max} characters."));
                    }
                    Some(Size::Value(n)) if n > *max => {
                        errors.push(format!("The {field} may not be greater than {max}."));
                    }
                    _ => {}
                },
                Rule::In(options) => {
                    if !scalar(value).is_some_and(|value| options.contains(&value)) {
                        errors.push(format!("The selected {field} is invalid."));
                    }
                }
            }
        }
    }
}

/// A compiled set of field rules.
#[derive(Debug, Clone)]
pub struct Validator {
    fields: Vec<FieldRules>,
}

impl Validator {
    pub fn new(rules: &[(&str, &str)]) -> Result<Self, RuleError> {
        let fields = rules
            .iter()
            .map(|&(field, spec)| {
                let rules = spec
                    .split('|')
                    .filter(|rule| !rule.trim().is_empty())
                    .map(|rule| Rule::parse(field, rule))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(FieldRules { field: field.to_owned(), rules })
            })
            .collect::<Result<Vec<_>, RuleError>>()?;
        Ok(Self { fields })
    }

    /// Checks `input` against every rule; fields that pass have no entry.
    pub fn validate(&self, input: &Map<String, Value>) -> ValidationErrors {
        let mut errors = ValidationErrors::new();
        for field in &self.fields {
            let mut messages = Vec::new();
            field.check(input.get(&field.field), &mut messages);
            if !messages.is_empty() {
                errors.entry(field.field.clone()).or_default().extend(messages);
            }
        }
        errors
    }
}

enum Size {
    Length(f64),
    Value(f64),
}

#[allow(clippy::cast_precision_loss, reason = "lengths are compared against f64 rule arguments")]
fn size(value: &Value, numeric: bool) -> Option<Size> {
    match value {
        Value::Number(n) => n.as_f64().map(Size::Value),
        Value::String(s) if numeric => s.trim().parse::<f64>().ok().map(Size::Value),
        Value::String(s) => Some(Size::Length(s.chars().count() as f64)),
        Value::Array(items) => Some(Size::Length(items.len() as f64)),
        _ => None,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn is_absent(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn input(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    fn user_validator() -> Validator {
        Validator::new(&[
            ("username", "required|string|min:3|max:50"),
            ("email", "required|email"),
            ("password", "required|min:8"),
        ])
        .unwrap()
    }

    #[test]
    fn valid_input_has_no_errors() {
        let errors = user_validator().validate(&input(json!({
            "username": "alice",
            "email": "alice@example.com",
            "password": "correct horse",
        })));
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn invalid_user() {
        let errors = user_validator().validate(&input(json!({
            "username": "ab",
            "email": "not-an-email",
            "password": "x",
        })));

        assert_eq!(errors["username"], ["The username must be at least 3 characters."]);
        assert_eq!(errors["email"], ["The email must be a valid email address."]);
        assert_eq!(errors["password"], ["The password must be at least 8 characters."]);
    }

    #[test]
    fn missing_fields_are_required() {
        let errors = user_validator().validate(&input(json!({ "username": "  ", "email": null })));
        assert_eq!(errors["username"], ["The username field is required."]);
        assert_eq!(errors["email"], ["The email field is required."]);
        assert_eq!(errors["password"], ["The password field is required."]);
    }

    #[test]
    fn optional_absent_field_is_skipped() {
        let validator = Validator::new(&[("nickname", "string|min:2")]).unwrap();
        assert!(validator.validate(&Map::new()).is_empty());
    }

    #[test]
    fn max_length_counts_characters() {
        let validator = Validator::new(&[("name", "max:3")]).unwrap();
        assert!(validator.validate(&input(json!({ "name": "äöü" }))).is_empty());
        assert_eq!(
            validator.validate(&input(json!({ "name": "abcd" })))["name"],
            ["The name may not be greater than 3 characters."]
        );
    }

    #[test]
    fn numeric_bounds_compare_values() {
        let validator = Validator::new(&[("age", "required|numeric|min:18|max:130")]).unwrap();
        assert!(validator.validate(&input(json!({ "age": 30 }))).is_empty());
        assert!(validator.validate(&input(json!({ "age": "42" }))).is_empty());
        assert_eq!(validator.validate(&input(json!({ "age": 7 })))["age"], ["The age must be at least 18."]);
        assert_eq!(validator.validate(&input(json!({ "age": "old" })))["age"], ["The age must be a number."]);
    }

    #[test]
    fn type_rules() {
        let validator = Validator::new(&[("name", "string")]).unwrap();
        assert_eq!(validator.validate(&input(json!({ "name": 5 })))["name"], ["The name must be a string."]);
    }

    #[test]
    fn in_rule() {
        let validator = Validator::new(&[("role", "in:admin, editor")]).unwrap();
        assert!(validator.validate(&input(json!({ "role": "editor" }))).is_empty());
        assert_eq!(validator.validate(&input(json!({ "role": "root" })))["role"], ["The selected role is invalid."]);
    }

    #[test]
    fn rule_errors() {
        assert_eq!(
            Validator::new(&[("name", "required|unique")]).unwrap_err(),
            RuleError::UnknownRule { field: "name".into(), rule: "unique".into() }
        );
        assert!(matches!(Validator::new(&[("name", "min:abc")]), Err(RuleError::InvalidArgument { .. })));
        assert!(matches!(Validator::new(&[("name", "max")]), Err(RuleError::InvalidArgument { .. })));
        assert!(matches!(Validator::new(&[("role", "in:")]), Err(RuleError::InvalidArgument { .. })));
    }
}
