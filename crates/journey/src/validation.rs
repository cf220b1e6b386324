//! Validation errors attached to a waypoint after its data has been checked.
//!
//! Errors are data, not exceptions: the context stores them per waypoint and
//! traversal only cares whether a waypoint currently has none.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Prefix of the anchor a field's error links to.
const FIELD_HREF_PREFIX: &str = "#f-";

/// A single validation failure, ready for rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationError {
    pub summary: String,
    pub inline: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_href: Option<String>,
    #[serde(default)]
    pub focus_suffix: Vec<String>,
    #[serde(default)]
    pub variables: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validator: Option<String>,
}

/// Plain description of an error, before it is bound to a field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationErrorSpec {
    pub summary: String,
    #[serde(default)]
    pub inline: Option<String>,
    #[serde(default)]
    pub focus_suffix: Vec<String>,
    #[serde(default)]
    pub variables: Map<String, Value>,
}

/// Where an error was raised: which waypoint, field and validator, and the
/// value under test.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataContext {
    pub waypoint: Option<String>,
    pub field: Option<String>,
    pub field_value: Option<Value>,
    pub validator: Option<String>,
}

impl DataContext {
    pub fn for_field(waypoint: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            waypoint: Some(waypoint.into()),
            field: Some(field.into()),
            ..Default::default()
        }
    }

    pub fn with_validator(mut self, validator: impl Into<String>) -> Self {
        self.validator = Some(validator.into());
        self
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.field_value = Some(value);
        self
    }
}

impl ValidationError {
    /// Error with the same text for summary and inline message.
    pub fn new(summary: impl Into<String>) -> Self {
        Self::from_spec(ValidationErrorSpec {
            summary: summary.into(),
            ..Default::default()
        })
    }

    pub fn from_spec(spec: ValidationErrorSpec) -> Self {
        let inline = spec.inline.unwrap_or_else(|| spec.summary.clone());
        Self {
            summary: spec.summary,
            inline,
            field: None,
            field_href: None,
            focus_suffix: spec.focus_suffix,
            variables: spec.variables,
            validator: None,
        }
    }

    /// Builds the message from the data context, then binds the context.
    pub fn from_fn<F>(make: F, data_context: &DataContext) -> Self
    where
        F: FnOnce(&DataContext) -> ValidationErrorSpec,
    {
        Self::from_spec(make(data_context)).with_context(data_context)
    }

    pub fn from_error(error: &dyn std::error::Error) -> Self {
        Self::new(error.to_string())
    }

    /// Binds field and validator names after the fact. The message is kept
    /// as-is; only the fields the context carries are overwritten.
    pub fn with_context(mut self, data_context: &DataContext) -> Self {
        if let Some(field) = &data_context.field {
            let suffix = self.focus_suffix.first().map(String::as_str).unwrap_or("");
            self.field_href = Some(format!("{FIELD_HREF_PREFIX}{field}{suffix}"));
            self.field = Some(field.clone());
        }
        if let Some(validator) = &data_context.validator {
            self.validator = Some(validator.clone());
        }
        self
    }
}

impl From<&str> for ValidationError {
    fn from(summary: &str) -> Self {
        Self::new(summary)
    }
}

impl From<String> for ValidationError {
    fn from(summary: String) -> Self {
        Self::new(summary)
    }
}

impl From<ValidationErrorSpec> for ValidationError {
    fn from(spec: ValidationErrorSpec) -> Self {
        Self::from_spec(spec)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_string() {
        let err = ValidationError::new("Enter your name");
        assert_eq!(err.summary, "Enter your name");
        assert_eq!(err.inline, "Enter your name");
        assert!(err.field.is_none());
        assert!(err.focus_suffix.is_empty());
    }

    #[test]
    fn test_from_spec_keeps_inline() {
        let err = ValidationError::from_spec(ValidationErrorSpec {
            summary: "Date of birth must be in the past".into(),
            inline: Some("Must be in the past".into()),
            focus_suffix: vec!["[dd]".into()],
            variables: Map::new(),
        });
        assert_eq!(err.inline, "Must be in the past");
        assert_eq!(err.focus_suffix, vec!["[dd]".to_string()]);
    }

    #[test]
    fn test_from_fn_binds_context() {
        let ctx = DataContext::for_field("contact", "email")
            .with_validator("email")
            .with_value(json!("nope"));
        let err = ValidationError::from_fn(
            |dc| ValidationErrorSpec {
                summary: format!("{} is not valid", dc.field.as_deref().unwrap_or("value")),
                ..Default::default()
            },
            &ctx,
        );
        assert_eq!(err.summary, "email is not valid");
        assert_eq!(err.field.as_deref(), Some("email"));
        assert_eq!(err.field_href.as_deref(), Some("#f-email"));
        assert_eq!(err.validator.as_deref(), Some("email"));
    }

    #[test]
    fn test_from_error() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "lookup failed");
        let err = ValidationError::from_error(&io);
        assert_eq!(err.summary, "lookup failed");
    }

    #[test]
    fn test_with_context_uses_focus_suffix() {
        let err = ValidationError::from_spec(ValidationErrorSpec {
            summary: "Enter a date".into(),
            focus_suffix: vec!["[dd]".into(), "[mm]".into()],
            ..Default::default()
        })
        .with_context(&DataContext::for_field("dob", "dateOfBirth"));
        assert_eq!(err.field_href.as_deref(), Some("#f-dateOfBirth[dd]"));
        assert_eq!(err.summary, "Enter a date");
    }

    #[test]
    fn test_wire_shape() {
        let err = ValidationError::new("Required")
            .with_context(&DataContext::for_field("name", "firstName"));
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value["fieldHref"], json!("#f-firstName"));
        assert_eq!(value["focusSuffix"], json!([]));
        let back: ValidationError = serde_json::from_value(value).unwrap();
        assert_eq!(back, err);
    }
}
