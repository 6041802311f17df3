//! Field-level validation for incident creation.
//!
//! Shared by single-record creation and bulk ingestion so both apply the same
//! contract. The store itself only ever receives the sanitized `NewIncident`.

use crate::error::ValidationError;
use crate::types::{NewIncident, RawIncident};

pub const DEFAULT_CATEGORIES: &[&str] = &["IT", "SECURITY", "FACILITIES", "NETWORK", "OTHER"];
pub const DEFAULT_SEVERITIES: &[&str] = &["LOW", "MEDIUM", "HIGH", "CRITICAL"];

/// Limits and legal enumerations. Counts are in characters, after trimming.
#[derive(Debug, Clone)]
pub struct ValidationRules {
  pub categories: Vec<String>,
  pub severities: Vec<String>,
  pub title_max: usize,
  pub description_max: usize,
}

impl Default for ValidationRules {
  fn default() -> Self {
    Self {
      categories: DEFAULT_CATEGORIES.iter().map(|s| s.to_string()).collect(),
      severities: DEFAULT_SEVERITIES.iter().map(|s| s.to_string()).collect(),
      title_max: 200,
      description_max: 2000,
    }
  }
}

impl ValidationRules {
  /// Check every field and collect all failures, not just the first.
  pub fn validate_create(&self, raw: &RawIncident) -> Result<NewIncident, Vec<ValidationError>> {
    let mut errors = Vec::new();

    let title = clean(raw.title.as_deref());
    if title.is_empty() {
      errors.push(ValidationError::new("title", "required"));
    } else if title.chars().count() > self.title_max {
      errors.push(ValidationError::new(
        "title",
        &format!("must be at most {} characters", self.title_max),
      ));
    }

    let description = clean(raw.description.as_deref());
    if description.chars().count() > self.description_max {
      errors.push(ValidationError::new(
        "description",
        &format!("must be at most {} characters", self.description_max),
      ));
    }

    let category = pick("category", raw.category.as_deref(), &self.categories, &mut errors);
    let severity = pick("severity", raw.severity.as_deref(), &self.severities, &mut errors);

    if !errors.is_empty() {
      return Err(errors);
    }

    Ok(NewIncident {
      title,
      description,
      category,
      severity,
    })
  }
}

/// Drop control characters other than newline / tab, then trim.
fn clean(value: Option<&str>) -> String {
  let kept: String = value
    .unwrap_or_default()
    .chars()
    .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
    .collect();
  kept.trim().to_string()
}

fn pick(field: &str, value: Option<&str>, legal: &[String], errors: &mut Vec<ValidationError>) -> String {
  let v = value.unwrap_or_default().trim().to_ascii_uppercase();
  if v.is_empty() {
    errors.push(ValidationError::new(field, "required"));
  } else if !legal.iter().any(|l| l.eq_ignore_ascii_case(&v)) {
    errors.push(ValidationError::new(
      field,
      &format!("expected one of {}", legal.join("|")),
    ));
  }
  v
}

#[cfg(test)]
mod tests {
  use super::*;

  fn raw(title: &str, category: &str, severity: &str) -> RawIncident {
    RawIncident {
      title: Some(title.into()),
      description: Some("  printer on fire \u{7} ".into()),
      category: Some(category.into()),
      severity: Some(severity.into()),
    }
  }

  #[test]
  fn valid_input_is_sanitized() {
    let rules = ValidationRules::default();
    let value = rules.validate_create(&raw("  Printer down ", "it", "High")).unwrap();
    assert_eq!(value.title, "Printer down");
    assert_eq!(value.description, "printer on fire");
    assert_eq!(value.category, "IT");
    assert_eq!(value.severity, "HIGH");
  }

  #[test]
  fn missing_title_is_rejected() {
    let rules = ValidationRules::default();
    let mut r = raw("x", "IT", "LOW");
    r.title = None;
    let errors = rules.validate_create(&r).unwrap_err();
    assert_eq!(errors, vec![ValidationError::new("title", "required")]);
  }

  #[test]
  fn all_errors_are_collected() {
    let rules = ValidationRules::default();
    let errors = rules.validate_create(&raw("   ", "CAFETERIA", "")).unwrap_err();
    let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
    assert_eq!(fields, vec!["title", "category", "severity"]);
  }

  #[test]
  fn over_long_title_is_rejected() {
    let rules = ValidationRules {
      title_max: 5,
      ..ValidationRules::default()
    };
    let errors = rules.validate_create(&raw("abcdef", "IT", "LOW")).unwrap_err();
    assert_eq!(errors[0].field, "title");
    assert!(rules.validate_create(&raw("abcde", "IT", "LOW")).is_ok());
  }

  #[test]
  fn description_is_optional() {
    let rules = ValidationRules::default();
    let mut r = raw("t", "OTHER", "MEDIUM");
    r.description = None;
    assert_eq!(rules.validate_create(&r).unwrap().description, "");
  }
}
