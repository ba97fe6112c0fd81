//! Error types for configuration loading and validation

use std::path::PathBuf;

use thiserror::Error;
use validator::{ValidationError, ValidationErrors, ValidationErrorsKind};

#[derive(Debug, Error)]
pub enum ConfigError {
    /// An explicitly requested file is missing. The layered lookup skips
    /// absent files instead.
    #[error("shmpoll configuration file {} does not exist", .0.display())]
    FileNotFound(PathBuf),

    /// One or more values out of range, reported by dotted path.
    #[error("rejected configuration values:\n  {}", violations(.0).join("\n  "))]
    Validation(#[source] ValidationErrors),

    #[error("Configuration parsing error: {0}")]
    Parsing(#[from] Box<figment::Error>),
}

impl ConfigError {
    /// `section.field: code [params]` for every rejected value, sorted.
    pub fn violations(&self) -> Vec<String> {
        match self {
            ConfigError::Validation(errors) => violations(errors),
            _ => Vec::new(),
        }
    }
}

fn violations(errors: &ValidationErrors) -> Vec<String> {
    let mut found = Vec::new();
    collect("", errors, &mut found);
    found.sort();
    found
}

// Nested sections only show up through `errors()`, not `field_errors()`.
fn collect(prefix: &str, errors: &ValidationErrors, found: &mut Vec<String>) {
    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{prefix}.{field}")
        };
        match kind {
            ValidationErrorsKind::Struct(nested) => collect(&path, nested, found),
            ValidationErrorsKind::List(items) => {
                for (index, nested) in items {
                    collect(&format!("{path}[{index}]"), nested, found);
                }
            }
            ValidationErrorsKind::Field(field_errors) => {
                found.extend(field_errors.iter().map(|error| format!("{path}: {}", describe(error))));
            }
        }
    }
}

fn describe(error: &ValidationError) -> String {
    let reason = error.message.as_deref().unwrap_or(error.code.as_ref());
    let mut params: Vec<String> = error
        .params
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect();
    if params.is_empty() {
        return reason.to_string();
    }
    params.sort();
    format!("{reason} [{}]", params.join(", "))
}

impl From<ValidationErrors> for ConfigError {
    fn from(errors: ValidationErrors) -> Self {
        ConfigError::Validation(errors)
    }
}

impl From<figment::Error> for ConfigError {
    fn from(error: figment::Error) -> Self {
        ConfigError::Parsing(Box::new(error))
    }
}
