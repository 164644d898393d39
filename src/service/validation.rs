//! Field validation from per-model rules.

use crate::config::{FieldSpec, SchemaModel};
use crate::error::AppError;
use serde_json::Value;

pub struct RequestValidator;

impl RequestValidator {
    /// Every required field of `model` must be set to a non-null value.
    pub fn check_required(model: &SchemaModel, is_present: impl Fn(&str) -> bool) -> Result<(), AppError> {
        match model.fields.iter().find(|f| f.required && !is_present(&f.name)) {
            Some(field) => Err(AppError::Validation(format!("{} is required", field.name))),
            None => Ok(()),
        }
    }

    /// Check one scalar value against the field's rule. Null passes; requiredness is checked
    /// separately.
    pub fn check_field(field: &FieldSpec, v: &Value) -> Result<(), AppError> {
        let (name, rule) = (field.name.as_str(), &field.rule);
        if v.is_null() {
            return Ok(());
        }
        if let Some(format) = &rule.format {
            check_format(name, v, format)?;
        }
        if let Some(s) = v.as_str() {
            let len = s.chars().count();
            if let Some(max) = rule.max_length.filter(|m| len > *m as usize) {
                return Err(AppError::Validation(format!("{} must be at most {} characters", name, max)));
            }
            if let Some(min) = rule.min_length.filter(|m| len < *m as usize) {
                return Err(AppError::Validation(format!("{} must be at least {} characters", name, min)));
            }
            if let Some(re) = &field.pattern {
                if !re.is_match(s) {
                    return Err(AppError::Validation(format!("{} does not match required pattern", name)));
                }
            }
        }
        if let Some(allowed) = &rule.allowed {
            if !allowed.iter().any(|a| loosely_equal(v, a)) {
                return Err(AppError::Validation(format!(
                    "{} must be one of: {:?}",
                    name,
                    allowed.iter().take(5).collect::<Vec<_>>()
                )));
            }
        }
        if let Some(n) = v.as_f64() {
            if let Some(min) = rule.minimum.filter(|m| n < *m) {
                return Err(AppError::Validation(format!("{} must be at least {}", name, min)));
            }
            if let Some(max) = rule.maximum.filter(|m| n > *m) {
                return Err(AppError::Validation(format!("{} must be at most {}", name, max)));
            }
        }
        Ok(())
    }
}

fn loosely_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(n), Value::Number(m)) => n.as_f64() == m.as_f64(),
        _ => a == b,
    }
}

fn check_format(name: &str, v: &Value, format: &str) -> Result<(), AppError> {
    let Some(s) = v.as_str() else {
        return Ok(());
    };
    let ok = match format.to_lowercase().as_str() {
        "email" => s.len() >= 3 && s.contains('@'),
        "uuid" => uuid::Uuid::parse_str(s).is_ok(),
        _ => true,
    };
    if ok {
        Ok(())
    } else {
        Err(AppError::Validation(format!("{} must be a valid {}", name, format)))
    }
}
