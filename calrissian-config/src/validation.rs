//! Configuration validation traits and utilities

use crate::error::{ConfigError, ConfigResult};

/// Trait for validatable configuration
pub trait Validatable {
    /// Validate the configuration
    fn validate(&self) -> ConfigResult<()>;

    /// Get the domain name for error reporting
    fn domain_name(&self) -> &'static str;

    /// Helper to create a domain-specific validation error
    fn validation_error(&self, message: impl Into<String>) -> ConfigError {
        ConfigError::DomainError {
            domain: self.domain_name().to_string(),
            message: message.into(),
        }
    }
}

/// Validate a required string field
pub fn validate_required_string(value: &str, field_name: &str, domain: &str) -> ConfigResult<()> {
    if value.trim().is_empty() {
        return Err(ConfigError::DomainError {
            domain: domain.to_string(),
            message: format!("{} cannot be empty", field_name),
        });
    }
    Ok(())
}

/// Validate a positive number
pub fn validate_positive<T>(value: T, field_name: &str, domain: &str) -> ConfigResult<()>
where
    T: PartialOrd + Default + std::fmt::Display,
{
    if value <= T::default() {
        return Err(ConfigError::DomainError {
            domain: domain.to_string(),
            message: format!("{} must be greater than 0, got {}", field_name, value),
        });
    }
    Ok(())
}

/// Validate that a value is one of the allowed choices
pub fn validate_enum_choice(
    value: &str,
    choices: &[&str],
    field_name: &str,
    domain: &str,
) -> ConfigResult<()> {
    if !choices.contains(&value) {
        return Err(ConfigError::DomainError {
            domain: domain.to_string(),
            message: format!(
                "{} must be one of [{}], got '{}'",
                field_name,
                choices.join(", "),
                value
            ),
        });
    }
    Ok(())
}

/// Validate a Kubernetes quantity such as `10Gi`, `512M`, `1500m` or `2`
pub fn validate_quantity(value: &str, field_name: &str, domain: &str) -> ConfigResult<()> {
    validate_required_string(value, field_name, domain)?;

    let split = value
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(value.len());
    let (number, suffix) = value.split_at(split);

    let valid_suffixes = [
        "", "m", "k", "K", "M", "G", "T", "P", "E", "Ki", "Mi", "Gi", "Ti", "Pi", "Ei",
    ];

    if number.is_empty() || number.parse::<f64>().is_err() || !valid_suffixes.contains(&suffix) {
        return Err(ConfigError::DomainError {
            domain: domain.to_string(),
            message: format!("{} is not a valid quantity: '{}'", field_name, value),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_quantity() {
        for ok in ["10Gi", "512M", "1500m", "2", "0.5", "100Mi"] {
            assert!(validate_quantity(ok, "size", "test").is_ok(), "{}", ok);
        }
        for bad in ["", "Gi", "10GB", "ten"] {
            assert!(validate_quantity(bad, "size", "test").is_err(), "{}", bad);
        }
    }

    #[test]
    fn test_validate_positive() {
        assert!(validate_positive(1u32, "attempts", "test").is_ok());
        assert!(validate_positive(0u32, "attempts", "test").is_err());
    }
}
