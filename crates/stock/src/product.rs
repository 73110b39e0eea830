use serde::{Deserialize, Serialize};

use stockgate_core::{DomainError, ProductId};

/// Descriptive product data supplied by the provisioning collaborator.
///
/// The reservation core only cares about `product_id`; SKU and name exist so
/// the provisioning endpoint can validate and echo them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductInfo {
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
}

impl ProductInfo {
    pub fn new(
        product_id: ProductId,
        sku: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<Self, DomainError> {
        Ok(Self {
            product_id,
            sku: normalize_sku(sku.into())?,
            name: validate_name(name.into())?,
        })
    }
}

/// Validate and normalize a SKU (uppercase, trimmed, `[A-Z0-9_-]`, max 50).
pub fn normalize_sku(sku: String) -> Result<String, DomainError> {
    let sku = sku.trim().to_uppercase();
    if sku.is_empty() {
        return Err(DomainError::validation_field(
            "SKU cannot be empty or whitespace only",
            "sku",
        ));
    }
    if sku.len() > 50 {
        return Err(DomainError::validation_field(
            "SKU cannot exceed 50 characters",
            "sku",
        ));
    }
    if !sku
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_' || c == '-')
    {
        return Err(DomainError::validation_field(
            "SKU can only contain letters, numbers, hyphens, and underscores",
            "sku",
        ));
    }
    Ok(sku)
}

/// Validate a product name (trimmed, 2..=200 chars).
pub fn validate_name(name: String) -> Result<String, DomainError> {
    let name = name.trim().to_string();
    if name.len() < 2 {
        return Err(DomainError::validation_field(
            "product name must be at least 2 characters long",
            "name",
        ));
    }
    if name.len() > 200 {
        return Err(DomainError::validation_field(
            "product name cannot exceed 200 characters",
            "name",
        ));
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sku_is_uppercased_and_trimmed() {
        assert_eq!(normalize_sku("  ab-12 ".to_string()).unwrap(), "AB-12");
    }

    #[test]
    fn sku_rejects_invalid_characters() {
        let err = normalize_sku("AB 12".to_string()).unwrap_err();
        match err {
            DomainError::Validation { field, .. } => assert_eq!(field.as_deref(), Some("sku")),
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn sku_rejects_empty() {
        assert!(normalize_sku("   ".to_string()).is_err());
    }

    #[test]
    fn name_length_bounds() {
        assert!(validate_name("a".to_string()).is_err());
        assert!(validate_name("ab".to_string()).is_ok());
        assert!(validate_name("x".repeat(201)).is_err());
    }
}
