//! Validation utilities for the apparel ledger
//!
//! Checks return a static message; callers attach the field name when
//! turning a failure into a [`LedgerError`].

use std::collections::HashSet;

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};

/// Smallest quantity a production order may produce
pub fn min_production_quantity() -> Decimal {
    Decimal::new(1, 2)
}

/// Longest accepted name for materials, products, contractors and categories
pub const MAX_NAME_LEN: usize = 120;

// ============================================================================
// Quantity and Money Validations
// ============================================================================

/// Validate a stock quantity moved in or out of the ledger
pub fn validate_positive_quantity(quantity: Decimal) -> Result<(), &'static str> {
    if quantity <= Decimal::ZERO {
        return Err("Quantity must be greater than zero");
    }
    Ok(())
}

pub fn validate_non_negative(value: Decimal) -> Result<(), &'static str> {
    if value < Decimal::ZERO {
        return Err("Value cannot be negative");
    }
    Ok(())
}

/// Validate a production order quantity (at least 0.01)
pub fn validate_production_quantity(quantity: Decimal) -> Result<(), &'static str> {
    if quantity < min_production_quantity() {
        return Err("Production quantity must be at least 0.01");
    }
    Ok(())
}

/// Attach a field name to a validation failure
pub fn check_field(field: &str, result: Result<(), &'static str>) -> LedgerResult<()> {
    result.map_err(|message| LedgerError::validation(field, message))
}

// ============================================================================
// General Validations
// ============================================================================

/// Validate a display name (non-blank, bounded length)
pub fn validate_name(name: &str) -> Result<(), &'static str> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err("Name is required");
    }
    if trimmed.chars().count() > MAX_NAME_LEN {
        return Err("Name must be at most 120 characters");
    }
    Ok(())
}

/// Reject a list that names the same variant twice
pub fn validate_unique_variants<I>(variant_ids: I) -> Result<(), &'static str>
where
    I: IntoIterator<Item = Uuid>,
{
    let mut seen = HashSet::new();
    for id in variant_ids {
        if !seen.insert(id) {
            return Err("The same variant appears more than once");
        }
    }
    Ok(())
}

// ============================================================================
// Brazil-Specific Validations
// ============================================================================

/// Validate a Brazilian phone number
/// Accepts: (11) 91234-5678, 11912345678, +55 11 91234-5678, landlines with 10 digits
pub fn validate_br_phone(phone: &str) -> Result<(), &'static str> {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    let national = digits.strip_prefix("55").filter(|rest| rest.len() >= 10).unwrap_or(&digits);

    match national.len() {
        10 => Ok(()),
        11 if national.as_bytes()[2] == b'9' => Ok(()),
        _ => Err("Invalid Brazilian phone number format"),
    }
}
