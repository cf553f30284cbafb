//! Domain error type shared by every ledger operation

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

/// Failures raised by the ledger core
///
/// Any of these aborts the enclosing unit of work. Nothing is retried here.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    #[error("Insufficient stock of {material_name}: requested {requested}, available {available}")]
    InsufficientStock {
        material_id: Uuid,
        material_name: String,
        requested: Decimal,
        available: Decimal,
    },

    #[error("Validation error on {field}: {message}")]
    Validation { field: String, message: String },

    #[error("{0} not found")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl LedgerError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        LedgerError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Quantity missing to satisfy an issue, for stock errors only
    pub fn shortfall(&self) -> Option<Decimal> {
        match self {
            LedgerError::InsufficientStock {
                requested,
                available,
                ..
            } => Some(*requested - *available),
            _ => None,
        }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shortfall_reports_missing_quantity() {
        let err = LedgerError::InsufficientStock {
            material_id: Uuid::nil(),
            material_name: "Malha PV".to_string(),
            requested: Decimal::new(125, 1),
            available: Decimal::new(100, 1),
        };
        assert_eq!(err.shortfall(), Some(Decimal::new(25, 1)));
        assert!(err.to_string().contains("Malha PV"));
    }

    #[test]
    fn test_shortfall_absent_for_other_kinds() {
        assert_eq!(LedgerError::validation("quantity", "bad").shortfall(), None);
        assert_eq!(LedgerError::NotFound("Material".into()).shortfall(), None);
    }
}
