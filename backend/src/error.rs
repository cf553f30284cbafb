//! Error handling for the apparel ledger backend
//!
//! Provides consistent error details in English and Brazilian Portuguese

use serde::Serialize;
use shared::LedgerError;
use thiserror::Error;
use uuid::Uuid;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation error: {message}")]
    Validation {
        field: String,
        message: String,
        message_pt: String,
    },

    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    // Ledger errors
    #[error("Insufficient stock of {material_name}: requested {requested}, available {available}")]
    InsufficientStock {
        material_id: Uuid,
        material_name: String,
        requested: rust_decimal::Decimal,
        available: rust_decimal::Decimal,
    },

    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

/// Error payload handed to the presentation layer
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message_en: String,
    pub message_pt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl AppError {
    pub fn validation(field: &str, message: &str, message_pt: &str) -> Self {
        AppError::Validation {
            field: field.to_string(),
            message: message.to_string(),
            message_pt: message_pt.to_string(),
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation { .. } => "VALIDATION_ERROR",
            AppError::DuplicateEntry(_) => "DUPLICATE_ENTRY",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            AppError::InvalidStateTransition(_) => "INVALID_STATE_TRANSITION",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            AppError::MigrationError(_) => "MIGRATION_ERROR",
            AppError::Internal(_) | AppError::InternalError(_) => "INTERNAL_ERROR",
        }
    }

    /// True for errors caused by the caller's input rather than the system
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AppError::Validation { .. }
                | AppError::DuplicateEntry(_)
                | AppError::NotFound(_)
                | AppError::InsufficientStock { .. }
                | AppError::InvalidStateTransition(_)
        )
    }

    pub fn detail(&self) -> ErrorDetail {
        let code = self.code().to_string();
        match self {
            AppError::Validation {
                field,
                message,
                message_pt,
            } => ErrorDetail {
                code,
                message_en: message.clone(),
                message_pt: message_pt.clone(),
                field: Some(field.clone()),
            },
            AppError::DuplicateEntry(field) => ErrorDetail {
                code,
                message_en: format!("A record with this {} already exists", field),
                message_pt: format!("Já existe um registro com este {}", field),
                field: Some(field.clone()),
            },
            AppError::NotFound(resource) => ErrorDetail {
                code,
                message_en: format!("{} not found", resource),
                message_pt: format!("{} não encontrado", resource),
                field: None,
            },
            AppError::InsufficientStock {
                material_name,
                requested,
                available,
                ..
            } => ErrorDetail {
                code,
                message_en: format!(
                    "Insufficient stock of {}: missing {} (requested {}, available {})",
                    material_name,
                    requested - available,
                    requested,
                    available
                ),
                message_pt: format!(
                    "Estoque insuficiente de {}: faltam {} (solicitado {}, disponível {})",
                    material_name,
                    requested - available,
                    requested,
                    available
                ),
                field: None,
            },
            AppError::InvalidStateTransition(msg) => ErrorDetail {
                code,
                message_en: msg.clone(),
                message_pt: format!("Não é possível alterar o status: {}", msg),
                field: None,
            },
            AppError::Configuration(msg) => ErrorDetail {
                code,
                message_en: format!("Configuration error: {}", msg),
                message_pt: format!("Erro de configuração: {}", msg),
                field: None,
            },
            AppError::DatabaseError(_) | AppError::MigrationError(_) => ErrorDetail {
                code,
                message_en: "A database error occurred".to_string(),
                message_pt: "Ocorreu um erro no banco de dados".to_string(),
                field: None,
            },
            AppError::Internal(msg) => ErrorDetail {
                code,
                message_en: msg.clone(),
                message_pt: "Erro interno do servidor".to_string(),
                field: None,
            },
            AppError::InternalError(_) => ErrorDetail {
                code,
                message_en: "An internal server error occurred".to_string(),
                message_pt: "Erro interno do servidor".to_string(),
                field: None,
            },
        }
    }

    pub fn to_response(&self) -> ErrorResponse {
        if !self.is_client_error() {
            tracing::error!("Error: {:?}", self);
        }
        ErrorResponse {
            error: self.detail(),
        }
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientStock {
                material_id,
                material_name,
                requested,
                available,
            } => AppError::InsufficientStock {
                material_id,
                material_name,
                requested,
                available,
            },
            LedgerError::Validation { field, message } => AppError::Validation {
                message_pt: format!("Dados inválidos em {}: {}", field, message),
                field,
                message,
            },
            LedgerError::NotFound(resource) => AppError::NotFound(resource),
            LedgerError::InvalidState(msg) => AppError::InvalidStateTransition(msg),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let first = errors
            .field_errors()
            .into_iter()
            .next()
            .map(|(field, errs)| {
                let message = errs
                    .first()
                    .and_then(|e| e.message.as_ref().map(|m| m.to_string()))
                    .unwrap_or_else(|| "Invalid value".to_string());
                (field.to_string(), message)
            });
        match first {
            Some((field, message)) => AppError::Validation {
                message_pt: format!("Dados inválidos em {}: {}", field, message),
                field,
                message,
            },
            None => AppError::validation("input", "Invalid input", "Dados inválidos"),
        }
    }
}

/// Map a unique-constraint violation to `DuplicateEntry(field)`
pub(crate) fn duplicate_as(field: &str) -> impl FnOnce(sqlx::Error) -> AppError + '_ {
    move |err| match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::DuplicateEntry(field.to_string())
        }
        _ => AppError::DatabaseError(err),
    }
}

/// Result type alias for services
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_insufficient_stock_reports_shortfall() {
        let err: AppError = LedgerError::InsufficientStock {
            material_id: Uuid::nil(),
            material_name: "Malha PV".to_string(),
            requested: Decimal::new(125, 1),
            available: Decimal::new(100, 1),
        }
        .into();

        let detail = err.detail();
        assert_eq!(detail.code, "INSUFFICIENT_STOCK");
        assert!(detail.message_en.contains("missing 2.5"));
        assert!(detail.message_pt.contains("faltam 2.5"));
    }

    #[test]
    fn test_ledger_validation_keeps_field() {
        let err: AppError = LedgerError::validation("planned_qty", "Value cannot be negative").into();
        let detail = err.detail();
        assert_eq!(detail.field.as_deref(), Some("planned_qty"));
        assert!(err.is_client_error());
    }

    #[test]
    fn test_invalid_state_maps_to_transition_error() {
        let err: AppError = LedgerError::InvalidState("Shipment R1 is cancelled".into()).into();
        assert_eq!(err.code(), "INVALID_STATE_TRANSITION");
    }

    #[test]
    fn test_response_payload_shape() {
        let err = AppError::NotFound("Shipment".into());
        let body = serde_json::to_value(err.to_response()).unwrap();
        assert_eq!(body["error"]["code"], "NOT_FOUND");
        assert!(body["error"].get("field").is_none());
    }

    #[test]
    fn test_internal_errors_are_not_client_errors() {
        assert!(!AppError::Internal("boom".into()).is_client_error());
    }
}
