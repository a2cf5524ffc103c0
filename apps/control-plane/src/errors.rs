// [apps/control-plane/src/errors.rs]
/*!
 * =================================================================
 * APARATO: API ERROR ENVELOPE (V3.0 - TAXONOMY SEALED)
 * CLASIFICACIÓN: API BOUNDARY (ESTRATO L4)
 * RESPONSABILIDAD: TAXONOMÍA TIPADA Y SOBRE DE ERROR BIT-EXACTO
 *
 * # Logic:
 * Los manejadores de dominio señalan errores tipados; la frontera los
 * traduce al sobre {"error":{"code","message","details"?}} con el
 * status HTTP derivado del código. Los fallos de auditoría jamás
 * llegan aquí: se tragan aguas arriba.
 * =================================================================
 */

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use helios_infra_db::DbError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum ApiError {
    /// Esquema inválido, bbox malformado, device-id en disonancia.
    #[error("{message}")]
    Validation { message: String, details: Option<serde_json::Value> },

    /// Token de usuario o de dispositivo ausente/ilegible/expirado.
    #[error("{0}")]
    Unauthorized(String),

    /// Sin membresía en el tenant activo, rol fuera del conjunto, o
    /// identidad de dispositivo en disonancia con la ruta.
    #[error("{0}")]
    Forbidden(String),

    /// Entitlement resuelto en falso para la operación compuerta.
    #[error("{0}")]
    FeatureDisabled(String),

    /// Entidad ausente o excluida por el filtro de tenant.
    #[error("resource not found")]
    NotFound,

    /// Violación de unicidad emergida del almacén.
    #[error("{0}")]
    Conflict(String),

    /// Todo lo demás; se registra y se responde opaco.
    #[error("internal error")]
    Internal(String),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into(), details: None }
    }

    pub fn validation_with(message: impl Into<String>, details: serde_json::Value) -> Self {
        Self::Validation { message: message.into(), details: Some(details) }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::FeatureDisabled(_) => "FEATURE_DISABLED",
            Self::NotFound => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn http_status(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) | Self::FeatureDisabled(_) => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DbError> for ApiError {
    fn from(fault: DbError) -> Self {
        match fault {
            DbError::NotFound => Self::NotFound,
            DbError::UniqueViolation(detail) => Self::Conflict(detail),
            DbError::InvalidState => {
                Self::Conflict("entity not in a valid state for this transition".into())
            }
            other => {
                error!("💥 [API_BOUNDARY]: Persistence stratum fault: {}", other);
                Self::Internal(other.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Internal(detail) = &self {
            error!("💥 [API_BOUNDARY]: Responding 500: {}", detail);
        }

        let mut error_body = json!({
            "code": self.code(),
            "message": self.to_string(),
        });
        if let Self::Validation { details: Some(details), .. } = &self {
            error_body["details"] = details.clone();
        }

        (self.http_status(), Json(json!({ "error": error_body }))).into_response()
    }
}
