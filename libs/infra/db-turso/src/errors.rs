// [libs/infra/db-turso/src/errors.rs]
/*!
 * =================================================================
 * APARATO: DATABASE ERROR CATALOG (V2.1 - CONSTRAINT AWARE)
 * CLASIFICACIÓN: INFRASTRUCTURE CORE (ESTRATO L3)
 * RESPONSABILIDAD: CATALOGACIÓN SEMÁNTICA DE FALLOS DE PERSISTENCIA
 * =================================================================
 */

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    /// Error de enlace físico o de red con el motor libSQL.
    #[error("[L3_DB_NET_FAULT]: DATABASE_UPLINK_SEVERED -> {0}")]
    ConnectionError(String),

    /// Error de sintaxis o ejecución devuelto por el motor libSQL.
    #[error("[L3_DB_QUERY_FAULT]: SQL_QUERY_REJECTED -> {0}")]
    QueryError(#[from] libsql::Error),

    /// Fallo en la transformación de tipos entre SQLite y el Dominio Rust.
    #[error("[L3_DB_MAPPING_FAULT]: DATA_MAPPING_VIOLATION -> {0}")]
    MappingError(String),

    /// Violación de índice único (serial duplicado, membresía duplicada,
    /// clave de dedupe en colisión). El estrato API la traduce a CONFLICT.
    #[error("[L3_DB_CONSTRAINT_FAULT]: UNIQUE_VIOLATION -> {0}")]
    UniqueViolation(String),

    /// La entidad direccionada no existe o quedó fuera del filtro de tenant.
    #[error("[L3_DB_FAULT]: ENTITY_NOT_FOUND")]
    NotFound,

    /// La entidad no se encuentra en un estado apto para la transición.
    #[error("[L3_DB_FAULT]: INVALID_STATE_TRANSITION")]
    InvalidState,
}

impl DbError {
    /**
     * Clasifica un fallo de ejecución del motor: las colisiones de índice
     * único se separan del resto para que los llamadores puedan tratarlas
     * (CONFLICT en la API, no-op benigno en el evaluador de alertas).
     */
    pub fn from_engine(engine_fault: libsql::Error) -> Self {
        let message = engine_fault.to_string();
        if message.contains("UNIQUE constraint failed") {
            Self::UniqueViolation(message)
        } else {
            Self::QueryError(engine_fault)
        }
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation(_))
    }
}
