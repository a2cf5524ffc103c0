// [libs/infra/db-turso/src/repositories/mod.rs]
/*!
 * =================================================================
 * APARATO: REPOSITORY ACCESS MATRIX (V3.1 - TENANT SHIELD)
 * CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
 * RESPONSABILIDAD: ORQUESTACIÓN DE SUBSISTEMAS DE PERSISTENCIA
 *
 * # Logic:
 * Cada repositorio es la autoridad única de su agregado. Toda lectura
 * con alcance de tenant filtra por el tenant activo del llamador; esa
 * disciplina es el invariante que sostiene el aislamiento multi-tenant.
 * =================================================================
 */

// --- ESTRATO 1: IDENTIDAD Y ORGANIZACIÓN ---

/// Organizaciones arrendatarias y sus ajustes.
pub mod tenant;
/// Principales humanos, credenciales y membresías.
pub mod user;
/// Ubicaciones físicas y reconciliación geográfica.
pub mod site;

// --- ESTRATO 2: FLOTA Y TELEMETRÍA ---

/// Unidades gestionadas, secretos MAC y filtros de inventario.
pub mod device;
/// Ingesta transaccional de lecturas y derivación del gemelo.
pub mod telemetry;
/// Cola de instrucciones por dispositivo (máquina de estados).
pub mod command;

// --- ESTRATO 3: POLÍTICA Y DESPLIEGUE ---

/// Reglas de alerta y eventos con clave de dedupe única.
pub mod alert;
/// Catálogo de firmware y trabajos OTA.
pub mod ota;
/// Canales y eventos de notificación (patrón outbox).
pub mod notification;
/// Banderas de funcionalidad con precedencia device > tenant.
pub mod entitlement;

// --- ESTRATO 4: ANALÍTICA Y RASTRO ---

/// Agregados diarios por dispositivo.
pub mod rollup;
/// Registro solo-anexo de transiciones significativas.
pub mod audit;
/// Observaciones climáticas por sitio.
pub mod weather;

// --- RE-EXPORTACIONES SOBERANAS (NOMINAL ACCESS API) ---

pub use alert::AlertRepository;
pub use audit::AuditRepository;
pub use command::CommandRepository;
pub use device::DeviceRepository;
pub use entitlement::EntitlementRepository;
pub use notification::NotificationRepository;
pub use ota::OtaRepository;
pub use rollup::RollupRepository;
pub use site::SiteRepository;
pub use telemetry::TelemetryRepository;
pub use tenant::TenantRepository;
pub use user::UserRepository;
pub use weather::WeatherRepository;

// --- CAJA DE HERRAMIENTAS DE MAPEO (FILA -> DOMINIO) ---

pub(crate) mod mappers {
    use crate::errors::DbError;
    use chrono::{DateTime, NaiveDate, Utc};
    use libsql::Row;

    /// Interpreta una marca temporal RFC3339 persistida como TEXT.
    pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, DbError> {
        DateTime::parse_from_rfc3339(raw)
            .map(|parsed| parsed.with_timezone(&Utc))
            .map_err(|fault| DbError::MappingError(format!("TIMESTAMP_DRIFT [{raw}]: {fault}")))
    }

    pub fn get_timestamp(row: &Row, index: i32) -> Result<DateTime<Utc>, DbError> {
        let raw: String = row.get(index)?;
        parse_timestamp(&raw)
    }

    pub fn get_opt_timestamp(row: &Row, index: i32) -> Result<Option<DateTime<Utc>>, DbError> {
        match row.get::<Option<String>>(index)? {
            Some(raw) => parse_timestamp(&raw).map(Some),
            None => Ok(None),
        }
    }

    pub fn get_date(row: &Row, index: i32) -> Result<NaiveDate, DbError> {
        let raw: String = row.get(index)?;
        NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
            .map_err(|fault| DbError::MappingError(format!("DATE_DRIFT [{raw}]: {fault}")))
    }

    pub fn get_json(row: &Row, index: i32) -> Result<serde_json::Value, DbError> {
        let raw: String = row.get(index)?;
        serde_json::from_str(&raw)
            .map_err(|fault| DbError::MappingError(format!("JSON_DRIFT: {fault}")))
    }

    pub fn get_bool(row: &Row, index: i32) -> Result<bool, DbError> {
        Ok(row.get::<i64>(index)? != 0)
    }

    /// Decodifica un discriminante TEXT hacia su enum de dominio.
    pub fn decode_enum<T>(
        raw: &str,
        parser: impl Fn(&str) -> Option<T>,
        enum_label: &str,
    ) -> Result<T, DbError> {
        parser(raw).ok_or_else(|| {
            DbError::MappingError(format!("ENUM_DRIFT [{enum_label}]: '{raw}' unrecognized"))
        })
    }
}
