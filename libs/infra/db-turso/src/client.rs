// [libs/infra/db-turso/src/client.rs]
/*!
 * =================================================================
 * APARATO: FLEET LEDGER CLIENT (V3.1 - BACKEND CLASSIFIER)
 * CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
 * RESPONSABILIDAD: CLASIFICACIÓN DE BACKEND, BOOTSTRAP Y SESIONES
 *
 * # Logic:
 * El cliente clasifica la URL en uno de tres respaldos (archivo local,
 * Turso remoto, RAM) antes de encender el driver. El esquema del plano
 * de control se aplica durante el connect; en respaldo RAM la sesión
 * de bootstrap se retiene viva, porque SQLite descarta el segmento de
 * memoria compartida cuando la última conexión se cierra.
 * =================================================================
 */

use crate::errors::DbError;
use crate::schema::apply_control_plane_schema;
use libsql::{Builder, Connection, Database};
use std::sync::Arc;
use tracing::{error, info};

/// Respaldo físico del ledger de la flota, inferido de la URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LedgerBackend {
    LocalFile,
    RemoteTurso,
    Ram,
}

impl LedgerBackend {
    fn classify(ledger_url: &str) -> Self {
        if ledger_url.starts_with("libsql://") || ledger_url.starts_with("https://") {
            Self::RemoteTurso
        } else if ledger_url.contains(":memory:") || ledger_url.contains("mode=memory") {
            Self::Ram
        } else {
            Self::LocalFile
        }
    }
}

#[derive(Clone)]
pub struct TursoClient {
    ledger_driver: Arc<Database>,
    /// Sesión retenida en respaldo RAM; su cierre purgaría las tablas.
    _ram_retention_session: Option<Arc<Connection>>,
}

impl TursoClient {
    /**
     * Enciende el driver, aplica el esquema del plano de control y deja
     * el ledger listo para los repositorios.
     *
     * # Errors:
     * - URL vacía o backend remoto sin token de acceso.
     * - Fallo de ignición del driver o del bootstrap de esquema.
     */
    pub async fn connect(
        ledger_url: &str,
        remote_access_token: Option<String>,
    ) -> Result<Self, DbError> {
        if ledger_url.trim().is_empty() {
            return Err(DbError::ConnectionError("FLEET_LEDGER_URL_VOID".into()));
        }

        let backend = LedgerBackend::classify(ledger_url);
        info!("🗄️ [FLEET_LEDGER]: Igniting {:?} backend at [{}].", backend, ledger_url);

        let driver_build = match backend {
            LedgerBackend::RemoteTurso => {
                let access_token = remote_access_token.ok_or_else(|| {
                    DbError::ConnectionError("REMOTE_LEDGER_WITHOUT_ACCESS_TOKEN".into())
                })?;
                Builder::new_remote(ledger_url.to_string(), access_token).build().await
            }
            LedgerBackend::LocalFile | LedgerBackend::Ram => {
                Builder::new_local(ledger_url).build().await
            }
        };

        let ledger_driver = Arc::new(driver_build.map_err(|ignition_fault| {
            DbError::ConnectionError(format!("LEDGER_DRIVER_IGNITION: {ignition_fault}"))
        })?);

        // Bootstrap de esquema sobre una sesión fresca. En RAM esa misma
        // sesión queda retenida como ancla del segmento compartido.
        let bootstrap_session = ledger_driver.connect().map_err(|session_fault| {
            DbError::ConnectionError(format!("LEDGER_BOOTSTRAP_SESSION: {session_fault}"))
        })?;

        apply_control_plane_schema(&bootstrap_session)
            .await
            .map_err(|schema_fault| {
                DbError::ConnectionError(format!("LEDGER_SCHEMA_BOOTSTRAP: {schema_fault}"))
            })?;

        let retained_session = match backend {
            LedgerBackend::Ram => {
                info!("🗄️ [FLEET_LEDGER]: RAM backend pinned by retained session.");
                Some(Arc::new(bootstrap_session))
            }
            _ => None,
        };

        Ok(Self { ledger_driver, _ram_retention_session: retained_session })
    }

    /// Sesión nueva contra el ledger para una operación de repositorio.
    pub fn get_connection(&self) -> Result<Connection, DbError> {
        self.ledger_driver.connect().map_err(|session_fault| {
            error!("🗄️ [FLEET_LEDGER]: Session allocation refused: {}", session_fault);
            DbError::ConnectionError(session_fault.to_string())
        })
    }
}
