// [apps/control-plane/src/state/mod.rs]
/*!
 * =================================================================
 * APARATO: APPLICATION STATE HUB (V4.1 - COMPOSITION ROOT)
 * CLASIFICACIÓN: APPLICATION STATE (ESTRATO L1-APP)
 * RESPONSABILIDAD: ORQUESTACIÓN DE REPOSITORIOS, ADAPTADORES Y CONFIG
 *
 * # Logic:
 * Placa base del plano de control: el cliente táctico, los trece
 * repositorios y los adaptadores de integración viajan juntos detrás
 * de 'Arc'. El camino de auditoría best-effort vive aquí para que
 * ningún manejador pueda propagarlo como fallo de dominio.
 * =================================================================
 */

use std::sync::Arc;
use std::time::Instant;

use helios_domain_models::ActorType;
use helios_infra_db::repositories::{
    AlertRepository, AuditRepository, CommandRepository, DeviceRepository, EntitlementRepository,
    NotificationRepository, OtaRepository, RollupRepository, SiteRepository, TelemetryRepository,
    TenantRepository, UserRepository, WeatherRepository,
};
use helios_infra_db::TursoClient;
use helios_infra_integrations::{
    GeocodingProvider, NotificationChannelAdapter, SimCarrierProvider, StubEmailAdapter,
    StubGeocodingProvider, StubSimCarrierProvider, StubSmsAdapter, StubWeatherProvider,
    StubWebhookAdapter, WeatherProvider,
};
use tracing::warn;

use crate::config::RuntimeConfig;

/**
 * Contenedor de estado compartido (Thread-Safe) del plano de control.
 */
#[derive(Clone)]
pub struct AppState {
    /// Cliente táctico del Motor A (libSQL local o Turso remoto).
    pub database_client: TursoClient,
    /// Configuración de despliegue, inmutable tras la ignición.
    pub config: Arc<RuntimeConfig>,
    /// Marca de ignición para el reporte de salud.
    pub booted_at: Instant,

    // --- REPOSITORIOS (ESTRATO L3) ---
    pub tenants: Arc<TenantRepository>,
    pub users: Arc<UserRepository>,
    pub sites: Arc<SiteRepository>,
    pub devices: Arc<DeviceRepository>,
    pub telemetry: Arc<TelemetryRepository>,
    pub commands: Arc<CommandRepository>,
    pub alerts: Arc<AlertRepository>,
    pub ota: Arc<OtaRepository>,
    pub notifications: Arc<NotificationRepository>,
    pub entitlements: Arc<EntitlementRepository>,
    pub rollups: Arc<RollupRepository>,
    pub audit: Arc<AuditRepository>,
    pub weather: Arc<WeatherRepository>,

    // --- ADAPTADORES DE INTEGRACIÓN (ESTRATO L6) ---
    pub weather_provider: Arc<dyn WeatherProvider>,
    pub geocoding_provider: Arc<dyn GeocodingProvider>,
    pub sim_carrier: Arc<dyn SimCarrierProvider>,
    pub email_adapter: Arc<dyn NotificationChannelAdapter>,
    pub sms_adapter: Arc<dyn NotificationChannelAdapter>,
    pub webhook_adapter: Arc<dyn NotificationChannelAdapter>,
}

impl AppState {
    /**
     * Forja el Estado Maestro inyectando cliente y configuración. Los
     * adaptadores de la referencia son stubs deterministas.
     */
    pub fn new(database_client: TursoClient, config: RuntimeConfig) -> Self {
        Self {
            tenants: Arc::new(TenantRepository::new(database_client.clone())),
            users: Arc::new(UserRepository::new(database_client.clone())),
            sites: Arc::new(SiteRepository::new(database_client.clone())),
            devices: Arc::new(DeviceRepository::new(database_client.clone())),
            telemetry: Arc::new(TelemetryRepository::new(database_client.clone())),
            commands: Arc::new(CommandRepository::new(database_client.clone())),
            alerts: Arc::new(AlertRepository::new(database_client.clone())),
            ota: Arc::new(OtaRepository::new(database_client.clone())),
            notifications: Arc::new(NotificationRepository::new(database_client.clone())),
            entitlements: Arc::new(EntitlementRepository::new(database_client.clone())),
            rollups: Arc::new(RollupRepository::new(database_client.clone())),
            audit: Arc::new(AuditRepository::new(database_client.clone())),
            weather: Arc::new(WeatherRepository::new(database_client.clone())),
            weather_provider: Arc::new(StubWeatherProvider),
            geocoding_provider: Arc::new(StubGeocodingProvider),
            sim_carrier: Arc::new(StubSimCarrierProvider),
            email_adapter: Arc::new(StubEmailAdapter),
            sms_adapter: Arc::new(StubSmsAdapter),
            webhook_adapter: Arc::new(StubWebhookAdapter),
            database_client,
            config: Arc::new(config),
            booted_at: Instant::now(),
        }
    }

    /**
     * Anexo de auditoría best-effort: el fallo se registra y se traga.
     * Jamás interrumpe la operación de dominio circundante.
     */
    #[allow(clippy::too_many_arguments)]
    pub async fn audit_best_effort(
        &self,
        tenant_id: Option<&str>,
        actor_user_id: Option<&str>,
        actor_type: ActorType,
        action: &str,
        entity_type: &str,
        entity_id: &str,
        metadata: serde_json::Value,
    ) {
        if let Err(audit_fault) = self
            .audit
            .append(tenant_id, actor_user_id, actor_type, action, entity_type, entity_id, metadata)
            .await
        {
            warn!("🪵 [AUDIT_DROPPED]: {} write swallowed: {}", action, audit_fault);
        }
    }
}
