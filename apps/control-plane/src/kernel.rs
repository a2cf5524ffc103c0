// [apps/control-plane/src/kernel.rs]
/*!
 * =================================================================
 * APARATO: CONTROL PLANE KERNEL (V4.1 - COMPOSITION ROOT)
 * CLASIFICACIÓN: COMPOSITION ROOT (ESTRATO L1-APP)
 * RESPONSABILIDAD: BOOTSTRAP DE INFRAESTRUCTURA E IGNICIÓN SEGURA
 *
 * # Logic:
 * Placa base donde se conectan todos los servicios: enlace al Motor A,
 * estado compartido, daemons de barrido (C5/C6/C8 + clima) y servidor
 * HTTP. El planificador del plano de control ES este kernel: cada
 * daemon corre dentro del mismo proceso sobre el reactor de Tokio.
 * =================================================================
 */

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use helios_infra_db::TursoClient;
use tracing::info;

use crate::config::RuntimeConfig;
use crate::routes::create_control_plane_router;
use crate::services::alert_evaluator::AlertEvaluatorService;
use crate::services::analytics_roller::AnalyticsRollerService;
use crate::services::notification_dispatcher::NotificationDispatcherService;
use crate::services::weather_sync::WeatherSyncService;
use crate::state::AppState;

pub struct ControlPlaneKernel {
    pub server_network_port: u16,
    pub application_shared_state: AppState,
}

impl ControlPlaneKernel {
    /**
     * Ignición del cliente táctico y el estado compartido. La conexión
     * (y el bootstrap de esquema) precede a todo servicio.
     */
    pub async fn ignite(config: RuntimeConfig) -> anyhow::Result<Self> {
        let database_client =
            TursoClient::connect(&config.database_url, config.turso_auth_token.clone()).await?;

        Ok(Self {
            server_network_port: config.port,
            application_shared_state: AppState::new(database_client, config),
        })
    }

    /**
     * Lanza los daemons de fondo y levanta el servidor Axum. No retorna
     * salvo colapso del socket.
     */
    pub async fn launch_control_operations(self) -> anyhow::Result<()> {
        let shared_state = self.application_shared_state.clone();

        // --- 1. DAEMONS DE BARRIDO (C5 / C6 / C8 / CLIMA) ---
        AlertEvaluatorService::new(shared_state.clone()).spawn_daemon();
        NotificationDispatcherService::new(shared_state.clone()).spawn_daemon();
        AnalyticsRollerService::new(shared_state.clone()).spawn_daemon();
        WeatherSyncService::new(shared_state.clone()).spawn_daemon();

        // --- 2. SERVIDOR HTTP (ESCUDO DUAL) ---
        let router = create_control_plane_router(shared_state);
        let bind_address =
            SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), self.server_network_port);

        let listener = tokio::net::TcpListener::bind(bind_address).await?;
        info!("🚀 [CONTROL_PLANE_ONLINE]: Listening on {}.", bind_address);

        axum::serve(listener, router).await?;
        Ok(())
    }
}
