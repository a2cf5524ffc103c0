// [apps/control-plane/src/main.rs]
/*!
 * APARATO: CONTROL PLANE MAIN ENTRY POINT (ESTRATO L1-APP)
 * RESPONSABILIDAD: CARGA DE ENTORNO, OBSERVABILIDAD E IGNICIÓN
 */

use dotenvy::dotenv;
use helios_control_plane::prelude::*;
use helios_shared_watchtower::init_tracing;
use tracing::info;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. CARGA DE ENTORNO
    dotenv().ok();

    // 2. OBSERVABILIDAD (WATCHTOWER)
    init_tracing("helios_control_plane");

    // 3. RUNTIME MULTIHILO
    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;

    runtime.block_on(async {
        info!("🛰️  [CONTROL_PLANE]: Global ignition sequence starting...");

        // 4. CONFIGURACIÓN DE DESPLIEGUE
        let config = RuntimeConfig::from_env();

        // 5. KERNEL: ENLACE AL MOTOR A + ESTADO COMPARTIDO
        let kernel = ControlPlaneKernel::ignite(config).await?;

        // 6. DAEMONS + SERVIDOR AXUM
        kernel.launch_control_operations().await
    })?;

    Ok(())
}
