// [libs/shared/watchtower/src/lib.rs]
/*!
 * =================================================================
 * APARATO: WATCHTOWER FLEET OBSERVER (V2.0 - DIRECTIVE COMPOSER)
 * CLASIFICACIÓN: SHARED UTILITY (ESTRATO L4/L6)
 * RESPONSABILIDAD: COMPOSICIÓN DE FILTROS, EMISIÓN Y VIGILIA DE PÁNICOS
 *
 * # Logic:
 * El filtro por defecto se compone a partir de la lista de dependencias
 * ruidosas del plano de control; RUST_LOG lo reemplaza por completo.
 * Los despliegues productivos emiten tramas JSON planas; el modo de
 * desarrollo emite líneas compactas para el operador local.
 * =================================================================
 */

use std::any::Any;
use std::panic;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Dependencias cuyo parloteo se degrada por defecto: (objetivo, nivel).
const NOISY_DEPENDENCY_LEVELS: &[(&str, &str)] =
    &[("tower_http", "warn"), ("hyper", "warn"), ("libsql", "error")];

/// Compone las directivas de filtrado cuando RUST_LOG no dicta otras.
fn compose_default_directives(service_target: &str) -> String {
    let own_level = if cfg!(debug_assertions) { "debug" } else { "info" };

    let mut directives = vec![format!("{service_target}={own_level}")];
    for (noisy_target, capped_level) in NOISY_DEPENDENCY_LEVELS {
        directives.push(format!("{noisy_target}={capped_level}"));
    }
    directives.join(",")
}

/// Extrae el mensaje textual del payload de un pánico, si lo hay.
fn panic_payload_text(payload: &(dyn Any + Send)) -> &str {
    if let Some(static_text) = payload.downcast_ref::<&str>() {
        static_text
    } else if let Some(owned_text) = payload.downcast_ref::<String>() {
        owned_text.as_str()
    } else {
        "opaque panic payload"
    }
}

/**
 * Inicializa el trazado del plano de control y arma la vigilia de
 * pánicos. Un colapso en cualquier daemon de barrido deja rastro antes
 * de la terminación del hilo.
 *
 * # Errors:
 * Provoca pánico si otro suscriptor global ya fue registrado.
 */
pub fn init_tracing(service_target: &str) {
    let directive_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(compose_default_directives(service_target)));

    let filtered_registry = tracing_subscriber::registry().with(directive_filter);

    if cfg!(debug_assertions) {
        filtered_registry
            .with(tracing_subscriber::fmt::layer().compact().with_target(false))
            .init();
    } else {
        filtered_registry
            .with(tracing_subscriber::fmt::layer().json().flatten_event(true))
            .init();
    }

    let watched_service = service_target.to_string();
    panic::set_hook(Box::new(move |panic_info| {
        let collapse_origin = match panic_info.location() {
            Some(origin) => format!("{}:{}", origin.file(), origin.line()),
            None => "origin withheld by runtime".to_string(),
        };

        error!(
            target: "panic_watch",
            service = %watched_service,
            origin = %collapse_origin,
            "🔥 [THREAD_COLLAPSE]: {}",
            panic_payload_text(panic_info.payload())
        );
    }));

    info!("👁️  [WATCHTOWER]: Trace strata armed for [{}].", service_target);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn certify_default_directives_cover_noisy_dependencies() {
        let directives = compose_default_directives("helios_control_plane");

        assert!(directives.starts_with("helios_control_plane="));
        for (noisy_target, capped_level) in NOISY_DEPENDENCY_LEVELS {
            assert!(directives.contains(&format!("{noisy_target}={capped_level}")));
        }
    }
}
