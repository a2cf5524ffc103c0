// [apps/control-plane/src/services/weather_sync.rs]
/*!
 * APARATO: WEATHER SYNC SERVICE (ESTRATO L4)
 * RESPONSABILIDAD: PULL DIARIO DEL PROVEEDOR METEOROLÓGICO POR SITIO
 *
 * # Logic:
 * Corre a la hora configurada (default 06:00 UTC) sobre los sitios con
 * coordenadas. El upsert sobre (sitio, fecha) absorbe repeticiones.
 */

use chrono::Utc;
use tokio::time::{sleep, Duration};
use tracing::{error, info, instrument, warn};

use crate::services::seconds_until_next_occurrence;
use crate::state::AppState;

pub struct WeatherSyncService {
    application_state: AppState,
}

impl WeatherSyncService {
    pub fn new(application_state: AppState) -> Self {
        Self { application_state }
    }

    pub fn spawn_daemon(self) {
        let firing_time = self.application_state.config.weather_time_utc;
        info!("🌤️ [WEATHER_SYNC]: Daily pull daemon armed for {} UTC.", firing_time);

        tokio::spawn(async move {
            loop {
                let delay_seconds = seconds_until_next_occurrence(firing_time);
                sleep(Duration::from_secs(delay_seconds)).await;

                match run_once(&self.application_state).await {
                    Ok(pulled_count) => {
                        info!("🌤️ [WEATHER_SYNC]: Observations stored for {} site(s).", pulled_count);
                    }
                    Err(sync_fault) => {
                        error!("❌ [WEATHER_SYNC]: Daily pull collapsed: {}", sync_fault);
                    }
                }
            }
        });
    }
}

/// Una pasada del pull meteorológico. Pública para el proving grounds.
#[instrument(skip(application_state))]
pub async fn run_once(application_state: &AppState) -> Result<usize, helios_infra_db::DbError> {
    let today = Utc::now().date_naive();
    let sites_with_coordinates = application_state.sites.list_with_coordinates().await?;

    let mut pulled_count = 0usize;

    for site in sites_with_coordinates {
        let (Some(lat), Some(lon)) = (site.lat, site.lon) else { continue };

        match application_state.weather_provider.fetch_daily(lat, lon, today).await {
            Ok(report) => {
                application_state
                    .weather
                    .upsert_observation(
                        &site.id,
                        today,
                        Some(report.temp_min_c),
                        Some(report.temp_max_c),
                        Some(report.irradiance_kwh_m2),
                        Some(report.cloud_cover_pct),
                    )
                    .await?;
                pulled_count += 1;
            }
            Err(provider_fault) => {
                // Independencia por sitio: registrar y seguir.
                warn!("⚠️ [WEATHER_SYNC]: Site {} skipped: {}", site.id, provider_fault);
            }
        }
    }

    Ok(pulled_count)
}
