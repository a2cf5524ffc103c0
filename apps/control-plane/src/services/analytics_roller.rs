// [apps/control-plane/src/services/analytics_roller.rs]
/*!
 * =================================================================
 * APARATO: ANALYTICS ROLLER SERVICE (V2.5 - DAILY AGGREGATION)
 * CLASIFICACIÓN: BACKGROUND INFRASTRUCTURE (ESTRATO L4)
 * RESPONSABILIDAD: AGREGADO DIARIO POR UNIDAD DESDE TELEMETRÍA CRUDA
 *
 * # Logic:
 * Corre a la hora configurada (default 02:00 UTC) sobre el día
 * anterior. Solo unidades ACTIVE/INSTALLED con lecturas en la ventana.
 * El upsert sobre (unidad, fecha) hace la pasada idempotente.
 * =================================================================
 */

use chrono::{Duration as ChronoDuration, NaiveDate, TimeZone, Utc};
use helios_domain_models::rollup::compute_rollup_figures;
use tokio::time::{sleep, Duration};
use tracing::{error, info, instrument, warn};

use crate::services::seconds_until_next_occurrence;
use crate::state::AppState;

pub struct AnalyticsRollerService {
    application_state: AppState,
}

impl AnalyticsRollerService {
    pub fn new(application_state: AppState) -> Self {
        Self { application_state }
    }

    pub fn spawn_daemon(self) {
        let firing_time = self.application_state.config.rollup_time_utc;
        info!("📊 [ROLLER]: Daily aggregation daemon armed for {} UTC.", firing_time);

        tokio::spawn(async move {
            loop {
                let delay_seconds = seconds_until_next_occurrence(firing_time);
                sleep(Duration::from_secs(delay_seconds)).await;

                let target_day = (Utc::now() - ChronoDuration::days(1)).date_naive();
                match run_for_day(&self.application_state, target_day).await {
                    Ok(rolled_count) => {
                        info!("📊 [ROLLER]: Day {} rolled for {} unit(s).", target_day, rolled_count);
                    }
                    Err(roller_fault) => {
                        error!("❌ [ROLLER]: Daily pass collapsed: {}", roller_fault);
                    }
                }
            }
        });
    }
}

/**
 * Agrega el día indicado. Pública para el proving grounds: dos pasadas
 * sobre el mismo día producen filas idénticas.
 */
#[instrument(skip(application_state))]
pub async fn run_for_day(
    application_state: &AppState,
    target_day: NaiveDate,
) -> Result<usize, helios_infra_db::DbError> {
    let window_start = Utc
        .from_utc_datetime(&target_day.and_hms_opt(0, 0, 0).expect("midnight exists"));
    let window_end = window_start + ChronoDuration::hours(24);

    let device_ids = application_state
        .telemetry
        .device_ids_with_readings_between(window_start, window_end)
        .await?;

    let mut rolled_count = 0usize;

    for device_id in device_ids {
        let Some(device) = application_state.devices.find_by_id(&device_id).await? else {
            continue;
        };
        if !device.status.is_alert_eligible() {
            continue;
        }

        let readings = application_state
            .telemetry
            .readings_between_asc(&device_id, window_start, window_end)
            .await?;

        let Some(figures) = compute_rollup_figures(&readings) else {
            continue;
        };

        match application_state.rollups.upsert_day(&device_id, target_day, &figures).await {
            Ok(_) => rolled_count += 1,
            Err(upsert_fault) => {
                warn!("⚠️ [ROLLER]: Unit {} day {} skipped: {}", device_id, target_day, upsert_fault);
            }
        }
    }

    Ok(rolled_count)
}
