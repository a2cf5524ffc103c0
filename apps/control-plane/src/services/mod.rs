// [apps/control-plane/src/services/mod.rs]
/*!
 * APARATO: BACKGROUND SERVICE MATRIX (ESTRATO L4)
 * RESPONSABILIDAD: DAEMONS PERIÓDICOS DEL PLANO DE CONTROL
 *
 * # Logic:
 * Los cuatro barridos (alertas, notificaciones, rollup, clima) son
 * idempotentes: las claves de dedupe y de upsert del almacén absorben
 * las repeticiones. Ningún barrido asume acceso exclusivo a fila alguna.
 */

pub mod alert_evaluator;
pub mod analytics_roller;
pub mod notification_dispatcher;
pub mod weather_sync;

use chrono::{NaiveTime, Utc};

/// Segundos hasta la próxima ocurrencia UTC de una hora del día.
pub(crate) fn seconds_until_next_occurrence(time_of_day: NaiveTime) -> u64 {
    let now = Utc::now();
    let today_candidate = now.date_naive().and_time(time_of_day).and_utc();

    let next_firing = if today_candidate > now {
        today_candidate
    } else {
        (now.date_naive() + chrono::Duration::days(1)).and_time(time_of_day).and_utc()
    };

    (next_firing - now).num_seconds().max(1) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn certify_next_occurrence_is_within_a_day() {
        let delay = seconds_until_next_occurrence(NaiveTime::from_hms_opt(2, 0, 0).unwrap());
        assert!(delay >= 1);
        assert!(delay <= 86_400);
    }
}
