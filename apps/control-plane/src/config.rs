// [apps/control-plane/src/config.rs]
/*!
 * =================================================================
 * APARATO: RUNTIME CONFIGURATION (V2.0 - ENV HYDRATION)
 * CLASIFICACIÓN: APPLICATION SHELL (ESTRATO L1-APP)
 * RESPONSABILIDAD: CAPTURA DE ENTORNO CON DEFAULTS DE DESPLIEGUE
 *
 * # Logic:
 * Toda clave reconocida tiene default; los secretos de fábrica son
 * deliberadamente inseguros y se registran como advertencia al arrancar.
 * =================================================================
 */

use chrono::NaiveTime;
use helios_domain_models::RuleDefaults;
use std::env;
use tracing::warn;

/// Clave de firma de tokens de usuario por defecto (INSEGURA).
const INSECURE_DEFAULT_JWT_SECRET: &str = "helios-insecure-jwt-secret";
/// Clave MAC de dispositivos por defecto (INSEGURA).
const INSECURE_DEFAULT_DEVICE_SECRET: &str = "helios-insecure-device-secret";

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub port: u16,
    pub database_url: String,
    pub turso_auth_token: Option<String>,
    pub jwt_secret: String,
    pub jwt_expires_hours: i64,
    pub device_hmac_secret: String,
    pub alert_eval_interval_minutes: u64,
    pub no_telemetry_threshold_minutes: i64,
    pub over_temp_threshold_c: f64,
    pub sensor_out_of_range_repeat_count: usize,
    pub rollup_time_utc: NaiveTime,
    pub weather_time_utc: NaiveTime,
}

fn env_or<T: std::str::FromStr>(key: &str, fallback: T) -> T {
    env::var(key).ok().and_then(|raw| raw.parse().ok()).unwrap_or(fallback)
}

/// Interpreta "24h" o "24" como horas de vigencia del token de usuario.
fn parse_expiry_hours(raw: &str) -> Option<i64> {
    raw.trim().trim_end_matches(['h', 'H']).parse().ok()
}

/// Interpreta "HH:MM" como hora local UTC del barrido diario.
fn parse_daily_time(raw: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M").ok()
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        let jwt_secret =
            env::var("JWT_SECRET").unwrap_or_else(|_| INSECURE_DEFAULT_JWT_SECRET.to_string());
        let device_hmac_secret = env::var("DEVICE_HMAC_SECRET")
            .unwrap_or_else(|_| INSECURE_DEFAULT_DEVICE_SECRET.to_string());

        if jwt_secret == INSECURE_DEFAULT_JWT_SECRET {
            warn!("⚠️ [CONFIG]: JWT_SECRET not set; using the insecure factory default.");
        }
        if device_hmac_secret == INSECURE_DEFAULT_DEVICE_SECRET {
            warn!("⚠️ [CONFIG]: DEVICE_HMAC_SECRET not set; using the insecure factory default.");
        }

        Self {
            port: env_or("PORT", 3000),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "helios-control-plane.db".to_string()),
            turso_auth_token: env::var("TURSO_AUTH_TOKEN").ok(),
            jwt_secret,
            jwt_expires_hours: env::var("JWT_EXPIRES_IN")
                .ok()
                .and_then(|raw| parse_expiry_hours(&raw))
                .unwrap_or(24),
            device_hmac_secret,
            alert_eval_interval_minutes: env_or("ALERT_EVAL_INTERVAL_MINUTES", 5),
            no_telemetry_threshold_minutes: env_or("NO_TELEMETRY_THRESHOLD_MINUTES", 30),
            over_temp_threshold_c: env_or("OVER_TEMP_THRESHOLD_C", 85.0),
            sensor_out_of_range_repeat_count: env_or("SENSOR_OUT_OF_RANGE_REPEAT_COUNT", 3),
            rollup_time_utc: env::var("ROLLUP_CRON")
                .ok()
                .and_then(|raw| parse_daily_time(&raw))
                .unwrap_or_else(|| NaiveTime::from_hms_opt(2, 0, 0).unwrap()),
            weather_time_utc: env::var("WEATHER_CRON")
                .ok()
                .and_then(|raw| parse_daily_time(&raw))
                .unwrap_or_else(|| NaiveTime::from_hms_opt(6, 0, 0).unwrap()),
        }
    }

    /// Defaults de reglas derivados del despliegue (C5).
    pub fn rule_defaults(&self) -> RuleDefaults {
        RuleDefaults {
            no_telemetry_threshold_minutes: self.no_telemetry_threshold_minutes,
            over_temp_threshold_c: self.over_temp_threshold_c,
            sensor_out_of_range_repeat_count: self.sensor_out_of_range_repeat_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn certify_expiry_parser_accepts_suffixed_hours() {
        assert_eq!(parse_expiry_hours("24h"), Some(24));
        assert_eq!(parse_expiry_hours("48"), Some(48));
        assert_eq!(parse_expiry_hours("bogus"), None);
    }

    #[test]
    fn certify_daily_time_parser() {
        assert_eq!(parse_daily_time("02:00"), NaiveTime::from_hms_opt(2, 0, 0));
        assert_eq!(parse_daily_time("6:30"), NaiveTime::from_hms_opt(6, 30, 0));
        assert_eq!(parse_daily_time("99:99"), None);
    }
}
