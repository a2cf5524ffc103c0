// [libs/infra/integrations/src/lib.rs]
/*!
 * =================================================================
 * APARATO: INTEGRATION ADAPTER MATRIX (V1.3 - NARROW SEAMS)
 * CLASIFICACIÓN: INFRASTRUCTURE BOUNDARY (ESTRATO L3/L6)
 * RESPONSABILIDAD: CONTRATOS ENCHUFABLES HACIA SERVICIOS EXTERNOS
 *
 * # Logic:
 * Cada proveedor externo (clima, geocodificación, operador SIM, canales
 * de notificación) vive detrás de una interfaz estrecha. La referencia
 * entrega stubs deterministas; los despliegues productivos inyectan
 * implementaciones reales sin tocar el dominio.
 * =================================================================
 */

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum IntegrationError {
    #[error("[L6_ADAPTER_FAULT]: PROVIDER_REJECTED -> {0}")]
    ProviderRejected(String),

    #[error("[L6_ADAPTER_FAULT]: CHANNEL_MISCONFIGURED -> {0}")]
    ChannelMisconfigured(String),
}

// --- CLIMA ---

/// Observación diaria devuelta por el proveedor meteorológico.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherDailyReport {
    pub temp_min_c: f64,
    pub temp_max_c: f64,
    pub irradiance_kwh_m2: f64,
    pub cloud_cover_pct: f64,
}

#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn fetch_daily(
        &self,
        lat: f64,
        lon: f64,
        date: NaiveDate,
    ) -> Result<WeatherDailyReport, IntegrationError>;
}

/// Stub determinista: deriva cifras plausibles de las coordenadas y la
/// fecha, sin red. Suficiente para cerrar el circuito del barrido diario.
pub struct StubWeatherProvider;

#[async_trait]
impl WeatherProvider for StubWeatherProvider {
    async fn fetch_daily(
        &self,
        lat: f64,
        lon: f64,
        date: NaiveDate,
    ) -> Result<WeatherDailyReport, IntegrationError> {
        debug!("🌤️ [WEATHER_STUB]: Synthesizing observation for ({lat}, {lon}) on {date}.");

        // Pseudo-variación estable por coordenada y día del año.
        let day_of_year = chrono::Datelike::ordinal(&date) as f64;
        let seasonal_swing = (day_of_year / 365.0 * std::f64::consts::TAU).sin() * 8.0;
        let latitude_bias = (45.0 - lat.abs()) * 0.4;

        Ok(WeatherDailyReport {
            temp_min_c: (10.0 + seasonal_swing + latitude_bias).clamp(-30.0, 35.0),
            temp_max_c: (18.0 + seasonal_swing + latitude_bias).clamp(-20.0, 48.0),
            irradiance_kwh_m2: (4.5 + seasonal_swing * 0.2).clamp(0.5, 8.5),
            cloud_cover_pct: ((lon.abs() * 7.0 + day_of_year) % 100.0),
        })
    }
}

// --- GEOCODIFICACIÓN ---

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostalAddress {
    pub address_line: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
}

#[async_trait]
pub trait GeocodingProvider: Send + Sync {
    async fn reverse_geocode(
        &self,
        lat: f64,
        lon: f64,
    ) -> Result<Option<PostalAddress>, IntegrationError>;
}

pub struct StubGeocodingProvider;

#[async_trait]
impl GeocodingProvider for StubGeocodingProvider {
    async fn reverse_geocode(
        &self,
        lat: f64,
        lon: f64,
    ) -> Result<Option<PostalAddress>, IntegrationError> {
        debug!("🗺️ [GEOCODE_STUB]: Reverse lookup for ({lat}, {lon}).");
        Ok(Some(PostalAddress {
            address_line: format!("Synthetic Ave {:.0}", (lat.abs() * 100.0) % 300.0),
            city: "Stubville".into(),
            postal_code: format!("{:05.0}", (lon.abs() * 1000.0) % 99999.0),
            country: "GR".into(),
        }))
    }
}

// --- OPERADOR SIM ---

/// Acciones soportadas contra la tarjeta SIM de una unidad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SimAction {
    Activate,
    Suspend,
    Resume,
    Reset,
}

impl SimAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Activate => "ACTIVATE",
            Self::Suspend => "SUSPEND",
            Self::Resume => "RESUME",
            Self::Reset => "RESET",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimActionOutcome {
    pub iccid: String,
    pub action: SimAction,
    pub accepted: bool,
    pub carrier_reference: String,
}

#[async_trait]
pub trait SimCarrierProvider: Send + Sync {
    async fn execute_action(
        &self,
        iccid: &str,
        action: SimAction,
    ) -> Result<SimActionOutcome, IntegrationError>;
}

pub struct StubSimCarrierProvider;

#[async_trait]
impl SimCarrierProvider for StubSimCarrierProvider {
    async fn execute_action(
        &self,
        iccid: &str,
        action: SimAction,
    ) -> Result<SimActionOutcome, IntegrationError> {
        if iccid.len() < 10 {
            return Err(IntegrationError::ProviderRejected(format!(
                "ICCID_MALFORMED: '{iccid}'"
            )));
        }

        info!("📶 [SIM_STUB]: {} accepted for ICCID {}.", action.as_str(), iccid);
        Ok(SimActionOutcome {
            iccid: iccid.to_string(),
            action,
            accepted: true,
            carrier_reference: format!("stub-{}-{}", action.as_str().to_lowercase(), iccid),
        })
    }
}

// --- CANALES DE NOTIFICACIÓN ---

/**
 * Adaptador de despacho por tipo de canal. El consumidor del outbox lo
 * invoca fire-and-forget: el fallo mueve la fila a FAILED sin reintento.
 */
#[async_trait]
pub trait NotificationChannelAdapter: Send + Sync {
    async fn dispatch(
        &self,
        channel_config: &serde_json::Value,
        payload: &serde_json::Value,
    ) -> Result<(), IntegrationError>;
}

pub struct StubEmailAdapter;

#[async_trait]
impl NotificationChannelAdapter for StubEmailAdapter {
    async fn dispatch(
        &self,
        channel_config: &serde_json::Value,
        payload: &serde_json::Value,
    ) -> Result<(), IntegrationError> {
        let recipient = channel_config
            .get("to")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| {
                IntegrationError::ChannelMisconfigured("EMAIL channel lacks 'to'".into())
            })?;
        info!("✉️ [EMAIL_STUB]: Dispatched to {} ({} bytes).", recipient, payload.to_string().len());
        Ok(())
    }
}

pub struct StubSmsAdapter;

#[async_trait]
impl NotificationChannelAdapter for StubSmsAdapter {
    async fn dispatch(
        &self,
        channel_config: &serde_json::Value,
        payload: &serde_json::Value,
    ) -> Result<(), IntegrationError> {
        let msisdn = channel_config
            .get("phone")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| {
                IntegrationError::ChannelMisconfigured("SMS channel lacks 'phone'".into())
            })?;
        info!("📱 [SMS_STUB]: Dispatched to {} ({} bytes).", msisdn, payload.to_string().len());
        Ok(())
    }
}

pub struct StubWebhookAdapter;

#[async_trait]
impl NotificationChannelAdapter for StubWebhookAdapter {
    async fn dispatch(
        &self,
        channel_config: &serde_json::Value,
        payload: &serde_json::Value,
    ) -> Result<(), IntegrationError> {
        let endpoint = channel_config
            .get("url")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| {
                IntegrationError::ChannelMisconfigured("WEBHOOK channel lacks 'url'".into())
            })?;
        info!("🪝 [WEBHOOK_STUB]: Posted to {} ({} bytes).", endpoint, payload.to_string().len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn certify_weather_stub_is_deterministic() {
        let provider = StubWeatherProvider;
        let date = NaiveDate::from_ymd_opt(2026, 2, 10).unwrap();

        let first = provider.fetch_daily(37.975, 23.735, date).await.unwrap();
        let second = provider.fetch_daily(37.975, 23.735, date).await.unwrap();

        assert_eq!(first.temp_min_c, second.temp_min_c);
        assert_eq!(first.irradiance_kwh_m2, second.irradiance_kwh_m2);
        assert!(first.temp_min_c <= first.temp_max_c);
    }

    #[tokio::test]
    async fn certify_sim_stub_rejects_malformed_iccid() {
        let carrier = StubSimCarrierProvider;

        let rejected = carrier.execute_action("123", SimAction::Activate).await;
        assert!(matches!(rejected, Err(IntegrationError::ProviderRejected(_))));

        let accepted = carrier
            .execute_action("8930123456789012345", SimAction::Suspend)
            .await
            .unwrap();
        assert!(accepted.accepted);
        assert_eq!(accepted.action, SimAction::Suspend);
    }

    #[tokio::test]
    async fn certify_channel_adapters_validate_config() {
        let email = StubEmailAdapter;
        let misconfigured = email
            .dispatch(&serde_json::json!({}), &serde_json::json!({"msg": "x"}))
            .await;
        assert!(matches!(misconfigured, Err(IntegrationError::ChannelMisconfigured(_))));

        let webhook = StubWebhookAdapter;
        webhook
            .dispatch(
                &serde_json::json!({"url": "https://hooks.example/alerts"}),
                &serde_json::json!({"msg": "x"}),
            )
            .await
            .unwrap();
    }
}
