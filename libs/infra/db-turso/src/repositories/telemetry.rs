// [libs/infra/db-turso/src/repositories/telemetry.rs]
/*!
 * =================================================================
 * APARATO: TELEMETRY INGEST REPOSITORY (V5.0 - ATOMIC FAN-OUT)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: INGESTA TRANSACCIONAL, GEMELO Y RECONCILIACIÓN DE SITIO
 *
 * # Logic:
 * Una llamada de ingesta es UNA transacción lógica: fila de telemetría,
 * last_seen del dispositivo, upsert del gemelo y reconciliación del
 * sitio se sellan juntos o no se sellan. Las escrituras de auditoría
 * dentro de la transacción son best-effort: su fallo se registra y
 * jamás aborta la ingesta.
 * =================================================================
 */

use std::collections::BTreeMap;

use crate::errors::DbError;
use crate::repositories::mappers;
use crate::TursoClient;
use chrono::{DateTime, Utc};
use helios_domain_models::audit::actions;
use helios_domain_models::device::recompute_derived_state;
use helios_domain_models::site::haversine_distance_km;
use helios_domain_models::{
    ActorType, Device, DeviceTwin, GeoFix, LocationSource, MetricValue, TelemetryReading,
};
use libsql::{params, Connection, Row};
use serde_json::json;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Umbral de salto geográfico anómalo (kilómetros, comparación estricta).
const GEO_JUMP_THRESHOLD_KM: f64 = 1.0;

pub struct TelemetryRepository {
    database_client: TursoClient,
}

/// Veredicto de la transacción de ingesta.
#[derive(Debug, Clone)]
pub struct TelemetryIngestOutcome {
    pub telemetry_id: String,
    pub site_location_filled: bool,
    pub geo_jump_km: Option<f64>,
}

fn map_reading_row(row: &Row) -> Result<TelemetryReading, DbError> {
    let metrics_raw: String = row.get(3)?;
    let metrics: BTreeMap<String, MetricValue> = serde_json::from_str(&metrics_raw)
        .map_err(|fault| DbError::MappingError(format!("METRICS_DRIFT: {fault}")))?;

    let geo_lat: Option<f64> = row.get(4)?;
    let geo_lon: Option<f64> = row.get(5)?;
    let geo_source_raw: Option<String> = row.get(6)?;
    let geo = match (geo_lat, geo_lon, geo_source_raw) {
        (Some(lat), Some(lon), Some(source_raw)) => Some(GeoFix {
            lat,
            lon,
            source: mappers::decode_enum(&source_raw, LocationSource::parse, "LocationSource")?,
            accuracy_m: row.get(7)?,
        }),
        _ => None,
    };

    Ok(TelemetryReading {
        id: row.get(0)?,
        device_id: row.get(1)?,
        ts: mappers::get_timestamp(row, 2)?,
        metrics,
        geo,
        created_at: mappers::get_timestamp(row, 8)?,
    })
}

/// Inserción de auditoría best-effort dentro de la transacción de ingesta.
async fn append_audit_best_effort(
    transaction: &Connection,
    tenant_id: &str,
    action: &str,
    entity_type: &str,
    entity_id: &str,
    metadata: serde_json::Value,
) {
    let insert_result = transaction
        .execute(
            "INSERT INTO audit_logs (id, tenant_id, actor_user_id, actor_type, action,
                                     entity_type, entity_id, metadata_json, created_at)
             VALUES (?1, ?2, NULL, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                Uuid::new_v4().to_string(),
                tenant_id,
                ActorType::Device.as_str(),
                action,
                entity_type,
                entity_id,
                metadata.to_string(),
                Utc::now().to_rfc3339()
            ],
        )
        .await;

    if let Err(audit_fault) = insert_result {
        warn!("🪵 [AUDIT_DROPPED]: {} write failed mid-ingest: {}", action, audit_fault);
    }
}

impl TelemetryRepository {
    #[must_use]
    pub fn new(database_client: TursoClient) -> Self {
        Self { database_client }
    }

    /**
     * Ejecuta el abanico transaccional de la ingesta:
     * 1. Anexa la fila de telemetría.
     * 2. Avanza 'last_seen_at' del dispositivo y su geo reportada.
     * 3. Upsert del gemelo con el estado derivado recalculado.
     * 4. Reconcilia la geografía del sitio (relleno o detección de salto).
     */
    #[instrument(skip(self, device, metrics, geo), fields(device = %device.id))]
    pub async fn ingest_reading(
        &self,
        device: &Device,
        ts: DateTime<Utc>,
        metrics: &BTreeMap<String, MetricValue>,
        geo: Option<&GeoFix>,
    ) -> Result<TelemetryIngestOutcome, DbError> {
        let connection = self.database_client.get_connection()?;
        let ingest_transaction = connection.transaction().await.map_err(DbError::QueryError)?;

        let now = Utc::now();
        let telemetry_id = Uuid::new_v4().to_string();
        let metrics_json = serde_json::to_string(metrics)
            .map_err(|fault| DbError::MappingError(format!("METRICS_SEAL_FAULT: {fault}")))?;

        // 1. ANEXO DE LA LECTURA
        ingest_transaction
            .execute(
                "INSERT INTO telemetry (id, device_id, ts, metrics_json, geo_lat, geo_lon,
                                        geo_source, geo_accuracy_m, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    telemetry_id.clone(),
                    device.id.clone(),
                    ts.to_rfc3339(),
                    metrics_json,
                    geo.map(|g| g.lat),
                    geo.map(|g| g.lon),
                    geo.map(|g| g.source.as_str().to_string()),
                    geo.and_then(|g| g.accuracy_m),
                    now.to_rfc3339()
                ],
            )
            .await
            .map_err(DbError::from_engine)?;

        // 2. AVANCE DE VITALIDAD DEL DISPOSITIVO
        if let Some(geo_fix) = geo {
            ingest_transaction
                .execute(
                    "UPDATE devices SET last_seen_at = ?2, reported_lat = ?3, reported_lon = ?4,
                            reported_location_source = ?5, reported_location_accuracy_m = ?6,
                            updated_at = ?7
                     WHERE id = ?1",
                    params![
                        device.id.clone(),
                        ts.to_rfc3339(),
                        geo_fix.lat,
                        geo_fix.lon,
                        geo_fix.source.as_str(),
                        geo_fix.accuracy_m,
                        now.to_rfc3339()
                    ],
                )
                .await?;
        } else {
            ingest_transaction
                .execute(
                    "UPDATE devices SET last_seen_at = ?2, updated_at = ?3 WHERE id = ?1",
                    params![device.id.clone(), ts.to_rfc3339(), now.to_rfc3339()],
                )
                .await?;
        }

        // 3. UPSERT DEL GEMELO (estado previo -> derivación -> sellado)
        let mut prior_rows = ingest_transaction
            .query(
                "SELECT derived_state_json FROM device_twins WHERE device_id = ?1",
                params![device.id.clone()],
            )
            .await?;

        let prior_state = match prior_rows.next().await? {
            Some(row) => {
                let raw: String = row.get(0)?;
                Some(serde_json::from_str::<serde_json::Value>(&raw).map_err(|fault| {
                    DbError::MappingError(format!("TWIN_STATE_DRIFT: {fault}"))
                })?)
            }
            None => None,
        };

        let derived_state = recompute_derived_state(prior_state.as_ref(), metrics, geo);

        ingest_transaction
            .execute(
                "INSERT INTO device_twins (device_id, last_ts, derived_state_json, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(device_id) DO UPDATE SET
                     last_ts = excluded.last_ts,
                     derived_state_json = excluded.derived_state_json,
                     updated_at = excluded.updated_at",
                params![
                    device.id.clone(),
                    ts.to_rfc3339(),
                    derived_state.to_string(),
                    now.to_rfc3339()
                ],
            )
            .await?;

        // 4. RECONCILIACIÓN GEOGRÁFICA DEL SITIO
        let mut site_location_filled = false;
        let mut geo_jump_km = None;

        if let (Some(site_id), Some(geo_fix)) = (device.site_id.as_deref(), geo) {
            let mut site_rows = ingest_transaction
                .query(
                    "SELECT lat, lon, location_lock FROM sites WHERE id = ?1",
                    params![site_id],
                )
                .await?;

            if let Some(site_row) = site_rows.next().await? {
                let site_lat: Option<f64> = site_row.get(0)?;
                let site_lon: Option<f64> = site_row.get(1)?;
                let location_lock = site_row.get::<i64>(2)? != 0;

                if !location_lock && site_lat.is_none() {
                    // Relleno inicial: el dispositivo cristaliza la ubicación.
                    ingest_transaction
                        .execute(
                            "UPDATE sites SET lat = ?2, lon = ?3, location_source = ?4,
                                    location_accuracy_m = ?5, location_updated_at = ?6,
                                    updated_at = ?6
                             WHERE id = ?1",
                            params![
                                site_id,
                                geo_fix.lat,
                                geo_fix.lon,
                                geo_fix.source.as_str(),
                                geo_fix.accuracy_m,
                                now.to_rfc3339()
                            ],
                        )
                        .await?;
                    site_location_filled = true;

                    append_audit_best_effort(
                        &ingest_transaction,
                        &device.tenant_id,
                        actions::SITE_LOCATION_SET_FROM_DEVICE,
                        "site",
                        site_id,
                        json!({
                            "deviceId": device.id,
                            "lat": geo_fix.lat,
                            "lon": geo_fix.lon,
                            "source": geo_fix.source.as_str(),
                        }),
                    )
                    .await;
                } else if let (Some(site_lat), Some(site_lon)) = (site_lat, site_lon) {
                    let jump_distance_km =
                        haversine_distance_km(site_lat, site_lon, geo_fix.lat, geo_fix.lon);

                    // Estricto: exactamente 1 km no es anomalía.
                    if jump_distance_km > GEO_JUMP_THRESHOLD_KM {
                        geo_jump_km = Some(jump_distance_km);

                        append_audit_best_effort(
                            &ingest_transaction,
                            &device.tenant_id,
                            actions::DEVICE_GEO_LARGE_JUMP,
                            "device",
                            &device.id,
                            json!({
                                "siteId": site_id,
                                "distanceKm": jump_distance_km,
                                "siteLat": site_lat,
                                "siteLon": site_lon,
                                "reportedLat": geo_fix.lat,
                                "reportedLon": geo_fix.lon,
                            }),
                        )
                        .await;
                    }
                }
            }
        }

        ingest_transaction.commit().await.map_err(DbError::QueryError)?;

        debug!("📡 [TELEMETRY]: Reading {} sealed for unit {}.", telemetry_id, device.id);

        Ok(TelemetryIngestOutcome { telemetry_id, site_location_filled, geo_jump_km })
    }

    /// Gemelo vigente de la unidad.
    pub async fn find_twin(&self, device_id: &str) -> Result<Option<DeviceTwin>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                "SELECT device_id, last_ts, derived_state_json, updated_at
                 FROM device_twins WHERE device_id = ?1",
                params![device_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(DeviceTwin {
                device_id: row.get(0)?,
                last_ts: mappers::get_timestamp(&row, 1)?,
                derived_state: mappers::get_json(&row, 2)?,
                updated_at: mappers::get_timestamp(&row, 3)?,
            })),
            None => Ok(None),
        }
    }

    /// Lecturas más recientes, la más nueva primero (ventanas del evaluador).
    pub async fn recent_readings_desc(
        &self,
        device_id: &str,
        limit: i64,
    ) -> Result<Vec<TelemetryReading>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                "SELECT id, device_id, ts, metrics_json, geo_lat, geo_lon, geo_source,
                        geo_accuracy_m, created_at
                 FROM telemetry WHERE device_id = ?1 ORDER BY ts DESC LIMIT ?2",
                params![device_id, limit],
            )
            .await?;

        let mut readings = Vec::new();
        while let Some(row) = rows.next().await? {
            readings.push(map_reading_row(&row)?);
        }
        Ok(readings)
    }

    /// Serie ascendente dentro de una ventana (rodillo analítico).
    pub async fn readings_between_asc(
        &self,
        device_id: &str,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<TelemetryReading>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                "SELECT id, device_id, ts, metrics_json, geo_lat, geo_lon, geo_source,
                        geo_accuracy_m, created_at
                 FROM telemetry
                 WHERE device_id = ?1 AND ts >= ?2 AND ts < ?3
                 ORDER BY ts ASC",
                params![device_id, window_start.to_rfc3339(), window_end.to_rfc3339()],
            )
            .await?;

        let mut readings = Vec::new();
        while let Some(row) = rows.next().await? {
            readings.push(map_reading_row(&row)?);
        }
        Ok(readings)
    }

    /// Identificadores de unidades con lecturas en la ventana.
    pub async fn device_ids_with_readings_between(
        &self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<String>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                "SELECT DISTINCT device_id FROM telemetry WHERE ts >= ?1 AND ts < ?2",
                params![window_start.to_rfc3339(), window_end.to_rfc3339()],
            )
            .await?;

        let mut device_ids = Vec::new();
        while let Some(row) = rows.next().await? {
            device_ids.push(row.get::<String>(0)?);
        }
        Ok(device_ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::device::{DeviceRepository, NewDevice};
    use crate::repositories::site::{NewSite, SiteRepository};
    use crate::repositories::tenant::TenantRepository;
    use helios_domain_models::TenantType;

    async fn test_client() -> (TursoClient, tempfile::TempDir) {
        let scratch_directory = tempfile::tempdir().expect("scratch dir");
        let database_path = scratch_directory.path().join("proving.db");
        let client = TursoClient::connect(database_path.to_str().unwrap(), None)
            .await
            .expect("ledger ignition");
        (client, scratch_directory)
    }

    async fn seed_fleet(
        client: &TursoClient,
        site_lat: Option<f64>,
        location_lock: bool,
    ) -> Device {
        let tenants = TenantRepository::new(client.clone());
        let sites = SiteRepository::new(client.clone());
        let devices = DeviceRepository::new(client.clone());

        let tenant = tenants.create("Fleet Org", TenantType::Installer).await.unwrap();
        let site = sites
            .create(NewSite {
                tenant_id: tenant.id.clone(),
                name: "Rooftop A".into(),
                address_line: None,
                city: None,
                postal_code: None,
                country: None,
                lat: site_lat,
                lon: site_lat.map(|_| 23.735),
                location_lock,
            })
            .await
            .unwrap();

        let created = devices
            .create_with_secret(
                NewDevice {
                    id: Uuid::new_v4().to_string(),
                    tenant_id: tenant.id.clone(),
                    serial_number: "SN-TEL-1".into(),
                    model: "HELIOS-200L".into(),
                    name: None,
                    site_id: Some(site.id.clone()),
                    owner_user_id: None,
                    notes: None,
                    tags: serde_json::json!({}),
                    sim_iccid: None,
                },
                "digest",
            )
            .await
            .unwrap();
        created
    }

    fn metrics_of(pairs: &[(&str, MetricValue)]) -> BTreeMap<String, MetricValue> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[tokio::test]
    async fn certify_ingest_advances_last_seen_and_twin() {
        let (client, _guard) = test_client().await;
        let device = seed_fleet(&client, None, false).await;
        let telemetry = TelemetryRepository::new(client.clone());
        let devices = DeviceRepository::new(client);

        let ts = Utc::now();
        let metrics = metrics_of(&[
            ("tankTempC", MetricValue::Number(58.2)),
            ("rssiDbm", MetricValue::Number(-88.0)),
            ("batteryPct", MetricValue::Number(92.0)),
            ("heaterOn", MetricValue::Flag(true)),
            ("powerW", MetricValue::Number(1800.0)),
        ]);

        let outcome = telemetry.ingest_reading(&device, ts, &metrics, None).await.unwrap();
        assert!(!outcome.telemetry_id.is_empty());

        let refreshed = devices.find_by_id(&device.id).await.unwrap().unwrap();
        assert_eq!(refreshed.last_seen_at.unwrap().timestamp(), ts.timestamp());

        let twin = telemetry.find_twin(&device.id).await.unwrap().unwrap();
        assert_eq!(twin.derived_state["isOnline"], serde_json::json!(true));
        assert_eq!(twin.derived_state["lastTankTempC"], serde_json::json!(58.2));
        assert_eq!(twin.derived_state["healthScore"], serde_json::json!(100));
    }

    #[tokio::test]
    async fn certify_twin_converges_to_last_write() {
        let (client, _guard) = test_client().await;
        let device = seed_fleet(&client, None, false).await;
        let telemetry = TelemetryRepository::new(client);

        let first = metrics_of(&[("tankTempC", MetricValue::Number(50.0))]);
        let second = metrics_of(&[("tankTempC", MetricValue::Number(64.0))]);

        let ts = Utc::now();
        telemetry.ingest_reading(&device, ts, &first, None).await.unwrap();
        telemetry.ingest_reading(&device, ts, &second, None).await.unwrap();

        // Dos ingestas con el mismo ts: dos filas, y el gemelo converge
        // a la ÚLTIMA escritura.
        let rows = telemetry.recent_readings_desc(&device.id, 10).await.unwrap();
        assert_eq!(rows.len(), 2);

        let twin = telemetry.find_twin(&device.id).await.unwrap().unwrap();
        assert_eq!(twin.derived_state["lastTankTempC"], serde_json::json!(64.0));
    }

    #[tokio::test]
    async fn certify_unlocked_empty_site_is_filled_once() {
        let (client, _guard) = test_client().await;
        let device = seed_fleet(&client, None, false).await;
        let telemetry = TelemetryRepository::new(client.clone());
        let sites = SiteRepository::new(client);

        let geo = GeoFix { lat: 37.975, lon: 23.735, source: LocationSource::EdgeGnss, accuracy_m: Some(8.0) };
        let outcome = telemetry
            .ingest_reading(&device, Utc::now(), &BTreeMap::new(), Some(&geo))
            .await
            .unwrap();

        assert!(outcome.site_location_filled);
        assert!(outcome.geo_jump_km.is_none());

        let site = sites
            .find_by_id_in_tenant(&device.tenant_id, device.site_id.as_ref().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(site.lat, Some(37.975));
        assert_eq!(site.location_source, Some(LocationSource::EdgeGnss));

        // Segunda ingesta: el sitio ya tiene lat, no se re-rellena.
        let second = telemetry
            .ingest_reading(&device, Utc::now(), &BTreeMap::new(), Some(&geo))
            .await
            .unwrap();
        assert!(!second.site_location_filled);
    }

    #[tokio::test]
    async fn certify_locked_site_never_moves_and_jump_is_flagged() {
        let (client, _guard) = test_client().await;
        let device = seed_fleet(&client, Some(37.975), true).await;
        let telemetry = TelemetryRepository::new(client.clone());
        let sites = SiteRepository::new(client.clone());

        let geo = GeoFix { lat: 38.5, lon: 24.5, source: LocationSource::EdgeGnss, accuracy_m: None };
        let outcome = telemetry
            .ingest_reading(&device, Utc::now(), &BTreeMap::new(), Some(&geo))
            .await
            .unwrap();

        assert!(!outcome.site_location_filled);
        let jump = outcome.geo_jump_km.expect("large jump detected");
        assert!(jump > 1.0);

        // El sitio permanece inmóvil.
        let site = sites
            .find_by_id_in_tenant(&device.tenant_id, device.site_id.as_ref().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(site.lat, Some(37.975));
        assert_eq!(site.lon, Some(23.735));

        // Y el rastro de auditoría registra el salto.
        let connection = client.get_connection().unwrap();
        let mut rows = connection
            .query(
                "SELECT COUNT(*) FROM audit_logs WHERE action = 'DEVICE_GEO_LARGE_JUMP'",
                (),
            )
            .await
            .unwrap();
        let count: i64 = rows.next().await.unwrap().unwrap().get(0).unwrap();
        assert_eq!(count, 1);
    }
}
