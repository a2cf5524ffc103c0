// [libs/infra/db-turso/src/schema.rs]
/*!
 * =================================================================
 * APARATO: CONTROL PLANE DATABASE SCHEMA (V3.0 - TENANT STRATA)
 * CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
 * RESPONSABILIDAD: GOBERNANZA ESTRUCTURAL E IDEMPOTENCIA TOTAL
 *
 * # Logic:
 * Toda tabla se crea con 'IF NOT EXISTS' y los índices únicos portan
 * los invariantes del dominio: email de usuario, (usuario, tenant) de
 * membresía, (tenant, serial) de dispositivo, versión de firmware,
 * clave de dedupe de alertas, (tenant, clave, dispositivo) de
 * entitlement, (dispositivo, fecha) de rollup y (sitio, fecha) de clima.
 * =================================================================
 */

use anyhow::{Context, Result};
use libsql::Connection;
use tracing::{debug, info, instrument};

/**
 * ESTRATO 1: SOLIDIFICACIÓN (Génesis de Tablas)
 * Define las entidades base del plano de control de la flota.
 */
const CONTROL_PLANE_TABLES: &[(&str, &str)] = &[
    ("TABLE_TENANTS", r#"
        CREATE TABLE IF NOT EXISTS tenants (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            tenant_type TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'ACTIVE',
            settings_json TEXT NOT NULL DEFAULT '{}',
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL
        );
    "#),
    ("TABLE_USERS", r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            password_hash TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'ACTIVE',
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL
        );
    "#),
    ("TABLE_MEMBERSHIPS", r#"
        CREATE TABLE IF NOT EXISTS memberships (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            tenant_id TEXT NOT NULL,
            role TEXT NOT NULL,
            created_at DATETIME NOT NULL,
            UNIQUE(user_id, tenant_id)
        );
    "#),
    ("TABLE_SITES", r#"
        CREATE TABLE IF NOT EXISTS sites (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            name TEXT NOT NULL,
            address_line TEXT,
            city TEXT,
            postal_code TEXT,
            country TEXT,
            lat REAL,
            lon REAL,
            location_source TEXT,
            location_accuracy_m REAL,
            location_confidence REAL,
            location_updated_at DATETIME,
            location_updated_by_user_id TEXT,
            location_lock INTEGER NOT NULL DEFAULT 0,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL
        );
    "#),
    ("TABLE_DEVICES", r#"
        CREATE TABLE IF NOT EXISTS devices (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            site_id TEXT,
            owner_user_id TEXT,
            serial_number TEXT NOT NULL,
            model TEXT NOT NULL,
            name TEXT,
            notes TEXT,
            tags_json TEXT NOT NULL DEFAULT '{}',
            status TEXT NOT NULL DEFAULT 'PROVISIONED',
            last_seen_at DATETIME,
            firmware_version TEXT,
            sim_iccid TEXT,
            reported_lat REAL,
            reported_lon REAL,
            reported_location_source TEXT,
            reported_location_accuracy_m REAL,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            UNIQUE(tenant_id, serial_number)
        );
    "#),
    ("TABLE_DEVICE_SECRETS", r#"
        CREATE TABLE IF NOT EXISTS device_secrets (
            device_id TEXT PRIMARY KEY,
            mac_digest_hex TEXT NOT NULL,
            created_at DATETIME NOT NULL,
            rotated_at DATETIME
        );
    "#),
    ("TABLE_TELEMETRY", r#"
        CREATE TABLE IF NOT EXISTS telemetry (
            id TEXT PRIMARY KEY,
            device_id TEXT NOT NULL,
            ts DATETIME NOT NULL,
            metrics_json TEXT NOT NULL DEFAULT '{}',
            geo_lat REAL,
            geo_lon REAL,
            geo_source TEXT,
            geo_accuracy_m REAL,
            created_at DATETIME NOT NULL
        );
    "#),
    ("TABLE_DEVICE_TWINS", r#"
        CREATE TABLE IF NOT EXISTS device_twins (
            device_id TEXT PRIMARY KEY,
            last_ts DATETIME NOT NULL,
            derived_state_json TEXT NOT NULL DEFAULT '{}',
            updated_at DATETIME NOT NULL
        );
    "#),
    ("TABLE_COMMANDS", r#"
        CREATE TABLE IF NOT EXISTS commands (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            device_id TEXT NOT NULL,
            command_type TEXT NOT NULL,
            payload_json TEXT NOT NULL DEFAULT '{}',
            requested_by_user_id TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'QUEUED',
            requested_at DATETIME NOT NULL,
            delivered_at DATETIME,
            ack_at DATETIME,
            error_msg TEXT
        );
    "#),
    ("TABLE_FIRMWARE_PACKAGES", r#"
        CREATE TABLE IF NOT EXISTS firmware_packages (
            id TEXT PRIMARY KEY,
            version TEXT NOT NULL UNIQUE,
            download_url TEXT NOT NULL,
            checksum TEXT NOT NULL,
            release_notes TEXT,
            created_at DATETIME NOT NULL
        );
    "#),
    ("TABLE_OTA_JOBS", r#"
        CREATE TABLE IF NOT EXISTS ota_jobs (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            target_type TEXT NOT NULL,
            device_id TEXT,
            group_filter_json TEXT,
            firmware_id TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'SCHEDULED',
            scheduled_at DATETIME NOT NULL,
            started_at DATETIME,
            finished_at DATETIME,
            progress_json TEXT NOT NULL DEFAULT '{}',
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL
        );
    "#),
    ("TABLE_ALERT_RULES", r#"
        CREATE TABLE IF NOT EXISTS alert_rules (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            name TEXT NOT NULL,
            enabled INTEGER NOT NULL DEFAULT 1,
            rule_type TEXT NOT NULL,
            params_json TEXT NOT NULL DEFAULT '{}',
            severity TEXT NOT NULL DEFAULT 'WARNING',
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL
        );
    "#),
    ("TABLE_ALERT_EVENTS", r#"
        CREATE TABLE IF NOT EXISTS alert_events (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            device_id TEXT NOT NULL,
            rule_id TEXT NOT NULL,
            severity TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'OPEN',
            dedupe_key TEXT,
            details_json TEXT NOT NULL DEFAULT '{}',
            opened_at DATETIME NOT NULL,
            acknowledged_at DATETIME,
            closed_at DATETIME
        );
    "#),
    ("TABLE_NOTIFICATION_CHANNELS", r#"
        CREATE TABLE IF NOT EXISTS notification_channels (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            channel_type TEXT NOT NULL,
            config_json TEXT NOT NULL DEFAULT '{}',
            enabled INTEGER NOT NULL DEFAULT 1,
            created_at DATETIME NOT NULL
        );
    "#),
    ("TABLE_NOTIFICATION_EVENTS", r#"
        CREATE TABLE IF NOT EXISTS notification_events (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            channel_id TEXT NOT NULL,
            alert_event_id TEXT,
            status TEXT NOT NULL DEFAULT 'QUEUED',
            payload_json TEXT NOT NULL DEFAULT '{}',
            sent_at DATETIME,
            error_msg TEXT,
            created_at DATETIME NOT NULL
        );
    "#),
    ("TABLE_ENTITLEMENTS", r#"
        CREATE TABLE IF NOT EXISTS entitlements (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            scope TEXT NOT NULL,
            device_id TEXT NOT NULL DEFAULT '',
            feature_key TEXT NOT NULL,
            enabled INTEGER NOT NULL,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            UNIQUE(tenant_id, feature_key, device_id)
        );
    "#),
    ("TABLE_DAILY_ROLLUPS", r#"
        CREATE TABLE IF NOT EXISTS daily_rollups (
            id TEXT PRIMARY KEY,
            device_id TEXT NOT NULL,
            day_date TEXT NOT NULL,
            energy_kwh REAL NOT NULL DEFAULT 0,
            water_liters REAL NOT NULL DEFAULT 0,
            heater_on_minutes INTEGER NOT NULL DEFAULT 0,
            tank_temp_min REAL,
            tank_temp_max REAL,
            ambient_temp_avg REAL,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            UNIQUE(device_id, day_date)
        );
    "#),
    ("TABLE_AUDIT_LOGS", r#"
        CREATE TABLE IF NOT EXISTS audit_logs (
            id TEXT PRIMARY KEY,
            tenant_id TEXT,
            actor_user_id TEXT,
            actor_type TEXT NOT NULL,
            action TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            created_at DATETIME NOT NULL
        );
    "#),
    ("TABLE_WEATHER_DATA", r#"
        CREATE TABLE IF NOT EXISTS weather_data (
            id TEXT PRIMARY KEY,
            site_id TEXT NOT NULL,
            date TEXT NOT NULL,
            temp_min_c REAL,
            temp_max_c REAL,
            irradiance_kwh_m2 REAL,
            cloud_cover_pct REAL,
            created_at DATETIME NOT NULL,
            UNIQUE(site_id, date)
        );
    "#),
];

/**
 * ESTRATO 2: ENDURECIMIENTO (Índices de Aceleración y Unicidad)
 * La unicidad de la clave de dedupe admite NULL (eventos sin clave).
 */
const ACCELERATION_INDEXES: &[(&str, &str)] = &[
    ("UIDX_ALERT_DEDUPE", "CREATE UNIQUE INDEX IF NOT EXISTS uidx_alert_events_dedupe ON alert_events(dedupe_key);"),
    ("IDX_TELEMETRY_SERIES", "CREATE INDEX IF NOT EXISTS idx_telemetry_device_ts ON telemetry(device_id, ts);"),
    ("IDX_COMMANDS_PENDING", "CREATE INDEX IF NOT EXISTS idx_commands_device_status ON commands(device_id, status, requested_at);"),
    ("IDX_NOTIFICATIONS_DRAIN", "CREATE INDEX IF NOT EXISTS idx_notification_events_status ON notification_events(status, created_at);"),
    ("IDX_DEVICES_TENANT", "CREATE INDEX IF NOT EXISTS idx_devices_tenant_status ON devices(tenant_id, status);"),
    ("IDX_AUDIT_TENANT", "CREATE INDEX IF NOT EXISTS idx_audit_logs_tenant ON audit_logs(tenant_id, created_at);"),
    ("IDX_OTA_PULL", "CREATE INDEX IF NOT EXISTS idx_ota_jobs_tenant_status ON ota_jobs(tenant_id, status, scheduled_at);"),
];

/**
 * Ejecuta la secuencia maestra de sincronización del esquema estructural.
 *
 * # Errors:
 * Retorna error si alguna tabla base falla en solidificarse, indicando
 * un colapso en el enlace con el motor.
 */
#[instrument(skip(database_connection))]
pub async fn apply_control_plane_schema(database_connection: &Connection) -> Result<()> {
    info!("🏗️ [SCHEMA_ENGINE]: Initiating structural synchronization V3.0...");

    solidify_base_strata(database_connection).await?;
    harden_access_layer(database_connection).await?;

    info!("✅ [SCHEMA_ENGINE]: Control plane ledger level and certified.");
    Ok(())
}

async fn solidify_base_strata(db: &Connection) -> Result<()> {
    for (identifier, sql) in CONTROL_PLANE_TABLES {
        debug!("  ↳ Solidifying: {}", identifier);
        db.execute(*sql, ()).await
            .with_context(|| format!("CRITICAL_SOLIDIFICATION_FAULT: {}", identifier))?;
    }
    Ok(())
}

async fn harden_access_layer(db: &Connection) -> Result<()> {
    for (identifier, sql) in ACCELERATION_INDEXES {
        debug!("  ↳ Hardening: {}", identifier);
        db.execute(*sql, ()).await
            .with_context(|| format!("CRITICAL_HARDENING_FAULT: {}", identifier))?;
    }
    Ok(())
}
