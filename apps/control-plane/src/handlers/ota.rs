// [apps/control-plane/src/handlers/ota.rs]
/*!
 * =================================================================
 * APARATO: OTA HANDLERS (V3.2 - ROLLOUT GATEWAY)
 * CLASIFICACIÓN: API ADAPTER (ESTRATO L3-API)
 * RESPONSABILIDAD: CATÁLOGO (PA), TRABAJOS (PA|TA), PULL Y REPORTE
 * =================================================================
 */

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use helios_domain_models::{audit::actions, ActorType, OtaJobStatus, OtaTargetType, Role};
use helios_infra_db::repositories::ota::DeviceOtaReport;
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use crate::errors::ApiError;
use crate::extractors::{DeviceIdentity, TenantScope, ValidatedJson};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterFirmwarePayload {
    pub version: String,
    pub download_url: String,
    pub checksum: String,
    pub release_notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleJobPayload {
    pub target_type: OtaTargetType,
    pub device_id: Option<String>,
    pub group_filter: Option<serde_json::Value>,
    pub firmware_id: String,
    pub scheduled_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtaReportPayload {
    pub job_id: String,
    pub status: String,
    pub progress: Option<serde_json::Value>,
    pub error_msg: Option<String>,
}

/// POST /api/ota/firmware (solo PLATFORM_ADMIN)
#[instrument(skip(application_state, scope, payload), fields(version = %payload.version))]
pub async fn handle_register_firmware(
    State(application_state): State<AppState>,
    scope: TenantScope,
    ValidatedJson(payload): ValidatedJson<RegisterFirmwarePayload>,
) -> Result<impl IntoResponse, ApiError> {
    scope.require_platform_admin()?;

    if payload.version.trim().is_empty() {
        return Err(ApiError::validation("firmware version is required"));
    }

    let firmware = application_state
        .ota
        .register_firmware(
            payload.version.trim(),
            &payload.download_url,
            &payload.checksum,
            payload.release_notes,
        )
        .await?;

    application_state
        .audit_best_effort(
            None,
            Some(&scope.user.user_id),
            ActorType::User,
            actions::FIRMWARE_REGISTERED,
            "firmware",
            &firmware.id,
            json!({ "version": firmware.version }),
        )
        .await;

    Ok((StatusCode::CREATED, Json(firmware)))
}

/// GET /api/ota/firmware — cualquier usuario autenticado.
#[instrument(skip(application_state, _scope))]
pub async fn handle_list_firmware(
    State(application_state): State<AppState>,
    _scope: TenantScope,
) -> Result<impl IntoResponse, ApiError> {
    let packages = application_state.ota.list_firmware().await?;
    Ok(Json(packages))
}

/// POST /api/ota/jobs (PA | TA)
#[instrument(skip(application_state, scope, payload))]
pub async fn handle_schedule_job(
    State(application_state): State<AppState>,
    scope: TenantScope,
    ValidatedJson(payload): ValidatedJson<ScheduleJobPayload>,
) -> Result<impl IntoResponse, ApiError> {
    scope.require_role(&[Role::TenantAdmin])?;
    let tenant_id = scope.require_tenant()?.to_string();

    // Coherencia objetivo <-> campos.
    match payload.target_type {
        OtaTargetType::Device => {
            let device_id = payload
                .device_id
                .as_deref()
                .ok_or_else(|| ApiError::validation("deviceId required for DEVICE target"))?;
            application_state
                .devices
                .find_by_id_in_tenant(&tenant_id, device_id)
                .await?
                .ok_or(ApiError::NotFound)?;
        }
        OtaTargetType::Group => {
            if payload.group_filter.is_none() {
                return Err(ApiError::validation("groupFilter required for GROUP target"));
            }
        }
    }

    if payload.scheduled_at <= Utc::now() {
        return Err(ApiError::validation("scheduledAt must be a future timestamp"));
    }

    application_state
        .ota
        .find_firmware(&payload.firmware_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    let job = application_state
        .ota
        .schedule_job(
            &tenant_id,
            payload.target_type,
            payload.device_id,
            payload.group_filter,
            &payload.firmware_id,
            payload.scheduled_at,
        )
        .await?;

    application_state
        .audit_best_effort(
            Some(&tenant_id),
            Some(&scope.user.user_id),
            ActorType::User,
            actions::OTA_JOB_SCHEDULED,
            "ota_job",
            &job.id,
            json!({ "targetType": job.target_type, "firmwareId": job.firmware_id }),
        )
        .await;

    Ok((StatusCode::CREATED, Json(job)))
}

/// GET /api/ota/jobs
#[instrument(skip(application_state, scope))]
pub async fn handle_list_jobs(
    State(application_state): State<AppState>,
    scope: TenantScope,
) -> Result<impl IntoResponse, ApiError> {
    let tenant_id = scope.require_tenant()?;
    let jobs = application_state.ota.list_jobs_by_tenant(tenant_id).await?;
    Ok(Json(jobs))
}

/// POST /api/ota/jobs/:jobId/cancel (PA | TA)
#[instrument(skip(application_state, scope))]
pub async fn handle_cancel_job(
    State(application_state): State<AppState>,
    scope: TenantScope,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    scope.require_role(&[Role::TenantAdmin])?;
    let tenant_id = scope.require_tenant()?.to_string();

    let job = application_state.ota.cancel_job(&tenant_id, &job_id).await?;

    application_state
        .audit_best_effort(
            Some(&tenant_id),
            Some(&scope.user.user_id),
            ActorType::User,
            actions::OTA_JOB_CANCELED,
            "ota_job",
            &job.id,
            json!({}),
        )
        .await;

    Ok(Json(job))
}

/// GET /api/ota/devices/:deviceId/ota/pending (unidad propia)
#[instrument(skip(application_state, identity))]
pub async fn handle_device_pull(
    State(application_state): State<AppState>,
    identity: DeviceIdentity,
    Path(device_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    identity.require_self(&device_id)?;

    let device = application_state
        .devices
        .find_by_id(&device_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    let job = application_state
        .ota
        .pull_pending_for_device(&device.tenant_id, &device_id)
        .await?;

    Ok(Json(job))
}

/// POST /api/ota/devices/:deviceId/ota/report (unidad propia)
#[instrument(skip(application_state, identity, payload))]
pub async fn handle_device_report(
    State(application_state): State<AppState>,
    identity: DeviceIdentity,
    Path(device_id): Path<String>,
    ValidatedJson(payload): ValidatedJson<OtaReportPayload>,
) -> Result<impl IntoResponse, ApiError> {
    identity.require_self(&device_id)?;

    let reported_status = OtaJobStatus::parse(&payload.status)
        .filter(|status| {
            matches!(status, OtaJobStatus::InProgress | OtaJobStatus::Success | OtaJobStatus::Failed)
        })
        .ok_or_else(|| {
            ApiError::validation("status must be IN_PROGRESS, SUCCESS or FAILED")
        })?;

    let device = application_state
        .devices
        .find_by_id(&device_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    let job = application_state
        .ota
        .apply_device_report(
            &device.tenant_id,
            &device_id,
            DeviceOtaReport {
                job_id: payload.job_id,
                status: reported_status,
                progress: payload.progress,
                error_msg: payload.error_msg,
            },
        )
        .await?;

    if job.status.is_terminal() {
        application_state
            .audit_best_effort(
                Some(&device.tenant_id),
                None,
                ActorType::Device,
                actions::OTA_JOB_COMPLETED,
                "ota_job",
                &job.id,
                json!({ "status": job.status, "deviceId": device_id }),
            )
            .await;
    }

    Ok(Json(job))
}
