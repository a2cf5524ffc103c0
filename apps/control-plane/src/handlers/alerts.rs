// [apps/control-plane/src/handlers/alerts.rs]
/*!
 * =================================================================
 * APARATO: ALERT HANDLERS (V3.1 - RULE GOVERNANCE)
 * CLASIFICACIÓN: API ADAPTER (ESTRATO L3-API)
 * RESPONSABILIDAD: REGLAS (PA|TA), EVENTOS, ACK Y CIERRE
 * =================================================================
 */

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use helios_domain_models::{
    audit::actions, ActorType, AlertEventStatus, AlertRuleKind, AlertSeverity, Role,
};
use helios_infra_db::repositories::alert::AlertEventFilter;
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use crate::errors::ApiError;
use crate::extractors::{TenantScope, ValidatedJson};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRulePayload {
    pub name: String,
    #[serde(rename = "type")]
    pub rule_type: String,
    pub params: Option<serde_json::Value>,
    pub severity: AlertSeverity,
    pub enabled: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchRulePayload {
    pub name: Option<String>,
    pub enabled: Option<bool>,
    pub params: Option<serde_json::Value>,
    pub severity: Option<AlertSeverity>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventListQuery {
    pub status: Option<String>,
    pub severity: Option<String>,
    pub device_id: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// POST /api/alerts/rules (PA | TA)
#[instrument(skip(application_state, scope, payload))]
pub async fn handle_create_rule(
    State(application_state): State<AppState>,
    scope: TenantScope,
    ValidatedJson(payload): ValidatedJson<CreateRulePayload>,
) -> Result<impl IntoResponse, ApiError> {
    scope.require_role(&[Role::TenantAdmin])?;
    let tenant_id = scope.require_tenant()?.to_string();

    let params = payload.params.unwrap_or_else(|| json!({}));

    // El tipo debe pertenecer al conjunto cerrado de predicados.
    let rule_defaults = application_state.config.rule_defaults();
    if AlertRuleKind::from_rule(&payload.rule_type, &params, &rule_defaults).is_none() {
        return Err(ApiError::validation(format!(
            "unknown alert rule type '{}'",
            payload.rule_type
        )));
    }

    let rule = application_state
        .alerts
        .create_rule(
            &tenant_id,
            &payload.name,
            &payload.rule_type,
            params,
            payload.severity,
            payload.enabled.unwrap_or(true),
        )
        .await?;

    application_state
        .audit_best_effort(
            Some(&tenant_id),
            Some(&scope.user.user_id),
            ActorType::User,
            actions::ALERT_RULE_CREATED,
            "alert_rule",
            &rule.id,
            json!({ "type": rule.rule_type, "severity": rule.severity }),
        )
        .await;

    Ok((StatusCode::CREATED, Json(rule)))
}

/// GET /api/alerts/rules
#[instrument(skip(application_state, scope))]
pub async fn handle_list_rules(
    State(application_state): State<AppState>,
    scope: TenantScope,
) -> Result<impl IntoResponse, ApiError> {
    let tenant_id = scope.require_tenant()?;
    let rules = application_state.alerts.list_rules_by_tenant(tenant_id).await?;
    Ok(Json(rules))
}

/// PATCH /api/alerts/rules/:ruleId (PA | TA)
#[instrument(skip(application_state, scope, payload))]
pub async fn handle_patch_rule(
    State(application_state): State<AppState>,
    scope: TenantScope,
    Path(rule_id): Path<String>,
    ValidatedJson(payload): ValidatedJson<PatchRulePayload>,
) -> Result<impl IntoResponse, ApiError> {
    scope.require_role(&[Role::TenantAdmin])?;
    let tenant_id = scope.require_tenant()?.to_string();

    let rule = application_state
        .alerts
        .update_rule(
            &tenant_id,
            &rule_id,
            payload.name,
            payload.enabled,
            payload.params,
            payload.severity,
        )
        .await?;

    Ok(Json(rule))
}

/// GET /api/alerts — {events, total} con filtros.
#[instrument(skip(application_state, scope, query))]
pub async fn handle_list_events(
    State(application_state): State<AppState>,
    scope: TenantScope,
    Query(query): Query<EventListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let tenant_id = scope.require_tenant()?;

    let status = match query.status.as_deref() {
        Some(raw) => Some(
            AlertEventStatus::parse(raw)
                .ok_or_else(|| ApiError::validation(format!("unknown event status '{raw}'")))?,
        ),
        None => None,
    };
    let severity = match query.severity.as_deref() {
        Some(raw) => Some(
            AlertSeverity::parse(raw)
                .ok_or_else(|| ApiError::validation(format!("unknown severity '{raw}'")))?,
        ),
        None => None,
    };

    let (events, total) = application_state
        .alerts
        .list_events(
            tenant_id,
            &AlertEventFilter {
                status,
                severity,
                device_id: query.device_id,
                limit: query.limit.unwrap_or(50).clamp(1, 500),
                offset: query.offset.unwrap_or(0).max(0),
            },
        )
        .await?;

    Ok(Json(json!({ "events": events, "total": total })))
}

/// POST /api/alerts/:eventId/ack
#[instrument(skip(application_state, scope))]
pub async fn handle_ack_event(
    State(application_state): State<AppState>,
    scope: TenantScope,
    Path(event_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let tenant_id = scope.require_tenant()?.to_string();

    let event = application_state.alerts.acknowledge_event(&tenant_id, &event_id).await?;

    application_state
        .audit_best_effort(
            Some(&tenant_id),
            Some(&scope.user.user_id),
            ActorType::User,
            actions::ALERT_ACKNOWLEDGED,
            "alert_event",
            &event.id,
            json!({ "deviceId": event.device_id }),
        )
        .await;

    Ok(Json(event))
}

/// POST /api/alerts/:eventId/close
#[instrument(skip(application_state, scope))]
pub async fn handle_close_event(
    State(application_state): State<AppState>,
    scope: TenantScope,
    Path(event_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let tenant_id = scope.require_tenant()?.to_string();

    let event = application_state.alerts.close_event(&tenant_id, &event_id).await?;

    application_state
        .audit_best_effort(
            Some(&tenant_id),
            Some(&scope.user.user_id),
            ActorType::User,
            actions::ALERT_CLOSED,
            "alert_event",
            &event.id,
            json!({ "deviceId": event.device_id }),
        )
        .await;

    Ok(Json(event))
}
