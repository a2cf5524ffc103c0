// [apps/control-plane/src/services/alert_evaluator.rs]
/*!
 * =================================================================
 * APARATO: ALERT EVALUATOR SERVICE (V5.2 - SWEEP AUTHORITY)
 * CLASIFICACIÓN: BACKGROUND INFRASTRUCTURE (ESTRATO L4)
 * RESPONSABILIDAD: BARRIDO PERIÓDICO DE REGLAS Y FAN-OUT DE SEÑALES
 *
 * # Logic:
 * Por cada regla habilitada se recorren las unidades elegibles del
 * tenant. La clave '<deviceId>:<ruleId>' con evento vivo corta el
 * camino; el predicado puro decide el disparo; la apertura vive bajo
 * el índice único (duplicado concurrente = no-op). Tras abrir, el
 * productor encola notificaciones respetando la asimetría de
 * supresión (WEBHOOK todo, EMAIL/SMS solo WARNING/CRITICAL).
 * El fallo de una unidad se registra y se salta: el barrido continúa.
 * =================================================================
 */

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use helios_domain_models::alert::{dedupe_key_for, RuleEvaluationContext};
use helios_domain_models::audit::actions;
use helios_domain_models::notification::channel_receives_severity;
use helios_domain_models::{ActorType, AlertRule, AlertRuleKind, Device};
use serde_json::json;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use crate::state::AppState;

/// Veredicto de una pasada completa del evaluador.
#[derive(Debug, Default, Clone, Copy)]
pub struct SweepReport {
    pub rules_considered: usize,
    pub devices_evaluated: usize,
    pub events_opened: usize,
    pub notifications_enqueued: usize,
}

pub struct AlertEvaluatorService {
    application_state: AppState,
}

impl AlertEvaluatorService {
    pub fn new(application_state: AppState) -> Self {
        Self { application_state }
    }

    /// Lanza el daemon perpetuo en el reactor de Tokio.
    pub fn spawn_daemon(self) {
        let sweep_interval_minutes = self.application_state.config.alert_eval_interval_minutes;
        let mut sweep_ticker = interval(Duration::from_secs(sweep_interval_minutes * 60));
        sweep_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            "🚨 [ALERT_EVALUATOR]: Sweep daemon active. Cadence: {} min.",
            sweep_interval_minutes
        );

        tokio::spawn(async move {
            loop {
                sweep_ticker.tick().await;
                match run_sweep(&self.application_state).await {
                    Ok(report) => {
                        if report.events_opened > 0 {
                            info!(
                                "🚨 [ALERT_EVALUATOR]: Sweep opened {} event(s), {} notification(s).",
                                report.events_opened, report.notifications_enqueued
                            );
                        }
                    }
                    Err(sweep_fault) => {
                        error!("❌ [ALERT_EVALUATOR]: Sweep collapsed: {}", sweep_fault);
                    }
                }
            }
        });
    }
}

/**
 * Una pasada completa sobre la flota. Pública para el proving grounds:
 * correrla dos veces sin cambio de estado abre cero eventos nuevos.
 */
#[instrument(skip(application_state))]
pub async fn run_sweep(
    application_state: &AppState,
) -> Result<SweepReport, helios_infra_db::DbError> {
    let mut report = SweepReport::default();
    let rule_defaults = application_state.config.rule_defaults();

    let enabled_rules = application_state.alerts.list_enabled_rules().await?;
    report.rules_considered = enabled_rules.len();

    // Inventario elegible memoizado por tenant durante la pasada.
    let mut devices_by_tenant: HashMap<String, Vec<Device>> = HashMap::new();

    for rule in &enabled_rules {
        let Some(rule_kind) = AlertRuleKind::from_rule(&rule.rule_type, &rule.params, &rule_defaults)
        else {
            warn!("⚪ [ALERT_EVALUATOR]: Rule {} has unknown type '{}'; skipped.",
                rule.id, rule.rule_type);
            continue;
        };

        if !devices_by_tenant.contains_key(&rule.tenant_id) {
            let eligible = application_state.devices.list_alert_eligible(&rule.tenant_id).await?;
            devices_by_tenant.insert(rule.tenant_id.clone(), eligible);
        }
        let eligible_devices = devices_by_tenant.get(&rule.tenant_id).expect("memoized above");

        for device in eligible_devices {
            report.devices_evaluated += 1;

            match evaluate_device_against_rule(application_state, rule, &rule_kind, device).await {
                Ok(Some(enqueued_count)) => {
                    report.events_opened += 1;
                    report.notifications_enqueued += enqueued_count;
                }
                Ok(None) => {}
                Err(device_fault) => {
                    // Independencia por unidad: registrar y seguir.
                    warn!(
                        "⚠️ [ALERT_EVALUATOR]: Unit {} vs rule {} failed: {}; skipped.",
                        device.id, rule.id, device_fault
                    );
                }
            }
        }
    }

    Ok(report)
}

/// Devuelve Some(n notificaciones) si se abrió un evento nuevo.
async fn evaluate_device_against_rule(
    application_state: &AppState,
    rule: &AlertRule,
    rule_kind: &AlertRuleKind,
    device: &Device,
) -> Result<Option<usize>, helios_infra_db::DbError> {
    let dedupe_key = dedupe_key_for(&device.id, &rule.id);

    // 1. CORTE POR EVENTO VIVO (OPEN | ACKNOWLEDGED).
    if application_state.alerts.has_live_event_for_dedupe(&dedupe_key).await? {
        return Ok(None);
    }

    // 2. CONTEXTO DEL PREDICADO: gemelo + ventana reciente descendente.
    let twin = application_state.telemetry.find_twin(&device.id).await?;
    let reading_window = match rule_kind {
        AlertRuleKind::SensorOutOfRange { repeat_count, .. } => (*repeat_count).max(10) as i64,
        _ => 10,
    };
    let recent_readings = application_state
        .telemetry
        .recent_readings_desc(&device.id, reading_window)
        .await?;

    let evaluation_context = RuleEvaluationContext {
        now: Utc::now(),
        device,
        twin: twin.as_ref(),
        recent_readings: &recent_readings,
    };

    // 3. VEREDICTO PURO.
    let Some(details) = rule_kind.should_fire(&evaluation_context) else {
        return Ok(None);
    };

    // 4. APERTURA BAJO ÍNDICE ÚNICO (duplicado concurrente = no-op).
    let Some(opened_event) = application_state
        .alerts
        .open_event(&rule.tenant_id, &device.id, &rule.id, rule.severity, &dedupe_key, details)
        .await?
    else {
        debug!("🔁 [ALERT_EVALUATOR]: Key {} raced; no-op.", dedupe_key);
        return Ok(None);
    };

    application_state
        .audit_best_effort(
            Some(&rule.tenant_id),
            None,
            ActorType::System,
            actions::ALERT_OPENED,
            "alert_event",
            &opened_event.id,
            json!({ "deviceId": device.id, "ruleId": rule.id, "severity": rule.severity }),
        )
        .await;

    // 5. PRODUCTOR DE NOTIFICACIONES (asimetría de supresión).
    let channels = application_state
        .notifications
        .list_enabled_channels_by_tenant(&rule.tenant_id)
        .await?;

    let mut enqueued_count = 0usize;
    for channel in channels {
        if !channel_receives_severity(channel.channel_type, rule.severity) {
            continue;
        }

        let payload = json!({
            "alertEventId": opened_event.id,
            "tenantId": rule.tenant_id,
            "deviceId": device.id,
            "ruleId": rule.id,
            "ruleName": rule.name,
            "severity": rule.severity,
            "details": opened_event.details,
            "openedAt": opened_event.opened_at,
        });

        application_state
            .notifications
            .enqueue_event(&rule.tenant_id, &channel.id, Some(opened_event.id.clone()), payload)
            .await?;
        enqueued_count += 1;
    }

    Ok(Some(enqueued_count))
}
