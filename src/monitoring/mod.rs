//! Service monitoring: monitored services, their alerts, metric samples,
//! SLAs, and per-user dashboard widgets.

use axum::extract::{Path, Query, State};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use crate::auth::{require_staff, AuthUser};
use crate::shared::error::{ApiError, ApiResult};
use crate::shared::response::ApiResponse;
use crate::shared::schema::{
    alerts, dashboard_widgets, monitored_services, service_metrics, service_slas,
};
use crate::shared::state::AppState;

#[derive(Debug, Clone, Queryable, Serialize)]
pub struct MonitoredService {
    pub id: i32,
    pub name: String,
    pub service_type: String,
    pub url: Option<String>,
    pub status: String,
    pub last_check: Option<DateTime<Utc>>,
    pub response_time_ms: Option<f64>,
    pub uptime_percentage: f64,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct ServiceCreate {
    pub name: String,
    pub service_type: String,
    pub url: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, AsChangeset)]
#[diesel(table_name = monitored_services)]
pub struct ServicePatch {
    pub name: Option<String>,
    pub service_type: Option<String>,
    pub url: Option<String>,
    pub description: Option<String>,
}

fn find_service(conn: &mut PgConnection, id: i32) -> ApiResult<MonitoredService> {
    monitored_services::table
        .find(id)
        .first(conn)
        .optional()?
        .ok_or_else(|| ApiError::not_found("Service"))
}

async fn list_services(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
) -> ApiResult<Json<ApiResponse<Vec<MonitoredService>>>> {
    use monitored_services::dsl;
    let mut conn = state.db()?;
    let services: Vec<MonitoredService> =
        dsl::monitored_services.order(dsl::name.asc()).load(&mut conn)?;
    Ok(Json(ApiResponse::data(services)))
}

async fn get_service(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<i32>,
) -> ApiResult<Json<ApiResponse<MonitoredService>>> {
    let mut conn = state.db()?;
    Ok(Json(ApiResponse::data(find_service(&mut conn, id)?)))
}

async fn create_service(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<ServiceCreate>,
) -> ApiResult<Json<ApiResponse<MonitoredService>>> {
    require_staff(&user)?;
    use monitored_services::dsl;
    let mut conn = state.db()?;
    let service: MonitoredService = diesel::insert_into(dsl::monitored_services)
        .values((
            dsl::name.eq(payload.name),
            dsl::service_type.eq(payload.service_type),
            dsl::url.eq(payload.url),
            dsl::status.eq("unknown"),
            dsl::uptime_percentage.eq(100.0_f64),
            dsl::description.eq(payload.description),
            dsl::created_at.eq(Utc::now()),
        ))
        .get_result(&mut conn)?;
    Ok(Json(ApiResponse::created(service, "Service")))
}

async fn update_service(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i32>,
    Json(patch): Json<ServicePatch>,
) -> ApiResult<Json<ApiResponse<MonitoredService>>> {
    require_staff(&user)?;
    let mut conn = state.db()?;
    let service: MonitoredService = match diesel::update(monitored_services::table.find(id))
        .set(&patch)
        .get_result(&mut conn)
    {
        Ok(row) => row,
        Err(diesel::result::Error::QueryBuilderError(_)) => find_service(&mut conn, id)?,
        Err(diesel::result::Error::NotFound) => return Err(ApiError::not_found("Service")),
        Err(err) => return Err(err.into()),
    };
    Ok(Json(ApiResponse::updated(service, "Service")))
}

async fn delete_service(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i32>,
) -> ApiResult<Json<ApiResponse<serde_json::Value>>> {
    require_staff(&user)?;
    let mut conn = state.db()?;
    let n = diesel::delete(monitored_services::table.find(id)).execute(&mut conn)?;
    if n == 0 {
        return Err(ApiError::not_found("Service"));
    }
    Ok(Json(ApiResponse::message("Service deleted successfully")))
}

/// Agent-facing status report; every report stamps `last_check`.
#[derive(Debug, Deserialize)]
pub struct StatusReport {
    pub status: String,
    pub response_time_ms: Option<f64>,
    pub uptime_percentage: Option<f64>,
}

async fn report_status(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<i32>,
    Json(report): Json<StatusReport>,
) -> ApiResult<Json<ApiResponse<MonitoredService>>> {
    use monitored_services::dsl;
    let mut conn = state.db()?;
    let existing = find_service(&mut conn, id)?;
    let service: MonitoredService = diesel::update(dsl::monitored_services.find(id))
        .set((
            dsl::status.eq(report.status),
            dsl::last_check.eq(Some(Utc::now())),
            dsl::response_time_ms.eq(report.response_time_ms),
            dsl::uptime_percentage
                .eq(report.uptime_percentage.unwrap_or(existing.uptime_percentage)),
        ))
        .get_result(&mut conn)?;
    Ok(Json(ApiResponse::updated(service, "Service")))
}

// ---------------------------------------------------------------------------
// Alerts

#[derive(Debug, Queryable, Serialize)]
pub struct Alert {
    pub id: i32,
    pub service_id: i32,
    pub severity: String,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub acknowledged_by: Option<i32>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct AlertCreate {
    pub service_id: i32,
    pub severity: String,
    pub title: String,
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AlertFilter {
    pub status: Option<String>,
    pub severity: Option<String>,
    pub service_id: Option<i32>,
}

fn lifecycle_rank(status: &str) -> Option<u8> {
    match status {
        "active" => Some(0),
        "acknowledged" => Some(1),
        "resolved" => Some(2),
        _ => None,
    }
}

/// Alerts only move forward: active, then acknowledged, then resolved.
fn valid_transition(from: &str, to: &str) -> bool {
    match (lifecycle_rank(from), lifecycle_rank(to)) {
        (Some(a), Some(b)) => b > a,
        _ => false,
    }
}

async fn list_alerts(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Query(filter): Query<AlertFilter>,
) -> ApiResult<Json<ApiResponse<Vec<Alert>>>> {
    use alerts::dsl;
    let mut conn = state.db()?;
    let mut q = dsl::alerts.into_boxed();
    if let Some(status) = filter.status {
        q = q.filter(dsl::status.eq(status));
    }
    if let Some(severity) = filter.severity {
        q = q.filter(dsl::severity.eq(severity));
    }
    if let Some(service_id) = filter.service_id {
        q = q.filter(dsl::service_id.eq(service_id));
    }
    let rows: Vec<Alert> = q.order(dsl::created_at.desc()).load(&mut conn)?;
    Ok(Json(ApiResponse::data(rows)))
}

async fn create_alert(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Json(payload): Json<AlertCreate>,
) -> ApiResult<Json<ApiResponse<Alert>>> {
    use alerts::dsl;
    let mut conn = state.db()?;
    find_service(&mut conn, payload.service_id)?;
    let alert: Alert = diesel::insert_into(dsl::alerts)
        .values((
            dsl::service_id.eq(payload.service_id),
            dsl::severity.eq(payload.severity),
            dsl::title.eq(payload.title),
            dsl::description.eq(payload.description),
            dsl::status.eq("active"),
            dsl::created_at.eq(Utc::now()),
        ))
        .get_result(&mut conn)?;
    Ok(Json(ApiResponse::created(alert, "Alert")))
}

fn find_alert(conn: &mut PgConnection, id: i32) -> ApiResult<Alert> {
    alerts::table
        .find(id)
        .first(conn)
        .optional()?
        .ok_or_else(|| ApiError::not_found("Alert"))
}

async fn acknowledge_alert(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i32>,
) -> ApiResult<Json<ApiResponse<Alert>>> {
    require_staff(&user)?;
    use alerts::dsl;
    let mut conn = state.db()?;
    let existing = find_alert(&mut conn, id)?;
    if !valid_transition(&existing.status, "acknowledged") {
        warn!(alert_id = id, from = %existing.status, "rejected alert transition");
        return Err(ApiError::bad_request("Alert cannot be acknowledged"));
    }
    let alert: Alert = diesel::update(dsl::alerts.find(id))
        .set((
            dsl::status.eq("acknowledged"),
            dsl::acknowledged_by.eq(Some(user.id())),
            dsl::acknowledged_at.eq(Some(Utc::now())),
        ))
        .get_result(&mut conn)?;
    Ok(Json(ApiResponse::updated(alert, "Alert")))
}

async fn resolve_alert(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i32>,
) -> ApiResult<Json<ApiResponse<Alert>>> {
    require_staff(&user)?;
    use alerts::dsl;
    let mut conn = state.db()?;
    let existing = find_alert(&mut conn, id)?;
    if !valid_transition(&existing.status, "resolved") {
        warn!(alert_id = id, from = %existing.status, "rejected alert transition");
        return Err(ApiError::bad_request("Alert cannot be resolved"));
    }
    let alert: Alert = diesel::update(dsl::alerts.find(id))
        .set((dsl::status.eq("resolved"), dsl::resolved_at.eq(Some(Utc::now()))))
        .get_result(&mut conn)?;
    Ok(Json(ApiResponse::updated(alert, "Alert")))
}

// ---------------------------------------------------------------------------
// Metrics

#[derive(Debug, Queryable, Serialize)]
pub struct ServiceMetric {
    pub id: i32,
    pub service_id: i32,
    pub metric_name: String,
    pub value: f64,
    pub unit: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct MetricSample {
    pub metric_name: String,
    pub value: f64,
    pub unit: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MetricWindow {
    pub hours: Option<i64>,
}

async fn record_metric(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<i32>,
    Json(sample): Json<MetricSample>,
) -> ApiResult<Json<ApiResponse<ServiceMetric>>> {
    use service_metrics::dsl;
    let mut conn = state.db()?;
    find_service(&mut conn, id)?;
    let metric: ServiceMetric = diesel::insert_into(dsl::service_metrics)
        .values((
            dsl::service_id.eq(id),
            dsl::metric_name.eq(sample.metric_name),
            dsl::value.eq(sample.value),
            dsl::unit.eq(sample.unit),
            dsl::recorded_at.eq(Utc::now()),
        ))
        .get_result(&mut conn)?;
    Ok(Json(ApiResponse::created(metric, "Metric")))
}

async fn service_metrics_window(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<i32>,
    Query(window): Query<MetricWindow>,
) -> ApiResult<Json<HashMap<String, Vec<ServiceMetric>>>> {
    use service_metrics::dsl;
    let mut conn = state.db()?;
    find_service(&mut conn, id)?;
    let hours = window.hours.unwrap_or(24).clamp(1, 24 * 30);
    let since = Utc::now() - Duration::hours(hours);
    let samples: Vec<ServiceMetric> = dsl::service_metrics
        .filter(dsl::service_id.eq(id))
        .filter(dsl::recorded_at.ge(since))
        .order(dsl::recorded_at.asc())
        .load(&mut conn)?;

    let mut grouped: HashMap<String, Vec<ServiceMetric>> = HashMap::new();
    for sample in samples {
        grouped.entry(sample.metric_name.clone()).or_default().push(sample);
    }
    Ok(Json(grouped))
}

// ---------------------------------------------------------------------------
// Service SLAs

#[derive(Debug, Queryable, Serialize)]
pub struct ServiceSla {
    pub id: i32,
    pub service_id: i32,
    pub name: String,
    pub target_uptime: f64,
    pub response_time_target: Option<f64>,
    pub current_uptime: f64,
    pub status: String,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
}

async fn list_service_slas(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<i32>,
) -> ApiResult<Json<ApiResponse<Vec<ServiceSla>>>> {
    use service_slas::dsl;
    let mut conn = state.db()?;
    find_service(&mut conn, id)?;
    let slas: Vec<ServiceSla> =
        dsl::service_slas.filter(dsl::service_id.eq(id)).load(&mut conn)?;
    Ok(Json(ApiResponse::data(slas)))
}

// ---------------------------------------------------------------------------
// Dashboard widgets (per user)

#[derive(Debug, Queryable, Serialize)]
pub struct DashboardWidget {
    pub id: i32,
    pub user_id: i32,
    pub widget_type: String,
    pub title: String,
    pub config: Option<String>,
    pub position: i32,
    pub size: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct WidgetCreate {
    pub widget_type: String,
    pub title: String,
    pub config: Option<String>,
    #[serde(default)]
    pub position: i32,
    pub size: Option<String>,
}

async fn list_widgets(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> ApiResult<Json<ApiResponse<Vec<DashboardWidget>>>> {
    use dashboard_widgets::dsl;
    let mut conn = state.db()?;
    let widgets: Vec<DashboardWidget> = dsl::dashboard_widgets
        .filter(dsl::user_id.eq(user.id()))
        .order(dsl::position.asc())
        .load(&mut conn)?;
    Ok(Json(ApiResponse::data(widgets)))
}

async fn create_widget(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<WidgetCreate>,
) -> ApiResult<Json<ApiResponse<DashboardWidget>>> {
    use dashboard_widgets::dsl;
    let mut conn = state.db()?;
    let widget: DashboardWidget = diesel::insert_into(dsl::dashboard_widgets)
        .values((
            dsl::user_id.eq(user.id()),
            dsl::widget_type.eq(payload.widget_type),
            dsl::title.eq(payload.title),
            dsl::config.eq(payload.config),
            dsl::position.eq(payload.position),
            dsl::size.eq(payload.size.unwrap_or_else(|| "medium".to_string())),
            dsl::created_at.eq(Utc::now()),
        ))
        .get_result(&mut conn)?;
    Ok(Json(ApiResponse::created(widget, "Widget")))
}

async fn delete_widget(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(widget_id): Path<i32>,
) -> ApiResult<Json<ApiResponse<serde_json::Value>>> {
    use dashboard_widgets::dsl;
    let mut conn = state.db()?;
    // scoped to the caller: deleting someone else's widget is just a 404
    let n = diesel::delete(
        dsl::dashboard_widgets
            .filter(dsl::id.eq(widget_id))
            .filter(dsl::user_id.eq(user.id())),
    )
    .execute(&mut conn)?;
    if n == 0 {
        return Err(ApiError::not_found("Widget"));
    }
    Ok(Json(ApiResponse::message("Widget deleted successfully")))
}

// ---------------------------------------------------------------------------

pub fn configure_monitoring_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/services", get(list_services).post(create_service))
        .route(
            "/services/:id",
            get(get_service).put(update_service).delete(delete_service),
        )
        .route("/services/:id/status", put(report_status))
        .route(
            "/services/:id/metrics",
            get(service_metrics_window).post(record_metric),
        )
        .route("/services/:id/slas", get(list_service_slas))
        .route("/alerts", get(list_alerts).post(create_alert))
        .route("/alerts/:id/acknowledge", post(acknowledge_alert))
        .route("/alerts/:id/resolve", post(resolve_alert))
        .route("/widgets", get(list_widgets).post(create_widget))
        .route("/widgets/:widget_id", delete(delete_widget))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alerts_only_move_forward() {
        assert!(valid_transition("active", "acknowledged"));
        assert!(valid_transition("active", "resolved"));
        assert!(valid_transition("acknowledged", "resolved"));

        assert!(!valid_transition("acknowledged", "active"));
        assert!(!valid_transition("resolved", "acknowledged"));
        assert!(!valid_transition("resolved", "active"));
    }

    #[test]
    fn same_state_is_not_a_transition() {
        assert!(!valid_transition("active", "active"));
        assert!(!valid_transition("resolved", "resolved"));
    }

    #[test]
    fn unknown_states_are_rejected() {
        assert!(!valid_transition("active", "muted"));
        assert!(!valid_transition("snoozed", "resolved"));
    }
}
